use serde::Serialize;

use super::tables::{
    RULE_OF_55_AGE, SEPP_INTEREST_RATE, SEPP_MIN_YEARS, STANDARD_PHASE_AGE,
    single_life_expectancy,
};

/// Fixed annual SEPP payment using the amortization method.
pub fn sepp_payment(balance: f64, age: f64) -> f64 {
    let balance = balance.max(0.0);
    if balance <= 0.0 {
        return 0.0;
    }
    amortized_payment(balance, SEPP_INTEREST_RATE, single_life_expectancy(age))
}

fn amortized_payment(principal: f64, rate: f64, periods: f64) -> f64 {
    if periods <= 0.0 {
        return principal;
    }
    if rate.abs() < 1e-12 {
        return principal / periods;
    }
    let growth = (1.0 + rate).powf(periods);
    principal * rate * growth / (growth - 1.0)
}

/// A SEPP program locked in at its start: the payment never changes for the
/// whole mandatory window, whatever happens to the balance.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeppProgram {
    pub start_age: f64,
    pub end_age: f64,
    pub annual_payment: f64,
}

impl SeppProgram {
    /// Starts a program when the household is under 55 with a tax-deferred balance.
    pub fn start(tax_deferred_balance: f64, age: f64) -> Option<Self> {
        if age >= RULE_OF_55_AGE || tax_deferred_balance <= 0.0 {
            return None;
        }
        Some(Self {
            start_age: age,
            end_age: Self::end_age_for(age),
            annual_payment: sepp_payment(tax_deferred_balance, age),
        })
    }

    /// Five years or until 59.5, whichever is longer.
    pub fn end_age_for(start_age: f64) -> f64 {
        (start_age + SEPP_MIN_YEARS).max(STANDARD_PHASE_AGE)
    }

    pub fn is_active(&self, age: f64) -> bool {
        age >= self.start_age && age < self.end_age
    }

    pub fn payment_at(&self, age: f64) -> f64 {
        if self.is_active(age) {
            self.annual_payment
        } else {
            0.0
        }
    }
}
