use super::tables::{capital_gains_brackets, ordinary_brackets, social_security_thresholds};
use super::types::FilingStatus;

pub fn provisional_income(benefit: f64, other_income: f64) -> f64 {
    other_income.max(0.0) + 0.5 * benefit.max(0.0)
}

/// Taxable part of a Social-Security-like benefit given the household's other income.
///
/// Always within `[0, 0.85 * benefit]`. Between the two thresholds each extra dollar
/// of other income pulls in 50 cents of benefit; above the second it pulls in 85.
pub fn taxable_guaranteed_income(benefit: f64, other_income: f64, status: FilingStatus) -> f64 {
    let benefit = benefit.max(0.0);
    if benefit <= 0.0 {
        return 0.0;
    }

    let thresholds = social_security_thresholds(status);
    let provisional = provisional_income(benefit, other_income);

    if provisional <= thresholds.first {
        return 0.0;
    }

    if provisional <= thresholds.second {
        return 0.5 * benefit.min(provisional - thresholds.first);
    }

    let secondary = thresholds.secondary_amount.min(0.5 * benefit);
    (0.85 * (provisional - thresholds.second) + secondary).min(0.85 * benefit)
}

/// Federal tax with ordinary income filling the brackets first and capital gains
/// stacked on top of the ordinary position.
pub fn federal_tax(
    ordinary_income: f64,
    capital_gains_income: f64,
    status: FilingStatus,
    standard_deduction: f64,
) -> f64 {
    let ordinary = ordinary_income.max(0.0);
    let gains = capital_gains_income.max(0.0);
    let deduction = standard_deduction.max(0.0);

    let taxable_ordinary = (ordinary - deduction).max(0.0);
    let unused_deduction = (deduction - ordinary).max(0.0);
    let taxable_gains = (gains - unused_deduction).max(0.0);

    ordinary_tax(taxable_ordinary, status) + capital_gains_tax(taxable_gains, taxable_ordinary, status)
}

fn ordinary_tax(taxable_income: f64, status: FilingStatus) -> f64 {
    let mut tax = 0.0;
    let mut floor = 0.0;
    for bracket in ordinary_brackets(status) {
        if taxable_income <= floor {
            break;
        }
        tax += (taxable_income.min(bracket.ceiling) - floor) * bracket.rate;
        floor = bracket.ceiling;
    }
    tax
}

fn capital_gains_tax(gains: f64, ordinary_position: f64, status: FilingStatus) -> f64 {
    let mut remaining = gains;
    let mut position = ordinary_position;
    let mut tax = 0.0;
    for bracket in capital_gains_brackets(status) {
        if remaining <= 0.0 {
            break;
        }
        let room = (bracket.ceiling - position).max(0.0);
        let used = remaining.min(room);
        tax += used * bracket.rate;
        // The 0% band still advances the position.
        position += used;
        remaining -= used;
    }
    tax
}

pub fn effective_rate(tax: f64, gross_income: f64) -> f64 {
    if gross_income <= 0.0 {
        0.0
    } else {
        (tax / gross_income).max(0.0)
    }
}
