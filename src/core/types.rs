use serde::{Deserialize, Serialize};

use super::tables::STANDARD_PHASE_AGE;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilingStatus {
    Single,
    MarriedFilingJointly,
    MarriedFilingSeparately,
    HeadOfHousehold,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountSource {
    TaxDeferred,
    TaxExempt,
    Taxable,
    Medical,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaxTreatment {
    Ordinary,
    CapitalGains,
    None,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Early,
    Standard,
}

impl Phase {
    pub fn for_age(age: f64) -> Self {
        if age < STANDARD_PHASE_AGE {
            Phase::Early
        } else {
            Phase::Standard
        }
    }
}

/// Every kind of withdrawal bucket the ordering policy can emit. Early-phase
/// and standard-phase kinds are disjoint.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BucketKind {
    Sepp,
    BridgeTaxable,
    ContributionBasis,
    Rule55,
    PenaltyTaxDeferred,
    PenaltyEarnings,
    BracketFill,
    HarvestTaxable,
    TaxDeferredRemainder,
    TaxExemptRemainder,
}

impl BucketKind {
    pub fn phase(self) -> Phase {
        match self {
            BucketKind::Sepp
            | BucketKind::BridgeTaxable
            | BucketKind::ContributionBasis
            | BucketKind::Rule55
            | BucketKind::PenaltyTaxDeferred
            | BucketKind::PenaltyEarnings => Phase::Early,
            BucketKind::BracketFill
            | BucketKind::HarvestTaxable
            | BucketKind::TaxDeferredRemainder
            | BucketKind::TaxExemptRemainder => Phase::Standard,
        }
    }

    pub fn source(self) -> AccountSource {
        match self {
            BucketKind::Sepp
            | BucketKind::Rule55
            | BucketKind::PenaltyTaxDeferred
            | BucketKind::BracketFill
            | BucketKind::TaxDeferredRemainder => AccountSource::TaxDeferred,
            BucketKind::ContributionBasis
            | BucketKind::PenaltyEarnings
            | BucketKind::TaxExemptRemainder => AccountSource::TaxExempt,
            BucketKind::BridgeTaxable | BucketKind::HarvestTaxable => AccountSource::Taxable,
        }
    }

    pub fn treatment(self) -> TaxTreatment {
        match self {
            BucketKind::Sepp
            | BucketKind::Rule55
            | BucketKind::PenaltyTaxDeferred
            | BucketKind::PenaltyEarnings
            | BucketKind::BracketFill
            | BucketKind::TaxDeferredRemainder => TaxTreatment::Ordinary,
            BucketKind::BridgeTaxable | BucketKind::HarvestTaxable => TaxTreatment::CapitalGains,
            BucketKind::ContributionBasis | BucketKind::TaxExemptRemainder => TaxTreatment::None,
        }
    }

    pub fn penalized(self) -> bool {
        matches!(
            self,
            BucketKind::PenaltyTaxDeferred | BucketKind::PenaltyEarnings
        )
    }

    pub fn mandatory(self) -> bool {
        self == BucketKind::Sepp
    }

    pub fn label(self) -> &'static str {
        match self {
            BucketKind::Sepp => "SEPP fixed payment from tax-deferred account",
            BucketKind::BridgeTaxable => "Taxable account bridge withdrawal",
            BucketKind::ContributionBasis => "Tax-exempt contribution basis",
            BucketKind::Rule55 => "Tax-deferred withdrawal under the age-55 exception",
            BucketKind::PenaltyTaxDeferred => "Early tax-deferred withdrawal (10% penalty)",
            BucketKind::PenaltyEarnings => "Early tax-exempt earnings (10% penalty, taxable)",
            BucketKind::BracketFill => "Tax-deferred withdrawal filling low brackets",
            BucketKind::HarvestTaxable => "Taxable account withdrawal at preferential rates",
            BucketKind::TaxDeferredRemainder => "Tax-deferred withdrawal above the bracket fill",
            BucketKind::TaxExemptRemainder => "Tax-exempt withdrawal (tax-free)",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalBucket {
    pub kind: BucketKind,
    pub source: AccountSource,
    pub limit: f64,
    pub treatment: TaxTreatment,
    pub penalty: bool,
    pub mandatory: bool,
}

impl WithdrawalBucket {
    pub fn new(kind: BucketKind, limit: f64) -> Self {
        Self {
            kind,
            source: kind.source(),
            limit: limit.max(0.0),
            treatment: kind.treatment(),
            penalty: kind.penalized(),
            mandatory: kind.mandatory(),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Assets {
    pub tax_deferred: f64,
    pub tax_exempt: f64,
    /// Contributions inside the tax-exempt balance, withdrawable tax- and penalty-free.
    pub tax_exempt_basis: f64,
    pub taxable: f64,
    pub medical: f64,
}

impl Assets {
    pub fn total(&self) -> f64 {
        self.tax_deferred + self.tax_exempt + self.taxable + self.medical
    }

    /// Clamps negative balances to zero and the basis to the tax-exempt balance.
    pub fn sanitized(self) -> Self {
        let tax_exempt = self.tax_exempt.max(0.0);
        Self {
            tax_deferred: self.tax_deferred.max(0.0),
            tax_exempt,
            tax_exempt_basis: self.tax_exempt_basis.max(0.0).min(tax_exempt),
            taxable: self.taxable.max(0.0),
            medical: self.medical.max(0.0),
        }
    }

    pub fn balance(&self, source: AccountSource) -> f64 {
        match source {
            AccountSource::TaxDeferred => self.tax_deferred,
            AccountSource::TaxExempt => self.tax_exempt,
            AccountSource::Taxable => self.taxable,
            AccountSource::Medical => self.medical,
        }
    }

    /// Removes up to `amount` for the given bucket and returns what was actually taken.
    pub(crate) fn withdraw(&mut self, kind: BucketKind, amount: f64) -> f64 {
        let source = kind.source();
        let taken = amount.max(0.0).min(self.balance(source).max(0.0));
        match source {
            AccountSource::TaxDeferred => self.tax_deferred -= taken,
            AccountSource::Taxable => self.taxable -= taken,
            AccountSource::Medical => self.medical -= taken,
            AccountSource::TaxExempt => {
                self.tax_exempt -= taken;
                if kind == BucketKind::ContributionBasis {
                    self.tax_exempt_basis = (self.tax_exempt_basis - taken).max(0.0);
                }
                self.tax_exempt_basis = self.tax_exempt_basis.min(self.tax_exempt);
            }
        }
        taken
    }

    pub(crate) fn grow(&mut self, rate: f64) {
        let factor = 1.0 + rate;
        self.tax_deferred = (self.tax_deferred * factor).max(0.0);
        self.tax_exempt = (self.tax_exempt * factor).max(0.0);
        self.taxable = (self.taxable * factor).max(0.0);
        self.medical = (self.medical * factor).max(0.0);
        self.tax_exempt_basis = self.tax_exempt_basis.min(self.tax_exempt);
    }

    pub(crate) fn contribute(&mut self, contributions: &Contributions) {
        let tax_exempt = contributions.tax_exempt.max(0.0);
        self.tax_deferred += contributions.tax_deferred.max(0.0);
        self.tax_exempt += tax_exempt;
        self.tax_exempt_basis += tax_exempt;
        self.taxable += contributions.taxable.max(0.0);
        self.medical += contributions.medical.max(0.0);
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Contributions {
    pub tax_deferred: f64,
    pub tax_exempt: f64,
    pub taxable: f64,
    pub medical: f64,
}

impl Contributions {
    pub fn total(&self) -> f64 {
        self.tax_deferred.max(0.0)
            + self.tax_exempt.max(0.0)
            + self.taxable.max(0.0)
            + self.medical.max(0.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeProfile {
    /// Annual Social-Security-like benefit at the claim age.
    pub guaranteed_income: f64,
    pub claim_age: f64,
    pub pension: f64,
    pub dividend_yield: f64,
    pub qualified_dividend_ratio: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketAssumptions {
    pub accumulation_inflation: f64,
    pub accumulation_return: f64,
    pub retirement_inflation: f64,
    pub retirement_return: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub current_age: f64,
    pub retirement_age: f64,
    pub horizon_age: f64,
    pub filing_status: FilingStatus,
    pub spending_need: f64,
    /// When true the spending need is in today's money and is inflated to retirement.
    pub spending_is_real: bool,
    pub assets: Assets,
    pub income: IncomeProfile,
    pub market: MarketAssumptions,
    pub contributions: Contributions,
}

impl Profile {
    pub fn accumulation_years(&self) -> u32 {
        (self.retirement_age - self.current_age).max(0.0).ceil() as u32
    }

    pub fn retirement_start_age(&self) -> f64 {
        self.current_age + self.accumulation_years() as f64
    }

    pub fn nominal_spending_need(&self) -> f64 {
        let need = self.spending_need.max(0.0);
        if self.spending_is_real {
            need * (1.0 + self.market.accumulation_inflation).powi(self.accumulation_years() as i32)
        } else {
            need
        }
    }

    /// Balances at the first retirement year, after compounding and contributions.
    pub fn retirement_assets(&self) -> Assets {
        let mut assets = self.assets.sanitized();
        for _ in 0..self.accumulation_years() {
            assets.grow(self.market.accumulation_return);
            assets.contribute(&self.contributions);
        }
        assets
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuaranteedIncome {
    pub social_security: f64,
    pub pension: f64,
    pub dividends: f64,
    pub qualified_dividends: f64,
}

impl GuaranteedIncome {
    pub fn total(&self) -> f64 {
        self.social_security + self.pension + self.dividends
    }

    pub fn non_qualified_dividends(&self) -> f64 {
        (self.dividends - self.qualified_dividends).max(0.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub source: AccountSource,
    pub amount: f64,
    pub taxable_amount: f64,
    pub treatment: TaxTreatment,
    pub penalty: bool,
    pub mandatory: bool,
    pub note: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalPlan {
    pub withdrawals: Vec<Withdrawal>,
}

impl WithdrawalPlan {
    pub fn total(&self) -> f64 {
        self.withdrawals.iter().map(|w| w.amount).sum()
    }

    pub fn from_source(&self, source: AccountSource) -> f64 {
        self.withdrawals
            .iter()
            .filter(|w| w.source == source)
            .map(|w| w.amount)
            .sum()
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyResult {
    pub age: f64,
    pub phase: Phase,
    pub plan: WithdrawalPlan,
    pub guaranteed_income: GuaranteedIncome,
    pub nominal_spending_needed: f64,
    /// Tax-inclusive cash target of the final iteration.
    pub gross_need: f64,
    /// Guaranteed income plus every realized withdrawal, mandatory ones included.
    pub total_withdrawal: f64,
    pub gap_filled: bool,
    pub shortfall: f64,
    pub liquidity_gap: bool,
    pub ordinary_income: f64,
    pub capital_gains_income: f64,
    pub estimated_federal_tax: f64,
    pub penalty_tax: f64,
    pub rmd_amount: f64,
    pub taxable_guaranteed_income: f64,
    pub provisional_income: f64,
    pub standard_deduction: f64,
    pub iterations: u32,
    pub converged: bool,
    pub notes: Vec<String>,
}

impl StrategyResult {
    pub fn total_tax(&self) -> f64 {
        self.estimated_federal_tax + self.penalty_tax
    }

    pub fn portfolio_withdrawal(&self) -> f64 {
        self.plan.total()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearProjection {
    pub age: f64,
    pub phase: Phase,
    pub retired: bool,
    pub gross_need: f64,
    pub required_draw: f64,
    pub social_security: f64,
    pub pension: f64,
    pub dividends: f64,
    pub contributions: f64,
    pub rmd: f64,
    pub sepp_withdrawal: f64,
    pub tax_deferred_withdrawal: f64,
    pub tax_exempt_withdrawal: f64,
    pub taxable_withdrawal: f64,
    pub penalty_withdrawal: f64,
    pub penalty_free_withdrawal: f64,
    pub redeposited: f64,
    pub shortfall: f64,
    pub ordinary_income: f64,
    pub capital_gains_income: f64,
    pub taxable_guaranteed_income: f64,
    pub estimated_tax: f64,
    pub effective_tax_rate: f64,
    pub tax_deferred: f64,
    pub tax_exempt: f64,
    pub tax_exempt_basis: f64,
    pub taxable: f64,
    pub medical: f64,
    pub total_assets: f64,
    pub depleted: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LongevityResult {
    pub years: Vec<YearProjection>,
    pub depletion_age: Option<f64>,
    pub initial_withdrawal_rate: f64,
    pub sustainable: bool,
    pub sepp_start_age: Option<f64>,
    pub sepp_end_age: Option<f64>,
    pub sepp_payment: f64,
}
