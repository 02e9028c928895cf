mod longevity;
mod policy;
mod roth;
mod sepp;
mod strategy;
mod tables;
mod tax;
mod types;

pub use longevity::{simulate_longevity, simulate_longevity_from_need};
pub use policy::{withdrawal_order, withdrawal_order_with_sepp};
pub use roth::{
    RetirementPlan, RothConversionOptimizer, RothConversionRecommendation, RothConversionRequest,
    plan, plan_with_optimizer,
};
pub use sepp::{SeppProgram, sepp_payment};
pub use strategy::{
    CONVERGENCE_TOLERANCE, MAX_ITERATIONS, required_minimum_distribution, solve_strategy,
};
pub use tables::{
    EARLY_WITHDRAWAL_PENALTY_RATE, RMD_START_AGE, RULE_OF_55_AGE, STANDARD_PHASE_AGE,
    SUSTAINABLE_WITHDRAWAL_RATE, base_standard_deduction, standard_deduction,
};
pub use tax::{effective_rate, federal_tax, provisional_income, taxable_guaranteed_income};
pub use types::{
    AccountSource, Assets, BucketKind, Contributions, FilingStatus, GuaranteedIncome,
    IncomeProfile, LongevityResult, MarketAssumptions, Phase, Profile, StrategyResult,
    TaxTreatment, Withdrawal, WithdrawalBucket, WithdrawalPlan, YearProjection,
};
