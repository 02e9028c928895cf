//! Contract with an external Roth-conversion optimizer. The core hands over
//! its own computed figures unchanged and does not interpret the answer.

use serde::Serialize;

use super::longevity::simulate_longevity;
use super::strategy::solve_strategy;
use super::types::{LongevityResult, Profile, StrategyResult};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RothConversionRequest {
    pub profile: Profile,
    pub provisional_income: f64,
    pub taxable_guaranteed_income: f64,
    pub current_withdrawal_rate: f64,
    pub liquidity_gap_warning: bool,
}

impl RothConversionRequest {
    pub fn from_results(
        profile: &Profile,
        strategy: &StrategyResult,
        longevity: &LongevityResult,
    ) -> Self {
        Self {
            profile: profile.clone(),
            provisional_income: strategy.provisional_income,
            taxable_guaranteed_income: strategy.taxable_guaranteed_income,
            current_withdrawal_rate: longevity.initial_withdrawal_rate,
            liquidity_gap_warning: strategy.liquidity_gap,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RothConversionRecommendation {
    pub recommended_amount: f64,
    pub effective_marginal_rate: f64,
    pub binding_constraint: String,
    pub in_torpedo_zone: bool,
    pub torpedo_multiplier: f64,
    pub warnings: Vec<String>,
    pub reasoning: Vec<String>,
    pub constraints: Vec<String>,
}

pub trait RothConversionOptimizer {
    fn recommend(&self, request: &RothConversionRequest) -> RothConversionRecommendation;
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetirementPlan {
    pub strategy: StrategyResult,
    pub longevity: LongevityResult,
    pub roth_request: RothConversionRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roth_recommendation: Option<RothConversionRecommendation>,
}

/// Solver followed by the simulator, with the optimizer request prepared but not sent.
pub fn plan(profile: &Profile) -> RetirementPlan {
    let strategy = solve_strategy(profile);
    let longevity = simulate_longevity(profile, &strategy);
    let roth_request = RothConversionRequest::from_results(profile, &strategy, &longevity);
    RetirementPlan {
        strategy,
        longevity,
        roth_request,
        roth_recommendation: None,
    }
}

pub fn plan_with_optimizer<O>(profile: &Profile, optimizer: &O) -> RetirementPlan
where
    O: RothConversionOptimizer + ?Sized,
{
    let mut plan = plan(profile);
    plan.roth_recommendation = Some(optimizer.recommend(&plan.roth_request));
    plan
}
