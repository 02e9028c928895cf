use tracing::{debug, warn};

use super::policy::withdrawal_order_with_sepp;
use super::sepp::SeppProgram;
use super::strategy::{YearTaxes, draw_buckets, guaranteed_income, required_minimum_distribution};
use super::tables::{SUSTAINABLE_WITHDRAWAL_RATE, standard_deduction};
use super::tax::effective_rate;
use super::types::{Assets, LongevityResult, Phase, Profile, StrategyResult, YearProjection};

/// Projects the household year by year to the horizon, seeded with the
/// solver's first-year total withdrawal as a tax-inclusive target.
///
/// That seed includes any mandatory SEPP payment or RMD drawn above the
/// need. The overshoot stays in the gross need for every later year, even
/// after the SEPP window closes, and it counts toward the required draw in
/// the sustainability ratio. Call [`simulate_longevity_from_need`] to seed
/// with a different figure.
pub fn simulate_longevity(profile: &Profile, strategy: &StrategyResult) -> LongevityResult {
    simulate_longevity_from_need(profile, strategy.total_withdrawal)
}

/// Runs the projection from an explicit first-year gross need. The need is
/// carried forward with retirement inflation; the fixed point is not re-run.
pub fn simulate_longevity_from_need(profile: &Profile, first_year_gross_need: f64) -> LongevityResult {
    let mut assets = profile.assets.sanitized();
    let mut years = Vec::new();
    let mut age = profile.current_age;

    for _ in 0..profile.accumulation_years() {
        assets.grow(profile.market.accumulation_return);
        assets.contribute(&profile.contributions);
        years.push(accumulation_year(age, &assets, profile.contributions.total()));
        debug!(age, total = assets.total(), "accumulation year");
        age += 1.0;
    }

    let initial_assets = assets.total();
    let sepp = SeppProgram::start(assets.tax_deferred, age);
    let inflation = profile.market.retirement_inflation;
    let mut gross_need = first_year_gross_need.max(0.0);
    let mut benefit = profile.income.guaranteed_income.max(0.0);
    let mut claimed = false;
    let mut depletion_age = None;
    let mut initial_draw = None;

    while age <= profile.horizon_age {
        if initial_draw.is_some() {
            gross_need *= 1.0 + inflation;
        }
        if age >= profile.income.claim_age {
            if claimed {
                benefit *= 1.0 + inflation;
            }
            claimed = true;
        }

        let status = profile.filing_status;
        let deduction = standard_deduction(status, age);
        let guaranteed = guaranteed_income(&profile.income, age, benefit, assets.taxable);
        assets.taxable = (assets.taxable - guaranteed.dividends).max(0.0);

        let required = (gross_need - guaranteed.total()).max(0.0);
        initial_draw.get_or_insert(required);

        let rmd = required_minimum_distribution(assets.tax_deferred, age);
        assets.tax_deferred -= rmd;

        let mut plan = Vec::new();
        let sepp_payment = sepp.map_or(0.0, |program| program.payment_at(age));
        let buckets = withdrawal_order_with_sepp(age, &assets, status, deduction, sepp_payment);
        let gap = (required - rmd).max(0.0);
        let (draws, shortfall) = draw_buckets(&buckets, gap, &mut assets, &mut plan);

        // Mandatory cash beyond the year's draw and unspent dividends go back
        // into the taxable account.
        let excess = (rmd + draws.cash - required).max(0.0);
        let unspent_dividends = guaranteed
            .dividends
            .min((guaranteed.total() - gross_need).max(0.0));
        let redeposited = excess + unspent_dividends;
        assets.taxable += redeposited;
        assets.grow(profile.market.retirement_return);

        let taxes = YearTaxes::assess(&guaranteed, rmd, &draws, status, deduction);
        let estimated_tax = taxes.total();
        let gross_income = guaranteed.total() + rmd + draws.cash;
        let total_assets = assets.total();

        if mark_depletion(&mut depletion_age, age, total_assets) {
            warn!(age, "assets depleted");
        }
        debug!(
            age,
            gross_need,
            required,
            rmd,
            sepp = draws.sepp,
            redeposited,
            total_assets,
            "retirement year"
        );

        years.push(YearProjection {
            age,
            phase: Phase::for_age(age),
            retired: true,
            gross_need,
            required_draw: required,
            social_security: guaranteed.social_security,
            pension: guaranteed.pension,
            dividends: guaranteed.dividends,
            contributions: 0.0,
            rmd,
            sepp_withdrawal: draws.sepp,
            tax_deferred_withdrawal: rmd + draws.tax_deferred,
            tax_exempt_withdrawal: draws.tax_exempt,
            taxable_withdrawal: draws.taxable,
            penalty_withdrawal: draws.penalty_base,
            penalty_free_withdrawal: rmd + draws.cash - draws.penalty_base,
            redeposited,
            shortfall,
            ordinary_income: taxes.ordinary_income,
            capital_gains_income: taxes.capital_gains,
            taxable_guaranteed_income: taxes.taxable_benefit,
            estimated_tax,
            effective_tax_rate: effective_rate(estimated_tax, gross_income),
            tax_deferred: assets.tax_deferred,
            tax_exempt: assets.tax_exempt,
            tax_exempt_basis: assets.tax_exempt_basis,
            taxable: assets.taxable,
            medical: assets.medical,
            total_assets,
            depleted: depletion_age.is_some(),
        });

        age += 1.0;
    }

    let initial_withdrawal_rate = initial_draw.unwrap_or(0.0) / initial_assets.max(1e-9);

    LongevityResult {
        years,
        depletion_age,
        initial_withdrawal_rate,
        sustainable: initial_withdrawal_rate <= SUSTAINABLE_WITHDRAWAL_RATE,
        sepp_start_age: sepp.map(|program| program.start_age),
        sepp_end_age: sepp.map(|program| program.end_age),
        sepp_payment: sepp.map_or(0.0, |program| program.annual_payment),
    }
}

/// Records the first age at which assets run out. Later years never move it.
/// Medical balances count toward `total_assets` but no bucket draws them, so
/// a household holding one never depletes even while it runs a shortfall.
fn mark_depletion(depletion_age: &mut Option<f64>, age: f64, total_assets: f64) -> bool {
    if depletion_age.is_some() || total_assets > 0.0 {
        return false;
    }
    *depletion_age = Some(age);
    true
}

fn accumulation_year(age: f64, assets: &Assets, contributions: f64) -> YearProjection {
    YearProjection {
        age,
        phase: Phase::for_age(age),
        retired: false,
        gross_need: 0.0,
        required_draw: 0.0,
        social_security: 0.0,
        pension: 0.0,
        dividends: 0.0,
        contributions,
        rmd: 0.0,
        sepp_withdrawal: 0.0,
        tax_deferred_withdrawal: 0.0,
        tax_exempt_withdrawal: 0.0,
        taxable_withdrawal: 0.0,
        penalty_withdrawal: 0.0,
        penalty_free_withdrawal: 0.0,
        redeposited: 0.0,
        shortfall: 0.0,
        ordinary_income: 0.0,
        capital_gains_income: 0.0,
        taxable_guaranteed_income: 0.0,
        estimated_tax: 0.0,
        effective_tax_rate: 0.0,
        tax_deferred: assets.tax_deferred,
        tax_exempt: assets.tax_exempt,
        tax_exempt_basis: assets.tax_exempt_basis,
        taxable: assets.taxable,
        medical: assets.medical,
        total_assets: assets.total(),
        depleted: false,
    }
}
