use super::sepp::sepp_payment;
use super::tables::{RULE_OF_55_AGE, low_bracket_ceiling};
use super::types::{Assets, BucketKind, FilingStatus, Phase, WithdrawalBucket};

/// Ordered withdrawal buckets for the given age. Under 55 a SEPP payment is
/// computed fresh from the current tax-deferred balance.
pub fn withdrawal_order(
    age: f64,
    assets: &Assets,
    status: FilingStatus,
    standard_deduction: f64,
) -> Vec<WithdrawalBucket> {
    let payment = if age < RULE_OF_55_AGE {
        sepp_payment(assets.tax_deferred, age)
    } else {
        0.0
    };
    withdrawal_order_with_sepp(age, assets, status, standard_deduction, payment)
}

/// Same ordering with the SEPP payment supplied by the caller, so a running
/// program keeps its locked-in amount past 55. A zero payment means no program.
pub fn withdrawal_order_with_sepp(
    age: f64,
    assets: &Assets,
    status: FilingStatus,
    standard_deduction: f64,
    sepp_payment: f64,
) -> Vec<WithdrawalBucket> {
    let assets = assets.sanitized();
    let mut buckets = match Phase::for_age(age) {
        Phase::Early => early_phase(age, &assets, sepp_payment),
        Phase::Standard => standard_phase(&assets, status, standard_deduction),
    };
    buckets.retain(|b| b.limit > 0.0);
    buckets
}

fn early_phase(age: f64, assets: &Assets, sepp_payment: f64) -> Vec<WithdrawalBucket> {
    let mut buckets = Vec::with_capacity(6);
    let mut tax_deferred_left = assets.tax_deferred;

    if sepp_payment > 0.0 && tax_deferred_left > 0.0 {
        let payment = sepp_payment.min(tax_deferred_left);
        buckets.push(WithdrawalBucket::new(BucketKind::Sepp, payment));
        tax_deferred_left -= payment;
    }

    buckets.push(WithdrawalBucket::new(BucketKind::BridgeTaxable, assets.taxable));

    let basis = assets.tax_exempt_basis.min(assets.tax_exempt);
    buckets.push(WithdrawalBucket::new(BucketKind::ContributionBasis, basis));

    if age >= RULE_OF_55_AGE {
        buckets.push(WithdrawalBucket::new(BucketKind::Rule55, tax_deferred_left));
        tax_deferred_left = 0.0;
    }

    buckets.push(WithdrawalBucket::new(
        BucketKind::PenaltyTaxDeferred,
        tax_deferred_left,
    ));
    buckets.push(WithdrawalBucket::new(
        BucketKind::PenaltyEarnings,
        assets.tax_exempt - basis,
    ));
    buckets
}

/// The bracket fill (deduction plus the top of the 12% band) is a heuristic that
/// keeps the low brackets for capital gains. It is not an optimal split.
fn standard_phase(
    assets: &Assets,
    status: FilingStatus,
    standard_deduction: f64,
) -> Vec<WithdrawalBucket> {
    let ceiling = standard_deduction.max(0.0) + low_bracket_ceiling(status);
    let fill = assets.tax_deferred.min(ceiling);
    vec![
        WithdrawalBucket::new(BucketKind::BracketFill, fill),
        WithdrawalBucket::new(BucketKind::HarvestTaxable, assets.taxable),
        WithdrawalBucket::new(
            BucketKind::TaxDeferredRemainder,
            assets.tax_deferred - fill,
        ),
        WithdrawalBucket::new(BucketKind::TaxExemptRemainder, assets.tax_exempt),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AccountSource, TaxTreatment};
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn full_assets() -> Assets {
        Assets {
            tax_deferred: 400_000.0,
            tax_exempt: 100_000.0,
            tax_exempt_basis: 40_000.0,
            taxable: 150_000.0,
            medical: 20_000.0,
        }
    }

    fn kinds(buckets: &[WithdrawalBucket]) -> Vec<BucketKind> {
        buckets.iter().map(|b| b.kind).collect()
    }

    #[test]
    fn early_phase_under_55_starts_with_mandatory_sepp() {
        let buckets = withdrawal_order(50.0, &full_assets(), FilingStatus::Single, 14_600.0);
        assert_eq!(
            kinds(&buckets),
            vec![
                BucketKind::Sepp,
                BucketKind::BridgeTaxable,
                BucketKind::ContributionBasis,
                BucketKind::PenaltyTaxDeferred,
                BucketKind::PenaltyEarnings,
            ]
        );
        let sepp = &buckets[0];
        assert!(sepp.mandatory);
        assert!(!sepp.penalty);
        assert_close(sepp.limit, sepp_payment(400_000.0, 50.0), 1e-9);
        assert_close(buckets[2].limit, 40_000.0, 1e-9);
        assert_close(buckets[3].limit, 400_000.0 - sepp.limit, 1e-6);
        assert_close(buckets[4].limit, 60_000.0, 1e-9);
        assert!(buckets[3].penalty && buckets[4].penalty);
        assert_eq!(buckets[4].treatment, TaxTreatment::Ordinary);
    }

    #[test]
    fn early_phase_from_55_uses_penalty_free_exception() {
        let buckets = withdrawal_order(56.0, &full_assets(), FilingStatus::Single, 14_600.0);
        assert_eq!(
            kinds(&buckets),
            vec![
                BucketKind::BridgeTaxable,
                BucketKind::ContributionBasis,
                BucketKind::Rule55,
                BucketKind::PenaltyEarnings,
            ]
        );
        let rule55 = &buckets[2];
        assert!(!rule55.penalty);
        assert_eq!(rule55.treatment, TaxTreatment::Ordinary);
        assert_close(rule55.limit, 400_000.0, 1e-9);
    }

    #[test]
    fn basis_bucket_is_bounded_by_balance() {
        let mut assets = full_assets();
        assets.tax_exempt = 10_000.0;
        assets.tax_exempt_basis = 25_000.0;
        let buckets = withdrawal_order(45.0, &assets, FilingStatus::Single, 14_600.0);
        let basis = buckets
            .iter()
            .find(|b| b.kind == BucketKind::ContributionBasis)
            .expect("basis bucket");
        assert_close(basis.limit, 10_000.0, 1e-9);
        assert!(!buckets.iter().any(|b| b.kind == BucketKind::PenaltyEarnings));
    }

    #[test]
    fn standard_phase_fills_low_brackets_first() {
        let buckets = withdrawal_order(67.0, &full_assets(), FilingStatus::Single, 16_550.0);
        assert_eq!(
            kinds(&buckets),
            vec![
                BucketKind::BracketFill,
                BucketKind::HarvestTaxable,
                BucketKind::TaxDeferredRemainder,
                BucketKind::TaxExemptRemainder,
            ]
        );
        assert_close(buckets[0].limit, 16_550.0 + 47_150.0, 1e-9);
        assert_close(buckets[2].limit, 400_000.0 - 63_700.0, 1e-9);
        assert_eq!(buckets[1].treatment, TaxTreatment::CapitalGains);
        assert_eq!(buckets[3].treatment, TaxTreatment::None);
        assert_eq!(buckets[3].source, AccountSource::TaxExempt);
        assert!(buckets.iter().all(|b| !b.penalty && !b.mandatory));
    }

    #[test]
    fn supplied_sepp_payment_overrides_fresh_calculation() {
        let buckets = withdrawal_order_with_sepp(
            52.0,
            &full_assets(),
            FilingStatus::Single,
            14_600.0,
            12_345.0,
        );
        assert_eq!(buckets[0].kind, BucketKind::Sepp);
        assert_close(buckets[0].limit, 12_345.0, 1e-9);
    }

    #[test]
    fn running_program_keeps_sepp_ahead_of_rule_55() {
        let buckets =
            withdrawal_order_with_sepp(57.0, &full_assets(), FilingStatus::Single, 14_600.0, 20_000.0);
        assert_eq!(
            kinds(&buckets),
            vec![
                BucketKind::Sepp,
                BucketKind::BridgeTaxable,
                BucketKind::ContributionBasis,
                BucketKind::Rule55,
                BucketKind::PenaltyEarnings,
            ]
        );
        assert_close(buckets[3].limit, 380_000.0, 1e-9);
    }

    #[test]
    fn zero_sepp_payment_drops_the_bucket() {
        let buckets =
            withdrawal_order_with_sepp(52.0, &full_assets(), FilingStatus::Single, 14_600.0, 0.0);
        assert!(!buckets.iter().any(|b| b.kind == BucketKind::Sepp));
    }

    #[test]
    fn phase_switches_exactly_at_59_5() {
        let before = withdrawal_order(59.49, &full_assets(), FilingStatus::Single, 14_600.0);
        let after = withdrawal_order(59.5, &full_assets(), FilingStatus::Single, 14_600.0);
        assert!(before.iter().all(|b| b.kind.phase() == Phase::Early));
        assert!(after.iter().all(|b| b.kind.phase() == Phase::Standard));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(128))]

        #[test]
        fn prop_bucket_kinds_never_cross_phases(
            age_tenths in 400u32..800,
            tax_deferred in 0u32..1_000_000,
            tax_exempt in 0u32..400_000,
            basis_share in 0u32..101,
            taxable in 0u32..400_000,
        ) {
            let age = age_tenths as f64 / 10.0;
            let tax_exempt = tax_exempt as f64;
            let assets = Assets {
                tax_deferred: tax_deferred as f64,
                tax_exempt,
                tax_exempt_basis: tax_exempt * basis_share as f64 / 100.0,
                taxable: taxable as f64,
                medical: 0.0,
            };
            let buckets = withdrawal_order(age, &assets, FilingStatus::Single, 14_600.0);
            let expected = Phase::for_age(age);
            for bucket in &buckets {
                prop_assert_eq!(bucket.kind.phase(), expected);
                prop_assert!(bucket.limit > 0.0);
            }
            let by_source = |source: AccountSource| -> f64 {
                buckets.iter().filter(|b| b.source == source).map(|b| b.limit).sum()
            };
            prop_assert!((by_source(AccountSource::TaxDeferred) - assets.tax_deferred).abs() < 1e-6);
            prop_assert!((by_source(AccountSource::TaxExempt) - assets.tax_exempt).abs() < 1e-6);
            prop_assert!((by_source(AccountSource::Taxable) - assets.taxable).abs() < 1e-6);
        }
    }
}
