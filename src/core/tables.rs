//! Read-only statutory tables (2024 US federal figures, simplified).

use super::types::FilingStatus;

pub const STANDARD_PHASE_AGE: f64 = 59.5;
pub const RULE_OF_55_AGE: f64 = 55.0;
pub const RMD_START_AGE: f64 = 73.0;
pub const EARLY_WITHDRAWAL_PENALTY_RATE: f64 = 0.10;
pub const SEPP_INTEREST_RATE: f64 = 0.05;
pub const SEPP_MIN_YEARS: f64 = 5.0;
/// Share of a taxable-account withdrawal treated as realized gain.
pub const CAPITAL_GAINS_FRACTION: f64 = 0.5;
pub const SUSTAINABLE_WITHDRAWAL_RATE: f64 = 0.05;

/// Used when an age falls outside the Uniform Lifetime table.
pub const RMD_FALLBACK_DIVISOR: f64 = 2.0;
/// Used when an age falls outside the Single Life table.
pub const LIFE_EXPECTANCY_FALLBACK: f64 = 30.0;

const AGE_65: f64 = 65.0;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bracket {
    /// Upper bound of taxable income for this rate; the last bracket is unbounded.
    pub ceiling: f64,
    pub rate: f64,
}

const fn bracket(ceiling: f64, rate: f64) -> Bracket {
    Bracket { ceiling, rate }
}

const SINGLE_ORDINARY: [Bracket; 7] = [
    bracket(11_600.0, 0.10),
    bracket(47_150.0, 0.12),
    bracket(100_525.0, 0.22),
    bracket(191_950.0, 0.24),
    bracket(243_725.0, 0.32),
    bracket(609_350.0, 0.35),
    bracket(f64::INFINITY, 0.37),
];

const JOINT_ORDINARY: [Bracket; 7] = [
    bracket(23_200.0, 0.10),
    bracket(94_300.0, 0.12),
    bracket(201_050.0, 0.22),
    bracket(383_900.0, 0.24),
    bracket(487_450.0, 0.32),
    bracket(731_200.0, 0.35),
    bracket(f64::INFINITY, 0.37),
];

const SEPARATE_ORDINARY: [Bracket; 7] = [
    bracket(11_600.0, 0.10),
    bracket(47_150.0, 0.12),
    bracket(100_525.0, 0.22),
    bracket(191_950.0, 0.24),
    bracket(243_725.0, 0.32),
    bracket(365_600.0, 0.35),
    bracket(f64::INFINITY, 0.37),
];

const HOUSEHOLD_ORDINARY: [Bracket; 7] = [
    bracket(16_550.0, 0.10),
    bracket(63_100.0, 0.12),
    bracket(100_500.0, 0.22),
    bracket(191_950.0, 0.24),
    bracket(243_700.0, 0.32),
    bracket(609_350.0, 0.35),
    bracket(f64::INFINITY, 0.37),
];

const SINGLE_GAINS: [Bracket; 3] = [
    bracket(47_025.0, 0.0),
    bracket(518_900.0, 0.15),
    bracket(f64::INFINITY, 0.20),
];

const JOINT_GAINS: [Bracket; 3] = [
    bracket(94_050.0, 0.0),
    bracket(583_750.0, 0.15),
    bracket(f64::INFINITY, 0.20),
];

const SEPARATE_GAINS: [Bracket; 3] = [
    bracket(47_025.0, 0.0),
    bracket(291_850.0, 0.15),
    bracket(f64::INFINITY, 0.20),
];

const HOUSEHOLD_GAINS: [Bracket; 3] = [
    bracket(63_000.0, 0.0),
    bracket(551_350.0, 0.15),
    bracket(f64::INFINITY, 0.20),
];

pub fn ordinary_brackets(status: FilingStatus) -> &'static [Bracket] {
    match status {
        FilingStatus::Single => &SINGLE_ORDINARY,
        FilingStatus::MarriedFilingJointly => &JOINT_ORDINARY,
        FilingStatus::MarriedFilingSeparately => &SEPARATE_ORDINARY,
        FilingStatus::HeadOfHousehold => &HOUSEHOLD_ORDINARY,
    }
}

pub fn capital_gains_brackets(status: FilingStatus) -> &'static [Bracket] {
    match status {
        FilingStatus::Single => &SINGLE_GAINS,
        FilingStatus::MarriedFilingJointly => &JOINT_GAINS,
        FilingStatus::MarriedFilingSeparately => &SEPARATE_GAINS,
        FilingStatus::HeadOfHousehold => &HOUSEHOLD_GAINS,
    }
}

pub fn base_standard_deduction(status: FilingStatus) -> f64 {
    match status {
        FilingStatus::Single | FilingStatus::MarriedFilingSeparately => 14_600.0,
        FilingStatus::MarriedFilingJointly => 29_200.0,
        FilingStatus::HeadOfHousehold => 21_900.0,
    }
}

/// Base deduction plus the additional amount once the primary filer reaches 65.
pub fn standard_deduction(status: FilingStatus, age: f64) -> f64 {
    let base = base_standard_deduction(status);
    if age < AGE_65 {
        return base;
    }
    let additional = match status {
        FilingStatus::Single | FilingStatus::HeadOfHousehold => 1_950.0,
        FilingStatus::MarriedFilingJointly | FilingStatus::MarriedFilingSeparately => 1_550.0,
    };
    base + additional
}

/// Top of the second-lowest ordinary bracket, the ceiling the standard phase fills to.
pub fn low_bracket_ceiling(status: FilingStatus) -> f64 {
    ordinary_brackets(status)
        .get(1)
        .map(|b| b.ceiling)
        .unwrap_or(0.0)
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SocialSecurityThresholds {
    pub first: f64,
    pub second: f64,
    /// Fixed amount added above the second threshold, capped at half the benefit.
    pub secondary_amount: f64,
}

pub fn social_security_thresholds(status: FilingStatus) -> SocialSecurityThresholds {
    match status {
        FilingStatus::Single | FilingStatus::HeadOfHousehold => SocialSecurityThresholds {
            first: 25_000.0,
            second: 34_000.0,
            secondary_amount: 4_500.0,
        },
        FilingStatus::MarriedFilingJointly => SocialSecurityThresholds {
            first: 32_000.0,
            second: 44_000.0,
            secondary_amount: 6_000.0,
        },
        FilingStatus::MarriedFilingSeparately => SocialSecurityThresholds {
            first: 0.0,
            second: 0.0,
            secondary_amount: 0.0,
        },
    }
}

const UNIFORM_LIFETIME_FIRST_AGE: u32 = 72;
const UNIFORM_LIFETIME: [f64; 49] = [
    27.4, 26.5, 25.5, 24.6, 23.7, 22.9, 22.0, 21.1, 20.2, 19.4, // 72-81
    18.5, 17.7, 16.8, 16.0, 15.2, 14.4, 13.7, 12.9, 12.2, 11.5, // 82-91
    10.8, 10.1, 9.5, 8.9, 8.4, 7.8, 7.3, 6.8, 6.4, 6.0, // 92-101
    5.6, 5.2, 4.9, 4.6, 4.3, 4.1, 3.9, 3.7, 3.5, 3.4, // 102-111
    3.3, 3.1, 3.0, 2.9, 2.8, 2.7, 2.5, 2.3, 2.0, // 112-120
];

const SINGLE_LIFE_FIRST_AGE: u32 = 30;
const SINGLE_LIFE: [f64; 41] = [
    55.3, 54.4, 53.4, 52.5, 51.5, 50.5, 49.6, 48.6, 47.7, 46.7, // 30-39
    45.7, 44.8, 43.8, 42.9, 41.9, 41.0, 40.0, 39.0, 38.1, 37.1, // 40-49
    36.2, 35.3, 34.3, 33.4, 32.5, 31.6, 30.6, 29.8, 28.9, 28.0, // 50-59
    27.1, 26.2, 25.4, 24.5, 23.7, 22.9, 22.0, 21.2, 20.4, 19.6, // 60-69
    18.8, // 70
];

fn lookup(table: &[f64], first_age: u32, age: f64, fallback: f64) -> f64 {
    if !age.is_finite() || age < 0.0 {
        return fallback;
    }
    (age.floor() as u32)
        .checked_sub(first_age)
        .and_then(|idx| table.get(idx as usize).copied())
        .unwrap_or(fallback)
}

pub fn rmd_divisor(age: f64) -> f64 {
    lookup(
        &UNIFORM_LIFETIME,
        UNIFORM_LIFETIME_FIRST_AGE,
        age,
        RMD_FALLBACK_DIVISOR,
    )
}

pub fn single_life_expectancy(age: f64) -> f64 {
    lookup(
        &SINGLE_LIFE,
        SINGLE_LIFE_FIRST_AGE,
        age,
        LIFE_EXPECTANCY_FALLBACK,
    )
}
