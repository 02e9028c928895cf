use axum::{
    Router,
    extract::{Json, Query},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::core::{
    Assets, Contributions, FilingStatus, IncomeProfile, LongevityResult, MarketAssumptions,
    Profile, RetirementPlan, StrategyResult, plan, simulate_longevity, solve_strategy,
};

const MAX_AGE: f64 = 120.0;

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("{flag} must be a finite number")]
    NotFinite { flag: &'static str },
    #[error("{flag} must be >= 0")]
    Negative { flag: &'static str },
    #[error("{flag} must be between {min} and {max}")]
    OutOfRange {
        flag: &'static str,
        min: f64,
        max: f64,
    },
    #[error("{flag} must be > -100")]
    RateTooLow { flag: &'static str },
    #[error("--tax-exempt-basis must not exceed --tax-exempt")]
    BasisExceedsBalance,
    #[error("--retirement-age must be >= --current-age")]
    RetirementBeforeCurrent,
    #[error("--horizon-age must be >= --retirement-age")]
    HorizonBeforeRetirement,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Usage(#[from] clap::Error),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliFilingStatus {
    Single,
    MarriedFilingJointly,
    MarriedFilingSeparately,
    HeadOfHousehold,
}

impl From<CliFilingStatus> for FilingStatus {
    fn from(value: CliFilingStatus) -> Self {
        match value {
            CliFilingStatus::Single => FilingStatus::Single,
            CliFilingStatus::MarriedFilingJointly => FilingStatus::MarriedFilingJointly,
            CliFilingStatus::MarriedFilingSeparately => FilingStatus::MarriedFilingSeparately,
            CliFilingStatus::HeadOfHousehold => FilingStatus::HeadOfHousehold,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Report {
    Strategy,
    Longevity,
    Plan,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiFilingStatus {
    Single,
    #[serde(alias = "marriedFilingJointly", alias = "married_filing_jointly", alias = "mfj")]
    MarriedFilingJointly,
    #[serde(
        alias = "marriedFilingSeparately",
        alias = "married_filing_separately",
        alias = "mfs"
    )]
    MarriedFilingSeparately,
    #[serde(alias = "headOfHousehold", alias = "head_of_household", alias = "hoh")]
    HeadOfHousehold,
}

impl From<ApiFilingStatus> for CliFilingStatus {
    fn from(value: ApiFilingStatus) -> Self {
        match value {
            ApiFilingStatus::Single => CliFilingStatus::Single,
            ApiFilingStatus::MarriedFilingJointly => CliFilingStatus::MarriedFilingJointly,
            ApiFilingStatus::MarriedFilingSeparately => CliFilingStatus::MarriedFilingSeparately,
            ApiFilingStatus::HeadOfHousehold => CliFilingStatus::HeadOfHousehold,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProfilePayload {
    current_age: Option<f64>,
    retirement_age: Option<f64>,
    horizon_age: Option<f64>,
    filing_status: Option<ApiFilingStatus>,

    spending_need: Option<f64>,
    spending_is_real: Option<bool>,

    tax_deferred: Option<f64>,
    tax_exempt: Option<f64>,
    tax_exempt_basis: Option<f64>,
    taxable: Option<f64>,
    medical: Option<f64>,

    guaranteed_income: Option<f64>,
    claim_age: Option<f64>,
    pension: Option<f64>,
    dividend_yield: Option<f64>,
    qualified_dividend_ratio: Option<f64>,

    accumulation_inflation: Option<f64>,
    accumulation_return: Option<f64>,
    retirement_inflation: Option<f64>,
    retirement_return: Option<f64>,

    tax_deferred_contribution: Option<f64>,
    tax_exempt_contribution: Option<f64>,
    taxable_contribution: Option<f64>,
    medical_contribution: Option<f64>,
}

#[derive(Parser, Debug)]
#[command(
    name = "drawdown",
    about = "Tax-aware retirement withdrawal planner (strategy solver + longevity projection)"
)]
struct Cli {
    #[arg(long, value_enum, default_value_t = Report::Plan)]
    report: Report,
    #[arg(long)]
    current_age: f64,
    #[arg(long, help = "Age at which withdrawals start; defaults to current-age")]
    retirement_age: Option<f64>,
    #[arg(long, default_value_t = 100.0)]
    horizon_age: f64,
    #[arg(long, value_enum, default_value_t = CliFilingStatus::Single)]
    filing_status: CliFilingStatus,
    #[arg(long, help = "Annual after-tax spending need")]
    spending_need: f64,
    #[arg(
        long,
        help = "Treat spending-need as nominal at retirement instead of today's money"
    )]
    nominal_spending: bool,
    #[arg(long, default_value_t = 0.0)]
    tax_deferred: f64,
    #[arg(long, default_value_t = 0.0)]
    tax_exempt: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Contribution basis inside the tax-exempt balance"
    )]
    tax_exempt_basis: f64,
    #[arg(long, default_value_t = 0.0)]
    taxable: f64,
    #[arg(long, default_value_t = 0.0)]
    medical: f64,
    #[arg(long, default_value_t = 0.0, help = "Annual Social-Security-like benefit")]
    guaranteed_income: f64,
    #[arg(long, default_value_t = 67.0)]
    claim_age: f64,
    #[arg(long, default_value_t = 0.0)]
    pension: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Dividend yield of the taxable account in percent"
    )]
    dividend_yield: f64,
    #[arg(
        long,
        default_value_t = 100.0,
        help = "Share of dividends that are qualified, in percent"
    )]
    qualified_dividend_ratio: f64,
    #[arg(long, default_value_t = 3.0, help = "Inflation before retirement in percent")]
    accumulation_inflation: f64,
    #[arg(long, default_value_t = 5.0, help = "Annual return before retirement in percent")]
    accumulation_return: f64,
    #[arg(long, default_value_t = 3.0, help = "Inflation during retirement in percent")]
    retirement_inflation: f64,
    #[arg(long, default_value_t = 5.0, help = "Annual return during retirement in percent")]
    retirement_return: f64,
    #[arg(long, default_value_t = 0.0)]
    tax_deferred_contribution: f64,
    #[arg(long, default_value_t = 0.0)]
    tax_exempt_contribution: f64,
    #[arg(long, default_value_t = 0.0)]
    taxable_contribution: f64,
    #[arg(long, default_value_t = 0.0)]
    medical_contribution: f64,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ReportResponse {
    Strategy(Box<StrategyResult>),
    Longevity(Box<LongevityResult>),
    Plan(Box<RetirementPlan>),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn finite(flag: &'static str, value: f64) -> Result<f64, InputError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(InputError::NotFinite { flag })
    }
}

fn non_negative(flag: &'static str, value: f64) -> Result<f64, InputError> {
    if finite(flag, value)? < 0.0 {
        return Err(InputError::Negative { flag });
    }
    Ok(value)
}

fn in_range(flag: &'static str, value: f64, min: f64, max: f64) -> Result<f64, InputError> {
    if !(min..=max).contains(&finite(flag, value)?) {
        return Err(InputError::OutOfRange { flag, min, max });
    }
    Ok(value)
}

fn percent_of(flag: &'static str, value: f64, max: f64) -> Result<f64, InputError> {
    Ok(in_range(flag, value, 0.0, max)? / 100.0)
}

fn rate(flag: &'static str, value: f64) -> Result<f64, InputError> {
    if finite(flag, value)? <= -100.0 {
        return Err(InputError::RateTooLow { flag });
    }
    Ok(value / 100.0)
}

fn build_inputs(cli: Cli) -> Result<Profile, InputError> {
    let current_age = in_range("--current-age", cli.current_age, 0.0, MAX_AGE)?;
    let retirement_age = in_range(
        "--retirement-age",
        cli.retirement_age.unwrap_or(current_age),
        0.0,
        MAX_AGE,
    )?;
    if retirement_age < current_age {
        return Err(InputError::RetirementBeforeCurrent);
    }
    let horizon_age = in_range("--horizon-age", cli.horizon_age, 0.0, MAX_AGE)?;
    if horizon_age < retirement_age {
        return Err(InputError::HorizonBeforeRetirement);
    }

    let assets = Assets {
        tax_deferred: non_negative("--tax-deferred", cli.tax_deferred)?,
        tax_exempt: non_negative("--tax-exempt", cli.tax_exempt)?,
        tax_exempt_basis: non_negative("--tax-exempt-basis", cli.tax_exempt_basis)?,
        taxable: non_negative("--taxable", cli.taxable)?,
        medical: non_negative("--medical", cli.medical)?,
    };
    if assets.tax_exempt_basis > assets.tax_exempt {
        return Err(InputError::BasisExceedsBalance);
    }

    Ok(Profile {
        current_age,
        retirement_age,
        horizon_age,
        filing_status: cli.filing_status.into(),
        spending_need: non_negative("--spending-need", cli.spending_need)?,
        spending_is_real: !cli.nominal_spending,
        assets,
        income: IncomeProfile {
            guaranteed_income: non_negative("--guaranteed-income", cli.guaranteed_income)?,
            claim_age: in_range("--claim-age", cli.claim_age, 0.0, MAX_AGE)?,
            pension: non_negative("--pension", cli.pension)?,
            dividend_yield: percent_of("--dividend-yield", cli.dividend_yield, 100.0)?,
            qualified_dividend_ratio: percent_of(
                "--qualified-dividend-ratio",
                cli.qualified_dividend_ratio,
                100.0,
            )?,
        },
        market: MarketAssumptions {
            accumulation_inflation: rate("--accumulation-inflation", cli.accumulation_inflation)?,
            accumulation_return: rate("--accumulation-return", cli.accumulation_return)?,
            retirement_inflation: rate("--retirement-inflation", cli.retirement_inflation)?,
            retirement_return: rate("--retirement-return", cli.retirement_return)?,
        },
        contributions: Contributions {
            tax_deferred: non_negative("--tax-deferred-contribution", cli.tax_deferred_contribution)?,
            tax_exempt: non_negative("--tax-exempt-contribution", cli.tax_exempt_contribution)?,
            taxable: non_negative("--taxable-contribution", cli.taxable_contribution)?,
            medical: non_negative("--medical-contribution", cli.medical_contribution)?,
        },
    })
}

fn run_report(profile: &Profile, report: Report) -> ReportResponse {
    match report {
        Report::Strategy => ReportResponse::Strategy(Box::new(solve_strategy(profile))),
        Report::Longevity => {
            let strategy = solve_strategy(profile);
            ReportResponse::Longevity(Box::new(simulate_longevity(profile, &strategy)))
        }
        Report::Plan => ReportResponse::Plan(Box::new(plan(profile))),
    }
}

/// Parses command-line arguments and returns the requested report as pretty JSON.
pub fn run_cli<I, T>(args: I) -> Result<String, RunError>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = Cli::try_parse_from(args)?;
    let report = cli.report;
    let profile = build_inputs(cli)?;
    Ok(serde_json::to_string_pretty(&run_report(&profile, report))?)
}

/// Installs the stderr log subscriber. `RUST_LOG` overrides the default level.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("drawdown=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/strategy",
            get(strategy_get_handler).post(strategy_post_handler),
        )
        .route(
            "/api/longevity",
            get(longevity_get_handler).post(longevity_post_handler),
        )
        .route("/api/plan", get(plan_get_handler).post(plan_post_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "drawdown HTTP API listening");
    info!("local access: http://127.0.0.1:{port}/api/plan");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn strategy_get_handler(Query(payload): Query<ProfilePayload>) -> Response {
    report_response(payload, Report::Strategy)
}

async fn strategy_post_handler(Json(payload): Json<ProfilePayload>) -> Response {
    report_response(payload, Report::Strategy)
}

async fn longevity_get_handler(Query(payload): Query<ProfilePayload>) -> Response {
    report_response(payload, Report::Longevity)
}

async fn longevity_post_handler(Json(payload): Json<ProfilePayload>) -> Response {
    report_response(payload, Report::Longevity)
}

async fn plan_get_handler(Query(payload): Query<ProfilePayload>) -> Response {
    report_response(payload, Report::Plan)
}

async fn plan_post_handler(Json(payload): Json<ProfilePayload>) -> Response {
    report_response(payload, Report::Plan)
}

fn report_response(payload: ProfilePayload, report: Report) -> Response {
    let profile = match profile_from_payload(payload) {
        Ok(profile) => profile,
        Err(err) => {
            debug!(%err, "rejected request");
            return error_response(StatusCode::BAD_REQUEST, &err.to_string());
        }
    };
    debug!(?report, age = profile.current_age, "running report");
    json_response(StatusCode::OK, run_report(&profile, report))
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn profile_from_payload(payload: ProfilePayload) -> Result<Profile, InputError> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if payload.retirement_age.is_some() {
        cli.retirement_age = payload.retirement_age;
    }
    if let Some(v) = payload.horizon_age {
        cli.horizon_age = v;
    }
    if let Some(v) = payload.filing_status {
        cli.filing_status = v.into();
    }
    if let Some(v) = payload.spending_need {
        cli.spending_need = v;
    }
    if let Some(v) = payload.spending_is_real {
        cli.nominal_spending = !v;
    }

    if let Some(v) = payload.tax_deferred {
        cli.tax_deferred = v;
    }
    if let Some(v) = payload.tax_exempt {
        cli.tax_exempt = v;
    }
    if let Some(v) = payload.tax_exempt_basis {
        cli.tax_exempt_basis = v;
    }
    if let Some(v) = payload.taxable {
        cli.taxable = v;
    }
    if let Some(v) = payload.medical {
        cli.medical = v;
    }

    if let Some(v) = payload.guaranteed_income {
        cli.guaranteed_income = v;
    }
    if let Some(v) = payload.claim_age {
        cli.claim_age = v;
    }
    if let Some(v) = payload.pension {
        cli.pension = v;
    }
    if let Some(v) = payload.dividend_yield {
        cli.dividend_yield = v;
    }
    if let Some(v) = payload.qualified_dividend_ratio {
        cli.qualified_dividend_ratio = v;
    }

    if let Some(v) = payload.accumulation_inflation {
        cli.accumulation_inflation = v;
    }
    if let Some(v) = payload.accumulation_return {
        cli.accumulation_return = v;
    }
    if let Some(v) = payload.retirement_inflation {
        cli.retirement_inflation = v;
    }
    if let Some(v) = payload.retirement_return {
        cli.retirement_return = v;
    }

    if let Some(v) = payload.tax_deferred_contribution {
        cli.tax_deferred_contribution = v;
    }
    if let Some(v) = payload.tax_exempt_contribution {
        cli.tax_exempt_contribution = v;
    }
    if let Some(v) = payload.taxable_contribution {
        cli.taxable_contribution = v;
    }
    if let Some(v) = payload.medical_contribution {
        cli.medical_contribution = v;
    }

    build_inputs(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        report: Report::Plan,
        current_age: 67.0,
        retirement_age: None,
        horizon_age: 100.0,
        filing_status: CliFilingStatus::Single,
        spending_need: 60_000.0,
        nominal_spending: false,
        tax_deferred: 500_000.0,
        tax_exempt: 0.0,
        tax_exempt_basis: 0.0,
        taxable: 150_000.0,
        medical: 0.0,
        guaranteed_income: 30_000.0,
        claim_age: 67.0,
        pension: 0.0,
        dividend_yield: 0.0,
        qualified_dividend_ratio: 100.0,
        accumulation_inflation: 3.0,
        accumulation_return: 5.0,
        retirement_inflation: 3.0,
        retirement_return: 5.0,
        tax_deferred_contribution: 0.0,
        tax_exempt_contribution: 0.0,
        taxable_contribution: 0.0,
        medical_contribution: 0.0,
    }
}
