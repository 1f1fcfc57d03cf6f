use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    DEFAULT_INFLATION_RATE_PERCENT, DEFAULT_MONTHS, DEFAULT_RUNS, DEFAULT_SCALE, DEFAULT_SEED,
    EstimatedParameters, HistoricalRecord, SimulationConfig, SimulationResult, next_month_label,
    project_records, today,
};

const HISTOGRAM_BAR_WIDTH: usize = 40;
const MAX_RUNS: usize = 1_000_000;
const MAX_MONTHS: u32 = 1_200;

#[derive(Parser, Debug)]
#[command(
    name = "monlosim",
    about = "Monte Carlo projection of net worth from monthly income/expense history"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a projection over a JSON file of monthly records
    Project(ProjectArgs),
    /// Serve the JSON HTTP API
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug)]
pub struct ProjectArgs {
    #[arg(
        long,
        help = "JSON array of {\"monthYear\", \"income\", \"expenses\"} records"
    )]
    pub records: PathBuf,
    #[arg(long, help = "Print the full response as JSON")]
    pub json: bool,
    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SettingsArgs {
    #[arg(
        long,
        default_value_t = 0.0,
        allow_negative_numbers = true,
        help = "Starting wealth, in currency divided by --scale"
    )]
    pub starting_wealth: f64,
    #[arg(
        long,
        default_value_t = DEFAULT_INFLATION_RATE_PERCENT,
        allow_negative_numbers = true,
        help = "Inflation rate in percent applied to sampled expenses"
    )]
    pub inflation_rate: f64,
    #[arg(long, default_value_t = DEFAULT_MONTHS)]
    pub months: u32,
    #[arg(long, default_value_t = DEFAULT_RUNS)]
    pub runs: usize,
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,
    #[arg(
        long,
        default_value_t = DEFAULT_SCALE,
        help = "Divisor applied to record amounts, 1000000 expresses them in millions"
    )]
    pub scale: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ProjectionSettings {
    config: SimulationConfig,
    scale: f64,
}

#[derive(Debug)]
struct ApiRequest {
    records: Vec<HistoricalRecord>,
    settings: ProjectionSettings,
    include_results: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    records: Option<Vec<HistoricalRecord>>,
    records_json: Option<String>,
    starting_wealth: Option<f64>,
    inflation_rate: Option<f64>,
    months: Option<u32>,
    runs: Option<usize>,
    seed: Option<u64>,
    scale: Option<f64>,
    include_results: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct NextMonthQuery {
    after: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NextMonthResponse {
    month_year: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistogramBinResponse {
    bin_start: f64,
    density: f64,
    label: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    parameters: EstimatedParameters,
    starting_wealth: f64,
    inflation_rate: f64,
    months: u32,
    runs: usize,
    seed: u64,
    scale: f64,
    mean: f64,
    median: f64,
    p10: f64,
    p90: f64,
    min: f64,
    max: f64,
    histogram: Vec<HistogramBinResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<Vec<f64>>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_settings(args: &SettingsArgs) -> Result<ProjectionSettings, String> {
    if args.runs == 0 {
        return Err("--runs must be > 0".to_string());
    }

    if args.runs > MAX_RUNS {
        return Err(format!("--runs must be <= {MAX_RUNS}"));
    }

    if args.months > MAX_MONTHS {
        return Err(format!("--months must be <= {MAX_MONTHS}"));
    }

    if !args.scale.is_finite() || args.scale <= 0.0 {
        return Err("--scale must be > 0".to_string());
    }

    if !args.starting_wealth.is_finite() {
        return Err("--starting-wealth must be a finite number".to_string());
    }

    if !args.inflation_rate.is_finite() || args.inflation_rate <= -100.0 {
        return Err("--inflation-rate must be a finite number > -100".to_string());
    }

    Ok(ProjectionSettings {
        config: SimulationConfig {
            starting_wealth: args.starting_wealth,
            inflation_rate_percent: args.inflation_rate,
            months: args.months,
            runs: args.runs,
            seed: args.seed,
        },
        scale: args.scale,
    })
}

fn load_records(path: &Path) -> Result<Vec<HistoricalRecord>, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read records file {}: {e}", path.display()))?;
    serde_json::from_str::<Vec<HistoricalRecord>>(&raw)
        .map_err(|e| format!("Invalid records JSON in {}: {e}", path.display()))
}

/// Runs the `project` subcommand and returns the text to print.
pub fn run_project_command(args: ProjectArgs) -> Result<String, String> {
    let settings = build_settings(&args.settings)?;
    let records = load_records(&args.records)?;
    info!(
        path = %args.records.display(),
        records = records.len(),
        "loaded historical records"
    );

    let (params, result) =
        project_records(&records, settings.scale, &settings.config).map_err(|e| e.to_string())?;

    if args.json {
        let response = build_simulate_response(&settings, &params, &result, false);
        serde_json::to_string_pretty(&response).map_err(|e| format!("Failed to encode JSON: {e}"))
    } else {
        Ok(format_report(&settings, &params, &result))
    }
}

fn format_report(
    settings: &ProjectionSettings,
    params: &EstimatedParameters,
    result: &SimulationResult,
) -> String {
    let config = &settings.config;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Final wealth after {} months over {} runs (amounts / {})",
        config.months, config.runs, settings.scale
    );
    let _ = writeln!(
        out,
        "Income     avg {:>12.4}  std {:>12.4}",
        params.income_avg, params.income_std
    );
    let _ = writeln!(
        out,
        "Expenses   avg {:>12.4}  std {:>12.4}",
        params.expense_avg, params.expense_std
    );
    let _ = writeln!(out, "Mean       {:>12.4}", result.mean);
    let _ = writeln!(out, "Median     {:>12.4}", result.median);
    let _ = writeln!(out, "P10        {:>12.4}", result.p10);
    let _ = writeln!(out, "P90        {:>12.4}", result.p90);
    let _ = writeln!(out, "Histogram (bin start, density)");

    let peak = result
        .histogram
        .iter()
        .map(|b| b.density)
        .fold(0.0_f64, f64::max);
    for bin in &result.histogram {
        let width = if peak > 0.0 {
            ((bin.density / peak) * HISTOGRAM_BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        let _ = writeln!(
            out,
            "{:>12} {:>8.4} {}",
            bin.label(),
            bin.density,
            "#".repeat(width)
        );
    }
    out
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = build_router();
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "monlosim HTTP API listening");
    info!("local access: http://127.0.0.1:{port}/api/simulate");

    axum::serve(listener, app).await
}

fn build_router() -> Router {
    Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/next-month", get(next_month_handler))
        .fallback(not_found_handler)
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => {
            warn!(error = %msg, "rejected simulate request");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    let ApiRequest {
        records,
        settings,
        include_results,
    } = request;
    let outcome = tokio::task::spawn_blocking(move || {
        project_records(&records, settings.scale, &settings.config)
    })
    .await;

    match outcome {
        Ok(Ok((params, result))) => json_response(
            StatusCode::OK,
            build_simulate_response(&settings, &params, &result, include_results),
        ),
        Ok(Err(e)) => {
            warn!(error = %e, "projection rejected");
            error_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
        Err(e) => {
            warn!(error = %e, "projection task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Projection failed")
        }
    }
}

async fn next_month_handler(Query(query): Query<NextMonthQuery>) -> Response {
    match next_month_label(query.after.as_deref(), today()) {
        Ok(month_year) => json_response(StatusCode::OK, NextMonthResponse { month_year }),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
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

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: SimulatePayload) -> Result<ApiRequest, String> {
    let mut args = default_args_for_api();

    if let Some(v) = payload.starting_wealth {
        args.starting_wealth = v;
    }
    if let Some(v) = payload.inflation_rate {
        args.inflation_rate = v;
    }
    if let Some(v) = payload.months {
        args.months = v;
    }
    if let Some(v) = payload.runs {
        args.runs = v;
    }
    if let Some(v) = payload.seed {
        args.seed = v;
    }
    if let Some(v) = payload.scale {
        args.scale = v;
    }

    let settings = build_settings(&args).map_err(|e| {
        e.replace("--starting-wealth", "startingWealth")
            .replace("--inflation-rate", "inflationRate")
            .replace("--runs", "runs")
            .replace("--months", "months")
            .replace("--scale", "scale")
    })?;

    let records = match (payload.records, payload.records_json) {
        (Some(records), _) => records,
        (None, Some(raw)) => serde_json::from_str::<Vec<HistoricalRecord>>(&raw)
            .map_err(|e| format!("Invalid recordsJson: {e}"))?,
        (None, None) => return Err("records are required".to_string()),
    };

    Ok(ApiRequest {
        records,
        settings,
        include_results: payload.include_results.unwrap_or(false),
    })
}

fn default_args_for_api() -> SettingsArgs {
    SettingsArgs {
        starting_wealth: 0.0,
        inflation_rate: DEFAULT_INFLATION_RATE_PERCENT,
        months: DEFAULT_MONTHS,
        runs: DEFAULT_RUNS,
        seed: DEFAULT_SEED,
        scale: DEFAULT_SCALE,
    }
}

fn build_simulate_response(
    settings: &ProjectionSettings,
    params: &EstimatedParameters,
    result: &SimulationResult,
    include_results: bool,
) -> SimulateResponse {
    let config = &settings.config;
    SimulateResponse {
        parameters: *params,
        starting_wealth: config.starting_wealth,
        inflation_rate: config.inflation_rate_percent,
        months: config.months,
        runs: config.runs,
        seed: config.seed,
        scale: settings.scale,
        mean: result.mean,
        median: result.median,
        p10: result.p10,
        p90: result.p90,
        min: result.min,
        max: result.max,
        histogram: result
            .histogram
            .iter()
            .map(|bin| HistogramBinResponse {
                bin_start: bin.bin_start,
                density: bin.density,
                label: bin.label(),
            })
            .collect(),
        results: include_results.then(|| result.results.clone()),
    }
}
