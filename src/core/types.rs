use serde::{Deserialize, Serialize};

pub const DEFAULT_MONTHS: u32 = 12;
pub const DEFAULT_RUNS: usize = 100_000;
pub const DEFAULT_INFLATION_RATE_PERCENT: f64 = 0.83;
pub const DEFAULT_SEED: u64 = 42;
/// Currency is divided by this before estimation, so wealth is in millions.
pub const DEFAULT_SCALE: f64 = 1_000_000.0;
pub const HISTOGRAM_BINS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub month_year: String,
    pub income: f64,
    pub expenses: f64,
}

impl HistoricalRecord {
    pub fn new(month_year: impl Into<String>, income: f64, expenses: f64) -> Self {
        Self {
            id: None,
            month_year: month_year.into(),
            income,
            expenses,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimatedParameters {
    pub income_avg: f64,
    pub income_std: f64,
    pub expense_avg: f64,
    pub expense_std: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    pub starting_wealth: f64,
    pub inflation_rate_percent: f64,
    pub months: u32,
    pub runs: usize,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            starting_wealth: 0.0,
            inflation_rate_percent: DEFAULT_INFLATION_RATE_PERCENT,
            months: DEFAULT_MONTHS,
            runs: DEFAULT_RUNS,
            seed: DEFAULT_SEED,
        }
    }
}

impl SimulationConfig {
    /// Multiplier applied to every sampled expense.
    pub fn inflation_factor(&self) -> f64 {
        1.0 + self.inflation_rate_percent / 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBin {
    pub bin_start: f64,
    pub density: f64,
}

impl HistogramBin {
    pub fn label(&self) -> String {
        format!("{:.2}", self.bin_start)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub results: Vec<f64>,
    pub mean: f64,
    pub median: f64,
    pub p10: f64,
    pub p90: f64,
    pub min: f64,
    pub max: f64,
    pub histogram: Vec<HistogramBin>,
}

impl SimulationResult {
    pub fn runs(&self) -> usize {
        self.results.len()
    }
}
