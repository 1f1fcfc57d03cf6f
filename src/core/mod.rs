mod engine;
mod error;
mod estimator;
mod records;
mod summary;
mod types;

pub use engine::{
    Rng, UniformSource, derive_seed, project_records, run_projection, run_projection_with,
    sample_normal, validate_config, validate_parameters,
};
pub use error::ProjectionError;
pub use estimator::estimate_parameters;
pub use records::{format_month_label, next_month_label, parse_month_label, today};
pub use summary::{build_histogram, summarize};
pub use types::{
    DEFAULT_INFLATION_RATE_PERCENT, DEFAULT_MONTHS, DEFAULT_RUNS, DEFAULT_SCALE, DEFAULT_SEED,
    EstimatedParameters, HISTOGRAM_BINS, HistogramBin, HistoricalRecord, SimulationConfig,
    SimulationResult,
};
