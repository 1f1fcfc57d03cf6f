use std::f64::consts::PI;
use std::time::Instant;

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::info;

use super::error::ProjectionError;
use super::estimator::estimate_parameters;
use super::summary::summarize;
use super::types::{EstimatedParameters, HistoricalRecord, SimulationConfig, SimulationResult};

/// A stream of uniform variates in `[0, 1)`.
pub trait UniformSource {
    fn next_uniform(&mut self) -> f64;
}

impl<F> UniformSource for F
where
    F: FnMut() -> f64,
{
    fn next_uniform(&mut self) -> f64 {
        self()
    }
}

/// Runs `config.runs` trajectories, each with its own generator seeded from
/// `config.seed` and the trajectory index, then summarizes the outcomes.
pub fn run_projection(
    params: &EstimatedParameters,
    config: &SimulationConfig,
) -> Result<SimulationResult, ProjectionError> {
    let seed = config.seed;
    run_projection_with(params, config, move |trajectory| {
        Rng::new(derive_seed(seed, trajectory))
    })
}

/// Like [`run_projection`], but `make_source` supplies the random stream for
/// each trajectory index.
pub fn run_projection_with<S, F>(
    params: &EstimatedParameters,
    config: &SimulationConfig,
    make_source: F,
) -> Result<SimulationResult, ProjectionError>
where
    S: UniformSource,
    F: Fn(usize) -> S + Sync + Send,
{
    validate_config(config)?;
    validate_parameters(params)?;

    info!(
        runs = config.runs,
        months = config.months,
        starting_wealth = config.starting_wealth,
        inflation_rate_percent = config.inflation_rate_percent,
        "starting monte carlo projection"
    );
    let started = Instant::now();

    let outcomes = (0..config.runs)
        .into_par_iter()
        .map(|trajectory| {
            let mut source = make_source(trajectory);
            simulate_trajectory(params, config, &mut source)
        })
        .collect::<Vec<_>>();

    let result = summarize(outcomes);
    info!(
        runs = result.runs(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        mean = result.mean,
        median = result.median,
        p10 = result.p10,
        p90 = result.p90,
        "finished monte carlo projection"
    );
    Ok(result)
}

/// Estimates parameters from `records` and projects them in one call.
pub fn project_records(
    records: &[HistoricalRecord],
    scale: f64,
    config: &SimulationConfig,
) -> Result<(EstimatedParameters, SimulationResult), ProjectionError> {
    let params = estimate_parameters(records, scale)?;
    let result = run_projection(&params, config)?;
    Ok((params, result))
}

pub fn validate_config(config: &SimulationConfig) -> Result<(), ProjectionError> {
    if config.runs == 0 {
        return Err(ProjectionError::InvalidConfig(
            "runs must be > 0".to_string(),
        ));
    }
    if !config.starting_wealth.is_finite() {
        return Err(ProjectionError::InvalidConfig(
            "starting wealth must be finite".to_string(),
        ));
    }
    if !config.inflation_rate_percent.is_finite() {
        return Err(ProjectionError::InvalidConfig(
            "inflation rate must be finite".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_parameters(params: &EstimatedParameters) -> Result<(), ProjectionError> {
    for (label, avg, std) in [
        ("income", params.income_avg, params.income_std),
        ("expense", params.expense_avg, params.expense_std),
    ] {
        if !avg.is_finite() {
            return Err(ProjectionError::InvalidParameters(format!(
                "{label} average must be finite"
            )));
        }
        if !std.is_finite() || std < 0.0 {
            return Err(ProjectionError::InvalidParameters(format!(
                "{label} standard deviation must be finite and >= 0"
            )));
        }
    }
    Ok(())
}

fn simulate_trajectory<S: UniformSource + ?Sized>(
    params: &EstimatedParameters,
    config: &SimulationConfig,
    source: &mut S,
) -> f64 {
    let inflation_factor = config.inflation_factor();
    let mut wealth = config.starting_wealth;
    for _ in 0..config.months {
        let income = sample_normal(source, params.income_avg, params.income_std).max(0.0);
        let expense = (sample_normal(source, params.expense_avg, params.expense_std)
            * inflation_factor)
            .max(0.0);
        wealth += income - expense;
    }
    wealth
}

/// Box–Muller, cosine branch only. The sine variate is dropped so that every
/// draw consumes exactly two uniforms (plus any zero redraws).
pub fn sample_normal<S: UniformSource + ?Sized>(source: &mut S, mean: f64, std: f64) -> f64 {
    let u = draw_non_zero(source);
    let v = draw_non_zero(source);
    let z = (-2.0 * u.ln()).sqrt() * (2.0 * PI * v).cos();
    mean + std * z
}

// Loops until the source yields something other than exactly 0.
fn draw_non_zero<S: UniformSource + ?Sized>(source: &mut S) -> f64 {
    loop {
        let value = source.next_uniform();
        if value != 0.0 {
            return value;
        }
    }
}

pub fn derive_seed(base_seed: u64, trajectory: usize) -> u64 {
    splitmix64(splitmix64(base_seed) ^ trajectory as u64)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// xorshift64* generator.
#[derive(Debug, Clone)]
pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        // xorshift never leaves the all-zero state.
        let state = if seed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            seed
        };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }
}

impl UniformSource for Rng {
    fn next_uniform(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        (self.next_u64() >> 11) as f64 / DENOM
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::HISTOGRAM_BINS;
    use proptest::prelude::{any, prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-9;

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn deterministic_params(income_avg: f64, expense_avg: f64) -> EstimatedParameters {
        EstimatedParameters {
            income_avg,
            income_std: 0.0,
            expense_avg,
            expense_std: 0.0,
        }
    }

    fn sample_params() -> EstimatedParameters {
        EstimatedParameters {
            income_avg: 0.012,
            income_std: 0.003,
            expense_avg: 0.008,
            expense_std: 0.002,
        }
    }

    fn small_config(runs: usize) -> SimulationConfig {
        SimulationConfig {
            starting_wealth: 1.5,
            inflation_rate_percent: 0.83,
            months: 12,
            runs,
            seed: 7,
        }
    }

    struct ScriptedSource {
        values: Vec<f64>,
        cursor: usize,
    }

    impl ScriptedSource {
        fn new(values: Vec<f64>) -> Self {
            Self { values, cursor: 0 }
        }
    }

    impl UniformSource for ScriptedSource {
        fn next_uniform(&mut self) -> f64 {
            let value = self.values[self.cursor % self.values.len()];
            self.cursor += 1;
            value
        }
    }

    #[test]
    fn zero_volatility_converges_to_closed_form_outcome() {
        let config = SimulationConfig {
            starting_wealth: 0.0,
            inflation_rate_percent: 0.0,
            months: 12,
            runs: 500,
            seed: 1,
        };
        let result = run_projection(&deterministic_params(5.0, 3.0), &config).expect("valid");

        assert_eq!(result.results.len(), 500);
        assert!(result.results.iter().all(|&v| v == 24.0));
        assert_eq!(result.mean, 24.0);
        assert_eq!(result.median, 24.0);
        assert_eq!(result.p10, 24.0);
        assert_eq!(result.p90, 24.0);
        assert_eq!(result.histogram[0].density, 1.0);
    }

    #[test]
    fn negative_income_mean_is_clamped_to_zero() {
        let config = SimulationConfig {
            starting_wealth: 10.0,
            inflation_rate_percent: 0.0,
            months: 6,
            runs: 50,
            seed: 3,
        };
        let result = run_projection(&deterministic_params(-1000.0, 0.0), &config).expect("valid");
        assert!(result.results.iter().all(|&v| v == 10.0));

        let mut source = Rng::new(9);
        for _ in 0..100 {
            let income = sample_normal(&mut source, -1000.0, 0.0).max(0.0);
            assert_eq!(income, 0.0);
        }
    }

    #[test]
    fn negative_expense_mean_is_clamped_to_zero() {
        let config = SimulationConfig {
            starting_wealth: 0.0,
            inflation_rate_percent: 5.0,
            months: 4,
            runs: 20,
            seed: 3,
        };
        let result = run_projection(&deterministic_params(2.0, -50.0), &config).expect("valid");
        assert!(result.results.iter().all(|&v| v == 8.0));
    }

    #[test]
    fn inflation_scales_sampled_expenses() {
        let config = SimulationConfig {
            starting_wealth: 0.0,
            inflation_rate_percent: 10.0,
            months: 12,
            runs: 10,
            seed: 5,
        };
        let result = run_projection(&deterministic_params(0.0, 10.0), &config).expect("valid");
        for &v in &result.results {
            assert_approx_tol(v, -132.0, 1e-9);
        }
    }

    #[test]
    fn zero_months_returns_starting_wealth() {
        let mut config = small_config(25);
        config.months = 0;
        let result = run_projection(&sample_params(), &config).expect("valid");
        assert!(result.results.iter().all(|&v| v == 1.5));
    }

    #[test]
    fn single_run_histogram_is_well_defined() {
        let result = run_projection(&sample_params(), &small_config(1)).expect("valid");

        assert_eq!(result.results.len(), 1);
        assert_eq!(result.histogram.len(), HISTOGRAM_BINS);
        assert_eq!(result.histogram[0].density, 1.0);
        assert!(result.histogram.iter().all(|b| !b.density.is_nan()));
        assert!(result.histogram.iter().all(|b| !b.bin_start.is_nan()));
    }

    #[test]
    fn fixed_seed_reruns_are_identical() {
        let a = run_projection(&sample_params(), &small_config(2_000)).expect("valid");
        let b = run_projection(&sample_params(), &small_config(2_000)).expect("valid");
        assert_eq!(a, b);

        let mut other_seed = small_config(2_000);
        other_seed.seed = 8;
        let c = run_projection(&sample_params(), &other_seed).expect("valid");
        assert_ne!(a.results, c.results);
    }

    #[test]
    fn default_sources_match_explicit_per_trajectory_generators() {
        let config = small_config(300);
        let implicit = run_projection(&sample_params(), &config).expect("valid");
        let explicit = run_projection_with(&sample_params(), &config, |trajectory| {
            Rng::new(derive_seed(config.seed, trajectory))
        })
        .expect("valid");
        assert_eq!(implicit, explicit);
    }

    #[test]
    fn injected_closure_source_drives_sampling() {
        let config = SimulationConfig {
            starting_wealth: 0.0,
            inflation_rate_percent: 0.0,
            months: 1,
            runs: 3,
            seed: 0,
        };
        let params = EstimatedParameters {
            income_avg: 10.0,
            income_std: 1.0,
            expense_avg: 0.0,
            expense_std: 0.0,
        };
        // u = e^-2, v = 1/2 gives z = -2 for the income draw.
        let result = run_projection_with(&params, &config, |_| {
            let mut calls = 0_u32;
            move || {
                calls += 1;
                if calls % 2 == 1 { (-2.0_f64).exp() } else { 0.5 }
            }
        })
        .expect("valid");
        for &v in &result.results {
            assert_approx_tol(v, 8.0, 1e-9);
        }
    }

    #[test]
    fn box_muller_redraws_exact_zero_uniforms() {
        let mut source = ScriptedSource::new(vec![0.0, 0.5, 0.0, 0.5]);
        let z = sample_normal(&mut source, 0.0, 1.0);

        assert_eq!(source.cursor, 4);
        assert_approx_tol(z, -(2.0 * 2.0_f64.ln()).sqrt(), EPS);
    }

    #[test]
    fn zero_std_returns_mean_exactly() {
        let mut source = Rng::new(11);
        for _ in 0..1_000 {
            assert_eq!(sample_normal(&mut source, 0.37, 0.0), 0.37);
        }
    }

    #[test]
    fn sample_normal_moments_match_standard_normal() {
        let mut source = Rng::new(2024);
        let n = 50_000;
        let draws = (0..n)
            .map(|_| sample_normal(&mut source, 0.0, 1.0))
            .collect::<Vec<_>>();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|z| (z - mean).powi(2)).sum::<f64>() / (n - 1) as f64;

        assert_approx_tol(mean, 0.0, 0.03);
        assert_approx_tol(var, 1.0, 0.05);
    }

    #[test]
    fn unclamped_projection_mean_tracks_expected_drift() {
        let params = EstimatedParameters {
            income_avg: 10.0,
            income_std: 1.0,
            expense_avg: 5.0,
            expense_std: 1.0,
        };
        let config = SimulationConfig {
            starting_wealth: 100.0,
            inflation_rate_percent: 0.0,
            months: 12,
            runs: 20_000,
            seed: 99,
        };
        let result = run_projection(&params, &config).expect("valid");

        assert_approx_tol(result.mean, 160.0, 0.5);
        assert_approx_tol(result.median, 160.0, 0.5);
        assert!(result.p10 < result.median && result.median < result.p90);
    }

    #[test]
    fn rng_uniforms_stay_in_unit_interval() {
        let mut rng = Rng::new(0);
        for _ in 0..10_000 {
            let u = rng.next_uniform();
            assert!((0.0..1.0).contains(&u), "uniform out of range: {u}");
        }
    }

    #[test]
    fn derive_seed_changes_per_trajectory_and_base() {
        let a = derive_seed(42, 0);
        let b = derive_seed(42, 1);
        let c = derive_seed(43, 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn invalid_config_is_rejected_before_sampling() {
        let mut config = small_config(0);
        let err = run_projection(&sample_params(), &config).expect_err("zero runs");
        assert_eq!(
            err,
            ProjectionError::InvalidConfig("runs must be > 0".to_string())
        );

        config.runs = 10;
        config.starting_wealth = f64::NAN;
        assert!(matches!(
            run_projection(&sample_params(), &config),
            Err(ProjectionError::InvalidConfig(_))
        ));

        config.starting_wealth = 0.0;
        config.inflation_rate_percent = f64::INFINITY;
        assert!(matches!(
            run_projection(&sample_params(), &config),
            Err(ProjectionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn non_finite_parameters_are_rejected() {
        let mut params = sample_params();
        params.income_std = f64::INFINITY;
        assert!(matches!(
            run_projection(&params, &small_config(10)),
            Err(ProjectionError::InvalidParameters(_))
        ));

        let mut params = sample_params();
        params.expense_std = -0.1;
        assert!(matches!(
            run_projection(&params, &small_config(10)),
            Err(ProjectionError::InvalidParameters(_))
        ));

        let mut params = sample_params();
        params.expense_avg = f64::NAN;
        assert!(matches!(
            run_projection(&params, &small_config(10)),
            Err(ProjectionError::InvalidParameters(_))
        ));
    }

    #[test]
    fn project_records_chains_estimation_and_projection() {
        let records = vec![
            HistoricalRecord::new("January 2024", 5_000_000.0, 3_000_000.0),
            HistoricalRecord::new("February 2024", 5_000_000.0, 3_000_000.0),
        ];
        let config = SimulationConfig {
            starting_wealth: 0.0,
            inflation_rate_percent: 0.0,
            months: 12,
            runs: 100,
            seed: 42,
        };
        let (params, result) = project_records(&records, 1_000_000.0, &config).expect("valid");

        assert_eq!(params.income_avg, 5.0);
        assert_eq!(params.expense_std, 0.0);
        assert!(result.results.iter().all(|&v| v == 24.0));
    }

    #[test]
    fn project_records_propagates_empty_history() {
        let err = project_records(&[], 1.0, &small_config(10)).expect_err("empty");
        assert_eq!(err, ProjectionError::InsufficientData);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(24))]

        #[test]
        fn prop_projection_outputs_are_sorted_finite_and_normalized(
            seed in any::<u64>(),
            runs in 1usize..600,
            months in 0u32..36,
            starting_wealth in -5_000i32..5_000,
            income_avg_bp in -500i32..5_000,
            income_std_bp in 0u32..2_000,
            expense_avg_bp in -500i32..5_000,
            expense_std_bp in 0u32..2_000,
            inflation_bp in -200i32..2_000
        ) {
            let params = EstimatedParameters {
                income_avg: income_avg_bp as f64 / 10_000.0,
                income_std: income_std_bp as f64 / 10_000.0,
                expense_avg: expense_avg_bp as f64 / 10_000.0,
                expense_std: expense_std_bp as f64 / 10_000.0,
            };
            let config = SimulationConfig {
                starting_wealth: starting_wealth as f64 / 1_000.0,
                inflation_rate_percent: inflation_bp as f64 / 100.0,
                months,
                runs,
                seed,
            };
            let result = run_projection(&params, &config).expect("valid config");

            prop_assert_eq!(result.results.len(), runs);
            prop_assert!(result.results.iter().all(|v| v.is_finite()));
            prop_assert!(result.results.windows(2).all(|w| w[0] <= w[1]));
            let total = result.histogram.iter().map(|b| b.density).sum::<f64>();
            prop_assert!((total - 1.0).abs() <= 1e-9);
            if runs >= 10 {
                prop_assert!(result.p10 <= result.median);
                prop_assert!(result.median <= result.p90);
            }
        }

        #[test]
        fn prop_income_never_contributes_negatively(
            seed in any::<u64>(),
            income_avg in -2_000i32..0,
            months in 1u32..24
        ) {
            let params = EstimatedParameters {
                income_avg: income_avg as f64,
                income_std: 1.0,
                expense_avg: 0.0,
                expense_std: 0.0,
            };
            let config = SimulationConfig {
                starting_wealth: 0.0,
                inflation_rate_percent: 0.0,
                months,
                runs: 64,
                seed,
            };
            let result = run_projection(&params, &config).expect("valid config");
            prop_assert!(result.results.iter().all(|&v| v >= 0.0));
        }
    }
}
