use tracing::debug;

use super::error::ProjectionError;
use super::types::{EstimatedParameters, HistoricalRecord};

#[derive(Debug, Clone, Copy, PartialEq)]
struct SeriesStats {
    avg: f64,
    std: f64,
}

/// Mean and sample standard deviation of income and expenses, each divided
/// by `scale` first.
pub fn estimate_parameters(
    records: &[HistoricalRecord],
    scale: f64,
) -> Result<EstimatedParameters, ProjectionError> {
    if records.is_empty() {
        return Err(ProjectionError::InsufficientData);
    }
    if !scale.is_finite() || scale <= 0.0 {
        return Err(ProjectionError::InvalidScale(scale));
    }
    if let Some(index) = records
        .iter()
        .position(|r| !r.income.is_finite() || !r.expenses.is_finite())
    {
        return Err(ProjectionError::NonFiniteRecord { index });
    }

    let incomes = records.iter().map(|r| r.income / scale).collect::<Vec<_>>();
    let expenses = records
        .iter()
        .map(|r| r.expenses / scale)
        .collect::<Vec<_>>();

    let income = series_stats(&incomes);
    let expense = series_stats(&expenses);

    let params = EstimatedParameters {
        income_avg: income.avg,
        income_std: income.std,
        expense_avg: expense.avg,
        expense_std: expense.std,
    };
    debug!(
        records = records.len(),
        scale,
        income_avg = params.income_avg,
        income_std = params.income_std,
        expense_avg = params.expense_avg,
        expense_std = params.expense_std,
        "estimated projection parameters"
    );
    Ok(params)
}

fn series_stats(values: &[f64]) -> SeriesStats {
    let first = values[0];
    // Identical observations carry no variance; summing them can still drift
    // by an ulp, so short-circuit to keep std exactly zero.
    if values.iter().all(|&v| v == first) {
        return SeriesStats {
            avg: first,
            std: 0.0,
        };
    }

    let avg = mean(values);
    SeriesStats {
        avg,
        std: sample_std(values, avg),
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Bessel-corrected; zero when fewer than two observations exist.
/// Deviations are scaled by the largest one before squaring so tiny but
/// distinct values do not underflow to zero.
fn sample_std(values: &[f64], avg: f64) -> f64 {
    let n = values.len();
    if n <= 1 {
        return 0.0;
    }
    let max_dev = values
        .iter()
        .map(|x| (x - avg).abs())
        .fold(0.0_f64, f64::max);
    if max_dev == 0.0 || !max_dev.is_finite() {
        return max_dev;
    }
    let sum_sq = values
        .iter()
        .map(|x| ((x - avg) / max_dev).powi(2))
        .sum::<f64>();
    max_dev * (sum_sq / (n - 1) as f64).sqrt()
}
