use super::types::{HISTOGRAM_BINS, HistogramBin, SimulationResult};

/// Sorts the outcomes and derives the order statistics and histogram.
///
/// Percentiles use the nearest-rank rule: `values[floor(n * p)]`, no
/// interpolation. The median is `values[n / 2]`, so even counts take the
/// upper of the two middle elements.
pub fn summarize(mut outcomes: Vec<f64>) -> SimulationResult {
    outcomes.sort_by(|a, b| a.total_cmp(b));

    if outcomes.is_empty() {
        return SimulationResult {
            results: outcomes,
            mean: 0.0,
            median: 0.0,
            p10: 0.0,
            p90: 0.0,
            min: 0.0,
            max: 0.0,
            histogram: Vec::new(),
        };
    }

    let n = outcomes.len();
    let mean = outcomes.iter().sum::<f64>() / n as f64;
    let histogram = build_histogram(&outcomes, HISTOGRAM_BINS);

    SimulationResult {
        mean,
        median: outcomes[n / 2],
        p10: nearest_rank(&outcomes, 0.10),
        p90: nearest_rank(&outcomes, 0.90),
        min: outcomes[0],
        max: outcomes[n - 1],
        histogram,
        results: outcomes,
    }
}

fn nearest_rank(sorted: &[f64], fraction: f64) -> f64 {
    sorted[rank_index(sorted.len(), fraction)]
}

fn rank_index(n: usize, fraction: f64) -> usize {
    ((n as f64 * fraction).floor() as usize).min(n.saturating_sub(1))
}

/// Equal-width bins spanning `[min, max]` of an ascending slice. Densities
/// are `count / n`. A zero-width range puts all mass in bin 0.
pub fn build_histogram(sorted: &[f64], bins: usize) -> Vec<HistogramBin> {
    if sorted.is_empty() || bins == 0 {
        return Vec::new();
    }

    let n = sorted.len();
    let min = sorted[0];
    let max = sorted[n - 1];
    let step = (max - min) / bins as f64;

    let mut counts = vec![0_usize; bins];
    if step > 0.0 && step.is_finite() {
        for &value in sorted {
            let idx = ((value - min) / step).floor() as usize;
            counts[idx.min(bins - 1)] += 1;
        }
    } else {
        counts[0] = n;
    }

    let step = if step.is_finite() { step } else { 0.0 };
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            bin_start: min + i as f64 * step,
            density: count as f64 / n as f64,
        })
        .collect()
}
