/// Derived latency/throughput metrics from per-stage benchmark rates.
///
/// The benchmark reports raw tokens-per-second for the prefill (`pp`) and
/// generation (`tg`) stages; users care about time-to-first-token, per-token
/// generation latency, end-to-end latency, and throughput.
use crate::table::{BenchmarkRow, Stage};

/// Token counts the benchmark scenario assumes. Explicit configuration
/// rather than process-wide constants, so the converter is testable with
/// arbitrary counts.
#[derive(Debug, Clone, Copy)]
pub struct TokenCounts {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Default for TokenCounts {
    fn default() -> Self {
        Self {
            input_tokens: 512,
            output_tokens: 512,
        }
    }
}

/// The four user-facing metrics, times in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedMetrics {
    pub time_to_first_token_ms: f64,
    pub time_per_output_token_ms: f64,
    pub latency_ms: f64,
    pub throughput_per_s: f64,
}

#[derive(Debug)]
pub enum MetricError {
    /// No row for one of the required stages.
    MissingStage { stage: Stage },
    /// A stage rate is zero or negative; the implied time would be
    /// infinite or undefined.
    InvalidRate { stage: Stage, rate: f64 },
}

impl std::fmt::Display for MetricError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricError::MissingStage { stage } => {
                write!(f, "benchmark table has no {stage} row")
            }
            MetricError::InvalidRate { stage, rate } => {
                write!(f, "{stage} rate {rate} tokens/s is not a positive rate")
            }
        }
    }
}

impl std::error::Error for MetricError {}

fn stage_rate(rows: &[BenchmarkRow], stage: Stage) -> Result<f64, MetricError> {
    // First row per stage wins if the table carries duplicates.
    let row = rows
        .iter()
        .find(|r| r.stage == stage)
        .ok_or(MetricError::MissingStage { stage })?;
    let rate = row.avg_tokens_per_sec;
    if rate <= 0.0 {
        return Err(MetricError::InvalidRate { stage, rate });
    }
    Ok(rate)
}

/// Compute derived metrics from the parsed benchmark rows.
///
/// Requires one `pp` and one `tg` row with positive average rates.
pub fn derive_metrics(
    rows: &[BenchmarkRow],
    tokens: TokenCounts,
) -> Result<DerivedMetrics, MetricError> {
    let r_pp = stage_rate(rows, Stage::Prefill)?;
    let r_tg = stage_rate(rows, Stage::Generation)?;

    // TTFT covers prompt processing plus the first generated token.
    let time_to_first_token_ms = (tokens.input_tokens as f64 / r_pp + 1.0 / r_tg) * 1000.0;
    let time_per_output_token_ms = 1.0 / r_tg * 1000.0;
    let latency_ms = time_to_first_token_ms + time_per_output_token_ms * tokens.output_tokens as f64;

    Ok(DerivedMetrics {
        time_to_first_token_ms,
        time_per_output_token_ms,
        latency_ms,
        throughput_per_s: r_tg,
    })
}
