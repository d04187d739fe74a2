/// Scalar field extraction: scan run log lines for the model identifier
/// and the battery-percent-used marker.
///
/// Looks for lines like:
/// - `Model info: Llama-3.2-1B-Instruct-Q4_K_M`
/// - `Benchmark used 4.5% battery`
use regex::Regex;
use std::num::ParseFloatError;
use std::sync::LazyLock;

/// Anchored pattern for the battery usage line.
static BATTERY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Benchmark used ([0-9.+-]+)% battery$").unwrap());

/// Find the model name, if the log carries a `Model info:` line.
///
/// The value is everything after the first colon, trimmed. A missing line
/// is a valid outcome, not an error. If multiple lines match, the first
/// wins; the extractor does not validate uniqueness.
pub fn model_name(lines: &[String]) -> Option<String> {
    for line in lines {
        if let Some(rest) = line.strip_prefix("Model info:") {
            return Some(rest.trim().to_string());
        }
    }
    tracing::debug!("no 'Model info:' line in log");
    None
}

/// Battery line matched but its number did not parse.
#[derive(Debug)]
pub struct BatteryParseError {
    pub value: String,
    pub source: ParseFloatError,
}

impl std::fmt::Display for BatteryParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "battery percentage {:?} is not a number: {}",
            self.value, self.source
        )
    }
}

impl std::error::Error for BatteryParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Find the battery percentage consumed by the benchmark run.
///
/// Returns `Ok(None)` when no line matches. First match wins. A matched
/// line whose number fails to parse as `f64` is an error rather than a
/// silent skip.
pub fn battery_used(lines: &[String]) -> Result<Option<f64>, BatteryParseError> {
    for line in lines {
        if let Some(caps) = BATTERY_RE.captures(line) {
            let raw = &caps[1];
            let pct = raw.parse::<f64>().map_err(|e| BatteryParseError {
                value: raw.to_string(),
                source: e,
            })?;
            return Ok(Some(pct));
        }
    }
    tracing::debug!("no battery usage line in log");
    Ok(None)
}
