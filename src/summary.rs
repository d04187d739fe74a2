//! Per-run processing and directory-level aggregation.
//!
//! Reads every `*.log` file in the run log directory, runs the extraction
//! pipeline on each, and renders one summary row per run. Processing is
//! sequential and aborts on the first bad file; the error names the file
//! so the offending log is obvious from the diagnostic alone.

use crate::extract;
use crate::metrics::{self, TokenCounts};
use crate::table;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Human-readable column headers, in fixed output order.
const COLUMNS: [&str; 9] = [
    "Test",
    "Model Name",
    "Model Size",
    "Model Params",
    "Time To First Token (ms)",
    "Time Per Output Token (ms)",
    "Latency (ms)",
    "Throughput (tokens/s)",
    "Battery Used (%)",
];

/// Summary record for one run log.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Test identifier: the log file name without its extension.
    pub test: String,
    /// From the `Model info:` line; absent when the log has none.
    pub model_name: Option<String>,
    pub model_size: String,
    pub model_params: String,
    pub time_to_first_token_ms: f64,
    pub time_per_output_token_ms: f64,
    pub latency_ms: f64,
    pub throughput_per_s: f64,
    /// From the `Benchmark used N% battery` line, when present.
    pub battery_used_pct: Option<f64>,
}

/// What went wrong while processing a run log.
#[derive(Debug)]
pub enum RunErrorKind {
    Io(std::io::Error),
    Table(table::TableError),
    Metric(metrics::MetricError),
    Battery(extract::BatteryParseError),
}

/// A per-file failure, carrying the offending path.
#[derive(Debug)]
pub struct RunError {
    pub path: PathBuf,
    pub kind: RunErrorKind,
}

impl RunError {
    fn new(path: &Path, kind: RunErrorKind) -> Self {
        Self {
            path: path.to_path_buf(),
            kind,
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = self.path.display();
        match &self.kind {
            RunErrorKind::Io(e) => write!(f, "{path}: I/O error: {e}"),
            RunErrorKind::Table(e) => write!(f, "{path}: {e}"),
            RunErrorKind::Metric(e) => write!(f, "{path}: {e}"),
            RunErrorKind::Battery(e) => write!(f, "{path}: {e}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            RunErrorKind::Io(e) => Some(e),
            RunErrorKind::Table(e) => Some(e),
            RunErrorKind::Metric(e) => Some(e),
            RunErrorKind::Battery(e) => Some(e),
        }
    }
}

/// Process one run log into a summary record.
pub fn process_run_log(path: &Path, tokens: TokenCounts) -> Result<RunResult, RunError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| RunError::new(path, RunErrorKind::Io(e)))?;
    let lines: Vec<String> = contents.lines().map(|l| l.trim().to_string()).collect();

    let rows = table::parse_benchmark_table(&lines)
        .map_err(|e| RunError::new(path, RunErrorKind::Table(e)))?;
    let derived = metrics::derive_metrics(&rows, tokens)
        .map_err(|e| RunError::new(path, RunErrorKind::Metric(e)))?;

    let model_name = extract::model_name(&lines);
    let battery_used_pct =
        extract::battery_used(&lines).map_err(|e| RunError::new(path, RunErrorKind::Battery(e)))?;

    // Size and params come from the first table row; every row in one run
    // describes the same model.
    let first = &rows[0];

    Ok(RunResult {
        test: path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        model_name,
        model_size: first.size.clone(),
        model_params: first.params.clone(),
        time_to_first_token_ms: derived.time_to_first_token_ms,
        time_per_output_token_ms: derived.time_per_output_token_ms,
        latency_ms: derived.latency_ms,
        throughput_per_s: derived.throughput_per_s,
        battery_used_pct,
    })
}

/// Process every `.log` file in a directory (non-recursive).
///
/// Paths are sorted by file name before processing, so the summary order
/// does not depend on directory enumeration order. The first failing file
/// aborts the run. An empty directory yields an empty summary.
pub fn generate_summary(dir: &Path, tokens: TokenCounts) -> Result<Vec<RunResult>, RunError> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| RunError::new(dir, RunErrorKind::Io(e)))?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RunError::new(dir, RunErrorKind::Io(e)))?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "log") {
            paths.push(path);
        }
    }
    paths.sort();

    tracing::info!(dir = %dir.display(), logs = paths.len(), "processing run logs");

    let mut results = Vec::with_capacity(paths.len());
    for path in &paths {
        tracing::debug!(path = %path.display(), "processing run log");
        results.push(process_run_log(path, tokens)?);
    }
    Ok(results)
}

fn opt_str(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn opt_num(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_default()
}

/// Render the summary as a markdown pipe table.
///
/// Always emits the header and separator; with no results the table is
/// header-only. Absent optional fields render as empty cells.
pub fn render_markdown(results: &[RunResult]) -> String {
    let mut lines = Vec::with_capacity(results.len() + 2);
    lines.push(format!("| {} |", COLUMNS.join(" | ")));
    lines.push(format!("|{}", " --- |".repeat(COLUMNS.len())));
    for r in results {
        lines.push(format!(
            "| {} | {} | {} | {} | {:.2} | {:.2} | {:.2} | {:.2} | {} |",
            r.test,
            opt_str(&r.model_name),
            r.model_size,
            r.model_params,
            r.time_to_first_token_ms,
            r.time_per_output_token_ms,
            r.latency_ms,
            r.throughput_per_s,
            opt_num(r.battery_used_pct),
        ));
    }
    lines.join("\n") + "\n"
}

/// Render the summary as pretty-printed JSON.
pub fn render_json(results: &[RunResult]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const SAMPLE_LOG: &str = "\
Model info: llama-1B-Q4
loading model...
| model | size | params | backend | test | t/s |
| --- | --- | --- | --- | --- | --- |
| llama 1B Q4_K | 762.81 MiB | 1.24 B | Metal | pp 512 | 100.00 ± 2.00 |
| llama 1B Q4_K | 762.81 MiB | 1.24 B | Metal | tg 512 | 20.00 ± 1.00 |

Benchmark used 4.5% battery
";

    fn write_log(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_process_single_run() {
        let dir = TempDir::new().unwrap();
        let path = write_log(dir.path(), "phone-a.log", SAMPLE_LOG);

        let r = process_run_log(&path, TokenCounts::default()).unwrap();
        assert_eq!(r.test, "phone-a");
        assert_eq!(r.model_name.as_deref(), Some("llama-1B-Q4"));
        assert_eq!(r.model_size, "762.81 MiB");
        assert_eq!(r.model_params, "1.24 B");
        assert!((r.time_per_output_token_ms - 50.0).abs() < 1e-9);
        assert!((r.throughput_per_s - 20.0).abs() < 1e-9);
        assert_eq!(r.battery_used_pct, Some(4.5));
    }

    #[test]
    fn test_missing_model_info_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let log = SAMPLE_LOG.replace("Model info: llama-1B-Q4\n", "");
        let path = write_log(dir.path(), "anon.log", &log);

        let r = process_run_log(&path, TokenCounts::default()).unwrap();
        assert_eq!(r.model_name, None);
    }

    #[test]
    fn test_missing_battery_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let log = SAMPLE_LOG.replace("Benchmark used 4.5% battery\n", "");
        let path = write_log(dir.path(), "plugged-in.log", &log);

        let r = process_run_log(&path, TokenCounts::default()).unwrap();
        assert_eq!(r.battery_used_pct, None);
    }

    #[test]
    fn test_missing_pp_row_fails() {
        let dir = TempDir::new().unwrap();
        let log = SAMPLE_LOG.replace(
            "| llama 1B Q4_K | 762.81 MiB | 1.24 B | Metal | pp 512 | 100.00 ± 2.00 |\n",
            "",
        );
        let path = write_log(dir.path(), "tg-only.log", &log);

        let err = process_run_log(&path, TokenCounts::default()).unwrap_err();
        assert!(matches!(err.kind, RunErrorKind::Metric(_)));
        assert!(err.to_string().contains("tg-only.log"));
    }

    #[test]
    fn test_no_table_fails_with_file_in_message() {
        let dir = TempDir::new().unwrap();
        let path = write_log(dir.path(), "broken.log", "no table here\n");

        let err = process_run_log(&path, TokenCounts::default()).unwrap_err();
        assert!(matches!(err.kind, RunErrorKind::Table(_)));
        assert!(err.to_string().contains("broken.log"));
    }

    #[test]
    fn test_summary_sorted_by_file_name() {
        let dir = TempDir::new().unwrap();
        write_log(dir.path(), "b-device.log", SAMPLE_LOG);
        write_log(dir.path(), "a-device.log", SAMPLE_LOG);
        write_log(dir.path(), "c-device.log", SAMPLE_LOG);

        let results = generate_summary(dir.path(), TokenCounts::default()).unwrap();
        let tests: Vec<&str> = results.iter().map(|r| r.test.as_str()).collect();
        assert_eq!(tests, vec!["a-device", "b-device", "c-device"]);
    }

    #[test]
    fn test_summary_ignores_non_log_files() {
        let dir = TempDir::new().unwrap();
        write_log(dir.path(), "run.log", SAMPLE_LOG);
        write_log(dir.path(), "notes.txt", "not a benchmark log");
        write_log(dir.path(), "run.log.bak", "not a benchmark log");

        let results = generate_summary(dir.path(), TokenCounts::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].test, "run");
    }

    #[test]
    fn test_empty_directory_renders_header_only() {
        let dir = TempDir::new().unwrap();
        let results = generate_summary(dir.path(), TokenCounts::default()).unwrap();
        assert!(results.is_empty());

        let rendered = render_markdown(&results);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("| Test | Model Name |"));
        assert!(lines[1].contains("---"));
    }

    #[test]
    fn test_summary_aborts_on_first_bad_file() {
        let dir = TempDir::new().unwrap();
        write_log(dir.path(), "aaa-bad.log", "nothing useful\n");
        write_log(dir.path(), "zzz-good.log", SAMPLE_LOG);

        let err = generate_summary(dir.path(), TokenCounts::default()).unwrap_err();
        assert!(err.to_string().contains("aaa-bad.log"));
    }

    #[test]
    fn test_render_markdown_row() {
        let dir = TempDir::new().unwrap();
        let path = write_log(dir.path(), "pixel-9.log", SAMPLE_LOG);
        let r = process_run_log(&path, TokenCounts::default()).unwrap();

        let rendered = render_markdown(&[r]);
        let row = rendered.lines().nth(2).unwrap();
        assert!(row.starts_with("| pixel-9 | llama-1B-Q4 | 762.81 MiB | 1.24 B |"));
        // TTFT 5170.00, TPOT 50.00, latency 30770.00, throughput 20.00
        assert!(row.contains("| 5170.00 |"));
        assert!(row.contains("| 50.00 |"));
        assert!(row.contains("| 30770.00 |"));
        assert!(row.contains("| 20.00 |"));
        assert!(row.ends_with("| 4.50 |"));
    }

    #[test]
    fn test_render_markdown_empty_optional_cells() {
        let r = RunResult {
            test: "t".to_string(),
            model_name: None,
            model_size: "1 MiB".to_string(),
            model_params: "1 B".to_string(),
            time_to_first_token_ms: 1.0,
            time_per_output_token_ms: 2.0,
            latency_ms: 3.0,
            throughput_per_s: 4.0,
            battery_used_pct: None,
        };
        let rendered = render_markdown(&[r]);
        let row = rendered.lines().nth(2).unwrap();
        assert!(row.starts_with("| t |  | 1 MiB |"));
        assert!(row.ends_with("|  |"));
    }

    #[test]
    fn test_render_json_shape() {
        let dir = TempDir::new().unwrap();
        let path = write_log(dir.path(), "dev.log", SAMPLE_LOG);
        let r = process_run_log(&path, TokenCounts::default()).unwrap();

        let json = render_json(&[r]).unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v[0]["test"], "dev");
        assert_eq!(v[0]["model_name"], "llama-1B-Q4");
        assert_eq!(v[0]["throughput_per_s"], 20.0);
        assert_eq!(v[0]["battery_used_pct"], 4.5);
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let err =
            generate_summary(Path::new("/nonexistent/run_logs"), TokenCounts::default())
                .unwrap_err();
        assert!(matches!(err.kind, RunErrorKind::Io(_)));
    }
}
