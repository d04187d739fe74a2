//! Embedded benchmark table extraction.
//!
//! A run log contains one llama-bench markdown table among free-form
//! output:
//!
//! ```text
//! | model | size | params | backend | test | t/s |
//! | --- | --- | --- | --- | --- | --- |
//! | llama 1B Q4_K | 762.81 MiB | 1.24 B | Metal | pp 512 | 100.00 ± 2.00 |
//! | llama 1B Q4_K | 762.81 MiB | 1.24 B | Metal | tg 512 | 20.00 ± 1.00 |
//! ```
//!
//! Extraction is a small state machine (seek header, collect rows, done)
//! rather than a loose prefix scan, so edge cases like a missing trailing
//! blank line or a second table are explicit: collection starts only at
//! the exact header line and stops at the first non-pipe line after it.

use std::num::{ParseFloatError, ParseIntError};
use std::str::FromStr;

/// Exact header of the benchmark table, after trimming.
const TABLE_HEADER: &str = "| model | size | params | backend | test | t/s |";

/// Header/body divider, dropped from the collected block.
const TABLE_SEPARATOR: &str = "| --- | --- | --- | --- | --- | --- |";

/// Benchmark processing stage, from the first token of the `test` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Prompt processing (`pp`): prefill throughput.
    Prefill,
    /// Token generation (`tg`): output throughput.
    Generation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prefill => "pp",
            Stage::Generation => "tg",
        }
    }
}

impl FromStr for Stage {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pp" => Ok(Stage::Prefill),
            "tg" => Ok(Stage::Generation),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One measured data point from the benchmark table.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkRow {
    pub model: String,
    pub size: String,
    pub params: String,
    pub backend: String,
    pub stage: Stage,
    pub num_tokens: u64,
    pub avg_tokens_per_sec: f64,
    pub std_tokens_per_sec: f64,
}

/// Errors raised while locating or parsing the table block.
#[derive(Debug)]
pub enum TableError {
    /// No header line found anywhere in the log.
    NoTable,
    /// Header parsed but a required column is absent.
    MissingColumn { column: &'static str },
    /// A data row is structurally wrong (too few cells, bad `test` or
    /// `t/s` shape, unknown stage token).
    BadRow { row: usize, detail: String },
    /// A cell that must be numeric failed to parse.
    BadNumber {
        row: usize,
        column: &'static str,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl std::fmt::Display for TableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableError::NoTable => write!(f, "no benchmark table found in log"),
            TableError::MissingColumn { column } => {
                write!(f, "benchmark table is missing the {column:?} column")
            }
            TableError::BadRow { row, detail } => {
                write!(f, "malformed table row {row}: {detail}")
            }
            TableError::BadNumber {
                row,
                column,
                value,
                source,
            } => write!(
                f,
                "row {row}, column {column:?}: {value:?} is not numeric: {source}"
            ),
        }
    }
}

impl std::error::Error for TableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TableError::BadNumber { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Block collection state.
enum ScanState {
    SeekingHeader,
    CollectingRows,
    Done,
}

/// Collect the first benchmark table block: the header line plus its data
/// rows.
///
/// The header starts collection but is not a row, and separator lines are
/// dropped. Anything after the block ends is ignored, so a second table in
/// the same log never contributes rows.
fn collect_block(lines: &[String]) -> Result<(&str, Vec<&str>), TableError> {
    let mut state = ScanState::SeekingHeader;
    let mut header = None;
    let mut rows = Vec::new();

    for line in lines {
        let trimmed = line.trim();
        match state {
            ScanState::SeekingHeader => {
                if trimmed == TABLE_HEADER {
                    header = Some(trimmed);
                    state = ScanState::CollectingRows;
                }
            }
            ScanState::CollectingRows => {
                if trimmed == TABLE_SEPARATOR {
                    continue;
                }
                if trimmed.starts_with('|') {
                    rows.push(trimmed);
                } else {
                    state = ScanState::Done;
                }
            }
            ScanState::Done => break,
        }
    }

    let header = header.ok_or(TableError::NoTable)?;
    tracing::debug!(rows = rows.len(), "collected benchmark table block");
    Ok((header, rows))
}

/// Split a pipe-delimited line into trimmed cells, dropping the empty
/// fragments produced by the leading and trailing pipes.
fn split_cells(line: &str) -> Vec<&str> {
    let mut cells: Vec<&str> = line.split('|').map(str::trim).collect();
    if cells.first() == Some(&"") {
        cells.remove(0);
    }
    if cells.last() == Some(&"") {
        cells.pop();
    }
    cells
}

/// Column positions resolved from the header against the fixed schema.
struct Schema {
    model: usize,
    size: usize,
    params: usize,
    backend: usize,
    test: usize,
    tps: usize,
}

impl Schema {
    fn resolve(header: &str) -> Result<Self, TableError> {
        let cells = split_cells(header);
        let find = |name: &'static str| -> Result<usize, TableError> {
            cells
                .iter()
                .position(|c| *c == name)
                .ok_or(TableError::MissingColumn { column: name })
        };
        // Resolve by name so header cell order, not position, decides
        // the mapping.
        Ok(Schema {
            model: find("model")?,
            size: find("size")?,
            params: find("params")?,
            backend: find("backend")?,
            test: find("test")?,
            tps: find("t/s")?,
        })
    }
}

fn cell<'a>(
    cells: &[&'a str],
    idx: usize,
    column: &'static str,
    row: usize,
) -> Result<&'a str, TableError> {
    cells.get(idx).copied().ok_or_else(|| TableError::BadRow {
        row,
        detail: format!("missing {column:?} cell"),
    })
}

/// Parse the `test` cell, e.g. `"pp 512"`.
fn parse_test(value: &str, row: usize) -> Result<(Stage, u64), TableError> {
    let (stage_tok, tokens_tok) = value.split_once(' ').ok_or_else(|| TableError::BadRow {
        row,
        detail: format!("test cell {value:?} is not \"<stage> <num_tokens>\""),
    })?;
    let stage = stage_tok.parse::<Stage>().map_err(|_| TableError::BadRow {
        row,
        detail: format!("unknown stage {stage_tok:?} (expected \"pp\" or \"tg\")"),
    })?;
    let num_tokens =
        tokens_tok
            .trim()
            .parse::<u64>()
            .map_err(|e: ParseIntError| TableError::BadNumber {
                row,
                column: "test",
                value: tokens_tok.trim().to_string(),
                source: Box::new(e),
            })?;
    Ok((stage, num_tokens))
}

/// Parse the `t/s` cell, e.g. `"100.00 ± 2.00"`.
fn parse_rate(value: &str, row: usize) -> Result<(f64, f64), TableError> {
    let (avg_tok, std_tok) = value.split_once('±').ok_or_else(|| TableError::BadRow {
        row,
        detail: format!("t/s cell {value:?} is not \"<avg> ± <std>\""),
    })?;
    let parse = |tok: &str| -> Result<f64, TableError> {
        tok.trim()
            .parse::<f64>()
            .map_err(|e: ParseFloatError| TableError::BadNumber {
                row,
                column: "t/s",
                value: tok.trim().to_string(),
                source: Box::new(e),
            })
    };
    Ok((parse(avg_tok)?, parse(std_tok)?))
}

/// Extract the benchmark table from a run log.
///
/// Locates the first table block, resolves columns by name, and parses
/// every data row into a typed [`BenchmarkRow`].
pub fn parse_benchmark_table(lines: &[String]) -> Result<Vec<BenchmarkRow>, TableError> {
    let (header, block) = collect_block(lines)?;
    let schema = Schema::resolve(header)?;

    let mut rows = Vec::with_capacity(block.len());
    for (i, raw) in block.iter().enumerate() {
        let cells = split_cells(raw);
        let (stage, num_tokens) = parse_test(cell(&cells, schema.test, "test", i)?, i)?;
        let (avg, std) = parse_rate(cell(&cells, schema.tps, "t/s", i)?, i)?;
        rows.push(BenchmarkRow {
            model: cell(&cells, schema.model, "model", i)?.to_string(),
            size: cell(&cells, schema.size, "size", i)?.to_string(),
            params: cell(&cells, schema.params, "params", i)?.to_string(),
            backend: cell(&cells, schema.backend, "backend", i)?.to_string(),
            stage,
            num_tokens,
            avg_tokens_per_sec: avg,
            std_tokens_per_sec: std,
        });
    }
    Ok(rows)
}
