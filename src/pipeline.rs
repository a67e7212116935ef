//! Line-oriented host for the filter: JSON records in, enriched records out

use anyhow::{Context, Result};
use serde_json::Value;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use kubesumo_filter::{SumoFilter, Verdict};

/// Line counts for one pipeline run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineCounts {
    pub read: u64,
    pub forwarded: u64,
    /// Blank, invalid or non-object lines
    pub skipped: u64,
}

/// Result of feeding one line through the filter
#[derive(Debug, PartialEq, Eq)]
pub enum LineOutcome {
    Forward(String),
    Dropped,
    Skipped,
}

/// Filter one input line
pub fn process_line(filter: &SumoFilter, line: &str) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Skipped;
    }

    let mut record = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(record)) => record,
        Ok(other) => {
            warn!(kind = json_kind(&other), "skipping non-object record");
            return LineOutcome::Skipped;
        }
        Err(e) => {
            warn!(error = %e, "skipping invalid JSON line");
            return LineOutcome::Skipped;
        }
    };

    match filter.filter(&mut record) {
        Verdict::Keep => match serde_json::to_string(&record) {
            Ok(out) => LineOutcome::Forward(out),
            Err(e) => {
                warn!(error = %e, "failed to serialize record");
                LineOutcome::Skipped
            }
        },
        Verdict::Drop(_) => LineOutcome::Dropped,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Read records until EOF or `shutdown` resolves, writing kept records to
/// `output` one per line.
pub async fn run<R, W, S>(
    filter: &SumoFilter,
    mut input: R,
    mut output: W,
    shutdown: S,
) -> Result<PipelineCounts>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let mut buf = Vec::new();
    let mut counts = PipelineCounts::default();
    tokio::pin!(shutdown);

    loop {
        buf.clear();
        tokio::select! {
            _ = &mut shutdown => {
                debug!("shutdown requested, stopping input");
                break;
            }

            read = input.read_until(b'\n', &mut buf) => {
                if read.context("Failed to read input")? == 0 {
                    break;
                }
                counts.read += 1;

                let Ok(line) = std::str::from_utf8(&buf) else {
                    warn!(line = counts.read, "skipping line that is not valid UTF-8");
                    counts.skipped += 1;
                    continue;
                };

                match process_line(filter, line) {
                    LineOutcome::Forward(out) => {
                        output.write_all(out.as_bytes()).await.context("Failed to write output")?;
                        output.write_all(b"\n").await.context("Failed to write output")?;
                        counts.forwarded += 1;
                    }
                    LineOutcome::Dropped => {}
                    LineOutcome::Skipped => counts.skipped += 1,
                }
            }
        }
    }

    output.flush().await.context("Failed to flush output")?;
    Ok(counts)
}
