//! Ingest command - Stream NDJSON rows into a destination table
//!
//! Each input line is one JSON object; its fields become the row's columns
//! and `null` fields are left out. Rows go through a streaming manager
//! backed by the JSON-lines channel, so the output lands in
//! `<output-dir>/<project>.<dataset>.<table>.jsonl`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tributary_config::Config;
use tributary_metrics::spawn_stream_reporters;
use tributary_stream::{
    Destination, JsonLinesChannelFactory, ManagerConfig, Row, StreamingManager, Value,
};

/// Rows handed to the processor per put
const DEFAULT_CHUNK_ROWS: usize = 10_000;

/// Ingest command arguments
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Destination table (project.dataset.table)
    #[arg(short, long)]
    pub table: Destination,

    /// NDJSON input file (reads stdin if not given)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Directory the JSON-lines channel writes to
    #[arg(short, long, default_value = "out")]
    pub output_dir: PathBuf,

    /// Rows queued per put
    #[arg(long, default_value_t = DEFAULT_CHUNK_ROWS)]
    pub chunk_rows: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct FeedSummary {
    lines: u64,
    accepted: u64,
    skipped: u64,
}

/// Run the ingest command
pub async fn run(args: IngestArgs, config: Config) -> Result<()> {
    if !config.streaming.enabled {
        anyhow::bail!("streaming is disabled in configuration ([streaming] enabled = false)");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        destination = %args.table,
        output = %args.output_dir.display(),
        "tributary ingest starting"
    );

    let factory = Arc::new(JsonLinesChannelFactory::new(&args.output_dir));
    let manager = StreamingManager::builder(factory)
        .config(ManagerConfig::from_config(&config))
        .build()?;
    manager.create_stream_processor(&args.table).await?;

    let cancel = CancellationToken::new();
    let reporters = spawn_stream_reporters(
        manager.metrics_handles(),
        config.metrics.format,
        cancel.clone(),
    );

    let fed = match &args.input {
        Some(path) => {
            let file = File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            feed(&manager, &args, BufReader::new(file)).await
        }
        None => feed(&manager, &args, BufReader::new(tokio::io::stdin())).await,
    };

    // flush what was queued even if reading failed part way
    let flushed = manager.force_flush_stream_for_table(&args.table).await;
    let statistics = manager.statistics();
    let metrics = manager.get(&args.table).map(|p| p.metrics());
    let shutdown = manager.shutdown().await;

    stop_reporters(&cancel, reporters).await;

    let summary = fed?;
    flushed?;
    shutdown?;

    let report = json!({
        "destination": args.table.to_string(),
        "lines": summary.lines,
        "accepted": summary.accepted,
        "skipped": summary.skipped,
        "streams": statistics,
        "metrics": metrics,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    info!(
        lines = summary.lines,
        accepted = summary.accepted,
        skipped = summary.skipped,
        "tributary ingest complete"
    );
    Ok(())
}

/// Cancel the reporters and wait for them; returns how many failed
async fn stop_reporters(cancel: &CancellationToken, reporters: Vec<JoinHandle<()>>) -> usize {
    cancel.cancel();
    let mut failed = 0;
    for reporter in reporters {
        if let Err(e) = reporter.await {
            warn!(error = %e, "metrics reporter task failed");
            failed += 1;
        }
    }
    failed
}

/// Read lines until EOF or Ctrl+C, queueing rows in chunks
async fn feed<R>(manager: &StreamingManager, args: &IngestArgs, reader: R) -> Result<FeedSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut chunk: Vec<Row> = Vec::with_capacity(args.chunk_rows);
    let mut summary = FeedSummary::default();
    let chunk_rows = args.chunk_rows.max(1);

    let interrupted = signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        let line = tokio::select! {
            _ = &mut interrupted => {
                warn!("interrupted, flushing rows read so far");
                break;
            }
            line = lines.next_line() => line.context("failed to read input")?,
        };
        let Some(line) = line else {
            break;
        };

        summary.lines += 1;
        match parse_row(&line) {
            Ok(Some(row)) => chunk.push(row),
            Ok(None) => {}
            Err(e) => {
                summary.skipped += 1;
                warn!(line = summary.lines, error = %e, "skipping malformed line");
            }
        }

        if chunk.len() >= chunk_rows {
            let rows = std::mem::take(&mut chunk);
            summary.accepted += manager.put_batch_for_table(&args.table, rows).await? as u64;
        }
    }

    if !chunk.is_empty() {
        summary.accepted += manager.put_batch_for_table(&args.table, chunk).await? as u64;
    }
    Ok(summary)
}

/// Parse one NDJSON line; blank lines yield `None`
fn parse_row(line: &str) -> Result<Option<Row>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    match serde_json::from_str::<serde_json::Value>(line)? {
        serde_json::Value::Object(fields) => Ok(Some(
            fields
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, Value::from(v)))
                .collect(),
        )),
        other => anyhow::bail!("expected a JSON object, found {}", json_kind(&other)),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
