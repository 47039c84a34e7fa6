use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use crate::config::Config;
use crate::pipeline::{self, RunSummary};
use crate::playlist::{self, parse_groups, render_records};
use crate::probe::{HttpProber, Probe};

/// Read and parse every input file as one batch. Missing files are skipped.
fn load_inputs(inputs: &[PathBuf]) -> Result<playlist::ParsedBatch> {
    let mut text = String::new();
    let mut read = 0;

    for path in inputs {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                text.push_str(&contents);
                text.push_str("\n\n");
                read += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Input file not found, skipping: {}", path.display());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read input: {}", path.display()));
            }
        }
    }

    anyhow::ensure!(read > 0, "None of the input files could be read");

    let batch = parse_groups(&text);
    for issue in &batch.issues {
        tracing::warn!("Skipping input: {}", issue);
    }
    tracing::info!(
        "Loaded {} candidate groups from {} files ({} skipped)",
        batch.groups.len(),
        read,
        batch.issues.len()
    );
    Ok(batch)
}

/// Write `contents` to `path` unless the file already holds exactly those
/// bytes. Returns true if written.
fn write_if_changed(path: &Path, contents: &str) -> Result<bool> {
    if std::fs::read(path).is_ok_and(|existing| existing == contents.as_bytes()) {
        return Ok(false);
    }
    playlist::save(path, contents)?;
    Ok(true)
}

/// Run the batch against `prober` and write the artifacts named in `config`.
pub async fn run_with(
    inputs: &[PathBuf],
    config: &Config,
    prober: Arc<dyn Probe>,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let batch = load_inputs(inputs)?;
    let result = pipeline::revive(batch.groups, batch.issues.len(), config, prober, cancel.clone()).await?;

    if cancel.is_cancelled() {
        tracing::warn!("Run was interrupted; writing partial results");
    }
    if result.records.is_empty() {
        tracing::warn!("No live endpoints found");
    }

    let output = &config.output.path;
    let rendered = render_records(&result.records, config.output.annotate_latency);
    let written = if config.output.skip_unchanged {
        write_if_changed(output, &rendered)?
    } else {
        playlist::save(output, &rendered)?;
        true
    };
    if written {
        tracing::info!("Wrote {} endpoints to {}", result.records.len(), output.display());
    } else {
        tracing::info!("{} is up to date, not rewriting", output.display());
    }

    if let Some(summary_path) = &config.output.summary_path {
        let json = serde_json::to_string_pretty(&result.summary)
            .context("Failed to serialize run summary")?;
        playlist::save(summary_path, &json)?;
        tracing::info!("Wrote run summary to {}", summary_path.display());
    }

    Ok(result.summary)
}

/// `revive`: the HTTP prober, with ctrl-c cancelling the run.
pub async fn run(inputs: &[PathBuf], config: &Config) -> Result<()> {
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, stopping probes");
            signal_cancel.cancel();
        }
    });

    let prober = Arc::new(HttpProber::new(&config.probe));
    run_with(inputs, config, prober, cancel).await?;
    Ok(())
}
