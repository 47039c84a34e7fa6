use std::path::Path;
use anyhow::{Context, Result};
use crate::aggregate::aggregate_dir;
use crate::config::{Config, Retention};
use crate::history::dedupe_history;
use crate::playlist::{self, m3u::render_m3u, parse_groups, render_groups};

/// `aggregate`: history directory -> candidate group file
pub fn aggregate(dir: &Path, output: &Path, config: &Config) -> Result<()> {
    let groups = aggregate_dir(dir, &config.history.extensions)?;
    playlist::save(output, &render_groups(&groups))?;
    tracing::info!("Wrote {} candidate groups to {}", groups.len(), output.display());
    Ok(())
}

/// `m3u`: group file -> extended M3U playlist
pub fn m3u(input: &Path, output: &Path, config: &Config) -> Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let batch = parse_groups(&text);
    for issue in &batch.issues {
        tracing::warn!("Skipping input: {}", issue);
    }

    playlist::save(output, &render_m3u(&batch.groups, &config.m3u))?;
    tracing::info!("Wrote {} groups as M3U to {}", batch.groups.len(), output.display());
    Ok(())
}

/// `dedupe-history`
pub fn dedupe(dir: &Path, retention: Retention, dry_run: bool) -> Result<()> {
    let report = dedupe_history(dir, retention, dry_run)?;
    if dry_run {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
