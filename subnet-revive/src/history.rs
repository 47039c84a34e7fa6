use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use anyhow::{ensure, Result};
use serde::Serialize;
use walkdir::WalkDir;
use crate::config::Retention;
use crate::hash::file_digest;

/// Snapshot extensions considered for deduplication
const SNAPSHOT_EXTENSIONS: [&str; 2] = ["m3u", "txt"];

/// Prefix of the rolling merge output, never touched
const MERGED_PREFIX: &str = "merged.";

#[derive(Debug, Default, Serialize)]
pub struct DedupeReport {
    pub scanned: usize,
    pub kept: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

/// Timestamped snapshots directly under `dir`, grouped by extension and
/// content digest. Each group is sorted by file name.
fn duplicate_sets(dir: &Path) -> (usize, BTreeMap<(String, String), Vec<PathBuf>>) {
    let mut sets: BTreeMap<(String, String), Vec<PathBuf>> = BTreeMap::new();
    let mut scanned = 0;

    let entries = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                None
            }
        });

    for entry in entries {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with(MERGED_PREFIX) {
            continue;
        }
        let Some(ext) = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| SNAPSHOT_EXTENSIONS.contains(e))
        else {
            continue;
        };

        match file_digest(entry.path()) {
            Ok(digest) => {
                scanned += 1;
                sets.entry((ext.to_string(), digest))
                    .or_default()
                    .push(entry.path().to_path_buf());
            }
            Err(e) => tracing::warn!("Skipping {}: {:#}", entry.path().display(), e),
        }
    }

    (scanned, sets)
}

/// Delete byte-identical history snapshots, keeping one per content.
///
/// File names carry their timestamp, so name order is age order. With
/// `dry_run` nothing is deleted but the report lists what would be.
pub fn dedupe_history(dir: &Path, retention: Retention, dry_run: bool) -> Result<DedupeReport> {
    ensure!(dir.is_dir(), "History directory not found: {}", dir.display());

    let (scanned, sets) = duplicate_sets(dir);
    let mut report = DedupeReport {
        scanned,
        ..Default::default()
    };

    for ((ext, digest), mut files) in sets {
        if files.len() < 2 {
            continue;
        }
        let keep = match retention {
            Retention::Earliest => files.remove(0),
            Retention::Latest => files.remove(files.len() - 1),
        };
        tracing::info!(
            "{} identical .{} files ({}...), keeping {}",
            files.len() + 1,
            ext,
            &digest[..8],
            keep.display()
        );

        for path in files {
            if dry_run {
                tracing::info!("Would remove {}", path.display());
                report.removed.push(path);
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!("Removed {}", path.display());
                    report.removed.push(path);
                }
                Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
        report.kept.push(keep);
    }

    tracing::info!(
        "History cleanup done: {} scanned, {} removed",
        report.scanned,
        report.removed.len()
    );
    Ok(report)
}
