pub mod m3u;
pub mod parse;
pub mod write;

use std::path::Path;
use anyhow::{Context, Result};

pub use parse::{parse_groups, ParsedBatch};
pub use write::{render_groups, render_records};

/// Replace `path` with `contents`, going through a sibling temp file so
/// readers never see a half-written artifact.
pub fn save(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}
