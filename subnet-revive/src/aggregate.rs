use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{ensure, Result};
use http::Uri;
use regex::Regex;
use walkdir::WalkDir;

use shared::protocol::{DEFAULT_PORT, GENRE_MARKER};
use shared::types::{CandidateTemplate, EndpointGroup};

use crate::playlist::m3u::parse_extinf_entries;
use crate::rank::sort_templates;

static QUALITY_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(超高清|高清|标清|普清|超清|H\.265|4K|HD|SD)").expect("quality tag pattern is valid")
});

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[()\[\]\-\s]+").expect("separator pattern is valid"));

static NUMBERED_CCTV: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)CCTV[- ]?(\d+)").expect("cctv pattern is valid"));

/// Canonical form of a scraped channel name.
///
/// Drops quality tags, brackets, dashes and whitespace, then rewrites any
/// numbered CCTV channel as `CCTV-<n>` without leading zeros.
pub fn normalize_channel_name(raw: &str) -> String {
    let name = QUALITY_TAGS.replace_all(raw, "");
    let name = SEPARATORS.replace_all(&name, "");

    if let Some(caps) = NUMBERED_CCTV.captures(&name) {
        if let Ok(n) = caps[1].parse::<u64>() {
            return format!("CCTV-{n}");
        }
    }
    name.into_owned()
}

/// Groups keyed and ordered by `host:port`
#[derive(Debug, Default)]
pub struct Aggregator {
    groups: BTreeMap<String, EndpointGroup>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one `(name, url)` sighting; the first URL per normalized name wins.
    pub fn add(&mut self, name: &str, url: &str) -> bool {
        let label = normalize_channel_name(name);
        if label.is_empty() {
            return false;
        }
        let Ok(uri) = url.parse::<Uri>() else {
            return false;
        };
        if uri.scheme_str() != Some("http") {
            tracing::debug!("Skipping non-http url {}", url);
            return false;
        }
        let Some(authority) = uri.authority() else {
            return false;
        };
        let port = authority.port_u16().unwrap_or(DEFAULT_PORT);
        let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

        let group = EndpointGroup::new(authority.host(), port);
        self.groups
            .entry(group.endpoint())
            .or_insert(group)
            .insert_template(CandidateTemplate::new(label, path))
    }

    /// Ingest an M3U body or a `label,url` text list
    pub fn add_text(&mut self, text: &str) -> usize {
        let mut added = 0;
        for (name, url) in parse_extinf_entries(text) {
            added += usize::from(self.add(&name, &url));
        }
        for line in text.lines().map(str::trim) {
            if line.starts_with('#') || line.contains(GENRE_MARKER) {
                continue;
            }
            if let Some((name, url)) = line.split_once(',') {
                if url.trim_start().starts_with("http") {
                    added += usize::from(self.add(name, url.trim()));
                }
            }
        }
        added
    }

    /// Finished groups ordered by endpoint, templates in channel order
    pub fn into_groups(self) -> Vec<EndpointGroup> {
        self.groups
            .into_values()
            .map(|group| {
                let mut templates = group.templates().to_vec();
                sort_templates(&mut templates);
                let mut sorted = EndpointGroup::new(group.address.clone(), group.port);
                for template in templates {
                    sorted.insert_template(template);
                }
                sorted
            })
            .collect()
    }
}

/// Walk `dir` for files with one of `extensions` and aggregate them all.
pub fn aggregate_dir(dir: &Path, extensions: &[String]) -> Result<Vec<EndpointGroup>> {
    ensure!(dir.is_dir(), "History directory not found: {}", dir.display());
    tracing::info!("Aggregating playlists under {}", dir.display());

    let mut aggregator = Aggregator::new();
    let mut files = 0;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        let matches_ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.iter().any(|want| want.eq_ignore_ascii_case(e)));
        if !entry.file_type().is_file() || !matches_ext {
            continue;
        }

        match std::fs::read(entry.path()) {
            Ok(bytes) => {
                let added = aggregator.add_text(&String::from_utf8_lossy(&bytes));
                tracing::debug!("{}: {} new templates", entry.path().display(), added);
                files += 1;
            }
            Err(e) => tracing::warn!("Failed to read {}: {}", entry.path().display(), e),
        }
    }

    let groups = aggregator.into_groups();
    tracing::info!("Aggregated {} files into {} endpoint groups", files, groups.len());
    Ok(groups)
}
