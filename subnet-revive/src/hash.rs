use std::fs::File;
use std::path::Path;
use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use shared::types::{CandidateTemplate, DiscoveryRecord};

/// Only the fields that make up the artifact's content. Latency, origin and
/// timestamps move on every run without the endpoint set changing.
#[derive(Serialize)]
struct HashView<'a> {
    address: &'a str,
    port: u16,
    templates: Vec<&'a CandidateTemplate>,
}

fn view<'a>(address: &'a str, port: u16, templates: &'a [CandidateTemplate]) -> HashView<'a> {
    let mut templates: Vec<&CandidateTemplate> = templates.iter().collect();
    templates.sort_by(|a, b| a.label.cmp(&b.label));
    HashView {
        address,
        port,
        templates,
    }
}

fn digest_views(mut views: Vec<HashView<'_>>) -> String {
    views.sort_by(|a, b| (a.address, a.port).cmp(&(b.address, b.port)));
    let json = serde_json::to_string(&views)
        .expect("Failed to serialize endpoints for hashing");
    hex::encode(Sha256::digest(json.as_bytes()))
}

/// SHA-256 over the endpoint set of a batch result, independent of order.
pub fn fingerprint_records(records: &[DiscoveryRecord]) -> String {
    digest_views(
        records
            .iter()
            .map(|r| view(&r.address, r.port, &r.templates))
            .collect(),
    )
}

/// Hex SHA-256 of a file's bytes
pub fn file_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}
