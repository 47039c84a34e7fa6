use std::sync::Arc;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use shared::types::{DiscoveryRecord, EndpointGroup};
use crate::config::{Config, RecoveryPolicy};
use crate::hash::fingerprint_records;
use crate::precheck::precheck;
use crate::probe::{Probe, RetryPolicy, Retrying};
use crate::rank::rank;
use crate::recovery::recover_all;
use crate::registry::RegistryHandle;

/// Counters and identity of one batch run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub policy: RecoveryPolicy,
    pub input_groups: usize,
    /// Groups or lines skipped while parsing
    pub malformed: usize,
    pub alive: usize,
    pub recovered: usize,
    /// Alive or recovered onto an endpoint another group already claimed
    pub merged: usize,
    pub dropped: usize,
    pub non_ipv4: usize,
    /// Groups never prechecked because the run was cancelled
    pub unprobed: usize,
    /// Dead groups left unswept because the run was cancelled
    pub skipped: usize,
    pub records: usize,
    /// SHA-256 over the output's endpoints and templates
    pub fingerprint: String,
}

pub struct RunResult {
    /// Ranked, ready to write
    pub records: Vec<DiscoveryRecord>,
    pub summary: RunSummary,
}

/// Precheck every group, sweep the /24 of the dead ones, rank what's left.
///
/// `base` is the raw prober; retry policies from `config` are layered on
/// per phase. Cancelling stops outstanding probes and returns whatever the
/// registry holds by then.
pub async fn revive(
    groups: Vec<EndpointGroup>,
    malformed: usize,
    config: &Config,
    base: Arc<dyn Probe>,
    cancel: CancellationToken,
) -> Result<RunResult> {
    if groups.is_empty() {
        bail!("No candidate groups to process");
    }

    let started_at = Utc::now();
    let input_groups = groups.len();
    let registry = RegistryHandle::spawn(config.registry.dedup_key);

    let precheck_probe: Arc<dyn Probe> = Arc::new(Retrying::new(
        base.clone(),
        RetryPolicy::from_config(&config.precheck.retry),
    ));
    let recovery_probe: Arc<dyn Probe> = Arc::new(Retrying::new(
        base,
        RetryPolicy::from_config(&config.recovery.retry),
    ));

    let pre = precheck(
        groups,
        precheck_probe,
        &registry,
        config.precheck.workers,
        &config.recovery.canary_label,
        cancel.clone(),
    )
    .await?;

    let rec = recover_all(
        pre.needs_recovery,
        recovery_probe,
        &registry,
        &config.recovery,
        cancel,
    )
    .await?;

    tracing::debug!("Registry holds {} records", registry.len().await?);
    let records = rank(registry.snapshot().await?);
    registry.shutdown().await?;

    let summary = RunSummary {
        started_at,
        finished_at: Utc::now(),
        policy: config.recovery.policy,
        input_groups,
        malformed,
        alive: pre.alive,
        recovered: rec.recovered,
        merged: pre.merged + rec.merged,
        dropped: rec.dropped,
        non_ipv4: rec.non_ipv4,
        unprobed: pre.unprobed,
        skipped: rec.skipped,
        records: records.len(),
        fingerprint: fingerprint_records(&records),
    };

    tracing::info!(
        "Run complete: {} alive, {} recovered, {} merged, {} dropped, {} records",
        summary.alive,
        summary.recovered,
        summary.merged,
        summary.dropped + summary.non_ipv4,
        summary.records
    );

    Ok(RunResult { records, summary })
}
