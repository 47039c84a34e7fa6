use std::sync::Arc;
use anyhow::Result;
use tokio_util::sync::CancellationToken;
use shared::types::{DiscoveryRecord, EndpointGroup, Origin, ProbeOutcome};
use crate::pool::spawn_pool;
use crate::probe::Probe;
use crate::registry::RegistryHandle;

/// How the original endpoints fared
#[derive(Debug, Default)]
pub struct PrecheckReport {
    /// Alive and stored under their own address
    pub alive: usize,
    /// Alive, but another group already holds the same registry key
    pub merged: usize,
    /// Dead at their own address; candidates for recovery
    pub needs_recovery: Vec<EndpointGroup>,
    /// Never probed because the run was cancelled
    pub unprobed: usize,
}

/// Probe one representative template of every group on a bounded pool.
///
/// Live groups go straight into the registry with their full template set;
/// dead ones come back in `needs_recovery`. Each group lands in exactly one
/// of the two.
pub async fn precheck(
    groups: Vec<EndpointGroup>,
    prober: Arc<dyn Probe>,
    registry: &RegistryHandle,
    workers: usize,
    canary_label: &str,
    cancel: CancellationToken,
) -> Result<PrecheckReport> {
    let total = groups.len();
    tracing::info!("Prechecking {} groups with {} workers", total, workers);

    let label = canary_label.to_string();
    let mut rx = spawn_pool(groups, workers, cancel, move |group: EndpointGroup| {
        let prober = prober.clone();
        let url = group
            .representative(&label)
            .map(|t| t.url_at(&group.address, group.port));
        async move {
            let outcome = match &url {
                Some(url) => prober.probe(url).await,
                None => ProbeOutcome::dead(),
            };
            (group, outcome)
        }
    });

    let mut report = PrecheckReport::default();
    while let Some((group, outcome)) = rx.recv().await {
        match outcome.latency.filter(|_| outcome.alive) {
            Some(latency) => {
                let record = DiscoveryRecord::from_group(&group, latency, Origin::Precheck);
                if registry.insert_if_absent(record).await? {
                    tracing::info!("  [+] alive: {} ({}ms)", group.endpoint(), latency.as_millis());
                    report.alive += 1;
                } else {
                    tracing::debug!("{} alive but already registered", group.endpoint());
                    report.merged += 1;
                }
            }
            None => {
                tracing::debug!("{} dead, queued for recovery", group.endpoint());
                report.needs_recovery.push(group);
            }
        }
    }

    report.unprobed = total - report.alive - report.merged - report.needs_recovery.len();
    tracing::info!(
        "Precheck done: {} alive, {} merged, {} need recovery ({} unprobed)",
        report.alive,
        report.merged,
        report.needs_recovery.len(),
        report.unprobed
    );
    Ok(report)
}
