use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use shared::types::{DiscoveryRecord, EndpointGroup, Origin};

use crate::config::{RecoveryConfig, RecoveryPolicy};
use crate::pool::spawn_pool;
use crate::probe::Probe;
use crate::registry::RegistryHandle;

/// What happened to one group's sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// `hits` live siblings found, `stored` of them new to the registry
    Recovered { hits: usize, stored: usize },
    /// No sibling answered
    Dropped,
    /// Address is not a literal IPv4; nothing to sweep
    NotIpv4,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Groups that produced at least one new record
    pub recovered: usize,
    /// Records added across all sweeps
    pub records_added: usize,
    /// Groups whose hits were all already registered
    pub merged: usize,
    pub dropped: usize,
    pub non_ipv4: usize,
    /// Groups never swept because the run was cancelled
    pub skipped: usize,
}

/// Every other host of `ip`'s /24: last octet 1..=255 minus `ip` itself,
/// at most 254 addresses.
pub fn sibling_addresses(ip: Ipv4Addr) -> Vec<Ipv4Addr> {
    let [a, b, c, own] = ip.octets();
    (1..=255u8)
        .filter(|host| *host != own)
        .take(254)
        .map(|host| Ipv4Addr::new(a, b, c, host))
        .collect()
}

/// Sweep the /24 around one dead group, probing its canary template on
/// every other host of the block.
///
/// With `FirstHit` the sweep stops at the first live sibling and the whole
/// group moves there. With `FullSweep` every live sibling is stored.
pub async fn sweep_group(
    group: &EndpointGroup,
    prober: Arc<dyn Probe>,
    registry: &RegistryHandle,
    config: &RecoveryConfig,
    cancel: &CancellationToken,
) -> Result<SweepOutcome> {
    let Some(ip) = group.ipv4() else {
        tracing::warn!("{} is not an IPv4 address, not sweeping", group.endpoint());
        return Ok(SweepOutcome::NotIpv4);
    };
    let Some(canary) = group.representative(&config.canary_label).cloned() else {
        return Ok(SweepOutcome::Dropped);
    };

    let [a, b, c, _] = ip.octets();
    tracing::info!("Sweeping {}.{}.{}.x:{} for {}", a, b, c, group.port, group.endpoint());

    // Scoped to this sweep so a first hit stops only our own workers.
    let scan = cancel.child_token();
    let port = group.port;
    let mut rx = spawn_pool(
        sibling_addresses(ip),
        config.workers,
        scan.clone(),
        move |addr: Ipv4Addr| {
            let prober = prober.clone();
            let url = canary.url_at(&addr.to_string(), port);
            async move { (addr, prober.probe(&url).await) }
        },
    );

    let mut hits = 0;
    let mut stored = 0;
    while let Some((addr, outcome)) = rx.recv().await {
        let Some(latency) = outcome.latency.filter(|_| outcome.alive) else {
            continue;
        };
        hits += 1;

        let moved = group.rebind(addr.to_string());
        let record = DiscoveryRecord::from_group(
            &moved,
            latency,
            Origin::Recovered { from: group.endpoint() },
        );
        if registry.insert_if_absent(record).await? {
            stored += 1;
            tracing::info!("  [+] recovered {} -> {} ({}ms)", group.endpoint(), moved.endpoint(), latency.as_millis());
        } else {
            tracing::debug!("{} already registered, discarding", moved.endpoint());
        }

        if config.policy == RecoveryPolicy::FirstHit {
            break;
        }
    }
    scan.cancel();

    if hits == 0 {
        tracing::info!("  [-] no live sibling for {}", group.endpoint());
        Ok(SweepOutcome::Dropped)
    } else {
        Ok(SweepOutcome::Recovered { hits, stored })
    }
}

/// Sweep every dead group, `group_parallelism` at a time.
pub async fn recover_all(
    groups: Vec<EndpointGroup>,
    prober: Arc<dyn Probe>,
    registry: &RegistryHandle,
    config: &RecoveryConfig,
    cancel: CancellationToken,
) -> Result<RecoveryReport> {
    let total = groups.len();
    tracing::info!(
        "Recovering {} groups ({:?}, {} workers per sweep)",
        total, config.policy, config.workers
    );

    let mut sweeps = stream::iter(groups.iter().enumerate())
        .map(|(idx, group)| {
            let prober = prober.clone();
            let cancel = &cancel;
            async move {
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                tracing::debug!("[{}/{}] sweeping {}", idx + 1, total, group.endpoint());
                sweep_group(group, prober, registry, config, cancel).await.map(Some)
            }
        })
        .buffer_unordered(config.group_parallelism.max(1));

    let mut report = RecoveryReport::default();
    while let Some(outcome) = sweeps.next().await {
        match outcome? {
            Some(SweepOutcome::Recovered { stored: 0, .. }) => report.merged += 1,
            Some(SweepOutcome::Recovered { stored, .. }) => {
                report.recovered += 1;
                report.records_added += stored;
            }
            Some(SweepOutcome::Dropped) => report.dropped += 1,
            Some(SweepOutcome::NotIpv4) => report.non_ipv4 += 1,
            None => report.skipped += 1,
        }
    }

    tracing::info!(
        "Recovery done: {} recovered ({} records), {} merged, {} dropped, {} not IPv4, {} skipped",
        report.recovered,
        report.records_added,
        report.merged,
        report.dropped,
        report.non_ipv4,
        report.skipped
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;
    use shared::types::CandidateTemplate;
    use crate::config::{DedupKey, ProbeConfig};
    use crate::probe::testing::{spawn_origin, ScriptedProber};
    use crate::probe::HttpProber;

    fn group(address: &str, port: u16) -> EndpointGroup {
        let mut g = EndpointGroup::new(address, port);
        g.insert_template(CandidateTemplate::new("NEWS", "/stream.m3u8?ch=1"));
        g.insert_template(CandidateTemplate::new("CCTV-1", "/live.m3u8"));
        g
    }

    fn config(policy: RecoveryPolicy, workers: usize) -> RecoveryConfig {
        RecoveryConfig {
            workers,
            policy,
            ..RecoveryConfig::default()
        }
    }

    fn host_of(url: &str) -> Ipv4Addr {
        let uri: http::Uri = url.parse().unwrap();
        uri.host().unwrap().parse().unwrap()
    }

    #[test]
    fn test_sibling_range() {
        let siblings = sibling_addresses(Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(siblings.len(), 254);
        assert_eq!(siblings.iter().collect::<HashSet<_>>().len(), 254);
        assert!(!siblings.contains(&Ipv4Addr::new(10, 0, 0, 5)));
        assert!(siblings.contains(&Ipv4Addr::new(10, 0, 0, 1)));
        assert!(siblings.contains(&Ipv4Addr::new(10, 0, 0, 255)));
        assert!(siblings.iter().all(|ip| ip.octets()[..3] == [10, 0, 0]));

        let from_network = sibling_addresses(Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(from_network.len(), 254);
    }

    #[tokio::test]
    async fn test_full_sweep_examines_every_sibling_once() {
        let prober = Arc::new(ScriptedProber::new());
        let registry = RegistryHandle::spawn(DedupKey::HostPort);

        let outcome = sweep_group(
            &group("10.0.0.5", 80),
            prober.clone(),
            &registry,
            &config(RecoveryPolicy::FullSweep, 16),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, SweepOutcome::Dropped);

        let seen = prober.seen();
        let hosts: HashSet<_> = seen.iter().map(|u| host_of(u)).collect();
        assert_eq!(seen.len(), 254);
        assert_eq!(hosts.len(), 254);
        assert!(!hosts.contains(&Ipv4Addr::new(10, 0, 0, 5)));
        // Canary keeps port, path and query.
        assert!(seen.iter().all(|u| u.ends_with(":80/live.m3u8")));
        assert_eq!(registry.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_full_sweep_keeps_every_live_sibling() {
        let prober = Arc::new(ScriptedProber::new().live("10.0.0.9:80", 40).live("10.0.0.200:80", 70));
        let registry = RegistryHandle::spawn(DedupKey::HostPort);

        let outcome = sweep_group(
            &group("10.0.0.5", 80),
            prober,
            &registry,
            &config(RecoveryPolicy::FullSweep, 8),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, SweepOutcome::Recovered { hits: 2, stored: 2 });

        let records = registry.snapshot().await.unwrap();
        let endpoints: HashSet<_> = records.iter().map(|r| r.endpoint()).collect();
        assert_eq!(endpoints, HashSet::from(["10.0.0.9:80".to_string(), "10.0.0.200:80".to_string()]));
        assert!(records.iter().all(|r| r.templates.len() == 2));
    }

    #[tokio::test]
    async fn test_first_hit_moves_whole_group_and_stops() {
        let prober = Arc::new(
            ScriptedProber::new()
                .live("10.0.0.9:8080", 40)
                .delay(Duration::from_millis(20)),
        );
        let registry = RegistryHandle::spawn(DedupKey::HostPort);

        let outcome = sweep_group(
            &group("10.0.0.5", 8080),
            prober.clone(),
            &registry,
            &config(RecoveryPolicy::FirstHit, 4),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, SweepOutcome::Recovered { hits: 1, stored: 1 });

        let records = registry.snapshot().await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.endpoint(), "10.0.0.9:8080");
        assert_eq!(record.origin, Origin::Recovered { from: "10.0.0.5:8080".into() });
        let paths: Vec<_> = record.templates.iter().map(|t| t.path.as_str()).collect();
        assert_eq!(paths, vec!["/stream.m3u8?ch=1", "/live.m3u8"]);

        // Cancelled long before the block was exhausted.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(prober.seen().len() < 254);
    }

    #[tokio::test]
    async fn test_non_ipv4_is_not_swept() {
        let prober = Arc::new(ScriptedProber::new());
        let registry = RegistryHandle::spawn(DedupKey::HostPort);

        let outcome = sweep_group(
            &group("news.example.com", 80),
            prober.clone(),
            &registry,
            &config(RecoveryPolicy::FirstHit, 8),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, SweepOutcome::NotIpv4);
        assert!(prober.seen().is_empty());
    }

    #[tokio::test]
    async fn test_hit_on_registered_address_is_discarded() {
        let prober = Arc::new(ScriptedProber::new().live("10.0.0.9:80", 3));
        let registry = RegistryHandle::spawn(DedupKey::HostPort);
        let known = DiscoveryRecord::from_group(&group("10.0.0.9", 80), Duration::from_millis(40), Origin::Precheck);
        registry.insert_if_absent(known).await.unwrap();

        let report = recover_all(
            vec![group("10.0.0.5", 80)],
            prober,
            &registry,
            &config(RecoveryPolicy::FirstHit, 16),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(report.merged, 1);
        assert_eq!(report.recovered, 0);

        let records = registry.snapshot().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].latency, Duration::from_millis(40));
        assert_eq!(records[0].origin, Origin::Precheck);
    }

    #[tokio::test]
    async fn test_recover_all_tallies_outcomes() {
        let prober = Arc::new(ScriptedProber::new().live("10.1.1.77:80", 12));
        let registry = RegistryHandle::spawn(DedupKey::HostPort);

        let report = recover_all(
            vec![group("10.1.1.5", 80), group("10.2.2.5", 80), group("cdn.example.net", 80)],
            prober,
            &registry,
            &config(RecoveryPolicy::FirstHit, 32),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(
            report,
            RecoveryReport {
                recovered: 1,
                records_added: 1,
                merged: 0,
                dropped: 1,
                non_ipv4: 1,
                skipped: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_sweeps() {
        let prober = Arc::new(ScriptedProber::new());
        let registry = RegistryHandle::spawn(DedupKey::HostPort);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = recover_all(
            vec![group("10.1.1.5", 80), group("10.2.2.5", 80)],
            prober.clone(),
            &registry,
            &config(RecoveryPolicy::FirstHit, 8),
            cancel,
        )
        .await
        .unwrap();
        assert_eq!(report.skipped, 2);
        assert!(prober.seen().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_finds_live_sibling_on_loopback() {
        // Any 127.0.0.0/8 address is local on Linux; serve only on .9.
        let origin = spawn_origin(Ipv4Addr::new(127, 0, 0, 9), 0).await;
        let prober = Arc::new(HttpProber::new(&ProbeConfig {
            timeout_ms: 1000,
            ..ProbeConfig::default()
        }));
        let registry = RegistryHandle::spawn(DedupKey::HostPort);

        let outcome = sweep_group(
            &group("127.0.0.5", origin.port()),
            prober,
            &registry,
            &config(RecoveryPolicy::FirstHit, 64),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, SweepOutcome::Recovered { hits: 1, stored: 1 });

        let records = registry.snapshot().await.unwrap();
        assert_eq!(records[0].endpoint(), format!("127.0.0.9:{}", origin.port()));
    }
}
