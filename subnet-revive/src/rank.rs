use std::cmp::Ordering;
use std::sync::LazyLock;
use regex::Regex;
use shared::protocol::PRIORITY_PREFIX;
use shared::types::{CandidateTemplate, DiscoveryRecord};

static PRIORITY_CHANNEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i){}[- ]?(\d+)", PRIORITY_PREFIX))
        .expect("priority channel pattern is valid")
});

/// Sort key for a channel label.
///
/// Priority channels ("CCTV-1", "cctv 13", "CCTV5+") come first ordered by
/// their number; everything else follows in plain string order.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChannelKey<'a> {
    Priority(u64, &'a str),
    Other(&'a str),
}

pub fn channel_key(label: &str) -> ChannelKey<'_> {
    match PRIORITY_CHANNEL.captures(label) {
        Some(caps) => {
            let number = caps[1].parse().unwrap_or(u64::MAX);
            ChannelKey::Priority(number, label)
        }
        None => ChannelKey::Other(label),
    }
}

pub fn sort_templates(templates: &mut [CandidateTemplate]) {
    templates.sort_by(|a, b| channel_key(&a.label).cmp(&channel_key(&b.label)));
}

fn record_order(a: &DiscoveryRecord, b: &DiscoveryRecord) -> Ordering {
    a.latency
        .cmp(&b.latency)
        .then_with(|| a.address.cmp(&b.address))
        .then_with(|| a.port.cmp(&b.port))
}

/// Fastest first, ties by address; templates in channel order.
pub fn rank(mut records: Vec<DiscoveryRecord>) -> Vec<DiscoveryRecord> {
    records.sort_by(record_order);
    for record in &mut records {
        sort_templates(&mut record.templates);
    }
    records
}
