use std::time::Duration;
use shared::protocol::GENRE_MARKER;
use shared::types::{CandidateTemplate, DiscoveryRecord, EndpointGroup};

/// Render ranked records. Order is taken as given.
pub fn render_records(records: &[DiscoveryRecord], annotate_latency: bool) -> String {
    let mut out = String::new();
    for record in records {
        let latency = annotate_latency.then_some(record.latency);
        write_group(&mut out, &record.address, record.port, &record.templates, latency);
    }
    out
}

/// Render unprobed groups, e.g. the output of `aggregate`
pub fn render_groups(groups: &[EndpointGroup]) -> String {
    let mut out = String::new();
    for group in groups {
        write_group(&mut out, &group.address, group.port, group.templates(), None);
    }
    out
}

fn write_group(
    out: &mut String,
    address: &str,
    port: u16,
    templates: &[CandidateTemplate],
    latency: Option<Duration>,
) {
    let annotation = latency
        .map(|l| format!(" {}ms", l.as_millis()))
        .unwrap_or_default();
    out.push_str(&format!("{address}:{port}{annotation},{GENRE_MARKER}\n"));

    for template in templates {
        out.push_str(&format!("{},{}\n", template.label, template.url_at(address, port)));
    }
    out.push('\n');
}
