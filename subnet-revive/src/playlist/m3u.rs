use shared::protocol::PLAYLIST_SIGNATURE;
use shared::types::{CandidateTemplate, EndpointGroup};
use crate::config::M3uConfig;
use crate::rank::sort_templates;

/// Render groups as an extended M3U playlist, one `group-title` per endpoint.
pub fn render_m3u(groups: &[EndpointGroup], config: &M3uConfig) -> String {
    let mut lines = vec![format!("{} x-tvg-url=\"{}\"", PLAYLIST_SIGNATURE, config.epg_url)];

    for group in groups {
        let title = group.endpoint();
        let mut templates: Vec<CandidateTemplate> = group.templates().to_vec();
        sort_templates(&mut templates);

        for template in &templates {
            let name = &template.label;
            lines.push(format!(
                "#EXTINF:-1 tvg-name=\"{}\" tvg-logo=\"{}{}.png\" group-title=\"{}\",{}",
                name,
                config.logo_base_url,
                logo_name(name),
                title,
                name
            ));
            lines.push(template.url_at(&group.address, group.port));
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Logo files are named without dashes or spaces: "CCTV-1" -> "CCTV1"
fn logo_name(label: &str) -> String {
    label
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect()
}

/// Pull `(display name, url)` pairs out of an M3U body.
///
/// The name is whatever follows the last comma of the `#EXTINF` line right
/// before an `http` URL. URLs without a preceding `#EXTINF` are skipped.
pub fn parse_extinf_entries(text: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    let mut current: Option<String> = None;

    for line in text.lines().map(str::trim) {
        if line.starts_with("#EXTINF") {
            current = line.rsplit(',').next().map(|n| n.trim().to_string());
        } else if line.starts_with("http") {
            if let Some(name) = current.take() {
                entries.push((name, line.to_string()));
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_m3u() {
        let mut group = EndpointGroup::new("10.0.0.9", 8080);
        group.insert_template(CandidateTemplate::new("NEWS", "/news.m3u8"));
        group.insert_template(CandidateTemplate::new("CCTV-1", "/c1.m3u8"));
        let config = M3uConfig {
            epg_url: "http://epg.example/e.xml".to_string(),
            logo_base_url: "http://logo.example/".to_string(),
        };

        let text = render_m3u(&[group], &config);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "#EXTM3U x-tvg-url=\"http://epg.example/e.xml\"");
        assert_eq!(
            lines[1],
            "#EXTINF:-1 tvg-name=\"CCTV-1\" tvg-logo=\"http://logo.example/CCTV1.png\" group-title=\"10.0.0.9:8080\",CCTV-1"
        );
        assert_eq!(lines[2], "http://10.0.0.9:8080/c1.m3u8");
        assert_eq!(lines[4], "http://10.0.0.9:8080/news.m3u8");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_parse_extinf_entries() {
        let text = "#EXTM3U\n\
                    #EXTINF:-1 tvg-id=\"1\" group-title=\"央视\",CCTV-01 高清\n\
                    http://1.2.3.4:9901/tsfile/live/0001_1.m3u8\n\
                    http://1.2.3.4:9901/orphan.m3u8\n\
                    #EXTINF:-1,湖南卫视\n\
                    #EXTVLCOPT:http-user-agent=VLC\n\
                    http://1.2.3.4:9901/hunan.m3u8\n";

        let entries = parse_extinf_entries(text);
        assert_eq!(
            entries,
            vec![
                ("CCTV-01 高清".to_string(), "http://1.2.3.4:9901/tsfile/live/0001_1.m3u8".to_string()),
                ("湖南卫视".to_string(), "http://1.2.3.4:9901/hunan.m3u8".to_string()),
            ]
        );
    }
}
