use std::collections::HashMap;
use http::Uri;
use shared::protocol::{DEFAULT_PORT, GENRE_MARKER};
use shared::types::{CandidateTemplate, EndpointGroup};

/// Input problems that skip a line or a group without failing the batch
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseIssue {
    #[error("line {line}: unparseable group header {header:?}")]
    BadHeader { line: usize, header: String },
    #[error("line {line}: expected label,url")]
    Unrecognized { line: usize },
    #[error("line {line}: template outside any group")]
    Orphan { line: usize },
    #[error("line {line}: unparseable url {url:?}")]
    BadUrl { line: usize, url: String },
    #[error("group {endpoint} has no templates")]
    Empty { endpoint: String },
}

#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub groups: Vec<EndpointGroup>,
    pub issues: Vec<ParseIssue>,
}

/// Parse the group text format.
///
/// Repeated headers for one endpoint merge into a single group, and a label
/// seen twice in a group keeps its first URL.
pub fn parse_groups(text: &str) -> ParsedBatch {
    let mut batch = ParsedBatch::default();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut current: Option<usize> = None;

    for (n, raw) in text.lines().enumerate() {
        let line_no = n + 1;
        let line = raw.trim();

        if line.is_empty() {
            current = None;
            continue;
        }

        if line.contains(GENRE_MARKER) {
            let header = line.split(',').next().unwrap_or_default();
            current = match parse_endpoint(header) {
                Some((address, port)) => {
                    let group = EndpointGroup::new(address, port);
                    let slot = *index.entry(group.endpoint()).or_insert_with(|| {
                        batch.groups.push(group);
                        batch.groups.len() - 1
                    });
                    Some(slot)
                }
                None => {
                    batch.issues.push(ParseIssue::BadHeader {
                        line: line_no,
                        header: header.to_string(),
                    });
                    None
                }
            };
            continue;
        }

        // Stray playlist directives such as #EXTM3U
        if line.starts_with('#') {
            continue;
        }

        let Some((label, url)) = line.split_once(',') else {
            batch.issues.push(ParseIssue::Unrecognized { line: line_no });
            continue;
        };

        let Some(slot) = current else {
            batch.issues.push(ParseIssue::Orphan { line: line_no });
            continue;
        };

        let label = label.trim();
        match template_path(url.trim()) {
            Some(path) if !label.is_empty() => {
                batch.groups[slot].insert_template(CandidateTemplate::new(label, path));
            }
            _ => batch.issues.push(ParseIssue::BadUrl {
                line: line_no,
                url: url.trim().to_string(),
            }),
        }
    }

    let (groups, empty): (Vec<_>, Vec<_>) = batch.groups.into_iter().partition(|g| !g.is_empty());
    batch.issues.extend(
        empty
            .into_iter()
            .map(|g| ParseIssue::Empty { endpoint: g.endpoint() }),
    );
    batch.groups = groups;
    batch
}

/// Split `host[:port][ annotation]` into host and port.
pub fn parse_endpoint(header: &str) -> Option<(String, u16)> {
    let token = header.split_whitespace().next()?;
    let token = token.strip_prefix("http://").unwrap_or(token);
    let token = token.trim_end_matches('/');

    let (host, port) = match token.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().ok().filter(|p| *p > 0)?),
        None => (token, DEFAULT_PORT),
    };

    let valid_host = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    valid_host.then(|| (host.to_string(), port))
}

/// Path-and-query of an absolute http URL
fn template_path(url: &str) -> Option<String> {
    let uri: Uri = url.parse().ok()?;
    if uri.scheme_str() != Some("http") || uri.authority().is_none() {
        return None;
    }
    Some(
        uri.path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_groups_and_annotations() {
        let batch = parse_groups(
            "10.0.0.9:80 40ms,#genre#\n\
             NEWS,http://10.0.0.9:80/stream.m3u8\n\
             CCTV-1,http://10.0.0.9/tsfile/live/0001_1.m3u8?key=txiptv&playlive=1\n\
             \n\
             10.0.1.7:8080,#genre#\n\
             SPORT,http://10.0.1.7:8080/sport.m3u8\n",
        );

        assert!(batch.issues.is_empty(), "{:?}", batch.issues);
        assert_eq!(batch.groups.len(), 2);

        let first = &batch.groups[0];
        assert_eq!(first.endpoint(), "10.0.0.9:80");
        assert_eq!(first.templates()[0], CandidateTemplate::new("NEWS", "/stream.m3u8"));
        assert_eq!(
            first.templates()[1].path,
            "/tsfile/live/0001_1.m3u8?key=txiptv&playlive=1"
        );
        assert_eq!(batch.groups[1].endpoint(), "10.0.1.7:8080");
    }

    #[test]
    fn test_header_without_port_defaults_to_80() {
        assert_eq!(parse_endpoint("10.0.0.5"), Some(("10.0.0.5".to_string(), 80)));
        assert_eq!(
            parse_endpoint("news.example.com:8080 A+"),
            Some(("news.example.com".to_string(), 8080))
        );
        assert_eq!(parse_endpoint("10.0.0.5:http"), None);
        assert_eq!(parse_endpoint("10.0.0.5:0"), None);
        assert_eq!(parse_endpoint(""), None);
    }

    #[test]
    fn test_repeated_header_merges_first_label_wins() {
        let batch = parse_groups(
            "10.0.0.5:80,#genre#\n\
             NEWS,http://10.0.0.5:80/a.m3u8\n\
             \n\
             10.0.0.5:80,#genre#\n\
             NEWS,http://10.0.0.5:80/b.m3u8\n\
             MOVIE,http://10.0.0.5:80/c.m3u8\n",
        );

        assert_eq!(batch.groups.len(), 1);
        let templates = batch.groups[0].templates();
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].path, "/a.m3u8");
        assert_eq!(templates[1].label, "MOVIE");
    }

    #[test]
    fn test_malformed_input_is_reported_not_fatal() {
        let batch = parse_groups(
            "ORPHAN,http://1.2.3.4/x.m3u8\n\
             bad_host!:80,#genre#\n\
             X,http://1.2.3.4/x.m3u8\n\
             \n\
             10.0.0.1:80,#genre#\n\
             BROKEN,not a url\n\
             \n\
             10.0.0.2:80,#genre#\n\
             OK,http://10.0.0.2/ok.m3u8\n",
        );

        assert_eq!(batch.groups.len(), 1);
        assert_eq!(batch.groups[0].endpoint(), "10.0.0.2:80");
        assert!(matches!(batch.issues[0], ParseIssue::Orphan { line: 1 }));
        assert!(matches!(batch.issues[1], ParseIssue::BadHeader { line: 2, .. }));
        assert!(matches!(batch.issues[2], ParseIssue::Orphan { line: 3 }));
        assert!(matches!(batch.issues[3], ParseIssue::BadUrl { line: 6, .. }));
        assert_eq!(
            batch.issues[4],
            ParseIssue::Empty { endpoint: "10.0.0.1:80".to_string() }
        );
    }

    #[test]
    fn test_line_without_comma_is_reported() {
        let batch = parse_groups(
            "10.0.0.1:80,#genre#\n\
             just some text\n\
             OK,http://10.0.0.1/ok.m3u8\n",
        );

        assert_eq!(batch.groups.len(), 1);
        assert_eq!(batch.groups[0].templates().len(), 1);
        assert_eq!(batch.issues, vec![ParseIssue::Unrecognized { line: 2 }]);
    }

    #[test]
    fn test_rejects_non_http_templates() {
        let batch = parse_groups("10.0.0.1:80,#genre#\nRTP,rtp://239.3.1.1:8000\n");
        assert!(batch.groups.is_empty());
        assert!(matches!(batch.issues[0], ParseIssue::BadUrl { .. }));
    }
}
