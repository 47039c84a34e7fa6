use std::net::Ipv4Addr;
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// One named sub-resource of an endpoint, stored relative to the endpoint so
/// it can be rebound to any sibling address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateTemplate {
    /// Display label, e.g. "CCTV-1"
    pub label: String,

    /// Path and query, always starting with '/'
    pub path: String,
}

impl CandidateTemplate {
    pub fn new(label: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') { path } else { format!("/{path}") };
        Self {
            label: label.into(),
            path,
        }
    }

    /// Full URL of this template served from `address:port`
    pub fn url_at(&self, address: &str, port: u16) -> String {
        format!("http://{}:{}{}", address, port, self.path)
    }
}

/// A candidate endpoint and its templates, in input order.
///
/// Labels are unique within a group. Recovery never edits a group: it calls
/// [`EndpointGroup::rebind`] and gets a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointGroup {
    pub address: String,
    pub port: u16,
    templates: Vec<CandidateTemplate>,
}

impl EndpointGroup {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            templates: Vec::new(),
        }
    }

    /// Add a template unless its label is already taken. Returns true if added.
    pub fn insert_template(&mut self, template: CandidateTemplate) -> bool {
        if self.templates.iter().any(|t| t.label == template.label) {
            return false;
        }
        self.templates.push(template);
        true
    }

    pub fn templates(&self) -> &[CandidateTemplate] {
        &self.templates
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// "address:port", the identity used in headers and logs
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// The address as a literal dotted-quad, if it is one
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.address.parse().ok()
    }

    /// The template probed on behalf of the whole group: the one labelled
    /// `canary_label` if present, otherwise the first.
    pub fn representative(&self, canary_label: &str) -> Option<&CandidateTemplate> {
        self.templates
            .iter()
            .find(|t| t.label == canary_label)
            .or_else(|| self.templates.first())
    }

    /// Same port and templates, served from another address
    pub fn rebind(&self, address: impl Into<String>) -> EndpointGroup {
        EndpointGroup {
            address: address.into(),
            port: self.port,
            templates: self.templates.clone(),
        }
    }
}

/// Result of a single liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub alive: bool,
    /// Wall-clock time of the successful request; None when dead
    pub latency: Option<Duration>,
}

impl ProbeOutcome {
    pub fn alive(latency: Duration) -> Self {
        Self {
            alive: true,
            latency: Some(latency),
        }
    }

    pub fn dead() -> Self {
        Self {
            alive: false,
            latency: None,
        }
    }
}

/// How a record got into the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    /// The original endpoint answered at precheck
    Precheck,
    /// Found by sweeping the /24 of a dead endpoint
    Recovered { from: String },
}

/// A verified endpoint with its templates bound to the resolved address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    pub address: String,
    pub port: u16,
    pub templates: Vec<CandidateTemplate>,
    pub latency: Duration,
    pub origin: Origin,
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveryRecord {
    /// Record for `group` as it stands, measured at `latency`
    pub fn from_group(group: &EndpointGroup, latency: Duration, origin: Origin) -> Self {
        Self {
            address: group.address.clone(),
            port: group.port,
            templates: group.templates().to_vec(),
            latency,
            origin,
            discovered_at: Utc::now(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
