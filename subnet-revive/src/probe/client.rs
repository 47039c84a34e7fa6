use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::future::BoxFuture;
use http::header::{HOST, USER_AGENT};
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio_util::task::AbortOnDropHandle;

use shared::protocol::DEFAULT_PORT;
use shared::types::ProbeOutcome;

use crate::config::ProbeConfig;
use super::Probe;

/// Why a probe came back dead
#[derive(Debug, thiserror::Error)]
pub enum ProbeFailure {
    #[error("invalid url")]
    InvalidUrl,
    #[error("unsupported scheme {0}")]
    UnsupportedScheme(String),
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("http: {0}")]
    Http(#[from] hyper::Error),
    #[error("request build: {0}")]
    Request(#[from] http::Error),
    #[error("status {0} not accepted")]
    Status(u16),
    #[error("signature missing from body prefix")]
    MissingSignature,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone)]
pub struct HttpProber {
    timeout: Duration,
    signature: Vec<u8>,
    accepted_status: Vec<u16>,
    read_limit: usize,
    user_agent: String,
}

impl HttpProber {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            timeout: config.timeout(),
            signature: config.signature.as_bytes().to_vec(),
            accepted_status: config.accepted_status.clone(),
            read_limit: config.read_limit_bytes,
            user_agent: config.user_agent.clone(),
        }
    }

    /// Probe `url`, returning the elapsed time on success.
    pub async fn check(&self, url: &str) -> Result<Duration, ProbeFailure> {
        match tokio::time::timeout(self.timeout, self.exchange(url)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeFailure::Timeout(self.timeout)),
        }
    }

    async fn exchange(&self, url: &str) -> Result<Duration, ProbeFailure> {
        let uri: Uri = url.parse().map_err(|_| ProbeFailure::InvalidUrl)?;
        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(ProbeFailure::UnsupportedScheme(other.to_string())),
            None => return Err(ProbeFailure::InvalidUrl),
        }
        let authority = uri.authority().ok_or(ProbeFailure::InvalidUrl)?;
        let port = authority.port_u16().unwrap_or(DEFAULT_PORT);
        let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

        let started = Instant::now();

        let stream = TcpStream::connect((authority.host(), port))
            .await
            .map_err(ProbeFailure::Connect)?;
        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

        // Drive the connection until this probe is done with it, however it ends.
        let _conn = AbortOnDropHandle::new(tokio::spawn(async move {
            let _ = conn.await;
        }));

        let req = Request::builder()
            .method(Method::GET)
            .uri(target)
            .header(HOST, authority.as_str())
            .header(USER_AGENT, self.user_agent.as_str())
            .body(Empty::<Bytes>::new())?;

        let resp = sender.send_request(req).await?;
        let status = resp.status().as_u16();
        if !self.accepted_status.contains(&status) {
            return Err(ProbeFailure::Status(status));
        }

        let mut body = resp.into_body();
        let mut prefix = Vec::with_capacity(self.read_limit);
        while prefix.len() < self.read_limit {
            let Some(frame) = body.frame().await else {
                break;
            };
            if let Some(data) = frame?.data_ref() {
                let take = data.len().min(self.read_limit - prefix.len());
                prefix.extend_from_slice(&data[..take]);
                if contains(&prefix, &self.signature) {
                    break;
                }
            }
        }

        let elapsed = started.elapsed();
        if contains(&prefix, &self.signature) {
            Ok(elapsed)
        } else {
            Err(ProbeFailure::MissingSignature)
        }
    }
}

impl Probe for HttpProber {
    fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, ProbeOutcome> {
        Box::pin(async move {
            match self.check(url).await {
                Ok(latency) => ProbeOutcome::alive(latency),
                Err(e) => {
                    tracing::debug!(error = %e, %url, "probe dead");
                    ProbeOutcome::dead()
                }
            }
        })
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}
