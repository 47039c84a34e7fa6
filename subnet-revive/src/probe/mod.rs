pub mod client;
pub mod retry;

use futures::future::BoxFuture;
use shared::types::ProbeOutcome;

pub use self::client::{HttpProber, ProbeFailure};
pub use self::retry::{RetryPolicy, Retrying};

/// Something that can check a URL for liveness.
///
/// Implementations never fail: every error becomes a dead outcome.
pub trait Probe: Send + Sync {
    fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, ProbeOutcome>;
}
