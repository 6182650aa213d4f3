//! Deadline helpers.
//!
//! Every probe runs against one absolute deadline; expiry is reported as
//! [`ProtocolError::TimedOut`] so callers never confuse it with socket I/O
//! failures.

use std::future::Future;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};

use crate::error::{ProtocolError, Result};

/// Default client-side request timeout.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout used when verifying a heartbeat.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(2);

/// Run `fut` until the absolute `deadline`.
pub async fn with_deadline<F, T>(deadline: Instant, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    timeout_at(deadline, fut)
        .await
        .map_err(|_| ProtocolError::TimedOut)?
}
