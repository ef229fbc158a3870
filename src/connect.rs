//! Startup delay and connection retries.

use crate::config::RuntimeArgs;
use reload_core::{ConnectTarget, ReloadError};
use reload_mysql::MySqlStore;
use reload_postgresql::PostgresStore;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Delay before the first retry; doubled after every failed attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
/// Upper bound for a single backoff delay.
const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// How to wait for a database that may still be starting.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub startup_delay: Duration,
    /// Attempts after the first one.
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Deadline for one connection attempt.
    pub attempt_timeout: Duration,
}

impl From<&RuntimeArgs> for RetryPolicy {
    fn from(args: &RuntimeArgs) -> Self {
        Self {
            startup_delay: args.startup_delay,
            retries: args.connect_retries,
            base_delay: RETRY_BASE_DELAY,
            max_delay: RETRY_MAX_DELAY,
            attempt_timeout: args.operation_timeout,
        }
    }
}

impl RetryPolicy {
    /// Backoff after the `attempt`-th failure (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Sleep the startup delay, then call `connect` until it succeeds or the
/// retries are exhausted.
pub async fn connect_with_retry<T, F, Fut>(
    target: &ConnectTarget,
    policy: &RetryPolicy,
    mut connect: F,
) -> Result<T, ReloadError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    if !policy.startup_delay.is_zero() {
        info!("Waiting {:?} before connecting", policy.startup_delay);
        sleep(policy.startup_delay).await;
    }

    let attempts = policy.retries.saturating_add(1);
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(policy.attempt_timeout, connect()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "connection attempt timed out after {:?}",
                policy.attempt_timeout
            )),
        };
        match result {
            Ok(store) => return Ok(store),
            Err(e) if attempt < attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    "Failed to connect to {} (attempt {}/{}): {:#}. Retrying in {:?}...",
                    target, attempt, attempts, e, delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(ReloadError::Connection {
                    target: target.to_string(),
                    source: e.into(),
                })
            }
        }
    }
}

pub async fn connect_postgresql(
    target: &ConnectTarget,
    policy: &RetryPolicy,
) -> Result<PostgresStore, ReloadError> {
    connect_with_retry(target, policy, || PostgresStore::connect(target)).await
}

pub async fn connect_mysql(
    target: &ConnectTarget,
    policy: &RetryPolicy,
) -> Result<MySqlStore, ReloadError> {
    connect_with_retry(target, policy, || MySqlStore::connect(target)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use reload_core::Phase;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            startup_delay: Duration::ZERO,
            retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            attempt_timeout: Duration::from_secs(1),
        }
    }

    fn target() -> ConnectTarget {
        ConnectTarget::Url("postgres://app:secret@db:5432/catalog".into())
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
            ..fast_policy(5)
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
        assert_eq!(policy.backoff(4), Duration::from_secs(3));
        assert_eq!(policy.backoff(40), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let value = connect_with_retry(&target(), &fast_policy(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    anyhow::bail!("connection refused");
                }
                Ok(n)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_with_connection_error() {
        let calls = AtomicU32::new(0);
        let err = connect_with_retry(&target(), &fast_policy(2), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(anyhow::anyhow!("connection refused")) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.phase(), Phase::Connect);
        assert_eq!(err.exit_code(), 2);
        assert!(!err.to_string().contains("secret"));
    }
}
