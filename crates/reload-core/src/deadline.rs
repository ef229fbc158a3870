//! Per-operation deadlines for store calls.

use crate::error::{Phase, ReloadError};
use std::future::Future;
use std::time::Duration;

/// What a bounded store call is doing, for timeout reporting.
#[derive(Debug, Clone, Copy)]
pub struct Operation<'a> {
    pub phase: Phase,
    pub table: &'a str,
    pub name: &'static str,
}

/// Run `fut` under `timeout`; store failures go through `on_error`.
pub async fn bounded<T, F, M>(
    timeout: Duration,
    op: Operation<'_>,
    fut: F,
    on_error: M,
) -> Result<T, ReloadError>
where
    F: Future<Output = anyhow::Result<T>>,
    M: FnOnce(anyhow::Error) -> ReloadError,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(on_error(e)),
        Err(_) => Err(ReloadError::Timeout {
            phase: op.phase,
            table: op.table.to_string(),
            operation: op.name,
            timeout,
        }),
    }
}
