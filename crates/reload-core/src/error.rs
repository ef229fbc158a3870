//! Error taxonomy for the reload pipeline.

use crate::swap::SwapState;
use crate::types::Incarnation;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Boxed underlying error (database, IO, CSV).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Pipeline phase an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Config,
    Connect,
    Schema,
    Load,
    Swap,
    Export,
    Verify,
}

impl Phase {
    /// Process exit code for failures in this phase.
    pub fn exit_code(self) -> i32 {
        match self {
            Phase::Config => 1,
            Phase::Connect => 2,
            Phase::Schema => 3,
            Phase::Load => 4,
            Phase::Swap => 5,
            Phase::Export => 6,
            Phase::Verify => 7,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Config => "config",
            Phase::Connect => "connect",
            Phase::Schema => "schema",
            Phase::Load => "load",
            Phase::Swap => "swap",
            Phase::Export => "export",
            Phase::Verify => "verify",
        };
        f.write_str(name)
    }
}

/// Errors that abort a reload run.
///
/// None of these are retried: a reload either completes or is investigated
/// and re-run.
#[derive(Error, Debug)]
pub enum ReloadError {
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The database could not be reached.
    #[error("Failed to connect to {target}")]
    Connection {
        target: String,
        #[source]
        source: BoxError,
    },

    /// Creating or dropping a table failed.
    #[error("Failed to {operation} table '{table}'")]
    Schema {
        table: String,
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    /// A bulk insert into a shadow table failed.
    #[error("Failed to batch insert {rows} rows (batch {batch}) into '{table}'")]
    Load {
        table: String,
        batch: u64,
        rows: usize,
        #[source]
        source: BoxError,
    },

    /// Promotion of the shadow tables failed.
    #[error("Failed to promote the buffer tables")]
    Swap {
        #[source]
        source: BoxError,
    },

    /// Reading or writing an export file failed.
    #[error("Failed to export table '{table}'")]
    Export {
        table: String,
        #[source]
        source: BoxError,
    },

    /// The live dataset breaks one of its invariants.
    #[error("Dataset verification failed: {0}")]
    Verify(String),

    /// A database operation exceeded its deadline.
    #[error("{phase} operation '{operation}' on '{table}' exceeded its deadline of {timeout:?}")]
    Timeout {
        phase: Phase,
        table: String,
        operation: &'static str,
        timeout: Duration,
    },

    /// The swap state machine was driven out of order.
    #[error("Invalid swap transition from {from:?} to {to:?}")]
    InvalidState { from: SwapState, to: SwapState },
}

impl ReloadError {
    /// Phase the failure belongs to.
    pub fn phase(&self) -> Phase {
        match self {
            ReloadError::Config(_) => Phase::Config,
            ReloadError::Connection { .. } => Phase::Connect,
            ReloadError::Schema { .. } => Phase::Schema,
            ReloadError::Load { .. } => Phase::Load,
            ReloadError::Swap { .. } | ReloadError::InvalidState { .. } => Phase::Swap,
            ReloadError::Export { .. } => Phase::Export,
            ReloadError::Verify(_) => Phase::Verify,
            ReloadError::Timeout { phase, .. } => *phase,
        }
    }

    /// Process exit code for this failure class.
    pub fn exit_code(&self) -> i32 {
        self.phase().exit_code()
    }

    /// Operator guidance printed after the error.
    pub fn recovery_hint(&self) -> Option<&'static str> {
        // Outside a promotion only the reset subcommand drops live tables.
        let dropped_live = match self {
            ReloadError::Schema {
                table, operation, ..
            }
            | ReloadError::Timeout {
                table, operation, ..
            } => *operation == "drop" && Incarnation::Live.owns(table),
            _ => false,
        };
        match self.phase() {
            Phase::Schema if dropped_live => Some(
                "the reset stopped part-way and some live tables may already be gone; run `catalog-reload reset` again, then a full reload",
            ),
            Phase::Schema | Phase::Load => Some(
                "live tables still hold the previous dataset; fix the cause and re-run (leftover buffer tables are dropped at the start of every run)",
            ),
            Phase::Swap => Some(
                "promotion is all-or-nothing, so the live tables hold either the previous or the new dataset; run `catalog-reload verify`, then re-run",
            ),
            Phase::Connect => Some("check that the database is reachable and the credentials are correct"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_error() -> BoxError {
        Box::new(std::io::Error::other("boom"))
    }

    #[test]
    fn test_exit_codes_by_class() {
        let schema = ReloadError::Schema {
            table: "products".into(),
            operation: "create",
            source: io_error(),
        };
        let load = ReloadError::Load {
            table: "products_buffer".into(),
            batch: 3,
            rows: 1000,
            source: io_error(),
        };
        let swap = ReloadError::Swap { source: io_error() };

        assert_eq!(schema.exit_code(), 3);
        assert_eq!(load.exit_code(), 4);
        assert_eq!(swap.exit_code(), 5);
        assert_ne!(schema.exit_code(), load.exit_code());
    }

    #[test]
    fn test_timeout_classified_by_phase() {
        let err = ReloadError::Timeout {
            phase: Phase::Load,
            table: "substitutions_buffer".into(),
            operation: "bulk insert",
            timeout: Duration::from_secs(5),
        };
        assert_eq!(err.phase(), Phase::Load);
        assert!(err.to_string().contains("substitutions_buffer"));
    }

    #[test]
    fn test_source_preserved() {
        let err = ReloadError::Swap { source: io_error() };
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "boom");
        assert!(err.recovery_hint().is_some());
    }

    #[test]
    fn test_hint_depends_on_what_failed() {
        let dropping_live = ReloadError::Schema {
            table: "products".into(),
            operation: "drop",
            source: io_error(),
        };
        let dropping_buffer = ReloadError::Schema {
            table: "products_buffer".into(),
            operation: "drop",
            source: io_error(),
        };
        let creating_live = ReloadError::Schema {
            table: "substitutions".into(),
            operation: "create",
            source: io_error(),
        };
        let reset_timeout = ReloadError::Timeout {
            phase: Phase::Schema,
            table: "substitutions".into(),
            operation: "drop",
            timeout: Duration::from_secs(1),
        };
        let load = ReloadError::Load {
            table: "substitutions_buffer".into(),
            batch: 1,
            rows: 10,
            source: io_error(),
        };

        for err in [&dropping_live, &reset_timeout] {
            let hint = err.recovery_hint().unwrap();
            assert!(hint.contains("may already be gone"), "{hint}");
        }
        for err in [&dropping_buffer, &creating_live, &load] {
            let hint = err.recovery_hint().unwrap();
            assert!(hint.contains("previous dataset"), "{hint}");
            assert!(!hint.contains("reset"), "{hint}");
        }
        assert!(ReloadError::Config("bad".into()).recovery_hint().is_none());
    }
}
