//! # Orchestration Errors
//!
//! This module defines the error taxonomy shared by every phase of a run. By centralizing
//! error definitions, the orchestrator can attribute each failure to a service and a phase,
//! and the CLI can summarize it without printing a raw nested chain.
//!
//! Failures before the first start call (`Config`, `DuplicateService`, `DependencyCycle`,
//! `UnresolvedDependency`, `GenesisComposition`, `GenesisWrite`, `Io`) abort the run with
//! nothing to tear down. A [`StartError`] triggers teardown of everything already started and
//! is reported together with any [`StopError`]s collected while unwinding.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Error type returned by [`Service`](crate::Service) implementations and genesis modifiers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Convenience alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The phase of a run in which an error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Resolve,
    Genesis,
    Start,
    Shutdown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Setup => "setup",
            Phase::Resolve => "dependency resolution",
            Phase::Genesis => "genesis finalization",
            Phase::Start => "start",
            Phase::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Top-level error returned by [`run`](crate::run) and [`Orchestrator::run`](crate::Orchestrator::run).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A service rejected its input during setup.
    #[error("setup of service {service} failed: {source}")]
    Config {
        service: String,
        #[source]
        source: BoxError,
    },

    /// Two services share a name, so their working directories would collide.
    #[error("service name {service} is used more than once")]
    DuplicateService { service: String },

    /// The declared labels form a cycle; `services` lists the services on or between cycles.
    #[error("dependency cycle between services: {}", .services.join(", "))]
    DependencyCycle { services: Vec<String> },

    /// A needed label has no provider in the service set and was not supplied externally.
    #[error("service {service} needs endpoint {label} but nothing provides it")]
    UnresolvedDependency { service: String, label: String },

    /// A genesis modifier failed.
    #[error("genesis modifier from service {service} failed: {source}")]
    GenesisComposition {
        service: String,
        #[source]
        source: BoxError,
    },

    /// The finalized genesis could not be persisted.
    #[error("failed to write genesis to {}: {source}", .path.display())]
    GenesisWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Preparing the run directory failed.
    #[error("failed to prepare {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A service failed to start. `cleanup` holds the stop failures hit while unwinding.
    #[error("{cause}{}", CleanupSummary(.cleanup))]
    Start {
        cause: StartError,
        cleanup: Vec<StopError>,
    },

    /// The run was cancelled and one or more services failed to stop cleanly.
    #[error("shutdown finished with {} failure(s){}", .failures.len(), CleanupSummary(.failures))]
    Shutdown { failures: Vec<StopError> },
}

impl Error {
    /// The phase in which this error surfaced.
    pub fn phase(&self) -> Phase {
        match self {
            Error::Config { .. } | Error::DuplicateService { .. } | Error::Io { .. } => {
                Phase::Setup
            }
            Error::DependencyCycle { .. } | Error::UnresolvedDependency { .. } => Phase::Resolve,
            Error::GenesisComposition { .. } | Error::GenesisWrite { .. } => Phase::Genesis,
            Error::Start { .. } => Phase::Start,
            Error::Shutdown { .. } => Phase::Shutdown,
        }
    }

    /// The service the error is attributed to, if a single one is responsible.
    pub fn service(&self) -> Option<&str> {
        match self {
            Error::Config { service, .. }
            | Error::DuplicateService { service }
            | Error::UnresolvedDependency { service, .. }
            | Error::GenesisComposition { service, .. } => Some(service),
            Error::Start { cause, .. } => Some(&cause.service),
            _ => None,
        }
    }

    /// Stop failures collected while tearing down, if any.
    pub fn stop_failures(&self) -> &[StopError] {
        match self {
            Error::Start { cleanup, .. } => cleanup,
            Error::Shutdown { failures } => failures,
            _ => &[],
        }
    }

    /// One-line, user-facing summary: which service failed and in which phase.
    pub fn summary(&self) -> String {
        match self.service() {
            Some(service) => format!("service {service} failed during {}", self.phase()),
            None => format!("run failed during {}", self.phase()),
        }
    }
}

/// A service failed to reach its ready state.
#[derive(Debug, thiserror::Error)]
#[error("service {service} failed to start: {failure}")]
pub struct StartError {
    pub service: String,
    #[source]
    pub failure: StartFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum StartFailure {
    #[error("{0}")]
    Failed(BoxError),
    #[error("not ready after {0:?}")]
    TimedOut(Duration),
    #[error("no address published for declared endpoint {0}")]
    MissingEndpoint(String),
}

/// A stop call failed or overran its grace period. Collected, never fatal to the unwind.
#[derive(Debug, thiserror::Error)]
#[error("service {service} did not stop cleanly: {failure}")]
pub struct StopError {
    pub service: String,
    #[source]
    pub failure: StopFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum StopFailure {
    #[error("{0}")]
    Failed(BoxError),
    #[error("forced shutdown after grace period of {0:?}")]
    GracePeriodExceeded(Duration),
}

struct CleanupSummary<'a>(&'a [StopError]);

impl fmt::Display for CleanupSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for err in self.0 {
            write!(f, "; cleanup: {err}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_error_keeps_cause_ahead_of_cleanup_noise() {
        let err = Error::Start {
            cause: StartError {
                service: "bridge".into(),
                failure: StartFailure::Failed("no peers".into()),
            },
            cleanup: vec![StopError {
                service: "consensus".into(),
                failure: StopFailure::GracePeriodExceeded(Duration::from_secs(1)),
            }],
        };

        let text = err.to_string();
        assert!(text.starts_with("service bridge failed to start: no peers"));
        assert!(text.contains("cleanup: service consensus did not stop cleanly"));
        assert_eq!(err.service(), Some("bridge"));
        assert_eq!(err.phase(), Phase::Start);
        assert_eq!(err.stop_failures().len(), 1);
        assert_eq!(err.summary(), "service bridge failed during start");
    }

    #[test]
    fn cycle_lists_services() {
        let err = Error::DependencyCycle {
            services: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle between services: a, b");
        assert_eq!(err.service(), None);
        assert_eq!(err.summary(), "run failed during dependency resolution");
    }
}
