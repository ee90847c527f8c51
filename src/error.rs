//! Error types for bulk-courier.

use std::path::PathBuf;
use std::time::Duration;

use crate::dataset::ValidationReport;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Rate limit exhausted after {denials} consecutive denials (last retry after {last_retry_after:?})")]
    RateLimitExhausted {
        denials: u32,
        last_retry_after: Duration,
    },

    #[error("Invalid record transition for row {row}: {from} -> {to}")]
    InvalidTransition {
        row: usize,
        from: String,
        to: String,
    },
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised while loading or validating a recipient dataset.
///
/// All of these are fatal: they abort the run before any send.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Dataset file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Unsupported file format: {extension:?}. Use .csv, .tsv, .json, .xlsx or .xls files")]
    UnsupportedFormat { extension: String },

    #[error("Could not read {}: {reason}", path.display())]
    UnreadableSource { path: PathBuf, reason: String },

    #[error("Dataset rejected: {}", .0.issues.join("; "))]
    Rejected(ValidationReport),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by a channel capability.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Timed out after {timeout:?} waiting for {selector}")]
    ElementTimeout { selector: String, timeout: Duration },

    #[error("Element not present: {selector}")]
    NotPresent { selector: String },

    #[error("Action on {selector} was intercepted by an overlapping element")]
    Intercepted { selector: String },

    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Channel {name} disconnected: {reason}")]
    Disconnected { name: String, reason: String },

    #[error("Channel operation failed: {0}")]
    Operation(String),
}

/// A recipient could not be located inside the channel.
///
/// Recoverable: the orchestrator classifies the record as not found and moves on.
#[derive(Debug, thiserror::Error)]
#[error("Contact '{identifier}' not found: {reason}")]
pub struct ResolveError {
    pub identifier: String,
    pub reason: String,
}

/// Diagnostic tag attached to a failed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchFailureKind {
    /// Compose surface never became interactable.
    ElementTimeout,
    /// Commit blocked by an overlapping element.
    Intercepted,
    /// Any other channel failure.
    ChannelError,
}

impl DispatchFailureKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ElementTimeout => "element_timeout",
            Self::Intercepted => "intercepted",
            Self::ChannelError => "channel_error",
        }
    }
}

impl std::fmt::Display for DispatchFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A composed message could not be transmitted.
#[derive(Debug, thiserror::Error)]
#[error("Send to '{identifier}' failed [{kind}]: {source}")]
pub struct DispatchError {
    pub identifier: String,
    pub kind: DispatchFailureKind,
    #[source]
    pub source: ChannelError,
}

impl DispatchError {
    /// Classify a channel failure that happened while dispatching.
    pub fn classify(identifier: impl Into<String>, source: ChannelError) -> Self {
        let kind = match &source {
            ChannelError::ElementTimeout { .. } => DispatchFailureKind::ElementTimeout,
            ChannelError::Intercepted { .. } => DispatchFailureKind::Intercepted,
            _ => DispatchFailureKind::ChannelError,
        };
        Self {
            identifier: identifier.into(),
            kind,
            source,
        }
    }
}

/// Daily schedule errors.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Invalid send time {input:?}: expected HH:MM")]
    InvalidTime { input: String },

    #[error("Invalid cron expression {expression:?}: {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Schedule {expression:?} has no upcoming fire time")]
    Exhausted { expression: String },
}

/// Message template errors.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Missing template variable: {name}")]
    MissingVariable { name: String },

    #[error("Unknown template: {name}")]
    UnknownTemplate { name: String },
}

/// Result type alias for bulk-courier.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_error_classification() {
        let timeout = DispatchError::classify(
            "A",
            ChannelError::ElementTimeout {
                selector: "compose".into(),
                timeout: Duration::from_secs(20),
            },
        );
        assert_eq!(timeout.kind, DispatchFailureKind::ElementTimeout);

        let intercepted = DispatchError::classify(
            "A",
            ChannelError::Intercepted {
                selector: "compose".into(),
            },
        );
        assert_eq!(intercepted.kind, DispatchFailureKind::Intercepted);

        let other = DispatchError::classify("A", ChannelError::Operation("boom".into()));
        assert_eq!(other.kind, DispatchFailureKind::ChannelError);
        assert!(other.to_string().contains("[channel_error]"));
    }

    #[test]
    fn rejected_dataset_lists_issues() {
        let report = ValidationReport {
            total_rows: 0,
            valid_rows: 0,
            issues: vec!["Missing required column: contact".into(), "No valid rows".into()],
            warnings: vec![],
        };
        let err = DatasetError::Rejected(report);
        assert_eq!(
            err.to_string(),
            "Dataset rejected: Missing required column: contact; No valid rows"
        );
    }
}
