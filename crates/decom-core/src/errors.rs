use std::fmt;
use std::time::Duration;

/// Failure reported by one of the external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unreachable: {0}")]
    Unreachable(String),
    #[error("{0}")]
    Failed(String),
}

impl CollaboratorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CollaboratorError::NotFound(_))
    }
}

/// Failure of a unit of remote work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("remote work on {host} timed out after {}s", .after.as_secs())]
    Timeout { host: String, after: Duration },
    #[error("cannot connect to {host}: {reason}")]
    ConnectFailure { host: String, reason: String },
    #[error("remote script failed on {host}: {message}")]
    RemoteScript { host: String, message: String },
    #[error("remote task on {host} was cancelled")]
    Cancelled { host: String },
}

/// Run-level error taxonomy.
///
/// Everything except `Fatal` and `Cancelled` is recorded on the affected
/// target's row; those two abort the whole run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecomError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} unreachable")]
    Unreachable(String),
    #[error("not yet safe: {}", .0.join("; "))]
    SafetyGateBlocked(Vec<String>),
    #[error("partial failure in {step}: {}", .errors.join("; "))]
    PartialFailure { step: String, errors: Vec<String> },
    /// A collaborator call failed outright; the row records which step.
    #[error("{0}")]
    Failed(String),
    #[error("fatal: {0}")]
    Fatal(String),
    #[error("cancelled by operator")]
    Cancelled,
}

impl From<CollaboratorError> for DecomError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::NotFound(what) => DecomError::NotFound(what),
            CollaboratorError::Unreachable(what) => DecomError::Unreachable(what),
            CollaboratorError::Failed(msg) => DecomError::Failed(msg),
        }
    }
}

/// Severity of a configuration check finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    Error,
    Warning,
}

impl fmt::Display for IssueLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueLevel::Error => write!(f, "error"),
            IssueLevel::Warning => write!(f, "warn"),
        }
    }
}

/// Structured result for `decom check-config --json`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckReport {
    pub file: String,
    pub pass: bool,
    pub issues: Vec<CheckIssue>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckIssue {
    pub level: IssueLevel,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}
