//! Error types for cluster operations.
//!
//! Errors are categorized so callers can tell a missing object (which is
//! often an expected state, e.g. a first deployment) from a failed command
//! or an exhausted retry loop.

use thiserror::Error;

/// Categories of cluster errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The addressed object or resource type does not exist
    NotFound,
    /// Connectivity or server-side trouble, usually worth retrying
    Transient,
    /// A retry loop ran out of attempts or time
    Timeout,
    /// The input could not be interpreted
    Invalid,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Object not found",
            Self::Transient => "Cluster connectivity issue",
            Self::Timeout => "Timed out",
            Self::Invalid => "Invalid input",
            Self::Other => "Unexpected error",
        }
    }
}

/// Errors that can occur while talking to a cluster.
#[derive(Debug, Error)]
pub enum Error {
    /// The kubectl binary could not be started
    #[error("failed to execute {binary}: {message}")]
    Spawn {
        /// Binary that was invoked
        binary: String,
        /// Operating system error
        message: String,
    },

    /// The addressed object does not exist
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing object
        what: String,
    },

    /// A command ran but reported failure
    #[error("kubectl {args}: {stderr}")]
    CommandFailed {
        /// Arguments passed to kubectl
        args: String,
        /// Standard error output of the failed command
        stderr: String,
    },

    /// An HTTP request failed
    #[error("http {}: {message}", status_label(.status))]
    Http {
        /// Response status, absent when no response was received
        status: Option<u16>,
        /// Error details
        message: String,
    },

    /// A bounded retry loop gave up
    #[error("timeout waiting for {what} (gave up after {attempts} attempts)")]
    Timeout {
        /// What was being waited for
        what: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// A manifest document could not be interpreted
    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::CommandFailed { .. } | Error::Http { .. } | Error::Io(_) => {
                ErrorCategory::Transient
            }
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::Manifest(_) | Error::Json(_) | Error::Yaml(_) => ErrorCategory::Invalid,
            Error::Spawn { .. } => ErrorCategory::Other,
        }
    }

    /// Whether the error means the addressed object does not exist.
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    /// Create an error from kubectl command output.
    ///
    /// Analyzes stderr to recognise missing objects.
    pub fn from_kubectl_output(args: &[&str], stderr: &str) -> Self {
        let lower = stderr.to_lowercase();

        // Error from server (NotFound): configmaps "x" not found
        if lower.contains("(notfound)") || lower.contains("not found") {
            return Error::NotFound {
                what: stderr.trim().to_string(),
            };
        }

        Error::CommandFailed {
            args: args.join(" "),
            stderr: stderr.trim().to_string(),
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    status.map_or_else(|| "request".to_string(), |s| s.to_string())
}

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_kubectl_output_not_found() {
        let err = Error::from_kubectl_output(
            &["get", "configmap", "store"],
            "Error from server (NotFound): configmaps \"store\" not found\n",
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_from_kubectl_output_other() {
        let err = Error::from_kubectl_output(
            &["apply", "-f", "-"],
            "error: unable to connect to the server",
        );
        assert_eq!(err.category(), ErrorCategory::Transient);
        assert!(err.to_string().contains("apply -f -"));
    }

    #[test]
    fn test_timeout_message_names_target() {
        let err = Error::Timeout {
            what: "postCondition: data.key | length > 10".to_string(),
            attempts: 10,
        };
        assert!(err.to_string().contains("data.key | length > 10"));
        assert_eq!(err.category(), ErrorCategory::Timeout);
    }

    #[test]
    fn test_http_message() {
        let err = Error::Http {
            status: Some(503),
            message: "sealed".to_string(),
        };
        assert_eq!(err.to_string(), "http 503: sealed");
    }
}
