//! Certificate authority client errors.

/// Errors from certificate authority calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaError {
    /// The authority is unreachable or returned a 5xx status.
    #[error("certificate authority unavailable during {operation}: {reason}")]
    Unavailable {
        /// Client operation that failed.
        operation: &'static str,
        /// Transport error or response excerpt.
        reason: String,
    },

    /// The request did not complete within the configured timeout.
    #[error("certificate authority {operation} timed out after {elapsed_ms}ms")]
    Timeout {
        operation: &'static str,
        elapsed_ms: u64,
    },

    /// Neither token refresh nor re-authentication succeeded.
    #[error("certificate authority authentication failed: {reason}")]
    Unauthorized { reason: String },

    /// The authority refused the request (4xx other than 401).
    #[error("certificate authority rejected {operation}: HTTP {status}: {body}")]
    Rejected {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("invalid response from {operation}: {reason}")]
    InvalidResponse {
        operation: &'static str,
        reason: String,
    },

    /// The referenced authority or batch does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    /// The client cannot run (missing runtime or bad configuration).
    #[error("certificate authority client not configured: {reason}")]
    NotConfigured { reason: String },
}

impl CaError {
    /// Whether retrying later may succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(CaError::Unavailable {
            operation: "batch_detail",
            reason: "connection refused".into()
        }
        .is_transient());
        assert!(CaError::Timeout {
            operation: "download_batch",
            elapsed_ms: 30_000
        }
        .is_transient());
        assert!(!CaError::Unauthorized {
            reason: "bad password".into()
        }
        .is_transient());
        assert!(!CaError::Rejected {
            operation: "submit_batch",
            status: 400,
            body: "invalid profile".into()
        }
        .is_transient());
    }
}
