//! Error types for CRM record store operations.

use thiserror::Error;

use crate::chunk::CRM_BATCH_LIMIT;

/// Errors that can occur while talking to the CRM record store.
///
/// Retry behavior is fully contained in the client: by the time a
/// `CrmError` crosses the crate boundary, the bounded retry budget has
/// already been spent. Callers classify rather than retry.
#[derive(Error, Debug)]
pub enum CrmError {
    /// A transport-level failure (DNS, TLS, connection reset, timeout).
    /// Retried with backoff inside the client before being surfaced.
    #[error("Transient network error: {0}")]
    Transient(#[from] reqwest::Error),

    /// The CRM kept returning HTTP 429 until the retry budget ran out.
    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// A non-429 error response from the CRM. These are business errors
    /// (bad request, missing object, expired token) and are never retried.
    #[error("CRM API error {status}: {message}")]
    Api {
        /// HTTP status code returned by the CRM.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// The response body could not be parsed into the expected shape.
    #[error("Unexpected CRM response: {0}")]
    Decode(String),

    /// A batch call was handed more ids than the CRM accepts per request.
    /// Callers must chunk with [`chunk_ids`](crate::chunk::chunk_ids) first.
    #[error("Batch of {0} ids exceeds the CRM limit of {CRM_BATCH_LIMIT}")]
    BatchTooLarge(usize),

    /// Missing or invalid client configuration (credentials, base URL).
    /// Aborts a run before any state is touched.
    #[error("Invalid CRM configuration: {0}")]
    Config(String),
}

impl CrmError {
    /// Whether the failed operation may succeed if repeated later.
    ///
    /// Used by callers to decide between "record and continue" and
    /// "leave the work for the next scheduled run".
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CrmError::Transient(_) | CrmError::RateLimitExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_exceeded_is_retryable() {
        let error = CrmError::RateLimitExceeded { attempts: 3 };
        assert!(error.is_retryable());
    }

    #[test]
    fn test_api_error_is_not_retryable() {
        let error = CrmError::Api {
            status: 400,
            message: "Invalid filter".to_string(),
        };
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_config_error_is_not_retryable() {
        let error = CrmError::Config("missing access token".to_string());
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_batch_too_large_is_not_retryable() {
        let error = CrmError::BatchTooLarge(250);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let error = CrmError::Api {
            status: 404,
            message: "Object not found".to_string(),
        };
        assert_eq!(format!("{}", error), "CRM API error 404: Object not found");

        let error = CrmError::RateLimitExceeded { attempts: 3 };
        assert_eq!(
            format!("{}", error),
            "Rate limit exceeded after 3 attempts"
        );
    }
}
