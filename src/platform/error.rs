//! Platform API failure classification
//!
//! Upstream error payloads inconsistently populate the structured reason
//! field, so classification is two-tier: structured reason codes are
//! checked first, with case-insensitive substring matches on the free-text
//! message as a fallback when the reason is absent.

use thiserror::Error;

/// Structured reasons that signal a spent or limited credential
const QUOTA_REASONS: [&str; 3] = ["quotaexceeded", "dailylimitexceeded", "userratelimitexceeded"];

/// Structured reasons that signal a misconfigured or denied credential
const ACCESS_REASONS: [&str; 2] = ["accessnotconfigured", "forbidden"];

/// Structured reasons that signal a suspended account
const SUSPENDED_REASONS: [&str; 2] = ["suspended", "accountdisabled"];

/// A failure reported by the platform API
#[derive(Debug, Clone, Error)]
#[error("{message} (status: {status:?}, reason: {reason:?})")]
pub struct ApiError {
    /// HTTP status code, when the request reached the platform
    pub status: Option<u16>,

    /// Machine-readable reason from the error payload, when present
    pub reason: Option<String>,

    /// Free-text message
    pub message: String,
}

/// What a failure means for the crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The requested record does not exist; skip it, never retry
    NotFound,

    /// The record permanently refuses this lookup (e.g. comments off)
    PermanentlyDisabled,

    /// The credential has no remaining budget, is rate limited, is
    /// suspended, or has the API disabled; rotate to the next credential
    CredentialExhausted,

    /// Anything else; retried against the local budget
    Unrelated,
}

impl ApiError {
    /// A failure carried in an HTTP error response
    pub fn http(status: u16, reason: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            reason,
            message: message.into(),
        }
    }

    /// A failure below the HTTP layer (connect error, timeout, bad body)
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            reason: None,
            message: message.into(),
        }
    }

    /// Classifies this failure per the two-tier scheme
    pub fn classify(&self) -> FailureClass {
        let reason = self.reason.as_deref().map(str::to_lowercase);
        let reason = reason.as_deref();

        if self.status == Some(404) {
            return FailureClass::NotFound;
        }

        if self.status == Some(403) && reason == Some("commentsdisabled") {
            return FailureClass::PermanentlyDisabled;
        }

        // 429 always means the credential is rate limited
        if self.status == Some(429) {
            return FailureClass::CredentialExhausted;
        }

        if let Some(reason) = reason {
            if self.status == Some(403)
                && (QUOTA_REASONS.contains(&reason)
                    || ACCESS_REASONS.contains(&reason)
                    || SUSPENDED_REASONS.contains(&reason))
            {
                return FailureClass::CredentialExhausted;
            }
            return FailureClass::Unrelated;
        }

        // No structured reason: fall back to the message text
        let message = self.message.to_lowercase();

        if self.status == Some(403)
            && (message.contains("quota")
                || message.contains("exceeded")
                || message.contains("has not been used")
                || message.contains("is disabled")
                || message.contains("accessnotconfigured"))
        {
            return FailureClass::CredentialExhausted;
        }

        if message.contains("suspended") {
            return FailureClass::CredentialExhausted;
        }

        FailureClass::Unrelated
    }
}

/// Outcome of one API operation after rotation handling
#[derive(Debug, Error)]
pub enum CallError {
    /// The record is permanently unavailable; skip without retrying
    #[error("record skipped ({class:?}): {message}")]
    Skipped {
        class: FailureClass,
        message: String,
    },

    /// Every credential in the pool is exhausted
    #[error("all credentials exhausted")]
    QuotaExhausted,

    /// An unrelated failure; counts against the caller's retry budget
    #[error("API call failed: {0}")]
    Failed(ApiError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found() {
        let err = ApiError::http(404, None, "video not found");
        assert_eq!(err.classify(), FailureClass::NotFound);
    }

    #[test]
    fn test_comments_disabled_is_permanent() {
        let err = ApiError::http(403, Some("commentsDisabled".to_string()), "disabled");
        assert_eq!(err.classify(), FailureClass::PermanentlyDisabled);
    }

    #[test]
    fn test_structured_quota_reasons() {
        for reason in ["quotaExceeded", "dailyLimitExceeded", "userRateLimitExceeded"] {
            let err = ApiError::http(403, Some(reason.to_string()), "over budget");
            assert_eq!(err.classify(), FailureClass::CredentialExhausted, "{reason}");
        }
    }

    #[test]
    fn test_structured_access_and_suspension_reasons() {
        for reason in ["accessNotConfigured", "forbidden", "suspended", "accountDisabled"] {
            let err = ApiError::http(403, Some(reason.to_string()), "no access");
            assert_eq!(err.classify(), FailureClass::CredentialExhausted, "{reason}");
        }
    }

    #[test]
    fn test_429_always_exhausted() {
        let err = ApiError::http(429, None, "slow down");
        assert_eq!(err.classify(), FailureClass::CredentialExhausted);
    }

    #[test]
    fn test_text_fallback_only_without_reason() {
        // Without a reason the message decides
        let err = ApiError::http(403, None, "Daily quota exceeded for this project");
        assert_eq!(err.classify(), FailureClass::CredentialExhausted);

        // With an unrecognized structured reason the message is ignored
        let err = ApiError::http(403, Some("somethingElse".to_string()), "quota exceeded");
        assert_eq!(err.classify(), FailureClass::Unrelated);
    }

    #[test]
    fn test_text_fallback_api_disabled() {
        let err = ApiError::http(
            403,
            None,
            "API v3 has not been used in project 1234 before or it is disabled",
        );
        assert_eq!(err.classify(), FailureClass::CredentialExhausted);
    }

    #[test]
    fn test_suspended_text_any_status() {
        let err = ApiError::http(400, None, "Account suspended pending review");
        assert_eq!(err.classify(), FailureClass::CredentialExhausted);
    }

    #[test]
    fn test_unrelated_server_error() {
        let err = ApiError::http(500, None, "backend unavailable");
        assert_eq!(err.classify(), FailureClass::Unrelated);
    }

    #[test]
    fn test_transport_is_unrelated() {
        let err = ApiError::transport("connection reset by peer");
        assert_eq!(err.classify(), FailureClass::Unrelated);
    }
}
