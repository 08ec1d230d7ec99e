//! Typed failures returned by each pipeline stage.
//!
//! The orchestrator matches on these instead of inspecting error strings:
//! fetch failures carry their retry class, extraction failures name the
//! missing field, enrichment failures never leave the generator, and
//! persistence failures are recorded against the candidate.

use thiserror::Error;

/// How a fetch failure should be treated by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeouts, connection errors, 5xx. Worth retrying.
    Transient,
    /// 4xx other than rate limiting. Retrying will not help.
    Permanent,
    /// 429/503. Back off for longer before touching the site again.
    RateLimited,
}

impl FailureKind {
    /// Classify an HTTP status; `None` for success codes.
    #[must_use]
    pub const fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            429 | 503 => Some(Self::RateLimited),
            408 | 500..=599 => Some(Self::Transient),
            _ => Some(Self::Permanent),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("{url} unreachable after {attempts} attempt(s): {reason}")]
    Unreachable {
        url: String,
        reason: String,
        timed_out: bool,
        attempts: u32,
    },

    #[error("HTTP {status} for {url} after {attempts} attempt(s)")]
    Status { url: String, status: u16, attempts: u32 },

    #[error("rate limited (HTTP {status}) on {url} after {attempts} attempt(s)")]
    RateLimited { url: String, status: u16, attempts: u32 },
}

impl FetchFailure {
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Unreachable { .. } => FailureKind::Transient,
            Self::Status { status, .. } => match FailureKind::from_status(*status) {
                Some(FailureKind::Transient) => FailureKind::Transient,
                _ => FailureKind::Permanent,
            },
            Self::RateLimited { .. } => FailureKind::RateLimited,
        }
    }

    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Unreachable { url, .. } | Self::Status { url, .. } | Self::RateLimited { url, .. } => url,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionFailure {
    #[error("Required field '{field}' not found on {url}")]
    MissingField { field: String, url: String },

    #[error("Page at {url} is not a product page: {reason}")]
    NotAProductPage { url: String, reason: String },
}

impl ExtractionFailure {
    #[must_use]
    pub fn missing(field: &str, url: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
            url: url.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentFailure {
    #[error("generator unreachable: {0}")]
    Unreachable(String),

    #[error("generator timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("generator returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed generator response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceFailure {
    #[error("sink rejected record {id}: {reason}")]
    Rejected { id: String, reason: String },

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(200, None)]
    #[case(204, None)]
    #[case(404, Some(FailureKind::Permanent))]
    #[case(403, Some(FailureKind::Permanent))]
    #[case(408, Some(FailureKind::Transient))]
    #[case(429, Some(FailureKind::RateLimited))]
    #[case(500, Some(FailureKind::Transient))]
    #[case(502, Some(FailureKind::Transient))]
    #[case(503, Some(FailureKind::RateLimited))]
    fn test_status_classification(#[case] status: u16, #[case] expected: Option<FailureKind>) {
        assert_eq!(FailureKind::from_status(status), expected);
    }

    #[test]
    fn test_failure_kinds() {
        let unreachable = FetchFailure::Unreachable {
            url: "u".into(),
            reason: "timeout".into(),
            timed_out: true,
            attempts: 3,
        };
        assert_eq!(unreachable.kind(), FailureKind::Transient);

        let gone = FetchFailure::Status { url: "u".into(), status: 404, attempts: 1 };
        assert_eq!(gone.kind(), FailureKind::Permanent);

        let flaky = FetchFailure::Status { url: "u".into(), status: 502, attempts: 3 };
        assert_eq!(flaky.kind(), FailureKind::Transient);
        assert!(!flaky.is_rate_limited());
    }
}
