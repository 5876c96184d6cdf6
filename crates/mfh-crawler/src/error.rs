use std::error::Error as _;
use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Eligible for another attempt after backoff
    Transient,
    /// Fails the task immediately
    Permanent,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Malformed URL {url}: {source}")]
    MalformedUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: StatusCode },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Network error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Content marker not rendered for {url} within {after:?}")]
    RenderTimeout { url: String, after: Duration },

    #[error("Browser error for {url}: {message}")]
    Browser {
        url: String,
        message: String,
        transient: bool,
    },
}

impl FetchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::MalformedUrl { .. } => ErrorClass::Permanent,
            Self::Status { status, .. } => {
                if status.is_server_error()
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
                {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Permanent
                }
            }
            Self::Timeout { .. } | Self::RenderTimeout { .. } => ErrorClass::Transient,
            Self::Network { source, .. } => {
                if source.is_builder() || source.is_redirect() || is_dns_failure(source) {
                    ErrorClass::Permanent
                } else {
                    ErrorClass::Transient
                }
            }
            Self::Browser { transient, .. } => {
                if *transient {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Permanent
                }
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    pub(crate) fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = e.status() {
            Self::Status {
                url: url.to_string(),
                status,
            }
        } else {
            Self::Network {
                url: url.to_string(),
                source: e,
            }
        }
    }
}

// hyper does not expose resolver failures as a distinct kind
fn is_dns_failure(e: &reqwest::Error) -> bool {
    let mut source = e.source();
    while let Some(err) = source {
        if reports_unresolved_host(&err.to_string()) {
            return true;
        }
        source = err.source();
    }
    false
}

/// Resolver failures as worded by hyper and by Chromium's net stack.
pub(crate) fn reports_unresolved_host(message: &str) -> bool {
    let msg = message.to_lowercase();
    [
        "dns error",
        "failed to lookup address",
        "err_name_not_resolved",
        "err_name_resolution_failed",
    ]
    .iter()
    .any(|m| msg.contains(m))
}

/// Why a URL or a category produced no output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    RetryExhausted,
    Permanent,
    RenderTimeout,
    MissingIdentity,
    ExtractFailed,
    EmptyListing,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetryExhausted => "retry-exhausted",
            Self::Permanent => "permanent",
            Self::RenderTimeout => "render-timeout",
            Self::MissingIdentity => "missing-identity",
            Self::ExtractFailed => "extract-failed",
            Self::EmptyListing => "empty-listing",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> FetchError {
        FetchError::Status {
            url: "https://example.com".into(),
            status: StatusCode::from_u16(code).unwrap(),
        }
    }

    #[test]
    fn status_classification() {
        assert_eq!(status(503).class(), ErrorClass::Transient);
        assert_eq!(status(500).class(), ErrorClass::Transient);
        assert_eq!(status(429).class(), ErrorClass::Transient);
        assert_eq!(status(404).class(), ErrorClass::Permanent);
        assert_eq!(status(403).class(), ErrorClass::Permanent);
    }

    #[test]
    fn render_timeout_is_transient() {
        let e = FetchError::RenderTimeout {
            url: "https://example.com".into(),
            after: Duration::from_secs(1),
        };
        assert!(e.is_transient());
    }

    #[test]
    fn malformed_url_is_permanent() {
        let e = FetchError::MalformedUrl {
            url: "nope".into(),
            source: url::Url::parse("nope").unwrap_err(),
        };
        assert_eq!(e.class(), ErrorClass::Permanent);
    }

    #[test]
    fn reasons_render_kebab_case() {
        assert_eq!(FailureReason::RetryExhausted.to_string(), "retry-exhausted");
        assert_eq!(FailureReason::RenderTimeout.to_string(), "render-timeout");
    }
}
