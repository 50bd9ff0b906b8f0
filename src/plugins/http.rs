//! HTTP plumbing shared by the REST adapters
//!
//! Transport failures and status codes are classified here so that every
//! adapter reports the same error kinds for the same platform behavior.

use crate::core::error::PublishError;
use crate::core::model::Platform;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// What the failed request was trying to do
///
/// A 403 on a read cannot be told apart from a deleted object, so reads
/// classify it as ambiguous while writes treat it as a permission failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Delete,
}

pub fn build_client(platform: Platform, timeout: Duration) -> Result<Client, PublishError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("social-publisher/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PublishError::Config {
            message: format!("failed to build {} HTTP client: {}", platform, e),
        })
}

/// `base` with `segments` appended as individually escaped path segments
pub fn endpoint(platform: Platform, base: &str, segments: &[&str]) -> Result<Url, PublishError> {
    let mut url = Url::parse(base).map_err(|e| PublishError::Config {
        message: format!("invalid {} base URL {}: {}", platform, base, e),
    })?;

    url.path_segments_mut()
        .map_err(|_| PublishError::Config {
            message: format!("{} base URL {} cannot carry a path", platform, base),
        })?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

/// Classify a failure that happened before a status code was received
pub fn transport_error(platform: Platform, error: reqwest::Error) -> PublishError {
    if error.is_decode() {
        return PublishError::InvalidResponse {
            platform: platform.to_string(),
            message: error.to_string(),
        };
    }

    PublishError::TransientNetwork {
        platform: platform.to_string(),
        message: error.to_string(),
    }
}

/// Seconds from a `Retry-After` header; HTTP dates are ignored
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Map a non-success status to an error kind
pub fn classify_status(
    platform: Platform,
    status: StatusCode,
    headers: &HeaderMap,
    message: String,
    id: &str,
    access: Access,
) -> PublishError {
    let platform_name = platform.to_string();

    match status {
        StatusCode::UNAUTHORIZED => PublishError::Authentication {
            platform: platform_name,
            message,
        },
        StatusCode::FORBIDDEN if access == Access::Write => PublishError::Authentication {
            platform: platform_name,
            message: format!("permission denied: {}", message),
        },
        StatusCode::FORBIDDEN => PublishError::AmbiguousState {
            platform: platform_name,
            id: id.to_string(),
            message,
        },
        StatusCode::NOT_FOUND | StatusCode::GONE => PublishError::NotFound {
            platform: platform_name,
            id: id.to_string(),
            attempted: Vec::new(),
        },
        StatusCode::TOO_MANY_REQUESTS => PublishError::RateLimited {
            platform: platform_name,
            message,
            retry_after: retry_after(headers),
        },
        StatusCode::REQUEST_TIMEOUT => PublishError::TransientNetwork {
            platform: platform_name,
            message: format!("HTTP 408: {}", message),
        },
        s if s.is_server_error() => PublishError::TransientNetwork {
            platform: platform_name,
            message: format!("HTTP {}: {}", s.as_u16(), message),
        },
        s if s.is_client_error() => PublishError::Rejected {
            platform: platform_name,
            message: format!("HTTP {}: {}", s.as_u16(), message),
        },
        s => PublishError::InvalidResponse {
            platform: platform_name,
            message: format!("unexpected HTTP {}: {}", s.as_u16(), message),
        },
    }
}

/// Decode a JSON body, reporting shape mismatches as invalid responses
pub async fn decode<T: DeserializeOwned>(
    platform: Platform,
    response: reqwest::Response,
) -> Result<T, PublishError> {
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(platform, e))?;

    serde_json::from_str(&body).map_err(|e| PublishError::InvalidResponse {
        platform: platform.to_string(),
        message: format!("{}: {}", e, truncate(&body, 200)),
    })
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use reqwest::header::HeaderValue;

    fn classify(status: u16, access: Access) -> PublishError {
        classify_status(
            Platform::LinkedIn,
            StatusCode::from_u16(status).unwrap(),
            &HeaderMap::new(),
            "boom".to_string(),
            "urn:li:share:1",
            access,
        )
    }

    #[test]
    fn test_forbidden_depends_on_access() {
        assert_eq!(classify(403, Access::Read).kind(), ErrorKind::AmbiguousState);
        assert_eq!(classify(403, Access::Write).kind(), ErrorKind::Auth);
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(classify(401, Access::Read).kind(), ErrorKind::Auth);
        assert_eq!(classify(404, Access::Read).kind(), ErrorKind::NotFound);
        assert_eq!(classify(429, Access::Write).kind(), ErrorKind::RateLimit);
        assert_eq!(classify(503, Access::Write).kind(), ErrorKind::TransientNetwork);
        assert_eq!(classify(422, Access::Write).kind(), ErrorKind::Rejected);
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("120"));

        let error = classify_status(
            Platform::Facebook,
            StatusCode::TOO_MANY_REQUESTS,
            &headers,
            "slow down".to_string(),
            "1",
            Access::Write,
        );
        assert_eq!(error.retry_after(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let url = endpoint(
            Platform::LinkedIn,
            "https://api.linkedin.com/",
            &["rest", "posts", "urn:li:share:7001"],
        )
        .unwrap();

        assert_eq!(url.path(), "/rest/posts/urn:li:share:7001");

        let url = endpoint(Platform::Facebook, "http://localhost:8080", &["v19.0", "a/b"]).unwrap();
        assert_eq!(url.path(), "/v19.0/a%2Fb");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }
}
