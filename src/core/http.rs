//! HTTP client utilities.
//!
//! Provides a shared HTTP client for all provider clients and the status
//! classification every provider call goes through.

use std::time::Duration;

use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use serde_json::Value;

use super::provider::Provider;
use crate::error::{Result, UpkeepError};

/// Default timeout for a single provider request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest provider error body kept in `ProviderError`.
const MAX_ERROR_BODY: usize = 512;

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("upkeep/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| UpkeepError::Other(anyhow::anyhow!("build HTTP client: {e}")))
}

/// Map a transport-level failure onto the error taxonomy.
#[must_use]
pub fn map_send_error(provider: Provider, timeout: Duration, err: &reqwest::Error) -> UpkeepError {
    if err.is_timeout() {
        UpkeepError::Timeout {
            provider: provider.slug().to_string(),
            seconds: timeout.as_secs(),
        }
    } else {
        UpkeepError::ProviderUnavailable {
            provider: provider.slug().to_string(),
            message: err.to_string(),
        }
    }
}

/// Decode a provider response, classifying non-2xx statuses.
///
/// Returns the response headers alongside the body so callers can follow
/// header-based pagination.
///
/// # Errors
///
/// - 401/403: `AuthInvalid`
/// - 429: `RateLimited` with any retry hint the provider sent
/// - 5xx: `ProviderUnavailable`
/// - other non-2xx: `ProviderError`
/// - undecodable 2xx body: `ParseResponse`
pub async fn classify_response(provider: Provider, response: Response) -> Result<(HeaderMap, Value)> {
    let status = response.status();
    let headers = response.headers().clone();

    if status.is_success() {
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| UpkeepError::ParseResponse {
                provider: provider.slug().to_string(),
                message: e.to_string(),
            })?;
        return Ok((headers, body));
    }

    let body = response.text().await.unwrap_or_default();
    Err(error_for_status(provider, status, &headers, &body))
}

/// Build the error for a non-success status.
#[must_use]
pub fn error_for_status(
    provider: Provider,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> UpkeepError {
    let slug = provider.slug().to_string();
    match status.as_u16() {
        401 | 403 => UpkeepError::AuthInvalid {
            provider: slug,
            status: status.as_u16(),
        },
        429 => UpkeepError::RateLimited {
            provider: slug,
            retry_after: retry_after_hint(headers),
            message: truncate(body, MAX_ERROR_BODY),
        },
        code if status.is_server_error() => UpkeepError::ProviderUnavailable {
            provider: slug,
            message: format!("HTTP {code}"),
        },
        code => UpkeepError::ProviderError {
            provider: slug,
            status: code,
            body: truncate(body, MAX_ERROR_BODY),
        },
    }
}

/// Extract a retry hint from `Retry-After` (seconds) or `x-ratelimit-reset`
/// (epoch seconds).
#[must_use]
pub fn retry_after_hint(headers: &HeaderMap) -> Option<Duration> {
    if let Some(secs) = header_str(headers, "retry-after").and_then(|v| v.trim().parse::<u64>().ok())
    {
        return Some(Duration::from_secs(secs));
    }

    let reset = header_str(headers, "x-ratelimit-reset")?.trim().parse::<i64>().ok()?;
    let delta = reset.saturating_sub(Utc::now().timestamp());
    Some(Duration::from_secs(u64::try_from(delta).unwrap_or(0)))
}

/// Find the `rel="next"` target of an RFC 8288 `Link` header.
#[must_use]
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = header_str(headers, "link")?;
    link.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| {
            let p = p.trim();
            p == "rel=\"next\"" || p == "rel=next"
        });
        if is_next {
            Some(
                target
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string(),
            )
        } else {
            None
        }
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn truncate(body: &str, max: usize) -> String {
    if body.chars().count() <= max {
        body.to_string()
    } else {
        let mut out: String = body.chars().take(max).collect();
        out.push('…');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[test]
    fn status_classification() {
        let empty = HeaderMap::new();
        assert!(matches!(
            error_for_status(Provider::Github, StatusCode::UNAUTHORIZED, &empty, ""),
            UpkeepError::AuthInvalid { status: 401, .. }
        ));
        assert!(matches!(
            error_for_status(Provider::Github, StatusCode::FORBIDDEN, &empty, ""),
            UpkeepError::AuthInvalid { status: 403, .. }
        ));
        assert!(matches!(
            error_for_status(Provider::Vercel, StatusCode::TOO_MANY_REQUESTS, &empty, ""),
            UpkeepError::RateLimited { retry_after: None, .. }
        ));
        assert!(matches!(
            error_for_status(Provider::Vercel, StatusCode::BAD_GATEWAY, &empty, ""),
            UpkeepError::ProviderUnavailable { .. }
        ));
        assert!(matches!(
            error_for_status(Provider::Cloudflare, StatusCode::NOT_FOUND, &empty, "nope"),
            UpkeepError::ProviderError { status: 404, ref body, .. } if body == "nope"
        ));
    }

    #[test]
    fn retry_after_seconds() {
        let map = headers(&[("retry-after", "7")]);
        assert_eq!(retry_after_hint(&map), Some(Duration::from_secs(7)));
    }

    #[test]
    fn retry_after_from_reset_epoch_in_past_is_zero() {
        let map = headers(&[("x-ratelimit-reset", "1000")]);
        assert_eq!(retry_after_hint(&map), Some(Duration::ZERO));
    }

    #[test]
    fn next_link_parses_github_style_header() {
        let map = headers(&[(
            "link",
            "<https://api.github.com/x?page=2>; rel=\"next\", <https://api.github.com/x?page=9>; rel=\"last\"",
        )]);
        assert_eq!(
            next_link(&map).as_deref(),
            Some("https://api.github.com/x?page=2")
        );
    }

    #[test]
    fn extreme_ratelimit_reset_does_not_overflow() {
        let past = headers(&[("x-ratelimit-reset", "-9223372036854775808")]);
        assert_eq!(retry_after_hint(&past), Some(Duration::ZERO));
        let future = headers(&[("x-ratelimit-reset", "9223372036854775807")]);
        assert!(retry_after_hint(&future).unwrap() > Duration::from_secs(1_000_000));
    }

    #[test]
    fn next_link_absent_on_last_page() {
        let map = headers(&[("link", "<https://api.github.com/x?page=1>; rel=\"first\"")]);
        assert_eq!(next_link(&map), None);
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        let err = error_for_status(Provider::Github, StatusCode::IM_A_TEAPOT, &HeaderMap::new(), &body);
        match err {
            UpkeepError::ProviderError { body, .. } => assert!(body.chars().count() <= MAX_ERROR_BODY + 1),
            other => panic!("unexpected {other:?}"),
        }
    }
}
