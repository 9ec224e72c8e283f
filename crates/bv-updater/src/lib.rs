//! Checks a release endpoint for a newer beadview version.

use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Version of the running binary.
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type for update checks.
pub type UpdateResult<T> = Result<T, UpdateError>;

/// Errors that abort an update check.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The request could not be sent or the body could not be read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with a failure status.
    #[error("unexpected status {0}")]
    Status(StatusCode),
    /// The body was not a release document.
    #[error("invalid release json: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A release newer than the running version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Release tag, e.g. `v1.2.0`.
    pub tag: String,
    /// Page describing the release.
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: String,
    html_url: String,
}

/// Check `url` for a release newer than [`CURRENT_VERSION`].
pub async fn check_for_updates(
    client: &reqwest::Client,
    url: &str,
) -> UpdateResult<Option<Release>> {
    check_against(client, url, CURRENT_VERSION).await
}

/// Check `url` for a release newer than `current`.
///
/// Quota responses (403, 429) are logged and reported as "no update" since
/// they say nothing about the release itself.
pub async fn check_against(
    client: &reqwest::Client,
    url: &str,
    current: &str,
) -> UpdateResult<Option<Release>> {
    let response = client
        .get(url)
        .header(USER_AGENT, concat!("beadview/", env!("CARGO_PKG_VERSION")))
        .header(ACCEPT, "application/vnd.github+json")
        .send()
        .await?;

    let status = response.status();
    if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!(%status, "update check rate limited, skipping");
        return Ok(None);
    }
    if !status.is_success() {
        return Err(UpdateError::Status(status));
    }

    let body = response.bytes().await?;
    let latest: LatestRelease = serde_json::from_slice(&body)?;
    if is_newer(&latest.tag_name, current) {
        tracing::debug!(tag = %latest.tag_name, "newer release available");
        Ok(Some(Release {
            tag: latest.tag_name,
            url: latest.html_url,
        }))
    } else {
        Ok(None)
    }
}

/// True when `candidate` parses to a strictly greater version than `current`.
/// Unparseable candidates are never newer.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    match (parse_version(candidate), parse_version(current)) {
        (Some(candidate), Some(current)) => candidate > current,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

fn parse_version(tag: &str) -> Option<(u64, u64, u64)> {
    let trimmed = tag.trim().trim_start_matches(['v', 'V']);
    let core = trimmed.split(['-', '+']).next()?;
    let mut parts = core.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().map_or(Some(0), |part| part.parse().ok())?;
    let patch = parts.next().map_or(Some(0), |part| part.parse().ok())?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                let read = socket.read(&mut buf).await.expect("read");
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.expect("write");
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/releases/latest")
    }

    #[tokio::test]
    async fn newer_release_is_reported() {
        let url = serve_once(
            "200 OK",
            r#"{"tag_name": "v99.0.0", "html_url": "http://example.com/release"}"#,
        )
        .await;
        let release = check_for_updates(&reqwest::Client::new(), &url)
            .await
            .expect("check");
        assert_eq!(
            release,
            Some(Release {
                tag: "v99.0.0".into(),
                url: "http://example.com/release".into(),
            })
        );
    }

    #[tokio::test]
    async fn older_release_is_no_update() {
        let url = serve_once(
            "200 OK",
            r#"{"tag_name": "v0.0.0", "html_url": "http://example.com/release"}"#,
        )
        .await;
        let release = check_for_updates(&reqwest::Client::new(), &url)
            .await
            .expect("check");
        assert_eq!(release, None);
    }

    #[tokio::test]
    async fn rate_limit_is_swallowed() {
        let url = serve_once("403 Forbidden", r#"{"message": "rate limit exceeded"}"#).await;
        let release = check_for_updates(&reqwest::Client::new(), &url)
            .await
            .expect("check");
        assert_eq!(release, None);
    }

    #[tokio::test]
    async fn server_error_propagates() {
        let url = serve_once("500 Internal Server Error", "").await;
        let result = check_for_updates(&reqwest::Client::new(), &url).await;
        assert!(matches!(
            result,
            Err(UpdateError::Status(status)) if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
    }

    #[tokio::test]
    async fn invalid_json_propagates() {
        let url = serve_once("200 OK", "{invalid json}").await;
        let result = check_for_updates(&reqwest::Client::new(), &url).await;
        assert!(matches!(result, Err(UpdateError::Decode(_))));
    }

    #[test]
    fn version_comparison() {
        assert!(is_newer("v1.2.0", "1.1.9"));
        assert!(is_newer("2", "1.9.9"));
        assert!(is_newer("v0.10.0", "0.9.0"));
        assert!(!is_newer("v1.2.0", "1.2.0"));
        assert!(!is_newer("v1.2.0-rc.1", "1.2.0"));
        assert!(!is_newer("nightly", "0.1.0"));
        assert!(!is_newer("1.2.3.4", "0.1.0"));
    }
}
