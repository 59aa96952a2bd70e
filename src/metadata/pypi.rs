//! Fetch package metadata from the PyPI JSON API

use super::{MetadataSource, PackageMetadata};
use crate::config::NetworkConfig;
use crate::error::{AuditError, Result};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION")
);

/// HTTP client for `{registry_url}/pypi/{name}/json`
#[derive(Debug, Clone)]
pub struct PypiClient {
    client: Client,
    config: NetworkConfig,
}

impl PypiClient {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let client = build_client(config)?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn package_url(&self, name: &str) -> String {
        format!(
            "{}/pypi/{}/json",
            self.config.registry_url.trim_end_matches('/'),
            urlencoding::encode(name)
        )
    }
}

#[async_trait]
impl MetadataSource for PypiClient {
    async fn fetch(&self, name: &str) -> Result<PackageMetadata> {
        debug!("Fetching registry metadata for {}", name);

        let response = self.get_with_backoff(&self.package_url(name)).await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AuditError::PackageNotFound(name.to_string()));
        }
        if !status.is_success() {
            return Err(AuditError::api("pypi", format!("HTTP {}: {}", status, name)));
        }

        let body = response.bytes().await?;
        PackageMetadata::from_json(&body)
            .map_err(|e| AuditError::parse(format!("{}: {}", name, e)))
    }
}

impl PypiClient {
    /// GET `url`, retrying transport failures and 429 responses.
    ///
    /// Waits double after every attempt, starting at `request_delay_ms`. A
    /// 429 carrying `Retry-After` waits what the registry asked for instead,
    /// capped at the per-request timeout.
    async fn get_with_backoff(&self, url: &str) -> Result<Response> {
        let mut backoff = self.config.request_delay();
        let mut retries_left = self.config.max_retries;

        loop {
            let wait = match self.client.get(url).send().await {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = retry_after(&response)
                        .map(|asked| asked.min(self.config.timeout()))
                        .unwrap_or(backoff);
                    if retries_left == 0 {
                        return Err(AuditError::RateLimitExceeded {
                            service: "pypi".to_string(),
                            retry_after: Some(wait),
                        });
                    }
                    warn!("Rate limited by registry, retrying {} in {:?}", url, wait);
                    wait
                }
                Ok(response) => return Ok(response),
                Err(e) if retries_left == 0 => {
                    return Err(AuditError::transport(format!("GET {}", url), e));
                }
                Err(e) => {
                    warn!("Request to {} failed, retrying in {:?}: {}", url, backoff, e);
                    backoff
                }
            };

            tokio::time::sleep(wait).await;
            retries_left -= 1;
            backoff *= 2;
        }
    }
}

fn build_client(config: &NetworkConfig) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.timeout())
        .build()
        .map_err(|e| AuditError::transport("cannot build HTTP client", e))
}

/// Delay requested by a `Retry-After` header given in seconds. The HTTP-date
/// form is ignored.
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(server: &mockito::ServerGuard) -> NetworkConfig {
        NetworkConfig {
            registry_url: server.url(),
            timeout_secs: 5,
            max_retries: 1,
            request_delay_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_fetch_parses_document() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pypi/demo/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"info": {"name": "demo", "version": "1.2.0", "author_email": "dev@example.org",
                    "requires_dist": ["requests>=2"]},
                    "releases": {"1.2.0": [{"filename": "demo-1.2.0.tar.gz", "packagetype": "sdist",
                    "size": 40960, "upload_time": "2024-03-01T10:00:00"}]}}"#,
            )
            .create_async()
            .await;

        let client = PypiClient::new(&config_for(&server)).unwrap();
        let meta = client.fetch("demo").await.unwrap();

        mock.assert_async().await;
        assert_eq!(meta.version(), Some("1.2.0"));
        assert_eq!(meta.requires_dist(), ["requests>=2".to_string()]);
        assert_eq!(meta.current_release_files()[0].size, Some(40960));
    }

    #[tokio::test]
    async fn test_fetch_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pypi/ghost-package/json")
            .with_status(404)
            .create_async()
            .await;

        let client = PypiClient::new(&config_for(&server)).unwrap();
        let err = client.fetch("ghost-package").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_fetch_server_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pypi/broken/json")
            .with_status(500)
            .create_async()
            .await;

        let client = PypiClient::new(&config_for(&server)).unwrap();
        let err = client.fetch("broken").await.unwrap_err();
        assert!(matches!(err, AuditError::ApiError { .. }));
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up_after_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pypi/busy/json")
            .with_status(429)
            .expect(2)
            .create_async()
            .await;

        let client = PypiClient::new(&config_for(&server)).unwrap();
        let err = client.fetch("busy").await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, AuditError::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_rate_limit_honours_retry_after() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pypi/throttled/json")
            .with_status(429)
            .with_header("retry-after", "0")
            .expect(2)
            .create_async()
            .await;

        let mut config = config_for(&server);
        config.request_delay_ms = 60_000;
        let client = PypiClient::new(&config).unwrap();
        let err = client.fetch("throttled").await.unwrap_err();

        mock.assert_async().await;
        match err {
            AuditError::RateLimitExceeded { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::ZERO));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_network_error() {
        let config = NetworkConfig {
            registry_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            max_retries: 0,
            request_delay_ms: 1,
        };
        let client = PypiClient::new(&config).unwrap();
        let err = client.fetch("anything").await.unwrap_err();
        assert!(matches!(err, AuditError::NetworkError { source: Some(_), .. }));
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pypi/garbled/json")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let client = PypiClient::new(&config_for(&server)).unwrap();
        let err = client.fetch("garbled").await.unwrap_err();
        assert!(matches!(err, AuditError::ParseError(_)));
    }
}
