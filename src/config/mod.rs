//! Configuration for the Twitter client.

use crate::auth::Credentials;
use crate::errors::{ConfigurationError, TwitterError, TwitterResult};
use crate::resilience::RetryConfig;
use std::time::Duration;
use url::Url;

/// Default base URL for the v2 API.
pub const DEFAULT_API_URL: &str = "https://api.twitter.com/2/";

/// Default base URL for the v1.1 media upload API.
pub const DEFAULT_UPLOAD_URL: &str = "https://upload.twitter.com/1.1/";

/// Largest chunk the upload endpoint accepts per APPEND.
pub const MAX_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Configuration for the Twitter client.
#[derive(Clone, Debug)]
pub struct TwitterConfig {
    /// Credentials used for every request.
    pub credentials: Credentials,

    /// Base URL for the API.
    pub api_url: Url,

    /// Base URL for media uploads.
    pub upload_url: Url,

    /// Per-call timeout (connect + read).
    pub timeout: Duration,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// User agent string.
    pub user_agent: String,

    /// Retry bounds for rate limits and network failures.
    pub retry: RetryConfig,

    /// Chunked upload settings.
    pub upload: UploadConfig,

    /// Pagination settings.
    pub pagination: PaginationConfig,

    /// Pool configuration.
    pub pool: PoolConfig,
}

/// Connection pool configuration.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Maximum idle connections per host.
    pub max_idle_per_host: usize,

    /// Idle timeout.
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 10,
            idle_timeout: Some(Duration::from_secs(90)),
        }
    }
}

/// Chunked upload configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadConfig {
    /// Bytes per APPEND request.
    pub chunk_size: usize,

    /// Wait between STATUS polls when the server gives no `check_after_secs`.
    pub default_poll_interval: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: MAX_CHUNK_SIZE,
            default_poll_interval: Duration::from_secs(5),
        }
    }
}

/// Pagination configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaginationConfig {
    /// Largest `max_results` the server accepts per page.
    pub server_max_results: u32,

    /// Query parameter that carries the continuation cursor.
    pub default_cursor_param: String,

    /// Optional cap on pages fetched in drain-all mode. `None` is unbounded.
    pub max_pages: Option<u32>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            server_max_results: 100,
            default_cursor_param: "pagination_token".to_string(),
            max_pages: None,
        }
    }
}

impl TwitterConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> TwitterConfigBuilder {
        TwitterConfigBuilder::new()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> TwitterResult<()> {
        self.credentials.validate()?;

        validate_base_url("API", &self.api_url)?;
        validate_base_url("Upload", &self.upload_url)?;

        if self.upload.chunk_size == 0 || self.upload.chunk_size > MAX_CHUNK_SIZE {
            return Err(invalid(format!(
                "Upload chunk size must be between 1 and {} bytes",
                MAX_CHUNK_SIZE
            )));
        }

        if self.pagination.server_max_results == 0 {
            return Err(invalid("Server page size must be at least 1"));
        }

        if self.pagination.default_cursor_param.trim().is_empty() {
            return Err(invalid("Cursor parameter name cannot be empty"));
        }

        if self.pagination.max_pages == Some(0) {
            return Err(invalid("Page cap must be at least 1"));
        }

        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> TwitterError {
    TwitterError::Configuration(ConfigurationError::InvalidConfiguration(msg.into()))
}

fn validate_base_url(name: &str, url: &Url) -> TwitterResult<()> {
    let loopback = matches!(
        url.host_str(),
        Some("localhost") | Some("127.0.0.1") | Some("[::1]")
    );

    match url.scheme() {
        "https" => {}
        "http" if loopback => {}
        _ => return Err(invalid(format!("{} URL must use HTTPS", name))),
    }

    if !url.path().ends_with('/') {
        return Err(invalid(format!("{} URL must end with '/'", name)));
    }

    Ok(())
}

fn parse_base_url(name: &str, raw: &str) -> TwitterResult<Url> {
    // Without a trailing slash `Url::join` would drop the last path segment.
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };

    Url::parse(&normalized).map_err(|e| invalid(format!("Invalid {} URL '{}': {}", name, raw, e)))
}

/// Builder for TwitterConfig.
pub struct TwitterConfigBuilder {
    credentials: Option<Credentials>,
    api_url: Option<String>,
    upload_url: Option<String>,
    timeout: Duration,
    connect_timeout: Duration,
    user_agent: Option<String>,
    retry: RetryConfig,
    upload: UploadConfig,
    pagination: PaginationConfig,
    pool: PoolConfig,
}

impl TwitterConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            credentials: None,
            api_url: None,
            upload_url: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: None,
            retry: RetryConfig::default(),
            upload: UploadConfig::default(),
            pagination: PaginationConfig::default(),
            pool: PoolConfig::default(),
        }
    }

    /// Sets the credentials.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the API base URL.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// Sets the upload base URL.
    pub fn upload_url(mut self, url: impl Into<String>) -> Self {
        self.upload_url = Some(url.into());
        self
    }

    /// Points both the API and upload base URLs at one host, e.g. a local mock server.
    pub fn base_url(self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.api_url(url.clone()).upload_url(url)
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the user agent string.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Sets the retry configuration.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the upload configuration.
    pub fn upload(mut self, upload: UploadConfig) -> Self {
        self.upload = upload;
        self
    }

    /// Sets the upload chunk size.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.upload.chunk_size = size;
        self
    }

    /// Sets the pagination configuration.
    pub fn pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = pagination;
        self
    }

    /// Sets the pool configuration.
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> TwitterResult<TwitterConfig> {
        let credentials = self.credentials.ok_or_else(|| {
            TwitterError::Configuration(ConfigurationError::MissingCredentials(
                "Credentials are required".to_string(),
            ))
        })?;

        let api_url = parse_base_url(
            "API",
            self.api_url.as_deref().unwrap_or(DEFAULT_API_URL),
        )?;
        let upload_url = parse_base_url(
            "upload",
            self.upload_url.as_deref().unwrap_or(DEFAULT_UPLOAD_URL),
        )?;

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("integrations-twitter/{}", env!("CARGO_PKG_VERSION")));

        let config = TwitterConfig {
            credentials,
            api_url,
            upload_url,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            user_agent,
            retry: self.retry,
            upload: self.upload,
            pagination: self.pagination,
            pool: self.pool,
        };

        config.validate()?;

        Ok(config)
    }
}

impl Default for TwitterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials::oauth1("key", "secret", "token", "token-secret")
    }

    #[test]
    fn test_default_config() {
        let config = TwitterConfig::builder()
            .credentials(credentials())
            .build()
            .unwrap();

        assert_eq!(config.api_url.as_str(), "https://api.twitter.com/2/");
        assert_eq!(config.upload_url.as_str(), "https://upload.twitter.com/1.1/");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.retry.max_rate_limit_retries, 3);
        assert_eq!(config.retry.max_network_retries, 1);
        assert_eq!(config.upload.chunk_size, 5 * 1024 * 1024);
        assert_eq!(config.pagination.server_max_results, 100);
        assert_eq!(config.pagination.default_cursor_param, "pagination_token");
        assert_eq!(config.pagination.max_pages, None);
        assert!(config.user_agent.starts_with("integrations-twitter/"));
    }

    #[test]
    fn test_custom_config() {
        let config = TwitterConfig::builder()
            .credentials(Credentials::bearer("AAAA"))
            .api_url("https://api.example.com/2")
            .timeout(Duration::from_secs(60))
            .chunk_size(1024 * 1024)
            .user_agent("test-agent/1.0")
            .build()
            .unwrap();

        // A trailing slash is added so relative paths keep the version prefix.
        assert_eq!(config.api_url.as_str(), "https://api.example.com/2/");
        assert_eq!(
            config.api_url.join("tweets/search/recent").unwrap().as_str(),
            "https://api.example.com/2/tweets/search/recent"
        );
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.upload.chunk_size, 1024 * 1024);
        assert_eq!(config.user_agent, "test-agent/1.0");
    }

    #[test]
    fn test_loopback_http_allowed() {
        let config = TwitterConfig::builder()
            .credentials(credentials())
            .base_url("http://127.0.0.1:8080")
            .build()
            .unwrap();

        assert_eq!(config.api_url.as_str(), "http://127.0.0.1:8080/");
        assert_eq!(config.upload_url, config.api_url);
    }

    #[test]
    fn test_plain_http_rejected() {
        let result = TwitterConfig::builder()
            .credentials(credentials())
            .api_url("http://api.twitter.com/2/")
            .build();

        assert!(matches!(
            result,
            Err(TwitterError::Configuration(ConfigurationError::InvalidConfiguration(_)))
        ));
    }

    #[test]
    fn test_invalid_url_is_an_error() {
        let result = TwitterConfig::builder()
            .credentials(credentials())
            .upload_url("not a url")
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_chunk_size() {
        for size in [0, MAX_CHUNK_SIZE + 1] {
            let result = TwitterConfig::builder()
                .credentials(credentials())
                .chunk_size(size)
                .build();
            assert!(result.is_err(), "chunk size {} accepted", size);
        }
    }

    #[test]
    fn test_invalid_pagination() {
        let result = TwitterConfig::builder()
            .credentials(credentials())
            .pagination(PaginationConfig {
                server_max_results: 0,
                ..Default::default()
            })
            .build();
        assert!(result.is_err());

        let result = TwitterConfig::builder()
            .credentials(credentials())
            .pagination(PaginationConfig {
                max_pages: Some(0),
                ..Default::default()
            })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_credentials() {
        let result = TwitterConfig::builder().build();
        assert!(matches!(
            result,
            Err(TwitterError::Configuration(ConfigurationError::MissingCredentials(_)))
        ));

        let result = TwitterConfig::builder()
            .credentials(Credentials::oauth1("key", "secret", "token", ""))
            .build();
        assert!(result.is_err());
    }
}
