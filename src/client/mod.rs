//! Twitter API client implementation.

use crate::auth::Credentials;
use crate::config::{PaginationConfig, TwitterConfig, TwitterConfigBuilder, UploadConfig};
use crate::errors::{TwitterError, TwitterResult};
use crate::pagination::{paginate, CursorPager, PaginateRequest, Paginated};
use crate::resilience::RetryConfig;
use crate::services::MediaService;
use crate::transport::{HttpMethod, HttpTransport, ReqwestTransport};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

mod executor;
pub use executor::{map_error_response, ApiHost, RequestExecutor, RequestOptions};

/// Twitter API client.
///
/// Cheap to clone; clones share the transport and executor. Every operation
/// may run concurrently with any other.
#[derive(Clone)]
pub struct TwitterClient {
    executor: Arc<RequestExecutor>,
}

impl TwitterClient {
    /// Creates a client with the default reqwest transport.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use integrations_twitter::{Credentials, TwitterClient, TwitterConfig};
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = TwitterConfig::builder()
    ///     .credentials(Credentials::bearer("AAAA"))
    ///     .build()?;
    ///
    /// let client = TwitterClient::new(config)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: TwitterConfig) -> TwitterResult<Self> {
        let transport = ReqwestTransport::from_config(&config).map_err(|e| {
            TwitterError::configuration(format!("Failed to create transport: {}", e))
        })?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates a client on top of a custom transport.
    pub fn with_transport(
        config: TwitterConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> TwitterResult<Self> {
        config.validate()?;
        let executor = Arc::new(RequestExecutor::new(config, transport)?);
        Ok(Self { executor })
    }

    /// Creates a new client builder.
    pub fn builder() -> TwitterClientBuilder {
        TwitterClientBuilder::new()
    }

    /// Executes a request and returns the JSON body, `None` for empty responses.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use integrations_twitter::{TwitterClient, HttpMethod, RequestOptions};
    /// # async fn example(client: TwitterClient) -> Result<(), Box<dyn std::error::Error>> {
    /// let created = client
    ///     .execute_json(
    ///         HttpMethod::Post,
    ///         "tweets",
    ///         RequestOptions::new().json(serde_json::json!({"text": "hello"})),
    ///     )
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute_json(
        &self,
        method: HttpMethod,
        path: &str,
        options: RequestOptions,
    ) -> TwitterResult<Option<Value>> {
        self.executor.execute_json(method, path, options).await
    }

    /// Executes a request and deserializes the JSON body.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        options: RequestOptions,
    ) -> TwitterResult<T> {
        self.executor.execute(method, path, options).await
    }

    /// Fetches one page, or every page when `request.all` is set.
    pub async fn paginate<T: DeserializeOwned>(
        &self,
        request: PaginateRequest,
    ) -> TwitterResult<Paginated<T>> {
        paginate(self.executor.clone(), request).await
    }

    /// Creates a page-by-page reader.
    pub fn pager<T: DeserializeOwned>(&self, request: PaginateRequest) -> CursorPager<T> {
        CursorPager::new(self.executor.clone(), request)
    }

    /// Access the media upload service.
    pub fn media(&self) -> MediaService {
        MediaService::new(self.executor.clone())
    }

    /// Gets the configuration.
    pub fn config(&self) -> &TwitterConfig {
        self.executor.config()
    }

    /// Gets the request executor (for advanced use cases).
    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }
}

/// Builder for TwitterClient.
pub struct TwitterClientBuilder {
    config_builder: TwitterConfigBuilder,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl TwitterClientBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            config_builder: TwitterConfig::builder(),
            transport: None,
        }
    }

    /// Sets the credentials.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config_builder = self.config_builder.credentials(credentials);
        self
    }

    /// Sets the API base URL.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.api_url(url);
        self
    }

    /// Sets the upload base URL.
    pub fn upload_url(mut self, url: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.upload_url(url);
        self
    }

    /// Points both base URLs at one host.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.base_url(url);
        self
    }

    /// Sets the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config_builder = self.config_builder.timeout(timeout);
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config_builder = self.config_builder.connect_timeout(timeout);
        self
    }

    /// Sets the user agent.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.user_agent(ua);
        self
    }

    /// Sets the retry configuration.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config_builder = self.config_builder.retry(retry);
        self
    }

    /// Sets the upload configuration.
    pub fn upload(mut self, upload: UploadConfig) -> Self {
        self.config_builder = self.config_builder.upload(upload);
        self
    }

    /// Sets the pagination configuration.
    pub fn pagination(mut self, pagination: PaginationConfig) -> Self {
        self.config_builder = self.config_builder.pagination(pagination);
        self
    }

    /// Uses a custom transport instead of reqwest.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the client.
    pub fn build(self) -> TwitterResult<TwitterClient> {
        let config = self.config_builder.build()?;
        match self.transport {
            Some(transport) => TwitterClient::with_transport(config, transport),
            None => TwitterClient::new(config),
        }
    }
}

impl Default for TwitterClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
