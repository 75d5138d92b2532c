//! Request executor with signing, retry, and error mapping.

use crate::config::TwitterConfig;
use crate::errors::{
    AuthenticationError, RateLimitError, ResponseError, ServerError, TwitterError, TwitterResult,
    ValidationError,
};
use crate::resilience::{self, ensure_not_cancelled, sleep_or_cancel, RetryState};
use crate::signing::RequestSigner;
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, MultipartBody, RequestBody};
use crate::types::ErrorEnvelope;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

/// Host a request is addressed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApiHost {
    /// The v2 API host.
    #[default]
    Api,
    /// The media upload host.
    Upload,
}

/// Per-call request options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Query parameters, appended to the URL and signed.
    pub query: Vec<(String, String)>,
    /// Request body.
    pub body: RequestBody,
    /// Extra headers.
    pub headers: HeaderMap,
    /// Target host.
    pub host: ApiHost,
    /// Cancellation signal checked before every attempt and during waits.
    pub cancel: Option<CancellationToken>,
    /// Whether a network failure may be retried.
    pub idempotent: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            query: Vec::new(),
            body: RequestBody::Empty,
            headers: HeaderMap::new(),
            host: ApiHost::Api,
            cancel: None,
            idempotent: true,
        }
    }
}

impl RequestOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Adds several query parameters.
    pub fn queries<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets a JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Sets a form-encoded body.
    pub fn form(mut self, params: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(params);
        self
    }

    /// Sets a multipart body.
    pub fn multipart(mut self, body: MultipartBody) -> Self {
        self.body = RequestBody::Multipart(body);
        self
    }

    /// Adds a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the target host.
    pub fn host(mut self, host: ApiHost) -> Self {
        self.host = host;
        self
    }

    /// Sets the cancellation token.
    pub fn cancel(mut self, token: Option<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Marks the request as unsafe to repeat after a network failure.
    pub fn non_idempotent(mut self) -> Self {
        self.idempotent = false;
        self
    }
}

/// Request executor that signs, sends, retries and maps errors.
///
/// The executor holds no mutable state, so one instance is shared by every
/// concurrent operation of a client.
pub struct RequestExecutor {
    config: TwitterConfig,
    transport: Arc<dyn HttpTransport>,
    signer: RequestSigner,
}

impl RequestExecutor {
    /// Creates a new request executor.
    pub fn new(config: TwitterConfig, transport: Arc<dyn HttpTransport>) -> TwitterResult<Self> {
        let signer = RequestSigner::new(config.credentials.clone())?;
        Ok(Self {
            config,
            transport,
            signer,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TwitterConfig {
        &self.config
    }

    /// Executes a request and parses the JSON body. Empty and 204 responses yield `None`.
    pub async fn execute_json(
        &self,
        method: HttpMethod,
        path: &str,
        options: RequestOptions,
    ) -> TwitterResult<Option<Value>> {
        let response = self.execute_raw(method, path, options).await?;

        if response.is_empty() {
            return Ok(None);
        }

        serde_json::from_slice(&response.body)
            .map(Some)
            .map_err(|e| TwitterError::deserialization(format!("Failed to parse response: {}", e)))
    }

    /// Executes a request and deserializes the JSON body into `T`.
    ///
    /// An empty body is decoded as JSON `null`, so `Option<_>` and `()` targets accept it.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        options: RequestOptions,
    ) -> TwitterResult<T> {
        let response = self.execute_raw(method, path, options).await?;

        let body: &[u8] = if response.is_empty() {
            b"null"
        } else {
            &response.body
        };

        serde_json::from_slice(body).map_err(|e| {
            TwitterError::deserialization(format!("Failed to deserialize response: {}", e))
        })
    }

    /// Executes a request and returns the successful response.
    ///
    /// 429 responses are retried after the server-requested wait, network
    /// failures of idempotent requests once; every other failure is returned
    /// immediately. Each attempt is signed with a fresh nonce.
    #[instrument(skip(self, options), fields(method = %method, host = ?options.host))]
    pub async fn execute_raw(
        &self,
        method: HttpMethod,
        path: &str,
        options: RequestOptions,
    ) -> TwitterResult<HttpResponse> {
        let url = self.build_url(options.host, path, &options.query)?;
        let cancel = options.cancel.as_ref();
        let mut retry = RetryState::new(&self.config.retry, options.idempotent);

        loop {
            ensure_not_cancelled(cancel, "request cancelled before sending")?;

            let error = match self.attempt(method, &url, &options).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            match retry.next_delay(&error) {
                Some(delay) => {
                    warn!(
                        attempt = retry.retries(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying request"
                    );
                    sleep_or_cancel(delay, cancel, "request cancelled while waiting to retry")
                        .await?;
                }
                None => return Err(retry.finish(error)),
            }
        }
    }

    async fn attempt(
        &self,
        method: HttpMethod,
        url: &Url,
        options: &RequestOptions,
    ) -> TwitterResult<HttpResponse> {
        let signed = self
            .signer
            .sign(method, url, options.body.signed_params())?;

        let mut headers = signed.headers;
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.config.user_agent).map_err(|e| {
                TwitterError::configuration(format!("Invalid user agent: {}", e))
            })?,
        );
        for (name, value) in options.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }

        let request = HttpRequest {
            method,
            url: signed.url,
            headers,
            body: options.body.clone(),
            timeout: Some(self.config.timeout),
        };

        let send = self.transport.send(request);
        let response = match options.cancel.as_ref() {
            Some(token) => tokio::select! {
                _ = token.cancelled() => {
                    return Err(TwitterError::cancelled("request cancelled in flight"));
                }
                result = send => result?,
            },
            None => send.await?,
        };

        debug!(
            status = response.status.as_u16(),
            bytes = response.body.len(),
            "Received response"
        );

        if response.status.is_success() {
            Ok(response)
        } else {
            Err(map_error_response(&response))
        }
    }

    /// Builds the request URL for a path relative to a host's base URL.
    pub fn build_url(
        &self,
        host: ApiHost,
        path: &str,
        query: &[(String, String)],
    ) -> TwitterResult<Url> {
        let base = match host {
            ApiHost::Api => &self.config.api_url,
            ApiHost::Upload => &self.config.upload_url,
        };

        let mut url = base
            .join(path.trim_start_matches('/'))
            .map_err(|e| TwitterError::invalid_request(format!("Invalid URL: {}", e)))?;

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        Ok(url)
    }
}

/// Maps a non-2xx response onto the error taxonomy.
pub fn map_error_response(response: &HttpResponse) -> TwitterError {
    let status = response.status;
    let detail = ErrorEnvelope::into_detail(status.as_u16(), &response.body);

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let rate_limit = resilience::rate_limit_info(&response.headers);
            TwitterError::RateLimit(RateLimitError::RateLimited {
                detail,
                retry_after: resilience::retry_after(&response.headers, Utc::now()),
                rate_limit: (!rate_limit.is_empty()).then_some(rate_limit),
            })
        }
        StatusCode::UNAUTHORIZED => {
            TwitterError::Authentication(AuthenticationError::Rejected(detail))
        }
        s if s.is_client_error() => TwitterError::Validation(ValidationError::Api(detail)),
        s if s.is_server_error() => TwitterError::Server(ServerError::Api(detail)),
        s => TwitterError::Response(ResponseError::UnexpectedFormat(format!(
            "Unexpected HTTP status {}: {}",
            s.as_u16(),
            detail.message
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use crate::mocks::MockTransport;
    use bytes::Bytes;

    fn executor() -> RequestExecutor {
        let config = TwitterConfig::builder()
            .credentials(Credentials::oauth1("key", "secret", "token", "token-secret"))
            .build()
            .unwrap();
        RequestExecutor::new(config, Arc::new(MockTransport::new())).unwrap()
    }

    fn response(status: u16, body: &'static str) -> HttpResponse {
        HttpResponse::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            Bytes::from_static(body.as_bytes()),
        )
    }

    #[test]
    fn test_build_url() {
        let executor = executor();

        let url = executor
            .build_url(ApiHost::Api, "/tweets/search/recent", &[])
            .unwrap();
        assert_eq!(url.as_str(), "https://api.twitter.com/2/tweets/search/recent");

        let url = executor
            .build_url(
                ApiHost::Upload,
                "media/upload.json",
                &[("command".to_string(), "STATUS".to_string())],
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://upload.twitter.com/1.1/media/upload.json?command=STATUS"
        );
    }

    #[test]
    fn test_error_mapping() {
        let error = map_error_response(&response(401, r#"{"title":"Unauthorized","detail":"Unauthorized","type":"about:blank","status":401}"#));
        assert!(matches!(
            error,
            TwitterError::Authentication(AuthenticationError::Rejected(_))
        ));

        let error = map_error_response(&response(403, r#"{"errors":[{"message":"Forbidden","code":453}]}"#));
        assert_eq!(error.status_code(), Some(403));
        assert_eq!(error.api_detail().unwrap().kind.as_deref(), Some("453"));
        assert!(matches!(error, TwitterError::Validation(ValidationError::Api(_))));

        let error = map_error_response(&response(503, ""));
        assert!(matches!(error, TwitterError::Server(_)));
        assert!(!error.is_retryable());

        let error = map_error_response(&response(429, "{}"));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_request_options_builder() {
        let options = RequestOptions::new()
            .query("max_results", 10)
            .queries(vec![("query", "rust")])
            .host(ApiHost::Upload)
            .non_idempotent();

        assert_eq!(
            options.query,
            vec![
                ("max_results".to_string(), "10".to_string()),
                ("query".to_string(), "rust".to_string()),
            ]
        );
        assert_eq!(options.host, ApiHost::Upload);
        assert!(!options.idempotent);
        assert!(RequestOptions::default().idempotent);
    }
}
