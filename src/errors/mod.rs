//! Error types for the Twitter integration.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for Twitter operations.
pub type TwitterResult<T> = Result<T, TwitterError>;

/// Top-level error type for the Twitter integration.
#[derive(Debug, Error)]
pub enum TwitterError {
    /// Configuration error (bad or missing credentials, invalid settings).
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Authentication error (signature or token rejected by the server).
    #[error("Authentication error: {0}")]
    Authentication(#[from] AuthenticationError),

    /// Rate limit error.
    #[error("Rate limit error: {0}")]
    RateLimit(#[from] RateLimitError),

    /// Transient network error.
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Request rejected by the server as invalid.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Server-side failure.
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// Asynchronous media processing failure.
    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    /// Upload protocol error.
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// Response error.
    #[error("Response error: {0}")]
    Response(#[from] ResponseError),

    /// The caller cancelled the operation.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

impl TwitterError {
    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        TwitterError::Configuration(ConfigurationError::InvalidConfiguration(msg.into()))
    }

    /// Creates a missing-credentials error.
    pub fn missing_credentials(msg: impl Into<String>) -> Self {
        TwitterError::Configuration(ConfigurationError::MissingCredentials(msg.into()))
    }

    /// Creates a request validation error raised before any network call.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        TwitterError::Validation(ValidationError::InvalidRequest(msg.into()))
    }

    /// Creates a deserialization error.
    pub fn deserialization(msg: impl Into<String>) -> Self {
        TwitterError::Response(ResponseError::DeserializationError(msg.into()))
    }

    /// Creates a cancellation error.
    pub fn cancelled(msg: impl Into<String>) -> Self {
        TwitterError::Cancelled(msg.into())
    }

    /// Returns true if the executor may retry the failed call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TwitterError::RateLimit(RateLimitError::RateLimited { .. })
                | TwitterError::Network(_)
        )
    }

    /// Returns true if the error was caused by caller cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            TwitterError::Cancelled(_) => true,
            TwitterError::Upload(UploadError::AltTextFailed { source, .. }) => source.is_cancelled(),
            _ => false,
        }
    }

    /// Returns the retry delay hint if available.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TwitterError::RateLimit(RateLimitError::RateLimited { retry_after, .. })
            | TwitterError::RateLimit(RateLimitError::RateLimitExceeded { retry_after, .. }) => {
                *retry_after
            }
            _ => None,
        }
    }

    /// Returns the HTTP status code if the error came from an API response.
    pub fn status_code(&self) -> Option<u16> {
        self.api_detail().map(|d| d.status)
    }

    /// Returns the normalized API error detail if the error came from an API response.
    pub fn api_detail(&self) -> Option<&ApiErrorDetail> {
        match self {
            TwitterError::Authentication(AuthenticationError::Rejected(detail))
            | TwitterError::Validation(ValidationError::Api(detail))
            | TwitterError::Server(ServerError::Api(detail))
            | TwitterError::RateLimit(RateLimitError::RateLimited { detail, .. })
            | TwitterError::RateLimit(RateLimitError::RateLimitExceeded { detail, .. }) => {
                Some(detail)
            }
            TwitterError::Upload(UploadError::AltTextFailed { source, .. }) => source.api_detail(),
            _ => None,
        }
    }

    /// Returns the identifier of media that is usable despite the error.
    pub fn media_id(&self) -> Option<&str> {
        match self {
            TwitterError::Upload(UploadError::AltTextFailed { media_id, .. }) => Some(media_id),
            _ => None,
        }
    }
}

/// Normalized error payload produced from any upstream error envelope.
#[derive(Debug, Clone)]
pub struct ApiErrorDetail {
    /// HTTP status code.
    pub status: u16,
    /// Machine-readable error type or code, when the server provided one.
    pub kind: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// The raw error payload, kept for diagnostics.
    pub raw: Option<serde_json::Value>,
}

impl ApiErrorDetail {
    /// Creates a new error detail.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            kind: None,
            message: message.into(),
            raw: None,
        }
    }

    /// Sets the machine-readable kind.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Sets the raw payload.
    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }
}

impl fmt::Display for ApiErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref kind) = self.kind {
            write!(f, " [{}]", kind)?;
        }
        write!(f, " (HTTP {})", self.status)
    }
}

/// Rate limit window reported by the `x-rate-limit-*` response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Maximum requests allowed in the window.
    pub limit: Option<u32>,
    /// Remaining requests in the current window.
    pub remaining: Option<u32>,
    /// Time when the window resets.
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitInfo {
    /// Returns true if none of the headers were present.
    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.remaining.is_none() && self.reset_at.is_none()
    }

    /// Time left until the window resets, measured from `now`.
    pub fn reset_in(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.reset_at
            .map(|reset| (reset - now).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Missing credentials.
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// Invalid credentials.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// The server rejected the request signature or token.
    #[error("Request rejected: {0}")]
    Rejected(ApiErrorDetail),

    /// The computed Authorization header could not be encoded.
    #[error("Invalid authorization header: {0}")]
    InvalidHeader(String),
}

/// Rate limit errors.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// A single 429 response.
    #[error("Rate limited: {detail}")]
    RateLimited {
        /// Error detail from the response.
        detail: ApiErrorDetail,
        /// Wait requested by the server.
        retry_after: Option<Duration>,
        /// Rate limit window from the response headers.
        rate_limit: Option<RateLimitInfo>,
    },

    /// 429 responses persisted past the retry bound.
    #[error("Rate limit exceeded after {retries} retries: {detail}")]
    RateLimitExceeded {
        /// Number of retries performed.
        retries: u32,
        /// Wait requested by the last response.
        retry_after: Option<Duration>,
        /// Error detail from the last response.
        detail: ApiErrorDetail,
    },
}

/// Network errors.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Connection failed or was reset.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Timeout.
    #[error("Request timeout: {0}")]
    Timeout(String),
}

/// Validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A 4xx response other than 401 and 429.
    #[error("{0}")]
    Api(ApiErrorDetail),

    /// The request was rejected locally before it was sent.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The payload exceeds the limit for its media kind.
    #[error("Payload of {size} bytes exceeds the {limit} byte limit for {kind}")]
    PayloadTooLarge {
        /// Payload size in bytes.
        size: u64,
        /// Limit in bytes.
        limit: u64,
        /// Media kind the limit applies to.
        kind: String,
    },
}

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A 5xx response.
    #[error("{0}")]
    Api(ApiErrorDetail),
}

/// Media processing errors.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// The server reported `state = failed` while processing uploaded media.
    #[error("Processing of media {media_id} failed: {reason}")]
    ProcessingFailed {
        /// Media identifier.
        media_id: String,
        /// Server-provided reason, verbatim.
        reason: String,
        /// Server-provided error code.
        code: Option<i64>,
        /// Server-provided error name (e.g. `InvalidMedia`).
        name: Option<String>,
    },
}

/// Upload protocol errors.
#[derive(Debug, Error)]
pub enum UploadError {
    /// A transition not allowed by the upload state machine.
    #[error("Invalid upload state transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },

    /// The payload is empty.
    #[error("Cannot upload an empty payload")]
    EmptyPayload,

    /// The MIME type cannot be uploaded.
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// A response omitted the media identifier.
    #[error("Missing media identifier in {0} response")]
    MissingMediaId(String),

    /// FINALIZE was attempted before every byte was acknowledged.
    #[error("Cannot finalize after {sent} of {total} bytes")]
    IncompleteTransfer {
        /// Bytes acknowledged.
        sent: u64,
        /// Payload size.
        total: u64,
    },

    /// The media is ready but attaching its alt text failed.
    #[error("Media {media_id} is ready but setting alt text failed: {source}")]
    AltTextFailed {
        /// Identifier of the usable media.
        media_id: String,
        /// Error returned by the metadata call.
        source: Box<TwitterError>,
    },
}

/// Response errors.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// Deserialization error.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// Unexpected format.
    #[error("Unexpected response format: {0}")]
    UnexpectedFormat(String),
}

/// Transport errors.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Network error.
    #[error("Network error: {0}")]
    Network(String),

    /// Timeout error.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() || err.is_body() {
            TransportError::Network(err.to_string())
        } else {
            TransportError::Http(err.to_string())
        }
    }
}

impl From<TransportError> for TwitterError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(msg) => TwitterError::Network(NetworkError::Timeout(msg)),
            TransportError::Network(msg) => {
                TwitterError::Network(NetworkError::ConnectionFailed(msg))
            }
            TransportError::Http(msg) => {
                TwitterError::Response(ResponseError::UnexpectedFormat(msg))
            }
        }
    }
}
