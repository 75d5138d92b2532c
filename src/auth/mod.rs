//! Credentials for the Twitter API.
//!
//! Two credential shapes are supported:
//! - OAuth 1.0a user context (consumer key/secret plus access token/secret),
//!   used to sign every request with HMAC-SHA1
//! - An app-only bearer token, sent verbatim
//!
//! Credentials are immutable once built and are shared read-only between
//! concurrent operations.
//!
//! # Example
//!
//! ```
//! use integrations_twitter::auth::Credentials;
//!
//! let credentials = Credentials::oauth1(
//!     "consumer-key",
//!     "consumer-secret",
//!     "access-token",
//!     "access-token-secret",
//! );
//! assert!(credentials.validate().is_ok());
//! ```

use crate::errors::{ConfigurationError, TwitterError, TwitterResult};
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};

/// Length of generated OAuth nonces.
pub const NONCE_LENGTH: usize = 32;

/// OAuth 1.0a user-context credentials.
#[derive(Debug, Clone)]
pub struct OAuth1Credentials {
    consumer_key: String,
    consumer_secret: SecretString,
    access_token: SecretString,
    access_token_secret: SecretString,
}

impl OAuth1Credentials {
    /// Creates a new set of OAuth 1.0a credentials.
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_token_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: SecretString::new(consumer_secret.into()),
            access_token: SecretString::new(access_token.into()),
            access_token_secret: SecretString::new(access_token_secret.into()),
        }
    }

    /// Consumer (API) key.
    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    /// Consumer (API) secret.
    pub fn consumer_secret(&self) -> &str {
        self.consumer_secret.expose_secret()
    }

    /// User access token.
    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    /// User access token secret.
    pub fn access_token_secret(&self) -> &str {
        self.access_token_secret.expose_secret()
    }

    /// Checks that every component is present.
    pub fn validate(&self) -> TwitterResult<()> {
        let fields = [
            ("consumer key", self.consumer_key.as_str()),
            ("consumer secret", self.consumer_secret()),
            ("access token", self.access_token()),
            ("access token secret", self.access_token_secret()),
        ];

        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(TwitterError::Configuration(
                    ConfigurationError::MissingCredentials(format!("{} is empty", name)),
                ));
            }
        }

        Ok(())
    }
}

/// App-only bearer token.
#[derive(Debug, Clone)]
pub struct BearerToken(SecretString);

impl BearerToken {
    /// Wraps a bearer token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::new(token.into()))
    }

    /// Returns the token value.
    pub fn token(&self) -> &str {
        self.0.expose_secret()
    }

    /// Returns the `Authorization` header value.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.token())
    }
}

/// Long-lived credentials used for every outbound request.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// OAuth 1.0a user context; requests are signed.
    OAuth1(OAuth1Credentials),
    /// App-only bearer token; requests carry the token as-is.
    Bearer(BearerToken),
}

impl Credentials {
    /// Creates OAuth 1.0a credentials.
    pub fn oauth1(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_token_secret: impl Into<String>,
    ) -> Self {
        Credentials::OAuth1(OAuth1Credentials::new(
            consumer_key,
            consumer_secret,
            access_token,
            access_token_secret,
        ))
    }

    /// Creates bearer-token credentials.
    pub fn bearer(token: impl Into<String>) -> Self {
        Credentials::Bearer(BearerToken::new(token))
    }

    /// Checks that the credentials are usable.
    pub fn validate(&self) -> TwitterResult<()> {
        match self {
            Credentials::OAuth1(creds) => creds.validate(),
            Credentials::Bearer(token) => {
                if token.token().trim().is_empty() {
                    Err(TwitterError::Configuration(
                        ConfigurationError::MissingCredentials("bearer token is empty".to_string()),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Short name of the credential scheme, for logging.
    pub fn scheme(&self) -> &'static str {
        match self {
            Credentials::OAuth1(_) => "oauth1",
            Credentials::Bearer(_) => "bearer",
        }
    }
}

/// Per-request nonce and timestamp.
///
/// A context must never be reused across requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningContext {
    /// Random, single-use value.
    pub nonce: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
}

impl SigningContext {
    /// Creates a context from explicit values.
    pub fn new(nonce: impl Into<String>, timestamp: i64) -> Self {
        Self {
            nonce: nonce.into(),
            timestamp,
        }
    }

    /// Draws a fresh nonce from the thread-local CSPRNG and stamps the current time.
    pub fn generate() -> Self {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LENGTH)
            .map(char::from)
            .collect();

        Self {
            nonce,
            timestamp: Utc::now().timestamp(),
        }
    }
}
