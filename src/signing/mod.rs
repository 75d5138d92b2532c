//! OAuth 1.0a request signing.
//!
//! Signing is a pure function of the method, URL, non-file parameters,
//! credentials and a [`SigningContext`]. The executor asks for a fresh context
//! on every attempt, so a retried request never reuses a nonce.
//!
//! Parameters covered by the signature:
//! - query parameters of the URL
//! - form-encoded body parameters
//! - the `oauth_*` protocol parameters
//!
//! JSON and multipart bodies contribute nothing.

mod canonical;

pub use canonical::{
    build_base_string, build_parameter_string, normalize_url, percent_decode, percent_encode,
    query_parameters,
};

use crate::auth::{Credentials, OAuth1Credentials, SigningContext};
use crate::errors::{AuthenticationError, ConfigurationError, TwitterError, TwitterResult};
use crate::transport::HttpMethod;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use sha1::Sha1;
use url::Url;

type HmacSha1 = Hmac<Sha1>;

/// Signature method identifier.
pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";

/// OAuth protocol version.
pub const OAUTH_VERSION: &str = "1.0";

/// A request with its `Authorization` header computed.
///
/// Built fresh for every attempt and never cached.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Full request URL including the query string.
    pub url: Url,
    /// Signed parameters, sorted by key then value (empty for bearer auth).
    pub params: Vec<(String, String)>,
    /// Headers including `Authorization`.
    pub headers: HeaderMap,
}

/// Computes `Base64(HMAC-SHA1(key, data))`.
pub fn hmac_sha1_base64(key: &[u8], data: &[u8]) -> TwitterResult<String> {
    let mut mac = HmacSha1::new_from_slice(key).map_err(|e| {
        TwitterError::Configuration(ConfigurationError::InvalidCredentials(format!(
            "Cannot build signing key: {}",
            e
        )))
    })?;
    mac.update(data);
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Builds the signing key: `encode(consumer_secret)&encode(token_secret)`.
pub fn signing_key(consumer_secret: &str, token_secret: &str) -> String {
    format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    )
}

/// Signs outgoing requests with the configured credentials.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: Credentials,
}

impl RequestSigner {
    /// Creates a signer, rejecting malformed credentials up front.
    pub fn new(credentials: Credentials) -> TwitterResult<Self> {
        credentials.validate()?;
        Ok(Self { credentials })
    }

    /// Returns the credentials.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Computes the `Authorization` header value with a fresh nonce and timestamp.
    pub fn authorization(
        &self,
        method: HttpMethod,
        url: &Url,
        body_params: &[(String, String)],
    ) -> TwitterResult<String> {
        self.authorization_with(method, url, body_params, &SigningContext::generate())
    }

    /// Computes the `Authorization` header value for an explicit context.
    pub fn authorization_with(
        &self,
        method: HttpMethod,
        url: &Url,
        body_params: &[(String, String)],
        context: &SigningContext,
    ) -> TwitterResult<String> {
        match &self.credentials {
            Credentials::Bearer(token) => Ok(token.authorization_header()),
            Credentials::OAuth1(creds) => {
                oauth1_header(creds, method, url, body_params, context)
            }
        }
    }

    /// Builds a [`SignedRequest`] for an explicit context.
    pub fn sign_with(
        &self,
        method: HttpMethod,
        url: &Url,
        body_params: &[(String, String)],
        context: &SigningContext,
    ) -> TwitterResult<SignedRequest> {
        let authorization = self.authorization_with(method, url, body_params, context)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&authorization).map_err(|e| {
                TwitterError::Authentication(AuthenticationError::InvalidHeader(e.to_string()))
            })?,
        );

        let mut params = match self.credentials {
            Credentials::OAuth1(_) => {
                let mut all = query_parameters(url);
                all.extend(body_params.iter().cloned());
                all
            }
            Credentials::Bearer(_) => Vec::new(),
        };
        params.sort();

        Ok(SignedRequest {
            method,
            url: url.clone(),
            params,
            headers,
        })
    }

    /// Builds a [`SignedRequest`] with a fresh nonce and timestamp.
    pub fn sign(
        &self,
        method: HttpMethod,
        url: &Url,
        body_params: &[(String, String)],
    ) -> TwitterResult<SignedRequest> {
        self.sign_with(method, url, body_params, &SigningContext::generate())
    }
}

fn oauth_parameters(creds: &OAuth1Credentials, context: &SigningContext) -> Vec<(String, String)> {
    vec![
        ("oauth_consumer_key".to_string(), creds.consumer_key().to_string()),
        ("oauth_nonce".to_string(), context.nonce.clone()),
        ("oauth_signature_method".to_string(), SIGNATURE_METHOD.to_string()),
        ("oauth_timestamp".to_string(), context.timestamp.to_string()),
        ("oauth_token".to_string(), creds.access_token().to_string()),
        ("oauth_version".to_string(), OAUTH_VERSION.to_string()),
    ]
}

/// Computes the signature over the base string of a request.
pub fn compute_signature(
    creds: &OAuth1Credentials,
    method: HttpMethod,
    url: &Url,
    body_params: &[(String, String)],
    context: &SigningContext,
) -> TwitterResult<String> {
    let mut params = oauth_parameters(creds, context);
    params.extend(query_parameters(url));
    params.extend(body_params.iter().cloned());

    let base_string = build_base_string(
        method.as_str(),
        &normalize_url(url),
        &build_parameter_string(&params),
    );
    let key = signing_key(creds.consumer_secret(), creds.access_token_secret());

    hmac_sha1_base64(key.as_bytes(), base_string.as_bytes())
}

fn oauth1_header(
    creds: &OAuth1Credentials,
    method: HttpMethod,
    url: &Url,
    body_params: &[(String, String)],
    context: &SigningContext,
) -> TwitterResult<String> {
    let signature = compute_signature(creds, method, url, body_params, context)?;

    let mut header_params = oauth_parameters(creds, context);
    header_params.push(("oauth_signature".to_string(), signature));
    header_params.sort();

    let fields = header_params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!("OAuth {}", fields))
}
