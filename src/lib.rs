//! Twitter Integration Module
//!
//! An authenticated, rate-limit-aware client core for the Twitter API. Thin
//! endpoint wrappers build on three mechanisms provided here:
//!
//! # Features
//!
//! - **Request signing**: OAuth 1.0a HMAC-SHA1 signatures, or app-only bearer tokens
//! - **Resilient execution**: bounded retries on 429 (honoring `Retry-After`
//!   and `x-rate-limit-reset`) and on network failures, typed errors otherwise
//! - **Pagination**: single page or drain-all cursor following, page streams
//! - **Media upload**: chunked INIT/APPEND/FINALIZE with processing polls,
//!   size checks, alt text and progress observation
//! - **Cancellation**: every retry wait, page loop and processing poll honors a
//!   `CancellationToken`
//!
//! # Example
//!
//! ```no_run
//! use integrations_twitter::{Credentials, PaginateRequest, TwitterClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = TwitterClient::builder()
//!     .credentials(Credentials::oauth1(
//!         "consumer-key",
//!         "consumer-secret",
//!         "access-token",
//!         "access-token-secret",
//!     ))
//!     .build()?;
//!
//! let followers = client
//!     .paginate::<serde_json::Value>(
//!         PaginateRequest::new("users/2244994945/followers")
//!             .max_results(1000)
//!             .all(true),
//!     )
//!     .await?;
//! println!("{} followers", followers.meta.total);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

// Core modules
pub mod auth;
pub mod client;
pub mod config;
pub mod errors;
pub mod pagination;
pub mod resilience;
pub mod services;
pub mod signing;
pub mod transport;
pub mod types;

// Test support
pub mod mocks;

// Re-exports for convenience
pub use auth::{BearerToken, Credentials, OAuth1Credentials, SigningContext};
pub use client::{ApiHost, RequestExecutor, RequestOptions, TwitterClient, TwitterClientBuilder};
pub use config::{PaginationConfig, TwitterConfig, TwitterConfigBuilder, UploadConfig};
pub use errors::{TwitterError, TwitterResult};
pub use pagination::{CursorPager, Page, PageCursor, PageMeta, PaginateRequest, Paginated};
pub use resilience::RetryConfig;
pub use services::{MediaService, MediaUpload, UploadObserver, UploadedMedia};
pub use signing::{RequestSigner, SignedRequest};
pub use transport::{HttpMethod, HttpTransport};
pub use types::{MediaCategory, MediaKind, ProcessingState, ProcessingStatus};

/// Prelude module with commonly used types and traits.
///
/// ```no_run
/// use integrations_twitter::prelude::*;
/// ```
pub mod prelude {
    // Client
    pub use crate::client::{ApiHost, RequestOptions, TwitterClient};

    // Configuration
    pub use crate::config::{PaginationConfig, TwitterConfig, UploadConfig};
    pub use crate::resilience::RetryConfig;

    // Authentication
    pub use crate::auth::Credentials;

    // Services
    pub use crate::services::{MediaUpload, UploadObserver, UploadState, UploadedMedia};

    // Common types
    pub use crate::transport::HttpMethod;
    pub use crate::types::{MediaCategory, MediaKind, ProcessingState, ProcessingStatus};

    // Errors
    pub use crate::errors::{TwitterError, TwitterResult};

    // Pagination
    pub use crate::pagination::{CursorPager, PaginateRequest, Paginated};

    pub use tokio_util::sync::CancellationToken;
}
