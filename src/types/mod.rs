//! Type definitions for Twitter API envelopes.

use crate::errors::{ApiErrorDetail, TwitterError, TwitterResult, UploadError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// List envelope returned by v2 collection endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    /// Items on this page. Absent on an empty page.
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,

    /// Page metadata.
    #[serde(default)]
    pub meta: ListMeta,

    /// Expanded objects requested with `expansions`.
    #[serde(default)]
    pub includes: Option<Value>,

    /// Partial errors reported alongside a successful page.
    #[serde(default)]
    pub errors: Vec<Value>,
}

/// Page metadata of a [`ListResponse`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMeta {
    /// Items on this page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_count: Option<u32>,

    /// Cursor for the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,

    /// Cursor for the previous page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_token: Option<String>,

    /// Newest item ID on this page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newest_id: Option<String>,

    /// Oldest item ID on this page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_id: Option<String>,
}

impl ListMeta {
    /// Returns true if the server reported an empty page.
    pub fn is_exhausted(&self) -> bool {
        self.result_count == Some(0)
    }
}

/// Error envelope. Covers the three shapes the API uses:
/// `{"error": {...}}`, `{"errors": [...]}` and problem documents
/// (`{"title", "detail", "type", "status"}`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorEnvelope {
    /// Single error object or message.
    #[serde(default)]
    pub error: Option<ErrorObject>,

    /// Error list.
    #[serde(default)]
    pub errors: Vec<ErrorItem>,

    /// Problem title.
    #[serde(default)]
    pub title: Option<String>,

    /// Problem detail.
    #[serde(default)]
    pub detail: Option<String>,

    /// Problem type URI.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// Status echoed in the body.
    #[serde(default)]
    pub status: Option<u16>,
}

/// The `error` member of an [`ErrorEnvelope`].
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ErrorObject {
    /// Bare message.
    Message(String),
    /// Structured error.
    Detailed {
        /// Message.
        #[serde(default)]
        message: Option<String>,
        /// Error type.
        #[serde(default, rename = "type")]
        kind: Option<String>,
        /// Error code.
        #[serde(default)]
        code: Option<Value>,
    },
}

/// An entry of the `errors` list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorItem {
    /// Message.
    #[serde(default)]
    pub message: Option<String>,
    /// Numeric or string code.
    #[serde(default)]
    pub code: Option<Value>,
    /// Title.
    #[serde(default)]
    pub title: Option<String>,
    /// Detail.
    #[serde(default)]
    pub detail: Option<String>,
    /// Error type.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl ErrorItem {
    fn text(&self) -> Option<&str> {
        self.message
            .as_deref()
            .or(self.detail.as_deref())
            .or(self.title.as_deref())
    }

    fn kind(&self) -> Option<String> {
        self.kind.clone().or_else(|| self.code.as_ref().map(code_string))
    }
}

fn code_string(code: &Value) -> String {
    match code {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl ErrorEnvelope {
    /// Normalizes an error body into an [`ApiErrorDetail`].
    ///
    /// Bodies that are not JSON keep their text as the message; empty bodies
    /// fall back to the status reason phrase.
    pub fn into_detail(status: u16, body: &[u8]) -> ApiErrorDetail {
        let raw: Option<Value> = serde_json::from_slice(body).ok();

        let fallback = || {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if text.is_empty() {
                reqwest::StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown error")
                    .to_string()
            } else {
                text
            }
        };

        let raw = match raw {
            Some(raw) => raw,
            None => return ApiErrorDetail::new(status, fallback()),
        };

        let envelope: ErrorEnvelope = serde_json::from_value(raw.clone()).unwrap_or_default();
        let (message, kind) = envelope.message_and_kind();

        let mut detail = ApiErrorDetail::new(status, message.unwrap_or_else(fallback)).with_raw(raw);
        if let Some(kind) = kind {
            detail = detail.with_kind(kind);
        }
        detail
    }

    fn message_and_kind(&self) -> (Option<String>, Option<String>) {
        if let Some(error) = &self.error {
            return match error {
                ErrorObject::Message(message) => (Some(message.clone()), self.kind.clone()),
                ErrorObject::Detailed {
                    message,
                    kind,
                    code,
                } => (
                    message.clone(),
                    kind.clone().or_else(|| code.as_ref().map(code_string)),
                ),
            };
        }

        if !self.errors.is_empty() {
            let messages: Vec<&str> = self.errors.iter().filter_map(ErrorItem::text).collect();
            let message = if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            };
            return (message, self.errors[0].kind().or_else(|| self.kind.clone()));
        }

        (
            self.detail.clone().or_else(|| self.title.clone()),
            self.kind.clone(),
        )
    }
}

/// Media kind, which decides size limits and the default category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Still image.
    Image,
    /// Animated GIF.
    AnimatedGif,
    /// Video.
    Video,
}

impl MediaKind {
    /// Infers the kind from a MIME type.
    pub fn from_mime(media_type: &str) -> TwitterResult<Self> {
        let parsed: mime::Mime = media_type.parse().map_err(|_| {
            TwitterError::Upload(UploadError::UnsupportedMediaType(media_type.to_string()))
        })?;

        if parsed.type_() == mime::IMAGE && parsed.subtype() == mime::GIF {
            Ok(MediaKind::AnimatedGif)
        } else if parsed.type_() == mime::IMAGE {
            Ok(MediaKind::Image)
        } else if parsed.type_() == mime::VIDEO {
            Ok(MediaKind::Video)
        } else {
            Err(TwitterError::Upload(UploadError::UnsupportedMediaType(
                media_type.to_string(),
            )))
        }
    }

    /// Largest payload accepted for this kind.
    pub fn size_limit(&self) -> u64 {
        const MB: u64 = 1024 * 1024;
        match self {
            MediaKind::Image => 5 * MB,
            MediaKind::AnimatedGif => 15 * MB,
            MediaKind::Video => 512 * MB,
        }
    }

    /// Category used when the caller gives none.
    pub fn default_category(&self) -> MediaCategory {
        match self {
            MediaKind::Image => MediaCategory::TweetImage,
            MediaKind::AnimatedGif => MediaCategory::TweetGif,
            MediaKind::Video => MediaCategory::TweetVideo,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaKind::Image => "image",
            MediaKind::AnimatedGif => "animated gif",
            MediaKind::Video => "video",
        })
    }
}

/// Usage context declared at INIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaCategory {
    /// Image attached to a tweet.
    TweetImage,
    /// GIF attached to a tweet.
    TweetGif,
    /// Video attached to a tweet.
    TweetVideo,
    /// Image sent in a direct message.
    DmImage,
    /// GIF sent in a direct message.
    DmGif,
    /// Video sent in a direct message.
    DmVideo,
}

impl MediaCategory {
    /// Wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaCategory::TweetImage => "tweet_image",
            MediaCategory::TweetGif => "tweet_gif",
            MediaCategory::TweetVideo => "tweet_video",
            MediaCategory::DmImage => "dm_image",
            MediaCategory::DmGif => "dm_gif",
            MediaCategory::DmVideo => "dm_video",
        }
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    /// Queued.
    Pending,
    /// Running.
    InProgress,
    /// Done; the media can be attached.
    Succeeded,
    /// Done; the media is unusable.
    Failed,
}

impl ProcessingState {
    /// Returns true for `succeeded` and `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingState::Succeeded | ProcessingState::Failed)
    }
}

/// The `processing_info` object of FINALIZE and STATUS responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStatus {
    /// Current state.
    pub state: ProcessingState,

    /// Seconds to wait before polling again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_after_secs: Option<u64>,

    /// Progress, 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<u8>,

    /// Failure detail, present when `state` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProcessingErrorInfo>,
}

/// Failure detail reported by the processing pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingErrorInfo {
    /// Error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,

    /// Error name, e.g. `InvalidMedia`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProcessingErrorInfo {
    /// Message, falling back to the name and then the code.
    pub fn reason(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.name.clone())
            .or_else(|| self.code.map(|c| format!("error code {}", c)))
            .unwrap_or_else(|| "processing failed".to_string())
    }
}

/// Response of INIT, FINALIZE and STATUS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUploadResponse {
    /// Numeric media ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_id: Option<u64>,

    /// Media ID as a string; preferred over `media_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_id_string: Option<String>,

    /// Media key used by v2 endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_key: Option<String>,

    /// Size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Seconds until the unattached media expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_after_secs: Option<u64>,

    /// Processing status, present when asynchronous processing is required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_info: Option<ProcessingStatus>,
}

impl MediaUploadResponse {
    /// Media identifier.
    pub fn id(&self) -> Option<String> {
        self.media_id_string
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| self.media_id.map(|id| id.to_string()))
    }
}

/// Body of `media/metadata/create.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AltTextRequest {
    /// Media identifier.
    pub media_id: String,
    /// Alt text wrapper.
    pub alt_text: AltText,
}

/// Alt text wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AltText {
    /// Description.
    pub text: String,
}

impl AltTextRequest {
    /// Creates a request.
    pub fn new(media_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            alt_text: AltText { text: text.into() },
        }
    }
}
