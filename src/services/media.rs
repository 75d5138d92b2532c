//! Chunked media upload.
//!
//! A payload is uploaded with INIT, one APPEND per chunk, FINALIZE and, for
//! media the server post-processes (video, animated GIF), STATUS polls until
//! processing succeeds or fails. Polls wait for the server's
//! `check_after_secs` hint; there is no overall deadline, so callers bound the
//! wait with a [`CancellationToken`].
//!
//! # Example
//!
//! ```no_run
//! use integrations_twitter::{Credentials, TwitterClient};
//! use integrations_twitter::services::MediaUpload;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = TwitterClient::builder()
//!     .credentials(Credentials::oauth1("key", "secret", "token", "token-secret"))
//!     .build()?;
//!
//! let video = std::fs::read("clip.mp4")?;
//! let media = client
//!     .media()
//!     .upload(MediaUpload::new(video, "video/mp4").alt_text("A short clip"))
//!     .await?;
//! println!("media id: {}", media.media_id);
//! # Ok(())
//! # }
//! ```

use super::upload::{split_segments, Segment, UploadProgress, UploadSession, UploadState};
use crate::client::{ApiHost, RequestExecutor, RequestOptions};
use crate::config::MAX_CHUNK_SIZE;
use crate::errors::{
    ProcessingError, TwitterError, TwitterResult, UploadError, ValidationError,
};
use crate::resilience::{ensure_not_cancelled, sleep_or_cancel};
use crate::transport::{HttpMethod, MultipartBody};
use crate::types::{
    AltTextRequest, MediaCategory, MediaKind, MediaUploadResponse, ProcessingState,
    ProcessingStatus,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Upload endpoint, relative to the upload host.
pub const UPLOAD_PATH: &str = "media/upload.json";

/// Alt text endpoint, relative to the upload host.
pub const METADATA_PATH: &str = "media/metadata/create.json";

/// Longest accepted alt text, in characters.
pub const MAX_ALT_TEXT_CHARS: usize = 1000;

/// Receives upload progress. Every method defaults to a no-op.
pub trait UploadObserver: Send + Sync {
    /// Called after every state transition.
    fn on_state_change(&self, _media_id: &str, _state: UploadState) {}

    /// Called after every acknowledged chunk.
    fn on_progress(&self, _media_id: &str, _progress: UploadProgress) {}

    /// Called with every processing status received.
    fn on_processing(&self, _media_id: &str, _status: &ProcessingStatus) {}
}

/// An upload request.
#[derive(Clone)]
pub struct MediaUpload {
    /// Payload, already read by the caller.
    pub data: Bytes,
    /// MIME type, e.g. `video/mp4`.
    pub media_type: String,
    /// Usage context; inferred from the media type when absent.
    pub category: Option<MediaCategory>,
    /// Alt text applied once the media is ready.
    pub alt_text: Option<String>,
    /// Users allowed to attach the media.
    pub additional_owners: Vec<String>,
    /// Chunk size override.
    pub chunk_size: Option<usize>,
    /// Progress observer.
    pub observer: Option<Arc<dyn UploadObserver>>,
    /// Cancellation signal.
    pub cancel: Option<CancellationToken>,
}

impl fmt::Debug for MediaUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaUpload")
            .field("bytes", &self.data.len())
            .field("media_type", &self.media_type)
            .field("category", &self.category)
            .field("alt_text", &self.alt_text)
            .field("additional_owners", &self.additional_owners)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

impl MediaUpload {
    /// Creates an upload of `data` with the given MIME type.
    pub fn new(data: impl Into<Bytes>, media_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            media_type: media_type.into(),
            category: None,
            alt_text: None,
            additional_owners: Vec::new(),
            chunk_size: None,
            observer: None,
            cancel: None,
        }
    }

    /// Sets the media category.
    pub fn category(mut self, category: MediaCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Sets the alt text.
    pub fn alt_text(mut self, text: impl Into<String>) -> Self {
        self.alt_text = Some(text.into());
        self
    }

    /// Adds a user allowed to attach the media.
    pub fn additional_owner(mut self, user_id: impl Into<String>) -> Self {
        self.additional_owners.push(user_id.into());
        self
    }

    /// Overrides the configured chunk size.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size);
        self
    }

    /// Sets the progress observer.
    pub fn observer(mut self, observer: Arc<dyn UploadObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Sets the cancellation token.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// A usable media object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    /// Media identifier to attach to a tweet or message.
    pub media_id: String,
    /// Media key used by v2 endpoints.
    pub media_key: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Seconds until the unattached media expires.
    pub expires_after_secs: Option<u64>,
    /// Final processing status, if the media went through processing.
    pub processing: Option<ProcessingStatus>,
    /// Media kind.
    pub kind: MediaKind,
    /// Category declared at INIT.
    pub category: MediaCategory,
}

/// Media upload service.
pub struct MediaService {
    executor: Arc<RequestExecutor>,
}

impl MediaService {
    /// Creates a new media service.
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }

    /// Uploads a payload and waits until the media is usable.
    ///
    /// Nothing is sent if the payload fails local checks (type, size, alt
    /// text). Any failure after INIT abandons the session; it cannot be resumed.
    #[instrument(skip(self, upload), fields(media_type = %upload.media_type, bytes = upload.data.len()))]
    pub async fn upload(&self, upload: MediaUpload) -> TwitterResult<UploadedMedia> {
        let kind = MediaKind::from_mime(&upload.media_type)?;
        let category = upload.category.unwrap_or_else(|| kind.default_category());
        let chunk_size = upload
            .chunk_size
            .unwrap_or(self.executor.config().upload.chunk_size);

        validate_upload(&upload, kind, chunk_size)?;
        let segments = split_segments(&upload.data, chunk_size)?;
        let cancel = upload.cancel.as_ref();
        let observer = upload.observer.as_deref();

        ensure_not_cancelled(cancel, "upload cancelled before INIT")?;

        let init = self
            .init(
                upload.data.len() as u64,
                &upload.media_type,
                category,
                &upload.additional_owners,
                cancel,
            )
            .await?;
        let media_id = init
            .id()
            .ok_or_else(|| TwitterError::Upload(UploadError::MissingMediaId("INIT".to_string())))?;

        let mut session = UploadSession::new(media_id, upload.data.len() as u64, chunk_size);
        info!(media_id = %session.media_id(), segments = segments.len(), "Upload initiated");
        notify_state(observer, &session);

        let result = self.run(&mut session, &segments, observer, cancel).await;
        let finished = match result {
            Ok(finished) => finished,
            Err(error) => {
                session.fail();
                notify_state(observer, &session);
                return Err(error);
            }
        };

        if let Some(text) = &upload.alt_text {
            if let Err(error) = self.set_alt_text(session.media_id(), text, cancel).await {
                warn!(media_id = %session.media_id(), error = %error, "Alt text failed on ready media");
                return Err(UploadError::AltTextFailed {
                    media_id: session.media_id().to_string(),
                    source: Box::new(error),
                }
                .into());
            }
        }

        info!(media_id = %session.media_id(), "Upload ready");

        Ok(UploadedMedia {
            media_id: session.media_id().to_string(),
            media_key: finished.media_key.or(init.media_key),
            size: finished.size.unwrap_or(session.total_bytes()),
            expires_after_secs: finished.expires_after_secs.or(init.expires_after_secs),
            processing: finished.processing_info,
            kind,
            category,
        })
    }

    async fn run(
        &self,
        session: &mut UploadSession,
        segments: &[Segment],
        observer: Option<&dyn UploadObserver>,
        cancel: Option<&CancellationToken>,
    ) -> TwitterResult<MediaUploadResponse> {
        session.transition(UploadState::Transferring)?;
        notify_state(observer, session);

        for segment in segments {
            ensure_not_cancelled(cancel, "upload cancelled during transfer")?;
            self.append(session.media_id(), segment, cancel).await?;
            session.record_segment(segment)?;

            debug!(
                media_id = %session.media_id(),
                segment_index = segment.index,
                bytes_sent = session.bytes_sent(),
                total_bytes = session.total_bytes(),
                "Chunk acknowledged"
            );
            if let Some(observer) = observer {
                observer.on_progress(session.media_id(), session.progress());
            }
        }

        ensure_not_cancelled(cancel, "upload cancelled before FINALIZE")?;
        session.transition(UploadState::Finalizing)?;
        notify_state(observer, session);

        let mut response = self.finalize(session.media_id(), cancel).await?;

        let mut status = match response.processing_info.clone() {
            None => {
                session.transition(UploadState::Ready)?;
                notify_state(observer, session);
                return Ok(response);
            }
            Some(status) => status,
        };

        session.transition(UploadState::Processing)?;
        notify_state(observer, session);

        let default_wait = self.executor.config().upload.default_poll_interval;

        loop {
            if let Some(observer) = observer {
                observer.on_processing(session.media_id(), &status);
            }

            match status.state {
                ProcessingState::Succeeded => {
                    session.transition(UploadState::Ready)?;
                    notify_state(observer, session);
                    return Ok(response);
                }
                ProcessingState::Failed => {
                    let error = status.error.clone().unwrap_or_default();
                    return Err(TwitterError::Processing(ProcessingError::ProcessingFailed {
                        media_id: session.media_id().to_string(),
                        reason: error.reason(),
                        code: error.code,
                        name: error.name,
                    }));
                }
                ProcessingState::Pending | ProcessingState::InProgress => {}
            }

            let wait = status
                .check_after_secs
                .map(Duration::from_secs)
                .unwrap_or(default_wait);
            debug!(
                media_id = %session.media_id(),
                state = ?status.state,
                progress = status.progress_percent,
                wait_secs = wait.as_secs(),
                "Media processing"
            );
            sleep_or_cancel(wait, cancel, "upload cancelled while waiting for processing").await?;

            response = self.status(session.media_id(), cancel).await?;
            status = response.processing_info.clone().unwrap_or(ProcessingStatus {
                // A STATUS response without processing info means nothing is left to do.
                state: ProcessingState::Succeeded,
                check_after_secs: None,
                progress_percent: Some(100),
                error: None,
            });
        }
    }

    /// Sends INIT.
    pub async fn init(
        &self,
        total_bytes: u64,
        media_type: &str,
        category: MediaCategory,
        additional_owners: &[String],
        cancel: Option<&CancellationToken>,
    ) -> TwitterResult<MediaUploadResponse> {
        let mut form = vec![
            ("command".to_string(), "INIT".to_string()),
            ("total_bytes".to_string(), total_bytes.to_string()),
            ("media_type".to_string(), media_type.to_string()),
            ("media_category".to_string(), category.as_str().to_string()),
        ];
        if !additional_owners.is_empty() {
            form.push(("additional_owners".to_string(), additional_owners.join(",")));
        }

        let options = RequestOptions::new()
            .host(ApiHost::Upload)
            .form(form)
            .cancel(cancel.cloned());

        self.executor
            .execute(HttpMethod::Post, UPLOAD_PATH, options)
            .await
    }

    /// Sends one APPEND. Never retried after a network failure.
    pub async fn append(
        &self,
        media_id: &str,
        segment: &Segment,
        cancel: Option<&CancellationToken>,
    ) -> TwitterResult<()> {
        let body = MultipartBody::new()
            .with_text("command", "APPEND")
            .with_text("media_id", media_id)
            .with_text("segment_index", segment.index.to_string())
            .with_text("media_data", BASE64.encode(&segment.data));

        let options = RequestOptions::new()
            .host(ApiHost::Upload)
            .multipart(body)
            .non_idempotent()
            .cancel(cancel.cloned());

        self.executor
            .execute_raw(HttpMethod::Post, UPLOAD_PATH, options)
            .await?;
        Ok(())
    }

    /// Sends FINALIZE. Never retried after a network failure.
    pub async fn finalize(
        &self,
        media_id: &str,
        cancel: Option<&CancellationToken>,
    ) -> TwitterResult<MediaUploadResponse> {
        let options = RequestOptions::new()
            .host(ApiHost::Upload)
            .form(vec![
                ("command".to_string(), "FINALIZE".to_string()),
                ("media_id".to_string(), media_id.to_string()),
            ])
            .non_idempotent()
            .cancel(cancel.cloned());

        self.executor
            .execute(HttpMethod::Post, UPLOAD_PATH, options)
            .await
    }

    /// Sends STATUS.
    pub async fn status(
        &self,
        media_id: &str,
        cancel: Option<&CancellationToken>,
    ) -> TwitterResult<MediaUploadResponse> {
        let options = RequestOptions::new()
            .host(ApiHost::Upload)
            .query("command", "STATUS")
            .query("media_id", media_id)
            .cancel(cancel.cloned());

        self.executor
            .execute(HttpMethod::Get, UPLOAD_PATH, options)
            .await
    }

    /// Attaches alt text to uploaded media.
    pub async fn set_alt_text(
        &self,
        media_id: &str,
        text: &str,
        cancel: Option<&CancellationToken>,
    ) -> TwitterResult<()> {
        validate_alt_text(text)?;

        let body = serde_json::to_value(AltTextRequest::new(media_id, text))
            .map_err(|e| TwitterError::invalid_request(format!("Invalid alt text: {}", e)))?;
        let options = RequestOptions::new()
            .host(ApiHost::Upload)
            .json(body)
            .cancel(cancel.cloned());

        self.executor
            .execute_raw(HttpMethod::Post, METADATA_PATH, options)
            .await?;
        Ok(())
    }
}

fn notify_state(observer: Option<&dyn UploadObserver>, session: &UploadSession) {
    if let Some(observer) = observer {
        observer.on_state_change(session.media_id(), session.state());
    }
}

fn validate_alt_text(text: &str) -> TwitterResult<()> {
    let chars = text.chars().count();
    if chars > MAX_ALT_TEXT_CHARS {
        return Err(TwitterError::invalid_request(format!(
            "Alt text is {} characters; the limit is {}",
            chars, MAX_ALT_TEXT_CHARS
        )));
    }
    Ok(())
}

fn validate_upload(upload: &MediaUpload, kind: MediaKind, chunk_size: usize) -> TwitterResult<()> {
    if upload.data.is_empty() {
        return Err(TwitterError::Upload(UploadError::EmptyPayload));
    }

    let size = upload.data.len() as u64;
    if size > kind.size_limit() {
        return Err(TwitterError::Validation(ValidationError::PayloadTooLarge {
            size,
            limit: kind.size_limit(),
            kind: kind.to_string(),
        }));
    }

    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(TwitterError::invalid_request(format!(
            "Chunk size must be between 1 and {} bytes",
            MAX_CHUNK_SIZE
        )));
    }

    if let Some(text) = &upload.alt_text {
        validate_alt_text(text)?;
    }

    Ok(())
}
