//! Upload session state machine.
//!
//! ```text
//! Initiated --> Transferring --> Finalizing --> Ready
//!                                Finalizing --> Processing --> Ready
//!                                               Processing --> Failed
//! any non-terminal state --> Failed
//! ```
//!
//! A session belongs to the call that created it. It is never persisted and
//! is discarded once it reaches `Ready` or `Failed`.

use crate::errors::{TwitterError, TwitterResult, UploadError};
use bytes::Bytes;
use std::fmt;
use tracing::debug;

/// Upload session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadState {
    /// INIT succeeded; no bytes sent yet.
    Initiated,
    /// APPEND requests in flight.
    Transferring,
    /// Every chunk acknowledged; FINALIZE sent.
    Finalizing,
    /// Server-side processing in progress.
    Processing,
    /// Media usable.
    Ready,
    /// Upload abandoned.
    Failed,
}

impl UploadState {
    /// Returns true for `Ready` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Ready | UploadState::Failed)
    }

    /// Returns true if the state machine allows moving to `next`.
    pub fn can_transition_to(&self, next: UploadState) -> bool {
        use UploadState::*;

        match (self, next) {
            (Ready, _) | (Failed, _) => false,
            (_, Failed) => true,
            (Initiated, Transferring)
            | (Transferring, Finalizing)
            | (Finalizing, Ready)
            | (Finalizing, Processing)
            | (Processing, Ready) => true,
            _ => false,
        }
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadState::Initiated => "initiated",
            UploadState::Transferring => "transferring",
            UploadState::Finalizing => "finalizing",
            UploadState::Processing => "processing",
            UploadState::Ready => "ready",
            UploadState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Bytes sent versus total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    /// Bytes acknowledged by the server.
    pub bytes_sent: u64,
    /// Payload size.
    pub total_bytes: u64,
}

impl UploadProgress {
    /// Fraction sent, 0.0 to 1.0.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.bytes_sent as f64 / self.total_bytes as f64
        }
    }

    /// Percentage sent, 0 to 100.
    pub fn percent(&self) -> u8 {
        (self.fraction() * 100.0).floor().min(100.0) as u8
    }
}

/// One APPEND unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Zero-based, strictly increasing index.
    pub index: u32,
    /// Chunk content.
    pub data: Bytes,
}

/// Splits a payload into fixed-size segments. The last one may be shorter.
///
/// Slicing `Bytes` shares the underlying buffer, so no payload bytes are copied.
pub fn split_segments(payload: &Bytes, chunk_size: usize) -> TwitterResult<Vec<Segment>> {
    if chunk_size == 0 {
        return Err(TwitterError::configuration("Chunk size must be positive"));
    }
    if payload.is_empty() {
        return Err(TwitterError::Upload(UploadError::EmptyPayload));
    }

    let mut segments = Vec::with_capacity((payload.len() + chunk_size - 1) / chunk_size);
    let mut offset = 0;
    let mut index = 0u32;

    while offset < payload.len() {
        let end = (offset + chunk_size).min(payload.len());
        segments.push(Segment {
            index,
            data: payload.slice(offset..end),
        });
        offset = end;
        index += 1;
    }

    Ok(segments)
}

/// State of one chunked upload.
#[derive(Debug, Clone)]
pub struct UploadSession {
    media_id: String,
    total_bytes: u64,
    bytes_sent: u64,
    chunk_size: usize,
    next_segment: u32,
    state: UploadState,
}

impl UploadSession {
    /// Creates a session from a successful INIT.
    pub fn new(media_id: impl Into<String>, total_bytes: u64, chunk_size: usize) -> Self {
        Self {
            media_id: media_id.into(),
            total_bytes,
            bytes_sent: 0,
            chunk_size,
            next_segment: 0,
            state: UploadState::Initiated,
        }
    }

    /// Media identifier threaded through every step.
    pub fn media_id(&self) -> &str {
        &self.media_id
    }

    /// Payload size.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Bytes acknowledged so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Current state.
    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Progress snapshot.
    pub fn progress(&self) -> UploadProgress {
        UploadProgress {
            bytes_sent: self.bytes_sent,
            total_bytes: self.total_bytes,
        }
    }

    /// Returns true once every byte was acknowledged.
    pub fn is_complete(&self) -> bool {
        self.bytes_sent == self.total_bytes
    }

    /// Moves to `next`, rejecting transitions the state machine forbids.
    pub fn transition(&mut self, next: UploadState) -> TwitterResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(TwitterError::Upload(UploadError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            }));
        }
        if next == UploadState::Finalizing && !self.is_complete() {
            return Err(TwitterError::Upload(UploadError::IncompleteTransfer {
                sent: self.bytes_sent,
                total: self.total_bytes,
            }));
        }

        debug!(
            media_id = %self.media_id,
            from = %self.state,
            to = %next,
            "Upload state transition"
        );
        self.state = next;
        Ok(())
    }

    /// Marks the session failed. No-op for terminal sessions.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            debug!(media_id = %self.media_id, from = %self.state, "Upload failed");
            self.state = UploadState::Failed;
        }
    }

    /// Records an acknowledged segment. Segments must arrive in order.
    pub fn record_segment(&mut self, segment: &Segment) -> TwitterResult<()> {
        if self.state != UploadState::Transferring {
            return Err(TwitterError::Upload(UploadError::InvalidTransition {
                from: self.state.to_string(),
                to: UploadState::Transferring.to_string(),
            }));
        }
        if segment.index != self.next_segment {
            return Err(TwitterError::invalid_request(format!(
                "Segment {} sent out of order; expected {}",
                segment.index, self.next_segment
            )));
        }

        let sent = self.bytes_sent + segment.data.len() as u64;
        if sent > self.total_bytes {
            return Err(TwitterError::invalid_request(format!(
                "Segment {} overruns the declared size of {} bytes",
                segment.index, self.total_bytes
            )));
        }

        self.bytes_sent = sent;
        self.next_segment += 1;
        Ok(())
    }
}
