//! Scanning engine contract
//!
//! The worker only sees a black box: hand it a content stream, get back one
//! verdict. Engines live in `docsafe-services`; tests substitute fakes.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// Stream of content chunks handed to a scanning engine.
pub type ContentStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// The single outcome of scanning one piece of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    /// Content was flagged; carries the engine's signature name or details.
    Infected(String),
    /// The engine could not reach a verdict.
    Error(String),
}

impl ScanVerdict {
    pub fn label(&self) -> &'static str {
        match self {
            ScanVerdict::Clean => "clean",
            ScanVerdict::Infected(_) => "infected",
            ScanVerdict::Error(_) => "error",
        }
    }
}

/// A malware scanning engine.
#[async_trait]
pub trait ScanEngine: Send + Sync {
    /// Scan the full content of `content` and return exactly one verdict.
    ///
    /// Failures to read the stream or talk to the engine are reported as
    /// [`ScanVerdict::Error`], never as a panic or a silent `Clean`.
    async fn scan_stream(&self, content: ContentStream) -> ScanVerdict;

    /// Engine name used in logs and metrics.
    fn name(&self) -> &'static str;
}
