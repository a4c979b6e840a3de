//! Track source capability.
//!
//! Where the bytes come from is external to the pipeline: a [`TrackSource`]
//! resolves an (artist, title) pair to a candidate and streams its bytes.
//! The pipeline never sees URLs or protocols, only candidates and chunks.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// A downloadable match for a requested track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCandidate {
    /// Opaque source-specific locator, echoed back to `download`.
    pub locator: String,
    /// Total size in bytes, known up front so progress can be a percentage.
    pub total_bytes: u64,
}

/// Stream of downloaded chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Capability for resolving and downloading tracks from an external source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackSource: Send + Sync {
    /// Find a candidate for the track, if the source has one.
    ///
    /// `None` means the source searched and found nothing; errors are
    /// reserved for the source itself being unreachable.
    async fn resolve(&self, artist: &str, title: &str) -> Result<Option<SourceCandidate>>;

    /// Open a byte stream for a resolved candidate.
    async fn download(&self, candidate: &SourceCandidate) -> Result<ByteStream>;
}
