//! Storage adapter (C5): streamed artifact download, resumable multipart
//! upload.

use async_trait::async_trait;
use bytes::Bytes;
use ceremony_core::{StatusSink, UploadedPart};

use crate::error::StorageError;

/// Records an uploaded part's ETag against the participant's
/// `tempContributionData` so a later resumption can skip it. Implemented by
/// the pipeline crate as a thin wrapper over the coordination callable —
/// kept as a trait here so this crate has no dependency on coordination.
#[async_trait]
pub trait PartRecorder: Send + Sync {
    async fn record(&self, part: UploadedPart) -> Result<(), StorageError>;
}

/// A `PartRecorder` that does nothing; useful for one-shot uploads in tests
/// where resumability isn't under test.
#[derive(Debug, Default)]
pub struct NullPartRecorder;

#[async_trait]
impl PartRecorder for NullPartRecorder {
    async fn record(&self, _part: UploadedPart) -> Result<(), StorageError> {
        Ok(())
    }
}

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Stream `bucket/path` fully into memory, reporting periodic progress
    /// to `sink`. Retriable whole-file on transport failure.
    async fn download_artifact(
        &self,
        bucket: &str,
        path: &str,
        sink: &dyn StatusSink,
    ) -> Result<Bytes, StorageError>;

    /// Split `bytes` into fixed-size parts and upload each in turn,
    /// recording every successful part through `recorder`. Parts already
    /// present in `already_uploaded` are skipped, so an interrupted upload
    /// resumes from its last acknowledged part rather than restarting.
    async fn multipart_upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        sink: &dyn StatusSink,
        already_uploaded: &[UploadedPart],
        recorder: &dyn PartRecorder,
    ) -> Result<(), StorageError>;
}
