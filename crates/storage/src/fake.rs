//! In-memory storage adapter for pipeline/dispatch tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use ceremony_core::{StatusSink, UploadedPart};

use crate::adapter::{PartRecorder, StorageAdapter};
use crate::error::StorageError;

#[derive(Default)]
pub struct FakeStorageAdapter {
    objects: Mutex<HashMap<String, Bytes>>,
    fail_download: Mutex<bool>,
}

impl FakeStorageAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, path: &str, data: Bytes) {
        self.objects.lock().unwrap().insert(Self::key(bucket, path), data);
    }

    pub fn get(&self, bucket: &str, path: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(&Self::key(bucket, path)).cloned()
    }

    pub fn set_fail_download(&self, fail: bool) {
        *self.fail_download.lock().unwrap() = fail;
    }

    fn key(bucket: &str, path: &str) -> String {
        format!("{bucket}/{path}")
    }
}

#[async_trait]
impl StorageAdapter for FakeStorageAdapter {
    async fn download_artifact(
        &self,
        bucket: &str,
        path: &str,
        sink: &dyn StatusSink,
    ) -> Result<Bytes, StorageError> {
        if *self.fail_download.lock().unwrap() {
            return Err(StorageError::Transport("simulated transport failure".into()));
        }
        sink.busy(&format!("downloading {path}"));
        self.objects
            .lock()
            .unwrap()
            .get(&Self::key(bucket, path))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("{bucket}/{path}")))
    }

    async fn multipart_upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        sink: &dyn StatusSink,
        already_uploaded: &[UploadedPart],
        recorder: &dyn PartRecorder,
    ) -> Result<(), StorageError> {
        sink.busy(&format!("uploading {path}"));
        for (idx, _chunk) in bytes.chunks(crate::s3::PART_SIZE_BYTES).enumerate() {
            let part_number = (idx + 1) as u32;
            if already_uploaded.iter().any(|p| p.number == part_number) {
                continue;
            }
            recorder
                .record(UploadedPart {
                    number: part_number,
                    etag: format!("etag-{part_number}"),
                })
                .await?;
        }
        self.objects.lock().unwrap().insert(Self::key(bucket, path), bytes);
        sink.info(&format!("uploaded {path}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ceremony_core::RecordingStatusSink;

    #[tokio::test]
    async fn round_trips_an_object() {
        let adapter = FakeStorageAdapter::new();
        let sink = RecordingStatusSink::new();
        let recorder = crate::adapter::NullPartRecorder;

        adapter
            .multipart_upload("bucket", "circuits/c1/contributions/c1_00001.zkey", Bytes::from_static(b"hello"), &sink, &[], &recorder)
            .await
            .unwrap();

        let got = adapter
            .download_artifact("bucket", "circuits/c1/contributions/c1_00001.zkey", &sink)
            .await
            .unwrap();
        assert_eq!(got, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let adapter = FakeStorageAdapter::new();
        let sink = RecordingStatusSink::new();
        let err = adapter.download_artifact("bucket", "nope", &sink).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn download_failure_can_be_simulated_for_retry_tests() {
        let adapter = FakeStorageAdapter::new();
        adapter.set_fail_download(true);
        let sink = RecordingStatusSink::new();
        let err = adapter.download_artifact("bucket", "anything", &sink).await.unwrap_err();
        assert!(matches!(err, StorageError::Transport(_)));
    }
}
