//! S3-backed storage adapter.

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use ceremony_core::config::AwsConfig;
use ceremony_core::{StatusSink, UploadedPart};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::adapter::{PartRecorder, StorageAdapter};
use crate::error::StorageError;

/// Fixed part size for multipart uploads. S3 requires every non-final part
/// to be at least 5 MiB; 8 MiB keeps part counts reasonable for zKey-sized
/// artifacts without holding too much in flight at once.
pub const PART_SIZE_BYTES: usize = 8 * 1024 * 1024;

pub struct S3StorageAdapter {
    client: Client,
}

impl S3StorageAdapter {
    pub fn new(aws: &AwsConfig) -> Self {
        let region = aws_sdk_s3::config::Region::new(aws.region.clone());

        // Build the S3 client config directly, the same way the coordination
        // queue consumer builds its SQS client — do NOT route through
        // aws_config::defaults(), since AWS_ENDPOINT_URL is meant for this
        // service only and must not leak into unrelated AWS clients sharing
        // the process environment.
        let mut s3_config = aws_sdk_s3::Config::builder()
            .region(region)
            .behavior_version(BehaviorVersion::latest());

        if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
            let creds = Credentials::new(
                key_id,
                secret,
                aws.session_token.clone(),
                None,
                "ceremony-storage-static",
            );
            s3_config = s3_config.credentials_provider(creds);
        }

        if let Some(ref endpoint) = aws.endpoint_url {
            if !endpoint.is_empty() {
                let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                    endpoint.clone()
                } else {
                    format!("https://{endpoint}")
                };
                s3_config = s3_config.endpoint_url(&url).force_path_style(true);
            }
        }

        let client = Client::from_conf(s3_config.build());
        info!(region = %aws.region, "S3 storage adapter initialized");

        Self { client }
    }

    /// Find an in-progress multipart upload for this exact key, if one
    /// exists, so a resumed upload reuses the same upload id rather than
    /// starting a fresh one the already-uploaded parts can't be completed
    /// against.
    async fn find_existing_upload(&self, bucket: &str, key: &str) -> Result<Option<String>, StorageError> {
        let resp = self
            .client
            .list_multipart_uploads()
            .bucket(bucket)
            .prefix(key)
            .send()
            .await
            .map_err(|e| StorageError::Transport(format!("list_multipart_uploads failed: {e:?}")))?;

        Ok(resp
            .uploads()
            .iter()
            .find(|u| u.key() == Some(key))
            .and_then(|u| u.upload_id())
            .map(str::to_string))
    }
}

#[async_trait]
impl StorageAdapter for S3StorageAdapter {
    async fn download_artifact(
        &self,
        bucket: &str,
        path: &str,
        sink: &dyn StatusSink,
    ) -> Result<Bytes, StorageError> {
        debug!(bucket, path, "downloading artifact");
        sink.busy(&format!("downloading {path}"));

        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| StorageError::Transport(format!("get_object failed: {e:?}")))?;

        let mut stream = resp.body;
        let mut buf = Vec::new();
        let mut last_reported_mb = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StorageError::Transport(format!("body stream error: {e}")))?;
            buf.extend_from_slice(&chunk);
            let mb = buf.len() / (1024 * 1024);
            if mb > last_reported_mb {
                sink.busy(&format!("downloading {path}: {mb} MiB"));
                last_reported_mb = mb;
            }
        }

        sink.info(&format!("downloaded {path} ({} bytes)", buf.len()));
        Ok(Bytes::from(buf))
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
        let upload_id = match self.find_existing_upload(bucket, path).await? {
            Some(id) => {
                debug!(bucket, path, upload_id = %id, "resuming multipart upload");
                id
            }
            None => {
                let created = self
                    .client
                    .create_multipart_upload()
                    .bucket(bucket)
                    .key(path)
                    .send()
                    .await
                    .map_err(|e| StorageError::Transport(format!("create_multipart_upload failed: {e:?}")))?;
                created
                    .upload_id()
                    .ok_or_else(|| StorageError::Transport("create_multipart_upload returned no upload id".into()))?
                    .to_string()
            }
        };

        let chunks: Vec<&[u8]> = bytes.chunks(PART_SIZE_BYTES).collect();
        let total_parts = chunks.len() as u32;

        let mut completed: Vec<CompletedPart> = already_uploaded
            .iter()
            .map(|p| CompletedPart::builder().part_number(p.number as i32).e_tag(p.etag.clone()).build())
            .collect();

        for (idx, chunk) in chunks.into_iter().enumerate() {
            let part_number = (idx + 1) as u32;
            if already_uploaded.iter().any(|p| p.number == part_number) {
                debug!(part_number, "part already uploaded, skipping");
                continue;
            }

            sink.busy(&format!("uploading part {part_number}/{total_parts}"));
            let resp = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(path)
                .upload_id(&upload_id)
                .part_number(part_number as i32)
                .body(ByteStream::from(chunk.to_vec()))
                .send()
                .await
                .map_err(|e| StorageError::Transport(format!("upload_part {part_number} failed: {e:?}")))?;

            let etag = resp
                .e_tag()
                .ok_or_else(|| StorageError::Transport(format!("upload_part {part_number} returned no etag")))?
                .to_string();

            completed.push(CompletedPart::builder().part_number(part_number as i32).e_tag(etag.clone()).build());

            if let Err(e) = recorder.record(UploadedPart { number: part_number, etag }).await {
                warn!(part_number, error = %e, "failed to checkpoint uploaded part; continuing upload");
            }
        }

        completed.sort_by_key(|p| p.part_number());

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(path)
            .upload_id(&upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(completed)).build())
            .send()
            .await
            .map_err(|e| StorageError::Transport(format!("complete_multipart_upload failed: {e:?}")))?;

        sink.info(&format!("uploaded {path}"));
        Ok(())
    }
}
