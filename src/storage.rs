use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use uuid::Uuid;

/// A file on its way into the object store.
#[derive(Debug, Clone)]
pub struct ObjectUpload {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub content_disposition: Option<String>,
}

impl ObjectUpload {
    /// Uploaded documents live under `documents/<id>/<file name>`.
    pub fn document(
        document_id: Uuid,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            key: document_object_key(document_id, file_name),
            bytes,
            content_type: content_type.into(),
            content_disposition: inline_content_disposition(file_name),
        }
    }
}

pub fn document_object_key(document_id: Uuid, file_name: &str) -> String {
    format!("documents/{document_id}/{file_name}")
}

/// Quotes and backslashes are replaced in the plain filename; the
/// RFC 5987 form carries the full UTF-8 name.
pub fn inline_content_disposition(file_name: &str) -> Option<String> {
    if file_name.is_empty() {
        return None;
    }

    let sanitized: String = file_name
        .chars()
        .map(|ch| if matches!(ch, '"' | '\\') { '_' } else { ch })
        .collect();
    let encoded = utf8_percent_encode(&sanitized, NON_ALPHANUMERIC);
    Some(format!(
        "inline; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}"
    ))
}

#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn put_object(&self, upload: ObjectUpload) -> Result<()>;

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String>;

    async fn delete_object(&self, key: &str) -> Result<()>;
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(&self, upload: ObjectUpload) -> Result<()> {
        let ObjectUpload {
            key,
            bytes,
            content_type,
            content_disposition,
        } = upload;
        let size = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .set_content_disposition(content_disposition)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .with_context(|| format!("failed to upload {key} to bucket {}", self.bucket))?;

        tracing::debug!(bucket = %self.bucket, key = %key, size, "object stored");
        Ok(())
    }

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        let presign_config = PresigningConfig::expires_in(expires_in)
            .context("invalid presigned URL lifetime")?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .with_context(|| format!("failed to presign download of {key}"))?;

        Ok(presigned.uri().to_string())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to delete {key} from bucket {}", self.bucket))?;
        tracing::debug!(bucket = %self.bucket, key = %key, "object deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_keys_are_scoped_by_id() {
        let id = Uuid::nil();
        let upload = ObjectUpload::document(id, "회의록.pdf", vec![1, 2], "application/pdf");
        assert_eq!(
            upload.key,
            "documents/00000000-0000-0000-0000-000000000000/회의록.pdf"
        );
        assert_eq!(upload.content_type, "application/pdf");
    }

    #[test]
    fn disposition_escapes_quotes_and_encodes_utf8() {
        let header = inline_content_disposition("a\"b.txt").unwrap();
        assert_eq!(
            header,
            "inline; filename=\"a_b.txt\"; filename*=UTF-8''a%5Fb%2Etxt"
        );

        let korean = inline_content_disposition("보고서.pdf").unwrap();
        assert!(korean.contains("filename*=UTF-8''%EB%B3%B4"));
        assert_eq!(inline_content_disposition(""), None);
    }
}
