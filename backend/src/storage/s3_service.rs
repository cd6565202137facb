use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use hex;
use image::ImageFormat;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::ImageStore;

const FALLBACK_EXTENSION: &str = "bin";

#[derive(Clone)]
pub struct S3Service {
    client: Client,
    bucket_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum S3ServiceError {
    #[error("S3 error: {0}")]
    S3(String),
}

impl S3Service {
    pub fn new(client: Client, bucket_name: String) -> Self {
        Self {
            client,
            bucket_name,
        }
    }

    pub fn calculate_image_hash(image_data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(image_data);
        hex::encode(hasher.finalize())
    }

    pub fn generate_s3_key(owner: Uuid, diagnosis_id: Uuid, file_extension: &str) -> String {
        format!("diagnoses/{}/{}.{}", owner, diagnosis_id, file_extension)
    }

    /// Object extension for `mime_type`. Any image format the decoder knows gets its
    /// usual extension; everything else is stored as `bin`.
    pub fn extract_file_extension(mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "jpg",
            "image/tiff" => "tiff",
            "image/x-portable-anymap" => "pnm",
            _ => ImageFormat::from_mime_type(mime_type)
                .and_then(|format| format.extensions_str().first().copied())
                .unwrap_or(FALLBACK_EXTENSION),
        }
    }
}

#[async_trait]
impl ImageStore for S3Service {
    async fn upload_image(
        &self,
        image_data: &[u8],
        s3_key: &str,
        mime_type: &str,
    ) -> Result<(), S3ServiceError> {
        let body = ByteStream::from(image_data.to_vec());

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .body(body)
            .content_type(mime_type)
            .send()
            .await
            .map_err(|e| S3ServiceError::S3(e.to_string()))?;

        Ok(())
    }

    async fn get_image(&self, s3_key: &str) -> Result<Vec<u8>, S3ServiceError> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .send()
            .await
            .map_err(|e| S3ServiceError::S3(e.to_string()))?;

        let body = result
            .body
            .collect()
            .await
            .map_err(|e| S3ServiceError::S3(e.to_string()))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn delete_image(&self, s3_key: &str) -> Result<(), S3ServiceError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .send()
            .await
            .map_err(|e| S3ServiceError::S3(e.to_string()))?;

        Ok(())
    }
}
