pub mod s3_service;

use async_trait::async_trait;
use s3_service::S3ServiceError;

/// Object storage for uploaded images.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn upload_image(
        &self,
        image_data: &[u8],
        key: &str,
        mime_type: &str,
    ) -> Result<(), S3ServiceError>;

    async fn get_image(&self, key: &str) -> Result<Vec<u8>, S3ServiceError>;

    async fn delete_image(&self, key: &str) -> Result<(), S3ServiceError>;
}
