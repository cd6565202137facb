use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::{DiagnosisRecord, NewDiagnosis};
use crate::db::dynamodb_repository::{DynamoDbRepository, RepositoryError};
use crate::db::DiagnosisTable;
use crate::storage::s3_service::{S3Service, S3ServiceError};
use crate::storage::ImageStore;

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Storage error: {0}")]
    Storage(#[from] S3ServiceError),
    #[error("Stored image missing for diagnosis {0}")]
    ImageMissing(Uuid),
}

/// Durable store for diagnosis history.
///
/// `create` is all-or-nothing: either the image and the record are both stored or
/// neither is.
#[async_trait]
pub trait DiagnosisRecorder: Send + Sync {
    async fn create(&self, diagnosis: NewDiagnosis) -> Result<DiagnosisRecord, RecorderError>;

    /// Diagnoses of `owner`, newest first.
    async fn list(&self, owner: Uuid) -> Result<Vec<DiagnosisRecord>, RecorderError>;

    async fn get(&self, owner: Uuid, id: Uuid) -> Result<Option<DiagnosisRecord>, RecorderError>;

    async fn image(&self, record: &DiagnosisRecord) -> Result<Vec<u8>, RecorderError>;

    /// Returns `false` when `owner` has no diagnosis `id`.
    async fn delete(&self, owner: Uuid, id: Uuid) -> Result<bool, RecorderError>;
}

fn newest_first(records: &mut [DiagnosisRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Process-local recorder used for development and tests.
#[derive(Default)]
pub struct MemoryRecorder {
    entries: RwLock<Vec<(DiagnosisRecord, Vec<u8>)>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl DiagnosisRecorder for MemoryRecorder {
    async fn create(&self, diagnosis: NewDiagnosis) -> Result<DiagnosisRecord, RecorderError> {
        let id = Uuid::new_v4();
        let file_extension = S3Service::extract_file_extension(&diagnosis.mime_type);
        let key = S3Service::generate_s3_key(diagnosis.owner, id, file_extension);
        let record = DiagnosisRecord::from_new(id, &diagnosis, key);
        self.entries
            .write()
            .await
            .push((record.clone(), diagnosis.image));
        Ok(record)
    }

    async fn list(&self, owner: Uuid) -> Result<Vec<DiagnosisRecord>, RecorderError> {
        let entries = self.entries.read().await;
        // Reverse insertion order first so equal timestamps still list newest first.
        let mut records: Vec<DiagnosisRecord> = entries
            .iter()
            .rev()
            .filter(|(record, _)| record.owner == owner)
            .map(|(record, _)| record.clone())
            .collect();
        newest_first(&mut records);
        Ok(records)
    }

    async fn get(&self, owner: Uuid, id: Uuid) -> Result<Option<DiagnosisRecord>, RecorderError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .find(|(record, _)| record.id == id && record.owner == owner)
            .map(|(record, _)| record.clone()))
    }

    async fn image(&self, record: &DiagnosisRecord) -> Result<Vec<u8>, RecorderError> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .find(|(stored, _)| stored.id == record.id)
            .map(|(_, image)| image.clone())
            .ok_or(RecorderError::ImageMissing(record.id))
    }

    async fn delete(&self, owner: Uuid, id: Uuid) -> Result<bool, RecorderError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(record, _)| !(record.id == id && record.owner == owner));
        Ok(entries.len() != before)
    }
}

/// Images in an object store, records in a table. S3 and DynamoDB in production.
#[derive(Clone)]
pub struct AwsRecorder<T = DynamoDbRepository, S = S3Service> {
    table: T,
    images: S,
}

impl<T: DiagnosisTable, S: ImageStore> AwsRecorder<T, S> {
    pub fn new(table: T, images: S) -> Self {
        Self { table, images }
    }

    /// Removes an image that has no record. Failures leave an orphaned object and are
    /// only logged.
    async fn discard_image(&self, key: &str) {
        if let Err(e) = self.images.delete_image(key).await {
            log::error!("Failed to remove orphaned image {}: {}", key, e);
        }
    }
}

#[async_trait]
impl<T: DiagnosisTable, S: ImageStore> DiagnosisRecorder for AwsRecorder<T, S> {
    async fn create(&self, diagnosis: NewDiagnosis) -> Result<DiagnosisRecord, RecorderError> {
        let id = Uuid::new_v4();
        let file_extension = S3Service::extract_file_extension(&diagnosis.mime_type);
        let s3_key = S3Service::generate_s3_key(diagnosis.owner, id, file_extension);

        self.images
            .upload_image(&diagnosis.image, &s3_key, &diagnosis.mime_type)
            .await?;

        let record = DiagnosisRecord::from_new(id, &diagnosis, s3_key);
        if let Err(e) = self.table.create_diagnosis(&record).await {
            self.discard_image(&record.image_key).await;
            return Err(e.into());
        }

        Ok(record)
    }

    async fn list(&self, owner: Uuid) -> Result<Vec<DiagnosisRecord>, RecorderError> {
        let mut records = self.table.get_user_diagnoses(owner).await?;
        newest_first(&mut records);
        Ok(records)
    }

    async fn get(&self, owner: Uuid, id: Uuid) -> Result<Option<DiagnosisRecord>, RecorderError> {
        Ok(self
            .table
            .get_diagnosis(id)
            .await?
            .filter(|record| record.owner == owner))
    }

    async fn image(&self, record: &DiagnosisRecord) -> Result<Vec<u8>, RecorderError> {
        Ok(self.images.get_image(&record.image_key).await?)
    }

    /// The record is authoritative: once it is gone the diagnosis is deleted, even if
    /// its image lingers.
    async fn delete(&self, owner: Uuid, id: Uuid) -> Result<bool, RecorderError> {
        let Some(record) = self.get(owner, id).await? else {
            return Ok(false);
        };

        self.table.delete_diagnosis(record.id).await?;
        self.discard_image(&record.image_key).await;
        Ok(true)
    }
}
