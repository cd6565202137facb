pub mod dynamodb_repository;

use async_trait::async_trait;
use uuid::Uuid;

use crate::diagnosis::models::DiagnosisRecord;
use dynamodb_repository::RepositoryError;

/// Table of diagnosis records keyed by id.
#[async_trait]
pub trait DiagnosisTable: Send + Sync {
    /// Fails if a record with the same id already exists.
    async fn create_diagnosis(&self, record: &DiagnosisRecord) -> Result<(), RepositoryError>;

    async fn get_diagnosis(&self, id: Uuid) -> Result<Option<DiagnosisRecord>, RepositoryError>;

    /// All diagnoses of `user_id`, in no particular order.
    async fn get_user_diagnoses(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<DiagnosisRecord>, RepositoryError>;

    async fn delete_diagnosis(&self, id: Uuid) -> Result<(), RepositoryError>;
}
