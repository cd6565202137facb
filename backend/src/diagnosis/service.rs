use std::sync::Arc;

use actix_web::web;
use shared::{AdvisoryPayload, HistoryPage, SkinType};
use uuid::Uuid;

use super::models::{DiagnosisRecord, NewDiagnosis};
use super::pipeline::{DiagnosisError, DiagnosisPipeline};
use super::recorder::{DiagnosisRecorder, RecorderError};

pub const DEFAULT_PAGE_SIZE: usize = 6;
pub const MAX_PAGE_SIZE: usize = 100;

/// One uploaded image plus the caller's context.
#[derive(Debug, Clone)]
pub struct Submission {
    pub owner: Uuid,
    pub image: Vec<u8>,
    pub skin_type: Option<SkinType>,
    /// Preview calls are answered but never stored.
    pub is_example: bool,
}

#[derive(Clone)]
pub struct DiagnosisService {
    pipeline: DiagnosisPipeline,
    recorder: Arc<dyn DiagnosisRecorder>,
}

impl DiagnosisService {
    pub fn new(pipeline: DiagnosisPipeline, recorder: Arc<dyn DiagnosisRecorder>) -> Self {
        Self { pipeline, recorder }
    }

    pub fn is_available(&self) -> bool {
        self.pipeline.is_available()
    }

    /// Diagnoses the submission and, unless it is a preview, records it.
    ///
    /// A failed write is logged and otherwise ignored: the advisory has been computed
    /// and is returned either way.
    pub async fn submit(&self, submission: Submission) -> Result<AdvisoryPayload, DiagnosisError> {
        if !self.pipeline.is_available() {
            return Err(DiagnosisError::ModelUnavailable);
        }

        let Submission {
            owner,
            image,
            skin_type,
            is_example,
        } = submission;

        let pipeline = self.pipeline.clone();
        let (image, result) = web::block(move || {
            let result = pipeline.diagnose(&image, skin_type);
            (image, result)
        })
        .await
        .map_err(|e| DiagnosisError::Inference(e.to_string()))?;
        let payload = result?;

        log::info!(
            "Diagnosis for user {}: {} condition(s), skin type {:?}",
            owner,
            payload.predictions.len(),
            skin_type
        );

        if is_example {
            log::debug!("Example request from {}, skipping persistence", owner);
            return Ok(payload);
        }

        match self
            .recorder
            .create(NewDiagnosis::new(owner, image, payload.clone()))
            .await
        {
            Ok(record) => log::info!("Recorded diagnosis {} for user {}", record.id, owner),
            Err(e) => log::error!("Failed to record diagnosis for user {}: {}", owner, e),
        }

        Ok(payload)
    }

    /// Page `page` (1-based) of the owner's history, newest first.
    pub async fn history(
        &self,
        owner: Uuid,
        page: Option<usize>,
        page_size: Option<usize>,
    ) -> Result<HistoryPage, RecorderError> {
        let page = page.unwrap_or(1).max(1);
        let page_size = page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let records = self.recorder.list(owner).await?;
        let results = records
            .iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .map(DiagnosisRecord::to_entry)
            .collect();

        Ok(HistoryPage {
            count: records.len(),
            page,
            page_size,
            results,
        })
    }

    pub async fn find(&self, owner: Uuid, id: Uuid) -> Result<Option<DiagnosisRecord>, RecorderError> {
        self.recorder.get(owner, id).await
    }

    pub async fn image(&self, record: &DiagnosisRecord) -> Result<Vec<u8>, RecorderError> {
        self.recorder.image(record).await
    }

    pub async fn delete(&self, owner: Uuid, id: Uuid) -> Result<bool, RecorderError> {
        let deleted = self.recorder.delete(owner, id).await?;
        if deleted {
            log::info!("Deleted diagnosis {} for user {}", id, owner);
        }
        Ok(deleted)
    }
}
