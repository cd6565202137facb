use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::{AdvisoryPayload, ErrorResponse, SkinType};

use crate::advisory::catalog::AdvisoryCatalog;
use crate::advisory::composer::compose;
use crate::inference::model::ClassifierService;
use crate::inference::normalizer::{normalize, NormalizeError};
use crate::inference::ranker::rank;

#[derive(Debug, thiserror::Error)]
pub enum DiagnosisError {
    #[error("No image provided.")]
    NoImageProvided,
    #[error("Malformed upload: {0}")]
    MalformedUpload(String),
    #[error("Image exceeds the upload limit of {limit} bytes.")]
    ImageTooLarge { limit: usize },
    #[error("Invalid image: {0}")]
    InvalidImage(#[from] NormalizeError),
    #[error("Model or labels not loaded properly.")]
    ModelUnavailable,
    #[error("An error occurred during prediction: {0}")]
    Inference(String),
}

impl ResponseError for DiagnosisError {
    fn status_code(&self) -> StatusCode {
        match self {
            DiagnosisError::NoImageProvided
            | DiagnosisError::MalformedUpload(_)
            | DiagnosisError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            DiagnosisError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DiagnosisError::ModelUnavailable | DiagnosisError::Inference(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

/// Image in, advisory out. Cheap to clone; the model and catalog are shared.
#[derive(Clone)]
pub struct DiagnosisPipeline {
    classifier: ClassifierService,
    catalog: Arc<AdvisoryCatalog>,
}

impl DiagnosisPipeline {
    pub fn new(classifier: ClassifierService, catalog: Arc<AdvisoryCatalog>) -> Self {
        Self {
            classifier,
            catalog,
        }
    }

    pub fn is_available(&self) -> bool {
        self.classifier.is_available()
    }

    /// Runs the whole pipeline synchronously. Blocking; call from a worker thread.
    pub fn diagnose(
        &self,
        image: &[u8],
        skin_type: Option<SkinType>,
    ) -> Result<AdvisoryPayload, DiagnosisError> {
        let ClassifierService::Ready { classifier, labels } = &self.classifier else {
            return Err(DiagnosisError::ModelUnavailable);
        };

        let normalized = normalize(image)?;
        let scores = classifier
            .classify(&normalized)
            .map_err(|e| DiagnosisError::Inference(e.to_string()))?;

        if scores.len() != labels.len() {
            return Err(DiagnosisError::Inference(format!(
                "model produced {} scores for {} labels",
                scores.len(),
                labels.len()
            )));
        }

        let ranked = rank(&scores, labels);
        log::debug!("Ranked results: {:?}", ranked);
        Ok(compose(&self.catalog, &ranked, skin_type))
    }
}
