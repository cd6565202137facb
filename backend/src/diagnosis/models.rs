use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{AdvisoryPayload, DiagnosisEntry};
use uuid::Uuid;

use crate::storage::s3_service::S3Service;

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// A diagnosis that has been computed but not yet stored.
#[derive(Debug, Clone)]
pub struct NewDiagnosis {
    pub owner: Uuid,
    pub image: Vec<u8>,
    pub mime_type: String,
    pub result: AdvisoryPayload,
}

impl NewDiagnosis {
    pub fn new(owner: Uuid, image: Vec<u8>, result: AdvisoryPayload) -> Self {
        let mime_type = image::guess_format(&image)
            .map(|format| format.to_mime_type().to_string())
            .unwrap_or_else(|_| FALLBACK_MIME_TYPE.to_string());
        Self {
            owner,
            image,
            mime_type,
            result,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisRecord {
    pub id: Uuid,
    pub owner: Uuid,
    pub image_key: String,
    pub image_hash: String,
    pub mime_type: String,
    pub result: AdvisoryPayload,
    pub created_at: DateTime<Utc>,
}

impl DiagnosisRecord {
    /// Record for `diagnosis` whose image is stored under `image_key`.
    pub fn from_new(id: Uuid, diagnosis: &NewDiagnosis, image_key: String) -> Self {
        Self {
            id,
            owner: diagnosis.owner,
            image_key,
            image_hash: S3Service::calculate_image_hash(&diagnosis.image),
            mime_type: diagnosis.mime_type.clone(),
            result: diagnosis.result.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn file_extension(&self) -> &'static str {
        S3Service::extract_file_extension(&self.mime_type)
    }

    pub fn to_entry(&self) -> DiagnosisEntry {
        DiagnosisEntry {
            id: self.id,
            image_url: format!("/api/history/{}/image", self.id),
            result: self.result.clone(),
            created_at: self.created_at,
        }
    }
}
