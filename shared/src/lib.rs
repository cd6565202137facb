use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

/// Message returned in place of an advisory when no condition clears the threshold.
pub const INCONCLUSIVE_MESSAGE: &str = "정확한 진단을 내리기 어렵습니다. 다른 이미지를 시도해 보세요.";

/// Skin type declared by the user. An unset skin type is modelled as `Option::None`
/// and selects the catalog's default advice.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SkinType {
    Oily,
    Dry,
    Combination,
    Sensitive,
    Normal,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RankedResult {
    pub label: String,
    pub confidence: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct AdvisoryPayload {
    pub predictions: Vec<RankedResult>,
    pub tips: Vec<String>,
}

impl AdvisoryPayload {
    pub fn is_conclusive(&self) -> bool {
        !self.predictions.is_empty()
    }
}

/// Body of a successful `/api/predict` call. The inconclusive shape intentionally
/// differs from the advisory shape.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum PredictionResponse {
    Advisory(AdvisoryPayload),
    Inconclusive { prediction: String },
}

impl From<AdvisoryPayload> for PredictionResponse {
    fn from(payload: AdvisoryPayload) -> Self {
        if payload.is_conclusive() {
            PredictionResponse::Advisory(payload)
        } else {
            PredictionResponse::Inconclusive {
                prediction: INCONCLUSIVE_MESSAGE.to_string(),
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DiagnosisEntry {
    pub id: Uuid,
    pub image_url: String,
    pub result: AdvisoryPayload,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HistoryPage {
    pub count: usize,
    pub page: usize,
    pub page_size: usize,
    pub results: Vec<DiagnosisEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExampleImages {
    pub example_images: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub model_available: bool,
}
