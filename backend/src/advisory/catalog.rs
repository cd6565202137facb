use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shared::SkinType;
use strum_macros::EnumString;

use crate::inference::model::LabelSet;

const DEFAULT_KEY: &str = "default";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Condition '{0}' has no default advice")]
    MissingDefault(String),
    #[error("Condition '{label}' has advice for unknown skin type '{key}'")]
    UnknownSkinType { label: String, key: String },
}

/// Conditions the shipped classifier knows about. Labels outside this set are kept
/// verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString)]
pub enum Condition {
    #[strum(serialize = "여드름 피부")]
    Acne,
    #[strum(serialize = "정상 피부")]
    Normal,
    #[strum(serialize = "건선 피부")]
    Psoriasis,
    #[strum(serialize = "아토피 피부")]
    AtopicDermatitis,
    #[strum(serialize = "주사 피부")]
    Rosacea,
    #[strum(serialize = "지루 피부")]
    SeborrheicDermatitis,
    #[strum(default)]
    Other(String),
}

impl Condition {
    pub fn from_label(label: &str) -> Self {
        // The `default` variant makes parsing infallible.
        Condition::from_str(label).unwrap_or_else(|_| Condition::Other(label.to_string()))
    }

    pub fn label(&self) -> &str {
        match self {
            Condition::Acne => "여드름 피부",
            Condition::Normal => "정상 피부",
            Condition::Psoriasis => "건선 피부",
            Condition::AtopicDermatitis => "아토피 피부",
            Condition::Rosacea => "주사 피부",
            Condition::SeborrheicDermatitis => "지루 피부",
            Condition::Other(label) => label,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    version: u32,
    conditions: HashMap<String, HashMap<String, Vec<String>>>,
}

/// Advice for one condition. `default` is mandatory, so the fallback always exists.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryEntry {
    default: Vec<String>,
    by_skin_type: HashMap<SkinType, Vec<String>>,
}

impl AdvisoryEntry {
    pub fn for_skin_type(&self, skin_type: Option<SkinType>) -> &[String] {
        skin_type
            .and_then(|skin_type| self.by_skin_type.get(&skin_type))
            .unwrap_or(&self.default)
    }
}

/// Read-only table of advice keyed by condition and skin type.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryCatalog {
    version: u32,
    entries: HashMap<Condition, AdvisoryEntry>,
}

impl AdvisoryCatalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path)?;
        let catalog = Self::from_yaml_str(&contents)?;
        log::info!(
            "Loaded advisory catalog v{} with {} conditions from {}",
            catalog.version,
            catalog.len(),
            path.display()
        );
        for condition in catalog.entries.keys() {
            log::debug!("Advice available for '{}'", condition.label());
        }
        Ok(catalog)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(contents)?;

        let mut entries = HashMap::with_capacity(file.conditions.len());
        for (label, mut variants) in file.conditions {
            let default = variants
                .remove(DEFAULT_KEY)
                .ok_or_else(|| CatalogError::MissingDefault(label.clone()))?;

            let mut by_skin_type = HashMap::with_capacity(variants.len());
            for (key, blocks) in variants {
                let skin_type = SkinType::from_str(&key).map_err(|_| {
                    CatalogError::UnknownSkinType {
                        label: label.clone(),
                        key: key.clone(),
                    }
                })?;
                by_skin_type.insert(skin_type, blocks);
            }

            entries.insert(
                Condition::from_label(&label),
                AdvisoryEntry {
                    default,
                    by_skin_type,
                },
            );
        }

        Ok(Self {
            version: file.version,
            entries,
        })
    }

    /// Advice for `condition`; empty when the condition has no catalog entry.
    pub fn lookup(&self, condition: &Condition, skin_type: Option<SkinType>) -> &[String] {
        self.entries
            .get(condition)
            .map(|entry| entry.for_skin_type(skin_type))
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Labels the classifier can emit that have no advice.
    pub fn missing_labels<'a>(&self, labels: &'a LabelSet) -> Vec<&'a str> {
        labels
            .iter()
            .filter(|label| !self.entries.contains_key(&Condition::from_label(label)))
            .collect()
    }
}
