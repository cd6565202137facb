use std::env;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Where diagnosis records and their images are kept.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    Memory,
    Aws {
        diagnoses_table: String,
        s3_bucket: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub jwt_secret: String,
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub catalog_path: PathBuf,
    pub examples_dir: PathBuf,
    pub max_image_bytes: usize,
    pub storage: StorageBackend,
}

const DEFAULT_PORT: u16 = 8081;
const DEFAULT_MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));
        let path_or = |name: &str, default: &str| {
            PathBuf::from(lookup(name).unwrap_or_else(|| default.to_string()))
        };

        let port = match lookup("PORT") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { name: "PORT", value })?,
            None => DEFAULT_PORT,
        };

        let max_image_bytes = match lookup("MAX_IMAGE_BYTES") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { name: "MAX_IMAGE_BYTES", value })?,
            None => DEFAULT_MAX_IMAGE_BYTES,
        };

        let storage = match lookup("STORAGE_BACKEND").as_deref().unwrap_or("memory") {
            "memory" => StorageBackend::Memory,
            "aws" => StorageBackend::Aws {
                diagnoses_table: required("DYNAMODB_DIAGNOSES_TABLE")?,
                s3_bucket: required("S3_BUCKET_NAME")?,
            },
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            port,
            jwt_secret: required("JWT_SECRET")?,
            model_path: path_or("MODEL_PATH", "model/classifier.pt"),
            labels_path: path_or("LABELS_PATH", "model/labels.txt"),
            catalog_path: path_or("ADVISORY_CATALOG_PATH", "config/advisory_catalog.yaml"),
            examples_dir: path_or("EXAMPLES_DIR", "example_images"),
            max_image_bytes,
            storage,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}
