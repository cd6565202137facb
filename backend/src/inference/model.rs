use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::normalizer::NormalizedImage;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Failed to read label file: {0}")]
    Labels(#[from] std::io::Error),
    #[error("Label file contains no labels")]
    EmptyLabels,
    #[error("Label file has a blank label on line {line}")]
    BlankLabel { line: usize },
    #[error("Failed to load model weights: {0}")]
    Weights(String),
    #[error("Model execution failed: {0}")]
    Execution(String),
}

/// Ordered class names; position `i` names score `i` of every score vector.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new(labels: Vec<String>) -> Result<Self, ClassifierError> {
        if labels.is_empty() {
            return Err(ClassifierError::EmptyLabels);
        }
        Ok(Self { labels })
    }

    /// One label per line, surrounding whitespace trimmed. Trailing blank lines are
    /// ignored. Any other blank line is rejected, since skipping it would shift the
    /// index of every later label.
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let contents = fs::read_to_string(path)?;
        let lines: Vec<&str> = contents.trim_end().lines().map(str::trim).collect();
        if let Some(index) = lines.iter().position(|line| line.is_empty()) {
            return Err(ClassifierError::BlankLabel { line: index + 1 });
        }
        Self::new(lines.into_iter().map(String::from).collect())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

/// A frozen image classifier. Takes a single image, returns one score per label.
pub trait Classifier: Send + Sync {
    fn classify(&self, image: &NormalizedImage) -> Result<Vec<f32>, ClassifierError>;
}

/// The process-wide classifier, loaded once at startup.
#[derive(Clone)]
pub enum ClassifierService {
    Ready {
        classifier: Arc<dyn Classifier>,
        labels: Arc<LabelSet>,
    },
    Unavailable {
        reason: String,
    },
}

impl ClassifierService {
    pub fn ready(classifier: Arc<dyn Classifier>, labels: LabelSet) -> Self {
        ClassifierService::Ready {
            classifier,
            labels: Arc::new(labels),
        }
    }

    /// Loads labels and weights. Any failure leaves the service unavailable for the
    /// lifetime of the process.
    pub fn load(labels_path: &Path, model_path: &Path) -> Self {
        let result = LabelSet::load(labels_path)
            .and_then(|labels| Ok((load_weights(model_path)?, labels)));

        match result {
            Ok((classifier, labels)) => {
                log::info!(
                    "Classifier loaded from {} with {} labels",
                    model_path.display(),
                    labels.len()
                );
                Self::ready(classifier, labels)
            }
            Err(e) => {
                log::error!("Error loading model or labels: {}", e);
                ClassifierService::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ClassifierService::Ready { .. })
    }

    pub fn labels(&self) -> Option<&LabelSet> {
        match self {
            ClassifierService::Ready { labels, .. } => Some(labels),
            ClassifierService::Unavailable { .. } => None,
        }
    }
}

#[cfg(feature = "torch")]
fn load_weights(model_path: &Path) -> Result<Arc<dyn Classifier>, ClassifierError> {
    Ok(Arc::new(torch::TorchClassifier::new(model_path)?))
}

#[cfg(not(feature = "torch"))]
fn load_weights(model_path: &Path) -> Result<Arc<dyn Classifier>, ClassifierError> {
    Err(ClassifierError::Weights(format!(
        "cannot load {}: built without the `torch` feature",
        model_path.display()
    )))
}

#[cfg(feature = "torch")]
mod torch {
    use std::path::Path;
    use std::sync::Mutex;

    use tch::nn::ModuleT;
    use tch::{CModule, Device, Kind, Tensor};

    use super::{Classifier, ClassifierError};
    use crate::inference::normalizer::NormalizedImage;

    /// TorchScript export of the trained network. Rescaling to [0, 1] happens inside
    /// the module, so raw 0-255 pixels are fed in.
    pub struct TorchClassifier {
        module: Mutex<CModule>,
        device: Device,
    }

    impl TorchClassifier {
        pub fn new(model_path: &Path) -> Result<Self, ClassifierError> {
            let device = Device::cuda_if_available();
            let mut module = CModule::load_on_device(model_path, device)
                .map_err(|e| ClassifierError::Weights(e.to_string()))?;
            module.set_eval();
            Ok(Self {
                module: Mutex::new(module),
                device,
            })
        }
    }

    impl Classifier for TorchClassifier {
        fn classify(&self, image: &NormalizedImage) -> Result<Vec<f32>, ClassifierError> {
            let [h, w, c] = image.shape();
            // Batch of one, NHWC as stored by the trained artifact.
            let input = Tensor::from_slice(&image.to_hwc_vec())
                .view([1, h as i64, w as i64, c as i64])
                .to_kind(Kind::Float)
                .to_device(self.device);

            let module = self
                .module
                .lock()
                .map_err(|_| ClassifierError::Execution("model lock poisoned".into()))?;
            let output = module.forward_t(&input, false);
            drop(module);

            let output_flat = output.to_kind(Kind::Float).to_device(Device::Cpu).view([-1]);
            let num_elements = output_flat.size()[0] as usize;
            let mut scores = vec![0.0f32; num_elements];
            output_flat.copy_data(&mut scores, num_elements);
            Ok(scores)
        }
    }
}
