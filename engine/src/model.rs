use serde::{Deserialize, Serialize};
use std::{fs, path::Path, sync::Arc};
use tracing::{info, warn};

use crate::{
    config::EngineConfig,
    error::AppError,
    features::{FEATURE_COUNT, FEATURE_NAMES},
    gbdt::GradientBoostedTrees,
    trainer::Trainer,
};

const ARTIFACT_VERSION: u32 = 1;

/// Class encoding shared with the training data: 0 is legitimate, 1 is phishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Legitimate,
    Phishing,
}

impl Label {
    pub fn from_class(class: u8) -> Self {
        if class == 0 {
            Label::Legitimate
        } else {
            Label::Phishing
        }
    }

    pub fn class(&self) -> u8 {
        match self {
            Label::Legitimate => 0,
            Label::Phishing => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Legitimate => "legitimate",
            Label::Phishing => "phishing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Label,
    pub p0: f64,
    pub p1: f64,
}

pub trait Classifier: Send + Sync {
    fn predict(&self, features: &[f64]) -> Label;
    fn predict_proba(&self, features: &[f64]) -> [f64; 2];
}

impl Classifier for GradientBoostedTrees {
    fn predict(&self, features: &[f64]) -> Label {
        Label::from_class(GradientBoostedTrees::predict(self, features))
    }

    fn predict_proba(&self, features: &[f64]) -> [f64; 2] {
        GradientBoostedTrees::predict_proba(self, features)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ModelArtifact {
    format_version: u32,
    feature_names: Vec<String>,
    model: GradientBoostedTrees,
}

pub fn save_model(model: &GradientBoostedTrees, path: &Path) -> Result<(), AppError> {
    let artifact = ModelArtifact {
        format_version: ARTIFACT_VERSION,
        feature_names: FEATURE_NAMES.iter().map(|n| n.to_string()).collect(),
        model: model.clone(),
    };
    let blob = bincode::serialize(&artifact)?;
    fs::write(path, blob)?;
    info!("Model saved to {}", path.display());
    Ok(())
}

pub fn load_model(path: &Path) -> Result<GradientBoostedTrees, AppError> {
    let blob = fs::read(path)?;
    let artifact: ModelArtifact = bincode::deserialize(&blob)?;

    if artifact.format_version != ARTIFACT_VERSION {
        return Err(AppError::Artifact(format!(
            "unsupported artifact version {}",
            artifact.format_version
        )));
    }
    if artifact.feature_names != FEATURE_NAMES {
        return Err(AppError::Artifact(
            "artifact was trained on a different feature layout".to_string(),
        ));
    }
    if artifact.model.n_features() != FEATURE_COUNT {
        return Err(AppError::Artifact(format!(
            "artifact expects {} features",
            artifact.model.n_features()
        )));
    }
    artifact.model.validate()?;
    Ok(artifact.model)
}

/// Holds the process-wide classifier. Built once at startup and read-only
/// afterwards; an empty runtime answers every request with `ModelUnavailable`.
#[derive(Clone)]
pub struct ClassifierRuntime {
    model: Option<Arc<dyn Classifier>>,
}

impl ClassifierRuntime {
    pub fn from_classifier(model: Arc<dyn Classifier>) -> Self {
        Self { model: Some(model) }
    }

    pub fn unavailable() -> Self {
        Self { model: None }
    }

    /// Loads the saved artifact, retraining synchronously when it is missing
    /// or unreadable. Never fails; check [`is_available`](Self::is_available).
    pub fn load_or_train(config: &EngineConfig) -> Self {
        match load_model(&config.model_path) {
            Ok(model) => {
                info!("Model loaded from {}", config.model_path.display());
                return Self::from_classifier(Arc::new(model));
            }
            Err(AppError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Model file {} not found, training a new model", config.model_path.display());
            }
            Err(e) => {
                warn!("Error loading the model: {}. Training a new model.", e);
            }
        }

        match Trainer::from_config(config).train_and_save() {
            Ok(model) => Self::from_classifier(Arc::new(model)),
            Err(e) => {
                warn!("Training failed, prediction is unavailable: {}", e);
                Self::unavailable()
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    pub fn infer(&self, features: &[f64]) -> Result<Prediction, AppError> {
        let model = self.model.as_ref().ok_or(AppError::ModelUnavailable)?;
        if features.len() != FEATURE_COUNT {
            return Err(AppError::FeatureShape { expected: FEATURE_COUNT, actual: features.len() });
        }

        let label = model.predict(features);
        let [p0, p1] = model.predict_proba(features);
        Ok(Prediction { label, p0, p1 })
    }
}
