use std::path::PathBuf;

use crate::gbdt::BoostingParams;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bind_addr: String,
    pub model_path: PathBuf,
    pub dataset_path: PathBuf,
    pub mapping_path: PathBuf,
    pub phishing_log_path: PathBuf,
    pub predictions_path: PathBuf,
    pub target_column: String,
    pub id_column: String,
    pub boosting: BoostingParams,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, falling back to defaults
    /// for missing or unparseable values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let defaults = BoostingParams::default();

        Self {
            bind_addr: string("PHISHGUARD_BIND", "0.0.0.0:8080"),
            model_path: string("PHISHGUARD_MODEL_PATH", "model.bin").into(),
            dataset_path: string("PHISHGUARD_DATASET_PATH", "upload.csv").into(),
            mapping_path: string("PHISHGUARD_MAPPING_PATH", "mapping.csv").into(),
            phishing_log_path: string("PHISHGUARD_PHISHING_LOG", "phishing_websites.txt").into(),
            predictions_path: string("PHISHGUARD_PREDICTIONS_PATH", "predictions.jsonl").into(),
            target_column: string("PHISHGUARD_TARGET_COLUMN", "Result"),
            id_column: string("PHISHGUARD_ID_COLUMN", "Id"),
            boosting: BoostingParams {
                n_estimators: lookup("PHISHGUARD_N_ESTIMATORS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.n_estimators),
                learning_rate: lookup("PHISHGUARD_LEARNING_RATE")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.learning_rate),
                max_depth: lookup("PHISHGUARD_MAX_DEPTH")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.max_depth),
                ..defaults
            },
        }
    }
}
