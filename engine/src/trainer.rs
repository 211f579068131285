use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::{io, path::PathBuf};
use tracing::{info, warn};

use crate::{
    config::EngineConfig,
    error::AppError,
    features::FEATURE_COUNT,
    gbdt::{BoostingParams, GradientBoostedTrees},
    model::save_model,
};

pub const EVAL_FRACTION: f64 = 0.2;
pub const SPLIT_SEED: u64 = 42;

/// Labelled rows read from a CSV file with a header line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub targets: Vec<u8>,
}

impl Dataset {
    pub fn from_csv(path: &std::path::Path, target_column: &str, id_column: &str) -> Result<Self, AppError> {
        if !path.exists() {
            return Err(AppError::DatasetMissing(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, target_column, id_column)
    }

    /// Every column other than the target and the identifier is a feature,
    /// kept in file order.
    pub fn from_reader<R: io::Read>(reader: R, target_column: &str, id_column: &str) -> Result<Self, AppError> {
        let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = csv.headers()?.clone();

        let target_idx = headers
            .iter()
            .position(|h| h == target_column)
            .ok_or_else(|| AppError::Dataset(format!("target column '{}' not found", target_column)))?;
        let feature_idx: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(i, h)| *i != target_idx && *h != id_column)
            .map(|(i, _)| i)
            .collect();

        if feature_idx.len() != FEATURE_COUNT {
            return Err(AppError::Dataset(format!(
                "expected {} feature columns, found {}",
                FEATURE_COUNT,
                feature_idx.len()
            )));
        }

        let mut dataset = Dataset {
            feature_names: feature_idx.iter().map(|i| headers[*i].to_string()).collect(),
            ..Dataset::default()
        };

        for (line, record) in csv.records().enumerate() {
            let record = record?;
            let row_no = line + 2;

            let cell = |i: usize| -> Result<f64, AppError> {
                let raw = record.get(i).unwrap_or("");
                raw.parse::<f64>().map_err(|_| {
                    AppError::Dataset(format!("row {}: '{}' in column '{}' is not numeric", row_no, raw, &headers[i]))
                })
            };

            let target = cell(target_idx)?;
            let target = if target == 0.0 {
                0
            } else if target == 1.0 {
                1
            } else {
                return Err(AppError::Dataset(format!(
                    "row {}: target {} is not 0 (legitimate) or 1 (phishing)",
                    row_no, target
                )));
            };

            let row = feature_idx.iter().map(|i| cell(*i)).collect::<Result<Vec<_>, _>>()?;
            dataset.rows.push(row);
            dataset.targets.push(target);
        }

        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            feature_names: self.feature_names.clone(),
            rows: indices.iter().map(|i| self.rows[*i].clone()).collect(),
            targets: indices.iter().map(|i| self.targets[*i]).collect(),
        }
    }

    /// Shuffles row indices with a seeded RNG and holds out
    /// `ceil(len * eval_fraction)` rows for evaluation.
    pub fn split(&self, eval_fraction: f64, seed: u64) -> Result<(Dataset, Dataset), AppError> {
        let n = self.len();
        let n_eval = (n as f64 * eval_fraction).ceil() as usize;
        if n_eval == 0 || n_eval >= n {
            return Err(AppError::Dataset(format!("{} rows is too few to split for training", n)));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));
        let (eval, train) = indices.split_at(n_eval);
        Ok((self.subset(train), self.subset(eval)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub train_rows: usize,
    pub eval_rows: usize,
    pub accuracy: f64,
}

pub struct Trainer {
    dataset_path: PathBuf,
    model_path: PathBuf,
    target_column: String,
    id_column: String,
    params: BoostingParams,
}

impl Trainer {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            dataset_path: config.dataset_path.clone(),
            model_path: config.model_path.clone(),
            target_column: config.target_column.clone(),
            id_column: config.id_column.clone(),
            params: config.boosting,
        }
    }

    pub fn fit(&self) -> Result<(GradientBoostedTrees, TrainingReport), AppError> {
        let dataset = Dataset::from_csv(&self.dataset_path, &self.target_column, &self.id_column)?;
        info!("Dataset loaded for training: {} rows", dataset.len());

        let (train, eval) = dataset.split(EVAL_FRACTION, SPLIT_SEED)?;
        let model = GradientBoostedTrees::fit(&train.rows, &train.targets, self.params)?;

        let correct = eval
            .rows
            .iter()
            .zip(&eval.targets)
            .filter(|(row, target)| model.predict(row) == **target)
            .count();
        let report = TrainingReport {
            train_rows: train.len(),
            eval_rows: eval.len(),
            accuracy: correct as f64 / eval.len() as f64,
        };
        info!(
            "Model trained on {} rows, evaluation accuracy {:.3} over {} rows",
            report.train_rows, report.accuracy, report.eval_rows
        );
        Ok((model, report))
    }

    /// Fits and persists the model. A failed save is logged and the fitted
    /// model is still returned.
    pub fn train_and_save(&self) -> Result<GradientBoostedTrees, AppError> {
        let (model, _) = self.fit()?;
        if let Err(e) = save_model(&model, &self.model_path) {
            warn!("Failed to save model to {}: {}", self.model_path.display(), e);
        }
        Ok(model)
    }
}
