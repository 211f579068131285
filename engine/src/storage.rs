use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::PathBuf,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;

/// Append-only destination for URLs classified as phishing.
pub trait FlaggedUrlSink: Send + Sync {
    fn append(&self, url: &str) -> Result<(), AppError>;
}

/// One URL per line, appended to a text file.
pub struct PhishingLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PhishingLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }
}

impl FlaggedUrlSink for PhishingLog {
    fn append(&self, url: &str) -> Result<(), AppError> {
        let _guard = self.lock.lock();
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", url)?;
        debug!("Recorded phishing URL in {}", self.path.display());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub prediction: String,
    pub legitimate_suggestion: Option<String>,
}

impl PredictionRecord {
    pub fn new(url: &str, prediction: &str, legitimate_suggestion: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            url: url.to_string(),
            prediction: prediction.to_string(),
            legitimate_suggestion: legitimate_suggestion.map(String::from),
        }
    }
}

/// History of served predictions, stored as JSON lines.
pub struct PredictionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PredictionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn insert(&self, record: &PredictionRecord) -> Result<(), AppError> {
        let line = serde_json::to_string(record)?;
        let _guard = self.lock.lock();
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<PredictionRecord>, AppError> {
        let content = {
            let _guard = self.lock.lock();
            match fs::read_to_string(&self.path) {
                Ok(c) => c,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            }
        };

        let mut records = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping malformed prediction record on line {}: {}", i + 1, e),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn phishing_log_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("phishing_websites.txt");
        let log = PhishingLog::new(&path);
        log.append("http://a.example").unwrap();
        log.append("http://b.example").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "http://a.example\nhttp://b.example\n");
    }

    #[test]
    fn phishing_log_reports_unwritable_path() {
        let dir = tempdir().unwrap();
        let log = PhishingLog::new(dir.path().join("no/such/dir/log.txt"));
        assert!(matches!(log.append("http://x"), Err(AppError::Io(_))));
    }

    #[test]
    fn prediction_history_round_trips() {
        let dir = tempdir().unwrap();
        let store = PredictionStore::new(dir.path().join("predictions.jsonl"));
        assert!(store.all().unwrap().is_empty());

        let first = PredictionRecord::new("http://x.com", "It is safe to go.", None);
        let second = PredictionRecord::new("http://paypa1.com", "phishing", Some("paypal.com"));
        store.insert(&first).unwrap();
        store.insert(&second).unwrap();

        assert_eq!(store.all().unwrap(), vec![first, second]);
    }

    #[test]
    fn malformed_history_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("predictions.jsonl");
        let store = PredictionStore::new(&path);
        store.insert(&PredictionRecord::new("http://x.com", "safe", None)).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();
        assert_eq!(store.all().unwrap().len(), 1);
    }
}
