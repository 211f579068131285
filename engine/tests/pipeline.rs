use std::{fs, path::Path};

use phishguard_engine::{
    config::EngineConfig,
    features::{FEATURE_COUNT, FEATURE_NAMES},
    gbdt::BoostingParams,
    model::{load_model, ClassifierRuntime, Label},
    AppError, DetectionEngine,
};
use tempfile::{tempdir, TempDir};

/// Phishing iff the URL carries an IP literal or an '@'.
fn write_dataset(path: &Path, rows: usize) {
    let mut out = format!("Id,{},Result\n", FEATURE_NAMES.join(","));
    for i in 0..rows {
        let using_ip = i % 2;
        let symbol_at = usize::from(i % 3 == 0);
        let mut cells = vec![0usize; FEATURE_COUNT];
        cells[0] = using_ip;
        cells[3] = symbol_at;
        let line: Vec<String> = std::iter::once(i)
            .chain(cells)
            .chain(std::iter::once(using_ip | symbol_at))
            .map(|v| v.to_string())
            .collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    fs::write(path, out).unwrap();
}

fn config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        model_path: dir.path().join("model.bin"),
        dataset_path: dir.path().join("upload.csv"),
        mapping_path: dir.path().join("mapping.csv"),
        phishing_log_path: dir.path().join("phishing_websites.txt"),
        predictions_path: dir.path().join("predictions.jsonl"),
        boosting: BoostingParams { n_estimators: 30, ..BoostingParams::default() },
        ..EngineConfig::from_lookup(|_| None)
    }
}

#[test]
fn trains_when_artifact_missing_and_reloads_identically() {
    let dir = tempdir().unwrap();
    let cfg = config(&dir);
    write_dataset(&cfg.dataset_path, 90);

    let trained = ClassifierRuntime::load_or_train(&cfg);
    assert!(trained.is_available());
    assert!(cfg.model_path.exists());

    // Second start finds the artifact; the dataset is no longer needed.
    fs::remove_file(&cfg.dataset_path).unwrap();
    let reloaded = ClassifierRuntime::load_or_train(&cfg);
    assert!(reloaded.is_available());

    let engine = DetectionEngine::from_config(&cfg);
    for url in ["http://192.168.0.1/login", "http://a@b.com", "http://example.com/login"] {
        let x = engine.classify(url).unwrap().features;
        assert_eq!(trained.infer(x.as_slice()).unwrap(), reloaded.infer(x.as_slice()).unwrap());
    }
}

#[test]
fn corrupt_artifact_falls_back_to_training() {
    let dir = tempdir().unwrap();
    let cfg = config(&dir);
    write_dataset(&cfg.dataset_path, 60);
    fs::write(&cfg.model_path, b"\x00\x01garbage").unwrap();

    assert!(ClassifierRuntime::load_or_train(&cfg).is_available());
    assert!(load_model(&cfg.model_path).is_ok());
}

#[test]
fn end_to_end_classification() {
    let dir = tempdir().unwrap();
    let cfg = config(&dir);
    write_dataset(&cfg.dataset_path, 90);
    fs::write(&cfg.mapping_path, "http://192.168.0.1/login,bank.example\n").unwrap();

    let engine = DetectionEngine::from_config(&cfg);

    let flagged = engine.classify("http://192.168.0.1/login").unwrap();
    assert_eq!(flagged.verdict.label, Label::Phishing);
    assert_eq!(flagged.verdict.suggestion.as_deref(), Some("bank.example"));
    assert!(flagged.verdict.message.contains("bank.example"));
    assert!(flagged.verdict.probability > 0.5);

    let clean = engine.classify("http://example.com/login").unwrap();
    assert_eq!(clean.verdict.label, Label::Legitimate);
    assert_eq!(clean.verdict.suggestion, None);

    let again = engine.classify("http://example.com/login").unwrap();
    assert_eq!(clean.prediction, again.prediction);

    let log = fs::read_to_string(&cfg.phishing_log_path).unwrap();
    assert_eq!(log.lines().collect::<Vec<_>>(), vec!["http://192.168.0.1/login"]);
}

#[test]
fn nothing_to_load_or_train_is_model_unavailable() {
    let dir = tempdir().unwrap();
    let engine = DetectionEngine::from_config(&config(&dir));
    assert!(!engine.model_available());
    assert!(matches!(engine.classify("http://x.com"), Err(AppError::ModelUnavailable)));
}
