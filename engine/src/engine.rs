use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::{
    config::EngineConfig,
    error::AppError,
    features::{FeatureExtractor, FeatureVector},
    mapping::SuggestionMap,
    model::{ClassifierRuntime, Prediction},
    policy::{self, Verdict},
    storage::{FlaggedUrlSink, PhishingLog},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub url: String,
    pub features: FeatureVector,
    pub reasons: Vec<String>,
    pub prediction: Prediction,
    pub verdict: Verdict,
}

/// URL -> features -> classifier -> verdict. Everything it holds is read-only
/// after construction, so one instance serves all requests.
pub struct DetectionEngine {
    extractor: FeatureExtractor,
    runtime: ClassifierRuntime,
    suggestions: SuggestionMap,
    sink: Arc<dyn FlaggedUrlSink>,
}

impl DetectionEngine {
    pub fn new(
        extractor: FeatureExtractor,
        runtime: ClassifierRuntime,
        suggestions: SuggestionMap,
        sink: Arc<dyn FlaggedUrlSink>,
    ) -> Self {
        Self { extractor, runtime, suggestions, sink }
    }

    /// Startup wiring: loads (or trains) the model and the suggestion map.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            FeatureExtractor::new(),
            ClassifierRuntime::load_or_train(config),
            SuggestionMap::load(&config.mapping_path),
            Arc::new(PhishingLog::new(&config.phishing_log_path)),
        )
    }

    pub fn model_available(&self) -> bool {
        self.runtime.is_available()
    }

    pub fn classify(&self, url: &str) -> Result<Classification, AppError> {
        let features = self.extractor.extract(url);
        let prediction = self.runtime.infer(features.as_slice())?;
        let verdict = policy::decide(&prediction, url, &self.suggestions, self.sink.as_ref());

        debug!(
            "Classified {} as {} (p1={:.3})",
            url,
            prediction.label.as_str(),
            prediction.p1
        );

        Ok(Classification {
            url: url.to_string(),
            reasons: features.fired().into_iter().map(String::from).collect(),
            features,
            prediction,
            verdict,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        features::FEATURE_COUNT,
        model::{Classifier, Label},
    };
    use parking_lot::Mutex;

    /// Flags anything with an IP literal.
    struct IpClassifier;

    impl Classifier for IpClassifier {
        fn predict(&self, x: &[f64]) -> Label {
            Label::from_class(x[0] as u8)
        }

        fn predict_proba(&self, x: &[f64]) -> [f64; 2] {
            let p1 = if x[0] > 0.0 { 0.9 } else { 0.1 };
            [1.0 - p1, p1]
        }
    }

    #[derive(Default)]
    struct MemorySink(Mutex<Vec<String>>);

    impl FlaggedUrlSink for MemorySink {
        fn append(&self, url: &str) -> Result<(), AppError> {
            self.0.lock().push(url.to_string());
            Ok(())
        }
    }

    fn engine(sink: Arc<MemorySink>) -> DetectionEngine {
        DetectionEngine::new(
            FeatureExtractor::new(),
            ClassifierRuntime::from_classifier(Arc::new(IpClassifier)),
            SuggestionMap::from_pairs([("http://10.0.0.1/paypal", "paypal.com")]),
            sink,
        )
    }

    #[test]
    fn classifies_and_suggests() {
        let sink = Arc::new(MemorySink::default());
        let result = engine(sink.clone()).classify("http://10.0.0.1/paypal").unwrap();

        assert_eq!(result.features.len(), FEATURE_COUNT);
        assert_eq!(result.verdict.label, Label::Phishing);
        assert_eq!(result.verdict.probability, 0.9);
        assert_eq!(result.verdict.suggestion.as_deref(), Some("paypal.com"));
        assert!(result.reasons.contains(&"using_ip".to_string()));
        assert_eq!(*sink.0.lock(), vec!["http://10.0.0.1/paypal".to_string()]);
    }

    #[test]
    fn classify_is_idempotent() {
        let sink = Arc::new(MemorySink::default());
        let engine = engine(sink.clone());
        let a = engine.classify("http://example.com/login").unwrap();
        let b = engine.classify("http://example.com/login").unwrap();
        assert_eq!(a.prediction, b.prediction);
        assert_eq!(a.verdict, b.verdict);
        assert_eq!(a.verdict.label, Label::Legitimate);
        assert!(sink.0.lock().is_empty());
    }

    #[test]
    fn each_phishing_call_logs_once() {
        let sink = Arc::new(MemorySink::default());
        let engine = engine(sink.clone());
        engine.classify("http://1.2.3.4/").unwrap();
        engine.classify("http://1.2.3.4/").unwrap();
        assert_eq!(sink.0.lock().len(), 2);
    }

    #[test]
    fn missing_model_is_explicit() {
        let sink = Arc::new(MemorySink::default());
        let engine = DetectionEngine::new(
            FeatureExtractor::new(),
            ClassifierRuntime::unavailable(),
            SuggestionMap::default(),
            sink.clone(),
        );
        assert!(!engine.model_available());
        assert!(matches!(engine.classify("http://1.2.3.4/"), Err(AppError::ModelUnavailable)));
        assert!(sink.0.lock().is_empty());
    }
}
