use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    mapping::SuggestionMap,
    model::{Label, Prediction},
    storage::FlaggedUrlSink,
};

pub const SAFE_MESSAGE: &str = "It is safe to go.";
pub const PHISHING_MESSAGE: &str = "The website is detected as phishing and not safe to go.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub label: Label,
    pub message: String,
    /// `p1` rounded to two decimals, whichever class was predicted.
    pub probability: f64,
    pub suggestion: Option<String>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Turns a prediction into the user-facing verdict.
///
/// Phishing URLs are appended to `sink` once; a failing sink is logged and
/// does not affect the verdict. The suggestion lookup runs for every label.
pub fn decide(
    prediction: &Prediction,
    url: &str,
    suggestions: &SuggestionMap,
    sink: &dyn FlaggedUrlSink,
) -> Verdict {
    let mut message = match prediction.label {
        Label::Legitimate => SAFE_MESSAGE.to_string(),
        Label::Phishing => {
            if let Err(e) = sink.append(url) {
                warn!("Failed to record phishing URL: {}", e);
            }
            PHISHING_MESSAGE.to_string()
        }
    };

    let suggestion = suggestions.suggest(url).map(String::from);
    if let Some(legit) = &suggestion {
        message.push_str(&format!("\nYou might want to visit the legitimate site: {}", legit));
    }

    Verdict {
        label: prediction.label,
        message,
        probability: round2(prediction.p1),
        suggestion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        urls: Mutex<Vec<String>>,
    }

    impl FlaggedUrlSink for RecordingSink {
        fn append(&self, url: &str) -> Result<(), AppError> {
            self.urls.lock().push(url.to_string());
            Ok(())
        }
    }

    struct BrokenSink;

    impl FlaggedUrlSink for BrokenSink {
        fn append(&self, _url: &str) -> Result<(), AppError> {
            Err(AppError::Internal("disk full".to_string()))
        }
    }

    fn phishing(p1: f64) -> Prediction {
        Prediction { label: Label::Phishing, p0: 1.0 - p1, p1 }
    }

    fn legit(p1: f64) -> Prediction {
        Prediction { label: Label::Legitimate, p0: 1.0 - p1, p1 }
    }

    #[test]
    fn legitimate_is_safe_and_not_logged() {
        let sink = RecordingSink::default();
        let verdict = decide(&legit(0.123), "http://x.com", &SuggestionMap::default(), &sink);
        assert_eq!(verdict.message, SAFE_MESSAGE);
        assert_eq!(verdict.label, Label::Legitimate);
        assert_eq!(verdict.probability, 0.12);
        assert!(sink.urls.lock().is_empty());
    }

    #[test]
    fn phishing_is_logged_once_with_suggestion() {
        let sink = RecordingSink::default();
        let map = SuggestionMap::from_pairs([("http://paypa1.com", "paypal.com")]);
        let verdict = decide(&phishing(0.876), "http://paypa1.com", &map, &sink);

        assert!(verdict.message.starts_with(PHISHING_MESSAGE));
        assert!(verdict.message.contains("paypal.com"));
        assert_eq!(verdict.suggestion.as_deref(), Some("paypal.com"));
        assert_eq!(verdict.probability, 0.88);
        assert_eq!(*sink.urls.lock(), vec!["http://paypa1.com".to_string()]);
    }

    #[test]
    fn phishing_without_mapping_has_no_suggestion() {
        let sink = RecordingSink::default();
        let verdict = decide(&phishing(0.7), "http://unknown.biz", &SuggestionMap::default(), &sink);
        assert_eq!(verdict.message, PHISHING_MESSAGE);
        assert_eq!(verdict.suggestion, None);
    }

    #[test]
    fn probability_is_always_p1() {
        let sink = RecordingSink::default();
        let verdict = decide(&phishing(0.31), "http://x.com", &SuggestionMap::default(), &sink);
        assert_eq!(verdict.probability, 0.31);
    }

    #[test]
    fn sink_failure_does_not_block_verdict() {
        let verdict = decide(&phishing(0.9), "http://x.com", &SuggestionMap::default(), &BrokenSink);
        assert_eq!(verdict.label, Label::Phishing);
        assert_eq!(verdict.message, PHISHING_MESSAGE);
    }

    #[test]
    fn suggestion_lookup_ignores_label() {
        let sink = RecordingSink::default();
        let map = SuggestionMap::from_pairs([("http://paypa1.com", "paypal.com")]);
        let verdict = decide(&legit(0.2), "http://paypa1.com", &map, &sink);
        assert!(verdict.message.starts_with(SAFE_MESSAGE));
        assert_eq!(verdict.suggestion.as_deref(), Some("paypal.com"));
    }
}
