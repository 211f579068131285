use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::model::Label;

pub struct Metrics {
    started: Instant,
    latency: Mutex<Histogram<u64>>, // micros
    counters: Mutex<Counters>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    requests: u64,
    legitimate: u64,
    phishing: u64,
    unavailable: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub qps: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub total_requests: u64,
    pub legitimate: u64,
    pub phishing: u64,
    pub model_unavailable: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            latency: Mutex::new(Histogram::new(3).expect("3 significant figures is a valid histogram")),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn observe_request(&self, dur: Duration, outcome: Option<Label>) {
        let micros = dur.as_micros() as u64;
        let _ = self.latency.lock().record(micros);

        let mut c = self.counters.lock();
        c.requests += 1;
        match outcome {
            Some(Label::Legitimate) => c.legitimate += 1,
            Some(Label::Phishing) => c.phishing += 1,
            None => c.unavailable += 1,
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let h = self.latency.lock();
        let c = *self.counters.lock();
        let elapsed = self.started.elapsed().as_secs_f64().max(1.0);

        MetricsSnapshot {
            qps: c.requests as f64 / elapsed,
            p50_ms: h.value_at_quantile(0.50) as f64 / 1000.0,
            p95_ms: h.value_at_quantile(0.95) as f64 / 1000.0,
            p99_ms: h.value_at_quantile(0.99) as f64 / 1000.0,
            total_requests: c.requests,
            legitimate: c.legitimate,
            phishing: c.phishing,
            model_unavailable: c.unavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_outcomes() {
        let m = Metrics::new();
        m.observe_request(Duration::from_micros(300), Some(Label::Phishing));
        m.observe_request(Duration::from_micros(500), Some(Label::Legitimate));
        m.observe_request(Duration::from_micros(100), None);

        let s = m.snapshot();
        assert_eq!(s.total_requests, 3);
        assert_eq!(s.phishing, 1);
        assert_eq!(s.legitimate, 1);
        assert_eq!(s.model_unavailable, 1);
        assert!(s.p99_ms >= s.p50_ms);
    }
}
