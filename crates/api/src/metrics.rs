use extract::Strategy;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub struct Metrics {
    // Requests
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    invalid_requests: AtomicUsize,
    upstream_failures: AtomicUsize,
    cache_hits: AtomicUsize,

    // Extraction outcomes
    parsed_direct: AtomicUsize,
    parsed_fenced: AtomicUsize,
    parsed_brace_span: AtomicUsize,
    parse_failures: AtomicUsize,

    // Model calls (in microseconds)
    model_calls: AtomicUsize,
    failed_model_calls: AtomicUsize,
    total_model_time_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            total_requests: AtomicUsize::new(0),
            successful_requests: AtomicUsize::new(0),
            invalid_requests: AtomicUsize::new(0),
            upstream_failures: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
            parsed_direct: AtomicUsize::new(0),
            parsed_fenced: AtomicUsize::new(0),
            parsed_brace_span: AtomicUsize::new(0),
            parse_failures: AtomicUsize::new(0),
            model_calls: AtomicUsize::new(0),
            failed_model_calls: AtomicUsize::new(0),
            total_model_time_us: AtomicU64::new(0),
        })
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_request(&self) {
        self.invalid_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// `None` means the failure placeholder was returned.
    pub fn record_extraction(&self, strategy: Option<Strategy>) {
        let counter = match strategy {
            Some(Strategy::Direct) => &self.parsed_direct,
            Some(Strategy::Fenced) => &self.parsed_fenced,
            Some(Strategy::BraceSpan) => &self.parsed_brace_span,
            None => &self.parse_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_model_call(&self, duration: Duration, success: bool) {
        self.model_calls.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_model_calls.fetch_add(1, Ordering::Relaxed);
        }
        self.total_model_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            invalid_requests: self.invalid_requests.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            extraction: ExtractionCounts {
                direct: self.parsed_direct.load(Ordering::Relaxed),
                fenced: self.parsed_fenced.load(Ordering::Relaxed),
                brace_span: self.parsed_brace_span.load(Ordering::Relaxed),
                failed: self.parse_failures.load(Ordering::Relaxed),
            },
            model_calls: self.model_calls.load(Ordering::Relaxed),
            failed_model_calls: self.failed_model_calls.load(Ordering::Relaxed),
            avg_model_time_ms: self.avg_time_ms(&self.total_model_time_us, &self.model_calls),
        }
    }

    fn avg_time_ms(&self, total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
        let total = total_us.load(Ordering::Relaxed) as f64;
        let cnt = count.load(Ordering::Relaxed) as f64;
        if cnt > 0.0 {
            total / cnt / 1000.0 // Convert to ms
        } else {
            0.0
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub invalid_requests: usize,
    pub upstream_failures: usize,
    pub cache_hits: usize,
    pub extraction: ExtractionCounts,
    pub model_calls: usize,
    pub failed_model_calls: usize,
    pub avg_model_time_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct ExtractionCounts {
    pub direct: usize,
    pub fenced: usize,
    pub brace_span: usize,
    pub failed: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
