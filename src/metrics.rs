use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Thread-safe counters describing request and generation activity.
///
/// Processing time is accumulated in microseconds so every counter stays an atomic integer;
/// the snapshot converts back to seconds.
#[derive(Default)]
pub struct RequestMetrics {
    total_requests: AtomicU64,
    total_success_requests: AtomicU64,
    total_failed_requests: AtomicU64,
    total_process_micros: AtomicU64,
    ingest_requests: AtomicU64,
    generate_requests: AtomicU64,
    total_tokens_used: AtomicU64,
}

impl RequestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished request. Successful means the response status was below 400.
    pub fn record_request(&self, success: bool, elapsed: Duration) {
        self.start_request();
        self.finish_request(success, elapsed);
    }

    /// Count a request as soon as it arrives, so `/stats` includes itself.
    pub fn start_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Classify a request counted by [`RequestMetrics::start_request`] and add its duration.
    pub fn finish_request(&self, success: bool, elapsed: Duration) {
        if success {
            self.total_success_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_process_micros
            .fetch_add(micros, Ordering::Relaxed);
    }

    /// Count an ingestion request, whether or not it succeeds.
    pub fn record_ingest(&self) {
        self.ingest_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a generation request, whether or not it succeeds.
    pub fn record_generate(&self) {
        self.generate_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Add the token count of a successful generation.
    pub fn add_tokens(&self, tokens: u64) {
        self.total_tokens_used
            .fetch_add(tokens, Ordering::Relaxed);
    }

    /// Time an operation that does not pass through the HTTP layer and record its outcome.
    pub async fn track<F, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let result = operation.await;
        self.record_request(result.is_ok(), started.elapsed());
        result
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_process_time =
            self.total_process_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let average_process_time = if total_requests == 0 {
            0.0
        } else {
            round4(total_process_time / total_requests as f64)
        };

        MetricsSnapshot {
            total_requests,
            total_success_requests: self.total_success_requests.load(Ordering::Relaxed),
            total_failed_requests: self.total_failed_requests.load(Ordering::Relaxed),
            average_process_time,
            ingest_requests: self.ingest_requests.load(Ordering::Relaxed),
            generate_requests: self.generate_requests.load(Ordering::Relaxed),
            total_tokens_used: self.total_tokens_used.load(Ordering::Relaxed),
            total_process_time,
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Immutable view of the request counters, serialized as the `/stats` body.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Requests observed since startup.
    pub total_requests: u64,
    /// Requests that finished with a status below 400.
    pub total_success_requests: u64,
    /// Requests that finished with a status of 400 or above.
    pub total_failed_requests: u64,
    /// Mean processing time per request in seconds, rounded to four decimals.
    pub average_process_time: f64,
    /// Ingestion requests received.
    pub ingest_requests: u64,
    /// Generation requests received.
    pub generate_requests: u64,
    /// Tokens counted across successful generations.
    pub total_tokens_used: u64,
    /// Accumulated processing time in seconds.
    #[serde(skip)]
    pub total_process_time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn empty_snapshot_has_zero_average() {
        let snapshot = RequestMetrics::new().snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.average_process_time, 0.0);
    }

    #[test]
    fn records_success_and_failure() {
        let metrics = RequestMetrics::new();
        metrics.record_request(true, Duration::from_millis(100));
        metrics.record_request(false, Duration::from_millis(300));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.total_success_requests, 1);
        assert_eq!(snapshot.total_failed_requests, 1);
        assert!((snapshot.total_process_time - 0.4).abs() < 1e-9);
        assert_eq!(snapshot.average_process_time, 0.2);
    }

    #[test]
    fn average_is_rounded_to_four_decimals() {
        let metrics = RequestMetrics::new();
        metrics.record_request(true, Duration::from_micros(123_456));
        metrics.record_request(true, Duration::from_micros(1));
        metrics.record_request(true, Duration::from_micros(1));
        assert_eq!(metrics.snapshot().average_process_time, 0.0412);
    }

    #[test]
    fn endpoint_counters_and_tokens_accumulate() {
        let metrics = RequestMetrics::new();
        metrics.record_ingest();
        metrics.record_generate();
        metrics.record_generate();
        metrics.add_tokens(12);
        metrics.add_tokens(30);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ingest_requests, 1);
        assert_eq!(snapshot.generate_requests, 2);
        assert_eq!(snapshot.total_tokens_used, 42);
    }

    #[tokio::test]
    async fn track_records_outcome_of_operation() {
        let metrics = RequestMetrics::new();
        let ok: Result<u8, &str> = metrics.track(async { Ok(1) }).await;
        let err: Result<u8, &str> = metrics.track(async { Err("boom") }).await;
        assert!(ok.is_ok());
        assert!(err.is_err());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_success_requests, 1);
        assert_eq!(snapshot.total_failed_requests, 1);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let metrics = Arc::new(RequestMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        metrics.record_request(true, Duration::from_micros(10));
                        metrics.add_tokens(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread panicked");
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 8_000);
        assert_eq!(snapshot.total_success_requests, 8_000);
        assert_eq!(snapshot.total_tokens_used, 8_000);
    }
}
