//! Chunked, retrying delivery of validated events to the internal endpoint.
//!
//! Chunks are independent: each runs its own attempt/backoff timeline on a bounded
//! worker pool, and one chunk failing never stops the others. The server upserts by
//! `(name, date)`, so resending a chunk is harmless.

pub mod retry;

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::app::ports::{SyncTransportPort, TransportResponse};
use crate::common::constants::DEFAULT_API_KEY_HEADER;
use crate::common::error::{Result, ScraperError};
use crate::domain::Event;
use crate::observability::metrics;
pub use retry::{classify_status, JitterConfig, RetryPolicy, StatusClass};

const MAX_ERROR_BODY: usize = 200;
/// Longest sync phase a config may ask for
pub const MAX_DEADLINE_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Records per request; must be at least 1
    pub chunk_size: usize,
    /// Attempts per chunk, first try included
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: JitterConfig,
    /// Chunks in flight at once
    pub concurrency: usize,
    pub request_timeout_secs: u64,
    /// Overall budget for the sync phase
    pub deadline_secs: u64,
    pub api_key_header: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: JitterConfig::default(),
            concurrency: 2,
            request_timeout_secs: 30,
            deadline_secs: 300,
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
        .with_jitter(&self.jitter)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ScraperError::Config(
                "sync.chunk_size must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ScraperError::Config(
                "sync.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ScraperError::Config(
                "sync.concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ScraperError::Config(
                "sync.max_delay_ms must not be below sync.base_delay_ms".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter.ratio) {
            return Err(ScraperError::Config(format!(
                "sync.jitter.ratio must be between 0 and 1, got {}",
                self.jitter.ratio
            )));
        }
        if self.deadline_secs == 0 || self.deadline_secs > MAX_DEADLINE_SECS {
            return Err(ScraperError::Config(format!(
                "sync.deadline_secs must be between 1 and {}, got {}",
                MAX_DEADLINE_SECS, self.deadline_secs
            )));
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("rejected by server: {message}")]
    Rejected { message: String },

    #[error("gave up after {attempts} attempts, last error: {last}")]
    RetriesExhausted { attempts: u32, last: Box<SyncError> },

    #[error("sync deadline exceeded")]
    DeadlineExceeded,
}

impl SyncError {
    /// Worth another attempt: connection failures, 5xx and 429
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Transport(_) => true,
            SyncError::Status { status, .. } => {
                classify_status(*status) == StatusClass::Transient
            }
            _ => false,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            SyncError::Transport(_) => "transport",
            SyncError::Status { .. } => "status",
            SyncError::Rejected { .. } => "rejected",
            SyncError::RetriesExhausted { .. } => "retries_exhausted",
            SyncError::DeadlineExceeded => "deadline",
        }
    }
}

/// Counts reported by the endpoint for an accepted chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub inserted: usize,
    pub updated: usize,
    pub total: usize,
}

#[derive(Deserialize)]
struct ApiResponse {
    success: Option<bool>,
    error: Option<String>,
    inserted: Option<usize>,
    updated: Option<usize>,
    total: Option<usize>,
}

/// Turn a raw endpoint response into a chunk result
pub fn interpret_response(
    response: &TransportResponse,
) -> std::result::Result<Option<SyncSummary>, SyncError> {
    if classify_status(response.status) != StatusClass::Success {
        return Err(SyncError::Status {
            status: response.status,
            body: response.body.chars().take(MAX_ERROR_BODY).collect(),
        });
    }

    let Ok(api) = serde_json::from_str::<ApiResponse>(&response.body) else {
        // Empty or non-JSON body on 2xx still counts as delivered
        return Ok(None);
    };
    if api.success == Some(false) {
        return Err(SyncError::Rejected {
            message: api
                .error
                .unwrap_or_else(|| "request rejected without a message".to_string()),
        });
    }
    if api.inserted.is_none() && api.updated.is_none() && api.total.is_none() {
        return Ok(None);
    }
    Ok(Some(SyncSummary {
        inserted: api.inserted.unwrap_or(0),
        updated: api.updated.unwrap_or(0),
        total: api.total.unwrap_or(0),
    }))
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChunkStatus {
    Delivered(Option<SyncSummary>),
    Failed(SyncError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutcome {
    /// Position of the chunk in dispatch order
    pub index: usize,
    pub records: usize,
    pub attempts: u32,
    pub status: ChunkStatus,
}

impl ChunkOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self.status, ChunkStatus::Delivered(_))
    }

    pub fn error(&self) -> Option<&SyncError> {
        match &self.status {
            ChunkStatus::Failed(err) => Some(err),
            ChunkStatus::Delivered(_) => None,
        }
    }
}

/// Per-chunk results of one sync phase, ordered by chunk index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub chunks: Vec<ChunkOutcome>,
    pub elapsed: Duration,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.chunks.iter().all(ChunkOutcome::is_delivered)
    }

    pub fn failed_chunks(&self) -> Vec<&ChunkOutcome> {
        self.chunks.iter().filter(|c| !c.is_delivered()).collect()
    }

    pub fn delivered_records(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.is_delivered())
            .map(|c| c.records)
            .sum()
    }

    pub fn total_attempts(&self) -> u32 {
        self.chunks.iter().map(|c| c.attempts).sum()
    }
}

pub struct SyncClient {
    transport: Arc<dyn SyncTransportPort>,
    policy: Arc<RetryPolicy>,
    chunk_size: usize,
    concurrency: usize,
    deadline: Duration,
}

impl SyncClient {
    pub fn new(transport: Arc<dyn SyncTransportPort>, config: &SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            policy: Arc::new(config.retry_policy()),
            chunk_size: config.chunk_size,
            concurrency: config.concurrency,
            deadline: Duration::from_secs(config.deadline_secs),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Deliver `events` within the configured deadline
    pub async fn sync(&self, events: &[Event]) -> SyncReport {
        let now = Instant::now();
        let deadline = now
            .checked_add(self.deadline)
            .unwrap_or_else(|| now + Duration::from_secs(MAX_DEADLINE_SECS));
        self.sync_until(events, deadline).await
    }

    /// Deliver `events`, aborting whatever is still outstanding at `deadline`
    #[instrument(skip_all, fields(events = events.len(), chunk_size = self.chunk_size))]
    pub async fn sync_until(&self, events: &[Event], deadline: Instant) -> SyncReport {
        let started = std::time::Instant::now();
        let chunks: Vec<Vec<Event>> = events.chunks(self.chunk_size).map(<[Event]>::to_vec).collect();
        if chunks.is_empty() {
            info!("No events to sync");
            return SyncReport::default();
        }
        info!(
            "🚀 Syncing {} events in {} chunks (max {} in flight)",
            events.len(),
            chunks.len(),
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut workers = JoinSet::new();
        let mut attempt_counters = Vec::with_capacity(chunks.len());
        let mut chunk_sizes = Vec::with_capacity(chunks.len());

        for (index, chunk) in chunks.into_iter().enumerate() {
            let attempts = Arc::new(AtomicU32::new(0));
            attempt_counters.push(Arc::clone(&attempts));
            chunk_sizes.push(chunk.len());

            let transport = Arc::clone(&self.transport);
            let policy = Arc::clone(&self.policy);
            let semaphore = Arc::clone(&semaphore);
            workers.spawn(async move {
                let status = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        deliver_chunk(index, &chunk, transport.as_ref(), &policy, &attempts).await
                    }
                    Err(_) => ChunkStatus::Failed(SyncError::Transport(
                        "sync worker pool closed".to_string(),
                    )),
                };
                (index, status)
            });
        }

        let mut statuses: Vec<Option<ChunkStatus>> = (0..chunk_sizes.len()).map(|_| None).collect();
        let drained = tokio::time::timeout_at(deadline, async {
            while let Some(joined) = workers.join_next().await {
                match joined {
                    Ok((index, status)) => statuses[index] = Some(status),
                    Err(e) => error!("Sync worker terminated: {}", e),
                }
            }
        })
        .await;

        let deadline_hit = drained.is_err();
        if deadline_hit {
            warn!(
                "⏰ Sync deadline reached, aborting {} outstanding chunks",
                workers.len()
            );
            workers.abort_all();
            // Chunks that finished just before the abort still count as delivered
            while let Some(joined) = workers.join_next().await {
                if let Ok((index, status)) = joined {
                    statuses[index] = Some(status);
                }
            }
        }

        let chunks: Vec<ChunkOutcome> = statuses
            .into_iter()
            .enumerate()
            .map(|(index, status)| {
                let status = status.unwrap_or_else(|| {
                    let err = if deadline_hit {
                        SyncError::DeadlineExceeded
                    } else {
                        SyncError::Transport("sync worker terminated unexpectedly".to_string())
                    };
                    metrics::sync::chunk_failed(err.kind());
                    ChunkStatus::Failed(err)
                });
                ChunkOutcome {
                    index,
                    records: chunk_sizes[index],
                    attempts: attempt_counters[index].load(Ordering::SeqCst),
                    status,
                }
            })
            .collect();

        let report = SyncReport {
            chunks,
            elapsed: started.elapsed(),
        };
        metrics::sync::duration(report.elapsed.as_secs_f64());

        if report.is_success() {
            info!(
                "✅ Synced {} records in {} chunks ({} attempts)",
                report.delivered_records(),
                report.chunks.len(),
                report.total_attempts()
            );
        } else {
            for failed in report.failed_chunks() {
                if let Some(err) = failed.error() {
                    error!(
                        "❌ Chunk {} ({} records) failed after {} attempts: {}",
                        failed.index, failed.records, failed.attempts, err
                    );
                }
            }
        }
        report
    }
}

/// Attempt one chunk until delivered, permanently failed, or out of attempts
#[instrument(skip(chunk, transport, policy, attempts), fields(records = chunk.len()))]
async fn deliver_chunk(
    index: usize,
    chunk: &[Event],
    transport: &dyn SyncTransportPort,
    policy: &RetryPolicy,
    attempts: &AtomicU32,
) -> ChunkStatus {
    loop {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::sync::attempt_made();

        let result = match transport.post_chunk(chunk).await {
            Ok(response) => interpret_response(&response),
            Err(e) => Err(SyncError::Transport(e)),
        };

        match result {
            Ok(summary) => {
                metrics::sync::chunk_delivered(chunk.len());
                debug!("Chunk {} delivered on attempt {}", index, attempt);
                return ChunkStatus::Delivered(summary);
            }
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                metrics::sync::retry_scheduled();
                warn!(
                    "⚠️ Chunk {} attempt {}/{} failed: {}; retrying in {:?}",
                    index, attempt, policy.max_attempts, err, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) if err.is_transient() => {
                let err = SyncError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                };
                metrics::sync::chunk_failed(err.kind());
                return ChunkStatus::Failed(err);
            }
            Err(err) => {
                metrics::sync::chunk_failed(err.kind());
                return ChunkStatus::Failed(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Replays scripted responses per chunk, keyed by the chunk's first event name
    #[derive(Default)]
    struct ScriptedTransport {
        scripts: Mutex<HashMap<String, VecDeque<std::result::Result<TransportResponse, String>>>>,
        delay: Option<Duration>,
    }

    impl ScriptedTransport {
        fn script(self, first_name: &str, responses: Vec<std::result::Result<TransportResponse, String>>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(first_name.to_string(), responses.into());
            self
        }
    }

    #[async_trait]
    impl SyncTransportPort for ScriptedTransport {
        async fn post_chunk(&self, events: &[Event]) -> std::result::Result<TransportResponse, String> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let key = events.first().map(|e| e.name.clone()).unwrap_or_default();
            self.scripts
                .lock()
                .unwrap()
                .get_mut(&key)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Ok(TransportResponse::new(200, r#"{"success":true}"#)))
        }
    }

    /// Accepts every chunk after a pause and records the peak number of overlapping calls
    #[derive(Default)]
    struct CountingTransport {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl SyncTransportPort for CountingTransport {
        async fn post_chunk(&self, _events: &[Event]) -> std::result::Result<TransportResponse, String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(TransportResponse::new(200, r#"{"success":true}"#))
        }
    }

    fn events(n: usize) -> Vec<Event> {
        (0..n)
            .map(|i| Event {
                name: format!("Run {i}"),
                date: "2026-11-08".to_string(),
                registration_url: "https://example.com".to_string(),
                ..Default::default()
            })
            .collect()
    }

    fn client(transport: ScriptedTransport, chunk_size: usize) -> SyncClient {
        let config = SyncConfig {
            chunk_size,
            ..SyncConfig::default()
        };
        SyncClient::new(Arc::new(transport), &config)
            .unwrap()
            .with_policy(
                RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5))
                    .with_jitter(&JitterConfig::disabled()),
            )
    }

    #[tokio::test]
    async fn test_chunks_in_flight_never_exceed_concurrency() {
        let transport = Arc::new(CountingTransport::default());
        let config = SyncConfig {
            chunk_size: 1,
            concurrency: 2,
            ..SyncConfig::default()
        };
        let client = SyncClient::new(transport.clone(), &config).unwrap();
        let report = client.sync(&events(6)).await;
        assert!(report.is_success());
        assert_eq!(report.chunks.len(), 6);
        assert_eq!(transport.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_deadline_still_reports_every_chunk() {
        let transport = ScriptedTransport::default();
        let client = client(transport, 1);
        // Each chunk is either delivered or timed out, never lost to the abort
        let report = client.sync_until(&events(2), Instant::now()).await;
        assert_eq!(report.chunks.len(), 2);
        assert!(report
            .chunks
            .iter()
            .all(|c| c.is_delivered() || c.error() == Some(&SyncError::DeadlineExceeded)));
        assert!(report.chunks.iter().all(|c| c.attempts <= 1));
    }

    #[tokio::test]
    async fn test_503_then_200_succeeds_on_second_attempt() {
        let transport = ScriptedTransport::default().script(
            "Run 0",
            vec![
                Ok(TransportResponse::new(503, "unavailable")),
                Ok(TransportResponse::new(200, r#"{"success":true}"#)),
            ],
        );
        let report = client(transport, 50).sync(&events(3)).await;
        assert!(report.is_success());
        assert_eq!(report.chunks.len(), 1);
        assert_eq!(report.chunks[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_404_fails_immediately_without_retry() {
        let transport = ScriptedTransport::default()
            .script("Run 0", vec![Ok(TransportResponse::new(404, "not found"))]);
        let report = client(transport, 50).sync(&events(3)).await;
        assert!(!report.is_success());
        assert_eq!(report.chunks[0].attempts, 1);
        assert!(matches!(
            report.chunks[0].error(),
            Some(SyncError::Status { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_transient_failures_exhaust_attempts() {
        let transport = ScriptedTransport::default().script(
            "Run 0",
            vec![
                Err("connection refused".to_string()),
                Ok(TransportResponse::new(502, "")),
                Ok(TransportResponse::new(429, "")),
            ],
        );
        let report = client(transport, 50).sync(&events(1)).await;
        assert_eq!(report.chunks[0].attempts, 3);
        match report.chunks[0].error() {
            Some(SyncError::RetriesExhausted { attempts, last }) => {
                assert_eq!(*attempts, 3);
                assert!(matches!(**last, SyncError::Status { status: 429, .. }));
            }
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_chunk_does_not_block_others() {
        let transport = ScriptedTransport::default()
            .script("Run 2", vec![Ok(TransportResponse::new(400, "bad chunk"))]);
        let report = client(transport, 2).sync(&events(5)).await;
        assert_eq!(report.chunks.len(), 3);
        assert!(report.chunks[0].is_delivered());
        assert!(!report.chunks[1].is_delivered());
        assert!(report.chunks[2].is_delivered());
        assert_eq!(report.delivered_records(), 3);
        assert_eq!(report.failed_chunks().len(), 1);
    }

    #[tokio::test]
    async fn test_success_false_is_permanent_rejection() {
        let transport = ScriptedTransport::default().script(
            "Run 0",
            vec![Ok(TransportResponse::new(
                200,
                r#"{"success":false,"error":"invalid payload"}"#,
            ))],
        );
        let report = client(transport, 50).sync(&events(2)).await;
        assert_eq!(report.chunks[0].attempts, 1);
        assert_eq!(
            report.chunks[0].error(),
            Some(&SyncError::Rejected {
                message: "invalid payload".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_deadline_aborts_outstanding_chunks() {
        let transport = ScriptedTransport {
            delay: Some(Duration::from_millis(500)),
            ..Default::default()
        };
        let client = client(transport, 1);
        let report = client
            .sync_until(&events(2), Instant::now() + Duration::from_millis(50))
            .await;
        assert_eq!(report.chunks.len(), 2);
        assert!(report
            .chunks
            .iter()
            .all(|c| c.error() == Some(&SyncError::DeadlineExceeded)));
        assert!(report.chunks.iter().all(|c| c.attempts <= 1));
    }

    #[tokio::test]
    async fn test_empty_payload_sends_nothing() {
        let report = client(ScriptedTransport::default(), 50).sync(&[]).await;
        assert!(report.is_success());
        assert!(report.chunks.is_empty());
    }

    #[test]
    fn test_interpret_response_summary() {
        let ok = TransportResponse::new(200, r#"{"success":true,"inserted":3,"updated":1,"total":4}"#);
        assert_eq!(
            interpret_response(&ok),
            Ok(Some(SyncSummary {
                inserted: 3,
                updated: 1,
                total: 4
            }))
        );
        assert_eq!(interpret_response(&TransportResponse::new(204, "")), Ok(None));
        assert!(interpret_response(&TransportResponse::new(401, "unauthorized"))
            .is_err_and(|e| !e.is_transient()));
    }

    #[test]
    fn test_config_rejects_bad_jitter_ratio() {
        for ratio in [f64::INFINITY, f64::NAN, -0.1, 1.5] {
            let config = SyncConfig {
                jitter: JitterConfig { ratio, seed: None },
                ..SyncConfig::default()
            };
            assert!(config.validate().is_err(), "ratio {ratio} accepted");
        }
    }

    #[test]
    fn test_config_rejects_out_of_range_deadline() {
        for deadline_secs in [0, MAX_DEADLINE_SECS + 1, i64::MAX as u64] {
            let config = SyncConfig {
                deadline_secs,
                ..SyncConfig::default()
            };
            assert!(config.validate().is_err());
        }
        let config = SyncConfig {
            deadline_secs: MAX_DEADLINE_SECS,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_zero_chunk_size() {
        let config = SyncConfig {
            chunk_size: 0,
            ..SyncConfig::default()
        };
        assert!(SyncClient::new(Arc::new(ScriptedTransport::default()), &config).is_err());
    }
}
