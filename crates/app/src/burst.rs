//! Timed replay of a single command frame.
//!
//! Some controllers only accept relative step commands, which must be
//! replayed at a fixed cadence for a fixed window to get through a lossy
//! bus. At most one burst runs per key: starting a new one cancels the
//! previous job and waits for it to wind down before the first frame goes
//! out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use rvc_domain::time::{Timestamp, now};

use crate::codec::OutboundMessage;
use crate::config::BurstConfig;
use crate::ports::CommandPublisher;

/// Cadence of one burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstTiming {
    pub interval: Duration,
    pub duration: Duration,
}

impl From<&BurstConfig> for BurstTiming {
    fn from(config: &BurstConfig) -> Self {
        Self {
            interval: config.interval(),
            duration: config.duration(),
        }
    }
}

/// How a burst ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstOutcome {
    /// Frames accepted by the transport.
    pub sent: u32,
    pub cancelled: bool,
}

/// Awaitable completion of a burst job.
#[derive(Debug)]
pub struct BurstHandle {
    outcome: oneshot::Receiver<BurstOutcome>,
}

impl BurstHandle {
    /// Wait for the burst to finish.
    ///
    /// A job aborted before it could report counts as cancelled.
    pub async fn finished(self) -> BurstOutcome {
        self.outcome.await.unwrap_or(BurstOutcome {
            sent: 0,
            cancelled: true,
        })
    }
}

struct Job {
    id: u64,
    token: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Jobs {
    next_id: AtomicU64,
    closed: AtomicBool,
    running: Mutex<HashMap<String, Job>>,
}

impl Jobs {
    fn finish(&self, key: &str, id: u64) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.get(key).is_some_and(|job| job.id == id) {
            running.remove(key);
        }
    }
}

/// Runs burst jobs, one per key.
#[derive(Clone, Default)]
pub struct BurstScheduler {
    jobs: Arc<Jobs>,
}

impl BurstScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a burst for `key`, superseding any burst already running for it.
    ///
    /// `frame` builds the message for each transmission so every frame
    /// carries a fresh timestamp.
    pub fn start<P, F>(&self, key: impl Into<String>, publisher: P, timing: BurstTiming, frame: F) -> BurstHandle
    where
        P: CommandPublisher + Send + Sync + 'static,
        F: Fn(Timestamp) -> OutboundMessage + Send + Sync + 'static,
    {
        let key = key.into();
        let id = self.jobs.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        // held across spawn and insert so the job cannot finish before it is
        // registered
        let mut running = self.jobs.running.lock().unwrap_or_else(PoisonError::into_inner);
        if self.jobs.closed.load(Ordering::Acquire) {
            tracing::debug!(key = %key, "scheduler closed, burst not started");
            let _ = tx.send(BurstOutcome {
                sent: 0,
                cancelled: true,
            });
            return BurstHandle { outcome: rx };
        }
        let previous = running.remove(&key);
        if let Some(previous) = &previous {
            tracing::debug!(key = %key, "cancelling previous burst");
            previous.token.cancel();
        }

        let jobs = Arc::clone(&self.jobs);
        let job_token = token.clone();
        let job_key = key.clone();
        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.task.await;
            }
            tracing::info!(key = %job_key, ?timing, "burst started");
            let outcome = run(&publisher, &frame, timing, &job_token).await;
            if outcome.cancelled {
                tracing::debug!(key = %job_key, sent = outcome.sent, "burst cancelled");
            } else {
                tracing::info!(key = %job_key, sent = outcome.sent, "burst finished");
            }
            jobs.finish(&job_key, id);
            let _ = tx.send(outcome);
        });
        running.insert(key, Job { id, token, task });

        BurstHandle { outcome: rx }
    }

    /// Whether a burst is currently running for `key`.
    #[must_use]
    pub fn is_running(&self, key: &str) -> bool {
        self.jobs
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Cancel every running burst and wait until none can publish again.
    pub async fn cancel_all(&self) {
        self.drain(false).await;
    }

    /// Cancel every running burst and refuse new ones from now on.
    pub async fn close(&self) {
        self.drain(true).await;
    }

    async fn drain(&self, close: bool) {
        let jobs: Vec<Job> = {
            let mut running = self.jobs.running.lock().unwrap_or_else(PoisonError::into_inner);
            if close {
                self.jobs.closed.store(true, Ordering::Release);
            }
            running.drain().map(|(_, job)| job).collect()
        };
        for job in &jobs {
            job.token.cancel();
        }
        for job in jobs {
            let _ = job.task.await;
        }
    }
}

async fn run<P, F>(publisher: &P, frame: &F, timing: BurstTiming, token: &CancellationToken) -> BurstOutcome
where
    P: CommandPublisher,
    F: Fn(Timestamp) -> OutboundMessage,
{
    let started = Instant::now();
    let mut sent = 0;
    while started.elapsed() < timing.duration {
        if token.is_cancelled() {
            return BurstOutcome { sent, cancelled: true };
        }
        let message = frame(now());
        match publisher.publish(message).await {
            Ok(()) => sent += 1,
            Err(error) => tracing::warn!(%error, "burst frame not published"),
        }
        tokio::select! {
            biased;
            () = token.cancelled() => return BurstOutcome { sent, cancelled: true },
            () = tokio::time::sleep(timing.interval) => {}
        }
    }
    BurstOutcome { sent, cancelled: false }
}
