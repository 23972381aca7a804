use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use prometheus::{IntCounterVec, IntGaugeVec};
use relayer_base::{
    db::{Job, JobState, RelayerDb},
    CoreMetrics,
};
use relayer_core::{now_millis, vaa::Vaa, vaa::VaaId, RelayerError};
use tokio::{
    sync::{broadcast, Notify},
    task::JoinHandle,
};
use tracing::{debug, error, info, info_span, instrument, trace, warn, Instrument};

use crate::settings::QueueConf;

/// How long an idle worker sleeps before looking for due retries again.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Delay between pruning and gauge refresh passes.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

/// Something worth telling observers of the queue about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueEvent {
    /// A new job was stored
    Added(String),
    /// A job was relayed
    Completed {
        /// Job id
        id: String,
        /// Redeeming transaction, if one was sent
        tx_id: Option<String>,
    },
    /// A job ran out of attempts or failed for good
    Failed {
        /// Job id
        id: String,
        /// Error of the last attempt
        error: String,
    },
}

/// The work a queue worker does for each job. `Ok(Some(tx_id))` completes
/// the job with a transaction id, `Ok(None)` completes it without one.
#[async_trait]
pub trait JobHandler: Send + Sync + Debug {
    /// Process one attempt of `job`.
    async fn handle(&self, job: Job) -> Result<Option<String>>;
}

#[derive(Clone, Debug)]
struct QueueMetrics {
    queue_length: IntGaugeVec,
    processed: IntCounterVec,
}

impl QueueMetrics {
    fn new(metrics: &CoreMetrics) -> Self {
        Self {
            queue_length: metrics.job_queue_length(),
            processed: metrics.jobs_processed_count(),
        }
    }
}

/// Durable job queue backed by the relayer database. Cheap to clone; all
/// clones share the same store, event channel and wake-up signal.
#[derive(Clone, Debug)]
pub struct JobQueue {
    db: RelayerDb,
    conf: QueueConf,
    events: broadcast::Sender<QueueEvent>,
    wake: Arc<Notify>,
    metrics: QueueMetrics,
}

impl JobQueue {
    /// Create a queue publishing its lifecycle events on `events`.
    pub fn new(
        db: RelayerDb,
        conf: QueueConf,
        events: broadcast::Sender<QueueEvent>,
        metrics: &CoreMetrics,
    ) -> Self {
        Self {
            db,
            conf,
            events,
            wake: Arc::new(Notify::new()),
            metrics: QueueMetrics::new(metrics),
        }
    }

    /// The underlying store.
    pub fn db(&self) -> &RelayerDb {
        &self.db
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: QueueEvent) {
        if self.events.send(event).is_err() {
            trace!("No queue event subscribers");
        }
    }

    /// Store a job for `vaa_bytes` unless one with the same id exists or is
    /// still retained. Returns `None` for such duplicates.
    #[instrument(skip_all, err)]
    pub fn add_vaa_to_queue(&self, vaa_bytes: Vec<u8>) -> Result<Option<Job>> {
        let vaa = Vaa::decode(&vaa_bytes).map_err(RelayerError::from)?;
        let job = Job::new(vaa.id(), vaa_bytes, self.conf.max_attempts, now_millis());
        if !self.db.insert_job(&job)? {
            debug!(id = job.id, "Job already queued");
            return Ok(None);
        }
        info!(id = job.id, "Queued VAA");
        self.emit(QueueEvent::Added(job.id.clone()));
        self.wake.notify_one();
        Ok(Some(job))
    }

    /// Transaction id of a completed relay of `id`.
    pub fn get_tx_id(&self, id: &VaaId) -> Result<Option<String>> {
        Ok(self.db.retrieve_tx_id(id)?)
    }

    /// Return jobs a previous run left active to the waiting set. Call before
    /// [`JobQueue::start_workers`].
    pub fn recover_interrupted(&self) -> Result<usize> {
        let requeued = self.db.requeue_active_jobs(now_millis())?;
        if requeued > 0 {
            info!(requeued, "Requeued jobs interrupted by a previous shutdown");
        }
        Ok(requeued)
    }

    /// Start the fixed-size worker pool.
    pub fn start_workers(&self, handler: Arc<dyn JobHandler>) -> Vec<JoinHandle<()>> {
        (0..self.conf.workers)
            .map(|worker| {
                let queue = self.clone();
                let handler = handler.clone();
                tokio::spawn(
                    async move { queue.work(handler).await }
                        .instrument(info_span!("QueueWorker", worker)),
                )
            })
            .collect()
    }

    async fn work(self, handler: Arc<dyn JobHandler>) {
        loop {
            let job = match self.db.claim_due_job(now_millis()) {
                Ok(job) => job,
                Err(err) => {
                    warn!(?err, "Failed to claim a job");
                    None
                }
            };
            match job {
                Some(job) => {
                    let id = job.id.clone();
                    if let Err(err) = self.process(job, handler.as_ref()).await {
                        error!(?err, id, "Failed to record the outcome of a job");
                    }
                }
                None => {
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {}
                    }
                }
            }
        }
    }

    #[instrument(skip_all, fields(id = %job.id, attempt = job.attempts))]
    async fn process(&self, job: Job, handler: &dyn JobHandler) -> Result<()> {
        let result = handler.handle(job.clone()).await;
        let now = now_millis();
        match result {
            Ok(tx_id) => {
                self.db.complete_job(&job.id, tx_id.clone(), now)?;
                self.metrics.processed.with_label_values(&["completed"]).inc();
                info!(?tx_id, "Job completed");
                self.emit(QueueEvent::Completed { id: job.id, tx_id });
            }
            Err(err) if RelayerError::is_report_retryable(&err) && job.has_attempts_left() => {
                let delay = self.backoff(job.attempts);
                let run_at = now.saturating_add(delay.as_millis() as u64);
                self.db.retry_job(&job.id, format!("{err:#}"), run_at)?;
                self.metrics.processed.with_label_values(&["retried"]).inc();
                warn!(error = %format!("{err:#}"), ?delay, "Job attempt failed, retrying");
            }
            Err(err) => {
                let error = format!("{err:#}");
                self.db.fail_job(&job.id, error.clone(), now)?;
                self.metrics.processed.with_label_values(&["failed"]).inc();
                error!(error, attempts = job.attempts, "Job failed");
                self.emit(QueueEvent::Failed { id: job.id, error });
            }
        }
        Ok(())
    }

    /// Delay after the `attempts`-th failed attempt.
    fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        self.conf.backoff.saturating_mul(1 << exponent)
    }

    /// Periodically prune finished jobs past retention and expired fetch
    /// markers, then refresh the queue gauges.
    pub fn spawn_maintenance(&self) -> JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(
            async move {
                loop {
                    if let Err(err) = queue.maintain() {
                        warn!(?err, "Queue maintenance failed");
                    }
                    tokio::time::sleep(MAINTENANCE_INTERVAL).await;
                }
            }
            .instrument(info_span!("QueueMaintenance")),
        )
    }

    fn maintain(&self) -> Result<()> {
        let now = now_millis();
        let cutoff = now.saturating_sub(self.conf.retention.as_millis() as u64);
        let pruned = self
            .db
            .prune_finished_jobs(cutoff)
            .wrap_err("pruning finished jobs")?;
        if pruned > 0 {
            debug!(pruned, "Pruned finished jobs");
        }
        let markers = self
            .db
            .prune_expired_markers(now)
            .wrap_err("pruning in-progress markers")?;
        if markers > 0 {
            debug!(markers, "Pruned expired in-progress markers");
        }
        for (state, count) in self.db.job_counts()? {
            self.metrics
                .queue_length
                .with_label_values(&[&state.to_string()])
                .set(count as i64);
        }
        Ok(())
    }

    /// Number of jobs in `state`.
    pub fn count(&self, state: JobState) -> Result<usize> {
        Ok(self.db.job_counts()?.get(&state).copied().unwrap_or_default())
    }
}
