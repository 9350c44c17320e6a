//! The Harness Orchestrator: the one place that owns the worker cohort's
//! lifetime, end to end.
//!
//! `Harness::run` spawns the configured worker count plus one ingress
//! registration into a `JoinSet`, all under a root `CancellationToken`.
//! Processors may register further sibling tasks through the
//! `HarnessContext` they're invoked with; those join the same set. A
//! worker's own recoverable failures (a bad claim, a failed process call)
//! are handled inside the worker loop and never reach this layer — only a
//! sibling task panicking or returning `Err` is treated as a fatal
//! orchestration failure here, since every other failure mode already has
//! a designed-in recovery path (lease expiry, sweep, retry).

use std::sync::Arc;

use mh_chat::ChatTransport;
use mh_config::HarnessConfig;
use mh_ingress::IngressAdapter;
use mh_trigger::TriggerChannel;
use mh_worker::{EventProcessor, HarnessContext, SpawnHandle, Worker, WorkerConfig};
use sqlx::PgPool;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub mod health;

pub struct Harness {
    config: HarnessConfig,
    pool: PgPool,
    chat: Arc<dyn ChatTransport>,
    processor: Arc<dyn EventProcessor>,
    trigger: TriggerChannel,
    ingress: Arc<IngressAdapter>,
}

impl Harness {
    pub fn new(
        config: HarnessConfig,
        pool: PgPool,
        chat: Arc<dyn ChatTransport>,
        processor: Arc<dyn EventProcessor>,
    ) -> Self {
        let trigger = TriggerChannel::new(config.worker.worker_count as usize);
        let ingress = Arc::new(IngressAdapter::new(pool.clone(), trigger.clone(), chat.clone()));
        Self { config, pool, chat, processor, trigger, ingress }
    }

    /// The adapter the embedding application calls from its own platform
    /// event callback (socket/webhook handler). Not driven by this crate
    /// directly — the harness core has no opinion on how mentions arrive.
    pub fn ingress(&self) -> Arc<IngressAdapter> {
        self.ingress.clone()
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        mh_store::migrate(&self.pool).await?;
        Ok(())
    }

    /// Run the worker cohort, plus the ingress registration, as sibling
    /// tasks under `shutdown` — the "*N* workers and one ingress listener
    /// run as sibling tasks" structured-concurrency scope (spec.md §4.5).
    /// Any sibling failing (a panic, or a processor registering a sibling
    /// task of its own that returns `Err`) cancels the rest and the error
    /// is surfaced to the caller; a worker's own recoverable failures (a
    /// bad claim, a failed process call) are handled inside the worker
    /// loop and never reach this layer.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let (spawner, mut spawned) = SpawnHandle::new();
        let context = HarnessContext::new(self.pool.clone(), self.chat.clone(), spawner);

        let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

        for worker_id in 0..self.config.worker.worker_count {
            let worker_config = WorkerConfig {
                worker_id,
                base_sleep: self.config.worker.base_sleep,
                min_jitter: self.config.worker.min_jitter,
                max_jitter: self.config.worker.max_jitter,
                max_attempts: self.config.worker.max_attempts,
                lease_duration: self.config.worker.lease_duration,
                max_age: self.config.worker.max_age,
                batch_cap: self.config.worker.batch_cap,
            };
            let worker = Worker::new(worker_config, self.trigger.clone(), self.processor.clone(), context.clone());
            let worker_shutdown = shutdown.clone();
            tasks.spawn(async move {
                worker.run(worker_shutdown).await;
                Ok(())
            });
        }

        // The platform's real-time listener lives in the embedding
        // application (spec.md §1 non-goal); this sibling just keeps the
        // ingress adapter's registration inside the same scope, so it
        // participates in the scope's failure-propagation and cancellation
        // contract even though it never fails on its own.
        {
            let ingress = self.ingress.clone();
            let ingress_shutdown = shutdown.clone();
            tasks.spawn(async move {
                ingress_shutdown.cancelled().await;
                drop(ingress);
                Ok(())
            });
        }

        loop {
            tokio::select! {
                task = spawned.recv() => {
                    if let Some(task) = task {
                        tasks.spawn(task);
                    }
                }
                joined = tasks.join_next() => {
                    match joined {
                        None => break,
                        Some(Ok(Ok(()))) => {}
                        Some(Ok(Err(e))) => {
                            tracing::error!(error = %e, "a sibling task failed; cancelling the cohort");
                            shutdown.cancel();
                            tasks.abort_all();
                            return Err(e);
                        }
                        Some(Err(join_err)) => {
                            tracing::error!(error = %join_err, "a sibling task panicked; cancelling the cohort");
                            shutdown.cancel();
                            tasks.abort_all();
                            return Err(anyhow::anyhow!("sibling task panicked: {join_err}"));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

/// A processor that does nothing. Used by the standalone binary for
/// manual smoke-testing; any real deployment supplies its own
/// `EventProcessor` wired to the actual bot logic.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProcessor;

#[async_trait::async_trait]
impl EventProcessor for NoopProcessor {
    async fn process(&self, event: &mh_schemas::Event, _context: &HarnessContext) -> anyhow::Result<()> {
        tracing::info!(event_id = %event.id, kind = %event.kind, "noop processor: event acknowledged, no action taken");
        Ok(())
    }
}
