//! Job orchestrator: the entry point for submitting and driving jobs.
//!
//! Triggers are checked and applied atomically in the registry; each accepted
//! trigger spawns exactly one tracked worker with its own cancellable
//! deadline. Observers attach through the broadcaster.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};
use uuid::Uuid;

use extracta_core::events::messages;
use extracta_core::{Error, Job, ProgressEvent, Result, Stage, TriggerOutcome};

use crate::broadcaster::{ProgressBroadcaster, Subscription};
use crate::config::{OrchestratorConfig, ReaperConfig};
use crate::handler::StageAdapter;
use crate::reaper::Reaper;
use crate::registry::JobRegistry;
use crate::worker::StageWorker;

/// Owns the registry, broadcaster, adapters and every in-flight worker.
pub struct JobOrchestrator {
    registry: Arc<JobRegistry>,
    broadcaster: ProgressBroadcaster,
    extractor: Arc<dyn StageAdapter>,
    transcriber: Arc<dyn StageAdapter>,
    config: OrchestratorConfig,
    tracker: TaskTracker,
    in_flight: Arc<watch::Sender<usize>>,
    shutdown: CancellationToken,
}

/// Counts one running worker for as long as it lives.
struct InFlight(Arc<watch::Sender<usize>>);

impl InFlight {
    fn enter(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl JobOrchestrator {
    /// Create an orchestrator driving the given adapters.
    ///
    /// Fails if an adapter is registered for the wrong stage.
    pub fn new(
        config: OrchestratorConfig,
        extractor: Arc<dyn StageAdapter>,
        transcriber: Arc<dyn StageAdapter>,
    ) -> Result<Self> {
        for (adapter, expected) in [
            (&extractor, Stage::Extraction),
            (&transcriber, Stage::Transcription),
        ] {
            if adapter.stage() != expected {
                return Err(Error::Config(format!(
                    "adapter {} handles {}, expected {expected}",
                    adapter.name(),
                    adapter.stage()
                )));
            }
        }

        Ok(Self {
            registry: Arc::new(JobRegistry::with_ttl(config.job_ttl)),
            broadcaster: ProgressBroadcaster::new(config.subscriber_buffer),
            extractor,
            transcriber,
            config,
            tracker: TaskTracker::new(),
            in_flight: Arc::new(watch::channel(0).0),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &ProgressBroadcaster {
        &self.broadcaster
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Token cancelled on shutdown; background tasks should stop with it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Register a freshly uploaded job.
    pub fn submit(&self, job: Job) -> Uuid {
        let id = self.registry.create(job);
        debug!(job_id = %id, "Job submitted");
        id
    }

    pub fn trigger_extraction(&self, job_id: Uuid) -> Result<TriggerOutcome> {
        self.trigger(job_id, Stage::Extraction)
    }

    pub fn trigger_transcription(&self, job_id: Uuid) -> Result<TriggerOutcome> {
        self.trigger(job_id, Stage::Transcription)
    }

    /// Move `stage` to `queued` and spawn its worker if the trigger is accepted.
    ///
    /// Triggers on an active or completed stage are reported without side
    /// effects. A transcription trigger before extraction has completed
    /// fails with [`Error::Conflict`].
    pub fn trigger(&self, job_id: Uuid, stage: Stage) -> Result<TriggerOutcome> {
        let message = match stage {
            Stage::Extraction => messages::EXTRACTION_QUEUED,
            Stage::Transcription => messages::TRANSCRIPTION_QUEUED,
        };
        // Published before spawning so `queued` always precedes the worker's events.
        let outcome = self.broadcaster.publish_with(job_id, || {
            self.registry.mutate(job_id, |job| {
                let outcome = job.trigger(stage, Utc::now())?;
                let event = match outcome {
                    TriggerOutcome::Started => {
                        Some(ProgressEvent::for_stage(job, stage, Some(message)))
                    }
                    _ => None,
                };
                Ok((outcome, event))
            })
        })?;

        if outcome != TriggerOutcome::Started {
            debug!(%job_id, %stage, ?outcome, "Trigger ignored");
            return Ok(outcome);
        }

        let (adapter, timeout) = match stage {
            Stage::Extraction => (self.extractor.clone(), self.config.extraction_timeout),
            Stage::Transcription => (self.transcriber.clone(), self.config.transcription_timeout),
        };
        let worker = StageWorker {
            registry: self.registry.clone(),
            broadcaster: self.broadcaster.clone(),
            adapter,
            outputs_dir: self.config.outputs_dir.clone(),
            timeout,
            token: self.shutdown.child_token(),
        };
        let in_flight = InFlight::enter(&self.in_flight);
        self.tracker.spawn(async move {
            let _in_flight = in_flight;
            worker.run(job_id).await;
        });

        info!(%job_id, %stage, "Stage queued");
        Ok(outcome)
    }

    /// Current job state.
    pub fn job(&self, job_id: Uuid) -> Result<Job> {
        self.registry.get(job_id)
    }

    /// Point-in-time progress event, the same shape observers receive.
    pub fn snapshot(&self, job_id: Uuid) -> Result<ProgressEvent> {
        self.registry.get(job_id).map(|job| ProgressEvent::current(&job))
    }

    /// Attach an observer; its first event is the current snapshot.
    pub fn subscribe(&self, job_id: Uuid) -> Result<Subscription> {
        self.broadcaster
            .subscribe_with(job_id, || self.snapshot(job_id))
    }

    /// Most recently updated jobs, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Job> {
        self.registry.list(limit)
    }

    /// Number of stage workers still running.
    pub fn active_workers(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Start the reaper bound to this orchestrator's registry and shutdown token.
    pub fn spawn_reaper(&self, config: ReaperConfig) -> Option<tokio::task::JoinHandle<()>> {
        Reaper::new(self.registry.clone(), self.broadcaster.clone(), config)
            .spawn(self.shutdown.clone())
    }

    /// Wait until no worker is running, without cancelling any.
    ///
    /// Returns `false` if workers are still running after `limit`.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let mut in_flight = self.in_flight.subscribe();
        let idle = matches!(
            tokio::time::timeout(limit, in_flight.wait_for(|n| *n == 0)).await,
            Ok(Ok(_))
        );
        idle
    }

    /// Cancel every worker and background task, then wait for workers to exit.
    ///
    /// Cancelled stages are recorded as failed before their worker exits.
    pub async fn shutdown(&self) {
        info!(active = self.active_workers(), "Shutting down job orchestrator");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Job orchestrator stopped");
    }
}
