//! Stage adapters and the context they run in.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use extracta_core::{Artifact, ArtifactKind, Error, Job, Result, Stage, StageStatus};

/// Progress callback type for stage adapters: `(percent, status, message)`.
pub type ProgressCallback = Box<dyn Fn(u8, StageStatus, &str) + Send + Sync>;

/// Cancellation scope of one stage run: a token plus a hard deadline.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    token: CancellationToken,
    timeout: Duration,
    deadline: Instant,
}

impl ExecutionContext {
    /// Scope that expires `timeout` from now or when `token` is cancelled.
    pub fn new(token: CancellationToken, timeout: Duration) -> Self {
        Self {
            token,
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.deadline
    }

    /// Resolves once the run must stop, with the reason as [`Error::Cancelled`].
    pub async fn done(&self) -> Error {
        tokio::select! {
            _ = self.token.cancelled() => Error::Cancelled("job cancelled".to_string()),
            _ = tokio::time::sleep_until(self.deadline) => Error::Cancelled(format!(
                "deadline of {}s exceeded",
                self.timeout.as_secs_f64()
            )),
        }
    }
}

/// Everything an adapter needs for one stage run.
pub struct StageContext {
    /// Snapshot of the job taken when the stage entered `processing`.
    pub job: Job,
    /// File the stage reads.
    pub input: PathBuf,
    /// Files the stage is expected to produce.
    pub artifacts: Vec<Artifact>,
    execution: ExecutionContext,
    progress_callback: Option<ProgressCallback>,
}

impl StageContext {
    pub fn new(
        job: Job,
        input: impl Into<PathBuf>,
        artifacts: Vec<Artifact>,
        execution: ExecutionContext,
    ) -> Self {
        Self {
            job,
            input: input.into(),
            artifacts,
            execution,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(u8, StageStatus, &str) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Report progress to the callback.
    pub fn report_progress(&self, percent: u8, status: StageStatus, message: &str) {
        if let Some(ref callback) = self.progress_callback {
            callback(percent.min(100), status, message);
        }
    }

    pub fn execution(&self) -> &ExecutionContext {
        &self.execution
    }

    /// Planned output path of the given kind.
    pub fn artifact_path(&self, kind: ArtifactKind) -> Result<&Path> {
        self.artifacts
            .iter()
            .find(|a| a.kind == kind)
            .map(|a| a.path.as_path())
            .ok_or_else(|| Error::Internal(format!("no {kind:?} artifact planned")))
    }
}

/// Runs one stage of a job by driving an external tool.
#[async_trait]
pub trait StageAdapter: Send + Sync {
    /// The stage this adapter implements.
    fn stage(&self) -> Stage;

    /// Short tool name used in logs.
    fn name(&self) -> &'static str;

    /// Run the stage to completion, cancellation or failure.
    ///
    /// Success means every planned artifact exists. Cancellation must surface
    /// as [`Error::Cancelled`].
    async fn run(&self, ctx: StageContext) -> Result<()>;

    /// Check whether the underlying tool is usable.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Adapter for tests: reports progress and writes placeholder artifacts.
pub struct NoOpAdapter {
    stage: Stage,
    delay: Duration,
    failure: Option<String>,
}

impl NoOpAdapter {
    /// Create a new no-op adapter for the given stage.
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            delay: Duration::ZERO,
            failure: None,
        }
    }

    /// Wait this long (or until cancelled) before finishing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every run with this message instead of producing artifacts.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }
}

#[async_trait]
impl StageAdapter for NoOpAdapter {
    fn stage(&self) -> Stage {
        self.stage
    }

    fn name(&self) -> &'static str {
        "noop"
    }

    async fn run(&self, ctx: StageContext) -> Result<()> {
        ctx.report_progress(50, StageStatus::Processing, "Processing...");

        if !self.delay.is_zero() {
            tokio::select! {
                reason = ctx.execution().done() => return Err(reason),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        if let Some(ref message) = self.failure {
            return Err(Error::ProcessExecution(message.clone()));
        }

        for artifact in &ctx.artifacts {
            tokio::fs::write(&artifact.path, b"noop").await?;
        }
        ctx.report_progress(100, StageStatus::Processing, "Done");
        Ok(())
    }
}
