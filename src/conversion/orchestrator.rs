//! Job orchestration: submit, track, cancel.

use std::sync::Arc;
use std::time::Duration;

use mediaforge_av::formats::{content_type_for, output_file_name};
use mediaforge_av::{
    BuildRequest, CommandBuilder, FfmpegEngine, FfprobeProber, OutputTarget, Prober, ScratchArea,
    ToolRegistry, TranscodeEngine,
};
use mediaforge_common::config::Config;
use mediaforge_common::{JobId, Output, ProgressEvent, Result, TransformRequest};
use tracing::Instrument;

use super::executor::{PlanOutcome, StageExecutor};
use super::progress::{ProgressBroadcaster, ProgressStream};
use super::registry::{JobRecord, JobRegistry};

/// Runs transformation jobs end to end.
///
/// One instance is shared by every caller; it owns the job registry and the
/// progress channels.
pub struct JobOrchestrator {
    registry: JobRegistry,
    broadcaster: Arc<ProgressBroadcaster>,
    builder: CommandBuilder,
    executor: StageExecutor,
    scratch: ScratchArea,
}

impl JobOrchestrator {
    pub fn builder(config: Config) -> JobOrchestratorBuilder {
        JobOrchestratorBuilder::new(config)
    }

    /// Run a job to completion.
    ///
    /// Returns `Ok(None)` if the job was cancelled before it settled. Scratch
    /// files are removed on every path out of this function.
    pub async fn submit(&self, request: TransformRequest) -> Result<Option<Output>> {
        // Registered before the first await so a cancel issued once this
        // future has been polled always finds the record.
        let record = Arc::new(JobRecord::new(
            request.job_id.clone(),
            request.category,
            request.options,
            self.scratch.scratch(),
        ));
        if self.registry.insert(Arc::clone(&record)).is_some() {
            tracing::warn!(job_id = %request.job_id, "Job id resubmitted; tracking the new job");
        }
        self.broadcaster.open(&request.job_id);

        let span = tracing::info_span!("job", job_id = %request.job_id);
        async move {
            tracing::info!(
                category = %request.category,
                target = %request.target_format,
                source = %request.source.original_name,
                "Job started"
            );

            let result = self.run(&record, &request).await;

            record.scratch().cleanup().await;
            let settled = record.settle();
            self.registry.remove(&record);

            match (settled, result) {
                (true, Ok(Some(output))) => {
                    tracing::info!(bytes = output.bytes.len(), "Job complete");
                    self.broadcaster.emit(&request.job_id, ProgressEvent::Complete);
                    Ok(Some(output))
                }
                (true, Err(e)) => {
                    tracing::error!("Job failed: {e}");
                    self.broadcaster
                        .emit(&request.job_id, ProgressEvent::error(e.to_string()));
                    Err(e)
                }
                // Only reachable if the plan stopped without the record
                // being cancelled.
                (true, Ok(None)) => {
                    self.broadcaster.emit(&request.job_id, ProgressEvent::Cancelled);
                    Ok(None)
                }
                (false, _) => {
                    tracing::info!("Job cancelled");
                    Ok(None)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, record: &JobRecord, request: &TransformRequest) -> Result<Option<Output>> {
        let scratch = record.scratch();
        let input = scratch.materialize_input(&request.source).await?;
        // Nothing beyond the input copy hits the disk until the plan is built.
        let output_kind = request.category.output_kind();
        let output = scratch.reserve_output(output_kind, &request.target_format);

        let source_extension = request.source.extension();
        let plan = self
            .builder
            .build(&BuildRequest {
                category: request.category,
                input: &input,
                source_extension: source_extension.as_deref(),
                output: &output,
                target_format: &request.target_format,
                options: &request.options,
            })
            .await?;
        for path in &plan.intermediates {
            scratch.register(path);
        }
        scratch.create_output(output_kind, &output).await?;

        if self.executor.run_plan(record, &plan).await? == PlanOutcome::Cancelled {
            return Ok(None);
        }

        let (artifact, ext) = match &plan.output {
            OutputTarget::File(path) => (path.clone(), request.target_format.as_str()),
            OutputTarget::FrameDirectory(dir) => (scratch.archive_directory(dir).await?, "zip"),
        };
        let bytes = tokio::fs::read(&artifact).await?;

        Ok(Some(Output {
            bytes: bytes.into(),
            content_type: content_type_for(ext).to_string(),
            filename: output_file_name(&request.source.original_name, ext),
        }))
    }

    /// Cancel a job.
    ///
    /// A running job is marked cancelled, its active stage is killed, and
    /// `Cancelled` is emitted. Settled jobs are left alone. For an unknown id
    /// the event only reaches an already open channel. Returns whether a
    /// running job was cancelled.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        match self.registry.get(job_id) {
            Some(record) => {
                if !record.cancel() {
                    tracing::debug!(job_id = %job_id, "Cancel ignored; job already settled");
                    return false;
                }
                tracing::info!(job_id = %job_id, "Cancelling job");
                self.broadcaster.emit(job_id, ProgressEvent::Cancelled);
                true
            }
            None => {
                self.broadcaster.emit(job_id, ProgressEvent::Cancelled);
                false
            }
        }
    }

    /// Follow a job's progress events.
    pub fn subscribe(&self, job_id: &JobId) -> ProgressStream {
        self.broadcaster.subscribe(job_id)
    }

    /// Ids of jobs currently registered.
    pub fn active_jobs(&self) -> Vec<JobId> {
        self.registry.ids()
    }

    pub fn broadcaster(&self) -> &Arc<ProgressBroadcaster> {
        &self.broadcaster
    }

    pub fn scratch_area(&self) -> &ScratchArea {
        &self.scratch
    }
}

/// Assembles a [`JobOrchestrator`]. Collaborators not supplied explicitly are
/// created from the configuration and the discovered tools.
pub struct JobOrchestratorBuilder {
    config: Config,
    tools: Option<ToolRegistry>,
    prober: Option<Arc<dyn Prober>>,
    engine: Option<Arc<dyn TranscodeEngine>>,
}

impl JobOrchestratorBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            tools: None,
            prober: None,
            engine: None,
        }
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn TranscodeEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn build(self) -> Result<JobOrchestrator> {
        self.config.validate()?;

        let needs_tools = self.prober.is_none() || self.engine.is_none();
        let tools = match self.tools {
            Some(tools) => tools,
            None if needs_tools => ToolRegistry::discover(&self.config.tools),
            None => ToolRegistry::default(),
        };

        let prober: Arc<dyn Prober> = match self.prober {
            Some(prober) => prober,
            None => Arc::new(FfprobeProber::from_registry(&tools)?),
        };
        let engine: Arc<dyn TranscodeEngine> = match self.engine {
            Some(engine) => engine,
            None => {
                let timeout = self.config.engine.stage_timeout_secs.map(Duration::from_secs);
                Arc::new(FfmpegEngine::from_registry(&tools)?.with_timeout(timeout))
            }
        };

        let broadcaster = Arc::new(ProgressBroadcaster::from_config(&self.config.progress));
        let scratch = ScratchArea::new(self.config.scratch.root());
        tracing::debug!("Scratch root: {}", scratch.root().display());

        Ok(JobOrchestrator {
            registry: JobRegistry::new(),
            executor: StageExecutor::new(engine, Arc::clone(&broadcaster)),
            builder: CommandBuilder::new(prober),
            broadcaster,
            scratch,
        })
    }
}
