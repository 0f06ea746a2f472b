//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], a [`JobOrchestrator`] wired to a scripted
//! [`FakeEngine`] and a [`FakeProber`] over a temporary scratch root, so job
//! lifecycles can be exercised without ffmpeg installed.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use mediaforge::config::Config;
use mediaforge::JobOrchestrator;
use mediaforge_av::{Prober, Stage, StreamSummary, ToolRegistry, TranscodeEngine};
use mediaforge_common::{
    ConversionCategory, Error, JobId, Result, SourceFile, TransformOptions, TransformRequest,
};

/// Frames a successful extraction stage writes.
pub const FAKE_FRAME_COUNT: usize = 3;

// ---------------------------------------------------------------------------
// FakeEngine
// ---------------------------------------------------------------------------

/// What the fake engine does for one stage.
#[derive(Debug, Clone)]
pub enum StageScript {
    /// Report these stage percents, write the stage output, succeed.
    Succeed(Vec<f64>),
    /// Report these stage percents, then wait until the stage is killed.
    BlockUntilCancelled(Vec<f64>),
    /// Fail with a tool error.
    Fail(String),
}

/// Engine that follows scripts instead of running ffmpeg.
///
/// Scripts are consumed one per stage; once exhausted every stage succeeds
/// with `25, 50, 75, 100`.
pub struct FakeEngine {
    scripts: Mutex<VecDeque<StageScript>>,
    spawned: Mutex<Vec<Stage>>,
    started: Notify,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Self::scripted(Vec::new())
    }

    pub fn scripted(scripts: Vec<StageScript>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            spawned: Mutex::new(Vec::new()),
            started: Notify::new(),
        })
    }

    /// Stages the engine was asked to run, in order.
    pub fn spawned(&self) -> Vec<Stage> {
        self.spawned.lock().clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.lock().len()
    }

    /// Wait until a stage has started.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    fn next_script(&self) -> StageScript {
        self.scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| StageScript::Succeed(vec![25.0, 50.0, 75.0, 100.0]))
    }
}

#[async_trait]
impl TranscodeEngine for FakeEngine {
    async fn run(
        &self,
        stage: &Stage,
        cancel: CancellationToken,
        on_progress: &mut (dyn FnMut(f64) + Send),
    ) -> Result<()> {
        self.spawned.lock().push(stage.clone());
        let script = self.next_script();
        self.started.notify_one();

        match script {
            StageScript::Succeed(percents) => {
                for p in percents {
                    on_progress(p);
                    tokio::task::yield_now().await;
                }
                write_stage_output(stage).await
            }
            StageScript::BlockUntilCancelled(percents) => {
                for p in percents {
                    on_progress(p);
                }
                cancel.cancelled().await;
                Err(Error::tool("ffmpeg", "killed by cancellation"))
            }
            StageScript::Fail(message) => Err(Error::tool("ffmpeg", message)),
        }
    }
}

/// Create what ffmpeg would have: a frame sequence for `%05d` patterns, a
/// small file otherwise.
async fn write_stage_output(stage: &Stage) -> Result<()> {
    let Some(target) = stage.args.last() else {
        return Ok(());
    };

    if target.contains("%05d") {
        for i in 1..=FAKE_FRAME_COUNT {
            let path = target.replace("%05d", &format!("{i:05}"));
            tokio::fs::write(path, format!("frame {i}")).await?;
        }
    } else {
        tokio::fs::write(target, b"fake media output").await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// FakeProber
// ---------------------------------------------------------------------------

/// Prober returning a fixed summary, optionally holding each probe until
/// released.
pub struct FakeProber {
    summary: StreamSummary,
    gate: Option<Arc<Notify>>,
    entered: Notify,
    calls: AtomicUsize,
}

impl FakeProber {
    pub fn new(audio_streams: u32, video_streams: u32, duration_secs: Option<f64>) -> Arc<Self> {
        Arc::new(Self::build(audio_streams, video_streams, duration_secs, None))
    }

    /// A prober that waits on `gate` before answering.
    pub fn gated(
        audio_streams: u32,
        video_streams: u32,
        duration_secs: Option<f64>,
        gate: Arc<Notify>,
    ) -> Arc<Self> {
        Arc::new(Self::build(
            audio_streams,
            video_streams,
            duration_secs,
            Some(gate),
        ))
    }

    fn build(
        audio_streams: u32,
        video_streams: u32,
        duration_secs: Option<f64>,
        gate: Option<Arc<Notify>>,
    ) -> Self {
        Self {
            summary: StreamSummary {
                container: Some("mov,mp4,m4a,3gp,3g2,mj2".into()),
                audio_streams,
                video_streams,
                duration_secs,
            },
            gate,
            entered: Notify::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Wait until a probe call is in progress.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, _path: &Path) -> Result<StreamSummary> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self.summary.clone())
    }
}

// ---------------------------------------------------------------------------
// TestHarness
// ---------------------------------------------------------------------------

/// Orchestrator plus the fakes behind it.
pub struct TestHarness {
    pub orchestrator: Arc<JobOrchestrator>,
    pub engine: Arc<FakeEngine>,
    pub prober: Arc<FakeProber>,
    scratch: TempDir,
}

impl TestHarness {
    /// Harness with a default engine and a prober reporting one audio and one
    /// video stream lasting ten seconds.
    pub fn new() -> Self {
        Self::with(FakeEngine::new(), FakeProber::new(1, 1, Some(10.0)))
    }

    pub fn with(engine: Arc<FakeEngine>, prober: Arc<FakeProber>) -> Self {
        let scratch = tempfile::tempdir().expect("failed to create scratch dir");
        let mut config = Config::default();
        config.scratch.dir = Some(scratch.path().join("jobs"));

        let orchestrator = JobOrchestrator::builder(config)
            .tools(ToolRegistry::default())
            .prober(prober.clone())
            .engine(engine.clone())
            .build()
            .expect("failed to build orchestrator");

        Self {
            orchestrator: Arc::new(orchestrator),
            engine,
            prober,
            scratch,
        }
    }

    /// Everything left in the scratch root.
    pub fn scratch_entries(&self) -> Vec<PathBuf> {
        let root = self.scratch.path().join("jobs");
        match std::fs::read_dir(&root) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// A request for an in-memory source named `clip.mp4`.
pub fn video_request(
    job_id: &str,
    category: ConversionCategory,
    target: &str,
    options: TransformOptions,
) -> TransformRequest {
    TransformRequest::new(
        JobId::from(job_id),
        SourceFile::from_bytes(b"not really a video".to_vec(), "clip.mp4"),
        category,
        target,
        options,
    )
}
