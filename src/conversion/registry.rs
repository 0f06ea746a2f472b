//! In-flight job tracking.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mediaforge_av::Scratch;
use mediaforge_common::{ConversionCategory, JobId, TransformOptions};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a registered job.
#[derive(Debug)]
pub enum JobState {
    /// Work in progress. `stage` is the kill handle of the stage currently
    /// running, if any.
    Running { stage: Option<CancellationToken> },
    Cancelled,
    Finished,
}

/// Bookkeeping for one submitted job.
#[derive(Debug)]
pub struct JobRecord {
    pub id: JobId,
    pub category: ConversionCategory,
    pub options: TransformOptions,
    pub created_at: DateTime<Utc>,
    state: Mutex<JobState>,
    scratch: Scratch,
}

impl JobRecord {
    pub fn new(
        id: JobId,
        category: ConversionCategory,
        options: TransformOptions,
        scratch: Scratch,
    ) -> Self {
        Self {
            id,
            category,
            options,
            created_at: Utc::now(),
            state: Mutex::new(JobState::Running { stage: None }),
            scratch,
        }
    }

    /// Scratch paths owned by this job.
    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.state.lock(), JobState::Cancelled)
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), JobState::Running { .. })
    }

    /// Install a fresh kill handle for the next stage. Returns `None` if the
    /// job is no longer running, in which case no stage may start.
    pub fn begin_stage(&self) -> Option<CancellationToken> {
        let mut state = self.state.lock();
        match &mut *state {
            JobState::Running { stage } => {
                let token = CancellationToken::new();
                *stage = Some(token.clone());
                Some(token)
            }
            JobState::Cancelled | JobState::Finished => None,
        }
    }

    /// Move a running job to `Cancelled`, killing its active stage. Returns
    /// `false` if the job had already settled or been cancelled.
    pub fn cancel(&self) -> bool {
        let stage = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, JobState::Cancelled) {
                JobState::Running { stage } => stage,
                previous => {
                    *state = previous;
                    return false;
                }
            }
        };

        if let Some(token) = stage {
            token.cancel();
        }
        true
    }

    /// Move a running job to `Finished`. Returns `false` if it was cancelled
    /// first; cancellation then owns the outcome.
    pub fn settle(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            JobState::Running { .. } => {
                *state = JobState::Finished;
                true
            }
            JobState::Finished => true,
            JobState::Cancelled => false,
        }
    }
}

/// Registered jobs by id.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<JobId, Arc<JobRecord>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a record, returning any record previously registered under the
    /// same id. The previous record keeps running but is no longer reachable.
    pub fn insert(&self, record: Arc<JobRecord>) -> Option<Arc<JobRecord>> {
        self.jobs.insert(record.id.clone(), record)
    }

    pub fn get(&self, id: &JobId) -> Option<Arc<JobRecord>> {
        self.jobs.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Drop `record` from the registry if the id still points at it.
    pub fn remove(&self, record: &Arc<JobRecord>) -> bool {
        self.jobs
            .remove_if(&record.id, |_, current| Arc::ptr_eq(current, record))
            .is_some()
    }

    pub fn ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.jobs.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
