//! Run registry: what each audit run was given and what it produced.
//!
//! A host that serves several audits (a web front end, a batch runner) needs
//! to look runs up by id after they finish. [`RunStore`] is that lookup; the
//! store is passed in by the caller rather than held globally.
//!
//! Completed runs are never evicted by the store itself. Callers that keep a
//! store for the life of a long-running process should call
//! [`RunStore::remove`] once a run's artefacts have been collected.

use crate::error::AuditError;
use crate::output::AuditOutputs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Identifier of one audit run: the local start time, `%Y%m%d_%H%M%S`,
/// with `_2`, `_3`, ... appended when several runs start within a second.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Timestamp-based id for a run starting now.
    pub fn now() -> Self {
        Self(chrono::Local::now().format("%Y%m%d_%H%M%S").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn with_suffix(&self, n: usize) -> Self {
        Self(format!("{}_{}", self.0, n))
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AuditOutputs {
    /// `audit_{id}.pdf` and `audit_{id}.csv` inside `dir`.
    pub fn for_run(dir: &Path, id: &RunId) -> Self {
        Self {
            annotated_pdf: dir.join(format!("audit_{id}.pdf")),
            spreadsheet: dir.join(format!("audit_{id}.csv")),
        }
    }
}

/// Lifecycle of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Created,
    Completed,
}

/// Everything the registry knows about one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub input_pdf: PathBuf,
    pub status: RunStatus,
    pub outputs: Option<AuditOutputs>,
}

/// Key-value store from run id to run state.
pub trait RunStore: Send + Sync {
    /// Register a new run for `input_pdf` and return its id.
    fn create(&self, input_pdf: &Path) -> RunId;

    fn get(&self, id: &RunId) -> Option<RunState>;

    /// Attach the produced artefacts and mark the run completed.
    fn record_outputs(&self, id: &RunId, outputs: AuditOutputs) -> Result<(), AuditError>;

    /// Forget a run. Returns its last state, if it was known.
    fn remove(&self, id: &RunId) -> Option<RunState>;
}

/// [`RunStore`] backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: Mutex<HashMap<RunId, RunState>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<RunId, RunState>> {
        // A panic while holding the lock cannot leave the map half-updated:
        // every critical section is a single insert/remove/get.
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn create_with_base(&self, base: RunId, input_pdf: &Path) -> RunId {
        let mut runs = self.lock();
        let mut id = base.clone();
        let mut n = 2;
        while runs.contains_key(&id) {
            id = base.with_suffix(n);
            n += 1;
        }
        runs.insert(
            id.clone(),
            RunState {
                input_pdf: input_pdf.to_path_buf(),
                status: RunStatus::Created,
                outputs: None,
            },
        );
        id
    }
}

impl RunStore for InMemoryRunStore {
    fn create(&self, input_pdf: &Path) -> RunId {
        self.create_with_base(RunId::now(), input_pdf)
    }

    fn get(&self, id: &RunId) -> Option<RunState> {
        self.lock().get(id).cloned()
    }

    fn record_outputs(&self, id: &RunId, outputs: AuditOutputs) -> Result<(), AuditError> {
        let mut runs = self.lock();
        let state = runs
            .get_mut(id)
            .ok_or_else(|| AuditError::Internal(format!("unknown run id {id}")))?;
        state.outputs = Some(outputs);
        state.status = RunStatus::Completed;
        Ok(())
    }

    fn remove(&self, id: &RunId) -> Option<RunState> {
        self.lock().remove(id)
    }
}
