//! Explicit session context for pipeline and revision calls.
//!
//! A session pairs a [`RunStore`] with an optional run-id override. Without
//! an override, calls act on the store's current run; with one (`--run`),
//! they act on that run instead.

use crate::errors::StoreError;
use crate::plan::Run;
use crate::store::RunStore;

#[derive(Debug, Clone)]
pub struct Session {
    store: RunStore,
    run_override: Option<String>,
}

impl Session {
    pub fn new(store: RunStore) -> Self {
        Self {
            store,
            run_override: None,
        }
    }

    /// Act on `run_id` rather than the current run.
    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_override = Some(run_id.into());
        self
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    pub fn run_override(&self) -> Option<&str> {
        self.run_override.as_deref()
    }

    /// The run this session targets.
    pub fn current(&self) -> Result<Run, StoreError> {
        match &self.run_override {
            Some(run_id) => self.store.load(run_id),
            None => self.store.get_current(),
        }
    }

    /// Like [`Session::current`], but `None` when no run is current.
    pub fn current_if_any(&self) -> Result<Option<Run>, StoreError> {
        match self.current() {
            Ok(run) => Ok(Some(run)),
            Err(StoreError::NoCurrentRun) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Follow a run this session just created or committed.
    pub fn adopt(&mut self, run: &Run) {
        if self.run_override.is_some() {
            self.run_override = Some(run.run_id.clone());
        }
    }
}
