//! Durable run store.
//!
//! ```text
//! <root>/
//! ├── current_run          # id of the current run
//! ├── store.lock           # advisory lock (see `lock`)
//! └── runs/<run_id>/
//!     ├── run.json         # the Run record
//!     ├── source.md        # byte-identical source document
//!     ├── test_plan.md     # committed review document
//!     └── revisions/<REV-…>.json
//! ```
//!
//! Writes go to a temp file and are renamed into place, so a reader sees
//! either the previous record or the new one. Lost updates are caught with
//! the run's `revision`: a commit built from an older snapshot fails with
//! [`StoreError::StaleRun`].

mod lock;

pub use lock::StoreLock;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::StoreError;
use crate::gates;
use crate::ids::ReqId;
use crate::pipeline::state::RunState;
use crate::plan::{Run, Severity, StageArtifact};

pub const CURRENT_FILE: &str = "current_run";
pub const LOCK_FILE: &str = "store.lock";
pub const RUNS_DIR: &str = "runs";
pub const RUN_FILE: &str = "run.json";
pub const SOURCE_FILE: &str = "source.md";
pub const PLAN_FILE: &str = "test_plan.md";
pub const REVISIONS_DIR: &str = "revisions";

/// Handle on a store directory. Cheap to clone; holds no open files.
#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    /// Open (creating if needed) the store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let runs = root.join(RUNS_DIR);
        fs::create_dir_all(&runs).map_err(|e| StoreError::io("create store directory", &runs, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(RUNS_DIR).join(run_id)
    }

    pub fn plan_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(PLAN_FILE)
    }

    pub fn revision_path(&self, run_id: &str, request_id: &str) -> PathBuf {
        self.run_dir(run_id)
            .join(REVISIONS_DIR)
            .join(format!("{}.json", request_id))
    }

    fn lock(&self) -> Result<StoreLock, StoreError> {
        StoreLock::acquire(&self.root.join(LOCK_FILE))
    }

    /// Start a new run for `source` and make it current.
    ///
    /// Fails with `RunConflict` when a run is already current, unless
    /// `supersede` is set.
    pub fn create_run(&self, source: &str, supersede: bool) -> Result<Run, StoreError> {
        let _lock = self.lock()?;

        if let Some(current) = self.current_run_id()? {
            if !supersede {
                return Err(StoreError::RunConflict { current });
            }
            info!(run_id = %current, "superseding current run");
        }

        let run_id = self.next_run_id(Utc::now().date_naive())?;
        let run = Run::new(run_id, source);
        let dir = self.run_dir(&run.run_id);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io("create run directory", &dir, e))?;

        write_atomic(&dir.join(SOURCE_FILE), source.as_bytes())?;
        self.write_run(&run)?;
        self.write_current(&run.run_id)?;

        info!(run_id = %run.run_id, bytes = source.len(), "run created");
        Ok(run)
    }

    /// Load a run by id, verifying its source document against the recorded hash.
    pub fn load(&self, run_id: &str) -> Result<Run, StoreError> {
        let path = self.run_dir(run_id).join(RUN_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::RunNotFound {
                    run_id: run_id.to_string(),
                });
            }
            Err(e) => return Err(StoreError::io("read run record", &path, e)),
        };
        let run: Run =
            serde_json::from_str(&content).map_err(|source| StoreError::Corrupt { path, source })?;
        if !run.source_intact() {
            return Err(StoreError::SourceMismatch {
                run_id: run.run_id,
            });
        }
        Ok(run)
    }

    /// Id stored in the current-run pointer, if any.
    pub fn current_run_id(&self) -> Result<Option<String>, StoreError> {
        let path = self.root.join(CURRENT_FILE);
        match fs::read_to_string(&path) {
            Ok(id) => {
                let id = id.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io("read current run pointer", &path, e)),
        }
    }

    pub fn get_current(&self) -> Result<Run, StoreError> {
        let run_id = self.current_run_id()?.ok_or(StoreError::NoCurrentRun)?;
        self.load(&run_id)
    }

    /// Point the current-run pointer at an existing run.
    pub fn set_current(&self, run_id: &str) -> Result<(), StoreError> {
        let _lock = self.lock()?;
        self.load(run_id)?;
        self.write_current(run_id)?;
        info!(run_id, "current run set");
        Ok(())
    }

    /// Commit a validated stage artifact to `run`.
    ///
    /// The artifact, the sequence counters, the state, the revision and the
    /// current pointer move together. `run` must be the latest revision in
    /// the store and its state must accept the artifact's stage.
    pub fn commit_stage(&self, run: &Run, artifact: StageArtifact) -> Result<Run, StoreError> {
        let _lock = self.lock()?;
        let stage = artifact.stage();
        let mut stored = self.load_for_update(run)?;

        if !stored.state.accepts(stage) {
            return Err(StoreError::InvalidState {
                run_id: stored.run_id,
                attempted: format!("{} stage", stage),
                state: stored.state,
            });
        }

        stored.apply(artifact);
        self.write_run(&stored)?;
        self.sync_plan(&stored)?;
        self.write_current(&stored.run_id)?;

        info!(
            run_id = %stored.run_id,
            stage = %stage,
            state = %stored.state,
            revision = stored.revision,
            "stage committed"
        );
        Ok(stored)
    }

    /// Reviewer override: set and lock a requirement's severity.
    ///
    /// The rendered document no longer reflects the plan, so it is dropped
    /// and a reviewed run returns to `RISK_DONE`.
    pub fn override_severity(
        &self,
        run: &Run,
        req_id: ReqId,
        severity: Severity,
        basis: &str,
    ) -> Result<Run, StoreError> {
        let _lock = self.lock()?;
        let mut stored = self.load_for_update(run)?;

        if !matches!(stored.state, RunState::RiskDone | RunState::ReviewDone) {
            return Err(StoreError::InvalidState {
                run_id: stored.run_id,
                attempted: "severity override".to_string(),
                state: stored.state,
            });
        }

        let floor = stored
            .requirement(req_id)
            .and_then(|req| gates::severity_floor(req, stored.project_context.as_ref()));
        let run_id = stored.run_id.clone();
        let entry = stored
            .risk_entries
            .iter_mut()
            .find(|e| e.req_id == req_id)
            .ok_or_else(|| StoreError::UnknownRequirement {
                run_id,
                req_id: req_id.to_string(),
            })?;

        if !entry.has_risk() {
            return Err(StoreError::NoAssessedRisk {
                req_id: req_id.to_string(),
            });
        }
        if let Some(floor) = floor {
            if severity < floor {
                return Err(StoreError::BelowSeverityFloor {
                    req_id: req_id.to_string(),
                    requested: severity.to_string(),
                    floor: floor.to_string(),
                });
            }
        }

        entry.severity = Some(severity);
        entry.severity_basis = Some(basis.to_string());
        entry.severity_locked = true;
        stored.rendered_document = None;
        if stored.state == RunState::ReviewDone {
            stored.state = RunState::RiskDone;
        }
        stored.touch();

        self.write_run(&stored)?;
        self.sync_plan(&stored)?;

        info!(
            run_id = %stored.run_id,
            req_id = %req_id,
            severity = %severity,
            "severity overridden and locked"
        );
        Ok(stored)
    }

    /// Every run in the store, oldest first.
    pub fn list_runs(&self) -> Result<Vec<Run>, StoreError> {
        let runs_dir = self.root.join(RUNS_DIR);
        let mut ids = Vec::new();
        for entry in
            fs::read_dir(&runs_dir).map_err(|e| StoreError::io("list runs", &runs_dir, e))?
        {
            let entry = entry.map_err(|e| StoreError::io("list runs", &runs_dir, e))?;
            if entry.path().join(RUN_FILE).is_file() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        ids.iter().map(|id| self.load(id)).collect()
    }

    /// Next `RUN-YYYYMMDD-NNN` id for `date`.
    pub fn next_run_id(&self, date: NaiveDate) -> Result<String, StoreError> {
        let prefix = format!("RUN-{}-", date.format("%Y%m%d"));
        let runs_dir = self.root.join(RUNS_DIR);
        let highest = dir_names(&runs_dir)?
            .iter()
            .filter_map(|name| sequence_suffix(name, &prefix))
            .max()
            .unwrap_or(0);
        Ok(format!("{}{:03}", prefix, highest + 1))
    }

    /// Next `REV-YYYYMMDD-NNN` id for `date`, across every run in the store.
    ///
    /// Provisional only: the id a revision is stored under is assigned by
    /// [`RunStore::save_revision`] while it holds the store lock.
    pub fn next_revision_id(&self, date: NaiveDate) -> Result<String, StoreError> {
        let prefix = format!("REV-{}-", date.format("%Y%m%d"));
        let mut highest = 0;
        for run_id in dir_names(&self.root.join(RUNS_DIR))? {
            let revisions = self.run_dir(&run_id).join(REVISIONS_DIR);
            for name in dir_names(&revisions)? {
                if let Some(n) = name
                    .strip_suffix(".json")
                    .and_then(|stem| sequence_suffix(stem, &prefix))
                {
                    highest = highest.max(n);
                }
            }
        }
        Ok(format!("{}{:03}", prefix, highest + 1))
    }

    /// Allocate the next revision id for `date` and persist the document
    /// `build` produces for it, both under the store lock.
    ///
    /// Returns the stored document and its path.
    pub fn save_revision<T, F>(
        &self,
        run_id: &str,
        date: NaiveDate,
        build: F,
    ) -> Result<(T, PathBuf), StoreError>
    where
        T: Serialize,
        F: FnOnce(String) -> T,
    {
        let _lock = self.lock()?;
        let run_dir = self.run_dir(run_id);
        if !run_dir.join(RUN_FILE).is_file() {
            return Err(StoreError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        let dir = run_dir.join(REVISIONS_DIR);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io("create revisions directory", &dir, e))?;

        let request_id = self.next_revision_id(date)?;
        let path = self.revision_path(run_id, &request_id);
        let revision = build(request_id.clone());
        let json = serde_json::to_vec_pretty(&revision).map_err(|source| StoreError::Serialize {
            what: "revision request",
            source,
        })?;
        write_atomic(&path, &json)?;
        debug!(run_id, request_id, path = %path.display(), "revision saved");
        Ok((revision, path))
    }

    /// Reload `run` and check it is still the latest revision.
    fn load_for_update(&self, run: &Run) -> Result<Run, StoreError> {
        let stored = self.load(&run.run_id)?;
        if stored.revision != run.revision {
            return Err(StoreError::StaleRun {
                run_id: run.run_id.clone(),
                expected: run.revision,
                found: stored.revision,
            });
        }
        Ok(stored)
    }

    fn write_run(&self, run: &Run) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(run).map_err(|source| StoreError::Serialize {
            what: "run record",
            source,
        })?;
        write_atomic(&self.run_dir(&run.run_id).join(RUN_FILE), &json)
    }

    /// Mirror the committed document to `test_plan.md`, or remove a stale one.
    fn sync_plan(&self, run: &Run) -> Result<(), StoreError> {
        let path = self.plan_path(&run.run_id);
        match &run.rendered_document {
            Some(document) => write_atomic(&path, document.as_bytes()),
            None => match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StoreError::io("remove stale test plan", &path, e)),
            },
        }
    }

    fn write_current(&self, run_id: &str) -> Result<(), StoreError> {
        write_atomic(&self.root.join(CURRENT_FILE), format!("{}\n", run_id).as_bytes())
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents).map_err(|e| StoreError::io("write", &tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io("replace", path, e))
}

fn dir_names(dir: &Path) -> Result<Vec<String>, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io("read directory", dir, e)),
    };
    entries
        .map(|entry| {
            entry
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .map_err(|e| StoreError::io("read directory", dir, e))
        })
        .collect()
}

fn sequence_suffix(name: &str, prefix: &str) -> Option<u32> {
    let digits = name.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::TcId;
    use crate::plan::{
        IntakeArtifact, PlanContext, Priority, ProjectContext, Requirement, ReviewArtifact,
        RiskArtifact, RiskEntry, Surface, TestCase, TestType,
    };
    use tempfile::{TempDir, tempdir};

    fn setup() -> (RunStore, TempDir) {
        let dir = tempdir().unwrap();
        let store = RunStore::open(dir.path().join(".qaforge")).unwrap();
        (store, dir)
    }

    fn intake() -> StageArtifact {
        StageArtifact::Intake(IntakeArtifact {
            plan_context: PlanContext {
                purpose: "Verify checkout".into(),
                in_scope: vec!["Checkout".into()],
                out_of_scope: vec![],
            },
            project_context: Some(ProjectContext {
                known_high_severity_areas: Some(vec!["Order Confirmation Page".into()]),
                ..Default::default()
            }),
            requirements: vec![
                Requirement {
                    req_id: ReqId::new(1),
                    prd_ref: "§1".into(),
                    description: "Show the order confirmation".into(),
                    actors: vec!["Customer".into()],
                    testable: true,
                    ambiguity_flags: vec![],
                },
                Requirement {
                    req_id: ReqId::new(2),
                    prd_ref: "§2".into(),
                    description: "Export receipts".into(),
                    actors: vec!["Admin".into()],
                    testable: true,
                    ambiguity_flags: vec![],
                },
            ],
        })
    }

    fn risk() -> StageArtifact {
        let entry = |req: u32, tc: u32, severity: Option<Severity>| RiskEntry {
            req_id: ReqId::new(req),
            risk: severity.map(|_| "Customer sees wrong data".to_string()),
            severity,
            severity_basis: severity.map(|_| "Customer-facing".to_string()),
            severity_locked: false,
            test_cases: vec![TestCase {
                tc_id: TcId::new(tc),
                req_id: ReqId::new(req),
                objective: "Check it".into(),
                test_type: TestType::E2e,
                surface: Surface::Ui,
                priority: Priority::P1,
                human_note: None,
                fallback_applied: false,
            }],
        };
        StageArtifact::Risk(RiskArtifact {
            risk_entries: vec![entry(1, 1, Some(Severity::High)), entry(2, 2, Some(Severity::Low))],
        })
    }

    fn review() -> StageArtifact {
        StageArtifact::Review(ReviewArtifact {
            document: "# QA Test Plan\n".into(),
        })
    }

    fn today_prefix(kind: &str) -> String {
        format!("{}-{}-", kind, Utc::now().date_naive().format("%Y%m%d"))
    }

    #[test]
    fn test_create_run_persists_source_and_pointer() {
        let (store, _dir) = setup();
        let source = "# PRD\r\n\nUnicode — kept\n";
        let run = store.create_run(source, false).unwrap();

        assert!(run.run_id.starts_with(&today_prefix("RUN")));
        assert!(run.run_id.ends_with("-001"));
        assert_eq!(store.current_run_id().unwrap(), Some(run.run_id.clone()));
        let on_disk = fs::read(store.run_dir(&run.run_id).join(SOURCE_FILE)).unwrap();
        assert_eq!(on_disk, source.as_bytes());
        assert_eq!(store.get_current().unwrap(), run);
    }

    #[test]
    fn test_create_run_conflicts_unless_superseded() {
        let (store, _dir) = setup();
        let first = store.create_run("one", false).unwrap();

        match store.create_run("two", false) {
            Err(StoreError::RunConflict { current }) => assert_eq!(current, first.run_id),
            other => panic!("Expected RunConflict, got {:?}", other),
        }

        let second = store.create_run("two", true).unwrap();
        assert!(second.run_id.ends_with("-002"));
        assert_eq!(store.current_run_id().unwrap(), Some(second.run_id));
        // The superseded run is kept.
        assert!(store.load(&first.run_id).is_ok());
    }

    #[test]
    fn test_pointer_survives_reopen() {
        let (store, dir) = setup();
        let run = store.create_run("doc", false).unwrap();
        let reopened = RunStore::open(dir.path().join(".qaforge")).unwrap();
        assert_eq!(reopened.get_current().unwrap().run_id, run.run_id);
    }

    #[test]
    fn test_get_current_without_runs() {
        let (store, _dir) = setup();
        assert!(matches!(store.get_current(), Err(StoreError::NoCurrentRun)));
        assert!(matches!(
            store.load("RUN-20260101-001"),
            Err(StoreError::RunNotFound { .. })
        ));
    }

    #[test]
    fn test_set_current_requires_existing_run() {
        let (store, _dir) = setup();
        let first = store.create_run("one", false).unwrap();
        store.create_run("two", true).unwrap();

        store.set_current(&first.run_id).unwrap();
        assert_eq!(store.current_run_id().unwrap(), Some(first.run_id));
        assert!(matches!(
            store.set_current("RUN-19990101-001"),
            Err(StoreError::RunNotFound { .. })
        ));
    }

    #[test]
    fn test_commit_advances_state_and_revision() {
        let (store, _dir) = setup();
        let run = store.create_run("doc", false).unwrap();
        let run = store.commit_stage(&run, intake()).unwrap();
        assert_eq!(run.state, RunState::IntakeDone);
        assert_eq!(run.revision, 1);
        assert_eq!(store.load(&run.run_id).unwrap(), run);

        let run = store.commit_stage(&run, risk()).unwrap();
        let run = store.commit_stage(&run, review()).unwrap();
        assert_eq!(run.state, RunState::ReviewDone);
        assert_eq!(
            fs::read_to_string(store.plan_path(&run.run_id)).unwrap(),
            "# QA Test Plan\n"
        );
    }

    #[test]
    fn test_commit_out_of_order_is_invalid_state() {
        let (store, _dir) = setup();
        let run = store.create_run("doc", false).unwrap();
        match store.commit_stage(&run, risk()) {
            Err(StoreError::InvalidState { state, .. }) => assert_eq!(state, RunState::Empty),
            other => panic!("Expected InvalidState, got {:?}", other),
        }
        assert_eq!(store.load(&run.run_id).unwrap().revision, 0);
    }

    #[test]
    fn test_second_commit_from_same_snapshot_is_stale() {
        let (store, _dir) = setup();
        let run = store.create_run("doc", false).unwrap();
        let run = store.commit_stage(&run, intake()).unwrap();

        let snapshot_a = store.load(&run.run_id).unwrap();
        let snapshot_b = snapshot_a.clone();

        store.commit_stage(&snapshot_a, risk()).unwrap();
        match store.commit_stage(&snapshot_b, risk()) {
            Err(StoreError::StaleRun {
                expected, found, ..
            }) => {
                assert_eq!(expected, 1);
                assert_eq!(found, 2);
            }
            other => panic!("Expected StaleRun, got {:?}", other),
        }
    }

    #[test]
    fn test_concurrent_commits_let_exactly_one_win() {
        let (store, _dir) = setup();
        let run = store.create_run("doc", false).unwrap();
        let run = store.commit_stage(&run, intake()).unwrap();

        let barrier = std::sync::Arc::new(std::sync::Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                let run = run.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    store.commit_stage(&run, risk())
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(StoreError::StaleRun { .. })))
        );
        assert_eq!(store.load(&run.run_id).unwrap().revision, 2);
    }

    #[test]
    fn test_override_locks_severity_and_reopens_review() {
        let (store, _dir) = setup();
        let run = store.create_run("doc", false).unwrap();
        let run = store.commit_stage(&run, intake()).unwrap();
        let run = store.commit_stage(&run, risk()).unwrap();
        let run = store.commit_stage(&run, review()).unwrap();

        let run = store
            .override_severity(&run, ReqId::new(2), Severity::Medium, "Finance relies on it")
            .unwrap();
        let entry = run.risk_entry(ReqId::new(2)).unwrap();
        assert!(entry.severity_locked);
        assert_eq!(entry.severity, Some(Severity::Medium));
        assert_eq!(run.state, RunState::RiskDone);
        assert!(run.rendered_document.is_none());
        assert!(!store.plan_path(&run.run_id).exists());
    }

    #[test]
    fn test_override_below_floor_is_rejected() {
        let (store, _dir) = setup();
        let run = store.create_run("doc", false).unwrap();
        let run = store.commit_stage(&run, intake()).unwrap();
        let run = store.commit_stage(&run, risk()).unwrap();

        match store.override_severity(&run, ReqId::new(1), Severity::Low, "Looks minor") {
            Err(StoreError::BelowSeverityFloor { floor, .. }) => assert_eq!(floor, "high"),
            other => panic!("Expected BelowSeverityFloor, got {:?}", other),
        }
        assert!(matches!(
            store.override_severity(&run, ReqId::new(9), Severity::Low, "x"),
            Err(StoreError::UnknownRequirement { .. })
        ));
    }

    #[test]
    fn test_override_before_risk_is_invalid_state() {
        let (store, _dir) = setup();
        let run = store.create_run("doc", false).unwrap();
        let run = store.commit_stage(&run, intake()).unwrap();
        assert!(matches!(
            store.override_severity(&run, ReqId::new(1), Severity::High, "x"),
            Err(StoreError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_tampered_source_is_reported_on_load() {
        let (store, _dir) = setup();
        let run = store.create_run("doc", false).unwrap();
        let path = store.run_dir(&run.run_id).join(RUN_FILE);
        let mut value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        value["source_document"] = serde_json::json!("edited");
        fs::write(&path, value.to_string()).unwrap();

        assert!(matches!(
            store.load(&run.run_id),
            Err(StoreError::SourceMismatch { .. })
        ));
    }

    #[test]
    fn test_corrupt_record_is_reported() {
        let (store, _dir) = setup();
        let run = store.create_run("doc", false).unwrap();
        fs::write(store.run_dir(&run.run_id).join(RUN_FILE), "{not json").unwrap();
        assert!(matches!(
            store.load(&run.run_id),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_next_run_id_follows_highest_sequence() {
        let (store, _dir) = setup();
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert_eq!(store.next_run_id(date).unwrap(), "RUN-20260314-001");

        for name in ["RUN-20260314-001", "RUN-20260314-007", "RUN-20260313-042", "notes"] {
            fs::create_dir_all(store.root().join(RUNS_DIR).join(name)).unwrap();
        }
        assert_eq!(store.next_run_id(date).unwrap(), "RUN-20260314-008");
    }

    #[test]
    fn test_revisions_share_one_sequence_across_runs() {
        let (store, _dir) = setup();
        let first = store.create_run("one", false).unwrap();
        let second = store.create_run("two", true).unwrap();
        let date = Utc::now().date_naive();

        assert!(store.next_revision_id(date).unwrap().ends_with("-001"));
        let (doc, _) = store
            .save_revision(&first.run_id, date, |id| serde_json::json!({"request_id": id}))
            .unwrap();
        let id = doc["request_id"].as_str().unwrap().to_string();
        assert!(id.starts_with(&today_prefix("REV")));
        assert!(id.ends_with("-001"));

        assert!(store.next_revision_id(date).unwrap().ends_with("-002"));
        let (next, path) = store.save_revision(&second.run_id, date, |id| id).unwrap();
        assert!(next.ends_with("-002"));
        assert!(path.ends_with(format!("{}/{}.json", REVISIONS_DIR, next)));
    }

    #[test]
    fn test_revision_id_is_assigned_when_saved() {
        let (store, _dir) = setup();
        let run = store.create_run("one", false).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();

        // Two classifications reading the sequence before either saves.
        let a = store.next_revision_id(date).unwrap();
        let b = store.next_revision_id(date).unwrap();
        assert_eq!(a, b);

        let (first, first_path) = store
            .save_revision(&run.run_id, date, |id| {
                serde_json::json!({"request_id": id, "message": "first"})
            })
            .unwrap();
        let (second, second_path) = store
            .save_revision(&run.run_id, date, |id| {
                serde_json::json!({"request_id": id, "message": "second"})
            })
            .unwrap();

        assert_eq!(first["request_id"], "REV-20260314-001");
        assert_eq!(second["request_id"], "REV-20260314-002");
        assert_ne!(first_path, second_path);

        let on_disk: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&first_path).unwrap()).unwrap();
        assert_eq!(on_disk["message"], "first");
        let on_disk: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&second_path).unwrap()).unwrap();
        assert_eq!(on_disk["message"], "second");
    }

    #[test]
    fn test_revision_for_missing_run_is_not_found() {
        let (store, _dir) = setup();
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let err = store
            .save_revision("RUN-20260314-009", date, |id| id)
            .unwrap_err();
        assert!(matches!(err, StoreError::RunNotFound { .. }));
    }

    #[test]
    fn test_list_runs_is_sorted() {
        let (store, _dir) = setup();
        let a = store.create_run("one", false).unwrap();
        let b = store.create_run("two", true).unwrap();
        let ids: Vec<String> = store.list_runs().unwrap().into_iter().map(|r| r.run_id).collect();
        assert_eq!(ids, vec![a.run_id, b.run_id]);
    }
}
