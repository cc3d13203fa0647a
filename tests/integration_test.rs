//! Integration tests for archindex
//!
//! Drive full runs end to end against the in-process backend, a SQLite run
//! store and finding aids written to a temp directory.

use archindex::{
    backend::{
        BackendError, BackendResult, Entity, Generation, IndexNames, IndexSchema, IndexStats,
        MemoryBackend, RecordSink, SearchBackend, SearchRequest, SearchResponse, TaskId,
        TaskState,
    },
    import::{
        DirectorySource, DocumentOutcome, DocumentSource, ImportConfig, ImportCoordinator,
        ImportCoordinatorBuilder, ImportError, RunOutcome, RunStatus, RunStore, SourceDocument,
    },
    query::sanitize,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const ENV: &str = "test";

/// Fonds with a double-header series and two files
const FAMILY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ead xmlns="urn:isbn:1-931666-22-9">
  <eadheader><eadid>B 153</eadid></eadheader>
  <archdesc level="collection" type="inventory">
    <did><unittitle>Bundesministerium für Familie</unittitle></did>
    <dsc>
      <c level="fonds" id="DE-1958_fonds-b153">
        <did>
          <unittitle>Bundesministerium für Familie</unittitle>
          <unitid>B 153</unitid>
        </did>
        <c level="series">
          <did><unittitle>Bundesministerium für Familie</unittitle></did>
          <c level="series" id="DE-1958_s-haushalt">
            <did><unittitle>Haushalt</unittitle></did>
            <c level="file" id="DE-1958_f-1">
              <did>
                <unittitle>Haushaltsplan 1961</unittitle>
                <unitid type="call number">BArch B 153/1</unitid>
                <unitdate normal="1961-01-01/1961-12-31">1961</unitdate>
                <origination label="final">Bundesministerium für Familie</origination>
              </did>
            </c>
            <c level="file" id="DE-1958_f-2">
              <did>
                <unittitle>Haushaltsplan 1962</unittitle>
                <unitid type="call number">BArch B 153/2</unitid>
                <unitdate normal="1962-01-01/1962-12-31">1962</unitdate>
              </did>
            </c>
          </c>
        </c>
      </c>
    </dsc>
  </archdesc>
</ead>
"#;
const FAMILY_RECORDS: u64 = 5;

/// Fonds without an id whose double header carries the real one
const CHANCELLERY: &str = r#"<ead>
  <archdesc level="collection" type="inventory">
    <dsc>
      <c level="fonds">
        <did><unittitle>R 43 Reichskanzlei</unittitle></did>
        <c level="series" id="DE-1958_fonds-r43">
          <did><unittitle>R 43 Reichskanzlei</unittitle></did>
          <c level="file" id="DE-1958_f-r1">
            <did>
              <unittitle>Kabinettsprotokolle</unittitle>
              <unitid type="call number">BArch R 43/1</unitid>
              <unitdate normal="1040-01-01/1941-12-31">1940-1941</unitdate>
            </did>
          </c>
        </c>
      </c>
    </dsc>
  </archdesc>
</ead>
"#;
const CHANCELLERY_RECORDS: u64 = 2;

const FINDBUCH: &str = r#"<ead>
  <archdesc level="collection" type="findbuch">
    <dsc><c level="fonds" id="DE-1958_ignored"><did><unittitle>Ignoriert</unittitle></did></c></dsc>
  </archdesc>
</ead>
"#;

/// Previous generation, imported straight into the live indexes
const OLD_GENERATION: &str = r#"<ead>
  <archdesc level="collection" type="inventory">
    <dsc>
      <c level="fonds" id="DE-1958_fonds-old">
        <did><unittitle>Altbestand</unittitle><unitid>A 1</unitid></did>
        <c level="file" id="DE-1958_f-old"><did><unittitle>Altakte</unittitle></did></c>
      </c>
    </dsc>
  </archdesc>
</ead>
"#;

fn fast_config() -> ImportConfig {
    ImportConfig {
        poll_interval: Duration::from_millis(1),
        task_timeout: Duration::from_millis(500),
        indexing_timeout: Duration::from_millis(500),
        swap_timeout: Duration::from_millis(500),
        ..ImportConfig::default()
    }
}

struct Fixture {
    dir: TempDir,
    backend: Arc<MemoryBackend>,
    store: Arc<RunStore>,
    coordinator: ImportCoordinator,
}

impl Fixture {
    fn new(documents: &[(&str, &str)]) -> Self {
        Self::with_backend(documents, |memory| memory)
    }

    /// Fixture whose coordinator talks to a wrapper around the memory backend
    fn with_backend(
        documents: &[(&str, &str)],
        wrap: impl FnOnce(Arc<MemoryBackend>) -> Arc<dyn SearchBackend>,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        for (name, content) in documents {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(RunStore::open(dir.path().join("runs.sqlite3")).unwrap());
        let coordinator =
            ImportCoordinatorBuilder::new(wrap(backend.clone()), IndexNames::new(ENV), store.clone())
                .with_config(fast_config())
                .with_quiet(true)
                .build()
                .unwrap();
        Self {
            dir,
            backend,
            store,
            coordinator,
        }
    }

    fn source(&self) -> DirectorySource {
        DirectorySource::new(self.dir.path())
    }

    fn live(&self) -> RecordSink {
        RecordSink::new(self.backend.clone(), IndexNames::new(ENV), Generation::Live)
    }

    fn live_count(&self, entity: Entity) -> usize {
        self.backend.document_count(&IndexNames::new(ENV).live(entity))
    }

    fn write(&self, name: &str, content: &str) {
        std::fs::write(self.dir.path().join(name), content).unwrap();
    }
}

/// Fixed document list, including entries that may not exist on disk
struct ListedSource(Vec<SourceDocument>);

impl ListedSource {
    fn new(dir: &Path, names: &[&str]) -> Self {
        Self(
            names
                .iter()
                .map(|n| SourceDocument {
                    name: n.to_string(),
                    path: dir.join(n),
                })
                .collect(),
        )
    }
}

impl DocumentSource for ListedSource {
    fn documents(&self) -> Result<Vec<SourceDocument>, ImportError> {
        Ok(self.0.clone())
    }

    fn source_name(&self) -> String {
        "listed".to_string()
    }
}

/// Requests cancellation of a run while it is being prepared
struct CancellingSource {
    inner: DirectorySource,
    store: Arc<RunStore>,
    run_id: i64,
}

impl DocumentSource for CancellingSource {
    fn documents(&self) -> Result<Vec<SourceDocument>, ImportError> {
        self.store.request_cancel(self.run_id)?;
        self.inner.documents()
    }

    fn source_name(&self) -> String {
        self.inner.source_name()
    }
}

/// Where a [`FaultyBackend`] misbehaves, once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    /// The n-th write to the shadow file index produces a failed task
    FailFileWrite(usize),
    /// The process dies right before the swap is issued
    CrashBeforeSwap,
    /// The process dies while waiting for an issued swap
    CrashAfterSwap,
    /// The swap task fails without touching any index
    FailSwap,
}

#[derive(Debug)]
struct FaultyBackend {
    inner: Arc<MemoryBackend>,
    fault: Fault,
    armed: AtomicBool,
    file_writes: AtomicUsize,
    swap_task: Mutex<Option<TaskId>>,
}

impl FaultyBackend {
    fn wrap(fault: Fault) -> impl FnOnce(Arc<MemoryBackend>) -> Arc<dyn SearchBackend> {
        move |inner| {
            Arc::new(FaultyBackend {
                inner,
                fault,
                armed: AtomicBool::new(true),
                file_writes: AtomicUsize::new(0),
                swap_task: Mutex::new(None),
            })
        }
    }

    fn trigger(&self, fault: Fault) -> bool {
        self.fault == fault && self.armed.swap(false, Ordering::SeqCst)
    }
}

impl SearchBackend for FaultyBackend {
    fn create_index(&self, uid: &str, primary_key: &str) -> BackendResult<TaskId> {
        self.inner.create_index(uid, primary_key)
    }

    fn delete_index(&self, uid: &str) -> BackendResult<Option<TaskId>> {
        self.inner.delete_index(uid)
    }

    fn configure_index(&self, uid: &str, schema: &IndexSchema) -> BackendResult<TaskId> {
        self.inner.configure_index(uid, schema)
    }

    fn add_documents(&self, uid: &str, documents: &[Value]) -> BackendResult<TaskId> {
        if uid == IndexNames::new(ENV).shadow(Entity::File) {
            let write = self.file_writes.fetch_add(1, Ordering::SeqCst) + 1;
            if let Fault::FailFileWrite(n) = self.fault {
                if write == n && self.trigger(self.fault) {
                    // Documents without a primary key fail the task
                    let broken: Vec<Value> =
                        documents.iter().map(|_| json!({ "title": "broken" })).collect();
                    return self.inner.add_documents(uid, &broken);
                }
            }
        }
        self.inner.add_documents(uid, documents)
    }

    fn delete_document(&self, uid: &str, id: &str) -> BackendResult<TaskId> {
        self.inner.delete_document(uid, id)
    }

    fn get_document(&self, uid: &str, id: &str) -> BackendResult<Option<Value>> {
        self.inner.get_document(uid, id)
    }

    fn search(&self, uid: &str, request: &SearchRequest) -> BackendResult<SearchResponse> {
        self.inner.search(uid, request)
    }

    fn swap_indexes(&self, pairs: &[(String, String)]) -> BackendResult<TaskId> {
        if self.trigger(Fault::CrashBeforeSwap) {
            panic!("killed before the swap was issued");
        }
        if self.trigger(Fault::FailSwap) {
            return self
                .inner
                .swap_indexes(&[("missing".to_string(), pairs[0].1.clone())]);
        }
        let task = self.inner.swap_indexes(pairs)?;
        *self.swap_task.lock() = Some(task);
        Ok(task)
    }

    fn index_stats(&self, uid: &str) -> BackendResult<IndexStats> {
        self.inner.index_stats(uid)
    }

    fn task_state(&self, task: TaskId) -> BackendResult<TaskState> {
        if *self.swap_task.lock() == Some(task) && self.trigger(Fault::CrashAfterSwap) {
            panic!("killed while waiting for the swap");
        }
        self.inner.task_state(task)
    }

    fn name(&self) -> &str {
        "faulty"
    }
}

#[test]
fn test_duplicate_title_child_does_not_create_node() {
    let fx = Fixture::new(&[("a.xml", FAMILY)]);
    let report = fx.coordinator.start(&fx.source()).unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);

    assert_eq!(fx.live_count(Entity::Node), 2);
    assert_eq!(fx.live_count(Entity::File), 2);
    assert_eq!(fx.live_count(Entity::Origin), 1);

    let live = fx.live();
    let series = live.get_node("s-haushalt").unwrap().unwrap();
    assert_eq!(series.parent_id.as_deref(), Some("fonds-b153"));
    assert_eq!(series.ancestor_ids, vec!["fonds-b153".to_string()]);

    let file = live.get_file("f-1").unwrap().unwrap();
    assert_eq!(file.call_number, "B 153/1");
    assert_eq!(file.archive_node_id, "s-haushalt");
    assert_eq!(file.fonds_id.as_deref(), Some("fonds-b153"));
    assert_eq!(file.fonds_unitid_prefix.as_deref(), Some("B"));
    assert_eq!(file.decade, Some(1960));
    assert_eq!(file.origin_names, vec!["Bundesministerium für Familie".to_string()]);
}

#[test]
fn test_provisional_fonds_takes_real_id() {
    let fx = Fixture::new(&[("b.xml", CHANCELLERY)]);
    fx.coordinator.start(&fx.source()).unwrap();

    assert_eq!(fx.live_count(Entity::Node), 1);
    let live = fx.live();
    let fonds = live.get_node("fonds-r43").unwrap().unwrap();
    assert!(!fonds.provisional);
    assert_eq!(fonds.name, "Reichskanzlei");
    assert_eq!(fonds.unit_id, "R 43");

    let file = live.get_file("f-r1").unwrap().unwrap();
    assert_eq!(file.archive_node_id, "fonds-r43");
    assert_eq!(file.ancestor_ids, vec!["fonds-r43".to_string()]);
    // 1040 is a transcription slip for 1940
    assert_eq!(file.source_date_start.map(|d| d.to_string()).as_deref(), Some("1940-01-01"));
    assert_eq!(
        file.source_date_start_uncorrected.map(|d| d.to_string()).as_deref(),
        Some("1040-01-01")
    );
    assert_eq!(file.decade, Some(1940));
}

#[test]
fn test_reimport_is_idempotent() {
    let fx = Fixture::new(&[("a.xml", FAMILY), ("b.xml", CHANCELLERY)]);
    let first = fx.coordinator.start(&fx.source()).unwrap();
    let counts = |fx: &Fixture| {
        (
            fx.live_count(Entity::Node),
            fx.live_count(Entity::File),
            fx.live_count(Entity::Origin),
        )
    };
    let after_first = counts(&fx);

    let second = fx.coordinator.start(&fx.source()).unwrap();
    assert_ne!(first.run.id, second.run.id);
    assert_eq!(counts(&fx), after_first);
    assert_eq!(after_first, (3, 3, 1));
    assert_eq!(
        second.run.total_records_imported,
        first.run.total_records_imported
    );
}

#[test]
fn test_resume_skips_checkpointed_documents() {
    let fx = Fixture::new(&[("a.xml", FAMILY)]);

    // b.xml does not exist yet: the run fails after checkpointing a.xml
    let listed = ListedSource::new(fx.dir.path(), &["a.xml", "b.xml"]);
    let run = fx.store.create().unwrap();
    let result = fx.coordinator.run(run.id, &listed);
    assert!(matches!(result, Err(ImportError::Io(_))));

    let failed = fx.store.load(run.id).unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert_eq!(failed.completed_filenames, vec!["a.xml".to_string()]);
    assert_eq!(failed.total_records_imported, FAMILY_RECORDS);
    assert!(failed.error_message.as_deref().unwrap().starts_with("Io"));
    // Nothing reached the live indexes
    assert_eq!(fx.live_count(Entity::File), 0);

    fx.write("b.xml", CHANCELLERY);
    let report = fx.coordinator.run(run.id, &fx.source()).unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.stats.documents_resumed, 1);
    assert_eq!(report.stats.documents_imported, 1);
    assert_eq!(
        report.run.total_records_imported,
        FAMILY_RECORDS + CHANCELLERY_RECORDS
    );
    assert_eq!(report.run.completed_files, 2);

    // Documents written before the failure survive in the swapped generation
    assert_eq!(fx.live_count(Entity::File), 3);
}

#[test]
fn test_swap_replaces_previous_generation() {
    let fx = Fixture::new(&[("a.xml", FAMILY)]);
    let old = fx.dir.path().join("old.xml.bak");
    std::fs::write(&old, OLD_GENERATION).unwrap();

    let outcome = fx.coordinator.import_document(&old).unwrap();
    assert_eq!(outcome, DocumentOutcome::Imported { records: 2 });
    assert!(fx.live().get_file("f-old").unwrap().is_some());

    fx.coordinator.start(&fx.source()).unwrap();

    let live = fx.live();
    assert!(live.get_file("f-old").unwrap().is_none());
    assert!(live.get_node("fonds-old").unwrap().is_none());
    assert!(live.get_file("f-1").unwrap().is_some());
    assert_eq!(fx.live_count(Entity::File), 2);
    assert!(!fx.backend.index_names().iter().any(|n| n.ends_with("_new")));
}

#[test]
fn test_cancelled_run_leaves_live_indexes_alone() {
    let fx = Fixture::new(&[("a.xml", FAMILY)]);
    let old = fx.dir.path().join("old.xml.bak");
    std::fs::write(&old, OLD_GENERATION).unwrap();
    fx.coordinator.import_document(&old).unwrap();

    let run = fx.store.create().unwrap();
    let source = CancellingSource {
        inner: fx.source(),
        store: fx.store.clone(),
        run_id: run.id,
    };
    let report = fx.coordinator.run(run.id, &source).unwrap();
    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(report.run.status, RunStatus::Cancelled);
    assert_eq!(report.run.completed_files, 0);

    assert!(fx.live().get_file("f-old").unwrap().is_some());
    assert_eq!(fx.live_count(Entity::File), 1);

    // A cancelled run cannot be resumed
    assert!(matches!(
        fx.coordinator.run(run.id, &fx.source()),
        Err(ImportError::InvalidTransition { .. })
    ));
}

#[test]
fn test_non_inventory_document_is_checkpointed_without_records() {
    let fx = Fixture::new(&[("a.xml", FAMILY), ("c.xml", FINDBUCH)]);
    let report = fx.coordinator.start(&fx.source()).unwrap();

    assert_eq!(
        report.run.completed_filenames,
        vec!["a.xml".to_string(), "c.xml".to_string()]
    );
    assert_eq!(report.run.total_records_imported, FAMILY_RECORDS);
    assert_eq!(report.stats.documents_imported, 1);
    assert_eq!(report.stats.documents_skipped, 1);
    assert!(fx.live().get_node("ignored").unwrap().is_none());
}

#[test]
fn test_single_active_run() {
    let fx = Fixture::new(&[]);
    let run = fx.store.create().unwrap();
    assert!(matches!(
        fx.coordinator.start(&fx.source()),
        Err(ImportError::RunActive(id)) if id == run.id
    ));
}

#[test]
fn test_read_helpers_after_run() {
    let fx = Fixture::new(&[("a.xml", FAMILY), ("b.xml", CHANCELLERY)]);
    fx.coordinator.start(&fx.source()).unwrap();

    let live = fx.live();
    let (roots, total) = live.root_nodes(None, 1, 10).unwrap();
    assert_eq!(total, 2);
    assert_eq!(roots.len(), 2);
    assert_eq!(live.fonds_letters().unwrap(), vec!["B".to_string(), "R".to_string()]);
    assert_eq!(live.origin_letters().unwrap(), vec!["B".to_string()]);
}

#[test]
fn test_sanitizer_cases() {
    assert_eq!(sanitize("Haushaltsplan 1961"), r#""Haushaltsplan" "1961""#);
    assert_eq!(sanitize("B 153 Haushalt"), r#""B 153" "Haushalt""#);
    assert_eq!(sanitize("Kabinett* -Protokoll"), r#""Kabinett"* NOT "Protokoll""#);
    assert_eq!(sanitize("OR Reichskanzlei AND"), r#""Reichskanzlei""#);
    assert_eq!(sanitize(r#""R 43/1" OR Kabinett"#), r#""R 43/1" OR "Kabinett""#);
}

#[test]
fn test_failed_write_keeps_document_out_of_checkpoint() {
    let fx = Fixture::with_backend(
        &[("a.xml", FAMILY), ("b.xml", CHANCELLERY)],
        FaultyBackend::wrap(Fault::FailFileWrite(2)),
    );
    let run = fx.store.create().unwrap();

    let result = fx.coordinator.run(run.id, &fx.source());
    assert!(matches!(
        result,
        Err(ImportError::Backend(BackendError::TaskFailed { .. }))
    ));
    let failed = fx.store.load(run.id).unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert_eq!(failed.completed_filenames, vec!["a.xml".to_string()]);
    assert_eq!(failed.total_records_imported, FAMILY_RECORDS);
    assert!(failed.error_message.as_deref().unwrap().starts_with("Backend"));

    let report = fx.coordinator.run(run.id, &fx.source()).unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.stats.documents_resumed, 1);
    assert_eq!(report.stats.documents_imported, 1);

    let live = fx.live();
    assert!(live.get_file("f-1").unwrap().is_some());
    assert!(live.get_file("f-r1").unwrap().is_some());
    assert_eq!(fx.live_count(Entity::File), 3);
}

#[test]
fn test_crash_before_swap_resumes_at_swap() {
    let fx = Fixture::with_backend(&[("a.xml", FAMILY)], FaultyBackend::wrap(Fault::CrashBeforeSwap));
    let run = fx.store.create().unwrap();

    let crashed = catch_unwind(AssertUnwindSafe(|| fx.coordinator.run(run.id, &fx.source())));
    assert!(crashed.is_err());
    let stuck = fx.store.load(run.id).unwrap();
    assert_eq!(stuck.status, RunStatus::Swapping);
    assert_eq!(stuck.swap_task, None);

    // The interrupted run still owns the shadows and cannot be cancelled
    assert!(matches!(fx.store.create(), Err(ImportError::RunActive(id)) if id == run.id));
    assert!(matches!(
        fx.store.request_cancel(run.id),
        Err(ImportError::InvalidTransition { .. })
    ));
    assert_eq!(fx.live_count(Entity::File), 0);

    let report = fx.coordinator.run(run.id, &fx.source()).unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.run.total_records_imported, FAMILY_RECORDS);
    assert_eq!(fx.live_count(Entity::File), 2);
    assert!(!fx.backend.index_names().iter().any(|n| n.ends_with("_new")));
    assert!(fx.store.create().is_ok());
}

#[test]
fn test_crash_after_swap_does_not_swap_back() {
    let fx = Fixture::with_backend(&[("a.xml", FAMILY)], FaultyBackend::wrap(Fault::CrashAfterSwap));
    let old = fx.dir.path().join("old.xml.bak");
    std::fs::write(&old, OLD_GENERATION).unwrap();
    fx.coordinator.import_document(&old).unwrap();

    let run = fx.store.create().unwrap();
    let crashed = catch_unwind(AssertUnwindSafe(|| fx.coordinator.run(run.id, &fx.source())));
    assert!(crashed.is_err());
    let stuck = fx.store.load(run.id).unwrap();
    assert_eq!(stuck.status, RunStatus::Swapping);
    assert!(stuck.swap_task.is_some());

    let report = fx.coordinator.run(run.id, &fx.source()).unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);

    let live = fx.live();
    assert!(live.get_file("f-1").unwrap().is_some());
    assert!(live.get_file("f-old").unwrap().is_none());
    assert!(!fx.backend.index_names().iter().any(|n| n.ends_with("_new")));
}

#[test]
fn test_failed_swap_is_retried_on_restart() {
    let fx = Fixture::with_backend(&[("a.xml", FAMILY)], FaultyBackend::wrap(Fault::FailSwap));
    let run = fx.store.create().unwrap();

    let result = fx.coordinator.run(run.id, &fx.source());
    assert!(matches!(
        result,
        Err(ImportError::Backend(BackendError::TaskFailed { .. }))
    ));
    let failed = fx.store.load(run.id).unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert!(failed.swap_task.is_some());
    assert_eq!(fx.live_count(Entity::File), 0);

    let report = fx.coordinator.run(run.id, &fx.source()).unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(fx.live_count(Entity::File), 2);
    assert_eq!(fx.live_count(Entity::Node), 2);
}

#[test]
fn test_interrupted_swap_without_shadows_fails() {
    let fx = Fixture::new(&[("a.xml", FAMILY)]);
    let run = fx.store.create().unwrap();
    fx.store.transition(run.id, RunStatus::Preparing).unwrap();
    fx.store.transition(run.id, RunStatus::Importing).unwrap();
    fx.store.transition(run.id, RunStatus::Swapping).unwrap();

    let result = fx.coordinator.run(run.id, &fx.source());
    assert!(matches!(result, Err(ImportError::ShadowMissing(_))));
    let failed = fx.store.load(run.id).unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    // The run no longer blocks a fresh one
    assert!(fx.store.create().is_ok());
}
