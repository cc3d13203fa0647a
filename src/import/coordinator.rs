//! Import coordinator that orchestrates full reimports
//!
//! A full run builds a fresh generation of all three indexes under shadow
//! names, checkpointing after every document, then swaps the shadows into the
//! live names in one backend operation:
//!
//! ```text
//! pending -> preparing -> importing -> swapping -> completed
//!              \______________\___________\-----> failed
//!              \______________\-----------------> cancelled
//! ```
//!
//! A document is checkpointed only after its writes were confirmed by the
//! backend. A run interrupted while swapping resumes at the swap: the recorded
//! swap task tells whether the shadows were already swapped in.

use super::batch::FlushSummary;
use super::cache::IdentityCache;
use super::ead::EadDocument;
use super::progress::ImportProgress;
use super::run::{ImportRun, RunStatus, RunStore};
use super::source::{DocumentOutcome, DocumentSource, ImportConfig, ImportError, ImportStats};
use super::walker::{TreeWalker, WalkOutcome};
use crate::backend::{
    expect_task, wait_for_task, wait_until_idle, Entity, Generation, IndexNames, RecordSink,
    SearchBackend, TaskOutcome,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Keys of derived read-side caches that go stale when the live indexes change
pub const DERIVED_CACHE_KEYS: [&str; 5] = [
    "browse/tab_counts",
    "browse/fonds_letters",
    "browse/origin_letters",
    "archive_files/decade_counts",
    "origins/with_file_counts",
];

/// Hook for dropping read-side caches after the live indexes changed
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, keys: &[&str]);
}

/// Invalidator that only records the invalidation in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInvalidator;

impl CacheInvalidator for LoggingInvalidator {
    fn invalidate(&self, keys: &[&str]) {
        info!(?keys, "Invalidated derived caches");
    }
}

/// How a run ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// Final run state and the counters of this invocation
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub run: ImportRun,
    pub stats: ImportStats,
}

/// Import coordinator for full and single-document imports
pub struct ImportCoordinator {
    config: ImportConfig,
    backend: Arc<dyn SearchBackend>,
    names: IndexNames,
    store: Arc<RunStore>,
    invalidator: Arc<dyn CacheInvalidator>,
    quiet: bool,
}

impl ImportCoordinator {
    pub fn store(&self) -> &RunStore {
        &self.store
    }

    pub fn names(&self) -> &IndexNames {
        &self.names
    }

    /// Create a run and execute it
    pub fn start(&self, source: &dyn DocumentSource) -> Result<RunReport, ImportError> {
        let run = self.store.create()?;
        self.run(run.id, source)
    }

    /// Execute (or resume) a run from its checkpoint
    ///
    /// Any error marks the run failed before it is returned.
    pub fn run(&self, run_id: i64, source: &dyn DocumentSource) -> Result<RunReport, ImportError> {
        let run = self.store.load(run_id)?;
        if !run.status.is_restartable() {
            return Err(ImportError::InvalidTransition {
                id: run_id,
                from: run.status.to_string(),
                to: RunStatus::Preparing.to_string(),
            });
        }

        info!(run_id, source = %source.source_name(), resumed = !run.completed_filenames.is_empty(), "Starting import run");
        let progress = ImportProgress::new(Some(0), self.quiet);

        match self.execute(run_id, source, &progress) {
            Ok(report) => {
                if !self.quiet {
                    progress.print_summary();
                }
                Ok(report)
            }
            Err(e) => {
                progress.abandon("Failed");
                error!(run_id, error = %e, "Import run failed");
                if let Err(store_err) = self.store.fail(run_id, &e) {
                    warn!(run_id, error = %store_err, "Could not record run failure");
                }
                Err(e)
            }
        }
    }

    fn execute(
        &self,
        run_id: i64,
        source: &dyn DocumentSource,
        progress: &ImportProgress,
    ) -> Result<RunReport, ImportError> {
        let run = self.store.load(run_id)?;
        if run.status == RunStatus::Swapping || run.swap_task.is_some() {
            return self.resume_swap(run, progress);
        }
        if run.should_stop() {
            return self.cancel(run_id, progress);
        }

        let run = self.store.transition(run_id, RunStatus::Preparing)?;
        let documents = source.documents()?;
        self.store.set_total_files(run_id, documents.len())?;
        progress.set_total(documents.len() as u64);

        if run.completed_filenames.is_empty() {
            self.prepare_shadow_indexes()?;
        } else {
            info!(
                run_id,
                checkpointed = run.completed_filenames.len(),
                "Resuming run; keeping existing shadow indexes"
            );
        }

        self.store.transition(run_id, RunStatus::Importing)?;
        let sink = RecordSink::new(self.backend.clone(), self.names.clone(), Generation::Shadow);
        let mut shared_cache = IdentityCache::new();

        for document in &documents {
            // Cancellation is honoured between documents only
            let run = self.store.load(run_id)?;
            if run.should_stop() {
                return self.cancel(run_id, progress);
            }
            if run.is_checkpointed(&document.name) {
                debug!(run_id, file = %document.name, "Already imported");
                progress.document_resumed();
                continue;
            }

            self.store.set_current_file(run_id, Some(&document.name))?;
            progress.document_started(&document.name);

            let mut private_cache = IdentityCache::new();
            let cache = if self.config.share_node_cache {
                &mut shared_cache
            } else {
                &mut private_cache
            };
            let outcome = self.import_into(&document.path, cache, &sink, progress, false)?;
            // A document whose writes did not land stays out of the checkpoint
            sink.confirm_writes(self.config.task_timeout, self.config.poll_interval)?;

            let run = self
                .store
                .mark_file_completed(run_id, &document.name, outcome.records() as u64)?;
            progress.document_finished(matches!(outcome, DocumentOutcome::Imported { .. }));
            info!(
                run_id,
                file = %document.name,
                records = outcome.records(),
                completed = run.completed_files,
                total = run.total_files,
                "Document checkpointed"
            );
        }

        self.store.transition(run_id, RunStatus::Swapping)?;
        self.swap(run_id, &sink)?;
        self.complete(run_id, progress)
    }

    /// Continue a run that stopped after entering the swap
    fn resume_swap(&self, run: ImportRun, progress: &ImportProgress) -> Result<RunReport, ImportError> {
        let run_id = run.id;
        info!(run_id, swap_task = ?run.swap_task, "Resuming interrupted swap");
        progress.set_total(run.total_files as u64);
        if run.status != RunStatus::Swapping {
            self.store.transition(run_id, RunStatus::Swapping)?;
        }

        if let Some(task) = run.swap_task {
            let backend = self.backend.as_ref();
            match wait_for_task(backend, task, self.config.swap_timeout, self.config.poll_interval)? {
                TaskOutcome::Succeeded => {
                    info!(run_id, task, "Swap had already completed");
                    return self.complete(run_id, progress);
                }
                TaskOutcome::Failed(reason) => {
                    warn!(run_id, task, %reason, "Previous swap failed; swapping again");
                    self.store.set_swap_task(run_id, None)?;
                }
                TaskOutcome::TimedOut => {
                    return Err(ImportError::Timeout(format!("swap task {} still pending", task)));
                }
            }
        }

        // No swap took effect, so the shadows must still hold the new generation
        for entity in Entity::ALL {
            let shadow = self.names.shadow(entity);
            match self.backend.index_stats(&shadow) {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    return Err(ImportError::ShadowMissing(shadow));
                }
                Err(e) => return Err(e.into()),
            }
        }

        let sink = RecordSink::new(self.backend.clone(), self.names.clone(), Generation::Shadow);
        self.swap(run_id, &sink)?;
        self.complete(run_id, progress)
    }

    /// Remove the old generation and mark the run completed
    fn complete(&self, run_id: i64, progress: &ImportProgress) -> Result<RunReport, ImportError> {
        self.cleanup();

        let run = self.store.transition(run_id, RunStatus::Completed)?;
        progress.finish();
        info!(
            run_id,
            records = run.total_records_imported,
            files = run.completed_files,
            "Import run completed"
        );

        Ok(RunReport {
            outcome: RunOutcome::Completed,
            run,
            stats: progress.get_stats(),
        })
    }

    fn cancel(&self, run_id: i64, progress: &ImportProgress) -> Result<RunReport, ImportError> {
        let run = self.store.transition(run_id, RunStatus::Cancelled)?;
        progress.abandon("Cancelled");
        info!(run_id, completed = run.completed_files, "Import run cancelled");
        Ok(RunReport {
            outcome: RunOutcome::Cancelled,
            run,
            stats: progress.get_stats(),
        })
    }

    /// Drop and recreate every shadow index with its schema, and make sure the
    /// live indexes exist so the swap has a partner
    fn prepare_shadow_indexes(&self) -> Result<(), ImportError> {
        let backend = self.backend.as_ref();
        let (timeout, interval) = (self.config.task_timeout, self.config.poll_interval);

        for entity in Entity::ALL {
            let schema = entity.schema();
            let shadow = self.names.shadow(entity);

            if let Some(task) = backend.delete_index(&shadow)? {
                expect_task(backend, task, timeout, interval)?;
            }
            let task = backend.create_index(&shadow, &schema.primary_key)?;
            expect_task(backend, task, timeout, interval)?;
            let task = backend.configure_index(&shadow, &schema)?;
            expect_task(backend, task, timeout, interval)?;

            let live = self.names.live(entity);
            let task = backend.create_index(&live, &schema.primary_key)?;
            match wait_for_task(backend, task, timeout, interval)? {
                TaskOutcome::Succeeded => {
                    let task = backend.configure_index(&live, &schema)?;
                    expect_task(backend, task, timeout, interval)?;
                    info!(index = %live, "Created missing live index");
                }
                TaskOutcome::Failed(reason) if reason.contains("already_exists") => {}
                TaskOutcome::Failed(reason) => {
                    return Err(crate::backend::BackendError::TaskFailed { task, reason }.into());
                }
                TaskOutcome::TimedOut => {
                    return Err(ImportError::Timeout(format!("creating index {}", live)));
                }
            }
            debug!(index = %shadow, "Shadow index ready");
        }
        info!(environment = ?self.names, "Prepared shadow indexes");
        Ok(())
    }

    /// Wait for the shadow generation to settle, then swap it in atomically
    fn swap(&self, run_id: i64, sink: &RecordSink) -> Result<(), ImportError> {
        let backend = self.backend.as_ref();
        let interval = self.config.poll_interval;

        let confirmed = sink.confirm_writes(self.config.task_timeout, interval)?;
        debug!(tasks = confirmed, "Confirmed shadow writes");

        let shadows: Vec<String> = Entity::ALL.iter().map(|&e| self.names.shadow(e)).collect();
        let uids: Vec<&str> = shadows.iter().map(String::as_str).collect();
        if !wait_until_idle(backend, &uids, self.config.indexing_timeout, interval)? {
            return Err(ImportError::Timeout(format!(
                "shadow indexes still indexing after {}s",
                self.config.indexing_timeout.as_secs()
            )));
        }

        let task = backend.swap_indexes(&self.names.swap_pairs())?;
        self.store.set_swap_task(run_id, Some(task))?;
        expect_task(backend, task, self.config.swap_timeout, interval)?;
        info!(task, "Swapped shadow indexes into place");
        Ok(())
    }

    /// Remove the previous generation (now under the shadow names) and drop
    /// derived caches
    fn cleanup(&self) {
        let backend = self.backend.as_ref();
        for entity in Entity::ALL {
            let stale = self.names.shadow(entity);
            let result = backend.delete_index(&stale).and_then(|task| match task {
                Some(task) => expect_task(
                    backend,
                    task,
                    self.config.task_timeout,
                    self.config.poll_interval,
                ),
                None => Ok(()),
            });
            if let Err(e) = result {
                warn!(index = %stale, error = %e, "Could not delete previous index generation");
            }
        }
        self.invalidator.invalidate(&DERIVED_CACHE_KEYS);
    }

    /// Import one document straight into the live indexes
    ///
    /// Uses its own identity cache and flushes whenever the flush threshold is
    /// reached, so several of these may run side by side.
    pub fn import_document(&self, path: &Path) -> Result<DocumentOutcome, ImportError> {
        let sink = RecordSink::new(self.backend.clone(), self.names.clone(), Generation::Live);
        let progress = ImportProgress::quiet();
        let mut cache = IdentityCache::new();

        let outcome = self.import_into(path, &mut cache, &sink, &progress, true)?;
        sink.confirm_writes(self.config.task_timeout, self.config.poll_interval)?;
        info!(file = %path.display(), records = outcome.records(), "Imported document");
        Ok(outcome)
    }

    fn import_into(
        &self,
        path: &Path,
        cache: &mut IdentityCache,
        sink: &RecordSink,
        progress: &ImportProgress,
        streaming: bool,
    ) -> Result<DocumentOutcome, ImportError> {
        let document = EadDocument::open(path)?;
        let mut walker = TreeWalker::new(&self.config, cache, progress);
        if streaming {
            walker = walker.streaming_to(sink);
        }

        match walker.walk(&document)? {
            WalkOutcome::Skipped { description_type } => {
                info!(
                    file = %path.display(),
                    description_type = description_type.as_deref().unwrap_or("none"),
                    "Skipping document that is not an inventory"
                );
                Ok(DocumentOutcome::Skipped { description_type })
            }
            WalkOutcome::Walked { nodes, files } => {
                walker.flush(sink)?;
                let written: FlushSummary = walker.written();
                debug!(
                    file = %path.display(),
                    nodes,
                    files,
                    written_nodes = written.nodes,
                    written_files = written.files,
                    written_origins = written.origins,
                    "Walked document"
                );
                Ok(DocumentOutcome::Imported {
                    records: written.total(),
                })
            }
        }
    }
}

/// Builder for ImportCoordinator with sensible defaults
pub struct ImportCoordinatorBuilder {
    config: ImportConfig,
    backend: Arc<dyn SearchBackend>,
    names: IndexNames,
    store: Arc<RunStore>,
    invalidator: Arc<dyn CacheInvalidator>,
    quiet: bool,
}

impl ImportCoordinatorBuilder {
    pub fn new(backend: Arc<dyn SearchBackend>, names: IndexNames, store: Arc<RunStore>) -> Self {
        Self {
            config: ImportConfig::default(),
            backend,
            names,
            store,
            invalidator: Arc::new(LoggingInvalidator),
            quiet: false,
        }
    }

    /// Set import configuration
    pub fn with_config(mut self, config: ImportConfig) -> Self {
        self.config = config;
        self
    }

    /// Set quiet mode
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_cache_invalidator(mut self, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        self.invalidator = invalidator;
        self
    }

    /// Build the coordinator
    pub fn build(self) -> Result<ImportCoordinator, ImportError> {
        if self.config.slice_size == 0 {
            return Err(ImportError::Config("slice size must be at least 1".into()));
        }
        if self.config.flush_threshold == 0 {
            return Err(ImportError::Config("flush threshold must be at least 1".into()));
        }
        Ok(ImportCoordinator {
            config: self.config,
            backend: self.backend,
            names: self.names,
            store: self.store,
            invalidator: self.invalidator,
            quiet: self.quiet,
        })
    }
}
