//! Finding-aid import pipeline
//!
//! Reads EAD finding aids, turns their component trees into archive nodes,
//! file records and origins, and writes them to the search backend.
//!
//! # Example Usage
//!
//! ```no_run
//! use archindex::backend::{IndexNames, MemoryBackend};
//! use archindex::import::{DirectorySource, ImportCoordinatorBuilder, RunStore};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RunStore::open("runs.sqlite3")?);
//! let coordinator = ImportCoordinatorBuilder::new(
//!     Arc::new(MemoryBackend::new()),
//!     IndexNames::new("development"),
//!     store,
//! )
//! .with_quiet(true)
//! .build()?;
//!
//! let report = coordinator.start(&DirectorySource::new("data/ead"))?;
//! println!("Imported {} records", report.run.total_records_imported);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Import Coordinator                          │
//! │        (run state, checkpoints, shadow indexes, atomic swap)        │
//! └─────────────────────────────────────────────────────────────────────┘
//!          │ per document                              ▲ flush at
//!          ▼                                           │ document end
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │   EadDocument   │───▶│   TreeWalker    │───▶│  PendingBatch   │
//! │ (element tree)  │    │ (collapse, ids) │    │ (lazy ancestors)│
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//!                                 │                     │
//!                                 ▼                     ▼
//!                        ┌─────────────────┐    ┌─────────────────┐
//!                        │  IdentityCache  │    │   RecordSink    │
//!                        │ (arena, aliases)│    │ (shadow / live) │
//!                        └─────────────────┘    └─────────────────┘
//! ```

pub mod batch;
pub mod cache;
pub mod coordinator;
pub mod ead;
pub mod progress;
pub mod run;
pub mod source;
pub mod unit_date;
pub mod walker;

// Re-export main types
pub use batch::{FlushSummary, PendingBatch};
pub use cache::{IdentityCache, NodeHandle, Reassignment};
pub use coordinator::{
    CacheInvalidator, ImportCoordinator, ImportCoordinatorBuilder, LoggingInvalidator, RunOutcome,
    RunReport, DERIVED_CACHE_KEYS,
};
pub use ead::{EadDocument, Element};
pub use progress::ImportProgress;
pub use run::{ImportRun, RunStatus, RunStore};
pub use source::{
    DirectorySource, DocumentOutcome, DocumentSource, ImportConfig, ImportError, ImportStats,
    SourceDocument,
};
pub use unit_date::UnitDate;
pub use walker::{TreeWalker, WalkOutcome};
