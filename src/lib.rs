//! archindex: finding-aid import and search indexing for a state archive
//!
//! Imports EAD finding aids into a search backend:
//! - Tree walk with double-header collapse and provisional id resolution
//! - Unit-date parsing with single-digit year correction
//! - Batched, validated upserts of nodes, files and origins
//! - Full reimports into shadow indexes with checkpointed resume and an atomic swap
//! - Query sanitizing for the trigram full-text table

pub mod backend;
pub mod config;
pub mod import;
pub mod query;
pub mod types;

pub use config::Config;
pub use types::*;
