//! Query preparation for the search indexes

pub mod trigram;

pub use trigram::{sanitize, TrigramToken};
