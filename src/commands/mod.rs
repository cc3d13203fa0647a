//! Command implementations for the CLI

pub mod import;
pub mod init;
pub mod search;
pub mod status;
