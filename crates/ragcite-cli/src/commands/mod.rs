//! CLI command handlers

pub mod compare;
pub mod config;
pub mod eval;
pub mod ingest;
pub mod ls;
pub mod query;
pub mod remove;
pub mod sessions;
pub mod status;
