//! Command implementations for the Tributary CLI

pub mod check;
pub mod ingest;
