//! Appendix reconciliation

pub mod builder;

pub use builder::{AppendixBuilder, LedgerSources, ManifestInput};
