// Pastoralist - override provenance for package.json
// Records why each dependency override exists and prunes the ones nothing needs

pub mod appendix;
pub mod cli;
pub mod context;
pub mod manifest;
pub mod models;
pub mod orphans;
pub mod overrides;
pub mod patches;
pub mod persist;
pub mod security;
pub mod services;
pub mod workspace;

pub use anyhow::{Context, Result};
pub use colored::Colorize;

// Re-export commonly used types
pub use context::RunContext;
pub use models::{Appendix, AppendixEntry, Dialect, Ledger, OverrideValue, OverridesMap};
pub use services::{update, Collaborators, UpdateOptions, UpdateReport};
