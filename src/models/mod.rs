pub mod appendix;
pub mod config;
pub mod lenient;
pub mod manifest;
pub mod overrides;

pub use appendix::{Appendix, AppendixEntry, Ledger};
pub use config::{DepPaths, PastoralistConfig, SecurityConfig};
pub use manifest::{PackageJson, Workspaces};
pub use overrides::{Dialect, OverrideConfig, OverrideValue, OverridesMap};
