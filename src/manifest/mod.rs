//! Manifest access: cached reads, guarded writes, dialect detection

pub mod accessor;
pub mod dialect;

pub use accessor::{load_manifest, load_raw, normalize_path, write_manifest, ManifestError};
pub use dialect::{existing_dialect, resolve_dialect, PackageManager};
