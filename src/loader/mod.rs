//! Policy loading.
//!
//! Sources are read and validated by `policy_loader`, cached with a per-entry
//! TTL in `policy_cache`, and combined into the effective policy by `merger`.

pub mod merger;
pub mod policy_cache;
pub mod policy_loader;

pub use merger::merge;
pub use policy_cache::PolicyCache;
pub use policy_loader::{discover_policy_files, resolve_sources, LoadReport, PolicyLoader};
