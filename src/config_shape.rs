//! Documents the shape of the persistent configuration collaborator
//! (`spec.md` §6 "Persistent configuration collaborator"), which is
//! explicitly out of scope for this crate: JSON load/save of that document
//! lives in an external tool, not here. This type exists purely as the
//! agreed field layout a writer of that tool can target; this crate neither
//! constructs nor reads one.
//!
//! No `serde` impls are provided on purpose — adding them would imply this
//! crate participates in (de)serialising the document, which §1's
//! "Out of scope" list reserves for the configuration component.

/// The JSON document shape written by the external configuration
/// component at `<local-config-dir>/<project_name>/<name>_config.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigShape {
    pub project_name: String,
    pub name: String,
    pub shm_path: String,
    pub num_connections: u32,
    pub library_version: String,
    pub shm_size: u64,
    pub element_size: u64,
    pub element_type: String,
}
