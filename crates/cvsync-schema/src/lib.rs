//! Manifest parsing and desired state for cvsync.
//!
//! This crate defines the schema layer: the TOML configlet manifest
//! (`ManifestV1`) and its validated form (`DesiredState`), which is what the
//! reconciliation engine consumes.

pub mod desired;
pub mod manifest;

pub use desired::{DesiredState, Ensure, DEFAULT_TIMEOUT_SECS};
pub use manifest::{
    parse_manifest_file, parse_manifest_str, ConfigletSection, ManifestError, ManifestV1,
};
