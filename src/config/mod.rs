// src/config/mod.rs

//! Codemod manifest loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed manifest model (`model.rs`).
//! - Load a manifest and every manifest it references (`loader.rs`).
//! - Turn the raw manifests into a validated [`Codemod`](crate::engine::Codemod)
//!   tree (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_manifest_set};
pub use model::{Manifest, ManifestSet, RawManifest, RawStep};
