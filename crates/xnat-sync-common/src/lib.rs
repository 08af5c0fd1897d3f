//! xnat-sync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared building blocks for the xnat-sync workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`CommonError`] and the crate [`Result`] alias
//! - **Logging**: subscriber setup driven by [`logging::LogConfig`]
//! - **DICOM**: the [`dicom::DicomStore`] field read/write seam and content sniffing
//! - **Credentials**: `.netrc` lookup by hostname
//!
//! # Example
//!
//! ```no_run
//! use xnat_sync_common::dicom::{DicomKey, DicomStore, FileDicomStore};
//!
//! fn modality(path: &std::path::Path) -> xnat_sync_common::Result<Option<String>> {
//!     FileDicomStore.read_field(path, &DicomKey::name("Modality"))
//! }
//! ```

pub mod credentials;
pub mod dicom;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
