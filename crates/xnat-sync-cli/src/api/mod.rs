//! Archive API
//!
//! Gateway, endpoint paths, response types and failure classification.

pub mod classify;
pub mod client;
pub mod endpoints;
pub mod types;

pub use classify::{ClassifiedFailure, FailureMode};
pub use client::XnatClient;
pub use types::*;
