//! resume-core - Core types and traits for the resume search engine
//!
//! This crate provides the data model, collaborator traits, configuration,
//! retry policy and error handling shared by every other crate.

pub mod config;
pub mod error;
pub mod retry;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{Result, SearchError, ServiceKind};
pub use retry::RetryPolicy;
pub use traits::*;
pub use types::*;
