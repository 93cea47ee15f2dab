//! Core functionality module
//!
//! Configuration management and the error taxonomy shared by every other
//! module.
//!
//! # Submodules
//!
//! - `config` - Configuration loading, saving, and validation
//! - `error` - Error types and result aliases

pub mod config;
pub mod error;
