//! # MAI Common Library
//!
//! Shared code for the Memories AI Ingestor services including:
//! - Error type shared across crates
//! - Root folder and TOML configuration resolution
//! - Crash-safe file writes (temp + fsync + rename)
//! - Identifier generation

pub mod config;
pub mod error;
pub mod fs;
pub mod uuid_utils;

pub use error::{Error, Result};
