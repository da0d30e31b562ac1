//! CLI command implementations
//!
//! This module contains all CLI command implementations.

pub mod detect;
pub mod import;
pub mod init;
pub mod validate;
