//! Command handlers
//!
//! Each handler reports through [`crate::output::Output`] and returns whether
//! the operation fully succeeded.

pub mod export;
pub mod import;
pub mod maintenance;
