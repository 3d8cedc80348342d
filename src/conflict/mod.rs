//! Optimistic validation of commits.
//!
//! [`detection`] compares a committing transaction's read and write sets with
//! the documents published since it read them; [`resolution`] decides what a
//! commit does about the conflicts found.

pub mod detection;
pub mod resolution;
