//! Error handling
//!
//! Defines error types and handling for the realm registry.

pub mod handlers;
pub mod types;

pub use types::*;
