//! Server core functionality
//!
//! Listener setup and the accept loop that spawns realm sessions, the log
//! harvester, and the optional admin listener.

pub mod core;

pub use core::Server;
