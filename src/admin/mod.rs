//! Admin fan-out
//!
//! Privilege-gated upgrade into the single admin session, and a local
//! listener that serves it over TCP.

pub mod channel;
pub mod listener;

pub use channel::AdminChannel;
pub use listener::{ADMIN_QUEUE_DEPTH, serve_admin};
