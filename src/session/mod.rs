//! Realm connections
//!
//! A `RegistrationSession` per accepted realm connection, its state machine,
//! and the opcode dispatch table.

pub mod dispatch;
pub mod handler;
pub mod state;

pub use dispatch::SessionCore;
pub use handler::{DEADLINE_RESPONSE_TIME, HEARTBEAT_INTERVAL, RegistrationSession};
pub use state::{ConnectionHandle, ConnectionState, SessionStatus};
