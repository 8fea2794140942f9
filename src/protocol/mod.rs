//! Wire protocol
//!
//! Envelope framing, opcode tables, and payload schemas for the realm channel
//! and the admin fan-out channel.

pub mod envelope;
pub mod messages;
pub mod opcodes;
pub mod payload;

pub use envelope::{DecodedChunk, Envelope, decode_chunk, encode_admin_frame};
pub use messages::{LogMessage, RegistrationRequest, StatusUpdate};
pub use opcodes::{AdminOpcode, SrvComOpcode};
