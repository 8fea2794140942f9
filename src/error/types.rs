//! Error types
//!
//! Defines domain-specific error types for each layer of the realm registry.

use std::fmt;
use std::io;

/// Envelope framing errors.
///
/// Any of these is a decode fault: the rest of the buffered chunk is dropped
/// but the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes buffered than an envelope header needs.
    TruncatedHeader(usize),
    /// Opcode byte outside the dense opcode table.
    UnknownOpcode(u8),
    /// Declared payload length exceeds the buffered bytes.
    LengthOverrun { declared: usize, available: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::TruncatedHeader(n) => {
                write!(f, "Truncated envelope header ({} bytes buffered)", n)
            }
            DecodeError::UnknownOpcode(op) => write!(f, "Unknown opcode: {}", op),
            DecodeError::LengthOverrun {
                declared,
                available,
            } => write!(
                f,
                "Declared payload length {} exceeds {} buffered bytes",
                declared, available
            ),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Payload field parsing and encoding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    UnexpectedEnd { field: &'static str },
    UnterminatedString { field: &'static str },
    InvalidUtf8 { field: &'static str },
    InvalidValue { field: &'static str, value: u32 },
    TooLarge { field: &'static str, len: usize },
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::UnexpectedEnd { field } => {
                write!(f, "Payload ended before field '{}'", field)
            }
            PayloadError::UnterminatedString { field } => {
                write!(f, "String field '{}' is not null-terminated", field)
            }
            PayloadError::InvalidUtf8 { field } => {
                write!(f, "String field '{}' is not valid UTF-8", field)
            }
            PayloadError::InvalidValue { field, value } => {
                write!(f, "Invalid value {} for field '{}'", value, field)
            }
            PayloadError::TooLarge { field, len } => {
                write!(f, "Field '{}' too large to encode ({} items)", field, len)
            }
        }
    }
}

impl std::error::Error for PayloadError {}

/// Realm map errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    RealmNotFound(u32),
    /// The id is held by a realm whose connection is still open.
    RealmOwned(u32),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::RealmNotFound(id) => write!(f, "Realm not found: {}", id),
            RegistryError::RealmOwned(id) => {
                write!(f, "Realm {} is already registered by a live connection", id)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Failure to hand a frame to the admin session's outbound transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Outbound queue is full; the frame was dropped.
    Full,
    /// Transport is gone; the session should be evicted.
    Closed,
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Full => write!(f, "Admin outbound queue is full"),
            SinkError::Closed => write!(f, "Admin transport is closed"),
        }
    }
}

impl std::error::Error for SinkError {}

/// Admin upgrade errors, reported to the login connection that asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    InsufficientAccess,
    AlreadyAdmitted(u64),
    SlotTaken,
}

impl fmt::Display for AdminError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminError::InsufficientAccess => write!(f, "Insufficient access level for admin mode"),
            AdminError::AlreadyAdmitted(id) => {
                write!(f, "Connection already admitted as admin session {}", id)
            }
            AdminError::SlotTaken => write!(f, "Another admin session is already active"),
        }
    }
}

impl std::error::Error for AdminError {}

/// Harvest tick failures. Checkpoints are left untouched when one occurs.
#[derive(Debug)]
pub enum HarvestError {
    Compression(io::Error),
    Payload(PayloadError),
    Send(SinkError),
}

impl fmt::Display for HarvestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarvestError::Compression(e) => write!(f, "Log batch compression failed: {}", e),
            HarvestError::Payload(e) => write!(f, "Log batch encoding failed: {}", e),
            HarvestError::Send(e) => write!(f, "Log batch send failed: {}", e),
        }
    }
}

impl std::error::Error for HarvestError {}

impl From<PayloadError> for HarvestError {
    fn from(error: PayloadError) -> Self {
        HarvestError::Payload(error)
    }
}

impl From<SinkError> for HarvestError {
    fn from(error: SinkError) -> Self {
        HarvestError::Send(error)
    }
}

/// General registry server error that encompasses all error types
#[derive(Debug)]
pub enum RegistryServerError {
    Decode(DecodeError),
    Payload(PayloadError),
    Registry(RegistryError),
    Admin(AdminError),
    Harvest(HarvestError),
    Config(config::ConfigError),
    IoError(io::Error),
}

impl fmt::Display for RegistryServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryServerError::Decode(e) => write!(f, "Decode error: {}", e),
            RegistryServerError::Payload(e) => write!(f, "Payload error: {}", e),
            RegistryServerError::Registry(e) => write!(f, "Registry error: {}", e),
            RegistryServerError::Admin(e) => write!(f, "Admin error: {}", e),
            RegistryServerError::Harvest(e) => write!(f, "Harvest error: {}", e),
            RegistryServerError::Config(e) => write!(f, "Configuration error: {}", e),
            RegistryServerError::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for RegistryServerError {}

impl From<DecodeError> for RegistryServerError {
    fn from(error: DecodeError) -> Self {
        RegistryServerError::Decode(error)
    }
}

impl From<PayloadError> for RegistryServerError {
    fn from(error: PayloadError) -> Self {
        RegistryServerError::Payload(error)
    }
}

impl From<RegistryError> for RegistryServerError {
    fn from(error: RegistryError) -> Self {
        RegistryServerError::Registry(error)
    }
}

impl From<AdminError> for RegistryServerError {
    fn from(error: AdminError) -> Self {
        RegistryServerError::Admin(error)
    }
}

impl From<HarvestError> for RegistryServerError {
    fn from(error: HarvestError) -> Self {
        RegistryServerError::Harvest(error)
    }
}

impl From<config::ConfigError> for RegistryServerError {
    fn from(error: config::ConfigError) -> Self {
        RegistryServerError::Config(error)
    }
}

impl From<io::Error> for RegistryServerError {
    fn from(error: io::Error) -> Self {
        RegistryServerError::IoError(error)
    }
}
