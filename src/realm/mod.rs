//! Realm data model
//!
//! Realm records, their wire enumerations, and the per-realm log buffer.

pub mod record;
pub mod ring_buffer;
pub mod types;

pub use record::{RealmRecord, RealmSnapshot, SERVER_LOG_BUFFER_SIZE};
pub use ring_buffer::{Timed, TimedRingBuffer};
pub use types::{AccessLevel, RealmFlags, RealmType, Timezone};
