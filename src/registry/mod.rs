//! Realm registry
//!
//! Shared realm map, the single admin session slot, and the log harvester
//! that feeds it.

pub mod admin_slot;
pub mod harvester;
pub mod realms;

pub use admin_slot::{AdminSession, AdminSink};
pub use harvester::{HARVEST_INTERVAL, HarvestOutcome, spawn_harvester};
pub use realms::{RealmRegistry, Upsert};
