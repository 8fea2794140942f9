//! Module `record`
//!
//! Defines `RealmRecord`, the registry's entry for one realm, and the
//! `RealmSnapshot` copy handed out for wire transmission.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use tokio::time::Instant;

use crate::protocol::messages::{LogMessage, RegistrationRequest};
use crate::realm::ring_buffer::TimedRingBuffer;
use crate::realm::types::{AccessLevel, RealmFlags, RealmType, Timezone};
use crate::session::ConnectionHandle;

/// Log lines retained per realm.
pub const SERVER_LOG_BUFFER_SIZE: usize = 1024;

/// Read-only copy of a realm's advertised data.
#[derive(Debug, Clone, PartialEq)]
pub struct RealmSnapshot {
    pub id: u32,
    pub name: String,
    pub address: String,
    pub game_port: u32,
    pub flags: RealmFlags,
    pub realm_type: RealmType,
    pub min_access_level: AccessLevel,
    pub timezone: Timezone,
    pub max_players: u32,
    pub online_players: u32,
    pub population: f32,
    pub accepted_builds: BTreeSet<u32>,
}

/// A registered realm.
///
/// Outlives the connection that registered it: the owner is held weakly and
/// a disconnect only sets the OFFLINE flag.
pub struct RealmRecord {
    id: u32,
    name: String,
    address: String,
    game_port: u32,
    flags: RealmFlags,
    realm_type: RealmType,
    min_access_level: AccessLevel,
    timezone: Timezone,
    max_players: u32,
    online_players: u32,
    population: f32,
    accepted_builds: BTreeSet<u32>,
    log: Arc<TimedRingBuffer<LogMessage>>,
    last_harvest: Option<Instant>,
    owner: Weak<ConnectionHandle>,
}

impl RealmRecord {
    /// Builds a record from a registration request received from `address`.
    pub fn from_registration(
        request: RegistrationRequest,
        address: String,
        owner: Weak<ConnectionHandle>,
    ) -> Self {
        let population = if request.max_players == 0 {
            0.0
        } else {
            request.online_players as f32 / request.max_players as f32
        };

        Self {
            id: request.realm_id,
            name: request.name,
            address,
            game_port: request.game_port,
            flags: request.flags,
            realm_type: request.realm_type,
            min_access_level: request.min_access_level,
            timezone: request.timezone,
            max_players: request.max_players,
            online_players: request.online_players,
            population,
            accepted_builds: request.builds.into_iter().collect(),
            log: Arc::new(TimedRingBuffer::new(SERVER_LOG_BUFFER_SIZE)),
            last_harvest: None,
            owner,
        }
    }

    // --------------------
    // Getter methods
    // --------------------

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn flags(&self) -> RealmFlags {
        self.flags
    }

    pub fn population(&self) -> f32 {
        self.population
    }

    pub fn is_online(&self) -> bool {
        !self.flags.is_offline()
    }

    /// Shared handle on the realm's log buffer.
    pub fn log(&self) -> &Arc<TimedRingBuffer<LogMessage>> {
        &self.log
    }

    /// Stamp of the newest log entry delivered to an admin session, or
    /// `None` if nothing was delivered yet.
    pub fn last_harvest(&self) -> Option<Instant> {
        self.last_harvest
    }

    /// True while the registering connection is still open.
    pub fn has_live_owner(&self) -> bool {
        self.owner
            .upgrade()
            .is_some_and(|handle| !handle.is_closed())
    }

    /// True if `handle` is the connection that registered this record.
    pub fn is_owned_by(&self, handle: &Arc<ConnectionHandle>) -> bool {
        std::ptr::eq(self.owner.as_ptr(), Arc::as_ptr(handle))
    }

    pub fn snapshot(&self) -> RealmSnapshot {
        RealmSnapshot {
            id: self.id,
            name: self.name.clone(),
            address: self.address.clone(),
            game_port: self.game_port,
            flags: self.flags,
            realm_type: self.realm_type,
            min_access_level: self.min_access_level,
            timezone: self.timezone,
            max_players: self.max_players,
            online_players: self.online_players,
            population: self.population,
            accepted_builds: self.accepted_builds.clone(),
        }
    }

    // --------------------
    // Setter methods
    // --------------------

    /// Sets or clears the OFFLINE bit. Returns true if it changed.
    pub fn set_online(&mut self, online: bool) -> bool {
        let before = self.flags;
        self.flags = if online {
            self.flags.without(RealmFlags::OFFLINE)
        } else {
            self.flags.with(RealmFlags::OFFLINE)
        };
        before != self.flags
    }

    /// Applies a status update; the OFFLINE bit is kept as it is.
    pub fn apply_status(&mut self, flags: RealmFlags, population: f32) {
        let offline = self.flags.is_offline();
        self.flags = flags.without(RealmFlags::OFFLINE);
        if offline {
            self.flags = self.flags.with(RealmFlags::OFFLINE);
        }
        self.population = population;
    }

    pub fn set_last_harvest(&mut self, at: Instant) {
        self.last_harvest = Some(at);
    }

    /// Carries log history and harvest progress over from the record this
    /// one replaces.
    pub fn inherit_history(&mut self, previous: &RealmRecord) {
        self.log = Arc::clone(&previous.log);
        self.last_harvest = previous.last_harvest;
    }
}
