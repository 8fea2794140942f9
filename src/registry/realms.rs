//! Module `realms`
//!
//! `RealmRegistry` owns the realm map and the admin slot. The two are guarded
//! by separate locks and no method holds both at once, so admin admission
//! never waits on realm traffic and vice versa. Events for the admin session
//! are built under the realm lock and sent after it is released.

use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{RegistryError, SinkError};
use crate::protocol::envelope::encode_admin_frame;
use crate::protocol::messages::{
    LogMessage, RealmStatusEvent, encode_realm_added, encode_realm_list,
};
use crate::protocol::opcodes::AdminOpcode;
use crate::realm::{RealmFlags, RealmRecord, RealmSnapshot, TimedRingBuffer};
use crate::registry::admin_slot::{AdminSink, AdminSlot};
use crate::session::ConnectionHandle;

/// What `add_or_update` did with the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Added,
    Replaced,
}

/// Registry of realms and the single admin session watching them.
#[derive(Default)]
pub struct RealmRegistry {
    realms: Mutex<BTreeMap<u32, RealmRecord>>,
    admin: Mutex<AdminSlot>,
}

impl RealmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock_realms(&self) -> MutexGuard<'_, BTreeMap<u32, RealmRecord>> {
        self.realms.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_admin(&self) -> MutexGuard<'_, AdminSlot> {
        self.admin.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // --------------------
    // Realm map
    // --------------------

    /// Inserts the record, or replaces one whose connection has gone away.
    ///
    /// The record is marked online before insertion and a REALM_ADDED event
    /// goes to the admin session in both cases. A replacement keeps the old
    /// record's log history. An id still held by a live connection is refused.
    pub fn add_or_update(&self, mut record: RealmRecord) -> Result<Upsert, RegistryError> {
        let id = record.id();
        let (outcome, snapshot) = {
            let mut realms = self.lock_realms();
            record.set_online(true);

            let outcome = match realms.get(&id) {
                Some(existing) if existing.has_live_owner() => {
                    return Err(RegistryError::RealmOwned(id));
                }
                Some(existing) => {
                    record.inherit_history(existing);
                    Upsert::Replaced
                }
                None => Upsert::Added,
            };

            let snapshot = record.snapshot();
            realms.insert(id, record);
            (outcome, snapshot)
        };

        info!("Realm {} ({}) {:?} at {}", id, snapshot.name, outcome, snapshot.address);

        match encode_realm_added(&snapshot) {
            Ok(payload) => self.broadcast(AdminOpcode::RealmAdded, &payload),
            Err(e) => warn!("Could not encode realm {} for admin: {}", id, e),
        }

        Ok(outcome)
    }

    /// Permanently deletes a realm. Returns false if it was not registered.
    pub fn remove(&self, id: u32) -> bool {
        let removed = self.lock_realms().remove(&id).is_some();
        if removed {
            info!("Realm {} removed from registry", id);
        }
        removed
    }

    /// Sets or clears a realm's OFFLINE bit.
    pub fn set_online_status(&self, id: u32, online: bool) -> Result<(), RegistryError> {
        let event = {
            let mut realms = self.lock_realms();
            let record = realms
                .get_mut(&id)
                .ok_or(RegistryError::RealmNotFound(id))?;
            record.set_online(online).then(|| status_event(record))
        };

        if let Some(event) = event {
            self.broadcast(AdminOpcode::RealmStatus, &event.encode());
        }
        Ok(())
    }

    /// Marks the realm offline if `handle` is still the connection that owns it.
    ///
    /// A realm that re-registered over a newer connection is left alone.
    pub fn release_connection(&self, id: u32, handle: &Arc<ConnectionHandle>) -> bool {
        let event = {
            let mut realms = self.lock_realms();
            match realms.get_mut(&id) {
                Some(record) if record.is_owned_by(handle) => {
                    record.set_online(false).then(|| status_event(record))
                }
                Some(_) => {
                    debug!("Realm {} now belongs to another connection", id);
                    return false;
                }
                None => return false,
            }
        };

        if let Some(event) = event {
            info!("Realm {} is now offline", id);
            self.broadcast(AdminOpcode::RealmStatus, &event.encode());
        }
        true
    }

    /// Applies a status update and pushes the delta to the admin session.
    pub fn update_status(
        &self,
        id: u32,
        flags: RealmFlags,
        population: f32,
    ) -> Result<(), RegistryError> {
        let event = {
            let mut realms = self.lock_realms();
            let record = realms
                .get_mut(&id)
                .ok_or(RegistryError::RealmNotFound(id))?;
            record.apply_status(flags, population);
            status_event(record)
        };

        self.broadcast(AdminOpcode::RealmStatus, &event.encode());
        Ok(())
    }

    /// Appends a line to the realm's log buffer.
    pub fn append_log(&self, id: u32, category: u8, text: &str) -> Result<(), RegistryError> {
        let log = self.log_buffer(id).ok_or(RegistryError::RealmNotFound(id))?;
        log.push(LogMessage::new(category, text));
        Ok(())
    }

    /// Shared handle on a realm's log buffer, usable without the registry lock.
    pub fn log_buffer(&self, id: u32) -> Option<Arc<TimedRingBuffer<LogMessage>>> {
        self.lock_realms()
            .get(&id)
            .map(|record| Arc::clone(record.log()))
    }

    pub fn snapshot(&self, id: u32) -> Option<RealmSnapshot> {
        self.lock_realms().get(&id).map(RealmRecord::snapshot)
    }

    /// Snapshots of every realm, ordered by id.
    pub fn snapshot_all(&self) -> Vec<RealmSnapshot> {
        self.lock_realms()
            .values()
            .map(RealmRecord::snapshot)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock_realms().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // --------------------
    // Admin slot
    // --------------------

    /// Admits an admin session and sends it the current realm list.
    ///
    /// Returns `None` if a session is already admitted or the caller already
    /// carries an admin id.
    pub fn admit_admin_session(
        &self,
        sink: Arc<dyn AdminSink>,
        current: Option<u64>,
    ) -> Option<u64> {
        if let Some(existing) = current {
            warn!("Admin session {} asked to be admitted again", existing);
            return None;
        }

        let id = self.lock_admin().admit(Arc::clone(&sink))?;
        info!("Admin session {} admitted", id);

        let realms = self.snapshot_all();
        match encode_realm_list(&realms)
            .and_then(|payload| encode_admin_frame(AdminOpcode::RealmList, &payload))
        {
            Ok(frame) => {
                if let Err(e) = sink.send_frame(frame) {
                    self.handle_sink_error(id, e);
                }
            }
            Err(e) => warn!("Could not encode realm list for admin {}: {}", id, e),
        }

        Some(id)
    }

    /// Removes the admin session if `id` is the one admitted.
    pub fn evict_admin_session(&self, id: u64) -> bool {
        let evicted = self.lock_admin().evict(id);
        if evicted {
            info!("Admin session {} evicted", id);
        }
        evicted
    }

    pub fn admin_session_id(&self) -> Option<u64> {
        self.lock_admin().current().map(|session| session.id())
    }

    /// Id and transport of the admitted admin session, if any.
    pub(crate) fn current_admin(&self) -> Option<(u64, Arc<dyn AdminSink>)> {
        self.lock_admin()
            .current()
            .map(|session| (session.id(), Arc::clone(session.sink())))
    }

    /// Sends one event to the admin session, if there is one.
    fn broadcast(&self, opcode: AdminOpcode, payload: &[u8]) {
        let Some((id, sink)) = self.current_admin() else {
            return;
        };

        let frame = match encode_admin_frame(opcode, payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping {:?} event: {}", opcode, e);
                return;
            }
        };

        if let Err(e) = sink.send_frame(frame) {
            self.handle_sink_error(id, e);
        }
    }

    pub(crate) fn handle_sink_error(&self, id: u64, error: SinkError) {
        match error {
            SinkError::Full => warn!("Admin session {} is not keeping up, event dropped", id),
            SinkError::Closed => {
                warn!("Admin session {} transport closed", id);
                self.evict_admin_session(id);
            }
        }
    }
}

fn status_event(record: &RealmRecord) -> RealmStatusEvent {
    RealmStatusEvent {
        id: record.id(),
        flags: record.flags(),
        population: record.population(),
    }
}
