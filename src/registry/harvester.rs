//! Background log harvester.
//!
//! Every tick drains the log lines each realm gathered since its checkpoint,
//! compresses them into one LOG_BATCH and pushes it to the admin session.
//! A checkpoint is the stamp of the newest line delivered; log stamps are
//! strictly increasing, so a line pushed while a tick runs is picked up by
//! the next one. Checkpoints only move once the batch has been handed to the
//! transport, so a failed tick is retried in full on the next one.

use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::HarvestError;
use crate::protocol::envelope::encode_admin_frame;
use crate::protocol::messages::{RealmLogs, compress_log_batch, encode_log_batch};
use crate::protocol::opcodes::AdminOpcode;
use crate::registry::realms::RealmRegistry;

pub const HARVEST_INTERVAL: Duration = Duration::from_millis(400);

/// What one harvest tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestOutcome {
    /// No admin session, or no realms.
    Idle,
    NothingNew,
    Sent { realms: usize, entries: usize },
}

impl RealmRegistry {
    /// Runs one harvest tick.
    pub fn harvest_tick(&self) -> Result<HarvestOutcome, HarvestError> {
        // admin lock is released before the realm lock is taken
        let Some((admin_id, sink)) = self.current_admin() else {
            return Ok(HarvestOutcome::Idle);
        };

        let mut realms = self.lock_realms();
        if realms.is_empty() {
            return Ok(HarvestOutcome::Idle);
        }

        let mut harvested = Vec::new();
        let mut checkpoints = Vec::new();
        for record in realms.values() {
            let fresh = match record.last_harvest() {
                Some(checkpoint) => record.log().get_all_after(checkpoint),
                None => record.log().get_all(),
            };
            // newest first, so the first stamp is the new checkpoint
            let Some(newest) = fresh.first().map(|timed| timed.at) else {
                continue;
            };

            checkpoints.push((record.id(), newest));
            harvested.push(RealmLogs {
                realm_id: record.id(),
                entries: fresh.into_iter().rev().map(|timed| timed.item).collect(),
            });
        }

        if harvested.is_empty() {
            return Ok(HarvestOutcome::NothingNew);
        }

        let raw = encode_log_batch(&harvested)?;
        let body = compress_log_batch(&raw)?;
        let frame = encode_admin_frame(AdminOpcode::LogBatch, &body)?;

        if let Err(e) = sink.send_frame(frame) {
            drop(realms);
            self.handle_sink_error(admin_id, e.clone());
            return Err(e.into());
        }

        for (id, newest) in checkpoints {
            if let Some(record) = realms.get_mut(&id) {
                record.set_last_harvest(newest);
            }
        }
        let entries = harvested.iter().map(|logs| logs.entries.len()).sum();

        Ok(HarvestOutcome::Sent {
            realms: harvested.len(),
            entries,
        })
    }
}

/// Spawns the periodic harvester. It stops when `shutdown` is cancelled.
pub fn spawn_harvester(registry: Arc<RealmRegistry>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HARVEST_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Log harvester stopped");
                    break;
                }
                _ = ticker.tick() => match registry.harvest_tick() {
                    Ok(HarvestOutcome::Sent { realms, entries }) => {
                        debug!("Sent log batch: {} entries from {} realms", entries, realms);
                    }
                    Ok(_) => {}
                    Err(e) => error!("Harvest tick failed, retrying next tick: {}", e),
                },
            }
        }
    })
}
