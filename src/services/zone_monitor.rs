//! Frame-path facade tying geometry, voting, cooldowns and dispatch together
//!
//! `process_points` is called once per frame with the tracked points. It never
//! blocks on I/O: the only shared state touched is the cooldown registry and
//! the queue's non-blocking `try_send`.

use crate::domain::types::{Point, Resolution};
use crate::domain::zone::ConfigError;
use crate::infra::metrics::Metrics;
use crate::services::cooldown::CooldownRegistry;
use crate::services::dispatch_worker::{DispatchQueue, EnqueueError};
use crate::services::geometry::GeometryStore;
use crate::services::occupancy::OccupancyVoter;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a single frame led to
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// Threshold not reached
    Idle,
    /// Cooldown acquired and task enqueued; window cleared
    Dispatched { zone: String },
    /// Zone still cooling down; window kept
    Suppressed { zone: String, remaining_secs: f64 },
    /// Queue full or closed; cooldown released, window kept
    Rejected { zone: String, reason: EnqueueError },
}

/// Per-zone state for presentation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneStatus {
    pub zone: String,
    pub active: bool,
    pub remaining_secs: f64,
}

pub struct ZoneMonitor {
    geometry: GeometryStore,
    voter: OccupancyVoter,
    queue: DispatchQueue,
    cooldowns: Arc<CooldownRegistry>,
    metrics: Arc<Metrics>,
    cooldown: Duration,
}

impl ZoneMonitor {
    pub fn new(
        geometry: GeometryStore,
        voter: OccupancyVoter,
        queue: DispatchQueue,
        cooldowns: Arc<CooldownRegistry>,
        metrics: Arc<Metrics>,
        cooldown: Duration,
    ) -> Self {
        let voter = voter.with_zones(geometry.zone_ids());
        Self { geometry, voter, queue, cooldowns, metrics, cooldown }
    }

    /// Frame resolution changed (or first frame)
    pub fn set_resolution(&mut self, resolution: Resolution) -> Result<(), ConfigError> {
        self.geometry.set_target_resolution(resolution)
    }

    /// Classify one frame's tracked points and feed the result to the voter
    pub fn process_points(&mut self, points: &[Point]) -> TriggerOutcome {
        let mut per_zone: HashMap<String, bool> =
            self.geometry.zone_ids().into_iter().map(|id| (id, false)).collect();

        let mut any = false;
        for &point in points {
            for id in self.geometry.membership(point) {
                any = true;
                if let Some(active) = per_zone.get_mut(id) {
                    *active = true;
                }
            }
        }

        self.observe(any, per_zone)
    }

    /// Record one frame and act on the debounced result
    pub fn observe(
        &mut self,
        any_zone_occupied: bool,
        per_zone_active: HashMap<String, bool>,
    ) -> TriggerOutcome {
        self.metrics.record_frame(any_zone_occupied);
        self.voter.observe(any_zone_occupied, per_zone_active);

        if !self.voter.should_trigger() {
            return TriggerOutcome::Idle;
        }

        let zone = self.voter.active_zone();
        self.metrics.record_trigger();

        if !self.cooldowns.try_acquire(&zone, self.cooldown) {
            self.metrics.record_trigger_suppressed();
            let remaining_secs = self.cooldowns.remaining_seconds(&zone);
            debug!(zone = %zone, remaining_secs = %remaining_secs, "trigger_suppressed");
            return TriggerOutcome::Suppressed { zone, remaining_secs };
        }

        match self.queue.enqueue(&zone) {
            Ok(()) => {
                info!(
                    zone = %zone,
                    occupied_frames = %self.voter.occupied_frames(),
                    window_size = %self.voter.window_size(),
                    "trigger_dispatched"
                );
                self.voter.clear();
                TriggerOutcome::Dispatched { zone }
            }
            Err(reason) => {
                self.cooldowns.release(&zone);
                warn!(zone = %zone, reason = %reason, "trigger_rejected");
                TriggerOutcome::Rejected { zone, reason }
            }
        }
    }

    /// Seconds until `zone_id` can dispatch again
    pub fn remaining_seconds(&self, zone_id: &str) -> f64 {
        self.cooldowns.remaining_seconds(zone_id)
    }

    /// Every registered zone with its latest activity and cooldown
    pub fn zone_status(&self) -> Vec<ZoneStatus> {
        self.geometry
            .zone_ids()
            .into_iter()
            .map(|zone| ZoneStatus {
                active: self.voter.is_active(&zone),
                remaining_secs: self.cooldowns.remaining_seconds(&zone),
                zone,
            })
            .collect()
    }

    pub fn geometry(&self) -> &GeometryStore {
        &self.geometry
    }

    pub fn voter(&self) -> &OccupancyVoter {
        &self.voter
    }
}
