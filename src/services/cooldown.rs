//! Per-zone cooldown registry
//!
//! Maps zone id to the instant its cooldown expires. This is the only state
//! shared between the frame path and the dispatch worker: the frame path
//! acquires before enqueueing, the worker releases when a dispatch fails.
//!
//! One mutex guards the whole map so that the expiry check and the insert in
//! `try_acquire` happen atomically. Every operation holds the lock briefly and
//! never re-enters it. Each operation has an `_at` variant taking `now`
//! explicitly for deterministic tests.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Longest cooldown the registry will store; longer requests are clamped
pub const MAX_COOLDOWN: Duration = Duration::from_secs(365 * 24 * 3600);

#[derive(Debug, Default)]
pub struct CooldownRegistry {
    /// zone id -> expiry instant
    entries: Mutex<HashMap<String, Instant>>,
}

impl CooldownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `zone_id` for `duration` unless an unexpired entry exists
    #[inline]
    pub fn try_acquire(&self, zone_id: &str, duration: Duration) -> bool {
        self.try_acquire_at(zone_id, duration, Instant::now())
    }

    pub fn try_acquire_at(&self, zone_id: &str, duration: Duration, now: Instant) -> bool {
        let mut entries = self.entries.lock();

        if let Some(&expires_at) = entries.get(zone_id) {
            if now <= expires_at {
                debug!(
                    zone = %zone_id,
                    remaining_ms = %expires_at.duration_since(now).as_millis(),
                    "cooldown_held"
                );
                return false;
            }
        }

        let Some(expires_at) = now.checked_add(duration.min(MAX_COOLDOWN)) else {
            warn!(zone = %zone_id, duration_ms = %duration.as_millis(), "cooldown_expiry_overflow");
            return false;
        };

        // Expired entries of other zones are dropped while the lock is held
        entries.retain(|_, expires_at| now <= *expires_at);
        entries.insert(zone_id.to_string(), expires_at);
        true
    }

    /// Remove the entry for `zone_id` unconditionally.
    /// Returns whether an entry was present.
    pub fn release(&self, zone_id: &str) -> bool {
        let removed = self.entries.lock().remove(zone_id).is_some();
        debug!(zone = %zone_id, removed = %removed, "cooldown_released");
        removed
    }

    /// Seconds until `zone_id` unlocks, 0 if absent or expired
    #[inline]
    pub fn remaining_seconds(&self, zone_id: &str) -> f64 {
        self.remaining_seconds_at(zone_id, Instant::now())
    }

    pub fn remaining_seconds_at(&self, zone_id: &str, now: Instant) -> f64 {
        self.remaining_at(zone_id, now).as_secs_f64()
    }

    /// Time until `zone_id` unlocks, zero if absent or expired
    pub fn remaining_at(&self, zone_id: &str, now: Instant) -> Duration {
        self.entries
            .lock()
            .get(zone_id)
            .map(|&expires_at| expires_at.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Whether `zone_id` currently holds an unexpired cooldown
    pub fn is_locked(&self, zone_id: &str) -> bool {
        !self.remaining_at(zone_id, Instant::now()).is_zero()
    }

    /// Unexpired entries with their remaining time, sorted by zone id
    pub fn snapshot_at(&self, now: Instant) -> Vec<(String, Duration)> {
        let mut held: Vec<_> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, expires_at)| now <= **expires_at)
            .map(|(zone, &expires_at)| (zone.clone(), expires_at.saturating_duration_since(now)))
            .collect();
        held.sort_by(|a, b| a.0.cmp(&b.0));
        held
    }

    /// Drop every entry
    pub fn reset_all(&self) {
        let mut entries = self.entries.lock();
        let cleared = entries.len();
        entries.clear();
        debug!(cleared = %cleared, "cooldowns_reset");
    }

    /// Number of stored entries, expired ones included until the next acquire
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
