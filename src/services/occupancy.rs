//! Sliding-window occupancy voter
//!
//! Converts noisy per-frame presence into a debounced trigger. Every frame
//! pushes one "any zone occupied" boolean into a fixed-size window; the voter
//! fires once at least `min_occupied_frames` of the last `window_size` frames
//! were occupied.
//!
//! Key behaviors:
//! - The window aggregates history across all zones; the per-zone snapshot
//!   only reflects the latest frame
//! - One zone is selected per trigger, falling back to `DEFAULT_ZONE` when
//!   the latest frame has no active zone
//! - The window is cleared by the caller only once a trigger was acted on

use std::collections::{HashMap, VecDeque};

/// Zone id used when the window fired but no zone is active in the latest frame
pub const DEFAULT_ZONE: &str = "default_zone";

#[derive(Debug, Clone)]
pub struct OccupancyVoter {
    /// Last `window_size` observations, oldest at the front
    window: VecDeque<bool>,
    window_size: usize,
    min_occupied_frames: usize,
    /// Number of `true` entries currently in `window`
    occupied: usize,
    /// Registration order used to pick the dispatch zone
    zone_order: Vec<String>,
    /// Latest per-zone activity, replaced every frame
    snapshot: HashMap<String, bool>,
}

impl OccupancyVoter {
    /// `window_size` is clamped to at least one frame
    pub fn new(window_size: usize, min_occupied_frames: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size,
            min_occupied_frames,
            occupied: 0,
            zone_order: Vec::new(),
            snapshot: HashMap::new(),
        }
    }

    /// Register the zones the voter selects from, in priority order
    pub fn with_zones(mut self, zone_ids: impl IntoIterator<Item = String>) -> Self {
        self.set_zones(zone_ids);
        self
    }

    pub fn set_zones(&mut self, zone_ids: impl IntoIterator<Item = String>) {
        self.zone_order = zone_ids.into_iter().collect();
    }

    /// Record one frame.
    ///
    /// `per_zone_active` replaces the previous snapshot; zones missing from it
    /// are inactive this frame.
    pub fn observe(&mut self, any_zone_occupied: bool, per_zone_active: HashMap<String, bool>) {
        if self.window.len() == self.window_size {
            if let Some(true) = self.window.pop_front() {
                self.occupied -= 1;
            }
        }
        self.window.push_back(any_zone_occupied);
        if any_zone_occupied {
            self.occupied += 1;
        }
        self.snapshot = per_zone_active;
    }

    /// True iff at least `min_occupied_frames` of the window are occupied
    #[inline]
    pub fn should_trigger(&self) -> bool {
        self.occupied >= self.min_occupied_frames
    }

    /// Zone to act on for the current trigger.
    ///
    /// First registered zone active in the latest frame; active zones unknown
    /// to the voter come next in lexicographic order; otherwise `DEFAULT_ZONE`.
    pub fn active_zone(&self) -> String {
        if let Some(id) = self.zone_order.iter().find(|id| self.is_active(id)) {
            return id.clone();
        }

        self.snapshot
            .iter()
            .filter(|(id, &active)| active && !self.zone_order.iter().any(|z| z == *id))
            .map(|(id, _)| id)
            .min()
            .cloned()
            .unwrap_or_else(|| DEFAULT_ZONE.to_string())
    }

    /// Whether `zone_id` was active in the latest frame
    #[inline]
    pub fn is_active(&self, zone_id: &str) -> bool {
        self.snapshot.get(zone_id).copied().unwrap_or(false)
    }

    /// Empty the window. The snapshot is kept.
    pub fn clear(&mut self) {
        self.window.clear();
        self.occupied = 0;
    }

    #[inline]
    pub fn occupied_frames(&self) -> usize {
        self.occupied
    }

    #[inline]
    pub fn observed_frames(&self) -> usize {
        self.window.len()
    }

    #[inline]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    #[inline]
    pub fn min_occupied_frames(&self) -> usize {
        self.min_occupied_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn snapshot(active: &[&str]) -> HashMap<String, bool> {
        active.iter().map(|id| (id.to_string(), true)).collect()
    }

    fn feed(voter: &mut OccupancyVoter, values: &[bool]) {
        for &v in values {
            voter.observe(v, HashMap::new());
        }
    }

    #[test]
    fn test_full_window_evicts_oldest_hit() {
        let mut voter = OccupancyVoter::new(10, 5);
        feed(&mut voter, &[true; 4]);
        feed(&mut voter, &[false; 6]);
        assert!(!voter.should_trigger());
        assert_eq!(voter.observed_frames(), 10);

        // Window after push: [t, t, t, f x6, t]
        voter.observe(true, HashMap::new());
        assert_eq!(voter.occupied_frames(), 4);
        assert!(!voter.should_trigger());
    }

    #[test]
    fn test_fifth_hit_within_window_triggers() {
        let mut voter = OccupancyVoter::new(10, 5);
        feed(&mut voter, &[true; 4]);
        feed(&mut voter, &[false; 5]);
        assert!(!voter.should_trigger());

        // Ten samples, five occupied
        voter.observe(true, HashMap::new());
        assert_eq!(voter.observed_frames(), 10);
        assert!(voter.should_trigger());
    }

    #[test]
    fn test_window_never_exceeds_capacity() {
        let mut voter = OccupancyVoter::new(3, 2);
        feed(&mut voter, &[true, true, true, false, false]);
        assert_eq!(voter.observed_frames(), 3);
        assert_eq!(voter.occupied_frames(), 1);
        assert!(!voter.should_trigger());
    }

    #[test]
    fn test_should_trigger_does_not_mutate() {
        let mut voter = OccupancyVoter::new(4, 2);
        feed(&mut voter, &[true, true]);
        assert!(voter.should_trigger());
        assert!(voter.should_trigger());
        assert_eq!(voter.observed_frames(), 2);
    }

    #[test]
    fn test_clear_resets_window_only() {
        let mut voter = OccupancyVoter::new(4, 2).with_zones(["a".to_string()]);
        voter.observe(true, snapshot(&["a"]));
        voter.observe(true, snapshot(&["a"]));
        assert!(voter.should_trigger());

        voter.clear();
        assert!(!voter.should_trigger());
        assert_eq!(voter.observed_frames(), 0);
        assert!(voter.is_active("a"));
    }

    #[test]
    fn test_snapshot_replaced_not_merged() {
        let mut voter =
            OccupancyVoter::new(4, 1).with_zones(["a".to_string(), "b".to_string()]);
        voter.observe(true, snapshot(&["a"]));
        voter.observe(true, snapshot(&["b"]));
        assert!(!voter.is_active("a"));
        assert_eq!(voter.active_zone(), "b");
    }

    #[test]
    fn test_active_zone_uses_registration_order() {
        let mut voter = OccupancyVoter::new(4, 1)
            .with_zones(["zeta".to_string(), "alpha".to_string()]);
        voter.observe(true, snapshot(&["alpha", "zeta"]));
        assert_eq!(voter.active_zone(), "zeta");
    }

    #[test]
    fn test_active_zone_falls_back_to_default() {
        let mut voter = OccupancyVoter::new(4, 2).with_zones(["a".to_string()]);
        voter.observe(true, snapshot(&["a"]));
        voter.observe(true, snapshot(&["a"]));
        // Latest frame empty but the window still holds two hits
        voter.observe(false, HashMap::from([("a".to_string(), false)]));
        assert!(voter.should_trigger());
        assert_eq!(voter.active_zone(), DEFAULT_ZONE);
    }

    #[test]
    fn test_unregistered_active_zone_is_used_before_default() {
        let mut voter = OccupancyVoter::new(4, 1).with_zones(["a".to_string()]);
        voter.observe(true, snapshot(&["y", "x"]));
        assert_eq!(voter.active_zone(), "x");
    }

    #[test]
    fn test_zero_window_is_clamped() {
        let mut voter = OccupancyVoter::new(0, 1);
        voter.observe(true, HashMap::new());
        assert_eq!(voter.window_size(), 1);
        assert!(voter.should_trigger());
    }

    proptest! {
        #[test]
        fn prop_trigger_matches_count_of_last_window(
            samples in proptest::collection::vec(any::<bool>(), 0..200),
            window_size in 1usize..32,
            min_frames in 0usize..40,
        ) {
            let mut voter = OccupancyVoter::new(window_size, min_frames);
            for (i, &s) in samples.iter().enumerate() {
                voter.observe(s, HashMap::new());

                let start = (i + 1).saturating_sub(window_size);
                let expected = samples[start..=i].iter().filter(|&&b| b).count();
                prop_assert_eq!(voter.occupied_frames(), expected);
                prop_assert_eq!(voter.should_trigger(), expected >= min_frames);
                prop_assert!(voter.observed_frames() <= window_size);
            }
        }
    }
}
