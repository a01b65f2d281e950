//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `geometry` - Zone set with cross-resolution rescaling
//! - `occupancy` - Sliding-window occupancy voter
//! - `cooldown` - Per-zone cooldown registry shared with the worker
//! - `dispatch_worker` - Async remote action worker
//! - `zone_monitor` - Per-frame facade over the above

pub mod cooldown;
pub mod dispatch_worker;
pub mod geometry;
pub mod occupancy;
pub mod zone_monitor;

// Re-export commonly used types
pub use cooldown::CooldownRegistry;
pub use dispatch_worker::{
    create_dispatch_worker, DispatchError, DispatchQueue, DispatchWorker, Dispatcher,
    EnqueueError, ShutdownOutcome,
};
pub use geometry::GeometryStore;
pub use occupancy::{OccupancyVoter, DEFAULT_ZONE};
pub use zone_monitor::{TriggerOutcome, ZoneMonitor, ZoneStatus};
