//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `remote_action` - Login-then-act HTTP client (with simulation mode)
//! - `retry` - Fixed-delay retry for transport failures
//! - `zones_file` - Zone polygon JSON loader
//! - `frame_source` - JSONL frame records from a file or stdin
//! - `status_server` - Prometheus metrics and cooldown status over HTTP

pub mod frame_source;
pub mod remote_action;
pub mod retry;
pub mod status_server;
pub mod zones_file;

// Re-export commonly used types
pub use frame_source::{open_frames, FrameReader, FrameRecord};
pub use remote_action::{ActionClient, CallError, RemoteAction, SIMULATION_TOKEN};
pub use retry::RetryPolicy;
pub use status_server::{serve_status, start_status_server};
pub use zones_file::ZoneFile;
