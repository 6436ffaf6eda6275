//! Core bookkeeping for restore-point capture and apply: the bidirectional
//! handle map, the state-tracker interface, option types, and the error
//! taxonomy.

pub mod error;
pub mod handle_map;
pub mod options;
pub mod tracker;

pub use error::{check, SnapError, SnapResult};
pub use handle_map::HandleMap;
pub use options::{ApplyFlags, CreateFlags, RestorePointApplyInfo, RestorePointCreateInfo};
pub use tracker::{ObjectStatus, RecordedStateTracker, StateTracker, TrackerSuspendGuard};
