//! Restore-point applier: reconstructs a live Vulkan object graph from a
//! persisted capture.
//!
//! The applier consumes the manifest in its stored dependency order,
//! creates each object against the real Vulkan API with every captured
//! handle remapped to its restored counterpart, then runs the state and
//! data restoration phases (image layouts, device-memory contents, memory
//! mappings, descriptor bindings, command-buffer replay) with copy-engine
//! barriers between data-dependent phases.

pub mod applier;
mod convert;
mod objects;
pub mod replay;
pub mod state;

pub use applier::Applier;
pub use state::{
    filter_descriptor_writes, group_queues, plan_event_reconciliation,
    plan_fence_reconciliation, plan_semaphore_reconciliation, FenceAction,
};
