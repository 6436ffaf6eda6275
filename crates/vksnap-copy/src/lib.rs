//! Asynchronous GPU data-transfer engine.
//!
//! Moves data between host memory and GPU-resident buffers, images, device
//! memory, and acceleration structures, off the calling thread when a worker
//! pool is configured. Every transfer stages through a per-thread,
//! grow-only staging buffer and blocks on a fence before handing the caller
//! a view into mapped staging memory.

pub mod copy_info;
pub mod engine;
pub mod pool;
pub mod regions;
mod resources;

pub use copy_info::{
    AccelerationStructureCopyInfo, BufferCopyInfo, DeviceMemoryCopyInfo, ImageCopyInfo,
};
pub use engine::{CopyEngine, CopyEngineCreateInfo, DataFillFn, DataViewFn};
pub use regions::{plan_image_copies, plan_image_transitions, ImageCopyPlan, SubresourceState};
