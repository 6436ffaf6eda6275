//! Option structs for restore-point creation and apply.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use vksnap_object::object::{ObjectType, StateTrackedObject};

bitflags::bitflags! {
    /// Selects which artifacts a capture persists beyond object metadata.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CreateFlags: u32 {
        /// Write a human-readable `.json` mirror next to every `.info` file.
        const OBJECT_JSON               = 0b0000_0001;
        /// Download and persist device-memory contents (`.bin` payloads).
        const DEVICE_MEMORY_DATA        = 0b0000_0010;
        /// Download and persist serialized acceleration structures.
        const ACCELERATION_STRUCTURE_DATA = 0b0000_0100;
        /// Download and persist buffer contents.
        const BUFFER_DATA               = 0b0000_1000;
        /// Download and persist image contents.
        const IMAGE_DATA                = 0b0001_0000;
        /// Additionally dump images as PNG (tightly-packed 8-bit RGBA/BGRA
        /// formats only).
        const IMAGE_PNG                 = 0b0010_0000;
    }
}

impl Default for CreateFlags {
    fn default() -> Self {
        CreateFlags::OBJECT_JSON | CreateFlags::DEVICE_MEMORY_DATA
    }
}

bitflags::bitflags! {
    /// Apply-time behavior switches.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ApplyFlags: u32 {
        /// Recreate every object even when the state tracker reports it
        /// active (disables the repeating-mode identity mapping).
        const FORCE_OBJECT_CREATION     = 0b0000_0001;
        /// Replay secondary command buffers inline into their primaries
        /// instead of re-recording vkCmdExecuteCommands.
        const FLATTEN_COMMAND_BUFFERS   = 0b0000_0010;
    }
}

/// Invoked once per spawned copy-engine worker thread.
pub type ThreadInitCallback = Arc<dyn Fn() + Send + Sync>;

/// Observes every (type, captured, restored) mapping as it is registered.
pub type ProcessObjectCallback = Arc<dyn Fn(ObjectType, u64, u64) + Send + Sync>;

/// Capture-side resource-data interception: observes a downloaded payload.
/// Returning `true` claims the payload and suppresses the default file
/// write.
pub type ResourceDataCallback = Arc<dyn Fn(&StateTrackedObject, &[u8]) -> bool + Send + Sync>;

/// Apply-side resource-data interception: given the captured object and the
/// expected payload size, may supply replacement bytes to upload instead of
/// the persisted `.bin` payload.
pub type ProvideResourceDataCallback =
    Arc<dyn Fn(&StateTrackedObject, u64) -> Option<Vec<u8>> + Send + Sync>;

/// Rewrites a Win32 surface's (hinstance, hwnd) before re-creation, e.g. to
/// target a newly created window.
pub type SurfaceRecreateCallback = Arc<dyn Fn(&mut u64, &mut u64) + Send + Sync>;

/// Parameters for [`create_restore_point`](../vksnap/fn.create_restore_point.html).
#[derive(Clone, Default)]
pub struct RestorePointCreateInfo {
    /// Output directory; created if absent.
    pub path: PathBuf,
    pub flags: CreateFlags,
    /// Copy-engine worker count: 0 = default-sized pool, 1 = inline on the
    /// calling thread, N = exactly N workers.
    pub thread_count: u32,
    pub thread_init: Option<ThreadInitCallback>,
    pub resource_data: Option<ResourceDataCallback>,
}

/// Parameters for [`apply_restore_point`](../vksnap/fn.apply_restore_point.html).
#[derive(Clone, Default)]
pub struct RestorePointApplyInfo {
    /// Input directory containing a complete capture.
    pub path: PathBuf,
    pub flags: ApplyFlags,
    /// Objects to skip entirely, including their state/data phases.
    pub excluded_objects: BTreeSet<StateTrackedObject>,
    /// Copy-engine worker count, same convention as create.
    pub thread_count: u32,
    pub thread_init: Option<ThreadInitCallback>,
    pub process_object: Option<ProcessObjectCallback>,
    pub resource_data: Option<ProvideResourceDataCallback>,
    pub recreate_win32_surface: Option<SurfaceRecreateCallback>,
}

impl std::fmt::Debug for RestorePointCreateInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestorePointCreateInfo")
            .field("path", &self.path)
            .field("flags", &self.flags)
            .field("thread_count", &self.thread_count)
            .field("thread_init", &self.thread_init.is_some())
            .field("resource_data", &self.resource_data.is_some())
            .finish()
    }
}

impl std::fmt::Debug for RestorePointApplyInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestorePointApplyInfo")
            .field("path", &self.path)
            .field("flags", &self.flags)
            .field("excluded_objects", &self.excluded_objects.len())
            .field("thread_count", &self.thread_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_create_flags_keep_json_and_memory_data() {
        let flags = CreateFlags::default();
        assert!(flags.contains(CreateFlags::OBJECT_JSON));
        assert!(flags.contains(CreateFlags::DEVICE_MEMORY_DATA));
        assert!(!flags.contains(CreateFlags::IMAGE_PNG));
    }
}
