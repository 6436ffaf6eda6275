//! Vulkan restore points.
//!
//! A restore point is a persisted snapshot of a Vulkan object graph's
//! structure and data, sufficient to reconstruct an equivalent live graph in
//! a new process. Capture walks the state tracker's mirror of every live
//! object; apply recreates the graph in dependency order with all handles
//! remapped and GPU-resident data re-uploaded.
//!
//! ```no_run
//! use vksnap::{create_restore_point, apply_restore_point, RestorePoint};
//! use vksnap_core::{RestorePointCreateInfo, RestorePointApplyInfo};
//!
//! # fn main() -> Result<(), vksnap_core::SnapError> {
//! let entry = unsafe { ash::Entry::load() }
//!     .map_err(|e| vksnap_core::SnapError::InitializationFailed(e.to_string()))?;
//! # let tracker: Option<&dyn vksnap_core::StateTracker> = None;
//! let create_info = RestorePointCreateInfo {
//!     path: "/tmp/snapshot".into(),
//!     ..Default::default()
//! };
//! let restore_point = create_restore_point(entry.clone(), create_info, tracker)?;
//!
//! let apply_info = RestorePointApplyInfo::default();
//! let applied = apply_restore_point(entry, apply_info, &restore_point, None)?;
//! for object in restore_point.objects() {
//!     let _restored = applied.restored_handle(object.handle)?;
//! }
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use vksnap_capture::Creator;
use vksnap_core::error::{SnapError, SnapResult};
use vksnap_core::{RestorePointApplyInfo, RestorePointCreateInfo, StateTracker};
use vksnap_object::{RestorePointManifest, StateTrackedObject};
use vksnap_restore::Applier;

pub use vksnap_common::init_logging;
pub use vksnap_core::{
    ApplyFlags, CreateFlags, HandleMap, RestorePointApplyInfo as ApplyInfo,
    RestorePointCreateInfo as CreateInfo,
};
pub use vksnap_object::{ObjectType, RestoreInfo, TypedRestoreInfo};

/// A created or opened restore point: the on-disk snapshot plus its ordered
/// object list.
pub struct RestorePoint {
    path: PathBuf,
    objects: Vec<StateTrackedObject>,
}

impl RestorePoint {
    /// Open an existing restore point from disk. Fails when the manifest is
    /// absent or truncated (an aborted capture).
    pub fn open(path: impl Into<PathBuf>) -> SnapResult<Self> {
        let path = path.into();
        let manifest = RestorePointManifest::read(&path).map_err(|err| {
            SnapError::InitializationFailed(format!(
                "cannot open restore point at {}: {err}",
                path.display()
            ))
        })?;
        Ok(Self {
            path,
            objects: manifest.objects,
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Every captured object, in dependency order.
    pub fn objects(&self) -> &[StateTrackedObject] {
        &self.objects
    }
}

/// Capture the live object graph into a restore point on disk.
///
/// Requires the companion state-tracker layer; passing `None` reports
/// `VK_ERROR_LAYER_NOT_PRESENT` through [`SnapError::as_vk_result`].
pub fn create_restore_point(
    entry: ash::Entry,
    create_info: RestorePointCreateInfo,
    tracker: Option<&dyn StateTracker>,
) -> SnapResult<RestorePoint> {
    let tracker = tracker.ok_or(SnapError::LayerNotPresent)?;
    let path = create_info.path.clone();
    let mut creator = Creator::new(entry, create_info);
    creator.create(tracker)?;
    let objects = creator.objects().to_vec();
    info!(objects = objects.len(), path = %path.display(), "restore point ready");
    Ok(RestorePoint { path, objects })
}

/// A completed apply pass. Holds the handle map translating captured object
/// identities to the identities created during this pass.
pub struct AppliedRestorePoint {
    applier: Applier,
}

impl AppliedRestorePoint {
    /// The restored counterpart of a captured handle (0 stays 0).
    pub fn restored_handle(&self, captured: u64) -> SnapResult<u64> {
        self.applier.handle_map().get_restored(captured)
    }

    /// The captured origin of a restored handle (0 stays 0).
    pub fn captured_handle(&self, restored: u64) -> SnapResult<u64> {
        self.applier.handle_map().get_captured(restored)
    }

    pub fn handle_map(&self) -> &HandleMap {
        self.applier.handle_map()
    }
}

/// Reconstruct the captured object graph from a restore point.
///
/// `apply_info.path` is taken from `restore_point` when left empty. The
/// optional tracker enables repeating mode: objects it reports as active
/// keep their identity and only go through the state/data phases.
pub fn apply_restore_point(
    entry: ash::Entry,
    mut apply_info: RestorePointApplyInfo,
    restore_point: &RestorePoint,
    tracker: Option<Arc<dyn StateTracker>>,
) -> SnapResult<AppliedRestorePoint> {
    if apply_info.path.as_os_str().is_empty() {
        apply_info.path = restore_point.path.clone();
    }
    let mut applier = Applier::new(entry, apply_info, tracker)?;
    applier.apply()?;
    Ok(AppliedRestorePoint { applier })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_without_tracker_is_layer_not_present() {
        let entry = match unsafe { ash::Entry::load() } {
            Ok(entry) => entry,
            Err(_) => {
                eprintln!("skipping: no Vulkan loader available");
                return;
            }
        };
        let err = create_restore_point(
            entry,
            RestorePointCreateInfo::default(),
            None,
        )
        .err()
        .expect("must fail");
        assert_eq!(
            err.as_vk_result(),
            ash::vk::Result::ERROR_LAYER_NOT_PRESENT
        );
    }

    #[test]
    fn open_missing_restore_point_fails() {
        let dir = std::env::temp_dir().join(format!("vksnap-open-missing-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("scratch dir");
        assert!(RestorePoint::open(&dir).is_err());
        std::fs::remove_dir_all(dir).ok();
    }
}
