//! Interface to the live state-tracker layer.
//!
//! The tracker mirrors every live Vulkan object and exposes the mirror as a
//! typed visitation: objects are yielded exactly once, dependencies before
//! dependents. The capture path drives [`StateTracker::visit_objects`]; the
//! repeating-mode apply path queries [`StateTracker::object_status`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use vksnap_object::{RestoreInfo, StateTrackedObject};

/// Live status of a tracked object, as reported by the state tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectStatus {
    /// The object is live in the current process.
    Active,
    /// The tracker has no live record of this object.
    Inactive,
}

pub trait StateTracker: Send + Sync {
    /// Visit every live object exactly once, in an order where every
    /// object's dependencies have been visited before it.
    fn visit_objects(&self, visit: &mut dyn FnMut(&RestoreInfo));

    /// Current status of one object.
    fn object_status(&self, object: &StateTrackedObject) -> ObjectStatus;

    /// Suspend or resume mirroring. Capture disables the tracker for its
    /// duration so the walk does not perturb the state being captured.
    fn set_enabled(&self, enabled: bool);
}

/// RAII guard that disables a tracker and re-enables it on drop.
pub struct TrackerSuspendGuard<'a> {
    tracker: &'a dyn StateTracker,
}

impl<'a> TrackerSuspendGuard<'a> {
    pub fn suspend(tracker: &'a dyn StateTracker) -> Self {
        tracker.set_enabled(false);
        Self { tracker }
    }
}

impl Drop for TrackerSuspendGuard<'_> {
    fn drop(&mut self) {
        self.tracker.set_enabled(true);
    }
}

/// In-memory tracker backed by a pre-recorded object list.
///
/// Reference implementation for embedders that assemble restore info
/// themselves, and the fixture used throughout this workspace's tests. The
/// object list must already be in dependency order.
pub struct RecordedStateTracker {
    objects: RwLock<Vec<RestoreInfo>>,
    status: RwLock<BTreeMap<StateTrackedObject, ObjectStatus>>,
    enabled: AtomicBool,
}

impl RecordedStateTracker {
    pub fn new(objects: Vec<RestoreInfo>) -> Self {
        let status = objects
            .iter()
            .map(|info| (info.object, ObjectStatus::Active))
            .collect();
        Self {
            objects: RwLock::new(objects),
            status: RwLock::new(status),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn set_status(&self, object: StateTrackedObject, status: ObjectStatus) {
        self.status.write().insert(object, status);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl StateTracker for RecordedStateTracker {
    fn visit_objects(&self, visit: &mut dyn FnMut(&RestoreInfo)) {
        for info in self.objects.read().iter() {
            visit(info);
        }
    }

    fn object_status(&self, object: &StateTrackedObject) -> ObjectStatus {
        self.status
            .read()
            .get(object)
            .copied()
            .unwrap_or(ObjectStatus::Inactive)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vksnap_object::create_info::SerializedFenceCreateInfo;
    use vksnap_object::object::ObjectType;
    use vksnap_object::restore_info::{FenceRestoreInfo, TypedRestoreInfo};

    fn fence_info(handle: u64) -> RestoreInfo {
        RestoreInfo {
            object: StateTrackedObject::new(ObjectType::Fence, handle, 1),
            dependencies: vec![],
            info: TypedRestoreInfo::Fence(FenceRestoreInfo {
                create_info: SerializedFenceCreateInfo { flags: 0 },
                signaled: false,
            }),
        }
    }

    #[test]
    fn suspend_guard_restores_enabled_state() {
        let tracker = RecordedStateTracker::new(vec![fence_info(1)]);
        assert!(tracker.is_enabled());
        {
            let _guard = TrackerSuspendGuard::suspend(&tracker);
            assert!(!tracker.is_enabled());
        }
        assert!(tracker.is_enabled());
    }

    #[test]
    fn visitation_yields_recorded_order() {
        let tracker = RecordedStateTracker::new(vec![fence_info(1), fence_info(2)]);
        let mut handles = Vec::new();
        tracker.visit_objects(&mut |info| handles.push(info.object.handle));
        assert_eq!(handles, vec![1, 2]);
    }

    #[test]
    fn unknown_objects_report_inactive() {
        let tracker = RecordedStateTracker::new(vec![]);
        let object = StateTrackedObject::new(ObjectType::Buffer, 9, 1);
        assert_eq!(tracker.object_status(&object), ObjectStatus::Inactive);
    }
}
