//! Pure decision logic for the state-restoration phases: descriptor-write
//! filtering, queue grouping, and sync-object reconciliation.

use vksnap_core::HandleMap;
use vksnap_object::create_info::SerializedDeviceQueueCreateInfo;
use vksnap_object::restore_info::{CapturedDeviceQueue, SerializedWriteDescriptorSet};
use vksnap_object::VisitHandles;

/// Keep only descriptor writes that are still meaningful to replay.
///
/// A write is active if it references at least one handle, other than the
/// descriptor set's own captured handle, that the handle map has already
/// resolved. Writes whose sole reference is the set itself are stale or
/// self-referential and are dropped rather than applied.
pub fn filter_descriptor_writes(
    writes: &[SerializedWriteDescriptorSet],
    own_captured_handle: u64,
    handles: &HandleMap,
) -> Vec<SerializedWriteDescriptorSet> {
    writes
        .iter()
        .filter(|write| {
            let mut active = false;
            let mut probe = (*write).clone();
            probe.visit_handles(&mut |_, handle| {
                if *handle != 0
                    && *handle != own_captured_handle
                    && handles.contains_captured(*handle)
                {
                    active = true;
                }
            });
            active
        })
        .cloned()
        .collect()
}

/// Group captured device queues by the full queue-create-info that produced
/// them (not by bare family index), recovering the per-group queue lists in
/// ascending queue-index order.
pub fn group_queues(
    queues: &[CapturedDeviceQueue],
) -> Vec<(SerializedDeviceQueueCreateInfo, Vec<CapturedDeviceQueue>)> {
    let mut groups: Vec<(SerializedDeviceQueueCreateInfo, Vec<CapturedDeviceQueue>)> = Vec::new();
    for queue in queues {
        match groups.iter_mut().find(|(info, _)| *info == queue.create_info) {
            Some((_, members)) => members.push(queue.clone()),
            None => groups.push((queue.create_info.clone(), vec![queue.clone()])),
        }
    }
    for (_, members) in groups.iter_mut() {
        members.sort_by_key(|queue| queue.queue_index);
    }
    groups
}

/// Reconciliation action for a restored fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceAction {
    /// Created state already matches the captured state.
    None,
    /// Captured signaled but created unsignaled: submit an empty batch
    /// against the fence.
    SubmitEmpty,
    /// Captured unsignaled but created signaled: explicit reset.
    Reset,
}

pub fn plan_fence_reconciliation(created_signaled: bool, captured_signaled: bool) -> FenceAction {
    match (created_signaled, captured_signaled) {
        (false, true) => FenceAction::SubmitEmpty,
        (true, false) => FenceAction::Reset,
        _ => FenceAction::None,
    }
}

/// Events are created unsignaled; a captured-signaled event needs an
/// explicit set, anything else is already in place.
pub fn plan_event_reconciliation(captured_signaled: bool) -> bool {
    captured_signaled
}

/// Binary semaphores cannot be set directly; a captured-signaled semaphore
/// is signaled through a no-op submission. Returns whether that submission
/// is needed.
pub fn plan_semaphore_reconciliation(captured_signaled: bool) -> bool {
    captured_signaled
}

#[cfg(test)]
mod tests {
    use super::*;
    use vksnap_object::object::ObjectType;
    use vksnap_object::restore_info::{
        SerializedDescriptorBufferInfo, SerializedDescriptorImageInfo,
    };
    use vksnap_object::StateTrackedObject;

    fn write_with_buffer(dst_set: u64, buffer: u64) -> SerializedWriteDescriptorSet {
        SerializedWriteDescriptorSet {
            dst_set,
            dst_binding: 0,
            dst_array_element: 0,
            descriptor_type: 6,
            buffer_infos: vec![SerializedDescriptorBufferInfo {
                buffer,
                offset: 0,
                range: 64,
            }],
            image_infos: vec![],
            texel_buffer_views: vec![],
        }
    }

    #[test]
    fn self_referential_write_is_dropped() {
        let handles = HandleMap::new();
        handles
            .register(ObjectType::DescriptorSet, 1, 101)
            .expect("set");

        // Write referencing only the set's own handle.
        let stale = SerializedWriteDescriptorSet {
            dst_set: 1,
            dst_binding: 0,
            dst_array_element: 0,
            descriptor_type: 6,
            buffer_infos: vec![],
            image_infos: vec![],
            texel_buffer_views: vec![],
        };
        let kept = filter_descriptor_writes(&[stale], 1, &handles);
        assert!(kept.is_empty());
    }

    #[test]
    fn write_with_resolved_reference_is_kept() {
        let handles = HandleMap::new();
        handles
            .register(ObjectType::DescriptorSet, 1, 101)
            .expect("set");
        handles.register(ObjectType::Buffer, 2, 102).expect("buffer");

        let live = write_with_buffer(1, 2);
        let unresolved = write_with_buffer(1, 3);

        let kept = filter_descriptor_writes(&[live.clone(), unresolved], 1, &handles);
        assert_eq!(kept, vec![live]);
    }

    #[test]
    fn image_only_write_counts_its_view() {
        let handles = HandleMap::new();
        handles
            .register(ObjectType::ImageView, 7, 107)
            .expect("view");
        let write = SerializedWriteDescriptorSet {
            dst_set: 1,
            dst_binding: 0,
            dst_array_element: 0,
            descriptor_type: 0,
            buffer_infos: vec![],
            image_infos: vec![SerializedDescriptorImageInfo {
                sampler: 0,
                image_view: 7,
                image_layout: 5,
            }],
            texel_buffer_views: vec![],
        };
        assert_eq!(filter_descriptor_writes(&[write], 1, &handles).len(), 1);
    }

    #[test]
    fn queues_group_by_create_info_equality() {
        let info_a = SerializedDeviceQueueCreateInfo {
            flags: 0,
            queue_family_index: 0,
            queue_priorities: vec![1.0, 0.5],
        };
        // Same family index, different priorities: a distinct group.
        let info_b = SerializedDeviceQueueCreateInfo {
            flags: 0,
            queue_family_index: 0,
            queue_priorities: vec![1.0],
        };

        let q = |info: &SerializedDeviceQueueCreateInfo, handle: u64, index: u32| {
            CapturedDeviceQueue {
                object: StateTrackedObject::new(ObjectType::Queue, handle, 1),
                create_info: info.clone(),
                queue_index: index,
            }
        };

        let groups = group_queues(&[
            q(&info_a, 10, 1),
            q(&info_b, 20, 0),
            q(&info_a, 11, 0),
        ]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, info_a);
        let indices: Vec<u32> = groups[0].1.iter().map(|m| m.queue_index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(groups[1].1.len(), 1);
    }

    #[test]
    fn fence_reconciliation_is_idempotent_on_matching_state() {
        assert_eq!(plan_fence_reconciliation(true, true), FenceAction::None);
        assert_eq!(plan_fence_reconciliation(false, false), FenceAction::None);
        assert_eq!(
            plan_fence_reconciliation(false, true),
            FenceAction::SubmitEmpty
        );
        assert_eq!(plan_fence_reconciliation(true, false), FenceAction::Reset);
    }

    #[test]
    fn event_and_semaphore_plans_are_noops_when_unsignaled() {
        assert!(!plan_event_reconciliation(false));
        assert!(plan_event_reconciliation(true));
        assert!(!plan_semaphore_reconciliation(false));
        assert!(plan_semaphore_reconciliation(true));
    }
}
