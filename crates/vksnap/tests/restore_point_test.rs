//! Integration test: capture → apply round trip.
//!
//! Builds a minimal live graph (instance, device, one 256-byte buffer bound
//! to host-visible memory filled with a known pattern), captures it through
//! a recorded tracker, applies it into a fresh instance, and verifies the
//! restored buffer's backing memory holds the identical bytes.
//!
//! Tests skip with a message when no Vulkan implementation is available.
//!
//! Run with: cargo test --test restore_point_test -- --nocapture

use ash::vk;
use ash::vk::Handle;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use vksnap::{apply_restore_point, create_restore_point, CreateFlags, RestorePoint};
use vksnap_core::{RecordedStateTracker, RestorePointApplyInfo, RestorePointCreateInfo};
use vksnap_object::create_info::*;
use vksnap_object::object::{ObjectType, StateTrackedObject};
use vksnap_object::restore_info::*;
use vksnap_object::{RestoreInfo, RestorePointManifest, TypedRestoreInfo};

const PATTERN_LEN: usize = 256;

struct LiveGraph {
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue_family_index: u32,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    memory_type_index: u32,
    allocation_size: u64,
    pattern: Vec<u8>,
}

impl Drop for LiveGraph {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Build the live graph, or None when no usable Vulkan device exists.
fn build_live_graph() -> Option<LiveGraph> {
    let entry = match unsafe { ash::Entry::load() } {
        Ok(entry) => entry,
        Err(err) => {
            eprintln!("skipping: no Vulkan loader ({err})");
            return None;
        }
    };

    let app_info = vk::ApplicationInfo::default()
        .application_version(1)
        .api_version(vk::make_api_version(0, 1, 1, 0));
    let instance_info = vk::InstanceCreateInfo::default().application_info(&app_info);
    let instance = match unsafe { entry.create_instance(&instance_info, None) } {
        Ok(instance) => instance,
        Err(err) => {
            eprintln!("skipping: cannot create instance ({err:?})");
            return None;
        }
    };

    let physical_devices = match unsafe { instance.enumerate_physical_devices() } {
        Ok(devices) if !devices.is_empty() => devices,
        _ => {
            eprintln!("skipping: no physical devices");
            unsafe { instance.destroy_instance(None) };
            return None;
        }
    };
    let physical_device = physical_devices[0];

    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
    let queue_family_index = families
        .iter()
        .position(|family| {
            family.queue_flags.intersects(
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
            )
        })
        .expect("no capable queue family") as u32;

    let priorities = [1.0f32];
    let queue_info = vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family_index)
        .queue_priorities(&priorities);
    let device_info =
        vk::DeviceCreateInfo::default().queue_create_infos(std::slice::from_ref(&queue_info));
    let device =
        match unsafe { instance.create_device(physical_device, &device_info, None) } {
            Ok(device) => device,
            Err(err) => {
                eprintln!("skipping: cannot create device ({err:?})");
                unsafe { instance.destroy_instance(None) };
                return None;
            }
        };

    let buffer_info = vk::BufferCreateInfo::default()
        .size(PATTERN_LEN as u64)
        .usage(vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    let buffer = unsafe { device.create_buffer(&buffer_info, None) }.expect("create buffer");

    let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
    let memory_properties =
        unsafe { instance.get_physical_device_memory_properties(physical_device) };
    let memory_type_index = (0..memory_properties.memory_type_count)
        .find(|&index| {
            (requirements.memory_type_bits & (1 << index)) != 0
                && memory_properties.memory_types[index as usize]
                    .property_flags
                    .contains(
                        vk::MemoryPropertyFlags::HOST_VISIBLE
                            | vk::MemoryPropertyFlags::HOST_COHERENT,
                    )
        })
        .expect("no host-visible memory type");

    let allocation_size = requirements.size.max(PATTERN_LEN as u64);
    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(allocation_size)
        .memory_type_index(memory_type_index);
    let memory = unsafe { device.allocate_memory(&alloc_info, None) }.expect("allocate");
    unsafe { device.bind_buffer_memory(buffer, memory, 0) }.expect("bind");

    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
    let pattern: Vec<u8> = (0..PATTERN_LEN).map(|_| rng.gen()).collect();
    unsafe {
        let mapped = device
            .map_memory(memory, 0, PATTERN_LEN as u64, vk::MemoryMapFlags::empty())
            .expect("map");
        std::ptr::copy_nonoverlapping(pattern.as_ptr(), mapped as *mut u8, PATTERN_LEN);
        device.unmap_memory(memory);
    }

    Some(LiveGraph {
        entry,
        instance,
        physical_device,
        device,
        queue_family_index,
        buffer,
        memory,
        memory_type_index,
        allocation_size,
        pattern,
    })
}

/// Assemble the tracker records the state-tracker layer would produce for
/// the live graph, dependencies before dependents.
fn tracker_records(graph: &LiveGraph) -> Vec<RestoreInfo> {
    let instance = StateTrackedObject::new(
        ObjectType::Instance,
        graph.instance.handle().as_raw(),
        graph.instance.handle().as_raw(),
    );
    let physical_device = StateTrackedObject::new(
        ObjectType::PhysicalDevice,
        graph.physical_device.as_raw(),
        instance.handle,
    );
    let device = StateTrackedObject::new(
        ObjectType::Device,
        graph.device.handle().as_raw(),
        graph.device.handle().as_raw(),
    );
    let queue_raw = unsafe { graph.device.get_device_queue(graph.queue_family_index, 0) };
    let queue = StateTrackedObject::new(ObjectType::Queue, queue_raw.as_raw(), device.handle);
    let memory =
        StateTrackedObject::new(ObjectType::DeviceMemory, graph.memory.as_raw(), device.handle);
    let buffer = StateTrackedObject::new(ObjectType::Buffer, graph.buffer.as_raw(), device.handle);

    let queue_create_info = SerializedDeviceQueueCreateInfo {
        flags: 0,
        queue_family_index: graph.queue_family_index,
        queue_priorities: vec![1.0],
    };

    vec![
        RestoreInfo {
            object: instance,
            dependencies: vec![],
            info: TypedRestoreInfo::Instance(InstanceRestoreInfo {
                create_info: SerializedInstanceCreateInfo {
                    flags: 0,
                    application_info: Some(SerializedApplicationInfo {
                        application_name: None,
                        application_version: 1,
                        engine_name: None,
                        engine_version: 0,
                        api_version: vk::make_api_version(0, 1, 1, 0),
                    }),
                    enabled_layers: vec![],
                    enabled_extensions: vec![],
                    pnext: vec![],
                },
                physical_devices: vec![physical_device],
            }),
        },
        RestoreInfo {
            object: physical_device,
            dependencies: vec![instance],
            info: TypedRestoreInfo::PhysicalDevice(PhysicalDeviceRestoreInfo {
                device_index: 0,
                device_name: String::new(),
                vendor_id: 0,
                device_id: 0,
                api_version: 0,
            }),
        },
        RestoreInfo {
            object: device,
            dependencies: vec![instance, physical_device],
            info: TypedRestoreInfo::Device(DeviceRestoreInfo {
                create_info: SerializedDeviceCreateInfo {
                    flags: 0,
                    queue_create_infos: vec![queue_create_info.clone()],
                    enabled_extensions: vec![],
                    enabled_features_raw: None,
                    pnext: vec![],
                },
                queues: vec![CapturedDeviceQueue {
                    object: queue,
                    create_info: queue_create_info,
                    queue_index: 0,
                }],
            }),
        },
        RestoreInfo {
            object: queue,
            dependencies: vec![device],
            info: TypedRestoreInfo::Queue(QueueRestoreInfo {
                queue_family_index: graph.queue_family_index,
                queue_index: 0,
            }),
        },
        RestoreInfo {
            object: memory,
            dependencies: vec![device],
            info: TypedRestoreInfo::DeviceMemory(DeviceMemoryRestoreInfo {
                allocate_info: SerializedMemoryAllocateInfo {
                    allocation_size: graph.allocation_size,
                    memory_type_index: graph.memory_type_index,
                    pnext: vec![],
                },
                mapped: None,
                buffer_binds: vec![MemoryBinding {
                    memory,
                    memory_offset: 0,
                }],
                image_binds: vec![],
                data_size: graph.allocation_size,
            }),
        },
        RestoreInfo {
            object: buffer,
            dependencies: vec![device, memory],
            info: TypedRestoreInfo::Buffer(BufferRestoreInfo {
                create_info: SerializedBufferCreateInfo {
                    flags: 0,
                    size: PATTERN_LEN as u64,
                    usage: (vk::BufferUsageFlags::TRANSFER_SRC
                        | vk::BufferUsageFlags::TRANSFER_DST)
                        .as_raw(),
                    sharing_mode: vk::SharingMode::EXCLUSIVE.as_raw(),
                    queue_family_indices: vec![],
                    pnext: vec![],
                },
                bindings: vec![MemoryBinding {
                    memory,
                    memory_offset: 0,
                }],
            }),
        },
    ]
}

fn scratch_dir(tag: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("vksnap-e2e-{tag}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

#[test]
fn buffer_contents_survive_capture_and_apply() {
    let Some(graph) = build_live_graph() else {
        return;
    };
    let dir = scratch_dir("buffer");

    // Capture
    let records = tracker_records(&graph);
    let captured_buffer = graph.buffer.as_raw();
    let captured_memory = graph.memory.as_raw();
    let tracker = RecordedStateTracker::new(records);
    let restore_point = create_restore_point(
        graph.entry.clone(),
        RestorePointCreateInfo {
            path: dir.clone(),
            flags: CreateFlags::OBJECT_JSON | CreateFlags::DEVICE_MEMORY_DATA,
            thread_count: 1,
            ..Default::default()
        },
        Some(&tracker),
    )
    .expect("create restore point");
    assert_eq!(restore_point.objects().len(), 6);

    // The payload hit the disk before the manifest did.
    let memory_object = restore_point.objects()[4];
    let bin = vksnap_object::codec::bin_path(&dir, &memory_object);
    let payload = std::fs::read(&bin).expect("device-memory payload");
    assert_eq!(&payload[..PATTERN_LEN], graph.pattern.as_slice());

    // Apply into a fresh instance (no tracker: nothing is "active").
    let applied = apply_restore_point(
        graph.entry.clone(),
        RestorePointApplyInfo {
            thread_count: 1,
            ..Default::default()
        },
        &restore_point,
        None,
    )
    .expect("apply restore point");

    let restored_buffer = applied.restored_handle(captured_buffer).expect("buffer mapping");
    assert_ne!(restored_buffer, 0);
    assert_ne!(restored_buffer, captured_buffer);
    // Bijection: restored -> captured -> restored round-trips.
    assert_eq!(
        applied.captured_handle(restored_buffer).expect("inverse"),
        captured_buffer
    );

    // The restored memory, once mapped, holds the identical pattern.
    let restored_memory = applied.restored_handle(captured_memory).expect("memory mapping");
    let restored_device_raw = applied
        .restored_handle(graph.device.handle().as_raw())
        .expect("device mapping");
    let restored_instance_raw = applied
        .restored_handle(graph.instance.handle().as_raw())
        .expect("instance mapping");
    let restored_instance = unsafe {
        ash::Instance::load(
            graph.entry.static_fn(),
            vk::Instance::from_raw(restored_instance_raw),
        )
    };
    let restored_device = unsafe {
        ash::Device::load(
            restored_instance.fp_v1_0(),
            vk::Device::from_raw(restored_device_raw),
        )
    };
    let contents = unsafe {
        let mapped = restored_device
            .map_memory(
                vk::DeviceMemory::from_raw(restored_memory),
                0,
                PATTERN_LEN as u64,
                vk::MemoryMapFlags::empty(),
            )
            .expect("map restored memory");
        let bytes = std::slice::from_raw_parts(mapped as *const u8, PATTERN_LEN).to_vec();
        restored_device.unmap_memory(vk::DeviceMemory::from_raw(restored_memory));
        bytes
    };
    assert_eq!(contents, graph.pattern);
    println!("restored 256-byte pattern verified");

    drop(applied);
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn shuffled_manifest_is_detected() {
    let Some(graph) = build_live_graph() else {
        return;
    };
    let dir = scratch_dir("shuffled");

    let records = tracker_records(&graph);
    let tracker = RecordedStateTracker::new(records);
    let restore_point = create_restore_point(
        graph.entry.clone(),
        RestorePointCreateInfo {
            path: dir.clone(),
            flags: CreateFlags::DEVICE_MEMORY_DATA,
            thread_count: 1,
            ..Default::default()
        },
        Some(&tracker),
    )
    .expect("create restore point");

    // Rewrite the manifest with the buffer hoisted to the front: its device
    // dependency is now unresolved at creation time.
    let mut manifest = RestorePointManifest::read(restore_point.path()).expect("manifest");
    manifest.objects.rotate_right(1);
    manifest.write(restore_point.path(), false).expect("rewrite");

    let result = apply_restore_point(
        graph.entry.clone(),
        RestorePointApplyInfo {
            thread_count: 1,
            ..Default::default()
        },
        &RestorePoint::open(&dir).expect("reopen"),
        None,
    );
    assert!(result.is_err(), "shuffled manifest must not apply");

    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn repeating_apply_maps_active_objects_to_themselves() {
    let Some(graph) = build_live_graph() else {
        return;
    };
    let dir = scratch_dir("repeat");

    let records = tracker_records(&graph);
    let captured_buffer = graph.buffer.as_raw();
    let tracker = Arc::new(RecordedStateTracker::new(records));
    let restore_point = create_restore_point(
        graph.entry.clone(),
        RestorePointCreateInfo {
            path: dir.clone(),
            flags: CreateFlags::DEVICE_MEMORY_DATA,
            thread_count: 1,
            ..Default::default()
        },
        Some(tracker.as_ref()),
    )
    .expect("create restore point");

    // Everything is still live, so in-place restore keeps every identity.
    let applied = apply_restore_point(
        graph.entry.clone(),
        RestorePointApplyInfo {
            thread_count: 1,
            ..Default::default()
        },
        &restore_point,
        Some(tracker.clone() as Arc<dyn vksnap_core::StateTracker>),
    )
    .expect("repeating apply");

    assert_eq!(
        applied.restored_handle(captured_buffer).expect("identity"),
        captured_buffer
    );

    drop(applied);
    std::fs::remove_dir_all(dir).ok();
}
