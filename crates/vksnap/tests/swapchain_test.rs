//! Integration test: swapchain restore keeps positional image order.
//!
//! Uses VK_EXT_headless_surface so the test runs without a window system;
//! skips with a message when the extension, a device, or swapchain support
//! is missing.

use ash::vk;
use ash::vk::Handle;

use vksnap::{apply_restore_point, create_restore_point, CreateFlags};
use vksnap_core::{RecordedStateTracker, RestorePointApplyInfo, RestorePointCreateInfo};
use vksnap_object::create_info::*;
use vksnap_object::object::{ObjectType, StateTrackedObject};
use vksnap_object::restore_info::*;
use vksnap_object::{RestoreInfo, TypedRestoreInfo};

struct SwapchainGraph {
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue_family_index: u32,
    surface: vk::SurfaceKHR,
    surface_fns: ash::khr::surface::Instance,
    swapchain: vk::SwapchainKHR,
    swapchain_fns: ash::khr::swapchain::Device,
    images: Vec<vk::Image>,
    extent: vk::Extent2D,
    format: vk::SurfaceFormatKHR,
    min_image_count: u32,
    pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl Drop for SwapchainGraph {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.swapchain_fns.destroy_swapchain(self.swapchain, None);
            self.device.destroy_device(None);
            self.surface_fns.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}

fn build_swapchain_graph() -> Option<SwapchainGraph> {
    let entry = match unsafe { ash::Entry::load() } {
        Ok(entry) => entry,
        Err(err) => {
            eprintln!("skipping: no Vulkan loader ({err})");
            return None;
        }
    };

    let supported = unsafe { entry.enumerate_instance_extension_properties(None) }
        .unwrap_or_default();
    let has_headless = supported.iter().any(|properties| {
        properties
            .extension_name_as_c_str()
            .is_ok_and(|name| name == ash::ext::headless_surface::NAME)
    });
    let has_surface = supported.iter().any(|properties| {
        properties
            .extension_name_as_c_str()
            .is_ok_and(|name| name == ash::khr::surface::NAME)
    });
    if !has_headless || !has_surface {
        eprintln!("skipping: VK_EXT_headless_surface not available");
        return None;
    }

    let extensions = [
        ash::khr::surface::NAME.as_ptr(),
        ash::ext::headless_surface::NAME.as_ptr(),
    ];
    let app_info = vk::ApplicationInfo::default().api_version(vk::make_api_version(0, 1, 1, 0));
    let instance_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extensions);
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

    let device_extensions = unsafe {
        instance
            .enumerate_device_extension_properties(physical_device)
            .unwrap_or_default()
    };
    let has_swapchain = device_extensions.iter().any(|properties| {
        properties
            .extension_name_as_c_str()
            .is_ok_and(|name| name == ash::khr::swapchain::NAME)
    });
    if !has_swapchain {
        eprintln!("skipping: VK_KHR_swapchain not available");
        unsafe { instance.destroy_instance(None) };
        return None;
    }

    let headless_fns = ash::ext::headless_surface::Instance::new(&entry, &instance);
    let surface_fns = ash::khr::surface::Instance::new(&entry, &instance);
    let surface = match unsafe {
        headless_fns
            .create_headless_surface(&vk::HeadlessSurfaceCreateInfoEXT::default(), None)
    } {
        Ok(surface) => surface,
        Err(err) => {
            eprintln!("skipping: headless surface creation failed ({err:?})");
            unsafe { instance.destroy_instance(None) };
            return None;
        }
    };

    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
    let queue_family_index = families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .expect("no graphics queue family") as u32;

    let priorities = [1.0f32];
    let queue_info = vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family_index)
        .queue_priorities(&priorities);
    let device_ext_names = [ash::khr::swapchain::NAME.as_ptr()];
    let device_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(std::slice::from_ref(&queue_info))
        .enabled_extension_names(&device_ext_names);
    let device = match unsafe { instance.create_device(physical_device, &device_info, None) } {
        Ok(device) => device,
        Err(err) => {
            eprintln!("skipping: cannot create device ({err:?})");
            unsafe {
                surface_fns.destroy_surface(surface, None);
                instance.destroy_instance(None);
            }
            return None;
        }
    };

    let capabilities = unsafe {
        surface_fns
            .get_physical_device_surface_capabilities(physical_device, surface)
            .expect("surface capabilities")
    };
    let formats = unsafe {
        surface_fns
            .get_physical_device_surface_formats(physical_device, surface)
            .expect("surface formats")
    };
    let format = formats[0];
    let extent = if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: 64,
            height: 64,
        }
    };
    let min_image_count = capabilities.min_image_count.max(2);
    let pre_transform = capabilities.current_transform;

    let swapchain_fns = ash::khr::swapchain::Device::new(&instance, &device);
    let swapchain_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(min_image_count)
        .image_format(format.format)
        .image_color_space(format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(pre_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(vk::PresentModeKHR::FIFO)
        .clipped(true);
    let swapchain = match unsafe { swapchain_fns.create_swapchain(&swapchain_info, None) } {
        Ok(swapchain) => swapchain,
        Err(err) => {
            eprintln!("skipping: swapchain creation failed ({err:?})");
            unsafe {
                device.destroy_device(None);
                surface_fns.destroy_surface(surface, None);
                instance.destroy_instance(None);
            }
            return None;
        }
    };
    let images =
        unsafe { swapchain_fns.get_swapchain_images(swapchain) }.expect("swapchain images");

    Some(SwapchainGraph {
        entry,
        instance,
        physical_device,
        device,
        queue_family_index,
        surface,
        surface_fns,
        swapchain,
        swapchain_fns,
        images,
        extent,
        format,
        min_image_count,
        pre_transform,
    })
}

fn swapchain_records(graph: &SwapchainGraph) -> Vec<RestoreInfo> {
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
    let surface =
        StateTrackedObject::new(ObjectType::Surface, graph.surface.as_raw(), instance.handle);
    let swapchain = StateTrackedObject::new(
        ObjectType::Swapchain,
        graph.swapchain.as_raw(),
        device.handle,
    );
    let images: Vec<StateTrackedObject> = graph
        .images
        .iter()
        .map(|image| StateTrackedObject::new(ObjectType::Image, image.as_raw(), device.handle))
        .collect();

    let queue_create_info = SerializedDeviceQueueCreateInfo {
        flags: 0,
        queue_family_index: graph.queue_family_index,
        queue_priorities: vec![1.0],
    };

    let mut records = vec![
        RestoreInfo {
            object: instance,
            dependencies: vec![],
            info: TypedRestoreInfo::Instance(InstanceRestoreInfo {
                create_info: SerializedInstanceCreateInfo {
                    flags: 0,
                    application_info: Some(SerializedApplicationInfo {
                        application_name: None,
                        application_version: 0,
                        engine_name: None,
                        engine_version: 0,
                        api_version: vk::make_api_version(0, 1, 1, 0),
                    }),
                    enabled_layers: vec![],
                    enabled_extensions: vec![
                        "VK_KHR_surface".to_string(),
                        "VK_EXT_headless_surface".to_string(),
                    ],
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
                    enabled_extensions: vec!["VK_KHR_swapchain".to_string()],
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
            object: surface,
            dependencies: vec![instance],
            info: TypedRestoreInfo::Surface(SurfaceRestoreInfo {
                create_info: SurfaceCreateInfo::Headless { flags: 0 },
            }),
        },
        RestoreInfo {
            object: swapchain,
            dependencies: vec![device, surface],
            info: TypedRestoreInfo::Swapchain(SwapchainRestoreInfo {
                create_info: SerializedSwapchainCreateInfo {
                    flags: 0,
                    surface: surface.handle,
                    min_image_count: graph.min_image_count,
                    image_format: graph.format.format.as_raw(),
                    image_color_space: graph.format.color_space.as_raw(),
                    image_extent: SerializedExtent2D {
                        width: graph.extent.width,
                        height: graph.extent.height,
                    },
                    image_array_layers: 1,
                    image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw(),
                    image_sharing_mode: vk::SharingMode::EXCLUSIVE.as_raw(),
                    queue_family_indices: vec![],
                    pre_transform: graph.pre_transform.as_raw(),
                    composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE.as_raw(),
                    present_mode: vk::PresentModeKHR::FIFO.as_raw(),
                    clipped: true,
                    old_swapchain: 0,
                },
                images: images.clone(),
            }),
        },
    ];

    for image in &images {
        records.push(RestoreInfo {
            object: *image,
            dependencies: vec![device, swapchain],
            info: TypedRestoreInfo::Image(ImageRestoreInfo {
                create_info: SerializedImageCreateInfo {
                    flags: 0,
                    image_type: vk::ImageType::TYPE_2D.as_raw(),
                    format: graph.format.format.as_raw(),
                    extent: SerializedExtent3D {
                        width: graph.extent.width,
                        height: graph.extent.height,
                        depth: 1,
                    },
                    mip_levels: 1,
                    array_layers: 1,
                    samples: vk::SampleCountFlags::TYPE_1.as_raw(),
                    tiling: vk::ImageTiling::OPTIMAL.as_raw(),
                    usage: vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw(),
                    sharing_mode: vk::SharingMode::EXCLUSIVE.as_raw(),
                    queue_family_indices: vec![],
                    initial_layout: vk::ImageLayout::UNDEFINED.as_raw(),
                    pnext: vec![],
                },
                bindings: vec![],
                subresource_layouts: vec![],
                swapchain: Some(swapchain),
            }),
        });
    }
    records
}

#[test]
fn swapchain_images_keep_positional_order() {
    let Some(graph) = build_swapchain_graph() else {
        return;
    };
    let dir = std::env::temp_dir().join(format!("vksnap-e2e-swapchain-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("scratch dir");

    let records = swapchain_records(&graph);
    let tracker = RecordedStateTracker::new(records);
    let restore_point = create_restore_point(
        graph.entry.clone(),
        RestorePointCreateInfo {
            path: dir.clone(),
            flags: CreateFlags::OBJECT_JSON,
            thread_count: 1,
            ..Default::default()
        },
        Some(&tracker),
    )
    .expect("create restore point");

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

    // Exactly N images registered, positional order preserved: captured
    // image i resolves to slot i of vkGetSwapchainImagesKHR on the restored
    // chain.
    let restored_swapchain = applied
        .restored_handle(graph.swapchain.as_raw())
        .expect("swapchain mapping");
    let restored_instance = unsafe {
        ash::Instance::load(
            graph.entry.static_fn(),
            vk::Instance::from_raw(
                applied
                    .restored_handle(graph.instance.handle().as_raw())
                    .expect("instance mapping"),
            ),
        )
    };
    let restored_device = unsafe {
        ash::Device::load(
            restored_instance.fp_v1_0(),
            vk::Device::from_raw(
                applied
                    .restored_handle(graph.device.handle().as_raw())
                    .expect("device mapping"),
            ),
        )
    };
    let restored_fns = ash::khr::swapchain::Device::new(&restored_instance, &restored_device);
    let restored_images = unsafe {
        restored_fns.get_swapchain_images(vk::SwapchainKHR::from_raw(restored_swapchain))
    }
    .expect("restored swapchain images");

    assert_eq!(restored_images.len(), graph.images.len());
    for (index, captured) in graph.images.iter().enumerate() {
        let mapped = applied
            .restored_handle(captured.as_raw())
            .expect("image mapping");
        assert_eq!(
            mapped,
            restored_images[index].as_raw(),
            "image {index} lost positional order"
        );
    }
    println!(
        "swapchain restored with {} images in positional order",
        restored_images.len()
    );

    drop(applied);
    std::fs::remove_dir_all(dir).ok();
}
