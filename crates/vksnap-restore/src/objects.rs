//! Per-type object creation for the apply pass.
//!
//! Each function rebuilds one Vulkan object from its serialized restore
//! info: dependencies are resolved through the handle map, handle-bearing
//! create-info fields are rewritten in place, the real creation entry point
//! is invoked, and the new mapping is registered.

use std::ffi::{CStr, CString};

use ash::vk;
use ash::vk::Handle;
use tracing::{debug, warn};

use vksnap_core::error::{SnapError, SnapResult};
use vksnap_object::create_info::*;
use vksnap_object::object::{ObjectType, StateTrackedObject};
use vksnap_object::restore_info::*;
use vksnap_object::RestoreInfo;

use crate::applier::{Applier, DeviceContext};
use crate::convert;
use crate::state::{group_queues, plan_fence_reconciliation, FenceAction};

/// Extensions force-enabled on every restored instance; filtered against
/// the loader's supported set so restoration also works on platforms that
/// lack one of them.
const FORCED_INSTANCE_EXTENSIONS: [&CStr; 4] = [
    ash::khr::surface::NAME,
    ash::khr::win32_surface::NAME,
    ash::khr::external_memory_capabilities::NAME,
    ash::khr::get_physical_device_properties2::NAME,
];

fn cstring(value: &str) -> SnapResult<CString> {
    CString::new(value)
        .map_err(|_| SnapError::MalformedInfo(format!("embedded NUL in string {value:?}")))
}

fn features_from_raw(bytes: &[u8]) -> SnapResult<vk::PhysicalDeviceFeatures> {
    if bytes.len() != std::mem::size_of::<vk::PhysicalDeviceFeatures>() {
        return Err(SnapError::MalformedInfo(format!(
            "physical-device features blob has {} bytes",
            bytes.len()
        )));
    }
    Ok(unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const vk::PhysicalDeviceFeatures) })
}

impl Applier {
    // ── Instance / physical devices ─────────────────────────

    pub(crate) fn restore_instance(
        &mut self,
        object: &StateTrackedObject,
        info: &InstanceRestoreInfo,
    ) -> SnapResult<()> {
        let create = &info.create_info;

        let supported: Vec<CString> =
            unsafe { self.entry.enumerate_instance_extension_properties(None) }
                .map_err(SnapError::Vulkan)?
            .iter()
            .filter_map(|properties| {
                properties
                    .extension_name_as_c_str()
                    .ok()
                    .map(CString::from)
            })
            .collect();

        // Layer names are stripped; the restored process loads its own
        // layer stack.
        let mut extensions: Vec<CString> = Vec::new();
        for name in &create.enabled_extensions {
            extensions.push(cstring(name)?);
        }
        for name in FORCED_INSTANCE_EXTENSIONS {
            if !extensions.iter().any(|ext| ext.as_c_str() == name) {
                extensions.push(CString::from(name));
            }
        }
        extensions.retain(|ext| {
            let keep = supported.iter().any(|s| s == ext);
            if !keep {
                warn!(extension = ?ext, "dropping unsupported instance extension");
            }
            keep
        });
        let extension_ptrs: Vec<*const i8> =
            extensions.iter().map(|ext| ext.as_ptr()).collect();

        let application_name = match &create.application_info {
            Some(app) => app
                .application_name
                .as_deref()
                .map(cstring)
                .transpose()?,
            None => None,
        };
        let engine_name = match &create.application_info {
            Some(app) => app.engine_name.as_deref().map(cstring).transpose()?,
            None => None,
        };

        let mut app_info = vk::ApplicationInfo::default();
        if let Some(app) = &create.application_info {
            app_info = app_info
                .application_version(app.application_version)
                .engine_version(app.engine_version)
                .api_version(app.api_version);
            if let Some(name) = &application_name {
                app_info = app_info.application_name(name.as_c_str());
            }
            if let Some(name) = &engine_name {
                app_info = app_info.engine_name(name.as_c_str());
            }
        }

        let mut instance_info = vk::InstanceCreateInfo::default()
            .flags(vk::InstanceCreateFlags::from_raw(create.flags))
            .enabled_extension_names(&extension_ptrs);
        if create.application_info.is_some() {
            instance_info = instance_info.application_info(&app_info);
        }

        let instance = unsafe { self.entry.create_instance(&instance_info, None) }
            .map_err(SnapError::Vulkan)?;
        let restored = instance.handle().as_raw();
        self.handles
            .register(ObjectType::Instance, object.handle, restored)?;
        self.register_instance_context(restored, instance)?;

        // Positional physical-device correspondence: captured device i maps
        // to restored enumeration slot i.
        let context = &self.instances[&restored];
        if context.physical_devices.len() != info.physical_devices.len() {
            warn!(
                captured = info.physical_devices.len(),
                restored = context.physical_devices.len(),
                "physical device count changed between capture and apply"
            );
        }
        let pairs: Vec<(u64, u64)> = info
            .physical_devices
            .iter()
            .zip(context.physical_devices.iter())
            .map(|(captured, restored)| (captured.handle, restored.as_raw()))
            .collect();
        for (captured, restored) in pairs {
            self.handles
                .register(ObjectType::PhysicalDevice, captured, restored)?;
        }
        Ok(())
    }

    // ── Device / queues ─────────────────────────────────────

    pub(crate) fn restore_device(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &DeviceRestoreInfo,
    ) -> SnapResult<()> {
        let physical_device_dep = restore
            .dependency_of_type(ObjectType::PhysicalDevice)
            .ok_or_else(|| {
                SnapError::MalformedInfo("device without physical-device dependency".into())
            })?;
        let physical_device = vk::PhysicalDevice::from_raw(
            self.handles.get_restored(physical_device_dep.handle)?,
        );
        let instance = self
            .instances
            .values()
            .find(|context| context.physical_devices.contains(&physical_device))
            .map(|context| context.instance.clone())
            .ok_or_else(|| {
                SnapError::MalformedInfo("physical device belongs to no restored instance".into())
            })?;

        let create = &info.create_info;
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = create
            .queue_create_infos
            .iter()
            .map(|queue| {
                vk::DeviceQueueCreateInfo::default()
                    .flags(vk::DeviceQueueCreateFlags::from_raw(queue.flags))
                    .queue_family_index(queue.queue_family_index)
                    .queue_priorities(&queue.queue_priorities)
            })
            .collect();

        let extensions: Vec<CString> = create
            .enabled_extensions
            .iter()
            .map(|name| cstring(name))
            .collect::<SnapResult<_>>()?;
        let extension_ptrs: Vec<*const i8> =
            extensions.iter().map(|ext| ext.as_ptr()).collect();

        let features = create
            .enabled_features_raw
            .as_deref()
            .map(features_from_raw)
            .transpose()?;

        let mut device_info = vk::DeviceCreateInfo::default()
            .flags(vk::DeviceCreateFlags::from_raw(create.flags))
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs);
        if let Some(features) = &features {
            device_info = device_info.enabled_features(features);
        }

        let device = unsafe { instance.create_device(physical_device, &device_info, None) }
            .map_err(SnapError::Vulkan)?;
        let restored = device.handle().as_raw();
        self.handles
            .register(ObjectType::Device, object.handle, restored)?;

        // Recover per-family queue lists by grouping captured queues on
        // their originating queue-create-info, then fetch each restored
        // queue by index within its group.
        let groups = group_queues(&info.queues);
        for (create_info, members) in &groups {
            for (index, member) in members.iter().enumerate() {
                let queue = unsafe {
                    device.get_device_queue(create_info.queue_family_index, index as u32)
                };
                self.handles.register(
                    ObjectType::Queue,
                    member.object.handle,
                    queue.as_raw(),
                )?;
            }
        }

        let queue_family_index = groups
            .first()
            .map(|(info, _)| info.queue_family_index)
            .or_else(|| create.queue_create_infos.first().map(|q| q.queue_family_index))
            .unwrap_or(0);
        self.register_device_context(restored, device, physical_device, queue_family_index)
    }

    // ── Memory ──────────────────────────────────────────────

    pub(crate) fn restore_device_memory(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &DeviceMemoryRestoreInfo,
    ) -> SnapResult<()> {
        let mut allocate = info.allocate_info.clone();
        self.handles.update_handles(&mut allocate)?;
        let context = self.device_for(restore)?;

        let mut flags_info: Option<vk::MemoryAllocateFlagsInfo> = None;
        let mut dedicated: Option<vk::MemoryDedicatedAllocateInfo> = None;
        for entry in &allocate.pnext {
            match entry {
                PNextEntry::MemoryAllocateFlagsInfo { flags, device_mask } => {
                    flags_info = Some(
                        vk::MemoryAllocateFlagsInfo::default()
                            .flags(vk::MemoryAllocateFlags::from_raw(*flags))
                            .device_mask(*device_mask),
                    );
                }
                PNextEntry::MemoryDedicatedAllocateInfo { image, buffer } => {
                    dedicated = Some(
                        vk::MemoryDedicatedAllocateInfo::default()
                            .image(vk::Image::from_raw(*image))
                            .buffer(vk::Buffer::from_raw(*buffer)),
                    );
                }
                other => {
                    debug!(?other, "skipping extension structure on memory allocation");
                }
            }
        }

        let mut allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(allocate.allocation_size)
            .memory_type_index(allocate.memory_type_index);
        if let Some(flags_info) = flags_info.as_mut() {
            allocate_info = allocate_info.push_next(flags_info);
        }
        if let Some(dedicated) = dedicated.as_mut() {
            allocate_info = allocate_info.push_next(dedicated);
        }

        let memory = unsafe { context.device.allocate_memory(&allocate_info, None) }
            .map_err(SnapError::Vulkan)?;
        self.handles
            .register(ObjectType::DeviceMemory, object.handle, memory.as_raw())?;
        self.enroll_for_state_phases(object);
        Ok(())
    }

    // ── Buffers / images / views / samplers ─────────────────

    pub(crate) fn restore_buffer(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &BufferRestoreInfo,
    ) -> SnapResult<()> {
        let mut create = info.create_info.clone();
        self.handles.update_handles(&mut create)?;

        let mut opaque_address: Option<vk::BufferOpaqueCaptureAddressCreateInfo> = None;
        for entry in &create.pnext {
            match entry {
                PNextEntry::BufferOpaqueCaptureAddressCreateInfo {
                    opaque_capture_address,
                } => {
                    opaque_address = Some(
                        vk::BufferOpaqueCaptureAddressCreateInfo::default()
                            .opaque_capture_address(*opaque_capture_address),
                    );
                }
                other => debug!(?other, "skipping extension structure on buffer creation"),
            }
        }

        let mut buffer_info = vk::BufferCreateInfo::default()
            .flags(vk::BufferCreateFlags::from_raw(create.flags))
            .size(create.size)
            .usage(vk::BufferUsageFlags::from_raw(create.usage))
            .sharing_mode(vk::SharingMode::from_raw(create.sharing_mode))
            .queue_family_indices(&create.queue_family_indices);
        if let Some(opaque_address) = opaque_address.as_mut() {
            buffer_info = buffer_info.push_next(opaque_address);
        }

        let buffer = {
            let context = self.device_for(restore)?;
            let buffer = unsafe { context.device.create_buffer(&buffer_info, None) }
                .map_err(SnapError::Vulkan)?;
            for binding in &info.bindings {
                let memory = vk::DeviceMemory::from_raw(
                    self.handles.get_restored(binding.memory.handle)?,
                );
                unsafe {
                    context
                        .device
                        .bind_buffer_memory(buffer, memory, binding.memory_offset)
                        .map_err(SnapError::Vulkan)?;
                }
            }
            buffer
        };

        self.handles
            .register(ObjectType::Buffer, object.handle, buffer.as_raw())?;
        self.enroll_for_state_phases(object);
        Ok(())
    }

    pub(crate) fn restore_buffer_view(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &BufferViewRestoreInfo,
    ) -> SnapResult<()> {
        let mut create = info.create_info.clone();
        self.handles.update_handles(&mut create)?;
        let context = self.device_for(restore)?;

        let view_info = vk::BufferViewCreateInfo::default()
            .flags(vk::BufferViewCreateFlags::from_raw(create.flags))
            .buffer(vk::Buffer::from_raw(create.buffer))
            .format(vk::Format::from_raw(create.format))
            .offset(create.offset)
            .range(create.range);
        let view = unsafe { context.device.create_buffer_view(&view_info, None) }
            .map_err(SnapError::Vulkan)?;
        self.handles
            .register(ObjectType::BufferView, object.handle, view.as_raw())
    }

    pub(crate) fn restore_image(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &ImageRestoreInfo,
    ) -> SnapResult<()> {
        if let Some(swapchain) = &info.swapchain {
            // Swapchain images are registered positionally when their
            // swapchain is restored; reaching this point means that never
            // happened.
            return Err(SnapError::MalformedInfo(format!(
                "swapchain image {:#x} was not registered by swapchain {:#x}",
                object.handle, swapchain.handle
            )));
        }

        let mut create = info.create_info.clone();
        self.handles.update_handles(&mut create)?;

        let mut format_list_formats: Vec<vk::Format> = Vec::new();
        let mut format_list: Option<vk::ImageFormatListCreateInfo> = None;
        for entry in &create.pnext {
            match entry {
                PNextEntry::ImageFormatListCreateInfo { view_formats } => {
                    format_list_formats = view_formats
                        .iter()
                        .map(|format| vk::Format::from_raw(*format))
                        .collect();
                    format_list = Some(
                        vk::ImageFormatListCreateInfo::default()
                            .view_formats(&format_list_formats),
                    );
                }
                other => debug!(?other, "skipping extension structure on image creation"),
            }
        }
        let _ = &format_list_formats;

        let mut image_info = vk::ImageCreateInfo::default()
            .flags(vk::ImageCreateFlags::from_raw(create.flags))
            .image_type(vk::ImageType::from_raw(create.image_type))
            .format(vk::Format::from_raw(create.format))
            .extent(convert::extent_3d(&create.extent))
            .mip_levels(create.mip_levels)
            .array_layers(create.array_layers)
            .samples(vk::SampleCountFlags::from_raw(create.samples))
            .tiling(vk::ImageTiling::from_raw(create.tiling))
            .usage(vk::ImageUsageFlags::from_raw(create.usage))
            .sharing_mode(vk::SharingMode::from_raw(create.sharing_mode))
            .queue_family_indices(&create.queue_family_indices)
            .initial_layout(vk::ImageLayout::from_raw(create.initial_layout));
        if let Some(format_list) = format_list.as_mut() {
            image_info = image_info.push_next(format_list);
        }

        let image = {
            let context = self.device_for(restore)?;
            let image = unsafe { context.device.create_image(&image_info, None) }
                .map_err(SnapError::Vulkan)?;
            for binding in &info.bindings {
                let memory = vk::DeviceMemory::from_raw(
                    self.handles.get_restored(binding.memory.handle)?,
                );
                unsafe {
                    context
                        .device
                        .bind_image_memory(image, memory, binding.memory_offset)
                        .map_err(SnapError::Vulkan)?;
                }
            }
            image
        };

        self.handles
            .register(ObjectType::Image, object.handle, image.as_raw())?;
        self.enroll_for_state_phases(object);
        Ok(())
    }

    pub(crate) fn restore_image_view(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &ImageViewRestoreInfo,
    ) -> SnapResult<()> {
        let mut create = info.create_info.clone();
        self.handles.update_handles(&mut create)?;
        let context = self.device_for(restore)?;

        let view_info = vk::ImageViewCreateInfo::default()
            .flags(vk::ImageViewCreateFlags::from_raw(create.flags))
            .image(vk::Image::from_raw(create.image))
            .view_type(vk::ImageViewType::from_raw(create.view_type))
            .format(vk::Format::from_raw(create.format))
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::from_raw(create.components[0]),
                g: vk::ComponentSwizzle::from_raw(create.components[1]),
                b: vk::ComponentSwizzle::from_raw(create.components[2]),
                a: vk::ComponentSwizzle::from_raw(create.components[3]),
            })
            .subresource_range(convert::subresource_range(&create.subresource_range));
        let view = unsafe { context.device.create_image_view(&view_info, None) }
            .map_err(SnapError::Vulkan)?;
        self.handles
            .register(ObjectType::ImageView, object.handle, view.as_raw())
    }

    pub(crate) fn restore_sampler(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &SamplerRestoreInfo,
    ) -> SnapResult<()> {
        let create = &info.create_info;
        let context = self.device_for(restore)?;
        let sampler_info = vk::SamplerCreateInfo::default()
            .flags(vk::SamplerCreateFlags::from_raw(create.flags))
            .mag_filter(vk::Filter::from_raw(create.mag_filter))
            .min_filter(vk::Filter::from_raw(create.min_filter))
            .mipmap_mode(vk::SamplerMipmapMode::from_raw(create.mipmap_mode))
            .address_mode_u(vk::SamplerAddressMode::from_raw(create.address_mode_u))
            .address_mode_v(vk::SamplerAddressMode::from_raw(create.address_mode_v))
            .address_mode_w(vk::SamplerAddressMode::from_raw(create.address_mode_w))
            .mip_lod_bias(create.mip_lod_bias)
            .anisotropy_enable(create.anisotropy_enable)
            .max_anisotropy(create.max_anisotropy)
            .compare_enable(create.compare_enable)
            .compare_op(vk::CompareOp::from_raw(create.compare_op))
            .min_lod(create.min_lod)
            .max_lod(create.max_lod)
            .border_color(vk::BorderColor::from_raw(create.border_color))
            .unnormalized_coordinates(create.unnormalized_coordinates);
        let sampler = unsafe { context.device.create_sampler(&sampler_info, None) }
            .map_err(SnapError::Vulkan)?;
        self.handles
            .register(ObjectType::Sampler, object.handle, sampler.as_raw())
    }

    // ── Shader modules / caches / layouts / pools ───────────

    pub(crate) fn restore_shader_module(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &ShaderModuleRestoreInfo,
    ) -> SnapResult<()> {
        let context = self.device_for(restore)?;
        let module_info = vk::ShaderModuleCreateInfo::default()
            .flags(vk::ShaderModuleCreateFlags::from_raw(info.create_info.flags))
            .code(&info.create_info.code);
        let module = unsafe { context.device.create_shader_module(&module_info, None) }
            .map_err(SnapError::Vulkan)?;
        self.handles
            .register(ObjectType::ShaderModule, object.handle, module.as_raw())
    }

    pub(crate) fn restore_pipeline_cache(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &PipelineCacheRestoreInfo,
    ) -> SnapResult<()> {
        let context = self.device_for(restore)?;
        let cache_info = vk::PipelineCacheCreateInfo::default()
            .flags(vk::PipelineCacheCreateFlags::from_raw(info.create_info.flags))
            .initial_data(&info.create_info.initial_data);
        let cache = unsafe { context.device.create_pipeline_cache(&cache_info, None) }
            .map_err(SnapError::Vulkan)?;
        self.handles
            .register(ObjectType::PipelineCache, object.handle, cache.as_raw())
    }

    pub(crate) fn restore_descriptor_set_layout(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &DescriptorSetLayoutRestoreInfo,
    ) -> SnapResult<()> {
        let mut create = info.create_info.clone();
        self.handles.update_handles(&mut create)?;
        let context = self.device_for(restore)?;

        let immutable_samplers: Vec<Vec<vk::Sampler>> = create
            .bindings
            .iter()
            .map(|binding| {
                binding
                    .immutable_samplers
                    .iter()
                    .map(|sampler| vk::Sampler::from_raw(*sampler))
                    .collect()
            })
            .collect();
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = create
            .bindings
            .iter()
            .zip(immutable_samplers.iter())
            .map(|(binding, samplers)| {
                let mut out = vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(vk::DescriptorType::from_raw(binding.descriptor_type))
                    .descriptor_count(binding.descriptor_count)
                    .stage_flags(vk::ShaderStageFlags::from_raw(binding.stage_flags));
                if !samplers.is_empty() {
                    out = out.immutable_samplers(samplers);
                }
                out
            })
            .collect();

        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .flags(vk::DescriptorSetLayoutCreateFlags::from_raw(create.flags))
            .bindings(&bindings);
        let layout = unsafe {
            context
                .device
                .create_descriptor_set_layout(&layout_info, None)
        }
        .map_err(SnapError::Vulkan)?;
        self.handles
            .register(ObjectType::DescriptorSetLayout, object.handle, layout.as_raw())
    }

    pub(crate) fn restore_pipeline_layout(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &PipelineLayoutRestoreInfo,
    ) -> SnapResult<()> {
        let mut create = info.create_info.clone();
        self.handles.update_handles(&mut create)?;
        let context = self.device_for(restore)?;

        let set_layouts: Vec<vk::DescriptorSetLayout> = create
            .set_layouts
            .iter()
            .map(|layout| vk::DescriptorSetLayout::from_raw(*layout))
            .collect();
        let push_constant_ranges: Vec<vk::PushConstantRange> = create
            .push_constant_ranges
            .iter()
            .map(|range| vk::PushConstantRange {
                stage_flags: vk::ShaderStageFlags::from_raw(range.stage_flags),
                offset: range.offset,
                size: range.size,
            })
            .collect();

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .flags(vk::PipelineLayoutCreateFlags::from_raw(create.flags))
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let layout = unsafe { context.device.create_pipeline_layout(&layout_info, None) }
            .map_err(SnapError::Vulkan)?;
        self.handles
            .register(ObjectType::PipelineLayout, object.handle, layout.as_raw())
    }

    pub(crate) fn restore_descriptor_pool(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &DescriptorPoolRestoreInfo,
    ) -> SnapResult<()> {
        let create = &info.create_info;
        let context = self.device_for(restore)?;
        let pool_sizes: Vec<vk::DescriptorPoolSize> = create
            .pool_sizes
            .iter()
            .map(|size| vk::DescriptorPoolSize {
                ty: vk::DescriptorType::from_raw(size.descriptor_type),
                descriptor_count: size.descriptor_count,
            })
            .collect();
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::from_raw(create.flags))
            .max_sets(create.max_sets)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { context.device.create_descriptor_pool(&pool_info, None) }
            .map_err(SnapError::Vulkan)?;
        self.handles
            .register(ObjectType::DescriptorPool, object.handle, pool.as_raw())
    }

    pub(crate) fn restore_descriptor_set(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &DescriptorSetRestoreInfo,
    ) -> SnapResult<()> {
        let mut allocate = info.allocate_info;

        // The layout is taken from the dependency list rather than trusting
        // the captured allocate-info, then the generic rewrite resolves it
        // along with the pool.
        let layout_dep = restore
            .dependency_of_type(ObjectType::DescriptorSetLayout)
            .ok_or_else(|| {
                SnapError::MalformedInfo("descriptor set without layout dependency".into())
            })?;
        allocate.set_layout = layout_dep.handle;
        self.handles.update_handles(&mut allocate)?;

        let context = self.device_for(restore)?;
        let set_layouts = [vk::DescriptorSetLayout::from_raw(allocate.set_layout)];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(vk::DescriptorPool::from_raw(allocate.descriptor_pool))
            .set_layouts(&set_layouts);
        let sets = unsafe { context.device.allocate_descriptor_sets(&allocate_info) }
            .map_err(SnapError::Vulkan)?;
        self.handles
            .register(ObjectType::DescriptorSet, object.handle, sets[0].as_raw())?;
        self.enroll_for_state_phases(object);
        Ok(())
    }

    // ── Render passes / framebuffers ────────────────────────

    pub(crate) fn restore_render_pass(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &RenderPassRestoreInfo,
    ) -> SnapResult<()> {
        let create = &info.create_info;
        let context = self.device_for(restore)?;

        let attachments: Vec<vk::AttachmentDescription> = create
            .attachments
            .iter()
            .map(|attachment| vk::AttachmentDescription {
                flags: vk::AttachmentDescriptionFlags::from_raw(attachment.flags),
                format: vk::Format::from_raw(attachment.format),
                samples: vk::SampleCountFlags::from_raw(attachment.samples),
                load_op: vk::AttachmentLoadOp::from_raw(attachment.load_op),
                store_op: vk::AttachmentStoreOp::from_raw(attachment.store_op),
                stencil_load_op: vk::AttachmentLoadOp::from_raw(attachment.stencil_load_op),
                stencil_store_op: vk::AttachmentStoreOp::from_raw(attachment.stencil_store_op),
                initial_layout: vk::ImageLayout::from_raw(attachment.initial_layout),
                final_layout: vk::ImageLayout::from_raw(attachment.final_layout),
            })
            .collect();

        let reference = |r: &SerializedAttachmentReference| vk::AttachmentReference {
            attachment: r.attachment,
            layout: vk::ImageLayout::from_raw(r.layout),
        };
        let input_refs: Vec<Vec<vk::AttachmentReference>> = create
            .subpasses
            .iter()
            .map(|subpass| subpass.input_attachments.iter().map(reference).collect())
            .collect();
        let color_refs: Vec<Vec<vk::AttachmentReference>> = create
            .subpasses
            .iter()
            .map(|subpass| subpass.color_attachments.iter().map(reference).collect())
            .collect();
        let resolve_refs: Vec<Vec<vk::AttachmentReference>> = create
            .subpasses
            .iter()
            .map(|subpass| subpass.resolve_attachments.iter().map(reference).collect())
            .collect();
        let depth_refs: Vec<Option<vk::AttachmentReference>> = create
            .subpasses
            .iter()
            .map(|subpass| subpass.depth_stencil_attachment.as_ref().map(reference))
            .collect();

        let subpasses: Vec<vk::SubpassDescription> = create
            .subpasses
            .iter()
            .enumerate()
            .map(|(index, subpass)| {
                let mut description = vk::SubpassDescription::default()
                    .flags(vk::SubpassDescriptionFlags::from_raw(subpass.flags))
                    .pipeline_bind_point(vk::PipelineBindPoint::from_raw(
                        subpass.pipeline_bind_point,
                    ))
                    .input_attachments(&input_refs[index])
                    .color_attachments(&color_refs[index])
                    .preserve_attachments(&subpass.preserve_attachments);
                if !resolve_refs[index].is_empty() {
                    description = description.resolve_attachments(&resolve_refs[index]);
                }
                if let Some(depth) = &depth_refs[index] {
                    description = description.depth_stencil_attachment(depth);
                }
                description
            })
            .collect();

        let dependencies: Vec<vk::SubpassDependency> = create
            .dependencies
            .iter()
            .map(|dependency| vk::SubpassDependency {
                src_subpass: dependency.src_subpass,
                dst_subpass: dependency.dst_subpass,
                src_stage_mask: vk::PipelineStageFlags::from_raw(dependency.src_stage_mask),
                dst_stage_mask: vk::PipelineStageFlags::from_raw(dependency.dst_stage_mask),
                src_access_mask: vk::AccessFlags::from_raw(dependency.src_access_mask),
                dst_access_mask: vk::AccessFlags::from_raw(dependency.dst_access_mask),
                dependency_flags: vk::DependencyFlags::from_raw(dependency.dependency_flags),
            })
            .collect();

        let pass_info = vk::RenderPassCreateInfo::default()
            .flags(vk::RenderPassCreateFlags::from_raw(create.flags))
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        let render_pass = unsafe { context.device.create_render_pass(&pass_info, None) }
            .map_err(SnapError::Vulkan)?;
        self.handles
            .register(ObjectType::RenderPass, object.handle, render_pass.as_raw())
    }

    pub(crate) fn restore_framebuffer(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &FramebufferRestoreInfo,
    ) -> SnapResult<()> {
        let mut create = info.create_info.clone();
        self.handles.update_handles(&mut create)?;
        let context = self.device_for(restore)?;

        let attachments: Vec<vk::ImageView> = create
            .attachments
            .iter()
            .map(|view| vk::ImageView::from_raw(*view))
            .collect();
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .flags(vk::FramebufferCreateFlags::from_raw(create.flags))
            .render_pass(vk::RenderPass::from_raw(create.render_pass))
            .attachments(&attachments)
            .width(create.width)
            .height(create.height)
            .layers(create.layers);
        let framebuffer = unsafe { context.device.create_framebuffer(&framebuffer_info, None) }
            .map_err(SnapError::Vulkan)?;
        self.handles
            .register(ObjectType::Framebuffer, object.handle, framebuffer.as_raw())
    }

    // ── Pipelines ───────────────────────────────────────────

    pub(crate) fn restore_pipeline(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &PipelineRestoreInfo,
    ) -> SnapResult<()> {
        let mut create = info.create_info.clone();
        self.handles.update_handles(&mut create)?;
        let instance = self.instance_context_of(restore)?.instance.clone();
        let context = self.device_for(restore)?;

        // Only one creation variant is present per captured pipeline.
        let pipeline = match &create {
            PipelineCreateInfo::Compute(compute) => create_compute_pipeline(context, compute)?,
            PipelineCreateInfo::Graphics(graphics) => {
                create_graphics_pipeline(context, graphics)?
            }
            PipelineCreateInfo::RayTracingKhr(ray_tracing) => {
                create_ray_tracing_pipeline_khr(&instance, context, ray_tracing)?
            }
            PipelineCreateInfo::RayTracingNv(ray_tracing) => {
                create_ray_tracing_pipeline_nv(&instance, context, ray_tracing)?
            }
        };
        self.handles
            .register(ObjectType::Pipeline, object.handle, pipeline.as_raw())
    }

    fn instance_context_of(
        &self,
        restore: &RestoreInfo,
    ) -> SnapResult<&crate::applier::InstanceContext> {
        let context = self.device_for(restore)?;
        self.instances.get(&context.instance_restored).ok_or_else(|| {
            SnapError::MalformedInfo("device's instance context is missing".into())
        })
    }

    // ── Command pools / buffers ─────────────────────────────

    pub(crate) fn restore_command_pool(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &CommandPoolRestoreInfo,
    ) -> SnapResult<()> {
        let context = self.device_for(restore)?;
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::from_raw(info.create_info.flags))
            .queue_family_index(info.create_info.queue_family_index);
        let pool = unsafe { context.device.create_command_pool(&pool_info, None) }
            .map_err(SnapError::Vulkan)?;
        self.handles
            .register(ObjectType::CommandPool, object.handle, pool.as_raw())
    }

    pub(crate) fn restore_command_buffer(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &CommandBufferRestoreInfo,
    ) -> SnapResult<()> {
        let mut allocate = info.allocate_info;
        self.handles.update_handles(&mut allocate)?;
        let context = self.device_for(restore)?;

        // Captured batch allocations are replayed one buffer at a time.
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(vk::CommandPool::from_raw(allocate.command_pool))
            .level(vk::CommandBufferLevel::from_raw(allocate.level))
            .command_buffer_count(1);
        let buffers = unsafe { context.device.allocate_command_buffers(&allocate_info) }
            .map_err(SnapError::Vulkan)?;
        self.handles
            .register(ObjectType::CommandBuffer, object.handle, buffers[0].as_raw())?;
        self.enroll_for_state_phases(object);
        Ok(())
    }

    // ── Sync objects (status reconciled immediately) ────────

    pub(crate) fn restore_fence(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &FenceRestoreInfo,
    ) -> SnapResult<()> {
        let context = self.device_for(restore)?;
        let flags = vk::FenceCreateFlags::from_raw(info.create_info.flags);
        let fence_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { context.device.create_fence(&fence_info, None) }
            .map_err(SnapError::Vulkan)?;

        let created_signaled = flags.contains(vk::FenceCreateFlags::SIGNALED);
        match plan_fence_reconciliation(created_signaled, info.signaled) {
            FenceAction::None => {}
            FenceAction::SubmitEmpty => {
                Applier::submit_empty_with_fence(context, fence)?;
                unsafe {
                    context
                        .device
                        .wait_for_fences(&[fence], true, u64::MAX)
                        .map_err(SnapError::Vulkan)?;
                }
            }
            FenceAction::Reset => unsafe {
                context
                    .device
                    .reset_fences(&[fence])
                    .map_err(SnapError::Vulkan)?;
            },
        }
        self.handles
            .register(ObjectType::Fence, object.handle, fence.as_raw())
    }

    pub(crate) fn restore_semaphore(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &SemaphoreRestoreInfo,
    ) -> SnapResult<()> {
        let context = self.device_for(restore)?;

        let mut type_info: Option<vk::SemaphoreTypeCreateInfo> = None;
        let mut is_timeline = false;
        for entry in &info.create_info.pnext {
            if let PNextEntry::SemaphoreTypeCreateInfo {
                semaphore_type,
                initial_value,
            } = entry
            {
                is_timeline =
                    *semaphore_type == vk::SemaphoreType::TIMELINE.as_raw();
                type_info = Some(
                    vk::SemaphoreTypeCreateInfo::default()
                        .semaphore_type(vk::SemaphoreType::from_raw(*semaphore_type))
                        .initial_value(*initial_value),
                );
            }
        }

        let mut semaphore_info = vk::SemaphoreCreateInfo::default()
            .flags(vk::SemaphoreCreateFlags::from_raw(info.create_info.flags));
        if let Some(type_info) = type_info.as_mut() {
            semaphore_info = semaphore_info.push_next(type_info);
        }
        let semaphore = unsafe { context.device.create_semaphore(&semaphore_info, None) }
            .map_err(SnapError::Vulkan)?;

        // A binary semaphore cannot be set directly; captured-signaled
        // state is reproduced through a no-op submission.
        if crate::state::plan_semaphore_reconciliation(info.signaled) && !is_timeline {
            Applier::signal_semaphore(context, semaphore)?;
        }
        self.handles
            .register(ObjectType::Semaphore, object.handle, semaphore.as_raw())
    }

    pub(crate) fn restore_event(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &EventRestoreInfo,
    ) -> SnapResult<()> {
        let context = self.device_for(restore)?;
        let event_info = vk::EventCreateInfo::default()
            .flags(vk::EventCreateFlags::from_raw(info.create_info.flags));
        let event = unsafe { context.device.create_event(&event_info, None) }
            .map_err(SnapError::Vulkan)?;
        if crate::state::plan_event_reconciliation(info.signaled) {
            unsafe {
                context
                    .device
                    .set_event(event)
                    .map_err(SnapError::Vulkan)?;
            }
        }
        self.handles
            .register(ObjectType::Event, object.handle, event.as_raw())
    }

    pub(crate) fn restore_query_pool(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &QueryPoolRestoreInfo,
    ) -> SnapResult<()> {
        let context = self.device_for(restore)?;
        let pool_info = vk::QueryPoolCreateInfo::default()
            .flags(vk::QueryPoolCreateFlags::from_raw(info.create_info.flags))
            .query_type(vk::QueryType::from_raw(info.create_info.query_type))
            .query_count(info.create_info.query_count)
            .pipeline_statistics(vk::QueryPipelineStatisticFlags::from_raw(
                info.create_info.pipeline_statistics,
            ));
        let pool = unsafe { context.device.create_query_pool(&pool_info, None) }
            .map_err(SnapError::Vulkan)?;
        self.handles
            .register(ObjectType::QueryPool, object.handle, pool.as_raw())
    }

    // ── Presentation ────────────────────────────────────────

    pub(crate) fn restore_surface(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &SurfaceRestoreInfo,
    ) -> SnapResult<()> {
        let mut create = info.create_info;
        self.handles.update_handles(&mut create)?;
        let context = self.instance_for(restore)?;

        let surface = match create {
            SurfaceCreateInfo::Win32 {
                flags,
                mut hinstance,
                mut hwnd,
            } => {
                // Let the embedder retarget the surface at a newly created
                // window before re-creation.
                if let Some(callback) = &self.options.recreate_win32_surface {
                    callback(&mut hinstance, &mut hwnd);
                }
                let surface_info = vk::Win32SurfaceCreateInfoKHR::default()
                    .flags(vk::Win32SurfaceCreateFlagsKHR::from_raw(flags))
                    .hinstance(hinstance as isize)
                    .hwnd(hwnd as isize);
                unsafe {
                    context
                        .win32_surface_fns
                        .create_win32_surface(&surface_info, None)
                }
                .map_err(SnapError::Vulkan)?
            }
            SurfaceCreateInfo::Display {
                flags,
                display_mode,
                plane_index,
                plane_stack_index,
                transform,
                global_alpha,
                alpha_mode,
                image_extent,
            } => {
                let surface_info = vk::DisplaySurfaceCreateInfoKHR::default()
                    .flags(vk::DisplaySurfaceCreateFlagsKHR::from_raw(flags))
                    .display_mode(vk::DisplayModeKHR::from_raw(display_mode))
                    .plane_index(plane_index)
                    .plane_stack_index(plane_stack_index)
                    .transform(vk::SurfaceTransformFlagsKHR::from_raw(transform))
                    .global_alpha(global_alpha)
                    .alpha_mode(vk::DisplayPlaneAlphaFlagsKHR::from_raw(alpha_mode))
                    .image_extent(convert::extent_2d(&image_extent));
                unsafe {
                    context
                        .display_fns
                        .create_display_plane_surface(&surface_info, None)
                }
                .map_err(SnapError::Vulkan)?
            }
            SurfaceCreateInfo::Headless { flags } => {
                let surface_info = vk::HeadlessSurfaceCreateInfoEXT::default()
                    .flags(vk::HeadlessSurfaceCreateFlagsEXT::from_raw(flags));
                unsafe {
                    context
                        .headless_surface_fns
                        .create_headless_surface(&surface_info, None)
                }
                .map_err(SnapError::Vulkan)?
            }
        };
        self.handles
            .register(ObjectType::Surface, object.handle, surface.as_raw())
    }

    pub(crate) fn restore_swapchain(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &SwapchainRestoreInfo,
    ) -> SnapResult<()> {
        let mut create = info.create_info.clone();
        // The prior chain does not exist in the restored process.
        create.old_swapchain = 0;
        self.handles.update_handles(&mut create)?;

        let context = self.device_for(restore)?;
        let surface = vk::SurfaceKHR::from_raw(create.surface);

        // Diagnostic fetch only: surfaces can shrink between capture and
        // apply, and the capabilities log is the first place to look.
        if let Some(instance_context) = self.instances.get(&context.instance_restored) {
            match unsafe {
                instance_context
                    .surface_fns
                    .get_physical_device_surface_capabilities(context.physical_device, surface)
            } {
                Ok(capabilities) => debug!(
                    current_extent = ?capabilities.current_extent,
                    min_images = capabilities.min_image_count,
                    "surface capabilities before swapchain restore"
                ),
                Err(err) => warn!("surface capability query failed: {err:?}"),
            }
        }

        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .flags(vk::SwapchainCreateFlagsKHR::from_raw(create.flags))
            .surface(surface)
            .min_image_count(create.min_image_count)
            .image_format(vk::Format::from_raw(create.image_format))
            .image_color_space(vk::ColorSpaceKHR::from_raw(create.image_color_space))
            .image_extent(convert::extent_2d(&create.image_extent))
            .image_array_layers(create.image_array_layers)
            .image_usage(vk::ImageUsageFlags::from_raw(create.image_usage))
            .image_sharing_mode(vk::SharingMode::from_raw(create.image_sharing_mode))
            .queue_family_indices(&create.queue_family_indices)
            .pre_transform(vk::SurfaceTransformFlagsKHR::from_raw(create.pre_transform))
            .composite_alpha(vk::CompositeAlphaFlagsKHR::from_raw(create.composite_alpha))
            .present_mode(vk::PresentModeKHR::from_raw(create.present_mode))
            .clipped(create.clipped);

        let swapchain = unsafe {
            context
                .swapchain_fns
                .create_swapchain(&swapchain_info, None)
        }
        .map_err(SnapError::Vulkan)?;
        let images = unsafe { context.swapchain_fns.get_swapchain_images(swapchain) }
            .map_err(SnapError::Vulkan)?;

        if images.len() != info.images.len() {
            warn!(
                captured = info.images.len(),
                restored = images.len(),
                "swapchain image count changed between capture and apply"
            );
        }

        self.handles
            .register(ObjectType::Swapchain, object.handle, swapchain.as_raw())?;
        // Positional correspondence, assumed stable: captured image i maps
        // to vkGetSwapchainImagesKHR slot i.
        let pairs: Vec<(u64, u64)> = info
            .images
            .iter()
            .zip(images.iter())
            .map(|(captured, restored)| (captured.handle, restored.as_raw()))
            .collect();
        for (captured, restored) in pairs {
            self.handles
                .register(ObjectType::Image, captured, restored)?;
        }
        Ok(())
    }

    pub(crate) fn restore_display_mode(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &DisplayModeRestoreInfo,
    ) -> SnapResult<()> {
        let physical_device_dep = restore
            .dependency_of_type(ObjectType::PhysicalDevice)
            .ok_or_else(|| {
                SnapError::MalformedInfo("display mode without physical-device dependency".into())
            })?;
        let physical_device = vk::PhysicalDevice::from_raw(
            self.handles.get_restored(physical_device_dep.handle)?,
        );
        let context = self.instance_for(restore)?;

        // Displays are enumerated, not created; correspondence is
        // positional like physical devices and swapchain images.
        let displays = unsafe {
            context
                .display_fns
                .get_physical_device_display_properties(physical_device)
        }
        .map_err(SnapError::Vulkan)?;
        let display = displays
            .get(info.display_index as usize)
            .map(|properties| properties.display)
            .ok_or_else(|| {
                SnapError::InitializationFailed(format!(
                    "display index {} out of range ({} displays)",
                    info.display_index,
                    displays.len()
                ))
            })?;

        let mode_info = vk::DisplayModeCreateInfoKHR::default()
            .flags(vk::DisplayModeCreateFlagsKHR::from_raw(info.create_info.flags))
            .parameters(
                vk::DisplayModeParametersKHR::default()
                    .visible_region(convert::extent_2d(&info.create_info.visible_region))
                    .refresh_rate(info.create_info.refresh_rate),
            );
        let mode = unsafe {
            context
                .display_fns
                .create_display_mode(physical_device, display, &mode_info, None)
        }
        .map_err(SnapError::Vulkan)?;
        self.handles
            .register(ObjectType::DisplayMode, object.handle, mode.as_raw())
    }

    // ── Acceleration structures ─────────────────────────────

    pub(crate) fn restore_acceleration_structure(
        &mut self,
        object: &StateTrackedObject,
        restore: &RestoreInfo,
        info: &AccelerationStructureRestoreInfo,
    ) -> SnapResult<()> {
        let mut create = info.create_info;
        self.handles.update_handles(&mut create)?;
        let context = self.device_for(restore)?;

        let accel_info = vk::AccelerationStructureCreateInfoKHR::default()
            .create_flags(vk::AccelerationStructureCreateFlagsKHR::from_raw(
                create.create_flags,
            ))
            .buffer(vk::Buffer::from_raw(create.buffer))
            .offset(create.offset)
            .size(create.size)
            .ty(vk::AccelerationStructureTypeKHR::from_raw(
                create.structure_type,
            ));
        let accel = unsafe {
            context
                .accel_fns
                .create_acceleration_structure(&accel_info, None)
        }
        .map_err(SnapError::Vulkan)?;
        self.handles.register(
            ObjectType::AccelerationStructure,
            object.handle,
            accel.as_raw(),
        )?;
        self.enroll_for_state_phases(object);
        Ok(())
    }
}

// ── Pipeline creation helpers ───────────────────────────────

fn build_specialization(
    specialization: &Option<SerializedSpecializationInfo>,
) -> (Vec<vk::SpecializationMapEntry>, Vec<u8>) {
    match specialization {
        Some(info) => (
            info.map_entries
                .iter()
                .map(|(constant_id, offset, size)| vk::SpecializationMapEntry {
                    constant_id: *constant_id,
                    offset: *offset,
                    size: *size as usize,
                })
                .collect(),
            info.data.clone(),
        ),
        None => (Vec::new(), Vec::new()),
    }
}

fn create_compute_pipeline(
    context: &DeviceContext,
    create: &SerializedComputePipelineCreateInfo,
) -> SnapResult<vk::Pipeline> {
    let entry_point = cstring(&create.stage.entry_point)?;
    let (map_entries, spec_data) = build_specialization(&create.stage.specialization);
    let spec_info = vk::SpecializationInfo::default()
        .map_entries(&map_entries)
        .data(&spec_data);

    let mut stage = vk::PipelineShaderStageCreateInfo::default()
        .flags(vk::PipelineShaderStageCreateFlags::from_raw(create.stage.flags))
        .stage(vk::ShaderStageFlags::from_raw(create.stage.stage))
        .module(vk::ShaderModule::from_raw(create.stage.module))
        .name(entry_point.as_c_str());
    if create.stage.specialization.is_some() {
        stage = stage.specialization_info(&spec_info);
    }

    let pipeline_info = vk::ComputePipelineCreateInfo::default()
        .flags(vk::PipelineCreateFlags::from_raw(create.flags))
        .stage(stage)
        .layout(vk::PipelineLayout::from_raw(create.layout))
        .base_pipeline_handle(vk::Pipeline::from_raw(create.base_pipeline));

    let pipelines = unsafe {
        context.device.create_compute_pipelines(
            vk::PipelineCache::null(),
            &[pipeline_info],
            None,
        )
    }
    .map_err(|(_, err)| SnapError::Vulkan(err))?;
    Ok(pipelines[0])
}

fn create_graphics_pipeline(
    context: &DeviceContext,
    create: &SerializedGraphicsPipelineCreateInfo,
) -> SnapResult<vk::Pipeline> {
    let entry_points: Vec<CString> = create
        .stages
        .iter()
        .map(|stage| cstring(&stage.entry_point))
        .collect::<SnapResult<_>>()?;
    let specializations: Vec<(Vec<vk::SpecializationMapEntry>, Vec<u8>)> = create
        .stages
        .iter()
        .map(|stage| build_specialization(&stage.specialization))
        .collect();
    let spec_infos: Vec<vk::SpecializationInfo> = specializations
        .iter()
        .map(|(map_entries, data)| {
            vk::SpecializationInfo::default()
                .map_entries(map_entries)
                .data(data)
        })
        .collect();

    let stages: Vec<vk::PipelineShaderStageCreateInfo> = create
        .stages
        .iter()
        .enumerate()
        .map(|(index, stage)| {
            let mut out = vk::PipelineShaderStageCreateInfo::default()
                .flags(vk::PipelineShaderStageCreateFlags::from_raw(stage.flags))
                .stage(vk::ShaderStageFlags::from_raw(stage.stage))
                .module(vk::ShaderModule::from_raw(stage.module))
                .name(entry_points[index].as_c_str());
            if stage.specialization.is_some() {
                out = out.specialization_info(&spec_infos[index]);
            }
            out
        })
        .collect();

    let (vertex_bindings, vertex_attributes) = match &create.vertex_input {
        Some(input) => (
            input
                .bindings
                .iter()
                .map(|binding| vk::VertexInputBindingDescription {
                    binding: binding.binding,
                    stride: binding.stride,
                    input_rate: vk::VertexInputRate::from_raw(binding.input_rate),
                })
                .collect::<Vec<_>>(),
            input
                .attributes
                .iter()
                .map(|attribute| vk::VertexInputAttributeDescription {
                    location: attribute.location,
                    binding: attribute.binding,
                    format: vk::Format::from_raw(attribute.format),
                    offset: attribute.offset,
                })
                .collect::<Vec<_>>(),
        ),
        None => (Vec::new(), Vec::new()),
    };
    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&vertex_bindings)
        .vertex_attribute_descriptions(&vertex_attributes);

    let input_assembly_state = create.input_assembly.as_ref().map(|state| {
        vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::from_raw(state.topology))
            .primitive_restart_enable(state.primitive_restart_enable)
    });

    let tessellation_state = create.tessellation_patch_control_points.map(|points| {
        vk::PipelineTessellationStateCreateInfo::default().patch_control_points(points)
    });

    let (viewports, scissors) = match &create.viewport {
        Some(state) => (
            state.viewports.iter().map(convert::viewport).collect::<Vec<_>>(),
            state.scissors.iter().map(convert::rect_2d).collect::<Vec<_>>(),
        ),
        None => (Vec::new(), Vec::new()),
    };
    let viewport_state = create.viewport.as_ref().map(|_| {
        vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors)
    });

    let rasterization_state = create.rasterization.as_ref().map(|state| {
        vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(state.depth_clamp_enable)
            .rasterizer_discard_enable(state.rasterizer_discard_enable)
            .polygon_mode(vk::PolygonMode::from_raw(state.polygon_mode))
            .cull_mode(vk::CullModeFlags::from_raw(state.cull_mode))
            .front_face(vk::FrontFace::from_raw(state.front_face))
            .depth_bias_enable(state.depth_bias_enable)
            .depth_bias_constant_factor(state.depth_bias_constant_factor)
            .depth_bias_clamp(state.depth_bias_clamp)
            .depth_bias_slope_factor(state.depth_bias_slope_factor)
            .line_width(state.line_width)
    });

    let multisample_state = create.multisample.as_ref().map(|state| {
        let mut out = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::from_raw(state.rasterization_samples))
            .sample_shading_enable(state.sample_shading_enable)
            .min_sample_shading(state.min_sample_shading)
            .alpha_to_coverage_enable(state.alpha_to_coverage_enable)
            .alpha_to_one_enable(state.alpha_to_one_enable);
        if !state.sample_mask.is_empty() {
            out = out.sample_mask(&state.sample_mask);
        }
        out
    });

    let depth_stencil_state = create.depth_stencil.as_ref().map(|state| {
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(state.depth_test_enable)
            .depth_write_enable(state.depth_write_enable)
            .depth_compare_op(vk::CompareOp::from_raw(state.depth_compare_op))
            .depth_bounds_test_enable(state.depth_bounds_test_enable)
            .stencil_test_enable(state.stencil_test_enable)
            .front(convert::stencil_op_state(&state.front))
            .back(convert::stencil_op_state(&state.back))
            .min_depth_bounds(state.min_depth_bounds)
            .max_depth_bounds(state.max_depth_bounds)
    });

    let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = create
        .color_blend
        .as_ref()
        .map(|state| {
            state
                .attachments
                .iter()
                .map(|attachment| vk::PipelineColorBlendAttachmentState {
                    blend_enable: attachment.blend_enable.into(),
                    src_color_blend_factor: vk::BlendFactor::from_raw(
                        attachment.src_color_blend_factor,
                    ),
                    dst_color_blend_factor: vk::BlendFactor::from_raw(
                        attachment.dst_color_blend_factor,
                    ),
                    color_blend_op: vk::BlendOp::from_raw(attachment.color_blend_op),
                    src_alpha_blend_factor: vk::BlendFactor::from_raw(
                        attachment.src_alpha_blend_factor,
                    ),
                    dst_alpha_blend_factor: vk::BlendFactor::from_raw(
                        attachment.dst_alpha_blend_factor,
                    ),
                    alpha_blend_op: vk::BlendOp::from_raw(attachment.alpha_blend_op),
                    color_write_mask: vk::ColorComponentFlags::from_raw(
                        attachment.color_write_mask,
                    ),
                })
                .collect()
        })
        .unwrap_or_default();
    let color_blend_state = create.color_blend.as_ref().map(|state| {
        vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(state.logic_op_enable)
            .logic_op(vk::LogicOp::from_raw(state.logic_op))
            .attachments(&blend_attachments)
            .blend_constants(state.blend_constants)
    });

    let dynamic_states: Vec<vk::DynamicState> = create
        .dynamic_states
        .iter()
        .map(|state| vk::DynamicState::from_raw(*state))
        .collect();
    let dynamic_state = (!dynamic_states.is_empty())
        .then(|| vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states));

    let mut pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .flags(vk::PipelineCreateFlags::from_raw(create.flags))
        .stages(&stages)
        .vertex_input_state(&vertex_input_state)
        .layout(vk::PipelineLayout::from_raw(create.layout))
        .render_pass(vk::RenderPass::from_raw(create.render_pass))
        .subpass(create.subpass)
        .base_pipeline_handle(vk::Pipeline::from_raw(create.base_pipeline));
    if let Some(state) = &input_assembly_state {
        pipeline_info = pipeline_info.input_assembly_state(state);
    }
    if let Some(state) = &tessellation_state {
        pipeline_info = pipeline_info.tessellation_state(state);
    }
    if let Some(state) = &viewport_state {
        pipeline_info = pipeline_info.viewport_state(state);
    }
    if let Some(state) = &rasterization_state {
        pipeline_info = pipeline_info.rasterization_state(state);
    }
    if let Some(state) = &multisample_state {
        pipeline_info = pipeline_info.multisample_state(state);
    }
    if let Some(state) = &depth_stencil_state {
        pipeline_info = pipeline_info.depth_stencil_state(state);
    }
    if let Some(state) = &color_blend_state {
        pipeline_info = pipeline_info.color_blend_state(state);
    }
    if let Some(state) = &dynamic_state {
        pipeline_info = pipeline_info.dynamic_state(state);
    }

    let pipelines = unsafe {
        context.device.create_graphics_pipelines(
            vk::PipelineCache::null(),
            &[pipeline_info],
            None,
        )
    }
    .map_err(|(_, err)| SnapError::Vulkan(err))?;
    Ok(pipelines[0])
}

fn build_stage_list<'a>(
    stages: &[SerializedPipelineShaderStageCreateInfo],
    entry_points: &'a [CString],
) -> Vec<vk::PipelineShaderStageCreateInfo<'a>> {
    stages
        .iter()
        .enumerate()
        .map(|(index, stage)| {
            vk::PipelineShaderStageCreateInfo::default()
                .flags(vk::PipelineShaderStageCreateFlags::from_raw(stage.flags))
                .stage(vk::ShaderStageFlags::from_raw(stage.stage))
                .module(vk::ShaderModule::from_raw(stage.module))
                .name(entry_points[index].as_c_str())
        })
        .collect()
}

fn create_ray_tracing_pipeline_khr(
    instance: &ash::Instance,
    context: &DeviceContext,
    create: &SerializedRayTracingPipelineCreateInfo,
) -> SnapResult<vk::Pipeline> {
    let ray_tracing_fns =
        ash::khr::ray_tracing_pipeline::Device::new(instance, &context.device);

    let entry_points: Vec<CString> = create
        .stages
        .iter()
        .map(|stage| cstring(&stage.entry_point))
        .collect::<SnapResult<_>>()?;
    let stages = build_stage_list(&create.stages, &entry_points);

    let groups: Vec<vk::RayTracingShaderGroupCreateInfoKHR> = create
        .groups
        .iter()
        .map(|group| {
            vk::RayTracingShaderGroupCreateInfoKHR::default()
                .ty(vk::RayTracingShaderGroupTypeKHR::from_raw(group.group_type))
                .general_shader(group.general_shader)
                .closest_hit_shader(group.closest_hit_shader)
                .any_hit_shader(group.any_hit_shader)
                .intersection_shader(group.intersection_shader)
        })
        .collect();

    let pipeline_info = vk::RayTracingPipelineCreateInfoKHR::default()
        .flags(vk::PipelineCreateFlags::from_raw(create.flags))
        .stages(&stages)
        .groups(&groups)
        .max_pipeline_ray_recursion_depth(create.max_recursion_depth)
        .layout(vk::PipelineLayout::from_raw(create.layout))
        .base_pipeline_handle(vk::Pipeline::from_raw(create.base_pipeline));

    let pipelines = unsafe {
        ray_tracing_fns.create_ray_tracing_pipelines(
            vk::DeferredOperationKHR::null(),
            vk::PipelineCache::null(),
            &[pipeline_info],
            None,
        )
    }
    .map_err(|(_, err)| SnapError::Vulkan(err))?;
    Ok(pipelines[0])
}

fn create_ray_tracing_pipeline_nv(
    instance: &ash::Instance,
    context: &DeviceContext,
    create: &SerializedRayTracingPipelineCreateInfo,
) -> SnapResult<vk::Pipeline> {
    let ray_tracing_fns = ash::nv::ray_tracing::Device::new(instance, &context.device);

    let entry_points: Vec<CString> = create
        .stages
        .iter()
        .map(|stage| cstring(&stage.entry_point))
        .collect::<SnapResult<_>>()?;
    let stages = build_stage_list(&create.stages, &entry_points);

    let groups: Vec<vk::RayTracingShaderGroupCreateInfoNV> = create
        .groups
        .iter()
        .map(|group| {
            vk::RayTracingShaderGroupCreateInfoNV::default()
                .ty(vk::RayTracingShaderGroupTypeKHR::from_raw(group.group_type))
                .general_shader(group.general_shader)
                .closest_hit_shader(group.closest_hit_shader)
                .any_hit_shader(group.any_hit_shader)
                .intersection_shader(group.intersection_shader)
        })
        .collect();

    let pipeline_info = vk::RayTracingPipelineCreateInfoNV::default()
        .flags(vk::PipelineCreateFlags::from_raw(create.flags))
        .stages(&stages)
        .groups(&groups)
        .max_recursion_depth(create.max_recursion_depth)
        .layout(vk::PipelineLayout::from_raw(create.layout))
        .base_pipeline_handle(vk::Pipeline::from_raw(create.base_pipeline));

    let pipelines = unsafe {
        ray_tracing_fns.create_ray_tracing_pipelines(
            vk::PipelineCache::null(),
            &[pipeline_info],
            None,
        )
    }
    .map_err(|(_, err)| SnapError::Vulkan(err))?;
    Ok(pipelines[0])
}

// ── Descriptor updates ──────────────────────────────────────

/// Apply remapped descriptor writes to the device.
pub(crate) fn update_descriptor_sets(
    device: &ash::Device,
    writes: &[SerializedWriteDescriptorSet],
) {
    let buffer_infos: Vec<Vec<vk::DescriptorBufferInfo>> = writes
        .iter()
        .map(|write| {
            write
                .buffer_infos
                .iter()
                .map(|info| vk::DescriptorBufferInfo {
                    buffer: vk::Buffer::from_raw(info.buffer),
                    offset: info.offset,
                    range: info.range,
                })
                .collect()
        })
        .collect();
    let image_infos: Vec<Vec<vk::DescriptorImageInfo>> = writes
        .iter()
        .map(|write| {
            write
                .image_infos
                .iter()
                .map(|info| vk::DescriptorImageInfo {
                    sampler: vk::Sampler::from_raw(info.sampler),
                    image_view: vk::ImageView::from_raw(info.image_view),
                    image_layout: vk::ImageLayout::from_raw(info.image_layout),
                })
                .collect()
        })
        .collect();
    let texel_views: Vec<Vec<vk::BufferView>> = writes
        .iter()
        .map(|write| {
            write
                .texel_buffer_views
                .iter()
                .map(|view| vk::BufferView::from_raw(*view))
                .collect()
        })
        .collect();

    let vk_writes: Vec<vk::WriteDescriptorSet> = writes
        .iter()
        .enumerate()
        .map(|(index, write)| {
            let mut out = vk::WriteDescriptorSet::default()
                .dst_set(vk::DescriptorSet::from_raw(write.dst_set))
                .dst_binding(write.dst_binding)
                .dst_array_element(write.dst_array_element)
                .descriptor_type(vk::DescriptorType::from_raw(write.descriptor_type));
            if !buffer_infos[index].is_empty() {
                out = out.buffer_info(&buffer_infos[index]);
            }
            if !image_infos[index].is_empty() {
                out = out.image_info(&image_infos[index]);
            }
            if !texel_views[index].is_empty() {
                out = out.texel_buffer_view(&texel_views[index]);
            }
            out
        })
        .collect();

    unsafe { device.update_descriptor_sets(&vk_writes, &[]) };
}
