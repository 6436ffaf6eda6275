use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use tracing::{debug, info};

use vksnap_copy::{CopyEngine, DeviceMemoryCopyInfo, ImageCopyInfo, SubresourceState};
use vksnap_core::error::{SnapError, SnapResult};
use vksnap_core::{ApplyFlags, HandleMap, ObjectStatus, RestorePointApplyInfo, StateTracker};
use vksnap_object::codec;
use vksnap_object::object::{ObjectType, StateTrackedObject};
use vksnap_object::restore_info::TypedRestoreInfo;
use vksnap_object::{RestoreInfo, RestorePointManifest};

use crate::state::filter_descriptor_writes;

/// Per-restored-instance dispatch context.
pub(crate) struct InstanceContext {
    pub instance: ash::Instance,
    pub surface_fns: ash::khr::surface::Instance,
    pub win32_surface_fns: ash::khr::win32_surface::Instance,
    pub display_fns: ash::khr::display::Instance,
    pub headless_surface_fns: ash::ext::headless_surface::Instance,
    pub physical_devices: Vec<vk::PhysicalDevice>,
}

/// Per-restored-device dispatch context, including the scratch resources
/// used for fence/semaphore reconciliation submits (kept separate from the
/// copy engine so reconciliation cannot deadlock against in-flight copies).
pub(crate) struct DeviceContext {
    pub device: ash::Device,
    pub instance_restored: u64,
    pub physical_device: vk::PhysicalDevice,
    pub queue: vk::Queue,
    pub queue_family_index: u32,
    pub swapchain_fns: ash::khr::swapchain::Device,
    pub accel_fns: ash::khr::acceleration_structure::Device,
    pub scratch_pool: vk::CommandPool,
    pub scratch_cb: vk::CommandBuffer,
    pub scratch_fence: vk::Fence,
    pub copy_engine: CopyEngine,
}

/// Restore-point applier. One instance drives one apply pass over one
/// persisted capture.
pub struct Applier {
    pub(crate) entry: ash::Entry,
    pub(crate) options: RestorePointApplyInfo,
    pub(crate) tracker: Option<Arc<dyn StateTracker>>,
    pub(crate) handles: HandleMap,
    pub(crate) manifest: RestorePointManifest,
    restore_infos: BTreeMap<StateTrackedObject, RestoreInfo>,

    pub(crate) instances: HashMap<u64, InstanceContext>,
    pub(crate) devices: HashMap<u64, DeviceContext>,

    processed: BTreeSet<StateTrackedObject>,
    restored_state: BTreeSet<StateTrackedObject>,
    restored_data: BTreeSet<StateTrackedObject>,
    pub(crate) restored_buffers: Vec<StateTrackedObject>,
    pub(crate) restored_images: Vec<StateTrackedObject>,
    pub(crate) restored_device_memories: Vec<StateTrackedObject>,
    pub(crate) restored_descriptor_sets: Vec<StateTrackedObject>,
    pub(crate) restored_command_buffers: Vec<StateTrackedObject>,
    pub(crate) restored_accel_structures: Vec<StateTrackedObject>,
}

impl Applier {
    /// Read the manifest and prepare an apply pass. Fails when the manifest
    /// is absent or truncated (an aborted capture).
    pub fn new(
        entry: ash::Entry,
        options: RestorePointApplyInfo,
        tracker: Option<Arc<dyn StateTracker>>,
    ) -> SnapResult<Self> {
        let manifest = RestorePointManifest::read(&options.path).map_err(|err| {
            SnapError::InitializationFailed(format!(
                "cannot read manifest in {}: {err}",
                options.path.display()
            ))
        })?;
        info!(
            objects = manifest.objects.len(),
            path = %options.path.display(),
            "loaded restore point manifest"
        );

        let mut handles = HandleMap::new();
        if let Some(callback) = options.process_object.clone() {
            handles.set_process_object_callback(Box::new(move |ty, captured, restored| {
                callback(ty, captured, restored)
            }));
        }

        Ok(Self {
            entry,
            options,
            tracker,
            handles,
            manifest,
            restore_infos: BTreeMap::new(),
            instances: HashMap::new(),
            devices: HashMap::new(),
            processed: BTreeSet::new(),
            restored_state: BTreeSet::new(),
            restored_data: BTreeSet::new(),
            restored_buffers: Vec::new(),
            restored_images: Vec::new(),
            restored_device_memories: Vec::new(),
            restored_descriptor_sets: Vec::new(),
            restored_command_buffers: Vec::new(),
            restored_accel_structures: Vec::new(),
        })
    }

    pub fn handle_map(&self) -> &HandleMap {
        &self.handles
    }

    pub fn manifest(&self) -> &RestorePointManifest {
        &self.manifest
    }

    /// Find a manifest entry by type and captured handle.
    pub(crate) fn find_manifest_object(
        &self,
        object_type: ObjectType,
        handle: u64,
    ) -> Option<StateTrackedObject> {
        self.manifest
            .objects
            .iter()
            .copied()
            .find(|object| object.object_type == object_type && object.handle == handle)
    }

    /// Run the full apply pass: object creation in manifest order, then the
    /// state/data restoration phases, each fully drained before the next
    /// where data dependence requires it.
    pub fn apply(&mut self) -> SnapResult<()> {
        let objects = self.manifest.objects.clone();
        for object in &objects {
            self.restore_object(object)?;
        }

        self.restore_image_layouts()?;
        self.wait_copy_engines()?;

        self.restore_device_memory_data()?;
        // Data must be resident before later phases may reference it.
        self.wait_copy_engines()?;

        self.restore_acceleration_structure_data()?;
        self.wait_copy_engines()?;

        self.restore_memory_mappings()?;
        self.restore_descriptor_bindings()?;
        self.replay_command_buffers()?;

        self.wait_copy_engines()?;
        info!(restored = self.handles.len(), "restore point applied");
        Ok(())
    }

    // ── Phase 1: object creation ────────────────────────────

    fn restore_object(&mut self, object: &StateTrackedObject) -> SnapResult<()> {
        if self.processed.contains(object) {
            return Ok(());
        }
        if self.options.excluded_objects.contains(object) {
            debug!(?object, "object excluded from restoration");
            self.processed.insert(*object);
            return Ok(());
        }

        // Registered as a side effect of a parent's creation (physical
        // devices, queues, swapchain images).
        if self.handles.contains_captured(object.handle) {
            self.processed.insert(*object);
            return Ok(());
        }

        let info = self.load_restore_info(object)?;

        // Repeating mode: an object still live in this process keeps its
        // identity and only goes through the state/data phases.
        if !self.options.flags.contains(ApplyFlags::FORCE_OBJECT_CREATION) {
            if let Some(tracker) = self.tracker.clone() {
                if tracker.object_status(object) == ObjectStatus::Active {
                    self.restore_in_place(object, &info)?;
                    self.processed.insert(*object);
                    return Ok(());
                }
            }
        }

        // Dependencies must already be resolved: the manifest order
        // guarantees they were created earlier. A gap here means a
        // shuffled or truncated manifest.
        for dependency in &info.dependencies {
            if !dependency.is_null() && !self.handles.contains_captured(dependency.handle) {
                return Err(SnapError::MissingHandle(dependency.handle));
            }
        }

        self.create_object(object, &info)?;
        self.processed.insert(*object);
        Ok(())
    }

    fn create_object(
        &mut self,
        object: &StateTrackedObject,
        info: &RestoreInfo,
    ) -> SnapResult<()> {
        debug!(?object, "restoring object");
        match &info.info {
            TypedRestoreInfo::Instance(instance) => self.restore_instance(object, instance),
            TypedRestoreInfo::PhysicalDevice(_) => {
                // Reached only when the owning instance did not register
                // this device (enumeration mismatch).
                Err(SnapError::MalformedInfo(format!(
                    "physical device {:#x} was not registered by its instance",
                    object.handle
                )))
            }
            TypedRestoreInfo::Device(device) => self.restore_device(object, info, device),
            TypedRestoreInfo::Queue(_) => Err(SnapError::MalformedInfo(format!(
                "queue {:#x} was not registered by its device",
                object.handle
            ))),
            TypedRestoreInfo::DeviceMemory(memory) => {
                self.restore_device_memory(object, info, memory)
            }
            TypedRestoreInfo::Buffer(buffer) => self.restore_buffer(object, info, buffer),
            TypedRestoreInfo::BufferView(view) => self.restore_buffer_view(object, info, view),
            TypedRestoreInfo::Image(image) => self.restore_image(object, info, image),
            TypedRestoreInfo::ImageView(view) => self.restore_image_view(object, info, view),
            TypedRestoreInfo::Sampler(sampler) => self.restore_sampler(object, info, sampler),
            TypedRestoreInfo::ShaderModule(module) => {
                self.restore_shader_module(object, info, module)
            }
            TypedRestoreInfo::PipelineCache(cache) => {
                self.restore_pipeline_cache(object, info, cache)
            }
            TypedRestoreInfo::DescriptorSetLayout(layout) => {
                self.restore_descriptor_set_layout(object, info, layout)
            }
            TypedRestoreInfo::PipelineLayout(layout) => {
                self.restore_pipeline_layout(object, info, layout)
            }
            TypedRestoreInfo::DescriptorPool(pool) => {
                self.restore_descriptor_pool(object, info, pool)
            }
            TypedRestoreInfo::DescriptorSet(set) => self.restore_descriptor_set(object, info, set),
            TypedRestoreInfo::RenderPass(render_pass) => {
                self.restore_render_pass(object, info, render_pass)
            }
            TypedRestoreInfo::Framebuffer(framebuffer) => {
                self.restore_framebuffer(object, info, framebuffer)
            }
            TypedRestoreInfo::Pipeline(pipeline) => self.restore_pipeline(object, info, pipeline),
            TypedRestoreInfo::CommandPool(pool) => self.restore_command_pool(object, info, pool),
            TypedRestoreInfo::CommandBuffer(buffer) => {
                self.restore_command_buffer(object, info, buffer)
            }
            TypedRestoreInfo::Fence(fence) => self.restore_fence(object, info, fence),
            TypedRestoreInfo::Semaphore(semaphore) => {
                self.restore_semaphore(object, info, semaphore)
            }
            TypedRestoreInfo::Event(event) => self.restore_event(object, info, event),
            TypedRestoreInfo::QueryPool(pool) => self.restore_query_pool(object, info, pool),
            TypedRestoreInfo::Surface(surface) => self.restore_surface(object, info, surface),
            TypedRestoreInfo::Swapchain(swapchain) => {
                self.restore_swapchain(object, info, swapchain)
            }
            TypedRestoreInfo::DisplayMode(mode) => self.restore_display_mode(object, info, mode),
            TypedRestoreInfo::AccelerationStructure(accel) => {
                self.restore_acceleration_structure(object, info, accel)
            }
            TypedRestoreInfo::Shader(_) => Err(SnapError::Unsupported(
                "VK_EXT_shader_object restoration".into(),
            )),
        }
    }

    /// Repeating-mode path: the object is already live; map it onto itself
    /// and enroll it for the state/data phases only.
    fn restore_in_place(
        &mut self,
        object: &StateTrackedObject,
        info: &RestoreInfo,
    ) -> SnapResult<()> {
        debug!(?object, "object active, restoring in place");
        self.handles
            .register(object.object_type, object.handle, object.handle)?;

        match &info.info {
            TypedRestoreInfo::Instance(instance_info) => {
                let raw = vk::Instance::from_raw(object.handle);
                let instance =
                    unsafe { ash::Instance::load(self.entry.static_fn(), raw) };
                for device in &instance_info.physical_devices {
                    self.handles.register(
                        ObjectType::PhysicalDevice,
                        device.handle,
                        device.handle,
                    )?;
                }
                self.register_instance_context(object.handle, instance)?;
            }
            TypedRestoreInfo::Device(device_info) => {
                let instance_dep = info
                    .dependency_of_type(ObjectType::Instance)
                    .ok_or_else(|| {
                        SnapError::MalformedInfo("device without instance dependency".into())
                    })?;
                let instance_restored = self.handles.get_restored(instance_dep.handle)?;
                let context = self.instances.get(&instance_restored).ok_or_else(|| {
                    SnapError::MalformedInfo(format!(
                        "no instance context for live device {:#x}",
                        object.handle
                    ))
                })?;
                let raw = vk::Device::from_raw(object.handle);
                let device =
                    unsafe { ash::Device::load(context.instance.fp_v1_0(), raw) };
                for queue in &device_info.queues {
                    self.handles.register(
                        ObjectType::Queue,
                        queue.object.handle,
                        queue.object.handle,
                    )?;
                }
                let physical_device = info
                    .dependency_of_type(ObjectType::PhysicalDevice)
                    .ok_or_else(|| {
                        SnapError::MalformedInfo("device without physical device".into())
                    })?;
                let physical_device =
                    vk::PhysicalDevice::from_raw(self.handles.get_restored(physical_device.handle)?);
                let family = device_info
                    .queues
                    .first()
                    .map(|queue| queue.create_info.queue_family_index)
                    .unwrap_or(0);
                self.register_device_context(object.handle, device, physical_device, family)?;
            }
            TypedRestoreInfo::Swapchain(swapchain) => {
                for image in &swapchain.images {
                    self.handles
                        .register(ObjectType::Image, image.handle, image.handle)?;
                }
            }
            _ => {}
        }

        self.enroll_for_state_phases(object);
        Ok(())
    }

    pub(crate) fn enroll_for_state_phases(&mut self, object: &StateTrackedObject) {
        match object.object_type {
            ObjectType::Buffer => self.restored_buffers.push(*object),
            ObjectType::Image => self.restored_images.push(*object),
            ObjectType::DeviceMemory => self.restored_device_memories.push(*object),
            ObjectType::DescriptorSet => self.restored_descriptor_sets.push(*object),
            ObjectType::CommandBuffer => self.restored_command_buffers.push(*object),
            ObjectType::AccelerationStructure => self.restored_accel_structures.push(*object),
            _ => {}
        }
    }

    // ── Context bookkeeping ─────────────────────────────────

    pub(crate) fn register_instance_context(
        &mut self,
        restored: u64,
        instance: ash::Instance,
    ) -> SnapResult<()> {
        let physical_devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(SnapError::Vulkan)?;
        let context = InstanceContext {
            surface_fns: ash::khr::surface::Instance::new(&self.entry, &instance),
            win32_surface_fns: ash::khr::win32_surface::Instance::new(&self.entry, &instance),
            display_fns: ash::khr::display::Instance::new(&self.entry, &instance),
            headless_surface_fns: ash::ext::headless_surface::Instance::new(
                &self.entry,
                &instance,
            ),
            physical_devices,
            instance,
        };
        self.instances.insert(restored, context);
        Ok(())
    }

    pub(crate) fn register_device_context(
        &mut self,
        restored: u64,
        device: ash::Device,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> SnapResult<()> {
        let instance_restored = self
            .instances
            .iter()
            .find(|(_, context)| context.physical_devices.contains(&physical_device))
            .map(|(handle, _)| *handle)
            .ok_or_else(|| {
                SnapError::MalformedInfo("device's physical device belongs to no instance".into())
            })?;
        let instance = &self.instances[&instance_restored].instance;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let scratch_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .map_err(SnapError::Vulkan)?;
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(scratch_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let scratch_cb = unsafe { device.allocate_command_buffers(&alloc_info) }
            .map_err(SnapError::Vulkan)?[0];
        let scratch_fence = unsafe {
            device.create_fence(&vk::FenceCreateInfo::default(), None)
        }
        .map_err(SnapError::Vulkan)?;

        let copy_engine = CopyEngine::create(vksnap_copy::CopyEngineCreateInfo {
            instance: instance.clone(),
            physical_device,
            device: device.clone(),
            thread_count: self.options.thread_count,
            thread_init: self.options.thread_init.clone(),
        })?;

        let context = DeviceContext {
            queue: unsafe { device.get_device_queue(queue_family_index, 0) },
            queue_family_index,
            swapchain_fns: ash::khr::swapchain::Device::new(instance, &device),
            accel_fns: ash::khr::acceleration_structure::Device::new(instance, &device),
            scratch_pool,
            scratch_cb,
            scratch_fence,
            copy_engine,
            instance_restored,
            physical_device,
            device,
        };
        self.devices.insert(restored, context);
        Ok(())
    }

    pub(crate) fn load_restore_info(
        &mut self,
        object: &StateTrackedObject,
    ) -> SnapResult<RestoreInfo> {
        if let Some(info) = self.restore_infos.get(object) {
            return Ok(info.clone());
        }
        let info = codec::read_restore_info(&self.options.path, object).map_err(|err| {
            SnapError::InitializationFailed(format!(
                "cannot read restore info for {object:?}: {err}"
            ))
        })?;
        self.restore_infos.insert(*object, info.clone());
        Ok(info)
    }

    /// Device context for an object, resolved through its Device dependency.
    pub(crate) fn device_for(&self, info: &RestoreInfo) -> SnapResult<&DeviceContext> {
        let device = info
            .dependency_of_type(ObjectType::Device)
            .ok_or_else(|| {
                SnapError::MalformedInfo(format!(
                    "{:?} has no device dependency",
                    info.object
                ))
            })?;
        let restored = self.handles.get_restored(device.handle)?;
        self.devices.get(&restored).ok_or_else(|| {
            SnapError::MalformedInfo(format!("no context for restored device {restored:#x}"))
        })
    }

    pub(crate) fn instance_for(&self, info: &RestoreInfo) -> SnapResult<&InstanceContext> {
        let instance = info
            .dependency_of_type(ObjectType::Instance)
            .ok_or_else(|| {
                SnapError::MalformedInfo(format!(
                    "{:?} has no instance dependency",
                    info.object
                ))
            })?;
        let restored = self.handles.get_restored(instance.handle)?;
        self.instances.get(&restored).ok_or_else(|| {
            SnapError::MalformedInfo(format!("no context for restored instance {restored:#x}"))
        })
    }

    fn wait_copy_engines(&self) -> SnapResult<()> {
        for context in self.devices.values() {
            context.copy_engine.wait()?;
        }
        Ok(())
    }

    // ── Phase 2: image layouts ──────────────────────────────

    fn restore_image_layouts(&mut self) -> SnapResult<()> {
        for object in self.restored_images.clone() {
            if !self.restored_state.insert(object) {
                continue;
            }
            let info = self.load_restore_info(&object)?;
            let image_info = match &info.info {
                TypedRestoreInfo::Image(image) => image.clone(),
                _ => continue,
            };
            if image_info.subresource_layouts.is_empty() {
                continue;
            }

            let context = self.device_for(&info)?;
            let image = vk::Image::from_raw(self.handles.get_restored(object.handle)?);

            let new_layouts: Vec<SubresourceState> = image_info
                .subresource_layouts
                .iter()
                .map(|state| SubresourceState {
                    aspect_mask: vk::ImageAspectFlags::from_raw(state.aspect_mask),
                    mip_level: state.mip_level,
                    array_layer: state.array_layer,
                    layout: vk::ImageLayout::from_raw(state.layout),
                })
                .collect();
            let initial = vk::ImageLayout::from_raw(image_info.create_info.initial_layout);
            let old_layouts: Vec<SubresourceState> = new_layouts
                .iter()
                .map(|state| SubresourceState {
                    layout: initial,
                    ..*state
                })
                .collect();

            context.copy_engine.transition_image_layouts(ImageCopyInfo {
                image,
                format: vk::Format::from_raw(image_info.create_info.format),
                extent: vk::Extent3D {
                    width: image_info.create_info.extent.width,
                    height: image_info.create_info.extent.height,
                    depth: image_info.create_info.extent.depth,
                },
                mip_levels: image_info.create_info.mip_levels,
                array_layers: image_info.create_info.array_layers,
                old_layouts,
                new_layouts,
            })?;
        }
        Ok(())
    }

    // ── Phase 3: device-memory data ─────────────────────────

    fn restore_device_memory_data(&mut self) -> SnapResult<()> {
        for object in self.restored_device_memories.clone() {
            if !self.restored_data.insert(object) {
                continue;
            }
            let info = self.load_restore_info(&object)?;
            let memory_info = match &info.info {
                TypedRestoreInfo::DeviceMemory(memory) => memory.clone(),
                _ => continue,
            };

            let payload = match &self.options.resource_data {
                Some(callback) => callback(&object, memory_info.data_size),
                None => None,
            };
            let payload = match payload {
                Some(bytes) => bytes,
                None => {
                    let path = codec::bin_path(&self.options.path, &object);
                    if !path.exists() {
                        debug!(?object, "no device-memory payload captured");
                        continue;
                    }
                    std::fs::read(&path)?
                }
            };
            if payload.is_empty() {
                continue;
            }

            let context = self.device_for(&info)?;
            let memory =
                vk::DeviceMemory::from_raw(self.handles.get_restored(object.handle)?);
            let size = payload.len() as vk::DeviceSize;
            context.copy_engine.upload_device_memory(
                DeviceMemoryCopyInfo {
                    memory,
                    offset: 0,
                    size,
                },
                Box::new(move |staging| {
                    staging.copy_from_slice(&payload);
                }),
            )?;
        }
        Ok(())
    }

    // ── Phase 3b: acceleration-structure data ───────────────

    fn restore_acceleration_structure_data(&mut self) -> SnapResult<()> {
        for object in self.restored_accel_structures.clone() {
            if !self.restored_data.insert(object) {
                continue;
            }
            let info = self.load_restore_info(&object)?;
            let path = codec::bin_path(&self.options.path, &object);
            if !path.exists() {
                debug!(?object, "no serialized acceleration structure captured");
                continue;
            }
            let payload = std::fs::read(&path)?;
            if payload.is_empty() {
                continue;
            }

            let context = self.device_for(&info)?;
            let accel = vk::AccelerationStructureKHR::from_raw(
                self.handles.get_restored(object.handle)?,
            );
            let size = payload.len() as vk::DeviceSize;
            context.copy_engine.upload_acceleration_structure(
                vksnap_copy::AccelerationStructureCopyInfo {
                    acceleration_structure: accel,
                    size,
                    host_visible: false,
                },
                Box::new(move |staging| {
                    staging.copy_from_slice(&payload);
                }),
            )?;
        }
        Ok(())
    }

    // ── Phase 4: memory mappings ────────────────────────────

    fn restore_memory_mappings(&mut self) -> SnapResult<()> {
        for object in self.restored_device_memories.clone() {
            let info = self.load_restore_info(&object)?;
            let memory_info = match &info.info {
                TypedRestoreInfo::DeviceMemory(memory) => memory.clone(),
                _ => continue,
            };
            let Some(window) = memory_info.mapped else {
                continue;
            };
            let context = self.device_for(&info)?;
            let memory =
                vk::DeviceMemory::from_raw(self.handles.get_restored(object.handle)?);
            unsafe {
                context
                    .device
                    .map_memory(
                        memory,
                        window.offset,
                        window.size,
                        vk::MemoryMapFlags::from_raw(window.flags),
                    )
                    .map_err(SnapError::Vulkan)?;
            }
            debug!(
                ?object,
                offset = window.offset,
                size = window.size,
                "re-established memory mapping"
            );
        }
        Ok(())
    }

    // ── Phase 5: descriptor bindings ────────────────────────

    fn restore_descriptor_bindings(&mut self) -> SnapResult<()> {
        for object in self.restored_descriptor_sets.clone() {
            if !self.restored_state.insert(object) {
                continue;
            }
            let info = self.load_restore_info(&object)?;
            let set_info = match &info.info {
                TypedRestoreInfo::DescriptorSet(set) => set.clone(),
                _ => continue,
            };

            let mut writes =
                filter_descriptor_writes(&set_info.writes, object.handle, &self.handles);
            if writes.is_empty() {
                continue;
            }
            for write in writes.iter_mut() {
                self.handles.update_handles(write)?;
            }

            let context = self.device_for(&info)?;
            crate::objects::update_descriptor_sets(&context.device, &writes);
            debug!(?object, writes = writes.len(), "descriptor bindings restored");
        }
        Ok(())
    }

    // ── Phase 6: command-buffer replay ──────────────────────

    fn replay_command_buffers(&mut self) -> SnapResult<()> {
        for object in self.restored_command_buffers.clone() {
            if !self.restored_state.insert(object) {
                continue;
            }
            let info = self.load_restore_info(&object)?;
            let buffer_info = match &info.info {
                TypedRestoreInfo::CommandBuffer(buffer) => buffer.clone(),
                _ => continue,
            };
            if buffer_info.begin_info.is_none() && buffer_info.commands.is_empty() {
                continue;
            }
            crate::replay::replay_command_buffer(self, &object, &buffer_info)?;
        }
        Ok(())
    }

    // ── Sync reconciliation submits ─────────────────────────

    /// Submit an empty batch signaling `fence`.
    pub(crate) fn submit_empty_with_fence(
        context: &DeviceContext,
        fence: vk::Fence,
    ) -> SnapResult<()> {
        unsafe {
            context
                .device
                .queue_submit(context.queue, &[], fence)
                .map_err(SnapError::Vulkan)
        }
    }

    /// Signal a binary semaphore through a no-op submission: record the
    /// per-device scratch command buffer empty, submit it signaling the
    /// semaphore, wait on the scratch fence, then reset that fence.
    pub(crate) fn signal_semaphore(
        context: &DeviceContext,
        semaphore: vk::Semaphore,
    ) -> SnapResult<()> {
        unsafe {
            context
                .device
                .reset_command_buffer(context.scratch_cb, vk::CommandBufferResetFlags::empty())
                .map_err(SnapError::Vulkan)?;
            let begin = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            context
                .device
                .begin_command_buffer(context.scratch_cb, &begin)
                .map_err(SnapError::Vulkan)?;
            context
                .device
                .end_command_buffer(context.scratch_cb)
                .map_err(SnapError::Vulkan)?;

            let buffers = [context.scratch_cb];
            let semaphores = [semaphore];
            let submit = vk::SubmitInfo::default()
                .command_buffers(&buffers)
                .signal_semaphores(&semaphores);
            context
                .device
                .queue_submit(context.queue, &[submit], context.scratch_fence)
                .map_err(SnapError::Vulkan)?;
            context
                .device
                .wait_for_fences(&[context.scratch_fence], true, u64::MAX)
                .map_err(SnapError::Vulkan)?;
            context
                .device
                .reset_fences(&[context.scratch_fence])
                .map_err(SnapError::Vulkan)?;
        }
        Ok(())
    }
}

impl Drop for Applier {
    fn drop(&mut self) {
        for context in self.devices.values() {
            unsafe {
                let _ = context.device.device_wait_idle();
                context.device.destroy_fence(context.scratch_fence, None);
                context.device.destroy_command_pool(context.scratch_pool, None);
            }
        }
        // Restored objects themselves are handed to the embedding
        // application; the applier only owns its scratch resources.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_options(path: std::path::PathBuf) -> RestorePointApplyInfo {
        RestorePointApplyInfo {
            path,
            ..Default::default()
        }
    }

    #[test]
    fn missing_manifest_is_initialization_failure() {
        let dir = std::env::temp_dir().join(format!("vksnap-apply-nomanifest-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("scratch dir");
        let entry = match unsafe { ash::Entry::load() } {
            Ok(entry) => entry,
            Err(_) => {
                eprintln!("skipping: no Vulkan loader available");
                std::fs::remove_dir_all(dir).ok();
                return;
            }
        };
        let err = Applier::new(entry, apply_options(dir.clone()), None)
            .err()
            .expect("must fail");
        assert_eq!(
            err.as_vk_result(),
            vk::Result::ERROR_INITIALIZATION_FAILED
        );
        std::fs::remove_dir_all(dir).ok();
    }
}
