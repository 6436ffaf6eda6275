use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ash::vk;
use ash::vk::Handle;
use tracing::{debug, info, warn};

use vksnap_copy::{
    AccelerationStructureCopyInfo, BufferCopyInfo, CopyEngine, CopyEngineCreateInfo,
    DeviceMemoryCopyInfo, ImageCopyInfo, SubresourceState,
};
use vksnap_core::error::{SnapError, SnapResult};
use vksnap_core::{CreateFlags, RestorePointCreateInfo, StateTracker, TrackerSuspendGuard};
use vksnap_object::codec;
use vksnap_object::object::{ObjectType, StateTrackedObject};
use vksnap_object::restore_info::TypedRestoreInfo;
use vksnap_object::{RestoreInfo, RestorePointManifest};

/// Restore-point creator. One instance drives one capture over the live
/// object graph exposed by the state tracker.
pub struct Creator {
    entry: ash::Entry,
    options: RestorePointCreateInfo,
    instances: HashMap<u64, ash::Instance>,
    /// Copy engine per live device, keyed by the device's captured handle.
    copy_engines: HashMap<u64, CopyEngine>,
    manifest: RestorePointManifest,
}

impl Creator {
    pub fn new(entry: ash::Entry, options: RestorePointCreateInfo) -> Self {
        Self {
            entry,
            options,
            instances: HashMap::new(),
            copy_engines: HashMap::new(),
            manifest: RestorePointManifest::default(),
        }
    }

    /// Objects captured so far, in walk order. Complete only after
    /// [`create`](Self::create) returns.
    pub fn objects(&self) -> &[StateTrackedObject] {
        &self.manifest.objects
    }

    /// Walk the tracker's object graph and persist the restore point.
    ///
    /// The tracker is disabled for the duration of the walk so the capture
    /// does not perturb the state being captured. Data downloads run
    /// through the copy engine concurrently with manifest construction; all
    /// of them are drained before the manifest is written.
    pub fn create(&mut self, tracker: &dyn StateTracker) -> SnapResult<()> {
        fs::create_dir_all(&self.options.path)?;
        let _suspend = TrackerSuspendGuard::suspend(tracker);
        info!(path = %self.options.path.display(), "creating restore point");

        let mut walk_error: Option<SnapError> = None;
        tracker.visit_objects(&mut |restore_info| {
            if walk_error.is_some() {
                return;
            }
            if let Err(err) = self.process_object(restore_info) {
                walk_error = Some(err);
            }
        });
        if let Some(err) = walk_error {
            return Err(err);
        }

        // All data must be on disk before the manifest declares the
        // snapshot complete.
        for copy_engine in self.copy_engines.values() {
            copy_engine.wait()?;
        }

        self.manifest.write(
            &self.options.path,
            self.options.flags.contains(CreateFlags::OBJECT_JSON),
        )?;
        info!(objects = self.manifest.objects.len(), "restore point created");
        Ok(())
    }

    /// Persist one object: restore info always, data payloads per the
    /// artifact flags. Invoked exactly once per live object, dependencies
    /// before dependents.
    fn process_object(&mut self, restore_info: &RestoreInfo) -> SnapResult<()> {
        let object = restore_info.object;
        debug!(?object, "capturing object");
        self.manifest.objects.push(object);

        match &restore_info.info {
            TypedRestoreInfo::Instance(_) => self.track_instance(object.handle)?,
            TypedRestoreInfo::Device(_) => self.track_device(&object, restore_info)?,
            TypedRestoreInfo::DeviceMemory(memory) => {
                if self.options.flags.contains(CreateFlags::DEVICE_MEMORY_DATA) {
                    self.capture_device_memory(
                        &object,
                        restore_info,
                        memory.allocate_info.allocation_size,
                    )?;
                }
            }
            TypedRestoreInfo::Buffer(buffer) => {
                if self.options.flags.contains(CreateFlags::BUFFER_DATA)
                    && !buffer.bindings.is_empty()
                {
                    self.capture_buffer(&object, restore_info, buffer.create_info.size)?;
                }
            }
            TypedRestoreInfo::Image(image) => {
                if self.options.flags.contains(CreateFlags::IMAGE_DATA)
                    && image.swapchain.is_none()
                    && !image.bindings.is_empty()
                {
                    self.capture_image(&object, restore_info, image)?;
                }
            }
            TypedRestoreInfo::AccelerationStructure(accel) => {
                if self
                    .options
                    .flags
                    .contains(CreateFlags::ACCELERATION_STRUCTURE_DATA)
                    && accel.serialized_size > 0
                {
                    self.capture_acceleration_structure(
                        &object,
                        restore_info,
                        accel.serialized_size,
                    )?;
                }
            }
            _ => {}
        }

        codec::write_restore_info(
            &self.options.path,
            restore_info,
            self.options.flags.contains(CreateFlags::OBJECT_JSON),
        )?;
        Ok(())
    }

    // ── Live dispatch bookkeeping ───────────────────────────

    fn track_instance(&mut self, handle: u64) -> SnapResult<()> {
        let raw = vk::Instance::from_raw(handle);
        let instance = unsafe { ash::Instance::load(self.entry.static_fn(), raw) };
        self.instances.insert(handle, instance);
        Ok(())
    }

    fn track_device(
        &mut self,
        object: &StateTrackedObject,
        restore_info: &RestoreInfo,
    ) -> SnapResult<()> {
        let instance_dep = restore_info
            .dependency_of_type(ObjectType::Instance)
            .map(|dep| dep.handle)
            .unwrap_or(object.dispatchable);
        let instance = self
            .instances
            .get(&instance_dep)
            .ok_or_else(|| {
                SnapError::MalformedInfo(format!(
                    "device {:#x} visited before its instance",
                    object.handle
                ))
            })?
            .clone();

        let physical_device = restore_info
            .dependency_of_type(ObjectType::PhysicalDevice)
            .ok_or_else(|| {
                SnapError::MalformedInfo("device without physical-device dependency".into())
            })?;
        let physical_device = vk::PhysicalDevice::from_raw(physical_device.handle);

        let raw = vk::Device::from_raw(object.handle);
        let device = unsafe { ash::Device::load(instance.fp_v1_0(), raw) };
        let copy_engine = CopyEngine::create(CopyEngineCreateInfo {
            instance,
            physical_device,
            device: device.clone(),
            thread_count: self.options.thread_count,
            thread_init: self.options.thread_init.clone(),
        })?;
        self.copy_engines.insert(object.handle, copy_engine);
        Ok(())
    }

    fn copy_engine_of(&self, restore_info: &RestoreInfo) -> SnapResult<&CopyEngine> {
        let device = restore_info
            .dependency_of_type(ObjectType::Device)
            .map(|dep| dep.handle)
            .unwrap_or(restore_info.object.dispatchable);
        self.copy_engines.get(&device).ok_or_else(|| {
            SnapError::MalformedInfo(format!(
                "{:?} visited before its device",
                restore_info.object
            ))
        })
    }

    /// Either hand the payload to the interception callback or write the
    /// `.bin` file next to the object's info. Runs on a copy-engine worker.
    fn payload_sink(&self, object: StateTrackedObject) -> impl Fn(&[u8]) + Send + 'static {
        let callback = self.options.resource_data.clone();
        let path = codec::bin_path(&self.options.path, &object);
        move |data: &[u8]| {
            if let Some(callback) = &callback {
                if callback(&object, data) {
                    debug!(?object, "payload claimed by interception callback");
                    return;
                }
            }
            if let Some(parent) = path.parent() {
                if let Err(err) = fs::create_dir_all(parent) {
                    warn!(?object, "cannot create payload directory: {err}");
                    return;
                }
            }
            if let Err(err) = fs::write(&path, data) {
                warn!(?object, path = %path.display(), "payload write failed: {err}");
            }
        }
    }

    // ── Data capture ────────────────────────────────────────

    fn capture_device_memory(
        &mut self,
        object: &StateTrackedObject,
        restore_info: &RestoreInfo,
        size: u64,
    ) -> SnapResult<()> {
        if size == 0 {
            return Ok(());
        }
        let sink = self.payload_sink(*object);
        let copy_engine = self.copy_engine_of(restore_info)?;
        copy_engine.download_device_memory(
            DeviceMemoryCopyInfo {
                memory: vk::DeviceMemory::from_raw(object.handle),
                offset: 0,
                size,
            },
            Box::new(move |data| sink(data)),
        )
    }

    fn capture_buffer(
        &mut self,
        object: &StateTrackedObject,
        restore_info: &RestoreInfo,
        size: u64,
    ) -> SnapResult<()> {
        if size == 0 {
            return Ok(());
        }
        let sink = self.payload_sink(*object);
        let copy_engine = self.copy_engine_of(restore_info)?;
        copy_engine.download_buffer(
            BufferCopyInfo {
                buffer: vk::Buffer::from_raw(object.handle),
                offset: 0,
                size,
            },
            Box::new(move |data| sink(data)),
        )
    }

    fn capture_image(
        &mut self,
        object: &StateTrackedObject,
        restore_info: &RestoreInfo,
        image: &vksnap_object::restore_info::ImageRestoreInfo,
    ) -> SnapResult<()> {
        let create = &image.create_info;
        let layouts: Vec<SubresourceState> = image
            .subresource_layouts
            .iter()
            .map(|state| SubresourceState {
                aspect_mask: vk::ImageAspectFlags::from_raw(state.aspect_mask),
                mip_level: state.mip_level,
                array_layer: state.array_layer,
                layout: vk::ImageLayout::from_raw(state.layout),
            })
            .collect();
        if layouts.is_empty() {
            return Ok(());
        }

        let sink = self.payload_sink(*object);
        let png = self.png_dump(object, image);
        let copy_engine = self.copy_engine_of(restore_info)?;
        copy_engine.download_image(
            ImageCopyInfo {
                image: vk::Image::from_raw(object.handle),
                format: vk::Format::from_raw(create.format),
                extent: vk::Extent3D {
                    width: create.extent.width,
                    height: create.extent.height,
                    depth: create.extent.depth,
                },
                mip_levels: create.mip_levels,
                array_layers: create.array_layers,
                old_layouts: layouts.clone(),
                new_layouts: layouts,
            },
            Box::new(move |data| {
                sink(data);
                if let Some(png) = &png {
                    png(data);
                }
            }),
        )
    }

    /// PNG dump closure for tightly-packed 8-bit RGBA/BGRA images with a
    /// single defined subresource; anything else is skipped with a warning.
    fn png_dump(
        &self,
        object: &StateTrackedObject,
        image: &vksnap_object::restore_info::ImageRestoreInfo,
    ) -> Option<Box<dyn Fn(&[u8]) + Send>> {
        if !self.options.flags.contains(CreateFlags::IMAGE_PNG) {
            return None;
        }
        let create = &image.create_info;
        let format = vk::Format::from_raw(create.format);
        let bgra = matches!(format, vk::Format::B8G8R8A8_UNORM | vk::Format::B8G8R8A8_SRGB);
        let rgba = matches!(format, vk::Format::R8G8B8A8_UNORM | vk::Format::R8G8B8A8_SRGB);
        if !(rgba || bgra)
            || create.mip_levels != 1
            || create.array_layers != 1
            || create.extent.depth != 1
        {
            warn!(?object, ?format, "image not eligible for PNG dump");
            return None;
        }

        let width = create.extent.width;
        let height = create.extent.height;
        let path = codec::bin_path(&self.options.path, object).with_extension("png");
        Some(Box::new(move |data: &[u8]| {
            let expected = (width * height * 4) as usize;
            if data.len() < expected {
                warn!(path = %path.display(), "image payload shorter than expected, skipping PNG");
                return;
            }
            let mut pixels = data[..expected].to_vec();
            if bgra {
                for pixel in pixels.chunks_exact_mut(4) {
                    pixel.swap(0, 2);
                }
            }
            if let Err(err) =
                image::save_buffer(&path, &pixels, width, height, image::ExtendedColorType::Rgba8)
            {
                warn!(path = %path.display(), "PNG write failed: {err}");
            }
        }))
    }

    fn capture_acceleration_structure(
        &mut self,
        object: &StateTrackedObject,
        restore_info: &RestoreInfo,
        serialized_size: u64,
    ) -> SnapResult<()> {
        let sink = self.payload_sink(*object);
        let copy_engine = self.copy_engine_of(restore_info)?;
        copy_engine.download_acceleration_structure(
            AccelerationStructureCopyInfo {
                acceleration_structure: vk::AccelerationStructureKHR::from_raw(object.handle),
                size: serialized_size,
                host_visible: false,
            },
            Box::new(move |data| sink(data)),
        )
    }
}

/// Convenience path helper mirroring the on-disk layout.
pub fn restore_point_paths(root: &Path, object: &StateTrackedObject) -> (PathBuf, PathBuf) {
    (
        codec::info_path(root, object),
        codec::bin_path(root, object),
    )
}
