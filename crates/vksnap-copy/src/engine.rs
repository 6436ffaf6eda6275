use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use ash::vk;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use vksnap_core::error::{SnapError, SnapResult};
use vksnap_core::options::ThreadInitCallback;

use crate::copy_info::{
    AccelerationStructureCopyInfo, BufferCopyInfo, DeviceMemoryCopyInfo, ImageCopyInfo,
};
use crate::pool::WorkerPool;
use crate::regions::{plan_image_copies, plan_image_transitions, SubresourceState};
use crate::resources::{find_memory_type, TaskResources};

/// Receives a read-only view into mapped staging memory after a download.
pub type DataViewFn = Box<dyn FnOnce(&[u8]) + Send>;

/// Fills mapped staging memory with the bytes to upload.
pub type DataFillFn = Box<dyn FnOnce(&mut [u8]) + Send>;

type RecordFn<'a> = &'a mut dyn FnMut(vk::CommandBuffer) -> SnapResult<()>;

pub struct CopyEngineCreateInfo {
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    /// 0 = default-sized pool, 1 = run inline on the calling thread,
    /// N = exactly N workers.
    pub thread_count: u32,
    pub thread_init: Option<ThreadInitCallback>,
}

/// Asynchronous host/device transfer engine bound to one device and one
/// transfer-capable queue.
///
/// Every public entry point is safe to call from multiple threads; queue
/// submission is serialized by a dedicated mutex, and each calling thread
/// reuses its own staging/command-buffer/fence bundle, so transfers from
/// different threads run fully in parallel while transfers from one thread
/// serialize through that thread's fence.
///
/// Worker jobs share only the inner state; the pool lives in the engine
/// itself, so teardown always joins the workers from the owning thread.
pub struct CopyEngine {
    inner: Arc<EngineInner>,
    pool: Option<WorkerPool>,
}

struct EngineInner {
    device: ash::Device,
    accel_device: ash::khr::acceleration_structure::Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    queue: vk::Queue,
    queue_family_index: u32,
    queue_mutex: Mutex<()>,
    task_resources: Mutex<HashMap<ThreadId, TaskResources>>,
    accel_query_pools: Mutex<HashMap<ThreadId, vk::QueryPool>>,
    first_error: Mutex<Option<SnapError>>,
}

impl CopyEngine {
    /// Bind to a device and select its transfer queue: a family that is
    /// exclusively transfer if one exists, otherwise the first family
    /// supporting compute, graphics, or transfer.
    pub fn create(create_info: CopyEngineCreateInfo) -> SnapResult<Self> {
        let families = unsafe {
            create_info
                .instance
                .get_physical_device_queue_family_properties(create_info.physical_device)
        };

        let exclusive_transfer = families.iter().position(|family| {
            family.queue_flags.contains(vk::QueueFlags::TRANSFER)
                && !family
                    .queue_flags
                    .intersects(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
        });
        let any_capable = families.iter().position(|family| {
            family.queue_flags.intersects(
                vk::QueueFlags::COMPUTE | vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER,
            )
        });
        let queue_family_index = exclusive_transfer.or(any_capable).ok_or_else(|| {
            SnapError::InitializationFailed("no transfer-capable queue family".into())
        })? as u32;

        let queue = unsafe { create_info.device.get_device_queue(queue_family_index, 0) };
        let memory_properties = unsafe {
            create_info
                .instance
                .get_physical_device_memory_properties(create_info.physical_device)
        };
        let accel_device = ash::khr::acceleration_structure::Device::new(
            &create_info.instance,
            &create_info.device,
        );

        let pool = match create_info.thread_count {
            1 => None,
            0 => Some(WorkerPool::new(
                WorkerPool::default_size(),
                create_info.thread_init,
            )),
            n => Some(WorkerPool::new(n as usize, create_info.thread_init)),
        };
        info!(
            queue_family_index,
            inline = pool.is_none(),
            "copy engine created"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                device: create_info.device,
                accel_device,
                memory_properties,
                queue,
                queue_family_index,
                queue_mutex: Mutex::new(()),
                task_resources: Mutex::new(HashMap::new()),
                accel_query_pools: Mutex::new(HashMap::new()),
                first_error: Mutex::new(None),
            }),
            pool,
        })
    }

    fn dispatch(
        &self,
        job: impl FnOnce(&EngineInner) -> SnapResult<()> + Send + 'static,
    ) -> SnapResult<()> {
        match &self.pool {
            Some(pool) => {
                let inner = Arc::clone(&self.inner);
                pool.execute(Box::new(move || {
                    if let Err(err) = job(&inner) {
                        error!("transfer failed: {err}");
                        inner.record_error(err);
                    }
                }));
                Ok(())
            }
            None => job(&self.inner),
        }
    }

    /// Drain the worker pool, then block on device idle. The only
    /// synchronization point guaranteeing all previously queued transfers
    /// have completed; returns the first error any of them recorded.
    pub fn wait(&self) -> SnapResult<()> {
        if let Some(pool) = &self.pool {
            pool.wait();
        }
        unsafe { self.inner.device.device_wait_idle() }.map_err(SnapError::Vulkan)?;
        match self.inner.first_error.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ── Device memory ───────────────────────────────────────

    pub fn download_device_memory(
        &self,
        info: DeviceMemoryCopyInfo,
        on_data: DataViewFn,
    ) -> SnapResult<()> {
        self.dispatch(move |engine| engine.run_download_device_memory(info, on_data))
    }

    pub fn upload_device_memory(
        &self,
        info: DeviceMemoryCopyInfo,
        fill: DataFillFn,
    ) -> SnapResult<()> {
        self.dispatch(move |engine| engine.run_upload_device_memory(info, fill))
    }

    // ── Buffers ─────────────────────────────────────────────

    pub fn download_buffer(&self, info: BufferCopyInfo, on_data: DataViewFn) -> SnapResult<()> {
        self.dispatch(move |engine| engine.run_download_buffer(info, on_data))
    }

    pub fn upload_buffer(&self, info: BufferCopyInfo, fill: DataFillFn) -> SnapResult<()> {
        self.dispatch(move |engine| engine.run_upload_buffer(info, fill))
    }

    // ── Images ──────────────────────────────────────────────

    /// Download image contents. Only subresources whose current layout is
    /// not `UNDEFINED` are read: each is transitioned to
    /// `TRANSFER_SRC_OPTIMAL`, copied into staging, then transitioned back
    /// to its original layout.
    pub fn download_image(&self, info: ImageCopyInfo, on_data: DataViewFn) -> SnapResult<()> {
        self.dispatch(move |engine| engine.run_download_image(info, on_data))
    }

    /// Upload image contents and/or establish new layouts.
    ///
    /// With `fill`, subresources whose entry in `new_layouts` is defined are
    /// transitioned from their old layout to `TRANSFER_DST_OPTIMAL`, written
    /// from staging, then transitioned to their new layout. Without `fill`
    /// (or when no subresource carries data) the copy is skipped entirely
    /// and only the old→new layout barriers run.
    pub fn upload_image(&self, info: ImageCopyInfo, fill: Option<DataFillFn>) -> SnapResult<()> {
        self.dispatch(move |engine| engine.run_upload_image(info, fill))
    }

    /// Layout changes with no data movement.
    pub fn transition_image_layouts(&self, info: ImageCopyInfo) -> SnapResult<()> {
        self.dispatch(move |engine| engine.run_transition_image_layouts(info))
    }

    // ── Acceleration structures ─────────────────────────────

    /// Serialized size of an acceleration structure. Host-visible backing
    /// memory is queried directly; device-local backing requires a
    /// query-pool round trip through a command buffer.
    pub fn get_acceleration_structure_serialization_size(
        &self,
        acceleration_structure: vk::AccelerationStructureKHR,
        host_visible: bool,
    ) -> SnapResult<u64> {
        self.inner
            .serialization_size(acceleration_structure, host_visible)
    }

    /// Download the device-side serialization of an acceleration structure.
    ///
    /// The KHR serialize format requires an intermediate hop: the structure
    /// is first serialized into a device-local scratch buffer, then the
    /// scratch buffer is copied into host-visible staging, each phase
    /// fenced separately.
    pub fn download_acceleration_structure(
        &self,
        info: AccelerationStructureCopyInfo,
        on_data: DataViewFn,
    ) -> SnapResult<()> {
        self.dispatch(move |engine| engine.run_download_acceleration_structure(info, on_data))
    }

    /// Upload a previously captured serialization back into an
    /// acceleration structure (device-side deserialize), mirroring
    /// [`download_acceleration_structure`](Self::download_acceleration_structure).
    pub fn upload_acceleration_structure(
        &self,
        info: AccelerationStructureCopyInfo,
        fill: DataFillFn,
    ) -> SnapResult<()> {
        self.dispatch(move |engine| engine.run_upload_acceleration_structure(info, fill))
    }

    /// Record and submit a device-side acceleration-structure build through
    /// the engine's one-shot command-buffer machinery.
    pub fn build_acceleration_structure(
        &self,
        record: Box<
            dyn FnOnce(&ash::khr::acceleration_structure::Device, vk::CommandBuffer) + Send,
        >,
    ) -> SnapResult<()> {
        self.dispatch(move |engine| {
            engine.with_task_resources(0, |resources| {
                let mut record = Some(record);
                engine.submit_and_wait(resources, &mut |cb| {
                    if let Some(record) = record.take() {
                        record(&engine.accel_device, cb);
                    }
                    Ok(())
                })
            })
        })
    }
}

impl Drop for CopyEngine {
    fn drop(&mut self) {
        // Join workers first so no transfer is in flight while the inner
        // state goes away; queued jobs drain before the channel closes.
        if let Some(pool) = self.pool.take() {
            pool.wait();
            drop(pool);
        }
    }
}

impl EngineInner {
    fn record_error(&self, err: SnapError) {
        let mut slot = self.first_error.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn with_task_resources<R>(
        &self,
        min_capacity: vk::DeviceSize,
        f: impl FnOnce(&TaskResources) -> SnapResult<R>,
    ) -> SnapResult<R> {
        let resources = {
            let mut table = self.task_resources.lock();
            let entry = match table.entry(thread::current().id()) {
                std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(TaskResources::create(&self.device, self.queue_family_index)?)
                }
            };
            entry.ensure_capacity(&self.device, &self.memory_properties, min_capacity)?;
            *entry
        };
        f(&resources)
    }

    fn submit_and_wait(
        &self,
        resources: &TaskResources,
        record: RecordFn<'_>,
    ) -> SnapResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(
                    resources.command_buffer,
                    vk::CommandBufferResetFlags::empty(),
                )
                .map_err(SnapError::Vulkan)?;
            let begin = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device
                .begin_command_buffer(resources.command_buffer, &begin)
                .map_err(SnapError::Vulkan)?;
        }

        record(resources.command_buffer)?;

        unsafe {
            self.device
                .end_command_buffer(resources.command_buffer)
                .map_err(SnapError::Vulkan)?;
            {
                // Submissions from concurrent threads are mutually
                // exclusive, nothing more.
                let _queue = self.queue_mutex.lock();
                let buffers = [resources.command_buffer];
                let submit = vk::SubmitInfo::default().command_buffers(&buffers);
                self.device
                    .queue_submit(self.queue, &[submit], resources.fence)
                    .map_err(SnapError::Vulkan)?;
            }
            self.device
                .wait_for_fences(&[resources.fence], true, u64::MAX)
                .map_err(SnapError::Vulkan)?;
            self.device
                .reset_fences(&[resources.fence])
                .map_err(SnapError::Vulkan)?;
        }
        Ok(())
    }

    // ── Transient buffers ───────────────────────────────────

    /// Create a buffer bound to existing device memory, giving the transfer
    /// path an addressable window into a raw allocation.
    fn create_bound_buffer(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> SnapResult<vk::Buffer> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }
            .map_err(SnapError::Vulkan)?;
        if let Err(err) = unsafe { self.device.bind_buffer_memory(buffer, memory, offset) } {
            unsafe { self.device.destroy_buffer(buffer, None) };
            return Err(SnapError::Vulkan(err));
        }
        Ok(buffer)
    }

    /// Device-local scratch buffer with a device address, used as the
    /// intermediate hop of acceleration-structure serialization.
    fn create_scratch(
        &self,
        size: vk::DeviceSize,
    ) -> SnapResult<(vk::Buffer, vk::DeviceMemory, vk::DeviceAddress)> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(
                vk::BufferUsageFlags::TRANSFER_SRC
                    | vk::BufferUsageFlags::TRANSFER_DST
                    | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            )
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }
            .map_err(SnapError::Vulkan)?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let memory_type = find_memory_type(
            &self.memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .ok_or_else(|| {
            SnapError::InitializationFailed("no device-local memory type for scratch".into())
        })?;

        let mut flags_info = vk::MemoryAllocateFlagsInfo::default()
            .flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);
        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type)
            .push_next(&mut flags_info);
        let memory = match unsafe { self.device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(SnapError::Vulkan(err));
            }
        };
        if let Err(err) = unsafe { self.device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(memory, None);
            }
            return Err(SnapError::Vulkan(err));
        }

        let address = unsafe {
            self.device
                .get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(buffer))
        };
        Ok((buffer, memory, address))
    }

    fn destroy_scratch(&self, buffer: vk::Buffer, memory: vk::DeviceMemory) {
        unsafe {
            self.device.destroy_buffer(buffer, None);
            self.device.free_memory(memory, None);
        }
    }

    // ── Device memory ───────────────────────────────────────

    fn run_download_device_memory(
        &self,
        info: DeviceMemoryCopyInfo,
        on_data: DataViewFn,
    ) -> SnapResult<()> {
        self.with_task_resources(info.size, |resources| {
            let temp = self.create_bound_buffer(
                info.memory,
                info.offset,
                info.size,
                vk::BufferUsageFlags::TRANSFER_SRC,
            )?;
            let result = self.submit_and_wait(resources, &mut |cb| {
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size: info.size,
                };
                unsafe {
                    self.device
                        .cmd_copy_buffer(cb, temp, resources.staging_buffer, &[region]);
                }
                Ok(())
            });
            unsafe { self.device.destroy_buffer(temp, None) };
            result?;

            let view = unsafe {
                std::slice::from_raw_parts(resources.mapped as *const u8, info.size as usize)
            };
            on_data(view);
            Ok(())
        })
    }

    fn run_upload_device_memory(
        &self,
        info: DeviceMemoryCopyInfo,
        fill: DataFillFn,
    ) -> SnapResult<()> {
        self.with_task_resources(info.size, |resources| {
            let staging = unsafe {
                std::slice::from_raw_parts_mut(resources.mapped as *mut u8, info.size as usize)
            };
            fill(staging);

            let temp = self.create_bound_buffer(
                info.memory,
                info.offset,
                info.size,
                vk::BufferUsageFlags::TRANSFER_DST,
            )?;
            let result = self.submit_and_wait(resources, &mut |cb| {
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size: info.size,
                };
                unsafe {
                    self.device
                        .cmd_copy_buffer(cb, resources.staging_buffer, temp, &[region]);
                }
                Ok(())
            });
            unsafe { self.device.destroy_buffer(temp, None) };
            result
        })
    }

    // ── Buffers ─────────────────────────────────────────────

    fn run_download_buffer(&self, info: BufferCopyInfo, on_data: DataViewFn) -> SnapResult<()> {
        self.with_task_resources(info.size, |resources| {
            self.submit_and_wait(resources, &mut |cb| {
                let region = vk::BufferCopy {
                    src_offset: info.offset,
                    dst_offset: 0,
                    size: info.size,
                };
                unsafe {
                    self.device.cmd_copy_buffer(
                        cb,
                        info.buffer,
                        resources.staging_buffer,
                        &[region],
                    );
                }
                Ok(())
            })?;
            let view = unsafe {
                std::slice::from_raw_parts(resources.mapped as *const u8, info.size as usize)
            };
            on_data(view);
            Ok(())
        })
    }

    fn run_upload_buffer(&self, info: BufferCopyInfo, fill: DataFillFn) -> SnapResult<()> {
        self.with_task_resources(info.size, |resources| {
            let staging = unsafe {
                std::slice::from_raw_parts_mut(resources.mapped as *mut u8, info.size as usize)
            };
            fill(staging);
            self.submit_and_wait(resources, &mut |cb| {
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: info.offset,
                    size: info.size,
                };
                unsafe {
                    self.device.cmd_copy_buffer(
                        cb,
                        resources.staging_buffer,
                        info.buffer,
                        &[region],
                    );
                }
                Ok(())
            })
        })
    }

    // ── Images ──────────────────────────────────────────────

    fn run_download_image(&self, info: ImageCopyInfo, on_data: DataViewFn) -> SnapResult<()> {
        let plan = plan_image_copies(info.extent, info.format, &info.old_layouts)
            .ok_or_else(|| {
                SnapError::Unsupported(format!("image transfer for format {:?}", info.format))
            })?;
        if plan.regions.is_empty() {
            debug!("image has no defined subresources, nothing to download");
            on_data(&[]);
            return Ok(());
        }

        self.with_task_resources(plan.total_size, |resources| {
            self.submit_and_wait(resources, &mut |cb| {
                let transfer_src =
                    layouts_as(&info.old_layouts, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
                let to_transfer =
                    plan_image_transitions(info.image, &info.old_layouts, &transfer_src);
                let from_transfer =
                    plan_image_transitions(info.image, &transfer_src, &info.old_layouts);
                unsafe {
                    self.barrier(cb, &to_transfer);
                    self.device.cmd_copy_image_to_buffer(
                        cb,
                        info.image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        resources.staging_buffer,
                        &plan.regions,
                    );
                    self.barrier(cb, &from_transfer);
                }
                Ok(())
            })?;
            let view = unsafe {
                std::slice::from_raw_parts(
                    resources.mapped as *const u8,
                    plan.total_size as usize,
                )
            };
            on_data(view);
            Ok(())
        })
    }

    fn run_upload_image(&self, info: ImageCopyInfo, fill: Option<DataFillFn>) -> SnapResult<()> {
        let plan = match &fill {
            Some(_) => plan_image_copies(info.extent, info.format, &info.new_layouts)
                .ok_or_else(|| {
                    SnapError::Unsupported(format!(
                        "image transfer for format {:?}",
                        info.format
                    ))
                })?,
            None => Default::default(),
        };

        if plan.regions.is_empty() {
            // Layout-only restoration.
            return self.run_transition_image_layouts(info);
        }

        self.with_task_resources(plan.total_size, |resources| {
            if let Some(fill) = fill {
                let staging = unsafe {
                    std::slice::from_raw_parts_mut(
                        resources.mapped as *mut u8,
                        plan.total_size as usize,
                    )
                };
                fill(staging);
            }

            self.submit_and_wait(resources, &mut |cb| {
                let transfer_dst =
                    layouts_as(&info.new_layouts, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
                let to_transfer =
                    plan_image_transitions(info.image, &info.old_layouts, &transfer_dst);
                let to_final =
                    plan_image_transitions(info.image, &transfer_dst, &info.new_layouts);
                unsafe {
                    self.barrier(cb, &to_transfer);
                    self.device.cmd_copy_buffer_to_image(
                        cb,
                        resources.staging_buffer,
                        info.image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &plan.regions,
                    );
                    self.barrier(cb, &to_final);
                }
                Ok(())
            })
        })
    }

    fn run_transition_image_layouts(&self, info: ImageCopyInfo) -> SnapResult<()> {
        let barriers = plan_image_transitions(info.image, &info.old_layouts, &info.new_layouts);
        if barriers.is_empty() {
            return Ok(());
        }
        self.with_task_resources(0, |resources| {
            self.submit_and_wait(resources, &mut |cb| {
                unsafe { self.barrier(cb, &barriers) };
                Ok(())
            })
        })
    }

    unsafe fn barrier(&self, cb: vk::CommandBuffer, barriers: &[vk::ImageMemoryBarrier<'_>]) {
        if barriers.is_empty() {
            return;
        }
        unsafe {
            self.device.cmd_pipeline_barrier(
                cb,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                barriers,
            );
        }
    }

    // ── Acceleration structures ─────────────────────────────

    fn serialization_size(
        &self,
        acceleration_structure: vk::AccelerationStructureKHR,
        host_visible: bool,
    ) -> SnapResult<u64> {
        if host_visible {
            let mut size = [0u64];
            unsafe {
                self.accel_device
                    .write_acceleration_structures_properties(
                        &[acceleration_structure],
                        vk::QueryType::ACCELERATION_STRUCTURE_SERIALIZATION_SIZE_KHR,
                        bytemuck::cast_slice_mut(&mut size),
                        std::mem::size_of::<u64>(),
                    )
                    .map_err(SnapError::Vulkan)?;
            }
            return Ok(size[0]);
        }

        let query_pool = self.thread_query_pool()?;
        self.with_task_resources(0, |resources| {
            self.submit_and_wait(resources, &mut |cb| {
                unsafe {
                    self.device.cmd_reset_query_pool(cb, query_pool, 0, 1);
                    self.accel_device.cmd_write_acceleration_structures_properties(
                        cb,
                        &[acceleration_structure],
                        vk::QueryType::ACCELERATION_STRUCTURE_SERIALIZATION_SIZE_KHR,
                        query_pool,
                        0,
                    );
                }
                Ok(())
            })
        })?;

        let mut results = [0u64];
        unsafe {
            self.device
                .get_query_pool_results(
                    query_pool,
                    0,
                    &mut results,
                    vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
                )
                .map_err(SnapError::Vulkan)?;
        }
        Ok(results[0])
    }

    fn run_download_acceleration_structure(
        &self,
        info: AccelerationStructureCopyInfo,
        on_data: DataViewFn,
    ) -> SnapResult<()> {
        self.with_task_resources(info.size, |resources| {
            let (scratch, scratch_memory, scratch_address) = self.create_scratch(info.size)?;

            let serialize = self.submit_and_wait(resources, &mut |cb| {
                let copy = vk::CopyAccelerationStructureToMemoryInfoKHR::default()
                    .src(info.acceleration_structure)
                    .dst(vk::DeviceOrHostAddressKHR {
                        device_address: scratch_address,
                    })
                    .mode(vk::CopyAccelerationStructureModeKHR::SERIALIZE);
                unsafe {
                    self.accel_device
                        .cmd_copy_acceleration_structure_to_memory(cb, &copy);
                }
                Ok(())
            });
            let copy_out = serialize.and_then(|_| {
                self.submit_and_wait(resources, &mut |cb| {
                    let region = vk::BufferCopy {
                        src_offset: 0,
                        dst_offset: 0,
                        size: info.size,
                    };
                    unsafe {
                        self.device.cmd_copy_buffer(
                            cb,
                            scratch,
                            resources.staging_buffer,
                            &[region],
                        );
                    }
                    Ok(())
                })
            });
            self.destroy_scratch(scratch, scratch_memory);
            copy_out?;

            let view = unsafe {
                std::slice::from_raw_parts(resources.mapped as *const u8, info.size as usize)
            };
            on_data(view);
            Ok(())
        })
    }

    fn run_upload_acceleration_structure(
        &self,
        info: AccelerationStructureCopyInfo,
        fill: DataFillFn,
    ) -> SnapResult<()> {
        self.with_task_resources(info.size, |resources| {
            let staging = unsafe {
                std::slice::from_raw_parts_mut(resources.mapped as *mut u8, info.size as usize)
            };
            fill(staging);

            let (scratch, scratch_memory, scratch_address) = self.create_scratch(info.size)?;

            let copy_in = self.submit_and_wait(resources, &mut |cb| {
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size: info.size,
                };
                unsafe {
                    self.device.cmd_copy_buffer(
                        cb,
                        resources.staging_buffer,
                        scratch,
                        &[region],
                    );
                }
                Ok(())
            });
            let deserialize = copy_in.and_then(|_| {
                self.submit_and_wait(resources, &mut |cb| {
                    let copy = vk::CopyMemoryToAccelerationStructureInfoKHR::default()
                        .src(vk::DeviceOrHostAddressConstKHR {
                            device_address: scratch_address,
                        })
                        .dst(info.acceleration_structure)
                        .mode(vk::CopyAccelerationStructureModeKHR::DESERIALIZE);
                    unsafe {
                        self.accel_device
                            .cmd_copy_memory_to_acceleration_structure(cb, &copy);
                    }
                    Ok(())
                })
            });
            self.destroy_scratch(scratch, scratch_memory);
            deserialize
        })
    }

    fn thread_query_pool(&self) -> SnapResult<vk::QueryPool> {
        let mut pools = self.accel_query_pools.lock();
        if let Some(pool) = pools.get(&thread::current().id()) {
            return Ok(*pool);
        }
        let info = vk::QueryPoolCreateInfo::default()
            .query_type(vk::QueryType::ACCELERATION_STRUCTURE_SERIALIZATION_SIZE_KHR)
            .query_count(1);
        let pool = unsafe { self.device.create_query_pool(&info, None) }
            .map_err(SnapError::Vulkan)?;
        pools.insert(thread::current().id(), pool);
        Ok(pool)
    }
}

/// Copy of `states` with every defined entry's layout replaced, keeping
/// `UNDEFINED` entries undefined so they stay out of the barrier set.
fn layouts_as(states: &[SubresourceState], layout: vk::ImageLayout) -> Vec<SubresourceState> {
    states
        .iter()
        .map(|state| SubresourceState {
            layout: if state.layout == vk::ImageLayout::UNDEFINED {
                vk::ImageLayout::UNDEFINED
            } else {
                layout
            },
            ..*state
        })
        .collect()
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
        }
        for (_, mut resources) in self.task_resources.get_mut().drain() {
            resources.destroy(&self.device);
        }
        for (_, pool) in self.accel_query_pools.get_mut().drain() {
            unsafe { self.device.destroy_query_pool(pool, None) };
        }
    }
}
