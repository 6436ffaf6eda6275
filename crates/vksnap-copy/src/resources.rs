//! Per-thread transfer resources: a grow-only staging buffer, a one-shot
//! command buffer with its pool, and a fence. Each calling thread lazily
//! acquires its own bundle and reuses it across transfers; bundles are torn
//! down when the engine is dropped.

use std::os::raw::c_void;

use ash::vk;
use tracing::debug;

use vksnap_core::error::{SnapError, SnapResult};

/// Minimum staging allocation; growth rounds up to the next power of two.
const MIN_STAGING_SIZE: vk::DeviceSize = 64 * 1024;

#[derive(Clone, Copy)]
pub(crate) struct TaskResources {
    pub staging_buffer: vk::Buffer,
    pub staging_memory: vk::DeviceMemory,
    pub mapped: *mut c_void,
    pub capacity: vk::DeviceSize,
    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,
    pub fence: vk::Fence,
}

// The mapped pointer is only dereferenced by the owning thread while it
// holds the transfer; the table itself is mutex-protected.
unsafe impl Send for TaskResources {}

pub(crate) fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&index| {
        (type_bits & (1 << index)) != 0
            && memory_properties.memory_types[index as usize]
                .property_flags
                .contains(required)
    })
}

impl TaskResources {
    pub fn create(device: &ash::Device, queue_family_index: u32) -> SnapResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            );
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .map_err(SnapError::Vulkan)?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers[0],
            Err(err) => {
                unsafe { device.destroy_command_pool(command_pool, None) };
                return Err(SnapError::Vulkan(err));
            }
        };

        let fence = match unsafe {
            device.create_fence(&vk::FenceCreateInfo::default(), None)
        } {
            Ok(fence) => fence,
            Err(err) => {
                unsafe { device.destroy_command_pool(command_pool, None) };
                return Err(SnapError::Vulkan(err));
            }
        };

        Ok(Self {
            staging_buffer: vk::Buffer::null(),
            staging_memory: vk::DeviceMemory::null(),
            mapped: std::ptr::null_mut(),
            capacity: 0,
            command_pool,
            command_buffer,
            fence,
        })
    }

    /// Grow the staging buffer to at least `size` bytes. Never shrinks.
    pub fn ensure_capacity(
        &mut self,
        device: &ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
    ) -> SnapResult<()> {
        if size == 0 || size <= self.capacity {
            return Ok(());
        }
        let new_capacity = size.next_power_of_two().max(MIN_STAGING_SIZE);
        debug!(
            old = self.capacity,
            new = new_capacity,
            "growing staging buffer"
        );

        self.destroy_staging(device);

        let buffer_info = vk::BufferCreateInfo::default()
            .size(new_capacity)
            .usage(vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let staging_buffer =
            unsafe { device.create_buffer(&buffer_info, None) }.map_err(SnapError::Vulkan)?;

        let requirements = unsafe { device.get_buffer_memory_requirements(staging_buffer) };
        let memory_type = find_memory_type(
            memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .ok_or_else(|| {
            SnapError::InitializationFailed("no host-visible memory type for staging".into())
        })?;

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        let staging_memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { device.destroy_buffer(staging_buffer, None) };
                return Err(SnapError::Vulkan(err));
            }
        };

        let mapped = unsafe {
            if let Err(err) = device.bind_buffer_memory(staging_buffer, staging_memory, 0) {
                device.destroy_buffer(staging_buffer, None);
                device.free_memory(staging_memory, None);
                return Err(SnapError::Vulkan(err));
            }
            match device.map_memory(staging_memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
            {
                Ok(ptr) => ptr,
                Err(err) => {
                    device.destroy_buffer(staging_buffer, None);
                    device.free_memory(staging_memory, None);
                    return Err(SnapError::Vulkan(err));
                }
            }
        };

        self.staging_buffer = staging_buffer;
        self.staging_memory = staging_memory;
        self.mapped = mapped;
        self.capacity = new_capacity;
        Ok(())
    }

    fn destroy_staging(&mut self, device: &ash::Device) {
        if self.staging_buffer != vk::Buffer::null() {
            unsafe {
                device.unmap_memory(self.staging_memory);
                device.destroy_buffer(self.staging_buffer, None);
                device.free_memory(self.staging_memory, None);
            }
            self.staging_buffer = vk::Buffer::null();
            self.staging_memory = vk::DeviceMemory::null();
            self.mapped = std::ptr::null_mut();
            self.capacity = 0;
        }
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        self.destroy_staging(device);
        unsafe {
            device.destroy_fence(self.fence, None);
            device.destroy_command_pool(self.command_pool, None);
        }
    }
}
