use ash::vk;

use crate::regions::SubresourceState;

/// Raw device-memory transfer. The allocation is reached through a
/// transient buffer bound to it for the duration of the copy, so the same
/// path serves host-visible and device-local memory (and never remaps
/// memory the application may already have mapped).
#[derive(Debug, Clone, Copy)]
pub struct DeviceMemoryCopyInfo {
    pub memory: vk::DeviceMemory,
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferCopyInfo {
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
}

/// Image transfer description. `old_layouts` and `new_layouts` are
/// independent per-subresource arrays (same order as
/// [`subresources`](Self::subresources)), allowing an upload that both
/// restores data and establishes a different final layout in one pass.
#[derive(Debug, Clone)]
pub struct ImageCopyInfo {
    pub image: vk::Image,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub old_layouts: Vec<SubresourceState>,
    pub new_layouts: Vec<SubresourceState>,
}

#[derive(Debug, Clone, Copy)]
pub struct AccelerationStructureCopyInfo {
    pub acceleration_structure: vk::AccelerationStructureKHR,
    /// Serialized size, from
    /// [`CopyEngine::get_acceleration_structure_serialization_size`](crate::CopyEngine::get_acceleration_structure_serialization_size).
    pub size: vk::DeviceSize,
    /// Whether the structure's backing memory is host-visible.
    pub host_visible: bool,
}
