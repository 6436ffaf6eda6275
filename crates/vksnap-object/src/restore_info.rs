//! Per-object restore info: creation parameters, dependencies, and the
//! dynamic state needed to rebuild the object during apply.

use serde::{Deserialize, Serialize};

use crate::commands::RecordedCommand;
use crate::create_info::*;
use crate::handles::VisitHandles;
use crate::object::{ObjectType, StateTrackedObject};

/// A memory binding: which device memory an object is bound to and at what
/// offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBinding {
    pub memory: StateTrackedObject,
    pub memory_offset: u64,
}

/// Host-mapping window of a device memory at capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedMemoryWindow {
    pub offset: u64,
    pub size: u64,
    pub flags: u32,
}

/// A captured descriptor write, replayed during binding restoration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedWriteDescriptorSet {
    pub dst_set: u64,
    pub dst_binding: u32,
    pub dst_array_element: u32,
    pub descriptor_type: i32,
    pub buffer_infos: Vec<SerializedDescriptorBufferInfo>,
    pub image_infos: Vec<SerializedDescriptorImageInfo>,
    pub texel_buffer_views: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedDescriptorBufferInfo {
    pub buffer: u64,
    pub offset: u64,
    pub range: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedDescriptorImageInfo {
    pub sampler: u64,
    pub image_view: u64,
    pub image_layout: i32,
}

impl VisitHandles for SerializedWriteDescriptorSet {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        visit(ObjectType::DescriptorSet, &mut self.dst_set);
        for info in self.buffer_infos.iter_mut() {
            visit(ObjectType::Buffer, &mut info.buffer);
        }
        for info in self.image_infos.iter_mut() {
            visit(ObjectType::Sampler, &mut info.sampler);
            visit(ObjectType::ImageView, &mut info.image_view);
        }
        for view in self.texel_buffer_views.iter_mut() {
            visit(ObjectType::BufferView, view);
        }
    }
}

// ============================================================================
// Per-type restore info
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRestoreInfo {
    pub create_info: SerializedInstanceCreateInfo,
    /// Captured physical devices in capture-time enumeration order.
    /// Correspondence at apply time is positional.
    pub physical_devices: Vec<StateTrackedObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalDeviceRestoreInfo {
    /// Index within the owning instance's capture-time enumeration.
    pub device_index: u32,
    // Diagnostic snapshot only; correspondence stays positional.
    pub device_name: String,
    pub vendor_id: u32,
    pub device_id: u32,
    pub api_version: u32,
}

/// One captured device queue together with the queue-create-info that
/// produced it. Queues are grouped by full create-info equality at apply
/// time, not by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedDeviceQueue {
    pub object: StateTrackedObject,
    pub create_info: SerializedDeviceQueueCreateInfo,
    pub queue_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRestoreInfo {
    pub create_info: SerializedDeviceCreateInfo,
    pub queues: Vec<CapturedDeviceQueue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRestoreInfo {
    pub queue_family_index: u32,
    pub queue_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMemoryRestoreInfo {
    pub allocate_info: SerializedMemoryAllocateInfo,
    pub mapped: Option<MappedMemoryWindow>,
    pub buffer_binds: Vec<MemoryBinding>,
    pub image_binds: Vec<MemoryBinding>,
    /// Size of the captured `.bin` payload; zero when data capture was
    /// disabled or the memory is device-local and was not downloaded.
    pub data_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferRestoreInfo {
    pub create_info: SerializedBufferCreateInfo,
    pub bindings: Vec<MemoryBinding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferViewRestoreInfo {
    pub create_info: SerializedBufferViewCreateInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRestoreInfo {
    pub create_info: SerializedImageCreateInfo,
    pub bindings: Vec<MemoryBinding>,
    /// Captured layout per subresource, one entry per (aspect, mip, layer).
    pub subresource_layouts: Vec<SerializedSubresourceLayout>,
    /// Present for swapchain-owned images; such images are not created,
    /// they are registered positionally when their swapchain is restored.
    pub swapchain: Option<StateTrackedObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageViewRestoreInfo {
    pub create_info: SerializedImageViewCreateInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerRestoreInfo {
    pub create_info: SerializedSamplerCreateInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderModuleRestoreInfo {
    pub create_info: SerializedShaderModuleCreateInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineCacheRestoreInfo {
    pub create_info: SerializedPipelineCacheCreateInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorSetLayoutRestoreInfo {
    pub create_info: SerializedDescriptorSetLayoutCreateInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineLayoutRestoreInfo {
    pub create_info: SerializedPipelineLayoutCreateInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorPoolRestoreInfo {
    pub create_info: SerializedDescriptorPoolCreateInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorSetRestoreInfo {
    pub allocate_info: SerializedDescriptorSetAllocateInfo,
    pub writes: Vec<SerializedWriteDescriptorSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPassRestoreInfo {
    pub create_info: SerializedRenderPassCreateInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramebufferRestoreInfo {
    pub create_info: SerializedFramebufferCreateInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRestoreInfo {
    pub create_info: PipelineCreateInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPoolRestoreInfo {
    pub create_info: SerializedCommandPoolCreateInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandBufferRestoreInfo {
    pub allocate_info: SerializedCommandBufferAllocateInfo,
    pub begin_info: Option<SerializedCommandBufferBeginInfo>,
    pub commands: Vec<RecordedCommand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FenceRestoreInfo {
    pub create_info: SerializedFenceCreateInfo,
    pub signaled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemaphoreRestoreInfo {
    pub create_info: SerializedSemaphoreCreateInfo,
    pub signaled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRestoreInfo {
    pub create_info: SerializedEventCreateInfo,
    pub signaled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPoolRestoreInfo {
    pub create_info: SerializedQueryPoolCreateInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceRestoreInfo {
    pub create_info: SurfaceCreateInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapchainRestoreInfo {
    pub create_info: SerializedSwapchainCreateInfo,
    /// Captured swapchain images in capture-time enumeration order.
    pub images: Vec<StateTrackedObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayModeRestoreInfo {
    pub create_info: SerializedDisplayModeCreateInfo,
    /// Index of the owning display within the physical device's
    /// capture-time display enumeration; correspondence is positional.
    pub display_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccelerationStructureRestoreInfo {
    pub create_info: SerializedAccelerationStructureCreateInfo,
    /// Size of the captured serialized payload, when captured.
    pub serialized_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderRestoreInfo {
    pub stage: u32,
    pub code: Vec<u8>,
}

/// Per-type restore payload: one variant per Vulkan object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedRestoreInfo {
    Instance(InstanceRestoreInfo),
    PhysicalDevice(PhysicalDeviceRestoreInfo),
    Device(DeviceRestoreInfo),
    Queue(QueueRestoreInfo),
    DeviceMemory(DeviceMemoryRestoreInfo),
    Buffer(BufferRestoreInfo),
    BufferView(BufferViewRestoreInfo),
    Image(ImageRestoreInfo),
    ImageView(ImageViewRestoreInfo),
    Sampler(SamplerRestoreInfo),
    ShaderModule(ShaderModuleRestoreInfo),
    PipelineCache(PipelineCacheRestoreInfo),
    DescriptorSetLayout(DescriptorSetLayoutRestoreInfo),
    PipelineLayout(PipelineLayoutRestoreInfo),
    DescriptorPool(DescriptorPoolRestoreInfo),
    DescriptorSet(DescriptorSetRestoreInfo),
    RenderPass(RenderPassRestoreInfo),
    Framebuffer(FramebufferRestoreInfo),
    Pipeline(PipelineRestoreInfo),
    CommandPool(CommandPoolRestoreInfo),
    CommandBuffer(CommandBufferRestoreInfo),
    Fence(FenceRestoreInfo),
    Semaphore(SemaphoreRestoreInfo),
    Event(EventRestoreInfo),
    QueryPool(QueryPoolRestoreInfo),
    Surface(SurfaceRestoreInfo),
    Swapchain(SwapchainRestoreInfo),
    DisplayMode(DisplayModeRestoreInfo),
    AccelerationStructure(AccelerationStructureRestoreInfo),
    Shader(ShaderRestoreInfo),
}

impl TypedRestoreInfo {
    pub fn object_type(&self) -> ObjectType {
        match self {
            TypedRestoreInfo::Instance(_) => ObjectType::Instance,
            TypedRestoreInfo::PhysicalDevice(_) => ObjectType::PhysicalDevice,
            TypedRestoreInfo::Device(_) => ObjectType::Device,
            TypedRestoreInfo::Queue(_) => ObjectType::Queue,
            TypedRestoreInfo::DeviceMemory(_) => ObjectType::DeviceMemory,
            TypedRestoreInfo::Buffer(_) => ObjectType::Buffer,
            TypedRestoreInfo::BufferView(_) => ObjectType::BufferView,
            TypedRestoreInfo::Image(_) => ObjectType::Image,
            TypedRestoreInfo::ImageView(_) => ObjectType::ImageView,
            TypedRestoreInfo::Sampler(_) => ObjectType::Sampler,
            TypedRestoreInfo::ShaderModule(_) => ObjectType::ShaderModule,
            TypedRestoreInfo::PipelineCache(_) => ObjectType::PipelineCache,
            TypedRestoreInfo::DescriptorSetLayout(_) => ObjectType::DescriptorSetLayout,
            TypedRestoreInfo::PipelineLayout(_) => ObjectType::PipelineLayout,
            TypedRestoreInfo::DescriptorPool(_) => ObjectType::DescriptorPool,
            TypedRestoreInfo::DescriptorSet(_) => ObjectType::DescriptorSet,
            TypedRestoreInfo::RenderPass(_) => ObjectType::RenderPass,
            TypedRestoreInfo::Framebuffer(_) => ObjectType::Framebuffer,
            TypedRestoreInfo::Pipeline(_) => ObjectType::Pipeline,
            TypedRestoreInfo::CommandPool(_) => ObjectType::CommandPool,
            TypedRestoreInfo::CommandBuffer(_) => ObjectType::CommandBuffer,
            TypedRestoreInfo::Fence(_) => ObjectType::Fence,
            TypedRestoreInfo::Semaphore(_) => ObjectType::Semaphore,
            TypedRestoreInfo::Event(_) => ObjectType::Event,
            TypedRestoreInfo::QueryPool(_) => ObjectType::QueryPool,
            TypedRestoreInfo::Surface(_) => ObjectType::Surface,
            TypedRestoreInfo::Swapchain(_) => ObjectType::Swapchain,
            TypedRestoreInfo::DisplayMode(_) => ObjectType::DisplayMode,
            TypedRestoreInfo::AccelerationStructure(_) => ObjectType::AccelerationStructure,
            TypedRestoreInfo::Shader(_) => ObjectType::Shader,
        }
    }
}

/// Everything persisted for one captured object: its identity, the objects
/// it required at creation, and the typed restore payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreInfo {
    pub object: StateTrackedObject,
    pub dependencies: Vec<StateTrackedObject>,
    pub info: TypedRestoreInfo,
}

impl RestoreInfo {
    /// Find the first dependency of the given type, if any.
    pub fn dependency_of_type(&self, ty: ObjectType) -> Option<StateTrackedObject> {
        self.dependencies.iter().copied().find(|d| d.object_type == ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_write_visits_every_reference() {
        let mut write = SerializedWriteDescriptorSet {
            dst_set: 1,
            dst_binding: 0,
            dst_array_element: 0,
            descriptor_type: 6,
            buffer_infos: vec![SerializedDescriptorBufferInfo {
                buffer: 2,
                offset: 0,
                range: 64,
            }],
            image_infos: vec![SerializedDescriptorImageInfo {
                sampler: 3,
                image_view: 4,
                image_layout: 5,
            }],
            texel_buffer_views: vec![9],
        };
        let mut seen = Vec::new();
        write.visit_handles(&mut |ty, h| seen.push((ty, *h)));
        assert_eq!(
            seen,
            vec![
                (ObjectType::DescriptorSet, 1),
                (ObjectType::Buffer, 2),
                (ObjectType::Sampler, 3),
                (ObjectType::ImageView, 4),
                (ObjectType::BufferView, 9),
            ]
        );
    }

    #[test]
    fn dependency_lookup_by_type() {
        let info = RestoreInfo {
            object: StateTrackedObject::new(ObjectType::Buffer, 1, 100),
            dependencies: vec![
                StateTrackedObject::new(ObjectType::Device, 100, 100),
                StateTrackedObject::new(ObjectType::DeviceMemory, 50, 100),
            ],
            info: TypedRestoreInfo::Buffer(BufferRestoreInfo {
                create_info: SerializedBufferCreateInfo {
                    flags: 0,
                    size: 256,
                    usage: 0x20,
                    sharing_mode: 0,
                    queue_family_indices: vec![],
                    pnext: vec![],
                },
                bindings: vec![],
            }),
        };

        assert_eq!(
            info.dependency_of_type(ObjectType::Device)
                .map(|d| d.handle),
            Some(100)
        );
        assert!(info.dependency_of_type(ObjectType::Image).is_none());
    }
}
