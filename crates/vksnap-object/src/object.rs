use serde::{Deserialize, Serialize};

/// Object-type tag for every Vulkan object a restore point can carry.
/// Raw values follow VkObjectType so persisted snapshots stay stable across
/// builds of this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ObjectType {
    Unknown = 0,
    Instance = 1,
    PhysicalDevice = 2,
    Device = 3,
    Queue = 4,
    Semaphore = 5,
    CommandBuffer = 6,
    Fence = 7,
    DeviceMemory = 8,
    Buffer = 9,
    Image = 10,
    Event = 11,
    QueryPool = 12,
    BufferView = 13,
    ImageView = 14,
    ShaderModule = 15,
    PipelineCache = 16,
    PipelineLayout = 17,
    RenderPass = 18,
    Pipeline = 19,
    DescriptorSetLayout = 20,
    Sampler = 21,
    DescriptorPool = 22,
    DescriptorSet = 23,
    Framebuffer = 24,
    CommandPool = 25,
    Surface = 1000000000,
    Swapchain = 1000001000,
    Display = 1000002000,
    DisplayMode = 1000002001,
    AccelerationStructure = 1000150000,
    Shader = 1000482000,
}

impl ObjectType {
    /// Directory name used in the persisted restore-point tree.
    pub fn type_name(&self) -> &'static str {
        match self {
            ObjectType::Unknown => "VkUnknown",
            ObjectType::Instance => "VkInstance",
            ObjectType::PhysicalDevice => "VkPhysicalDevice",
            ObjectType::Device => "VkDevice",
            ObjectType::Queue => "VkQueue",
            ObjectType::Semaphore => "VkSemaphore",
            ObjectType::CommandBuffer => "VkCommandBuffer",
            ObjectType::Fence => "VkFence",
            ObjectType::DeviceMemory => "VkDeviceMemory",
            ObjectType::Buffer => "VkBuffer",
            ObjectType::Image => "VkImage",
            ObjectType::Event => "VkEvent",
            ObjectType::QueryPool => "VkQueryPool",
            ObjectType::BufferView => "VkBufferView",
            ObjectType::ImageView => "VkImageView",
            ObjectType::ShaderModule => "VkShaderModule",
            ObjectType::PipelineCache => "VkPipelineCache",
            ObjectType::PipelineLayout => "VkPipelineLayout",
            ObjectType::RenderPass => "VkRenderPass",
            ObjectType::Pipeline => "VkPipeline",
            ObjectType::DescriptorSetLayout => "VkDescriptorSetLayout",
            ObjectType::Sampler => "VkSampler",
            ObjectType::DescriptorPool => "VkDescriptorPool",
            ObjectType::DescriptorSet => "VkDescriptorSet",
            ObjectType::Framebuffer => "VkFramebuffer",
            ObjectType::CommandPool => "VkCommandPool",
            ObjectType::Surface => "VkSurfaceKHR",
            ObjectType::Swapchain => "VkSwapchainKHR",
            ObjectType::Display => "VkDisplayKHR",
            ObjectType::DisplayMode => "VkDisplayModeKHR",
            ObjectType::AccelerationStructure => "VkAccelerationStructureKHR",
            ObjectType::Shader => "VkShaderEXT",
        }
    }

    /// Whether handles of this type are dispatchable (addressed directly)
    /// rather than through an owning dispatchable handle.
    pub fn is_dispatchable(&self) -> bool {
        matches!(
            self,
            ObjectType::Instance
                | ObjectType::PhysicalDevice
                | ObjectType::Device
                | ObjectType::Queue
                | ObjectType::CommandBuffer
        )
    }
}

/// Identifies a Vulkan object at either capture or apply time.
///
/// `handle` is the object's own opaque value; `dispatchable` is the owning
/// instance/device/queue/command-buffer through which the object must be
/// addressed. Non-dispatchable handles have no intrinsic owner and are
/// disambiguated via the `dispatchable` field.
///
/// Ordering is lexicographic over `(object_type, handle, dispatchable)`,
/// which the derive provides from field order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct StateTrackedObject {
    pub object_type: ObjectType,
    pub handle: u64,
    pub dispatchable: u64,
}

impl StateTrackedObject {
    pub fn new(object_type: ObjectType, handle: u64, dispatchable: u64) -> Self {
        Self {
            object_type,
            handle,
            dispatchable,
        }
    }

    pub fn null() -> Self {
        Self {
            object_type: ObjectType::Unknown,
            handle: 0,
            dispatchable: 0,
        }
    }

    pub fn is_null(&self) -> bool {
        self.handle == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_lexicographic() {
        let a = StateTrackedObject::new(ObjectType::Buffer, 1, 7);
        let b = StateTrackedObject::new(ObjectType::Buffer, 2, 0);
        let c = StateTrackedObject::new(ObjectType::Image, 0, 0);
        assert!(a < b);
        assert!(b < c);

        let d = StateTrackedObject::new(ObjectType::Buffer, 1, 8);
        assert!(a < d);
    }

    #[test]
    fn type_names_match_directory_scheme() {
        assert_eq!(ObjectType::DeviceMemory.type_name(), "VkDeviceMemory");
        assert_eq!(ObjectType::Swapchain.type_name(), "VkSwapchainKHR");
        assert_eq!(
            ObjectType::AccelerationStructure.type_name(),
            "VkAccelerationStructureKHR"
        );
    }
}
