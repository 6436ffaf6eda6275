//! Serialized mirrors of Vulkan creation parameters.
//!
//! Flags and enums are stored as their raw `u32`/`i32` values, handles as
//! raw 64-bit captured values, and pNext chains as an ordered list of tagged
//! variants. Deserialized values are rebuilt into live `ash` structures by
//! the applier after handle remapping.

use serde::{Deserialize, Serialize};

use crate::handles::VisitHandles;
use crate::object::ObjectType;

// ============================================================================
// Shared geometry / layout primitives
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedExtent2D {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedExtent3D {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedOffset2D {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedOffset3D {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedRect2D {
    pub offset: SerializedOffset2D,
    pub extent: SerializedExtent2D,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SerializedViewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedImageSubresourceRange {
    pub aspect_mask: u32,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedImageSubresourceLayers {
    pub aspect_mask: u32,
    pub mip_level: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

/// One subresource of an image together with its captured layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedSubresourceLayout {
    pub aspect_mask: u32,
    pub mip_level: u32,
    pub array_layer: u32,
    /// Raw VkImageLayout value.
    pub layout: i32,
}

// ============================================================================
// pNext chains as tagged variants
// ============================================================================

/// A recognized pNext extension structure, stored as an owned value.
///
/// The chain is an ordered list; unrecognized extension structures are not
/// representable and are dropped at capture time with a warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PNextEntry {
    MemoryAllocateFlagsInfo {
        flags: u32,
        device_mask: u32,
    },
    MemoryDedicatedAllocateInfo {
        image: u64,
        buffer: u64,
    },
    BufferOpaqueCaptureAddressCreateInfo {
        opaque_capture_address: u64,
    },
    ImageFormatListCreateInfo {
        view_formats: Vec<i32>,
    },
    SemaphoreTypeCreateInfo {
        semaphore_type: i32,
        initial_value: u64,
    },
}

impl VisitHandles for PNextEntry {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        match self {
            PNextEntry::MemoryDedicatedAllocateInfo { image, buffer } => {
                visit(ObjectType::Image, image);
                visit(ObjectType::Buffer, buffer);
            }
            PNextEntry::MemoryAllocateFlagsInfo { .. }
            | PNextEntry::BufferOpaqueCaptureAddressCreateInfo { .. }
            | PNextEntry::ImageFormatListCreateInfo { .. }
            | PNextEntry::SemaphoreTypeCreateInfo { .. } => {}
        }
    }
}

// ============================================================================
// Instance / Device
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedApplicationInfo {
    pub application_name: Option<String>,
    pub application_version: u32,
    pub engine_name: Option<String>,
    pub engine_version: u32,
    pub api_version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedInstanceCreateInfo {
    pub flags: u32,
    pub application_info: Option<SerializedApplicationInfo>,
    pub enabled_layers: Vec<String>,
    pub enabled_extensions: Vec<String>,
    pub pnext: Vec<PNextEntry>,
}

impl VisitHandles for SerializedInstanceCreateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        self.pnext.visit_handles(visit);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedDeviceQueueCreateInfo {
    pub flags: u32,
    pub queue_family_index: u32,
    pub queue_priorities: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedDeviceCreateInfo {
    pub flags: u32,
    pub queue_create_infos: Vec<SerializedDeviceQueueCreateInfo>,
    pub enabled_extensions: Vec<String>,
    /// Raw bytes of VkPhysicalDeviceFeatures, if enabled features were given.
    pub enabled_features_raw: Option<Vec<u8>>,
    pub pnext: Vec<PNextEntry>,
}

impl VisitHandles for SerializedDeviceCreateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        self.pnext.visit_handles(visit);
    }
}

// ============================================================================
// Memory / Buffer / Image
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedMemoryAllocateInfo {
    pub allocation_size: u64,
    pub memory_type_index: u32,
    pub pnext: Vec<PNextEntry>,
}

impl VisitHandles for SerializedMemoryAllocateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        self.pnext.visit_handles(visit);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedBufferCreateInfo {
    pub flags: u32,
    pub size: u64,
    pub usage: u32,
    pub sharing_mode: i32,
    pub queue_family_indices: Vec<u32>,
    pub pnext: Vec<PNextEntry>,
}

impl VisitHandles for SerializedBufferCreateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        self.pnext.visit_handles(visit);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedBufferViewCreateInfo {
    pub flags: u32,
    pub buffer: u64,
    pub format: i32,
    pub offset: u64,
    pub range: u64,
}

impl VisitHandles for SerializedBufferViewCreateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        visit(ObjectType::Buffer, &mut self.buffer);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedImageCreateInfo {
    pub flags: u32,
    pub image_type: i32,
    pub format: i32,
    pub extent: SerializedExtent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: u32,
    pub tiling: i32,
    pub usage: u32,
    pub sharing_mode: i32,
    pub queue_family_indices: Vec<u32>,
    pub initial_layout: i32,
    pub pnext: Vec<PNextEntry>,
}

impl VisitHandles for SerializedImageCreateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        self.pnext.visit_handles(visit);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedImageViewCreateInfo {
    pub flags: u32,
    pub image: u64,
    pub view_type: i32,
    pub format: i32,
    /// VkComponentSwizzle r/g/b/a raw values.
    pub components: [i32; 4],
    pub subresource_range: SerializedImageSubresourceRange,
    pub pnext: Vec<PNextEntry>,
}

impl VisitHandles for SerializedImageViewCreateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        visit(ObjectType::Image, &mut self.image);
        self.pnext.visit_handles(visit);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedSamplerCreateInfo {
    pub flags: u32,
    pub mag_filter: i32,
    pub min_filter: i32,
    pub mipmap_mode: i32,
    pub address_mode_u: i32,
    pub address_mode_v: i32,
    pub address_mode_w: i32,
    pub mip_lod_bias: f32,
    pub anisotropy_enable: bool,
    pub max_anisotropy: f32,
    pub compare_enable: bool,
    pub compare_op: i32,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border_color: i32,
    pub unnormalized_coordinates: bool,
}

// ============================================================================
// Shaders / pipeline layout plumbing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedShaderModuleCreateInfo {
    pub flags: u32,
    pub code: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedPipelineCacheCreateInfo {
    pub flags: u32,
    pub initial_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedDescriptorSetLayoutBinding {
    pub binding: u32,
    pub descriptor_type: i32,
    pub descriptor_count: u32,
    pub stage_flags: u32,
    pub immutable_samplers: Vec<u64>,
}

impl VisitHandles for SerializedDescriptorSetLayoutBinding {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        for sampler in self.immutable_samplers.iter_mut() {
            visit(ObjectType::Sampler, sampler);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedDescriptorSetLayoutCreateInfo {
    pub flags: u32,
    pub bindings: Vec<SerializedDescriptorSetLayoutBinding>,
}

impl VisitHandles for SerializedDescriptorSetLayoutCreateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        self.bindings.visit_handles(visit);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedPushConstantRange {
    pub stage_flags: u32,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedPipelineLayoutCreateInfo {
    pub flags: u32,
    pub set_layouts: Vec<u64>,
    pub push_constant_ranges: Vec<SerializedPushConstantRange>,
}

impl VisitHandles for SerializedPipelineLayoutCreateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        for layout in self.set_layouts.iter_mut() {
            visit(ObjectType::DescriptorSetLayout, layout);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedDescriptorPoolSize {
    pub descriptor_type: i32,
    pub descriptor_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedDescriptorPoolCreateInfo {
    pub flags: u32,
    pub max_sets: u32,
    pub pool_sizes: Vec<SerializedDescriptorPoolSize>,
}

/// Allocation parameters for a single descriptor set. Captured batch
/// allocations are replayed one set at a time, so there is exactly one
/// layout per allocate info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedDescriptorSetAllocateInfo {
    pub descriptor_pool: u64,
    pub set_layout: u64,
}

impl VisitHandles for SerializedDescriptorSetAllocateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        visit(ObjectType::DescriptorPool, &mut self.descriptor_pool);
        visit(ObjectType::DescriptorSetLayout, &mut self.set_layout);
    }
}

// ============================================================================
// Render pass / framebuffer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedAttachmentDescription {
    pub flags: u32,
    pub format: i32,
    pub samples: u32,
    pub load_op: i32,
    pub store_op: i32,
    pub stencil_load_op: i32,
    pub stencil_store_op: i32,
    pub initial_layout: i32,
    pub final_layout: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedAttachmentReference {
    pub attachment: u32,
    pub layout: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedSubpassDescription {
    pub flags: u32,
    pub pipeline_bind_point: i32,
    pub input_attachments: Vec<SerializedAttachmentReference>,
    pub color_attachments: Vec<SerializedAttachmentReference>,
    pub resolve_attachments: Vec<SerializedAttachmentReference>,
    pub depth_stencil_attachment: Option<SerializedAttachmentReference>,
    pub preserve_attachments: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedSubpassDependency {
    pub src_subpass: u32,
    pub dst_subpass: u32,
    pub src_stage_mask: u32,
    pub dst_stage_mask: u32,
    pub src_access_mask: u32,
    pub dst_access_mask: u32,
    pub dependency_flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedRenderPassCreateInfo {
    pub flags: u32,
    pub attachments: Vec<SerializedAttachmentDescription>,
    pub subpasses: Vec<SerializedSubpassDescription>,
    pub dependencies: Vec<SerializedSubpassDependency>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedFramebufferCreateInfo {
    pub flags: u32,
    pub render_pass: u64,
    pub attachments: Vec<u64>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

impl VisitHandles for SerializedFramebufferCreateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        visit(ObjectType::RenderPass, &mut self.render_pass);
        for attachment in self.attachments.iter_mut() {
            visit(ObjectType::ImageView, attachment);
        }
    }
}

// ============================================================================
// Pipelines
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedSpecializationInfo {
    /// (constant_id, offset, size) triples.
    pub map_entries: Vec<(u32, u32, u32)>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedPipelineShaderStageCreateInfo {
    pub flags: u32,
    pub stage: u32,
    pub module: u64,
    pub entry_point: String,
    pub specialization: Option<SerializedSpecializationInfo>,
}

impl VisitHandles for SerializedPipelineShaderStageCreateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        visit(ObjectType::ShaderModule, &mut self.module);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedComputePipelineCreateInfo {
    pub flags: u32,
    pub stage: SerializedPipelineShaderStageCreateInfo,
    pub layout: u64,
    pub base_pipeline: u64,
}

impl VisitHandles for SerializedComputePipelineCreateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        self.stage.visit_handles(visit);
        visit(ObjectType::PipelineLayout, &mut self.layout);
        visit(ObjectType::Pipeline, &mut self.base_pipeline);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedVertexInputBindingDescription {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedVertexInputAttributeDescription {
    pub location: u32,
    pub binding: u32,
    pub format: i32,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedPipelineVertexInputState {
    pub bindings: Vec<SerializedVertexInputBindingDescription>,
    pub attributes: Vec<SerializedVertexInputAttributeDescription>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedPipelineInputAssemblyState {
    pub topology: i32,
    pub primitive_restart_enable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedPipelineViewportState {
    pub viewports: Vec<SerializedViewport>,
    pub scissors: Vec<SerializedRect2D>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SerializedPipelineRasterizationState {
    pub depth_clamp_enable: bool,
    pub rasterizer_discard_enable: bool,
    pub polygon_mode: i32,
    pub cull_mode: u32,
    pub front_face: i32,
    pub depth_bias_enable: bool,
    pub depth_bias_constant_factor: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope_factor: f32,
    pub line_width: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedPipelineMultisampleState {
    pub rasterization_samples: u32,
    pub sample_shading_enable: bool,
    pub min_sample_shading: f32,
    pub sample_mask: Vec<u32>,
    pub alpha_to_coverage_enable: bool,
    pub alpha_to_one_enable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedStencilOpState {
    pub fail_op: i32,
    pub pass_op: i32,
    pub depth_fail_op: i32,
    pub compare_op: i32,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SerializedPipelineDepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: i32,
    pub depth_bounds_test_enable: bool,
    pub stencil_test_enable: bool,
    pub front: SerializedStencilOpState,
    pub back: SerializedStencilOpState,
    pub min_depth_bounds: f32,
    pub max_depth_bounds: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedPipelineColorBlendAttachmentState {
    pub blend_enable: bool,
    pub src_color_blend_factor: i32,
    pub dst_color_blend_factor: i32,
    pub color_blend_op: i32,
    pub src_alpha_blend_factor: i32,
    pub dst_alpha_blend_factor: i32,
    pub alpha_blend_op: i32,
    pub color_write_mask: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedPipelineColorBlendState {
    pub logic_op_enable: bool,
    pub logic_op: i32,
    pub attachments: Vec<SerializedPipelineColorBlendAttachmentState>,
    pub blend_constants: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedGraphicsPipelineCreateInfo {
    pub flags: u32,
    pub stages: Vec<SerializedPipelineShaderStageCreateInfo>,
    pub vertex_input: Option<SerializedPipelineVertexInputState>,
    pub input_assembly: Option<SerializedPipelineInputAssemblyState>,
    pub tessellation_patch_control_points: Option<u32>,
    pub viewport: Option<SerializedPipelineViewportState>,
    pub rasterization: Option<SerializedPipelineRasterizationState>,
    pub multisample: Option<SerializedPipelineMultisampleState>,
    pub depth_stencil: Option<SerializedPipelineDepthStencilState>,
    pub color_blend: Option<SerializedPipelineColorBlendState>,
    pub dynamic_states: Vec<i32>,
    pub layout: u64,
    pub render_pass: u64,
    pub subpass: u32,
    pub base_pipeline: u64,
}

impl VisitHandles for SerializedGraphicsPipelineCreateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        self.stages.visit_handles(visit);
        visit(ObjectType::PipelineLayout, &mut self.layout);
        visit(ObjectType::RenderPass, &mut self.render_pass);
        visit(ObjectType::Pipeline, &mut self.base_pipeline);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedRayTracingShaderGroup {
    pub group_type: i32,
    pub general_shader: u32,
    pub closest_hit_shader: u32,
    pub any_hit_shader: u32,
    pub intersection_shader: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedRayTracingPipelineCreateInfo {
    pub flags: u32,
    pub stages: Vec<SerializedPipelineShaderStageCreateInfo>,
    pub groups: Vec<SerializedRayTracingShaderGroup>,
    pub max_recursion_depth: u32,
    pub layout: u64,
    pub base_pipeline: u64,
}

impl VisitHandles for SerializedRayTracingPipelineCreateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        self.stages.visit_handles(visit);
        visit(ObjectType::PipelineLayout, &mut self.layout);
        visit(ObjectType::Pipeline, &mut self.base_pipeline);
    }
}

/// Pointer-tagged union in the captured representation: exactly one creation
/// variant is present per pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineCreateInfo {
    Compute(SerializedComputePipelineCreateInfo),
    Graphics(SerializedGraphicsPipelineCreateInfo),
    RayTracingKhr(SerializedRayTracingPipelineCreateInfo),
    RayTracingNv(SerializedRayTracingPipelineCreateInfo),
}

impl VisitHandles for PipelineCreateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        match self {
            PipelineCreateInfo::Compute(info) => info.visit_handles(visit),
            PipelineCreateInfo::Graphics(info) => info.visit_handles(visit),
            PipelineCreateInfo::RayTracingKhr(info) | PipelineCreateInfo::RayTracingNv(info) => {
                info.visit_handles(visit)
            }
        }
    }
}

// ============================================================================
// Pools / command buffers / sync / queries
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedCommandPoolCreateInfo {
    pub flags: u32,
    pub queue_family_index: u32,
}

/// Allocation parameters for a single command buffer. Captured batch
/// allocations are replayed one buffer at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedCommandBufferAllocateInfo {
    pub command_pool: u64,
    pub level: i32,
}

impl VisitHandles for SerializedCommandBufferAllocateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        visit(ObjectType::CommandPool, &mut self.command_pool);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedCommandBufferInheritanceInfo {
    pub render_pass: u64,
    pub subpass: u32,
    pub framebuffer: u64,
    pub occlusion_query_enable: bool,
    pub query_flags: u32,
    pub pipeline_statistics: u32,
}

impl VisitHandles for SerializedCommandBufferInheritanceInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        visit(ObjectType::RenderPass, &mut self.render_pass);
        visit(ObjectType::Framebuffer, &mut self.framebuffer);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedCommandBufferBeginInfo {
    pub flags: u32,
    pub inheritance: Option<SerializedCommandBufferInheritanceInfo>,
}

impl VisitHandles for SerializedCommandBufferBeginInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        self.inheritance.visit_handles(visit);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedFenceCreateInfo {
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedSemaphoreCreateInfo {
    pub flags: u32,
    pub pnext: Vec<PNextEntry>,
}

impl VisitHandles for SerializedSemaphoreCreateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        self.pnext.visit_handles(visit);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedEventCreateInfo {
    pub flags: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedQueryPoolCreateInfo {
    pub flags: u32,
    pub query_type: i32,
    pub query_count: u32,
    pub pipeline_statistics: u32,
}

// ============================================================================
// Presentation (surface / swapchain / display)
// ============================================================================

/// One creation variant per supported surface platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SurfaceCreateInfo {
    Win32 {
        flags: u32,
        hinstance: u64,
        hwnd: u64,
    },
    Display {
        flags: u32,
        display_mode: u64,
        plane_index: u32,
        plane_stack_index: u32,
        transform: u32,
        global_alpha: f32,
        alpha_mode: u32,
        image_extent: SerializedExtent2D,
    },
    Headless {
        flags: u32,
    },
}

impl VisitHandles for SurfaceCreateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        if let SurfaceCreateInfo::Display { display_mode, .. } = self {
            visit(ObjectType::DisplayMode, display_mode);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedSwapchainCreateInfo {
    pub flags: u32,
    pub surface: u64,
    pub min_image_count: u32,
    pub image_format: i32,
    pub image_color_space: i32,
    pub image_extent: SerializedExtent2D,
    pub image_array_layers: u32,
    pub image_usage: u32,
    pub image_sharing_mode: i32,
    pub queue_family_indices: Vec<u32>,
    pub pre_transform: u32,
    pub composite_alpha: u32,
    pub present_mode: i32,
    pub clipped: bool,
    pub old_swapchain: u64,
}

impl VisitHandles for SerializedSwapchainCreateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        visit(ObjectType::Surface, &mut self.surface);
        // old_swapchain is never remapped: the prior chain does not exist in
        // the restored process.
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedDisplayModeCreateInfo {
    pub flags: u32,
    pub visible_region: SerializedExtent2D,
    pub refresh_rate: u32,
}

// ============================================================================
// Acceleration structures
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedAccelerationStructureCreateInfo {
    pub create_flags: u32,
    pub buffer: u64,
    pub offset: u64,
    pub size: u64,
    pub structure_type: i32,
    pub device_address: u64,
}

impl VisitHandles for SerializedAccelerationStructureCreateInfo {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        visit(ObjectType::Buffer, &mut self.buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framebuffer_visitor_covers_all_handles() {
        let mut info = SerializedFramebufferCreateInfo {
            flags: 0,
            render_pass: 10,
            attachments: vec![20, 30],
            width: 640,
            height: 480,
            layers: 1,
        };

        let mut seen = Vec::new();
        info.visit_handles(&mut |ty, handle| {
            seen.push((ty, *handle));
            *handle += 100;
        });

        assert_eq!(
            seen,
            vec![
                (ObjectType::RenderPass, 10),
                (ObjectType::ImageView, 20),
                (ObjectType::ImageView, 30),
            ]
        );
        assert_eq!(info.render_pass, 110);
        assert_eq!(info.attachments, vec![120, 130]);
    }

    #[test]
    fn pipeline_variants_visit_stage_modules() {
        let stage = SerializedPipelineShaderStageCreateInfo {
            flags: 0,
            stage: 0x20,
            module: 42,
            entry_point: "main".to_string(),
            specialization: None,
        };
        let mut info = PipelineCreateInfo::Compute(SerializedComputePipelineCreateInfo {
            flags: 0,
            stage,
            layout: 7,
            base_pipeline: 0,
        });

        let mut handles = Vec::new();
        info.visit_handles(&mut |ty, handle| handles.push((ty, *handle)));
        assert_eq!(
            handles,
            vec![
                (ObjectType::ShaderModule, 42),
                (ObjectType::PipelineLayout, 7),
                (ObjectType::Pipeline, 0),
            ]
        );
    }

    #[test]
    fn dedicated_allocation_pnext_visits_both_handles() {
        let mut pnext = vec![PNextEntry::MemoryDedicatedAllocateInfo {
            image: 5,
            buffer: 0,
        }];
        let mut seen = Vec::new();
        pnext.visit_handles(&mut |ty, handle| seen.push((ty, *handle)));
        assert_eq!(seen, vec![(ObjectType::Image, 5), (ObjectType::Buffer, 0)]);
    }
}
