//! Recorded command buffer contents.
//!
//! A captured command buffer is a flat list of [`RecordedCommand`] values in
//! recording order. Handles inside commands are raw captured 64-bit values;
//! the applier rewrites them through the handle map before replay.

use serde::{Deserialize, Serialize};

use crate::create_info::{
    SerializedExtent3D, SerializedImageSubresourceLayers, SerializedImageSubresourceRange,
    SerializedOffset3D, SerializedRect2D, SerializedViewport,
};
use crate::handles::VisitHandles;
use crate::object::ObjectType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedMemoryBarrier {
    pub src_access_mask: u32,
    pub dst_access_mask: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedBufferMemoryBarrier {
    pub src_access_mask: u32,
    pub dst_access_mask: u32,
    pub src_queue_family_index: u32,
    pub dst_queue_family_index: u32,
    pub buffer: u64,
    pub offset: u64,
    pub size: u64,
}

impl VisitHandles for SerializedBufferMemoryBarrier {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        visit(ObjectType::Buffer, &mut self.buffer);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedImageMemoryBarrier {
    pub src_access_mask: u32,
    pub dst_access_mask: u32,
    pub old_layout: i32,
    pub new_layout: i32,
    pub src_queue_family_index: u32,
    pub dst_queue_family_index: u32,
    pub image: u64,
    pub subresource_range: SerializedImageSubresourceRange,
}

impl VisitHandles for SerializedImageMemoryBarrier {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        visit(ObjectType::Image, &mut self.image);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedBufferCopy {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedImageCopy {
    pub src_subresource: SerializedImageSubresourceLayers,
    pub src_offset: SerializedOffset3D,
    pub dst_subresource: SerializedImageSubresourceLayers,
    pub dst_offset: SerializedOffset3D,
    pub extent: SerializedExtent3D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedBufferImageCopy {
    pub buffer_offset: u64,
    pub buffer_row_length: u32,
    pub buffer_image_height: u32,
    pub image_subresource: SerializedImageSubresourceLayers,
    pub image_offset: SerializedOffset3D,
    pub image_extent: SerializedExtent3D,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SerializedClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

/// One recorded command, replayed against a restored command buffer with
/// handles remapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordedCommand {
    BindPipeline {
        pipeline_bind_point: i32,
        pipeline: u64,
    },
    BindDescriptorSets {
        pipeline_bind_point: i32,
        layout: u64,
        first_set: u32,
        descriptor_sets: Vec<u64>,
        dynamic_offsets: Vec<u32>,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<u64>,
        offsets: Vec<u64>,
    },
    BindIndexBuffer {
        buffer: u64,
        offset: u64,
        index_type: i32,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    Dispatch {
        group_count_x: u32,
        group_count_y: u32,
        group_count_z: u32,
    },
    CopyBuffer {
        src: u64,
        dst: u64,
        regions: Vec<SerializedBufferCopy>,
    },
    CopyImage {
        src: u64,
        src_layout: i32,
        dst: u64,
        dst_layout: i32,
        regions: Vec<SerializedImageCopy>,
    },
    CopyBufferToImage {
        src_buffer: u64,
        dst_image: u64,
        dst_image_layout: i32,
        regions: Vec<SerializedBufferImageCopy>,
    },
    CopyImageToBuffer {
        src_image: u64,
        src_image_layout: i32,
        dst_buffer: u64,
        regions: Vec<SerializedBufferImageCopy>,
    },
    FillBuffer {
        buffer: u64,
        offset: u64,
        size: u64,
        data: u32,
    },
    UpdateBuffer {
        buffer: u64,
        offset: u64,
        data: Vec<u8>,
    },
    PipelineBarrier {
        src_stage_mask: u32,
        dst_stage_mask: u32,
        dependency_flags: u32,
        memory_barriers: Vec<SerializedMemoryBarrier>,
        buffer_memory_barriers: Vec<SerializedBufferMemoryBarrier>,
        image_memory_barriers: Vec<SerializedImageMemoryBarrier>,
    },
    BeginRenderPass {
        render_pass: u64,
        framebuffer: u64,
        render_area: SerializedRect2D,
        clear_values: Vec<SerializedClearValue>,
        contents: i32,
    },
    NextSubpass {
        contents: i32,
    },
    EndRenderPass,
    SetViewport {
        first_viewport: u32,
        viewports: Vec<SerializedViewport>,
    },
    SetScissor {
        first_scissor: u32,
        scissors: Vec<SerializedRect2D>,
    },
    PushConstants {
        layout: u64,
        stage_flags: u32,
        offset: u32,
        data: Vec<u8>,
    },
    SetEvent {
        event: u64,
        stage_mask: u32,
    },
    ResetEvent {
        event: u64,
        stage_mask: u32,
    },
    BeginQuery {
        query_pool: u64,
        query: u32,
        flags: u32,
    },
    EndQuery {
        query_pool: u64,
        query: u32,
    },
    ResetQueryPool {
        query_pool: u64,
        first_query: u32,
        query_count: u32,
    },
    ExecuteCommands {
        command_buffers: Vec<u64>,
    },
}

impl VisitHandles for RecordedCommand {
    fn visit_handles(&mut self, visit: &mut dyn FnMut(ObjectType, &mut u64)) {
        match self {
            RecordedCommand::BindPipeline { pipeline, .. } => {
                visit(ObjectType::Pipeline, pipeline);
            }
            RecordedCommand::BindDescriptorSets {
                layout,
                descriptor_sets,
                ..
            } => {
                visit(ObjectType::PipelineLayout, layout);
                for set in descriptor_sets.iter_mut() {
                    visit(ObjectType::DescriptorSet, set);
                }
            }
            RecordedCommand::BindVertexBuffers { buffers, .. } => {
                for buffer in buffers.iter_mut() {
                    visit(ObjectType::Buffer, buffer);
                }
            }
            RecordedCommand::BindIndexBuffer { buffer, .. } => {
                visit(ObjectType::Buffer, buffer);
            }
            RecordedCommand::CopyBuffer { src, dst, .. } => {
                visit(ObjectType::Buffer, src);
                visit(ObjectType::Buffer, dst);
            }
            RecordedCommand::CopyImage { src, dst, .. } => {
                visit(ObjectType::Image, src);
                visit(ObjectType::Image, dst);
            }
            RecordedCommand::CopyBufferToImage {
                src_buffer,
                dst_image,
                ..
            } => {
                visit(ObjectType::Buffer, src_buffer);
                visit(ObjectType::Image, dst_image);
            }
            RecordedCommand::CopyImageToBuffer {
                src_image,
                dst_buffer,
                ..
            } => {
                visit(ObjectType::Image, src_image);
                visit(ObjectType::Buffer, dst_buffer);
            }
            RecordedCommand::FillBuffer { buffer, .. }
            | RecordedCommand::UpdateBuffer { buffer, .. } => {
                visit(ObjectType::Buffer, buffer);
            }
            RecordedCommand::PipelineBarrier {
                buffer_memory_barriers,
                image_memory_barriers,
                ..
            } => {
                buffer_memory_barriers.visit_handles(visit);
                image_memory_barriers.visit_handles(visit);
            }
            RecordedCommand::BeginRenderPass {
                render_pass,
                framebuffer,
                ..
            } => {
                visit(ObjectType::RenderPass, render_pass);
                visit(ObjectType::Framebuffer, framebuffer);
            }
            RecordedCommand::PushConstants { layout, .. } => {
                visit(ObjectType::PipelineLayout, layout);
            }
            RecordedCommand::SetEvent { event, .. } | RecordedCommand::ResetEvent { event, .. } => {
                visit(ObjectType::Event, event);
            }
            RecordedCommand::BeginQuery { query_pool, .. }
            | RecordedCommand::EndQuery { query_pool, .. }
            | RecordedCommand::ResetQueryPool { query_pool, .. } => {
                visit(ObjectType::QueryPool, query_pool);
            }
            RecordedCommand::ExecuteCommands { command_buffers } => {
                for buffer in command_buffers.iter_mut() {
                    visit(ObjectType::CommandBuffer, buffer);
                }
            }
            RecordedCommand::Draw { .. }
            | RecordedCommand::DrawIndexed { .. }
            | RecordedCommand::Dispatch { .. }
            | RecordedCommand::NextSubpass { .. }
            | RecordedCommand::EndRenderPass
            | RecordedCommand::SetViewport { .. }
            | RecordedCommand::SetScissor { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_descriptor_sets_visits_layout_and_sets() {
        let mut cmd = RecordedCommand::BindDescriptorSets {
            pipeline_bind_point: 1,
            layout: 5,
            first_set: 0,
            descriptor_sets: vec![6, 7],
            dynamic_offsets: vec![],
        };
        let mut seen = Vec::new();
        cmd.visit_handles(&mut |ty, h| seen.push((ty, *h)));
        assert_eq!(
            seen,
            vec![
                (ObjectType::PipelineLayout, 5),
                (ObjectType::DescriptorSet, 6),
                (ObjectType::DescriptorSet, 7),
            ]
        );
    }

    #[test]
    fn barrier_visits_nested_buffer_and_image_handles() {
        let mut cmd = RecordedCommand::PipelineBarrier {
            src_stage_mask: 1,
            dst_stage_mask: 2,
            dependency_flags: 0,
            memory_barriers: vec![],
            buffer_memory_barriers: vec![SerializedBufferMemoryBarrier {
                src_access_mask: 0,
                dst_access_mask: 0,
                src_queue_family_index: 0,
                dst_queue_family_index: 0,
                buffer: 11,
                offset: 0,
                size: 64,
            }],
            image_memory_barriers: vec![SerializedImageMemoryBarrier {
                src_access_mask: 0,
                dst_access_mask: 0,
                old_layout: 0,
                new_layout: 7,
                src_queue_family_index: 0,
                dst_queue_family_index: 0,
                image: 12,
                subresource_range: SerializedImageSubresourceRange {
                    aspect_mask: 1,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
            }],
        };
        let mut seen = Vec::new();
        cmd.visit_handles(&mut |ty, h| seen.push((ty, *h)));
        assert_eq!(seen, vec![(ObjectType::Buffer, 11), (ObjectType::Image, 12)]);
    }
}
