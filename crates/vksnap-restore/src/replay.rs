//! Re-records captured command-buffer contents against restored command
//! buffers.
//!
//! Every command's handles are rewritten through the framebuffer-tolerant
//! rewrite: a captured framebuffer that was never restored (lazily created
//! at capture time) degrades to null rather than failing the pass.

use ash::vk;
use ash::vk::Handle;
use tracing::{debug, warn};

use vksnap_core::error::{SnapError, SnapResult};
use vksnap_core::ApplyFlags;
use vksnap_object::commands::RecordedCommand;
use vksnap_object::object::{ObjectType, StateTrackedObject};
use vksnap_object::restore_info::{CommandBufferRestoreInfo, TypedRestoreInfo};

use crate::applier::Applier;
use crate::convert;

pub(crate) fn replay_command_buffer(
    applier: &mut Applier,
    object: &StateTrackedObject,
    info: &CommandBufferRestoreInfo,
) -> SnapResult<()> {
    let restore = applier.load_restore_info(object)?;
    let device = applier.device_for(&restore)?.device.clone();
    let command_buffer =
        vk::CommandBuffer::from_raw(applier.handle_map().get_restored(object.handle)?);

    let Some(begin) = &info.begin_info else {
        // Never begun at capture time; an allocated-but-empty buffer needs
        // no replay.
        return Ok(());
    };

    let mut begin = begin.clone();
    applier.handle_map().update_cmd_handles(&mut begin)?;

    let inheritance = begin.inheritance.as_ref().map(|inherit| {
        vk::CommandBufferInheritanceInfo::default()
            .render_pass(vk::RenderPass::from_raw(inherit.render_pass))
            .subpass(inherit.subpass)
            .framebuffer(vk::Framebuffer::from_raw(inherit.framebuffer))
            .occlusion_query_enable(inherit.occlusion_query_enable)
            .query_flags(vk::QueryControlFlags::from_raw(inherit.query_flags))
            .pipeline_statistics(vk::QueryPipelineStatisticFlags::from_raw(
                inherit.pipeline_statistics,
            ))
    });
    let mut begin_info =
        vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::from_raw(begin.flags));
    if let Some(inheritance) = &inheritance {
        begin_info = begin_info.inheritance_info(inheritance);
    }

    unsafe {
        device
            .begin_command_buffer(command_buffer, &begin_info)
            .map_err(SnapError::Vulkan)?;
    }

    let flatten = applier
        .options
        .flags
        .contains(ApplyFlags::FLATTEN_COMMAND_BUFFERS);
    replay_commands(applier, &device, command_buffer, &info.commands, flatten)?;

    unsafe {
        device
            .end_command_buffer(command_buffer)
            .map_err(SnapError::Vulkan)?;
    }
    debug!(?object, commands = info.commands.len(), "command buffer replayed");
    Ok(())
}

fn replay_commands(
    applier: &mut Applier,
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    commands: &[RecordedCommand],
    flatten: bool,
) -> SnapResult<()> {
    for command in commands {
        // Flattening consumes the captured handles before the rewrite: the
        // secondary's recorded commands are inlined into this primary
        // instead of re-recording vkCmdExecuteCommands.
        if flatten {
            if let RecordedCommand::ExecuteCommands {
                command_buffers: secondaries,
            } = command
            {
                for captured in secondaries {
                    let Some(secondary) =
                        applier.find_manifest_object(ObjectType::CommandBuffer, *captured)
                    else {
                        warn!(
                            captured = format_args!("{captured:#x}"),
                            "secondary command buffer absent from manifest, skipping"
                        );
                        continue;
                    };
                    let secondary_info = applier.load_restore_info(&secondary)?;
                    if let TypedRestoreInfo::CommandBuffer(secondary_commands) =
                        &secondary_info.info
                    {
                        replay_commands(
                            applier,
                            device,
                            command_buffer,
                            &secondary_commands.commands.clone(),
                            flatten,
                        )?;
                    }
                }
                continue;
            }
        }

        let mut command = command.clone();
        applier.handle_map().update_cmd_handles(&mut command)?;
        replay_one(device, command_buffer, &command);
    }
    Ok(())
}

fn replay_one(device: &ash::Device, cb: vk::CommandBuffer, command: &RecordedCommand) {
    unsafe {
        match command {
            RecordedCommand::BindPipeline {
                pipeline_bind_point,
                pipeline,
            } => device.cmd_bind_pipeline(
                cb,
                vk::PipelineBindPoint::from_raw(*pipeline_bind_point),
                vk::Pipeline::from_raw(*pipeline),
            ),
            RecordedCommand::BindDescriptorSets {
                pipeline_bind_point,
                layout,
                first_set,
                descriptor_sets,
                dynamic_offsets,
            } => {
                let sets: Vec<vk::DescriptorSet> = descriptor_sets
                    .iter()
                    .map(|set| vk::DescriptorSet::from_raw(*set))
                    .collect();
                device.cmd_bind_descriptor_sets(
                    cb,
                    vk::PipelineBindPoint::from_raw(*pipeline_bind_point),
                    vk::PipelineLayout::from_raw(*layout),
                    *first_set,
                    &sets,
                    dynamic_offsets,
                );
            }
            RecordedCommand::BindVertexBuffers {
                first_binding,
                buffers,
                offsets,
            } => {
                let buffers: Vec<vk::Buffer> =
                    buffers.iter().map(|b| vk::Buffer::from_raw(*b)).collect();
                device.cmd_bind_vertex_buffers(cb, *first_binding, &buffers, offsets);
            }
            RecordedCommand::BindIndexBuffer {
                buffer,
                offset,
                index_type,
            } => device.cmd_bind_index_buffer(
                cb,
                vk::Buffer::from_raw(*buffer),
                *offset,
                vk::IndexType::from_raw(*index_type),
            ),
            RecordedCommand::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            } => device.cmd_draw(
                cb,
                *vertex_count,
                *instance_count,
                *first_vertex,
                *first_instance,
            ),
            RecordedCommand::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            } => device.cmd_draw_indexed(
                cb,
                *index_count,
                *instance_count,
                *first_index,
                *vertex_offset,
                *first_instance,
            ),
            RecordedCommand::Dispatch {
                group_count_x,
                group_count_y,
                group_count_z,
            } => device.cmd_dispatch(cb, *group_count_x, *group_count_y, *group_count_z),
            RecordedCommand::CopyBuffer { src, dst, regions } => {
                let regions: Vec<vk::BufferCopy> =
                    regions.iter().map(convert::buffer_copy).collect();
                device.cmd_copy_buffer(
                    cb,
                    vk::Buffer::from_raw(*src),
                    vk::Buffer::from_raw(*dst),
                    &regions,
                );
            }
            RecordedCommand::CopyImage {
                src,
                src_layout,
                dst,
                dst_layout,
                regions,
            } => {
                let regions: Vec<vk::ImageCopy> =
                    regions.iter().map(convert::image_copy).collect();
                device.cmd_copy_image(
                    cb,
                    vk::Image::from_raw(*src),
                    vk::ImageLayout::from_raw(*src_layout),
                    vk::Image::from_raw(*dst),
                    vk::ImageLayout::from_raw(*dst_layout),
                    &regions,
                );
            }
            RecordedCommand::CopyBufferToImage {
                src_buffer,
                dst_image,
                dst_image_layout,
                regions,
            } => {
                let regions: Vec<vk::BufferImageCopy> =
                    regions.iter().map(convert::buffer_image_copy).collect();
                device.cmd_copy_buffer_to_image(
                    cb,
                    vk::Buffer::from_raw(*src_buffer),
                    vk::Image::from_raw(*dst_image),
                    vk::ImageLayout::from_raw(*dst_image_layout),
                    &regions,
                );
            }
            RecordedCommand::CopyImageToBuffer {
                src_image,
                src_image_layout,
                dst_buffer,
                regions,
            } => {
                let regions: Vec<vk::BufferImageCopy> =
                    regions.iter().map(convert::buffer_image_copy).collect();
                device.cmd_copy_image_to_buffer(
                    cb,
                    vk::Image::from_raw(*src_image),
                    vk::ImageLayout::from_raw(*src_image_layout),
                    vk::Buffer::from_raw(*dst_buffer),
                    &regions,
                );
            }
            RecordedCommand::FillBuffer {
                buffer,
                offset,
                size,
                data,
            } => device.cmd_fill_buffer(cb, vk::Buffer::from_raw(*buffer), *offset, *size, *data),
            RecordedCommand::UpdateBuffer {
                buffer,
                offset,
                data,
            } => device.cmd_update_buffer(cb, vk::Buffer::from_raw(*buffer), *offset, data),
            RecordedCommand::PipelineBarrier {
                src_stage_mask,
                dst_stage_mask,
                dependency_flags,
                memory_barriers,
                buffer_memory_barriers,
                image_memory_barriers,
            } => {
                let memory: Vec<vk::MemoryBarrier> =
                    memory_barriers.iter().map(convert::memory_barrier).collect();
                let buffer: Vec<vk::BufferMemoryBarrier> = buffer_memory_barriers
                    .iter()
                    .map(convert::buffer_memory_barrier)
                    .collect();
                let image: Vec<vk::ImageMemoryBarrier> = image_memory_barriers
                    .iter()
                    .map(convert::image_memory_barrier)
                    .collect();
                device.cmd_pipeline_barrier(
                    cb,
                    vk::PipelineStageFlags::from_raw(*src_stage_mask),
                    vk::PipelineStageFlags::from_raw(*dst_stage_mask),
                    vk::DependencyFlags::from_raw(*dependency_flags),
                    &memory,
                    &buffer,
                    &image,
                );
            }
            RecordedCommand::BeginRenderPass {
                render_pass,
                framebuffer,
                render_area,
                clear_values,
                contents,
            } => {
                let clear_values: Vec<vk::ClearValue> =
                    clear_values.iter().map(convert::clear_value).collect();
                let begin = vk::RenderPassBeginInfo::default()
                    .render_pass(vk::RenderPass::from_raw(*render_pass))
                    .framebuffer(vk::Framebuffer::from_raw(*framebuffer))
                    .render_area(convert::rect_2d(render_area))
                    .clear_values(&clear_values);
                device.cmd_begin_render_pass(cb, &begin, vk::SubpassContents::from_raw(*contents));
            }
            RecordedCommand::NextSubpass { contents } => {
                device.cmd_next_subpass(cb, vk::SubpassContents::from_raw(*contents))
            }
            RecordedCommand::EndRenderPass => device.cmd_end_render_pass(cb),
            RecordedCommand::SetViewport {
                first_viewport,
                viewports,
            } => {
                let viewports: Vec<vk::Viewport> =
                    viewports.iter().map(convert::viewport).collect();
                device.cmd_set_viewport(cb, *first_viewport, &viewports);
            }
            RecordedCommand::SetScissor {
                first_scissor,
                scissors,
            } => {
                let scissors: Vec<vk::Rect2D> = scissors.iter().map(convert::rect_2d).collect();
                device.cmd_set_scissor(cb, *first_scissor, &scissors);
            }
            RecordedCommand::PushConstants {
                layout,
                stage_flags,
                offset,
                data,
            } => device.cmd_push_constants(
                cb,
                vk::PipelineLayout::from_raw(*layout),
                vk::ShaderStageFlags::from_raw(*stage_flags),
                *offset,
                data,
            ),
            RecordedCommand::SetEvent { event, stage_mask } => device.cmd_set_event(
                cb,
                vk::Event::from_raw(*event),
                vk::PipelineStageFlags::from_raw(*stage_mask),
            ),
            RecordedCommand::ResetEvent { event, stage_mask } => device.cmd_reset_event(
                cb,
                vk::Event::from_raw(*event),
                vk::PipelineStageFlags::from_raw(*stage_mask),
            ),
            RecordedCommand::BeginQuery {
                query_pool,
                query,
                flags,
            } => device.cmd_begin_query(
                cb,
                vk::QueryPool::from_raw(*query_pool),
                *query,
                vk::QueryControlFlags::from_raw(*flags),
            ),
            RecordedCommand::EndQuery { query_pool, query } => {
                device.cmd_end_query(cb, vk::QueryPool::from_raw(*query_pool), *query)
            }
            RecordedCommand::ResetQueryPool {
                query_pool,
                first_query,
                query_count,
            } => device.cmd_reset_query_pool(
                cb,
                vk::QueryPool::from_raw(*query_pool),
                *first_query,
                *query_count,
            ),
            RecordedCommand::ExecuteCommands { command_buffers } => {
                let buffers: Vec<vk::CommandBuffer> = command_buffers
                    .iter()
                    .map(|buffer| vk::CommandBuffer::from_raw(*buffer))
                    .collect();
                device.cmd_execute_commands(cb, &buffers);
            }
        }
    }
}
