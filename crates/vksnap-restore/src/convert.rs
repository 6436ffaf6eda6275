//! Conversions from serialized mirror structs back to live `ash` values.

use ash::vk;
use ash::vk::Handle;

use vksnap_object::commands::{
    SerializedBufferCopy, SerializedBufferImageCopy, SerializedBufferMemoryBarrier,
    SerializedClearValue, SerializedImageCopy, SerializedImageMemoryBarrier,
    SerializedMemoryBarrier,
};
use vksnap_object::create_info::{
    SerializedExtent2D, SerializedExtent3D, SerializedImageSubresourceLayers,
    SerializedImageSubresourceRange, SerializedOffset2D, SerializedOffset3D, SerializedRect2D,
    SerializedStencilOpState, SerializedViewport,
};

pub fn extent_2d(extent: &SerializedExtent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: extent.width,
        height: extent.height,
    }
}

pub fn extent_3d(extent: &SerializedExtent3D) -> vk::Extent3D {
    vk::Extent3D {
        width: extent.width,
        height: extent.height,
        depth: extent.depth,
    }
}

pub fn offset_2d(offset: &SerializedOffset2D) -> vk::Offset2D {
    vk::Offset2D {
        x: offset.x,
        y: offset.y,
    }
}

pub fn offset_3d(offset: &SerializedOffset3D) -> vk::Offset3D {
    vk::Offset3D {
        x: offset.x,
        y: offset.y,
        z: offset.z,
    }
}

pub fn rect_2d(rect: &SerializedRect2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: offset_2d(&rect.offset),
        extent: extent_2d(&rect.extent),
    }
}

pub fn viewport(viewport: &SerializedViewport) -> vk::Viewport {
    vk::Viewport {
        x: viewport.x,
        y: viewport.y,
        width: viewport.width,
        height: viewport.height,
        min_depth: viewport.min_depth,
        max_depth: viewport.max_depth,
    }
}

pub fn subresource_range(range: &SerializedImageSubresourceRange) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::from_raw(range.aspect_mask),
        base_mip_level: range.base_mip_level,
        level_count: range.level_count,
        base_array_layer: range.base_array_layer,
        layer_count: range.layer_count,
    }
}

pub fn subresource_layers(
    layers: &SerializedImageSubresourceLayers,
) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::from_raw(layers.aspect_mask),
        mip_level: layers.mip_level,
        base_array_layer: layers.base_array_layer,
        layer_count: layers.layer_count,
    }
}

pub fn clear_value(value: &SerializedClearValue) -> vk::ClearValue {
    match value {
        SerializedClearValue::Color(color) => vk::ClearValue {
            color: vk::ClearColorValue { float32: *color },
        },
        SerializedClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: *depth,
                stencil: *stencil,
            },
        },
    }
}

pub fn stencil_op_state(state: &SerializedStencilOpState) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: vk::StencilOp::from_raw(state.fail_op),
        pass_op: vk::StencilOp::from_raw(state.pass_op),
        depth_fail_op: vk::StencilOp::from_raw(state.depth_fail_op),
        compare_op: vk::CompareOp::from_raw(state.compare_op),
        compare_mask: state.compare_mask,
        write_mask: state.write_mask,
        reference: state.reference,
    }
}

pub fn buffer_copy(copy: &SerializedBufferCopy) -> vk::BufferCopy {
    vk::BufferCopy {
        src_offset: copy.src_offset,
        dst_offset: copy.dst_offset,
        size: copy.size,
    }
}

pub fn image_copy(copy: &SerializedImageCopy) -> vk::ImageCopy {
    vk::ImageCopy {
        src_subresource: subresource_layers(&copy.src_subresource),
        src_offset: offset_3d(&copy.src_offset),
        dst_subresource: subresource_layers(&copy.dst_subresource),
        dst_offset: offset_3d(&copy.dst_offset),
        extent: extent_3d(&copy.extent),
    }
}

pub fn buffer_image_copy(copy: &SerializedBufferImageCopy) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: copy.buffer_offset,
        buffer_row_length: copy.buffer_row_length,
        buffer_image_height: copy.buffer_image_height,
        image_subresource: subresource_layers(&copy.image_subresource),
        image_offset: offset_3d(&copy.image_offset),
        image_extent: extent_3d(&copy.image_extent),
    }
}

pub fn memory_barrier(barrier: &SerializedMemoryBarrier) -> vk::MemoryBarrier<'static> {
    vk::MemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::from_raw(barrier.src_access_mask))
        .dst_access_mask(vk::AccessFlags::from_raw(barrier.dst_access_mask))
}

pub fn buffer_memory_barrier(
    barrier: &SerializedBufferMemoryBarrier,
) -> vk::BufferMemoryBarrier<'static> {
    vk::BufferMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::from_raw(barrier.src_access_mask))
        .dst_access_mask(vk::AccessFlags::from_raw(barrier.dst_access_mask))
        .src_queue_family_index(barrier.src_queue_family_index)
        .dst_queue_family_index(barrier.dst_queue_family_index)
        .buffer(vk::Buffer::from_raw(barrier.buffer))
        .offset(barrier.offset)
        .size(barrier.size)
}

pub fn image_memory_barrier(
    barrier: &SerializedImageMemoryBarrier,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::from_raw(barrier.src_access_mask))
        .dst_access_mask(vk::AccessFlags::from_raw(barrier.dst_access_mask))
        .old_layout(vk::ImageLayout::from_raw(barrier.old_layout))
        .new_layout(vk::ImageLayout::from_raw(barrier.new_layout))
        .src_queue_family_index(barrier.src_queue_family_index)
        .dst_queue_family_index(barrier.dst_queue_family_index)
        .image(vk::Image::from_raw(barrier.image))
        .subresource_range(subresource_range(&barrier.subresource_range))
}
