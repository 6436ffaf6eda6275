//! Pure planning for image transfers: which subresources get copies, which
//! get barriers, and how they pack into staging memory.

use ash::vk;

/// One image subresource and its layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubresourceState {
    pub aspect_mask: vk::ImageAspectFlags,
    pub mip_level: u32,
    pub array_layer: u32,
    pub layout: vk::ImageLayout,
}

/// Staging plan for an image transfer: the copy regions in staging order
/// and the total staging bytes they occupy.
#[derive(Debug, Clone, Default)]
pub struct ImageCopyPlan {
    pub regions: Vec<vk::BufferImageCopy>,
    pub total_size: vk::DeviceSize,
}

fn mip_extent(extent: vk::Extent3D, mip_level: u32) -> vk::Extent3D {
    vk::Extent3D {
        width: (extent.width >> mip_level).max(1),
        height: (extent.height >> mip_level).max(1),
        depth: (extent.depth >> mip_level).max(1),
    }
}

/// Bytes per texel for the uncompressed formats the transfer path supports.
pub fn format_texel_size(format: vk::Format) -> Option<vk::DeviceSize> {
    let size = match format {
        vk::Format::R8_UNORM | vk::Format::R8_SNORM | vk::Format::R8_UINT | vk::Format::R8_SINT
        | vk::Format::S8_UINT => 1,
        vk::Format::R8G8_UNORM
        | vk::Format::R8G8_SNORM
        | vk::Format::R16_UNORM
        | vk::Format::R16_SFLOAT
        | vk::Format::R16_UINT
        | vk::Format::R16_SINT
        | vk::Format::D16_UNORM => 2,
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::R8G8B8A8_UINT
        | vk::Format::R8G8B8A8_SNORM
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::A2B10G10R10_UNORM_PACK32
        | vk::Format::R16G16_SFLOAT
        | vk::Format::R32_SFLOAT
        | vk::Format::R32_UINT
        | vk::Format::R32_SINT
        | vk::Format::D32_SFLOAT
        | vk::Format::D24_UNORM_S8_UINT => 4,
        vk::Format::R16G16B16A16_SFLOAT
        | vk::Format::R16G16B16A16_UNORM
        | vk::Format::R32G32_SFLOAT => 8,
        vk::Format::R32G32B32A32_SFLOAT | vk::Format::R32G32B32A32_UINT => 16,
        _ => return None,
    };
    Some(size)
}

/// Plan the copy regions for an image transfer.
///
/// Only subresources whose layout entry is not `UNDEFINED` produce a region;
/// `UNDEFINED` subresources hold no data and are absent from the plan.
/// Regions pack tightly into staging memory in the order of `layouts`.
pub fn plan_image_copies(
    extent: vk::Extent3D,
    format: vk::Format,
    layouts: &[SubresourceState],
) -> Option<ImageCopyPlan> {
    let texel_size = format_texel_size(format)?;

    let mut plan = ImageCopyPlan::default();
    for state in layouts {
        if state.layout == vk::ImageLayout::UNDEFINED {
            continue;
        }
        let sub_extent = mip_extent(extent, state.mip_level);
        let byte_size = vk::DeviceSize::from(sub_extent.width)
            * vk::DeviceSize::from(sub_extent.height)
            * vk::DeviceSize::from(sub_extent.depth)
            * texel_size;

        plan.regions.push(
            vk::BufferImageCopy::default()
                .buffer_offset(plan.total_size)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(state.aspect_mask)
                        .mip_level(state.mip_level)
                        .base_array_layer(state.array_layer)
                        .layer_count(1),
                )
                .image_offset(vk::Offset3D::default())
                .image_extent(sub_extent),
        );
        plan.total_size += byte_size;
    }
    Some(plan)
}

/// Plan the barriers transitioning each subresource from its entry in
/// `old_layouts` to the matching entry in `new_layouts`.
///
/// Subresources whose layouts already match are skipped, as are transitions
/// into `UNDEFINED` (not a valid destination layout).
pub fn plan_image_transitions(
    image: vk::Image,
    old_layouts: &[SubresourceState],
    new_layouts: &[SubresourceState],
) -> Vec<vk::ImageMemoryBarrier<'static>> {
    old_layouts
        .iter()
        .zip(new_layouts.iter())
        .filter(|(old, new)| {
            old.layout != new.layout && new.layout != vk::ImageLayout::UNDEFINED
        })
        .map(|(old, new)| {
            vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE)
                .dst_access_mask(vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE)
                .old_layout(old.layout)
                .new_layout(new.layout)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(new.aspect_mask)
                        .base_mip_level(new.mip_level)
                        .level_count(1)
                        .base_array_layer(new.array_layer)
                        .layer_count(1),
                )
        })
        .collect()
}

/// Enumerate the (aspect, mip, layer) grid of an image in planning order
/// with a uniform layout, for callers that track a single layout per image.
pub fn uniform_subresources(
    aspect_mask: vk::ImageAspectFlags,
    mip_levels: u32,
    array_layers: u32,
    layout: vk::ImageLayout,
) -> Vec<SubresourceState> {
    let mut states = Vec::with_capacity((mip_levels * array_layers) as usize);
    for array_layer in 0..array_layers {
        for mip_level in 0..mip_levels {
            states.push(SubresourceState {
                aspect_mask,
                mip_level,
                array_layer,
                layout,
            });
        }
    }
    states
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color(mip: u32, layer: u32, layout: vk::ImageLayout) -> SubresourceState {
        SubresourceState {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: mip,
            array_layer: layer,
            layout,
        }
    }

    #[test]
    fn undefined_subresources_are_absent_from_the_plan() {
        let extent = vk::Extent3D {
            width: 8,
            height: 8,
            depth: 1,
        };
        let layouts = vec![
            color(0, 0, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            color(1, 0, vk::ImageLayout::UNDEFINED),
            color(2, 0, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
        ];

        let plan = plan_image_copies(extent, vk::Format::R8G8B8A8_UNORM, &layouts)
            .expect("known format");
        assert_eq!(plan.regions.len(), 2);
        // 8x8x4 + 2x2x4
        assert_eq!(plan.total_size, 256 + 16);
        assert_eq!(plan.regions[0].buffer_offset, 0);
        assert_eq!(plan.regions[1].buffer_offset, 256);
        assert_eq!(plan.regions[1].image_subresource.mip_level, 2);
        assert_eq!(plan.regions[1].image_extent.width, 2);
    }

    #[test]
    fn all_undefined_plan_is_empty() {
        let extent = vk::Extent3D {
            width: 4,
            height: 4,
            depth: 1,
        };
        let layouts = vec![color(0, 0, vk::ImageLayout::UNDEFINED)];
        let plan = plan_image_copies(extent, vk::Format::R8G8B8A8_UNORM, &layouts)
            .expect("known format");
        assert!(plan.regions.is_empty());
        assert_eq!(plan.total_size, 0);
    }

    #[test]
    fn unknown_format_yields_no_plan() {
        let extent = vk::Extent3D {
            width: 4,
            height: 4,
            depth: 1,
        };
        assert!(plan_image_copies(extent, vk::Format::BC1_RGB_UNORM_BLOCK, &[]).is_none());
    }

    #[test]
    fn identical_layouts_produce_no_barrier() {
        let old = vec![
            color(0, 0, vk::ImageLayout::GENERAL),
            color(1, 0, vk::ImageLayout::UNDEFINED),
        ];
        let new = vec![
            color(0, 0, vk::ImageLayout::GENERAL),
            color(1, 0, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        ];
        let barriers = plan_image_transitions(vk::Image::null(), &old, &new);
        assert_eq!(barriers.len(), 1);
        assert_eq!(barriers[0].old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(
            barriers[0].new_layout,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
        assert_eq!(barriers[0].subresource_range.base_mip_level, 1);
    }

    #[test]
    fn transitions_into_undefined_are_skipped() {
        let old = vec![color(0, 0, vk::ImageLayout::GENERAL)];
        let new = vec![color(0, 0, vk::ImageLayout::UNDEFINED)];
        assert!(plan_image_transitions(vk::Image::null(), &old, &new).is_empty());
    }

    #[test]
    fn uniform_grid_covers_every_subresource_in_plan_order() {
        let states = uniform_subresources(
            vk::ImageAspectFlags::COLOR,
            2,
            2,
            vk::ImageLayout::GENERAL,
        );
        assert_eq!(states.len(), 4);
        assert_eq!((states[0].array_layer, states[0].mip_level), (0, 0));
        assert_eq!((states[1].array_layer, states[1].mip_level), (0, 1));
        assert_eq!((states[2].array_layer, states[2].mip_level), (1, 0));
        assert_eq!((states[3].array_layer, states[3].mip_level), (1, 1));
    }
}
