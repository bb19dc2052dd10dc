use crate::buffer::*;
use crate::vulkan::*;
use crate::*;
use ash::vk;

pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

pub fn create_image(
    width: u32,
    height: u32,
    mip_levels: u32,
    samples: vk::SampleCountFlags,
    format: vk::Format,
    tiling: vk::ImageTiling,
    usage: vk::ImageUsageFlags,
    properties: vk::MemoryPropertyFlags,
) -> (vk::Image, vk::DeviceMemory) {
    let image = unsafe {
        DEVICE
            .create_image(
                &vk::ImageCreateInfo::default()
                    .image_type(vk::ImageType::TYPE_2D)
                    .extent(vk::Extent3D {
                        width,
                        height,
                        depth: 1,
                    })
                    .mip_levels(mip_levels)
                    .array_layers(1)
                    .format(format)
                    .tiling(tiling)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .usage(usage)
                    .samples(samples)
                    .sharing_mode(vk::SharingMode::EXCLUSIVE),
                None,
            )
            .unwrap()
    };

    let requirements = unsafe { DEVICE.get_image_memory_requirements(image) };
    let memory = unsafe {
        DEVICE
            .allocate_memory(
                &vk::MemoryAllocateInfo::default()
                    .allocation_size(requirements.size)
                    .memory_type_index(find_memory_type(
                        requirements.memory_type_bits,
                        properties,
                        &GPU_MEMORY_PROPS,
                    )),
                None,
            )
            .unwrap()
    };
    unsafe { DEVICE.bind_image_memory(image, memory, 0).unwrap() };

    (image, memory)
}

pub fn create_image_view(
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
) -> vk::ImageView {
    unsafe {
        DEVICE
            .create_image_view(
                &vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format)
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(aspect)
                            .level_count(mip_levels)
                            .layer_count(1),
                    ),
                None,
            )
            .unwrap()
    }
}

pub fn transition_image_layout(
    command_pool: vk::CommandPool,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    mip_levels: u32,
) {
    type Layout = vk::ImageLayout;
    let (src_access, dst_access, src_stage, dst_stage) = match (old_layout, new_layout) {
        (Layout::UNDEFINED, Layout::TRANSFER_DST_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        (Layout::TRANSFER_DST_OPTIMAL, Layout::SHADER_READ_ONLY_OPTIMAL) => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        (Layout::UNDEFINED, Layout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        ),
        _ => fatal!("Unsupported image layout transition: {old_layout:?} -> {new_layout:?}"),
    };

    let command_buffer = begin_single_time_commands(command_pool);
    unsafe {
        DEVICE.cmd_pipeline_barrier(
            command_buffer,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[vk::ImageMemoryBarrier::default()
                .old_layout(old_layout)
                .new_layout(new_layout)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .src_access_mask(src_access)
                .dst_access_mask(dst_access)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(aspect)
                        .level_count(mip_levels)
                        .layer_count(1),
                )],
        );
    }
    end_single_time_commands(command_pool, command_buffer);
}

pub fn copy_buffer_to_image(
    command_pool: vk::CommandPool,
    buffer: vk::Buffer,
    image: vk::Image,
    width: u32,
    height: u32,
) {
    let command_buffer = begin_single_time_commands(command_pool);
    unsafe {
        DEVICE.cmd_copy_buffer_to_image(
            command_buffer,
            buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[vk::BufferImageCopy::default()
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .layer_count(1),
                )
                .image_extent(vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                })],
        );
    }
    end_single_time_commands(command_pool, command_buffer);
}

/// Fills mip levels 1.. by blitting each level from the previous one, halving
/// the extent every step. Leaves every level in SHADER_READ_ONLY_OPTIMAL.
pub fn generate_mipmaps(
    command_pool: vk::CommandPool,
    image: vk::Image,
    format: vk::Format,
    width: u32,
    height: u32,
    mip_levels: u32,
) {
    let format_props = format_properties(format);
    if !format_props
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    {
        fatal!("Format {format:?} does not support linear blitting");
    }

    let command_buffer = begin_single_time_commands(command_pool);

    let mut barrier = vk::ImageMemoryBarrier::default()
        .image(image)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .level_count(1)
                .layer_count(1),
        );

    let mut mip_width = width as i32;
    let mut mip_height = height as i32;

    for level in 1..mip_levels {
        // level - 1 just received its pixels, make it blit-readable
        barrier.subresource_range.base_mip_level = level - 1;
        barrier.old_layout = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
        barrier.new_layout = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
        barrier.src_access_mask = vk::AccessFlags::TRANSFER_WRITE;
        barrier.dst_access_mask = vk::AccessFlags::TRANSFER_READ;
        unsafe {
            DEVICE.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }

        let blit = vk::ImageBlit::default()
            .src_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: mip_width,
                    y: mip_height,
                    z: 1,
                },
            ])
            .src_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(level - 1)
                    .layer_count(1),
            )
            .dst_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: (mip_width / 2).max(1),
                    y: (mip_height / 2).max(1),
                    z: 1,
                },
            ])
            .dst_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(level)
                    .layer_count(1),
            );
        unsafe {
            DEVICE.cmd_blit_image(
                command_buffer,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::LINEAR,
            );
        }

        barrier.old_layout = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
        barrier.new_layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
        barrier.src_access_mask = vk::AccessFlags::TRANSFER_READ;
        barrier.dst_access_mask = vk::AccessFlags::SHADER_READ;
        unsafe {
            DEVICE.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }

        mip_width = (mip_width / 2).max(1);
        mip_height = (mip_height / 2).max(1);
    }

    // last level was only ever a blit destination
    barrier.subresource_range.base_mip_level = mip_levels - 1;
    barrier.old_layout = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
    barrier.new_layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
    barrier.src_access_mask = vk::AccessFlags::TRANSFER_WRITE;
    barrier.dst_access_mask = vk::AccessFlags::SHADER_READ;
    unsafe {
        DEVICE.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }

    end_single_time_commands(command_pool, command_buffer);
}

pub struct Texture {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

impl Texture {
    pub fn load(command_pool: vk::CommandPool, path: &str) -> Self {
        scope_time!("load texture {path}");
        let decoded = image::open(path)
            .unwrap_or_else(|e| fatal!("Failed to load texture {path}: {e}"))
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        let pixels = decoded.into_raw();
        let mip_levels = mip_level_count(width, height);

        let (staging_buffer, staging_memory) = create_buffer(
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        unsafe {
            let data = DEVICE
                .map_memory(
                    staging_memory,
                    0,
                    pixels.len() as vk::DeviceSize,
                    vk::MemoryMapFlags::empty(),
                )
                .unwrap();
            std::ptr::copy_nonoverlapping(pixels.as_ptr(), data as *mut u8, pixels.len());
            DEVICE.unmap_memory(staging_memory);
        }

        let format = vk::Format::R8G8B8A8_SRGB;
        let (image, memory) = create_image(
            width,
            height,
            mip_levels,
            vk::SampleCountFlags::TYPE_1,
            format,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        );

        transition_image_layout(
            command_pool,
            image,
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            mip_levels,
        );
        copy_buffer_to_image(command_pool, staging_buffer, image, width, height);
        // transitions every level to SHADER_READ_ONLY_OPTIMAL as it goes
        generate_mipmaps(command_pool, image, format, width, height, mip_levels);

        unsafe {
            DEVICE.destroy_buffer(staging_buffer, None);
            DEVICE.free_memory(staging_memory, None);
        }

        let view = create_image_view(image, format, vk::ImageAspectFlags::COLOR, mip_levels);
        let sampler = unsafe {
            DEVICE
                .create_sampler(
                    &vk::SamplerCreateInfo::default()
                        .mag_filter(vk::Filter::LINEAR)
                        .min_filter(vk::Filter::LINEAR)
                        .address_mode_u(vk::SamplerAddressMode::REPEAT)
                        .address_mode_v(vk::SamplerAddressMode::REPEAT)
                        .address_mode_w(vk::SamplerAddressMode::REPEAT)
                        .anisotropy_enable(GPU_FEATURES.sampler_anisotropy == vk::TRUE)
                        .max_anisotropy(16.0f32.min(GPU_LIMITS.max_sampler_anisotropy))
                        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
                        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
                        .max_lod(mip_levels as f32),
                    None,
                )
                .unwrap()
        };

        Self {
            image,
            memory,
            view,
            sampler,
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            DEVICE.destroy_sampler(self.sampler, None);
            DEVICE.destroy_image_view(self.view, None);
            DEVICE.destroy_image(self.image, None);
            DEVICE.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_count_of_one_pixel() {
        assert_eq!(mip_level_count(1, 1), 1);
    }

    #[test]
    fn mip_count_of_power_of_two() {
        assert_eq!(mip_level_count(1024, 1024), 11);
    }

    #[test]
    fn mip_count_uses_larger_dimension() {
        assert_eq!(mip_level_count(512, 64), 10);
        assert_eq!(mip_level_count(64, 512), 10);
    }

    #[test]
    fn mip_count_of_npot() {
        // floor(log2(1000)) + 1
        assert_eq!(mip_level_count(1000, 600), 10);
    }
}
