//! Sampled textures uploaded through a staging buffer.

use crate::command::{execute_single_time_commands, CommandPool};
use crate::context::GpuContext;
use crate::error::Result;
use crate::memory::{create_image_view, GpuBuffer, GpuImage};
use crate::owned::Owned;
use ash::vk;
use gpu_allocator::MemoryLocation;
use hellovk_core::TextureData;
use std::sync::Arc;

/// Format every texture is uploaded in.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Device-local RGBA8 image in `SHADER_READ_ONLY_OPTIMAL` layout with a view.
pub struct Texture {
    view: Owned<vk::ImageView>,
    image: GpuImage,
}

impl Texture {
    /// Copy `data` into a new device-local image and wait for the upload.
    pub fn upload(gpu: &GpuContext, pool: &CommandPool, data: &TextureData, name: &str) -> Result<Self> {
        let staging = GpuBuffer::with_data(
            gpu.allocator(),
            &data.pixels,
            vk::BufferUsageFlags::TRANSFER_SRC,
            &format!("{name} staging"),
        )?;

        let extent = vk::Extent3D {
            width: data.width,
            height: data.height,
            depth: 1,
        };
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = GpuImage::new(gpu.allocator(), &create_info, MemoryLocation::GpuOnly, name)?;

        let device = gpu.device();
        unsafe {
            execute_single_time_commands(device, pool, gpu.graphics_queue(), |cmd| {
                transition_layout(
                    device,
                    cmd,
                    image.handle(),
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                );

                let region = vk::BufferImageCopy::default()
                    .buffer_offset(0)
                    .image_subresource(
                        vk::ImageSubresourceLayers::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .mip_level(0)
                            .base_array_layer(0)
                            .layer_count(1),
                    )
                    .image_extent(extent);
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging.handle(),
                    image.handle(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );

                transition_layout(
                    device,
                    cmd,
                    image.handle(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                );
            })?;
        }

        let view = unsafe {
            create_image_view(device, image.handle(), TEXTURE_FORMAT, vk::ImageAspectFlags::COLOR)?
        };
        tracing::debug!("Uploaded texture {name} ({}x{})", data.width, data.height);

        Ok(Self {
            view: unsafe { Owned::new(gpu.shared_device(), view) },
            image,
        })
    }

    /// The shader-readable view.
    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    /// The underlying image.
    pub fn image(&self) -> &GpuImage {
        &self.image
    }
}

/// Record a whole-image color layout transition.
///
/// Only the two transitions texture uploads need are given precise stages.
unsafe fn transition_layout(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let (src_access, dst_access, src_stage, dst_stage) =
        if new_layout == vk::ImageLayout::TRANSFER_DST_OPTIMAL {
            (
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
            )
        } else {
            (
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            )
        };

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        )
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    device.cmd_pipeline_barrier(
        cmd,
        src_stage,
        dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[barrier],
    );
}

/// Linear, repeating sampler.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_sampler(device: Arc<ash::Device>) -> Result<Owned<vk::Sampler>> {
    let create_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .max_anisotropy(1.0)
        .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
        .compare_op(vk::CompareOp::NEVER)
        .min_lod(0.0)
        .max_lod(0.0);

    let sampler = device.create_sampler(&create_info, None)?;
    Ok(Owned::new(device, sampler))
}
