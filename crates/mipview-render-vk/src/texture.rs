// SPDX-License-Identifier: CEPL-1.0
//! Sampled image texture: staged upload, mip chain generation by repeated
//! linear blits, image view and sampler.
//!
//! Layouts move `UNDEFINED -> TRANSFER_DST_OPTIMAL` for the whole chain,
//! then each level `i < n-1` goes `TRANSFER_DST -> TRANSFER_SRC` (to feed
//! level `i+1`) and on to `SHADER_READ_ONLY`. The last level is never read
//! by a blit and goes straight from `TRANSFER_DST` to `SHADER_READ_ONLY`.
//! Everything is recorded into the same one-time command buffer as the
//! buffer-to-image copy.

use crate::commands::CommandPool;
use crate::device::DeviceContext;
use crate::error::{VkError, VkResult};
use crate::memory::{GpuBuffer, GpuImage};
use ash::vk;
use mipview_math::{mip_blits, mip_level_count, MipBlit};
use mipview_render::ImageData;
use tracing::info;

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

pub fn supports_linear_blit(props: &vk::FormatProperties) -> bool {
    props
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
}

pub fn check_texture_extent(width: u32, height: u32, max: u32) -> VkResult<()> {
    if width > max || height > max {
        return Err(VkError::ImageTooLarge { width, height, max });
    }
    Ok(())
}

fn color_level(level: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: level,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn color_layer(level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: level,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn corner(extent: (u32, u32)) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.0 as i32,
        y: extent.1 as i32,
        z: 1,
    }
}

/// Full-extent blit from `src_level` into the level below it.
pub fn blit_region(step: &MipBlit) -> vk::ImageBlit {
    vk::ImageBlit {
        src_subresource: color_layer(step.src_level),
        src_offsets: [vk::Offset3D::default(), corner(step.src_extent)],
        dst_subresource: color_layer(step.src_level + 1),
        dst_offsets: [vk::Offset3D::default(), corner(step.dst_extent)],
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    (old_layout, new_layout): (vk::ImageLayout, vk::ImageLayout),
    (src_access_mask, dst_access_mask): (vk::AccessFlags, vk::AccessFlags),
    src_stage: vk::PipelineStageFlags,
    dst_stage: vk::PipelineStageFlags,
) {
    let barrier = vk::ImageMemoryBarrier {
        src_access_mask,
        dst_access_mask,
        old_layout,
        new_layout,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range: range,
        ..Default::default()
    };
    device.cmd_pipeline_barrier(
        cmd,
        src_stage,
        dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        std::slice::from_ref(&barrier),
    );
}

/// Texture image with its full mip chain, view and sampler.
pub struct Texture {
    device: ash::Device,
    pub sampler: vk::Sampler,
    pub view: vk::ImageView,
    pub image: GpuImage,
}

impl Texture {
    pub unsafe fn upload(
        ctx: &DeviceContext,
        pool: &CommandPool,
        data: &ImageData,
    ) -> VkResult<Self> {
        check_texture_extent(data.width, data.height, ctx.max_image_dimension)?;
        let format_props = ctx.format_properties(TEXTURE_FORMAT);
        if !supports_linear_blit(&format_props) {
            return Err(VkError::LinearBlitUnsupported(TEXTURE_FORMAT));
        }

        let extent = vk::Extent2D {
            width: data.width,
            height: data.height,
        };
        let levels = mip_level_count(data.width, data.height);
        let staging = GpuBuffer::staging(ctx, &data.rgba)?;
        let image = GpuImage::new(
            ctx,
            extent,
            levels,
            TEXTURE_FORMAT,
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED,
        )?;

        let once = pool.begin_single_time(ctx.graphics_queue)?;
        record_copy(&ctx.device, once.cmd, &staging, &image);
        record_mipmaps(&ctx.device, once.cmd, &image);
        once.submit()?;
        drop(staging);

        let mut tex = Texture {
            device: ctx.device.clone(),
            sampler: vk::Sampler::null(),
            view: vk::ImageView::null(),
            image,
        };
        tex.view = create_view(&ctx.device, &tex.image)?;
        tex.sampler = create_sampler(&ctx.device, levels, ctx.max_anisotropy)?;

        info!(
            "vk: texture {}x{} uploaded, {levels} mip levels",
            data.width, data.height
        );
        Ok(tex)
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            if self.sampler != vk::Sampler::null() {
                self.device.destroy_sampler(self.sampler, None);
            }
            if self.view != vk::ImageView::null() {
                self.device.destroy_image_view(self.view, None);
            }
        }
    }
}

unsafe fn record_copy(device: &ash::Device, cmd: vk::CommandBuffer, src: &GpuBuffer, dst: &GpuImage) {
    let whole = vk::ImageSubresourceRange {
        level_count: dst.mip_levels,
        ..color_level(0)
    };
    barrier(
        device,
        cmd,
        dst.image,
        whole,
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
        (vk::AccessFlags::empty(), vk::AccessFlags::TRANSFER_WRITE),
        vk::PipelineStageFlags::TOP_OF_PIPE,
        vk::PipelineStageFlags::TRANSFER,
    );

    let region = vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: color_layer(0),
        image_offset: vk::Offset3D::default(),
        image_extent: vk::Extent3D {
            width: dst.extent.width,
            height: dst.extent.height,
            depth: 1,
        },
    };
    device.cmd_copy_buffer_to_image(
        cmd,
        src.buffer,
        dst.image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        std::slice::from_ref(&region),
    );
}

unsafe fn record_mipmaps(device: &ash::Device, cmd: vk::CommandBuffer, img: &GpuImage) {
    for step in mip_blits(img.extent.width, img.extent.height) {
        let src = step.src_level;
        barrier(
            device,
            cmd,
            img.image,
            color_level(src),
            (
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ),
            (vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_READ),
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
        );

        device.cmd_blit_image(
            cmd,
            img.image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            img.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[blit_region(&step)],
            vk::Filter::LINEAR,
        );

        barrier(
            device,
            cmd,
            img.image,
            color_level(src),
            (
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ),
            (vk::AccessFlags::TRANSFER_READ, vk::AccessFlags::SHADER_READ),
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        );
    }

    // Last level was only ever a blit destination (or the copy target for 1x1).
    barrier(
        device,
        cmd,
        img.image,
        color_level(img.mip_levels - 1),
        (
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ),
        (vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::SHADER_READ),
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
    );
}

unsafe fn create_view(device: &ash::Device, img: &GpuImage) -> VkResult<vk::ImageView> {
    let info = vk::ImageViewCreateInfo {
        image: img.image,
        view_type: vk::ImageViewType::TYPE_2D,
        format: img.format,
        subresource_range: vk::ImageSubresourceRange {
            level_count: img.mip_levels,
            ..color_level(0)
        },
        ..Default::default()
    };
    Ok(device.create_image_view(&info, None)?)
}

pub fn sampler_info<'a>(levels: u32, max_anisotropy: Option<f32>) -> vk::SamplerCreateInfo<'a> {
    vk::SamplerCreateInfo {
        mag_filter: vk::Filter::LINEAR,
        min_filter: vk::Filter::LINEAR,
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        address_mode_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        address_mode_v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        address_mode_w: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        anisotropy_enable: vk::Bool32::from(max_anisotropy.is_some()),
        max_anisotropy: max_anisotropy.unwrap_or(1.0),
        border_color: vk::BorderColor::INT_OPAQUE_BLACK,
        compare_op: vk::CompareOp::ALWAYS,
        min_lod: 0.0,
        max_lod: levels as f32,
        ..Default::default()
    }
}

unsafe fn create_sampler(
    device: &ash::Device,
    levels: u32,
    max_anisotropy: Option<f32>,
) -> VkResult<vk::Sampler> {
    Ok(device.create_sampler(&sampler_info(levels, max_anisotropy), None)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_blit_feature_check() {
        let mut props = vk::FormatProperties::default();
        assert!(!supports_linear_blit(&props));
        props.linear_tiling_features = vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR;
        assert!(!supports_linear_blit(&props), "only optimal tiling counts");
        props.optimal_tiling_features = vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
            | vk::FormatFeatureFlags::BLIT_SRC;
        assert!(supports_linear_blit(&props));
    }

    #[test]
    fn oversized_images_are_rejected() {
        assert!(check_texture_extent(16384, 16384, 16384).is_ok());
        assert!(check_texture_extent(1, 1, 4096).is_ok());
        let err = check_texture_extent(20000, 20000, 16384).unwrap_err();
        assert!(matches!(
            err,
            VkError::ImageTooLarge { width: 20000, height: 20000, max: 16384 }
        ));
        assert!(err.to_string().contains("20000x20000"));
        assert!(check_texture_extent(4096, 4097, 4096).is_err());
    }

    #[test]
    fn blit_regions_cover_whole_levels() {
        let blits = mip_blits(300, 200);
        let first = blit_region(&blits[0]);
        assert_eq!(first.src_subresource.mip_level, 0);
        assert_eq!(first.dst_subresource.mip_level, 1);
        assert_eq!(first.src_offsets[1], vk::Offset3D { x: 300, y: 200, z: 1 });
        assert_eq!(first.dst_offsets[1], vk::Offset3D { x: 150, y: 100, z: 1 });

        let last = blit_region(blits.last().unwrap());
        assert_eq!(last.dst_subresource.mip_level, 8);
        assert_eq!(last.dst_offsets[1], vk::Offset3D { x: 1, y: 1, z: 1 });
    }

    #[test]
    fn sampler_uses_anisotropy_when_available() {
        let s = sampler_info(10, Some(16.0));
        assert_eq!(s.anisotropy_enable, vk::TRUE);
        assert_eq!(s.max_anisotropy, 16.0);
        assert_eq!(s.max_lod, 10.0);

        let s = sampler_info(1, None);
        assert_eq!(s.anisotropy_enable, vk::FALSE);
        assert_eq!(s.max_anisotropy, 1.0);
    }
}
