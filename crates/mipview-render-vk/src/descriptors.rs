// SPDX-License-Identifier: CEPL-1.0
use crate::device::DeviceContext;
use crate::error::VkResult;
use crate::memory::GpuBuffer;
use crate::texture::Texture;
use ash::vk;
use mipview_math::ViewUniform;
use std::mem::size_of;

pub const UNIFORM_BINDING: u32 = 0;
pub const TEXTURE_BINDING: u32 = 1;

fn set_layout_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 2] {
    [
        vk::DescriptorSetLayoutBinding {
            binding: UNIFORM_BINDING,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX,
            ..Default::default()
        },
        vk::DescriptorSetLayoutBinding {
            binding: TEXTURE_BINDING,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
    ]
}

/// Exactly enough for one set per frame slot.
pub fn pool_sizes(slots: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: slots,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: slots,
        },
    ]
}

/// Per-slot descriptor sets and the persistently mapped uniform buffers they
/// point at. Slot `i` only ever touches `sets[i]` and `uniforms[i]`.
pub struct FrameDescriptors {
    device: ash::Device,
    pub layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    pub sets: Vec<vk::DescriptorSet>,
    uniforms: Vec<GpuBuffer>,
}

impl FrameDescriptors {
    pub unsafe fn new(ctx: &DeviceContext, slots: usize, texture: &Texture) -> VkResult<Self> {
        let device = &ctx.device;
        let bindings = set_layout_bindings();
        let layout_info = vk::DescriptorSetLayoutCreateInfo {
            binding_count: bindings.len() as u32,
            p_bindings: bindings.as_ptr(),
            ..Default::default()
        };
        let mut fd = FrameDescriptors {
            device: device.clone(),
            layout: device.create_descriptor_set_layout(&layout_info, None)?,
            pool: vk::DescriptorPool::null(),
            sets: Vec::new(),
            uniforms: Vec::with_capacity(slots),
        };

        let sizes = pool_sizes(slots as u32);
        let pool_info = vk::DescriptorPoolCreateInfo {
            max_sets: slots as u32,
            pool_size_count: sizes.len() as u32,
            p_pool_sizes: sizes.as_ptr(),
            ..Default::default()
        };
        fd.pool = device.create_descriptor_pool(&pool_info, None)?;

        for _ in 0..slots {
            let mut ubo = GpuBuffer::new(
                ctx,
                size_of::<ViewUniform>() as vk::DeviceSize,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            ubo.map()?;
            ubo.write(&ViewUniform::default());
            fd.uniforms.push(ubo);
        }

        let layouts = vec![fd.layout; slots];
        let alloc = vk::DescriptorSetAllocateInfo {
            descriptor_pool: fd.pool,
            descriptor_set_count: layouts.len() as u32,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        fd.sets = device.allocate_descriptor_sets(&alloc)?;

        for (set, ubo) in fd.sets.iter().zip(&fd.uniforms) {
            let buffer_info = vk::DescriptorBufferInfo {
                buffer: ubo.buffer,
                offset: 0,
                range: ubo.size,
            };
            let write = vk::WriteDescriptorSet {
                dst_set: *set,
                dst_binding: UNIFORM_BINDING,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                p_buffer_info: &buffer_info,
                ..Default::default()
            };
            device.update_descriptor_sets(std::slice::from_ref(&write), &[]);
        }
        fd.bind_texture(texture);
        Ok(fd)
    }

    /// Point every slot at `texture`. Callers must ensure no submitted frame
    /// still reads the sets.
    pub unsafe fn bind_texture(&self, texture: &Texture) {
        let image_info = vk::DescriptorImageInfo {
            sampler: texture.sampler,
            image_view: texture.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let writes: Vec<vk::WriteDescriptorSet> = self
            .sets
            .iter()
            .map(|&set| vk::WriteDescriptorSet {
                dst_set: set,
                dst_binding: TEXTURE_BINDING,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                p_image_info: &image_info,
                ..Default::default()
            })
            .collect();
        self.device.update_descriptor_sets(&writes, &[]);
    }

    /// Only valid once the slot's fence has signalled.
    pub unsafe fn write_uniform(&self, slot: usize, value: &ViewUniform) {
        if let Some(ubo) = self.uniforms.get(slot) {
            ubo.write(value);
        }
    }
}

impl Drop for FrameDescriptors {
    fn drop(&mut self) {
        unsafe {
            if self.pool != vk::DescriptorPool::null() {
                self.device.destroy_descriptor_pool(self.pool, None);
            }
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_match_shader_interface() {
        let b = set_layout_bindings();
        assert_eq!(b[0].binding, 0);
        assert_eq!(b[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(b[0].stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(b[1].binding, 1);
        assert_eq!(b[1].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(b[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn pool_holds_one_set_per_slot() {
        let sizes = pool_sizes(2);
        assert!(sizes.iter().all(|s| s.descriptor_count == 2));
    }

    #[test]
    fn uniform_block_is_four_floats() {
        assert_eq!(size_of::<ViewUniform>(), 16);
    }
}
