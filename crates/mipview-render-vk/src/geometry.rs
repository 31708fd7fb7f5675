// SPDX-License-Identifier: CEPL-1.0
use crate::commands::CommandPool;
use crate::device::DeviceContext;
use crate::error::VkResult;
use crate::memory::GpuBuffer;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem::{offset_of, size_of};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn binding() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attributes() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Vertex, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Vertex, uv) as u32,
            },
        ]
    }
}

/// Unit quad in normalized device coordinates; uv (0,0) is the top-left
/// texel since NDC y points down.
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex { pos: [-1.0, -1.0], uv: [0.0, 0.0] },
    Vertex { pos: [1.0, -1.0], uv: [1.0, 0.0] },
    Vertex { pos: [1.0, 1.0], uv: [1.0, 1.0] },
    Vertex { pos: [-1.0, 1.0], uv: [0.0, 1.0] },
];

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Device-local vertex and index buffers for the quad.
pub struct GeometryBuffers {
    pub vertices: GpuBuffer,
    pub indices: GpuBuffer,
    pub index_count: u32,
}

impl GeometryBuffers {
    pub unsafe fn quad(ctx: &DeviceContext, pool: &CommandPool) -> VkResult<Self> {
        Ok(Self {
            vertices: upload(
                ctx,
                pool,
                bytemuck::cast_slice(&QUAD_VERTICES),
                vk::BufferUsageFlags::VERTEX_BUFFER,
            )?,
            indices: upload(
                ctx,
                pool,
                bytemuck::cast_slice(&QUAD_INDICES),
                vk::BufferUsageFlags::INDEX_BUFFER,
            )?,
            index_count: QUAD_INDICES.len() as u32,
        })
    }
}

/// Host -> staging -> device-local copy through a one-time command buffer.
unsafe fn upload(
    ctx: &DeviceContext,
    pool: &CommandPool,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
) -> VkResult<GpuBuffer> {
    let staging = GpuBuffer::staging(ctx, bytes)?;
    let dst = GpuBuffer::new(
        ctx,
        staging.size,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    let once = pool.begin_single_time(ctx.graphics_queue)?;
    let region = vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size: staging.size,
    };
    once.device()
        .cmd_copy_buffer(once.cmd, staging.buffer, dst.buffer, std::slice::from_ref(&region));
    once.submit()?;
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_uv_spans_whole_texture() {
        assert_eq!(QUAD_INDICES.len(), 6);
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < QUAD_VERTICES.len()));
        for v in QUAD_VERTICES {
            assert_eq!(v.uv[0], (v.pos[0] + 1.0) / 2.0);
            assert_eq!(v.uv[1], (v.pos[1] + 1.0) / 2.0);
        }
    }

    #[test]
    fn vertex_layout_matches_attributes() {
        assert_eq!(size_of::<Vertex>(), 16);
        assert_eq!(Vertex::binding().stride, 16);
        let attrs = Vertex::attributes();
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 8);
        assert_eq!(attrs[1].location, 1);
    }
}
