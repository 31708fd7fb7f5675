// SPDX-License-Identifier: CEPL-1.0
use crate::device::DeviceContext;
use crate::error::{VkError, VkResult};
use ash::vk;
use std::ptr::NonNull;

/// Index of the first memory type allowed by `type_filter` that has all of
/// `flags`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    flags: vk::MemoryPropertyFlags,
) -> VkResult<u32> {
    props.memory_types[..props.memory_type_count as usize]
        .iter()
        .enumerate()
        .find(|&(i, t)| type_filter & (1u32 << i) != 0 && t.property_flags.contains(flags))
        .map(|(i, _)| i as u32)
        .ok_or(VkError::NoMemoryType { type_filter, flags })
}

unsafe fn allocate(
    ctx: &DeviceContext,
    req: vk::MemoryRequirements,
    flags: vk::MemoryPropertyFlags,
) -> VkResult<vk::DeviceMemory> {
    let info = vk::MemoryAllocateInfo {
        allocation_size: req.size,
        memory_type_index: find_memory_type(&ctx.memory_props, req.memory_type_bits, flags)?,
        ..Default::default()
    };
    Ok(ctx.device.allocate_memory(&info, None)?)
}

/// Buffer with its own dedicated allocation.
pub struct GpuBuffer {
    device: ash::Device,
    pub buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    mapped: Option<NonNull<u8>>,
}

impl GpuBuffer {
    pub unsafe fn new(
        ctx: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        flags: vk::MemoryPropertyFlags,
    ) -> VkResult<Self> {
        let info = vk::BufferCreateInfo {
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let mut buf = GpuBuffer {
            device: ctx.device.clone(),
            buffer: ctx.device.create_buffer(&info, None)?,
            memory: vk::DeviceMemory::null(),
            size,
            mapped: None,
        };
        let req = ctx.device.get_buffer_memory_requirements(buf.buffer);
        buf.memory = allocate(ctx, req, flags)?;
        ctx.device.bind_buffer_memory(buf.buffer, buf.memory, 0)?;
        Ok(buf)
    }

    /// Host-visible, coherent buffer filled with `bytes`.
    pub unsafe fn staging(ctx: &DeviceContext, bytes: &[u8]) -> VkResult<Self> {
        let mut buf = Self::new(
            ctx,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let dst = buf.map()?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst.as_ptr(), bytes.len());
        buf.unmap();
        Ok(buf)
    }

    /// Map the whole buffer. Stays mapped until `unmap` or drop.
    pub unsafe fn map(&mut self) -> VkResult<NonNull<u8>> {
        if let Some(ptr) = self.mapped {
            return Ok(ptr);
        }
        let raw = self
            .device
            .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())?;
        let ptr = NonNull::new(raw.cast::<u8>())
            .ok_or(VkError::Vk(vk::Result::ERROR_MEMORY_MAP_FAILED))?;
        self.mapped = Some(ptr);
        Ok(ptr)
    }

    pub unsafe fn unmap(&mut self) {
        if self.mapped.take().is_some() {
            self.device.unmap_memory(self.memory);
        }
    }

    /// Copy `value` to the start of a mapped buffer; a no-op when unmapped.
    pub unsafe fn write<T: bytemuck::Pod>(&self, value: &T) {
        let bytes = bytemuck::bytes_of(value);
        debug_assert!(bytes.len() as vk::DeviceSize <= self.size);
        if let Some(dst) = self.mapped {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst.as_ptr(), bytes.len());
        }
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe {
            self.unmap();
            self.device.destroy_buffer(self.buffer, None);
            if self.memory != vk::DeviceMemory::null() {
                self.device.free_memory(self.memory, None);
            }
        }
    }
}

/// Device-local 2D image with its own allocation.
pub struct GpuImage {
    device: ash::Device,
    pub image: vk::Image,
    memory: vk::DeviceMemory,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub mip_levels: u32,
}

impl GpuImage {
    pub unsafe fn new(
        ctx: &DeviceContext,
        extent: vk::Extent2D,
        mip_levels: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> VkResult<Self> {
        let info = vk::ImageCreateInfo {
            image_type: vk::ImageType::TYPE_2D,
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            mip_levels,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let mut img = GpuImage {
            device: ctx.device.clone(),
            image: ctx.device.create_image(&info, None)?,
            memory: vk::DeviceMemory::null(),
            format,
            extent,
            mip_levels,
        };
        let req = ctx.device.get_image_memory_requirements(img.image);
        img.memory = allocate(ctx, req, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
        ctx.device.bind_image_memory(img.image, img.memory, 0)?;
        Ok(img)
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image(self.image, None);
            if self.memory != vk::DeviceMemory::null() {
                self.device.free_memory(self.memory, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut p = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, &flags) in p.memory_types.iter_mut().zip(types) {
            slot.property_flags = flags;
        }
        p
    }

    #[test]
    fn picks_first_type_with_all_flags() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let p = props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            host,
            host | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        assert_eq!(find_memory_type(&p, 0b1111, host).unwrap(), 2);
        assert_eq!(find_memory_type(&p, 0b1111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(), 0);
    }

    #[test]
    fn respects_type_filter() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let p = props(&[host, host, host]);
        assert_eq!(find_memory_type(&p, 0b100, host).unwrap(), 2);
    }

    #[test]
    fn no_match_is_an_error() {
        let p = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let err = find_memory_type(&p, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap_err();
        assert!(matches!(err, VkError::NoMemoryType { type_filter: 1, .. }));
        // Types beyond memory_type_count are never considered.
        assert!(find_memory_type(&p, 0b10, vk::MemoryPropertyFlags::empty()).is_err());
    }
}
