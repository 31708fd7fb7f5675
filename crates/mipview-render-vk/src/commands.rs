// SPDX-License-Identifier: CEPL-1.0
use crate::error::VkResult;
use ash::vk;

/// Resettable command pool on the graphics family.
pub struct CommandPool {
    device: ash::Device,
    pub pool: vk::CommandPool,
}

impl CommandPool {
    pub unsafe fn new(device: &ash::Device, queue_family: u32) -> VkResult<Self> {
        let info = vk::CommandPoolCreateInfo {
            queue_family_index: queue_family,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        Ok(Self {
            device: device.clone(),
            pool: device.create_command_pool(&info, None)?,
        })
    }

    pub unsafe fn allocate(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo {
            command_pool: self.pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        Ok(self.device.allocate_command_buffers(&info)?)
    }

    /// Start a one-time command buffer. Off the per-frame path only: `submit`
    /// blocks until the queue is idle.
    pub unsafe fn begin_single_time(&self, queue: vk::Queue) -> VkResult<SingleTimeCommands<'_>> {
        let cmd = self.allocate(1)?[0];
        let guard = SingleTimeCommands {
            pool: self,
            queue,
            cmd,
        };
        let begin = vk::CommandBufferBeginInfo {
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        self.device.begin_command_buffer(cmd, &begin)?;
        Ok(guard)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}

/// Scoped one-time command buffer; freed on drop whether or not it was
/// submitted.
pub struct SingleTimeCommands<'a> {
    pool: &'a CommandPool,
    queue: vk::Queue,
    pub cmd: vk::CommandBuffer,
}

impl SingleTimeCommands<'_> {
    pub fn device(&self) -> &ash::Device {
        &self.pool.device
    }

    /// End recording, submit and wait for the queue to drain.
    pub unsafe fn submit(self) -> VkResult<()> {
        let device = &self.pool.device;
        device.end_command_buffer(self.cmd)?;
        let submit = vk::SubmitInfo {
            command_buffer_count: 1,
            p_command_buffers: &self.cmd,
            ..Default::default()
        };
        device.queue_submit(self.queue, std::slice::from_ref(&submit), vk::Fence::null())?;
        device.queue_wait_idle(self.queue)?;
        Ok(())
    }
}

impl Drop for SingleTimeCommands<'_> {
    fn drop(&mut self) {
        unsafe {
            self.pool
                .device
                .free_command_buffers(self.pool.pool, std::slice::from_ref(&self.cmd));
        }
    }
}
