// SPDX-License-Identifier: CEPL-1.0
use crate::commands::CommandPool;
use crate::error::VkResult;
use ash::vk;
use bitflags::bitflags;
use mipview_render::RenderSize;

pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Outcome of acquire/present that is handled by rebuilding the swapchain
/// rather than reported as an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapchainStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired {
    Image { index: u32, status: SwapchainStatus },
    OutOfDate,
}

pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> VkResult<Acquired> {
    match result {
        Ok((index, false)) => Ok(Acquired::Image {
            index,
            status: SwapchainStatus::Optimal,
        }),
        Ok((index, true)) => Ok(Acquired::Image {
            index,
            status: SwapchainStatus::Suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
        Err(e) => Err(e.into()),
    }
}

pub fn classify_present(result: Result<bool, vk::Result>) -> VkResult<SwapchainStatus> {
    match result {
        Ok(false) => Ok(SwapchainStatus::Optimal),
        Ok(true) => Ok(SwapchainStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainStatus::OutOfDate),
        Err(e) => Err(e.into()),
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FrameFlags: u8 {
        /// Host reported a new window size.
        const RESIZE_PENDING = 1 << 0;
        /// Acquire or present reported suboptimal; the frame still counts.
        const SUBOPTIMAL     = 1 << 1;
        /// Acquire or present reported out of date.
        const OUT_OF_DATE    = 1 << 2;
        /// Surface has zero area; nothing is drawn until it grows again.
        const PAUSED         = 1 << 3;
    }
}

/// What the swapchain needs before the next frame can be drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceAction {
    Keep,
    Pause,
    Rebuild,
}

/// The view is only refitted when the drawable area really changed.
pub fn viewport_changed(old: Option<vk::Extent2D>, new: vk::Extent2D) -> bool {
    old != Some(new)
}

/// Mutable state of the render loop, kept apart from the GPU objects so the
/// draw function can borrow both at once.
#[derive(Debug, Default)]
pub struct FrameLoop {
    current_frame: usize,
    pub flags: FrameFlags,
    frames: u64,
}

impl FrameLoop {
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn needs_recreate(&self) -> bool {
        self.flags.intersects(
            FrameFlags::RESIZE_PENDING | FrameFlags::SUBOPTIMAL | FrameFlags::OUT_OF_DATE,
        )
    }

    pub fn is_paused(&self) -> bool {
        self.flags.contains(FrameFlags::PAUSED)
    }

    /// A zero-area window pauses drawing until a real size arrives.
    pub fn request_size(&mut self, size: RenderSize) {
        if size.is_zero_area() {
            self.flags.insert(FrameFlags::PAUSED);
        } else {
            self.flags.insert(FrameFlags::RESIZE_PENDING);
        }
    }

    /// `extent` is what the surface would give a swapchain for `requested`.
    /// Pending flags are kept while paused so the surface is checked again
    /// on the next frame.
    pub fn surface_action(&mut self, requested: RenderSize, extent: vk::Extent2D) -> SurfaceAction {
        if !self.needs_recreate() {
            return if self.is_paused() {
                SurfaceAction::Pause
            } else {
                SurfaceAction::Keep
            };
        }
        if requested.is_zero_area() || extent.width == 0 || extent.height == 0 {
            self.flags.insert(FrameFlags::PAUSED);
            return SurfaceAction::Pause;
        }
        SurfaceAction::Rebuild
    }

    pub fn mark_rebuilt(&mut self) {
        self.flags = FrameFlags::empty();
    }

    /// Run one frame on the current slot, then move to the next slot no
    /// matter how the frame ended.
    pub fn step<T, E>(
        &mut self,
        frame: impl FnOnce(usize, &mut FrameFlags) -> Result<T, E>,
    ) -> Result<T, E> {
        let result = frame(self.current_frame, &mut self.flags);
        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
        self.frames += 1;
        result
    }
}

/// Per-slot command buffer and synchronization objects.
pub struct FrameSlot {
    device: ash::Device,
    pub cmd: vk::CommandBuffer,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

impl FrameSlot {
    /// Fence starts signalled so the first wait on each slot returns at once.
    pub unsafe fn create_all(device: &ash::Device, pool: &CommandPool) -> VkResult<Vec<Self>> {
        let cmds = pool.allocate(MAX_FRAMES_IN_FLIGHT as u32)?;
        let sem_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo {
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        let mut slots = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for cmd in cmds {
            let mut slot = FrameSlot {
                device: device.clone(),
                cmd,
                image_available: vk::Semaphore::null(),
                render_finished: vk::Semaphore::null(),
                in_flight: vk::Fence::null(),
            };
            slot.image_available = device.create_semaphore(&sem_info, None)?;
            slot.render_finished = device.create_semaphore(&sem_info, None)?;
            slot.in_flight = device.create_fence(&fence_info, None)?;
            slots.push(slot);
        }
        Ok(slots)
    }
}

impl Drop for FrameSlot {
    fn drop(&mut self) {
        // The command buffer goes back with its pool.
        unsafe {
            self.device.destroy_semaphore(self.image_available, None);
            self.device.destroy_semaphore(self.render_finished, None);
            self.device.destroy_fence(self.in_flight, None);
        }
    }
}
