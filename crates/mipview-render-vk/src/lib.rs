// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: one textured quad showing the loaded image, with its
//! pan/zoom transform fed through a per-frame uniform buffer.

mod commands;
mod descriptors;
mod device;
mod error;
mod frame;
mod geometry;
mod instance;
mod memory;
mod pipeline;
mod swapchain;
mod texture;

pub use error::{VkError, VkResult};
pub use frame::{FrameFlags, FrameLoop, SurfaceAction, SwapchainStatus, MAX_FRAMES_IN_FLIGHT};
pub use instance::ENABLE_VALIDATION;
pub use swapchain::VkVsyncMode;

use anyhow::{Context, Result};
use ash::khr::swapchain as khr_swapchain;
use ash::vk;
use mipview_math::{ViewExtents, ViewTransform, ViewUniform};
use mipview_render::{ImageData, RenderSize, Renderer};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info};

use commands::CommandPool;
use descriptors::FrameDescriptors;
use device::DeviceContext;
use frame::{classify_acquire, classify_present, viewport_changed, Acquired, FrameSlot};
use geometry::GeometryBuffers;
use instance::InstanceContext;
use pipeline::{shader_dir, QuadPipeline, RenderPass, ShaderCode};
use swapchain::{
    choose_surface_format, choose_swap_extent, framebuffer_for, query_swapchain_support,
    SwapchainBundle,
};
use texture::Texture;

const PLACEHOLDER_PIXEL: [u8; 4] = [0, 0, 0, 255];
const DEFAULT_CLEAR: [f32; 4] = [0.02, 0.02, 0.04, 1.0];

/// Every GPU object of the renderer. Fields drop top to bottom, so anything
/// sized from the swapchain goes first and the device context last.
struct Gpu {
    swapchain: Option<SwapchainBundle>,
    pipeline: QuadPipeline,
    render_pass: RenderPass,
    descriptors: FrameDescriptors,
    texture: Texture,
    geometry: GeometryBuffers,
    slots: Vec<FrameSlot>,
    pool: CommandPool,
    swapchain_loader: khr_swapchain::Device,
    shaders: ShaderCode,
    clear_color: [f32; 4],
    ctx: DeviceContext,
}

impl Drop for Gpu {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();
        }
    }
}

pub struct VkRenderer {
    gpu: Gpu,
    frame_loop: FrameLoop,
    view: ViewTransform,
    size: RenderSize,
    vsync: VkVsyncMode,
    has_image: bool,
    redraw: bool,
}

impl VkRenderer {
    /// Bootstrap in dependency order: instance and surface, device,
    /// swapchain with render pass and framebuffers, command pool, uploads,
    /// descriptors, pipeline, frame slots. A failure at any step drops the
    /// already created objects in reverse. A surface that starts out 0x0
    /// gets its render pass but no swapchain until it grows.
    unsafe fn bootstrap(
        display: RawDisplayHandle,
        window: RawWindowHandle,
        size: RenderSize,
        vsync: VkVsyncMode,
    ) -> Result<Self> {
        let inst = InstanceContext::new(display, window).context("create Vulkan instance/surface")?;
        let ctx = DeviceContext::new(inst).context("select GPU and create device")?;
        let shaders = ShaderCode::load(&shader_dir()).context("load shaders")?;
        let swapchain_loader = khr_swapchain::Device::new(ctx.instance(), &ctx.device);

        let support = query_swapchain_support(&ctx.inst.surface_loader, ctx.phys, ctx.inst.surface)
            .context("query surface support")?;
        let extent = choose_swap_extent(&support.capabilities, size);
        let mut frame_loop = FrameLoop::default();
        frame_loop.request_size(size);
        let (swapchain, render_pass) = match frame_loop.surface_action(size, extent) {
            SurfaceAction::Rebuild => {
                let mut bundle = SwapchainBundle::new(&ctx, &swapchain_loader, size, vsync, 0)
                    .context("create swapchain")?;
                let render_pass = RenderPass::new(&ctx.device, bundle.format)?;
                bundle.create_framebuffers(render_pass.render_pass)?;
                frame_loop.mark_rebuilt();
                (Some(bundle), render_pass)
            }
            SurfaceAction::Pause | SurfaceAction::Keep => {
                info!("vk: surface is 0x0 at startup, swapchain deferred");
                let format = choose_surface_format(&support.formats).format;
                (None, RenderPass::new(&ctx.device, format)?)
            }
        };

        let pool = CommandPool::new(&ctx.device, ctx.families.graphics)?;
        let geometry = GeometryBuffers::quad(&ctx, &pool).context("upload quad geometry")?;
        let texture = Texture::upload(&ctx, &pool, &ImageData::placeholder(PLACEHOLDER_PIXEL))
            .context("upload placeholder texture")?;
        let descriptors = FrameDescriptors::new(&ctx, MAX_FRAMES_IN_FLIGHT, &texture)
            .context("create descriptor sets")?;
        let pipeline = QuadPipeline::new(&ctx.device, &shaders, &render_pass, descriptors.layout)
            .context("create graphics pipeline")?;
        let slots = FrameSlot::create_all(&ctx.device, &pool)?;

        let mut view = ViewTransform::default();
        view.initialize_scaling(1, 1, extent.width.max(1), extent.height.max(1));

        info!("vk: renderer ready ({MAX_FRAMES_IN_FLIGHT} frames in flight)");
        Ok(Self {
            gpu: Gpu {
                swapchain,
                pipeline,
                render_pass,
                descriptors,
                texture,
                geometry,
                slots,
                pool,
                swapchain_loader,
                shaders,
                clear_color: DEFAULT_CLEAR,
                ctx,
            },
            frame_loop,
            view,
            size,
            vsync,
            has_image: false,
            redraw: false,
        })
    }

    /// Takes effect on the next swapchain rebuild, which this schedules.
    pub fn set_vsync_mode(&mut self, mode: VkVsyncMode) {
        if self.vsync != mode {
            self.vsync = mode;
            self.frame_loop.flags.insert(FrameFlags::RESIZE_PENDING);
            info!("vk: vsync mode -> {mode:?}");
        }
    }

    /// True once after a swapchain rebuild: the new images have not shown
    /// the current view yet.
    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.redraw)
    }

    /// Rebuild the swapchain for the current size, or pause while the
    /// surface has zero area.
    unsafe fn recreate_swapchain(&mut self) -> Result<()> {
        let extent = self
            .gpu
            .surface_extent(self.size)
            .context("query surface capabilities")?;
        let was_paused = self.frame_loop.is_paused();
        match self.frame_loop.surface_action(self.size, extent) {
            SurfaceAction::Keep => return Ok(()),
            SurfaceAction::Pause => {
                if !was_paused {
                    info!("vk: surface is 0x0, paused");
                }
                return Ok(());
            }
            SurfaceAction::Rebuild => {}
        }
        if was_paused {
            info!("vk: surface is {}x{}, resumed", extent.width, extent.height);
        }

        let reason = self.frame_loop.flags;
        let old_extent = self.gpu.swapchain.as_ref().map(|sc| sc.extent);
        let new_extent = self
            .gpu
            .rebuild_swapchain(self.size, self.vsync)
            .context("recreate swapchain")?;
        self.frame_loop.mark_rebuilt();
        self.redraw = true;

        debug!("vk: swapchain rebuilt ({reason:?})");
        if viewport_changed(old_extent, new_extent) {
            self.view.resize_viewport(new_extent.width, new_extent.height);
        }
        Ok(())
    }
}

impl Gpu {
    unsafe fn surface_extent(&self, size: RenderSize) -> VkResult<vk::Extent2D> {
        let caps = self
            .ctx
            .inst
            .surface_loader
            .get_physical_device_surface_capabilities(self.ctx.phys, self.ctx.inst.surface)?;
        Ok(choose_swap_extent(&caps, size))
    }

    /// Tear the old swapchain down completely, then build a new one. The
    /// render pass and pipeline survive unless the surface format changed.
    /// Returns the new extent.
    unsafe fn rebuild_swapchain(
        &mut self,
        size: RenderSize,
        vsync: VkVsyncMode,
    ) -> VkResult<vk::Extent2D> {
        self.ctx.device.device_wait_idle()?;
        let generation = self
            .swapchain
            .take()
            .map(|old| old.generation + 1)
            .unwrap_or_default();

        let mut bundle =
            SwapchainBundle::new(&self.ctx, &self.swapchain_loader, size, vsync, generation)?;
        if bundle.format != self.render_pass.format {
            info!("vk: surface format changed, rebuilding render pass and pipeline");
            self.render_pass = RenderPass::new(&self.ctx.device, bundle.format)?;
            self.pipeline = QuadPipeline::new(
                &self.ctx.device,
                &self.shaders,
                &self.render_pass,
                self.descriptors.layout,
            )?;
        }
        bundle.create_framebuffers(self.render_pass.render_pass)?;
        let extent = bundle.extent;
        self.swapchain = Some(bundle);
        Ok(extent)
    }

    unsafe fn record(
        &self,
        slot: usize,
        sc: &SwapchainBundle,
        framebuffer: vk::Framebuffer,
        extents: &ViewExtents,
        draw_image: bool,
    ) -> VkResult<()> {
        let device = &self.ctx.device;
        let cmd = self.slots[slot].cmd;
        device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
        device.begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default())?;

        let clear = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        };
        let begin = vk::RenderPassBeginInfo {
            render_pass: self.render_pass.render_pass,
            framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: sc.extent,
            },
            clear_value_count: 1,
            p_clear_values: &clear,
            ..Default::default()
        };
        device.cmd_begin_render_pass(cmd, &begin, vk::SubpassContents::INLINE);

        if draw_image {
            let layout = self.pipeline.layout;
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: sc.extent.width as f32,
                height: sc.extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            let scissor = vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: sc.extent,
            };
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[scissor]);
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.geometry.vertices.buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, self.geometry.indices.buffer, 0, vk::IndexType::UINT16);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[self.descriptors.sets[slot]],
                &[],
            );
            device.cmd_push_constants(
                cmd,
                layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(extents),
            );
            device.cmd_draw_indexed(cmd, self.geometry.index_count, 1, 0, 0, 0);
        }

        device.cmd_end_render_pass(cmd);
        device.end_command_buffer(cmd)?;
        Ok(())
    }

    /// One frame on `slot`: wait, acquire, update uniform, record, submit,
    /// present. Swapchain problems only set flags; the caller rebuilds.
    unsafe fn draw_frame(
        &self,
        slot: usize,
        flags: &mut FrameFlags,
        uniform: &ViewUniform,
        extents: &ViewExtents,
        draw_image: bool,
    ) -> VkResult<()> {
        let Some(sc) = self.swapchain.as_ref() else {
            flags.insert(FrameFlags::OUT_OF_DATE);
            return Ok(());
        };
        let device = &self.ctx.device;
        let frame = &self.slots[slot];

        device.wait_for_fences(&[frame.in_flight], true, u64::MAX)?;

        let acquired = classify_acquire(self.swapchain_loader.acquire_next_image(
            sc.swapchain,
            u64::MAX,
            frame.image_available,
            vk::Fence::null(),
        ))?;
        let index = match acquired {
            Acquired::Image { index, status } => {
                if status == SwapchainStatus::Suboptimal {
                    flags.insert(FrameFlags::SUBOPTIMAL);
                }
                index
            }
            Acquired::OutOfDate => {
                debug!("vk: acquire out of date");
                flags.insert(FrameFlags::OUT_OF_DATE);
                return Ok(());
            }
        };
        let framebuffer = framebuffer_for(&sc.framebuffers, index)?;

        // Fence is only reset once work is certain to be submitted.
        self.descriptors.write_uniform(slot, uniform);
        device.reset_fences(&[frame.in_flight])?;
        self.record(slot, sc, framebuffer, extents, draw_image)?;

        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            wait_semaphore_count: 1,
            p_wait_semaphores: &frame.image_available,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &frame.cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &frame.render_finished,
            ..Default::default()
        };
        device.queue_submit(
            self.ctx.graphics_queue,
            std::slice::from_ref(&submit),
            frame.in_flight,
        )?;

        let present = vk::PresentInfoKHR {
            wait_semaphore_count: 1,
            p_wait_semaphores: &frame.render_finished,
            swapchain_count: 1,
            p_swapchains: &sc.swapchain,
            p_image_indices: &index,
            ..Default::default()
        };
        match classify_present(
            self.swapchain_loader
                .queue_present(self.ctx.present_queue, &present),
        )? {
            SwapchainStatus::Optimal => {}
            SwapchainStatus::Suboptimal => flags.insert(FrameFlags::SUBOPTIMAL),
            SwapchainStatus::OutOfDate => flags.insert(FrameFlags::OUT_OF_DATE),
        }
        Ok(())
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<Self> {
        let window = window.window_handle()?.as_raw();
        let display = display.display_handle()?.as_raw();
        let size = RenderSize {
            width: size.width.max(1),
            height: size.height.max(1),
        };
        unsafe { Self::bootstrap(display, window, size, VkVsyncMode::default()) }
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        if size == self.size {
            return Ok(());
        }
        self.size = size;
        if size.is_zero_area() && !self.frame_loop.is_paused() {
            info!("vk: window is 0x0, paused");
        }
        self.frame_loop.request_size(size);
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        unsafe {
            if self.frame_loop.needs_recreate() {
                self.recreate_swapchain()?;
            }
            if self.frame_loop.is_paused() {
                return Ok(());
            }

            let uniform = self.view.uniform();
            let extents = self.view.extents();
            let gpu = &self.gpu;
            let has_image = self.has_image;
            self.frame_loop
                .step(|slot, flags| gpu.draw_frame(slot, flags, &uniform, &extents, has_image))
                .context("draw frame")?;

            if self.frame_loop.needs_recreate() {
                self.recreate_swapchain()?;
            }
        }
        Ok(())
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.gpu.clear_color = rgba;
    }

    fn load_image(&mut self, image: &ImageData) -> Result<()> {
        unsafe {
            let gpu = &mut self.gpu;
            gpu.ctx.device.device_wait_idle()?;
            let texture = Texture::upload(&gpu.ctx, &gpu.pool, image).context("upload texture")?;
            gpu.descriptors.bind_texture(&texture);
            gpu.texture = texture;
        }
        let (vw, vh) = self
            .gpu
            .swapchain
            .as_ref()
            .map(|sc| (sc.extent.width, sc.extent.height))
            .unwrap_or((self.size.width, self.size.height));
        self.view.initialize_scaling(image.width, image.height, vw, vh);
        self.has_image = true;
        Ok(())
    }

    fn view_mut(&mut self) -> &mut ViewTransform {
        &mut self.view
    }
}
