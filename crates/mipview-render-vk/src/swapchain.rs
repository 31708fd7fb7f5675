// SPDX-License-Identifier: CEPL-1.0
use crate::device::DeviceContext;
use crate::error::{VkError, VkResult};
use ash::khr::{surface, swapchain};
use ash::vk;
use mipview_render::RenderSize;
use tracing::info;

/// Preferred present mode. FIFO is always available and never tears;
/// MAILBOX gives lower latency where the surface offers it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VkVsyncMode {
    Fifo,
    #[default]
    Mailbox,
}

pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

pub unsafe fn query_swapchain_support(
    loader: &surface::Instance,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> VkResult<SwapchainSupport> {
    Ok(SwapchainSupport {
        capabilities: loader.get_physical_device_surface_capabilities(phys, surface)?,
        formats: loader.get_physical_device_surface_formats(phys, surface)?,
        present_modes: loader.get_physical_device_surface_present_modes(phys, surface)?,
    })
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let preferred = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };
    formats
        .iter()
        .copied()
        .find(|f| f.format == preferred.format && f.color_space == preferred.color_space)
        .or_else(|| formats.first().copied())
        .unwrap_or(preferred)
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR], mode: VkVsyncMode) -> vk::PresentModeKHR {
    match mode {
        VkVsyncMode::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        _ => vk::PresentModeKHR::FIFO,
    }
}

/// The surface's fixed extent if it reports one, otherwise the window size
/// clamped into the surface's min/max bounds.
pub fn choose_swap_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 means "no max").
/// Framebuffer for an acquired image index. An index past the end means the
/// bundle and the swapchain disagree, which cannot be recovered from.
pub fn framebuffer_for(framebuffers: &[vk::Framebuffer], index: u32) -> VkResult<vk::Framebuffer> {
    framebuffers
        .get(index as usize)
        .copied()
        .ok_or(VkError::ImageIndexOutOfRange {
            index,
            count: framebuffers.len(),
        })
}

pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        wanted
    } else {
        wanted.min(caps.max_image_count)
    }
}

fn format_name(f: vk::Format) -> &'static str {
    match f {
        vk::Format::B8G8R8A8_SRGB => "B8G8R8A8_SRGB",
        vk::Format::B8G8R8A8_UNORM => "B8G8R8A8_UNORM",
        vk::Format::R8G8B8A8_SRGB => "R8G8B8A8_SRGB",
        vk::Format::R8G8B8A8_UNORM => "R8G8B8A8_UNORM",
        _ => "OTHER",
    }
}

/// Swapchain plus everything sized from it: image views and framebuffers.
/// Built and dropped as one unit; `Drop` tears down framebuffers, views and
/// the swapchain in reverse creation order.
pub struct SwapchainBundle {
    device: ash::Device,
    loader: swapchain::Device,
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
    /// Increases by one on every rebuild.
    pub generation: u64,
}

impl SwapchainBundle {
    /// Create the swapchain and its image views. Framebuffers follow in
    /// [`SwapchainBundle::create_framebuffers`] once the render pass matches
    /// the chosen format.
    pub unsafe fn new(
        ctx: &DeviceContext,
        loader: &swapchain::Device,
        want: RenderSize,
        vsync: VkVsyncMode,
        generation: u64,
    ) -> VkResult<Self> {
        let support = query_swapchain_support(&ctx.inst.surface_loader, ctx.phys, ctx.inst.surface)?;
        let caps = support.capabilities;
        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes, vsync);
        let extent = choose_swap_extent(&caps, want);
        let image_count = choose_image_count(&caps);

        let family_indices = ctx.families.unique();
        let (sharing_mode, index_count, p_indices) = if ctx.families.is_shared() {
            (vk::SharingMode::EXCLUSIVE, 0, std::ptr::null())
        } else {
            (
                vk::SharingMode::CONCURRENT,
                family_indices.len() as u32,
                family_indices.as_ptr(),
            )
        };

        let info = vk::SwapchainCreateInfoKHR {
            surface: ctx.inst.surface,
            min_image_count: image_count,
            image_format: surface_format.format,
            image_color_space: surface_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing_mode,
            queue_family_index_count: index_count,
            p_queue_family_indices: p_indices,
            pre_transform: caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            ..Default::default()
        };
        let swapchain = loader.create_swapchain(&info, None)?;

        let mut bundle = SwapchainBundle {
            device: ctx.device.clone(),
            loader: loader.clone(),
            swapchain,
            format: surface_format.format,
            extent,
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            generation,
        };
        bundle.images = loader.get_swapchain_images(swapchain)?;
        bundle.create_image_views()?;

        info!(
            "vk: swapchain #{generation}: {} / {:?}, {:?}, {}x{}, {} images (min {})",
            format_name(surface_format.format),
            surface_format.color_space,
            present_mode,
            extent.width,
            extent.height,
            bundle.images.len(),
            caps.min_image_count,
        );
        Ok(bundle)
    }

    unsafe fn create_image_views(&mut self) -> VkResult<()> {
        for &image in &self.images {
            let info = vk::ImageViewCreateInfo {
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: self.format,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            self.image_views
                .push(self.device.create_image_view(&info, None)?);
        }
        Ok(())
    }

    pub unsafe fn create_framebuffers(&mut self, render_pass: vk::RenderPass) -> VkResult<()> {
        for &view in &self.image_views {
            let info = vk::FramebufferCreateInfo {
                render_pass,
                attachment_count: 1,
                p_attachments: &view,
                width: self.extent.width,
                height: self.extent.height,
                layers: 1,
                ..Default::default()
            };
            self.framebuffers
                .push(self.device.create_framebuffer(&info, None)?);
        }
        Ok(())
    }
}

impl Drop for SwapchainBundle {
    fn drop(&mut self) {
        unsafe {
            for &fb in &self.framebuffers {
                self.device.destroy_framebuffer(fb, None);
            }
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: (u32, u32), max: (u32, u32), current: Option<(u32, u32)>) -> vk::SurfaceCapabilitiesKHR {
        let (cw, ch) = current.unwrap_or((u32::MAX, u32::MAX));
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: vk::Extent2D { width: cw, height: ch },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            ..Default::default()
        }
    }

    fn size(width: u32, height: u32) -> RenderSize {
        RenderSize { width, height }
    }

    #[test]
    fn extent_clamped_into_bounds() {
        let c = caps((100, 100), (1920, 1080), None);
        for (w, h) in [(0, 0), (50, 5000), (800, 600), (4000, 90), (1920, 1080)] {
            let e = choose_swap_extent(&c, size(w, h));
            assert!((100..=1920).contains(&e.width), "{w}x{h} -> {e:?}");
            assert!((100..=1080).contains(&e.height), "{w}x{h} -> {e:?}");
        }
        let e = choose_swap_extent(&c, size(800, 600));
        assert_eq!((e.width, e.height), (800, 600));
    }

    #[test]
    fn fixed_surface_extent_wins() {
        let c = caps((1, 1), (4096, 4096), Some((640, 480)));
        let e = choose_swap_extent(&c, size(800, 600));
        assert_eq!((e.width, e.height), (640, 480));
    }

    #[test]
    fn acquired_index_must_have_framebuffer() {
        let fbs = [vk::Framebuffer::null(); 3];
        assert!(framebuffer_for(&fbs, 2).is_ok());
        let err = framebuffer_for(&fbs, 3).unwrap_err();
        assert!(matches!(err, VkError::ImageIndexOutOfRange { index: 3, count: 3 }));
        assert!(framebuffer_for(&[], 0).is_err());
    }

    #[test]
    fn image_count_respects_max() {
        let mut c = caps((1, 1), (1, 1), None);
        assert_eq!(choose_image_count(&c), 3);
        c.max_image_count = 2;
        assert_eq!(choose_image_count(&c), 2);
        c.max_image_count = 8;
        assert_eq!(choose_image_count(&c), 3);
    }

    #[test]
    fn srgb_bgra_format_preferred() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_surface_format(&[unorm, srgb]), srgb);
        assert_eq!(choose_surface_format(&[unorm]), unorm);
    }

    #[test]
    fn mailbox_falls_back_to_fifo() {
        let both = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        let fifo_only = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&both, VkVsyncMode::Mailbox), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&fifo_only, VkVsyncMode::Mailbox), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&both, VkVsyncMode::Fifo), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn support_needs_formats_and_modes() {
        let mut s = SwapchainSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: Vec::new(),
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(!s.is_adequate());
        s.formats.push(vk::SurfaceFormatKHR::default());
        assert!(s.is_adequate());
    }
}
