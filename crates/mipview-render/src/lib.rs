// SPDX-License-Identifier: CEPL-1.0
use anyhow::{ensure, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub use mipview_math::{ViewTransform, ViewUniform, DEFAULT_ZOOM_STEP};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_zero_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Decoded picture ready for upload: tightly packed RGBA8 rows, top row first.
#[derive(Clone, Debug)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self> {
        ensure!(width > 0 && height > 0, "image has zero area ({width}x{height})");
        let expected = width as usize * height as usize * 4;
        ensure!(
            rgba.len() == expected,
            "pixel buffer is {} bytes, expected {expected} for {width}x{height} RGBA8",
            rgba.len()
        );
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// 1x1 opaque pixel shown until a real image is opened.
    pub fn placeholder(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: rgba.to_vec(),
        }
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Mark the presentation surface stale; the swapchain is rebuilt before
    /// the next frame that can render.
    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn render(&mut self) -> Result<()>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);

    /// Replace the displayed image and reset the view.
    fn load_image(&mut self, image: &ImageData) -> Result<()>;
    fn view_mut(&mut self) -> &mut ViewTransform;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_data_checks_buffer_length() {
        assert!(ImageData::new(2, 2, vec![0; 16]).is_ok());
        assert!(ImageData::new(2, 2, vec![0; 15]).is_err());
        assert!(ImageData::new(0, 2, Vec::new()).is_err());
    }

    #[test]
    fn zero_area_sizes() {
        assert!(RenderSize { width: 0, height: 10 }.is_zero_area());
        assert!(!RenderSize { width: 1, height: 1 }.is_zero_area());
    }
}
