// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// Zoom never goes below the fitted (whole image visible) size.
pub const MIN_ZOOM: f32 = 1.0;
pub const DEFAULT_ZOOM_STEP: f32 = 1.25;

/// Per-frame uniform block, `layout(set = 0, binding = 0)` in the vertex
/// shader. Scale is viewport pixels per image pixel, offset is in viewport
/// pixels (image centre relative to viewport centre, y down).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ViewUniform {
    pub scale_x: f32,
    pub scale_y: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

/// Push-constant block that lets the vertex shader turn pixel units into NDC.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ViewExtents {
    pub viewport: [f32; 2],
    pub image: [f32; 2],
}

/// Pan/zoom state of the displayed image.
///
/// All coordinates are viewport pixels with the origin at the top-left and y
/// pointing down. `offset` is where the image centre sits relative to the
/// viewport centre.
#[derive(Clone, Debug)]
pub struct ViewTransform {
    image: Vec2,
    viewport: Vec2,
    fit: f32,
    zoom: Vec2,
    offset: Vec2,
    zoom_step: f32,
}

fn valid_step(step: f32) -> f32 {
    if step.is_finite() && step > 1.0 {
        step
    } else {
        DEFAULT_ZOOM_STEP
    }
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::new(DEFAULT_ZOOM_STEP)
    }
}

impl ViewTransform {
    /// `zoom_step` must be greater than 1; anything else falls back to
    /// [`DEFAULT_ZOOM_STEP`].
    pub fn new(zoom_step: f32) -> Self {
        let zoom_step = valid_step(zoom_step);
        let mut v = Self {
            image: Vec2::ONE,
            viewport: Vec2::ONE,
            fit: 1.0,
            zoom: Vec2::splat(MIN_ZOOM),
            offset: Vec2::ZERO,
            zoom_step,
        };
        v.initialize_scaling(1, 1, 1, 1);
        v
    }

    /// Fit the image into the viewport preserving its aspect ratio and centre it.
    pub fn initialize_scaling(
        &mut self,
        image_width: u32,
        image_height: u32,
        viewport_width: u32,
        viewport_height: u32,
    ) {
        self.image = Vec2::new(image_width.max(1) as f32, image_height.max(1) as f32);
        self.viewport = Vec2::new(viewport_width.max(1) as f32, viewport_height.max(1) as f32);
        let ratio = self.viewport / self.image;
        self.fit = ratio.x.min(ratio.y);
        self.zoom = Vec2::splat(MIN_ZOOM);
        self.offset = Vec2::ZERO;
    }

    /// Refit the current image to a new viewport size.
    pub fn resize_viewport(&mut self, width: u32, height: u32) {
        let (iw, ih) = self.image_size();
        self.initialize_scaling(iw, ih, width, height);
    }

    /// Move the image by a pointer delta in viewport pixels.
    pub fn image_pan(&mut self, dy: f32, dx: f32) {
        self.offset += Vec2::new(dx, dy);
        self.clamp_offset();
    }

    /// Zoom one step in or out keeping the image point under the cursor fixed.
    pub fn on_zoom_to_pixel(&mut self, cursor_x: f32, cursor_y: f32, zoom_in: bool) {
        let cursor = Vec2::new(cursor_x, cursor_y) - self.viewport * 0.5;

        // normalize against the current geometry
        let norm = (cursor - self.offset) / self.displayed_size();

        // rescale
        let zoom = if zoom_in {
            self.zoom * self.zoom_step
        } else {
            self.zoom / self.zoom_step
        };
        self.zoom = zoom.max(Vec2::splat(MIN_ZOOM));

        // re-offset so `norm` lands back under the cursor
        self.offset = cursor - norm * self.displayed_size();
        self.clamp_offset();
    }

    fn clamp_offset(&mut self) {
        let limit = self.pan_limit();
        self.offset = self.offset.clamp(-limit, limit);
    }

    /// Largest offset allowed on each axis. An axis on which the image is
    /// smaller than the viewport is pinned to the centre; a larger axis pans
    /// until the image edge meets the viewport edge.
    pub fn pan_limit(&self) -> Vec2 {
        ((self.displayed_size() - self.viewport) * 0.5).max(Vec2::ZERO)
    }

    pub fn scale(&self) -> Vec2 {
        self.zoom * self.fit
    }

    pub fn zoom(&self) -> Vec2 {
        self.zoom
    }

    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    pub fn zoom_step(&self) -> f32 {
        self.zoom_step
    }

    /// Same validation as [`ViewTransform::new`]; the current zoom is kept.
    pub fn set_zoom_step(&mut self, zoom_step: f32) {
        self.zoom_step = valid_step(zoom_step);
    }

    /// Offset as a fraction of the displayed image size.
    pub fn normalized_offset(&self) -> Vec2 {
        self.offset / self.displayed_size()
    }

    /// Size of the image on screen, in viewport pixels.
    pub fn displayed_size(&self) -> Vec2 {
        self.image * self.scale()
    }

    pub fn image_size(&self) -> (u32, u32) {
        (self.image.x as u32, self.image.y as u32)
    }

    pub fn viewport_size(&self) -> (u32, u32) {
        (self.viewport.x as u32, self.viewport.y as u32)
    }

    /// Image rectangle on screen as `(top_left, bottom_right)`.
    pub fn screen_rect(&self) -> (Vec2, Vec2) {
        let centre = self.viewport * 0.5 + self.offset;
        let half = self.displayed_size() * 0.5;
        (centre - half, centre + half)
    }

    pub fn uniform(&self) -> ViewUniform {
        let scale = self.scale();
        ViewUniform {
            scale_x: scale.x,
            scale_y: scale.y,
            offset_x: self.offset.x,
            offset_y: self.offset.y,
        }
    }

    pub fn extents(&self) -> ViewExtents {
        ViewExtents {
            viewport: self.viewport.to_array(),
            image: self.image.to_array(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-3;

    fn close(a: Vec2, b: Vec2) -> bool {
        (a - b).abs().max_element() < EPS
    }

    fn viewer(iw: u32, ih: u32, vw: u32, vh: u32) -> ViewTransform {
        let mut v = ViewTransform::default();
        v.initialize_scaling(iw, ih, vw, vh);
        v
    }

    struct Lcg(u64);
    impl Lcg {
        fn next_f32(&mut self) -> f32 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((self.0 >> 40) as f32) / ((1u64 << 24) as f32)
        }
        fn range(&mut self, lo: f32, hi: f32) -> f32 {
            lo + (hi - lo) * self.next_f32()
        }
    }

    #[test]
    fn small_image_fits_uniformly_and_centred() {
        let v = viewer(4, 4, 800, 600);
        let u = v.uniform();
        assert_eq!(u.scale_x, u.scale_y);
        assert_eq!(u.scale_x, 150.0);
        assert_eq!((u.offset_x, u.offset_y), (0.0, 0.0));
        assert!(close(v.displayed_size(), Vec2::new(600.0, 600.0)));
    }

    #[test]
    fn wide_image_fits_width() {
        let v = viewer(1600, 400, 800, 600);
        assert!(close(v.displayed_size(), Vec2::new(800.0, 200.0)));
        assert_eq!(v.pan_limit(), Vec2::ZERO);
    }

    #[test]
    fn zoom_never_below_minimum() {
        let mut v = viewer(640, 480, 800, 600);
        for _ in 0..50 {
            v.on_zoom_to_pixel(123.0, 456.0, false);
            assert!(v.zoom().x >= MIN_ZOOM && v.zoom().y >= MIN_ZOOM);
        }
        assert_eq!(v.zoom(), Vec2::splat(MIN_ZOOM));
        assert_eq!(v.offset(), Vec2::ZERO);
    }

    #[test]
    fn fitted_image_cannot_be_panned() {
        let mut v = viewer(1600, 1200, 800, 600);
        v.image_pan(300.0, -250.0);
        assert_eq!(v.offset(), Vec2::ZERO);
    }

    #[test]
    fn pan_stops_at_image_edge() {
        let mut v = viewer(1600, 1200, 800, 600);
        v.on_zoom_to_pixel(400.0, 300.0, true);
        v.on_zoom_to_pixel(400.0, 300.0, true);
        let limit = v.pan_limit();
        assert!(limit.x > 0.0 && limit.y > 0.0);

        v.image_pan(10_000.0, 10_000.0);
        assert!(close(v.offset(), limit));
        let (tl, _) = v.screen_rect();
        assert!(tl.x.abs() < EPS && tl.y.abs() < EPS);

        v.image_pan(-20_000.0, -20_000.0);
        assert!(close(v.offset(), -limit));
    }

    #[test]
    fn pans_never_leave_image_out_of_view() {
        let mut rng = Lcg(7);
        let mut v = viewer(1024, 768, 800, 600);
        for i in 0..500 {
            if i % 7 == 0 {
                let zoom_in = rng.next_f32() > 0.3;
                v.on_zoom_to_pixel(rng.range(0.0, 800.0), rng.range(0.0, 600.0), zoom_in);
            }
            v.image_pan(rng.range(-900.0, 900.0), rng.range(-900.0, 900.0));

            let limit = v.pan_limit();
            assert!(v.offset().abs().cmple(limit + EPS).all());

            // the image always overlaps the viewport
            let (tl, br) = v.screen_rect();
            assert!(tl.x < 800.0 && tl.y < 600.0 && br.x > 0.0 && br.y > 0.0);
        }
    }

    #[test]
    fn zoom_in_then_out_restores_fitted_state() {
        let mut v = viewer(1600, 1200, 800, 600);
        let before = v.uniform();
        v.on_zoom_to_pixel(600.0, 200.0, true);
        assert!(v.zoom().x > MIN_ZOOM);
        v.on_zoom_to_pixel(600.0, 200.0, false);
        let after = v.uniform();
        assert!((before.scale_x - after.scale_x).abs() < EPS);
        assert!((before.scale_y - after.scale_y).abs() < EPS);
        assert!((before.offset_x - after.offset_x).abs() < EPS);
        assert!((before.offset_y - after.offset_y).abs() < EPS);
    }

    #[test]
    fn zoom_in_then_out_restores_panned_state() {
        let mut v = viewer(2000, 1500, 800, 600);
        for _ in 0..4 {
            v.on_zoom_to_pixel(400.0, 300.0, true);
        }
        v.image_pan(-35.0, 80.0);
        let (scale, offset) = (v.scale(), v.offset());

        v.on_zoom_to_pixel(250.0, 410.0, true);
        v.on_zoom_to_pixel(250.0, 410.0, false);
        assert!(close(v.scale(), scale));
        assert!(close(v.offset(), offset));
    }

    #[test]
    fn zoom_keeps_point_under_cursor() {
        let mut v = viewer(2000, 1500, 800, 600);
        v.on_zoom_to_pixel(400.0, 300.0, true);
        v.on_zoom_to_pixel(400.0, 300.0, true);

        let cursor = Vec2::new(500.0, 250.0);
        let image_point = |v: &ViewTransform| {
            let (tl, _) = v.screen_rect();
            (cursor - tl) / v.scale()
        };
        let before = image_point(&v);
        v.on_zoom_to_pixel(cursor.x, cursor.y, true);
        assert!(close(image_point(&v), before));
    }

    #[test]
    fn resize_resets_zoom_and_offset() {
        let mut v = viewer(2000, 1500, 800, 600);
        v.on_zoom_to_pixel(100.0, 100.0, true);
        v.image_pan(20.0, 20.0);
        v.resize_viewport(400, 300);
        assert_eq!(v.zoom(), Vec2::splat(MIN_ZOOM));
        assert_eq!(v.offset(), Vec2::ZERO);
        assert_eq!(v.viewport_size(), (400, 300));
        assert_eq!(v.image_size(), (2000, 1500));
        assert!(close(v.displayed_size(), Vec2::new(400.0, 300.0)));
    }

    #[test]
    fn bad_zoom_step_falls_back_to_default() {
        assert_eq!(ViewTransform::new(0.5).zoom_step(), DEFAULT_ZOOM_STEP);
        assert_eq!(ViewTransform::new(f32::NAN).zoom_step(), DEFAULT_ZOOM_STEP);
        assert_eq!(ViewTransform::new(2.0).zoom_step(), 2.0);

        let mut v = ViewTransform::new(2.0);
        v.set_zoom_step(1.0);
        assert_eq!(v.zoom_step(), DEFAULT_ZOOM_STEP);
    }

    #[test]
    fn uniform_blocks_match_shader_layout() {
        assert_eq!(std::mem::size_of::<ViewUniform>(), 16);
        assert_eq!(std::mem::size_of::<ViewExtents>(), 16);
        let u = ViewUniform {
            scale_x: 1.0,
            scale_y: 2.0,
            offset_x: 3.0,
            offset_y: 4.0,
        };
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&u));
        assert_eq!(floats, &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn normalized_offset_tracks_pixel_offset() {
        let mut v = viewer(2000, 1000, 800, 400);
        v.on_zoom_to_pixel(400.0, 200.0, true);
        v.image_pan(0.0, 50.0);
        let n = v.normalized_offset();
        assert!((n.x - 50.0 / v.displayed_size().x).abs() < 1e-5);
        assert_eq!(n.y, 0.0);
    }
}
