// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use mipview_render::ImageData;
use std::path::Path;
use tracing::info;

/// Decode any supported format and convert it to tightly packed RGBA8.
pub fn load_rgba(path: &Path) -> Result<ImageData> {
    let decoded = image::open(path).with_context(|| format!("decode {}", path.display()))?;
    let rgba = decoded.into_rgba8();
    let (width, height) = rgba.dimensions();
    info!("image: {} ({width}x{height})", path.display());
    ImageData::new(width, height, rgba.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn rgb_png_is_expanded_to_rgba() {
        let path = std::env::temp_dir().join(format!("mipview-decode-{}.png", std::process::id()));
        RgbImage::from_pixel(3, 2, Rgb([10, 20, 30])).save(&path).unwrap();
        let data = load_rgba(&path);
        std::fs::remove_file(&path).ok();

        let data = data.unwrap();
        assert_eq!((data.width, data.height), (3, 2));
        assert_eq!(data.rgba.len(), 3 * 2 * 4);
        assert_eq!(&data.rgba[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_rgba(Path::new("/nonexistent/picture.png")).unwrap_err();
        assert!(format!("{err:#}").contains("picture.png"));
    }
}
