// SPDX-License-Identifier: CEPL-1.0
use mipview_render_vk::VkVsyncMode;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VsyncMode {
    Fifo,
    #[default]
    Mailbox,
}

impl From<VsyncMode> for VkVsyncMode {
    fn from(mode: VsyncMode) -> Self {
        match mode {
            VsyncMode::Fifo => VkVsyncMode::Fifo,
            VsyncMode::Mailbox => VkVsyncMode::Mailbox,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub vsync_mode: VsyncMode,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            vsync_mode: VsyncMode::Mailbox,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ViewCfg {
    pub zoom_step: f32,
}

impl Default for ViewCfg {
    fn default() -> Self {
        ViewCfg {
            zoom_step: mipview_render::DEFAULT_ZOOM_STEP,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(default)]
pub struct AppCfg {
    pub render: RenderCfg,
    pub view: ViewCfg,
}

fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}

pub fn parse(text: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str(text)
}

/// Missing file means defaults; a malformed one is reported and ignored.
pub fn load(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(text) => match parse(&text) {
            Ok(cfg) => {
                info!("config: loaded {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("config: ignoring {}: {e}", path.display());
                AppCfg::default()
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("config: {} not found, using defaults", path.display());
            AppCfg::default()
        }
        Err(e) => {
            warn!("config: cannot read {}: {e}", path.display());
            AppCfg::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.render.vsync_mode, VsyncMode::Mailbox);
        assert_eq!(cfg.render.clear_color, default_clear());
        assert_eq!(cfg.view.zoom_step, 1.25);
    }

    #[test]
    fn full_file() {
        let cfg = parse(
            r#"
            [render]
            clear_color = [0.0, 0.0, 0.0, 1.0]
            vsync_mode = "fifo"

            [view]
            zoom_step = 1.5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.render.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(cfg.render.vsync_mode, VsyncMode::Fifo);
        assert_eq!(VkVsyncMode::from(cfg.render.vsync_mode), VkVsyncMode::Fifo);
        assert_eq!(cfg.view.zoom_step, 1.5);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse("[render]\nvsync_mode = \"fifo\"\n").unwrap();
        assert_eq!(cfg.render.clear_color, default_clear());
        assert_eq!(cfg.view.zoom_step, 1.25);
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(parse("[render]\nvsync_mode = \"sometimes\"\n").is_err());
        assert!(parse("[render]\nclear_color = [1.0, 2.0]\n").is_err());
        assert!(parse("[view\n").is_err());
    }

    #[test]
    fn missing_file_falls_back() {
        let cfg = load(Path::new("/nonexistent/mipview.toml"));
        assert_eq!(cfg.render.vsync_mode, VsyncMode::Mailbox);
    }
}
