// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;
mod decode;

use anyhow::{Context, Result};
use clap::Parser;
use config::AppCfg;
use mipview_core::{init_tracing, report_fatal};
use mipview_platform::{PointerTracker, ViewIntent};
use mipview_render::{RenderSize, Renderer};
use mipview_render_vk::{VkError, VkRenderer};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info};

use mipview_platform::winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Pan/zoom image viewer", long_about = None)]
struct Args {
    /// Image to open at startup; more can be dropped onto the window.
    image: Option<PathBuf>,

    /// Configuration file
    #[arg(long, default_value = "mipview.toml")]
    config: PathBuf,
}

struct App {
    cfg: AppCfg,
    initial_image: Option<PathBuf>,
    // Renderer before window: it must be gone before the surface's window.
    renderer: Option<VkRenderer>,
    window: Option<Window>,
    render_size: RenderSize,
    pointer: PointerTracker,

    paused: bool,
    exiting: bool,
    frames: u32,
    last_fps_instant: Instant,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(cfg: AppCfg, initial_image: Option<PathBuf>) -> Self {
        App {
            cfg,
            initial_image,
            renderer: None,
            window: None,
            render_size: RenderSize {
                width: 1,
                height: 1,
            },
            pointer: PointerTracker::new(),
            paused: false,
            exiting: false,
            frames: 0,
            last_fps_instant: Instant::now(),
            fatal: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = event_loop
            .create_window(
                Window::default_attributes()
                    .with_title("mipview")
                    .with_inner_size(LogicalSize::new(1024.0, 768.0)),
            )
            .context("create window")?;

        let size = window.inner_size();
        self.render_size = RenderSize {
            width: size.width,
            height: size.height,
        };
        self.paused = self.render_size.is_zero_area();

        let mut renderer = VkRenderer::new(&window, &window, self.render_size)
            .context("initialize Vulkan renderer")?;
        renderer.set_clear_color(self.cfg.render.clear_color);
        renderer.set_vsync_mode(self.cfg.render.vsync_mode.into());
        renderer.view_mut().set_zoom_step(self.cfg.view.zoom_step);

        self.window = Some(window);
        self.renderer = Some(renderer);

        if let Some(path) = self.initial_image.take() {
            self.open_image(&path);
        }
        Ok(())
    }

    /// Decode failures and images the GPU cannot hold are logged and leave
    /// the current image in place. Other upload failures are fatal.
    fn open_image(&mut self, path: &Path) {
        let data = match decode::load_rgba(path) {
            Ok(data) => data,
            Err(e) => {
                error!("cannot open image: {e:#}");
                return;
            }
        };
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        if let Err(e) = renderer.load_image(&data) {
            if is_rejected_image(&e) {
                error!("cannot show {}: {e:#}", path.display());
            } else {
                self.fatal = Some(e.context(format!("load {}", path.display())));
            }
            return;
        }
        if let Some(w) = &self.window {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            w.set_title(&format!("mipview - {name}"));
            w.request_redraw();
        }
    }

    fn apply(&mut self, intent: ViewIntent) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let view = renderer.view_mut();
        match intent {
            ViewIntent::Pan { dx, dy } => view.image_pan(dy, dx),
            ViewIntent::Zoom { x, y, zoom_in } => view.on_zoom_to_pixel(x, y, zoom_in),
        }
        debug!(scale = ?view.scale(), offset = ?view.offset(), "view");
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }
}

fn is_rejected_image(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| matches!(cause.downcast_ref::<VkError>(), Some(VkError::ImageTooLarge { .. })))
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                self.fatal = Some(e);
                self.shutdown(event_loop);
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Wait);
        info!("resumed → paused={}", self.paused);
        if !self.paused {
            if let Some(w) = &self.window {
                w.request_redraw();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        if let Some(intent) = self.pointer.handle(&event) {
            self.apply(intent);
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                self.render_size = RenderSize {
                    width: new_size.width,
                    height: new_size.height,
                };
                let now_paused = self.render_size.is_zero_area();
                if self.paused != now_paused {
                    self.paused = now_paused;
                    info!(
                        "Resized → {}x{} (paused={})",
                        self.render_size.width, self.render_size.height, self.paused
                    );
                }
                if let Some(r) = &mut self.renderer {
                    if let Err(e) = r.resize(self.render_size) {
                        error!("resize failed: {e:#}");
                    }
                }
                if !self.paused {
                    if let Some(w) = &self.window {
                        w.request_redraw();
                    }
                }
            }

            WindowEvent::DroppedFile(path) => {
                info!("DroppedFile {}", path.display());
                self.open_image(&path);
            }

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };
                match renderer.render() {
                    Ok(()) => {
                        self.frames = self.frames.saturating_add(1);
                        if renderer.take_redraw_request() {
                            if let Some(w) = &self.window {
                                w.request_redraw();
                            }
                        }
                    }
                    Err(e) => {
                        self.fatal = Some(e);
                    }
                }
            }

            _ => {}
        }

        if self.fatal.is_some() && !self.exiting {
            self.shutdown(event_loop);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.exiting || self.paused {
            return;
        }
        let now = Instant::now();
        let secs = now.duration_since(self.last_fps_instant).as_secs_f32();
        if secs >= 5.0 && self.frames > 0 {
            debug!("frames in last {secs:.1}s: {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = config::load(&args.config);

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg, args.image);
    event_loop.run_app(&mut app)?;

    if let Some(err) = app.fatal.take() {
        report_fatal(&err);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_image_is_not_fatal() {
        let err = anyhow::Error::from(VkError::ImageTooLarge {
            width: 20000,
            height: 20000,
            max: 16384,
        })
        .context("upload texture");
        assert!(is_rejected_image(&err));
    }

    #[test]
    fn other_errors_stay_fatal() {
        let err = anyhow::Error::from(VkError::NoSuitableDevice).context("upload texture");
        assert!(!is_rejected_image(&err));
        assert!(!is_rejected_image(&anyhow::anyhow!("image is 20000x20000")));
    }
}
