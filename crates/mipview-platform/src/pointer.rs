// SPDX-License-Identifier: CEPL-1.0
use glam::Vec2;
use tracing::trace;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

/// What a pointer event asks the view to do.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ViewIntent {
    /// Drag delta in viewport pixels.
    Pan { dx: f32, dy: f32 },
    /// One zoom step around the cursor position.
    Zoom { x: f32, y: f32, zoom_in: bool },
}

/// Press begins a pan, movement while pressed pans, the wheel zooms around
/// the last known cursor position.
#[derive(Debug, Default)]
pub struct PointerTracker {
    position: Vec2,
    panning: bool,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_panning(&self) -> bool {
        self.panning
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Feed one window event; returns an intent when the event maps to one.
    pub fn handle(&mut self, event: &WindowEvent) -> Option<ViewIntent> {
        match event {
            WindowEvent::MouseInput { state, button, .. } => {
                self.on_button(*button, *state);
                None
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.on_cursor_moved(position.x as f32, position.y as f32)
            }
            WindowEvent::CursorLeft { .. } => {
                self.panning = false;
                None
            }
            WindowEvent::MouseWheel { delta, .. } => self.on_wheel(*delta),
            WindowEvent::Focused(false) => {
                self.panning = false;
                None
            }
            _ => None,
        }
    }

    pub fn on_button(&mut self, button: MouseButton, state: ElementState) {
        if button != MouseButton::Left {
            return;
        }
        self.panning = state == ElementState::Pressed;
        trace!(panning = self.panning, "pointer button");
    }

    pub fn on_cursor_moved(&mut self, x: f32, y: f32) -> Option<ViewIntent> {
        let now = Vec2::new(x, y);
        let delta = now - self.position;
        self.position = now;
        if self.panning && delta != Vec2::ZERO {
            Some(ViewIntent::Pan {
                dx: delta.x,
                dy: delta.y,
            })
        } else {
            None
        }
    }

    pub fn on_wheel(&mut self, delta: MouseScrollDelta) -> Option<ViewIntent> {
        let amount = match delta {
            MouseScrollDelta::LineDelta(_, y) => y,
            MouseScrollDelta::PixelDelta(p) => p.y as f32,
        };
        if amount == 0.0 {
            return None;
        }
        Some(ViewIntent::Zoom {
            x: self.position.x,
            y: self.position.y,
            zoom_in: amount > 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalPosition;

    #[test]
    fn move_without_press_does_not_pan() {
        let mut p = PointerTracker::new();
        assert_eq!(p.on_cursor_moved(10.0, 10.0), None);
        assert_eq!(p.on_cursor_moved(20.0, 15.0), None);
    }

    #[test]
    fn drag_reports_deltas_until_release() {
        let mut p = PointerTracker::new();
        p.on_cursor_moved(100.0, 100.0);
        p.on_button(MouseButton::Left, ElementState::Pressed);
        assert_eq!(
            p.on_cursor_moved(110.0, 95.0),
            Some(ViewIntent::Pan { dx: 10.0, dy: -5.0 })
        );
        p.on_button(MouseButton::Left, ElementState::Released);
        assert_eq!(p.on_cursor_moved(130.0, 90.0), None);
    }

    #[test]
    fn other_buttons_do_not_start_a_pan() {
        let mut p = PointerTracker::new();
        p.on_button(MouseButton::Right, ElementState::Pressed);
        assert!(!p.is_panning());
    }

    #[test]
    fn wheel_zooms_at_cursor() {
        let mut p = PointerTracker::new();
        p.on_cursor_moved(320.0, 240.0);
        assert_eq!(
            p.on_wheel(MouseScrollDelta::LineDelta(0.0, 1.0)),
            Some(ViewIntent::Zoom {
                x: 320.0,
                y: 240.0,
                zoom_in: true
            })
        );
        assert_eq!(
            p.on_wheel(MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, -12.0))),
            Some(ViewIntent::Zoom {
                x: 320.0,
                y: 240.0,
                zoom_in: false
            })
        );
        assert_eq!(p.on_wheel(MouseScrollDelta::LineDelta(1.0, 0.0)), None);
    }
}
