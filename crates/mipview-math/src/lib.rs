// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Backend-neutral math for the viewer: the pan/zoom view transform and
//! mip-chain sizing.

mod mip;
mod view;

pub use glam::Vec2;
pub use mip::{mip_blits, mip_extents, mip_level_count, MipBlit};
pub use view::{ViewExtents, ViewTransform, ViewUniform, DEFAULT_ZOOM_STEP, MIN_ZOOM};
