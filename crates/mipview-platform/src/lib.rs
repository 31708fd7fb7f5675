// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Host-window glue: re-exports `winit` and turns raw pointer events into
//! pan/zoom intents for the view transform.

mod pointer;

pub use pointer::{PointerTracker, ViewIntent};
pub use winit;
