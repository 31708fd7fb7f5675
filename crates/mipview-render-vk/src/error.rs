// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions of the Vulkan backend. Presentation results that only
/// require a swapchain rebuild are not errors; see `frame::SwapchainStatus`.
#[derive(Error, Debug)]
pub enum VkError {
    #[error("failed to load the Vulkan loader: {0}")]
    Loader(#[from] ash::LoadingError),

    #[error("validation layers requested but not available: {0}")]
    ValidationLayerMissing(String),

    #[error("no GPU with graphics + present queues, swapchain support and required extensions")]
    NoSuitableDevice,

    #[error("device is missing required extensions: {0}")]
    MissingExtensions(String),

    #[error("no memory type matches filter 0x{type_filter:x} with {flags:?}")]
    NoMemoryType {
        type_filter: u32,
        flags: vk::MemoryPropertyFlags,
    },

    #[error("cannot read shader {path}: {source}")]
    ShaderRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("shader {path} is not valid SPIR-V: {source}")]
    ShaderParse {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("image is {width}x{height}, the GPU allows at most {max}x{max}")]
    ImageTooLarge { width: u32, height: u32, max: u32 },

    #[error("swapchain returned image {index} but has {count} framebuffers")]
    ImageIndexOutOfRange { index: u32, count: usize },

    #[error("texture format {0:?} does not support linear blitting")]
    LinearBlitUnsupported(vk::Format),

    #[error("Vulkan call failed: {0}")]
    Vk(#[from] vk::Result),
}

pub type VkResult<T> = std::result::Result<T, VkError>;
