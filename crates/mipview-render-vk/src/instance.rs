// SPDX-License-Identifier: CEPL-1.0
use crate::error::{VkError, VkResult};
use ash::ext::debug_utils;
use ash::khr::surface;
use ash::{vk, Entry, Instance};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::CStr;
use tracing::{debug, error, info, warn};

/// Validation is a build-time decision: on in debug builds, off in release.
pub const ENABLE_VALIDATION: bool = cfg!(debug_assertions);

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const APP_NAME: &CStr = c"mipview";

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "{msg}");
    } else {
        debug!(target: "vulkan", "{msg}");
    }
    vk::FALSE
}

fn debug_messenger_info<'a>() -> vk::DebugUtilsMessengerCreateInfoEXT<'a> {
    vk::DebugUtilsMessengerCreateInfoEXT {
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    }
}

/// True when `wanted` is among `available` layer names.
pub(crate) fn has_layer(available: &[vk::LayerProperties], wanted: &CStr) -> bool {
    available
        .iter()
        .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == wanted))
}

/// Loader, instance, optional debug messenger and the window surface.
///
/// Fields are filled in step by step; `Drop` releases whatever was created,
/// so a failure halfway through `new` leaks nothing.
pub struct InstanceContext {
    pub entry: Entry,
    pub instance: Instance,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,
}

impl InstanceContext {
    pub unsafe fn new(display: RawDisplayHandle, window: RawWindowHandle) -> VkResult<Self> {
        let entry = Entry::load()?;
        let instance = create_instance(&entry, display)?;
        let surface_loader = surface::Instance::new(&entry, &instance);

        let mut ctx = InstanceContext {
            entry,
            instance,
            debug: None,
            surface_loader,
            surface: vk::SurfaceKHR::null(),
        };

        if ENABLE_VALIDATION {
            let loader = debug_utils::Instance::new(&ctx.entry, &ctx.instance);
            let messenger = loader.create_debug_utils_messenger(&debug_messenger_info(), None)?;
            ctx.debug = Some((loader, messenger));
        }

        ctx.surface = ash_window::create_surface(&ctx.entry, &ctx.instance, display, window, None)?;
        Ok(ctx)
    }
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        unsafe {
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
            }
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

unsafe fn create_instance(entry: &Entry, display: RawDisplayHandle) -> VkResult<Instance> {
    if ENABLE_VALIDATION {
        let layers = entry.enumerate_instance_layer_properties()?;
        if !has_layer(&layers, VALIDATION_LAYER) {
            return Err(VkError::ValidationLayerMissing(
                VALIDATION_LAYER.to_string_lossy().into_owned(),
            ));
        }
    }

    let app_info = vk::ApplicationInfo {
        p_application_name: APP_NAME.as_ptr(),
        application_version: 0,
        p_engine_name: APP_NAME.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut extensions = ash_window::enumerate_required_extensions(display)?.to_vec();
    if ENABLE_VALIDATION {
        extensions.push(debug_utils::NAME.as_ptr());
    }
    let layers = [VALIDATION_LAYER.as_ptr()];

    // Chained so instance creation/destruction itself is covered by validation.
    let debug_info = debug_messenger_info();

    let mut create_info = vk::InstanceCreateInfo {
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        ..Default::default()
    };
    if ENABLE_VALIDATION {
        create_info.enabled_layer_count = layers.len() as u32;
        create_info.pp_enabled_layer_names = layers.as_ptr();
        create_info.p_next = (&debug_info as *const vk::DebugUtilsMessengerCreateInfoEXT)
            .cast::<std::ffi::c_void>();
    }

    let instance = entry.create_instance(&create_info, None)?;
    info!(
        "vk: instance ready ({} extensions, validation={})",
        extensions.len(),
        ENABLE_VALIDATION
    );
    Ok(instance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(name: &str) -> vk::LayerProperties {
        let mut props = vk::LayerProperties::default();
        for (dst, src) in props.layer_name.iter_mut().zip(name.bytes()) {
            *dst = src as std::ffi::c_char;
        }
        props
    }

    #[test]
    fn finds_validation_layer_by_name() {
        let layers = [layer("VK_LAYER_MESA_device_select"), layer("VK_LAYER_KHRONOS_validation")];
        assert!(has_layer(&layers, VALIDATION_LAYER));
        assert!(!has_layer(&layers[..1], VALIDATION_LAYER));
        assert!(!has_layer(&[], VALIDATION_LAYER));
    }
}
