// SPDX-License-Identifier: CEPL-1.0
use crate::error::{VkError, VkResult};
use crate::instance::InstanceContext;
use crate::swapchain::query_swapchain_support;
use ash::khr::swapchain;
use ash::{vk, Instance};
use std::ffi::{c_char, CStr};
use tracing::{debug, info};

pub const DEVICE_EXTENSIONS: [&CStr; 1] = [swapchain::NAME];

/// Queue families found while scanning a device; either may still be missing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Prefer one family that does both; otherwise take the first graphics
    /// family and the first present-capable family separately.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> bool,
    ) -> Self {
        let mut found = Self::default();
        for (i, family) in families.iter().enumerate() {
            let i = i as u32;
            let graphics =
                family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let present = supports_present(i);
            if graphics && present {
                return Self {
                    graphics: Some(i),
                    present: Some(i),
                };
            }
            if graphics && found.graphics.is_none() {
                found.graphics = Some(i);
            }
            if present && found.present.is_none() {
                found.present = Some(i);
            }
        }
        found
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    pub fn resolve(self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

/// Resolved queue families of the selected device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Names from `required` that `available` does not list.
pub fn missing_extensions(available: &[vk::ExtensionProperties], required: &[&CStr]) -> Vec<String> {
    required
        .iter()
        .filter(|want| {
            !available
                .iter()
                .any(|e| e.extension_name_as_c_str().is_ok_and(|n| n == **want))
        })
        .map(|want| want.to_string_lossy().into_owned())
        .collect()
}

/// Selected GPU, logical device and its queues. Owns the instance context so
/// the device is always destroyed before the surface and instance.
pub struct DeviceContext {
    pub phys: vk::PhysicalDevice,
    pub device: ash::Device,
    pub families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub memory_props: vk::PhysicalDeviceMemoryProperties,
    pub max_anisotropy: Option<f32>,
    /// Largest width or height a 2D image may have on this GPU.
    pub max_image_dimension: u32,
    pub inst: InstanceContext,
}

impl DeviceContext {
    pub unsafe fn new(inst: InstanceContext) -> VkResult<Self> {
        let (phys, families) = pick_physical_device(&inst)?;
        let (device, max_anisotropy) = create_logical_device(&inst.instance, phys, families)?;
        let graphics_queue = device.get_device_queue(families.graphics, 0);
        let present_queue = device.get_device_queue(families.present, 0);
        let memory_props = inst.instance.get_physical_device_memory_properties(phys);
        let max_image_dimension = inst
            .instance
            .get_physical_device_properties(phys)
            .limits
            .max_image_dimension2_d;

        Ok(Self {
            phys,
            device,
            families,
            graphics_queue,
            present_queue,
            memory_props,
            max_anisotropy,
            max_image_dimension,
            inst,
        })
    }

    pub fn instance(&self) -> &Instance {
        &self.inst.instance
    }

    pub unsafe fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        self.inst
            .instance
            .get_physical_device_format_properties(self.phys, format)
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_device(None);
        }
    }
}

enum Rejection {
    QueueFamilies,
    Extensions(Vec<String>),
    Swapchain,
}

unsafe fn check_device(
    inst: &InstanceContext,
    phys: vk::PhysicalDevice,
) -> VkResult<Result<QueueFamilies, Rejection>> {
    let props = inst
        .instance
        .get_physical_device_queue_family_properties(phys);
    let indices = QueueFamilyIndices::find(&props, |i| {
        inst.surface_loader
            .get_physical_device_surface_support(phys, i, inst.surface)
            .unwrap_or(false)
    });
    let Some(families) = indices.resolve() else {
        return Ok(Err(Rejection::QueueFamilies));
    };

    let available = inst.instance.enumerate_device_extension_properties(phys)?;
    let missing = missing_extensions(&available, &DEVICE_EXTENSIONS);
    if !missing.is_empty() {
        return Ok(Err(Rejection::Extensions(missing)));
    }

    // Only meaningful once the swapchain extension is known to exist.
    let support = query_swapchain_support(&inst.surface_loader, phys, inst.surface)?;
    if !support.is_adequate() {
        return Ok(Err(Rejection::Swapchain));
    }
    Ok(Ok(families))
}

/// First device with complete queue families, the required extensions and
/// at least one surface format and present mode.
unsafe fn pick_physical_device(inst: &InstanceContext) -> VkResult<(vk::PhysicalDevice, QueueFamilies)> {
    let mut missing_exts = None;
    for phys in inst.instance.enumerate_physical_devices()? {
        let props = inst.instance.get_physical_device_properties(phys);
        let name = props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match check_device(inst, phys)? {
            Ok(families) => {
                info!(
                    "vk: using {name} (graphics family {}, present family {})",
                    families.graphics, families.present
                );
                return Ok((phys, families));
            }
            Err(Rejection::QueueFamilies) => debug!("vk: {name}: no graphics/present queue"),
            Err(Rejection::Swapchain) => debug!("vk: {name}: surface has no formats/present modes"),
            Err(Rejection::Extensions(missing)) => {
                debug!("vk: {name}: missing {}", missing.join(", "));
                missing_exts = Some(missing);
            }
        }
    }
    Err(match missing_exts {
        Some(missing) => VkError::MissingExtensions(missing.join(", ")),
        None => VkError::NoSuitableDevice,
    })
}

unsafe fn create_logical_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    families: QueueFamilies,
) -> VkResult<(ash::Device, Option<f32>)> {
    let priorities = [1.0_f32];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
        .unique()
        .into_iter()
        .map(|family| vk::DeviceQueueCreateInfo {
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        })
        .collect();

    let supported = instance.get_physical_device_features(phys);
    let anisotropy = supported.sampler_anisotropy == vk::TRUE;
    let features = vk::PhysicalDeviceFeatures {
        sampler_anisotropy: supported.sampler_anisotropy,
        ..Default::default()
    };

    let extensions: Vec<*const c_char> = DEVICE_EXTENSIONS.iter().map(|e| e.as_ptr()).collect();
    let info = vk::DeviceCreateInfo {
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        p_enabled_features: &features,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        ..Default::default()
    };
    let device = instance.create_device(phys, &info, None)?;

    let max_anisotropy = anisotropy.then(|| {
        instance
            .get_physical_device_properties(phys)
            .limits
            .max_sampler_anisotropy
    });
    info!(
        "vk: logical device ready ({} queue(s), anisotropy={:?})",
        queue_infos.len(),
        max_anisotropy
    );
    Ok((device, max_anisotropy))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn ext(name: &str) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (dst, src) in props.extension_name.iter_mut().zip(name.bytes()) {
            *dst = src as c_char;
        }
        props
    }

    #[test]
    fn shared_family_preferred() {
        let fams = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let idx = QueueFamilyIndices::find(&fams, |i| i != 1);
        let resolved = idx.resolve().unwrap();
        assert_eq!(resolved, QueueFamilies { graphics: 2, present: 2 });
        assert!(resolved.is_shared());
        assert_eq!(resolved.unique(), vec![2]);
    }

    #[test]
    fn separate_families_when_none_does_both() {
        let fams = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];
        let idx = QueueFamilyIndices::find(&fams, |i| i == 1);
        let resolved = idx.resolve().unwrap();
        assert_eq!(resolved.graphics, 0);
        assert_eq!(resolved.present, 1);
        assert_eq!(resolved.unique(), vec![0, 1]);
    }

    #[test]
    fn incomplete_without_present() {
        let fams = [family(vk::QueueFlags::GRAPHICS)];
        let idx = QueueFamilyIndices::find(&fams, |_| false);
        assert!(!idx.is_complete());
        assert_eq!(idx.resolve(), None);
    }

    #[test]
    fn empty_graphics_family_is_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let fams = [empty, family(vk::QueueFlags::GRAPHICS)];
        let idx = QueueFamilyIndices::find(&fams, |_| true);
        assert_eq!(idx.graphics, Some(1));
    }

    #[test]
    fn reports_missing_swapchain_extension() {
        let available = [ext("VK_KHR_maintenance1")];
        assert_eq!(
            missing_extensions(&available, &DEVICE_EXTENSIONS),
            vec!["VK_KHR_swapchain".to_string()]
        );
        let available = [ext("VK_KHR_maintenance1"), ext("VK_KHR_swapchain")];
        assert!(missing_extensions(&available, &DEVICE_EXTENSIONS).is_empty());
    }
}
