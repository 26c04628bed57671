// SPDX-License-Identifier: CEPL-1.0
//! Plain snapshots of what the host reports. Everything here is rebuilt from
//! fresh driver queries on every negotiation; nothing is cached.
use std::ffi::{CStr, CString};

use ash::vk;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerInfo {
    pub name: CString,
    pub spec_version: u32,
    pub implementation_version: u32,
}

impl LayerInfo {
    /// `None` when the driver hands back a name without a terminating NUL.
    pub fn from_properties(props: &vk::LayerProperties) -> Option<Self> {
        Some(Self {
            name: props.layer_name_as_c_str().ok()?.to_owned(),
            spec_version: props.spec_version,
            implementation_version: props.implementation_version,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionInfo {
    pub name: CString,
    pub spec_version: u32,
}

impl ExtensionInfo {
    pub fn new(name: &CStr, spec_version: u32) -> Self {
        Self {
            name: name.to_owned(),
            spec_version,
        }
    }

    pub fn from_properties(props: &vk::ExtensionProperties) -> Option<Self> {
        Some(Self::new(
            props.extension_name_as_c_str().ok()?,
            props.spec_version,
        ))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub index: u32,
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
    /// Can present to the surface the candidate was queried against.
    pub supports_present: bool,
}

impl QueueFamilyInfo {
    pub fn supports_graphics(&self) -> bool {
        self.flags.contains(vk::QueueFlags::GRAPHICS)
    }
}

/// One physical device as seen during selection.
#[derive(Clone, Debug)]
pub struct DeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub max_image_dimension_2d: u32,
    pub geometry_shader: bool,
    pub queue_families: Vec<QueueFamilyInfo>,
    pub extensions: Vec<ExtensionInfo>,
}

impl DeviceCandidate {
    pub fn has_extension(&self, name: &CStr) -> bool {
        self.extensions.iter().any(|e| e.name.as_c_str() == name)
    }
}

/// Hard requirements a device must meet to be scored at all.
#[derive(Clone, Debug)]
pub struct DeviceRequirements {
    pub min_api_version: u32,
    pub geometry_shader: bool,
    pub extensions: Vec<CString>,
}

impl DeviceRequirements {
    pub fn new(min_api_version: u32) -> Self {
        Self {
            min_api_version,
            geometry_shader: true,
            extensions: vec![ash::khr::swapchain::NAME.to_owned()],
        }
    }
}

/// Everything the app asks of the host, fixed before instance creation.
#[derive(Clone, Debug)]
pub struct CapabilityRequest {
    pub validation: bool,
    pub layers: Vec<CString>,
    pub instance_extensions: Vec<CString>,
    pub device: DeviceRequirements,
}

impl CapabilityRequest {
    pub const VALIDATION_LAYER: &'static CStr = c"VK_LAYER_KHRONOS_validation";

    /// The validation layer and debug-utils extension are only required when
    /// `validation` is on.
    pub fn new(window_extensions: Vec<CString>, validation: bool, min_api_version: u32) -> Self {
        let mut layers = Vec::new();
        let mut instance_extensions = window_extensions;
        if validation {
            layers.push(Self::VALIDATION_LAYER.to_owned());
            instance_extensions.push(ash::ext::debug_utils::NAME.to_owned());
        }

        Self {
            validation,
            layers,
            instance_extensions,
            device: DeviceRequirements::new(min_api_version),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
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

/// The negotiated swap chain parameters for one surface at one size.
#[derive(Clone, Copy, Debug)]
pub struct PresentationConfig {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub min_image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_adds_layer_and_debug_utils() {
        let req = CapabilityRequest::new(
            vec![ash::khr::surface::NAME.to_owned()],
            true,
            vk::API_VERSION_1_3,
        );
        assert_eq!(req.layers, vec![CapabilityRequest::VALIDATION_LAYER.to_owned()]);
        assert_eq!(
            req.instance_extensions,
            vec![
                ash::khr::surface::NAME.to_owned(),
                ash::ext::debug_utils::NAME.to_owned()
            ]
        );
    }

    #[test]
    fn no_validation_keeps_window_extensions_only() {
        let req = CapabilityRequest::new(
            vec![ash::khr::surface::NAME.to_owned()],
            false,
            vk::API_VERSION_1_3,
        );
        assert!(req.layers.is_empty());
        assert_eq!(req.instance_extensions, vec![ash::khr::surface::NAME.to_owned()]);
        assert_eq!(
            req.device.extensions,
            vec![ash::khr::swapchain::NAME.to_owned()]
        );
    }

    #[test]
    fn unique_families_collapse_when_shared() {
        let shared = QueueFamilyIndices { graphics: 2, present: 2 };
        assert_eq!(shared.unique(), vec![2]);
        let split = QueueFamilyIndices { graphics: 1, present: 0 };
        assert_eq!(split.unique(), vec![1, 0]);
    }

    #[test]
    fn layer_name_needs_nul() {
        let mut props = vk::LayerProperties::default();
        for (dst, src) in props.layer_name.iter_mut().zip(b"VK_LAYER_test\0") {
            *dst = *src as std::ffi::c_char;
        }
        let info = LayerInfo::from_properties(&props).expect("terminated name");
        assert_eq!(info.name.as_c_str(), c"VK_LAYER_test");

        let mut unterminated = vk::LayerProperties::default();
        unterminated.layer_name.fill(b'x' as std::ffi::c_char);
        assert!(LayerInfo::from_properties(&unterminated).is_none());
    }
}
