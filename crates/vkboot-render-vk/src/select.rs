// SPDX-License-Identifier: CEPL-1.0
//! Pure negotiation: given what the host reports, decide pass/fail and pick
//! the configuration to use. Nothing in here talks to the driver.
use std::ffi::{CStr, CString};
use std::fmt;

use ash::vk;
use thiserror::Error;
use vkboot_render::RenderSize;

use crate::caps::{
    DeviceCandidate, DeviceRequirements, ExtensionInfo, LayerInfo, PresentationConfig,
    QueueFamilyIndices, QueueFamilyInfo, SurfaceSupport,
};

pub const DISCRETE_GPU_BONUS: u32 = 1000;
pub const MIN_SWAP_IMAGES: u32 = 3;
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtensionScope {
    Instance,
    Device,
}

impl fmt::Display for ExtensionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExtensionScope::Instance => "instance",
            ExtensionScope::Device => "device",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("Required layer not supported: {0}")]
    MissingLayer(String),
    #[error("Required {scope} extension not supported: {name}")]
    MissingExtension { scope: ExtensionScope, name: String },
    #[error("No suitable physical device available")]
    NoSuitableDevice,
    #[error("No queue family supports graphics")]
    NoGraphicsQueue,
    #[error("No queue family can present to the surface")]
    NoPresentQueue,
    #[error("Surface reports no formats")]
    NoSurfaceFormats,
    #[error("Surface supports neither MAILBOX nor FIFO presentation")]
    NoSupportedPresentMode,
}

/// Higher is better. Only produced for devices that meet every hard
/// requirement, so a score of zero is still a usable device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeviceScore(pub u32);

fn first_missing<'r>(
    required: &'r [CString],
    mut has: impl FnMut(&CStr) -> bool,
) -> Option<&'r CStr> {
    required
        .iter()
        .map(CString::as_c_str)
        .find(|name| !has(name))
}

pub fn check_layers_supported(
    required: &[CString],
    supported: &[LayerInfo],
) -> Result<(), NegotiationError> {
    match first_missing(required, |name| {
        supported.iter().any(|l| l.name.as_c_str() == name)
    }) {
        Some(name) => Err(NegotiationError::MissingLayer(
            name.to_string_lossy().into_owned(),
        )),
        None => Ok(()),
    }
}

pub fn check_extensions_supported(
    scope: ExtensionScope,
    required: &[CString],
    supported: &[ExtensionInfo],
) -> Result<(), NegotiationError> {
    match first_missing(required, |name| {
        supported.iter().any(|e| e.name.as_c_str() == name)
    }) {
        Some(name) => Err(NegotiationError::MissingExtension {
            scope,
            name: name.to_string_lossy().into_owned(),
        }),
        None => Ok(()),
    }
}

pub fn score_device(
    candidate: &DeviceCandidate,
    requirements: &DeviceRequirements,
) -> Option<DeviceScore> {
    if candidate.api_version < requirements.min_api_version {
        return None;
    }
    if requirements.geometry_shader && !candidate.geometry_shader {
        return None;
    }
    if !candidate
        .queue_families
        .iter()
        .any(QueueFamilyInfo::supports_graphics)
    {
        return None;
    }
    if first_missing(&requirements.extensions, |name| candidate.has_extension(name)).is_some() {
        return None;
    }

    let bonus = if candidate.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        DISCRETE_GPU_BONUS
    } else {
        0
    };
    Some(DeviceScore(
        bonus.saturating_add(candidate.max_image_dimension_2d),
    ))
}

/// Highest score wins; on a tie the candidate enumerated first is kept.
pub fn select_best_device<'c>(
    candidates: &'c [DeviceCandidate],
    requirements: &DeviceRequirements,
) -> Result<(&'c DeviceCandidate, DeviceScore), NegotiationError> {
    let mut best: Option<(&DeviceCandidate, DeviceScore)> = None;
    for candidate in candidates {
        let Some(score) = score_device(candidate, requirements) else {
            continue;
        };
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }
    best.ok_or(NegotiationError::NoSuitableDevice)
}

/// Prefers one family that does both graphics and present. Otherwise the
/// first family for each role, which may then differ.
pub fn select_queue_families(
    families: &[QueueFamilyInfo],
) -> Result<QueueFamilyIndices, NegotiationError> {
    if let Some(both) = families
        .iter()
        .find(|f| f.supports_graphics() && f.supports_present)
    {
        return Ok(QueueFamilyIndices {
            graphics: both.index,
            present: both.index,
        });
    }

    let graphics = families
        .iter()
        .find(|f| f.supports_graphics())
        .ok_or(NegotiationError::NoGraphicsQueue)?;
    let present = families
        .iter()
        .find(|f| f.supports_present)
        .ok_or(NegotiationError::NoPresentQueue)?;

    Ok(QueueFamilyIndices {
        graphics: graphics.index,
        present: present.index,
    })
}

pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Result<vk::SurfaceFormatKHR, NegotiationError> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == PREFERRED_SURFACE_FORMAT.format
                && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .or_else(|| formats.first().copied())
        .ok_or(NegotiationError::NoSurfaceFormats)
}

pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
) -> Result<vk::PresentModeKHR, NegotiationError> {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO]
        .into_iter()
        .find(|wanted| modes.contains(wanted))
        .ok_or(NegotiationError::NoSupportedPresentMode)
}

pub fn choose_swap_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    framebuffer: RenderSize,
) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    // not clamp(): that panics if a driver reports min > max
    vk::Extent2D {
        width: framebuffer
            .width
            .max(caps.min_image_extent.width)
            .min(caps.max_image_extent.width),
        height: framebuffer
            .height
            .max(caps.min_image_extent.height)
            .min(caps.max_image_extent.height),
    }
}

/// `max_image_count == 0` means the host sets no upper bound.
pub fn choose_min_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = MIN_SWAP_IMAGES.max(caps.min_image_count);
    if caps.max_image_count > 0 && caps.max_image_count < count {
        caps.max_image_count
    } else {
        count
    }
}

pub fn negotiate_presentation(
    support: &SurfaceSupport,
    framebuffer: RenderSize,
) -> Result<PresentationConfig, NegotiationError> {
    Ok(PresentationConfig {
        format: choose_surface_format(&support.formats)?,
        present_mode: choose_present_mode(&support.present_modes)?,
        extent: choose_swap_extent(&support.capabilities, framebuffer),
        min_image_count: choose_min_image_count(&support.capabilities),
        pre_transform: support.capabilities.current_transform,
    })
}
