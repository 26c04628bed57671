// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{Context, Result};
use tracing::info;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use vkboot_render::{RenderSettings, RenderSize, RenderSummary, Renderer};

pub mod caps;
pub mod debug;
pub mod host;
pub mod owners;
pub mod select;
pub mod sequence;

pub use host::VulkanHost;
pub use select::NegotiationError;
pub use sequence::{run_setup, SetupError, SetupHost, SetupOptions, SetupStage, VkContext};

/// A fully negotiated Vulkan context: device, queues, swap chain and views.
/// Nothing is drawn yet.
pub struct VkRenderer {
    context: VkContext<VulkanHost>,
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self> {
        let mut host =
            VulkanHost::new(window, display, size, settings).context("vulkan loader")?;
        let context = run_setup(&mut host, &SetupOptions::from_settings(settings))
            .context("vulkan setup")?;

        let r = Self { context };
        let s = r.summary();
        info!(
            "Vulkan swapchain ready on {} ({}x{}, {}, {}, {} images)",
            s.device_name,
            s.extent.width,
            s.extent.height,
            s.format,
            s.present_mode,
            s.image_count
        );
        Ok(r)
    }

    fn summary(&self) -> RenderSummary {
        let p = &self.context.presentation;
        RenderSummary {
            device_name: self.context.physical.name.clone(),
            extent: RenderSize {
                width: p.extent.width,
                height: p.extent.height,
            },
            image_count: self.context.image_views.len(),
            format: format!("{:?}", p.format.format),
            present_mode: format!("{:?}", p.present_mode),
            graphics_family: self.context.queues.graphics,
            present_family: self.context.queues.present,
        }
    }
}
