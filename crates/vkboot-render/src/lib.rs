// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

/// Knobs the backend reads once, at construction.
#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub app_name: String,
    /// Require the validation layer and install the diagnostic messenger.
    pub validation: bool,
    /// Lowest acceptable device API version as `(major, minor)`.
    pub min_api_version: (u32, u32),
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            app_name: "Graphics App".to_owned(),
            validation: cfg!(debug_assertions),
            min_api_version: (1, 3),
        }
    }
}

/// What setup ended up negotiating, for logging.
#[derive(Clone, Debug)]
pub struct RenderSummary {
    pub device_name: String,
    pub extent: RenderSize,
    pub image_count: usize,
    pub format: String,
    pub present_mode: String,
    pub graphics_family: u32,
    pub present_family: u32,
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self>
    where
        Self: Sized;

    fn summary(&self) -> RenderSummary;
}
