// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, io, path::Path};

use vkboot_platform::WindowSpec;
use vkboot_render::RenderSettings;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        let spec = WindowSpec::default();
        WindowCfg {
            title: spec.title,
            width: spec.width,
            height: spec.height,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct VulkanCfg {
    /// Unset means "on in debug builds".
    pub validation: Option<bool>,
    pub min_api_version: [u32; 2],
}

impl Default for VulkanCfg {
    fn default() -> Self {
        VulkanCfg {
            validation: None,
            min_api_version: [1, 3],
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LogCfg {
    pub filter: String,
}

impl Default for LogCfg {
    fn default() -> Self {
        LogCfg {
            filter: "info".to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub vulkan: VulkanCfg,
    pub log: LogCfg,
}

impl AppCfg {
    pub fn window_spec(&self) -> WindowSpec {
        WindowSpec {
            title: self.window.title.clone(),
            width: self.window.width,
            height: self.window.height,
        }
    }

    /// `validation` from the command line beats the file, which beats the
    /// build profile.
    pub fn render_settings(&self, validation: Option<bool>) -> RenderSettings {
        let defaults = RenderSettings::default();
        let [major, minor] = self.vulkan.min_api_version;
        RenderSettings {
            app_name: self.window.title.clone(),
            validation: validation
                .or(self.vulkan.validation)
                .unwrap_or(defaults.validation),
            min_api_version: (major, minor),
        }
    }
}

pub fn parse_cfg(text: &str) -> Result<AppCfg> {
    toml::from_str(text).context("invalid config")
}

/// A missing file is not an error; anything else is.
pub fn load_cfg(path: &Path) -> Result<AppCfg> {
    match fs::read_to_string(path) {
        Ok(s) => parse_cfg(&s).with_context(|| path.display().to_string()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(AppCfg::default()),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}
