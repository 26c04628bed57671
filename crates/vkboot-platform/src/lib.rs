// SPDX-License-Identifier: CEPL-1.0
//! Window ownership for the app. Everything winit-specific the other crates
//! need goes through the re-export below.
use anyhow::{Context, Result};
use tracing::info;

pub use winit;

use winit::{
    dpi::PhysicalSize,
    event_loop::ActiveEventLoop,
    raw_window_handle::{HasDisplayHandle, RawDisplayHandle},
    window::{Window, WindowAttributes},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowSpec {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            title: "Graphics App".to_owned(),
            width: 1000,
            height: 1000,
        }
    }
}

impl WindowSpec {
    /// Fixed-size window with no client API attached; the swap chain is sized
    /// once, so resizing is disabled.
    pub fn attributes(&self) -> WindowAttributes {
        Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(PhysicalSize::new(self.width, self.height))
            .with_resizable(false)
    }
}

pub fn create_window(event_loop: &ActiveEventLoop, spec: &WindowSpec) -> Result<Window> {
    let window = event_loop
        .create_window(spec.attributes())
        .context("create_window")?;
    info!(
        "window \"{}\" {}x{} on {}",
        spec.title,
        spec.width,
        spec.height,
        platform_name(&window)
    );
    Ok(window)
}

/// Framebuffer size in physical pixels.
pub fn framebuffer_size(window: &Window) -> (u32, u32) {
    let size = window.inner_size();
    (size.width, size.height)
}

pub fn platform_name(window: &Window) -> &'static str {
    match window.display_handle().map(|h| h.as_raw()) {
        Ok(RawDisplayHandle::Xlib(_)) => "x11 (xlib)",
        Ok(RawDisplayHandle::Xcb(_)) => "x11 (xcb)",
        Ok(RawDisplayHandle::Wayland(_)) => "wayland",
        Ok(RawDisplayHandle::Windows(_)) => "win32",
        Ok(RawDisplayHandle::AppKit(_)) => "cocoa",
        Ok(RawDisplayHandle::Android(_)) => "android",
        Ok(_) => "other",
        Err(_) => "unavailable",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::Size;

    #[test]
    fn default_window_is_fixed_1000_square() {
        let attrs = WindowSpec::default().attributes();
        assert_eq!(attrs.title, "Graphics App");
        assert!(!attrs.resizable);
        assert_eq!(
            attrs.inner_size,
            Some(Size::Physical(PhysicalSize::new(1000, 1000)))
        );
    }

    #[test]
    fn custom_spec_carries_through() {
        let spec = WindowSpec {
            title: "viewer".to_owned(),
            width: 640,
            height: 480,
        };
        let attrs = spec.attributes();
        assert_eq!(attrs.title, "viewer");
        assert_eq!(
            attrs.inner_size,
            Some(Size::Physical(PhysicalSize::new(640, 480)))
        );
    }
}
