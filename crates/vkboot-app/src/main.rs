// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};
use vkboot_core::init_tracing;
use vkboot_platform::{create_window, framebuffer_size};
use vkboot_render::{RenderSettings, RenderSize, Renderer};
use vkboot_render_vk::VkRenderer;

use vkboot_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

mod config;

use config::{load_cfg, AppCfg};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file; a missing file means built-in defaults
    #[arg(long, default_value = "vkboot.toml")]
    config: PathBuf,
    /// Force the validation layer on or off
    #[arg(long, value_enum)]
    validation: Option<Toggle>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Toggle {
    On,
    Off,
}

struct App {
    cfg: AppCfg,
    settings: RenderSettings,
    // Field order matters: the renderer's surface must go before the window.
    renderer: Option<VkRenderer>,
    window: Option<Window>,
    setup_error: Option<anyhow::Error>,
}

impl App {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = create_window(event_loop, &self.cfg.window_spec())?;
        let (width, height) = framebuffer_size(&window);
        let size = RenderSize { width, height };

        let renderer = VkRenderer::new(&window, &window, size, &self.settings)?;
        let s = renderer.summary();
        info!(
            "device = {}, queues graphics={} present={}",
            s.device_name, s.graphics_family, s.present_family
        );

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.setup_error.is_some() {
            return;
        }

        // Reported once, by main's return value.
        if let Err(e) = self.init(event_loop) {
            self.setup_error = Some(e);
            event_loop.exit();
            return;
        }

        // Nothing to draw; just drain events without blocking.
        event_loop.set_control_flow(ControlFlow::Poll);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        if let WindowEvent::CloseRequested = event {
            info!("CloseRequested");
            self.renderer = None;
            self.window = None;
            event_loop.exit();
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (cfg, cfg_err) = match load_cfg(&args.config) {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppCfg::default(), Some(e)),
    };

    init_tracing(&cfg.log.filter);
    if let Some(e) = cfg_err {
        warn!("{e:#}; using defaults");
    }

    let validation = args.validation.map(|t| matches!(t, Toggle::On));
    let settings = cfg.render_settings(validation);
    info!("validation = {}", settings.validation);

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App {
        cfg,
        settings,
        renderer: None,
        window: None,
        setup_error: None,
    };

    event_loop.run_app(&mut app)?;

    match app.setup_error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
