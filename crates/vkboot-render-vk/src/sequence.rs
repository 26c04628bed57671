// SPDX-License-Identifier: CEPL-1.0
//! The setup pipeline, in one fixed order:
//!
//! 1. instance, after the required layers and extensions check out
//! 2. debug messenger, only with validation on
//! 3. window surface
//! 4. physical device selection and queue family indices
//! 5. logical device and its queues
//! 6. surface query and presentation negotiation
//! 7. swap chain and its images
//! 8. one image view per image
//!
//! Any failure returns immediately. Resources acquired up to that point are
//! locals, so they drop in reverse order on the way out; on success they move
//! into a [`VkContext`] whose field order is the same reverse order.
use std::ffi::CString;

use ash::vk;
use thiserror::Error;
use tracing::{debug, info, warn};
use vkboot_render::{RenderSettings, RenderSize};

use crate::caps::{
    CapabilityRequest, DeviceCandidate, ExtensionInfo, LayerInfo, PresentationConfig,
    QueueFamilyIndices, SurfaceSupport,
};
use crate::select::{
    check_extensions_supported, check_layers_supported, negotiate_presentation, score_device,
    select_best_device, select_queue_families, ExtensionScope, NegotiationError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupStage {
    Instance,
    Messenger,
    Surface,
    PhysicalDevice,
    LogicalDevice,
    SurfaceQuery,
    Swapchain,
    ImageViews,
}

impl SetupStage {
    pub fn name(self) -> &'static str {
        match self {
            SetupStage::Instance => "instance",
            SetupStage::Messenger => "debug messenger",
            SetupStage::Surface => "surface",
            SetupStage::PhysicalDevice => "physical device",
            SetupStage::LogicalDevice => "logical device",
            SetupStage::SurfaceQuery => "surface query",
            SetupStage::Swapchain => "swap chain",
            SetupStage::ImageViews => "image views",
        }
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error("{step} failed with error code {} ({result})", .result.as_raw())]
    Vulkan {
        step: &'static str,
        result: vk::Result,
    },
    #[error("Could not load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),
    #[error("Window handle unavailable: {0}")]
    WindowHandle(String),
}

impl SetupError {
    /// For `map_err` on driver calls.
    pub fn vulkan(step: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| SetupError::Vulkan { step, result }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetupOptions {
    pub validation: bool,
    pub min_api_version: u32,
}

/// Device creation always chains `Vulkan13Features`, so nothing older than
/// 1.3 can be asked for or accepted.
pub const API_VERSION_FLOOR: u32 = vk::API_VERSION_1_3;

/// The configured minimum, raised to [`API_VERSION_FLOOR`].
pub(crate) fn requested_api_version(settings: &RenderSettings) -> u32 {
    let (major, minor) = settings.min_api_version;
    vk::make_api_version(0, major, minor, 0).max(API_VERSION_FLOOR)
}

impl SetupOptions {
    pub fn from_settings(settings: &RenderSettings) -> Self {
        let min_api_version = requested_api_version(settings);
        let (major, minor) = settings.min_api_version;
        if (major, minor) < (1, 3) {
            warn!("min_api_version {major}.{minor} is below 1.3, using 1.3");
        }
        Self {
            validation: settings.validation,
            min_api_version,
        }
    }
}

/// Query and creation primitives the sequence is built from. The associated
/// types are owned resources; dropping one releases it.
pub trait SetupHost {
    type Instance;
    type Messenger;
    type Surface;
    type Device;
    type Swapchain;
    type ImageViews;

    /// Instance extensions the window system needs to present.
    fn window_extensions(&self) -> Result<Vec<CString>, SetupError>;
    fn instance_layers(&self) -> Result<Vec<LayerInfo>, SetupError>;
    fn instance_extensions(&self) -> Result<Vec<ExtensionInfo>, SetupError>;
    fn framebuffer_size(&self) -> RenderSize;

    fn create_instance(
        &mut self,
        layers: &[CString],
        extensions: &[CString],
    ) -> Result<Self::Instance, SetupError>;

    fn create_messenger(&mut self, instance: &Self::Instance) -> Result<Self::Messenger, SetupError>;

    fn create_surface(&mut self, instance: &Self::Instance) -> Result<Self::Surface, SetupError>;

    /// Every physical device, with per-family present support against `surface`.
    fn device_candidates(
        &mut self,
        instance: &Self::Instance,
        surface: &Self::Surface,
    ) -> Result<Vec<DeviceCandidate>, SetupError>;

    fn create_device(
        &mut self,
        instance: &Self::Instance,
        candidate: &DeviceCandidate,
        queues: QueueFamilyIndices,
        extensions: &[CString],
    ) -> Result<Self::Device, SetupError>;

    fn surface_support(
        &mut self,
        surface: &Self::Surface,
        candidate: &DeviceCandidate,
    ) -> Result<SurfaceSupport, SetupError>;

    /// Creates the swap chain and fetches its images.
    fn create_swapchain(
        &mut self,
        instance: &Self::Instance,
        surface: &Self::Surface,
        device: &Self::Device,
        queues: QueueFamilyIndices,
        config: &PresentationConfig,
    ) -> Result<Self::Swapchain, SetupError>;

    fn create_image_views(
        &mut self,
        device: &Self::Device,
        swapchain: &Self::Swapchain,
        format: vk::Format,
    ) -> Result<Self::ImageViews, SetupError>;
}

/// Everything setup produced. Fields drop top to bottom, which is the reverse
/// of acquisition.
pub struct VkContext<H: SetupHost> {
    pub image_views: H::ImageViews,
    pub swapchain: H::Swapchain,
    pub device: H::Device,
    pub surface: H::Surface,
    pub messenger: Option<H::Messenger>,
    pub instance: H::Instance,

    pub physical: DeviceCandidate,
    pub queues: QueueFamilyIndices,
    pub presentation: PresentationConfig,
}

fn enter(stage: SetupStage) {
    debug!(stage = stage.name(), "setup");
}

fn list_names<'a>(title: &str, names: impl Iterator<Item = &'a CString>) {
    let names: Vec<_> = names.map(|n| n.to_string_lossy()).collect();
    info!("{title} ({}): {}", names.len(), names.join(", "));
}

pub fn run_setup<H: SetupHost>(
    host: &mut H,
    options: &SetupOptions,
) -> Result<VkContext<H>, SetupError> {
    let request = CapabilityRequest::new(
        host.window_extensions()?,
        options.validation,
        options.min_api_version,
    );

    enter(SetupStage::Instance);
    let layers = host.instance_layers()?;
    if request.validation {
        list_names("supported layers", layers.iter().map(|l| &l.name));
    }
    check_layers_supported(&request.layers, &layers)?;

    let extensions = host.instance_extensions()?;
    if request.validation {
        list_names("supported instance extensions", extensions.iter().map(|e| &e.name));
    }
    check_extensions_supported(
        ExtensionScope::Instance,
        &request.instance_extensions,
        &extensions,
    )?;
    let instance = host.create_instance(&request.layers, &request.instance_extensions)?;

    let messenger = if request.validation {
        enter(SetupStage::Messenger);
        Some(host.create_messenger(&instance)?)
    } else {
        None
    };

    enter(SetupStage::Surface);
    let surface = host.create_surface(&instance)?;

    enter(SetupStage::PhysicalDevice);
    let candidates = host.device_candidates(&instance, &surface)?;
    if candidates.is_empty() {
        warn!("no physical devices available");
    }
    if request.validation {
        for c in &candidates {
            match score_device(c, &request.device) {
                Some(score) => info!("physical device: {} score: {}", c.name, score.0),
                None => info!("physical device: {} disqualified", c.name),
            }
        }
    }
    let (physical, _) = select_best_device(&candidates, &request.device)?;
    let queues = select_queue_families(&physical.queue_families)?;
    debug!(
        device = %physical.name,
        graphics = queues.graphics,
        present = queues.present,
        "selected"
    );

    enter(SetupStage::LogicalDevice);
    let device = host.create_device(&instance, physical, queues, &request.device.extensions)?;

    enter(SetupStage::SurfaceQuery);
    let support = host.surface_support(&surface, physical)?;
    let presentation = negotiate_presentation(&support, host.framebuffer_size())?;

    enter(SetupStage::Swapchain);
    let swapchain = host.create_swapchain(&instance, &surface, &device, queues, &presentation)?;

    enter(SetupStage::ImageViews);
    let image_views = host.create_image_views(&device, &swapchain, presentation.format.format)?;

    Ok(VkContext {
        image_views,
        swapchain,
        device,
        surface,
        messenger,
        instance,
        physical: physical.clone(),
        queues,
        presentation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::fixtures::{candidate, family};
    use crate::select::PREFERRED_SURFACE_FORMAT;
    use std::cell::RefCell;
    use std::ffi::CStr;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Tracked {
        name: &'static str,
        log: Log,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.log.borrow_mut().push(format!("release {}", self.name));
        }
    }

    struct RecordingHost {
        log: Log,
        fail_at: Option<SetupStage>,
        layers: Vec<LayerInfo>,
        extensions: Vec<ExtensionInfo>,
        candidates: Vec<DeviceCandidate>,
        support: SurfaceSupport,
        instance_args: Option<(Vec<CString>, Vec<CString>)>,
    }

    impl RecordingHost {
        fn new() -> Self {
            Self {
                log: Rc::default(),
                fail_at: None,
                layers: vec![LayerInfo {
                    name: CapabilityRequest::VALIDATION_LAYER.to_owned(),
                    spec_version: 1,
                    implementation_version: 1,
                }],
                extensions: vec![
                    ExtensionInfo::new(ash::khr::surface::NAME, 25),
                    ExtensionInfo::new(ash::ext::debug_utils::NAME, 2),
                ],
                candidates: vec![candidate(1, "gpu")],
                support: SurfaceSupport {
                    capabilities: vk::SurfaceCapabilitiesKHR {
                        min_image_count: 2,
                        current_extent: vk::Extent2D {
                            width: 1000,
                            height: 1000,
                        },
                        ..Default::default()
                    },
                    formats: vec![PREFERRED_SURFACE_FORMAT],
                    present_modes: vec![vk::PresentModeKHR::FIFO],
                },
                instance_args: None,
            }
        }

        fn failing_at(stage: SetupStage) -> Self {
            Self {
                fail_at: Some(stage),
                ..Self::new()
            }
        }

        fn check(&self, stage: SetupStage) -> Result<(), SetupError> {
            if self.fail_at == Some(stage) {
                return Err(SetupError::Vulkan {
                    step: stage.name(),
                    result: vk::Result::ERROR_INITIALIZATION_FAILED,
                });
            }
            Ok(())
        }

        fn acquire(&self, stage: SetupStage, name: &'static str) -> Result<Tracked, SetupError> {
            self.check(stage)?;
            self.log.borrow_mut().push(format!("acquire {name}"));
            Ok(Tracked {
                name,
                log: self.log.clone(),
            })
        }

        fn released(&self) -> Vec<String> {
            self.log
                .borrow()
                .iter()
                .filter_map(|e| e.strip_prefix("release ").map(str::to_owned))
                .collect()
        }

        fn acquired(&self) -> Vec<String> {
            self.log
                .borrow()
                .iter()
                .filter_map(|e| e.strip_prefix("acquire ").map(str::to_owned))
                .collect()
        }
    }

    impl SetupHost for RecordingHost {
        type Instance = Tracked;
        type Messenger = Tracked;
        type Surface = Tracked;
        type Device = Tracked;
        type Swapchain = Tracked;
        type ImageViews = Tracked;

        fn window_extensions(&self) -> Result<Vec<CString>, SetupError> {
            Ok(vec![ash::khr::surface::NAME.to_owned()])
        }

        fn instance_layers(&self) -> Result<Vec<LayerInfo>, SetupError> {
            Ok(self.layers.clone())
        }

        fn instance_extensions(&self) -> Result<Vec<ExtensionInfo>, SetupError> {
            Ok(self.extensions.clone())
        }

        fn framebuffer_size(&self) -> RenderSize {
            RenderSize {
                width: 1000,
                height: 1000,
            }
        }

        fn create_instance(
            &mut self,
            layers: &[CString],
            extensions: &[CString],
        ) -> Result<Tracked, SetupError> {
            self.instance_args = Some((layers.to_vec(), extensions.to_vec()));
            self.acquire(SetupStage::Instance, "instance")
        }

        fn create_messenger(&mut self, _: &Tracked) -> Result<Tracked, SetupError> {
            self.acquire(SetupStage::Messenger, "messenger")
        }

        fn create_surface(&mut self, _: &Tracked) -> Result<Tracked, SetupError> {
            self.acquire(SetupStage::Surface, "surface")
        }

        fn device_candidates(
            &mut self,
            _: &Tracked,
            _: &Tracked,
        ) -> Result<Vec<DeviceCandidate>, SetupError> {
            self.check(SetupStage::PhysicalDevice)?;
            Ok(self.candidates.clone())
        }

        fn create_device(
            &mut self,
            _: &Tracked,
            _: &DeviceCandidate,
            _: QueueFamilyIndices,
            _: &[CString],
        ) -> Result<Tracked, SetupError> {
            self.acquire(SetupStage::LogicalDevice, "device")
        }

        fn surface_support(
            &mut self,
            _: &Tracked,
            _: &DeviceCandidate,
        ) -> Result<SurfaceSupport, SetupError> {
            self.check(SetupStage::SurfaceQuery)?;
            Ok(self.support.clone())
        }

        fn create_swapchain(
            &mut self,
            _: &Tracked,
            _: &Tracked,
            _: &Tracked,
            _: QueueFamilyIndices,
            _: &PresentationConfig,
        ) -> Result<Tracked, SetupError> {
            self.acquire(SetupStage::Swapchain, "swapchain")
        }

        fn create_image_views(
            &mut self,
            _: &Tracked,
            _: &Tracked,
            _: vk::Format,
        ) -> Result<Tracked, SetupError> {
            self.acquire(SetupStage::ImageViews, "image views")
        }
    }

    fn options(validation: bool) -> SetupOptions {
        SetupOptions {
            validation,
            min_api_version: vk::API_VERSION_1_3,
        }
    }

    const ALL: [&str; 6] = [
        "instance",
        "messenger",
        "surface",
        "device",
        "swapchain",
        "image views",
    ];

    #[test]
    fn failure_releases_only_earlier_resources_in_reverse() {
        let cases = [
            (SetupStage::Instance, 0),
            (SetupStage::Messenger, 1),
            (SetupStage::Surface, 2),
            (SetupStage::PhysicalDevice, 3),
            (SetupStage::LogicalDevice, 3),
            (SetupStage::SurfaceQuery, 4),
            (SetupStage::Swapchain, 4),
            (SetupStage::ImageViews, 5),
        ];

        for (stage, acquired_before) in cases {
            let mut host = RecordingHost::failing_at(stage);
            let result = run_setup(&mut host, &options(true));
            assert!(result.is_err(), "{stage:?} should fail");

            let expected: Vec<String> = ALL[..acquired_before]
                .iter()
                .rev()
                .map(|s| s.to_string())
                .collect();
            assert_eq!(host.acquired().len(), acquired_before, "{stage:?}");
            assert_eq!(host.released(), expected, "{stage:?}");
        }
    }

    #[test]
    fn context_drop_releases_everything_in_reverse() {
        let mut host = RecordingHost::new();
        let context = run_setup(&mut host, &options(true)).unwrap();
        assert_eq!(host.acquired(), ALL);
        assert!(host.released().is_empty());

        assert_eq!(context.physical.name, "gpu");
        assert_eq!(context.queues, QueueFamilyIndices { graphics: 0, present: 0 });
        assert_eq!(context.presentation.min_image_count, 3);

        drop(context);
        let reversed: Vec<&str> = ALL.iter().rev().copied().collect();
        assert_eq!(host.released(), reversed);
    }

    #[test]
    fn validation_off_skips_messenger_and_debug_requirements() {
        let mut host = RecordingHost::new();
        host.layers.clear();
        host.extensions = vec![ExtensionInfo::new(ash::khr::surface::NAME, 25)];

        let context = run_setup(&mut host, &options(false)).unwrap();
        assert!(context.messenger.is_none());
        assert!(!host.acquired().contains(&"messenger".to_owned()));

        let (layers, extensions) = host.instance_args.clone().unwrap();
        assert!(layers.is_empty());
        assert_eq!(extensions, vec![ash::khr::surface::NAME.to_owned()]);
    }

    #[test]
    fn validation_on_requests_layer_and_debug_utils() {
        let mut host = RecordingHost::new();
        let _context = run_setup(&mut host, &options(true)).unwrap();

        let (layers, extensions) = host.instance_args.clone().unwrap();
        assert_eq!(layers, vec![CapabilityRequest::VALIDATION_LAYER.to_owned()]);
        assert!(extensions
            .iter()
            .any(|e| e.as_c_str() == ash::ext::debug_utils::NAME));
    }

    #[test]
    fn missing_validation_layer_fails_before_instance() {
        let mut host = RecordingHost::new();
        host.layers.clear();

        let err = run_setup(&mut host, &options(true)).err().unwrap();
        match err {
            SetupError::Negotiation(NegotiationError::MissingLayer(name)) => {
                assert_eq!(name, "VK_LAYER_KHRONOS_validation");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(host.acquired().is_empty());
    }

    #[test]
    fn missing_window_extension_names_it() {
        let mut host = RecordingHost::new();
        host.extensions.retain(|e| e.name.as_c_str() != ash::khr::surface::NAME);

        let err = run_setup(&mut host, &options(false)).err().unwrap();
        assert_eq!(err.to_string(), "Required instance extension not supported: VK_KHR_surface");
    }

    #[test]
    fn no_devices_releases_surface_messenger_instance() {
        let mut host = RecordingHost::new();
        host.candidates.clear();

        let err = run_setup(&mut host, &options(true)).err().unwrap();
        assert!(matches!(
            err,
            SetupError::Negotiation(NegotiationError::NoSuitableDevice)
        ));
        assert_eq!(host.released(), ["surface", "messenger", "instance"]);
    }

    #[test]
    fn split_queue_families_reach_the_context() {
        let mut host = RecordingHost::new();
        host.candidates[0].queue_families = vec![
            family(0, vk::QueueFlags::TRANSFER, true),
            family(1, vk::QueueFlags::GRAPHICS, false),
        ];

        let context = run_setup(&mut host, &options(false)).unwrap();
        assert_eq!(context.queues, QueueFamilyIndices { graphics: 1, present: 0 });
    }

    #[test]
    fn host_error_carries_status_code() {
        let err = SetupError::vulkan("vkCreateSwapchainKHR")(vk::Result::ERROR_SURFACE_LOST_KHR);
        let text = err.to_string();
        assert!(text.starts_with("vkCreateSwapchainKHR failed with error code -1000000000"));
    }

    #[test]
    fn options_pack_api_version() {
        let settings = RenderSettings {
            min_api_version: (1, 4),
            validation: false,
            ..RenderSettings::default()
        };
        let opts = SetupOptions::from_settings(&settings);
        assert_eq!(opts.min_api_version, vk::make_api_version(0, 1, 4, 0));
        assert!(!opts.validation);
    }

    #[test]
    fn api_version_below_floor_is_raised() {
        for old in [(1, 0), (1, 2), (0, 9)] {
            let settings = RenderSettings {
                min_api_version: old,
                ..RenderSettings::default()
            };
            let opts = SetupOptions::from_settings(&settings);
            assert_eq!(opts.min_api_version, API_VERSION_FLOOR, "{old:?}");
            assert_eq!(requested_api_version(&settings), API_VERSION_FLOOR);
        }
    }

    #[test]
    fn pre_1_3_discrete_gpu_loses_to_1_3_integrated() {
        let settings = RenderSettings {
            min_api_version: (1, 2),
            validation: false,
            ..RenderSettings::default()
        };
        let mut old = candidate(1, "vk12-discrete");
        old.api_version = vk::API_VERSION_1_2;
        let mut integrated = candidate(2, "vk13-integrated");
        integrated.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;

        let mut host = RecordingHost::new();
        host.candidates = vec![old, integrated];
        let context = run_setup(&mut host, &SetupOptions::from_settings(&settings)).unwrap();
        assert_eq!(context.physical.name, "vk13-integrated");
    }

    #[test]
    fn surface_layer_name_constant_is_khronos() {
        let name: &CStr = CapabilityRequest::VALIDATION_LAYER;
        assert_eq!(name.to_bytes(), b"VK_LAYER_KHRONOS_validation");
    }
}
