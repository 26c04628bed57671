// SPDX-License-Identifier: CEPL-1.0
//! The capability query layer and resource creation against a real driver.
use std::ffi::{c_char, CStr, CString};

use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use tracing::debug;
use vkboot_render::{RenderSettings, RenderSize};

use crate::caps::{
    DeviceCandidate, ExtensionInfo, LayerInfo, PresentationConfig, QueueFamilyIndices,
    QueueFamilyInfo, SurfaceSupport,
};
use crate::debug::messenger_create_info;
use crate::owners::{
    DeviceOwner, ImageViewSet, InstanceOwner, MessengerOwner, SurfaceOwner, SwapchainOwner,
};
use crate::sequence::{requested_api_version, SetupError, SetupHost};

const ENGINE_NAME: &CStr = c"No Engine";

/// Holds the loader and the raw window handles. The window must outlive
/// every surface created through this host.
pub struct VulkanHost {
    entry: Entry,
    display: RawDisplayHandle,
    window: RawWindowHandle,
    framebuffer: RenderSize,
    app_name: CString,
    api_version: u32,
}

impl VulkanHost {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        framebuffer: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self, SetupError> {
        let display = display
            .display_handle()
            .map_err(|e| SetupError::WindowHandle(e.to_string()))?
            .as_raw();
        let window = window
            .window_handle()
            .map_err(|e| SetupError::WindowHandle(e.to_string()))?
            .as_raw();

        // SAFETY: the loader library is only unloaded when `entry` and all its
        // clones are dropped, which happens after the instance is destroyed
        let entry = unsafe { Entry::load() }?;

        Ok(Self {
            entry,
            display,
            window,
            framebuffer,
            app_name: CString::new(settings.app_name.as_str())
                .unwrap_or_else(|_| c"Graphics App".to_owned()),
            api_version: requested_api_version(settings),
        })
    }
}

fn to_cstrings(ptrs: &[*const c_char]) -> Vec<CString> {
    ptrs.iter()
        // SAFETY: ash-window hands out pointers to static NUL-terminated names
        .map(|&p| unsafe { CStr::from_ptr(p) }.to_owned())
        .collect()
}

fn as_ptrs(names: &[CString]) -> Vec<*const c_char> {
    names.iter().map(|n| n.as_ptr()).collect()
}

unsafe fn describe_device(
    instance: &Instance,
    surface: &SurfaceOwner,
    physical: vk::PhysicalDevice,
) -> Result<DeviceCandidate, SetupError> {
    // SAFETY: `physical` was enumerated from `instance`
    let (props, features, families) = unsafe {
        (
            instance.get_physical_device_properties(physical),
            instance.get_physical_device_features(physical),
            instance.get_physical_device_queue_family_properties(physical),
        )
    };
    // SAFETY: as above
    let extensions = unsafe { instance.enumerate_device_extension_properties(physical) }
        .map_err(SetupError::vulkan("vkEnumerateDeviceExtensionProperties"))?
        .iter()
        .filter_map(ExtensionInfo::from_properties)
        .collect();

    let mut queue_families = Vec::with_capacity(families.len());
    for (index, family) in (0u32..).zip(families.iter()) {
        // SAFETY: surface and physical device come from the same instance
        let supports_present = unsafe {
            surface.loader().get_physical_device_surface_support(
                physical,
                index,
                surface.handle(),
            )
        }
        .map_err(SetupError::vulkan("vkGetPhysicalDeviceSurfaceSupportKHR"))?;

        queue_families.push(QueueFamilyInfo {
            index,
            flags: family.queue_flags,
            queue_count: family.queue_count,
            supports_present,
        });
    }

    let name = props
        .device_name_as_c_str()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed device>".to_owned());

    Ok(DeviceCandidate {
        handle: physical,
        name,
        device_type: props.device_type,
        api_version: props.api_version,
        max_image_dimension_2d: props.limits.max_image_dimension2_d,
        geometry_shader: features.geometry_shader == vk::TRUE,
        queue_families,
        extensions,
    })
}

impl SetupHost for VulkanHost {
    type Instance = InstanceOwner;
    type Messenger = MessengerOwner;
    type Surface = SurfaceOwner;
    type Device = DeviceOwner;
    type Swapchain = SwapchainOwner;
    type ImageViews = ImageViewSet;

    fn window_extensions(&self) -> Result<Vec<CString>, SetupError> {
        let ptrs = ash_window::enumerate_required_extensions(self.display)
            .map_err(SetupError::vulkan("enumerate_required_extensions"))?;
        Ok(to_cstrings(ptrs))
    }

    fn instance_layers(&self) -> Result<Vec<LayerInfo>, SetupError> {
        // SAFETY: plain global query
        let props = unsafe { self.entry.enumerate_instance_layer_properties() }
            .map_err(SetupError::vulkan("vkEnumerateInstanceLayerProperties"))?;
        Ok(props.iter().filter_map(LayerInfo::from_properties).collect())
    }

    fn instance_extensions(&self) -> Result<Vec<ExtensionInfo>, SetupError> {
        // SAFETY: plain global query
        let props = unsafe { self.entry.enumerate_instance_extension_properties(None) }
            .map_err(SetupError::vulkan("vkEnumerateInstanceExtensionProperties"))?;
        Ok(props.iter().filter_map(ExtensionInfo::from_properties).collect())
    }

    fn framebuffer_size(&self) -> RenderSize {
        self.framebuffer
    }

    fn create_instance(
        &mut self,
        layers: &[CString],
        extensions: &[CString],
    ) -> Result<InstanceOwner, SetupError> {
        let app_info = vk::ApplicationInfo::default()
            .application_name(&self.app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(self.api_version);

        let layer_ptrs = as_ptrs(layers);
        let ext_ptrs = as_ptrs(extensions);
        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&ext_ptrs);

        // SAFETY: every pointer in create_info borrows locals that outlive the call
        let instance = unsafe { self.entry.create_instance(&create_info, None) }
            .map_err(SetupError::vulkan("vkCreateInstance"))?;
        debug!("instance created ({} layers, {} extensions)", layers.len(), extensions.len());
        Ok(InstanceOwner::new(self.entry.clone(), instance))
    }

    fn create_messenger(&mut self, instance: &InstanceOwner) -> Result<MessengerOwner, SetupError> {
        let loader = ash::ext::debug_utils::Instance::new(instance.entry(), instance.raw());
        // SAFETY: debug utils was enabled on this instance whenever validation is on
        let handle = unsafe { loader.create_debug_utils_messenger(&messenger_create_info(), None) }
            .map_err(SetupError::vulkan("vkCreateDebugUtilsMessengerEXT"))?;
        Ok(MessengerOwner::new(loader, handle))
    }

    fn create_surface(&mut self, instance: &InstanceOwner) -> Result<SurfaceOwner, SetupError> {
        // SAFETY: the raw handles stay valid for the lifetime of the window,
        // which outlives the renderer
        let handle = unsafe {
            ash_window::create_surface(
                instance.entry(),
                instance.raw(),
                self.display,
                self.window,
                None,
            )
        }
        .map_err(SetupError::vulkan("vkCreateSurfaceKHR"))?;
        let loader = surface::Instance::new(instance.entry(), instance.raw());
        Ok(SurfaceOwner::new(loader, handle))
    }

    fn device_candidates(
        &mut self,
        instance: &InstanceOwner,
        surface: &SurfaceOwner,
    ) -> Result<Vec<DeviceCandidate>, SetupError> {
        // SAFETY: plain instance query
        let physical = unsafe { instance.raw().enumerate_physical_devices() }
            .map_err(SetupError::vulkan("vkEnumeratePhysicalDevices"))?;
        physical
            .into_iter()
            // SAFETY: each handle was just enumerated from this instance
            .map(|pd| unsafe { describe_device(instance.raw(), surface, pd) })
            .collect()
    }

    fn create_device(
        &mut self,
        instance: &InstanceOwner,
        candidate: &DeviceCandidate,
        queues: QueueFamilyIndices,
        extensions: &[CString],
    ) -> Result<DeviceOwner, SetupError> {
        let priorities = [0.5_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = queues
            .unique()
            .into_iter()
            .map(|index| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(index)
                    .queue_priorities(&priorities)
            })
            .collect();

        // Extended dynamic state is core in 1.3; the EXT feature struct is only
        // legal in the chain when its extension is enabled too.
        let mut enabled = extensions.to_vec();
        let with_eds = candidate.has_extension(ash::ext::extended_dynamic_state::NAME);
        if with_eds {
            enabled.push(ash::ext::extended_dynamic_state::NAME.to_owned());
        }
        let ext_ptrs = as_ptrs(&enabled);

        let mut vulkan13 = vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);
        let mut dynamic_state =
            vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT::default().extended_dynamic_state(true);
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .features(vk::PhysicalDeviceFeatures::default().geometry_shader(true))
            .push_next(&mut vulkan13);
        if with_eds {
            features2 = features2.push_next(&mut dynamic_state);
        }

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&ext_ptrs)
            .push_next(&mut features2);

        // SAFETY: candidate.handle belongs to this instance; every pointer in
        // create_info borrows locals that outlive the call
        let device = unsafe { instance.raw().create_device(candidate.handle, &create_info, None) }
            .map_err(SetupError::vulkan("vkCreateDevice"))?;
        let owner = DeviceOwner::new(device, queues);
        debug!(
            "device created on {} ({} queue families, {} extensions), graphics queue {:?}, present queue {:?}",
            candidate.name,
            queue_infos.len(),
            enabled.len(),
            owner.graphics_queue(),
            owner.present_queue()
        );
        Ok(owner)
    }

    fn surface_support(
        &mut self,
        surface: &SurfaceOwner,
        candidate: &DeviceCandidate,
    ) -> Result<SurfaceSupport, SetupError> {
        let loader = surface.loader();
        let pd = candidate.handle;
        let sf = surface.handle();
        // SAFETY: surface and physical device come from the same instance
        unsafe {
            Ok(SurfaceSupport {
                capabilities: loader
                    .get_physical_device_surface_capabilities(pd, sf)
                    .map_err(SetupError::vulkan("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))?,
                formats: loader
                    .get_physical_device_surface_formats(pd, sf)
                    .map_err(SetupError::vulkan("vkGetPhysicalDeviceSurfaceFormatsKHR"))?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(pd, sf)
                    .map_err(SetupError::vulkan("vkGetPhysicalDeviceSurfacePresentModesKHR"))?,
            })
        }
    }

    fn create_swapchain(
        &mut self,
        instance: &InstanceOwner,
        surface: &SurfaceOwner,
        device: &DeviceOwner,
        queues: QueueFamilyIndices,
        config: &PresentationConfig,
    ) -> Result<SwapchainOwner, SetupError> {
        let family_indices = [queues.graphics, queues.present];
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(config.min_image_count)
            .image_format(config.format.format)
            .image_color_space(config.format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(config.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true);
        create_info = if queues.is_shared() {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let loader = swapchain::Device::new(instance.raw(), device.raw());
        // SAFETY: surface and device are alive and the device enables VK_KHR_swapchain
        let handle = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(SetupError::vulkan("vkCreateSwapchainKHR"))?;

        let mut owner = SwapchainOwner::new(loader, handle);
        owner
            .fetch_images()
            .map_err(SetupError::vulkan("vkGetSwapchainImagesKHR"))?;
        debug!(
            "swap chain {}x{} with {} images",
            config.extent.width,
            config.extent.height,
            owner.images().len()
        );
        Ok(owner)
    }

    fn create_image_views(
        &mut self,
        device: &DeviceOwner,
        swapchain: &SwapchainOwner,
        format: vk::Format,
    ) -> Result<ImageViewSet, SetupError> {
        let mut views = ImageViewSet::new(device.raw().clone());
        for &image in swapchain.images() {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            // SAFETY: image belongs to a swap chain created on this device
            let view = unsafe { device.raw().create_image_view(&view_info, None) }
                .map_err(SetupError::vulkan("vkCreateImageView"))?;
            views.push(view);
        }
        Ok(views)
    }
}
