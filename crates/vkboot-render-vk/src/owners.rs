// SPDX-License-Identifier: CEPL-1.0
//! One owner per Vulkan handle. Each destroys its handle on drop; dependents
//! must be dropped first, which `VkContext`'s field order guarantees.
use ash::khr::{surface, swapchain};
use ash::{vk, Device, Entry, Instance};
use tracing::debug;

use crate::caps::QueueFamilyIndices;

pub struct InstanceOwner {
    entry: Entry,
    instance: Instance,
}

impl InstanceOwner {
    pub(crate) fn new(entry: Entry, instance: Instance) -> Self {
        Self { entry, instance }
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn raw(&self) -> &Instance {
        &self.instance
    }
}

impl Drop for InstanceOwner {
    fn drop(&mut self) {
        debug!("destroying instance {:?}", self.instance.handle());
        // SAFETY: every object created from this instance is owned by a value
        // that is dropped before this one
        unsafe { self.instance.destroy_instance(None) };
    }
}

pub struct MessengerOwner {
    loader: ash::ext::debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

impl MessengerOwner {
    pub(crate) fn new(
        loader: ash::ext::debug_utils::Instance,
        handle: vk::DebugUtilsMessengerEXT,
    ) -> Self {
        Self { loader, handle }
    }
}

impl Drop for MessengerOwner {
    fn drop(&mut self) {
        debug!("destroying debug messenger");
        // SAFETY: created from `loader`'s instance, which is still alive
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.handle, None)
        };
    }
}

pub struct SurfaceOwner {
    loader: surface::Instance,
    handle: vk::SurfaceKHR,
}

impl SurfaceOwner {
    pub(crate) fn new(loader: surface::Instance, handle: vk::SurfaceKHR) -> Self {
        Self { loader, handle }
    }

    pub fn loader(&self) -> &surface::Instance {
        &self.loader
    }

    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }
}

impl Drop for SurfaceOwner {
    fn drop(&mut self) {
        debug!("destroying surface");
        // SAFETY: no swap chain on this surface outlives us
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}

/// Logical device plus the queues fetched from it. The queue handles are
/// only meaningful while this owner is alive.
pub struct DeviceOwner {
    device: Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
}

impl DeviceOwner {
    pub(crate) fn new(device: Device, queues: QueueFamilyIndices) -> Self {
        // SAFETY: both families were requested with one queue each at creation
        let (graphics_queue, present_queue) = unsafe {
            (
                device.get_device_queue(queues.graphics, 0),
                device.get_device_queue(queues.present, 0),
            )
        };
        Self {
            device,
            graphics_queue,
            present_queue,
        }
    }

    pub fn raw(&self) -> &Device {
        &self.device
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }
}

impl Drop for DeviceOwner {
    fn drop(&mut self) {
        debug!("destroying device {:?}", self.device.handle());
        // SAFETY: swap chain and image views are dropped before the device
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_device(None);
        }
    }
}

pub struct SwapchainOwner {
    loader: swapchain::Device,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
}

impl SwapchainOwner {
    pub(crate) fn new(loader: swapchain::Device, handle: vk::SwapchainKHR) -> Self {
        Self {
            loader,
            handle,
            images: Vec::new(),
        }
    }

    /// Swap chain images belong to the swap chain; they are never destroyed
    /// individually.
    pub(crate) fn fetch_images(&mut self) -> Result<(), vk::Result> {
        // SAFETY: handle was created by this loader
        self.images = unsafe { self.loader.get_swapchain_images(self.handle) }?;
        Ok(())
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }
}

impl Drop for SwapchainOwner {
    fn drop(&mut self) {
        debug!("destroying swap chain ({} images)", self.images.len());
        // SAFETY: image views into our images are dropped first
        unsafe { self.loader.destroy_swapchain(self.handle, None) };
    }
}

/// Views are pushed one at a time so a failure part way through still
/// releases the ones already created.
pub struct ImageViewSet {
    device: Device,
    views: Vec<vk::ImageView>,
}

impl ImageViewSet {
    pub(crate) fn new(device: Device) -> Self {
        Self {
            device,
            views: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, view: vk::ImageView) {
        self.views.push(view);
    }

    pub(crate) fn len(&self) -> usize {
        self.views.len()
    }
}

impl Drop for ImageViewSet {
    fn drop(&mut self) {
        debug!("destroying {} image views", self.views.len());
        for &view in self.views.iter().rev() {
            // SAFETY: views were created from `device`, which outlives this set
            unsafe { self.device.destroy_image_view(view, None) };
        }
    }
}
