use crate::vulkan::*;
use crate::*;
use ash::vk;
use std::sync::Arc;
use winit::{
    dpi::LogicalSize,
    event_loop::ActiveEventLoop,
    raw_window_handle::{HasDisplayHandle, HasWindowHandle},
    window::Window,
};

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .unwrap_or(formats[0])
}

pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

pub fn choose_swap_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    // u32::MAX means the surface size is defined by the swapchain
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

#[derive(Default)]
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
}

impl Swapchain {
    /// Builds a new swapchain against the current surface state, handing the
    /// old handle to the driver via `old_swapchain`. No-op while the window
    /// has zero area.
    pub fn recreate(&mut self, surface: vk::SurfaceKHR, width: u32, height: u32) {
        let surface_formats = unsafe {
            SURFACE_LOADER
                .get_physical_device_surface_formats(*GPU, surface)
                .unwrap()
        };
        let surface_capabilities = unsafe {
            SURFACE_LOADER
                .get_physical_device_surface_capabilities(*GPU, surface)
                .unwrap()
        };
        let surface_present_modes = unsafe {
            SURFACE_LOADER
                .get_physical_device_surface_present_modes(*GPU, surface)
                .unwrap()
        };

        let surface_format = choose_surface_format(&surface_formats);
        let present_mode = choose_present_mode(&surface_present_modes);
        let extent = choose_swap_extent(&surface_capabilities, width, height);
        if extent.width == 0 || extent.height == 0 {
            return;
        }

        let pre_transform = if surface_capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            surface_capabilities.current_transform
        };
        let mut desired_image_count = surface_capabilities.min_image_count + 1;
        if surface_capabilities.max_image_count > 0 {
            desired_image_count = surface_capabilities
                .max_image_count
                .min(desired_image_count);
        }

        let old_swapchain = self.swapchain;
        if !self.image_views.is_empty() {
            unsafe {
                self.images.clear();
                self.image_views
                    .drain(..)
                    .for_each(|image_view| DEVICE.destroy_image_view(image_view, None));
            }
        }

        self.swapchain = unsafe {
            SWAPCHAIN_LOADER
                .create_swapchain(
                    &vk::SwapchainCreateInfoKHR {
                        surface,
                        min_image_count: desired_image_count,
                        image_color_space: surface_format.color_space,
                        image_format: surface_format.format,
                        image_extent: extent,
                        image_array_layers: 1,
                        image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
                        image_sharing_mode: vk::SharingMode::EXCLUSIVE,
                        pre_transform,
                        composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                        present_mode,
                        clipped: vk::TRUE,
                        old_swapchain,
                        ..Default::default()
                    },
                    None,
                )
                .unwrap()
        };
        unsafe { SWAPCHAIN_LOADER.destroy_swapchain(old_swapchain, None) };

        self.format = surface_format.format;
        self.extent = extent;
        self.images = unsafe {
            SWAPCHAIN_LOADER
                .get_swapchain_images(self.swapchain)
                .unwrap()
        };
        self.image_views = self
            .images
            .iter()
            .map(|&swapchain_image| unsafe {
                DEVICE
                    .create_image_view(
                        &vk::ImageViewCreateInfo::default()
                            .view_type(vk::ImageViewType::TYPE_2D)
                            .format(surface_format.format)
                            .subresource_range(
                                vk::ImageSubresourceRange::default()
                                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                                    .layer_count(1)
                                    .level_count(1),
                            )
                            .image(swapchain_image),
                        None,
                    )
                    .unwrap()
            })
            .collect();
    }

    pub fn destroy(&mut self) {
        unsafe {
            self.image_views
                .drain(..)
                .for_each(|image_view| DEVICE.destroy_image_view(image_view, None));
            self.images.clear();
            SWAPCHAIN_LOADER.destroy_swapchain(self.swapchain, None);
            self.swapchain = vk::SwapchainKHR::null();
        }
    }
}

impl std::ops::Deref for Swapchain {
    type Target = vk::SwapchainKHR;

    fn deref(&self) -> &Self::Target {
        &self.swapchain
    }
}

pub struct WindowData {
    pub window: Arc<Window>,
    pub surface: vk::SurfaceKHR,
    pub swapchain: Swapchain,
}

impl WindowData {
    pub fn new(event_loop: &ActiveEventLoop) -> Self {
        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title("objview")
                        .with_inner_size(LogicalSize::new(800, 600)),
                )
                .unwrap(),
        );

        let surface = unsafe {
            ash_window::create_surface(
                &ENTRY,
                &INSTANCE,
                window.display_handle().unwrap().as_raw(),
                window.window_handle().unwrap().as_raw(),
                None,
            )
            .unwrap()
        };

        let present_supported = unsafe {
            SURFACE_LOADER
                .get_physical_device_surface_support(*GPU, *QUEUE_FAMILY_INDEX, surface)
                .unwrap()
        };
        if !present_supported {
            fatal!("Graphics queue family cannot present to the window surface");
        }

        let mut slf = Self {
            window,
            surface,
            swapchain: Swapchain::default(),
        };
        slf.recreate_swapchain();
        slf
    }

    pub fn recreate_swapchain(&mut self) {
        self.swapchain
            .recreate(self.surface, self.width(), self.height());
    }

    pub fn width(&self) -> u32 {
        self.window.inner_size().width
    }

    pub fn height(&self) -> u32 {
        self.window.inner_size().height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_format_prefers_bgra_srgb() {
        let fallback = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let preferred = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let chosen = choose_surface_format(&[fallback, preferred]);
        assert_eq!(chosen.format, preferred.format);
        assert_eq!(chosen.color_space, preferred.color_space);
    }

    #[test]
    fn surface_format_falls_back_to_first() {
        let fallback = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let other = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let chosen = choose_surface_format(&[fallback, other]);
        assert_eq!(chosen.format, fallback.format);
    }

    #[test]
    fn present_mode_prefers_mailbox() {
        let chosen = choose_present_mode(&[
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ]);
        assert_eq!(chosen, vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let chosen = choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE]);
        assert_eq!(chosen, vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn swap_extent_uses_fixed_surface_extent() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            ..Default::default()
        };
        let extent = choose_swap_extent(&caps, 800, 600);
        assert_eq!(extent.width, 1280);
        assert_eq!(extent.height, 720);
    }

    #[test]
    fn swap_extent_clamps_window_size() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 2048,
                height: 2048,
            },
            ..Default::default()
        };
        let extent = choose_swap_extent(&caps, 4096, 16);
        assert_eq!(extent.width, 2048);
        assert_eq!(extent.height, 64);
    }
}
