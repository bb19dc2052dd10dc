use crate::*;
pub use ash::vk;
use ash::{ext, khr};
use lazy_static::lazy_static;
use std::{
    ffi::{CStr, CString},
    process::abort,
};

pub fn required_vulkan_instance_extensions() -> Vec<CString> {
    [
        khr::surface::NAME,
        #[cfg(target_os = "windows")]
        khr::win32_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::mvk::macos_surface::NAME,
    ]
    .into_iter()
    .map(|e| e.to_owned())
    .collect()
}

pub fn preferred_vulkan_instance_extensions() -> Vec<CString> {
    [
        #[cfg(target_os = "linux")]
        khr::wayland_surface::NAME,
        #[cfg(target_os = "linux")]
        khr::xlib_surface::NAME,
        #[cfg(debug_assertions)]
        ext::debug_utils::NAME,
    ]
    .into_iter()
    .map(|e: &CStr| e.to_owned())
    .collect()
}

pub fn enabled_layers() -> Vec<CString> {
    [
        #[cfg(debug_assertions)]
        "VK_LAYER_KHRONOS_validation",
    ]
    .into_iter()
    .map(|e: &str| CString::new(e).unwrap())
    .collect()
}

pub fn required_vulkan_gpu_extensions() -> Vec<CString> {
    [khr::swapchain::NAME]
        .into_iter()
        .map(|e| e.to_owned())
        .collect()
}

lazy_static! {
    static ref ERROR_COUNT: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);
}

#[cfg(debug_assertions)]
unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if message_severity == vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        || (message_severity == vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            && message_type == vk::DebugUtilsMessageTypeFlagsEXT::GENERAL)
    {
        return vk::FALSE;
    }
    let callback_data = *p_callback_data;
    let mut message = callback_data
        .message_as_c_str()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let full_message = message.clone();
    if let Some(i) = message.find(" (http") {
        message.truncate(i);
    }

    type Severity = vk::DebugUtilsMessageSeverityFlagsEXT;
    let ansi_message = match message_severity {
        Severity::ERROR => print::err(&message),
        Severity::WARNING => print::warn(&message),
        Severity::INFO => print::info(&message),
        _ => message,
    };

    log!("{full_message}\n");
    match message_severity {
        Severity::ERROR => {
            eprintln!("{ansi_message}");
            let err_cnt = ERROR_COUNT.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if err_cnt > 8 {
                eprintln!("{}", print::fatal("too many vulkan errors"));
                abort();
            }
        }
        Severity::WARNING => {
            println!("{ansi_message}");
            ERROR_COUNT.store(0, std::sync::atomic::Ordering::SeqCst);
        }
        _ => ERROR_COUNT.store(0, std::sync::atomic::Ordering::SeqCst),
    }

    vk::FALSE
}

lazy_static!(
    pub static ref ENTRY: ash::Entry = unsafe { ash::Entry::load().expect("Failed to load Vulkan") };
    pub static ref INSTANCE_EXTENSIONS: Vec<CString> = unsafe {
        ENTRY
            .enumerate_instance_extension_properties(None)
            .unwrap_or_default()
            .into_iter()
            .map(|e| e.extension_name_as_c_str().unwrap().to_owned())
            .collect()
    };
    pub static ref INSTANCE: ash::Instance = {
        let app_info = vk::ApplicationInfo::default().api_version(vk::API_VERSION_1_0);

        let required_instance_extensions: Vec<CString> = required_vulkan_instance_extensions()
            .into_iter()
            .filter(|re| INSTANCE_EXTENSIONS.contains(re).then_some(true)
            .unwrap_or_else(|| { fatal!("Unsupported vulkan instance extension: {re:?}") })).collect();

        let preferred_instance_extensions: Vec<CString> = preferred_vulkan_instance_extensions()
            .into_iter()
            .filter(|pe| INSTANCE_EXTENSIONS.contains(pe).then_some(true)
            .unwrap_or_else(|| { warn!("Unsupported vulkan instance extension: {pe:?}"); false })).collect();
        let enabled_extensions =
            [required_instance_extensions, preferred_instance_extensions].concat();

        let enabled_exts = enabled_extensions.iter().map(|e| e.as_ptr()).collect::<Vec<_>>();
        let info = vk::InstanceCreateInfo::default()
                    .application_info(&app_info)
                    .enabled_extension_names(&enabled_exts);

        let layers: Vec<CString> = unsafe {
            ENTRY
                .enumerate_instance_layer_properties()
                .unwrap_or_default()
                .into_iter()
                .map(|e| e.layer_name_as_c_str().unwrap().to_owned())
                .collect()
        };
        let mut enabled_layers = enabled_layers();
        enabled_layers.retain(|e| layers.contains(e));
        let enabled_layers = enabled_layers.iter().map(|e| e.as_ptr()).collect::<Vec<_>>();
        let info = info.enabled_layer_names(&enabled_layers);

        let instance = unsafe {
            ENTRY
                .create_instance(&info, None)
                .expect("Failed to init VkInstance")
        };

        #[cfg(debug_assertions)]
        unsafe {
            ext::debug_utils::Instance::new(&ENTRY, &instance)
                .create_debug_utils_messenger(
                    &vk::DebugUtilsMessengerCreateInfoEXT::default()
                        .message_severity(
                            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
                        )
                        .message_type(
                            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                        )
                        .pfn_user_callback(Some(vulkan_debug_callback)),
                    None,
                )
                .unwrap()
        };

        instance
    };

    static ref GPU_STUFF: (vk::PhysicalDevice, vk::PhysicalDeviceProperties, vk::PhysicalDeviceFeatures) = {
        let gpus = unsafe {
            INSTANCE
                .enumerate_physical_devices()
                .expect("No GPUs found")
        };
        // Selects first discrete GPU (non-integrated)
        let (gpu, gpu_props) = gpus
            .iter()
            .map(|&gpu| {
                let props = unsafe { INSTANCE.get_physical_device_properties(gpu) };
                let features = unsafe { INSTANCE.get_physical_device_features(gpu) };
                let mut score = 0;
                score += (props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU) as u32 * 1_000_000;
                score += (features.sampler_anisotropy == vk::TRUE) as u32 * 100_000;
                score += props.limits.max_image_dimension2_d;
                (gpu, props, score)
            }).max_by_key(|(_, _, score)| *score).map(|(gpu, props, _)| (gpu, props)).unwrap();
        let gpu_features = unsafe { INSTANCE.get_physical_device_features(gpu) };
        (gpu, gpu_props, gpu_features)
    };

    pub static ref GPU: vk::PhysicalDevice = GPU_STUFF.0;
    pub static ref GPU_PROPS: vk::PhysicalDeviceProperties = GPU_STUFF.1;
    pub static ref GPU_LIMITS: vk::PhysicalDeviceLimits = GPU_PROPS.limits;
    pub static ref GPU_FEATURES: vk::PhysicalDeviceFeatures = GPU_STUFF.2;
    pub static ref GPU_EXTENSIONS: Vec<CString> = unsafe {
        INSTANCE
            .enumerate_device_extension_properties(*GPU)
            .unwrap_or_default()
            .into_iter()
            .map(|e| e.extension_name_as_c_str().unwrap().to_owned())
            .collect()
    };
    pub static ref GPU_MEMORY_PROPS: vk::PhysicalDeviceMemoryProperties = unsafe {
        INSTANCE.get_physical_device_memory_properties(*GPU)
    };

    pub static ref MSAA_SAMPLES: vk::SampleCountFlags = max_usable_sample_count(&GPU_LIMITS);

    pub static ref QUEUE_FAMILIES: Vec<vk::QueueFamilyProperties> = unsafe { INSTANCE.get_physical_device_queue_family_properties(*GPU) };
    pub static ref QUEUE_FAMILY_INDEX: u32 =
        QUEUE_FAMILIES
        .iter()
        .position(|&queue_family_props| {
            queue_family_props.queue_flags.contains(
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER,
            )
        })
        .unwrap_or_default() as u32;

    pub static ref DEVICE: ash::Device = unsafe {
            #[cfg(debug_assertions)]
            log_file!(
                "logs/gpu.log",
                "//////////////////// Properties ////////////////////\n{:#?}\n\n//////////////////// Features ////////////////////\n{:#?}\n\n//////////////////// Extensions ////////////////////\n{:#?}", *GPU_PROPS, *GPU_FEATURES, *GPU_EXTENSIONS
            );

            let required_gpu_extensions = required_vulkan_gpu_extensions();
            required_gpu_extensions
                .iter()
                .filter(|re| !GPU_EXTENSIONS.contains(re))
                .for_each(|re| fatal!("Required vulkan gpu extension not found: {re:?}"));

            let gpu_exts: Vec<*const i8> = required_gpu_extensions
                .iter()
                .map(|ext| ext.as_ptr())
                .collect();
            let queue_priorities = [1.0];
            let queue_infos = [
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(*QUEUE_FAMILY_INDEX)
                    .queue_priorities(&queue_priorities)
            ];
            let enabled_features = vk::PhysicalDeviceFeatures::default()
                .sampler_anisotropy(GPU_FEATURES.sampler_anisotropy == vk::TRUE);
            let info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_infos)
                .enabled_extension_names(&gpu_exts)
                .enabled_features(&enabled_features);
            INSTANCE.create_device(*GPU, &info, None)
                .expect("Failed to create VkDevice")
    };
    pub static ref QUEUE: vk::Queue = unsafe { DEVICE.get_device_queue(*QUEUE_FAMILY_INDEX, 0) };

    pub static ref SWAPCHAIN_LOADER: khr::swapchain::Device = khr::swapchain::Device::new(&INSTANCE, &DEVICE);
    pub static ref SURFACE_LOADER: khr::surface::Instance = khr::surface::Instance::new(&ENTRY, &INSTANCE);
);

pub fn max_usable_sample_count(limits: &vk::PhysicalDeviceLimits) -> vk::SampleCountFlags {
    let counts = limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&count| counts.contains(count))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

pub fn find_memory_type(
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
    mem_props: &vk::PhysicalDeviceMemoryProperties,
) -> u32 {
    for i in 0..mem_props.memory_type_count {
        if type_filter & (1 << i) != 0
            && mem_props.memory_types[i as usize]
                .property_flags
                .contains(properties)
        {
            return i;
        }
    }
    fatal!("No suitable gpu memory type for properties: {properties:?}")
}

pub fn format_properties(format: vk::Format) -> vk::FormatProperties {
    unsafe { INSTANCE.get_physical_device_format_properties(*GPU, format) }
}

pub fn find_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
) -> vk::Format {
    candidates
        .iter()
        .copied()
        .find(|&format| {
            let props = format_properties(format);
            match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
        .unwrap_or_else(|| fatal!("No supported format among: {candidates:?}"))
}

pub fn find_depth_format() -> vk::Format {
    find_supported_format(
        &[
            vk::Format::D32_SFLOAT,
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::Format::D24_UNORM_S8_UINT,
        ],
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    )
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    format == vk::Format::D32_SFLOAT_S8_UINT || format == vk::Format::D24_UNORM_S8_UINT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_props(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        props.memory_type_count = types.len() as u32;
        for (i, &flags) in types.iter().enumerate() {
            props.memory_types[i].property_flags = flags;
        }
        props
    }

    #[test]
    fn memory_type_matches_filter_and_properties() {
        let props = mem_props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let i = find_memory_type(
            0b11,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            &props,
        );
        assert_eq!(i, 1);
    }

    #[test]
    fn memory_type_respects_type_filter() {
        let props = mem_props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        // first type is masked out by the filter
        let i = find_memory_type(0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL, &props);
        assert_eq!(i, 1);
    }

    #[test]
    fn sample_count_picks_highest_common() {
        let mut limits = vk::PhysicalDeviceLimits::default();
        limits.framebuffer_color_sample_counts =
            vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4 | vk::SampleCountFlags::TYPE_8;
        limits.framebuffer_depth_sample_counts =
            vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4;
        assert_eq!(max_usable_sample_count(&limits), vk::SampleCountFlags::TYPE_4);
    }

    #[test]
    fn sample_count_falls_back_to_one() {
        let mut limits = vk::PhysicalDeviceLimits::default();
        limits.framebuffer_color_sample_counts = vk::SampleCountFlags::TYPE_1;
        limits.framebuffer_depth_sample_counts = vk::SampleCountFlags::TYPE_1;
        assert_eq!(max_usable_sample_count(&limits), vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn stencil_component_detection() {
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
    }
}
