// This module handles flagging the available behaviors
// supported by a physical device, and scoring how well a device
// fits a surface.
use ash::extensions::khr;
use ash::vk;

use crate::instance::Instance;
use crate::Result;
use std::ffi::CStr;

bitflags::bitflags! {
    /// Optional device behaviors the renderer takes advantage of
    pub struct DeviceCapabilities: u32 {
        /// Two fragment outputs may be blended, used for subpixel text
        const DUAL_SRC_BLEND = 1 << 0;
        /// Lazily allocated memory exists, transient attachments can
        /// stay in tile memory
        const LAZY_MEMORY = 1 << 1;
        /// A queue family with compute support exists
        const COMPUTE_QUEUE = 1 << 2;
    }
}

/// Extensions every device must have
pub fn device_extensions() -> Vec<*const i8> {
    vec![khr::Swapchain::name().as_ptr()]
}

fn contains_extensions(exts: &[vk::ExtensionProperties], req: &[*const i8]) -> bool {
    req.iter().all(|r| {
        let rstr = unsafe { CStr::from_ptr(*r as *const std::os::raw::c_char) };
        exts.iter().any(|e| {
            let estr =
                unsafe { CStr::from_ptr(&e.extension_name as *const std::os::raw::c_char) };
            rstr == estr
        })
    })
}

/// The score for using this format for the swapchain. None means the
/// format is not one we know how to render to.
pub fn score_surface_format(format: &vk::SurfaceFormatKHR, enable_hdr: bool) -> Option<i64> {
    let color_space = match format.color_space {
        vk::ColorSpaceKHR::SRGB_NONLINEAR => 1,
        vk::ColorSpaceKHR::EXTENDED_SRGB_NONLINEAR_EXT => 10,
        _ => return None,
    };

    let hdr = |score| if enable_hdr { score } else { -100 };
    let fmt = match format.format {
        vk::Format::R16G16B16A16_SFLOAT => hdr(12),
        vk::Format::R16G16B16_SFLOAT => hdr(11),
        // not supported by the tone mapper
        vk::Format::A2B10G10R10_UNORM_PACK32 => -100,
        vk::Format::R8G8B8A8_SRGB | vk::Format::B8G8R8A8_SRGB => 4,
        vk::Format::R8G8B8_SRGB | vk::Format::B8G8R8_SRGB => 3,
        vk::Format::B8G8R8A8_UNORM | vk::Format::R8G8B8A8_UNORM => 2,
        vk::Format::B8G8R8_UNORM | vk::Format::R8G8B8_UNORM => 1,
        _ => return None,
    };

    Some(color_space + fmt)
}

/// Pick the best scoring surface format. Only formats with a
/// positive score qualify.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    enable_hdr: bool,
) -> Option<(i64, vk::SurfaceFormatKHR)> {
    formats
        .iter()
        .filter_map(|f| score_surface_format(f, enable_hdr).map(|s| (s, *f)))
        .filter(|(s, _)| *s > 0)
        .max_by_key(|(s, _)| *s)
}

pub fn score_present_mode(mode: vk::PresentModeKHR) -> Option<i64> {
    match mode {
        vk::PresentModeKHR::IMMEDIATE => Some(1),
        vk::PresentModeKHR::FIFO_RELAXED => Some(2),
        vk::PresentModeKHR::FIFO => Some(3),
        vk::PresentModeKHR::MAILBOX => Some(1),
        _ => None,
    }
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> Option<(i64, vk::PresentModeKHR)> {
    modes
        .iter()
        .filter_map(|m| score_present_mode(*m).map(|s| (s, *m)))
        .filter(|(s, _)| *s > 0)
        .max_by_key(|(s, _)| *s)
}

pub fn device_type_score(ty: vk::PhysicalDeviceType) -> i64 {
    match ty {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 5,
        _ => 0,
    }
}

/// Choose the graphics and present queue families
///
/// `families` holds the flags of each family and whether it can present
/// to the surface. A single family doing both is preferred.
pub fn select_queue_families(families: &[(vk::QueueFlags, bool)]) -> Option<(u32, u32)> {
    let both = families
        .iter()
        .position(|(flags, present)| flags.contains(vk::QueueFlags::GRAPHICS) && *present);
    if let Some(i) = both {
        return Some((i as u32, i as u32));
    }

    let gfx = families
        .iter()
        .position(|(flags, _)| flags.contains(vk::QueueFlags::GRAPHICS))?;
    let present = families.iter().position(|(_, present)| *present)?;
    Some((gfx as u32, present as u32))
}

/// The result of scoring a physical device against one surface
#[derive(Debug, Copy, Clone)]
pub struct DeviceScore {
    pub score: i64,
    pub graphics_family: u32,
    pub present_family: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub caps: DeviceCapabilities,
}

/// Rate how well `pdev` can render to `surface`
///
/// Returns None if the device cannot be used at all.
pub fn score_physical_device(
    inst: &Instance,
    pdev: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    enable_hdr: bool,
) -> Result<Option<DeviceScore>> {
    let props = unsafe { inst.inst.get_physical_device_properties(pdev) };
    let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) };
    log::debug!("Scoring physical device {:?}", name);

    let features = unsafe { inst.inst.get_physical_device_features(pdev) };
    if features.shader_sampled_image_array_dynamic_indexing == vk::FALSE {
        log::debug!("  Does not support dynamic indexing of sampled images");
        return Ok(None);
    }

    let exts = unsafe { inst.inst.enumerate_device_extension_properties(pdev)? };
    if !contains_extensions(exts.as_slice(), &device_extensions()) {
        log::debug!("  Does not support VK_KHR_swapchain");
        return Ok(None);
    }

    let family_props = unsafe { inst.inst.get_physical_device_queue_family_properties(pdev) };
    let mut families = Vec::new();
    for (i, fam) in family_props.iter().enumerate() {
        let present = unsafe {
            inst.surface_loader
                .get_physical_device_surface_support(pdev, i as u32, surface)?
        };
        families.push((fam.queue_flags, present));
    }

    let (graphics_family, present_family) = match select_queue_families(families.as_slice()) {
        Some(f) => f,
        None => {
            log::debug!("  Does not have graphics and present queues");
            return Ok(None);
        }
    };

    let mut caps = DeviceCapabilities::empty();
    let mut score = 0;

    if families
        .iter()
        .any(|(flags, _)| flags.contains(vk::QueueFlags::COMPUTE))
    {
        caps |= DeviceCapabilities::COMPUTE_QUEUE;
        score += 1;
    }
    if graphics_family == present_family {
        score += 10;
    }
    if features.dual_src_blend == vk::TRUE {
        caps |= DeviceCapabilities::DUAL_SRC_BLEND;
        score += 5;
    }

    let mem_props = unsafe { inst.inst.get_physical_device_memory_properties(pdev) };
    if mem_props.memory_types[..mem_props.memory_type_count as usize]
        .iter()
        .any(|t| {
            t.property_flags
                .contains(vk::MemoryPropertyFlags::LAZILY_ALLOCATED)
        })
    {
        caps |= DeviceCapabilities::LAZY_MEMORY;
    }

    let formats = unsafe {
        inst.surface_loader
            .get_physical_device_surface_formats(pdev, surface)?
    };
    let (format_score, surface_format) = match choose_surface_format(&formats, enable_hdr) {
        Some(f) => f,
        None => {
            log::debug!("  No usable surface format");
            return Ok(None);
        }
    };
    score += format_score;

    let modes = unsafe {
        inst.surface_loader
            .get_physical_device_surface_present_modes(pdev, surface)?
    };
    let (mode_score, present_mode) = match choose_present_mode(&modes) {
        Some(m) => m,
        None => {
            log::debug!("  No usable present mode");
            return Ok(None);
        }
    };
    score += mode_score;
    score += device_type_score(props.device_type);

    log::debug!(
        "  score {} using {:?} and {:?}",
        score,
        surface_format,
        present_mode
    );

    Ok(Some(DeviceScore {
        score: score,
        graphics_family: graphics_family,
        present_family: present_family,
        surface_format: surface_format,
        present_mode: present_mode,
        caps: caps,
    }))
}
