// Vulkan rendering instance
//
// This holds all of the common instance code for the Vulkan context

use ash::extensions::{ext, khr};
use ash::{vk, Entry};

use crate::{CreateInfo, Result, SquallError};

use std::ffi::{CStr, CString};
use std::os::raw::c_void;

// Forward validation messages to the log at a matching level
unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let message = match p_callback_data.as_ref() {
        Some(data) if !data.p_message.is_null() => CStr::from_ptr(data.p_message),
        _ => return vk::FALSE,
    };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[VK][{:?}] {:?}", message_types, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("[VK][{:?}] {:?}", message_types, message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::info!("[VK][{:?}] {:?}", message_types, message);
    } else {
        log::trace!("[VK][{:?}] {:?}", message_types, message);
    }
    vk::FALSE
}

/// A Vulkan Instance
///
/// This holds our basic vulkan session data. We use this to create
/// the devices that surfaces get bound to.
pub struct Instance {
    /// debug callback sugar mentioned earlier. Only present when
    /// validation was requested.
    debug: Option<(ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,

    /// the entry just loads function pointers from the dynamic library
    /// I am calling it a loader, because that's what it does. Never
    /// read, it only has to outlive the instance.
    _loader: Entry,
    /// the big vulkan instance.
    pub(crate) inst: ash::Instance,
    /// VK_KHR_surface entry points, shared by every surface
    pub(crate) surface_loader: khr::Surface,
}

impl Instance {
    /// Creates a new debug reporter and registers our function
    /// for debug callbacks so we get nice error messages
    fn setup_debug(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
            )
            .pfn_user_callback(Some(vulkan_debug_callback));

        let dr_loader = ext::DebugUtils::new(entry, instance);
        let callback = unsafe { dr_loader.create_debug_utils_messenger(&debug_info, None)? };
        Ok((dr_loader, callback))
    }

    /// Create a vkInstance
    ///
    /// Most of the create info entries are straightforward, with
    /// some basic extensions being enabled. All of the work is
    /// done in subfunctions.
    pub fn new(info: &CreateInfo) -> Result<Self> {
        let entry = Entry::linked();
        let app_name = CString::new(info.application_name.as_str())
            .map_err(|_| SquallError::COULD_NOT_CREATE_INSTANCE)?;
        let engine_name = CString::new("squall").map_err(|_| SquallError::COULD_NOT_CREATE_INSTANCE)?;

        let layer_names = match info.enable_validation {
            true => vec![CString::new("VK_LAYER_KHRONOS_validation")
                .map_err(|_| SquallError::COULD_NOT_CREATE_INSTANCE)?],
            false => Vec::new(),
        };
        let layer_names_raw: Vec<*const i8> = layer_names
            .iter()
            .map(|raw_name: &CString| raw_name.as_ptr())
            .collect();

        let mut extension_names_raw = vec![khr::Surface::name().as_ptr()];
        for ext in info.window_extensions.iter() {
            extension_names_raw.push(ext.as_ptr());
        }
        if info.enable_validation {
            extension_names_raw.push(ext::DebugUtils::name().as_ptr());
        }

        let appinfo = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(0)
            .engine_name(&engine_name)
            .engine_version(0)
            .api_version(vk::API_VERSION_1_2)
            .build();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&appinfo)
            .enabled_layer_names(&layer_names_raw)
            .enabled_extension_names(&extension_names_raw)
            .build();

        let instance: ash::Instance = unsafe {
            entry.create_instance(&create_info, None).map_err(|e| {
                log::error!("Instance creation error: {:?}", e);
                SquallError::COULD_NOT_CREATE_INSTANCE
            })?
        };

        let debug = match info.enable_validation {
            true => match Self::setup_debug(&entry, &instance) {
                Ok(d) => Some(d),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            },
            false => None,
        };

        let surface_loader = khr::Surface::new(&entry, &instance);

        Ok(Self {
            _loader: entry,
            inst: instance,
            debug: debug,
            surface_loader: surface_loader,
        })
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, callback)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(callback, None);
            }
            self.inst.destroy_instance(None);
        }
    }
}
