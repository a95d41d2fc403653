// Parameters for creating the graphics system
//
// Every field has a default suitable for a desktop application, and
// a few of them can be overridden from the environment so that a
// misbehaving setup can be debugged without recompiling.

use std::ffi::{CStr, CString};
use std::path::PathBuf;

/// Location of the compiled shaders chosen at build time
const BUILD_SHADER_DIR: Option<&str> = option_env!("SQUALL_SHADER_DIR");

/// Parameters for GfxSystem creation.
#[derive(Debug, Clone)]
pub struct CreateInfo {
    /// Reported to the driver through VkApplicationInfo
    pub application_name: String,
    /// Instance extensions the windowing layer needs to create its
    /// `vk::SurfaceKHR`, e.g. VK_KHR_wayland_surface
    pub window_extensions: Vec<CString>,
    /// Enable the Khronos validation layer and the debug messenger
    pub enable_validation: bool,
    /// Allow HDR surface formats to be selected for the swapchain
    pub enable_hdr: bool,
    /// Directory holding `<name>.vert.spv` and `<name>.frag.spv`
    pub shader_dir: PathBuf,
    /// The number of swapchain images we would like to have
    pub preferred_image_count: u32,
    /// Color the HDR attachment is cleared to at the start of a frame
    pub clear_color: [f32; 4],
    /// Color saturation applied by the tone mapper. 1.0 leaves colors unchanged.
    pub saturation: f32,
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes" | "on"))
}

impl CreateInfo {
    pub fn builder() -> CreateInfoBuilder {
        let shader_dir = std::env::var("SQUALL_SHADER_DIR")
            .ok()
            .or(BUILD_SHADER_DIR.map(|s| s.to_string()))
            .unwrap_or_else(|| "shaders".to_string());

        CreateInfoBuilder {
            ci: CreateInfo {
                application_name: "squall".to_string(),
                window_extensions: Vec::new(),
                enable_validation: env_flag("SQUALL_VALIDATION")
                    .unwrap_or(cfg!(debug_assertions)),
                enable_hdr: env_flag("SQUALL_HDR").unwrap_or(false),
                shader_dir: PathBuf::from(shader_dir),
                preferred_image_count: 2,
                clear_color: [0.0, 0.0, 0.0, 0.0],
                saturation: 1.0,
            },
        }
    }
}

/// Implements the builder pattern for easier system creation
pub struct CreateInfoBuilder {
    ci: CreateInfo,
}

impl CreateInfoBuilder {
    pub fn application_name<'a>(&'a mut self, name: &str) -> &'a mut Self {
        self.ci.application_name = name.to_string();
        self
    }

    pub fn window_extension<'a>(&'a mut self, name: &CStr) -> &'a mut Self {
        self.ci.window_extensions.push(name.to_owned());
        self
    }

    pub fn enable_validation<'a>(&'a mut self, enable: bool) -> &'a mut Self {
        self.ci.enable_validation = enable;
        self
    }

    pub fn enable_hdr<'a>(&'a mut self, enable: bool) -> &'a mut Self {
        self.ci.enable_hdr = enable;
        self
    }

    pub fn shader_dir<'a>(&'a mut self, dir: PathBuf) -> &'a mut Self {
        self.ci.shader_dir = dir;
        self
    }

    pub fn preferred_image_count<'a>(&'a mut self, count: u32) -> &'a mut Self {
        self.ci.preferred_image_count = count;
        self
    }

    pub fn clear_color<'a>(&'a mut self, color: [f32; 4]) -> &'a mut Self {
        self.ci.clear_color = color;
        self
    }

    pub fn saturation<'a>(&'a mut self, saturation: f32) -> &'a mut Self {
        self.ci.saturation = saturation;
        self
    }

    pub fn build(&self) -> CreateInfo {
        self.ci.clone()
    }
}
