// Squall error codes
//
// Vulkan results are folded into these so that callers only need to
// match on one type. The loss variants are absorbed by the Surface
// state machine and never escape the frame path.
#![allow(non_camel_case_types)]

use crate::surface::SurfaceLoss;
use ash::vk;
use thiserror::Error;

#[derive(Error, Eq, PartialEq, Debug, Clone)]
pub enum SquallError {
    #[error("The swapchain is out of date or suboptimal")]
    SWAPCHAIN_LOST,
    #[error("The native window or its surface is gone")]
    WINDOW_LOST,
    #[error("The GPU device has been lost")]
    DEVICE_LOST,
    #[error("Ran out of video memory while growing an atlas")]
    VRAM_EXHAUSTED,
    #[error("Image of {0}x{1} does not fit in the staging image")]
    IMAGE_TOO_LARGE(usize, usize),
    #[error("Pixmap of {0}x{1} does not match the size of the image")]
    INVALID_PIXMAP_SIZE(usize, usize),
    #[error("No physical device is able to present to this surface")]
    NO_SUITABLE_DEVICE,
    #[error("The surface does not advertise a usable format")]
    INVALID_FORMAT,
    #[error("Could not load shader {0}")]
    SHADER_NOT_FOUND(String),
    #[error("Not all required Vulkan extensions are available")]
    VK_NOT_ALL_EXTENSIONS_AVAILABLE,
    #[error("Could not create the Vulkan instance")]
    COULD_NOT_CREATE_INSTANCE,
    #[error("Operation is not valid in the current surface state")]
    INVALID_STATE,
    #[error("Unhandled Vulkan result {0}")]
    VK_RESULT(vk::Result),
}

impl SquallError {
    /// How far a surface has to unwind because of this error. Errors that
    /// are not a loss return None and are propagated to the caller.
    pub fn loss(&self) -> Option<SurfaceLoss> {
        match self {
            SquallError::SWAPCHAIN_LOST => Some(SurfaceLoss::SwapchainLost),
            SquallError::DEVICE_LOST => Some(SurfaceLoss::DeviceLost),
            SquallError::WINDOW_LOST => Some(SurfaceLoss::WindowLost),
            _ => None,
        }
    }
}

impl From<vk::Result> for SquallError {
    fn from(res: vk::Result) -> Self {
        match res {
            vk::Result::SUBOPTIMAL_KHR | vk::Result::ERROR_OUT_OF_DATE_KHR => {
                SquallError::SWAPCHAIN_LOST
            }
            vk::Result::ERROR_SURFACE_LOST_KHR => SquallError::WINDOW_LOST,
            vk::Result::ERROR_DEVICE_LOST => SquallError::DEVICE_LOST,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => SquallError::VRAM_EXHAUSTED,
            vk::Result::ERROR_EXTENSION_NOT_PRESENT => {
                SquallError::VK_NOT_ALL_EXTENSIONS_AVAILABLE
            }
            e => SquallError::VK_RESULT(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, SquallError>;
