//! # Squall
//!
//! Squall renders the windows of a GUI toolkit with Vulkan. It binds a
//! native window to a GPU, owns the swapchain of that window and turns
//! the vertices produced by the widget layer into frames.
//!
//! A frame is one render pass with five subpasses:
//! * boxes - rounded rectangles with borders
//! * images - `PagedImage`s stored in pages of a shared atlas
//! * glyphs - signed distance field glyphs with subpixel coverage
//! * alpha overrides
//! * a tone mapper copying the HDR attachment into the swapchain image
//!
//! ## Drawing API
//!
//! * Create a `GfxSystem` from a `CreateInfo`
//! * Hand it the `vk::SurfaceKHR` of your window (`make_surface`)
//! * Call `Surface::update` with the window size whenever it may have changed
//! * For every frame:
//!   * `render_start` with the area that needs repainting
//!   * fill the returned `DrawContext`, skip this if it has no frame buffer index
//!   * `render_finish`
//!
//! Losing the swapchain, the window or the device is handled by the
//! Surface. The affected frame is skipped and the next `update` rebuilds
//! whatever was lost.
//!
//! ## Requirements
//!
//! Vulkan 1.2 with the following extensions:
//! * VK_KHR_surface
//! * VK_KHR_swapchain
//! * VK_EXT_debug_utils (only with validation)
//!
//! Dual source blending and lazily allocated memory are used when available.

#[macro_use]
extern crate memoffset;
#[macro_use]
extern crate lazy_static;

pub mod atlas;
pub mod config;
pub mod device;
pub mod draw_context;
pub mod error;
mod image_atlas;
mod instance;
pub mod paged_image;
pub mod pipelines;
pub mod platform;
pub mod sdf_atlas;
pub mod surface;
pub mod swapchain;
pub mod system;
pub mod vertex_span;

#[cfg(test)]
mod tests;

pub use config::{CreateInfo, CreateInfoBuilder};
pub use device::Device;
pub use draw_context::{BorderSide, BoxAttributes, DrawContext};
pub use error::{Result, SquallError};
pub use paged_image::{PagedImage, PagedImageState};
pub use pipelines::SubpixelOrientation;
pub use sdf_atlas::GlyphRect;
pub use surface::{
    BuiltSwapchain, DelegateFrame, DelegateId, Surface, SurfaceDelegate, SurfaceLoss, SurfaceState,
    VkSurface,
};
pub use system::GfxSystem;

// Re-export some things from utils so clients can use them
extern crate utils;
pub use crate::utils::pixmap::{Pixmap, Rgba16F};
pub use crate::utils::region::Rect;

lazy_static! {
    /// Guards every mutation of GPU objects
    ///
    /// Public entry points of Surface, Device and PagedImage take it.
    /// It is recursive since they call each other while holding it.
    pub static ref GFX_SYSTEM_MUTEX: parking_lot::ReentrantMutex<()> =
        parking_lot::ReentrantMutex::new(());
}
