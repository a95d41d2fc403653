// A window we render into
//
// The Surface ties a native window to a Device and a swapchain. It is
// a state machine: resources are built up to `HasSwapchain` by
// `update`, and whenever something is lost along the way it is torn
// down just as deep as needed and built again on the next update.
//
// The GPU work is done by a `SurfaceBackend`. `VkSurfaceBackend` is the
// real one, the tests drive the state machine with a recording mock.
// Delegates added to a surface draw into each frame before the UI.

pub mod vulkan;

use ash::vk;

use crate::draw_context::{DrawContext, FrameSpans};
use crate::pipelines::SubpixelOrientation;
use crate::{Result, SquallError, GFX_SYSTEM_MUTEX};
use utils::region::Rect;

use std::time::Duration;

pub use vulkan::{VkSurface, VkSurfaceBackend};

/// How long a presented image stays on screen, assuming 60Hz
pub const REFRESH_INTERVAL: Duration = Duration::from_micros(16_667);

/// How far a surface has been built
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SurfaceState {
    NoWindow,
    HasWindow,
    HasDevice,
    HasSwapchain,
}

/// How deep the next teardown has to go
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SurfaceLoss {
    None,
    SwapchainLost,
    DeviceLost,
    WindowLost,
}

/// What the backend created for a new swapchain
///
/// Delegates get this too, so they can render into the images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltSwapchain {
    pub image_count: usize,
    pub granularity: vk::Extent2D,
    pub extent: vk::Extent2D,
    pub format: vk::SurfaceFormatKHR,
    pub image_views: Vec<vk::ImageView>,
}

/// One frame ready to be recorded
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameSubmission {
    pub index: u32,
    /// In Vulkan coordinates, already clamped to the swapchain
    pub scissor: vk::Rect2D,
    /// Signaled by the last draw before ours, waited on at
    /// COLOR_ATTACHMENT_OUTPUT
    pub wait_semaphore: vk::Semaphore,
}

/// What a delegate needs to draw its part of a frame
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DelegateFrame {
    /// swapchain image being drawn
    pub index: u32,
    /// must be waited on before touching the image
    pub wait_semaphore: vk::Semaphore,
    /// must be signaled once the delegate is done with the image
    pub signal_semaphore: vk::Semaphore,
    /// In Vulkan coordinates, the part of the image being redrawn
    pub render_area: vk::Rect2D,
}

/// Renders into a surface's swapchain images ahead of the UI
///
/// Delegates follow the lifetime of the surface's pipelines. They are
/// built after the pipelines, torn down before them and with the
/// device idle. The teardown methods may be called on a delegate that
/// was never (or only partially) built.
pub trait SurfaceDelegate<D> {
    fn build_for_new_device(&mut self, dev: &D) -> Result<()>;

    fn teardown_for_device_lost(&mut self);

    fn build_for_new_swapchain(&mut self, swapchain: &BuiltSwapchain) -> Result<()>;

    fn teardown_for_swapchain_lost(&mut self);

    /// Submit the delegate's work for one frame
    ///
    /// The image is in PRESENT_SRC_KHR layout before and after.
    fn draw(&mut self, frame: &DelegateFrame) -> Result<()>;
}

/// Identifies a delegate added to a surface
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DelegateId(u64);

struct DelegateSlot<D> {
    id: DelegateId,
    delegate: Box<dyn SurfaceDelegate<D>>,
    /// signaled by the delegate's draw, null without a device
    semaphore: vk::Semaphore,
}

/// The GPU side of a Surface
///
/// Methods are only called by the Surface with the gfx system mutex
/// held, and only in states where they make sense. The teardown methods
/// must tolerate resources that were never (or only partially) built.
pub trait SurfaceBackend {
    type Device;

    fn has_device(&self) -> bool;

    /// The bound device
    fn device(&self) -> Option<&Self::Device>;

    /// Bind `dev`. Any previous device was already unbound.
    fn set_device(&mut self, dev: Self::Device);

    /// Find and bind the best device for this window
    fn find_device(&mut self) -> Result<()>;

    /// The bound device reported that it is lost
    ///
    /// Called before it is torn down so it won't be handed out again.
    fn device_lost(&mut self);

    /// Create the pipeline resources that live as long as the device
    fn build_for_new_device(&mut self) -> Result<()>;

    /// Free the device level resources and unbind the device
    ///
    /// The device is idle.
    fn teardown_for_device_lost(&mut self);

    /// Block until the bound device finished all work
    fn wait_idle(&mut self);

    fn create_semaphore(&mut self) -> Result<vk::Semaphore>;

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore);

    fn surface_capabilities(&mut self) -> Result<vk::SurfaceCapabilitiesKHR>;

    /// Create the swapchain, its attachments and the pipelines using them
    fn build_swapchain(
        &mut self,
        count: u32,
        extent: vk::Extent2D,
        caps: &vk::SurfaceCapabilitiesKHR,
    ) -> Result<BuiltSwapchain>;

    /// Destroy the swapchain. The device is idle.
    fn teardown_swapchain(&mut self);

    /// Destroy the window surface
    fn destroy_window(&mut self);

    /// Returns None when no image is available yet
    fn acquire_next_image(&mut self) -> Result<Option<u32>>;

    /// Block until the previous frame finished
    fn wait_for_frame(&mut self) -> Result<()>;

    /// Start drawing the acquired image `index`
    ///
    /// An image drawn for the first time is moved from UNDEFINED to
    /// PRESENT_SRC_KHR after the acquire. Returns the semaphore the
    /// first draw of the frame has to wait on.
    fn begin_frame(&mut self, index: u32, first_use: bool) -> Result<vk::Semaphore>;

    /// Record and submit a frame
    fn submit_frame(&mut self, frame: &FrameSubmission, ctx: &DrawContext) -> Result<()>;

    fn present(&mut self, index: u32) -> Result<()>;
}

/// Per swapchain image bookkeeping
#[derive(Debug, Copy, Clone, PartialEq, Default)]
struct SwapchainImageInfo {
    redraw_rectangle: Rect<f32>,
    layout_is_present: bool,
}

/// Clamp the image count and size we would like to what the surface allows
///
/// A max image count of zero means there is no limit, in which case we
/// use no more than three images.
pub fn clamp_count_and_size(
    preferred_count: u32,
    size: vk::Extent2D,
    caps: &vk::SurfaceCapabilitiesKHR,
) -> (u32, vk::Extent2D) {
    let max_count = match caps.max_image_count {
        0 => caps.min_image_count.max(3),
        n => n,
    };
    let count = preferred_count.max(caps.min_image_count).min(max_count);

    let extent = vk::Extent2D {
        width: size
            .width
            .max(caps.min_image_extent.width)
            .min(caps.max_image_extent.width),
        height: size
            .height
            .max(caps.min_image_extent.height)
            .min(caps.max_image_extent.height),
    };
    (count, extent)
}

/// True if a swapchain can't be created because the window is minimized
pub fn is_minimized(size: vk::Extent2D, caps: &vk::SurfaceCapabilitiesKHR) -> bool {
    let zero = |e: vk::Extent2D| e.width == 0 || e.height == 0;

    zero(size) || zero(caps.current_extent) || zero(caps.max_image_extent)
}

/// Convert a window rectangle to a Vulkan scissor
///
/// The rectangle is clamped to `extent` and flipped, Vulkan has its
/// origin in the top-left corner.
pub fn vulkan_scissor(rect: &Rect<f32>, extent: vk::Extent2D) -> vk::Rect2D {
    let window = Rect::new(0.0, 0.0, extent.width as f32, extent.height as f32);
    let clamped = rect.intersection(&window);
    if clamped.is_empty() {
        return vk::Rect2D::default();
    }

    let left = clamped.left().floor() as i32;
    let bottom = clamped.bottom().floor() as i32;
    let right = (clamped.right().ceil() as i32).min(extent.width as i32);
    let top = (clamped.top().ceil() as i32).min(extent.height as i32);

    vk::Rect2D {
        offset: vk::Offset2D {
            x: left,
            y: extent.height as i32 - top,
        },
        extent: vk::Extent2D {
            width: (right - left) as u32,
            height: (top - bottom) as u32,
        },
    }
}

pub struct Surface<B: SurfaceBackend> {
    s_backend: B,
    s_state: SurfaceState,
    s_loss: SurfaceLoss,
    s_extent: vk::Extent2D,
    s_granularity: vk::Extent2D,
    s_images: Vec<SwapchainImageInfo>,
    /// the current swapchain, handed to delegates added later
    s_swapchain: Option<BuiltSwapchain>,
    /// bumped whenever the swapchain is built or torn down
    s_generation: u64,
    s_delegates: Vec<DelegateSlot<B::Device>>,
    s_next_delegate: u64,
    s_frame_count: u64,
    s_preferred_count: u32,
    /// kept between frames so the spans don't have to be reallocated
    s_spans: Option<FrameSpans>,
    s_subpixel_orientation: SubpixelOrientation,
    s_saturation: f32,
}

impl<B: SurfaceBackend> Surface<B> {
    /// Wrap a backend whose window already exists
    pub fn new(backend: B, preferred_count: u32, saturation: f32) -> Self {
        Self {
            s_backend: backend,
            s_state: SurfaceState::HasWindow,
            s_loss: SurfaceLoss::None,
            s_extent: vk::Extent2D::default(),
            s_granularity: vk::Extent2D {
                width: 1,
                height: 1,
            },
            s_images: Vec::new(),
            s_swapchain: None,
            s_generation: 0,
            s_delegates: Vec::new(),
            s_next_delegate: 0,
            s_frame_count: 0,
            s_preferred_count: preferred_count,
            s_spans: Some(FrameSpans::default()),
            s_subpixel_orientation: SubpixelOrientation::Unknown,
            s_saturation: saturation,
        }
    }

    pub fn backend(&self) -> &B {
        &self.s_backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.s_backend
    }

    pub fn state(&self) -> SurfaceState {
        self.s_state
    }

    pub fn loss(&self) -> SurfaceLoss {
        self.s_loss
    }

    pub fn current_extent(&self) -> vk::Extent2D {
        self.s_extent
    }

    pub fn frame_count(&self) -> u64 {
        self.s_frame_count
    }

    pub fn render_area_granularity(&self) -> vk::Extent2D {
        self.s_granularity
    }

    /// Changes every time the swapchain is rebuilt
    pub fn swapchain_generation(&self) -> u64 {
        self.s_generation
    }

    pub fn delegate_count(&self) -> usize {
        self.s_delegates.len()
    }

    pub fn swapchain_image_count(&self) -> usize {
        self.s_images.len()
    }

    pub fn layout_is_present(&self, index: usize) -> bool {
        self.s_images
            .get(index)
            .map(|i| i.layout_is_present)
            .unwrap_or(false)
    }

    pub fn redraw_rectangle(&self, index: usize) -> Rect<f32> {
        self.s_images
            .get(index)
            .map(|i| i.redraw_rectangle)
            .unwrap_or_default()
    }

    pub fn set_subpixel_orientation(&mut self, orientation: SubpixelOrientation) {
        self.s_subpixel_orientation = orientation;
    }

    pub fn set_saturation(&mut self, saturation: f32) {
        self.s_saturation = saturation;
    }

    fn raise(&mut self, loss: SurfaceLoss) {
        if loss > self.s_loss {
            log::debug!("Surface loss raised from {:?} to {:?}", self.s_loss, loss);
            self.s_loss = loss;
        }
    }

    /// Record the loss carried by `err`
    ///
    /// Errors that are not a loss raise `fallback` and are handed back
    /// so the caller can propagate them.
    fn absorb(&mut self, err: SquallError, fallback: SurfaceLoss) -> Result<()> {
        match err.loss() {
            Some(loss) => {
                if loss == SurfaceLoss::DeviceLost {
                    self.s_backend.device_lost();
                }
                self.raise(loss);
                Ok(())
            }
            None => {
                self.raise(fallback);
                Err(err)
            }
        }
    }

    /// Bind this surface to `dev`
    ///
    /// A previously bound device is released first.
    pub fn set_device(&mut self, dev: B::Device) -> Result<()> {
        let _lock = GFX_SYSTEM_MUTEX.lock();

        if self.s_state == SurfaceState::NoWindow {
            return Err(SquallError::INVALID_STATE);
        }
        if self.s_backend.has_device() || self.s_state >= SurfaceState::HasDevice {
            self.raise(SurfaceLoss::DeviceLost);
            self.teardown();
        }

        self.s_backend.set_device(dev);
        Ok(())
    }

    /// The windowing layer tells us the native window is gone
    pub fn set_window_lost(&mut self) {
        let _lock = GFX_SYSTEM_MUTEX.lock();

        self.raise(SurfaceLoss::WindowLost);
        self.teardown();
    }

    /// Let `delegate` draw into the swapchain images before the UI
    ///
    /// The delegate is brought up to the current state of the surface
    /// right away. It draws after the delegates added before it.
    pub fn add_delegate(
        &mut self,
        mut delegate: Box<dyn SurfaceDelegate<B::Device>>,
    ) -> Result<DelegateId> {
        let _lock = GFX_SYSTEM_MUTEX.lock();

        let id = DelegateId(self.s_next_delegate);
        self.s_next_delegate += 1;

        let mut semaphore = vk::Semaphore::null();
        if self.s_state >= SurfaceState::HasDevice {
            let dev = self.s_backend.device().ok_or(SquallError::INVALID_STATE)?;
            if let Err(e) = delegate.build_for_new_device(dev) {
                delegate.teardown_for_device_lost();
                return Err(e);
            }
            semaphore = match self.s_backend.create_semaphore() {
                Ok(s) => s,
                Err(e) => {
                    delegate.teardown_for_device_lost();
                    return Err(e);
                }
            };
        }
        if self.s_state == SurfaceState::HasSwapchain {
            if let Some(swapchain) = self.s_swapchain.as_ref() {
                if let Err(e) = delegate.build_for_new_swapchain(swapchain) {
                    delegate.teardown_for_swapchain_lost();
                    delegate.teardown_for_device_lost();
                    self.s_backend.destroy_semaphore(semaphore);
                    return Err(e);
                }
            }
        }

        log::debug!("Added surface delegate {:?}", id);
        self.s_delegates.push(DelegateSlot {
            id: id,
            delegate: delegate,
            semaphore: semaphore,
        });
        Ok(id)
    }

    /// Tear down and hand back the delegate `id`
    pub fn remove_delegate(
        &mut self,
        id: DelegateId,
    ) -> Option<Box<dyn SurfaceDelegate<B::Device>>> {
        let _lock = GFX_SYSTEM_MUTEX.lock();

        let pos = self.s_delegates.iter().position(|d| d.id == id)?;
        let mut slot = self.s_delegates.remove(pos);

        if self.s_state >= SurfaceState::HasDevice {
            // it may still be drawing
            self.s_backend.wait_idle();
        }
        if self.s_state == SurfaceState::HasSwapchain {
            slot.delegate.teardown_for_swapchain_lost();
        }
        if self.s_state >= SurfaceState::HasDevice {
            slot.delegate.teardown_for_device_lost();
        }
        if slot.semaphore != vk::Semaphore::null() {
            self.s_backend.destroy_semaphore(slot.semaphore);
        }

        log::debug!("Removed surface delegate {:?}", id);
        Some(slot.delegate)
    }

    /// Bring the surface up to date with a window of `new_size`
    ///
    /// Recoverable losses are handled here and leave the surface in the
    /// deepest state that could be built. Other errors are returned.
    pub fn update(&mut self, new_size: vk::Extent2D) -> Result<()> {
        let _lock = GFX_SYSTEM_MUTEX.lock();

        if self.s_state == SurfaceState::HasSwapchain && new_size != self.s_extent {
            log::debug!(
                "Window resized from {:?} to {:?}",
                self.s_extent,
                new_size
            );
            self.raise(SurfaceLoss::SwapchainLost);
        }

        self.teardown();
        self.build(new_size)
    }

    /// Unwind as deep as the current loss
    fn teardown(&mut self) {
        if self.s_state == SurfaceState::HasSwapchain && self.s_loss >= SurfaceLoss::SwapchainLost {
            log::debug!("Tearing down swapchain");
            self.teardown_swapchain();
            self.s_extent = vk::Extent2D::default();
            self.s_state = SurfaceState::HasDevice;
        }

        if self.s_state != SurfaceState::NoWindow
            && self.s_state <= SurfaceState::HasDevice
            && self.s_loss >= SurfaceLoss::DeviceLost
        {
            log::debug!("Tearing down device resources");
            self.teardown_device();
            self.s_state = SurfaceState::HasWindow;
        }

        if self.s_state == SurfaceState::HasWindow && self.s_loss >= SurfaceLoss::WindowLost {
            log::debug!("Destroying window surface");
            self.s_backend.destroy_window();
            self.s_state = SurfaceState::NoWindow;
        }

        self.s_loss = SurfaceLoss::None;
    }

    /// Delegates are torn down before the pipelines, with the device idle
    fn teardown_swapchain(&mut self) {
        self.s_backend.wait_idle();
        for slot in self.s_delegates.iter_mut() {
            slot.delegate.teardown_for_swapchain_lost();
        }
        self.s_backend.teardown_swapchain();
        self.s_images.clear();
        self.s_swapchain = None;
        self.s_generation += 1;
    }

    fn teardown_device(&mut self) {
        self.s_backend.wait_idle();
        for slot in self.s_delegates.iter_mut() {
            slot.delegate.teardown_for_device_lost();
            if slot.semaphore != vk::Semaphore::null() {
                self.s_backend.destroy_semaphore(slot.semaphore);
                slot.semaphore = vk::Semaphore::null();
            }
        }
        self.s_backend.teardown_for_device_lost();
    }

    fn build(&mut self, new_size: vk::Extent2D) -> Result<()> {
        if self.s_state == SurfaceState::HasWindow {
            if let Err(e) = self.build_device() {
                return self.absorb(e, SurfaceLoss::DeviceLost);
            }
            self.s_state = SurfaceState::HasDevice;
        }

        if self.s_state == SurfaceState::HasDevice {
            match self.build_swapchain(new_size) {
                Ok(true) => self.s_state = SurfaceState::HasSwapchain,
                Ok(false) => self.raise(SurfaceLoss::SwapchainLost),
                Err(e) => return self.absorb(e, SurfaceLoss::SwapchainLost),
            }
        }
        Ok(())
    }

    fn build_device(&mut self) -> Result<()> {
        if !self.s_backend.has_device() {
            self.s_backend.find_device()?;
        }
        self.s_backend.build_for_new_device()?;

        let backend = &mut self.s_backend;
        for slot in self.s_delegates.iter_mut() {
            let dev = backend.device().ok_or(SquallError::INVALID_STATE)?;
            slot.delegate.build_for_new_device(dev)?;
            slot.semaphore = backend.create_semaphore()?;
        }
        Ok(())
    }

    /// Returns false if the window is minimized or changed while
    /// building, the swapchain has to be built again later.
    fn build_swapchain(&mut self, new_size: vk::Extent2D) -> Result<bool> {
        let caps = self.s_backend.surface_capabilities()?;
        if is_minimized(new_size, &caps) {
            log::debug!("Window is minimized, not building a swapchain");
            return Ok(false);
        }

        let (count, extent) = clamp_count_and_size(self.s_preferred_count, new_size, &caps);
        let built = self.s_backend.build_swapchain(count, extent, &caps)?;

        // The window may have been resized while we were busy
        let recheck = self.s_backend.surface_capabilities();
        let unchanged = match &recheck {
            Ok(caps) => {
                !is_minimized(new_size, caps)
                    && clamp_count_and_size(self.s_preferred_count, new_size, caps)
                        == (count, extent)
            }
            Err(_) => false,
        };
        if !unchanged {
            log::debug!("Window changed while building the swapchain");
            self.s_backend.wait_idle();
            self.s_backend.teardown_swapchain();
            return recheck.map(|_| false);
        }

        let mut res = Ok(());
        for slot in self.s_delegates.iter_mut() {
            res = slot.delegate.build_for_new_swapchain(&built);
            if res.is_err() {
                break;
            }
        }
        if let Err(e) = res {
            log::error!("Could not build surface delegate for the new swapchain: {}", e);
            self.teardown_swapchain();
            return Err(e);
        }

        log::info!(
            "Built swapchain of {} images at {}x{}",
            built.image_count,
            extent.width,
            extent.height
        );
        self.s_extent = extent;
        self.s_granularity = built.granularity;
        self.s_images = vec![SwapchainImageInfo::default(); built.image_count];
        self.s_swapchain = Some(built);
        self.s_generation += 1;
        Ok(true)
    }

    fn blank_context(&mut self) -> DrawContext {
        DrawContext::new(
            self.s_spans.take().unwrap_or_default(),
            self.s_frame_count,
            self.frame_latency(),
            self.s_subpixel_orientation,
            self.s_saturation,
        )
    }

    /// Start a frame repainting `redraw`
    ///
    /// If no frame can be drawn right now the returned context has no
    /// frame buffer index and the caller should skip the frame.
    pub fn render_start(&mut self, redraw: Rect<f32>) -> DrawContext {
        let _lock = GFX_SYSTEM_MUTEX.lock();

        let window = Rect::new(
            0.0,
            0.0,
            self.s_extent.width as f32,
            self.s_extent.height as f32,
        );
        let redraw = redraw
            .intersection(&window)
            .round_to_granularity((self.s_granularity.width, self.s_granularity.height));

        let mut ctx = self.blank_context();
        if self.s_state != SurfaceState::HasSwapchain || redraw.is_empty() {
            return ctx;
        }

        let index = match self.s_backend.acquire_next_image() {
            Ok(Some(i)) if (i as usize) < self.s_images.len() => i,
            Ok(Some(i)) => {
                log::error!("Acquired swapchain image {} does not exist", i);
                self.raise(SurfaceLoss::SwapchainLost);
                return ctx;
            }
            Ok(None) => return ctx,
            Err(e) => {
                if let Err(e) = self.absorb(e, SurfaceLoss::SwapchainLost) {
                    log::error!("Could not acquire swapchain image: {}", e);
                }
                return ctx;
            }
        };

        self.s_images[index as usize].redraw_rectangle = redraw;
        let scissor = self
            .s_images
            .iter()
            .fold(Rect::default(), |acc, image| acc.union(&image.redraw_rectangle));

        if let Err(e) = self.s_backend.wait_for_frame() {
            if let Err(e) = self.absorb(e, SurfaceLoss::DeviceLost) {
                log::error!("Could not wait for the previous frame: {}", e);
            }
            return ctx;
        }

        ctx.set_frame(index, self.s_generation, scissor, redraw);
        ctx
    }

    /// Time from starting a frame until it is on screen
    ///
    /// Every image queued ahead of this one is shown for a refresh
    /// first.
    fn frame_latency(&self) -> Duration {
        let queued = self.s_images.len().max(1) as u32;
        REFRESH_INTERVAL * queued
    }

    /// True if `ctx` was started on the current swapchain
    fn is_current(&self, ctx: &DrawContext, index: u32) -> bool {
        self.s_state == SurfaceState::HasSwapchain
            && ctx.swapchain_generation() == self.s_generation
            && (index as usize) < self.s_images.len()
    }

    /// Submit and present the frame of `ctx`
    ///
    /// A context started before the swapchain was rebuilt is dropped,
    /// its image was never acquired from the new swapchain.
    pub fn render_finish(&mut self, ctx: DrawContext) -> Result<()> {
        let _lock = GFX_SYSTEM_MUTEX.lock();

        let index = match ctx.frame_buffer_index() {
            Some(i) if self.is_current(&ctx, i) => i,
            other => {
                if let Some(i) = other {
                    log::debug!(
                        "Dropping frame for image {} of swapchain generation {}, now at {}",
                        i,
                        ctx.swapchain_generation(),
                        self.s_generation
                    );
                }
                // a skipped frame may still have raised a loss
                self.s_spans = Some(ctx.into_spans());
                self.teardown();
                return Ok(());
            }
        };

        let scissor = vulkan_scissor(&ctx.scissor_rectangle(), self.s_extent);
        let res = match self.draw_frame(index, scissor, &ctx) {
            Ok(()) => Ok(()),
            Err(e) => self.absorb(e, SurfaceLoss::SwapchainLost),
        };

        self.s_spans = Some(ctx.into_spans());
        self.teardown();
        res
    }

    /// Chain the delegates and the UI on the acquired image and present it
    ///
    /// Each draw waits on the semaphore signaled by the one before.
    fn draw_frame(&mut self, index: u32, scissor: vk::Rect2D, ctx: &DrawContext) -> Result<()> {
        let first_use = !self.s_images[index as usize].layout_is_present;
        let mut wait = self.s_backend.begin_frame(index, first_use)?;
        self.s_images[index as usize].layout_is_present = true;

        for slot in self.s_delegates.iter_mut() {
            let frame = DelegateFrame {
                index: index,
                wait_semaphore: wait,
                signal_semaphore: slot.semaphore,
                render_area: scissor,
            };
            slot.delegate.draw(&frame)?;
            wait = slot.semaphore;
        }

        let frame = FrameSubmission {
            index: index,
            scissor: scissor,
            wait_semaphore: wait,
        };
        self.s_backend.submit_frame(&frame, ctx)?;
        self.s_frame_count += 1;
        self.s_backend.present(index)
    }
}

impl<B: SurfaceBackend> Drop for Surface<B> {
    fn drop(&mut self) {
        let _lock = GFX_SYSTEM_MUTEX.lock();

        self.raise(SurfaceLoss::WindowLost);
        self.teardown();
    }
}
