// The Vulkan side of a Surface
//
// Holds the window's vk::SurfaceKHR, the Device it is bound to, the
// five pipelines and the swapchain. Delegates of a VkSurface get the
// bound Arc<Device>.

use ash::vk;

use super::{BuiltSwapchain, FrameSubmission, Surface, SurfaceBackend};
use crate::device::Device;
use crate::draw_context::DrawContext;
use crate::pipelines::{make_pipelines, Pipeline, SubpassInfo};
use crate::platform::DeviceScore;
use crate::swapchain::Swapchain;
use crate::system::GfxSystem;
use crate::{Result, SquallError};

use std::sync::Arc;

/// A Surface rendering with Vulkan
pub type VkSurface = Surface<VkSurfaceBackend>;

pub struct VkSurfaceBackend {
    vb_system: Arc<GfxSystem>,
    vb_surface: vk::SurfaceKHR,
    vb_dev: Option<Arc<Device>>,
    /// format and present mode the device chose for our surface
    vb_score: Option<DeviceScore>,
    /// in subpass order
    vb_pipelines: Vec<Box<dyn Pipeline>>,
    vb_swapchain: Option<Swapchain>,
    vb_clear_color: [f32; 4],
}

impl VkSurfaceBackend {
    pub(crate) fn new(system: Arc<GfxSystem>, surface: vk::SurfaceKHR, clear_color: [f32; 4]) -> Self {
        Self {
            vb_system: system,
            vb_surface: surface,
            vb_dev: None,
            vb_score: None,
            vb_pipelines: make_pipelines(),
            vb_swapchain: None,
            vb_clear_color: clear_color,
        }
    }

    fn bound_device(&self) -> Result<Arc<Device>> {
        self.vb_dev.clone().ok_or(SquallError::INVALID_STATE)
    }

    fn idle(dev: &Device) {
        if let Err(e) = unsafe { dev.dev.device_wait_idle() } {
            log::error!("Could not idle device {}: {:?}", dev.name(), e);
            if e == vk::Result::ERROR_DEVICE_LOST {
                dev.mark_lost();
            }
        }
    }
}

impl SurfaceBackend for VkSurfaceBackend {
    type Device = Arc<Device>;

    fn has_device(&self) -> bool {
        self.vb_dev.is_some()
    }

    fn device(&self) -> Option<&Arc<Device>> {
        self.vb_dev.as_ref()
    }

    fn set_device(&mut self, dev: Arc<Device>) {
        log::debug!("Binding surface to device {}", dev.name());
        self.vb_dev = Some(dev);
        self.vb_score = None;
    }

    fn find_device(&mut self) -> Result<()> {
        match self.vb_system.find_best_device(self.vb_surface)? {
            Some(dev) => {
                self.set_device(dev);
                Ok(())
            }
            None => Err(SquallError::NO_SUITABLE_DEVICE),
        }
    }

    fn device_lost(&mut self) {
        if let Some(dev) = self.vb_dev.as_ref() {
            dev.mark_lost();
        }
    }

    fn build_for_new_device(&mut self) -> Result<()> {
        let dev = self.bound_device()?;
        let score = dev
            .score_surface(self.vb_surface)?
            .ok_or(SquallError::NO_SUITABLE_DEVICE)?;

        for pipeline in self.vb_pipelines.iter_mut() {
            log::debug!("Building {} pipeline for device {}", pipeline.name(), dev.name());
            pipeline.build_for_new_device(&dev)?;
        }
        self.vb_score = Some(score);
        Ok(())
    }

    fn teardown_for_device_lost(&mut self) {
        if let Some(dev) = self.vb_dev.take() {
            for pipeline in self.vb_pipelines.iter_mut().rev() {
                pipeline.teardown_for_device_lost(&dev);
            }
        }
        self.vb_score = None;
    }

    fn wait_idle(&mut self) {
        if let Some(dev) = self.vb_dev.as_ref() {
            Self::idle(dev);
        }
    }

    fn create_semaphore(&mut self) -> Result<vk::Semaphore> {
        let dev = self.bound_device()?;
        let info = vk::SemaphoreCreateInfo::default();
        Ok(unsafe { dev.dev.create_semaphore(&info, None)? })
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        if let Some(dev) = self.vb_dev.as_ref() {
            unsafe { dev.dev.destroy_semaphore(semaphore, None) };
        }
    }

    fn surface_capabilities(&mut self) -> Result<vk::SurfaceCapabilitiesKHR> {
        let dev = self.bound_device()?;
        Ok(unsafe {
            dev.inst
                .surface_loader
                .get_physical_device_surface_capabilities(dev.pdev, self.vb_surface)?
        })
    }

    fn build_swapchain(
        &mut self,
        count: u32,
        extent: vk::Extent2D,
        caps: &vk::SurfaceCapabilitiesKHR,
    ) -> Result<BuiltSwapchain> {
        let dev = self.bound_device()?;
        let score = self.vb_score.ok_or(SquallError::INVALID_STATE)?;

        let swapchain = Swapchain::new(&dev, self.vb_surface, &score, caps, count, extent)?;
        let built = BuiltSwapchain {
            image_count: swapchain.image_count(),
            granularity: swapchain.granularity(),
            extent: swapchain.extent(),
            format: swapchain.format(),
            image_views: swapchain.image_views().to_vec(),
        };
        let mut info = SubpassInfo {
            render_pass: swapchain.render_pass(),
            subpass: 0,
            extent: swapchain.extent(),
            hdr_view: swapchain.hdr_view(),
        };
        self.vb_swapchain = Some(swapchain);

        let mut res = Ok(());
        for (i, pipeline) in self.vb_pipelines.iter_mut().enumerate() {
            info.subpass = i as u32;
            if let Err(e) = pipeline.build_for_new_swapchain(&dev, &info) {
                log::error!("Could not build {} pipeline: {}", pipeline.name(), e);
                res = Err(e);
                break;
            }
        }

        match res {
            Ok(()) => Ok(built),
            Err(e) => {
                Self::idle(&dev);
                self.teardown_swapchain();
                Err(e)
            }
        }
    }

    fn teardown_swapchain(&mut self) {
        let dev = match self.vb_dev.as_ref() {
            Some(d) => d,
            None => return,
        };

        for pipeline in self.vb_pipelines.iter_mut().rev() {
            pipeline.teardown_for_swapchain_lost(dev);
        }
        if let Some(mut swapchain) = self.vb_swapchain.take() {
            swapchain.destroy(dev);
        }
    }

    fn destroy_window(&mut self) {
        if self.vb_surface != vk::SurfaceKHR::null() {
            unsafe {
                self.vb_system
                    .instance()
                    .surface_loader
                    .destroy_surface(self.vb_surface, None)
            };
            self.vb_surface = vk::SurfaceKHR::null();
        }
    }

    fn acquire_next_image(&mut self) -> Result<Option<u32>> {
        let dev = self.vb_dev.as_ref().ok_or(SquallError::INVALID_STATE)?;
        let swapchain = self.vb_swapchain.as_ref().ok_or(SquallError::INVALID_STATE)?;
        swapchain.acquire_next_image(dev)
    }

    fn wait_for_frame(&mut self) -> Result<()> {
        let dev = self.vb_dev.as_ref().ok_or(SquallError::INVALID_STATE)?;
        let swapchain = self.vb_swapchain.as_ref().ok_or(SquallError::INVALID_STATE)?;
        swapchain.wait_for_frame(dev)
    }

    fn begin_frame(&mut self, index: u32, first_use: bool) -> Result<vk::Semaphore> {
        let dev = self.vb_dev.as_ref().ok_or(SquallError::INVALID_STATE)?;
        let swapchain = self.vb_swapchain.as_ref().ok_or(SquallError::INVALID_STATE)?;
        swapchain.begin_frame(dev, index, first_use)
    }

    fn submit_frame(&mut self, frame: &FrameSubmission, ctx: &DrawContext) -> Result<()> {
        let dev = self.vb_dev.as_ref().ok_or(SquallError::INVALID_STATE)?;
        let swapchain = self.vb_swapchain.as_ref().ok_or(SquallError::INVALID_STATE)?;

        swapchain.record_frame(
            dev,
            frame.index,
            frame.scissor,
            self.vb_clear_color,
            self.vb_pipelines.as_mut_slice(),
            ctx,
        )?;
        swapchain.submit(dev, frame.wait_semaphore)
    }

    fn present(&mut self, index: u32) -> Result<()> {
        let dev = self.vb_dev.as_ref().ok_or(SquallError::INVALID_STATE)?;
        let swapchain = self.vb_swapchain.as_ref().ok_or(SquallError::INVALID_STATE)?;
        swapchain.present(dev, index)
    }
}
