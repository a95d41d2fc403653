// The process wide graphics system
//
// Owns the Vulkan instance and every Device created so far. Surfaces
// ask it for the best device for their window, and devices are reused
// across surfaces whenever they can present to the new window.

use ash::vk;

use crate::device::Device;
use crate::instance::Instance;
use crate::platform::{self, DeviceScore};
use crate::surface::{Surface, VkSurface, VkSurfaceBackend};
use crate::{CreateInfo, Result, GFX_SYSTEM_MUTEX};

use parking_lot::Mutex;
use std::sync::Arc;

pub struct GfxSystem {
    gs_inst: Arc<Instance>,
    gs_info: CreateInfo,
    gs_devices: Mutex<Vec<Arc<Device>>>,
}

impl GfxSystem {
    pub fn new(info: &CreateInfo) -> Result<Arc<Self>> {
        let inst = Instance::new(info)?;
        log::info!(
            "Created Vulkan instance for {} (validation {})",
            info.application_name,
            info.enable_validation
        );

        Ok(Arc::new(Self {
            gs_inst: Arc::new(inst),
            gs_info: info.clone(),
            gs_devices: Mutex::new(Vec::new()),
        }))
    }

    pub(crate) fn instance(&self) -> &Instance {
        &self.gs_inst
    }

    pub fn create_info(&self) -> &CreateInfo {
        &self.gs_info
    }

    /// The number of devices created so far
    pub fn device_count(&self) -> usize {
        self.gs_devices.lock().len()
    }

    /// Find the best device to render to `surface`
    ///
    /// An existing device is preferred if it can present to the
    /// surface. Otherwise every physical device is scored and the best
    /// one is created. Lost devices are dropped from the list.
    pub fn find_best_device(&self, surface: vk::SurfaceKHR) -> Result<Option<Arc<Device>>> {
        let _lock = GFX_SYSTEM_MUTEX.lock();
        let mut devices = self.gs_devices.lock();

        devices.retain(|dev| {
            if dev.is_lost() {
                log::info!("Forgetting lost device {}", dev.name());
            }
            !dev.is_lost()
        });

        for dev in devices.iter() {
            if let Some(score) = dev.score_surface(surface)? {
                if score.score > 0 {
                    log::debug!("Reusing device {} (score {})", dev.name(), score.score);
                    return Ok(Some(dev.clone()));
                }
            }
        }

        let pdevs = unsafe { self.gs_inst.inst.enumerate_physical_devices()? };
        let mut best: Option<(vk::PhysicalDevice, DeviceScore)> = None;
        for pdev in pdevs {
            let score = match platform::score_physical_device(
                &self.gs_inst,
                pdev,
                surface,
                self.gs_info.enable_hdr,
            )? {
                Some(s) if s.score > 0 => s,
                _ => continue,
            };

            if best.map(|(_, b)| score.score > b.score).unwrap_or(true) {
                best = Some((pdev, score));
            }
        }

        let (pdev, score) = match best {
            Some(b) => b,
            None => {
                log::error!("No physical device can present to this surface");
                return Ok(None);
            }
        };

        let dev = Device::new(self.gs_inst.clone(), pdev, &score, &self.gs_info)?;
        devices.push(dev.clone());
        Ok(Some(dev))
    }

    /// Wrap a window surface in a Surface
    ///
    /// The Surface takes ownership of `surface` and destroys it when the
    /// window is lost or the Surface is dropped. Call `update` to bind a
    /// device and build the swapchain.
    pub fn make_surface(self: &Arc<Self>, surface: vk::SurfaceKHR) -> VkSurface {
        let backend = VkSurfaceBackend::new(self.clone(), surface, self.gs_info.clear_color);
        Surface::new(
            backend,
            self.gs_info.preferred_image_count,
            self.gs_info.saturation,
        )
    }
}
