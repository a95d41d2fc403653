// Per surface swapchain resources
//
// Everything that has to be rebuilt when the window changes size: the
// VkSwapchainKHR and its views, the depth and HDR attachments shared by
// all swapchain images, the render pass, framebuffers, the frame's
// command buffers and their synchronization objects.

use ash::vk;

use crate::device::Device;
use crate::draw_context::DrawContext;
use crate::pipelines::{Pipeline, SUBPASS_COUNT};
use crate::platform::{DeviceCapabilities, DeviceScore};
use crate::{Result, SquallError};

pub const DEPTH_FORMAT: vk::Format = vk::Format::D16_UNORM;
pub const HDR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// Attachment indices of the render pass and framebuffers
pub const DEPTH_ATTACHMENT: u32 = 0;
pub const HDR_ATTACHMENT: u32 = 1;
pub const SWAPCHAIN_ATTACHMENT: u32 = 2;

/// An image with its memory and one view
#[derive(Debug, Copy, Clone)]
struct Attachment {
    image: vk::Image,
    view: vk::ImageView,
    memory: vk::DeviceMemory,
}

impl Attachment {
    fn null() -> Self {
        Self {
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            memory: vk::DeviceMemory::null(),
        }
    }

    fn destroy(&mut self, dev: &Device) {
        unsafe {
            dev.dev.destroy_image_view(self.view, None);
            dev.dev.destroy_image(self.image, None);
            dev.dev.free_memory(self.memory, None);
        }
        *self = Self::null();
    }
}

/// Access masks and stages moving a fresh image into PRESENT_SRC_KHR
///
/// The transition runs at COLOR_ATTACHMENT_OUTPUT, the stage the
/// acquire semaphore is waited on, so it happens after the
/// presentation engine released the image. Everything drawing into the
/// image afterwards is ordered behind it.
pub fn present_transition_masks() -> (
    (vk::AccessFlags, vk::PipelineStageFlags),
    (vk::AccessFlags, vk::PipelineStageFlags),
) {
    (
        (
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        (
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
    )
}

/// The chain EXTERNAL -> 0 -> 1 -> 2 -> 3 -> 4 -> EXTERNAL
///
/// Subpasses 0 to 3 draw into the HDR and depth attachments, subpass 4
/// reads the HDR attachment as an input attachment.
pub fn subpass_dependencies() -> Vec<vk::SubpassDependency> {
    let draw_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    let draw_access = vk::AccessFlags::COLOR_ATTACHMENT_READ
        | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;

    let mut deps = vec![vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: draw_stages,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: draw_access,
        dependency_flags: vk::DependencyFlags::BY_REGION,
    }];

    for subpass in 1..SUBPASS_COUNT {
        let last = subpass == SUBPASS_COUNT - 1;
        deps.push(vk::SubpassDependency {
            src_subpass: subpass - 1,
            dst_subpass: subpass,
            src_stage_mask: draw_stages,
            dst_stage_mask: match last {
                true => draw_stages | vk::PipelineStageFlags::FRAGMENT_SHADER,
                false => draw_stages,
            },
            src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dst_access_mask: match last {
                true => draw_access | vk::AccessFlags::INPUT_ATTACHMENT_READ,
                false => draw_access,
            },
            dependency_flags: vk::DependencyFlags::BY_REGION,
        });
    }

    deps.push(vk::SubpassDependency {
        src_subpass: SUBPASS_COUNT - 1,
        dst_subpass: vk::SUBPASS_EXTERNAL,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        dst_access_mask: vk::AccessFlags::MEMORY_READ,
        dependency_flags: vk::DependencyFlags::BY_REGION,
    });

    deps
}

/// Create the render pass of a frame
///
/// Render passses signify what attachments are used in which
/// stages. Depth and HDR only live for the duration of the pass, the
/// swapchain image keeps its contents so that a partial redraw leaves
/// the rest of the window alone.
fn create_render_pass(dev: &Device, swapchain_format: vk::Format) -> Result<vk::RenderPass> {
    let attachments = [
        vk::AttachmentDescription {
            format: DEPTH_FORMAT,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ..Default::default()
        },
        vk::AttachmentDescription {
            format: HDR_FORMAT,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ..Default::default()
        },
        vk::AttachmentDescription {
            format: swapchain_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        },
    ];

    let depth_ref = vk::AttachmentReference {
        attachment: DEPTH_ATTACHMENT,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let hdr_refs = [vk::AttachmentReference {
        attachment: HDR_ATTACHMENT,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let hdr_input_refs = [vk::AttachmentReference {
        attachment: HDR_ATTACHMENT,
        layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }];
    let swapchain_refs = [vk::AttachmentReference {
        attachment: SWAPCHAIN_ATTACHMENT,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];

    let mut subpasses: Vec<vk::SubpassDescription> = (0..SUBPASS_COUNT - 1)
        .map(|_| {
            vk::SubpassDescription::builder()
                .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                .color_attachments(&hdr_refs)
                .depth_stencil_attachment(&depth_ref)
                .build()
        })
        .collect();
    subpasses.push(
        vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .input_attachments(&hdr_input_refs)
            .color_attachments(&swapchain_refs)
            .depth_stencil_attachment(&depth_ref)
            .build(),
    );

    let dependencies = subpass_dependencies();
    let create_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(subpasses.as_slice())
        .dependencies(dependencies.as_slice());

    Ok(unsafe { dev.dev.create_render_pass(&create_info, None)? })
}

/// The swapchain and everything built on top of it
pub struct Swapchain {
    sc_swapchain: vk::SwapchainKHR,
    sc_format: vk::SurfaceFormatKHR,
    sc_extent: vk::Extent2D,
    sc_images: Vec<vk::Image>,
    sc_views: Vec<vk::ImageView>,
    sc_depth: Attachment,
    sc_hdr: Attachment,
    pub(crate) sc_render_pass: vk::RenderPass,
    sc_framebuffers: Vec<vk::Framebuffer>,
    sc_granularity: vk::Extent2D,
    sc_cbuf: vk::CommandBuffer,
    /// moves images drawn for the first time out of UNDEFINED
    sc_transition_cbuf: vk::CommandBuffer,
    /// signaled by the presentation engine once the acquired image can
    /// be written
    sc_image_available: vk::Semaphore,
    /// signaled once a first time image was transitioned
    sc_image_ready: vk::Semaphore,
    sc_render_finished: vk::Semaphore,
    /// signaled once the last submitted frame completed, created signaled
    sc_render_finished_fence: vk::Fence,
}

impl Swapchain {
    fn null() -> Self {
        Self {
            sc_swapchain: vk::SwapchainKHR::null(),
            sc_format: vk::SurfaceFormatKHR::default(),
            sc_extent: vk::Extent2D::default(),
            sc_images: Vec::new(),
            sc_views: Vec::new(),
            sc_depth: Attachment::null(),
            sc_hdr: Attachment::null(),
            sc_render_pass: vk::RenderPass::null(),
            sc_framebuffers: Vec::new(),
            sc_granularity: vk::Extent2D {
                width: 1,
                height: 1,
            },
            sc_cbuf: vk::CommandBuffer::null(),
            sc_transition_cbuf: vk::CommandBuffer::null(),
            sc_image_available: vk::Semaphore::null(),
            sc_image_ready: vk::Semaphore::null(),
            sc_render_finished: vk::Semaphore::null(),
            sc_render_finished_fence: vk::Fence::null(),
        }
    }

    /// Build a swapchain of `count` images of `extent` for `surface`
    ///
    /// `count` and `extent` must already be clamped to the surface
    /// capabilities. On failure everything created so far is destroyed.
    pub fn new(
        dev: &Device,
        surface: vk::SurfaceKHR,
        score: &DeviceScore,
        caps: &vk::SurfaceCapabilitiesKHR,
        count: u32,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let mut ret = Self::null();
        ret.sc_format = score.surface_format;
        ret.sc_extent = extent;

        match ret.build(dev, surface, score, caps, count) {
            Ok(()) => Ok(ret),
            Err(e) => {
                ret.destroy(dev);
                Err(e)
            }
        }
    }

    fn build(
        &mut self,
        dev: &Device,
        surface: vk::SurfaceKHR,
        score: &DeviceScore,
        caps: &vk::SurfaceCapabilitiesKHR,
        count: u32,
    ) -> Result<()> {
        self.create_swapchain(dev, surface, score, caps, count)?;

        self.sc_images = unsafe {
            dev.d_swapchain_loader
                .get_swapchain_images(self.sc_swapchain)?
        };
        for image in self.sc_images.iter() {
            let view =
                dev.create_image_view(*image, self.sc_format.format, vk::ImageAspectFlags::COLOR)?;
            self.sc_views.push(view);
        }

        self.create_attachments(dev)?;

        self.sc_render_pass = create_render_pass(dev, self.sc_format.format)?;
        self.sc_granularity = unsafe { dev.dev.get_render_area_granularity(self.sc_render_pass) };

        for view in self.sc_views.iter() {
            // depth, hdr, swapchain
            let attachments = [self.sc_depth.view, self.sc_hdr.view, *view];
            let info = vk::FramebufferCreateInfo::builder()
                .render_pass(self.sc_render_pass)
                .attachments(&attachments)
                .width(self.sc_extent.width)
                .height(self.sc_extent.height)
                .layers(1);

            let framebuffer = unsafe { dev.dev.create_framebuffer(&info, None)? };
            self.sc_framebuffers.push(framebuffer);
        }

        let cbufs = dev.create_command_buffers(dev.graphics_queue().command_pool, 2)?;
        self.sc_cbuf = cbufs[0];
        self.sc_transition_cbuf = cbufs[1];

        let sema_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);
        unsafe {
            self.sc_image_available = dev.dev.create_semaphore(&sema_info, None)?;
            self.sc_image_ready = dev.dev.create_semaphore(&sema_info, None)?;
            self.sc_render_finished = dev.dev.create_semaphore(&sema_info, None)?;
            self.sc_render_finished_fence = dev.dev.create_fence(&fence_info, None)?;
        }

        log::debug!(
            "Created swapchain of {} images at {:?} using {:?}",
            self.sc_images.len(),
            self.sc_extent,
            self.sc_format
        );
        Ok(())
    }

    /// Create the VkSwapchainKHR
    ///
    /// Swapchains contain images that can be used for WSI presentation
    /// They take a vkSurfaceKHR and provide a way to manage swapping
    /// effects such as double/triple buffering (mailbox mode).
    fn create_swapchain(
        &mut self,
        dev: &Device,
        surface: vk::SurfaceKHR,
        score: &DeviceScore,
        caps: &vk::SurfaceCapabilitiesKHR,
        count: u32,
    ) -> Result<()> {
        let transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };

        let composite_alpha = [
            vk::CompositeAlphaFlagsKHR::OPAQUE,
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
            vk::CompositeAlphaFlagsKHR::INHERIT,
        ]
        .iter()
        .cloned()
        .find(|a| caps.supported_composite_alpha.contains(*a))
        .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE);

        let families = [score.graphics_family, score.present_family];
        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(count)
            .image_color_space(score.surface_format.color_space)
            .image_format(score.surface_format.format)
            .image_extent(self.sc_extent)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(transform)
            .composite_alpha(composite_alpha)
            .present_mode(score.present_mode)
            .clipped(true)
            .image_array_layers(1);
        if score.graphics_family != score.present_family {
            create_info = create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families);
        }

        self.sc_swapchain = unsafe {
            dev.d_swapchain_loader
                .create_swapchain(&create_info, None)?
        };
        Ok(())
    }

    /// Create the depth and HDR images shared by every framebuffer
    ///
    /// Neither outlives a render pass, so they are transient and use
    /// lazily allocated memory where the device has it.
    fn create_attachments(&mut self, dev: &Device) -> Result<()> {
        let memory_flags = match dev.capabilities().contains(DeviceCapabilities::LAZY_MEMORY) {
            true => vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::LAZILY_ALLOCATED,
            false => vk::MemoryPropertyFlags::DEVICE_LOCAL,
        };

        let (image, view, memory) = dev.create_image(
            &self.sc_extent,
            DEPTH_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
            memory_flags,
        )?;
        self.sc_depth = Attachment {
            image: image,
            view: view,
            memory: memory,
        };

        let (image, view, memory) = dev.create_image(
            &self.sc_extent,
            HDR_FORMAT,
            vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::INPUT_ATTACHMENT
                | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
            vk::ImageAspectFlags::COLOR,
            memory_flags,
        )?;
        self.sc_hdr = Attachment {
            image: image,
            view: view,
            memory: memory,
        };
        Ok(())
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.sc_extent
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.sc_format
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        self.sc_views.as_slice()
    }

    pub fn image_count(&self) -> usize {
        self.sc_images.len()
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.sc_render_pass
    }

    pub fn hdr_view(&self) -> vk::ImageView {
        self.sc_hdr.view
    }

    pub fn granularity(&self) -> vk::Extent2D {
        self.sc_granularity
    }

    /// Get the next image to draw into without blocking
    ///
    /// Returns None if no image is ready yet.
    pub fn acquire_next_image(&self, dev: &Device) -> Result<Option<u32>> {
        let res = unsafe {
            dev.d_swapchain_loader.acquire_next_image(
                self.sc_swapchain,
                0,
                self.sc_image_available,
                vk::Fence::null(),
            )
        };

        match res {
            Ok((index, false)) => Ok(Some(index)),
            // the image was acquired but the swapchain has to be rebuilt
            Ok((_, true)) => Err(SquallError::SWAPCHAIN_LOST),
            Err(vk::Result::NOT_READY) | Err(vk::Result::TIMEOUT) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Wait for the previous frame to finish and reset the fence
    pub fn wait_for_frame(&self, dev: &Device) -> Result<()> {
        let fences = [self.sc_render_finished_fence];
        unsafe {
            dev.dev.wait_for_fences(&fences, true, u64::MAX)?;
            dev.dev.reset_fences(&fences)?;
        }
        Ok(())
    }

    /// Start drawing into the acquired image `index`
    ///
    /// An image that was never presented is still UNDEFINED and is
    /// moved to PRESENT_SRC_KHR, the layout the render pass and any
    /// delegate expect it in. Returns the semaphore the first draw of
    /// the frame waits on.
    pub fn begin_frame(&self, dev: &Device, index: u32, first_use: bool) -> Result<vk::Semaphore> {
        if !first_use {
            return Ok(self.sc_image_available);
        }

        let cbuf = self.sc_transition_cbuf;
        let (src, dst) = present_transition_masks();
        dev.cbuf_begin_recording(cbuf, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        dev.transition_image_layout_with(
            cbuf,
            self.sc_images[index as usize],
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::PRESENT_SRC_KHR,
            src,
            dst,
        );
        dev.cbuf_end_recording(cbuf)?;

        let cbufs = [cbuf];
        let wait_semas = [self.sc_image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semas = [self.sc_image_ready];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semas)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&cbufs)
            .signal_semaphores(&signal_semas)
            .build();

        unsafe {
            dev.dev
                .queue_submit(dev.graphics_queue().queue, &[submit_info], vk::Fence::null())?;
        }
        Ok(self.sc_image_ready)
    }

    /// Record the frame into our command buffer
    ///
    /// `scissor` is already in Vulkan coordinates. The swapchain image
    /// must already be in PRESENT_SRC_KHR, see `begin_frame`.
    pub fn record_frame(
        &self,
        dev: &Device,
        index: u32,
        scissor: vk::Rect2D,
        clear_color: [f32; 4],
        pipelines: &mut [Box<dyn Pipeline>],
        ctx: &DrawContext,
    ) -> Result<()> {
        let cbuf = self.sc_cbuf;
        dev.cbuf_begin_recording(cbuf, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

        // we need to clear any existing data when we start a pass
        let clear_vals = [
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 0.0,
                    stencil: 0,
                },
            },
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            },
            // loaded, not cleared
            vk::ClearValue::default(),
        ];

        let pass_begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.sc_render_pass)
            .framebuffer(self.sc_framebuffers[index as usize])
            .render_area(scissor)
            .clear_values(&clear_vals);

        unsafe {
            dev.dev.cmd_set_scissor(cbuf, 0, &[scissor]);
            dev.dev
                .cmd_begin_render_pass(cbuf, &pass_begin_info, vk::SubpassContents::INLINE);
        }

        for (i, pipeline) in pipelines.iter_mut().enumerate() {
            if i > 0 {
                unsafe { dev.dev.cmd_next_subpass(cbuf, vk::SubpassContents::INLINE) };
            }
            pipeline.draw_in_command_buffer(dev, cbuf, ctx)?;
        }

        unsafe { dev.dev.cmd_end_render_pass(cbuf) };
        dev.cbuf_end_recording(cbuf)
    }

    /// Submit the recorded frame
    ///
    /// The draw waits on `wait_semaphore`, signaled by whatever touched
    /// the acquired image last, and signals the semaphore presentation
    /// waits on. A second empty submission signals the fence that the
    /// next frame waits for.
    pub fn submit(&self, dev: &Device, wait_semaphore: vk::Semaphore) -> Result<()> {
        let queue = dev.graphics_queue().queue;
        let cbufs = [self.sc_cbuf];
        let wait_semas = [wait_semaphore];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semas = [self.sc_render_finished];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semas)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&cbufs)
            .signal_semaphores(&signal_semas)
            .build();
        let fence_info = vk::SubmitInfo::default();

        unsafe {
            dev.dev
                .queue_submit(queue, &[submit_info], vk::Fence::null())?;
            dev.dev
                .queue_submit(queue, &[fence_info], self.sc_render_finished_fence)?;
        }
        Ok(())
    }

    pub fn present(&self, dev: &Device, index: u32) -> Result<()> {
        let wait_semas = [self.sc_render_finished];
        let swapchains = [self.sc_swapchain];
        let indices = [index];
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semas)
            .swapchains(&swapchains)
            .image_indices(&indices);

        match unsafe {
            dev.d_swapchain_loader
                .queue_present(dev.present_queue().queue, &info)
        } {
            Ok(false) => Ok(()),
            // suboptimal
            Ok(true) => Err(SquallError::SWAPCHAIN_LOST),
            Err(e) => Err(e.into()),
        }
    }

    /// Destroy everything. The device must be idle.
    pub fn destroy(&mut self, dev: &Device) {
        unsafe {
            dev.dev
                .destroy_fence(self.sc_render_finished_fence, None);
            dev.dev.destroy_semaphore(self.sc_render_finished, None);
            dev.dev.destroy_semaphore(self.sc_image_ready, None);
            dev.dev.destroy_semaphore(self.sc_image_available, None);
            for cbuf in [self.sc_cbuf, self.sc_transition_cbuf] {
                if cbuf != vk::CommandBuffer::null() {
                    dev.dev
                        .free_command_buffers(dev.graphics_queue().command_pool, &[cbuf]);
                }
            }
            for framebuffer in self.sc_framebuffers.drain(..) {
                dev.dev.destroy_framebuffer(framebuffer, None);
            }
            dev.dev.destroy_render_pass(self.sc_render_pass, None);
        }
        self.sc_hdr.destroy(dev);
        self.sc_depth.destroy(dev);
        unsafe {
            for view in self.sc_views.drain(..) {
                dev.dev.destroy_image_view(view, None);
            }
            dev.d_swapchain_loader
                .destroy_swapchain(self.sc_swapchain, None);
        }
        *self = Self::null();
    }
}
