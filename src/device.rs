// Vulkan device representation
//
// This stores per-GPU state, such as the Vulkan Device objects and
// logic to copy data to and from this GPU. A Device is shared by every
// Surface bound to it, together with the quad index buffer and the
// atlases.

use ash::extensions::khr;
use ash::{util, vk};

use crate::atlas::PageIndex;
use crate::image_atlas::ImageAtlas;
use crate::instance::Instance;
use crate::paged_image::{AtlasHost, PagedImage};
use crate::platform::{self, DeviceCapabilities, DeviceScore};
use crate::sdf_atlas::{GlyphRect, SdfAtlas};
use crate::vertex_span::MAX_QUADS;
use crate::{CreateInfo, Result, SquallError, GFX_SYSTEM_MUTEX};
use utils::pixmap::{Pixmap, Rgba16F};

use parking_lot::Mutex;
use std::ffi::CStr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One queue we submit work to
#[derive(Debug, Copy, Clone)]
pub struct GfxQueue {
    pub family_index: u32,
    pub queue_index: u32,
    pub flags: vk::QueueFlags,
    pub queue: vk::Queue,
    pub command_pool: vk::CommandPool,
}

/// The index pattern of one quad with corners in the order
/// left-bottom, right-bottom, left-top, right-top
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 1, 3];

/// Indices for every quad of a full vertex buffer
pub fn quad_indices() -> Vec<u16> {
    (0..MAX_QUADS)
        .flat_map(|quad| QUAD_INDICES.iter().map(move |i| (quad * 4) as u16 + i))
        .collect()
}

/// Squall Device
///
/// This holds all of the Vulkan logic for one GPU.
pub struct Device {
    pub(crate) inst: Arc<Instance>,
    /// the logical device we are using
    pub(crate) dev: ash::Device,
    /// the physical device selected to display to
    pub(crate) pdev: vk::PhysicalDevice,
    pub(crate) mem_props: vk::PhysicalDeviceMemoryProperties,
    d_name: String,
    /// Optional behaviors detected when this device was scored
    pub(crate) d_caps: DeviceCapabilities,
    /// One entry per queue family in use
    d_queues: Vec<GfxQueue>,
    d_graphics: usize,
    d_present: usize,
    pub(crate) d_swapchain_loader: khr::Swapchain,
    /// indices 0,1,2,2,1,3 repeated for every quad of a vertex buffer
    pub(crate) d_quad_index_buffer: vk::Buffer,
    d_quad_index_memory: vk::DeviceMemory,
    d_shader_dir: PathBuf,
    pub(crate) d_enable_hdr: bool,
    /// Pages of every PagedImage created on this device
    pub(crate) d_image_atlas: Mutex<ImageAtlas>,
    /// Glyphs for the SDF pipeline
    pub(crate) d_sdf_atlas: Mutex<SdfAtlas>,
    /// set once any use of the device returned VK_ERROR_DEVICE_LOST
    d_lost: AtomicBool,
}

impl Device {
    /// Create a vkDevice from a vkPhysicalDevice
    ///
    /// Create a logical device for interfacing with the physical device.
    /// once again we specify any device extensions we need, the swapchain
    /// being the most important one.
    fn create_device(
        inst: &ash::Instance,
        pdev: vk::PhysicalDevice,
        caps: DeviceCapabilities,
        families: &[u32],
    ) -> Result<ash::Device> {
        let dev_extension_names = platform::device_extensions();

        let features = vk::PhysicalDeviceFeatures::builder()
            .shader_sampled_image_array_dynamic_indexing(true)
            .dual_src_blend(caps.contains(DeviceCapabilities::DUAL_SRC_BLEND))
            .build();

        // for now we only have one queue per family, so one priority
        let priorities = [1.0];
        let queue_infos: Vec<_> = families
            .iter()
            .map(|i| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(*i)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let dev_create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(queue_infos.as_ref())
            .enabled_extension_names(dev_extension_names.as_slice())
            .enabled_features(&features)
            .build();

        Ok(unsafe { inst.create_device(pdev, &dev_create_info, None)? })
    }

    /// Create a Device for `pdev` using the queues chosen when it was scored
    pub(crate) fn new(
        inst: Arc<Instance>,
        pdev: vk::PhysicalDevice,
        score: &DeviceScore,
        info: &CreateInfo,
    ) -> Result<Arc<Self>> {
        let props = unsafe { inst.inst.get_physical_device_properties(pdev) };
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        let mem_props = unsafe { inst.inst.get_physical_device_memory_properties(pdev) };
        let family_props = unsafe { inst.inst.get_physical_device_queue_family_properties(pdev) };

        let mut families = vec![score.graphics_family];
        if score.present_family != score.graphics_family {
            families.push(score.present_family);
        }

        let dev = Self::create_device(&inst.inst, pdev, score.caps, families.as_slice())?;
        let swapchain_loader = khr::Swapchain::new(&inst.inst, &dev);

        let mut ret = Self {
            inst: inst,
            dev: dev,
            pdev: pdev,
            mem_props: mem_props,
            d_name: name,
            d_caps: score.caps,
            d_queues: Vec::new(),
            d_graphics: 0,
            d_present: 0,
            d_swapchain_loader: swapchain_loader,
            d_quad_index_buffer: vk::Buffer::null(),
            d_quad_index_memory: vk::DeviceMemory::null(),
            d_shader_dir: info.shader_dir.clone(),
            d_enable_hdr: info.enable_hdr,
            d_image_atlas: Mutex::new(ImageAtlas::new()),
            d_sdf_atlas: Mutex::new(SdfAtlas::new()),
            d_lost: AtomicBool::new(false),
        };

        // From here on Drop cleans up whatever was created
        for family in families.iter() {
            let queue = unsafe { ret.dev.get_device_queue(*family, 0) };
            let pool = ret.create_command_pool(*family)?;
            ret.d_queues.push(GfxQueue {
                family_index: *family,
                queue_index: 0,
                flags: family_props[*family as usize].queue_flags,
                queue: queue,
                command_pool: pool,
            });
        }
        ret.d_present = ret.d_queues.len() - 1;

        let (buffer, memory) = ret.create_quad_index_buffer()?;
        ret.d_quad_index_buffer = buffer;
        ret.d_quad_index_memory = memory;

        ret.d_image_atlas.lock().build(&ret)?;
        ret.d_sdf_atlas.lock().build(&ret)?;

        log::info!(
            "Created device {} with capabilities {:?}",
            ret.d_name,
            ret.d_caps
        );
        Ok(Arc::new(ret))
    }

    pub fn name(&self) -> &str {
        self.d_name.as_str()
    }

    pub fn capabilities(&self) -> DeviceCapabilities {
        self.d_caps
    }

    pub fn supports_dual_source_blend(&self) -> bool {
        self.d_caps.contains(DeviceCapabilities::DUAL_SRC_BLEND)
    }

    pub(crate) fn graphics_queue(&self) -> &GfxQueue {
        &self.d_queues[self.d_graphics]
    }

    pub(crate) fn present_queue(&self) -> &GfxQueue {
        &self.d_queues[self.d_present]
    }

    /// Score this existing device against another surface
    ///
    /// The device's present queue must also be able to present to it.
    pub(crate) fn score_surface(&self, surface: vk::SurfaceKHR) -> Result<Option<DeviceScore>> {
        let score =
            match platform::score_physical_device(&self.inst, self.pdev, surface, self.d_enable_hdr)? {
                Some(s) => s,
                None => return Ok(None),
            };

        let can_present = unsafe {
            self.inst.surface_loader.get_physical_device_surface_support(
                self.pdev,
                self.present_queue().family_index,
                surface,
            )?
        };

        Ok(match can_present {
            true => Some(DeviceScore {
                graphics_family: self.graphics_queue().family_index,
                present_family: self.present_queue().family_index,
                ..score
            }),
            false => None,
        })
    }

    /// returns a new vkCommandPool
    ///
    /// Command buffers are allocated from command pools. That's about
    /// all they do. They just manage memory. Command buffers will be allocated
    /// as part of the queue_family specified.
    pub(crate) fn create_command_pool(&self, queue_family: u32) -> Result<vk::CommandPool> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )
            .queue_family_index(queue_family);

        Ok(unsafe { self.dev.create_command_pool(&pool_create_info, None)? })
    }

    /// Allocate a vec of vkCommandBuffers
    ///
    /// Command buffers are constructed once, and can be executed
    /// many times. Command buffer is shortened to `cbuf` in
    /// many areas of the code.
    pub(crate) fn create_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let cbuf_allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_buffer_count(count)
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY);

        Ok(unsafe { self.dev.allocate_command_buffers(&cbuf_allocate_info)? })
    }

    /// Create an image sampler for the atlases
    ///
    /// Samplers are used to filter data from an image when
    /// it is referenced from a fragment shader. Pages carry their own
    /// border, so sampling may wrap freely.
    pub(crate) fn create_sampler(&self) -> Result<vk::Sampler> {
        let info = vk::SamplerCreateInfo::builder()
            // filter for magnified (oversampled) pixels
            .mag_filter(vk::Filter::LINEAR)
            // filter for minified (undersampled) pixels
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            // disable this for performance
            .anisotropy_enable(false)
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK)
            // texture coords are [0,1)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::NEVER)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST);

        Ok(unsafe { self.dev.create_sampler(&info, None)? })
    }

    /// Memory types specify the location and accessability of memory. Device
    /// local memory is resident on the GPU, while host visible memory can be
    /// read from the system side. Both of these are part of the
    /// vk::MemoryPropertyFlags type.
    pub(crate) fn find_memory_type_index(
        props: &vk::PhysicalDeviceMemoryProperties,
        reqs: &vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        // Bit i of memoryBitTypes will be set if the resource supports
        // the ith memory type in props.
        props.memory_types[..props.memory_type_count as usize]
            .iter()
            .enumerate()
            .find(|(i, mem_type)| {
                (reqs.memory_type_bits >> i) & 1 == 1 && mem_type.property_flags.contains(flags)
            })
            .map(|(i, _)| i as u32)
    }

    fn allocate_memory(
        &self,
        reqs: &vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<vk::DeviceMemory> {
        let index = Self::find_memory_type_index(&self.mem_props, reqs, flags)
            .ok_or(SquallError::VRAM_EXHAUSTED)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(reqs.size)
            .memory_type_index(index);

        Ok(unsafe { self.dev.allocate_memory(&alloc_info, None)? })
    }

    /// Allocates a buffer/memory pair of size `size` and binds them
    ///
    /// It does not fill the buffer with anything.
    pub(crate) fn create_buffer_with_size(
        &self,
        usage: vk::BufferUsageFlags,
        flags: vk::MemoryPropertyFlags,
        size: u64,
    ) -> Result<(vk::Buffer, vk::DeviceMemory)> {
        let create_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .build();

        let buffer = unsafe { self.dev.create_buffer(&create_info, None)? };
        let req = unsafe { self.dev.get_buffer_memory_requirements(buffer) };

        let memory = match self.allocate_memory(&req, flags) {
            Ok(m) => m,
            Err(e) => {
                unsafe { self.dev.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        // Until now the buffer has not had any memory assigned
        unsafe { self.dev.bind_buffer_memory(buffer, memory, 0)? };
        Ok((buffer, memory))
    }

    /// Writes `data` to `memory` and flushes it
    ///
    /// This is a helper method for mapping and updating the value stored
    /// in device memory. Memory needs to be host visible.
    pub(crate) fn update_memory<T: Copy>(
        &self,
        memory: vk::DeviceMemory,
        offset: u64,
        data: &[T],
    ) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let data_size = std::mem::size_of_val(data) as u64;
        unsafe {
            let ptr = self
                .dev
                .map_memory(memory, offset, data_size, vk::MemoryMapFlags::empty())?;

            // rust doesn't have a raw memcpy, so we need to transform the void
            // ptr to a slice. This is unsafe as the length needs to be correct
            let dst = std::slice::from_raw_parts_mut(ptr as *mut T, data.len());
            dst.copy_from_slice(data);

            let range = vk::MappedMemoryRange::builder()
                .memory(memory)
                .offset(0)
                .size(vk::WHOLE_SIZE)
                .build();
            let flushed = self.dev.flush_mapped_memory_ranges(&[range]);

            self.dev.unmap_memory(memory);
            flushed?;
        }
        Ok(())
    }

    /// Create an image with its own memory
    ///
    /// usage defines the role the image will serve (transfer, depth data, etc)
    /// flags defines the memory type (probably DEVICE_LOCAL + others)
    pub(crate) fn create_image_with_memory(
        &self,
        resolution: &vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        flags: vk::MemoryPropertyFlags,
        tiling: vk::ImageTiling,
        initial_layout: vk::ImageLayout,
    ) -> Result<(vk::Image, vk::DeviceMemory)> {
        // we create the image now, but will have to bind
        // some memory to it later.
        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: resolution.width,
                height: resolution.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(tiling)
            .usage(usage)
            .initial_layout(initial_layout)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let image = unsafe { self.dev.create_image(&create_info, None)? };

        // we need to find a memory type that matches the type our
        // new image needs
        let mem_reqs = unsafe { self.dev.get_image_memory_requirements(image) };
        let image_memory = match self.allocate_memory(&mem_reqs, flags) {
            Ok(m) => m,
            Err(e) => {
                unsafe { self.dev.destroy_image(image, None) };
                return Err(e);
            }
        };

        unsafe { self.dev.bind_image_memory(image, image_memory, 0)? };
        Ok((image, image_memory))
    }

    pub(crate) fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> Result<vk::ImageView> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .subresource_range(
                vk::ImageSubresourceRange::builder()
                    .aspect_mask(aspect)
                    .level_count(1)
                    .layer_count(1)
                    .build(),
            )
            .image(image)
            .format(format)
            .view_type(vk::ImageViewType::TYPE_2D);

        Ok(unsafe { self.dev.create_image_view(&view_info, None)? })
    }

    /// Create an image, its memory, and a view covering all of it
    pub(crate) fn create_image(
        &self,
        resolution: &vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<(vk::Image, vk::ImageView, vk::DeviceMemory)> {
        let (image, memory) = self.create_image_with_memory(
            resolution,
            format,
            usage,
            flags,
            vk::ImageTiling::OPTIMAL,
            vk::ImageLayout::UNDEFINED,
        )?;

        match self.create_image_view(image, format, aspect) {
            Ok(view) => Ok((image, view, memory)),
            Err(e) => {
                unsafe {
                    self.dev.destroy_image(image, None);
                    self.dev.free_memory(memory, None);
                }
                Err(e)
            }
        }
    }

    /// The access mask and pipeline stage that touch an image in `layout`
    fn layout_access(layout: vk::ImageLayout) -> (vk::AccessFlags, vk::PipelineStageFlags) {
        match layout {
            vk::ImageLayout::UNDEFINED => (
                vk::AccessFlags::empty(),
                vk::PipelineStageFlags::TOP_OF_PIPE,
            ),
            vk::ImageLayout::PREINITIALIZED | vk::ImageLayout::GENERAL => (
                vk::AccessFlags::HOST_WRITE,
                vk::PipelineStageFlags::HOST,
            ),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL => (
                vk::AccessFlags::TRANSFER_READ,
                vk::PipelineStageFlags::TRANSFER,
            ),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL => (
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TRANSFER,
            ),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ),
            vk::ImageLayout::PRESENT_SRC_KHR => (
                vk::AccessFlags::MEMORY_READ,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            ),
            _ => (
                vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                vk::PipelineStageFlags::ALL_COMMANDS,
            ),
        }
    }

    /// Transitions `image` to the `new` layout using `cbuf`
    ///
    /// Images need to be manually transitioned between layouts. The
    /// pipeline stages and access masks are derived from the layouts.
    pub(crate) fn transition_image_layout(
        &self,
        cbuf: vk::CommandBuffer,
        image: vk::Image,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) {
        let src = Self::layout_access(old);
        let mut dst = Self::layout_access(new);
        if new == vk::ImageLayout::GENERAL {
            dst.0 = vk::AccessFlags::HOST_WRITE | vk::AccessFlags::HOST_READ;
        }
        self.transition_image_layout_with(cbuf, image, old, new, src, dst);
    }

    /// Transitions `image` with explicit access masks and stages
    ///
    /// `src` and `dst` are the (access, stage) pairs on either side of
    /// the barrier.
    pub(crate) fn transition_image_layout_with(
        &self,
        cbuf: vk::CommandBuffer,
        image: vk::Image,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
        src: (vk::AccessFlags, vk::PipelineStageFlags),
        dst: (vk::AccessFlags, vk::PipelineStageFlags),
    ) {
        let (src_access, src_stage) = src;
        let (dst_access, dst_stage) = dst;

        let layout_barrier = vk::ImageMemoryBarrier::builder()
            .image(image)
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .old_layout(old)
            .new_layout(new)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .subresource_range(
                vk::ImageSubresourceRange::builder()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .layer_count(1)
                    .level_count(1)
                    .build(),
            )
            .build();

        // process the barrier we created, which will perform
        // the actual transition.
        unsafe {
            self.dev.cmd_pipeline_barrier(
                cbuf,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[layout_barrier],
            );
        }
    }

    /// Records but does not submit a command buffer.
    ///
    /// The buffer is reset first, so it may be reused every frame.
    pub(crate) fn cbuf_begin_recording(
        &self,
        cbuf: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> Result<()> {
        unsafe {
            // first reset the queue so we know it is empty
            self.dev
                .reset_command_buffer(cbuf, vk::CommandBufferResetFlags::empty())?;

            let record_info = vk::CommandBufferBeginInfo::builder().flags(flags);
            self.dev.begin_command_buffer(cbuf, &record_info)?;
        }
        Ok(())
    }

    pub(crate) fn cbuf_end_recording(&self, cbuf: vk::CommandBuffer) -> Result<()> {
        unsafe { self.dev.end_command_buffer(cbuf)? };
        Ok(())
    }

    /// Record commands with `record_fn`, submit them to the graphics
    /// queue and wait for them to complete.
    ///
    /// Used for uploads, which are rare and happen outside of frames.
    pub(crate) fn one_time_submit<F>(&self, record_fn: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer) -> Result<()>,
    {
        let queue = self.graphics_queue();
        let cbufs = self.create_command_buffers(queue.command_pool, 1)?;
        let cbuf = cbufs[0];

        let res = (|| -> Result<()> {
            self.cbuf_begin_recording(cbuf, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
            record_fn(cbuf)?;
            self.cbuf_end_recording(cbuf)?;

            let submit_info = vk::SubmitInfo::builder().command_buffers(&cbufs).build();
            unsafe {
                self.dev
                    .queue_submit(queue.queue, &[submit_info], vk::Fence::null())?;
                self.dev.queue_wait_idle(queue.queue)?;
            }
            Ok(())
        })();

        unsafe { self.dev.free_command_buffers(queue.command_pool, &cbufs) };
        res
    }

    /// Fill a device local index buffer with the quad pattern
    ///
    /// The indices are staged in a host visible buffer and copied over.
    fn create_quad_index_buffer(&self) -> Result<(vk::Buffer, vk::DeviceMemory)> {
        let indices = quad_indices();
        let size = std::mem::size_of_val(indices.as_slice()) as u64;

        let (staging, staging_mem) = self.create_buffer_with_size(
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            size,
        )?;

        let res = (|| -> Result<(vk::Buffer, vk::DeviceMemory)> {
            self.update_memory(staging_mem, 0, indices.as_slice())?;

            let (buffer, memory) = self.create_buffer_with_size(
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
                size,
            )?;

            let copied = self.one_time_submit(|cbuf| {
                let region = vk::BufferCopy::builder().size(size).build();
                unsafe { self.dev.cmd_copy_buffer(cbuf, staging, buffer, &[region]) };
                Ok(())
            });
            if let Err(e) = copied {
                unsafe {
                    self.dev.destroy_buffer(buffer, None);
                    self.dev.free_memory(memory, None);
                }
                return Err(e);
            }
            Ok((buffer, memory))
        })();

        unsafe {
            self.dev.destroy_buffer(staging, None);
            self.dev.free_memory(staging_mem, None);
        }
        res
    }

    /// Load `<shader_dir>/<name>.spv`
    pub(crate) fn load_shader(&self, name: &str) -> Result<vk::ShaderModule> {
        let path = self.d_shader_dir.join(format!("{}.spv", name));
        let not_found = |e: std::io::Error| {
            log::error!("Could not read shader {:?}: {}", path, e);
            SquallError::SHADER_NOT_FOUND(path.display().to_string())
        };

        let mut file = std::fs::File::open(&path).map_err(not_found)?;
        let code = util::read_spv(&mut file).map_err(not_found)?;
        let info = vk::ShaderModuleCreateInfo::builder().code(&code);

        Ok(unsafe { self.dev.create_shader_module(&info, None)? })
    }

    pub fn wait_idle(&self) -> Result<()> {
        let _lock = GFX_SYSTEM_MUTEX.lock();
        if let Err(e) = unsafe { self.dev.device_wait_idle() } {
            if e == vk::Result::ERROR_DEVICE_LOST {
                self.mark_lost();
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Remember that this device is lost, it won't be handed to
    /// surfaces anymore
    pub fn mark_lost(&self) {
        if !self.d_lost.swap(true, Ordering::AcqRel) {
            log::error!("Device {} was lost", self.d_name);
        }
    }

    pub fn is_lost(&self) -> bool {
        self.d_lost.load(Ordering::Acquire)
    }

    /// Create an image stored in pages of this device's atlas
    ///
    /// A zero width or height gives an empty image that holds no pages.
    pub fn make_paged_image(self: &Arc<Self>, width: usize, height: usize) -> Result<PagedImage> {
        PagedImage::new(self.clone(), width, height)
    }

    /// The number of atlas images, it increases as the atlas grows
    pub fn atlas_version(&self) -> usize {
        let _lock = GFX_SYSTEM_MUTEX.lock();
        self.d_image_atlas.lock().version()
    }

    pub fn atlas_free_pages(&self) -> usize {
        let _lock = GFX_SYSTEM_MUTEX.lock();
        self.d_image_atlas.lock().free_count()
    }

    /// Move every atlas image into a layout the shaders can read
    pub fn prepare_atlas_for_rendering(&self) -> Result<()> {
        let _lock = GFX_SYSTEM_MUTEX.lock();
        self.d_image_atlas.lock().prepare_for_rendering(self)
    }

    /// Add a rasterized signed distance field glyph to the SDF atlas
    pub fn upload_glyph(&self, glyph: &Pixmap<i8>) -> Result<GlyphRect> {
        let _lock = GFX_SYSTEM_MUTEX.lock();
        let mut atlas = self.d_sdf_atlas.lock();
        let rect = atlas.add_glyph(self, glyph)?;
        atlas.prepare_for_rendering(self)?;
        Ok(rect)
    }

    pub fn sdf_atlas_version(&self) -> usize {
        let _lock = GFX_SYSTEM_MUTEX.lock();
        self.d_sdf_atlas.lock().version()
    }
}

impl AtlasHost for Device {
    fn allocate_pages(&self, count: usize) -> Result<Vec<PageIndex>> {
        self.d_image_atlas.lock().allocate(self, count)
    }

    fn free_pages(&self, pages: &[PageIndex]) {
        self.d_image_atlas.lock().free(pages)
    }

    fn upload_pages(&self, image: &PagedImage, pixmap: &Pixmap<Rgba16F>) -> Result<()> {
        self.d_image_atlas.lock().upload(self, image, pixmap)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            // first wait for the device to finish working
            if let Err(e) = self.dev.device_wait_idle() {
                log::error!("Could not idle device {}: {:?}", self.d_name, e);
            }

            self.d_sdf_atlas.get_mut().destroy(&self.dev);
            self.d_image_atlas.get_mut().destroy(&self.dev);

            self.dev.destroy_buffer(self.d_quad_index_buffer, None);
            self.dev.free_memory(self.d_quad_index_memory, None);

            for queue in self.d_queues.iter() {
                self.dev.destroy_command_pool(queue.command_pool, None);
            }
            self.dev.destroy_device(None);
        }
    }
}
