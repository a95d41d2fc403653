//!# Squall Render Pipelines
//!
//!A frame is one render pass with five subpasses, and each subpass is
//!drawn by one pipeline:
//!
//!* `BoxPipeline` - rounded rectangles with borders
//!* `ImagePipeline` - quads sampling pages of the image atlas
//!* `SdfPipeline` - glyphs sampled from the signed distance field atlas
//!* `OverridePipeline` - replaces the alpha channel of what was drawn
//!* `ToneMapperPipeline` - copies the HDR attachment to the swapchain image
//!
//!The first four write into the shared HDR attachment, the tone mapper
//!reads it as an input attachment.
//!
//!The `Pipeline` trait outlines how a Surface drives each of them
//!through device and swapchain changes.

use ash::vk;
use serde::Serialize;

pub mod alpha;
pub mod boxes;
pub mod image;
pub mod sdf;
pub mod tone_mapper;

pub use alpha::{OverridePipeline, OverrideVertex};
pub use boxes::{BoxPipeline, BoxVertex};
pub use image::{ImagePipeline, ImageVertex};
pub use sdf::{SdfPipeline, SdfVertex, SubpixelOrientation};
pub use tone_mapper::ToneMapperPipeline;

use crate::device::Device;
use crate::draw_context::DrawContext;
use crate::vertex_span::MAX_VERTICES;
use crate::{Result, SquallError};

use std::ffi::CStr;
use std::marker::PhantomData;

/// Subpass indices inside the frame's render pass
pub const BOX_SUBPASS: u32 = 0;
pub const IMAGE_SUBPASS: u32 = 1;
pub const SDF_SUBPASS: u32 = 2;
pub const OVERRIDE_SUBPASS: u32 = 3;
pub const TONE_MAPPER_SUBPASS: u32 = 4;
pub const SUBPASS_COUNT: u32 = 5;

/// Everything a pipeline needs to know about the swapchain it draws into
#[derive(Debug, Copy, Clone)]
pub struct SubpassInfo {
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    pub extent: vk::Extent2D,
    /// The shared HDR color attachment, an input attachment of the
    /// tone mapper subpass
    pub hdr_view: vk::ImageView,
}

/// The lifecycle every pipeline goes through
///
/// Device resources (shaders, layouts, descriptors, vertex buffers) are
/// built once per Device, the graphics pipeline itself once per
/// swapchain. Each build is only called again after the matching
/// teardown.
pub trait Pipeline {
    fn name(&self) -> &'static str;

    fn build_for_new_device(&mut self, dev: &Device) -> Result<()>;

    fn build_for_new_swapchain(&mut self, dev: &Device, info: &SubpassInfo) -> Result<()>;

    /// Upload the vertices of `ctx` and record the draw
    ///
    /// Must be called while recording inside this pipeline's subpass.
    fn draw_in_command_buffer(
        &mut self,
        dev: &Device,
        cbuf: vk::CommandBuffer,
        ctx: &DrawContext,
    ) -> Result<()>;

    fn teardown_for_swapchain_lost(&mut self, dev: &Device);

    fn teardown_for_device_lost(&mut self, dev: &Device);
}

/// All five pipelines in subpass order
pub fn make_pipelines() -> Vec<Box<dyn Pipeline>> {
    vec![
        Box::new(BoxPipeline::new()),
        Box::new(ImagePipeline::new()),
        Box::new(SdfPipeline::new()),
        Box::new(OverridePipeline::new()),
        Box::new(ToneMapperPipeline::new()),
    ]
}

/// `(window_extent, viewport_scale)`, the start of every quad pipeline's
/// push constants. The vertex shaders map window coordinates to
/// normalized device coordinates with the scale.
pub fn viewport_constants(extent: vk::Extent2D) -> ([f32; 2], [f32; 2]) {
    let w = extent.width.max(1) as f32;
    let h = extent.height.max(1) as f32;
    ([w, h], [2.0 / w, 2.0 / h])
}

/// Get the bytes of a push constant struct
pub fn push_constant_bytes<T: Serialize>(push: &T) -> Result<Vec<u8>> {
    bincode::serialize(push).map_err(|e| {
        log::error!("Could not serialize push constants: {}", e);
        SquallError::INVALID_STATE
    })
}

/// A vertex and fragment shader pair
#[derive(Debug, Copy, Clone)]
pub struct Shaders {
    pub vert: vk::ShaderModule,
    pub frag: vk::ShaderModule,
}

impl Shaders {
    pub fn null() -> Self {
        Self {
            vert: vk::ShaderModule::null(),
            frag: vk::ShaderModule::null(),
        }
    }

    /// Load `<vert>.spv` and `<frag>.spv`
    pub fn load(dev: &Device, vert: &str, frag: &str) -> Result<Self> {
        let vert = dev.load_shader(vert)?;
        let frag = match dev.load_shader(frag) {
            Ok(f) => f,
            Err(e) => {
                unsafe { dev.dev.destroy_shader_module(vert, None) };
                return Err(e);
            }
        };
        Ok(Self {
            vert: vert,
            frag: frag,
        })
    }

    pub fn destroy(&mut self, dev: &Device) {
        unsafe {
            dev.dev.destroy_shader_module(self.vert, None);
            dev.dev.destroy_shader_module(self.frag, None);
        }
        *self = Self::null();
    }
}

/// Create a pipeline layout with one push constant range used by both
/// shader stages
pub fn create_pipeline_layout(
    dev: &Device,
    set_layouts: &[vk::DescriptorSetLayout],
    push_size: usize,
) -> Result<vk::PipelineLayout> {
    let constants = [vk::PushConstantRange::builder()
        .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
        .offset(0)
        .size(push_size as u32)
        .build()];

    let layout_info = vk::PipelineLayoutCreateInfo::builder()
        .push_constant_ranges(&constants)
        .set_layouts(set_layouts);

    Ok(unsafe { dev.dev.create_pipeline_layout(&layout_info, None)? })
}

/// Standard alpha blending over the HDR attachment
pub fn alpha_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::TRUE,
        src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
        dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        color_blend_op: vk::BlendOp::ADD,
        src_alpha_blend_factor: vk::BlendFactor::ONE,
        dst_alpha_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        alpha_blend_op: vk::BlendOp::ADD,
        color_write_mask: vk::ColorComponentFlags::R
            | vk::ColorComponentFlags::G
            | vk::ColorComponentFlags::B
            | vk::ColorComponentFlags::A,
    }
}

/// The fixed function state that differs between our pipelines
pub struct PipelineDesc<'a> {
    pub shaders: Shaders,
    pub layout: vk::PipelineLayout,
    pub info: &'a SubpassInfo,
    /// stride of one vertex, zero for pipelines without vertex input
    pub vertex_stride: usize,
    pub vertex_attributes: &'a [vk::VertexInputAttributeDescription],
    pub blend: vk::PipelineColorBlendAttachmentState,
    pub depth_test: bool,
    pub depth_write: bool,
}

/// Configure and create a graphics pipeline
///
/// In vulkan, the programmer has explicit control over the format
/// and layout of the entire graphical pipeline, both dynamic and
/// fixed function portions. Everything is fixed for the lifetime of a
/// swapchain except the scissor, which follows the redraw region of
/// every frame.
pub fn create_graphics_pipeline(dev: &Device, desc: &PipelineDesc) -> Result<vk::Pipeline> {
    let entrypoint = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };
    let stages = [
        vk::PipelineShaderStageCreateInfo::builder()
            .module(desc.shaders.vert)
            .name(entrypoint)
            .stage(vk::ShaderStageFlags::VERTEX)
            .build(),
        vk::PipelineShaderStageCreateInfo::builder()
            .module(desc.shaders.frag)
            .name(entrypoint)
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .build(),
    ];

    // This binds our vertex input to location 0 to be passed to the shader
    // Think of it like specifying the data stream given to the shader
    let vertex_bindings = [vk::VertexInputBindingDescription {
        binding: 0,
        stride: desc.vertex_stride as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }];
    let vertex_info = match desc.vertex_stride {
        0 => vk::PipelineVertexInputStateCreateInfo::builder().build(),
        _ => vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(desc.vertex_attributes)
            .build(),
    };

    // input assembly describes how to turn the vertex
    // and index buffers into primatives
    let assembly = vk::PipelineInputAssemblyStateCreateInfo {
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        ..Default::default()
    };

    let extent = desc.info.extent;
    let viewport = [vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }];
    let scissor = [vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: extent,
    }];
    let viewport_info = vk::PipelineViewportStateCreateInfo::builder()
        .scissors(&scissor)
        .viewports(&viewport);

    // quads are emitted in both windings depending on the y direction
    let raster_info = vk::PipelineRasterizationStateCreateInfo {
        front_face: vk::FrontFace::CLOCKWISE,
        cull_mode: vk::CullModeFlags::NONE,
        line_width: 1.0,
        polygon_mode: vk::PolygonMode::FILL,
        ..Default::default()
    };

    let multisample_info = vk::PipelineMultisampleStateCreateInfo {
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };

    // no stencil operations, so this just keeps everything
    let stencil_state = vk::StencilOpState {
        fail_op: vk::StencilOp::KEEP,
        pass_op: vk::StencilOp::KEEP,
        depth_fail_op: vk::StencilOp::KEEP,
        compare_op: vk::CompareOp::ALWAYS,
        ..Default::default()
    };

    // depth is cleared to 0.0, larger z is closer to the viewer
    let depth_info = vk::PipelineDepthStencilStateCreateInfo {
        depth_test_enable: desc.depth_test as u32,
        depth_write_enable: desc.depth_write as u32,
        depth_compare_op: vk::CompareOp::GREATER_OR_EQUAL,
        front: stencil_state,
        back: stencil_state,
        max_depth_bounds: 1.0,
        ..Default::default()
    };

    let blend_attachment_states = [desc.blend];
    let blend_info = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op(vk::LogicOp::CLEAR)
        .attachments(&blend_attachment_states);

    let dynamic_states = [vk::DynamicState::SCISSOR];
    let dynamic_info =
        vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&stages)
        .vertex_input_state(&vertex_info)
        .input_assembly_state(&assembly)
        .viewport_state(&viewport_info)
        .rasterization_state(&raster_info)
        .multisample_state(&multisample_info)
        .depth_stencil_state(&depth_info)
        .color_blend_state(&blend_info)
        .dynamic_state(&dynamic_info)
        .layout(desc.layout)
        .render_pass(desc.info.render_pass)
        .subpass(desc.info.subpass)
        .build();

    let pipelines = unsafe {
        dev.dev
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
            .map_err(|(_, e)| SquallError::from(e))?
    };
    pipelines
        .into_iter()
        .next()
        .ok_or(SquallError::INVALID_STATE)
}

/// A host visible vertex buffer holding one frame worth of vertices
pub struct VertexBuffer<V: Copy> {
    vb_buffer: vk::Buffer,
    vb_memory: vk::DeviceMemory,
    /// vertices written for the frame being recorded
    vb_count: usize,
    _marker: PhantomData<V>,
}

impl<V: Copy> VertexBuffer<V> {
    pub fn null() -> Self {
        Self {
            vb_buffer: vk::Buffer::null(),
            vb_memory: vk::DeviceMemory::null(),
            vb_count: 0,
            _marker: PhantomData,
        }
    }

    pub fn new(dev: &Device) -> Result<Self> {
        let size = (std::mem::size_of::<V>() * MAX_VERTICES) as u64;
        let (buffer, memory) = dev.create_buffer_with_size(
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            size,
        )?;

        Ok(Self {
            vb_buffer: buffer,
            vb_memory: memory,
            vb_count: 0,
            _marker: PhantomData,
        })
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.vb_buffer
    }

    pub fn count(&self) -> usize {
        self.vb_count
    }

    /// Copy and flush the vertices written this frame
    pub fn upload(&mut self, dev: &Device, vertices: &[V]) -> Result<()> {
        let vertices = &vertices[..vertices.len().min(MAX_VERTICES)];
        dev.update_memory(self.vb_memory, 0, vertices)?;
        self.vb_count = vertices.len();
        Ok(())
    }

    pub fn destroy(&mut self, dev: &Device) {
        unsafe {
            dev.dev.destroy_buffer(self.vb_buffer, None);
            dev.dev.free_memory(self.vb_memory, None);
        }
        *self = Self::null();
    }
}

/// Bind the vertex buffer and the shared quad indices and draw every quad
pub fn draw_quads<V: Copy>(dev: &Device, cbuf: vk::CommandBuffer, vertices: &VertexBuffer<V>) {
    let quads = vertices.count() / 4;
    if quads == 0 {
        return;
    }

    unsafe {
        dev.dev
            .cmd_bind_vertex_buffers(cbuf, 0, &[vertices.buffer()], &[0]);
        dev.dev.cmd_bind_index_buffer(
            cbuf,
            dev.d_quad_index_buffer,
            0,
            vk::IndexType::UINT16,
        );
        dev.dev
            .cmd_draw_indexed(cbuf, (quads * 6) as u32, 1, 0, 0, 0);
    }
}

/// Tracks which atlas version a descriptor set was written for
///
/// The atlas only grows, so a set is out of date exactly when the
/// atlas has more images than it did at the last write.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct DescriptorVersion {
    dv_version: usize,
}

impl DescriptorVersion {
    pub fn needs_update(&self, atlas_version: usize) -> bool {
        atlas_version > self.dv_version
    }

    /// True if the set has to be rewritten for an atlas at
    /// `atlas_version` holding `image_count` images
    ///
    /// A set can't be written before the atlas has any image.
    pub fn needs_rewrite(&self, atlas_version: usize, image_count: usize) -> bool {
        image_count > 0 && self.needs_update(atlas_version)
    }

    pub fn record(&mut self, atlas_version: usize) {
        self.dv_version = atlas_version;
    }

    pub fn version(&self) -> usize {
        self.dv_version
    }

    pub fn reset(&mut self) {
        self.dv_version = 0;
    }
}

/// Descriptor objects for sampling an atlas: binding 0 is the
/// sampler, binding 1 an array of sampled images
pub struct AtlasDescriptors {
    pub layout: vk::DescriptorSetLayout,
    pub pool: vk::DescriptorPool,
    pub set: vk::DescriptorSet,
    ad_array_size: u32,
    ad_version: DescriptorVersion,
}

impl AtlasDescriptors {
    pub fn null() -> Self {
        Self {
            layout: vk::DescriptorSetLayout::null(),
            pool: vk::DescriptorPool::null(),
            set: vk::DescriptorSet::null(),
            ad_array_size: 0,
            ad_version: DescriptorVersion::default(),
        }
    }

    pub fn new(dev: &Device, array_size: u32) -> Result<Self> {
        let bindings = [
            vk::DescriptorSetLayoutBinding::builder()
                .binding(0)
                .descriptor_type(vk::DescriptorType::SAMPLER)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                .descriptor_count(1)
                .build(),
            vk::DescriptorSetLayoutBinding::builder()
                .binding(1)
                .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                .descriptor_count(array_size)
                .build(),
        ];
        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let layout = unsafe { dev.dev.create_descriptor_set_layout(&info, None)? };

        let sizes = [
            vk::DescriptorPoolSize::builder()
                .ty(vk::DescriptorType::SAMPLER)
                .descriptor_count(1)
                .build(),
            vk::DescriptorPoolSize::builder()
                .ty(vk::DescriptorType::SAMPLED_IMAGE)
                .descriptor_count(array_size)
                .build(),
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&sizes)
            .max_sets(1);

        let mut ret = Self {
            layout: layout,
            pool: vk::DescriptorPool::null(),
            set: vk::DescriptorSet::null(),
            ad_array_size: array_size,
            ad_version: DescriptorVersion::default(),
        };

        ret.pool = match unsafe { dev.dev.create_descriptor_pool(&pool_info, None) } {
            Ok(p) => p,
            Err(e) => {
                ret.destroy(dev);
                return Err(e.into());
            }
        };

        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(ret.pool)
            .set_layouts(&layouts);
        match unsafe { dev.dev.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => ret.set = sets[0],
            Err(e) => {
                ret.destroy(dev);
                return Err(e.into());
            }
        }

        Ok(ret)
    }

    pub fn version(&self) -> usize {
        self.ad_version.version()
    }

    /// Rewrite the set if the atlas grew since the last write
    ///
    /// Unused array slots repeat the first image.
    pub fn update(
        &mut self,
        dev: &Device,
        atlas_version: usize,
        sampler: vk::Sampler,
        views: &[vk::ImageView],
    ) {
        if !self.ad_version.needs_rewrite(atlas_version, views.len()) {
            return;
        }

        let sampler_info = [vk::DescriptorImageInfo::builder().sampler(sampler).build()];
        let image_infos: Vec<_> = (0..self.ad_array_size as usize)
            .map(|i| {
                vk::DescriptorImageInfo::builder()
                    .image_view(*views.get(i).unwrap_or(&views[0]))
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    .build()
            })
            .collect();

        let writes = [
            vk::WriteDescriptorSet::builder()
                .dst_set(self.set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::SAMPLER)
                .image_info(&sampler_info)
                .build(),
            vk::WriteDescriptorSet::builder()
                .dst_set(self.set)
                .dst_binding(1)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                .image_info(image_infos.as_slice())
                .build(),
        ];

        unsafe { dev.dev.update_descriptor_sets(&writes, &[]) };
        self.ad_version.record(atlas_version);
        log::debug!("Updated atlas descriptors to version {}", atlas_version);
    }

    pub fn destroy(&mut self, dev: &Device) {
        unsafe {
            // freeing the pool frees the set
            dev.dev.destroy_descriptor_pool(self.pool, None);
            dev.dev.destroy_descriptor_set_layout(self.layout, None);
        }
        *self = Self::null();
    }
}
