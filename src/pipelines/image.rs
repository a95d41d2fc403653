// Textured quads sampling the image atlas
//
// PagedImages are drawn as one quad per page. The uv coordinates are
// pixel positions inside an atlas image and the layer selects the
// image, so one descriptor set covers every image of the atlas.
use serde::{Deserialize, Serialize};

use cgmath::{Vector3, Vector4};

use ash::vk;

use super::{
    alpha_blend_attachment, create_graphics_pipeline, create_pipeline_layout, draw_quads,
    push_constant_bytes, viewport_constants, AtlasDescriptors, Pipeline, PipelineDesc, Shaders,
    SubpassInfo, VertexBuffer,
};
use crate::atlas::{ATLAS_IMAGE_AXIS, ATLAS_MAX_IMAGES};
use crate::device::Device;
use crate::draw_context::DrawContext;
use crate::Result;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageVertex {
    pub position: Vector3<f32>,
    pub clipping_rectangle: Vector4<f32>,
    /// xy in atlas pixels, z is the atlas image
    pub atlas_position: Vector3<f32>,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
#[repr(C)]
pub struct ImagePushConstants {
    pub window_extent: [f32; 2],
    pub viewport_scale: [f32; 2],
    pub atlas_extent: [f32; 2],
    /// multiplies atlas pixel positions into normalized coordinates
    pub atlas_scale: [f32; 2],
}

impl ImagePushConstants {
    pub fn new(extent: vk::Extent2D) -> Self {
        let (window_extent, viewport_scale) = viewport_constants(extent);
        let axis = ATLAS_IMAGE_AXIS as f32;

        Self {
            window_extent: window_extent,
            viewport_scale: viewport_scale,
            atlas_extent: [axis, axis],
            atlas_scale: [1.0 / axis, 1.0 / axis],
        }
    }
}

fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 3] {
    [
        vk::VertexInputAttributeDescription {
            binding: 0,
            location: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: offset_of!(ImageVertex, position) as u32,
        },
        vk::VertexInputAttributeDescription {
            binding: 0,
            location: 1,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: offset_of!(ImageVertex, clipping_rectangle) as u32,
        },
        vk::VertexInputAttributeDescription {
            binding: 0,
            location: 2,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: offset_of!(ImageVertex, atlas_position) as u32,
        },
    ]
}

pub struct ImagePipeline {
    ip_shaders: Shaders,
    ip_descriptors: AtlasDescriptors,
    ip_layout: vk::PipelineLayout,
    ip_pipeline: vk::Pipeline,
    ip_vertices: VertexBuffer<ImageVertex>,
    ip_extent: vk::Extent2D,
}

impl ImagePipeline {
    pub fn new() -> Self {
        Self {
            ip_shaders: Shaders::null(),
            ip_descriptors: AtlasDescriptors::null(),
            ip_layout: vk::PipelineLayout::null(),
            ip_pipeline: vk::Pipeline::null(),
            ip_vertices: VertexBuffer::null(),
            ip_extent: vk::Extent2D::default(),
        }
    }

    /// The atlas version the descriptor set was last written for
    pub fn descriptor_set_version(&self) -> usize {
        self.ip_descriptors.version()
    }
}

impl Pipeline for ImagePipeline {
    fn name(&self) -> &'static str {
        "image"
    }

    fn build_for_new_device(&mut self, dev: &Device) -> Result<()> {
        self.ip_shaders = Shaders::load(dev, "image.vert", "image.frag")?;
        self.ip_descriptors = AtlasDescriptors::new(dev, ATLAS_MAX_IMAGES as u32)?;
        self.ip_layout = create_pipeline_layout(
            dev,
            &[self.ip_descriptors.layout],
            std::mem::size_of::<ImagePushConstants>(),
        )?;
        self.ip_vertices = VertexBuffer::new(dev)?;
        Ok(())
    }

    fn build_for_new_swapchain(&mut self, dev: &Device, info: &SubpassInfo) -> Result<()> {
        let attributes = vertex_attributes();
        self.ip_pipeline = create_graphics_pipeline(
            dev,
            &PipelineDesc {
                shaders: self.ip_shaders,
                layout: self.ip_layout,
                info: info,
                vertex_stride: std::mem::size_of::<ImageVertex>(),
                vertex_attributes: &attributes,
                blend: alpha_blend_attachment(),
                depth_test: true,
                depth_write: true,
            },
        )?;
        self.ip_extent = info.extent;
        Ok(())
    }

    fn draw_in_command_buffer(
        &mut self,
        dev: &Device,
        cbuf: vk::CommandBuffer,
        ctx: &DrawContext,
    ) -> Result<()> {
        self.ip_vertices.upload(dev, ctx.images().as_slice())?;
        if self.ip_vertices.count() == 0 {
            return Ok(());
        }

        {
            let mut atlas = dev.d_image_atlas.lock();
            atlas.prepare_for_rendering(dev)?;
            let version = atlas.version();
            self.ip_descriptors
                .update(dev, version, atlas.ia_sampler, &atlas.image_views());
        }

        let push = push_constant_bytes(&ImagePushConstants::new(self.ip_extent))?;
        unsafe {
            dev.dev
                .cmd_bind_pipeline(cbuf, vk::PipelineBindPoint::GRAPHICS, self.ip_pipeline);
            dev.dev.cmd_bind_descriptor_sets(
                cbuf,
                vk::PipelineBindPoint::GRAPHICS,
                self.ip_layout,
                0,
                &[self.ip_descriptors.set],
                &[],
            );
            dev.dev.cmd_push_constants(
                cbuf,
                self.ip_layout,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                push.as_slice(),
            );
        }
        draw_quads(dev, cbuf, &self.ip_vertices);
        Ok(())
    }

    fn teardown_for_swapchain_lost(&mut self, dev: &Device) {
        unsafe { dev.dev.destroy_pipeline(self.ip_pipeline, None) };
        self.ip_pipeline = vk::Pipeline::null();
    }

    fn teardown_for_device_lost(&mut self, dev: &Device) {
        self.ip_vertices.destroy(dev);
        unsafe { dev.dev.destroy_pipeline_layout(self.ip_layout, None) };
        self.ip_layout = vk::PipelineLayout::null();
        self.ip_descriptors.destroy(dev);
        self.ip_shaders.destroy(dev);
    }
}
