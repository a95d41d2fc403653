// Rounded rectangles with optional borders
//
// Every box is one quad. The fragment shader evaluates the rounded
// shape from the corner coordinate, so the vertices carry the full
// description of the box.
use serde::{Deserialize, Serialize};

use cgmath::{Vector3, Vector4};

use ash::vk;

use super::{
    alpha_blend_attachment, create_graphics_pipeline, create_pipeline_layout, draw_quads,
    push_constant_bytes, viewport_constants, Pipeline, PipelineDesc, Shaders, SubpassInfo,
    VertexBuffer,
};
use crate::device::Device;
use crate::draw_context::DrawContext;
use crate::Result;

/// One corner of a box
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxVertex {
    /// window coordinates, z is the depth
    pub position: Vector3<f32>,
    /// left, bottom, right, top
    pub clipping_rectangle: Vector4<f32>,
    /// xy is this corner relative to the center of the box, zw is
    /// half the size of the box
    pub corner_coordinate: Vector4<f32>,
    pub fill_color: Vector4<f32>,
    pub line_color: Vector4<f32>,
    /// left-bottom, right-bottom, left-top, right-top
    pub corner_radii: Vector4<f32>,
    pub line_width: f32,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
#[repr(C)]
pub struct BoxPushConstants {
    pub window_extent: [f32; 2],
    pub viewport_scale: [f32; 2],
}

impl BoxPushConstants {
    pub fn new(extent: vk::Extent2D) -> Self {
        let (window_extent, viewport_scale) = viewport_constants(extent);
        Self {
            window_extent: window_extent,
            viewport_scale: viewport_scale,
        }
    }
}

fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 7] {
    let attr = |location, format, offset: usize| vk::VertexInputAttributeDescription {
        binding: 0,
        location: location,
        format: format,
        offset: offset as u32,
    };

    [
        attr(0, vk::Format::R32G32B32_SFLOAT, offset_of!(BoxVertex, position)),
        attr(
            1,
            vk::Format::R32G32B32A32_SFLOAT,
            offset_of!(BoxVertex, clipping_rectangle),
        ),
        attr(
            2,
            vk::Format::R32G32B32A32_SFLOAT,
            offset_of!(BoxVertex, corner_coordinate),
        ),
        attr(3, vk::Format::R32G32B32A32_SFLOAT, offset_of!(BoxVertex, fill_color)),
        attr(4, vk::Format::R32G32B32A32_SFLOAT, offset_of!(BoxVertex, line_color)),
        attr(5, vk::Format::R32G32B32A32_SFLOAT, offset_of!(BoxVertex, corner_radii)),
        attr(6, vk::Format::R32_SFLOAT, offset_of!(BoxVertex, line_width)),
    ]
}

pub struct BoxPipeline {
    bp_shaders: Shaders,
    bp_layout: vk::PipelineLayout,
    bp_pipeline: vk::Pipeline,
    bp_vertices: VertexBuffer<BoxVertex>,
    bp_extent: vk::Extent2D,
}

impl BoxPipeline {
    pub fn new() -> Self {
        Self {
            bp_shaders: Shaders::null(),
            bp_layout: vk::PipelineLayout::null(),
            bp_pipeline: vk::Pipeline::null(),
            bp_vertices: VertexBuffer::null(),
            bp_extent: vk::Extent2D::default(),
        }
    }
}

impl Pipeline for BoxPipeline {
    fn name(&self) -> &'static str {
        "box"
    }

    fn build_for_new_device(&mut self, dev: &Device) -> Result<()> {
        self.bp_shaders = Shaders::load(dev, "box.vert", "box.frag")?;
        self.bp_layout =
            create_pipeline_layout(dev, &[], std::mem::size_of::<BoxPushConstants>())?;
        self.bp_vertices = VertexBuffer::new(dev)?;
        Ok(())
    }

    fn build_for_new_swapchain(&mut self, dev: &Device, info: &SubpassInfo) -> Result<()> {
        let attributes = vertex_attributes();
        self.bp_pipeline = create_graphics_pipeline(
            dev,
            &PipelineDesc {
                shaders: self.bp_shaders,
                layout: self.bp_layout,
                info: info,
                vertex_stride: std::mem::size_of::<BoxVertex>(),
                vertex_attributes: &attributes,
                blend: alpha_blend_attachment(),
                depth_test: true,
                depth_write: true,
            },
        )?;
        self.bp_extent = info.extent;
        Ok(())
    }

    fn draw_in_command_buffer(
        &mut self,
        dev: &Device,
        cbuf: vk::CommandBuffer,
        ctx: &DrawContext,
    ) -> Result<()> {
        self.bp_vertices.upload(dev, ctx.boxes().as_slice())?;
        if self.bp_vertices.count() == 0 {
            return Ok(());
        }

        let push = push_constant_bytes(&BoxPushConstants::new(self.bp_extent))?;
        unsafe {
            dev.dev
                .cmd_bind_pipeline(cbuf, vk::PipelineBindPoint::GRAPHICS, self.bp_pipeline);
            dev.dev.cmd_push_constants(
                cbuf,
                self.bp_layout,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                push.as_slice(),
            );
        }
        draw_quads(dev, cbuf, &self.bp_vertices);
        Ok(())
    }

    fn teardown_for_swapchain_lost(&mut self, dev: &Device) {
        unsafe { dev.dev.destroy_pipeline(self.bp_pipeline, None) };
        self.bp_pipeline = vk::Pipeline::null();
    }

    fn teardown_for_device_lost(&mut self, dev: &Device) {
        self.bp_vertices.destroy(dev);
        unsafe { dev.dev.destroy_pipeline_layout(self.bp_layout, None) };
        self.bp_layout = vk::PipelineLayout::null();
        self.bp_shaders.destroy(dev);
    }
}
