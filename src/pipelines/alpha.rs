// Override the alpha channel of the HDR attachment
//
// Used by the widget layer to punch holes in the window, for example
// where video is composited by the system below us. Only the alpha
// channel is written and nothing is blended.
use serde::{Deserialize, Serialize};

use cgmath::{Vector3, Vector4};

use ash::vk;

use super::{
    create_graphics_pipeline, create_pipeline_layout, draw_quads, push_constant_bytes,
    viewport_constants, Pipeline, PipelineDesc, Shaders, SubpassInfo, VertexBuffer,
};
use crate::device::Device;
use crate::draw_context::DrawContext;
use crate::Result;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverrideVertex {
    pub position: Vector3<f32>,
    pub clipping_rectangle: Vector4<f32>,
    pub alpha: f32,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
#[repr(C)]
pub struct OverridePushConstants {
    pub window_extent: [f32; 2],
    pub viewport_scale: [f32; 2],
}

fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 3] {
    [
        vk::VertexInputAttributeDescription {
            binding: 0,
            location: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: offset_of!(OverrideVertex, position) as u32,
        },
        vk::VertexInputAttributeDescription {
            binding: 0,
            location: 1,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: offset_of!(OverrideVertex, clipping_rectangle) as u32,
        },
        vk::VertexInputAttributeDescription {
            binding: 0,
            location: 2,
            format: vk::Format::R32_SFLOAT,
            offset: offset_of!(OverrideVertex, alpha) as u32,
        },
    ]
}

/// Write mask A, blending disabled
pub fn override_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::FALSE,
        color_write_mask: vk::ColorComponentFlags::A,
        ..Default::default()
    }
}

pub struct OverridePipeline {
    op_shaders: Shaders,
    op_layout: vk::PipelineLayout,
    op_pipeline: vk::Pipeline,
    op_vertices: VertexBuffer<OverrideVertex>,
    op_extent: vk::Extent2D,
}

impl OverridePipeline {
    pub fn new() -> Self {
        Self {
            op_shaders: Shaders::null(),
            op_layout: vk::PipelineLayout::null(),
            op_pipeline: vk::Pipeline::null(),
            op_vertices: VertexBuffer::null(),
            op_extent: vk::Extent2D::default(),
        }
    }
}

impl Pipeline for OverridePipeline {
    fn name(&self) -> &'static str {
        "override"
    }

    fn build_for_new_device(&mut self, dev: &Device) -> Result<()> {
        self.op_shaders = Shaders::load(dev, "override.vert", "override.frag")?;
        self.op_layout =
            create_pipeline_layout(dev, &[], std::mem::size_of::<OverridePushConstants>())?;
        self.op_vertices = VertexBuffer::new(dev)?;
        Ok(())
    }

    fn build_for_new_swapchain(&mut self, dev: &Device, info: &SubpassInfo) -> Result<()> {
        let attributes = vertex_attributes();
        self.op_pipeline = create_graphics_pipeline(
            dev,
            &PipelineDesc {
                shaders: self.op_shaders,
                layout: self.op_layout,
                info: info,
                vertex_stride: std::mem::size_of::<OverrideVertex>(),
                vertex_attributes: &attributes,
                blend: override_blend_attachment(),
                depth_test: true,
                depth_write: false,
            },
        )?;
        self.op_extent = info.extent;
        Ok(())
    }

    fn draw_in_command_buffer(
        &mut self,
        dev: &Device,
        cbuf: vk::CommandBuffer,
        ctx: &DrawContext,
    ) -> Result<()> {
        self.op_vertices.upload(dev, ctx.overrides().as_slice())?;
        if self.op_vertices.count() == 0 {
            return Ok(());
        }

        let (window_extent, viewport_scale) = viewport_constants(self.op_extent);
        let push = push_constant_bytes(&OverridePushConstants {
            window_extent: window_extent,
            viewport_scale: viewport_scale,
        })?;
        unsafe {
            dev.dev
                .cmd_bind_pipeline(cbuf, vk::PipelineBindPoint::GRAPHICS, self.op_pipeline);
            dev.dev.cmd_push_constants(
                cbuf,
                self.op_layout,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                push.as_slice(),
            );
        }
        draw_quads(dev, cbuf, &self.op_vertices);
        Ok(())
    }

    fn teardown_for_swapchain_lost(&mut self, dev: &Device) {
        unsafe { dev.dev.destroy_pipeline(self.op_pipeline, None) };
        self.op_pipeline = vk::Pipeline::null();
    }

    fn teardown_for_device_lost(&mut self, dev: &Device) {
        self.op_vertices.destroy(dev);
        unsafe { dev.dev.destroy_pipeline_layout(self.op_layout, None) };
        self.op_layout = vk::PipelineLayout::null();
        self.op_shaders.destroy(dev);
    }
}
