// Signed distance field glyphs
//
// Glyph quads sample the SDF atlas. On devices with dual source
// blending the fragment shader produces a coverage value per color
// channel, shifted by a third of a pixel for the red and blue
// subpixels of the display.
use serde::{Deserialize, Serialize};

use cgmath::{Vector3, Vector4};

use ash::vk;

use super::{
    alpha_blend_attachment, create_graphics_pipeline, create_pipeline_layout, draw_quads,
    push_constant_bytes, viewport_constants, AtlasDescriptors, Pipeline, PipelineDesc, Shaders,
    SubpassInfo, VertexBuffer,
};
use crate::device::Device;
use crate::draw_context::DrawContext;
use crate::sdf_atlas::SDF_MAX_IMAGES;
use crate::Result;

/// Layout of the color subpixels of the display
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SubpixelOrientation {
    Unknown,
    HorizontalRGB,
    HorizontalBGR,
    VerticalRGB,
    VerticalBGR,
}

impl Default for SubpixelOrientation {
    fn default() -> Self {
        SubpixelOrientation::Unknown
    }
}

impl SubpixelOrientation {
    /// Offsets of the red and blue subpixels from the center of the
    /// pixel, in pixels. None when the layout is unknown.
    pub fn offsets(&self) -> Option<([f32; 2], [f32; 2])> {
        let third = 1.0 / 3.0;
        match self {
            SubpixelOrientation::Unknown => None,
            SubpixelOrientation::HorizontalRGB => Some(([-third, 0.0], [third, 0.0])),
            SubpixelOrientation::HorizontalBGR => Some(([third, 0.0], [-third, 0.0])),
            SubpixelOrientation::VerticalRGB => Some(([0.0, third], [0.0, -third])),
            SubpixelOrientation::VerticalBGR => Some(([0.0, -third], [0.0, third])),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SdfVertex {
    pub position: Vector3<f32>,
    pub clipping_rectangle: Vector4<f32>,
    /// xy in pixels of the atlas image, z is the atlas image
    pub texture_coord: Vector3<f32>,
    pub color: Vector4<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct SdfPushConstants {
    pub window_extent: [f32; 2],
    pub viewport_scale: [f32; 2],
    pub red_subpixel_offset: [f32; 2],
    pub blue_subpixel_offset: [f32; 2],
    /// a bool in the shader
    pub has_subpixels: u32,
}

impl SdfPushConstants {
    pub fn new(extent: vk::Extent2D, orientation: SubpixelOrientation) -> Self {
        let (window_extent, viewport_scale) = viewport_constants(extent);
        let (red, blue, has_subpixels) = match orientation.offsets() {
            Some((red, blue)) => (red, blue, 1),
            None => ([0.0; 2], [0.0; 2], 0),
        };

        Self {
            window_extent: window_extent,
            viewport_scale: viewport_scale,
            red_subpixel_offset: red,
            blue_subpixel_offset: blue,
            has_subpixels: has_subpixels,
        }
    }
}

/// Blending of the glyph coverage over the HDR attachment
///
/// With dual source blending the second fragment output holds a
/// coverage per channel. Otherwise the shader premultiplies its color.
pub fn sdf_blend_attachment(dual_source: bool) -> vk::PipelineColorBlendAttachmentState {
    let (dst_color, dst_alpha) = match dual_source {
        true => (
            vk::BlendFactor::ONE_MINUS_SRC1_COLOR,
            vk::BlendFactor::ONE_MINUS_SRC1_ALPHA,
        ),
        false => (
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        ),
    };

    vk::PipelineColorBlendAttachmentState {
        src_color_blend_factor: vk::BlendFactor::ONE,
        dst_color_blend_factor: dst_color,
        src_alpha_blend_factor: vk::BlendFactor::ONE,
        dst_alpha_blend_factor: dst_alpha,
        ..alpha_blend_attachment()
    }
}

fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 4] {
    let attr = |location, format, offset: usize| vk::VertexInputAttributeDescription {
        binding: 0,
        location: location,
        format: format,
        offset: offset as u32,
    };

    [
        attr(0, vk::Format::R32G32B32_SFLOAT, offset_of!(SdfVertex, position)),
        attr(
            1,
            vk::Format::R32G32B32A32_SFLOAT,
            offset_of!(SdfVertex, clipping_rectangle),
        ),
        attr(2, vk::Format::R32G32B32_SFLOAT, offset_of!(SdfVertex, texture_coord)),
        attr(3, vk::Format::R32G32B32A32_SFLOAT, offset_of!(SdfVertex, color)),
    ]
}

pub struct SdfPipeline {
    sp_shaders: Shaders,
    sp_dual_source: bool,
    sp_descriptors: AtlasDescriptors,
    sp_layout: vk::PipelineLayout,
    sp_pipeline: vk::Pipeline,
    sp_vertices: VertexBuffer<SdfVertex>,
    sp_extent: vk::Extent2D,
}

impl SdfPipeline {
    pub fn new() -> Self {
        Self {
            sp_shaders: Shaders::null(),
            sp_dual_source: false,
            sp_descriptors: AtlasDescriptors::null(),
            sp_layout: vk::PipelineLayout::null(),
            sp_pipeline: vk::Pipeline::null(),
            sp_vertices: VertexBuffer::null(),
            sp_extent: vk::Extent2D::default(),
        }
    }
}

impl Pipeline for SdfPipeline {
    fn name(&self) -> &'static str {
        "sdf"
    }

    fn build_for_new_device(&mut self, dev: &Device) -> Result<()> {
        self.sp_dual_source = dev.supports_dual_source_blend();
        let frag = match self.sp_dual_source {
            true => "sdf.frag",
            false => "sdf_single.frag",
        };

        self.sp_shaders = Shaders::load(dev, "sdf.vert", frag)?;
        self.sp_descriptors = AtlasDescriptors::new(dev, SDF_MAX_IMAGES as u32)?;
        self.sp_layout = create_pipeline_layout(
            dev,
            &[self.sp_descriptors.layout],
            std::mem::size_of::<SdfPushConstants>(),
        )?;
        self.sp_vertices = VertexBuffer::new(dev)?;
        Ok(())
    }

    fn build_for_new_swapchain(&mut self, dev: &Device, info: &SubpassInfo) -> Result<()> {
        let attributes = vertex_attributes();
        self.sp_pipeline = create_graphics_pipeline(
            dev,
            &PipelineDesc {
                shaders: self.sp_shaders,
                layout: self.sp_layout,
                info: info,
                vertex_stride: std::mem::size_of::<SdfVertex>(),
                vertex_attributes: &attributes,
                blend: sdf_blend_attachment(self.sp_dual_source),
                depth_test: true,
                depth_write: true,
            },
        )?;
        self.sp_extent = info.extent;
        Ok(())
    }

    fn draw_in_command_buffer(
        &mut self,
        dev: &Device,
        cbuf: vk::CommandBuffer,
        ctx: &DrawContext,
    ) -> Result<()> {
        self.sp_vertices.upload(dev, ctx.glyphs().as_slice())?;
        if self.sp_vertices.count() == 0 {
            return Ok(());
        }

        {
            let mut atlas = dev.d_sdf_atlas.lock();
            atlas.prepare_for_rendering(dev)?;
            let version = atlas.version();
            self.sp_descriptors
                .update(dev, version, atlas.sa_sampler, &atlas.image_views());
        }

        let push = push_constant_bytes(&SdfPushConstants::new(
            self.sp_extent,
            ctx.subpixel_orientation(),
        ))?;
        unsafe {
            dev.dev
                .cmd_bind_pipeline(cbuf, vk::PipelineBindPoint::GRAPHICS, self.sp_pipeline);
            dev.dev.cmd_bind_descriptor_sets(
                cbuf,
                vk::PipelineBindPoint::GRAPHICS,
                self.sp_layout,
                0,
                &[self.sp_descriptors.set],
                &[],
            );
            dev.dev.cmd_push_constants(
                cbuf,
                self.sp_layout,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                push.as_slice(),
            );
        }
        draw_quads(dev, cbuf, &self.sp_vertices);
        Ok(())
    }

    fn teardown_for_swapchain_lost(&mut self, dev: &Device) {
        unsafe { dev.dev.destroy_pipeline(self.sp_pipeline, None) };
        self.sp_pipeline = vk::Pipeline::null();
    }

    fn teardown_for_device_lost(&mut self, dev: &Device) {
        self.sp_vertices.destroy(dev);
        unsafe { dev.dev.destroy_pipeline_layout(self.sp_layout, None) };
        self.sp_layout = vk::PipelineLayout::null();
        self.sp_descriptors.destroy(dev);
        self.sp_shaders.destroy(dev);
    }
}
