// Copy the HDR attachment into the swapchain image
//
// The last subpass. A full screen triangle reads the HDR color as an
// input attachment and applies the saturation factor. There is no
// vertex buffer, the vertex shader generates the triangle.
use serde::{Deserialize, Serialize};

use ash::vk;

use super::{
    create_graphics_pipeline, create_pipeline_layout, push_constant_bytes, Pipeline,
    PipelineDesc, Shaders, SubpassInfo,
};
use crate::device::Device;
use crate::draw_context::DrawContext;
use crate::Result;

#[derive(Clone, Copy, Serialize, Deserialize)]
#[repr(C)]
pub struct ToneMapperPushConstants {
    pub saturation: f32,
}

pub struct ToneMapperPipeline {
    tp_shaders: Shaders,
    tp_set_layout: vk::DescriptorSetLayout,
    tp_pool: vk::DescriptorPool,
    tp_set: vk::DescriptorSet,
    tp_layout: vk::PipelineLayout,
    tp_pipeline: vk::Pipeline,
}

impl ToneMapperPipeline {
    pub fn new() -> Self {
        Self {
            tp_shaders: Shaders::null(),
            tp_set_layout: vk::DescriptorSetLayout::null(),
            tp_pool: vk::DescriptorPool::null(),
            tp_set: vk::DescriptorSet::null(),
            tp_layout: vk::PipelineLayout::null(),
            tp_pipeline: vk::Pipeline::null(),
        }
    }

    fn create_descriptors(&mut self, dev: &Device) -> Result<()> {
        let bindings = [vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::INPUT_ATTACHMENT)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .descriptor_count(1)
            .build()];
        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        self.tp_set_layout = unsafe { dev.dev.create_descriptor_set_layout(&info, None)? };

        let sizes = [vk::DescriptorPoolSize::builder()
            .ty(vk::DescriptorType::INPUT_ATTACHMENT)
            .descriptor_count(1)
            .build()];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&sizes)
            .max_sets(1);
        self.tp_pool = unsafe { dev.dev.create_descriptor_pool(&pool_info, None)? };

        let layouts = [self.tp_set_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.tp_pool)
            .set_layouts(&layouts);
        self.tp_set = unsafe { dev.dev.allocate_descriptor_sets(&alloc_info)? }[0];
        Ok(())
    }

    /// Point the input attachment at the HDR image of a new swapchain
    fn write_descriptor(&self, dev: &Device, hdr_view: vk::ImageView) {
        let image_info = [vk::DescriptorImageInfo::builder()
            .image_view(hdr_view)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .build()];
        let writes = [vk::WriteDescriptorSet::builder()
            .dst_set(self.tp_set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::INPUT_ATTACHMENT)
            .image_info(&image_info)
            .build()];

        unsafe { dev.dev.update_descriptor_sets(&writes, &[]) };
    }
}

impl Pipeline for ToneMapperPipeline {
    fn name(&self) -> &'static str {
        "tone_mapper"
    }

    fn build_for_new_device(&mut self, dev: &Device) -> Result<()> {
        self.tp_shaders = Shaders::load(dev, "tone_mapper.vert", "tone_mapper.frag")?;
        self.create_descriptors(dev)?;
        self.tp_layout = create_pipeline_layout(
            dev,
            &[self.tp_set_layout],
            std::mem::size_of::<ToneMapperPushConstants>(),
        )?;
        Ok(())
    }

    fn build_for_new_swapchain(&mut self, dev: &Device, info: &SubpassInfo) -> Result<()> {
        self.write_descriptor(dev, info.hdr_view);

        let blend = vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::FALSE,
            color_write_mask: vk::ColorComponentFlags::R
                | vk::ColorComponentFlags::G
                | vk::ColorComponentFlags::B
                | vk::ColorComponentFlags::A,
            ..Default::default()
        };

        self.tp_pipeline = create_graphics_pipeline(
            dev,
            &PipelineDesc {
                shaders: self.tp_shaders,
                layout: self.tp_layout,
                info: info,
                vertex_stride: 0,
                vertex_attributes: &[],
                blend: blend,
                depth_test: false,
                depth_write: false,
            },
        )?;
        Ok(())
    }

    fn draw_in_command_buffer(
        &mut self,
        dev: &Device,
        cbuf: vk::CommandBuffer,
        ctx: &DrawContext,
    ) -> Result<()> {
        let push = push_constant_bytes(&ToneMapperPushConstants {
            saturation: ctx.saturation(),
        })?;

        unsafe {
            dev.dev
                .cmd_bind_pipeline(cbuf, vk::PipelineBindPoint::GRAPHICS, self.tp_pipeline);
            dev.dev.cmd_bind_descriptor_sets(
                cbuf,
                vk::PipelineBindPoint::GRAPHICS,
                self.tp_layout,
                0,
                &[self.tp_set],
                &[],
            );
            dev.dev.cmd_push_constants(
                cbuf,
                self.tp_layout,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                push.as_slice(),
            );
            dev.dev.cmd_draw(cbuf, 3, 1, 0, 0);
        }
        Ok(())
    }

    fn teardown_for_swapchain_lost(&mut self, dev: &Device) {
        unsafe { dev.dev.destroy_pipeline(self.tp_pipeline, None) };
        self.tp_pipeline = vk::Pipeline::null();
    }

    fn teardown_for_device_lost(&mut self, dev: &Device) {
        unsafe {
            dev.dev.destroy_pipeline_layout(self.tp_layout, None);
            dev.dev.destroy_descriptor_pool(self.tp_pool, None);
            dev.dev
                .destroy_descriptor_set_layout(self.tp_set_layout, None);
        }
        self.tp_layout = vk::PipelineLayout::null();
        self.tp_pool = vk::DescriptorPool::null();
        self.tp_set = vk::DescriptorSet::null();
        self.tp_set_layout = vk::DescriptorSetLayout::null();
        self.tp_shaders.destroy(dev);
    }
}
