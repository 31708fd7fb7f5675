// SPDX-License-Identifier: CEPL-1.0
use crate::error::{VkError, VkResult};
use crate::geometry::Vertex;
use ash::util::read_spv;
use ash::vk;
use mipview_math::ViewExtents;
use std::fs::File;
use std::mem::size_of;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const VERTEX_SHADER: &str = "quad.vert.spv";
pub const FRAGMENT_SHADER: &str = "quad.frag.spv";

/// `<exe dir>/shaders`, falling back to `./shaders` if the executable path
/// cannot be resolved.
pub fn shader_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("shaders")))
        .unwrap_or_else(|| PathBuf::from("shaders"))
}

pub fn load_spv(path: &Path) -> VkResult<Vec<u32>> {
    let mut file = File::open(path).map_err(|source| VkError::ShaderRead {
        path: path.to_path_buf(),
        source,
    })?;
    read_spv(&mut file).map_err(|source| VkError::ShaderParse {
        path: path.to_path_buf(),
        source,
    })
}

/// SPIR-V words for both stages, read once at startup and reused whenever
/// the pipeline is rebuilt.
pub struct ShaderCode {
    pub vert: Vec<u32>,
    pub frag: Vec<u32>,
}

impl ShaderCode {
    pub fn load(dir: &Path) -> VkResult<Self> {
        let code = Self {
            vert: load_spv(&dir.join(VERTEX_SHADER))?,
            frag: load_spv(&dir.join(FRAGMENT_SHADER))?,
        };
        debug!(
            "vk: shaders loaded from {} ({} + {} words)",
            dir.display(),
            code.vert.len(),
            code.frag.len()
        );
        Ok(code)
    }
}

/// Single-subpass pass that clears the swapchain image and leaves it ready
/// for presentation.
pub struct RenderPass {
    device: ash::Device,
    pub render_pass: vk::RenderPass,
    pub format: vk::Format,
}

impl RenderPass {
    pub unsafe fn new(device: &ash::Device, format: vk::Format) -> VkResult<Self> {
        let color = vk::AttachmentDescription {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        };
        let color_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &color_ref,
            ..Default::default()
        };
        // Wait for the acquire semaphore's stage before writing the image.
        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ..Default::default()
        };
        let info = vk::RenderPassCreateInfo {
            attachment_count: 1,
            p_attachments: &color,
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: 1,
            p_dependencies: &dependency,
            ..Default::default()
        };
        Ok(Self {
            device: device.clone(),
            render_pass: device.create_render_pass(&info, None)?,
            format,
        })
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

pub fn push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX,
        offset: 0,
        size: size_of::<ViewExtents>() as u32,
    }
}

/// Textured-quad pipeline. Viewport and scissor are dynamic so only a
/// render pass (format) change requires a rebuild.
pub struct QuadPipeline {
    device: ash::Device,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

impl QuadPipeline {
    pub unsafe fn new(
        device: &ash::Device,
        shaders: &ShaderCode,
        render_pass: &RenderPass,
        set_layout: vk::DescriptorSetLayout,
    ) -> VkResult<Self> {
        let push = push_constant_range();
        let layout_info = vk::PipelineLayoutCreateInfo {
            set_layout_count: 1,
            p_set_layouts: &set_layout,
            push_constant_range_count: 1,
            p_push_constant_ranges: &push,
            ..Default::default()
        };
        let mut qp = QuadPipeline {
            device: device.clone(),
            layout: device.create_pipeline_layout(&layout_info, None)?,
            pipeline: vk::Pipeline::null(),
        };

        let vs = ShaderModule::new(device, &shaders.vert)?;
        let fs = ShaderModule::new(device, &shaders.frag)?;
        let entry = c"main";
        let stages = [
            vk::PipelineShaderStageCreateInfo {
                stage: vk::ShaderStageFlags::VERTEX,
                module: vs.0,
                p_name: entry.as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: fs.0,
                p_name: entry.as_ptr(),
                ..Default::default()
            },
        ];

        let binding = Vertex::binding();
        let attributes = Vertex::attributes();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            vertex_binding_description_count: 1,
            p_vertex_binding_descriptions: &binding,
            vertex_attribute_description_count: attributes.len() as u32,
            p_vertex_attribute_descriptions: attributes.as_ptr(),
            ..Default::default()
        };
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            ..Default::default()
        };
        let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo {
            dynamic_state_count: dyn_states.len() as u32,
            p_dynamic_states: dyn_states.as_ptr(),
            ..Default::default()
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };
        let raster = vk::PipelineRasterizationStateCreateInfo {
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            line_width: 1.0,
            ..Default::default()
        };
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            ..Default::default()
        };
        let blend_attachment = vk::PipelineColorBlendAttachmentState {
            color_write_mask: vk::ColorComponentFlags::RGBA,
            blend_enable: vk::FALSE,
            ..Default::default()
        };
        let color_blend = vk::PipelineColorBlendStateCreateInfo {
            attachment_count: 1,
            p_attachments: &blend_attachment,
            ..Default::default()
        };

        let info = vk::GraphicsPipelineCreateInfo {
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_color_blend_state: &color_blend,
            p_dynamic_state: &dynamic_state,
            layout: qp.layout,
            render_pass: render_pass.render_pass,
            subpass: 0,
            ..Default::default()
        };
        let pipelines = device
            .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&info), None)
            .map_err(|(_, err)| VkError::Vk(err))?;
        qp.pipeline = pipelines
            .into_iter()
            .next()
            .ok_or(VkError::Vk(vk::Result::ERROR_INITIALIZATION_FAILED))?;
        Ok(qp)
    }
}

impl Drop for QuadPipeline {
    fn drop(&mut self) {
        unsafe {
            if self.pipeline != vk::Pipeline::null() {
                self.device.destroy_pipeline(self.pipeline, None);
            }
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Shader module that only lives for pipeline creation.
struct ShaderModule(vk::ShaderModule, ash::Device);

impl ShaderModule {
    unsafe fn new(device: &ash::Device, words: &[u32]) -> VkResult<Self> {
        let info = vk::ShaderModuleCreateInfo::default().code(words);
        Ok(Self(device.create_shader_module(&info, None)?, device.clone()))
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.1.destroy_shader_module(self.0, None);
        }
    }
}
