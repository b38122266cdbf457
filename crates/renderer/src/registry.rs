//! Pipeline registry.
//!
//! [`PipelineRegistry`] owns everything a model pipeline needs that does
//! not depend on the render pass: the two descriptor set layouts, the
//! pipeline layout and the compiled shader words. Pipelines themselves are
//! built per model against the live render pass and dropped whenever that
//! render pass is recreated.

use std::mem::offset_of;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use lantern_resources::{AlphaMode, Vertex};
use lantern_rhi::descriptor::{DescriptorBindingBuilder, DescriptorSetLayout};
use lantern_rhi::device::Device;
use lantern_rhi::pipeline::{
    BlendMode, CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
    PolygonMode, push_constant_range,
};
use lantern_rhi::render_pass::{RenderPass, RenderPassGeneration};
use lantern_rhi::shader::{
    FRAGMENT_ENTRY, ShaderModule, ShaderStage, VERTEX_ENTRY, compiler_for_path,
};
use lantern_rhi::vertex::VertexLayout;
use lantern_rhi::RhiResult;

use crate::ubo::NodePushConstants;

/// Descriptor set index of the per-model camera block.
pub const MODEL_SET: u32 = 0;
/// Descriptor set index of the per-material block and textures.
pub const MATERIAL_SET: u32 = 1;

/// Texture slots in material binding order.
pub const MATERIAL_TEXTURE_SLOTS: usize = 5;

/// Binding of the sampled image for texture slot `slot`.
///
/// Binding 0 is the material uniform; each slot then takes an image and a
/// sampler binding.
pub const fn texture_binding(slot: usize) -> u32 {
    1 + 2 * slot as u32
}

/// Binding of the sampler for texture slot `slot`.
pub const fn sampler_binding(slot: usize) -> u32 {
    texture_binding(slot) + 1
}

/// Stages that read the node push constant.
pub const PUSH_CONSTANT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::VERTEX;

/// Vertex input layout matching [`Vertex`].
pub fn vertex_layout() -> VertexLayout {
    VertexLayout::new(Vertex::size())
        .attribute(vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, position))
        .attribute(vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, normal))
        .attribute(vk::Format::R32G32_SFLOAT, offset_of!(Vertex, uv0))
        .attribute(vk::Format::R32G32_SFLOAT, offset_of!(Vertex, uv1))
}

fn model_set_bindings() -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
    vec![DescriptorBindingBuilder::uniform_buffer(
        0,
        vk::ShaderStageFlags::VERTEX,
    )]
}

fn material_set_bindings() -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
    let mut bindings = vec![DescriptorBindingBuilder::uniform_buffer(
        0,
        vk::ShaderStageFlags::FRAGMENT,
    )];
    for slot in 0..MATERIAL_TEXTURE_SLOTS {
        bindings.push(DescriptorBindingBuilder::sampled_image(
            texture_binding(slot),
            vk::ShaderStageFlags::FRAGMENT,
        ));
        bindings.push(DescriptorBindingBuilder::sampler(
            sampler_binding(slot),
            vk::ShaderStageFlags::FRAGMENT,
        ));
    }
    bindings
}

/// SPIR-V for both stages, compiled once.
#[derive(Debug, Clone)]
pub struct ShaderWords {
    pub source: PathBuf,
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl ShaderWords {
    /// Compiles both stages of `path` with the compiler its extension
    /// selects.
    pub fn compile(path: &Path) -> RhiResult<Self> {
        let compiler = compiler_for_path(path);
        let vertex = compiler.compile(path, ShaderStage::Vertex, VERTEX_ENTRY)?;
        let fragment = compiler.compile(path, ShaderStage::Fragment, FRAGMENT_ENTRY)?;
        Ok(Self {
            source: path.to_path_buf(),
            vertex,
            fragment,
        })
    }
}

/// The opaque pipeline of a model plus its optional blend variant.
pub struct ModelPipelines {
    opaque: Pipeline,
    blend: Option<Pipeline>,
}

impl ModelPipelines {
    /// Render pass both pipelines were built against.
    pub fn generation(&self) -> RenderPassGeneration {
        self.opaque.generation()
    }

    pub fn is_built_for(&self, generation: RenderPassGeneration) -> bool {
        self.opaque.generation() == generation
            && self
                .blend
                .as_ref()
                .is_none_or(|blend| blend.generation() == generation)
    }

    /// Pipeline for a material with `alpha_mode`.
    ///
    /// Falls back to the opaque pipeline when no blend variant was built.
    pub fn for_alpha_mode(&self, alpha_mode: AlphaMode) -> &Pipeline {
        match (alpha_mode, &self.blend) {
            (AlphaMode::Blend, Some(blend)) => blend,
            _ => &self.opaque,
        }
    }
}

/// Layouts and shader words shared by every model pipeline.
pub struct PipelineRegistry {
    device: Arc<Device>,
    shaders: ShaderWords,
    vertex_layout: VertexLayout,
    depth_test: bool,
    pipeline_layout: PipelineLayout,
    model_set_layout: DescriptorSetLayout,
    material_set_layout: DescriptorSetLayout,
}

impl PipelineRegistry {
    /// Creates the layouts and compiles the shader at `shader_path`.
    ///
    /// # Errors
    ///
    /// Shader compilation and layout creation failures are returned as is;
    /// they are fatal at startup.
    pub fn new(device: Arc<Device>, shader_path: &Path, depth_test: bool) -> RhiResult<Self> {
        let shaders = ShaderWords::compile(shader_path)?;

        let model_set_layout = DescriptorSetLayout::new(device.clone(), &model_set_bindings())?;
        let material_set_layout =
            DescriptorSetLayout::new(device.clone(), &material_set_bindings())?;

        let push_constants = [push_constant_range::<NodePushConstants>(PUSH_CONSTANT_STAGES)];
        let pipeline_layout = PipelineLayout::new(
            device.clone(),
            &[model_set_layout.handle(), material_set_layout.handle()],
            &push_constants,
        )?;

        info!(
            "Pipeline registry ready for {:?} (depth test {})",
            shader_path,
            if depth_test { "on" } else { "off" }
        );

        Ok(Self {
            device,
            shaders,
            vertex_layout: vertex_layout(),
            depth_test,
            pipeline_layout,
            model_set_layout,
            material_set_layout,
        })
    }

    #[inline]
    pub fn pipeline_layout(&self) -> &PipelineLayout {
        &self.pipeline_layout
    }

    #[inline]
    pub fn model_set_layout(&self) -> &DescriptorSetLayout {
        &self.model_set_layout
    }

    #[inline]
    pub fn material_set_layout(&self) -> &DescriptorSetLayout {
        &self.material_set_layout
    }

    #[inline]
    pub fn shaders(&self) -> &ShaderWords {
        &self.shaders
    }

    /// Builds one pipeline against `render_pass`.
    ///
    /// Shader modules live only for the duration of the call; the cached
    /// words are reused on every rebuild.
    pub fn create_pipeline(
        &self,
        render_pass: &RenderPass,
        blend_mode: BlendMode,
    ) -> RhiResult<Pipeline> {
        let vertex = ShaderModule::from_words(
            self.device.clone(),
            &self.shaders.vertex,
            ShaderStage::Vertex,
            VERTEX_ENTRY,
        )?;
        let fragment = ShaderModule::from_words(
            self.device.clone(),
            &self.shaders.fragment,
            ShaderStage::Fragment,
            FRAGMENT_ENTRY,
        )?;

        GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex)
            .fragment_shader(&fragment)
            .vertex_layout(&self.vertex_layout)
            .render_pass(render_pass)
            .polygon_mode(PolygonMode::Fill)
            .cull_mode(CullMode::Back)
            .front_face(FrontFace::CounterClockwise)
            .depth_test(self.depth_test)
            .blend_mode(blend_mode)
            .build(self.device.clone(), &self.pipeline_layout)
    }

    /// Builds the pipelines of one model.
    pub fn model_pipelines(
        &self,
        render_pass: &RenderPass,
        needs_blend: bool,
    ) -> RhiResult<ModelPipelines> {
        let opaque = self.create_pipeline(render_pass, BlendMode::Opaque)?;
        let blend = if needs_blend {
            Some(self.create_pipeline(render_pass, BlendMode::Alpha)?)
        } else {
            None
        };

        debug!(
            "Built model pipelines for render pass generation {} (blend variant: {})",
            render_pass.generation().value(),
            blend.is_some()
        );

        Ok(ModelPipelines { opaque, blend })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout_matches_vertex() {
        let layout = vertex_layout();
        assert_eq!(layout.stride() as usize, Vertex::size());

        let attributes = layout.attribute_descriptions();
        let offsets: Vec<u32> = attributes.iter().map(|a| a.offset).collect();
        let locations: Vec<u32> = attributes.iter().map(|a| a.location).collect();
        assert_eq!(offsets, vec![0, 12, 24, 32]);
        assert_eq!(locations, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_material_bindings_are_contiguous() {
        let bindings = material_set_bindings();
        assert_eq!(bindings.len(), 1 + 2 * MATERIAL_TEXTURE_SLOTS);
        for (i, binding) in bindings.iter().enumerate() {
            assert_eq!(binding.binding, i as u32);
        }
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(
            bindings[texture_binding(0) as usize].descriptor_type,
            vk::DescriptorType::SAMPLED_IMAGE
        );
        assert_eq!(
            bindings[sampler_binding(4) as usize].descriptor_type,
            vk::DescriptorType::SAMPLER
        );
        assert_eq!(sampler_binding(MATERIAL_TEXTURE_SLOTS - 1), 10);
    }

    #[test]
    fn test_model_set_is_vertex_uniform() {
        let bindings = model_set_bindings();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn test_shader_words_compile_from_source_tree() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../shaders/model.wgsl");
        let words = ShaderWords::compile(&path).unwrap();
        assert_eq!(words.vertex.first(), Some(&0x0723_0203));
        assert_eq!(words.fragment.first(), Some(&0x0723_0203));
    }
}
