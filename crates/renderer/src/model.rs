//! GPU-side models.
//!
//! A [`Model`] starts as validated CPU data plus its node arena. The first
//! upload creates its device-local vertex and index buffers, textures, uniform
//! buffer and descriptor sets and drops the CPU copy; those resources then
//! live as long as the model. Pipelines are built separately and replaced
//! every time the render pass changes.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, trace};

use lantern_resources::{AlphaMode, MeshData, ModelData};
use lantern_rhi::buffer::{Buffer, BufferUsage};
use lantern_rhi::command::{CommandBuffer, CommandPool};
use lantern_rhi::descriptor::{DescriptorAllocation, DescriptorPool, DescriptorWriter};
use lantern_rhi::device::Device;
use lantern_rhi::render_pass::{RenderPass, RenderPassGeneration};
use lantern_rhi::texture::Texture;
use lantern_rhi::{RhiError, RhiResult};
use lantern_scene::NodeTree;

use crate::material::{FallbackTextures, MaterialSets, sampler_info};
use crate::registry::{
    MATERIAL_SET, MODEL_SET, ModelPipelines, PUSH_CONSTANT_STAGES, PipelineRegistry,
};
use crate::ubo::{ModelUbo, NodePushConstants};

/// Shared objects a model needs to create its GPU resources.
pub struct UploadContext<'a> {
    pub device: &'a Arc<Device>,
    pub command_pool: &'a CommandPool,
    pub descriptor_pool: &'a Arc<DescriptorPool>,
    pub registry: &'a PipelineRegistry,
    pub fallback: &'a FallbackTextures,
}

/// Resources created on first upload.
///
/// Field order is drop order: descriptor sets go before the buffers and
/// textures they reference.
struct ModelResources {
    materials: MaterialSets,
    model_set: DescriptorAllocation,
    uniform: Buffer,
    vertex: Buffer,
    index: Buffer,
    /// Owned so the views and samplers in `materials` stay valid.
    _textures: Vec<Texture>,
}

/// One model of a scene.
pub struct Model {
    name: String,
    tree: NodeTree,
    meshes: Vec<MeshData>,
    needs_blend: bool,
    pending: Option<ModelData>,
    pipelines: Option<ModelPipelines>,
    resources: Option<ModelResources>,
}

impl Model {
    /// Validates `data` and builds its node arena. No GPU work happens here.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidScene`] for out-of-range references, empty geometry
    /// or a malformed node hierarchy.
    pub fn new(data: ModelData) -> RhiResult<Self> {
        data.validate()
            .map_err(|e| RhiError::InvalidScene(e.to_string()))?;
        if data.vertices.is_empty() || data.indices.is_empty() {
            return Err(RhiError::InvalidScene(format!(
                "model '{}' has no geometry",
                data.name
            )));
        }
        let tree = NodeTree::from_data(&data.nodes, &data.root_nodes)
            .map_err(|e| RhiError::InvalidScene(format!("model '{}': {}", data.name, e)))?;

        Ok(Self {
            name: data.name.clone(),
            tree,
            meshes: data.meshes.clone(),
            needs_blend: data.has_blended_materials(),
            pending: Some(data),
            pipelines: None,
            resources: None,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    /// Node arena, for animating local transforms.
    #[inline]
    pub fn tree_mut(&mut self) -> &mut NodeTree {
        &mut self.tree
    }

    #[inline]
    pub fn needs_blend(&self) -> bool {
        self.needs_blend
    }

    pub fn is_uploaded(&self) -> bool {
        self.resources.is_some()
    }

    /// Uploaded and holding pipelines for `generation`.
    pub fn is_ready_for(&self, generation: RenderPassGeneration) -> bool {
        self.is_uploaded()
            && self
                .pipelines
                .as_ref()
                .is_some_and(|pipelines| pipelines.is_built_for(generation))
    }

    /// Device-local vertex and index buffers, once uploaded.
    pub fn geometry_buffers(&self) -> Option<(&Buffer, &Buffer)> {
        self.resources
            .as_ref()
            .map(|resources| (&resources.vertex, &resources.index))
    }

    /// Creates the model's GPU resources. Does nothing after the first call.
    pub fn upload(&mut self, ctx: &UploadContext<'_>) -> RhiResult<()> {
        if self.resources.is_some() {
            return Ok(());
        }
        // Kept until every resource exists, so a failed upload can be retried.
        let data = self.pending.as_ref().ok_or_else(|| {
            RhiError::InvalidScene(format!("model '{}' has no data to upload", self.name))
        })?;

        let textures = data
            .textures
            .iter()
            .map(|texture| {
                Texture::from_rgba8(
                    ctx.device.clone(),
                    ctx.command_pool,
                    texture.width,
                    texture.height,
                    &texture.pixels,
                    sampler_info(&texture.sampler),
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        let vertex = Buffer::new_device_local(
            ctx.device.clone(),
            ctx.command_pool,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&data.vertices),
        )?;
        let index = Buffer::new_device_local(
            ctx.device.clone(),
            ctx.command_pool,
            BufferUsage::Index,
            bytemuck::cast_slice(&data.indices),
        )?;

        let uniform = Buffer::new(
            ctx.device.clone(),
            BufferUsage::Uniform,
            ModelUbo::SIZE as vk::DeviceSize,
        )?;
        uniform.write_pod(&ModelUbo::default())?;

        let model_set = DescriptorPool::allocate(
            ctx.descriptor_pool,
            &[ctx.registry.model_set_layout().handle()],
        )?;
        let mut writer = DescriptorWriter::new();
        for &set in model_set.sets() {
            writer = writer.uniform_buffer(set, 0, uniform.handle(), uniform.size());
        }
        writer.submit(ctx.device);

        let needs_default = data.primitives().any(|p| p.material.is_none());
        let materials = MaterialSets::new(
            ctx.device,
            ctx.descriptor_pool,
            ctx.registry.material_set_layout().handle(),
            data.materials.clone(),
            needs_default,
            &textures,
            ctx.fallback,
        )?;

        debug!(
            "Uploaded model '{}': {} vertices, {} indices, {} texture(s), {} material set(s)",
            self.name,
            data.vertices.len(),
            data.indices.len(),
            textures.len(),
            materials.len()
        );

        self.pending = None;
        self.resources = Some(ModelResources {
            materials,
            model_set,
            uniform,
            vertex,
            index,
            _textures: textures,
        });
        Ok(())
    }

    /// Builds pipelines against `render_pass` unless they already match it.
    pub fn build_pipelines(
        &mut self,
        registry: &PipelineRegistry,
        render_pass: &RenderPass,
    ) -> RhiResult<()> {
        let generation = render_pass.generation();
        if self
            .pipelines
            .as_ref()
            .is_some_and(|pipelines| pipelines.is_built_for(generation))
        {
            return Ok(());
        }

        self.pipelines = None;
        self.pipelines = Some(registry.model_pipelines(render_pass, self.needs_blend)?);
        Ok(())
    }

    /// Drops the pipelines; the model is not ready until rebuilt.
    pub fn release_pipelines(&mut self) {
        if self.pipelines.take().is_some() {
            trace!("Released pipelines of model '{}'", self.name);
        }
    }

    /// Copies the camera block into the model's uniform buffer.
    pub fn write_uniforms(&self, ubo: &ModelUbo) -> RhiResult<()> {
        match &self.resources {
            Some(resources) => resources.uniform.write_pod(ubo),
            None => Ok(()),
        }
    }

    /// Records every primitive of the model, opaque ones first.
    ///
    /// Returns the number of draw calls.
    pub fn record(&self, cmd: &CommandBuffer, layout: vk::PipelineLayout) -> RhiResult<usize> {
        let (Some(resources), Some(pipelines)) = (&self.resources, &self.pipelines) else {
            return Err(RhiError::InvalidScene(format!(
                "model '{}' recorded before it was prepared",
                self.name
            )));
        };

        cmd.bind_vertex_buffers(0, &[resources.vertex.handle()], &[0]);
        cmd.bind_index_buffer(resources.index.handle(), 0);
        cmd.bind_descriptor_sets(layout, MODEL_SET, resources.model_set.sets());

        let mut draws = 0;
        for blend_pass in [false, true] {
            let mut bound_pipeline = None;
            self.tree.visit(|_, node, world| {
                let Some(mesh) = node.mesh.and_then(|mesh| self.meshes.get(mesh)) else {
                    return;
                };

                let mut pushed = false;
                for primitive in &mesh.primitives {
                    let set_index = resources.materials.set_index(primitive.material);
                    let alpha_mode = resources
                        .materials
                        .material(set_index)
                        .map(|material| material.alpha_mode)
                        .unwrap_or_default();
                    if (alpha_mode == AlphaMode::Blend) != blend_pass {
                        continue;
                    }
                    let Some(material_set) = resources.materials.set(set_index) else {
                        continue;
                    };

                    let pipeline = pipelines.for_alpha_mode(alpha_mode).handle();
                    if bound_pipeline != Some(pipeline) {
                        cmd.bind_graphics_pipeline(pipeline);
                        bound_pipeline = Some(pipeline);
                    }
                    if !pushed {
                        cmd.push_constants(
                            layout,
                            PUSH_CONSTANT_STAGES,
                            0,
                            &NodePushConstants { model: world },
                        );
                        pushed = true;
                    }
                    cmd.bind_descriptor_sets(layout, MATERIAL_SET, &[material_set]);
                    cmd.draw_indexed(
                        primitive.index_count,
                        primitive.first_index,
                        primitive.vertex_offset,
                    );
                    draws += 1;
                }
            });
        }

        Ok(draws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;
    use lantern_resources::procedural::textured_cube;
    use lantern_resources::NodeData;

    fn cube_model() -> ModelData {
        textured_cube().models.remove(0)
    }

    #[test]
    fn test_new_model_is_not_uploaded() {
        let model = Model::new(cube_model()).unwrap();
        assert_eq!(model.name(), "textured_cube");
        assert!(!model.is_uploaded());
        assert!(!model.is_ready_for(RenderPassGeneration::next()));
        assert!(model.geometry_buffers().is_none());
        assert_eq!(model.tree().len(), 2);
    }

    #[test]
    fn test_invalid_reference_rejected() {
        let mut data = cube_model();
        data.nodes[0].mesh = Some(7);
        assert!(matches!(Model::new(data), Err(RhiError::InvalidScene(_))));
    }

    #[test]
    fn test_cyclic_hierarchy_rejected() {
        let mut data = cube_model();
        data.nodes.push(NodeData::new("loop", Mat4::IDENTITY).with_children([0]));
        data.nodes[1].children.push(2);
        let err = Model::new(data).err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("textured_cube"), "{err}");
    }

    #[test]
    fn test_empty_geometry_rejected() {
        let mut data = cube_model();
        data.meshes.clear();
        data.nodes.iter_mut().for_each(|node| node.mesh = None);
        data.vertices.clear();
        data.indices.clear();
        assert!(matches!(Model::new(data), Err(RhiError::InvalidScene(_))));
    }

    #[test]
    fn test_failed_upload_keeps_data_for_retry() {
        use std::path::PathBuf;

        use lantern_core::RendererConfig;
        use lantern_rhi::context::DeviceContext;

        let config = RendererConfig {
            enable_validation: false,
            shader_path: PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                .join("../../shaders/model.wgsl"),
            ..Default::default()
        };
        let context = match DeviceContext::headless(&config) {
            Ok(context) => context,
            Err(RhiError::LoadingError(_) | RhiError::NoSuitableAdapter) => {
                eprintln!("no Vulkan device available, skipping");
                return;
            }
            Err(e) => panic!("headless context failed: {e}"),
        };
        let registry =
            PipelineRegistry::new(context.device().clone(), &config.shader_path, true).unwrap();
        let fallback =
            FallbackTextures::new(context.device().clone(), context.command_pool()).unwrap();
        let ctx = UploadContext {
            device: context.device(),
            command_pool: context.command_pool(),
            descriptor_pool: context.descriptor_pool(),
            registry: &registry,
            fallback: &fallback,
        };

        let mut model = Model::new(cube_model()).unwrap();
        let removed = model.pending.as_mut().unwrap().textures[0].pixels.pop().unwrap();

        for _ in 0..2 {
            assert!(matches!(model.upload(&ctx), Err(RhiError::InvalidResource(_))));
            assert!(!model.is_uploaded());
        }

        model.pending.as_mut().unwrap().textures[0].pixels.push(removed);
        model.upload(&ctx).unwrap();
        assert!(model.is_uploaded());
        assert!(model.pending.is_none());
    }

    #[test]
    fn test_blend_flag_follows_materials() {
        let mut data = cube_model();
        assert!(!Model::new(data.clone()).unwrap().needs_blend());
        data.materials[0].alpha_mode = AlphaMode::Blend;
        assert!(Model::new(data).unwrap().needs_blend());
    }
}
