//! Scenes registered with the renderer.

use std::fmt;

use ash::vk;
use tracing::{debug, info};

use lantern_resources::SceneGraph;
use lantern_rhi::command::CommandBuffer;
use lantern_rhi::render_pass::{RenderPass, RenderPassGeneration};
use lantern_rhi::{RhiError, RhiResult};

use crate::model::{Model, UploadContext};
use crate::ubo::ModelUbo;

/// Handle returned by `Renderer::add_scene`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneId(pub(crate) usize);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene#{}", self.0)
    }
}

/// The models of one imported scene graph.
pub struct Scene {
    name: String,
    models: Vec<Model>,
}

impl Scene {
    /// Validates `graph` and builds each model's node arena.
    pub fn from_graph(graph: SceneGraph) -> RhiResult<Self> {
        graph
            .validate()
            .map_err(|e| RhiError::InvalidScene(e.to_string()))?;

        let models = graph
            .models
            .into_iter()
            .map(Model::new)
            .collect::<RhiResult<Vec<_>>>()?;

        debug!("Scene '{}' registered with {} model(s)", graph.name, models.len());

        Ok(Self {
            name: graph.name,
            models,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    #[inline]
    pub fn models_mut(&mut self) -> &mut [Model] {
        &mut self.models
    }

    pub fn model_mut(&mut self, name: &str) -> Option<&mut Model> {
        self.models.iter_mut().find(|model| model.name() == name)
    }

    /// Every model is uploaded and has pipelines for `generation`.
    pub fn is_ready_for(&self, generation: RenderPassGeneration) -> bool {
        self.models
            .iter()
            .all(|model| model.is_ready_for(generation))
    }

    /// Uploads models that were never uploaded and builds pipelines against
    /// `render_pass`.
    pub fn prepare(&mut self, ctx: &UploadContext<'_>, render_pass: &RenderPass) -> RhiResult<()> {
        for model in &mut self.models {
            model.upload(ctx)?;
            model.build_pipelines(ctx.registry, render_pass)?;
        }
        info!(
            "Scene '{}' prepared for render pass generation {}",
            self.name,
            render_pass.generation().value()
        );
        Ok(())
    }

    /// Drops every pipeline; the scene is not ready until prepared again.
    pub fn release_pipelines(&mut self) {
        for model in &mut self.models {
            model.release_pipelines();
        }
    }

    pub fn write_uniforms(&self, ubo: &ModelUbo) -> RhiResult<()> {
        for model in &self.models {
            model.write_uniforms(ubo)?;
        }
        Ok(())
    }

    /// Records all models and returns the number of draw calls.
    pub fn record(&self, cmd: &CommandBuffer, layout: vk::PipelineLayout) -> RhiResult<usize> {
        let mut draws = 0;
        for model in &self.models {
            draws += model.record(cmd, layout)?;
        }
        Ok(draws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_resources::procedural::textured_cube;

    #[test]
    fn test_scene_from_procedural_graph() {
        let scene = Scene::from_graph(textured_cube()).unwrap();
        assert_eq!(scene.models().len(), 1);
        assert!(!scene.is_ready_for(RenderPassGeneration::next()));
    }

    #[test]
    fn test_invalid_graph_rejected() {
        let mut graph = textured_cube();
        graph.models[0].indices[0] = u32::MAX;
        assert!(matches!(
            Scene::from_graph(graph),
            Err(RhiError::InvalidScene(_))
        ));
    }

    #[test]
    fn test_model_lookup_by_name() {
        let mut scene = Scene::from_graph(textured_cube()).unwrap();
        assert!(scene.model_mut("textured_cube").is_some());
        assert!(scene.model_mut("missing").is_none());
    }

    #[test]
    fn test_empty_scene_is_trivially_ready() {
        let scene = Scene::from_graph(SceneGraph::default()).unwrap();
        assert!(scene.is_ready_for(RenderPassGeneration::next()));
    }
}
