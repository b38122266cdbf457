//! Scene graph data handed over by an importer.
//!
//! Everything here is plain CPU data. A [`SceneGraph`] holds models; each
//! [`ModelData`] holds a flat vertex buffer, a flat `u32` index buffer, a
//! node hierarchy, meshes made of primitives, materials and textures.
//! Primitives address the index buffer by range; nodes address meshes,
//! primitives address materials and materials address textures by index.

use glam::Mat4;
use tracing::debug;

use crate::error::{ResourceError, ResourceResult};
use crate::material::MaterialData;
use crate::vertex::Vertex;

/// Texture filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

/// Texture coordinate wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WrapMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

/// Sampler parameters of a texture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerData {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
}

/// Tightly packed RGBA8 pixels plus sampling parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub sampler: SamplerData,
}

impl TextureData {
    /// Byte length `pixels` must have.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// A drawable range of the model's index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveData {
    pub first_index: u32,
    pub index_count: u32,
    /// Added to every index before it addresses the vertex buffer.
    pub vertex_offset: i32,
    /// `None` uses the default material.
    pub material: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshData {
    pub primitives: Vec<PrimitiveData>,
}

/// One node of a model's hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub name: String,
    /// Transform relative to the parent node.
    pub local_transform: Mat4,
    pub mesh: Option<usize>,
    pub children: Vec<usize>,
}

impl NodeData {
    pub fn new(name: impl Into<String>, local_transform: Mat4) -> Self {
        Self {
            name: name.into(),
            local_transform,
            mesh: None,
            children: Vec::new(),
        }
    }

    pub fn with_mesh(mut self, mesh: usize) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = usize>) -> Self {
        self.children.extend(children);
        self
    }
}

/// A model: geometry, hierarchy, materials and textures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelData {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub nodes: Vec<NodeData>,
    /// Nodes without a parent, drawn in this order.
    pub root_nodes: Vec<usize>,
    pub meshes: Vec<MeshData>,
    pub materials: Vec<MaterialData>,
    pub textures: Vec<TextureData>,
}

impl ModelData {
    pub fn primitives(&self) -> impl Iterator<Item = &PrimitiveData> {
        self.meshes.iter().flat_map(|mesh| mesh.primitives.iter())
    }

    pub fn triangle_count(&self) -> usize {
        self.primitives()
            .map(|primitive| primitive.index_count as usize / 3)
            .sum()
    }

    /// Whether any material needs the alpha-blended pipeline variant.
    pub fn has_blended_materials(&self) -> bool {
        self.materials.iter().any(MaterialData::is_blended)
    }

    /// Checks that every buffer range and cross reference resolves.
    ///
    /// The node hierarchy itself (cycles, multiple parents) is checked when
    /// the node tree is built.
    pub fn validate(&self) -> ResourceResult<()> {
        let missing = |kind: &'static str, index: usize| ResourceError::MissingReference {
            model: self.name.clone(),
            kind,
            index,
        };

        let has_primitives = self.primitives().next().is_some();
        if has_primitives && (self.vertices.is_empty() || self.indices.is_empty()) {
            return Err(ResourceError::EmptyGeometry(self.name.clone()));
        }

        for primitive in self.primitives() {
            let end = primitive.first_index as u64 + primitive.index_count as u64;
            if end > self.indices.len() as u64 {
                return Err(ResourceError::PrimitiveOutOfRange {
                    model: self.name.clone(),
                    first: primitive.first_index,
                    end,
                    index_count: self.indices.len(),
                });
            }

            let range = primitive.first_index as usize..end as usize;
            for &index in &self.indices[range] {
                let resolved = index as i64 + primitive.vertex_offset as i64;
                if resolved < 0 || resolved >= self.vertices.len() as i64 {
                    return Err(ResourceError::IndexOutOfRange {
                        model: self.name.clone(),
                        index: resolved.max(0) as u64,
                        vertex_count: self.vertices.len(),
                    });
                }
            }

            if let Some(material) = primitive.material
                && material >= self.materials.len()
            {
                return Err(missing("material", material));
            }
        }

        for node in &self.nodes {
            if let Some(mesh) = node.mesh
                && mesh >= self.meshes.len()
            {
                return Err(missing("mesh", mesh));
            }
        }

        for material in &self.materials {
            if let Some(texture) = material
                .textures
                .referenced()
                .find(|&texture| texture >= self.textures.len())
            {
                return Err(missing("texture", texture));
            }
        }

        for (index, texture) in self.textures.iter().enumerate() {
            let reason = if texture.width == 0 || texture.height == 0 {
                Some(format!("{}x{} has no texels", texture.width, texture.height))
            } else if texture.pixels.len() != texture.expected_len() {
                Some(format!(
                    "{}x{} needs {} bytes, got {}",
                    texture.width,
                    texture.height,
                    texture.expected_len(),
                    texture.pixels.len()
                ))
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(ResourceError::InvalidTexture {
                    model: self.name.clone(),
                    index,
                    reason,
                });
            }
        }

        Ok(())
    }
}

/// What an importer produces: the models of one scene.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneGraph {
    pub name: String,
    pub models: Vec<ModelData>,
}

impl SceneGraph {
    pub fn validate(&self) -> ResourceResult<()> {
        for model in &self.models {
            model.validate()?;
        }
        debug!(
            "Scene '{}' validated: {} model(s), {} triangle(s)",
            self.name,
            self.models.len(),
            self.models.iter().map(ModelData::triangle_count).sum::<usize>()
        );
        Ok(())
    }
}
