//! Scene descriptions consumed by the renderer.
//!
//! This crate defines the import contract:
//! - [`SceneGraph`] and its models, nodes, meshes, primitives
//! - Materials and textures as plain CPU data
//! - [`SceneImporter`] for anything that produces a scene graph
//! - A procedural textured cube for running without asset files

pub mod error;
pub mod importer;
pub mod material;
pub mod model;
pub mod procedural;
pub mod vertex;

pub use error::{ResourceError, ResourceResult};
pub use importer::{ProceduralImporter, SceneImporter};
pub use material::{AlphaMode, MaterialData, MaterialTextures};
pub use model::{
    Filter, MeshData, ModelData, NodeData, PrimitiveData, SamplerData, SceneGraph, TextureData,
    WrapMode,
};
pub use vertex::Vertex;
