//! Scene-side state the renderer draws from.
//!
//! This crate provides:
//! - The validated node hierarchy of a model
//! - Transforms for building and animating node matrices
//! - A perspective camera

pub mod camera;
pub mod node_tree;
pub mod transform;

pub use camera::{Camera, CameraMatrices, Perspective};
pub use node_tree::{Node, NodeId, NodeTree, SceneError};
pub use transform::{Transform, normal_matrix};
