//! Uniform block layouts shared with `shaders/model.wgsl`.
//!
//! All structures use `#[repr(C)]` and implement `Pod` so they can be
//! copied straight into host-visible buffers.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use lantern_resources::MaterialData;
use lantern_scene::CameraMatrices;

/// Per-model camera block, set 0 binding 0.
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Offset 128: view-projection matrix (64 bytes)
/// - Total size: 192 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ModelUbo {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
}

impl ModelUbo {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

impl From<CameraMatrices> for ModelUbo {
    fn from(matrices: CameraMatrices) -> Self {
        Self {
            view: matrices.view,
            projection: matrices.projection,
            view_projection: matrices.view_projection,
        }
    }
}

/// Material factors, set 1 binding 0.
///
/// # Memory Layout
///
/// - Offset 0: base color factor (16 bytes)
/// - Offset 16: emissive factor, w unused (16 bytes)
/// - Offset 32: metallic, roughness, normal scale, occlusion strength (16 bytes)
/// - Offset 48: alpha cutoff, alpha mode, padding (16 bytes)
/// - Total size: 64 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MaterialUbo {
    pub base_color_factor: Vec4,
    pub emissive_factor: Vec4,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub normal_scale: f32,
    pub occlusion_strength: f32,
    pub alpha_cutoff: f32,
    pub alpha_mode: u32,
    pub _padding: [f32; 2],
}

impl MaterialUbo {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn from_material(material: &MaterialData) -> Self {
        Self {
            base_color_factor: material.base_color_factor,
            emissive_factor: material.emissive_factor.extend(0.0),
            metallic_factor: material.metallic_factor,
            roughness_factor: material.roughness_factor,
            normal_scale: material.normal_scale,
            occlusion_strength: material.occlusion_strength,
            alpha_cutoff: material.alpha_cutoff,
            alpha_mode: material.alpha_mode.shader_code(),
            _padding: [0.0; 2],
        }
    }
}

/// Per-node push constant block.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct NodePushConstants {
    pub model: Mat4,
}
