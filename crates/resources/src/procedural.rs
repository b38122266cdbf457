//! Built-in scenes that need no asset files.

use glam::{Mat4, Quat, Vec2, Vec3};

use crate::material::{MaterialData, MaterialTextures};
use crate::model::{
    Filter, MeshData, ModelData, NodeData, PrimitiveData, SamplerData, SceneGraph, TextureData,
    WrapMode,
};
use crate::vertex::Vertex;

const CHECKER_SIZE: u32 = 8;

/// Face normal with two in-plane axes whose cross product is the normal,
/// so corners listed -u-v, +u-v, +u+v, -u+v wind counter-clockwise.
const FACES: [(Vec3, Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Z, Vec3::Y),
    (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    (Vec3::Y, Vec3::X, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
];

/// Unit cube geometry: 24 vertices and 36 indices.
pub fn cube_geometry() -> (Vec<Vertex>, Vec<u32>) {
    let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
    let uvs = [
        Vec2::new(0.0, 1.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(0.0, 0.0),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in FACES {
        let base = vertices.len() as u32;
        for ((su, sv), uv) in corners.iter().zip(uvs) {
            let position = (normal + u * *su + v * *sv) * 0.5;
            vertices.push(Vertex::new(position, normal, uv, uv));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

/// Two-tone RGBA8 checkerboard.
pub fn checkerboard(size: u32, light: [u8; 4], dark: [u8; 4]) -> Vec<u8> {
    (0..size * size)
        .flat_map(|i| {
            let (x, y) = (i % size, i / size);
            if (x + y) % 2 == 0 { light } else { dark }
        })
        .collect()
}

/// A checkerboard cube with a smaller cube orbiting it as a child node.
pub fn textured_cube() -> SceneGraph {
    let (vertices, indices) = cube_geometry();
    let index_count = indices.len() as u32;

    let texture = TextureData {
        width: CHECKER_SIZE,
        height: CHECKER_SIZE,
        pixels: checkerboard(CHECKER_SIZE, [235, 235, 235, 255], [40, 90, 160, 255]),
        sampler: SamplerData {
            mag_filter: Filter::Nearest,
            min_filter: Filter::Nearest,
            wrap_u: WrapMode::Repeat,
            wrap_v: WrapMode::Repeat,
        },
    };

    let material = MaterialData {
        name: "checker".into(),
        roughness_factor: 0.6,
        textures: MaterialTextures {
            base_color: Some(0),
            ..Default::default()
        },
        ..Default::default()
    };

    let child_transform = Mat4::from_scale_rotation_translation(
        Vec3::splat(0.4),
        Quat::from_rotation_y(std::f32::consts::FRAC_PI_4),
        Vec3::new(1.5, 0.5, 0.0),
    );

    let model = ModelData {
        name: "textured_cube".into(),
        vertices,
        indices,
        nodes: vec![
            NodeData::new("cube", Mat4::IDENTITY)
                .with_mesh(0)
                .with_children([1]),
            NodeData::new("satellite", child_transform).with_mesh(0),
        ],
        root_nodes: vec![0],
        meshes: vec![MeshData {
            primitives: vec![PrimitiveData {
                first_index: 0,
                index_count,
                vertex_offset: 0,
                material: Some(0),
            }],
        }],
        materials: vec![material],
        textures: vec![texture],
    };

    SceneGraph {
        name: "textured_cube".into(),
        models: vec![model],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_textured_cube_is_valid() {
        let scene = textured_cube();
        assert!(scene.validate().is_ok());
        let model = &scene.models[0];
        assert_eq!(model.vertices.len(), 24);
        assert_eq!(model.triangle_count(), 12);
        assert_eq!(model.nodes[0].children, vec![1]);
    }

    #[test]
    fn test_cube_faces_wind_counter_clockwise() {
        let (vertices, indices) = cube_geometry();
        for triangle in indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| vertices[triangle[i] as usize]);
            let face_normal = (b.position - a.position).cross(c.position - a.position);
            assert!(face_normal.dot(a.normal) > 0.0);
        }
    }

    #[test]
    fn test_cube_is_unit_sized() {
        let (vertices, _) = cube_geometry();
        for vertex in vertices {
            assert!(vertex.position.abs().max_element() <= 0.5 + f32::EPSILON);
            assert!((vertex.position.dot(vertex.normal) - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_checkerboard() {
        let pixels = checkerboard(2, [255; 4], [0, 0, 0, 255]);
        assert_eq!(pixels.len(), 16);
        assert_eq!(&pixels[0..4], &[255; 4]);
        assert_eq!(&pixels[4..8], &[0, 0, 0, 255]);
        assert_eq!(&pixels[8..12], &[0, 0, 0, 255]);
    }
}
