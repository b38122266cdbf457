//! Interleaved vertex format shared by every model.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Vertex with position, normal and two UV sets.
///
/// # Memory Layout
///
/// - Offset 0: position (12 bytes)
/// - Offset 12: normal (12 bytes)
/// - Offset 24: uv0 (8 bytes)
/// - Offset 32: uv1 (8 bytes)
/// - Total size: 40 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv0: Vec2,
    pub uv1: Vec2,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec3, normal: Vec3, uv0: Vec2, uv1: Vec2) -> Self {
        Self {
            position,
            normal,
            uv0,
            uv1,
        }
    }

    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(Vertex::size(), 40);
        assert_eq!(offset_of!(Vertex, position), 0);
        assert_eq!(offset_of!(Vertex, normal), 12);
        assert_eq!(offset_of!(Vertex, uv0), 24);
        assert_eq!(offset_of!(Vertex, uv1), 32);
    }

    #[test]
    fn test_vertex_bytes() {
        let vertices = [Vertex::new(Vec3::X, Vec3::Y, Vec2::ZERO, Vec2::ONE); 3];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 120);
    }
}
