//! Vertex input layout descriptions.
//!
//! The vertex struct itself is plain data owned by the scene description.
//! [`VertexLayout`] turns its field offsets into the binding and attribute
//! descriptions a graphics pipeline needs.

use ash::vk;

/// One attribute of an interleaved vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: vk::Format,
    pub offset: u32,
}

/// Interleaved vertex layout bound at binding 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexLayout {
    stride: u32,
    attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    pub fn new(stride: usize) -> Self {
        Self {
            stride: stride as u32,
            attributes: Vec::new(),
        }
    }

    /// Adds an attribute at the next free location.
    pub fn attribute(mut self, format: vk::Format, offset: usize) -> Self {
        let location = self.attributes.len() as u32;
        self.attributes.push(VertexAttribute {
            location,
            format,
            offset: offset as u32,
        });
        self
    }

    #[inline]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    #[inline]
    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    pub fn binding_description(&self) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: self.stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions(&self) -> Vec<vk::VertexInputAttributeDescription> {
        self.attributes
            .iter()
            .map(|attr| vk::VertexInputAttributeDescription {
                binding: 0,
                location: attr.location,
                format: attr.format,
                offset: attr.offset,
            })
            .collect()
    }
}

/// Size in bytes of one element of `format`, for the formats vertices use.
pub fn format_size(format: vk::Format) -> Option<u32> {
    match format {
        vk::Format::R32_SFLOAT => Some(4),
        vk::Format::R32G32_SFLOAT => Some(8),
        vk::Format::R32G32B32_SFLOAT => Some(12),
        vk::Format::R32G32B32A32_SFLOAT => Some(16),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position_normal_uv_uv() -> VertexLayout {
        VertexLayout::new(40)
            .attribute(vk::Format::R32G32B32_SFLOAT, 0)
            .attribute(vk::Format::R32G32B32_SFLOAT, 12)
            .attribute(vk::Format::R32G32_SFLOAT, 24)
            .attribute(vk::Format::R32G32_SFLOAT, 32)
    }

    #[test]
    fn test_binding_description() {
        let binding = position_normal_uv_uv().binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 40);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_attribute_locations_are_sequential() {
        let attrs = position_normal_uv_uv().attribute_descriptions();
        assert_eq!(attrs.len(), 4);
        for (i, attr) in attrs.iter().enumerate() {
            assert_eq!(attr.location, i as u32);
            assert_eq!(attr.binding, 0);
        }
        assert_eq!(attrs[1].offset, 12);
        assert_eq!(attrs[3].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_attributes_fit_in_stride() {
        let layout = position_normal_uv_uv();
        for attr in layout.attributes() {
            let size = format_size(attr.format).unwrap();
            assert!(attr.offset + size <= layout.stride());
        }
    }

    #[test]
    fn test_format_size_unknown() {
        assert_eq!(format_size(vk::Format::R8G8B8A8_UNORM), None);
    }
}
