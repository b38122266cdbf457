//! Descriptor set management for shader resource binding.
//!
//! - [`DescriptorSetLayout`] defines the bindings a pipeline expects
//! - [`DescriptorPool`] is the long-lived pool sized from [`DescriptorCapacity`]
//! - [`DescriptorAllocation`] returns its sets to the pool when dropped
//! - [`DescriptorWriter`] batches descriptor updates
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use lantern_core::DescriptorCapacity;
//! use lantern_rhi::device::Device;
//! use lantern_rhi::descriptor::{
//!     DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout, DescriptorWriter,
//! };
//!
//! # fn example(device: Arc<Device>, ubo: vk::Buffer) -> Result<(), lantern_rhi::RhiError> {
//! let layout = DescriptorSetLayout::new(
//!     device.clone(),
//!     &[DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::VERTEX)],
//! )?;
//! let pool = Arc::new(DescriptorPool::new(device.clone(), &DescriptorCapacity::default())?);
//!
//! let sets = DescriptorPool::allocate(&pool, &[layout.handle()])?;
//! DescriptorWriter::new()
//!     .uniform_buffer(sets.sets()[0], 0, ubo, vk::WHOLE_SIZE)
//!     .submit(&device);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use lantern_core::DescriptorCapacity;
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::RhiResult;

/// Descriptor set layout wrapper.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a layout from `bindings`.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Per-type pool sizes for `capacity`.
pub fn pool_sizes(capacity: &DescriptorCapacity) -> [vk::DescriptorPoolSize; 3] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: capacity.uniform_buffers,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::SAMPLED_IMAGE,
            descriptor_count: capacity.sampled_images,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::SAMPLER,
            descriptor_count: capacity.samplers,
        },
    ]
}

/// Long-lived descriptor pool.
///
/// Created with `FREE_DESCRIPTOR_SET` so models can release their sets
/// individually when they are destroyed.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    capacity: DescriptorCapacity,
}

impl DescriptorPool {
    /// Creates a pool with fixed per-type capacities.
    pub fn new(device: Arc<Device>, capacity: &DescriptorCapacity) -> RhiResult<Self> {
        let sizes = pool_sizes(capacity);
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(capacity.max_sets)
            .pool_sizes(&sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, uniform={}, images={}, samplers={}",
            capacity.max_sets,
            capacity.uniform_buffers,
            capacity.sampled_images,
            capacity.samplers
        );

        Ok(Self {
            device,
            pool,
            capacity: *capacity,
        })
    }

    /// Allocates one set per layout.
    ///
    /// The returned allocation frees the sets when dropped, so it keeps the
    /// pool alive through the `Arc`.
    pub fn allocate(
        pool: &Arc<Self>,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<DescriptorAllocation> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool.pool)
            .set_layouts(layouts);

        let sets = unsafe { pool.device.handle().allocate_descriptor_sets(&alloc_info)? };

        Ok(DescriptorAllocation {
            pool: Arc::clone(pool),
            sets,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn capacity(&self) -> &DescriptorCapacity {
        &self.capacity
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// Descriptor sets owned by one model or material.
pub struct DescriptorAllocation {
    pool: Arc<DescriptorPool>,
    sets: Vec<vk::DescriptorSet>,
}

impl DescriptorAllocation {
    #[inline]
    pub fn sets(&self) -> &[vk::DescriptorSet] {
        &self.sets
    }
}

impl Drop for DescriptorAllocation {
    fn drop(&mut self) {
        if self.sets.is_empty() {
            return;
        }
        let result = unsafe {
            self.pool
                .device
                .handle()
                .free_descriptor_sets(self.pool.pool, &self.sets)
        };
        if let Err(e) = result {
            warn!("Failed to free {} descriptor set(s): {}", self.sets.len(), e);
        }
    }
}

enum PendingWrite {
    Buffer {
        set: vk::DescriptorSet,
        binding: u32,
        info: vk::DescriptorBufferInfo,
    },
    Image {
        set: vk::DescriptorSet,
        binding: u32,
        ty: vk::DescriptorType,
        info: vk::DescriptorImageInfo,
    },
}

/// Collects descriptor writes and applies them in one call.
#[derive(Default)]
pub struct DescriptorWriter {
    writes: Vec<PendingWrite>,
}

impl DescriptorWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `range` bytes of `buffer` as a uniform buffer.
    pub fn uniform_buffer(
        mut self,
        set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) -> Self {
        self.writes.push(PendingWrite::Buffer {
            set,
            binding,
            info: vk::DescriptorBufferInfo {
                buffer,
                offset: 0,
                range,
            },
        });
        self
    }

    /// Binds a shader-read-only image view.
    pub fn sampled_image(mut self, set: vk::DescriptorSet, binding: u32, view: vk::ImageView) -> Self {
        self.writes.push(PendingWrite::Image {
            set,
            binding,
            ty: vk::DescriptorType::SAMPLED_IMAGE,
            info: vk::DescriptorImageInfo {
                sampler: vk::Sampler::null(),
                image_view: view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
        });
        self
    }

    /// Binds a sampler.
    pub fn sampler(mut self, set: vk::DescriptorSet, binding: u32, sampler: vk::Sampler) -> Self {
        self.writes.push(PendingWrite::Image {
            set,
            binding,
            ty: vk::DescriptorType::SAMPLER,
            info: vk::DescriptorImageInfo {
                sampler,
                image_view: vk::ImageView::null(),
                image_layout: vk::ImageLayout::UNDEFINED,
            },
        });
        self
    }

    /// Number of queued writes.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Applies every queued write.
    pub fn submit(self, device: &Device) {
        if self.writes.is_empty() {
            return;
        }

        let writes: Vec<vk::WriteDescriptorSet> = self
            .writes
            .iter()
            .map(|pending| match pending {
                PendingWrite::Buffer { set, binding, info } => vk::WriteDescriptorSet::default()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(info)),
                PendingWrite::Image {
                    set,
                    binding,
                    ty,
                    info,
                } => vk::WriteDescriptorSet::default()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .descriptor_type(*ty)
                    .image_info(std::slice::from_ref(info)),
            })
            .collect();

        unsafe {
            device.handle().update_descriptor_sets(&writes, &[]);
        }
    }
}

/// Helpers for common layout bindings.
pub struct DescriptorBindingBuilder;

impl DescriptorBindingBuilder {
    #[inline]
    pub fn uniform_buffer(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    #[inline]
    pub fn sampled_image(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::SAMPLED_IMAGE, stage_flags)
    }

    #[inline]
    pub fn sampler(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::SAMPLER, stage_flags)
    }

    fn single(
        binding: u32,
        ty: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(ty)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_uniform_buffer_binding() {
        let binding = DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::VERTEX);
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn test_texture_bindings() {
        let image = DescriptorBindingBuilder::sampled_image(3, vk::ShaderStageFlags::FRAGMENT);
        let sampler = DescriptorBindingBuilder::sampler(4, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(image.descriptor_type, vk::DescriptorType::SAMPLED_IMAGE);
        assert_eq!(sampler.descriptor_type, vk::DescriptorType::SAMPLER);
        assert_eq!(sampler.binding, 4);
    }

    #[test]
    fn test_pool_sizes_follow_capacity() {
        let capacity = DescriptorCapacity {
            max_sets: 8,
            uniform_buffers: 16,
            sampled_images: 40,
            samplers: 40,
        };
        let sizes = pool_sizes(&capacity);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 16);
        assert_eq!(sizes[1].descriptor_count, 40);
        assert_eq!(sizes[2].ty, vk::DescriptorType::SAMPLER);
    }

    #[test]
    fn test_writer_queues_writes() {
        let set = vk::DescriptorSet::from_raw(1);
        let writer = DescriptorWriter::new()
            .uniform_buffer(set, 0, vk::Buffer::from_raw(2), 64)
            .sampled_image(set, 1, vk::ImageView::from_raw(3))
            .sampler(set, 2, vk::Sampler::from_raw(4));
        assert_eq!(writer.len(), 3);
        assert!(DescriptorWriter::new().is_empty());
    }
}
