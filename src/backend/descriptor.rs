// Descriptor scaffolding for a compute shader with one storage buffer
//
// The set is allocated but never written or bound: there is no shader yet
// to define what binding 0 should contain.

use ash::vk;
use std::sync::Arc;

use super::device::Device;
use super::error::{vk_check, Result};

/// Binding 0: one storage buffer visible to the compute stage
pub fn storage_buffer_binding() -> vk::DescriptorSetLayoutBinding {
    vk::DescriptorSetLayoutBinding::builder()
        .binding(0)
        .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::COMPUTE)
        .build()
}

/// Room for exactly one storage buffer descriptor
pub fn pool_sizes() -> [vk::DescriptorPoolSize; 1] {
    [vk::DescriptorPoolSize {
        ty: vk::DescriptorType::STORAGE_BUFFER,
        descriptor_count: 1,
    }]
}

/// Layout, pool and one set allocated from it
pub struct ComputeDescriptors {
    pub layout: vk::DescriptorSetLayout,
    pub pool: vk::DescriptorPool,
    pub set: vk::DescriptorSet,
    device: Arc<Device>,
}

impl ComputeDescriptors {
    pub fn new(device: Arc<Device>) -> Result<Self> {
        let bindings = [storage_buffer_binding()];
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let layout =
            vk_check!(unsafe { device.device.create_descriptor_set_layout(&layout_info, None) })?;

        match Self::allocate(&device, layout) {
            Ok((pool, set)) => {
                log::debug!("Descriptor set allocated for {} storage buffer binding", bindings.len());
                Ok(Self {
                    layout,
                    pool,
                    set,
                    device,
                })
            }
            Err(e) => {
                unsafe { device.device.destroy_descriptor_set_layout(layout, None) };
                Err(e)
            }
        }
    }

    fn allocate(
        device: &Device,
        layout: vk::DescriptorSetLayout,
    ) -> Result<(vk::DescriptorPool, vk::DescriptorSet)> {
        let sizes = pool_sizes();
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(1)
            .pool_sizes(&sizes);
        let pool = vk_check!(unsafe { device.device.create_descriptor_pool(&pool_info, None) })?;

        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        match vk_check!(unsafe { device.device.allocate_descriptor_sets(&alloc_info) }) {
            Ok(sets) => Ok((pool, sets[0])),
            Err(e) => {
                unsafe { device.device.destroy_descriptor_pool(pool, None) };
                Err(e)
            }
        }
    }
}

impl Drop for ComputeDescriptors {
    fn drop(&mut self) {
        // Destroying the pool frees the set
        unsafe {
            self.device.device.destroy_descriptor_pool(self.pool, None);
            self.device.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_is_one_compute_storage_buffer() {
        let binding = storage_buffer_binding();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::COMPUTE);
        assert!(binding.p_immutable_samplers.is_null());
    }

    #[test]
    fn pool_matches_binding() {
        let sizes = pool_sizes();
        let binding = storage_buffer_binding();
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].ty, binding.descriptor_type);
        assert_eq!(sizes[0].descriptor_count, binding.descriptor_count);
    }
}
