// Storage buffers backed by their own device memory
//
// One buffer, one allocation, bound at offset 0. No sub-allocation and no
// mapping; data is expected to arrive through transfers later.

use ash::vk;
use std::sync::Arc;

use super::device::Device;
use super::error::{vk_check, GpuError, Result};

/// Vulkan rejects zero-sized buffers
pub fn validate_size(size: vk::DeviceSize) -> Result<()> {
    if size == 0 {
        return Err(GpuError::InvalidBufferSize);
    }
    Ok(())
}

/// Memory flags a buffer allocation must have
pub fn required_memory_flags(host_visible: bool) -> vk::MemoryPropertyFlags {
    let mut flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    if host_visible {
        flags |= vk::MemoryPropertyFlags::HOST_VISIBLE;
    }
    flags
}

/// Size and memory type chosen for one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationPlan {
    /// Bytes to allocate; the driver's requirement, which may exceed the requested size
    pub size: vk::DeviceSize,
    pub memory_type_index: u32,
    /// Flags of the chosen memory type (a superset of what was asked for)
    pub memory_flags: vk::MemoryPropertyFlags,
}

/// `resolve` maps (allowed type bits, required flags) to a memory type index
pub fn plan_allocation<F>(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    requirements: &vk::MemoryRequirements,
    host_visible: bool,
    resolve: F,
) -> Result<AllocationPlan>
where
    F: FnOnce(u32, vk::MemoryPropertyFlags) -> Result<u32>,
{
    let memory_type_index = resolve(requirements.memory_type_bits, required_memory_flags(host_visible))?;

    Ok(AllocationPlan {
        size: requirements.size,
        memory_type_index,
        memory_flags: memory_properties.memory_types[memory_type_index as usize].property_flags,
    })
}

/// GPU buffer owning its memory; both are released on drop
pub struct Buffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    /// Size that was asked for
    pub size: vk::DeviceSize,
    pub allocation: AllocationPlan,
    device: Arc<Device>,
}

impl Buffer {
    pub fn new(device: Arc<Device>, size: vk::DeviceSize, host_visible: bool) -> Result<Self> {
        validate_size(size)?;

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = vk_check!(unsafe { device.device.create_buffer(&buffer_info, None) })?;

        let (memory, allocation) = match Self::allocate_and_bind(&device, buffer, host_visible) {
            Ok(bound) => bound,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        log::debug!(
            "Allocated buffer: {} bytes requested, {} bytes in memory type {} ({:?})",
            size,
            allocation.size,
            allocation.memory_type_index,
            allocation.memory_flags
        );

        Ok(Self {
            buffer,
            memory,
            size,
            allocation,
            device,
        })
    }

    fn allocate_and_bind(
        device: &Device,
        buffer: vk::Buffer,
        host_visible: bool,
    ) -> Result<(vk::DeviceMemory, AllocationPlan)> {
        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };
        let plan = plan_allocation(
            &device.info.memory_properties,
            &requirements,
            host_visible,
            |type_bits, required| device.memory_type_index(type_bits, required),
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(plan.size)
            .memory_type_index(plan.memory_type_index);

        let memory = vk_check!(unsafe { device.device.allocate_memory(&alloc_info, None) })?;

        if let Err(e) = vk_check!(unsafe { device.device.bind_buffer_memory(buffer, memory, 0) }) {
            unsafe { device.device.free_memory(memory, None) };
            return Err(e);
        }

        Ok((memory, plan))
    }

    pub fn is_host_visible(&self) -> bool {
        self.allocation.memory_flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.free_memory(self.memory, None);
            self.device.device.destroy_buffer(self.buffer, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::device::find_memory_type_index;
    use crate::backend::device::tests::memory_table;

    fn requirements(size: vk::DeviceSize, memory_type_bits: u32) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size,
            alignment: 256,
            memory_type_bits,
        }
    }

    fn plan_for(
        table: &vk::PhysicalDeviceMemoryProperties,
        requirements: &vk::MemoryRequirements,
        host_visible: bool,
    ) -> Result<AllocationPlan> {
        plan_allocation(table, requirements, host_visible, |type_bits, required| {
            find_memory_type_index(table, type_bits, required)
        })
    }

    fn discrete_table() -> vk::PhysicalDeviceMemoryProperties {
        memory_table(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL
                | vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
        ])
    }

    #[test]
    fn host_visible_adds_flag() {
        assert_eq!(required_memory_flags(false), vk::MemoryPropertyFlags::DEVICE_LOCAL);
        assert_eq!(
            required_memory_flags(true),
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE
        );
    }

    #[test]
    fn host_visible_1000_bytes() {
        // Driver pads 1000 bytes up to the 256-byte alignment
        let plan = plan_for(&discrete_table(), &requirements(1024, 0b111), true).unwrap();

        assert!(plan.size >= 1000);
        assert_eq!(plan.memory_type_index, 2);
        assert!(plan
            .memory_flags
            .contains(vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE));
    }

    #[test]
    fn device_local_only() {
        let plan = plan_for(&discrete_table(), &requirements(4096, 0b111), false).unwrap();
        assert_eq!(plan.size, 4096);
        assert_eq!(plan.memory_type_index, 0);
    }

    #[test]
    fn allocation_uses_driver_size() {
        let plan = plan_for(&discrete_table(), &requirements(1280, 0b001), false).unwrap();
        assert_eq!(plan.size, 1280);
    }

    #[test]
    fn no_host_visible_device_memory() {
        let table = memory_table(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let err = plan_for(&table, &requirements(1024, 0b11), true).unwrap_err();
        assert!(matches!(err, GpuError::NoCompatibleMemoryType { .. }));
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(matches!(validate_size(0), Err(GpuError::InvalidBufferSize)));
        assert!(validate_size(1).is_ok());
        assert!(validate_size(1000).is_ok());
    }

    #[test]
    fn memory_type_resolved_by_caller() {
        let table = discrete_table();
        let mut seen = None;
        let plan = plan_allocation(&table, &requirements(1024, 0b110), true, |type_bits, required| {
            seen = Some((type_bits, required));
            Ok(2)
        })
        .unwrap();

        assert_eq!(
            seen,
            Some((0b110, vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE))
        );
        assert_eq!(plan.memory_type_index, 2);
        assert_eq!(plan.memory_flags, table.memory_types[2].property_flags);
    }

    #[test]
    fn resolver_error_propagates() {
        let err = plan_allocation(&discrete_table(), &requirements(1024, 0b1), false, |type_bits, required| {
            Err(GpuError::NoCompatibleMemoryType { type_bits, required })
        })
        .unwrap_err();
        assert!(matches!(err, GpuError::NoCompatibleMemoryType { type_bits: 0b1, .. }));
    }
}
