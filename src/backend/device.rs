// Vulkan Device - compute-side GPU interface
//
// Responsibilities:
// - Snapshot physical device features/properties/memory/queue families
// - Queue family selection (dedicated compute/transfer preferred)
// - Logical device + single compute queue creation
// - Memory type resolution and buffer creation

use ash::vk;
use std::borrow::Cow;
use std::ffi::{c_char, CStr};
use std::sync::Arc;

use super::buffer::Buffer;
use super::error::{vk_check, GpuError, Result};
use super::instance::{fixed_str, Instance};

/// One compute queue at the lowest priority
static COMPUTE_QUEUE_PRIORITIES: [f32; 1] = [0.0];

/// Immutable snapshot of what a physical device offers
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub features: vk::PhysicalDeviceFeatures,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
}

impl PhysicalDeviceInfo {
    pub fn query(instance: &ash::Instance, handle: vk::PhysicalDevice) -> Self {
        unsafe {
            Self {
                features: instance.get_physical_device_features(handle),
                properties: instance.get_physical_device_properties(handle),
                memory_properties: instance.get_physical_device_memory_properties(handle),
                queue_families: instance.get_physical_device_queue_family_properties(handle),
            }
        }
    }

    pub fn name(&self) -> Cow<'_, str> {
        fixed_str(&self.properties.device_name).to_string_lossy()
    }
}

/// Queue family indices chosen for each kind of work.
///
/// Compute and transfer fall back to the graphics family when the device
/// has no dedicated family for them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub compute: Option<u32>,
    pub transfer: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn select(families: &[vk::QueueFamilyProperties]) -> Self {
        let find = |wanted: vk::QueueFlags, unwanted: vk::QueueFlags| {
            families
                .iter()
                .position(|f| f.queue_flags.contains(wanted) && !f.queue_flags.intersects(unwanted))
                .map(|i| i as u32)
        };

        let graphics = find(vk::QueueFlags::GRAPHICS, vk::QueueFlags::empty());

        // A family without graphics keeps compute work from queueing behind rendering
        let compute = find(vk::QueueFlags::COMPUTE, vk::QueueFlags::GRAPHICS);
        let transfer = find(
            vk::QueueFlags::TRANSFER,
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
        );

        Self {
            graphics,
            compute: compute.or(graphics),
            transfer: transfer.or(graphics),
        }
    }

    /// The single queue request used to create the logical device
    pub fn compute_queue_info(&self) -> Result<vk::DeviceQueueCreateInfo> {
        let family = self.compute.ok_or(GpuError::NoComputeQueueFamily)?;
        Ok(vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(family)
            .queue_priorities(&COMPUTE_QUEUE_PRIORITIES)
            .build())
    }
}

/// Lowest memory type index allowed by `type_bits` whose flags include all of `required`
pub fn find_memory_type_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    let count = memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);

    (0..count)
        .find(|&i| {
            let allowed = type_bits & (1 << i) != 0;
            allowed
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(required)
        })
        .ok_or(GpuError::NoCompatibleMemoryType { type_bits, required })
}

/// Logical device with one compute queue
pub struct Device {
    pub device: ash::Device,
    pub compute_queue: vk::Queue,
    pub queue_families: QueueFamilyIndices,
    pub info: PhysicalDeviceInfo,

    // Keeps the instance alive until the device is gone
    _instance: Arc<Instance>,
}

impl Device {
    /// Create the logical device on `physical_device`
    ///
    /// # Arguments
    /// * `extensions` - device extensions to enable
    /// * `layers` - layers to enable (normally the instance's list)
    pub fn new(
        instance: Arc<Instance>,
        physical_device: vk::PhysicalDevice,
        extensions: &[&CStr],
        layers: &[&CStr],
    ) -> Result<Arc<Self>> {
        let info = PhysicalDeviceInfo::query(&instance.instance, physical_device);

        log::info!("Selected GPU: {}", info.name());
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(info.properties.api_version),
            vk::api_version_minor(info.properties.api_version),
            vk::api_version_patch(info.properties.api_version)
        );

        let queue_families = QueueFamilyIndices::select(&info.queue_families);
        log::debug!("Queue families: {:?}", queue_families);

        let queue_info = queue_families.compute_queue_info()?;

        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

        // Device layers are ignored by current loaders but still forwarded
        #[allow(deprecated)]
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_info))
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let device = vk_check!(unsafe {
            instance.instance.create_device(physical_device, &create_info, None)
        })?;

        let compute_queue = unsafe { device.get_device_queue(queue_info.queue_family_index, 0) };

        Ok(Arc::new(Self {
            device,
            compute_queue,
            queue_families,
            info,
            _instance: instance,
        }))
    }

    /// Lowest memory type index on this device allowed by `type_bits` with all of `required`
    pub fn memory_type_index(&self, type_bits: u32, required: vk::MemoryPropertyFlags) -> Result<u32> {
        find_memory_type_index(&self.info.memory_properties, type_bits, required)
    }

    /// Allocate a fresh storage buffer; every call is a separate allocation
    pub fn create_buffer(self: &Arc<Self>, size: vk::DeviceSize, host_visible: bool) -> Result<Buffer> {
        Buffer::new(Arc::clone(self), size, host_visible)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        vk_check!(unsafe { self.device.device_wait_idle() })
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        log::debug!("Destroying logical device");
        let _ = self.wait_idle();
        unsafe { self.device.destroy_device(None) };
    }
}
