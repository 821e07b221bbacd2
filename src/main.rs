// =============================================================================
// VK-COMPUTE - Vulkan compute bootstrap
// =============================================================================
//
// Stands up everything a compute shader will need, and stops there.
//
// INIT FLOW:
// 1. Instance (+ validation layer and debug report when enabled)
// 2. Physical device (by enumeration index)
// 3. Logical device with one compute queue
// 4. Storage buffer
// 5. Descriptor set layout / pool / set for binding 0
//
// No shader, pipeline or command buffer exists yet; the descriptor set is
// allocated but left unwritten.
//
// =============================================================================

mod backend;
mod config;

use anyhow::{Context, Result};
use backend::instance::pick_physical_device;
use backend::{Buffer, ComputeDescriptors, Device, Instance};
use config::Config;
use std::sync::Arc;

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting {}", config.app.name);
    if config.debug.log_level.parse::<log::LevelFilter>().is_err() {
        log::warn!("Unknown log level '{}', using info", config.debug.log_level);
    }

    match App::new(&config) {
        Ok(app) => {
            app.log_summary();
            log::info!("Compute resources ready, shutting down");
        }
        Err(e) => {
            report_fatal(&e);
            std::process::exit(1);
        }
    }
}

/// Initialize logging; every line carries the application name
fn init_logging(config: &Config) {
    use env_logger::Builder;
    use std::io::Write;

    let app_name = config.app.name.clone();

    let mut builder = Builder::new();
    builder.filter_level(config.log_level());
    // RUST_LOG still wins over the config file
    builder.parse_default_env();
    builder.format(move |buf, record| {
        writeln!(buf, "[{}] {}: {}", app_name, record.level(), record.args())
    });
    builder.init();
}

/// Log a fatal error with the underlying cause first
fn report_fatal(e: &anyhow::Error) {
    let cause = e.root_cause().to_string();
    let step = e.to_string();

    if cause == step {
        log::error!("{}", cause);
    } else {
        log::error!("{} ({})", cause, step);
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// All Vulkan objects created by the bootstrap.
///
/// Field order matters for Drop: descriptors and buffer go first, then the
/// device, then the instance.
pub struct App {
    descriptors: ComputeDescriptors,
    buffer: Buffer,
    device: Arc<Device>,
    instance: Arc<Instance>,
}

impl App {
    pub fn new(config: &Config) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Instance
        // ─────────────────────────────────────────────────────────────────────
        let instance = Instance::new(&config.app.name, config.debug.validation)
            .context("Failed to create Vulkan instance")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Physical device
        // ─────────────────────────────────────────────────────────────────────
        let physical_devices = instance
            .physical_devices()
            .context("Failed to enumerate physical devices")?;
        log::info!("{} physical device(s) found", physical_devices.len());

        let physical_device = pick_physical_device(&physical_devices, config.device.index)
            .context("Failed to pick a physical device")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Logical device with a compute queue
        // ─────────────────────────────────────────────────────────────────────
        // Instance extensions don't apply to the device; only layers carry over
        let device = Device::new(
            Arc::clone(&instance),
            physical_device,
            &[],
            &instance.enabled_layers,
        )
        .context("Failed to create logical device")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Storage buffer
        // ─────────────────────────────────────────────────────────────────────
        let buffer = device
            .create_buffer(config.compute.buffer_size, config.compute.host_visible)
            .context("Failed to create storage buffer")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Descriptor scaffolding
        // ─────────────────────────────────────────────────────────────────────
        let descriptors = ComputeDescriptors::new(Arc::clone(&device))
            .context("Failed to create compute descriptors")?;

        Ok(Self {
            descriptors,
            buffer,
            device,
            instance,
        })
    }

    fn log_summary(&self) {
        let families = &self.device.queue_families;

        log::info!(
            "Instance layers: {:?}, extensions: {:?}",
            self.instance.enabled_layers,
            self.instance.enabled_extensions
        );
        log::info!(
            "Queue families: graphics {:?}, compute {:?}, transfer {:?}",
            families.graphics,
            families.compute,
            families.transfer
        );
        log::debug!(
            "Compute queue {:?}, shaderFloat64 {}, shaderInt64 {}",
            self.device.compute_queue,
            self.device.info.features.shader_float64 == ash::vk::TRUE,
            self.device.info.features.shader_int64 == ash::vk::TRUE
        );
        log::info!(
            "Storage buffer: {} bytes requested, {} allocated, host visible: {}",
            self.buffer.size,
            self.buffer.allocation.size,
            self.buffer.is_host_visible()
        );
        log::debug!(
            "Descriptor layout {:?}, pool {:?}, set {:?}",
            self.descriptors.layout,
            self.descriptors.pool,
            self.descriptors.set
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn zero_devices_fails_before_device_creation() {
        let err = pick_physical_device(&[], 0).unwrap_err();
        assert!(matches!(err, backend::error::GpuError::NoPhysicalDevice));
    }

    #[test]
    fn root_cause_is_the_gpu_error() {
        let err = anyhow::Error::new(backend::error::GpuError::NoPhysicalDevice).context("Failed to pick a physical device");
        assert_eq!(err.root_cause().to_string(), "No Vulkan capable physical device found");
    }

    #[test]
    #[ignore = "needs a Vulkan driver"]
    fn bootstrap_on_real_device() {
        let config = Config::default();
        let app = App::new(&config).unwrap();

        assert!(app.device.queue_families.compute.is_some());
        assert!(app.buffer.allocation.size >= 1000);
        assert!(app.buffer.allocation.memory_flags.contains(
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE
        ));
        assert_ne!(app.descriptors.set, vk::DescriptorSet::null());
    }
}
