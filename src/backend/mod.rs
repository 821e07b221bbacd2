// Backend module - Vulkan compute abstraction layer
//
// Design: Thin wrapper around ash with RAII teardown
// Ownership: Instance <- Device <- Buffer / ComputeDescriptors (via Arc)

pub mod error;

pub mod buffer;
pub mod descriptor;
pub mod device;
pub mod instance;

pub use buffer::Buffer;
pub use descriptor::ComputeDescriptors;
pub use device::Device;
pub use instance::Instance;
