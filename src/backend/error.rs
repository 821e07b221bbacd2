// Backend error types
//
// Every fallible Vulkan call goes through `vk_check!`, which records the
// result code together with where the call was made and what it was.

use ash::vk;

#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    /// A Vulkan call returned a non-success result code
    #[error("{result:?} at line {line} in {file} in function - {call}")]
    Vk {
        result: vk::Result,
        call: &'static str,
        file: &'static str,
        line: u32,
    },

    #[error("Failed to load the Vulkan library: {0}")]
    LoaderUnavailable(String),

    #[error("Application name {0:?} contains a NUL byte")]
    InvalidApplicationName(String),

    #[error("Validation requested but not available: {0}")]
    ValidationUnavailable(String),

    #[error("vkCreateDebugReportCallbackEXT could not be resolved on this instance")]
    DebugReportUnavailable,

    #[error("No Vulkan capable physical device found")]
    NoPhysicalDevice,

    #[error("Physical device index {index} out of range ({count} enumerated)")]
    PhysicalDeviceIndexOutOfRange { index: usize, count: usize },

    #[error("No compute-capable queue family found")]
    NoComputeQueueFamily,

    #[error("Buffer size must be greater than zero")]
    InvalidBufferSize,

    #[error("Required memory type not found (type bits {type_bits:#034b}, flags {required:?})")]
    NoCompatibleMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },
}

pub type Result<T> = std::result::Result<T, GpuError>;

/// Map a `VkResult` into `GpuError::Vk`, capturing the call site
macro_rules! vk_check {
    ($call:expr) => {
        $call.map_err(|result| $crate::backend::error::GpuError::Vk {
            result,
            call: stringify!($call),
            file: file!(),
            line: line!(),
        })
    };
}

pub(crate) use vk_check;

#[cfg(test)]
mod tests {
    use super::*;

    fn failing_call() -> Result<()> {
        let res: std::result::Result<(), vk::Result> = Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        vk_check!(res)
    }

    #[test]
    fn vk_check_captures_call_site() {
        let err = failing_call().unwrap_err();
        match &err {
            GpuError::Vk { result, call, file, .. } => {
                assert_eq!(*result, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
                assert_eq!(*call, "res");
                assert!(file.ends_with("error.rs"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let message = err.to_string();
        assert!(message.starts_with("ERROR_OUT_OF_DEVICE_MEMORY at line "));
        assert!(message.ends_with("in function - res"));
    }

    #[test]
    fn vk_check_passes_success_through() {
        let ok: std::result::Result<u32, vk::Result> = Ok(7);
        assert_eq!(vk_check!(ok).unwrap(), 7);
    }

    #[test]
    fn memory_type_error_names_flags() {
        let err = GpuError::NoCompatibleMemoryType {
            type_bits: 0b101,
            required: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        };
        assert!(err.to_string().contains("DEVICE_LOCAL"));
    }
}
