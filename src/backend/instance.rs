// Vulkan Instance - entry point into the API
//
// Responsibilities:
// - Load the Vulkan library
// - Enumerate instance layers/extensions
// - Enable validation + debug report when asked (fail fast if missing)
// - Enumerate and pick the physical device

// VK_EXT_debug_report is superseded by debug utils but is the extension we enable
#![allow(deprecated)]

use ash::extensions::ext::DebugReport;
use ash::{vk, Entry};
use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::Arc;

use super::error::{vk_check, GpuError, Result};

/// Validation layers we accept, in order of preference.
/// The LunarG meta-layer is what older SDKs ship.
pub const VALIDATION_LAYER_CANDIDATES: [&CStr; 2] = [
    c"VK_LAYER_KHRONOS_validation",
    c"VK_LAYER_LUNARG_standard_validation",
];

const CREATE_DEBUG_REPORT_FN: &CStr = c"vkCreateDebugReportCallbackEXT";

/// Vulkan instance wrapper with automatic cleanup
pub struct Instance {
    pub instance: ash::Instance,
    _entry: Entry,

    debug_report: Option<(DebugReport, vk::DebugReportCallbackEXT)>,

    /// Layers enabled on the instance; the device enables the same list
    pub enabled_layers: Vec<&'static CStr>,
    pub enabled_extensions: Vec<&'static CStr>,
}

impl Instance {
    /// Create the instance, optionally with validation and a debug report callback
    pub fn new(app_name: &str, enable_validation: bool) -> Result<Arc<Self>> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| GpuError::LoaderUnavailable(e.to_string()))?;

        let layer_props = vk_check!(entry.enumerate_instance_layer_properties())?;
        let extension_props = vk_check!(entry.enumerate_instance_extension_properties(None))?;

        log::debug!("{} instance layers available:", layer_props.len());
        for layer in &layer_props {
            log::debug!("  {}", fixed_str(&layer.layer_name).to_string_lossy());
        }
        log::debug!("{} instance extensions available:", extension_props.len());
        for ext in &extension_props {
            log::debug!("  {}", fixed_str(&ext.extension_name).to_string_lossy());
        }

        let (enabled_layers, enabled_extensions) = if enable_validation {
            select_validation(&layer_props, &extension_props)?
        } else {
            (Vec::new(), Vec::new())
        };

        let instance = Self::create_instance(&entry, app_name, &enabled_layers, &enabled_extensions)?;

        // From here on the instance must be destroyed if anything fails
        let debug_report = if enable_validation {
            match Self::setup_debug_report(&entry, &instance) {
                Ok(report) => Some(report),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Arc::new(Self {
            instance,
            _entry: entry,
            debug_report,
            enabled_layers,
            enabled_extensions,
        }))
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        layers: &[&CStr],
        extensions: &[&CStr],
    ) -> Result<ash::Instance> {
        let app_name_cstr =
            CString::new(app_name).map_err(|_| GpuError::InvalidApplicationName(app_name.to_string()))?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .api_version(vk::API_VERSION_1_0);

        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();
        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        vk_check!(unsafe { entry.create_instance(&create_info, None) })
    }

    /// ash fills a missing entry point with a panicking stub, so probe first
    fn setup_debug_report(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugReport, vk::DebugReportCallbackEXT)> {
        let create_fn = unsafe {
            entry.get_instance_proc_addr(instance.handle(), CREATE_DEBUG_REPORT_FN.as_ptr())
        };
        if create_fn.is_none() {
            return Err(GpuError::DebugReportUnavailable);
        }

        let debug_report = DebugReport::new(entry, instance);

        let create_info = vk::DebugReportCallbackCreateInfoEXT::builder()
            .flags(
                vk::DebugReportFlagsEXT::ERROR
                    | vk::DebugReportFlagsEXT::WARNING
                    | vk::DebugReportFlagsEXT::PERFORMANCE_WARNING,
            )
            .pfn_callback(Some(debug_report_callback));

        let callback =
            vk_check!(unsafe { debug_report.create_debug_report_callback(&create_info, None) })?;

        log::info!("Validation enabled, debug report callback registered");
        Ok((debug_report, callback))
    }

    pub fn physical_devices(&self) -> Result<Vec<vk::PhysicalDevice>> {
        vk_check!(unsafe { self.instance.enumerate_physical_devices() })
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::debug!("Destroying Vulkan instance");
        unsafe {
            if let Some((debug_report, callback)) = self.debug_report.take() {
                debug_report.destroy_debug_report_callback(callback, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Pick the validation layer and debug report extension, or fail naming what is missing
pub fn select_validation(
    layers: &[vk::LayerProperties],
    extensions: &[vk::ExtensionProperties],
) -> Result<(Vec<&'static CStr>, Vec<&'static CStr>)> {
    let layer = find_layer(layers, &VALIDATION_LAYER_CANDIDATES);
    let has_debug_report = has_extension(extensions, DebugReport::name());

    match (layer, has_debug_report) {
        (Some(layer), true) => Ok((vec![layer], vec![DebugReport::name()])),
        (None, _) => Err(GpuError::ValidationUnavailable(format!(
            "none of the layers {:?} is installed",
            VALIDATION_LAYER_CANDIDATES
        ))),
        (Some(_), false) => Err(GpuError::ValidationUnavailable(format!(
            "extension {:?} is not supported",
            DebugReport::name()
        ))),
    }
}

/// First candidate (in candidate order) that appears in `available`
pub fn find_layer(available: &[vk::LayerProperties], candidates: &[&'static CStr]) -> Option<&'static CStr> {
    candidates
        .iter()
        .copied()
        .find(|candidate| available.iter().any(|l| fixed_str(&l.layer_name) == *candidate))
}

pub fn has_extension(available: &[vk::ExtensionProperties], name: &CStr) -> bool {
    available.iter().any(|e| fixed_str(&e.extension_name) == name)
}

/// Pick the physical device at `index`, in enumeration order
pub fn pick_physical_device(devices: &[vk::PhysicalDevice], index: usize) -> Result<vk::PhysicalDevice> {
    if devices.is_empty() {
        return Err(GpuError::NoPhysicalDevice);
    }
    devices
        .get(index)
        .copied()
        .ok_or(GpuError::PhysicalDeviceIndexOutOfRange {
            index,
            count: devices.len(),
        })
}

/// Read a NUL-terminated name out of one of Vulkan's fixed-size char arrays
pub(crate) fn fixed_str(raw: &[c_char]) -> &CStr {
    // Vulkan guarantees these arrays are NUL-terminated
    unsafe { CStr::from_ptr(raw.as_ptr()) }
}

unsafe extern "system" fn debug_report_callback(
    flags: vk::DebugReportFlagsEXT,
    _object_type: vk::DebugReportObjectTypeEXT,
    _object: u64,
    _location: usize,
    _message_code: i32,
    p_layer_prefix: *const c_char,
    p_message: *const c_char,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let prefix = if p_layer_prefix.is_null() {
        "Vulkan".into()
    } else {
        CStr::from_ptr(p_layer_prefix).to_string_lossy()
    };
    let message = CStr::from_ptr(p_message).to_string_lossy();

    if flags.contains(vk::DebugReportFlagsEXT::ERROR) {
        log::error!("[{}] {}", prefix, message);
    } else if flags.intersects(vk::DebugReportFlagsEXT::WARNING | vk::DebugReportFlagsEXT::PERFORMANCE_WARNING) {
        log::warn!("[{}] {}", prefix, message);
    } else {
        log::debug!("[{}] {}", prefix, message);
    }

    vk::FALSE
}
