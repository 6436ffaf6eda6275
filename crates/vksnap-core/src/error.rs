use ash::vk;

use vksnap_object::error::CodecError;

pub type SnapResult<T> = std::result::Result<T, SnapError>;

/// Error taxonomy for restore-point capture and apply.
///
/// Contract violations (missing mapping, double registration, malformed
/// dependency lists) are hard errors in every build profile; nothing here is
/// a debug-only assertion.
#[derive(Debug, thiserror::Error)]
pub enum SnapError {
    #[error("state tracker layer not present")]
    LayerNotPresent,

    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Vulkan call failed: {0:?}")]
    Vulkan(vk::Result),

    #[error("no handle mapping registered for {0:#x}")]
    MissingHandle(u64),

    #[error("captured handle {captured:#x} already registered (restored {restored:#x})")]
    DuplicateHandle { captured: u64, restored: u64 },

    #[error("malformed restore info: {0}")]
    MalformedInfo(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnapError {
    /// Map onto the VkResult conventions of the public API surface.
    pub fn as_vk_result(&self) -> vk::Result {
        match self {
            SnapError::LayerNotPresent => vk::Result::ERROR_LAYER_NOT_PRESENT,
            SnapError::Vulkan(result) => *result,
            _ => vk::Result::ERROR_INITIALIZATION_FAILED,
        }
    }
}

/// Convert a VkResult into an error unless it is VK_SUCCESS.
pub fn check(result: vk::Result) -> SnapResult<()> {
    if result == vk::Result::SUCCESS {
        Ok(())
    } else {
        Err(SnapError::Vulkan(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vk_result_mapping() {
        assert_eq!(
            SnapError::LayerNotPresent.as_vk_result(),
            vk::Result::ERROR_LAYER_NOT_PRESENT
        );
        assert_eq!(
            SnapError::Vulkan(vk::Result::ERROR_DEVICE_LOST).as_vk_result(),
            vk::Result::ERROR_DEVICE_LOST
        );
        assert_eq!(
            SnapError::MissingHandle(5).as_vk_result(),
            vk::Result::ERROR_INITIALIZATION_FAILED
        );
    }

    #[test]
    fn check_passes_success_only() {
        assert!(check(vk::Result::SUCCESS).is_ok());
        assert!(check(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY).is_err());
    }
}
