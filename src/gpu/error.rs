use thiserror::Error;

use super::backend::Backend;

/// Every fallible call in the crate reports one of these.
///
/// `InvalidDescriptor` and `ValidationError` are raised before anything
/// reaches the native layer. `ResourceCreationFailed` means the native call
/// itself failed and nothing was tracked. `DeviceLost` is the one recoverable
/// condition; the device handles it at present time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GPUError {
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),

    #[error("backend {0} is not supported on this platform")]
    BackendUnsupported(Backend),

    #[error("device lost")]
    DeviceLost,

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("stale or destroyed {0} handle")]
    InvalidHandle(&'static str),

    #[error("invalid command context state: {0}")]
    InvalidState(&'static str),

    /// A native call other than resource creation failed, e.g. a submit or
    /// a present that did not report device loss.
    #[error("native call failed: {0}")]
    NativeFailure(String),

    #[error("unimplemented: {0}")]
    Unimplemented(&'static str),

    #[cfg(feature = "dashi-vulkan")]
    #[error("vulkan error: {0}")]
    Vulkan(ash::vk::Result),
}

impl GPUError {
    pub fn is_device_lost(&self) -> bool {
        matches!(self, GPUError::DeviceLost)
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        GPUError::InvalidDescriptor(msg.into())
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        GPUError::ValidationError(msg.into())
    }

    pub(crate) fn creation(msg: impl Into<String>) -> Self {
        GPUError::ResourceCreationFailed(msg.into())
    }

    pub(crate) fn native(msg: impl Into<String>) -> Self {
        GPUError::NativeFailure(msg.into())
    }
}

pub type Result<T, E = GPUError> = std::result::Result<T, E>;
