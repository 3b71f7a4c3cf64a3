use ash::vk;

use crate::gpu::error::GPUError;

impl From<vk::Result> for GPUError {
    fn from(res: vk::Result) -> Self {
        match res {
            vk::Result::ERROR_DEVICE_LOST => GPUError::DeviceLost,
            other => GPUError::Vulkan(other),
        }
    }
}

impl From<ash::LoadingError> for GPUError {
    fn from(err: ash::LoadingError) -> Self {
        log::warn!("failed to load the vulkan loader: {err}");
        GPUError::BackendUnsupported(crate::gpu::Backend::Vulkan)
    }
}

/// Maps a failed creation call. Device loss stays `DeviceLost` so the
/// device can recover; everything else is reported as a creation failure.
pub(super) fn creation(what: &'static str) -> impl Fn(vk::Result) -> GPUError {
    move |res| match res {
        vk::Result::ERROR_DEVICE_LOST => GPUError::DeviceLost,
        other => GPUError::creation(format!("{what}: {other}")),
    }
}

pub(super) fn is_out_of_date(res: vk::Result) -> bool {
    matches!(
        res,
        vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR | vk::Result::ERROR_SURFACE_LOST_KHR
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_lost_survives_classification() {
        assert_eq!(GPUError::from(vk::Result::ERROR_DEVICE_LOST), GPUError::DeviceLost);
        assert_eq!(creation("buffer")(vk::Result::ERROR_DEVICE_LOST), GPUError::DeviceLost);
        assert!(matches!(
            creation("buffer")(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            GPUError::ResourceCreationFailed(_)
        ));
        assert!(is_out_of_date(vk::Result::ERROR_OUT_OF_DATE_KHR));
    }
}
