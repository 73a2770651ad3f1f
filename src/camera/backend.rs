//! Seam between the session logic and the OS capture drivers.
//!
//! Everything above this module talks to cameras through [`CameraBackend`]
//! and [`FrameSource`]; the nokhwa-based implementation below is the only
//! place that touches real hardware.

use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;
use thiserror::Error;

use super::device::{Api, DeviceHandle};

/// Capture configuration requested from a device.
///
/// Devices are free to clamp these to the nearest supported mode; the values
/// actually negotiated are read back through [`FrameSource::actual_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// Camera-side failures. All of these are recoverable; none should take the
/// process down.
#[derive(Debug, Error)]
pub enum CameraError {
    /// Every driver in the fallback order refused the device.
    #[error("no backend could open device {0}")]
    DeviceUnavailable(DeviceHandle),

    #[error("failed to open {handle} via {api:?}: {reason}")]
    OpenFailed {
        handle: DeviceHandle,
        api: Api,
        reason: String,
    },

    #[error("frame read failed: {0}")]
    ReadFailed(String),
}

/// An open capture stream delivering frames from one device.
pub trait FrameSource {
    /// Read one frame. A single bounded attempt, no internal retries;
    /// recovery policy lives in the session.
    fn grab(&mut self) -> Result<RgbImage, CameraError>;

    /// The format actually negotiated with the device, which may differ from
    /// what was requested.
    fn actual_config(&self) -> CaptureConfig;
}

/// Factory for capture streams. One implementation per driver world:
/// [`NokhwaBackend`] in production, `mock::MockBackend` in tests.
pub trait CameraBackend {
    type Stream: FrameSource;

    fn open(
        &self,
        handle: &DeviceHandle,
        api: Api,
        config: &CaptureConfig,
    ) -> Result<Self::Stream, CameraError>;
}

fn to_api_backend(api: Api) -> ApiBackend {
    match api {
        Api::Auto => ApiBackend::Auto,
        Api::MediaFoundation => ApiBackend::MediaFoundation,
        Api::AvFoundation => ApiBackend::AVFoundation,
        Api::Video4Linux => ApiBackend::Video4Linux,
    }
}

fn to_camera_index(handle: &DeviceHandle) -> CameraIndex {
    match handle {
        DeviceHandle::Index(index) => CameraIndex::Index(*index),
        DeviceHandle::Path(path) => CameraIndex::String(path.clone()),
    }
}

/// Production backend built on nokhwa's native drivers
/// (MSMF on Windows, AVFoundation on macOS, V4L2 on Linux).
#[derive(Debug, Default, Clone, Copy)]
pub struct NokhwaBackend;

pub struct NokhwaStream {
    camera: Camera,
}

impl CameraBackend for NokhwaBackend {
    type Stream = NokhwaStream;

    fn open(
        &self,
        handle: &DeviceHandle,
        api: Api,
        config: &CaptureConfig,
    ) -> Result<NokhwaStream, CameraError> {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(config.width, config.height),
                FrameFormat::MJPEG,
                config.fps,
            ),
        ));

        let open_failed = |reason: String| CameraError::OpenFailed {
            handle: handle.clone(),
            api,
            reason,
        };

        let mut camera =
            Camera::with_backend(to_camera_index(handle), requested, to_api_backend(api))
                .map_err(|e| open_failed(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| open_failed(e.to_string()))?;

        Ok(NokhwaStream { camera })
    }
}

impl FrameSource for NokhwaStream {
    fn grab(&mut self) -> Result<RgbImage, CameraError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CameraError::ReadFailed(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::ReadFailed(e.to_string()))?;

        // Rebuild from the raw bytes so the session always hands out our own
        // image-buffer type, independent of the driver crate's pixel types.
        let (width, height) = (decoded.width(), decoded.height());
        RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| CameraError::ReadFailed("frame buffer size mismatch".to_string()))
    }

    fn actual_config(&self) -> CaptureConfig {
        let resolution = self.camera.resolution();
        CaptureConfig {
            width: resolution.width(),
            height: resolution.height(),
            fps: self.camera.frame_rate(),
        }
    }
}

impl Drop for NokhwaStream {
    fn drop(&mut self) {
        // Best effort; the device handle is released either way.
        let _ = self.camera.stop_stream();
    }
}
