//! Capture session lifecycle.
//!
//! One [`CameraService`] owns at most one open device at any moment:
//! `Idle → Opening → Open → Idle` on stop, with a single bounded
//! `Open → Recovering → Open | Idle` hop when a read fails. The `Some`/`None`
//! state of the stream field *is* the open/closed state: `Some` means exactly
//! one OS handle is held, `None` means none is.

use image::RgbImage;

use super::backend::{CameraBackend, CameraError, CaptureConfig, FrameSource, NokhwaBackend};
use super::device::{enumerate, DeviceHandle, Platform, ProbeStrategy};

/// Negotiated session parameters, read back from the open device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub device: DeviceHandle,
}

/// Owns the live capture device and its reconnect policy.
///
/// Generic over the backend so tests can drive the full lifecycle against a
/// scripted mock; production code uses the nokhwa default.
pub struct CameraService<B: CameraBackend = NokhwaBackend> {
    backend: B,
    strategy: ProbeStrategy,
    config: CaptureConfig,
    device: Option<DeviceHandle>,
    stream: Option<B::Stream>,
}

impl CameraService<NokhwaBackend> {
    /// Service for the current platform's probing strategy.
    pub fn new() -> Self {
        Self::with_backend(NokhwaBackend, ProbeStrategy::for_platform(Platform::detect()))
    }
}

impl Default for CameraService<NokhwaBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: CameraBackend> CameraService<B> {
    pub fn with_backend(backend: B, strategy: ProbeStrategy) -> Self {
        Self {
            backend,
            strategy,
            config: CaptureConfig::default(),
            device: None,
            stream: None,
        }
    }

    /// Set the requested capture mode. The device may clamp it; `info()`
    /// reports what was actually negotiated.
    pub fn with_config(mut self, config: CaptureConfig) -> Self {
        self.config = config;
        self
    }

    /// List usable capture devices (indices 0..=4, platform probing policy).
    pub fn find_cameras(&self) -> Vec<DeviceHandle> {
        enumerate(&self.backend, &self.strategy)
    }

    /// Open `handle`, trying drivers in the same order enumeration used to
    /// find it. Idempotent: any previously open device is released first, so
    /// at most one device is ever held.
    ///
    /// Returns false when no driver succeeds; the caller owns user-facing
    /// error reporting.
    pub fn start(&mut self, handle: DeviceHandle) -> bool {
        self.stop();

        match self.try_open(&handle) {
            Ok(stream) => {
                println!("🎥 Camera started on {}", handle);
                self.stream = Some(stream);
                self.device = Some(handle);
                true
            }
            Err(e) => {
                eprintln!("❌ {}", e);
                false
            }
        }
    }

    /// Read one frame, or `None` for this tick.
    ///
    /// On a failed read, exactly one recovery attempt runs: release the
    /// device, reopen the remembered handle, retry the read once. A second
    /// failure degrades to `None` rather than looping; an unbounded retry
    /// here would hang the UI tick.
    pub fn read_frame(&mut self) -> Option<RgbImage> {
        let stream = self.stream.as_mut()?;
        match stream.grab() {
            Ok(frame) => Some(frame),
            Err(e) => {
                eprintln!("⚠️  Frame read failed ({}), reconnecting once", e);
                self.recover_once()
            }
        }
    }

    fn recover_once(&mut self) -> Option<RgbImage> {
        let handle = self.device.clone()?;
        self.stop();
        if !self.start(handle) {
            return None;
        }
        match self.stream.as_mut()?.grab() {
            Ok(frame) => Some(frame),
            Err(e) => {
                eprintln!("⚠️  Read failed again after reconnect: {}", e);
                None
            }
        }
    }

    /// Release the device if held and reset session state. Safe to call when
    /// already stopped.
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            println!("🛑 Camera stopped");
        }
        self.device = None;
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Actual negotiated parameters of the open device, `None` when no
    /// camera is running.
    pub fn info(&self) -> Option<SessionInfo> {
        let stream = self.stream.as_ref()?;
        let actual = stream.actual_config();
        Some(SessionInfo {
            width: actual.width,
            height: actual.height,
            fps: actual.fps,
            device: self.device.clone()?,
        })
    }

    fn try_open(&self, handle: &DeviceHandle) -> Result<B::Stream, CameraError> {
        for api in self.strategy.api_order() {
            match self.backend.open(handle, api, &self.config) {
                Ok(stream) => return Ok(stream),
                Err(e) => eprintln!("⚠️  {}", e),
            }
        }
        Err(CameraError::DeviceUnavailable(handle.clone()))
    }
}

impl<B: CameraBackend> Drop for CameraService<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
