//! Scripted in-memory backend for lifecycle tests. No OS devices involved.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::RgbImage;

use super::backend::{CameraBackend, CameraError, CaptureConfig, FrameSource};
use super::device::{Api, DeviceHandle};

/// Simulated driver world: which indices/nodes open, which are dead, and how
/// many reads should fail before succeeding again.
pub struct MockBackend {
    openable: Vec<u32>,
    openable_paths: Vec<String>,
    dead: Vec<u32>,
    /// When set, streams report this as the negotiated format instead of the
    /// requested one (a device clamping the configuration).
    reported_config: Option<CaptureConfig>,
    /// Injected read failures, consumed one per grab across all streams.
    pub grab_failures: Arc<AtomicUsize>,
    /// Streams currently held open.
    pub open_count: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new(openable: &[u32]) -> Self {
        Self {
            openable: openable.to_vec(),
            openable_paths: Vec::new(),
            dead: Vec::new(),
            reported_config: None,
            grab_failures: Arc::new(AtomicUsize::new(0)),
            open_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Device-node paths that accept an open call.
    pub fn with_paths(mut self, paths: &[&str]) -> Self {
        self.openable_paths = paths.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Indices that open fine but never deliver a frame.
    pub fn with_dead(mut self, dead: &[u32]) -> Self {
        self.dead = dead.to_vec();
        self
    }

    pub fn with_reported_config(mut self, config: CaptureConfig) -> Self {
        self.reported_config = Some(config);
        self
    }
}

pub struct MockStream {
    config: CaptureConfig,
    alive: bool,
    grab_failures: Arc<AtomicUsize>,
    open_count: Arc<AtomicUsize>,
}

impl CameraBackend for MockBackend {
    type Stream = MockStream;

    fn open(
        &self,
        handle: &DeviceHandle,
        api: Api,
        config: &CaptureConfig,
    ) -> Result<MockStream, CameraError> {
        let (accepts, alive) = match handle {
            DeviceHandle::Index(index) => (
                self.openable.contains(index) || self.dead.contains(index),
                !self.dead.contains(index),
            ),
            DeviceHandle::Path(path) => (self.openable_paths.contains(path), true),
        };

        if !accepts {
            return Err(CameraError::OpenFailed {
                handle: handle.clone(),
                api,
                reason: "mock: no such device".to_string(),
            });
        }

        self.open_count.fetch_add(1, Ordering::SeqCst);
        Ok(MockStream {
            config: self.reported_config.unwrap_or(*config),
            alive,
            grab_failures: self.grab_failures.clone(),
            open_count: self.open_count.clone(),
        })
    }
}

impl FrameSource for MockStream {
    fn grab(&mut self) -> Result<RgbImage, CameraError> {
        if !self.alive {
            return Err(CameraError::ReadFailed("mock: dead node".to_string()));
        }
        if self.grab_failures.load(Ordering::SeqCst) > 0 {
            self.grab_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(CameraError::ReadFailed(
                "mock: injected read failure".to_string(),
            ));
        }
        Ok(RgbImage::from_pixel(
            self.config.width,
            self.config.height,
            image::Rgb([0, 0, 0]),
        ))
    }

    fn actual_config(&self) -> CaptureConfig {
        self.config
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.open_count.fetch_sub(1, Ordering::SeqCst);
    }
}
