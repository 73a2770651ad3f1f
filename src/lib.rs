//! Core library for the part-capture station.
//!
//! Captures webcam frames, burns an identifier + timestamp into them, and
//! persists them as labeled image files for light traceability on a stamping
//! or die-cutting line. Three layers:
//!
//! - [`camera`]: device enumeration and the capture session lifecycle
//! - [`annotate`]: text overlay shared by the live preview and the saved copy
//! - [`storage`]: dataset folder taxonomy, image persistence, label export
//!
//! The window/widget layer is a thin consumer of these modules and lives
//! outside this crate (the bundled binary is a headless stand-in for it).

pub mod annotate;
pub mod camera;
pub mod storage;

pub use camera::{CameraService, CaptureConfig, DeviceHandle, SessionInfo};
pub use storage::{AnnotationRecord, CapturedImage, ExportFormat, StorageManager, StorageStats};
