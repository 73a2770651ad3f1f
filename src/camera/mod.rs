//! Camera acquisition layer.
//!
//! [`device`] probes for usable capture devices with a platform-selected
//! strategy, [`backend`] is the seam between the session logic and the OS
//! capture drivers (nokhwa in production, a scripted mock in tests), and
//! [`session`] owns the single live device and its lifecycle.

pub mod backend;
pub mod device;
pub mod mailbox;
pub mod session;

#[cfg(test)]
pub mod mock;

pub use backend::{CameraBackend, CameraError, CaptureConfig, FrameSource, NokhwaBackend};
pub use device::{enumerate, Api, DeviceHandle, Platform, ProbeStrategy};
pub use mailbox::FrameMailbox;
pub use session::{CameraService, SessionInfo};
