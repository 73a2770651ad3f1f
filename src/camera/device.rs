//! Device identification and platform-aware enumeration.
//!
//! Cameras are found by probing a small fixed index range rather than asking
//! the OS for a listing, because listings routinely include virtual devices
//! that cannot actually be opened. How an index is probed differs per OS and
//! is expressed as one of two strategies selected once at startup.

use serde::{Deserialize, Serialize};

use super::backend::{CameraBackend, CaptureConfig, FrameSource};

/// Indices 0..MAX_PROBE_INDEX are probed. Real hardware on a capture station
/// rarely exceeds this.
pub const MAX_PROBE_INDEX: u32 = 5;

/// Reference to a physical capture device.
///
/// Most devices are addressed by index; on Linux a device that refuses
/// index-based opening can still be reachable through its `/dev/videoN` node.
/// Serializable so capture metadata can record which device produced a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceHandle {
    Index(u32),
    Path(String),
}

impl std::fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceHandle::Index(index) => write!(f, "index {}", index),
            DeviceHandle::Path(path) => write!(f, "{}", path),
        }
    }
}

/// Platform tag, detected once at startup (not re-detected per call).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    pub fn detect() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }
}

/// OS capture driver choice, mapped to the concrete nokhwa backend only
/// inside `backend.rs` so tests never need real driver types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Api {
    Auto,
    MediaFoundation,
    AvFoundation,
    Video4Linux,
}

/// Probing policy. One strategy per platform, chosen by [`ProbeStrategy::for_platform`];
/// the same table also fixes the driver fallback order the session uses when
/// starting a device found here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStrategy {
    /// Try a primary driver, then a fallback; open-success alone accepts the
    /// index. Backend choice here is purely a local-driver concern.
    IndexBackend { primary: Api, fallback: Api },

    /// Try generic drivers by index, then the conventional `/dev/video{N}`
    /// node. A device counts only if a frame can actually be read: some V4L2
    /// drivers report "open" on dead nodes and fail only on first read.
    PathOrIndex { apis: [Api; 2] },
}

impl ProbeStrategy {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Windows => ProbeStrategy::IndexBackend {
                primary: Api::MediaFoundation,
                fallback: Api::Auto,
            },
            Platform::MacOs => ProbeStrategy::IndexBackend {
                primary: Api::AvFoundation,
                fallback: Api::Auto,
            },
            Platform::Linux => ProbeStrategy::PathOrIndex {
                apis: [Api::Video4Linux, Api::Auto],
            },
        }
    }

    /// Driver fallback order, shared by enumeration and session start so a
    /// device is always reopened the same way it was found.
    pub fn api_order(&self) -> Vec<Api> {
        match self {
            ProbeStrategy::IndexBackend { primary, fallback } => vec![*primary, *fallback],
            ProbeStrategy::PathOrIndex { apis } => apis.to_vec(),
        }
    }

    fn requires_frame_read(&self) -> bool {
        matches!(self, ProbeStrategy::PathOrIndex { .. })
    }
}

/// Probe for usable capture devices.
///
/// Returns handles in ascending index order with no duplicates. An empty
/// result means no devices were found and is a perfectly valid outcome.
pub fn enumerate<B: CameraBackend>(backend: &B, strategy: &ProbeStrategy) -> Vec<DeviceHandle> {
    let config = CaptureConfig::default();
    let mut found = Vec::new();

    for index in 0..MAX_PROBE_INDEX {
        let handle = DeviceHandle::Index(index);
        if probe(backend, strategy, &handle, &config) {
            found.push(handle);
            continue;
        }

        // Index probing failed; on path-capable platforms the device node
        // itself is the last resort for this slot.
        if strategy.requires_frame_read() {
            let node = DeviceHandle::Path(format!("/dev/video{}", index));
            if probe(backend, strategy, &node, &config) {
                found.push(node);
            }
        }
    }

    found
}

/// Try every driver in the strategy's order for one handle. The probe stream
/// is dropped before returning, releasing the device immediately.
fn probe<B: CameraBackend>(
    backend: &B,
    strategy: &ProbeStrategy,
    handle: &DeviceHandle,
    config: &CaptureConfig,
) -> bool {
    for api in strategy.api_order() {
        if let Ok(mut stream) = backend.open(handle, api, config) {
            if !strategy.requires_frame_read() {
                return true;
            }
            if stream.grab().is_ok() {
                return true;
            }
            // Opened but never delivered a frame: dead node, try the next driver.
        }
    }
    false
}
