//! Declared device capabilities
//!
//! The capability table is fixed for the lifetime of a device and read-only
//! after construction; negotiation is the only consumer.

use serde::{Deserialize, Serialize};

use crate::device::controls::DeviceOption;
use crate::stream::mode::{StreamKind, StreamMode};

/// Pinhole intrinsics for one calibrated resolution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub width: u32,
    pub height: u32,
    pub fx: f32,
    pub fy: f32,
    pub ppx: f32,
    pub ppy: f32,
}

/// One row of the capability table: a negotiable mode for one stream kind,
/// and the index of the sub-endpoint that produces it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeEntry {
    pub kind: StreamKind,
    pub mode: StreamMode,
    pub endpoint: usize,
}

/// Fixed, read-only description of everything a device can do
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    name: String,
    modes: Vec<ModeEntry>,
    intrinsics: Vec<Intrinsics>,
    depth_scale: f32,
    supported_options: Vec<DeviceOption>,
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modes: Vec::new(),
            intrinsics: Vec::new(),
            depth_scale: 0.001,
            supported_options: Vec::new(),
        }
    }

    /// Declare one negotiable mode, produced by the given sub-endpoint
    pub fn with_mode(mut self, kind: StreamKind, mode: StreamMode, endpoint: usize) -> Self {
        self.modes.push(ModeEntry {
            kind,
            mode,
            endpoint,
        });
        self
    }

    /// Append to the shared intrinsics table; modes reference entries by
    /// declaration order
    pub fn with_intrinsics(mut self, intrinsics: Intrinsics) -> Self {
        self.intrinsics.push(intrinsics);
        self
    }

    pub fn with_depth_scale(mut self, depth_scale: f32) -> Self {
        self.depth_scale = depth_scale;
        self
    }

    pub fn with_option(mut self, option: DeviceOption) -> Self {
        self.supported_options.push(option);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depth_scale(&self) -> f32 {
        self.depth_scale
    }

    pub fn supports_option(&self, option: DeviceOption) -> bool {
        self.supported_options.contains(&option)
    }

    /// Table entries for one stream kind, in declaration order
    pub fn modes_for(&self, kind: StreamKind) -> impl Iterator<Item = &ModeEntry> {
        self.modes.iter().filter(move |entry| entry.kind == kind)
    }

    pub fn intrinsics(&self, index: usize) -> Option<&Intrinsics> {
        self.intrinsics.get(index)
    }
}
