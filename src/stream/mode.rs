use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of data categories a device can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Depth,
    Color,
    Infrared,
}

impl StreamKind {
    pub const COUNT: usize = 3;
    pub const ALL: [StreamKind; Self::COUNT] =
        [StreamKind::Depth, StreamKind::Color, StreamKind::Infrared];

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamKind::Depth => "depth",
            StreamKind::Color => "color",
            StreamKind::Infrared => "infrared",
        };
        f.write_str(name)
    }
}

/// Pixel formats we support. `Any` is only legal in requests, where it acts
/// as a wildcard; negotiated modes always carry a concrete format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    #[default]
    Any,
    Z16,
    Rgb8,
    Y8,
    Yuyv,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Any => 0,
            PixelFormat::Z16 => 2,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Y8 => 1,
            PixelFormat::Yuyv => 2,
        }
    }
}

/// A concrete, negotiated configuration for one stream. Immutable once
/// produced by negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMode {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub fps: u32,
    /// Index into the device's shared intrinsics table
    pub intrinsics_index: usize,
}

impl StreamMode {
    /// Size of one frame's pixel payload in bytes
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// Desired per-kind configuration set by the application. Zero
/// width/height/fps and `PixelFormat::Any` act as wildcards, matched by the
/// best available table entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamRequest {
    pub enabled: bool,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub fps: u32,
    /// Descriptor resolved at `enable_stream` time, so unsupported requests
    /// fail at the call site rather than at configure time
    pub(crate) mode: Option<StreamMode>,
}

/// Named request shortcuts resolved against the capability table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preset {
    BestQuality,
    LargestImage,
    HighestFramerate,
}
