//! Request-to-mode resolution against the capability table

use tracing::debug;

use crate::device::caps::{DeviceInfo, ModeEntry};
use crate::error::DeviceError;
use crate::stream::mode::{PixelFormat, Preset, StreamKind, StreamMode, StreamRequest};

/// Resolve a request to the best matching capability entry.
///
/// Every non-wildcard field must match exactly; among the remaining
/// candidates the tie-break is highest frame rate, then largest pixel area,
/// then declaration order.
pub(crate) fn select_mode(
    info: &DeviceInfo,
    kind: StreamKind,
    request: &StreamRequest,
) -> Result<ModeEntry, DeviceError> {
    let mut best: Option<&ModeEntry> = None;
    for entry in info.modes_for(kind) {
        if !matches(request, &entry.mode) {
            continue;
        }
        let replace = match best {
            Some(current) => beats(&entry.mode, &current.mode),
            None => true,
        };
        if replace {
            best = Some(entry);
        }
    }

    match best {
        Some(entry) => {
            debug!(%kind, mode = ?entry.mode, endpoint = entry.endpoint, "resolved stream mode");
            Ok(*entry)
        }
        None => Err(DeviceError::Configuration(format!(
            "no supported {kind} mode matches {}x{} {:?} at {} fps",
            request.width, request.height, request.format, request.fps
        ))),
    }
}

/// Resolve a named preset to a canonical entry over the same table
pub(crate) fn select_preset(
    info: &DeviceInfo,
    kind: StreamKind,
    preset: Preset,
) -> Result<ModeEntry, DeviceError> {
    let entries: Vec<&ModeEntry> = info.modes_for(kind).collect();
    if entries.is_empty() {
        return Err(DeviceError::Configuration(format!(
            "device declares no {kind} modes"
        )));
    }

    let pick = match preset {
        Preset::HighestFramerate => pick_by(&entries, |a, b| {
            (a.fps, area(a)) > (b.fps, area(b))
        }),
        Preset::LargestImage => pick_by(&entries, |a, b| {
            (area(a), a.fps) > (area(b), b.fps)
        }),
        Preset::BestQuality => {
            let smooth: Vec<&ModeEntry> = entries
                .iter()
                .copied()
                .filter(|entry| entry.mode.fps >= 30)
                .collect();
            if smooth.is_empty() {
                pick_by(&entries, |a, b| (area(a), a.fps) > (area(b), b.fps))
            } else {
                pick_by(&smooth, |a, b| (area(a), a.fps) > (area(b), b.fps))
            }
        }
    };

    debug!(%kind, ?preset, mode = ?pick.mode, "resolved preset");
    Ok(*pick)
}

fn matches(request: &StreamRequest, mode: &StreamMode) -> bool {
    (request.width == 0 || request.width == mode.width)
        && (request.height == 0 || request.height == mode.height)
        && (request.format == PixelFormat::Any || request.format == mode.format)
        && (request.fps == 0 || request.fps == mode.fps)
}

/// Strict preference; equality keeps the earlier-declared entry
fn beats(a: &StreamMode, b: &StreamMode) -> bool {
    (a.fps, area(a)) > (b.fps, area(b))
}

fn area(mode: &StreamMode) -> u64 {
    mode.width as u64 * mode.height as u64
}

fn pick_by<'a>(
    entries: &[&'a ModeEntry],
    better: impl Fn(&StreamMode, &StreamMode) -> bool,
) -> &'a ModeEntry {
    let mut best = entries[0];
    for entry in &entries[1..] {
        if better(&entry.mode, &best.mode) {
            best = entry;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(width: u32, height: u32, format: PixelFormat, fps: u32) -> StreamMode {
        StreamMode {
            width,
            height,
            format,
            fps,
            intrinsics_index: 0,
        }
    }

    fn table() -> DeviceInfo {
        DeviceInfo::new("test")
            .with_mode(StreamKind::Depth, mode(640, 480, PixelFormat::Z16, 30), 0)
            .with_mode(StreamKind::Depth, mode(640, 480, PixelFormat::Z16, 60), 0)
            .with_mode(StreamKind::Depth, mode(320, 240, PixelFormat::Z16, 60), 0)
            .with_mode(StreamKind::Color, mode(1920, 1080, PixelFormat::Rgb8, 15), 1)
            .with_mode(StreamKind::Color, mode(640, 480, PixelFormat::Rgb8, 60), 1)
    }

    fn request(width: u32, height: u32, format: PixelFormat, fps: u32) -> StreamRequest {
        StreamRequest {
            enabled: true,
            width,
            height,
            format,
            fps,
            mode: None,
        }
    }

    #[test]
    fn test_wildcards_pick_highest_rate_then_largest_area() {
        let info = table();
        let entry =
            select_mode(&info, StreamKind::Depth, &request(0, 0, PixelFormat::Any, 0)).unwrap();
        assert_eq!(entry.mode, mode(640, 480, PixelFormat::Z16, 60));
    }

    #[test]
    fn test_explicit_fields_must_match_exactly() {
        let info = table();
        let entry =
            select_mode(&info, StreamKind::Depth, &request(320, 240, PixelFormat::Any, 0)).unwrap();
        assert_eq!(entry.mode.fps, 60);

        let err = select_mode(&info, StreamKind::Depth, &request(320, 240, PixelFormat::Any, 30))
            .unwrap_err();
        assert!(matches!(err, DeviceError::Configuration(_)));
    }

    #[test]
    fn test_equal_candidates_keep_declaration_order() {
        let info = DeviceInfo::new("test")
            .with_mode(StreamKind::Color, mode(640, 480, PixelFormat::Rgb8, 30), 0)
            .with_mode(StreamKind::Color, mode(640, 480, PixelFormat::Yuyv, 30), 0);
        let entry =
            select_mode(&info, StreamKind::Color, &request(0, 0, PixelFormat::Any, 0)).unwrap();
        assert_eq!(entry.mode.format, PixelFormat::Rgb8);
    }

    #[test]
    fn test_presets_resolve_deterministically() {
        let info = table();

        let fastest = select_preset(&info, StreamKind::Color, Preset::HighestFramerate).unwrap();
        assert_eq!(fastest.mode.fps, 60);

        let largest = select_preset(&info, StreamKind::Color, Preset::LargestImage).unwrap();
        assert_eq!((largest.mode.width, largest.mode.height), (1920, 1080));

        // 1080p runs below 30 fps, so best quality falls back to VGA
        let quality = select_preset(&info, StreamKind::Color, Preset::BestQuality).unwrap();
        assert_eq!((quality.mode.width, quality.mode.fps), (640, 60));
    }

    #[test]
    fn test_preset_on_undeclared_kind_is_a_configuration_error() {
        let info = table();
        let err = select_preset(&info, StreamKind::Infrared, Preset::BestQuality).unwrap_err();
        assert!(matches!(err, DeviceError::Configuration(_)));
    }
}
