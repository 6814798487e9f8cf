use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use v4l::{capability::Flags, video::Capture, Device};

use crate::capture::frame::PixelFormat;

/// A capture-capable V4L2 node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundDevice {
    pub path: String,
    pub card: String,
    pub driver: String,
    /// Raw formats the node offers that we can decode, best first.
    pub formats: Vec<PixelFormat>,
}

impl FoundDevice {
    pub fn preferred_format(&self) -> Option<PixelFormat> {
        self.formats.first().copied()
    }
}

/// Decodable formats, UYVY first since that is what EBD sensors deliver.
fn rank_formats(fourccs: impl Iterator<Item = [u8; 4]>) -> Vec<PixelFormat> {
    let mut formats: Vec<PixelFormat> = Vec::new();
    for fmt in fourccs.filter_map(PixelFormat::from_fourcc) {
        if !formats.contains(&fmt) {
            formats.push(fmt);
        }
    }
    formats.sort_by_key(|f| *f != PixelFormat::Uyvy);
    formats
}

fn probe(path: &str) -> Option<FoundDevice> {
    let dev = Device::with_path(path).ok()?;
    let caps = dev.query_caps().ok()?;
    if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
        debug!("{} is not a capture node", path);
        return None;
    }

    let formats = dev
        .enum_formats()
        .map(|fmts| rank_formats(fmts.iter().map(|f| f.fourcc.repr)))
        .unwrap_or_default();

    Some(FoundDevice {
        path: path.to_string(),
        card: caps.card,
        driver: caps.driver,
        formats,
    })
}

/// Probe `/dev/video0` through `/dev/video9` for capture nodes
pub fn list_devices() -> Vec<FoundDevice> {
    info!("Scanning for capture devices...");

    (0..10)
        .map(|i| format!("/dev/video{}", i))
        .filter(|path| Path::new(path).exists())
        .filter_map(|path| probe(&path))
        .inspect(|found| info!("Found {} - {} ({:?})", found.path, found.card, found.formats))
        .collect()
}

fn first_usable(found: impl IntoIterator<Item = FoundDevice>) -> Option<FoundDevice> {
    found.into_iter().find(|d| d.preferred_format().is_some())
}

/// First capture node offering a raw format we can decode
pub fn auto_detect_device() -> Option<FoundDevice> {
    first_usable(list_devices())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uyvy_is_ranked_first() {
        let formats = rank_formats(
            [*b"MJPG", *b"YUYV", *b"GREY", *b"UYVY", *b"YUYV"].into_iter(),
        );
        assert_eq!(
            formats,
            vec![PixelFormat::Uyvy, PixelFormat::Yuyv4, PixelFormat::Grey]
        );
    }

    fn found(path: &str, formats: Vec<PixelFormat>) -> FoundDevice {
        FoundDevice {
            path: path.into(),
            card: "test".into(),
            driver: "test".into(),
            formats,
        }
    }

    #[test]
    fn nodes_without_raw_formats_are_passed_over() {
        let picked = first_usable(vec![
            found("/dev/video0", vec![]),
            found("/dev/video1", vec![PixelFormat::Grey, PixelFormat::Yuyv4]),
            found("/dev/video2", vec![PixelFormat::Uyvy]),
        ])
        .unwrap();
        assert_eq!(picked.path, "/dev/video1");
        assert_eq!(picked.preferred_format(), Some(PixelFormat::Grey));

        assert!(first_usable(vec![found("/dev/video0", vec![])]).is_none());
    }

    #[test]
    fn missing_nodes_are_skipped() {
        assert!(probe("/dev/does-not-exist").is_none());
    }
}
