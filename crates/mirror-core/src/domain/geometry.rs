//! Geometry for pointer → device coordinate mapping.
//!
//! Three independent sizes are involved and any of them can change at runtime:
//!
//! ```text
//! viewport (UI pixels)        stream (encoded video)      device (native panel)
//! ┌──────────────────┐        ┌──────┐                    ┌──────────┐
//! │   ┌──────────┐   │        │      │                    │          │
//! │   │ rendered │   │  ───►  │      │        ───►        │          │
//! │   │   box    │   │        │      │                    │          │
//! │   └──────────┘   │        └──────┘                    │          │
//! └──────────────────┘         576x1280                   └──────────┘
//!   letterbox margins                                       1080x2400
//! ```
//!
//! The rendered box is the stream fitted inside the viewport with its aspect
//! ratio preserved.  A pointer inside the margins does not hit the video.

use serde::{Deserialize, Serialize};

/// A width/height pair in whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `true` if either side is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }

    /// The same size rotated by 90°.
    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }
}

/// An axis-aligned rectangle in fractional UI pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Returns `true` if `point` lies inside the rectangle, edges included.
    pub fn contains(&self, point: ScreenPoint) -> bool {
        point.x >= self.x
            && point.y >= self.y
            && point.x <= self.x + self.width
            && point.y <= self.y + self.height
    }

    pub fn center(&self) -> ScreenPoint {
        ScreenPoint::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// A pointer position relative to the viewport's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(&self, other: ScreenPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A position in device native pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DevicePoint {
    pub x: u32,
    pub y: u32,
}

impl DevicePoint {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Computes the box `content` occupies when fitted inside `container` with its
/// aspect ratio preserved and centred.  Returns `None` if either size is empty.
pub fn fit_inside(container: Size, content: Size) -> Option<Rect> {
    if container.is_empty() || content.is_empty() {
        return None;
    }
    let cw = f64::from(container.width);
    let ch = f64::from(container.height);
    let scale = (cw / f64::from(content.width)).min(ch / f64::from(content.height));
    let width = f64::from(content.width) * scale;
    let height = f64::from(content.height) * scale;
    Some(Rect {
        x: (cw - width) / 2.0,
        y: (ch - height) / 2.0,
        width,
        height,
    })
}

/// The three sizes the mapper depends on, each tracked independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceGeometry {
    /// Native panel resolution, queried from the device once per session.
    pub device: Option<Size>,
    /// Resolution of the decoded video stream.
    pub stream: Option<Size>,
    /// Size of the UI element that displays the video.
    pub viewport: Option<Size>,
}

/// Converts pointer positions into device pixels.
///
/// Scale factors are derived from the current geometry on every call; nothing
/// is cached, so a resize or rotation takes effect on the next event.
#[derive(Debug, Clone, Default)]
pub struct CoordinateMapper {
    geometry: DeviceGeometry,
}

impl CoordinateMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn geometry(&self) -> DeviceGeometry {
        self.geometry
    }

    pub fn set_device_size(&mut self, size: Option<Size>) {
        self.geometry.device = size;
    }

    pub fn set_stream_size(&mut self, size: Option<Size>) {
        self.geometry.stream = size;
    }

    pub fn set_viewport(&mut self, size: Option<Size>) {
        self.geometry.viewport = size;
    }

    /// Device dimensions in the stream's current orientation.
    ///
    /// The device reports its size in its natural orientation; when the
    /// stream is rotated relative to that, the axes are swapped.
    pub fn device_bounds(&self) -> Option<Size> {
        let device = self.geometry.device.filter(|s| !s.is_empty())?;
        let stream = self.geometry.stream.filter(|s| !s.is_empty())?;
        let rotated = (device.is_portrait() && stream.is_landscape())
            || (device.is_landscape() && stream.is_portrait());
        Some(if rotated { device.transposed() } else { device })
    }

    /// The on-screen box the video currently occupies.
    pub fn rendered_box(&self) -> Option<Rect> {
        fit_inside(self.geometry.viewport?, self.geometry.stream?)
    }

    /// Device pixels per UI pixel along each axis of the rendered box.
    pub fn device_scale(&self) -> Option<(f64, f64)> {
        let device = self.device_bounds()?;
        let rect = self.rendered_box()?;
        Some((
            f64::from(device.width) / rect.width,
            f64::from(device.height) / rect.height,
        ))
    }

    /// Maps a pointer position to device pixels.
    ///
    /// Returns `None` when the pointer is in the letterbox margin or any of
    /// the three sizes is still unknown.
    pub fn map_to_device(&self, point: ScreenPoint) -> Option<DevicePoint> {
        let stream = self.geometry.stream?;
        let device = self.device_bounds()?;
        let rect = self.rendered_box()?;
        if !rect.contains(point) {
            return None;
        }

        // rendered box → stream pixels
        let sx = (point.x - rect.x) * f64::from(stream.width) / rect.width;
        let sy = (point.y - rect.y) * f64::from(stream.height) / rect.height;

        // stream pixels → device pixels
        let dx = sx * f64::from(device.width) / f64::from(stream.width);
        let dy = sy * f64::from(device.height) / f64::from(stream.height);

        Some(DevicePoint::new(
            clamp_axis(dx, device.width),
            clamp_axis(dy, device.height),
        ))
    }
}

fn clamp_axis(value: f64, length: u32) -> u32 {
    let max = f64::from(length.saturating_sub(1));
    value.round().clamp(0.0, max) as u32
}

// ── Tests ─────────────────────────────────────────────────────────────────────
