//! Source-to-viewport quad placement.

use std::fmt;
use std::str::FromStr;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::RendererError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = RendererError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RendererError::InvalidFormat(format!("expected WIDTHxHEIGHT, got {s:?}"));
        let (w, h) = s.split_once(['x', 'X']).ok_or_else(invalid)?;
        Ok(Size::new(
            w.trim().parse().map_err(|_| invalid())?,
            h.trim().parse().map_err(|_| invalid())?,
        ))
    }
}

/// Placement policy of the source image inside the viewport. Raw values match
/// UIKit's `UIView.ContentMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentMode {
    #[serde(alias = "stretch")]
    ScaleToFill,
    #[serde(alias = "aspect-fit")]
    ScaleAspectFit,
    #[serde(alias = "aspect-fill")]
    ScaleAspectFill,
    /// Recognised but has no placement rule; yields a degenerate rectangle.
    Redraw,
    Center,
    Top,
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl ContentMode {
    pub const ALL: [ContentMode; 13] = [
        ContentMode::ScaleToFill,
        ContentMode::ScaleAspectFit,
        ContentMode::ScaleAspectFill,
        ContentMode::Redraw,
        ContentMode::Center,
        ContentMode::Top,
        ContentMode::Bottom,
        ContentMode::Left,
        ContentMode::Right,
        ContentMode::TopLeft,
        ContentMode::TopRight,
        ContentMode::BottomLeft,
        ContentMode::BottomRight,
    ];

    pub fn raw_value(self) -> u32 {
        self as u32
    }

    /// Horizontal and vertical anchor of the directional modes: 0 = leading
    /// edge, 1 = centered, 2 = trailing edge.
    fn anchor(self) -> Option<(u8, u8)> {
        Some(match self {
            ContentMode::TopLeft => (0, 0),
            ContentMode::Top => (1, 0),
            ContentMode::TopRight => (2, 0),
            ContentMode::Left => (0, 1),
            ContentMode::Center => (1, 1),
            ContentMode::Right => (2, 1),
            ContentMode::BottomLeft => (0, 2),
            ContentMode::Bottom => (1, 2),
            ContentMode::BottomRight => (2, 2),
            _ => return None,
        })
    }
}

impl Default for ContentMode {
    fn default() -> Self {
        ContentMode::ScaleAspectFit
    }
}

impl TryFrom<u32> for ContentMode {
    type Error = RendererError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        ContentMode::ALL
            .get(raw as usize)
            .copied()
            .ok_or(RendererError::InvalidContentMode(raw))
    }
}

impl FromStr for ContentMode {
    type Err = RendererError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(raw) = s.parse::<u32>() {
            return ContentMode::try_from(raw);
        }
        serde_json::from_value(serde_json::Value::String(s.to_ascii_lowercase()))
            .map_err(|_| RendererError::InvalidFormat(format!("unknown content mode {s:?}")))
    }
}

/// Rectangle in unit texture space, origin at the top-left.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl SampleRect {
    pub const UNIT: SampleRect = SampleRect {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    pub fn is_degenerate(&self) -> bool {
        self.width == 0.0 || self.height == 0.0
    }
}

/// Places the source image inside the viewport. `None` when no source size is
/// known yet.
///
/// The viewport must be non-empty.
pub fn compute_texture_sample_rect(
    mode: ContentMode,
    source: Option<Size>,
    viewport: Size,
) -> Option<SampleRect> {
    let source = source?;
    debug_assert!(!viewport.is_empty(), "geometry requested without a drawable");

    let (sw, sh) = (f64::from(source.width), f64::from(source.height));
    let (vw, vh) = (f64::from(viewport.width), f64::from(viewport.height));

    if let Some((h, v)) = mode.anchor() {
        let width = sw / vw;
        let height = sh / vh;
        let place = |anchor: u8, extent: f64| match anchor {
            0 => 0.0,
            1 => (1.0 - extent) / 2.0,
            _ => 1.0 - extent,
        };
        return Some(SampleRect {
            x: place(h, width),
            y: place(v, height),
            width,
            height,
        });
    }

    match mode {
        ContentMode::ScaleToFill => Some(SampleRect::UNIT),
        ContentMode::ScaleAspectFit | ContentMode::ScaleAspectFill => {
            let scale = if mode == ContentMode::ScaleAspectFit {
                (vw / sw).min(vh / sh)
            } else {
                (vw / sw).max(vh / sh)
            };
            let scaled_w = sw * scale;
            let scaled_h = sh * scale;
            Some(SampleRect {
                x: (vw - scaled_w) / 2.0 / vw,
                y: (vh - scaled_h) / 2.0 / vh,
                width: scaled_w / vw,
                height: scaled_h / vh,
            })
        }
        other => {
            warn!(context = "geometry", mode = ?other, "unsupported content mode");
            Some(SampleRect::default())
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable, Serialize)]
pub struct Vertex {
    /// Homogeneous device-space position.
    pub position: [f32; 4],
    pub tex_coords: [f32; 2],
}

/// Maps a unit sample rectangle to device space. Vertices come out in
/// triangle-strip order: bottom-left, bottom-right, top-left, top-right.
pub fn compute_vertices(rect: &SampleRect) -> [Vertex; 4] {
    let left = (rect.x * 2.0 - 1.0) as f32;
    let right = (rect.x * 2.0 - 1.0 + rect.width * 2.0) as f32;
    let bottom = (1.0 - rect.y * 2.0) as f32;
    let top = (1.0 - rect.y * 2.0 - rect.height * 2.0) as f32;

    // `bottom` is the edge at the smaller texture-space y, so it samples row 0.
    [
        Vertex {
            position: [left, bottom, 0.0, 1.0],
            tex_coords: [0.0, 0.0],
        },
        Vertex {
            position: [right, bottom, 0.0, 1.0],
            tex_coords: [1.0, 0.0],
        },
        Vertex {
            position: [left, top, 0.0, 1.0],
            tex_coords: [0.0, 1.0],
        },
        Vertex {
            position: [right, top, 0.0, 1.0],
            tex_coords: [1.0, 1.0],
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameGeometry {
    pub sample_rect: SampleRect,
    pub vertices: [Vertex; 4],
}

impl FrameGeometry {
    pub fn compute(mode: ContentMode, source: Option<Size>, viewport: Size) -> Option<Self> {
        let sample_rect = compute_texture_sample_rect(mode, source, viewport)?;
        Some(Self {
            sample_rect,
            vertices: compute_vertices(&sample_rect),
        })
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GeometryKey {
    mode: ContentMode,
    source: Size,
    viewport: Size,
}

/// Holds the current geometry and recomputes it only when one of its inputs
/// changes.
#[derive(Debug, Default)]
pub struct GeometryCache {
    key: Option<GeometryKey>,
    geometry: Option<FrameGeometry>,
    generation: u64,
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the geometry was recomputed. With either size
    /// missing (or an empty viewport) the cache is cleared instead.
    pub fn update(&mut self, mode: ContentMode, source: Option<Size>, viewport: Option<Size>) -> bool {
        let (Some(source), Some(viewport)) = (source, viewport.filter(|v| !v.is_empty())) else {
            self.key = None;
            self.geometry = None;
            return false;
        };
        let key = GeometryKey {
            mode,
            source,
            viewport,
        };
        if self.key == Some(key) {
            return false;
        }
        self.key = Some(key);
        self.geometry = FrameGeometry::compute(mode, Some(source), viewport);
        self.generation += 1;
        true
    }

    pub fn geometry(&self) -> Option<&FrameGeometry> {
        self.geometry.as_ref()
    }

    /// Number of recomputations since creation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn clear(&mut self) {
        self.key = None;
        self.geometry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(mode: ContentMode, source: (u32, u32), viewport: (u32, u32)) -> SampleRect {
        compute_texture_sample_rect(
            mode,
            Some(Size::new(source.0, source.1)),
            Size::new(viewport.0, viewport.1),
        )
        .unwrap()
    }

    #[test]
    fn center_places_source_fraction_in_the_middle() {
        let r = rect(ContentMode::Center, (100, 50), (200, 200));
        assert_eq!(r.x, 0.25);
        assert_eq!(r.y, 0.375);
        assert_eq!(r.width, 0.5);
        assert_eq!(r.height, 0.25);
    }

    #[test]
    fn directional_anchors_clamp_to_their_edges() {
        let r = rect(ContentMode::TopLeft, (100, 50), (200, 200));
        assert_eq!((r.x, r.y), (0.0, 0.0));
        let r = rect(ContentMode::BottomRight, (100, 50), (200, 200));
        assert_eq!((r.x, r.y), (0.5, 0.75));
        let r = rect(ContentMode::Top, (100, 50), (200, 200));
        assert_eq!((r.x, r.y), (0.25, 0.0));
        let r = rect(ContentMode::Left, (100, 50), (200, 200));
        assert_eq!((r.x, r.y), (0.0, 0.375));
        let r = rect(ContentMode::Bottom, (100, 50), (200, 200));
        assert_eq!((r.x, r.y), (0.25, 0.75));
    }

    #[test]
    fn stretch_covers_the_whole_texture() {
        for (source, viewport) in [((1, 1), (640, 480)), ((1920, 1080), (3, 7))] {
            let r = rect(ContentMode::ScaleToFill, source, viewport);
            let vertices = compute_vertices(&r);
            let coords: Vec<[f32; 2]> = vertices.iter().map(|v| v.tex_coords).collect();
            for corner in [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]] {
                assert!(coords.contains(&corner));
            }
            let xs: Vec<f32> = vertices.iter().map(|v| v.position[0]).collect();
            let ys: Vec<f32> = vertices.iter().map(|v| v.position[1]).collect();
            assert_eq!(xs, [-1.0, 1.0, -1.0, 1.0]);
            assert_eq!(ys, [1.0, 1.0, -1.0, -1.0]);
        }
    }

    #[test]
    fn aspect_fit_letterboxes_on_the_constrained_axis() {
        // Wide source in a square viewport: full width, centered vertically.
        let r = rect(ContentMode::ScaleAspectFit, (200, 100), (100, 100));
        assert_eq!(r.x, 0.0);
        assert_eq!(r.width, 1.0);
        assert!(r.height < 1.0);
        assert!((r.y - (1.0 - (r.y + r.height))).abs() < 1e-12);

        // Tall source: full height, centered horizontally.
        let r = rect(ContentMode::ScaleAspectFit, (30, 120), (160, 90));
        assert_eq!(r.y, 0.0);
        assert!((r.height - 1.0).abs() < 1e-12);
        assert!(r.x > 0.0 && r.width < 1.0);
        assert!((r.x - (1.0 - (r.x + r.width))).abs() < 1e-12);
    }

    #[test]
    fn aspect_fill_overflows_the_viewport() {
        let r = rect(ContentMode::ScaleAspectFill, (200, 100), (100, 100));
        assert_eq!(r.height, 1.0);
        assert_eq!(r.width, 2.0);
        assert_eq!(r.x, -0.5);
    }

    #[test]
    fn missing_source_produces_no_geometry() {
        assert!(compute_texture_sample_rect(ContentMode::Center, None, Size::new(10, 10)).is_none());
    }

    #[test]
    fn redraw_mode_is_degenerate() {
        let r = rect(ContentMode::Redraw, (10, 10), (10, 10));
        assert!(r.is_degenerate());
    }

    #[test]
    fn vertices_follow_the_device_mapping() {
        let r = SampleRect {
            x: 0.25,
            y: 0.375,
            width: 0.5,
            height: 0.25,
        };
        let v = compute_vertices(&r);
        assert_eq!(v[0].position, [-0.5, 0.25, 0.0, 1.0]);
        assert_eq!(v[1].position, [0.5, 0.25, 0.0, 1.0]);
        assert_eq!(v[2].position, [-0.5, -0.25, 0.0, 1.0]);
        assert_eq!(v[3].position, [0.5, -0.25, 0.0, 1.0]);
    }

    #[test]
    fn cache_recomputes_only_on_change() {
        let mut cache = GeometryCache::new();
        let source = Some(Size::new(100, 50));
        let viewport = Some(Size::new(200, 200));
        assert!(cache.update(ContentMode::Center, source, viewport));
        assert!(!cache.update(ContentMode::Center, source, viewport));
        assert_eq!(cache.generation(), 1);
        assert!(cache.update(ContentMode::ScaleToFill, source, viewport));
        assert_eq!(cache.generation(), 2);
        assert!(!cache.update(ContentMode::ScaleToFill, None, viewport));
        assert!(cache.geometry().is_none());
    }

    #[test]
    fn content_modes_parse_from_names_and_raw_values() {
        assert_eq!("aspect-fit".parse::<ContentMode>().unwrap(), ContentMode::ScaleAspectFit);
        assert_eq!("top-left".parse::<ContentMode>().unwrap(), ContentMode::TopLeft);
        assert_eq!("4".parse::<ContentMode>().unwrap(), ContentMode::Center);
        assert!(matches!(
            ContentMode::try_from(13),
            Err(RendererError::InvalidContentMode(13))
        ));
        for mode in ContentMode::ALL {
            assert_eq!(ContentMode::try_from(mode.raw_value()).unwrap(), mode);
        }
    }

    #[test]
    fn sizes_parse_from_cli_notation() {
        assert_eq!("64x32".parse::<Size>().unwrap(), Size::new(64, 32));
        assert!("64".parse::<Size>().is_err());
    }
}
