//! Pixel format resolution.
//!
//! Every supported format is described once in [`PixelFormat::describe`]; the
//! lookup table keyed by [`FormatId`] is built from those descriptions on
//! first use and never mutated afterwards.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::backend::PipelineKey;
use crate::color::{ColorRange, ColorTransform};
use crate::RendererError;

/// Upper bound on planes any supported format decomposes into.
pub const MAX_PLANES: usize = 3;

pub const IDENTITY_PERMUTATION: [u8; 4] = [0, 1, 2, 3];

/// Four-character pixel format code as reported by the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatId(pub u32);

impl FormatId {
    pub const fn from_fourcc(code: &[u8; 4]) -> Self {
        Self(u32::from_be_bytes(*code))
    }

    pub fn fourcc(self) -> Option<[u8; 4]> {
        let bytes = self.0.to_be_bytes();
        bytes
            .iter()
            .all(|b| b.is_ascii_graphic() || *b == b' ')
            .then_some(bytes)
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fourcc() {
            Some(code) => write!(f, "'{}'", String::from_utf8_lossy(&code)),
            None => write!(f, "{:#010x}", self.0),
        }
    }
}

impl FromStr for FormatId {
    type Err = RendererError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_matches('\'');
        if let Some(hex) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            return u32::from_str_radix(hex, 16)
                .map(FormatId)
                .map_err(|_| RendererError::InvalidFormat(s.to_string()));
        }
        match trimmed {
            "ARGB" => return Ok(PixelFormat::Argb32.id()),
            "RGB" | "RGB " => return Ok(PixelFormat::Rgb24.id()),
            _ => {}
        }
        let bytes: [u8; 4] = trimmed
            .as_bytes()
            .try_into()
            .map_err(|_| RendererError::InvalidFormat(s.to_string()))?;
        Ok(FormatId::from_fourcc(&bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 4:2:0 three-plane Y'CbCr, video range.
    YCbCr420Planar,
    /// 4:2:0 three-plane Y'CbCr, full range.
    YCbCr420PlanarFull,
    /// 4:2:0 Y' plane plus interleaved CbCr plane, video range (NV12).
    YCbCr420BiPlanarVideo,
    /// 4:2:0 Y' plane plus interleaved CbCr plane, full range.
    YCbCr420BiPlanarFull,
    /// 4:4:4:4 ordered Cb Y' Cr A.
    YCbCrA4444,
    /// 4:4:4:4 ordered A Y' Cb Cr, full range alpha, video range Y'CbCr.
    AYCbCr4444,
    /// 4:2:2 ordered Cb Y'0 Cr Y'1.
    YCbCr422,
    Argb32,
    Bgra32,
    Abgr32,
    Rgba32,
    Rgb24,
    Bgr24,
    Rgb555,
    Rgb5551,
    Rgb565,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 16] = [
        PixelFormat::YCbCr420Planar,
        PixelFormat::YCbCr420PlanarFull,
        PixelFormat::YCbCr420BiPlanarVideo,
        PixelFormat::YCbCr420BiPlanarFull,
        PixelFormat::YCbCrA4444,
        PixelFormat::AYCbCr4444,
        PixelFormat::YCbCr422,
        PixelFormat::Argb32,
        PixelFormat::Bgra32,
        PixelFormat::Abgr32,
        PixelFormat::Rgba32,
        PixelFormat::Rgb24,
        PixelFormat::Bgr24,
        PixelFormat::Rgb555,
        PixelFormat::Rgb5551,
        PixelFormat::Rgb565,
    ];

    pub const fn id(self) -> FormatId {
        match self {
            PixelFormat::YCbCr420Planar => FormatId::from_fourcc(b"y420"),
            PixelFormat::YCbCr420PlanarFull => FormatId::from_fourcc(b"f420"),
            PixelFormat::YCbCr420BiPlanarVideo => FormatId::from_fourcc(b"420v"),
            PixelFormat::YCbCr420BiPlanarFull => FormatId::from_fourcc(b"420f"),
            PixelFormat::YCbCrA4444 => FormatId::from_fourcc(b"v408"),
            PixelFormat::AYCbCr4444 => FormatId::from_fourcc(b"y408"),
            PixelFormat::YCbCr422 => FormatId::from_fourcc(b"2vuy"),
            PixelFormat::Argb32 => FormatId(0x0000_0020),
            PixelFormat::Bgra32 => FormatId::from_fourcc(b"BGRA"),
            PixelFormat::Abgr32 => FormatId::from_fourcc(b"ABGR"),
            PixelFormat::Rgba32 => FormatId::from_fourcc(b"RGBA"),
            PixelFormat::Rgb24 => FormatId(0x0000_0018),
            PixelFormat::Bgr24 => FormatId::from_fourcc(b"24BG"),
            PixelFormat::Rgb555 => FormatId::from_fourcc(b"L555"),
            PixelFormat::Rgb5551 => FormatId::from_fourcc(b"5551"),
            PixelFormat::Rgb565 => FormatId::from_fourcc(b"L565"),
        }
    }

    /// Textbook layout of the format. This is the single source the lookup
    /// table is built from.
    pub fn describe(self) -> PixelFormatDescriptor {
        use ShadingProgram::*;
        match self {
            PixelFormat::YCbCr420Planar => {
                PixelFormatDescriptor::ycbcr(self, YCbCrPlanar, ColorRange::Video, &PLANAR_420)
            }
            PixelFormat::YCbCr420PlanarFull => {
                PixelFormatDescriptor::ycbcr(self, YCbCrPlanar, ColorRange::Full, &PLANAR_420)
            }
            PixelFormat::YCbCr420BiPlanarVideo => {
                PixelFormatDescriptor::ycbcr(self, YCbCrBiPlanar, ColorRange::Video, &BIPLANAR_420)
            }
            PixelFormat::YCbCr420BiPlanarFull => {
                PixelFormatDescriptor::ycbcr(self, YCbCrBiPlanar, ColorRange::Full, &BIPLANAR_420)
            }
            PixelFormat::YCbCrA4444 => {
                PixelFormatDescriptor::ycbcr(self, RgbaPermute, ColorRange::Full, &PACKED_RGBA)
            }
            PixelFormat::AYCbCr4444 => {
                PixelFormatDescriptor::ycbcr(self, RgbaPermute, ColorRange::Video, &PACKED_RGBA)
            }
            PixelFormat::YCbCr422 => {
                PixelFormatDescriptor::ycbcr(self, YCbCr422, ColorRange::Video, &PACKED_422)
            }
            PixelFormat::Argb32 => {
                PixelFormatDescriptor::rgb(self, RgbaPermute, [1, 2, 3, 0], &PACKED_RGBA)
            }
            PixelFormat::Bgra32 => {
                PixelFormatDescriptor::rgb(self, RgbaPermute, [2, 1, 0, 3], &PACKED_RGBA)
            }
            PixelFormat::Abgr32 => {
                PixelFormatDescriptor::rgb(self, RgbaPermute, [3, 2, 1, 0], &PACKED_RGBA)
            }
            PixelFormat::Rgba32 => {
                PixelFormatDescriptor::rgb(self, PassthroughRgba, IDENTITY_PERMUTATION, &PACKED_RGBA)
            }
            PixelFormat::Rgb24 => {
                PixelFormatDescriptor::rgb(self, Rgb24Expand, IDENTITY_PERMUTATION, &PACKED_RGB24)
            }
            PixelFormat::Bgr24 => {
                PixelFormatDescriptor::rgb(self, Rgb24Expand, [2, 1, 0, 3], &PACKED_RGB24)
            }
            PixelFormat::Rgb555 => {
                PixelFormatDescriptor::rgb(self, PassthroughRgba, IDENTITY_PERMUTATION, &PACKED_555)
            }
            PixelFormat::Rgb5551 => {
                PixelFormatDescriptor::rgb(self, PassthroughRgba, IDENTITY_PERMUTATION, &PACKED_5551)
            }
            PixelFormat::Rgb565 => {
                PixelFormatDescriptor::rgb(self, PassthroughRgba, IDENTITY_PERMUTATION, &PACKED_565)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rgb16Kind {
    /// x RRRRR GGGGG BBBBB
    Rgb555,
    /// RRRRR GGGGG BBBBB A
    Rgb5551,
    /// RRRRR GGGGGG BBBBB
    Rgb565,
}

/// How one plane's bytes are laid out in memory and sampled on the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TexelLayout {
    /// One 8-bit channel per pixel.
    Luma8,
    /// Two interleaved 8-bit channels per pixel.
    Chroma88,
    /// Four 8-bit channels per pixel.
    Rgba8,
    /// Two pixels packed into four bytes (Cb Y'0 Cr Y'1).
    Packed422,
    /// Three bytes per pixel, read byte-wise by the shading program.
    Rgb24,
    /// 16-bit packed RGB, expanded to RGBA8 when materialized.
    Rgb16(Rgb16Kind),
}

impl TexelLayout {
    pub const fn source_bytes_per_pixel(self) -> usize {
        match self {
            TexelLayout::Luma8 => 1,
            TexelLayout::Chroma88 | TexelLayout::Packed422 | TexelLayout::Rgb16(_) => 2,
            TexelLayout::Rgb24 => 3,
            TexelLayout::Rgba8 => 4,
        }
    }

    /// Minimum bytes per row the source buffer must carry for a plane of
    /// `width` pixels.
    pub const fn row_bytes(self, width: u32) -> usize {
        match self {
            TexelLayout::Packed422 => width.div_ceil(2) as usize * 4,
            _ => width as usize * self.source_bytes_per_pixel(),
        }
    }

    /// Extent of the GPU texture holding a plane of `width` x `height` pixels.
    /// `None` when the texel row does not fit in `u32`.
    pub const fn texture_extent(self, width: u32, height: u32) -> Option<(u32, u32)> {
        match self {
            TexelLayout::Packed422 => Some((width.div_ceil(2), height)),
            TexelLayout::Rgb24 => match width.checked_mul(3) {
                Some(texels) => Some((texels, height)),
                None => None,
            },
            _ => Some((width, height)),
        }
    }

    pub const fn channels(self) -> u8 {
        match self {
            TexelLayout::Luma8 | TexelLayout::Rgb24 => 1,
            TexelLayout::Chroma88 => 2,
            TexelLayout::Rgba8 | TexelLayout::Packed422 | TexelLayout::Rgb16(_) => 4,
        }
    }
}

/// Layout of one plane relative to the full image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaneSpec {
    pub layout: TexelLayout,
    /// Horizontal and vertical subsampling divisors.
    pub subsampling: (u32, u32),
}

impl PlaneSpec {
    const fn full(layout: TexelLayout) -> Self {
        Self {
            layout,
            subsampling: (1, 1),
        }
    }

    const fn quarter(layout: TexelLayout) -> Self {
        Self {
            layout,
            subsampling: (2, 2),
        }
    }

    /// Pixel dimensions of this plane for an image of `width` x `height`.
    pub const fn extent(&self, width: u32, height: u32) -> (u32, u32) {
        (
            width.div_ceil(self.subsampling.0),
            height.div_ceil(self.subsampling.1),
        )
    }
}

static PLANAR_420: [PlaneSpec; 3] = [
    PlaneSpec::full(TexelLayout::Luma8),
    PlaneSpec::quarter(TexelLayout::Luma8),
    PlaneSpec::quarter(TexelLayout::Luma8),
];
static BIPLANAR_420: [PlaneSpec; 2] = [
    PlaneSpec::full(TexelLayout::Luma8),
    PlaneSpec::quarter(TexelLayout::Chroma88),
];
static PACKED_RGBA: [PlaneSpec; 1] = [PlaneSpec::full(TexelLayout::Rgba8)];
static PACKED_422: [PlaneSpec; 1] = [PlaneSpec::full(TexelLayout::Packed422)];
static PACKED_RGB24: [PlaneSpec; 1] = [PlaneSpec::full(TexelLayout::Rgb24)];
static PACKED_555: [PlaneSpec; 1] = [PlaneSpec::full(TexelLayout::Rgb16(Rgb16Kind::Rgb555))];
static PACKED_5551: [PlaneSpec; 1] = [PlaneSpec::full(TexelLayout::Rgb16(Rgb16Kind::Rgb5551))];
static PACKED_565: [PlaneSpec; 1] = [PlaneSpec::full(TexelLayout::Rgb16(Rgb16Kind::Rgb565))];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShadingProgram {
    PassthroughRgba,
    Rgb24Expand,
    YCbCrPlanar,
    YCbCrBiPlanar,
    YCbCr422,
    RgbaPermute,
}

impl ShadingProgram {
    /// Stable identifier pipelines are compiled and cached under.
    pub const fn id(self) -> &'static str {
        match self {
            ShadingProgram::PassthroughRgba => "passthrough_rgba",
            ShadingProgram::Rgb24Expand => "rgb24_expand",
            ShadingProgram::YCbCrPlanar => "ycbcr_planar",
            ShadingProgram::YCbCrBiPlanar => "ycbcr_biplanar",
            ShadingProgram::YCbCr422 => "ycbcr_422",
            ShadingProgram::RgbaPermute => "rgba_permute",
        }
    }

    pub const fn uses_permutation(self) -> bool {
        matches!(self, ShadingProgram::RgbaPermute | ShadingProgram::Rgb24Expand)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelFormatDescriptor {
    pub format: PixelFormat,
    pub program: ShadingProgram,
    /// `permutation[i]` is the source byte feeding canonical channel `i` (RGBA).
    pub permutation: [u8; 4],
    pub color_range: Option<ColorRange>,
    planes: &'static [PlaneSpec],
}

impl PixelFormatDescriptor {
    const fn ycbcr(
        format: PixelFormat,
        program: ShadingProgram,
        range: ColorRange,
        planes: &'static [PlaneSpec],
    ) -> Self {
        Self {
            format,
            program,
            permutation: IDENTITY_PERMUTATION,
            color_range: Some(range),
            planes,
        }
    }

    const fn rgb(
        format: PixelFormat,
        program: ShadingProgram,
        permutation: [u8; 4],
        planes: &'static [PlaneSpec],
    ) -> Self {
        Self {
            format,
            program,
            permutation,
            color_range: None,
            planes,
        }
    }

    pub fn id(&self) -> FormatId {
        self.format.id()
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    pub fn planes(&self) -> &'static [PlaneSpec] {
        self.planes
    }

    pub fn plane(&self, index: usize) -> Option<PlaneSpec> {
        self.planes.get(index).copied()
    }

    /// Whether the permutation buffer is bound when drawing this format.
    pub fn needs_permutation(&self) -> bool {
        self.program.uses_permutation()
    }

    pub fn color_transform(&self) -> Option<&'static ColorTransform> {
        self.color_range.map(ColorRange::transform)
    }

    pub fn pipeline_key(&self) -> PipelineKey {
        PipelineKey {
            program: self.program,
            color_transform: self.color_range.is_some(),
        }
    }

    /// Source byte each shader input channel is read from: R, G, B, A for
    /// RGB formats and Y', Cb, Cr, A for packed 4:4:4:4 Y'CbCr, whose byte
    /// order is fixed by the format rather than by the permutation table.
    pub fn channel_order(&self) -> [u8; 4] {
        let components = match self.format {
            PixelFormat::YCbCrA4444 => [1, 0, 2, 3],
            PixelFormat::AYCbCr4444 => [1, 2, 3, 0],
            _ => IDENTITY_PERMUTATION,
        };
        components.map(|component| self.permutation[usize::from(component)])
    }

    /// Channel order widened to the 16-byte uniform layout the shaders read.
    pub fn permutation_uniform(&self) -> [u32; 4] {
        self.channel_order().map(u32::from)
    }
}

static FORMAT_TABLE: Lazy<HashMap<FormatId, PixelFormatDescriptor>> = Lazy::new(|| {
    PixelFormat::ALL
        .iter()
        .map(|format| (format.id(), format.describe()))
        .collect()
});

/// Looks up the descriptor for `id`. Unknown identifiers never produce a
/// descriptor.
pub fn resolve(id: FormatId) -> Result<PixelFormatDescriptor, RendererError> {
    FORMAT_TABLE
        .get(&id)
        .copied()
        .ok_or(RendererError::UnsupportedFormat(id))
}

/// All supported descriptors in table order.
pub fn supported_formats() -> impl Iterator<Item = PixelFormatDescriptor> {
    PixelFormat::ALL.iter().map(|format| format.describe())
}
