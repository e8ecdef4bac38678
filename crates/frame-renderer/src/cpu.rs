//! CPU reference conversion, sharing the format table and color constants
//! with the GPU path.

use image::RgbaImage;

use crate::format::{resolve, Rgb16Kind, ShadingProgram, TexelLayout};
use crate::frame::FrameSource;
use crate::RendererError;

/// Tightly or row-pitch packed RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuFrame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
}

impl CpuFrame {
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y * self.bytes_per_row + x * 4) as usize;
        self.pixels
            .get(offset..offset + 4)
            .and_then(|px| px.try_into().ok())
    }

    pub fn to_image(&self) -> Result<RgbaImage, RendererError> {
        let row = self.width as usize * 4;
        let mut packed = Vec::with_capacity(row * self.height as usize);
        for y in 0..self.height as usize {
            let start = y * self.bytes_per_row as usize;
            let src = self.pixels.get(start..start + row).ok_or_else(|| {
                RendererError::InvalidFormat(format!("cpu frame truncated at row {y}"))
            })?;
            packed.extend_from_slice(src);
        }
        RgbaImage::from_raw(self.width, self.height, packed)
            .ok_or_else(|| RendererError::InvalidFormat("cpu frame size mismatch".into()))
    }
}

/// Expands one little-endian 16-bit RGB pixel to RGBA8.
pub(crate) fn expand_rgb16(kind: Rgb16Kind, lo: u8, hi: u8) -> [u8; 4] {
    let v = u16::from_le_bytes([lo, hi]);
    let five = |bits: u16| ((bits & 0x1f) as u32 * 255 / 31) as u8;
    match kind {
        Rgb16Kind::Rgb555 => [five(v >> 10), five(v >> 5), five(v), 255],
        Rgb16Kind::Rgb5551 => [
            five(v >> 11),
            five(v >> 6),
            five(v >> 1),
            if v & 1 == 1 { 255 } else { 0 },
        ],
        Rgb16Kind::Rgb565 => [
            five(v >> 11),
            (((v >> 5) & 0x3f) as u32 * 255 / 63) as u8,
            five(v),
            255,
        ],
    }
}

pub(crate) fn expand_rgb16_rows(
    kind: Rgb16Kind,
    data: &[u8],
    bytes_per_row: usize,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height as usize {
        let row = &data[y * bytes_per_row..];
        for x in 0..width as usize {
            out.extend_from_slice(&expand_rgb16(kind, row[x * 2], row[x * 2 + 1]));
        }
    }
    out
}

/// Returns the bytes of `plane`, checked to hold `height` rows of at least
/// `row_bytes` each.
pub(crate) fn plane_data<'a>(
    source: &'a dyn FrameSource,
    plane: usize,
    row_bytes: usize,
    height: u32,
) -> Result<(&'a [u8], usize), RendererError> {
    let data = source
        .plane_bytes(plane)
        .ok_or_else(|| RendererError::MaterializeFailed {
            plane,
            reason: "plane has no backing memory".into(),
        })?;
    let stride = source.bytes_per_row(plane);
    if stride < row_bytes {
        return Err(RendererError::MaterializeFailed {
            plane,
            reason: format!("row stride {stride} shorter than {row_bytes} bytes"),
        });
    }
    let needed = match height {
        0 => 0,
        h => stride * (h as usize - 1) + row_bytes,
    };
    if data.len() < needed {
        return Err(RendererError::MaterializeFailed {
            plane,
            reason: format!("plane holds {} bytes, needs {needed}", data.len()),
        });
    }
    Ok((data, stride))
}

fn unorm(v: u8) -> f32 {
    f32::from(v) / 255.0
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Converts any supported frame to RGBA8 at the size of plane 0.
pub fn convert_to_rgba(source: &dyn FrameSource) -> Result<CpuFrame, RendererError> {
    let descriptor = resolve(source.pixel_format_identifier())?;
    let found = source.effective_plane_count();
    if found < descriptor.plane_count() {
        return Err(RendererError::MissingPlanes {
            expected: descriptor.plane_count(),
            found,
        });
    }

    let (width, height) = source.dimensions();
    let mut planes = Vec::with_capacity(descriptor.plane_count());
    for (index, spec) in descriptor.planes().iter().enumerate() {
        // Index math below follows the format's own subsampling.
        let (w, h) = spec.extent(width, height);
        planes.push(plane_data(source, index, spec.layout.row_bytes(w), h)?);
    }

    let transform = descriptor.color_transform();
    let perm = descriptor.channel_order().map(usize::from);
    let convert = |ycbcr: [u8; 3], alpha: u8| -> [u8; 4] {
        match transform {
            Some(t) => {
                let rgb = t.apply([unorm(ycbcr[0]), unorm(ycbcr[1]), unorm(ycbcr[2])]);
                [to_u8(rgb[0]), to_u8(rgb[1]), to_u8(rgb[2]), alpha]
            }
            None => [ycbcr[0], ycbcr[1], ycbcr[2], alpha],
        }
    };

    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let (p0, s0) = planes[0];
            let px = match descriptor.program {
                ShadingProgram::YCbCrPlanar => {
                    let (cb, sb) = planes[1];
                    let (cr, sr) = planes[2];
                    convert(
                        [p0[y * s0 + x], cb[(y / 2) * sb + x / 2], cr[(y / 2) * sr + x / 2]],
                        255,
                    )
                }
                ShadingProgram::YCbCrBiPlanar => {
                    let (c, sc) = planes[1];
                    let base = (y / 2) * sc + (x / 2) * 2;
                    convert([p0[y * s0 + x], c[base], c[base + 1]], 255)
                }
                ShadingProgram::YCbCr422 => {
                    let base = y * s0 + (x / 2) * 4;
                    let luma = p0[base + 1 + (x % 2) * 2];
                    convert([luma, p0[base], p0[base + 2]], 255)
                }
                ShadingProgram::RgbaPermute => {
                    let src = &p0[y * s0 + x * 4..y * s0 + x * 4 + 4];
                    convert([src[perm[0]], src[perm[1]], src[perm[2]]], src[perm[3]])
                }
                ShadingProgram::Rgb24Expand => {
                    let src = &p0[y * s0 + x * 3..y * s0 + x * 3 + 3];
                    [src[perm[0]], src[perm[1]], src[perm[2]], 255]
                }
                ShadingProgram::PassthroughRgba => match descriptor.planes()[0].layout {
                    TexelLayout::Rgb16(kind) => {
                        let at = y * s0 + x * 2;
                        expand_rgb16(kind, p0[at], p0[at + 1])
                    }
                    _ => {
                        let at = y * s0 + x * 4;
                        [p0[at], p0[at + 1], p0[at + 2], p0[at + 3]]
                    }
                },
            };
            pixels.extend_from_slice(&px);
        }
    }

    Ok(CpuFrame {
        pixels,
        width,
        height,
        bytes_per_row: width * 4,
    })
}
