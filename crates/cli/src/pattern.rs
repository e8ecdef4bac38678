//! Synthetic frames for exercising the renderer without a decoder.

use anyhow::{Context, Result};
use frame_renderer::{
    resolve, ColorRange, FormatId, PixelBuffer, Rgb16Kind, ShadingProgram, Size, TexelLayout,
};

/// Horizontal red ramp, vertical green ramp, constant blue.
fn gradient_rgb(x: u32, y: u32, size: Size) -> [u8; 3] {
    let ramp = |v: u32, extent: u32| (v * 255 / extent.saturating_sub(1).max(1)) as u8;
    [ramp(x, size.width), ramp(y, size.height), 128]
}

fn to_ycbcr(rgb: [u8; 3], range: ColorRange) -> [u8; 3] {
    let [r, g, b] = rgb.map(f32::from);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = -0.168_736 * r - 0.331_264 * g + 0.5 * b;
    let cr = 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    let (y, cb, cr) = match range {
        ColorRange::Full => (y, cb + 128.0, cr + 128.0),
        ColorRange::Video => (
            16.0 + y * 219.0 / 255.0,
            128.0 + cb * 224.0 / 255.0,
            128.0 + cr * 224.0 / 255.0,
        ),
    };
    [y, cb, cr].map(|v| v.round().clamp(0.0, 255.0) as u8)
}

fn pack_rgb16(kind: Rgb16Kind, [r, g, b]: [u8; 3]) -> [u8; 2] {
    let (r5, g5, b5) = (u16::from(r >> 3), u16::from(g >> 3), u16::from(b >> 3));
    let v = match kind {
        Rgb16Kind::Rgb555 => (r5 << 10) | (g5 << 5) | b5,
        Rgb16Kind::Rgb5551 => (r5 << 11) | (g5 << 6) | (b5 << 1) | 1,
        Rgb16Kind::Rgb565 => (r5 << 11) | (u16::from(g >> 2) << 5) | b5,
    };
    v.to_le_bytes()
}

/// Builds a gradient frame of `size` in `format`.
pub fn gradient(format: FormatId, size: Size) -> Result<PixelBuffer> {
    let descriptor = resolve(format).with_context(|| format!("format {format}"))?;
    let mut frame = PixelBuffer::allocate(format, size.width, size.height)?;
    let range = descriptor.color_range.unwrap_or(ColorRange::Full);
    let perm = descriptor.channel_order().map(usize::from);

    for y in 0..size.height {
        for x in 0..size.width {
            let rgb = gradient_rgb(x, y, size);
            let ycbcr = to_ycbcr(rgb, range);
            let xu = x as usize;
            match descriptor.program {
                ShadingProgram::YCbCrPlanar | ShadingProgram::YCbCrBiPlanar => {
                    frame.planes[0].row_mut(y)[xu] = ycbcr[0];
                    if x % 2 == 0 && y % 2 == 0 {
                        let (cx, cy) = (xu / 2, y / 2);
                        if descriptor.program == ShadingProgram::YCbCrPlanar {
                            frame.planes[1].row_mut(cy)[cx] = ycbcr[1];
                            frame.planes[2].row_mut(cy)[cx] = ycbcr[2];
                        } else {
                            frame.planes[1].row_mut(cy)[cx * 2..cx * 2 + 2]
                                .copy_from_slice(&ycbcr[1..]);
                        }
                    }
                }
                ShadingProgram::YCbCr422 => {
                    let row = frame.planes[0].row_mut(y);
                    let base = (xu / 2) * 4;
                    row[base + 1 + (xu % 2) * 2] = ycbcr[0];
                    if x % 2 == 0 {
                        row[base] = ycbcr[1];
                        row[base + 2] = ycbcr[2];
                    }
                }
                ShadingProgram::RgbaPermute | ShadingProgram::Rgb24Expand => {
                    // Store each channel at the byte the shader reads it from.
                    let canonical = match descriptor.color_range {
                        Some(_) => [ycbcr[0], ycbcr[1], ycbcr[2], 255],
                        None => [rgb[0], rgb[1], rgb[2], 255],
                    };
                    let bpp = descriptor.planes()[0].layout.source_bytes_per_pixel();
                    let px = &mut frame.planes[0].row_mut(y)[xu * bpp..xu * bpp + bpp];
                    for (channel, &source) in perm.iter().enumerate().take(bpp) {
                        px[source] = canonical[channel];
                    }
                }
                ShadingProgram::PassthroughRgba => match descriptor.planes()[0].layout {
                    TexelLayout::Rgb16(kind) => {
                        frame.planes[0].row_mut(y)[xu * 2..xu * 2 + 2]
                            .copy_from_slice(&pack_rgb16(kind, rgb));
                    }
                    _ => {
                        frame.planes[0].row_mut(y)[xu * 4..xu * 4 + 4]
                            .copy_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
                    }
                },
            }
        }
    }
    Ok(frame)
}
