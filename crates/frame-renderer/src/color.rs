use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Numeric range convention of Y'CbCr samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorRange {
    Full,
    Video,
}

impl ColorRange {
    pub fn transform(self) -> &'static ColorTransform {
        match self {
            ColorRange::Full => &FULL_RANGE,
            ColorRange::Video => &VIDEO_RANGE,
        }
    }
}

/// Y'CbCr to RGB conversion. Shaders compute `(ycbcr - offsets) * matrix`,
/// so each column of `matrix` produces one output channel.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ColorTransform {
    pub matrix: [[f32; 4]; 4],
    pub offsets: [f32; 4],
}

impl ColorTransform {
    pub fn matrix_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.matrix)
    }

    pub fn offset_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.offsets)
    }

    /// Converts normalized Y'CbCr samples to normalized RGB.
    pub fn apply(&self, ycbcr: [f32; 3]) -> [f32; 3] {
        let v = [
            ycbcr[0] - self.offsets[0],
            ycbcr[1] - self.offsets[1],
            ycbcr[2] - self.offsets[2],
        ];
        let channel = |column: &[f32; 4]| column[0] * v[0] + column[1] * v[1] + column[2] * v[2];
        [
            channel(&self.matrix[0]),
            channel(&self.matrix[1]),
            channel(&self.matrix[2]),
        ]
    }
}

// BT.601, full swing luma and chroma.
pub const FULL_RANGE: ColorTransform = ColorTransform {
    matrix: [
        [1.0, 0.0, 1.402, 0.0],
        [1.0, -0.344_136, -0.714_136, 0.0],
        [1.0, 1.772, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ],
    offsets: [0.0, 0.5, 0.5, 0.0],
};

// BT.601, luma 16..235 and chroma 16..240.
pub const VIDEO_RANGE: ColorTransform = ColorTransform {
    matrix: [
        [1.1643, 0.0, 1.5958, 0.0],
        [1.1643, -0.391_73, -0.8129, 0.0],
        [1.1643, 2.017, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ],
    offsets: [0.0625, 0.5, 0.5, 0.0],
};

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 0.01)
    }

    #[test]
    fn video_range_maps_reference_black_and_white() {
        let t = ColorRange::Video.transform();
        assert!(approx(t.apply([16.0 / 255.0, 0.5, 0.5]), [0.0, 0.0, 0.0]));
        assert!(approx(t.apply([235.0 / 255.0, 0.5, 0.5]), [1.0, 1.0, 1.0]));
    }

    #[test]
    fn full_range_keeps_luma_untouched_for_neutral_chroma() {
        let t = ColorRange::Full.transform();
        assert!(approx(t.apply([0.25, 0.5, 0.5]), [0.25, 0.25, 0.25]));
        assert!(approx(t.apply([1.0, 0.5, 0.5]), [1.0, 1.0, 1.0]));
    }

    #[test]
    fn uniform_payloads_have_shader_sizes() {
        assert_eq!(FULL_RANGE.matrix_bytes().len(), 64);
        assert_eq!(VIDEO_RANGE.offset_bytes().len(), 16);
    }
}
