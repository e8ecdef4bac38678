//! Decoded frames as seen by the renderer.

use crate::format::{resolve, FormatId};
use crate::RendererError;

/// A decoded image: a pixel-format identifier plus one or more byte planes.
pub trait FrameSource: Send + Sync {
    fn pixel_format_identifier(&self) -> FormatId;

    /// Number of planes. Packed formats may report 0, which reads as 1.
    fn plane_count(&self) -> usize;

    fn width_of_plane(&self, plane: usize) -> u32;

    fn height_of_plane(&self, plane: usize) -> u32;

    fn bytes_per_row(&self, plane: usize) -> usize;

    fn plane_bytes(&self, plane: usize) -> Option<&[u8]>;

    fn effective_plane_count(&self) -> usize {
        self.plane_count().max(1)
    }

    /// Display size of the image, taken from plane 0.
    fn dimensions(&self) -> (u32, u32) {
        (self.width_of_plane(0), self.height_of_plane(0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: usize,
    pub data: Vec<u8>,
}

impl Plane {
    pub fn new(width: u32, height: u32, bytes_per_row: usize) -> Self {
        Self {
            width,
            height,
            bytes_per_row,
            data: vec![0; bytes_per_row * height as usize],
        }
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.bytes_per_row;
        &self.data[start..start + self.bytes_per_row]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.bytes_per_row;
        &mut self.data[start..start + self.bytes_per_row]
    }
}

/// Owned in-memory frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub format: FormatId,
    pub planes: Vec<Plane>,
}

impl PixelBuffer {
    pub fn new(format: FormatId, planes: Vec<Plane>) -> Self {
        Self { format, planes }
    }

    /// Allocates zeroed planes laid out for `format` at `width` x `height`,
    /// with tightly packed rows.
    pub fn allocate(format: FormatId, width: u32, height: u32) -> Result<Self, RendererError> {
        let descriptor = resolve(format)?;
        let planes = descriptor
            .planes()
            .iter()
            .map(|spec| {
                let (w, h) = spec.extent(width, height);
                Plane::new(w, h, spec.layout.row_bytes(w))
            })
            .collect();
        Ok(Self { format, planes })
    }

    pub fn plane_mut(&mut self, plane: usize) -> Option<&mut Plane> {
        self.planes.get_mut(plane)
    }
}

impl FrameSource for PixelBuffer {
    fn pixel_format_identifier(&self) -> FormatId {
        self.format
    }

    fn plane_count(&self) -> usize {
        self.planes.len()
    }

    fn width_of_plane(&self, plane: usize) -> u32 {
        self.planes.get(plane).map_or(0, |p| p.width)
    }

    fn height_of_plane(&self, plane: usize) -> u32 {
        self.planes.get(plane).map_or(0, |p| p.height)
    }

    fn bytes_per_row(&self, plane: usize) -> usize {
        self.planes.get(plane).map_or(0, |p| p.bytes_per_row)
    }

    fn plane_bytes(&self, plane: usize) -> Option<&[u8]> {
        self.planes.get(plane).map(|p| p.data.as_slice())
    }
}
