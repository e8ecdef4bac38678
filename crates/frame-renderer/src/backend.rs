//! The seam between the frame state machine and a concrete GPU API.

use serde::Serialize;

use crate::format::{ShadingProgram, TexelLayout, MAX_PLANES};
use crate::frame::FrameSource;
use crate::geometry::Size;
use crate::RendererError;

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    Vertex,
    Uniform,
}

/// Identifies a compiled pipeline: the shading program plus whether the
/// color-transform uniforms feed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PipelineKey {
    pub program: ShadingProgram,
    pub color_transform: bool,
}

impl PipelineKey {
    pub fn label(&self) -> String {
        if self.color_transform {
            format!("{}+ycbcr", self.program.id())
        } else {
            self.program.id().to_string()
        }
    }
}

/// Matrix and offset uniforms of one color range.
#[derive(Debug)]
pub struct TransformBuffers<B> {
    pub matrix: B,
    pub offsets: B,
}

/// Textures of the current frame. Always replaced as a whole so a draw never
/// sees planes of two different frames.
#[derive(Debug)]
pub struct PlaneTextureSet<T> {
    slots: [Option<T>; MAX_PLANES],
    active: usize,
}

impl<T> Default for PlaneTextureSet<T> {
    fn default() -> Self {
        Self {
            slots: [None, None, None],
            active: 0,
        }
    }
}

impl<T> PlaneTextureSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from materialized textures. Slots past `textures.len()`
    /// stay empty.
    pub fn from_textures(textures: Vec<T>) -> Result<Self, RendererError> {
        if textures.len() > MAX_PLANES {
            return Err(RendererError::MissingPlanes {
                expected: MAX_PLANES,
                found: textures.len(),
            });
        }
        let mut set = Self::new();
        set.active = textures.len();
        for (slot, texture) in set.slots.iter_mut().zip(textures) {
            *slot = Some(texture);
        }
        Ok(set)
    }

    /// Number of planes the set was built for.
    pub fn len(&self) -> usize {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    pub fn get(&self, plane: usize) -> Option<&T> {
        self.slots.get(plane).and_then(Option::as_ref)
    }

    pub fn active(&self) -> impl Iterator<Item = &T> {
        self.slots[..self.active].iter().flatten()
    }

    /// Count of occupied slots, including any past the active range.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether every one of the first `expected` slots holds a texture.
    pub fn is_complete(&self, expected: usize) -> bool {
        expected > 0 && self.active == expected && self.slots[..expected].iter().all(Option::is_some)
    }

    pub fn clear(&mut self) {
        self.slots = [None, None, None];
        self.active = 0;
    }
}

/// Everything the backend needs to issue one draw.
pub struct DrawCall<'a, B: GpuBackend + ?Sized> {
    pub key: PipelineKey,
    pub pipeline: &'a B::Pipeline,
    pub vertex_buffer: &'a B::Buffer,
    pub vertex_count: u32,
    pub planes: &'a PlaneTextureSet<B::Texture>,
    pub permutation: Option<&'a B::Buffer>,
    pub color_transform: Option<&'a TransformBuffers<B::Buffer>>,
}

/// GPU operations the renderer relies on. Implementations own every device
/// object they hand out.
pub trait GpuBackend: Send {
    type Texture: Send;
    type Buffer: Send;
    type Pipeline: Clone + Send;

    fn create_buffer(
        &mut self,
        label: &str,
        role: BufferRole,
        contents: &[u8],
    ) -> Result<Self::Buffer, RendererError>;

    /// Returns the pipeline for `key`, compiling it on first use.
    fn create_pipeline(&mut self, key: PipelineKey) -> Result<Self::Pipeline, RendererError>;

    /// Uploads plane `plane` of `source` into a texture of `extent` texels
    /// laid out as `layout`.
    fn materialize(
        &mut self,
        source: &dyn FrameSource,
        plane: usize,
        extent: (u32, u32),
        layout: TexelLayout,
    ) -> Result<Self::Texture, RendererError>;

    /// Drops textures cached for reuse across frames.
    fn flush_texture_cache(&mut self);

    fn resize_drawable(&mut self, _size: Size) -> Result<(), RendererError> {
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_, Self>) -> Result<(), RendererError>;
}
