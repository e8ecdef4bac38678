//! Renders decoded video frames of arbitrary pixel formats onto a GPU target.
//!
//! The crate is split into three cooperating pieces:
//! - [`format`] maps a pixel-format identifier to the planes, texel layouts,
//!   shading program and color transform needed to display it,
//! - [`geometry`] turns a content mode plus source/viewport sizes into a quad,
//! - [`viewer`] owns the per-frame state machine that materializes plane
//!   textures and issues the draw through a [`GpuBackend`].
//!
//! [`gpu::WgpuBackend`] is the wgpu implementation of the backend seam.

use thiserror::Error;

pub mod backend;
pub mod color;
pub mod config;
mod cpu;
pub mod format;
pub mod frame;
pub mod geometry;
pub mod gpu;
pub mod mailbox;
pub mod viewer;

pub use backend::{BufferRole, DrawCall, GpuBackend, PipelineKey, PlaneTextureSet, TransformBuffers};
pub use color::{ColorRange, ColorTransform};
pub use config::{FilterMode, PresentModePreference, RendererConfig, TargetFormat};
pub use cpu::{convert_to_rgba, CpuFrame};
pub use format::{
    resolve, supported_formats, FormatId, PixelFormat, PixelFormatDescriptor, Rgb16Kind,
    ShadingProgram, TexelLayout, MAX_PLANES,
};
pub use frame::{FrameSource, PixelBuffer, Plane};
pub use geometry::{ContentMode, FrameGeometry, GeometryCache, SampleRect, Size, Vertex};
pub use gpu::{PlaneTexture, RenderTarget, WgpuBackend};
pub use mailbox::FrameMailbox;
pub use viewer::{FrameRenderer, RendererPhase, RendererSnapshot};

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("unsupported pixel format {0}")]
    UnsupportedFormat(FormatId),
    #[error("no GPU device attached")]
    DeviceUnavailable,
    #[error("GPU resource creation failed: {0}")]
    ResourceCreation(String),
    #[error("Shader compilation error: {0}")]
    ShaderCompilation(String),
    #[error("plane {plane} could not be materialized: {reason}")]
    MaterializeFailed { plane: usize, reason: String },
    #[error("frame carries {found} planes, format needs {expected}")]
    MissingPlanes { expected: usize, found: usize },
    #[error("frame state incomplete: {0}")]
    IncompleteFrame(&'static str),
    #[error("unrecognized content mode {0}")]
    InvalidContentMode(u32),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("Request device error: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("Buffer async error")]
    BufferAsync,
}
