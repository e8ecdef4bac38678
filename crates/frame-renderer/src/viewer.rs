//! Per-view frame state machine.
//!
//! Every mutation happens under one `parking_lot::Mutex`, held for the full
//! materialize-then-draw transaction of a submitted frame and for `reset`, so
//! the plane textures a draw binds always come from a single frame.

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info_span, instrument, warn};

use crate::backend::{BufferRole, DrawCall, GpuBackend, PipelineKey, PlaneTextureSet, TransformBuffers};
use crate::color::ColorRange;
use crate::config::RendererConfig;
use crate::format::{resolve, FormatId, PixelFormatDescriptor};
use crate::frame::FrameSource;
use crate::geometry::{ContentMode, GeometryCache, SampleRect, Size};
use crate::mailbox::FrameMailbox;
use crate::RendererError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RendererPhase {
    /// No format or size known.
    Empty,
    /// Inputs changed; textures or geometry not yet consistent.
    Configuring,
    /// Textures, geometry and pipeline agree; drawing is allowed.
    Ready,
}

/// Point-in-time view of the renderer state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RendererSnapshot {
    pub phase: RendererPhase,
    pub format: Option<FormatId>,
    pub pipeline: Option<PipelineKey>,
    pub source_size: Option<Size>,
    pub viewport: Option<Size>,
    pub content_mode: ContentMode,
    pub sample_rect: Option<SampleRect>,
    pub active_planes: usize,
    pub occupied_planes: usize,
    pub geometry_generation: u64,
    pub frames_drawn: u64,
    pub frame_pending: bool,
    pub frames_superseded: u64,
    pub backend_attached: bool,
}

/// Uniform buffers shared by every format of one device.
struct DeviceResources<B: GpuBackend> {
    full: TransformBuffers<B::Buffer>,
    video: TransformBuffers<B::Buffer>,
}

impl<B: GpuBackend> DeviceResources<B> {
    fn create(backend: &mut B) -> Result<Self, RendererError> {
        let mut buffers = |range: ColorRange, name: &str| -> Result<_, RendererError> {
            let transform = range.transform();
            Ok(TransformBuffers {
                matrix: backend.create_buffer(
                    &format!("frame-renderer.{name}.matrix"),
                    BufferRole::Uniform,
                    transform.matrix_bytes(),
                )?,
                offsets: backend.create_buffer(
                    &format!("frame-renderer.{name}.offsets"),
                    BufferRole::Uniform,
                    transform.offset_bytes(),
                )?,
            })
        };
        Ok(Self {
            full: buffers(ColorRange::Full, "full_range")?,
            video: buffers(ColorRange::Video, "video_range")?,
        })
    }

    fn transform(&self, range: ColorRange) -> &TransformBuffers<B::Buffer> {
        match range {
            ColorRange::Full => &self.full,
            ColorRange::Video => &self.video,
        }
    }
}

/// GPU objects compiled for one format.
struct FormatResources<B: GpuBackend> {
    pipeline: B::Pipeline,
    permutation: Option<B::Buffer>,
}

/// The active format. Replaced as a whole on every format change; its GPU
/// resources are built on the first draw that needs them.
struct FormatBundle<B: GpuBackend> {
    descriptor: PixelFormatDescriptor,
    resources: Option<FormatResources<B>>,
}

impl<B: GpuBackend> FormatBundle<B> {
    fn new(descriptor: PixelFormatDescriptor) -> Self {
        Self {
            descriptor,
            resources: None,
        }
    }

    fn configure(
        backend: &mut B,
        descriptor: &PixelFormatDescriptor,
    ) -> Result<FormatResources<B>, RendererError> {
        let pipeline = backend.create_pipeline(descriptor.pipeline_key())?;
        let permutation = if descriptor.needs_permutation() {
            Some(backend.create_buffer(
                "frame-renderer.permutation",
                BufferRole::Uniform,
                bytemuck::cast_slice(&descriptor.permutation_uniform()),
            )?)
        } else {
            None
        };
        Ok(FormatResources {
            pipeline,
            permutation,
        })
    }
}

struct VertexState<B: GpuBackend> {
    buffer: B::Buffer,
    generation: u64,
}

pub type PendingFrame = Box<dyn FrameSource>;

struct Inner<B: GpuBackend> {
    backend: Option<B>,
    device: Option<DeviceResources<B>>,
    format: Option<FormatBundle<B>>,
    source_size: Option<Size>,
    viewport: Option<Size>,
    content_mode: ContentMode,
    geometry: GeometryCache,
    vertices: Option<VertexState<B>>,
    planes: PlaneTextureSet<B::Texture>,
    phase: RendererPhase,
    pending: FrameMailbox<PendingFrame>,
    frames_drawn: u64,
}

impl<B: GpuBackend> Inner<B> {
    fn leave_empty(&mut self) {
        if self.phase == RendererPhase::Empty {
            self.phase = RendererPhase::Configuring;
        }
    }

    fn refresh_geometry(&mut self) -> bool {
        self.geometry
            .update(self.content_mode, self.source_size, self.viewport)
    }

    fn ensure_device_resources(&mut self) -> Result<(), RendererError> {
        if self.device.is_some() {
            return Ok(());
        }
        let backend = self.backend.as_mut().ok_or(RendererError::DeviceUnavailable)?;
        match DeviceResources::create(backend) {
            Ok(resources) => {
                self.device = Some(resources);
                Ok(())
            }
            Err(err) => {
                error!(context = "device", error = %err, "color transform buffers unavailable");
                Err(err)
            }
        }
    }

    fn set_pixel_format(&mut self, id: FormatId) -> Result<(), RendererError> {
        if self.format.as_ref().map(|f| f.descriptor.id()) == Some(id) {
            return Ok(());
        }
        let descriptor = resolve(id).map_err(|err| {
            warn!(context = "format", format = %id, "unsupported pixel format, keeping previous configuration");
            err
        })?;
        self.install_format(descriptor);
        Ok(())
    }

    fn install_format(&mut self, descriptor: PixelFormatDescriptor) {
        debug!(
            context = "format",
            format = %descriptor.id(),
            program = descriptor.program.id(),
            planes = descriptor.plane_count(),
            "pixel format changed"
        );
        self.format = Some(FormatBundle::new(descriptor));
        // Slots of the previous format must never be bound with the new one.
        self.planes.clear();
        self.phase = RendererPhase::Configuring;
    }

    fn set_source_size(&mut self, size: Size) {
        if self.source_size == Some(size) {
            return;
        }
        self.source_size = Some(size);
        self.refresh_geometry();
        // Existing textures were sized for the previous source.
        self.phase = RendererPhase::Configuring;
    }

    fn submit(&mut self, frame: &dyn FrameSource) -> Result<(), RendererError> {
        let id = frame.pixel_format_identifier();
        let descriptor = match &self.format {
            Some(bundle) if bundle.descriptor.id() == id => bundle.descriptor,
            _ => resolve(id).map_err(|err| {
                warn!(context = "frame", format = %id, "dropping frame with unsupported pixel format");
                err
            })?,
        };

        let expected = descriptor.plane_count();
        let found = frame.effective_plane_count();
        if found < expected {
            warn!(context = "frame", format = %id, expected, found, "frame is missing planes");
            return Err(RendererError::MissingPlanes { expected, found });
        }

        let Some(backend) = self.backend.as_mut() else {
            warn!(context = "frame", "no backend attached, dropping frame");
            return Err(RendererError::DeviceUnavailable);
        };

        let mut textures = Vec::with_capacity(expected);
        for (plane, spec) in descriptor.planes().iter().enumerate() {
            let extent = (frame.width_of_plane(plane), frame.height_of_plane(plane));
            match backend.materialize(frame, plane, extent, spec.layout) {
                Ok(texture) => textures.push(texture),
                Err(err) => {
                    warn!(context = "frame", plane, error = %err, "plane materialization failed, frame skipped");
                    return Err(err);
                }
            }
        }
        let planes = PlaneTextureSet::from_textures(textures)?;

        // Commit: nothing above touched the renderer state.
        if self.format.as_ref().map(|f| f.descriptor.id()) != Some(id) {
            self.install_format(descriptor);
        }
        let (width, height) = frame.dimensions();
        self.set_source_size(Size::new(width, height));
        self.planes = planes;
        self.phase = RendererPhase::Ready;
        self.draw()
    }

    fn draw(&mut self) -> Result<(), RendererError> {
        if let Err(err) = self.check_ready() {
            warn!(context = "draw", error = %err, "skipping draw");
            return Err(err);
        }
        self.ensure_device_resources()?;

        let generation = self.geometry.generation();
        let Inner {
            backend,
            device,
            format,
            geometry,
            vertices,
            planes,
            frames_drawn,
            ..
        } = &mut *self;
        let (Some(backend), Some(device), Some(format), Some(geometry)) =
            (backend.as_mut(), device.as_ref(), format.as_mut(), geometry.geometry())
        else {
            return Err(RendererError::IncompleteFrame("draw state"));
        };

        if format.resources.is_none() {
            match FormatBundle::configure(backend, &format.descriptor) {
                Ok(resources) => format.resources = Some(resources),
                Err(err) => {
                    error!(context = "device", format = %format.descriptor.id(), error = %err, "pipeline unavailable");
                    return Err(err);
                }
            }
        }

        if vertices.as_ref().map(|v| v.generation) != Some(generation) {
            match backend.create_buffer(
                "frame-renderer.vertices",
                BufferRole::Vertex,
                geometry.vertex_bytes(),
            ) {
                Ok(buffer) => *vertices = Some(VertexState { buffer, generation }),
                Err(err) => {
                    error!(context = "device", error = %err, "vertex buffer unavailable");
                    return Err(err);
                }
            }
        }

        let (Some(resources), Some(vertex_state)) = (format.resources.as_ref(), vertices.as_ref())
        else {
            return Err(RendererError::IncompleteFrame("draw resources"));
        };
        let descriptor = &format.descriptor;
        let call: DrawCall<'_, B> = DrawCall {
            key: descriptor.pipeline_key(),
            pipeline: &resources.pipeline,
            vertex_buffer: &vertex_state.buffer,
            vertex_count: 4,
            planes,
            permutation: resources.permutation.as_ref(),
            color_transform: descriptor.color_range.map(|range| device.transform(range)),
        };

        let span = info_span!("frame_renderer.draw", format = %descriptor.id(), planes = planes.len());
        let _guard = span.enter();
        backend.draw(&call).map_err(|err| {
            error!(context = "draw", error = %err, "draw failed");
            err
        })?;
        *frames_drawn += 1;
        Ok(())
    }

    fn check_ready(&self) -> Result<(), RendererError> {
        if self.phase != RendererPhase::Ready {
            return Err(RendererError::IncompleteFrame("renderer is not ready"));
        }
        let Some(format) = &self.format else {
            return Err(RendererError::IncompleteFrame("no pixel format"));
        };
        if self.planes.get(0).is_none() {
            return Err(RendererError::IncompleteFrame("plane 0 texture missing"));
        }
        if !self.planes.is_complete(format.descriptor.plane_count()) {
            return Err(RendererError::IncompleteFrame("plane textures incomplete"));
        }
        if self.source_size.is_none() {
            return Err(RendererError::IncompleteFrame("source size unknown"));
        }
        if self.geometry.geometry().is_none() {
            return Err(RendererError::IncompleteFrame("no geometry"));
        }
        if self.backend.is_none() {
            return Err(RendererError::DeviceUnavailable);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.format = None;
        self.source_size = None;
        self.geometry.clear();
        self.vertices = None;
        self.planes.clear();
        self.pending.clear();
        self.phase = RendererPhase::Empty;
        if let Some(backend) = self.backend.as_mut() {
            backend.flush_texture_cache();
        }
    }
}

/// Displays decoded frames of any supported pixel format through a
/// [`GpuBackend`]. Safe to share between a producer and a render thread.
pub struct FrameRenderer<B: GpuBackend> {
    inner: Mutex<Inner<B>>,
}

impl<B: GpuBackend> FrameRenderer<B> {
    pub fn new(backend: B, config: &RendererConfig) -> Self {
        let renderer = Self::detached(config);
        renderer.attach_backend(backend);
        renderer
    }

    /// A renderer without a device. Frames are rejected until
    /// [`attach_backend`](Self::attach_backend) is called.
    pub fn detached(config: &RendererConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                backend: None,
                device: None,
                format: None,
                source_size: None,
                viewport: None,
                content_mode: config.content_mode,
                geometry: GeometryCache::new(),
                vertices: None,
                planes: PlaneTextureSet::new(),
                phase: RendererPhase::Empty,
                pending: FrameMailbox::new(),
                frames_drawn: 0,
            }),
        }
    }

    /// Installs a (new) device. Everything created on the previous device is
    /// dropped; the current frame has to be submitted again.
    pub fn attach_backend(&self, backend: B) -> Option<B> {
        let mut inner = self.inner.lock();
        let previous = inner.backend.replace(backend);
        inner.device = None;
        inner.vertices = None;
        if let Some(format) = inner.format.as_mut() {
            format.resources = None;
        }
        if !inner.planes.is_empty() {
            inner.planes.clear();
            inner.phase = RendererPhase::Configuring;
        }
        if let (Some(viewport), Some(backend)) = (inner.viewport, inner.backend.as_mut()) {
            if let Err(err) = backend.resize_drawable(viewport) {
                warn!(context = "device", error = %err, "drawable resize failed");
            }
        }
        if inner.ensure_device_resources().is_err() {
            debug!(context = "device", "device resources deferred to the next draw");
        }
        previous
    }

    pub fn detach_backend(&self) -> Option<B> {
        let mut inner = self.inner.lock();
        inner.device = None;
        inner.vertices = None;
        if let Some(format) = inner.format.as_mut() {
            format.resources = None;
        }
        inner.planes.clear();
        if inner.phase == RendererPhase::Ready {
            inner.phase = RendererPhase::Configuring;
        }
        inner.backend.take()
    }

    /// Selects the pixel format of upcoming frames. An unsupported identifier
    /// is logged and leaves the current configuration untouched.
    pub fn set_pixel_format(&self, id: FormatId) -> Result<(), RendererError> {
        self.inner.lock().set_pixel_format(id)
    }

    pub fn set_source_size(&self, size: Size) {
        let mut inner = self.inner.lock();
        inner.leave_empty();
        inner.set_source_size(size);
    }

    /// Updates the drawable size. A zero-sized drawable suspends geometry.
    pub fn set_viewport(&self, size: Size) {
        let mut inner = self.inner.lock();
        let viewport = (!size.is_empty()).then_some(size);
        if inner.viewport == viewport {
            return;
        }
        inner.viewport = viewport;
        inner.leave_empty();
        if let (Some(viewport), Some(backend)) = (viewport, inner.backend.as_mut()) {
            if let Err(err) = backend.resize_drawable(viewport) {
                warn!(context = "device", error = %err, "drawable resize failed");
            }
        }
        inner.refresh_geometry();
    }

    pub fn set_content_mode(&self, mode: ContentMode) {
        let mut inner = self.inner.lock();
        if inner.content_mode == mode {
            return;
        }
        inner.content_mode = mode;
        inner.leave_empty();
        inner.refresh_geometry();
    }

    /// Materializes every plane of `frame` and draws it. Any failure skips
    /// this frame and leaves the previous state in place.
    #[instrument(name = "frame_renderer.submit", skip_all, fields(format = %frame.pixel_format_identifier()))]
    pub fn submit_frame(&self, frame: &dyn FrameSource) -> Result<(), RendererError> {
        self.inner.lock().submit(frame)
    }

    /// Redraws the current frame.
    pub fn draw(&self) -> Result<(), RendererError> {
        self.inner.lock().draw()
    }

    /// Drops all frame state and flushes the backend's texture cache.
    pub fn reset(&self) {
        self.inner.lock().reset();
    }

    /// Parks `frame` for the render side. A frame still waiting is replaced
    /// and handed back.
    pub fn enqueue(&self, frame: impl FrameSource + 'static) -> Option<PendingFrame> {
        let superseded = self.inner.lock().pending.post(Box::new(frame));
        if superseded.is_some() {
            debug!(context = "frame", "pending frame superseded");
        }
        superseded
    }

    /// Submits the parked frame, if any.
    pub fn render_pending(&self) -> Option<Result<(), RendererError>> {
        let mut inner = self.inner.lock();
        let frame = inner.pending.take()?;
        Some(inner.submit(frame.as_ref()))
    }

    pub fn phase(&self) -> RendererPhase {
        self.inner.lock().phase
    }

    pub fn snapshot(&self) -> RendererSnapshot {
        let inner = self.inner.lock();
        RendererSnapshot {
            phase: inner.phase,
            format: inner.format.as_ref().map(|f| f.descriptor.id()),
            pipeline: inner.format.as_ref().map(|f| f.descriptor.pipeline_key()),
            source_size: inner.source_size,
            viewport: inner.viewport,
            content_mode: inner.content_mode,
            sample_rect: inner.geometry.geometry().map(|g| g.sample_rect),
            active_planes: inner.planes.len(),
            occupied_planes: inner.planes.occupied(),
            geometry_generation: inner.geometry.generation(),
            frames_drawn: inner.frames_drawn,
            frame_pending: inner.pending.is_pending(),
            frames_superseded: inner.pending.superseded(),
            backend_attached: inner.backend.is_some(),
        }
    }

    /// Runs `f` against the current plane textures under the state lock.
    pub fn inspect_planes<R>(&self, f: impl FnOnce(&PlaneTextureSet<B::Texture>) -> R) -> R {
        f(&self.inner.lock().planes)
    }

    /// Runs `f` against the attached backend under the state lock.
    pub fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> Option<R> {
        self.inner.lock().backend.as_mut().map(f)
    }
}
