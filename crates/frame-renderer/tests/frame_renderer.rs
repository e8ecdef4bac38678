use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::thread;

use frame_renderer::geometry::compute_vertices;
use frame_renderer::{
    BufferRole, ContentMode, DrawCall, FormatId, FrameRenderer,
    FrameSource, GpuBackend, PipelineKey, PixelBuffer, PixelFormat, RendererConfig,
    RendererError, RendererPhase, SampleRect, ShadingProgram, Size, TexelLayout,
};
use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

/// A pooled texture; `tag` is the first byte of the last upload into it.
#[derive(Debug)]
struct MockTexture {
    plane: usize,
    extent: (u32, u32),
    layout: TexelLayout,
    tag: Mutex<u8>,
}

impl MockTexture {
    fn tag(&self) -> u8 {
        *self.tag.lock()
    }
}

/// What a draw saw in one bound plane.
#[derive(Debug, Clone, PartialEq)]
struct BoundPlane {
    plane: usize,
    extent: (u32, u32),
    layout: TexelLayout,
    tag: u8,
}

#[derive(Debug, Clone, PartialEq)]
struct MockBuffer {
    role: BufferRole,
    bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
struct DrawRecord {
    key: PipelineKey,
    planes: Vec<BoundPlane>,
    permutation: Option<Vec<u8>>,
    color_matrix: Option<Vec<u8>>,
    vertex_count: u32,
    vertices: Vec<u8>,
}

#[derive(Debug, Default)]
struct RecordingBackend {
    fail_plane: Option<usize>,
    fail_pipeline: bool,
    fail_buffers: bool,
    pool: HashMap<(usize, (u32, u32)), Vec<Arc<MockTexture>>>,
    allocated: usize,
    draws: Vec<DrawRecord>,
    pipelines: Vec<PipelineKey>,
    materialized: usize,
    flushes: usize,
    mixed_draws: usize,
}

impl GpuBackend for RecordingBackend {
    type Texture = Arc<MockTexture>;
    type Buffer = MockBuffer;
    type Pipeline = PipelineKey;

    fn create_buffer(
        &mut self,
        _label: &str,
        role: BufferRole,
        contents: &[u8],
    ) -> Result<MockBuffer, RendererError> {
        if self.fail_buffers {
            return Err(RendererError::ResourceCreation("injected".into()));
        }
        Ok(MockBuffer {
            role,
            bytes: contents.to_vec(),
        })
    }

    fn create_pipeline(&mut self, key: PipelineKey) -> Result<PipelineKey, RendererError> {
        if self.fail_pipeline {
            return Err(RendererError::ShaderCompilation(key.label()));
        }
        self.pipelines.push(key);
        Ok(key)
    }

    fn materialize(
        &mut self,
        source: &dyn FrameSource,
        plane: usize,
        extent: (u32, u32),
        layout: TexelLayout,
    ) -> Result<Arc<MockTexture>, RendererError> {
        if self.fail_plane == Some(plane) {
            return Err(RendererError::MaterializeFailed {
                plane,
                reason: "injected".into(),
            });
        }
        self.materialized += 1;
        let tag = source
            .plane_bytes(plane)
            .and_then(|bytes| bytes.first().copied())
            .unwrap_or(0);
        // Same reuse rule as the wgpu backend: only textures no plane set holds.
        let pool = self.pool.entry((plane, extent)).or_default();
        let texture = match pool.iter().find(|t| Arc::strong_count(t) == 1) {
            Some(free) => free.clone(),
            None => {
                self.allocated += 1;
                let texture = Arc::new(MockTexture {
                    plane,
                    extent,
                    layout,
                    tag: Mutex::new(0),
                });
                pool.push(texture.clone());
                texture
            }
        };
        *texture.tag.lock() = tag;
        Ok(texture)
    }

    fn flush_texture_cache(&mut self) {
        self.flushes += 1;
        self.pool.clear();
    }

    fn draw(&mut self, call: &DrawCall<'_, Self>) -> Result<(), RendererError> {
        let planes: Vec<BoundPlane> = call
            .planes
            .active()
            .map(|t| BoundPlane {
                plane: t.plane,
                extent: t.extent,
                layout: t.layout,
                tag: t.tag(),
            })
            .collect();
        if planes.windows(2).any(|pair| pair[0].tag != pair[1].tag) {
            self.mixed_draws += 1;
        }
        assert_eq!(*call.pipeline, call.key);
        assert_eq!(call.vertex_buffer.role, BufferRole::Vertex);
        self.draws.push(DrawRecord {
            key: call.key,
            planes,
            permutation: call.permutation.map(|b| b.bytes.clone()),
            color_matrix: call.color_transform.map(|t| t.matrix.bytes.clone()),
            vertex_count: call.vertex_count,
            vertices: call.vertex_buffer.bytes.clone(),
        });
        Ok(())
    }
}

fn frame(format: PixelFormat, width: u32, height: u32, tag: u8) -> PixelBuffer {
    let mut frame = PixelBuffer::allocate(format.id(), width, height).unwrap();
    for plane in &mut frame.planes {
        plane.data.fill(tag);
    }
    frame
}

fn renderer() -> FrameRenderer<RecordingBackend> {
    let renderer = FrameRenderer::new(RecordingBackend::default(), &RendererConfig::default());
    renderer.set_viewport(Size::new(200, 200));
    renderer
}

fn draws(renderer: &FrameRenderer<RecordingBackend>) -> Vec<DrawRecord> {
    renderer.with_backend(|b| b.draws.clone()).unwrap()
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn lines_with(&self, level: &str) -> usize {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .filter(|line| line.contains(level))
            .count()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn with_captured_logs<R>(f: impl FnOnce() -> R) -> (R, CapturedLogs) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, logs)
}

#[test]
fn biplanar_video_frame_binds_two_planes_and_video_transform() {
    let renderer = renderer();
    renderer
        .submit_frame(&frame(PixelFormat::YCbCr420BiPlanarVideo, 64, 64, 7))
        .unwrap();

    let draws = draws(&renderer);
    assert_eq!(draws.len(), 1);
    let draw = &draws[0];
    assert_eq!(draw.key.program, ShadingProgram::YCbCrBiPlanar);
    assert!(draw.key.color_transform);
    assert_eq!(draw.vertex_count, 4);
    assert_eq!(draw.planes.len(), 2);
    assert_eq!(draw.planes[0].extent, (64, 64));
    assert_eq!(draw.planes[0].layout, TexelLayout::Luma8);
    assert_eq!(draw.planes[1].extent, (32, 32));
    assert_eq!(draw.planes[1].layout, TexelLayout::Chroma88);
    assert_eq!(draw.planes[1].plane, 1);
    assert!(draw.permutation.is_none());

    let video = frame_renderer::ColorRange::Video.transform();
    assert_eq!(draw.color_matrix.as_deref(), Some(video.matrix_bytes()));
    assert_eq!(renderer.phase(), RendererPhase::Ready);
}

#[test]
fn centered_source_yields_expected_rect_and_vertices() {
    let renderer = renderer();
    renderer.set_content_mode(ContentMode::Center);
    renderer
        .submit_frame(&frame(PixelFormat::Rgba32, 100, 50, 1))
        .unwrap();

    let expected = SampleRect {
        x: 0.25,
        y: 0.375,
        width: 0.5,
        height: 0.25,
    };
    assert_eq!(renderer.snapshot().sample_rect, Some(expected));
    let vertices = compute_vertices(&expected);
    assert_eq!(draws(&renderer)[0].vertices, bytemuck::cast_slice::<_, u8>(&vertices));
}

#[test]
fn unsupported_frame_is_skipped_with_one_diagnostic() {
    let renderer = renderer();
    renderer
        .submit_frame(&frame(PixelFormat::Bgra32, 16, 16, 3))
        .unwrap();
    let before = renderer.snapshot();

    let bogus = PixelBuffer::new(FormatId(0xdead_beef), frame(PixelFormat::Bgra32, 16, 16, 9).planes);
    let (result, logs) = with_captured_logs(|| renderer.submit_frame(&bogus));

    assert!(matches!(result, Err(RendererError::UnsupportedFormat(id)) if id == FormatId(0xdead_beef)));
    assert_eq!(renderer.snapshot(), before);
    assert_eq!(draws(&renderer).len(), 1);
    assert_eq!(logs.lines_with("WARN"), 1);
}

#[test]
fn unsupported_format_change_keeps_previous_configuration() {
    let renderer = renderer();
    renderer.set_pixel_format(PixelFormat::Rgb24.id()).unwrap();
    let before = renderer.snapshot();
    assert!(renderer.set_pixel_format(FormatId(42)).is_err());
    assert_eq!(renderer.snapshot(), before);
}

#[test]
fn reset_never_interleaves_with_frame_transactions() {
    let renderer = Arc::new(renderer());

    let producer = {
        let renderer = renderer.clone();
        thread::spawn(move || {
            for i in 0..200u32 {
                let tag = (i % 250) as u8 + 1;
                let _ = renderer.submit_frame(&frame(PixelFormat::YCbCr420Planar, 8, 8, tag));
            }
        })
    };
    let resetter = {
        let renderer = renderer.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                renderer.reset();
                renderer.inspect_planes(|planes| {
                    let tags: Vec<u8> = planes.active().map(|t| t.tag()).collect();
                    assert!(tags.is_empty() || tags.len() == 3);
                    assert!(tags.windows(2).all(|w| w[0] == w[1]));
                });
            }
        })
    };
    producer.join().unwrap();
    resetter.join().unwrap();

    assert_eq!(renderer.with_backend(|b| b.mixed_draws).unwrap(), 0);
    renderer.reset();
    let snapshot = renderer.snapshot();
    assert_eq!(snapshot.phase, RendererPhase::Empty);
    assert_eq!(snapshot.occupied_planes, 0);
}

#[test]
fn repeated_content_mode_does_not_recompute_geometry() {
    let renderer = renderer();
    renderer.set_source_size(Size::new(320, 240));
    renderer.set_content_mode(ContentMode::ScaleAspectFill);
    let generation = renderer.snapshot().geometry_generation;
    renderer.set_content_mode(ContentMode::ScaleAspectFill);
    assert_eq!(renderer.snapshot().geometry_generation, generation);
    renderer.set_content_mode(ContentMode::Center);
    assert_eq!(renderer.snapshot().geometry_generation, generation + 1);
}

#[test]
fn format_change_clears_every_plane_slot() {
    let renderer = renderer();
    renderer
        .submit_frame(&frame(PixelFormat::YCbCr420Planar, 16, 16, 5))
        .unwrap();
    assert_eq!(renderer.snapshot().occupied_planes, 3);

    renderer.set_pixel_format(PixelFormat::Bgra32.id()).unwrap();
    let snapshot = renderer.snapshot();
    assert_eq!(snapshot.occupied_planes, 0);
    assert_eq!(snapshot.phase, RendererPhase::Configuring);
    assert!(matches!(renderer.draw(), Err(RendererError::IncompleteFrame(_))));

    renderer
        .submit_frame(&frame(PixelFormat::Bgra32, 16, 16, 6))
        .unwrap();
    let last = draws(&renderer).pop().unwrap();
    assert_eq!(last.planes.len(), 1);
}

#[test]
fn failed_plane_leaves_previous_frame_in_place() {
    let renderer = renderer();
    renderer
        .submit_frame(&frame(PixelFormat::YCbCr420BiPlanarFull, 32, 32, 1))
        .unwrap();
    let before = renderer.snapshot();

    renderer.with_backend(|b| b.fail_plane = Some(1));
    let result = renderer.submit_frame(&frame(PixelFormat::YCbCr420Planar, 64, 64, 2));
    assert!(matches!(result, Err(RendererError::MaterializeFailed { plane: 1, .. })));
    assert_eq!(renderer.snapshot(), before);
    renderer.inspect_planes(|planes| {
        assert!(planes.active().all(|t| t.tag() == 1));
    });

    // The retained frame still draws.
    renderer.with_backend(|b| b.fail_plane = None);
    renderer.draw().unwrap();
    assert_eq!(draws(&renderer).len(), 2);
}

#[test]
fn failed_frame_never_writes_into_displayed_textures() {
    let renderer = renderer();
    renderer
        .submit_frame(&frame(PixelFormat::YCbCr420BiPlanarFull, 16, 16, 50))
        .unwrap();

    // Same format and size, so every plane maps to an already pooled texture.
    renderer.with_backend(|b| b.fail_plane = Some(1));
    assert!(renderer
        .submit_frame(&frame(PixelFormat::YCbCr420BiPlanarFull, 16, 16, 250))
        .is_err());
    renderer.inspect_planes(|planes| {
        assert_eq!(planes.active().map(|t| t.tag()).collect::<Vec<_>>(), [50, 50]);
    });

    renderer.with_backend(|b| b.fail_plane = None);
    renderer.draw().unwrap();
    let last = draws(&renderer).pop().unwrap();
    assert!(last.planes.iter().all(|p| p.tag == 50), "{:?}", last.planes);
}

#[test]
fn released_textures_are_recycled() {
    let renderer = renderer();
    for tag in 1..=6 {
        renderer
            .submit_frame(&frame(PixelFormat::YCbCr420BiPlanarVideo, 8, 8, tag))
            .unwrap();
    }
    // One texture on screen and one being filled, per plane.
    assert_eq!(renderer.with_backend(|b| b.allocated).unwrap(), 4);
    let tags: Vec<u8> = draws(&renderer).iter().map(|d| d.planes[0].tag).collect();
    assert_eq!(tags, [1, 2, 3, 4, 5, 6]);
    assert_eq!(renderer.with_backend(|b| b.mixed_draws).unwrap(), 0);
}

#[test]
fn device_resources_failing_at_attach_are_retried_on_draw() {
    let renderer: FrameRenderer<RecordingBackend> = FrameRenderer::detached(&RendererConfig::default());
    renderer.set_viewport(Size::new(8, 8));
    let backend = RecordingBackend {
        fail_buffers: true,
        ..RecordingBackend::default()
    };
    let (_, logs) = with_captured_logs(|| renderer.attach_backend(backend));
    assert_eq!(logs.lines_with("ERROR"), 1);

    assert!(matches!(
        renderer.submit_frame(&frame(PixelFormat::Rgba32, 4, 4, 1)),
        Err(RendererError::ResourceCreation(_))
    ));
    assert!(draws(&renderer).is_empty());

    renderer.with_backend(|b| b.fail_buffers = false);
    renderer.draw().unwrap();
    assert_eq!(draws(&renderer).len(), 1);
}

#[test]
fn frames_missing_planes_are_rejected() {
    let renderer = renderer();
    let mut partial = frame(PixelFormat::YCbCr420BiPlanarVideo, 8, 8, 1);
    partial.planes.truncate(1);
    assert!(matches!(
        renderer.submit_frame(&partial),
        Err(RendererError::MissingPlanes { expected: 2, found: 1 })
    ));
    assert_eq!(renderer.phase(), RendererPhase::Configuring);
}

#[test]
fn drawing_without_a_frame_is_skipped() {
    let renderer = renderer();
    let (result, logs) = with_captured_logs(|| renderer.draw());
    assert!(matches!(result, Err(RendererError::IncompleteFrame(_))));
    assert_eq!(logs.lines_with("WARN"), 1);
    assert!(draws(&renderer).is_empty());
}

#[test]
fn bgra_binds_its_permutation() {
    let renderer = renderer();
    renderer
        .submit_frame(&frame(PixelFormat::Bgra32, 4, 4, 1))
        .unwrap();
    let draw = draws(&renderer).remove(0);
    assert_eq!(draw.key.program, ShadingProgram::RgbaPermute);
    assert!(!draw.key.color_transform);
    let expected: Vec<u8> = [2u32, 1, 0, 3].iter().flat_map(|v| v.to_le_bytes()).collect();
    assert_eq!(draw.permutation, Some(expected));
    assert!(draw.color_matrix.is_none());
}

#[test]
fn pipelines_are_compiled_once_per_format() {
    let renderer = renderer();
    for tag in 0..3 {
        renderer
            .submit_frame(&frame(PixelFormat::YCbCr422, 8, 8, tag))
            .unwrap();
    }
    let pipelines = renderer.with_backend(|b| b.pipelines.clone()).unwrap();
    assert_eq!(pipelines.len(), 1);
    assert_eq!(pipelines[0].program, ShadingProgram::YCbCr422);
}

#[test]
fn pipeline_failure_is_retried_on_next_draw() {
    let renderer = renderer();
    renderer.with_backend(|b| b.fail_pipeline = true);
    let result = renderer.submit_frame(&frame(PixelFormat::Rgb24, 8, 8, 1));
    assert!(matches!(result, Err(RendererError::ShaderCompilation(_))));
    assert!(draws(&renderer).is_empty());

    renderer.with_backend(|b| b.fail_pipeline = false);
    renderer.draw().unwrap();
    assert_eq!(draws(&renderer).len(), 1);
}

#[test]
fn reset_flushes_backend_cache_and_pending_frame() {
    let renderer = renderer();
    renderer
        .submit_frame(&frame(PixelFormat::Rgba32, 8, 8, 1))
        .unwrap();
    renderer.enqueue(frame(PixelFormat::Rgba32, 8, 8, 2));
    renderer.reset();

    let snapshot = renderer.snapshot();
    assert_eq!(snapshot.phase, RendererPhase::Empty);
    assert_eq!(snapshot.format, None);
    assert_eq!(snapshot.source_size, None);
    assert!(!snapshot.frame_pending);
    assert_eq!(renderer.with_backend(|b| b.flushes).unwrap(), 1);
    assert!(renderer.render_pending().is_none());
}

#[test]
fn mailbox_keeps_only_the_latest_frame() {
    let renderer = renderer();
    assert!(renderer.enqueue(frame(PixelFormat::Rgba32, 8, 8, 1)).is_none());
    let superseded = renderer.enqueue(frame(PixelFormat::Rgba32, 8, 8, 2));
    assert!(superseded.is_some());
    assert_eq!(renderer.snapshot().frames_superseded, 1);

    renderer.render_pending().unwrap().unwrap();
    assert!(renderer.render_pending().is_none());
    let draws = draws(&renderer);
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].planes[0].tag, 2);
}

#[test]
fn detached_renderer_rejects_frames() {
    let renderer: FrameRenderer<RecordingBackend> = FrameRenderer::detached(&RendererConfig::default());
    renderer.set_viewport(Size::new(10, 10));
    assert!(matches!(
        renderer.submit_frame(&frame(PixelFormat::Rgba32, 4, 4, 1)),
        Err(RendererError::DeviceUnavailable)
    ));

    renderer.attach_backend(RecordingBackend::default());
    renderer
        .submit_frame(&frame(PixelFormat::Rgba32, 4, 4, 1))
        .unwrap();
    assert!(renderer.snapshot().backend_attached);
}

#[test]
fn zero_viewport_suspends_drawing() {
    let renderer = renderer();
    renderer
        .submit_frame(&frame(PixelFormat::Rgba32, 4, 4, 1))
        .unwrap();
    renderer.set_viewport(Size::new(0, 0));
    assert!(renderer.snapshot().sample_rect.is_none());
    assert!(renderer.draw().is_err());

    renderer.set_viewport(Size::new(50, 50));
    renderer.draw().unwrap();
    assert_eq!(draws(&renderer).len(), 2);
}
