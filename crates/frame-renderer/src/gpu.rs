//! wgpu implementation of [`GpuBackend`].

use std::collections::HashMap;
use std::sync::mpsc::{channel, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info_span, instrument};

use crate::backend::{BufferRole, DrawCall, GpuBackend, PipelineKey};
use crate::config::{RendererConfig, TargetFormat};
use crate::cpu::{expand_rgb16_rows, plane_data, CpuFrame};
use crate::format::{ShadingProgram, TexelLayout};
use crate::frame::FrameSource;
use crate::geometry::{Size, Vertex};
use crate::RendererError;

const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
const SAMPLER_BINDING: u32 = 3;

const QUAD_VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 2] = [
    wgpu::VertexAttribute {
        offset: 0,
        shader_location: 0,
        format: wgpu::VertexFormat::Float32x4,
    },
    wgpu::VertexAttribute {
        offset: std::mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
        shader_location: 1,
        format: wgpu::VertexFormat::Float32x2,
    },
];

fn quad_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &QUAD_VERTEX_ATTRIBUTES,
    }
}

/// Where draws land.
pub enum RenderTarget {
    /// A window surface, configured on every drawable resize.
    Surface(wgpu::Surface<'static>),
    /// A texture owned by the backend, readable with
    /// [`WgpuBackend::read_target`].
    Offscreen,
}

enum TargetState {
    Surface {
        surface: wgpu::Surface<'static>,
        config: Option<wgpu::SurfaceConfiguration>,
    },
    Offscreen {
        texture: Option<wgpu::Texture>,
    },
}

/// A materialized plane.
#[derive(Debug, Clone)]
pub struct PlaneTexture {
    pub texture: Arc<wgpu::Texture>,
    pub view: Arc<wgpu::TextureView>,
    pub format: wgpu::TextureFormat,
    pub extent: (u32, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TextureKey {
    plane: usize,
    format: wgpu::TextureFormat,
    extent: (u32, u32),
}

#[derive(Debug)]
pub struct CompiledPipeline {
    key: PipelineKey,
    pipeline: wgpu::RenderPipeline,
    textures_layout: wgpu::BindGroupLayout,
    uniforms_layout: Option<wgpu::BindGroupLayout>,
    texture_count: usize,
}

impl CompiledPipeline {
    pub fn key(&self) -> PipelineKey {
        self.key
    }
}

fn texture_count(program: ShadingProgram) -> usize {
    match program {
        ShadingProgram::YCbCrPlanar => 3,
        ShadingProgram::YCbCrBiPlanar => 2,
        _ => 1,
    }
}

fn requires_transform(program: ShadingProgram) -> bool {
    matches!(
        program,
        ShadingProgram::YCbCrPlanar | ShadingProgram::YCbCrBiPlanar | ShadingProgram::YCbCr422
    )
}

fn fragment_source(key: PipelineKey) -> &'static str {
    match key.program {
        ShadingProgram::PassthroughRgba => include_str!("shaders/passthrough.wgsl"),
        ShadingProgram::Rgb24Expand => include_str!("shaders/rgb24.wgsl"),
        ShadingProgram::YCbCrPlanar => include_str!("shaders/ycbcr_planar.wgsl"),
        ShadingProgram::YCbCrBiPlanar => include_str!("shaders/ycbcr_biplanar.wgsl"),
        ShadingProgram::YCbCr422 => include_str!("shaders/ycbcr_422.wgsl"),
        ShadingProgram::RgbaPermute if key.color_transform => {
            include_str!("shaders/rgba_permute_ycbcr.wgsl")
        }
        ShadingProgram::RgbaPermute => include_str!("shaders/rgba_permute.wgsl"),
    }
}

/// GPU texture format a plane of `layout` is uploaded as.
pub fn texture_format(layout: TexelLayout) -> wgpu::TextureFormat {
    match layout {
        TexelLayout::Luma8 | TexelLayout::Rgb24 => wgpu::TextureFormat::R8Unorm,
        TexelLayout::Chroma88 => wgpu::TextureFormat::Rg8Unorm,
        TexelLayout::Rgba8 | TexelLayout::Packed422 | TexelLayout::Rgb16(_) => {
            wgpu::TextureFormat::Rgba8Unorm
        }
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: TargetState,
    target_format: wgpu::TextureFormat,
    present_mode: wgpu::PresentMode,
    clear_color: wgpu::Color,
    sampler: wgpu::Sampler,
    pipelines: HashMap<PipelineKey, Arc<CompiledPipeline>>,
    /// Upload targets per key. A texture still referenced by a live plane
    /// set is never written again.
    textures: HashMap<TextureKey, Vec<Arc<wgpu::Texture>>>,
    drawable: Option<Size>,
}

impl WgpuBackend {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        target: RenderTarget,
        config: &RendererConfig,
    ) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("frame-renderer.sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: config.filter.wgpu(),
            min_filter: config.filter.wgpu(),
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let target = match target {
            RenderTarget::Surface(surface) => TargetState::Surface {
                surface,
                config: None,
            },
            RenderTarget::Offscreen => TargetState::Offscreen { texture: None },
        };
        Self {
            device,
            queue,
            target,
            target_format: config.target_format.wgpu(),
            present_mode: config.present_mode.wgpu(),
            clear_color: config.clear_color(),
            sampler,
            pipelines: HashMap::new(),
            textures: HashMap::new(),
            drawable: None,
        }
    }

    /// Requests a default adapter and device and renders offscreen.
    pub fn headless(config: &RendererConfig) -> Result<Self, RendererError> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(RendererError::DeviceUnavailable)?;
        debug!(context = "device", adapter = ?adapter.get_info().name, "adapter selected");

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("frame-renderer.device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))?;
        Ok(Self::new(device, queue, RenderTarget::Offscreen, config))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }

    pub fn cached_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    pub fn cached_textures(&self) -> usize {
        self.textures.values().map(Vec::len).sum()
    }

    fn compile(&self, key: PipelineKey) -> Result<CompiledPipeline, RendererError> {
        if requires_transform(key.program) && !key.color_transform {
            return Err(RendererError::ResourceCreation(format!(
                "program {} needs a color transform",
                key.program.id()
            )));
        }
        let label = key.label();
        let texture_count = texture_count(key.program);

        let mut texture_entries: Vec<_> = (0..texture_count as u32).map(texture_entry).collect();
        texture_entries.push(wgpu::BindGroupLayoutEntry {
            binding: SAMPLER_BINDING,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
        let textures_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("frame-renderer.{label}.textures")),
                entries: &texture_entries,
            });

        let mut uniform_entries = Vec::new();
        if key.program.uses_permutation() {
            uniform_entries.push(uniform_entry(0));
        }
        if key.color_transform {
            uniform_entries.push(uniform_entry(1));
            uniform_entries.push(uniform_entry(2));
        }
        let uniforms_layout = (!uniform_entries.is_empty()).then(|| {
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&format!("frame-renderer.{label}.uniforms")),
                    entries: &uniform_entries,
                })
        });

        let mut bind_group_layouts = vec![&textures_layout];
        if let Some(layout) = &uniforms_layout {
            bind_group_layouts.push(layout);
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let source = format!(
            "{}\n{}",
            include_str!("shaders/quad.wgsl"),
            fragment_source(key)
        );
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("frame-renderer.{label}.shader")),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("frame-renderer.{label}.layout")),
                bind_group_layouts: &bind_group_layouts,
                push_constant_ranges: &[],
            });
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&format!("frame-renderer.{label}.pipeline")),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_main",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[quad_vertex_layout()],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_main",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.target_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RendererError::ShaderCompilation(format!("{label}: {err}")));
        }

        Ok(CompiledPipeline {
            key,
            pipeline,
            textures_layout,
            uniforms_layout,
            texture_count,
        })
    }

    /// Returns a texture for `key` that no plane set holds, allocating one
    /// when every pooled texture is still in use.
    fn upload_target(&mut self, key: TextureKey) -> Arc<wgpu::Texture> {
        let pool = self.textures.entry(key).or_default();
        if let Some(free) = pool.iter().find(|texture| Arc::strong_count(texture) == 1) {
            return free.clone();
        }
        let texture = Arc::new(self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("frame-renderer.plane{}", key.plane)),
            size: wgpu::Extent3d {
                width: key.extent.0,
                height: key.extent.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: key.format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        }));
        pool.push(texture.clone());
        texture
    }

    fn offscreen_texture(&self, size: Size) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("frame-renderer.offscreen"),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.target_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    /// Copies the offscreen target back to the CPU as RGBA8.
    #[instrument(name = "frame_renderer.read_target", skip_all)]
    pub fn read_target(&self) -> Result<CpuFrame, RendererError> {
        let TargetState::Offscreen {
            texture: Some(texture),
        } = &self.target
        else {
            return Err(RendererError::IncompleteFrame("no offscreen target to read"));
        };
        let (width, height) = (texture.width(), texture.height());
        let row_pitch = align_to(width * 4, COPY_ALIGNMENT);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame-renderer.readback"),
            size: row_pitch as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-renderer.readback.encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(row_pitch),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        loop {
            match rx.try_recv() {
                Ok(Ok(())) => break,
                Ok(Err(_)) | Err(TryRecvError::Disconnected) => {
                    return Err(RendererError::BufferAsync)
                }
                Err(TryRecvError::Empty) => {
                    self.device.poll(wgpu::Maintain::Poll);
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }

        let mapped = slice.get_mapped_range();
        let row_stride = width as usize * 4;
        let mut pixels = vec![0u8; row_stride * height as usize];
        for (row, dst) in pixels.chunks_exact_mut(row_stride).enumerate() {
            let src = row * row_pitch as usize;
            dst.copy_from_slice(&mapped[src..src + row_stride]);
        }
        drop(mapped);
        staging.unmap();

        if self.target_format == TargetFormat::Bgra8Unorm.wgpu() {
            for px in pixels.chunks_exact_mut(4) {
                px.swap(0, 2);
            }
        }
        Ok(CpuFrame {
            pixels,
            width,
            height,
            bytes_per_row: width * 4,
        })
    }
}

impl GpuBackend for WgpuBackend {
    type Texture = PlaneTexture;
    type Buffer = wgpu::Buffer;
    type Pipeline = Arc<CompiledPipeline>;

    fn create_buffer(
        &mut self,
        label: &str,
        role: BufferRole,
        contents: &[u8],
    ) -> Result<wgpu::Buffer, RendererError> {
        use wgpu::util::DeviceExt;

        if contents.is_empty() {
            return Err(RendererError::ResourceCreation(format!("{label}: empty buffer")));
        }
        let usage = match role {
            BufferRole::Vertex => wgpu::BufferUsages::VERTEX,
            BufferRole::Uniform => wgpu::BufferUsages::UNIFORM,
        };
        Ok(self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage,
            }))
    }

    fn create_pipeline(&mut self, key: PipelineKey) -> Result<Arc<CompiledPipeline>, RendererError> {
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline.clone());
        }
        let span = info_span!("frame_renderer.compile", program = key.program.id());
        let _guard = span.enter();
        let pipeline = Arc::new(self.compile(key)?);
        debug!(context = "device", pipeline = %key.label(), "pipeline compiled");
        self.pipelines.insert(key, pipeline.clone());
        Ok(pipeline)
    }

    fn materialize(
        &mut self,
        source: &dyn FrameSource,
        plane: usize,
        extent: (u32, u32),
        layout: TexelLayout,
    ) -> Result<PlaneTexture, RendererError> {
        let (width, height) = extent;
        let (tex_width, tex_height) =
            layout
                .texture_extent(width, height)
                .ok_or_else(|| RendererError::MaterializeFailed {
                    plane,
                    reason: format!("plane extent {width}x{height} overflows"),
                })?;
        let max = self.device.limits().max_texture_dimension_2d;
        if tex_width == 0 || tex_height == 0 || tex_width > max || tex_height > max {
            return Err(RendererError::MaterializeFailed {
                plane,
                reason: format!("texture extent {tex_width}x{tex_height} out of range"),
            });
        }

        let (data, stride) = plane_data(source, plane, layout.row_bytes(width), height)?;
        let expanded;
        let (bytes, bytes_per_row) = match layout {
            TexelLayout::Rgb16(kind) => {
                expanded = expand_rgb16_rows(kind, data, stride, width, height);
                (expanded.as_slice(), width * 4)
            }
            _ => (data, stride as u32),
        };

        let format = texture_format(layout);
        let texture = self.upload_target(TextureKey {
            plane,
            format,
            extent: (tex_width, tex_height),
        });
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(tex_height),
            },
            wgpu::Extent3d {
                width: tex_width,
                height: tex_height,
                depth_or_array_layers: 1,
            },
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(PlaneTexture {
            texture,
            view: Arc::new(view),
            format,
            extent: (tex_width, tex_height),
        })
    }

    fn flush_texture_cache(&mut self) {
        debug!(context = "device", textures = self.cached_textures(), "texture cache flushed");
        self.textures.clear();
    }

    fn resize_drawable(&mut self, size: Size) -> Result<(), RendererError> {
        if size.is_empty() || self.drawable == Some(size) {
            return Ok(());
        }
        let offscreen = match &self.target {
            TargetState::Offscreen { .. } => Some(self.offscreen_texture(size)),
            TargetState::Surface { .. } => None,
        };
        match &mut self.target {
            TargetState::Offscreen { texture } => *texture = offscreen,
            TargetState::Surface { surface, config } => {
                let surface_config = wgpu::SurfaceConfiguration {
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    format: self.target_format,
                    width: size.width,
                    height: size.height,
                    present_mode: self.present_mode,
                    desired_maximum_frame_latency: 2,
                    alpha_mode: wgpu::CompositeAlphaMode::Auto,
                    view_formats: vec![],
                };
                surface.configure(&self.device, &surface_config);
                *config = Some(surface_config);
            }
        }
        self.drawable = Some(size);
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_, Self>) -> Result<(), RendererError> {
        let pipeline = call.pipeline;

        let mut texture_entries = Vec::with_capacity(pipeline.texture_count + 1);
        for plane in 0..pipeline.texture_count {
            let texture = call
                .planes
                .get(plane)
                .ok_or(RendererError::IncompleteFrame("plane textures incomplete"))?;
            texture_entries.push(wgpu::BindGroupEntry {
                binding: plane as u32,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
        }
        texture_entries.push(wgpu::BindGroupEntry {
            binding: SAMPLER_BINDING,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        });
        let textures = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame-renderer.textures"),
            layout: &pipeline.textures_layout,
            entries: &texture_entries,
        });

        let uniforms = match &pipeline.uniforms_layout {
            Some(layout) => {
                let mut entries = Vec::with_capacity(3);
                if pipeline.key.program.uses_permutation() {
                    let buffer = call
                        .permutation
                        .ok_or(RendererError::IncompleteFrame("permutation buffer missing"))?;
                    entries.push(wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    });
                }
                if pipeline.key.color_transform {
                    let transform = call
                        .color_transform
                        .ok_or(RendererError::IncompleteFrame("color transform missing"))?;
                    entries.push(wgpu::BindGroupEntry {
                        binding: 1,
                        resource: transform.matrix.as_entire_binding(),
                    });
                    entries.push(wgpu::BindGroupEntry {
                        binding: 2,
                        resource: transform.offsets.as_entire_binding(),
                    });
                }
                Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("frame-renderer.uniforms"),
                    layout,
                    entries: &entries,
                }))
            }
            None => None,
        };

        let (surface_texture, view) = match &self.target {
            TargetState::Surface {
                config: Some(_),
                surface,
            } => {
                let frame = surface.get_current_texture()?;
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                (Some(frame), view)
            }
            TargetState::Offscreen {
                texture: Some(texture),
            } => (
                None,
                texture.create_view(&wgpu::TextureViewDescriptor::default()),
            ),
            _ => return Err(RendererError::IncompleteFrame("drawable has no size")),
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-renderer.encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame-renderer.pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&pipeline.pipeline);
            pass.set_bind_group(0, &textures, &[]);
            if let Some(uniforms) = &uniforms {
                pass.set_bind_group(1, uniforms, &[]);
            }
            pass.set_vertex_buffer(0, call.vertex_buffer.slice(..));
            pass.draw(0..call.vertex_count, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(frame) = surface_texture {
            frame.present();
        }
        Ok(())
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    if value == 0 {
        return alignment;
    }
    value.div_ceil(alignment) * alignment
}
