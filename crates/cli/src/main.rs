use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use frame_renderer::{
    convert_to_rgba, supported_formats, ContentMode, FormatId, FrameGeometry, FrameRenderer,
    RendererConfig, Size, WgpuBackend,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod pattern;

#[derive(Parser)]
#[command(name = "frame-viewer")]
#[command(about = "Render synthetic video frames through the frame renderer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a gradient test frame and save it as PNG
    Render {
        /// Pixel format, as a four-character code ('420v', BGRA) or 0x hex
        #[arg(short, long)]
        format: FormatId,

        /// Source frame size (WIDTHxHEIGHT)
        #[arg(long, default_value = "320x180")]
        size: Size,

        /// Drawable size (WIDTHxHEIGHT)
        #[arg(long, default_value = "640x480")]
        viewport: Size,

        /// Content mode (aspect-fit, center, top-left, ... or UIKit raw value)
        #[arg(long)]
        content_mode: Option<ContentMode>,

        /// Renderer configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Use the CPU reference conversion instead of the GPU
        #[arg(long)]
        cpu: bool,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List supported pixel formats
    Formats {
        /// Print descriptors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the sample rectangle and quad vertices for a placement
    Geometry {
        #[arg(long, default_value = "aspect-fit")]
        content_mode: ContentMode,

        #[arg(long)]
        source: Size,

        #[arg(long)]
        viewport: Size,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Render {
            format,
            size,
            viewport,
            content_mode,
            config,
            cpu,
            output,
        } => render_command(format, size, viewport, content_mode, config, cpu, output),
        Commands::Formats { json } => formats_command(json),
        Commands::Geometry {
            content_mode,
            source,
            viewport,
        } => geometry_command(content_mode, source, viewport),
    }
}

fn render_command(
    format: FormatId,
    size: Size,
    viewport: Size,
    content_mode: Option<ContentMode>,
    config_path: Option<PathBuf>,
    cpu: bool,
    output: PathBuf,
) -> Result<()> {
    if size.is_empty() || viewport.is_empty() {
        bail!("source and viewport sizes must be non-zero");
    }
    let mut config = match &config_path {
        Some(path) => RendererConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RendererConfig::default(),
    };
    if let Some(mode) = content_mode {
        config.content_mode = mode;
    }

    let frame = pattern::gradient(format, size)?;
    info!("Rendering {} frame {} into {}", format, size, viewport);

    let image = if cpu {
        convert_to_rgba(&frame)?.to_image()?
    } else {
        let backend = WgpuBackend::headless(&config)
            .context("no GPU device available (try --cpu)")?;
        let renderer = FrameRenderer::new(backend, &config);
        renderer.set_viewport(viewport);
        renderer
            .submit_frame(&frame)
            .with_context(|| format!("rendering {format}"))?;
        renderer
            .with_backend(|backend| backend.read_target())
            .context("backend detached")??
            .to_image()?
    };

    image
        .save(&output)
        .with_context(|| format!("writing {}", output.display()))?;
    info!("Wrote {:?}", output);
    Ok(())
}

fn formats_command(json: bool) -> Result<()> {
    if json {
        let descriptors: Vec<_> = supported_formats().collect();
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    println!(
        "{:<12} {:<24} {:>6} {:<18} {:<10} {}",
        "ID", "FORMAT", "PLANES", "PROGRAM", "TRANSFORM", "PERMUTATION"
    );
    for descriptor in supported_formats() {
        let transform = descriptor
            .color_range
            .map(|range| format!("{range:?}"))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<12} {:<24} {:>6} {:<18} {:<10} {:?}",
            descriptor.id().to_string(),
            format!("{:?}", descriptor.format),
            descriptor.plane_count(),
            descriptor.program.id(),
            transform,
            descriptor.permutation,
        );
    }
    Ok(())
}

fn geometry_command(content_mode: ContentMode, source: Size, viewport: Size) -> Result<()> {
    if viewport.is_empty() {
        bail!("viewport must be non-zero");
    }
    let geometry = FrameGeometry::compute(content_mode, Some(source), viewport)
        .context("no geometry for this placement")?;
    println!("{}", serde_json::to_string_pretty(&geometry)?);
    Ok(())
}
