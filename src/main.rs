mod sink;
mod source;

use anyhow::{Context, Result};
use clap::Parser;
use image::Rgb;
use sink::{MaskSink, Overlay, PngSink};
use source::MaskSource;
use source::MaskSequence;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use wallmask::{PipelineConfig, ProcessedFrame, WallMaskPipeline};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Mask image, or a directory of mask images processed in name order
    input: PathBuf,

    /// Directory for the final masks
    #[arg(short, long, default_value = "out")]
    output: PathBuf,

    /// Probability at or above which a pixel counts as wall
    #[arg(long, default_value_t = 0.5)]
    threshold: f32,

    /// Side of the square structuring element (0 disables morphology)
    #[arg(long, default_value_t = 3)]
    kernel_size: usize,

    /// Erosion passes
    #[arg(long, default_value_t = 1)]
    erode: usize,

    /// Dilation passes
    #[arg(long, default_value_t = 2)]
    dilate: usize,

    /// Disable temporal smoothing
    #[arg(long)]
    no_temporal: bool,

    /// Weight of the current frame when smoothing, clamped to [0, 1]
    #[arg(long, default_value_t = 0.4)]
    blend: f32,

    /// Reset smoothing when more than this fraction of pixels flips
    #[arg(long)]
    scene_cut: Option<f32>,

    /// Minimum contour area in pixels
    #[arg(long, default_value_t = 100.0)]
    min_area: f64,

    /// Minimum bounding box aspect ratio
    #[arg(long, default_value_t = 0.2)]
    min_aspect: f32,

    /// Maximum bounding box aspect ratio
    #[arg(long, default_value_t = 5.0)]
    max_aspect: f32,

    /// Outline simplification tolerance as a fraction of perimeter
    #[arg(long, default_value_t = 0.02)]
    simplify: f64,

    /// Worker threads (0 uses all cores)
    #[arg(long, default_value_t = 0)]
    workers: usize,

    /// Only process every Nth mask
    #[arg(long, default_value_t = 1)]
    every: usize,

    /// Reset temporal state every N processed masks (0 never)
    #[arg(long, default_value_t = 0)]
    reset_every: u64,

    /// Background frame for a paint preview
    #[arg(long)]
    background: Option<PathBuf>,

    /// Paint colour as RRGGBB
    #[arg(long, default_value = "c86432", value_parser = parse_paint)]
    paint: Rgb<u8>,

    /// Paint opacity
    #[arg(long, default_value_t = 0.6)]
    opacity: f32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            binary_threshold: self.threshold,
            kernel_size: self.kernel_size,
            erode_iterations: self.erode,
            dilate_iterations: self.dilate,
            temporal_enabled: !self.no_temporal,
            blend_factor: self.blend,
            scene_cut_fraction: self.scene_cut,
            min_contour_area: self.min_area,
            min_aspect_ratio: self.min_aspect,
            max_aspect_ratio: self.max_aspect,
            simplify_epsilon: self.simplify,
            workers: self.workers,
        }
    }
}

fn parse_paint(value: &str) -> Result<Rgb<u8>, String> {
    let hex = value.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(format!("expected RRGGBB, got {:?}", value));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| format!("{:?}: {}", value, e))
    };
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("wallmask starting");

    let config = args.pipeline_config();
    tracing::info!(
        "Morphology: kernel={} erode={} dilate={}",
        config.kernel_size,
        config.erode_iterations,
        config.dilate_iterations
    );
    tracing::info!(
        "Smoothing: enabled={} blend={}",
        config.temporal_enabled,
        config.blend_factor
    );
    tracing::info!(
        "Contours: min_area={} aspect=[{}, {}]",
        config.min_contour_area,
        config.min_aspect_ratio,
        config.max_aspect_ratio
    );

    let mut source = MaskSequence::open(&args.input).context("Failed to open mask source")?;

    let overlay = match &args.background {
        Some(path) => {
            let background = image::open(path)
                .with_context(|| format!("Failed to load background {}", path.display()))?
                .to_rgb8();
            Some(Overlay {
                background,
                paint: args.paint,
                opacity: args.opacity,
            })
        }
        None => None,
    };
    let mut sink = PngSink::new(&args.output, overlay).context("Failed to open output")?;

    let mut pipeline = WallMaskPipeline::new(config);
    pipeline.subscribe(|frame: &ProcessedFrame<'_>| {
        let (width, height) = frame.dimensions();
        let coverage = frame.wall_pixels() as f64 / (width as f64 * height as f64);
        tracing::debug!(
            "Frame {} wall coverage {:.1}%",
            frame.index,
            coverage * 100.0
        );
    });

    run_pipeline(
        &mut source,
        &mut sink,
        &mut pipeline,
        args.every.max(1),
        args.reset_every,
    )?;

    pipeline.dispose();

    Ok(())
}

fn run_pipeline<S, K>(
    source: &mut S,
    sink: &mut K,
    pipeline: &mut WallMaskPipeline,
    every: usize,
    reset_every: u64,
) -> Result<()>
where
    S: MaskSource,
    K: MaskSink,
{
    let mut seen = 0usize;
    let mut processed = 0u64;
    let mut total_regions = 0usize;
    let mut total_load_time = Duration::ZERO;
    let mut total_process_time = Duration::ZERO;
    let mut total_write_time = Duration::ZERO;

    if let Some(count) = source.len_hint() {
        tracing::info!("Processing up to {} masks", count.div_ceil(every));
    }

    loop {
        // Load mask
        let load_start = Instant::now();
        let Some(input) = source.next_frame().context("Failed to read mask")? else {
            break;
        };
        let load_time = load_start.elapsed();

        seen += 1;
        if (seen - 1) % every != 0 {
            tracing::debug!("Skipping {}", input.name);
            continue;
        }
        total_load_time += load_time;

        if reset_every > 0 && processed > 0 && processed % reset_every == 0 {
            pipeline.reset_temporal_state();
        }

        // Post-process
        let process_start = Instant::now();
        let frame = pipeline
            .process(&input.mask)
            .with_context(|| format!("Failed to process {}", input.name))?;
        total_process_time += process_start.elapsed();

        tracing::info!(
            "{}: {} wall region(s), {} rejected{}",
            input.name,
            frame.regions.len(),
            frame.rejected,
            if frame.temporal_reset { ", unsmoothed" } else { "" }
        );
        total_regions += frame.regions.len();

        // Write mask
        let write_start = Instant::now();
        sink.write_frame(&input.name, &frame)
            .with_context(|| format!("Failed to write {}", input.name))?;
        total_write_time += write_start.elapsed();

        processed += 1;

        // Log stats every 30 frames
        if processed % 30 == 0 {
            log_timings(processed, total_load_time, total_process_time, total_write_time);
        }
    }

    if processed > 0 {
        log_timings(processed, total_load_time, total_process_time, total_write_time);
    }
    tracing::info!(
        "Done: {} of {} masks processed, {} wall regions total",
        processed,
        seen,
        total_regions
    );

    Ok(())
}

fn log_timings(frames: u64, load: Duration, process: Duration, write: Duration) {
    let avg = |d: Duration| d.as_secs_f64() * 1000.0 / frames as f64;
    tracing::info!(
        "Frame {}: load={:.1}ms, process={:.1}ms, write={:.1}ms",
        frames,
        avg(load),
        avg(process),
        avg(write)
    );
}
