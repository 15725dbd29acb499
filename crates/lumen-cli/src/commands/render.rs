//! Offscreen render command.

use std::path::PathBuf;

use clap::Args;
use lumen_config::EngineSettings;

use super::common::{parse_signal, resolve_project, software_engine};

#[derive(Args)]
pub struct RenderArgs {
    /// Project file or name
    #[arg(value_name = "PROJECT")]
    project: String,

    /// Output PNG file
    #[arg(short, long, default_value = "frame.png")]
    out: PathBuf,

    /// Number of frames to run before capturing
    #[arg(short, long, default_value = "1")]
    frames: u32,

    /// Frame rate used to advance signal time
    #[arg(long, default_value = "60")]
    fps: f32,

    /// Output width (overrides settings)
    #[arg(long)]
    width: Option<u32>,

    /// Output height (overrides settings)
    #[arg(long)]
    height: Option<u32>,

    /// Signal values (e.g., --signal audio.bass=0.8)
    #[arg(short, long, value_parser = parse_signal)]
    signal: Vec<(String, f32)>,
}

pub fn run(args: RenderArgs, mut settings: EngineSettings) -> anyhow::Result<()> {
    if args.frames == 0 {
        anyhow::bail!("--frames must be at least 1");
    }
    if !(args.fps.is_finite() && args.fps > 0.0) {
        anyhow::bail!("--fps must be positive");
    }
    if let Some(width) = args.width {
        settings.resolution.width = width;
    }
    if let Some(height) = args.height {
        settings.resolution.height = height;
    }

    let path = resolve_project(&args.project)?;
    let mut engine = software_engine(&settings)?;
    let report = engine.load_project(&path)?;
    for issue in &report.issues {
        tracing::warn!("render_load: {issue}");
    }

    let feed = engine.feed();
    for (key, value) in &args.signal {
        feed.publish(key, *value)?;
    }

    let dt = 1.0 / args.fps;
    let mut last = None;
    for _ in 0..args.frames {
        if let Some(report) = engine.tick(dt)?.report() {
            last = Some(report.clone());
        }
    }
    let last = last.ok_or_else(|| anyhow::anyhow!("render device unavailable, no frame ran"))?;

    let frame = engine.read_frame()?;
    image::save_buffer(
        &args.out,
        &frame.to_rgba8(),
        frame.resolution.width,
        frame.resolution.height,
        image::ColorType::Rgba8,
    )?;

    let stats = engine.stats();
    println!(
        "Rendered {} frame(s) at {} to {}",
        stats.frames,
        frame.resolution,
        args.out.display()
    );
    println!(
        "  Last frame: {} evaluated, {} skipped, {} failed",
        last.evaluated.len(),
        last.skipped.len(),
        last.failed.len()
    );
    if stats.feedback_substitutions > 0 || stats.cycle_edges > 0 {
        println!(
            "  Feedback substitutions: {}, cycle edges dropped: {}",
            stats.feedback_substitutions, stats.cycle_edges
        );
    }
    Ok(())
}
