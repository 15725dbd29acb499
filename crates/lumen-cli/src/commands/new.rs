//! Starter project command.

use std::path::PathBuf;

use clap::Args;
use lumen_config::EngineSettings;
use lumen_core::{Position, SlotKind};
use lumen_registry::types;

use super::common::software_engine;

#[derive(Args)]
pub struct NewArgs {
    /// Output project file (.json)
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Project name stored in the file
    #[arg(long)]
    name: Option<String>,

    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

pub fn run(args: NewArgs, settings: &EngineSettings) -> anyhow::Result<()> {
    if args.path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            args.path.display()
        );
    }

    // Oscillator → ColorAdjust → Canvas, with bass driving brightness.
    let mut engine = software_engine(settings)?;
    let osc = engine.create_node(types::OSCILLATOR, Position::new(0.0, 0.0))?;
    let adjust = engine.create_node(types::COLOR_ADJUST, Position::new(220.0, 0.0))?;
    let terminal = engine.store().terminal();
    engine.store_mut().set_position(terminal, Position::new(440.0, 0.0))?;
    engine.connect(osc, adjust, 0, SlotKind::Main)?;
    engine.connect(adjust, terminal, 0, SlotKind::Main)?;
    engine.set_param(osc, "frequency", 6.0)?;
    engine.create_route("audio.bass", adjust, "brightness", -1.0, 1.0)?;

    let name = args.name.unwrap_or_else(|| {
        lumen_config::paths::project_name_from_path(&args.path)
            .unwrap_or_else(|| "untitled".to_string())
    });
    engine.project().with_name(&name).save(&args.path)?;

    println!("Created project '{name}' at {}", args.path.display());
    println!();
    println!("  Oscillator -> ColorAdjust -> Canvas");
    println!("  audio.bass -> ColorAdjust.brightness [-1, 1]");
    println!();
    println!(
        "Try: lumen render {} --signal audio.bass=0.8 --out frame.png",
        args.path.display()
    );
    Ok(())
}
