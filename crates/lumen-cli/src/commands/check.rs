//! Project check command.

use clap::Args;
use lumen_config::EngineSettings;

use super::common::{resolve_project, software_engine};

#[derive(Args)]
pub struct CheckArgs {
    /// Project file or name
    #[arg(value_name = "PROJECT")]
    project: String,

    /// Fail if anything had to be skipped or corrected
    #[arg(long)]
    strict: bool,
}

pub fn run(args: CheckArgs, settings: &EngineSettings) -> anyhow::Result<()> {
    let path = resolve_project(&args.project)?;
    let mut engine = software_engine(settings)?;
    let report = engine.load_project(&path)?;

    println!("Project: {}", path.display());
    println!("  Nodes:  {}", engine.store().len());
    println!("  Groups: {}", engine.store().groups().len());
    println!("  Routes: {}", engine.router().len());

    if !report.issues.is_empty() {
        println!();
        println!("Skipped ({}):", report.issues.len());
        for issue in &report.issues {
            println!("  - {issue}");
        }
    }
    if !report.corrections.is_empty() {
        println!();
        println!("Corrected ({}):", report.corrections.len());
        for correction in &report.corrections {
            println!("  - {correction}");
        }
    }

    let clean = report.is_clean() && report.corrections.is_empty();
    if clean {
        println!();
        println!("OK");
    } else if args.strict {
        anyhow::bail!(
            "{} issue(s), {} correction(s)",
            report.issues.len(),
            report.corrections.len()
        );
    }
    Ok(())
}
