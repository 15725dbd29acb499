//! Shared CLI helpers used across multiple commands.

use std::path::{Path, PathBuf};

use lumen_config::EngineSettings;
use lumen_config::paths::find_project;
use lumen_engine::Engine;
use lumen_render::SoftwareBackend;

/// Parse a `key=value` string for clap's `value_parser`.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 {
        return Err(format!("Invalid format: '{s}' (expected key=value)"));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

/// Parse a `source.key=value` signal assignment.
pub fn parse_signal(s: &str) -> Result<(String, f32), String> {
    let (key, value) = parse_key_val(s)?;
    let value: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("Invalid signal value in '{s}' (expected a number)"))?;
    Ok((key, value))
}

/// Load settings from `path`, or from the default location.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<EngineSettings> {
    let settings = match path {
        Some(path) => EngineSettings::load(path)?,
        None => EngineSettings::load_or_default()?,
    };
    Ok(settings)
}

/// Resolve a project argument: an existing file path, or the name of a
/// project in the user projects directory.
pub fn resolve_project(name: &str) -> anyhow::Result<PathBuf> {
    let path = PathBuf::from(name);
    if path.is_file() {
        return Ok(path);
    }
    find_project(name).ok_or_else(|| anyhow::anyhow!("Project '{name}' not found"))
}

/// An engine over the software backend.
pub fn software_engine(settings: &EngineSettings) -> anyhow::Result<Engine> {
    Ok(Engine::with_builtin(
        Box::new(SoftwareBackend::new()),
        settings,
    )?)
}
