//! Platform-specific paths for settings and projects.
//!
//! - **User config**: `~/.config/lumen/` (Linux), `~/Library/Application Support/lumen/` (macOS), `%APPDATA%\lumen\` (Windows)
//! - **Settings file**: `<user config>/settings.toml`
//! - **User projects**: `<user config>/projects/`

use std::path::{Path, PathBuf};

/// Application name used for directory paths.
const APP_NAME: &str = "lumen";

/// Settings file name.
const SETTINGS_FILE: &str = "settings.toml";

/// Subdirectory name for projects.
const PROJECTS_SUBDIR: &str = "projects";

/// Project file extension.
pub const PROJECT_EXTENSION: &str = "json";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the settings file.
pub fn settings_path() -> PathBuf {
    user_config_dir().join(SETTINGS_FILE)
}

/// Returns the user-specific projects directory.
pub fn user_projects_dir() -> PathBuf {
    user_config_dir().join(PROJECTS_SUBDIR)
}

/// Ensure the user config directory exists.
pub fn ensure_user_config_dir() -> Result<PathBuf, crate::ConfigError> {
    let dir = user_config_dir();
    ensure_dir(&dir)?;
    Ok(dir)
}

/// Creates `dir` and its parents if missing.
pub(crate) fn ensure_dir(dir: &Path) -> Result<(), crate::ConfigError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| crate::ConfigError::create_dir(dir, e))?;
    }
    Ok(())
}

/// Find a project file by path or name.
///
/// Searches the given path first, then the user projects directory, adding
/// the `.json` extension when missing.
pub fn find_project(name: &str) -> Option<PathBuf> {
    find_project_in(name, &user_projects_dir())
}

fn find_project_in(name: &str, dir: &Path) -> Option<PathBuf> {
    let path = PathBuf::from(name);
    if path.is_file() {
        return Some(path);
    }
    let filename = if path.extension().is_some_and(|e| e == PROJECT_EXTENSION) {
        name.to_owned()
    } else {
        format!("{name}.{PROJECT_EXTENSION}")
    };
    let candidate = dir.join(filename);
    candidate.is_file().then_some(candidate)
}

/// Lists project files in the user projects directory.
pub fn list_user_projects() -> Vec<PathBuf> {
    list_projects_in_dir(&user_projects_dir())
}

fn list_projects_in_dir(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|e| e == PROJECT_EXTENSION))
        .collect();
    found.sort();
    found
}

/// Project name from a file path (the file stem).
pub fn project_name_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_locations_mention_app() {
        assert!(user_config_dir().to_string_lossy().contains("lumen"));
        assert!(settings_path().ends_with("lumen/settings.toml"));
        assert!(user_projects_dir().ends_with("lumen/projects"));
    }

    #[test]
    fn find_by_path_and_name() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("show.json");
        fs::write(&file, "{}").unwrap();

        assert_eq!(find_project_in(file.to_str().unwrap(), temp.path()), Some(file.clone()));
        assert_eq!(find_project_in("show", temp.path()), Some(file.clone()));
        assert_eq!(find_project_in("show.json", temp.path()), Some(file));
        assert_eq!(find_project_in("missing", temp.path()), None);
    }

    #[test]
    fn lists_only_project_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.json"), "").unwrap();
        fs::write(temp.path().join("a.json"), "").unwrap();
        fs::write(temp.path().join("notes.txt"), "").unwrap();

        let found = list_projects_in_dir(temp.path());
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("a.json"));
        assert!(list_projects_in_dir(Path::new("/nonexistent/lumen/12345")).is_empty());
    }

    #[test]
    fn name_from_path() {
        assert_eq!(
            project_name_from_path(Path::new("/x/y/feedback.json")),
            Some("feedback".to_string())
        );
    }
}
