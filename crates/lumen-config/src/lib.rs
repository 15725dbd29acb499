//! Project persistence and engine settings for lumen.
//!
//! - [`ProjectFile`] - JSON project format; [`serialize_graph`] and
//!   [`load_graph`] move a graph and its route table in and out of it
//! - [`EngineSettings`] - TOML settings file (resolution, fallback color,
//!   log filter, signal conditioning)
//! - [`paths`] - Platform-specific config and project locations
//!
//! # Example
//!
//! ```rust,ignore
//! use lumen_config::{ProjectFile, load_graph, serialize_graph};
//!
//! serialize_graph(&store, &router).save("show.json")?;
//!
//! let project = ProjectFile::load("show.json")?;
//! let report = load_graph(&project, &mut store, &mut router);
//! for issue in &report.issues {
//!     eprintln!("skipped: {issue}");
//! }
//! ```

pub mod error;
pub mod paths;
pub mod project;
pub mod settings;

pub use error::{ConfigError, IoAction};
pub use project::{
    GroupRecord, LoadIssue, LoadReport, NodeRecord, PROJECT_VERSION, ProjectFile, load_graph,
    serialize_graph,
};
pub use settings::{EngineSettings, ResolutionSettings, SignalSettings};
