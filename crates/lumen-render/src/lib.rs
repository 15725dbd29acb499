//! Rendering layer for the lumen dataflow engine.
//!
//! This crate provides:
//!
//! - **Backend seam**: [`RenderBackend`], the object-safe trait every device
//!   implementation satisfies, and [`SoftwareBackend`], a deterministic CPU
//!   implementation with fault injection
//! - **Resource management**: [`ResourceManager`] pairs each node with one
//!   render target and one program, owns the fallback target, and handles
//!   resize and device-loss recovery
//! - **Frame rendering**: [`FrameRenderer`] evaluates nodes in dependency
//!   order, guards against aliased source/destination targets, and
//!   composites the terminal node
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lumen_render::{FrameRenderer, ResourceManager, Resolution, SoftwareBackend};
//!
//! let mut backend = SoftwareBackend::new();
//! let mut resources = ResourceManager::new(Resolution::new(640, 360), [0.0, 0.0, 0.0, 1.0]);
//! resources.init(&mut backend)?;
//! resources.sync(&mut backend, &store);
//!
//! let mut renderer = FrameRenderer::new();
//! let report = renderer.render(&store, &resources, &mut backend, 0.0)?;
//! ```

pub mod backend;
pub mod frame;
pub mod resources;
pub mod software;

pub use backend::{
    BackendError, DrawCall, PixelBuffer, ProgramId, RenderBackend, Resolution, TargetId, luminance,
};
pub use frame::{
    FeedbackSubstitution, FrameError, FrameRenderer, FrameReport, NodeFailure, SkipReason,
};
pub use resources::{AllocationStats, NodeResources, ResourceError, ResourceManager};
pub use software::{BackendCounters, SoftwareBackend, SoftwareHandle};
