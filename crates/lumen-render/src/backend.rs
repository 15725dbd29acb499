//! Pluggable render backend abstraction.
//!
//! This module defines the [`RenderBackend`] trait, which decouples resource
//! management and frame scheduling from any specific GPU API. The engine
//! talks to the device only through this trait:
//!
//! - **Targets**: offscreen RGBA buffers, one per node plus one fallback
//! - **Programs**: evaluation programs bound by canonical program key
//! - **Draws**: run a program into a target with resolved input targets
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │   ResourceManager / FrameRenderer │
//! └──────────────┬───────────────────┘
//!                │ uses RenderBackend trait
//!                ▼
//! ┌──────────────────────────────────┐
//! │        RenderBackend trait        │
//! │  targets / programs / run / read  │
//! └──────────────┬───────────────────┘
//!                │ implemented by
//!        ┌───────┴────────┐
//!        ▼                ▼
//! ┌─────────────────┐  ┌─────────────┐
//! │ SoftwareBackend │  │ (future)    │
//! │  (CPU, default) │  │ wgpu, GL    │
//! └─────────────────┘  └─────────────┘
//! ```
//!
//! The trait is object-safe so the engine can hold a `Box<dyn RenderBackend>`
//! selected at runtime. Handles ([`TargetId`], [`ProgramId`]) are opaque ids
//! issued by the backend; a handle can become invalid at any time through
//! context loss, so callers check [`RenderBackend::is_target_valid`] before
//! trusting one.

use std::collections::BTreeMap;

use lumen_core::{NodeId, ParamValue};
use thiserror::Error;

/// Output resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Resolution {
    /// Creates a resolution.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels.
    pub const fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns `true` if either dimension is zero.
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(640, 360)
    }
}

impl core::fmt::Display for Resolution {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Opaque handle to a backend render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u64);

impl core::fmt::Display for TargetId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "TargetId({})", self.0)
    }
}

/// Opaque handle to a bound evaluation program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u64);

impl core::fmt::Display for ProgramId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ProgramId({})", self.0)
    }
}

/// CPU-side copy of a target's pixels, linear RGBA.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    /// Dimensions.
    pub resolution: Resolution,
    /// Row-major pixels, `resolution.pixel_count()` long.
    pub pixels: Vec<[f32; 4]>,
}

impl PixelBuffer {
    /// Creates a buffer filled with `color`.
    pub fn filled(resolution: Resolution, color: [f32; 4]) -> Self {
        Self {
            resolution,
            pixels: vec![color; resolution.pixel_count()],
        }
    }

    /// Pixel at `(x, y)`, if in bounds.
    pub fn get(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.resolution.width || y >= self.resolution.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.resolution.width as usize + x as usize)
            .copied()
    }

    /// Mean Rec. 709 luminance over all pixels, 0.0 when empty.
    pub fn mean_luminance(&self) -> f32 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.pixels.iter().map(|p| f64::from(luminance(*p))).sum();
        (sum / self.pixels.len() as f64) as f32
    }

    /// Converts to 8-bit RGBA, row-major, for image encoders.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|p| p.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
            .collect()
    }
}

/// Rec. 709 luminance of a linear RGBA pixel.
#[inline]
pub fn luminance(p: [f32; 4]) -> f32 {
    0.2126 * p[0] + 0.7152 * p[1] + 0.0722 * p[2]
}

/// Everything a program needs to render one node.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    /// Node being evaluated, for diagnostics.
    pub node: NodeId,
    /// Target the program writes.
    pub output: TargetId,
    /// One target per main input slot. Never equal to `output`.
    pub inputs: &'a [TargetId],
    /// One scalar per control input slot, 0.0 when unconnected.
    pub controls: &'a [f32],
    /// The node's current parameters.
    pub params: &'a BTreeMap<String, ParamValue>,
    /// Engine time in seconds.
    pub time: f32,
}

impl DrawCall<'_> {
    /// Numeric parameter, or `default` when missing or non-numeric.
    pub fn number(&self, name: &str, default: f32) -> f32 {
        self.params
            .get(name)
            .and_then(ParamValue::as_number)
            .unwrap_or(default)
    }

    /// Color parameter, or `default`.
    pub fn color(&self, name: &str, default: [f32; 4]) -> [f32; 4] {
        self.params
            .get(name)
            .and_then(ParamValue::as_color)
            .unwrap_or(default)
    }

    /// Text parameter, or `default`.
    pub fn text<'s>(&'s self, name: &str, default: &'s str) -> &'s str {
        self.params
            .get(name)
            .and_then(ParamValue::as_text)
            .unwrap_or(default)
    }

    /// Control scalar for slot `index`, 0.0 when absent.
    pub fn control(&self, index: usize) -> f32 {
        self.controls.get(index).copied().unwrap_or(0.0)
    }
}

/// Errors reported by a render backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// The device context is lost; every handle is invalid.
    #[error("render context lost")]
    ContextLost,

    /// Target storage could not be created.
    #[error("target allocation failed: {0}")]
    Allocation(String),

    /// The target was destroyed or belongs to a lost context.
    #[error("{0} is invalid")]
    InvalidTarget(TargetId),

    /// The target failed its completeness check.
    #[error("{0} is incomplete")]
    Incomplete(TargetId),

    /// No program exists for this key.
    #[error("no program for key '{0}'")]
    UnknownProgram(String),

    /// The program handle was released or belongs to a lost context.
    #[error("{0} is invalid")]
    InvalidProgram(ProgramId),

    /// The program ran and failed.
    #[error("program '{key}' failed: {reason}")]
    ProgramFailed {
        /// Program key.
        key: String,
        /// Backend-specific description.
        reason: String,
    },
}

/// Pluggable render backend trait.
///
/// ## Object Safety
///
/// This trait is object-safe, enabling runtime backend selection via
/// `Box<dyn RenderBackend>`.
///
/// ## Implementing a Custom Backend
///
/// ```rust,ignore
/// use lumen_render::{RenderBackend, Resolution, TargetId, ProgramId, DrawCall,
///                    PixelBuffer, BackendError};
///
/// struct GpuBackend { /* device, queue, ... */ }
///
/// impl RenderBackend for GpuBackend {
///     fn name(&self) -> &str { "gpu" }
///
///     fn create_target(&mut self, resolution: Resolution) -> Result<TargetId, BackendError> {
///         // Create a texture + framebuffer pair
///         todo!()
///     }
///     // ...
/// }
/// ```
pub trait RenderBackend: Send {
    /// Human-readable name of this backend (e.g. "software").
    fn name(&self) -> &str;

    /// Creates target storage at `resolution`, cleared to transparent black.
    fn create_target(&mut self, resolution: Resolution) -> Result<TargetId, BackendError>;

    /// Destroys a target. Unknown or already-invalid handles are ignored.
    fn destroy_target(&mut self, target: TargetId);

    /// Returns `true` if `target` exists in the current context.
    fn is_target_valid(&self, target: TargetId) -> bool;

    /// Verifies that a freshly created target is usable for rendering.
    fn check_complete(&self, target: TargetId) -> Result<(), BackendError>;

    /// Binds the program for a canonical program key.
    fn bind_program(&mut self, program_key: &str) -> Result<ProgramId, BackendError>;

    /// Releases a program. Unknown handles are ignored.
    fn release_program(&mut self, program: ProgramId);

    /// Fills a target with one color.
    fn clear_target(&mut self, target: TargetId, color: [f32; 4]) -> Result<(), BackendError>;

    /// Runs a program into `call.output`.
    fn run_program(&mut self, program: ProgramId, call: &DrawCall<'_>) -> Result<(), BackendError>;

    /// Reduces a target to one scalar (mean luminance) for control inputs.
    fn sample_scalar(&self, target: TargetId) -> Result<f32, BackendError>;

    /// Copies a target's pixels back to the CPU.
    fn read_pixels(&self, target: TargetId) -> Result<PixelBuffer, BackendError>;

    /// Returns `true` while the device context is lost.
    fn is_context_lost(&self) -> bool;
}
