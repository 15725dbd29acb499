//! Sampling-layer conditioning for axis-like sources.
//!
//! Raw device values are conditioned once per tick, before any route reads
//! them: a sample within `deadzone` of `center` snaps to `center`, then the
//! result is blended with the previous conditioned value:
//!
//! ```text
//! smoothed = last + (raw - last) * (1 - smoothing)
//! ```
//!
//! A `smoothing` of 0 passes samples through; values close to 1 respond
//! slowly.

use serde::{Deserialize, Serialize};

/// Deadzone and smoothing settings for one signal source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisConditioning {
    /// Distance from `center` inside which samples snap to `center`.
    pub deadzone: f32,
    /// Exponential smoothing factor in `[0, 1)`.
    pub smoothing: f32,
    /// Rest position of the axis.
    pub center: f32,
}

impl Default for AxisConditioning {
    fn default() -> Self {
        Self {
            deadzone: 0.0,
            smoothing: 0.0,
            center: 0.5,
        }
    }
}

impl AxisConditioning {
    /// Creates conditioning centered at 0.5.
    pub fn new(deadzone: f32, smoothing: f32) -> Self {
        Self {
            deadzone,
            smoothing,
            ..Self::default()
        }
        .sanitized()
    }

    /// Sets the rest position.
    pub fn with_center(mut self, center: f32) -> Self {
        self.center = if center.is_finite() { center } else { 0.5 };
        self
    }

    /// Replaces non-finite fields and clamps `smoothing` below 1 so the
    /// output can always move.
    pub fn sanitized(self) -> Self {
        let finite_or = |v: f32, d: f32| if v.is_finite() { v } else { d };
        Self {
            deadzone: finite_or(self.deadzone, 0.0).max(0.0),
            smoothing: finite_or(self.smoothing, 0.0).clamp(0.0, 0.999),
            center: finite_or(self.center, 0.5),
        }
    }

    /// Returns `true` if conditioning leaves every sample unchanged.
    pub fn is_identity(&self) -> bool {
        self.deadzone == 0.0 && self.smoothing == 0.0
    }

    /// Conditions one raw sample given the previous conditioned value.
    pub fn apply(&self, raw: f32, last: Option<f32>) -> f32 {
        let snapped = if (raw - self.center).abs() < self.deadzone {
            self.center
        } else {
            raw
        };
        match last {
            Some(last) if last.is_finite() => last + (snapped - last) * (1.0 - self.smoothing),
            _ => snapped,
        }
    }
}
