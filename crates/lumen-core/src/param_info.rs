//! Parameter constraints and validation.
//!
//! Every parameter a node exposes is described by a [`ParamConstraint`],
//! keyed by parameter name in a process-wide [`ConstraintTable`]. The table
//! is built once at startup (see `lumen-registry`) and is immutable while the
//! engine runs.
//!
//! # Validation Model
//!
//! External writes (UI edits, control routes, loaded projects) never fail
//! because a value is out of range or of the wrong kind. Instead the value is
//! corrected and the correction is reported:
//!
//! - **Number**: clamped to `[min, max]`
//! - **Integer**: clamped, then rounded to the nearest integer
//! - **Toggle** (numeric with [`ParamFlags::TOGGLE`]): thresholded at 0.5
//! - **EnumString**: unknown strings fall back to the default; numbers are
//!   treated as an index into `allowed_values`
//! - **Color**: each channel clamped to `[0, 1]`; `#rrggbb[aa]` strings parse
//!
//! Coercion is idempotent: coercing an already-valid value returns the same
//! value with no correction.
//!
//! # Example
//!
//! ```rust
//! use lumen_core::{ParamConstraint, ParamValue};
//!
//! let brightness = ParamConstraint::number("brightness", -1.0, 1.0, 0.0);
//! let out = brightness.coerce(&ParamValue::Number(3.0));
//! assert_eq!(out.value, ParamValue::Number(1.0));
//! assert!(out.correction.is_some());
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::value::ParamValue;

/// The value domain of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    /// Continuous number in `[min, max]`.
    Number,
    /// Whole number in `[min, max]`.
    Integer,
    /// One of a fixed list of strings.
    EnumString,
    /// RGBA color.
    Color,
}

impl ParamKind {
    /// Lower-case name used in diagnostics and CLI listings.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Integer => "integer",
            Self::EnumString => "enum",
            Self::Color => "color",
        }
    }
}

/// Parameter capability flags.
///
/// # Example
///
/// ```rust
/// use lumen_core::ParamFlags;
///
/// let flags = ParamFlags::TOGGLE.union(ParamFlags::READ_ONLY);
/// assert!(flags.contains(ParamFlags::TOGGLE));
/// assert!(!ParamFlags::NONE.contains(ParamFlags::READ_ONLY));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParamFlags(u8);

impl ParamFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Boolean-like numeric: values are thresholded at 0.5 to 0.0 or 1.0.
    pub const TOGGLE: Self = Self(1 << 0);
    /// Parameter rejects external writes and control routes.
    pub const READ_ONLY: Self = Self(1 << 1);

    /// Returns `true` if all bits in `other` are set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of two flag sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Why a written value was changed before being stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorrectionReason {
    /// Value was outside `[min, max]`.
    Clamped,
    /// Integer parameter received a fractional value.
    Rounded,
    /// Toggle parameter received a value other than 0.0 or 1.0.
    Thresholded,
    /// Value had the wrong kind and was converted or replaced by the default.
    WrongKind,
    /// Value was NaN or infinite and was replaced by the default.
    NotFinite,
    /// Enumerated parameter received a string outside `allowed_values`.
    NotAllowed,
}

/// A reported correction applied to an external write.
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    /// Parameter name.
    pub param: String,
    /// The value the caller asked for.
    pub requested: ParamValue,
    /// The value actually stored.
    pub applied: ParamValue,
    /// Why the value changed.
    pub reason: CorrectionReason,
}

impl core::fmt::Display for Correction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}: {} -> {} ({:?})",
            self.param, self.requested, self.applied, self.reason
        )
    }
}

/// Result of coercing a value through a constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    /// The value to store.
    pub value: ParamValue,
    /// Present when `value` differs from what was requested.
    pub correction: Option<Correction>,
}

/// Describes the valid domain of one named parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamConstraint {
    /// Parameter name, the key in the [`ConstraintTable`].
    pub name: &'static str,
    /// Value domain.
    pub kind: ParamKind,
    /// Minimum value (numeric kinds; 0.0 for colors).
    pub min: f32,
    /// Maximum value (numeric kinds; 1.0 for colors).
    pub max: f32,
    /// Recommended UI increment.
    pub step: f32,
    /// Value used when a node is created or a write cannot be converted.
    pub default: ParamValue,
    /// Allowed strings for [`ParamKind::EnumString`]; empty otherwise.
    pub allowed_values: &'static [&'static str],
    /// Capability flags.
    pub flags: ParamFlags,
}

impl ParamConstraint {
    /// Continuous numeric parameter.
    pub fn number(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self {
            name,
            kind: ParamKind::Number,
            min,
            max,
            step: 0.01,
            default: ParamValue::Number(default),
            allowed_values: &[],
            flags: ParamFlags::NONE,
        }
    }

    /// Whole-number parameter.
    pub fn integer(name: &'static str, min: i32, max: i32, default: i32) -> Self {
        Self {
            name,
            kind: ParamKind::Integer,
            min: min as f32,
            max: max as f32,
            step: 1.0,
            default: ParamValue::Number(default as f32),
            allowed_values: &[],
            flags: ParamFlags::NONE,
        }
    }

    /// Boolean-like numeric parameter (0.0 = off, 1.0 = on).
    pub fn toggle(name: &'static str, default: bool) -> Self {
        Self {
            name,
            kind: ParamKind::Number,
            min: 0.0,
            max: 1.0,
            step: 1.0,
            default: ParamValue::Number(if default { 1.0 } else { 0.0 }),
            allowed_values: &[],
            flags: ParamFlags::TOGGLE,
        }
    }

    /// Enumerated string parameter. `default_index` selects the default.
    pub fn enum_string(
        name: &'static str,
        allowed_values: &'static [&'static str],
        default_index: usize,
    ) -> Self {
        let default = allowed_values
            .get(default_index)
            .or_else(|| allowed_values.first())
            .map_or_else(String::new, |s| (*s).to_owned());
        Self {
            name,
            kind: ParamKind::EnumString,
            min: 0.0,
            max: allowed_values.len().saturating_sub(1) as f32,
            step: 1.0,
            default: ParamValue::Text(default),
            allowed_values,
            flags: ParamFlags::NONE,
        }
    }

    /// RGBA color parameter.
    pub fn color(name: &'static str, default: [f32; 4]) -> Self {
        Self {
            name,
            kind: ParamKind::Color,
            min: 0.0,
            max: 1.0,
            step: 0.01,
            default: ParamValue::Color(default),
            allowed_values: &[],
            flags: ParamFlags::NONE,
        }
    }

    /// Sets the UI step. Builder pattern.
    pub fn with_step(mut self, step: f32) -> Self {
        self.step = step;
        self
    }

    /// Adds flags. Builder pattern.
    pub fn with_flags(mut self, flags: ParamFlags) -> Self {
        self.flags = self.flags.union(flags);
        self
    }

    /// Returns `true` for boolean-like numeric parameters.
    #[inline]
    pub fn is_toggle(&self) -> bool {
        self.flags.contains(ParamFlags::TOGGLE)
    }

    /// Returns `true` if external writes are rejected.
    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.flags.contains(ParamFlags::READ_ONLY)
    }

    /// Clamps a number to `[min, max]`.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }

    /// Coerces a value into this parameter's domain, reporting any change.
    pub fn coerce(&self, value: &ParamValue) -> Validated {
        let (applied, reason) = match self.kind {
            ParamKind::Number | ParamKind::Integer => self.coerce_numeric(value),
            ParamKind::EnumString => self.coerce_enum(value),
            ParamKind::Color => self.coerce_color(value),
        };
        let correction = reason.map(|reason| Correction {
            param: self.name.to_owned(),
            requested: value.clone(),
            applied: applied.clone(),
            reason,
        });
        Validated {
            value: applied,
            correction,
        }
    }

    /// Builds the value a control route writes for a mapped scalar.
    ///
    /// Numeric kinds take the scalar as-is (coercion clamps, rounds, or
    /// thresholds it). Enumerations pick the nearest index. Colors become a
    /// grey level, keeping the alpha of `current`.
    pub fn route_value(&self, mapped: f32, current: Option<&ParamValue>) -> ParamValue {
        match self.kind {
            ParamKind::Number | ParamKind::Integer => ParamValue::Number(mapped),
            ParamKind::EnumString => match self.nearest_allowed(mapped) {
                Some(s) => ParamValue::Text(s.to_owned()),
                None => self.default.clone(),
            },
            ParamKind::Color => {
                let alpha = current
                    .and_then(ParamValue::as_color)
                    .map_or(1.0, |c| c[3]);
                ParamValue::Color([mapped, mapped, mapped, alpha])
            }
        }
    }

    fn coerce_numeric(&self, value: &ParamValue) -> (ParamValue, Option<CorrectionReason>) {
        let Some(requested) = value.as_number() else {
            return (self.default.clone(), Some(CorrectionReason::WrongKind));
        };
        if !requested.is_finite() {
            return (self.default.clone(), Some(CorrectionReason::NotFinite));
        }

        let clamped = self.clamp(requested);
        let mut reason = (clamped != requested).then_some(CorrectionReason::Clamped);

        let applied = if self.is_toggle() {
            let t = if clamped >= 0.5 { 1.0 } else { 0.0 };
            if t != clamped {
                reason = Some(CorrectionReason::Thresholded);
            }
            t
        } else if self.kind == ParamKind::Integer {
            let r = clamped.round();
            if r != clamped && reason.is_none() {
                reason = Some(CorrectionReason::Rounded);
            }
            r
        } else {
            clamped
        };

        (ParamValue::Number(applied), reason)
    }

    fn coerce_enum(&self, value: &ParamValue) -> (ParamValue, Option<CorrectionReason>) {
        match value {
            ParamValue::Text(s) if self.allowed_values.contains(&s.as_str()) => {
                (value.clone(), None)
            }
            ParamValue::Text(_) => (self.default.clone(), Some(CorrectionReason::NotAllowed)),
            ParamValue::Number(v) if v.is_finite() => match self.nearest_allowed(*v) {
                Some(s) => (
                    ParamValue::Text(s.to_owned()),
                    Some(CorrectionReason::WrongKind),
                ),
                None => (self.default.clone(), Some(CorrectionReason::WrongKind)),
            },
            ParamValue::Number(_) => (self.default.clone(), Some(CorrectionReason::NotFinite)),
            ParamValue::Color(_) => (self.default.clone(), Some(CorrectionReason::WrongKind)),
        }
    }

    fn coerce_color(&self, value: &ParamValue) -> (ParamValue, Option<CorrectionReason>) {
        match value {
            ParamValue::Color(c) => {
                if c.iter().any(|ch| !ch.is_finite()) {
                    return (self.default.clone(), Some(CorrectionReason::NotFinite));
                }
                let clamped = c.map(|ch| ch.clamp(0.0, 1.0));
                let reason = (clamped != *c).then_some(CorrectionReason::Clamped);
                (ParamValue::Color(clamped), reason)
            }
            ParamValue::Text(s) => match parse_hex_color(s) {
                Some(c) => (ParamValue::Color(c), None),
                None => (self.default.clone(), Some(CorrectionReason::WrongKind)),
            },
            ParamValue::Number(_) => (self.default.clone(), Some(CorrectionReason::WrongKind)),
        }
    }

    /// Nearest allowed string for a (possibly fractional) index.
    fn nearest_allowed(&self, index: f32) -> Option<&'static str> {
        let last = self.allowed_values.len().checked_sub(1)?;
        let idx = if index.is_finite() {
            index.round().clamp(0.0, last as f32) as usize
        } else {
            0
        };
        self.allowed_values.get(idx).copied()
    }
}

/// Parses `#rrggbb` or `#rrggbbaa` into linear 0..1 channels.
fn parse_hex_color(s: &str) -> Option<[f32; 4]> {
    let hex = s.strip_prefix('#')?;
    if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
        return None;
    }
    let channel = |i: usize| -> Option<f32> {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .ok()
            .map(|v| f32::from(v) / 255.0)
    };
    let alpha = if hex.len() == 8 { channel(6)? } else { 1.0 };
    Some([channel(0)?, channel(2)?, channel(4)?, alpha])
}

/// Process-wide table of parameter constraints keyed by parameter name.
#[derive(Debug, Clone, Default)]
pub struct ConstraintTable {
    entries: HashMap<&'static str, ParamConstraint>,
}

impl ConstraintTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a constraint, replacing any previous entry with the same name.
    pub fn insert(&mut self, constraint: ParamConstraint) -> Option<ParamConstraint> {
        self.entries.insert(constraint.name, constraint)
    }

    /// Inserts a constraint. Builder pattern.
    pub fn with(mut self, constraint: ParamConstraint) -> Self {
        self.insert(constraint);
        self
    }

    /// Looks up a constraint by parameter name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&ParamConstraint> {
        self.entries.get(name)
    }

    /// Returns `true` if the table has an entry for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of constraints.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parameter names in sorted order.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Validates and coerces `value` for parameter `name`.
    pub fn validate(&self, name: &str, value: &ParamValue) -> Result<Validated, ValidationError> {
        let constraint = self
            .get(name)
            .ok_or_else(|| ValidationError::UnknownParameter {
                param: name.to_owned(),
            })?;
        Ok(constraint.coerce(value))
    }
}
