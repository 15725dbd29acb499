//! Node type schemas and the registry that resolves them.
//!
//! A [`NodeSchema`] fixes everything about a node type that never changes
//! after creation: slot counts, declared parameters with defaults, and the
//! canonical program key the render backend binds. The [`NodeRegistry`] owns
//! the schemas plus the process-wide [`ConstraintTable`] and is shared
//! (behind an `Arc`) by every component that needs to look a type up.
//!
//! Schemas are resolved once, at node creation; nodes keep an `Arc` to their
//! schema so evaluation never repeats string lookups.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::RegistryError;
use crate::param_info::ConstraintTable;
use crate::value::ParamValue;

/// Category of node type for organization and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeCategory {
    /// Generates an image from parameters alone (oscillators, noise).
    Source,
    /// Transforms one image (color adjustment, inversion).
    Effect,
    /// Combines several images (blend, mask).
    Composite,
    /// Produces a modulation signal for control inputs.
    Control,
    /// The terminal output node.
    Output,
}

impl NodeCategory {
    /// Returns a human-readable name for the category.
    pub const fn name(&self) -> &'static str {
        match self {
            NodeCategory::Source => "Source",
            NodeCategory::Effect => "Effect",
            NodeCategory::Composite => "Composite",
            NodeCategory::Control => "Control",
            NodeCategory::Output => "Output",
        }
    }
}

/// Normalizes a type tag into its canonical program key.
///
/// Camel-case words and separator-delimited words are split, lower-cased and
/// joined with `_`. Runs of capitals are kept together as one word.
///
/// ```rust
/// use lumen_core::normalize_program_key;
///
/// assert_eq!(normalize_program_key("ColorAdjust"), "color_adjust");
/// assert_eq!(normalize_program_key("color-adjust"), "color_adjust");
/// assert_eq!(normalize_program_key("Color Adjust"), "color_adjust");
/// assert_eq!(normalize_program_key("LFO"), "lfo");
/// ```
pub fn normalize_program_key(type_tag: &str) -> String {
    let chars: Vec<char> = type_tag.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase() || (prev.is_uppercase() && next_lower);
            if boundary && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Fixed description of a node type.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSchema {
    /// Unique type tag, e.g. `"ColorAdjust"`.
    pub type_tag: String,
    /// Human-readable name.
    pub display_name: String,
    /// One-line description for listings.
    pub description: String,
    /// Category for organization.
    pub category: NodeCategory,
    /// Number of main (image) input slots.
    pub main_inputs: usize,
    /// Number of control (scalar) input slots.
    pub control_inputs: usize,
    /// Declared parameters with their defaults, in declaration order.
    pub params: Vec<(String, ParamValue)>,
    /// Canonical program key, derived from the type tag.
    pub program_key: String,
    /// Whether this is the permanent terminal output type.
    pub terminal: bool,
}

impl NodeSchema {
    /// Creates a schema with no slots and no parameters.
    pub fn new(type_tag: impl Into<String>, category: NodeCategory) -> Self {
        let type_tag = type_tag.into();
        Self {
            display_name: type_tag.clone(),
            description: String::new(),
            program_key: normalize_program_key(&type_tag),
            type_tag,
            category,
            main_inputs: 0,
            control_inputs: 0,
            params: Vec::new(),
            terminal: false,
        }
    }

    /// Sets the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the number of main input slots.
    pub fn with_main_inputs(mut self, count: usize) -> Self {
        self.main_inputs = count;
        self
    }

    /// Sets the number of control input slots.
    pub fn with_control_inputs(mut self, count: usize) -> Self {
        self.control_inputs = count;
        self
    }

    /// Declares a parameter with its default value.
    pub fn with_param(mut self, name: impl Into<String>, default: impl Into<ParamValue>) -> Self {
        self.params.push((name.into(), default.into()));
        self
    }

    /// Marks this schema as the terminal output type.
    pub fn as_terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    /// Returns `true` if the schema declares `name`.
    pub fn declares(&self, name: &str) -> bool {
        self.params.iter().any(|(n, _)| n == name)
    }

    /// Returns the declared default for `name`.
    pub fn param_default(&self, name: &str) -> Option<&ParamValue> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Registry of node type schemas plus the process-wide constraint table.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    schemas: BTreeMap<String, Arc<NodeSchema>>,
    /// Program key to type tag, for resolving non-canonical spellings.
    by_key: HashMap<String, String>,
    constraints: Arc<ConstraintTable>,
    terminal: Option<String>,
}

impl NodeRegistry {
    /// Creates an empty registry over the given constraint table.
    pub fn new(constraints: ConstraintTable) -> Self {
        Self {
            schemas: BTreeMap::new(),
            by_key: HashMap::new(),
            constraints: Arc::new(constraints),
            terminal: None,
        }
    }

    /// Registers a schema.
    ///
    /// Every declared parameter must exist in the constraint table; defaults
    /// are coerced through it. At most one terminal type may be registered and
    /// it must have exactly one main input.
    pub fn register(&mut self, mut schema: NodeSchema) -> Result<(), RegistryError> {
        if self.schemas.contains_key(&schema.type_tag)
            || self.by_key.contains_key(&schema.program_key)
        {
            return Err(RegistryError::DuplicateType(schema.type_tag));
        }

        if schema.terminal {
            if self.terminal.is_some() {
                return Err(RegistryError::InvalidTerminal(
                    schema.type_tag,
                    "a terminal type is already registered",
                ));
            }
            if schema.main_inputs != 1 {
                return Err(RegistryError::InvalidTerminal(
                    schema.type_tag,
                    "terminal must have exactly one main input",
                ));
            }
        }

        for (name, default) in &mut schema.params {
            let Some(constraint) = self.constraints.get(name) else {
                return Err(RegistryError::UnknownParameter {
                    node_type: schema.type_tag.clone(),
                    param: name.clone(),
                });
            };
            let validated = constraint.coerce(default);
            if let Some(correction) = validated.correction {
                tracing::warn!("registry_default: {} {correction}", schema.type_tag);
            }
            *default = validated.value;
        }

        tracing::debug!(
            "registry_register: {} → {} ({} main, {} control)",
            schema.type_tag,
            schema.program_key,
            schema.main_inputs,
            schema.control_inputs
        );

        if schema.terminal {
            self.terminal = Some(schema.type_tag.clone());
        }
        self.by_key
            .insert(schema.program_key.clone(), schema.type_tag.clone());
        self.schemas
            .insert(schema.type_tag.clone(), Arc::new(schema));
        Ok(())
    }

    /// Looks up a schema by exact type tag.
    pub fn get(&self, type_tag: &str) -> Option<&Arc<NodeSchema>> {
        self.schemas.get(type_tag)
    }

    /// Looks up a schema by type tag, falling back to its normalized key.
    ///
    /// `"color-adjust"` and `"Color Adjust"` both resolve to `ColorAdjust`.
    pub fn resolve(&self, type_tag: &str) -> Option<&Arc<NodeSchema>> {
        self.get(type_tag).or_else(|| {
            self.by_key
                .get(&normalize_program_key(type_tag))
                .and_then(|tag| self.schemas.get(tag))
        })
    }

    /// The terminal schema.
    pub fn terminal_schema(&self) -> Result<&Arc<NodeSchema>, RegistryError> {
        self.terminal
            .as_deref()
            .and_then(|tag| self.schemas.get(tag))
            .ok_or(RegistryError::MissingTerminal)
    }

    /// The process-wide constraint table.
    #[inline]
    pub fn constraints(&self) -> &ConstraintTable {
        &self.constraints
    }

    /// Iterates all schemas in type-tag order.
    pub fn schemas(&self) -> impl Iterator<Item = &Arc<NodeSchema>> {
        self.schemas.values()
    }

    /// Registered type tags in sorted order.
    pub fn type_tags(&self) -> Vec<&str> {
        self.schemas.keys().map(String::as_str).collect()
    }

    /// Number of registered schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
