//! Built-in node catalog for lumen.
//!
//! This crate defines the process-wide parameter constraint table and the
//! built-in node types. Both are plain data: nothing here renders. Program
//! keys derived from these type tags are what `lumen-render` backends bind.
//!
//! # Features
//!
//! - **Constraint Table**: every parameter name any built-in type declares,
//!   with its kind, range, step and default
//! - **Node Catalog**: sources, effects, composites, a control oscillator and
//!   the terminal `Canvas`
//! - **Category System**: types organized by [`NodeCategory`]
//!
//! # Example
//!
//! ```rust
//! use lumen_registry::{builtin, types};
//! use lumen_core::NodeCategory;
//!
//! let registry = builtin().unwrap();
//! let blend = registry.get(types::BLEND).unwrap();
//! assert_eq!(blend.main_inputs, 2);
//!
//! for schema in registry.schemas().filter(|s| s.category == NodeCategory::Source) {
//!     println!("{}: {}", schema.type_tag, schema.description);
//! }
//! ```

use lumen_core::{
    ConstraintTable, NodeCategory, NodeRegistry, NodeSchema, ParamConstraint, RegistryError,
};

/// Type tags of the built-in nodes.
pub mod types {
    /// Terminal output node.
    pub const CANVAS: &str = "Canvas";
    /// Flat color fill.
    pub const SOLID_COLOR: &str = "SolidColor";
    /// Periodic stripe pattern.
    pub const OSCILLATOR: &str = "Oscillator";
    /// Value noise.
    pub const NOISE: &str = "Noise";
    /// Two-color linear gradient.
    pub const GRADIENT: &str = "Gradient";
    /// Brightness, contrast, saturation and hue.
    pub const COLOR_ADJUST: &str = "ColorAdjust";
    /// Color inversion.
    pub const INVERT: &str = "Invert";
    /// Scale, rotate and offset.
    pub const TRANSFORM: &str = "Transform";
    /// Two-input blend.
    pub const BLEND: &str = "Blend";
    /// Luminance mask.
    pub const MASK: &str = "Mask";
    /// Low-frequency control oscillator.
    pub const LFO: &str = "Lfo";
}

/// Allowed values of `waveform`.
pub const WAVEFORMS: &[&str] = &["sine", "square", "triangle", "sawtooth"];

/// Allowed values of `blend_mode`.
pub const BLEND_MODES: &[&str] = &["normal", "add", "multiply", "screen", "difference"];

/// Builds the process-wide parameter constraint table.
pub fn builtin_constraints() -> ConstraintTable {
    ConstraintTable::new()
        // Oscillators
        .with(ParamConstraint::number("frequency", 0.0, 50.0, 1.0).with_step(0.1))
        .with(ParamConstraint::number("speed", 0.0, 10.0, 1.0))
        .with(ParamConstraint::number("amplitude", 0.0, 1.0, 1.0))
        .with(ParamConstraint::number("bias", 0.0, 1.0, 0.5))
        .with(ParamConstraint::enum_string("waveform", WAVEFORMS, 0))
        // Noise
        .with(ParamConstraint::number("scale", 0.1, 64.0, 1.0).with_step(0.1))
        .with(ParamConstraint::integer("octaves", 1, 8, 4))
        .with(ParamConstraint::integer("seed", 0, 65_535, 0))
        // Color
        .with(ParamConstraint::color("color", [1.0, 1.0, 1.0, 1.0]))
        .with(ParamConstraint::color("color_b", [0.0, 0.0, 0.0, 1.0]))
        .with(ParamConstraint::number("brightness", -1.0, 1.0, 0.0))
        .with(ParamConstraint::number("contrast", 0.0, 4.0, 1.0))
        .with(ParamConstraint::number("saturation", 0.0, 4.0, 1.0))
        .with(ParamConstraint::number("hue", -180.0, 180.0, 0.0).with_step(1.0))
        // Geometry
        .with(ParamConstraint::number("rotation", -360.0, 360.0, 0.0).with_step(1.0))
        .with(ParamConstraint::number("offset_x", -1.0, 1.0, 0.0))
        .with(ParamConstraint::number("offset_y", -1.0, 1.0, 0.0))
        // Compositing
        .with(ParamConstraint::number("mix", 0.0, 1.0, 0.5))
        .with(ParamConstraint::enum_string("blend_mode", BLEND_MODES, 0))
        .with(ParamConstraint::number("threshold", 0.0, 1.0, 0.5))
        .with(ParamConstraint::toggle("invert", false))
        .with(ParamConstraint::number("opacity", 0.0, 1.0, 1.0))
}

/// The built-in node schemas, terminal first.
pub fn builtin_schemas() -> Vec<NodeSchema> {
    vec![
        NodeSchema::new(types::CANVAS, NodeCategory::Output)
            .with_description("Final frame; composites its single input")
            .with_main_inputs(1)
            .with_param("opacity", 1.0)
            .as_terminal(),
        // Sources
        NodeSchema::new(types::SOLID_COLOR, NodeCategory::Source)
            .with_display_name("Solid Color")
            .with_description("Fills the frame with one color")
            .with_param("color", [1.0, 1.0, 1.0, 1.0]),
        NodeSchema::new(types::OSCILLATOR, NodeCategory::Source)
            .with_description("Moving stripe pattern; control input modulates frequency")
            .with_control_inputs(1)
            .with_param("frequency", 4.0)
            .with_param("speed", 1.0)
            .with_param("amplitude", 1.0)
            .with_param("rotation", 0.0)
            .with_param("waveform", "sine")
            .with_param("color", [1.0, 1.0, 1.0, 1.0]),
        NodeSchema::new(types::NOISE, NodeCategory::Source)
            .with_description("Fractal value noise; control input modulates scale")
            .with_control_inputs(1)
            .with_param("scale", 8.0)
            .with_param("speed", 0.5)
            .with_param("octaves", 4.0)
            .with_param("seed", 0.0),
        NodeSchema::new(types::GRADIENT, NodeCategory::Source)
            .with_description("Linear gradient between two colors; control input shifts it")
            .with_control_inputs(1)
            .with_param("color", [1.0, 1.0, 1.0, 1.0])
            .with_param("color_b", [0.0, 0.0, 0.0, 1.0])
            .with_param("rotation", 0.0)
            .with_param("offset_x", 0.0),
        // Effects
        NodeSchema::new(types::COLOR_ADJUST, NodeCategory::Effect)
            .with_display_name("Color Adjust")
            .with_description("Brightness, contrast, saturation and hue; control input adds brightness")
            .with_main_inputs(1)
            .with_control_inputs(1)
            .with_param("brightness", 0.0)
            .with_param("contrast", 1.0)
            .with_param("saturation", 1.0)
            .with_param("hue", 0.0),
        NodeSchema::new(types::INVERT, NodeCategory::Effect)
            .with_description("Inverts RGB; control input modulates mix")
            .with_main_inputs(1)
            .with_control_inputs(1)
            .with_param("mix", 1.0),
        NodeSchema::new(types::TRANSFORM, NodeCategory::Effect)
            .with_description("Scales, rotates and offsets its input; control input adds rotation")
            .with_main_inputs(1)
            .with_control_inputs(1)
            .with_param("scale", 1.0)
            .with_param("rotation", 0.0)
            .with_param("offset_x", 0.0)
            .with_param("offset_y", 0.0),
        // Composites
        NodeSchema::new(types::BLEND, NodeCategory::Composite)
            .with_description("Blends two inputs; control input modulates mix")
            .with_main_inputs(2)
            .with_control_inputs(1)
            .with_param("mix", 0.5)
            .with_param("blend_mode", "normal"),
        NodeSchema::new(types::MASK, NodeCategory::Composite)
            .with_description("Keeps the first input where the second is brighter than threshold")
            .with_main_inputs(2)
            .with_control_inputs(1)
            .with_param("threshold", 0.5)
            .with_param("invert", 0.0),
        // Control
        NodeSchema::new(types::LFO, NodeCategory::Control)
            .with_display_name("LFO")
            .with_description("Uniform grey level oscillating over time, for control inputs")
            .with_param("frequency", 0.5)
            .with_param("amplitude", 0.5)
            .with_param("bias", 0.5)
            .with_param("waveform", "sine"),
    ]
}

/// Builds a registry with every built-in type over [`builtin_constraints`].
pub fn builtin() -> Result<NodeRegistry, RegistryError> {
    let mut registry = NodeRegistry::new(builtin_constraints());
    for schema in builtin_schemas() {
        registry.register(schema)?;
    }
    Ok(registry)
}
