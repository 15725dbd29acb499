//! Lumen Core - dataflow graph primitives for real-time visual synthesis
//!
//! This crate holds the parts of the engine that know nothing about pixels or
//! devices: the node data model, parameter validation, node type schemas, and
//! the evaluation order.
//!
//! # Core Abstractions
//!
//! ## Parameters
//!
//! - [`ParamValue`] - Number, color, or string value stored on a node
//! - [`ParamConstraint`] - Valid domain of a named parameter
//! - [`ConstraintTable`] - Process-wide constraints keyed by parameter name
//! - [`Correction`] - Report of a value corrected on write
//!
//! ## Node Types
//!
//! - [`NodeSchema`] - Slot counts, declared parameters, program key
//! - [`NodeRegistry`] - Resolves type tags to schemas
//!
//! ## Graph
//!
//! - [`GraphStore`] - Arena of nodes and the mutation API
//! - [`evaluation_order`] - Depth-first topological sort with cycle tolerance
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lumen_core::{GraphStore, Position, SlotKind};
//!
//! let registry = Arc::new(lumen_registry::builtin());
//! let mut store = GraphStore::new(registry)?;
//! let osc = store.create_node("Oscillator", Position::default())?;
//! store.connect(osc, store.terminal(), 0, SlotKind::Main)?;
//! store.set_param(osc, "frequency", 4.0)?;
//! ```

pub mod error;
pub mod graph;
pub mod param_info;
pub mod registry;
pub mod value;

pub use error::{GraphError, RegistryError, ValidationError};
pub use graph::{
    CycleEdge, EvaluationOrder, Group, GroupId, GraphStore, Node, NodeId, Position, SlotKind,
    SlotRef, evaluation_order,
};
pub use param_info::{
    ConstraintTable, Correction, CorrectionReason, ParamConstraint, ParamFlags, ParamKind,
    Validated,
};
pub use registry::{NodeCategory, NodeRegistry, NodeSchema, normalize_program_key};
pub use value::ParamValue;
