//! Graph node types.
//!
//! A [`Node`] is owned by the [`GraphStore`](super::GraphStore). Other nodes
//! refer to it only through its [`NodeId`], stored in their input slots, so
//! deleting a node can never leave a dangling reference: the store nulls
//! every slot that named it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::registry::NodeSchema;
use crate::value::ParamValue;

/// Unique identifier for a node in the graph.
///
/// Node IDs are assigned sequentially and never reused within a store
/// instance. They remain stable across every mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }

    /// Builds an id from a raw value, e.g. one read back from a project file.
    ///
    /// The id is only meaningful to the store that issued it.
    #[inline]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Identifier for a node group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub(crate) u32);

impl GroupId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Which family of input slots a connection targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    /// Image input.
    Main,
    /// Scalar modulation input.
    Control,
}

impl core::fmt::Display for SlotKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Control => f.write_str("control"),
        }
    }
}

/// Editor position of a node. Carried for persistence only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f32,
    /// Vertical coordinate.
    pub y: f32,
}

impl Position {
    /// Creates a position.
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A named set of nodes that can be disabled together.
#[derive(Clone, Debug, PartialEq)]
pub struct Group {
    /// Group identifier.
    pub id: GroupId,
    /// Display name.
    pub name: String,
    /// A disabled group suppresses evaluation of all its members.
    pub enabled: bool,
}

/// A node in the graph.
///
/// Slot arrays are sized from the schema at creation and never resized.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) schema: Arc<NodeSchema>,
    pub(crate) name: String,
    pub(crate) position: Position,
    pub(crate) enabled: bool,
    pub(crate) group: Option<GroupId>,
    pub(crate) params: BTreeMap<String, ParamValue>,
    pub(crate) main_inputs: Box<[Option<NodeId>]>,
    pub(crate) control_inputs: Box<[Option<NodeId>]>,
}

impl Node {
    pub(crate) fn new(id: NodeId, schema: Arc<NodeSchema>, position: Position) -> Self {
        let params = schema
            .params
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Self {
            id,
            name: format!("{} {}", schema.display_name, id.0),
            position,
            enabled: true,
            group: None,
            params,
            main_inputs: vec![None; schema.main_inputs].into_boxed_slice(),
            control_inputs: vec![None; schema.control_inputs].into_boxed_slice(),
            schema,
        }
    }

    /// Node identifier.
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Type tag from the schema.
    #[inline]
    pub fn type_tag(&self) -> &str {
        &self.schema.type_tag
    }

    /// The resolved schema.
    #[inline]
    pub fn schema(&self) -> &Arc<NodeSchema> {
        &self.schema
    }

    /// User-visible name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Editor position.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Whether the node itself is enabled (ignores group state).
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Owning group, if any.
    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    /// Current value of a parameter.
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    /// Numeric parameter value, if present and numeric.
    pub fn param_number(&self, name: &str) -> Option<f32> {
        self.params.get(name).and_then(ParamValue::as_number)
    }

    /// All parameters in name order.
    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }

    /// Main input slots.
    pub fn main_inputs(&self) -> &[Option<NodeId>] {
        &self.main_inputs
    }

    /// Control input slots.
    pub fn control_inputs(&self) -> &[Option<NodeId>] {
        &self.control_inputs
    }

    /// Slots of the given kind.
    pub fn slots(&self, kind: SlotKind) -> &[Option<NodeId>] {
        match kind {
            SlotKind::Main => &self.main_inputs,
            SlotKind::Control => &self.control_inputs,
        }
    }

    pub(crate) fn slots_mut(&mut self, kind: SlotKind) -> &mut [Option<NodeId>] {
        match kind {
            SlotKind::Main => &mut self.main_inputs,
            SlotKind::Control => &mut self.control_inputs,
        }
    }

    /// Every connected producer, main slots first, in slot order.
    ///
    /// A producer feeding several slots appears once per slot.
    pub fn dependencies(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.main_inputs
            .iter()
            .chain(self.control_inputs.iter())
            .filter_map(|slot| *slot)
    }

    /// Returns `true` if `producer` feeds any slot of this node.
    pub fn depends_on(&self, producer: NodeId) -> bool {
        self.dependencies().any(|d| d == producer)
    }
}
