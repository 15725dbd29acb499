//! Error types for graph mutation, parameter validation and schema registration.

use thiserror::Error;

use crate::graph::{NodeId, SlotKind};

/// Structural errors raised by the graph store.
///
/// Every variant is a rejected mutation: the store is left unchanged when one
/// of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// The referenced node does not exist (never created or already deleted).
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    /// A node cannot be connected to itself.
    #[error("cannot connect {0} to itself")]
    SelfConnection(NodeId),

    /// The connection would make `consumer` a transitive input of itself.
    #[error("connecting {producer} into {consumer} would create a cycle")]
    CycleDetected {
        /// Node that would provide data.
        producer: NodeId,
        /// Node that would consume it.
        consumer: NodeId,
    },

    /// The slot index exceeds the node type's fixed slot count.
    #[error("{kind} slot {index} out of range for {node} ({count} slots)")]
    SlotOutOfRange {
        /// Consumer node.
        node: NodeId,
        /// Slot family.
        kind: SlotKind,
        /// Requested index.
        index: usize,
        /// Number of slots of this kind on the node.
        count: usize,
    },

    /// The terminal node cannot be deleted.
    #[error("{0} is permanent and cannot be deleted")]
    PermanentNode(NodeId),

    /// The terminal node only consumes; it cannot feed another node.
    #[error("terminal node {0} cannot be used as a producer")]
    TerminalAsProducer(NodeId),

    /// No schema is registered for the requested type tag.
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    /// The referenced group does not exist.
    #[error("group {0} not found")]
    GroupNotFound(u32),

    /// A parameter write was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Parameter writes that cannot be corrected into a valid value.
///
/// Out-of-range and wrong-kind values are not errors; they are corrected and
/// reported through [`Correction`](crate::Correction).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No constraint exists for this parameter name, or the node type does
    /// not declare it.
    #[error("unknown parameter: {param}")]
    UnknownParameter {
        /// Parameter name.
        param: String,
    },

    /// The parameter is flagged read-only.
    #[error("parameter '{param}' is read-only")]
    ReadOnly {
        /// Parameter name.
        param: String,
    },
}

/// Errors raised while building a [`NodeRegistry`](crate::NodeRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A schema with this type tag is already registered.
    #[error("node type '{0}' is already registered")]
    DuplicateType(String),

    /// A schema declares a parameter missing from the constraint table.
    #[error("node type '{node_type}' declares unknown parameter '{param}'")]
    UnknownParameter {
        /// Type tag of the offending schema.
        node_type: String,
        /// Parameter name.
        param: String,
    },

    /// No terminal schema has been registered.
    #[error("registry has no terminal node type")]
    MissingTerminal,

    /// A terminal schema is malformed or a second one was registered.
    #[error("invalid terminal node type '{0}': {1}")]
    InvalidTerminal(String, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn cycle_display_names_both_ends() {
        let err = GraphError::CycleDetected {
            producer: NodeId(3),
            consumer: NodeId(1),
        };
        assert_eq!(
            err.to_string(),
            "connecting NodeId(3) into NodeId(1) would create a cycle"
        );
    }

    #[test]
    fn slot_out_of_range_display() {
        let err = GraphError::SlotOutOfRange {
            node: NodeId(2),
            kind: SlotKind::Control,
            index: 4,
            count: 1,
        };
        assert_eq!(
            err.to_string(),
            "control slot 4 out of range for NodeId(2) (1 slots)"
        );
    }

    #[test]
    fn validation_is_transparent() {
        let err: GraphError = ValidationError::ReadOnly {
            param: "seed".into(),
        }
        .into();
        assert_eq!(err.to_string(), "parameter 'seed' is read-only");
        assert!(err.source().is_none());
    }

    #[test]
    fn registry_display() {
        let err = RegistryError::UnknownParameter {
            node_type: "Blend".into(),
            param: "wobble".into(),
        };
        assert_eq!(
            err.to_string(),
            "node type 'Blend' declares unknown parameter 'wobble'"
        );
        assert_eq!(
            RegistryError::MissingTerminal.to_string(),
            "registry has no terminal node type"
        );
    }
}
