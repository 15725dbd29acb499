//! Graph store: the live set of nodes and the mutation API.
//!
//! [`GraphStore`] owns every [`Node`] in an arena indexed by [`NodeId`].
//! Connections are not separate objects; a connection is the producer id
//! stored in one of the consumer's input slots.
//!
//! All mutations are synchronous and complete before they return, so a frame
//! never observes a half-applied edit. Structural mutations that would break
//! an invariant (self-connection, cycles, out-of-range slots, deleting the
//! terminal) are rejected with a [`GraphError`], logged, and leave the store
//! unchanged.

use std::sync::Arc;

use crate::error::{GraphError, RegistryError, ValidationError};
use crate::param_info::{Correction, ParamConstraint};
use crate::registry::NodeRegistry;
use crate::value::ParamValue;

use super::node::{Group, GroupId, Node, NodeId, Position, SlotKind};

/// A consumer-side view of one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotRef {
    /// Node owning the slot.
    pub consumer: NodeId,
    /// Slot family.
    pub kind: SlotKind,
    /// Slot index.
    pub index: usize,
}

/// The live node graph.
///
/// # Usage
///
/// 1. Create a store with [`new()`](Self::new); the terminal node exists
///    immediately
/// 2. Add nodes: [`create_node()`](Self::create_node)
/// 3. Wire them: [`connect()`](Self::connect) / [`disconnect()`](Self::disconnect)
/// 4. Edit parameters: [`set_param()`](Self::set_param)
/// 5. Remove nodes: [`delete_node()`](Self::delete_node)
#[derive(Debug, Clone)]
pub struct GraphStore {
    registry: Arc<NodeRegistry>,
    nodes: Vec<Option<Node>>,
    terminal: NodeId,
    main_output: Option<NodeId>,
    groups: Vec<Group>,
    topology_revision: u64,
}

impl GraphStore {
    /// Creates a store containing only the permanent terminal node.
    pub fn new(registry: Arc<NodeRegistry>) -> Result<Self, RegistryError> {
        let schema = Arc::clone(registry.terminal_schema()?);
        let terminal = NodeId(0);
        let node = Node::new(terminal, schema, Position::default());
        tracing::debug!("graph_create: {terminal} ({}, terminal)", node.type_tag());
        Ok(Self {
            registry,
            nodes: vec![Some(node)],
            terminal,
            main_output: None,
            groups: Vec::new(),
            topology_revision: 0,
        })
    }

    /// The registry schemas are resolved from.
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Id of the permanent terminal node.
    #[inline]
    pub fn terminal(&self) -> NodeId {
        self.terminal
    }

    /// Counter that changes on every structural mutation.
    #[inline]
    pub fn topology_revision(&self) -> u64 {
        self.topology_revision
    }

    /// Returns the node with `id`, if it exists.
    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Returns `true` if a node with `id` exists.
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Iterates live nodes in id order (terminal first).
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().flatten()
    }

    /// Live node ids in ascending order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes().map(Node::id).collect()
    }

    /// Number of live nodes, terminal included.
    pub fn len(&self) -> usize {
        self.nodes().count()
    }

    /// Always `false`: the terminal node is permanent.
    pub fn is_empty(&self) -> bool {
        false
    }

    fn get(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.node(id).ok_or(GraphError::NodeNotFound(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.nodes
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(GraphError::NodeNotFound(id))
    }

    fn bump(&mut self) {
        self.topology_revision = self.topology_revision.wrapping_add(1);
    }

    /// Creates a node of `type_tag` with default parameters and empty slots.
    ///
    /// The tag is resolved through [`NodeRegistry::resolve`], so non-canonical
    /// spellings are accepted. The terminal type cannot be instantiated again.
    pub fn create_node(&mut self, type_tag: &str, position: Position) -> Result<NodeId, GraphError> {
        let schema = self
            .registry
            .resolve(type_tag)
            .cloned()
            .ok_or_else(|| GraphError::UnknownNodeType(type_tag.to_owned()))?;
        if schema.terminal {
            return Err(GraphError::PermanentNode(self.terminal));
        }

        let id = NodeId(self.nodes.len() as u32);
        let node = Node::new(id, schema, position);
        tracing::debug!("graph_create: {id} ({})", node.type_tag());
        self.nodes.push(Some(node));
        self.bump();
        Ok(id)
    }

    /// Deletes a node.
    ///
    /// Returns `Ok(false)` if the node was already gone. Every slot in every
    /// other node that referenced it is nulled. If it was the main output
    /// selection, the selection moves to the lowest-id remaining non-terminal
    /// node, or to none.
    pub fn delete_node(&mut self, id: NodeId) -> Result<bool, GraphError> {
        if id == self.terminal {
            tracing::warn!("graph_delete: rejected {id}: terminal is permanent");
            return Err(GraphError::PermanentNode(id));
        }
        let Some(slot) = self.nodes.get_mut(id.0 as usize) else {
            return Ok(false);
        };
        if slot.take().is_none() {
            return Ok(false);
        }

        let mut nulled = 0usize;
        for node in self.nodes.iter_mut().flatten() {
            for input in node
                .main_inputs
                .iter_mut()
                .chain(node.control_inputs.iter_mut())
            {
                if *input == Some(id) {
                    *input = None;
                    nulled += 1;
                }
            }
        }

        if self.main_output == Some(id) {
            let reassigned = self
                .nodes()
                .map(Node::id)
                .find(|&n| n != self.terminal);
            self.main_output = reassigned;
            tracing::debug!("graph_main_output: reassigned to {:?}", self.main_output);
        }

        self.bump();
        tracing::debug!("graph_delete: {id} ({nulled} slots nulled)");
        Ok(true)
    }

    /// Deletes every node except the terminal and clears the terminal input.
    ///
    /// Returns the ids that were removed.
    pub fn clear(&mut self) -> Vec<NodeId> {
        let removed: Vec<NodeId> = self
            .nodes()
            .map(Node::id)
            .filter(|&id| id != self.terminal)
            .collect();
        for &id in &removed {
            if let Some(slot) = self.nodes.get_mut(id.0 as usize) {
                *slot = None;
            }
        }
        if let Ok(terminal) = self.get_mut(self.terminal) {
            terminal.main_inputs.fill(None);
            terminal.control_inputs.fill(None);
        }
        self.main_output = None;
        self.groups.clear();
        self.bump();
        tracing::debug!("graph_clear: {} nodes removed", removed.len());
        removed
    }

    /// Connects `producer` into slot `index` of `consumer`.
    ///
    /// Returns the producer previously occupying the slot. Fails without
    /// mutating the graph if:
    /// - `producer == consumer`
    /// - either node doesn't exist
    /// - `producer` is the terminal node
    /// - the slot index is out of range for the consumer's type
    /// - `consumer` already feeds `producer`, directly or transitively
    pub fn connect(
        &mut self,
        producer: NodeId,
        consumer: NodeId,
        index: usize,
        kind: SlotKind,
    ) -> Result<Option<NodeId>, GraphError> {
        if let Err(err) = self.check_connect(producer, consumer, index, kind) {
            tracing::warn!("graph_connect: rejected {producer} → {consumer}: {err}");
            return Err(err);
        }

        let node = self.get_mut(consumer)?;
        let previous = node.slots_mut(kind)[index].replace(producer);
        self.bump();
        tracing::debug!("graph_connect: {producer} → {consumer} [{kind} {index}]");
        Ok(previous)
    }

    fn check_connect(
        &self,
        producer: NodeId,
        consumer: NodeId,
        index: usize,
        kind: SlotKind,
    ) -> Result<(), GraphError> {
        if producer == consumer {
            return Err(GraphError::SelfConnection(producer));
        }
        self.get(producer)?;
        let node = self.get(consumer)?;
        if producer == self.terminal {
            return Err(GraphError::TerminalAsProducer(producer));
        }
        let count = node.slots(kind).len();
        if index >= count {
            return Err(GraphError::SlotOutOfRange {
                node: consumer,
                kind,
                index,
                count,
            });
        }
        if self.would_create_cycle(producer, consumer) {
            return Err(GraphError::CycleDetected { producer, consumer });
        }
        Ok(())
    }

    /// Returns `true` if connecting `producer` into `consumer` would close a
    /// cycle, i.e. `producer` already depends on `consumer`.
    pub fn would_create_cycle(&self, producer: NodeId, consumer: NodeId) -> bool {
        producer == consumer || self.can_reach(producer, consumer)
    }

    /// Depth-first walk over dependency edges from `from` looking for `target`.
    fn can_reach(&self, from: NodeId, target: NodeId) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            let idx = current.0 as usize;
            if idx >= visited.len() || visited[idx] {
                continue;
            }
            visited[idx] = true;

            if let Some(node) = self.node(current) {
                stack.extend(node.dependencies());
            }
        }
        false
    }

    /// Clears slot `index` of `consumer`. Returns the producer that was there.
    pub fn disconnect(
        &mut self,
        consumer: NodeId,
        index: usize,
        kind: SlotKind,
    ) -> Result<Option<NodeId>, GraphError> {
        let node = self.get_mut(consumer)?;
        let count = node.slots(kind).len();
        let Some(slot) = node.slots_mut(kind).get_mut(index) else {
            return Err(GraphError::SlotOutOfRange {
                node: consumer,
                kind,
                index,
                count,
            });
        };
        let previous = slot.take();
        if previous.is_some() {
            self.bump();
            tracing::debug!("graph_disconnect: {consumer} [{kind} {index}]");
        }
        Ok(previous)
    }

    /// Every slot that `producer` currently feeds.
    ///
    /// Computed by scanning the store; there is no stored reverse index.
    pub fn consumers_of(&self, producer: NodeId) -> Vec<SlotRef> {
        let mut out = Vec::new();
        for node in self.nodes() {
            for kind in [SlotKind::Main, SlotKind::Control] {
                for (index, slot) in node.slots(kind).iter().enumerate() {
                    if *slot == Some(producer) {
                        out.push(SlotRef {
                            consumer: node.id,
                            kind,
                            index,
                        });
                    }
                }
            }
        }
        out
    }

    /// The constraint governing parameter `name` on node `id`.
    ///
    /// Fails if the node doesn't exist or its type doesn't declare `name`.
    pub fn constraint_for(&self, id: NodeId, name: &str) -> Result<&ParamConstraint, GraphError> {
        let node = self.get(id)?;
        let unknown = || ValidationError::UnknownParameter {
            param: name.to_owned(),
        };
        if !node.schema.declares(name) {
            return Err(unknown().into());
        }
        self.registry
            .constraints()
            .get(name)
            .ok_or_else(|| unknown().into())
    }

    /// Writes a parameter after validating it against the constraint table.
    ///
    /// Out-of-range and wrong-kind values are corrected; the correction is
    /// returned and logged. Unknown and read-only parameters are rejected.
    pub fn set_param(
        &mut self,
        id: NodeId,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<Option<Correction>, GraphError> {
        let constraint = self.constraint_for(id, name)?;
        if constraint.is_read_only() {
            return Err(ValidationError::ReadOnly {
                param: name.to_owned(),
            }
            .into());
        }
        let validated = constraint.coerce(&value.into());
        if let Some(correction) = &validated.correction {
            tracing::warn!("graph_param: {id} {correction}");
        }

        let node = self.get_mut(id)?;
        node.params.insert(name.to_owned(), validated.value);
        Ok(validated.correction)
    }

    /// Writes a stored value when restoring a project.
    ///
    /// Like [`set_param`](Self::set_param) but also accepts read-only
    /// parameters, which may only change through persistence.
    pub fn restore_param(
        &mut self,
        id: NodeId,
        name: &str,
        value: ParamValue,
    ) -> Result<Option<Correction>, GraphError> {
        let validated = self.constraint_for(id, name)?.coerce(&value);
        self.get_mut(id)?
            .params
            .insert(name.to_owned(), validated.value);
        Ok(validated.correction)
    }

    /// Enables or disables a node. Disabled nodes keep their place in the
    /// evaluation order but are skipped.
    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) -> Result<(), GraphError> {
        self.get_mut(id)?.enabled = enabled;
        tracing::debug!("graph_enable: {id} = {enabled}");
        Ok(())
    }

    /// Renames a node.
    pub fn rename(&mut self, id: NodeId, name: impl Into<String>) -> Result<(), GraphError> {
        self.get_mut(id)?.name = name.into();
        Ok(())
    }

    /// Moves a node in the editor.
    pub fn set_position(&mut self, id: NodeId, position: Position) -> Result<(), GraphError> {
        self.get_mut(id)?.position = position;
        Ok(())
    }

    /// Creates an enabled, empty group.
    pub fn create_group(&mut self, name: impl Into<String>) -> GroupId {
        let id = GroupId(self.groups.len() as u32);
        self.groups.push(Group {
            id,
            name: name.into(),
            enabled: true,
        });
        id
    }

    /// Returns a group by id.
    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(id.0 as usize)
    }

    /// All groups in creation order.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Moves a node into `group`, or out of any group with `None`.
    pub fn assign_group(&mut self, id: NodeId, group: Option<GroupId>) -> Result<(), GraphError> {
        if let Some(g) = group
            && self.group(g).is_none()
        {
            return Err(GraphError::GroupNotFound(g.0));
        }
        self.get_mut(id)?.group = group;
        Ok(())
    }

    /// Enables or disables every member of a group.
    pub fn set_group_enabled(&mut self, group: GroupId, enabled: bool) -> Result<(), GraphError> {
        let g = self
            .groups
            .get_mut(group.0 as usize)
            .ok_or(GraphError::GroupNotFound(group.0))?;
        g.enabled = enabled;
        tracing::debug!("graph_group: {} enabled = {enabled}", g.name);
        Ok(())
    }

    /// Returns `true` if the node exists, is enabled, and its group (if any)
    /// is enabled.
    pub fn is_active(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|node| {
            node.enabled
                && node
                    .group
                    .and_then(|g| self.group(g))
                    .is_none_or(|g| g.enabled)
        })
    }

    /// The node selected as main output, if any.
    pub fn main_output(&self) -> Option<NodeId> {
        self.main_output
    }

    /// Selects the main output node.
    pub fn set_main_output(&mut self, id: Option<NodeId>) -> Result<(), GraphError> {
        if let Some(id) = id {
            self.get(id)?;
        }
        self.main_output = id;
        Ok(())
    }

    /// Writes a slot with no validation. Lets tests build graphs the
    /// scheduler must defend against.
    #[cfg(test)]
    pub(crate) fn force_connect(
        &mut self,
        producer: NodeId,
        consumer: NodeId,
        index: usize,
        kind: SlotKind,
    ) {
        if let Ok(node) = self.get_mut(consumer) {
            node.slots_mut(kind)[index] = Some(producer);
        }
    }
}
