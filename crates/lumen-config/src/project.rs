//! Persisted graph format.
//!
//! A project is an ordered node list plus the route table. Slot references
//! and route targets use the ids the nodes had when saved; loading remaps
//! them in two passes: every node is created first (the terminal record maps
//! onto the store's existing terminal), then slot references, the terminal
//! input and routes are resolved through the old → new id map.
//!
//! Loading is forgiving: an unknown node type, a reference to a missing
//! node, or a connection the store rejects is recorded in the
//! [`LoadReport`] and the rest of the project still loads.
//!
//! # JSON Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "nodes": [
//!     { "id": 0, "typeTag": "Canvas", "x": 0.0, "y": 0.0, "params": { "opacity": 1.0 },
//!       "enabled": true, "mainInputs": [2], "controlInputs": [null] },
//!     { "id": 1, "typeTag": "Oscillator", "x": -200.0, "y": 0.0, "params": { "frequency": 4.0 },
//!       "enabled": true, "mainInputs": [], "controlInputs": [null] }
//!   ],
//!   "terminalInput": 2,
//!   "routes": [
//!     { "sourceKey": "audio.bass", "nodeId": 2, "paramName": "brightness", "outMin": -1.0, "outMax": 1.0 }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use lumen_core::{
    Correction, GraphError, GraphStore, GroupId, NodeId, ParamValue, Position, SlotKind,
};
use lumen_platform::{ControlRoute, ControlRouter, RouteError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ConfigError;

/// Newest project format version this build writes and reads.
pub const PROJECT_VERSION: u32 = 1;

fn default_enabled() -> bool {
    true
}

/// One saved node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    /// Id at save time.
    pub id: NodeId,
    /// Node type.
    pub type_tag: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Editor x coordinate.
    #[serde(default)]
    pub x: f32,
    /// Editor y coordinate.
    #[serde(default)]
    pub y: f32,
    /// Parameter values.
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
    /// Whether the node evaluates.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Group id at save time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<u32>,
    /// Main input producers (save-time ids).
    #[serde(default)]
    pub main_inputs: Vec<Option<NodeId>>,
    /// Control input producers (save-time ids).
    #[serde(default)]
    pub control_inputs: Vec<Option<NodeId>>,
}

impl NodeRecord {
    /// Creates a record with defaults for everything but id and type.
    pub fn new(id: NodeId, type_tag: impl Into<String>) -> Self {
        Self {
            id,
            type_tag: type_tag.into(),
            name: None,
            x: 0.0,
            y: 0.0,
            params: BTreeMap::new(),
            enabled: true,
            group: None,
            main_inputs: Vec::new(),
            control_inputs: Vec::new(),
        }
    }

    /// Sets the editor position.
    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Sets a parameter value.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Sets the main input producers.
    pub fn with_main_inputs(mut self, inputs: impl IntoIterator<Item = Option<NodeId>>) -> Self {
        self.main_inputs = inputs.into_iter().collect();
        self
    }

    /// Sets the control input producers.
    pub fn with_control_inputs(
        mut self,
        inputs: impl IntoIterator<Item = Option<NodeId>>,
    ) -> Self {
        self.control_inputs = inputs.into_iter().collect();
        self
    }
}

/// One saved group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Id at save time.
    pub id: u32,
    /// Group name.
    pub name: String,
    /// Whether members evaluate.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// A saved project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    /// Format version.
    pub version: u32,
    /// Optional project name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Nodes in id order.
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    /// Producer feeding the terminal node.
    #[serde(default)]
    pub terminal_input: Option<NodeId>,
    /// Main output selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_output: Option<NodeId>,
    /// Node groups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupRecord>,
    /// Active route table.
    #[serde(default)]
    pub routes: Vec<ControlRoute>,
}

impl Default for ProjectFile {
    fn default() -> Self {
        Self {
            version: PROJECT_VERSION,
            name: None,
            nodes: Vec::new(),
            terminal_input: None,
            main_output: None,
            groups: Vec::new(),
            routes: Vec::new(),
        }
    }
}

impl ProjectFile {
    /// Creates an empty project.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the project name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a node record.
    pub fn with_node(mut self, record: NodeRecord) -> Self {
        self.nodes.push(record);
        self
    }

    /// Adds a route.
    pub fn with_route(mut self, route: ControlRoute) -> Self {
        self.routes.push(route);
        self
    }

    /// Sets the terminal input.
    pub fn with_terminal_input(mut self, producer: NodeId) -> Self {
        self.terminal_input = Some(producer);
        self
    }

    /// Parse a project from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let project: Self = serde_json::from_str(json)?;
        if project.version > PROJECT_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: project.version,
                supported: PROJECT_VERSION,
            });
        }
        Ok(project)
    }

    /// Convert the project to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a project from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let project = Self::from_json(&content)?;
        tracing::debug!(
            "config_load: {} nodes, {} routes from {}",
            project.nodes.len(),
            project.routes.len(),
            path.display()
        );
        Ok(project)
    }

    /// Save the project to a JSON file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }
        let content = self.to_json()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }
}

/// Captures the store and route table as a [`ProjectFile`].
pub fn serialize_graph(store: &GraphStore, router: &ControlRouter) -> ProjectFile {
    let nodes = store
        .nodes()
        .map(|node| {
            let position = node.position();
            NodeRecord {
                id: node.id(),
                type_tag: node.type_tag().to_owned(),
                name: Some(node.name().to_owned()),
                x: position.x,
                y: position.y,
                params: node.params().clone(),
                enabled: node.is_enabled(),
                group: node.group().map(GroupId::index),
                main_inputs: node.main_inputs().to_vec(),
                control_inputs: node.control_inputs().to_vec(),
            }
        })
        .collect();
    let groups = store
        .groups()
        .iter()
        .map(|g| GroupRecord {
            id: g.id.index(),
            name: g.name.clone(),
            enabled: g.enabled,
        })
        .collect();
    let terminal_input = store
        .node(store.terminal())
        .and_then(|t| t.main_inputs().first().copied().flatten());

    ProjectFile {
        version: PROJECT_VERSION,
        name: None,
        nodes,
        terminal_input,
        main_output: store.main_output(),
        groups,
        routes: router.routes().to_vec(),
    }
}

/// A problem found while loading a project. None of these stop the load.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadIssue {
    /// A record names a node type the registry doesn't know.
    #[error("node {record}: unknown type {type_tag:?}")]
    UnknownNodeType {
        /// Save-time id.
        record: NodeId,
        /// The unknown type.
        type_tag: String,
    },

    /// A second record claims to be the terminal node.
    #[error("node {record}: duplicate terminal record ignored")]
    DuplicateTerminal {
        /// Save-time id.
        record: NodeId,
    },

    /// A slot or route references a node that isn't in the file.
    #[error("{consumer} references missing node {producer}")]
    DanglingReference {
        /// Save-time id of the referring node.
        consumer: NodeId,
        /// Save-time id that could not be resolved.
        producer: NodeId,
    },

    /// The store rejected a saved connection.
    #[error("connection {producer} → {consumer} ({kind} slot {slot}) rejected: {error}")]
    Connection {
        /// Save-time producer id.
        producer: NodeId,
        /// Save-time consumer id.
        consumer: NodeId,
        /// Slot kind.
        kind: SlotKind,
        /// Slot index.
        slot: usize,
        /// Why the store refused it.
        error: GraphError,
    },

    /// A saved parameter was not accepted.
    #[error("node {record}: parameter {param:?} rejected: {error}")]
    Parameter {
        /// Save-time id.
        record: NodeId,
        /// Parameter name.
        param: String,
        /// Why it was rejected.
        error: GraphError,
    },

    /// A record names a group that isn't in the file.
    #[error("node {record}: unknown group {group}")]
    UnknownGroup {
        /// Save-time id.
        record: NodeId,
        /// Save-time group id.
        group: u32,
    },

    /// A saved route could not be recreated.
    #[error("route {} → {}.{} rejected: {error}", route.source_key, route.node_id, route.param)]
    Route {
        /// The route as saved.
        route: ControlRoute,
        /// Why it was rejected.
        error: RouteError,
    },
}

/// Outcome of [`load_graph`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Save-time id → live id.
    pub id_map: BTreeMap<NodeId, NodeId>,
    /// Nodes the load removed from the store before rebuilding it.
    pub removed: Vec<NodeId>,
    /// Problems encountered.
    pub issues: Vec<LoadIssue>,
    /// Parameter values corrected on load.
    pub corrections: Vec<Correction>,
}

impl LoadReport {
    /// Returns `true` if nothing had to be skipped.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Live id of a save-time id.
    pub fn live_id(&self, saved: NodeId) -> Option<NodeId> {
        self.id_map.get(&saved).copied()
    }
}

/// Replaces the store's contents and the route table with a project.
pub fn load_graph(
    project: &ProjectFile,
    store: &mut GraphStore,
    router: &mut ControlRouter,
) -> LoadReport {
    let mut report = LoadReport {
        removed: store.clear(),
        ..LoadReport::default()
    };
    router.clear();
    let terminal = store.terminal();

    let mut groups: HashMap<u32, GroupId> = HashMap::new();
    for record in &project.groups {
        let id = store.create_group(record.name.clone());
        if !record.enabled {
            // The group was just created, so this can't fail.
            let _ = store.set_group_enabled(id, false);
        }
        groups.insert(record.id, id);
    }

    // Pass 1: nodes.
    for record in &project.nodes {
        let is_terminal = store
            .registry()
            .resolve(&record.type_tag)
            .is_some_and(|s| s.terminal);
        let live = if is_terminal {
            if report.id_map.values().any(|&v| v == terminal) {
                report
                    .issues
                    .push(LoadIssue::DuplicateTerminal { record: record.id });
                continue;
            }
            terminal
        } else {
            match store.create_node(&record.type_tag, Position::new(record.x, record.y)) {
                Ok(id) => id,
                Err(_) => {
                    report.issues.push(LoadIssue::UnknownNodeType {
                        record: record.id,
                        type_tag: record.type_tag.clone(),
                    });
                    continue;
                }
            }
        };
        report.id_map.insert(record.id, live);
        restore_node(store, record, live, &groups, &mut report);
    }

    // Pass 2: references.
    for record in &project.nodes {
        let Some(consumer) = report.live_id(record.id) else {
            continue;
        };
        for (kind, slots) in [
            (SlotKind::Main, &record.main_inputs),
            (SlotKind::Control, &record.control_inputs),
        ] {
            for (slot, producer) in slots.iter().enumerate() {
                let Some(saved) = *producer else {
                    continue;
                };
                connect_saved(store, &mut report, saved, record.id, consumer, kind, slot);
            }
        }
    }

    if let Some(saved) = project.terminal_input
        && store
            .node(terminal)
            .is_some_and(|t| t.main_inputs().first() == Some(&None))
    {
        let record = project
            .nodes
            .iter()
            .find(|r| report.live_id(r.id) == Some(terminal))
            .map_or(terminal, |r| r.id);
        connect_saved(store, &mut report, saved, record, terminal, SlotKind::Main, 0);
    }

    if let Some(saved) = project.main_output
        && let Some(live) = report.live_id(saved)
    {
        // Live ids come from the store.
        let _ = store.set_main_output(Some(live));
    }

    // Routes.
    for route in &project.routes {
        let Some(node) = report.live_id(route.node_id) else {
            report.issues.push(LoadIssue::Route {
                route: route.clone(),
                error: RouteError::NodeNotFound(route.node_id),
            });
            continue;
        };
        if let Err(error) = router.create_route(
            store,
            &route.source_key,
            node,
            &route.param,
            route.out_min,
            route.out_max,
        ) {
            report.issues.push(LoadIssue::Route {
                route: route.clone(),
                error,
            });
        }
    }

    for issue in &report.issues {
        tracing::warn!("config_load: {issue}");
    }
    tracing::info!(
        "config_load: {} nodes, {} routes, {} issues",
        report.id_map.len(),
        router.len(),
        report.issues.len()
    );
    report
}

fn restore_node(
    store: &mut GraphStore,
    record: &NodeRecord,
    live: NodeId,
    groups: &HashMap<u32, GroupId>,
    report: &mut LoadReport,
) {
    // `live` was just created or is the terminal; these only fail for
    // missing nodes.
    let _ = store.set_position(live, Position::new(record.x, record.y));
    let _ = store.set_enabled(live, record.enabled);
    if let Some(name) = &record.name {
        let _ = store.rename(live, name.clone());
    }
    if let Some(saved) = record.group {
        match groups.get(&saved) {
            Some(&group) => {
                let _ = store.assign_group(live, Some(group));
            }
            None => report.issues.push(LoadIssue::UnknownGroup {
                record: record.id,
                group: saved,
            }),
        }
    }
    for (param, value) in &record.params {
        match store.restore_param(live, param, value.clone()) {
            Ok(correction) => report.corrections.extend(correction),
            Err(error) => report.issues.push(LoadIssue::Parameter {
                record: record.id,
                param: param.clone(),
                error,
            }),
        }
    }
}

fn connect_saved(
    store: &mut GraphStore,
    report: &mut LoadReport,
    saved_producer: NodeId,
    saved_consumer: NodeId,
    consumer: NodeId,
    kind: SlotKind,
    slot: usize,
) {
    let Some(producer) = report.live_id(saved_producer) else {
        report.issues.push(LoadIssue::DanglingReference {
            consumer: saved_consumer,
            producer: saved_producer,
        });
        return;
    };
    if let Err(error) = store.connect(producer, consumer, slot, kind) {
        report.issues.push(LoadIssue::Connection {
            producer: saved_producer,
            consumer: saved_consumer,
            kind,
            slot,
            error,
        });
    }
}
