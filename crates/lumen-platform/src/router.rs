//! Routing of external signals into node parameters.
//!
//! A [`ControlRoute`] binds one source key to one `(node, parameter)` pair
//! with a linear output range. [`ControlRouter::apply`] runs once per tick,
//! before evaluation:
//!
//! ```text
//! normalized = raw / category.range()        // MIDI 0..127 → 0..1
//! mapped     = out_min + normalized * (out_max - out_min)
//! ```
//!
//! The mapped scalar is shaped for the parameter's kind (nearest enum entry,
//! grey level for colors) and written through [`GraphStore::set_param`], so
//! every routed value passes the same constraint check as an editor write.
//!
//! At most one route drives a given parameter: [`ControlRouter::create_route`]
//! evicts any existing route for the same pair, whatever its source category.
//! Removing a route leaves the parameter at its last written value.
//!
//! # Example
//!
//! ```rust,ignore
//! use lumen_platform::{ControlRouter, SignalSnapshot};
//!
//! let mut router = ControlRouter::new();
//! router.create_route(&store, "audio.bass", adjust, "brightness", -1.0, 1.0)?;
//!
//! let snapshot = SignalSnapshot::new().with("audio.bass", 0.5);
//! let report = router.apply(&snapshot, &mut store);
//! assert_eq!(store.node(adjust).unwrap().param_number("brightness"), Some(0.0));
//! ```

use lumen_core::{Correction, GraphError, GraphStore, NodeId, ValidationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signals::{SignalCategory, SignalSnapshot, SourceKey};

/// Errors raised when creating a route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The source key is malformed or names an unknown category.
    #[error("invalid source key {key:?}: {reason}")]
    InvalidSourceKey {
        /// Offending key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The target node does not exist.
    #[error("route target {0} not found")]
    NodeNotFound(NodeId),

    /// The target node's type does not declare the parameter.
    #[error("{node} has no parameter {param:?}")]
    UnknownParameter {
        /// Target node.
        node: NodeId,
        /// Parameter name.
        param: String,
    },

    /// The parameter rejects external writes.
    #[error("parameter {param:?} on {node} is read-only")]
    ReadOnlyParameter {
        /// Target node.
        node: NodeId,
        /// Parameter name.
        param: String,
    },
}

/// A binding from a named signal to a node parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRoute {
    /// `<category>.<name>` key of the driving signal.
    pub source_key: String,
    /// Target node.
    pub node_id: NodeId,
    /// Target parameter.
    #[serde(rename = "paramName")]
    pub param: String,
    /// Output at normalized input 0.
    pub out_min: f32,
    /// Output at normalized input 1.
    pub out_max: f32,
}

impl ControlRoute {
    /// Maps a raw source value into the output range.
    pub fn map(&self, raw: f32) -> f32 {
        let range = SignalCategory::of_key(&self.source_key).map_or(1.0, SignalCategory::range);
        let normalized = raw / range;
        self.out_min + normalized * (self.out_max - self.out_min)
    }

    /// Returns `true` if this route drives `param` on `node`.
    pub fn targets(&self, node: NodeId, param: &str) -> bool {
        self.node_id == node && self.param == param
    }
}

/// Outcome of one [`ControlRouter::apply`] pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteReport {
    /// Routes whose value was written.
    pub applied: usize,
    /// Values corrected by the parameter constraint on write.
    pub corrections: Vec<Correction>,
    /// Routes skipped because their source has not published or their
    /// target no longer accepts the write.
    pub inert: Vec<ControlRoute>,
}

/// The live route table.
#[derive(Debug, Clone, Default)]
pub struct ControlRouter {
    routes: Vec<ControlRoute>,
}

impl ControlRouter {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a route, evicting any route that already drives the same
    /// `(node, param)` pair. Returns the evicted routes.
    pub fn create_route(
        &mut self,
        store: &GraphStore,
        source_key: &str,
        node: NodeId,
        param: &str,
        out_min: f32,
        out_max: f32,
    ) -> Result<Vec<ControlRoute>, RouteError> {
        let key = SourceKey::parse(source_key).map_err(|e| RouteError::InvalidSourceKey {
            key: source_key.to_owned(),
            reason: e.to_string(),
        })?;
        let constraint = store.constraint_for(node, param).map_err(|e| match e {
            GraphError::Validation(ValidationError::UnknownParameter { .. }) => {
                RouteError::UnknownParameter {
                    node,
                    param: param.to_owned(),
                }
            }
            _ => RouteError::NodeNotFound(node),
        })?;
        if constraint.is_read_only() {
            return Err(RouteError::ReadOnlyParameter {
                node,
                param: param.to_owned(),
            });
        }

        let evicted = self.take_routes(|r| r.targets(node, param));
        for old in &evicted {
            tracing::debug!(
                "route_evict: {} → {node}.{param} replaced by {key}",
                old.source_key
            );
        }
        self.routes.push(ControlRoute {
            source_key: key.as_str().to_owned(),
            node_id: node,
            param: param.to_owned(),
            out_min,
            out_max,
        });
        tracing::debug!("route_create: {key} → {node}.{param} [{out_min}, {out_max}]");
        Ok(evicted)
    }

    fn take_routes(&mut self, pred: impl Fn(&ControlRoute) -> bool) -> Vec<ControlRoute> {
        let mut taken = Vec::new();
        self.routes.retain(|r| {
            if pred(r) {
                taken.push(r.clone());
                false
            } else {
                true
            }
        });
        taken
    }

    /// Removes the route driving `param` on `node`. The parameter keeps its
    /// current value.
    pub fn remove_route(&mut self, node: NodeId, param: &str) -> Option<ControlRoute> {
        let removed = self.take_routes(|r| r.targets(node, param)).pop();
        if removed.is_some() {
            tracing::debug!("route_remove: {node}.{param}");
        }
        removed
    }

    /// Removes every route targeting `node`. Returns how many were removed.
    pub fn remove_routes_for_node(&mut self, node: NodeId) -> usize {
        let removed = self.take_routes(|r| r.node_id == node).len();
        if removed > 0 {
            tracing::debug!("route_prune: {removed} routes for deleted {node}");
        }
        removed
    }

    /// All routes in creation order.
    pub fn routes(&self) -> &[ControlRoute] {
        &self.routes
    }

    /// Routes driven by `source_key`.
    pub fn routes_from<'a>(&'a self, source_key: &'a str) -> impl Iterator<Item = &'a ControlRoute> {
        self.routes.iter().filter(move |r| r.source_key == source_key)
    }

    /// The route driving `param` on `node`, if any.
    pub fn route_for(&self, node: NodeId, param: &str) -> Option<&ControlRoute> {
        self.routes.iter().find(|r| r.targets(node, param))
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if there are no routes.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Removes every route.
    pub fn clear(&mut self) {
        self.routes.clear();
    }

    /// Writes every routed value into the store.
    pub fn apply(&self, snapshot: &SignalSnapshot, store: &mut GraphStore) -> RouteReport {
        let mut report = RouteReport::default();
        for route in &self.routes {
            let Some(raw) = snapshot.get(&route.source_key) else {
                report.inert.push(route.clone());
                continue;
            };
            let mapped = route.map(raw);

            let value = match store.constraint_for(route.node_id, &route.param) {
                Ok(constraint) => {
                    let current = store
                        .node(route.node_id)
                        .and_then(|n| n.param(&route.param));
                    constraint.route_value(mapped, current)
                }
                Err(e) => {
                    tracing::trace!("route_apply: {} inert: {e}", route.source_key);
                    report.inert.push(route.clone());
                    continue;
                }
            };

            match store.set_param(route.node_id, &route.param, value) {
                Ok(correction) => {
                    report.applied += 1;
                    report.corrections.extend(correction);
                }
                Err(e) => {
                    tracing::warn!(
                        "route_apply: {} → {}.{} rejected: {e}",
                        route.source_key,
                        route.node_id,
                        route.param
                    );
                    report.inert.push(route.clone());
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lumen_core::{
        ConstraintTable, CorrectionReason, NodeCategory, NodeRegistry, NodeSchema,
        ParamConstraint, ParamFlags, ParamValue, Position,
    };

    use super::*;

    fn store() -> GraphStore {
        GraphStore::new(Arc::new(lumen_registry::builtin().unwrap())).unwrap()
    }

    fn node(store: &mut GraphStore, tag: &str) -> NodeId {
        store.create_node(tag, Position::default()).unwrap()
    }

    #[test]
    fn audio_bass_drives_brightness() {
        let mut s = store();
        let b = node(&mut s, "ColorAdjust");
        let mut router = ControlRouter::new();
        router
            .create_route(&s, "audio.bass", b, "brightness", -1.0, 1.0)
            .unwrap();

        router.apply(&SignalSnapshot::new().with("audio.bass", 0.5), &mut s);
        assert_eq!(s.node(b).unwrap().param_number("brightness"), Some(0.0));

        router.apply(&SignalSnapshot::new().with("audio.bass", 1.0), &mut s);
        assert_eq!(s.node(b).unwrap().param_number("brightness"), Some(1.0));
    }

    #[test]
    fn new_route_evicts_across_categories() {
        let mut s = store();
        let b = node(&mut s, "ColorAdjust");
        let mut router = ControlRouter::new();
        router
            .create_route(&s, "audio.bass", b, "contrast", 0.0, 2.0)
            .unwrap();
        router
            .create_route(&s, "audio.treble", b, "brightness", 0.0, 1.0)
            .unwrap();
        let evicted = router
            .create_route(&s, "midi.cc37", b, "contrast", 0.5, 1.5)
            .unwrap();

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].source_key, "audio.bass");
        assert_eq!(router.len(), 2);
        assert_eq!(router.route_for(b, "contrast").unwrap().source_key, "midi.cc37");
    }

    #[test]
    fn midi_is_normalized() {
        let mut s = store();
        let b = node(&mut s, "ColorAdjust");
        let mut router = ControlRouter::new();
        router
            .create_route(&s, "midi.cc1", b, "contrast", 0.0, 2.0)
            .unwrap();
        router.apply(&SignalSnapshot::new().with("midi.cc1", 127.0), &mut s);
        assert_eq!(s.node(b).unwrap().param_number("contrast"), Some(2.0));
    }

    #[test]
    fn create_route_validates_target() {
        let mut s = store();
        let b = node(&mut s, "ColorAdjust");
        let mut router = ControlRouter::new();

        assert!(matches!(
            router.create_route(&s, "bass", b, "brightness", 0.0, 1.0),
            Err(RouteError::InvalidSourceKey { .. })
        ));
        assert_eq!(
            router.create_route(&s, "audio.bass", NodeId::from_raw(99), "brightness", 0.0, 1.0),
            Err(RouteError::NodeNotFound(NodeId::from_raw(99)))
        );
        assert_eq!(
            router.create_route(&s, "audio.bass", b, "frequency", 0.0, 1.0),
            Err(RouteError::UnknownParameter {
                node: b,
                param: "frequency".into()
            })
        );
        assert!(router.is_empty());
    }

    #[test]
    fn read_only_parameter_is_not_routable() {
        let table = ConstraintTable::new()
            .with(ParamConstraint::integer("seed", 0, 100, 0).with_flags(ParamFlags::READ_ONLY));
        let mut registry = NodeRegistry::new(table);
        registry
            .register(
                NodeSchema::new("Canvas", NodeCategory::Output)
                    .with_main_inputs(1)
                    .as_terminal(),
            )
            .unwrap();
        registry
            .register(NodeSchema::new("Noise", NodeCategory::Source).with_param("seed", 7.0))
            .unwrap();
        let mut s = GraphStore::new(Arc::new(registry)).unwrap();
        let noise = node(&mut s, "Noise");

        let mut router = ControlRouter::new();
        assert_eq!(
            router.create_route(&s, "audio.bass", noise, "seed", 0.0, 1.0),
            Err(RouteError::ReadOnlyParameter {
                node: noise,
                param: "seed".into()
            })
        );
    }

    #[test]
    fn out_of_range_is_clamped_and_reported() {
        let mut s = store();
        let b = node(&mut s, "ColorAdjust");
        let mut router = ControlRouter::new();
        router
            .create_route(&s, "cursor.x", b, "brightness", 0.0, 10.0)
            .unwrap();
        let report = router.apply(&SignalSnapshot::new().with("cursor.x", 1.0), &mut s);
        assert_eq!(report.applied, 1);
        assert_eq!(report.corrections.len(), 1);
        assert_eq!(report.corrections[0].reason, CorrectionReason::Clamped);
        assert_eq!(s.node(b).unwrap().param_number("brightness"), Some(1.0));
    }

    #[test]
    fn enum_and_toggle_params() {
        let mut s = store();
        let osc = node(&mut s, "Oscillator");
        let mask = node(&mut s, "Mask");
        let mut router = ControlRouter::new();
        router
            .create_route(&s, "gamepad.axis1", osc, "waveform", 0.0, 3.0)
            .unwrap();
        router
            .create_route(&s, "gamepad.button0", mask, "invert", 0.0, 1.0)
            .unwrap();

        let snap = SignalSnapshot::new()
            .with("gamepad.axis1", 0.7)
            .with("gamepad.button0", 0.6);
        router.apply(&snap, &mut s);
        // 0.7 * 3 = 2.1, nearest index 2.
        assert_eq!(
            s.node(osc).unwrap().param("waveform"),
            Some(&ParamValue::Text("triangle".into()))
        );
        assert_eq!(s.node(mask).unwrap().param_number("invert"), Some(1.0));
    }

    #[test]
    fn color_route_writes_grey_keeping_alpha() {
        let mut s = store();
        let solid = node(&mut s, "SolidColor");
        s.set_param(solid, "color", [1.0, 0.0, 0.0, 0.5]).unwrap();
        let mut router = ControlRouter::new();
        router
            .create_route(&s, "camera.brightness", solid, "color", 0.0, 1.0)
            .unwrap();
        router.apply(&SignalSnapshot::new().with("camera.brightness", 0.25), &mut s);
        assert_eq!(
            s.node(solid).unwrap().param("color"),
            Some(&ParamValue::Color([0.25, 0.25, 0.25, 0.5]))
        );
    }

    #[test]
    fn unpublished_source_is_inert() {
        let mut s = store();
        let b = node(&mut s, "ColorAdjust");
        s.set_param(b, "brightness", 0.3).unwrap();
        let mut router = ControlRouter::new();
        router
            .create_route(&s, "audio.bass", b, "brightness", -1.0, 1.0)
            .unwrap();
        let report = router.apply(&SignalSnapshot::new(), &mut s);
        assert_eq!(report.applied, 0);
        assert_eq!(report.inert.len(), 1);
        assert_eq!(s.node(b).unwrap().param_number("brightness"), Some(0.3));
    }

    #[test]
    fn removing_route_keeps_last_value() {
        let mut s = store();
        let b = node(&mut s, "ColorAdjust");
        let mut router = ControlRouter::new();
        router
            .create_route(&s, "audio.bass", b, "brightness", -1.0, 1.0)
            .unwrap();
        router.apply(&SignalSnapshot::new().with("audio.bass", 0.75), &mut s);
        assert!(router.remove_route(b, "brightness").is_some());
        router.apply(&SignalSnapshot::new().with("audio.bass", 0.0), &mut s);
        assert_eq!(s.node(b).unwrap().param_number("brightness"), Some(0.5));
    }

    #[test]
    fn deleted_target_goes_inert_then_pruned() {
        let mut s = store();
        let b = node(&mut s, "ColorAdjust");
        let mut router = ControlRouter::new();
        router
            .create_route(&s, "audio.bass", b, "brightness", 0.0, 1.0)
            .unwrap();
        router
            .create_route(&s, "audio.mid", b, "contrast", 0.0, 1.0)
            .unwrap();
        s.delete_node(b).unwrap();

        let snap = SignalSnapshot::new().with("audio.bass", 1.0).with("audio.mid", 1.0);
        assert_eq!(router.apply(&snap, &mut s).inert.len(), 2);
        assert_eq!(router.remove_routes_for_node(b), 2);
        assert!(router.is_empty());
    }

    #[test]
    fn constant_route() {
        let mut s = store();
        let b = node(&mut s, "ColorAdjust");
        let mut router = ControlRouter::new();
        router
            .create_route(&s, "random.value", b, "hue", 90.0, 90.0)
            .unwrap();
        router.apply(&SignalSnapshot::new().with("random.value", 0.123), &mut s);
        assert_eq!(s.node(b).unwrap().param_number("hue"), Some(90.0));
        assert_eq!(router.routes_from("random.value").count(), 1);
    }
}
