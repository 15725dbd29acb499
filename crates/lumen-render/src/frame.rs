//! Per-frame evaluation and final composition.
//!
//! [`FrameRenderer::render`] walks the evaluation order, runs each active
//! node's program into its own target, then composites the terminal node.
//!
//! # Input Resolution
//!
//! For each main input slot the renderer picks the producer's target only if
//! the producer actually rendered this frame and its target is still valid.
//! Otherwise the fallback target is used. A resolved input whose target is
//! the very target the node is about to write (possible when a backend pools
//! or aliases storage) is replaced by the fallback as well; source and
//! destination are never the same resource.
//!
//! # Failure Semantics
//!
//! A node whose program fails is logged and treated as having produced
//! nothing; its consumers read the fallback and the rest of the frame
//! proceeds. Only a lost device context or a missing fallback aborts a frame.

use std::collections::HashSet;

use lumen_core::{CycleEdge, EvaluationOrder, GraphStore, NodeId, SlotKind, evaluation_order};
use thiserror::Error;

use crate::backend::{BackendError, DrawCall, RenderBackend, TargetId};
use crate::resources::ResourceManager;

/// Errors that abort a whole frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    /// The device context is lost; frames must not run until it is restored.
    #[error("render device unavailable")]
    DeviceUnavailable,

    /// The fallback target does not exist or is invalid.
    #[error("fallback target missing")]
    MissingFallback,
}

/// Why a node was not evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The node or its group is disabled.
    Disabled,
    /// The node holds no valid render target.
    Unallocated,
}

/// A node whose program failed this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFailure {
    /// Failing node.
    pub node: NodeId,
    /// Backend error.
    pub error: BackendError,
}

/// An input replaced by the fallback because it aliased the node's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackSubstitution {
    /// Node being evaluated.
    pub node: NodeId,
    /// Producer whose target aliased the output.
    pub producer: NodeId,
    /// Slot kind the producer was connected to.
    pub kind: SlotKind,
    /// Slot index.
    pub slot: usize,
}

/// What happened during one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// Frame number, starting at 1.
    pub frame: u64,
    /// Evaluation order used (terminal excluded).
    pub order: Vec<NodeId>,
    /// Nodes whose programs ran successfully, in order.
    pub evaluated: Vec<NodeId>,
    /// Nodes not evaluated, with the reason.
    pub skipped: Vec<(NodeId, SkipReason)>,
    /// Nodes whose programs failed.
    pub failed: Vec<NodeFailure>,
    /// Inputs replaced because they aliased the output.
    pub feedback: Vec<FeedbackSubstitution>,
    /// Dependency edges ignored because they closed a cycle.
    pub cycles: Vec<CycleEdge>,
    /// Whether the terminal composite succeeded.
    pub terminal_rendered: bool,
}

impl FrameReport {
    /// Returns `true` if `node` rendered this frame.
    pub fn produced(&self, node: NodeId) -> bool {
        self.evaluated.contains(&node)
    }
}

/// Drives per-frame evaluation. Caches the evaluation order between
/// structural edits.
#[derive(Debug, Default)]
pub struct FrameRenderer {
    cached: Option<EvaluationOrder>,
    frame: u64,
}

impl FrameRenderer {
    /// Creates a renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames rendered so far.
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Drops the cached order so the next frame re-sorts.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    fn order_for(&mut self, store: &GraphStore) -> &EvaluationOrder {
        let stale = self
            .cached
            .as_ref()
            .is_none_or(|o| o.revision != store.topology_revision());
        if stale {
            self.cached = Some(evaluation_order(store));
        }
        self.cached.get_or_insert_with(|| evaluation_order(store))
    }

    /// Renders one frame.
    pub fn render(
        &mut self,
        store: &GraphStore,
        resources: &ResourceManager,
        backend: &mut dyn RenderBackend,
        time: f32,
    ) -> Result<FrameReport, FrameError> {
        if backend.is_context_lost() {
            return Err(FrameError::DeviceUnavailable);
        }
        let fallback = resources
            .fallback()
            .filter(|&t| backend.is_target_valid(t))
            .ok_or(FrameError::MissingFallback)?;

        let order = self.order_for(store).clone();
        self.frame += 1;

        let mut report = FrameReport {
            frame: self.frame,
            order: order.order.clone(),
            cycles: order.cycles.clone(),
            ..FrameReport::default()
        };
        let mut produced: HashSet<NodeId> = HashSet::with_capacity(order.order.len());

        let mut pass = Pass {
            store,
            resources,
            fallback,
            time,
            produced: &mut produced,
            report: &mut report,
        };
        for &id in &order.order {
            pass.evaluate(backend, id, false);
        }
        let terminal_rendered = pass.evaluate(backend, order.terminal, true);

        report.terminal_rendered = terminal_rendered;
        tracing::trace!(
            "frame_done: #{} evaluated={} skipped={} failed={}",
            report.frame,
            report.evaluated.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

/// State for one frame's evaluation pass.
struct Pass<'a> {
    store: &'a GraphStore,
    resources: &'a ResourceManager,
    fallback: TargetId,
    time: f32,
    produced: &'a mut HashSet<NodeId>,
    report: &'a mut FrameReport,
}

impl Pass<'_> {
    /// Resolves a slot to a readable target: the producer's target if it
    /// rendered this frame and is valid, the fallback otherwise.
    fn resolve(&self, backend: &dyn RenderBackend, slot: Option<NodeId>) -> Option<(NodeId, TargetId)> {
        let producer = slot?;
        if !self.produced.contains(&producer) {
            return None;
        }
        self.resources
            .target(producer)
            .filter(|&t| backend.is_target_valid(t))
            .map(|t| (producer, t))
    }

    /// Evaluates one node. Returns `true` if its program ran.
    fn evaluate(&mut self, backend: &mut dyn RenderBackend, id: NodeId, terminal: bool) -> bool {
        let (store, resources) = (self.store, self.resources);
        let Some(node) = store.node(id) else {
            return false;
        };
        if !terminal && !store.is_active(id) {
            self.report.skipped.push((id, SkipReason::Disabled));
            return false;
        }
        let Some(res) = resources
            .resources(id)
            .filter(|r| backend.is_target_valid(r.target))
        else {
            tracing::warn!("frame_eval: {id} has no render target");
            self.report.skipped.push((id, SkipReason::Unallocated));
            return false;
        };
        let output = res.target;

        let mut inputs = Vec::with_capacity(node.main_inputs().len());
        for (slot, &input) in node.main_inputs().iter().enumerate() {
            let target = match self.resolve(backend, input) {
                Some((producer, target)) if target == output => {
                    tracing::warn!(
                        "frame_feedback: {producer} → {id} aliases {output}, using fallback"
                    );
                    self.report.feedback.push(FeedbackSubstitution {
                        node: id,
                        producer,
                        kind: SlotKind::Main,
                        slot,
                    });
                    self.fallback
                }
                Some((_, target)) => target,
                None => self.fallback,
            };
            inputs.push(target);
        }

        let mut controls = Vec::with_capacity(node.control_inputs().len());
        for (slot, &input) in node.control_inputs().iter().enumerate() {
            let value = match self.resolve(backend, input) {
                Some((producer, target)) if target == output => {
                    self.report.feedback.push(FeedbackSubstitution {
                        node: id,
                        producer,
                        kind: SlotKind::Control,
                        slot,
                    });
                    0.0
                }
                Some((_, target)) => backend.sample_scalar(target).unwrap_or(0.0),
                None => 0.0,
            };
            controls.push(value);
        }

        let call = DrawCall {
            node: id,
            output,
            inputs: &inputs,
            controls: &controls,
            params: node.params(),
            time: self.time,
        };
        match backend.run_program(res.program, &call) {
            Ok(()) => {
                self.produced.insert(id);
                if !terminal {
                    self.report.evaluated.push(id);
                }
                true
            }
            Err(error) => {
                tracing::warn!("frame_eval: {id} ({}) failed: {error}", node.type_tag());
                self.report.failed.push(NodeFailure { node: id, error });
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lumen_core::Position;

    use super::*;
    use crate::backend::Resolution;
    use crate::software::SoftwareBackend;

    struct Rig {
        backend: SoftwareBackend,
        resources: ResourceManager,
        store: GraphStore,
        renderer: FrameRenderer,
    }

    impl Rig {
        fn new() -> Self {
            let registry = Arc::new(lumen_registry::builtin().unwrap());
            let mut backend = SoftwareBackend::new();
            let mut resources = ResourceManager::new(Resolution::new(8, 8), [0.0, 0.0, 0.0, 1.0]);
            resources.init(&mut backend).unwrap();
            Self {
                backend,
                resources,
                store: GraphStore::new(registry).unwrap(),
                renderer: FrameRenderer::new(),
            }
        }

        fn add(&mut self, tag: &str) -> NodeId {
            let id = self.store.create_node(tag, Position::default()).unwrap();
            self.resources
                .allocate(&mut self.backend, self.store.node(id).unwrap())
                .unwrap();
            id
        }

        fn render(&mut self) -> FrameReport {
            self.resources.sync(&mut self.backend, &self.store);
            self.renderer
                .render(&self.store, &self.resources, &mut self.backend, 0.0)
                .unwrap()
        }

        fn terminal_pixel(&self) -> [f32; 4] {
            let t = self.resources.target(self.store.terminal()).unwrap();
            self.backend.read_pixels(t).unwrap().get(0, 0).unwrap()
        }
    }

    #[test]
    fn chain_renders_into_terminal() {
        let mut rig = Rig::new();
        let color = rig.add("SolidColor");
        let invert = rig.add("Invert");
        rig.store
            .set_param(color, "color", [1.0, 0.0, 0.0, 1.0])
            .unwrap();
        rig.store.connect(color, invert, 0, SlotKind::Main).unwrap();
        let t = rig.store.terminal();
        rig.store.connect(invert, t, 0, SlotKind::Main).unwrap();

        let report = rig.render();
        assert_eq!(report.evaluated, vec![color, invert]);
        assert!(report.terminal_rendered);
        assert_eq!(rig.terminal_pixel(), [0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn failing_node_does_not_abort_frame() {
        let mut rig = Rig::new();
        let color = rig.add("SolidColor");
        let invert = rig.add("Invert");
        rig.store.connect(color, invert, 0, SlotKind::Main).unwrap();
        let t = rig.store.terminal();
        rig.store.connect(invert, t, 0, SlotKind::Main).unwrap();

        rig.backend.handle().fail_program("solid_color");
        let report = rig.render();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].node, color);
        // Invert read the black fallback instead.
        assert_eq!(report.evaluated, vec![invert]);
        assert_eq!(rig.terminal_pixel(), [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn disabled_nodes_are_skipped() {
        let mut rig = Rig::new();
        let color = rig.add("SolidColor");
        let t = rig.store.terminal();
        rig.store.connect(color, t, 0, SlotKind::Main).unwrap();
        rig.store.set_enabled(color, false).unwrap();

        let report = rig.render();
        assert_eq!(report.skipped, vec![(color, SkipReason::Disabled)]);
        assert!(report.terminal_rendered);
        assert_eq!(rig.terminal_pixel(), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn aliased_target_is_replaced_by_fallback() {
        let mut rig = Rig::new();
        let color = rig.add("SolidColor");
        rig.backend.handle().alias_next_allocation();
        let invert = rig.add("Invert");
        assert_eq!(rig.resources.target(color), rig.resources.target(invert));

        rig.store.connect(color, invert, 0, SlotKind::Main).unwrap();
        let report = rig.render();
        assert_eq!(
            report.feedback,
            vec![FeedbackSubstitution {
                node: invert,
                producer: color,
                kind: SlotKind::Main,
                slot: 0,
            }]
        );
        assert!(report.produced(invert));
    }

    #[test]
    fn control_input_modulates_parameter() {
        let mut rig = Rig::new();
        let white = rig.add("SolidColor");
        let black = rig.add("SolidColor");
        let adjust = rig.add("ColorAdjust");
        rig.store
            .set_param(black, "color", [0.0, 0.0, 0.0, 1.0])
            .unwrap();
        rig.store.connect(black, adjust, 0, SlotKind::Main).unwrap();
        rig.store.connect(white, adjust, 0, SlotKind::Control).unwrap();
        let t = rig.store.terminal();
        rig.store.connect(adjust, t, 0, SlotKind::Main).unwrap();

        rig.render();
        // Brightness +1 from the white control lifts black to white.
        let px = rig.terminal_pixel();
        for ch in px {
            assert!((ch - 1.0).abs() < 1e-4, "{px:?}");
        }
    }

    #[test]
    fn lost_context_aborts_frame() {
        let mut rig = Rig::new();
        rig.backend.handle().lose_context();
        let err = rig
            .renderer
            .render(&rig.store, &rig.resources, &mut rig.backend, 0.0)
            .unwrap_err();
        assert_eq!(err, FrameError::DeviceUnavailable);
    }

    #[test]
    fn order_is_cached_per_revision() {
        let mut rig = Rig::new();
        let a = rig.add("SolidColor");
        let first = rig.render();
        assert_eq!(first.order, vec![a]);
        let b = rig.add("Noise");
        let second = rig.render();
        assert_eq!(second.order, vec![a, b]);
        assert_eq!(second.frame, 2);
    }
}
