//! Evaluation order: depth-first topological sort with cycle tolerance.
//!
//! [`evaluation_order`] walks "depends on" edges (main inputs, then control
//! inputs) from every node and appends each node in post-order, so every node
//! lands after all of its dependencies. The store rejects cycles at connect
//! time, but the sort does not trust that: an edge leading back into a node
//! still on the traversal stack is logged, recorded as a [`CycleEdge`], and
//! treated as absent.
//!
//! The terminal node is not part of [`EvaluationOrder::order`]; the renderer
//! composites it explicitly after the main pass.

use super::node::NodeId;
use super::store::GraphStore;

/// A dependency edge ignored because following it would recurse into a node
/// already on the traversal stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CycleEdge {
    /// Node whose input closed the loop.
    pub consumer: NodeId,
    /// The producer that was already being visited.
    pub producer: NodeId,
}

/// Result of sorting a graph for one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvaluationOrder {
    /// Non-terminal nodes, each after all of its resolvable dependencies.
    pub order: Vec<NodeId>,
    /// The terminal node, evaluated last.
    pub terminal: NodeId,
    /// Edges skipped because they closed a cycle.
    pub cycles: Vec<CycleEdge>,
    /// Store topology revision this order was computed from.
    pub revision: u64,
}

impl EvaluationOrder {
    /// Position of `id` in [`order`](Self::order).
    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.order.iter().position(|&n| n == id)
    }

    /// Number of non-terminal nodes in the order.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if only the terminal node exists.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

struct Frame {
    id: NodeId,
    deps: Vec<NodeId>,
    next: usize,
}

/// Computes a dependency-respecting evaluation order for every live node.
///
/// Roots are visited in ascending id order, which makes the result
/// deterministic for a given graph.
pub fn evaluation_order(store: &GraphStore) -> EvaluationOrder {
    let ids = store.node_ids();
    let capacity = ids.last().map_or(0, |id| id.index() as usize + 1);
    let mut marks = vec![Mark::Unvisited; capacity];
    let mut order = Vec::with_capacity(ids.len());
    let mut cycles = Vec::new();
    let terminal = store.terminal();

    let mut stack: Vec<Frame> = Vec::new();
    let frame_for = |id: NodeId| Frame {
        id,
        deps: store
            .node(id)
            .map(|n| n.dependencies().collect())
            .unwrap_or_default(),
        next: 0,
    };

    for &root in &ids {
        if marks[root.index() as usize] != Mark::Unvisited {
            continue;
        }
        marks[root.index() as usize] = Mark::Visiting;
        stack.push(frame_for(root));

        while let Some(frame) = stack.last_mut() {
            if let Some(&dep) = frame.deps.get(frame.next) {
                frame.next += 1;
                let consumer = frame.id;
                let Some(mark) = marks.get_mut(dep.index() as usize) else {
                    continue;
                };
                match *mark {
                    Mark::Done => {}
                    Mark::Visiting => {
                        tracing::warn!("schedule_cycle: {dep} → {consumer} skipped");
                        cycles.push(CycleEdge {
                            consumer,
                            producer: dep,
                        });
                    }
                    Mark::Unvisited => {
                        if store.contains(dep) {
                            *mark = Mark::Visiting;
                            stack.push(frame_for(dep));
                        }
                    }
                }
            } else {
                let id = frame.id;
                stack.pop();
                marks[id.index() as usize] = Mark::Done;
                if id != terminal {
                    order.push(id);
                }
            }
        }
    }

    tracing::trace!("schedule_order: {} nodes, {} cycles", order.len(), cycles.len());
    EvaluationOrder {
        order,
        terminal,
        cycles,
        revision: store.topology_revision(),
    }
}
