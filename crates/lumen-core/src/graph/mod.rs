//! Node graph for the lumen dataflow engine.
//!
//! # Architecture
//!
//! - [`GraphStore`] owns every node in an id-indexed arena and is the only
//!   place connections live: a connection is a producer id stored in a
//!   consumer's input slot. There is no edge list and no reverse index to
//!   keep in sync.
//! - [`evaluation_order`] derives a per-frame order from the store. It is a
//!   pure function of the store, so the renderer can cache it by
//!   [`topology_revision`](GraphStore::topology_revision).
//!
//! # Example
//!
//! ```rust,ignore
//! use lumen_core::graph::{GraphStore, Position, SlotKind, evaluation_order};
//!
//! let mut store = GraphStore::new(registry)?;
//! let osc = store.create_node("Oscillator", Position::default())?;
//! let adjust = store.create_node("ColorAdjust", Position::default())?;
//!
//! store.connect(osc, adjust, 0, SlotKind::Main)?;
//! store.connect(adjust, store.terminal(), 0, SlotKind::Main)?;
//!
//! let order = evaluation_order(&store);
//! assert_eq!(order.order, vec![osc, adjust]);
//! ```

pub mod node;
pub mod schedule;
mod store;

pub use node::{Group, GroupId, Node, NodeId, Position, SlotKind};
pub use schedule::{CycleEdge, EvaluationOrder, evaluation_order};
pub use store::{GraphStore, SlotRef};
