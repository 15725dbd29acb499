//! Property-based tests for graph structure and parameter validation.
//!
//! Random connect sequences must never leave a cycle in the store, the
//! evaluation order must respect every dependency, and constraint coercion
//! must be idempotent.

use std::sync::Arc;

use lumen_core::{
    ConstraintTable, GraphError, GraphStore, NodeCategory, NodeId, NodeRegistry, NodeSchema,
    ParamConstraint, ParamValue, Position, SlotKind, evaluation_order,
};
use proptest::prelude::*;

const MODES: &[&str] = &["normal", "add", "multiply", "screen"];

fn registry() -> Arc<NodeRegistry> {
    let table = ConstraintTable::new().with(ParamConstraint::number("mix", 0.0, 1.0, 0.5));
    let mut reg = NodeRegistry::new(table);
    reg.register(
        NodeSchema::new("Canvas", NodeCategory::Output)
            .with_main_inputs(1)
            .as_terminal(),
    )
    .unwrap();
    reg.register(
        NodeSchema::new("Blend", NodeCategory::Composite)
            .with_main_inputs(2)
            .with_control_inputs(1)
            .with_param("mix", 0.5),
    )
    .unwrap();
    Arc::new(reg)
}

/// Builds a store with `n` Blend nodes (ids 1..=n).
fn store_with(n: usize) -> (GraphStore, Vec<NodeId>) {
    let mut store = GraphStore::new(registry()).unwrap();
    let ids = (0..n)
        .map(|_| store.create_node("Blend", Position::default()).unwrap())
        .collect();
    (store, ids)
}

/// A random connect attempt: (producer index, consumer index, slot, is_control).
fn edge_strategy(n: usize) -> impl Strategy<Value = (usize, usize, usize, bool)> {
    (0..n, 0..n, 0usize..2, any::<bool>())
}

fn slot(index: usize, control: bool) -> (usize, SlotKind) {
    if control {
        (0, SlotKind::Control)
    } else {
        (index, SlotKind::Main)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// After any sequence of connect calls, the evaluation order detects no
    /// cycle and every rejected call reported a structural error.
    #[test]
    fn connect_sequences_stay_acyclic(
        edges in prop::collection::vec(edge_strategy(8), 1..40),
    ) {
        let (mut store, ids) = store_with(8);
        for (p, c, index, control) in edges {
            let (index, kind) = slot(index, control);
            match store.connect(ids[p], ids[c], index, kind) {
                Ok(_) => {}
                Err(GraphError::SelfConnection(_) | GraphError::CycleDetected { .. }) => {}
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
            let order = evaluation_order(&store);
            prop_assert!(order.cycles.is_empty(), "cycle slipped through: {:?}", order.cycles);
        }
    }

    /// Every connected input appears earlier in the evaluation order.
    #[test]
    fn order_respects_dependencies(
        edges in prop::collection::vec(edge_strategy(10), 0..50),
        deletions in prop::collection::vec(0usize..10, 0..4),
    ) {
        let (mut store, ids) = store_with(10);
        for (p, c, index, control) in edges {
            let (index, kind) = slot(index, control);
            let _ = store.connect(ids[p], ids[c], index, kind);
        }
        for d in deletions {
            store.delete_node(ids[d]).unwrap();
        }

        let order = evaluation_order(&store);
        for (pos, &id) in order.order.iter().enumerate() {
            let node = store.node(id).unwrap();
            for dep in node.dependencies() {
                prop_assert!(store.contains(dep), "{id} references deleted {dep}");
                let dep_pos = order.position(dep).unwrap();
                prop_assert!(dep_pos < pos, "{dep} must precede {id}");
            }
        }
        prop_assert_eq!(order.order.len() + 1, store.len());
    }

    /// connect(n, n, ..) never changes the graph.
    #[test]
    fn self_connection_never_mutates(
        target in 0usize..6,
        index in 0usize..3,
        control in any::<bool>(),
    ) {
        let (mut store, ids) = store_with(6);
        let _ = store.connect(ids[0], ids[1], 0, SlotKind::Main);
        let before: Vec<_> = store.nodes().map(|n| n.dependencies().collect::<Vec<_>>()).collect();
        let revision = store.topology_revision();

        let kind = if control { SlotKind::Control } else { SlotKind::Main };
        let result = store.connect(ids[target], ids[target], index, kind);
        prop_assert_eq!(result, Err(GraphError::SelfConnection(ids[target])));

        let after: Vec<_> = store.nodes().map(|n| n.dependencies().collect::<Vec<_>>()).collect();
        prop_assert_eq!(before, after);
        prop_assert_eq!(store.topology_revision(), revision);
    }

    /// Coercing a coerced number again yields the same value, no correction.
    #[test]
    fn numeric_coercion_idempotent(
        min in -100.0f32..0.0,
        span in 0.0f32..200.0,
        value in -500.0f32..500.0,
        integer in any::<bool>(),
    ) {
        let max = min + span;
        let constraint = if integer {
            ParamConstraint::integer("p", min.ceil() as i32, max.floor().max(min.ceil()) as i32, 0)
        } else {
            ParamConstraint::number("p", min, max, min)
        };
        let once = constraint.coerce(&ParamValue::Number(value));
        let twice = constraint.coerce(&once.value);
        prop_assert_eq!(&once.value, &twice.value);
        prop_assert!(twice.correction.is_none());
    }

    /// Toggle, enum and color coercion are idempotent too.
    #[test]
    fn other_kinds_idempotent(
        value in -3.0f32..10.0,
        rgba in prop::array::uniform4(-2.0f32..2.0),
    ) {
        let toggle = ParamConstraint::toggle("t", false);
        let t = toggle.coerce(&ParamValue::Number(value)).value;
        prop_assert!(toggle.coerce(&t).correction.is_none());

        let modes = ParamConstraint::enum_string("m", MODES, 0);
        let m = modes.coerce(&ParamValue::Number(value)).value;
        prop_assert!(modes.coerce(&m).correction.is_none());
        prop_assert!(MODES.contains(&m.as_text().unwrap()));

        let color = ParamConstraint::color("c", [0.0, 0.0, 0.0, 1.0]);
        let c = color.coerce(&ParamValue::Color(rgba)).value;
        prop_assert!(color.coerce(&c).correction.is_none());
    }
}
