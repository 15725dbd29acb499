//! Integration tests for the graph store and evaluation order.

use std::sync::Arc;

use lumen_core::{
    ConstraintTable, GraphError, GraphStore, NodeCategory, NodeRegistry, NodeSchema,
    ParamConstraint, Position, SlotKind, evaluation_order,
};

fn registry() -> Arc<NodeRegistry> {
    let table = ConstraintTable::new()
        .with(ParamConstraint::number("frequency", 0.0, 50.0, 1.0))
        .with(ParamConstraint::number("brightness", -1.0, 1.0, 0.0));
    let mut reg = NodeRegistry::new(table);
    reg.register(
        NodeSchema::new("Canvas", NodeCategory::Output)
            .with_main_inputs(1)
            .as_terminal(),
    )
    .unwrap();
    reg.register(NodeSchema::new("Oscillator", NodeCategory::Source).with_param("frequency", 1.0))
        .unwrap();
    reg.register(
        NodeSchema::new("ColorAdjust", NodeCategory::Effect)
            .with_main_inputs(1)
            .with_control_inputs(1)
            .with_param("brightness", 0.0),
    )
    .unwrap();
    Arc::new(reg)
}

#[test]
fn oscillator_adjust_canvas_chain() {
    let mut store = GraphStore::new(registry()).unwrap();
    let t = store.terminal();
    let a = store.create_node("Oscillator", Position::new(0.0, 0.0)).unwrap();
    let b = store.create_node("ColorAdjust", Position::new(200.0, 0.0)).unwrap();

    store.connect(a, b, 0, SlotKind::Main).unwrap();
    store.connect(b, t, 0, SlotKind::Main).unwrap();

    let order = evaluation_order(&store);
    assert_eq!(order.order, vec![a, b]);
    assert_eq!(order.terminal, t);

    // Deleting A nulls B's input and leaves T untouched.
    assert!(store.delete_node(a).unwrap());
    assert_eq!(store.node(b).unwrap().main_inputs(), &[None]);
    assert_eq!(store.node(t).unwrap().main_inputs(), &[Some(b)]);

    let order = evaluation_order(&store);
    assert_eq!(order.order, vec![b]);
}

#[test]
fn self_connection_leaves_inputs_unchanged() {
    let mut store = GraphStore::new(registry()).unwrap();
    let a = store.create_node("Oscillator", Position::default()).unwrap();
    let b = store.create_node("ColorAdjust", Position::default()).unwrap();
    store.connect(a, b, 0, SlotKind::Main).unwrap();

    assert_eq!(
        store.connect(b, b, 0, SlotKind::Main),
        Err(GraphError::SelfConnection(b))
    );
    assert_eq!(store.node(b).unwrap().main_inputs(), &[Some(a)]);
}

#[test]
fn diamond_orders_both_branches_before_join() {
    let mut store = GraphStore::new(registry()).unwrap();
    let src = store.create_node("Oscillator", Position::default()).unwrap();
    let left = store.create_node("ColorAdjust", Position::default()).unwrap();
    let right = store.create_node("ColorAdjust", Position::default()).unwrap();
    let join = store.create_node("ColorAdjust", Position::default()).unwrap();

    store.connect(src, left, 0, SlotKind::Main).unwrap();
    store.connect(src, right, 0, SlotKind::Main).unwrap();
    store.connect(left, join, 0, SlotKind::Main).unwrap();
    store.connect(right, join, 0, SlotKind::Control).unwrap();

    assert!(matches!(
        store.connect(join, src, 0, SlotKind::Main),
        Err(GraphError::SlotOutOfRange { .. })
    ));
    // Closing the loop through a control slot is a cycle too.
    assert!(matches!(
        store.connect(join, left, 0, SlotKind::Control),
        Err(GraphError::CycleDetected { .. })
    ));

    let order = evaluation_order(&store);
    let pos = |id| order.position(id).unwrap();
    assert!(pos(src) < pos(left));
    assert!(pos(src) < pos(right));
    assert!(pos(left) < pos(join));
    assert!(pos(right) < pos(join));
}

#[test]
fn topology_revision_tracks_structure_only() {
    let mut store = GraphStore::new(registry()).unwrap();
    let r0 = store.topology_revision();
    let a = store.create_node("Oscillator", Position::default()).unwrap();
    let r1 = store.topology_revision();
    assert_ne!(r0, r1);

    store.set_param(a, "frequency", 3.0).unwrap();
    store.set_enabled(a, false).unwrap();
    assert_eq!(store.topology_revision(), r1);

    store.connect(a, store.terminal(), 0, SlotKind::Main).unwrap();
    assert_ne!(store.topology_revision(), r1);
}
