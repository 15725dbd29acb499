//! End-to-end tests: graph edits, resource lifecycle and frame rendering
//! against the software backend.

use std::sync::Arc;

use lumen_core::{GraphStore, Position, SlotKind};
use lumen_render::{
    FrameError, FrameRenderer, RenderBackend, ResourceManager, Resolution, SoftwareBackend,
};

const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

fn setup() -> (SoftwareBackend, ResourceManager, GraphStore) {
    let registry = Arc::new(lumen_registry::builtin().unwrap());
    let mut backend = SoftwareBackend::new();
    let mut resources = ResourceManager::new(Resolution::new(4, 4), BLACK);
    resources.init(&mut backend).unwrap();
    let store = GraphStore::new(registry).unwrap();
    (backend, resources, store)
}

#[test]
fn allocations_balance_releases_over_edits() {
    let (mut backend, mut resources, mut store) = setup();
    let mut ids = Vec::new();
    for tag in ["SolidColor", "Noise", "Invert", "Blend"] {
        ids.push(store.create_node(tag, Position::default()).unwrap());
    }
    assert!(resources.sync(&mut backend, &store).is_empty());
    // Four nodes plus the terminal.
    assert_eq!(resources.len(), 5);

    for id in ids.drain(..2) {
        store.delete_node(id).unwrap();
    }
    resources.sync(&mut backend, &store);
    assert_eq!(resources.len(), 3);

    resources.release_all(&mut backend);
    let stats = resources.stats();
    assert_eq!(stats.allocations, stats.releases);
    assert_eq!(backend.live_targets(), 0);
}

#[test]
fn context_loss_then_restore_renders_again() {
    let (mut backend, mut resources, mut store) = setup();
    let handle = backend.handle();
    let color = store.create_node("SolidColor", Position::default()).unwrap();
    store
        .set_param(color, "color", [0.0, 1.0, 0.0, 1.0])
        .unwrap();
    let t = store.terminal();
    store.connect(color, t, 0, SlotKind::Main).unwrap();
    resources.sync(&mut backend, &store);

    let mut renderer = FrameRenderer::new();
    renderer.render(&store, &resources, &mut backend, 0.0).unwrap();

    handle.lose_context();
    resources.invalidate_all();
    assert_eq!(
        renderer.render(&store, &resources, &mut backend, 0.1),
        Err(FrameError::DeviceUnavailable)
    );

    handle.restore_context();
    let errors = resources.restore(&mut backend, &store).unwrap();
    assert!(errors.is_empty());
    let report = renderer.render(&store, &resources, &mut backend, 0.2).unwrap();
    assert!(report.terminal_rendered);

    let target = resources.target(t).unwrap();
    let px = backend.read_pixels(target).unwrap().get(0, 0).unwrap();
    assert_eq!(px, [0.0, 1.0, 0.0, 1.0]);

    let stats = resources.stats();
    assert_eq!(stats.allocations, stats.releases + resources.len() as u64);
}

#[test]
fn resize_keeps_graph_rendering() {
    let (mut backend, mut resources, mut store) = setup();
    let noise = store.create_node("Noise", Position::default()).unwrap();
    let t = store.terminal();
    store.connect(noise, t, 0, SlotKind::Main).unwrap();
    resources.sync(&mut backend, &store);

    assert!(resources
        .resize(&mut backend, Resolution::new(16, 8))
        .is_empty());
    let mut renderer = FrameRenderer::new();
    let report = renderer.render(&store, &resources, &mut backend, 1.0).unwrap();
    assert_eq!(report.evaluated, vec![noise]);

    let pixels = backend.read_pixels(resources.target(t).unwrap()).unwrap();
    assert_eq!(pixels.resolution, Resolution::new(16, 8));
    // Two targets plus the fallback, old storage gone.
    assert_eq!(backend.live_targets(), 3);
}

#[test]
fn unallocated_node_is_skipped_and_consumer_reads_fallback() {
    let (mut backend, mut resources, mut store) = setup();
    let color = store.create_node("SolidColor", Position::default()).unwrap();
    let invert = store.create_node("Invert", Position::default()).unwrap();
    store.connect(color, invert, 0, SlotKind::Main).unwrap();
    let t = store.terminal();
    store.connect(invert, t, 0, SlotKind::Main).unwrap();

    // With the terminal already allocated, the next allocation is `color`'s.
    resources.allocate(&mut backend, store.node(t).unwrap()).unwrap();
    backend.handle().fail_next_allocations(1);
    let errors = resources.sync(&mut backend, &store);
    assert_eq!(errors.len(), 1);
    assert!(!resources.is_allocated(color));

    let report = FrameRenderer::new()
        .render(&store, &resources, &mut backend, 0.0)
        .unwrap();
    assert_eq!(report.evaluated, vec![invert]);
    let px = backend
        .read_pixels(resources.target(t).unwrap())
        .unwrap()
        .get(0, 0)
        .unwrap();
    assert_eq!(px, [1.0, 1.0, 1.0, 1.0]);
}
