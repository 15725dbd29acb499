//! End-to-end tests of the engine tick against the software backend.

use lumen_config::EngineSettings;
use lumen_core::{GraphError, NodeId, Position, SlotKind};
use lumen_engine::{DeviceState, Engine, EngineError, TickOutcome};
use lumen_render::{Resolution, SoftwareBackend, SoftwareHandle};
use tempfile::TempDir;

const DT: f32 = 1.0 / 60.0;

fn engine() -> (Engine, SoftwareHandle) {
    let backend = SoftwareBackend::new();
    let handle = backend.handle();
    let mut settings = EngineSettings::default();
    settings.resolution.width = 8;
    settings.resolution.height = 8;
    let engine = Engine::with_builtin(Box::new(backend), &settings).unwrap();
    (engine, handle)
}

/// Oscillator → ColorAdjust → terminal.
fn chain(engine: &mut Engine) -> (NodeId, NodeId) {
    let a = engine.create_node("Oscillator", Position::default()).unwrap();
    let b = engine
        .create_node("ColorAdjust", Position::new(200.0, 0.0))
        .unwrap();
    let t = engine.store().terminal();
    engine.connect(a, b, 0, SlotKind::Main).unwrap();
    engine.connect(b, t, 0, SlotKind::Main).unwrap();
    (a, b)
}

/// SolidColor → terminal.
fn solid(engine: &mut Engine, color: [f32; 4]) -> NodeId {
    let s = engine.create_node("SolidColor", Position::default()).unwrap();
    engine.set_param(s, "color", color).unwrap();
    let t = engine.store().terminal();
    engine.connect(s, t, 0, SlotKind::Main).unwrap();
    s
}

fn rendered(outcome: TickOutcome) -> lumen_render::FrameReport {
    match outcome {
        TickOutcome::Rendered(report) => report,
        TickOutcome::Suspended => panic!("tick was suspended"),
    }
}

#[test]
fn chain_renders_in_dependency_order() {
    let (mut engine, _) = engine();
    let (a, b) = chain(&mut engine);
    let t = engine.store().terminal();

    let report = rendered(engine.tick(DT).unwrap());
    let pos = |id| report.order.iter().position(|&n| n == id);
    assert!(pos(a).unwrap() < pos(b).unwrap());
    assert!(report.produced(a));
    assert!(report.produced(b));
    assert!(report.terminal_rendered);
    assert!(!report.order.contains(&t) || pos(b) < pos(t));
}

#[test]
fn deleting_producer_nulls_consumer_slot() {
    let (mut engine, _) = engine();
    let (a, b) = chain(&mut engine);
    let t = engine.store().terminal();

    assert!(engine.delete_node(a).unwrap());
    assert_eq!(engine.store().node(b).unwrap().main_inputs(), &[None]);
    assert_eq!(engine.store().node(t).unwrap().main_inputs(), &[Some(b)]);

    let report = rendered(engine.tick(DT).unwrap());
    assert!(report.terminal_rendered);
    assert!(!report.order.contains(&a));
}

#[test]
fn audio_route_maps_into_output_range() {
    let (mut engine, _) = engine();
    let (_, b) = chain(&mut engine);
    engine
        .create_route("audio.bass", b, "brightness", -1.0, 1.0)
        .unwrap();
    let feed = engine.feed();

    feed.publish("audio.bass", 0.5).unwrap();
    engine.tick(DT).unwrap();
    let brightness = engine.store().node(b).unwrap().param_number("brightness");
    assert_eq!(brightness, Some(0.0));

    feed.publish("audio.bass", 1.0).unwrap();
    engine.tick(DT).unwrap();
    let brightness = engine.store().node(b).unwrap().param_number("brightness");
    assert_eq!(brightness, Some(1.0));
    assert_eq!(engine.last_routes().applied, 1);
}

#[test]
fn self_connection_is_rejected_without_change() {
    let (mut engine, _) = engine();
    let (a, b) = chain(&mut engine);

    let result = engine.connect(b, b, 0, SlotKind::Main);
    assert!(matches!(
        result,
        Err(EngineError::Graph(GraphError::SelfConnection(id))) if id == b
    ));
    assert_eq!(engine.store().node(b).unwrap().main_inputs(), &[Some(a)]);
}

#[test]
fn terminal_output_is_readable() {
    let (mut engine, _) = engine();
    solid(&mut engine, [1.0, 0.0, 0.0, 1.0]);
    engine.tick(DT).unwrap();

    let frame = engine.read_frame().unwrap();
    assert_eq!(frame.resolution.width, 8);
    assert_eq!(frame.get(3, 3), Some([1.0, 0.0, 0.0, 1.0]));
}

#[test]
fn context_loss_suspends_until_restored() {
    let (mut engine, handle) = engine();
    solid(&mut engine, [0.0, 0.0, 1.0, 1.0]);
    rendered(engine.tick(DT).unwrap());

    handle.lose_context();
    assert_eq!(engine.tick(DT).unwrap(), TickOutcome::Suspended);
    assert_eq!(engine.state(), DeviceState::Lost);
    assert!(engine.resources().is_empty());
    assert_eq!(engine.tick(DT).unwrap(), TickOutcome::Suspended);
    assert!(engine.read_frame().is_err());

    handle.restore_context();
    let report = rendered(engine.tick(DT).unwrap());
    assert!(report.terminal_rendered);
    assert_eq!(engine.state(), DeviceState::Ready);
    assert_eq!(
        engine.read_frame().unwrap().get(0, 0),
        Some([0.0, 0.0, 1.0, 1.0])
    );

    let stats = engine.stats();
    assert_eq!(stats.context_losses, 1);
    assert_eq!(stats.recoveries, 1);
    assert_eq!(stats.suspended_ticks, 2);
    assert_eq!(stats.frames, 2);
}

#[test]
fn explicit_notifications_drive_recovery() {
    let (mut engine, handle) = engine();
    let s = solid(&mut engine, [0.0, 1.0, 0.0, 1.0]);

    handle.lose_context();
    engine.notify_context_lost();
    assert_eq!(engine.state(), DeviceState::Lost);

    // Still lost: recovery fails and the engine stays suspended.
    assert!(engine.notify_context_restored().is_err());
    assert_eq!(engine.state(), DeviceState::Lost);

    handle.restore_context();
    let errors = engine.notify_context_restored().unwrap();
    assert!(errors.is_empty());
    assert!(engine.resources().is_allocated(s));
    assert!(engine.resources().is_allocated(engine.store().terminal()));
    rendered(engine.tick(DT).unwrap());
}

#[test]
fn backend_failure_stops_ticking() {
    let (mut engine, handle) = engine();
    chain(&mut engine);
    handle.lose_context();
    engine.notify_backend_failed();

    assert!(matches!(engine.tick(DT), Err(EngineError::Stopped)));
    handle.restore_context();
    assert!(matches!(engine.tick(DT), Err(EngineError::Stopped)));
}

#[test]
fn resize_keeps_rendering() {
    let (mut engine, _) = engine();
    solid(&mut engine, [1.0, 1.0, 0.0, 1.0]);
    engine.tick(DT).unwrap();

    assert!(engine.resize(Resolution::new(4, 2)).unwrap().is_empty());
    engine.tick(DT).unwrap();
    let frame = engine.read_frame().unwrap();
    assert_eq!(frame.resolution.width, 4);
    assert_eq!(frame.resolution.height, 2);
    assert_eq!(frame.get(3, 1), Some([1.0, 1.0, 0.0, 1.0]));
}

#[test]
fn failed_node_does_not_stop_the_frame() {
    let (mut engine, handle) = engine();
    let (a, b) = chain(&mut engine);
    handle.fail_program("oscillator");

    let report = rendered(engine.tick(DT).unwrap());
    assert!(report.failed.iter().any(|f| f.node == a));
    assert!(report.produced(b));
    assert!(report.terminal_rendered);
    assert_eq!(engine.stats().node_failures, 1);
}

#[test]
fn project_round_trip_through_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("scene.json");

    let (mut engine, _) = engine();
    let (_, b) = chain(&mut engine);
    engine.set_param(b, "contrast", 2.0).unwrap();
    engine
        .create_route("midi.cc37", b, "brightness", -1.0, 1.0)
        .unwrap();
    engine.save_project(&path).unwrap();

    let (mut other, _) = self::engine();
    solid(&mut other, [1.0, 1.0, 1.0, 1.0]);
    let report = other.load_project(&path).unwrap();
    assert!(report.is_clean(), "{:?}", report.issues);
    assert_eq!(report.removed.len(), 1);

    let live_b = report.live_id(b).unwrap();
    assert_eq!(other.store().len(), 3);
    assert_eq!(
        other.store().node(live_b).unwrap().param_number("contrast"),
        Some(2.0)
    );
    assert_eq!(other.router().len(), 1);
    // Every live node holds resources, nothing from before the load does.
    assert_eq!(other.resources().len(), 3);
    rendered(other.tick(DT).unwrap());
}

#[test]
fn allocations_balance_after_teardown() {
    let (mut engine, handle) = engine();
    chain(&mut engine);
    solid(&mut engine, [1.0; 4]);
    engine.tick(DT).unwrap();
    drop(engine);

    let counters = handle.counters();
    assert_eq!(counters.targets_created, counters.targets_destroyed);
}
