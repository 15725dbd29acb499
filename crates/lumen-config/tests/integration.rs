//! Project round trips through files on disk.

use std::sync::Arc;

use lumen_config::{ProjectFile, load_graph, serialize_graph};
use lumen_core::{GraphStore, ParamValue, Position, SlotKind};
use lumen_platform::ControlRouter;
use tempfile::TempDir;

fn store() -> GraphStore {
    GraphStore::new(Arc::new(lumen_registry::builtin().unwrap())).unwrap()
}

#[test]
fn saved_graph_loads_identically() {
    let mut original = store();
    let mut router = ControlRouter::new();

    let osc = original.create_node("Oscillator", Position::new(-300.0, 0.0)).unwrap();
    let lfo = original.create_node("Lfo", Position::new(-300.0, 120.0)).unwrap();
    let adjust = original.create_node("ColorAdjust", Position::new(-100.0, 0.0)).unwrap();
    let blend = original.create_node("Blend", Position::new(100.0, 0.0)).unwrap();
    original.connect(osc, adjust, 0, SlotKind::Main).unwrap();
    original.connect(lfo, adjust, 0, SlotKind::Control).unwrap();
    original.connect(adjust, blend, 1, SlotKind::Main).unwrap();
    let t = original.terminal();
    original.connect(blend, t, 0, SlotKind::Main).unwrap();

    original.set_param(osc, "waveform", "triangle").unwrap();
    original.set_param(blend, "blend_mode", "screen").unwrap();
    original.set_param(osc, "color", [0.2, 0.4, 0.6, 1.0]).unwrap();
    original.rename(adjust, "Pump").unwrap();
    original.set_enabled(lfo, false).unwrap();
    let group = original.create_group("background");
    original.assign_group(osc, Some(group)).unwrap();
    original.set_group_enabled(group, false).unwrap();
    original.set_main_output(Some(adjust)).unwrap();
    router
        .create_route(&original, "audio.bass", adjust, "brightness", -1.0, 1.0)
        .unwrap();
    router
        .create_route(&original, "midi.cc7", blend, "mix", 0.0, 1.0)
        .unwrap();

    let temp = TempDir::new().unwrap();
    let path = temp.path().join("projects").join("show.json");
    serialize_graph(&original, &router).save(&path).unwrap();

    let mut restored = store();
    let mut restored_router = ControlRouter::new();
    let project = ProjectFile::load(&path).unwrap();
    let report = load_graph(&project, &mut restored, &mut restored_router);
    assert!(report.is_clean(), "{:?}", report.issues);

    let map = |id| report.live_id(id).unwrap();
    assert_eq!(map(t), restored.terminal());
    for node in original.nodes() {
        let copy = restored.node(map(node.id())).unwrap();
        assert_eq!(copy.type_tag(), node.type_tag());
        assert_eq!(copy.name(), node.name());
        assert_eq!(copy.position(), node.position());
        assert_eq!(copy.is_enabled(), node.is_enabled());
        assert_eq!(copy.params(), node.params());
        let remapped: Vec<_> = node
            .main_inputs()
            .iter()
            .map(|slot| slot.map(map))
            .collect();
        assert_eq!(copy.main_inputs(), remapped.as_slice());
    }

    let osc2 = map(osc);
    assert!(!restored.is_active(osc2));
    assert_eq!(restored.main_output(), Some(map(adjust)));
    assert_eq!(
        restored.node(osc2).unwrap().param("waveform"),
        Some(&ParamValue::Text("triangle".into()))
    );
    assert_eq!(restored_router.len(), 2);
    assert_eq!(
        restored_router.route_for(map(blend), "mix").unwrap().source_key,
        "midi.cc7"
    );
}

#[test]
fn saving_twice_is_stable() {
    let mut s = store();
    let noise = s.create_node("Noise", Position::default()).unwrap();
    let t = s.terminal();
    s.connect(noise, t, 0, SlotKind::Main).unwrap();
    let first = serialize_graph(&s, &ControlRouter::new());

    let mut reloaded = store();
    let mut router = ControlRouter::new();
    load_graph(&first, &mut reloaded, &mut router);
    let second = serialize_graph(&reloaded, &router);

    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}
