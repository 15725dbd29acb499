//! Lumen Engine - the frame tick
//!
//! This crate wires the other lumen crates into one running engine:
//!
//! - [`Engine`] - owns the graph, route table, signal sampler, node
//!   resources, frame renderer and the render backend
//! - [`TickOutcome`] - what one tick did (a frame, or a suspended tick)
//! - [`DeviceState`] - ready, lost (suspended) or stopped
//! - [`EngineStats`] - running totals for diagnostics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lumen_config::EngineSettings;
//! use lumen_core::{Position, SlotKind};
//! use lumen_engine::Engine;
//! use lumen_render::SoftwareBackend;
//!
//! let mut engine = Engine::with_builtin(Box::new(SoftwareBackend::new()), &EngineSettings::default())?;
//! let osc = engine.create_node("Oscillator", Position::default())?;
//! let adjust = engine.create_node("ColorAdjust", Position::new(200.0, 0.0))?;
//! engine.connect(osc, adjust, 0, SlotKind::Main)?;
//! engine.connect(adjust, engine.store().terminal(), 0, SlotKind::Main)?;
//! engine.create_route("audio.bass", adjust, "brightness", -1.0, 1.0)?;
//!
//! let feed = engine.feed();
//! feed.publish("audio.bass", 0.8)?;
//! engine.tick(1.0 / 60.0)?;
//! let frame = engine.read_frame()?;
//! ```
//!
//! ## Device Loss
//!
//! When the backend reports a lost context every node handle is dropped and
//! ticks return [`TickOutcome::Suspended`]. Once the context is back the
//! next tick (or [`Engine::notify_context_restored`]) reallocates every node
//! before any frame runs. [`Engine::notify_backend_failed`] stops the engine
//! for good.

mod engine;
mod error;

pub use engine::{DeviceState, Engine, EngineStats, TickOutcome};
pub use error::EngineError;
