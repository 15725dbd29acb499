//! Lumen Platform - external signals and control routing
//!
//! This crate connects the outside world to node parameters. Device
//! collaborators publish normalized values; once per tick the engine samples
//! them and routes them into the graph.
//!
//! # Core Abstractions
//!
//! ## Signals
//!
//! - [`SignalFeed`] - Thread-safe handle devices publish latest values through
//! - [`SignalBank`] - Per-tick sampler; conditioning plus `timer.*`/`random.*`
//! - [`SignalSnapshot`] - Immutable source values for one tick
//! - [`AxisConditioning`] - Deadzone and exponential smoothing
//!
//! ## Routing
//!
//! - [`ControlRoute`] - Source key → `(node, parameter)` with an output range
//! - [`ControlRouter`] - Route table with per-parameter exclusivity
//!
//! # Source Key Namespaces
//!
//! - `audio.*` - Audio band levels, 0..1
//! - `cursor.*` - Cursor axes and buttons, 0..1
//! - `camera.*` - Camera metrics, 0..1
//! - `midi.*` - MIDI controllers, 0..127
//! - `gamepad.*` - Gamepad buttons and axes, 0..1
//! - `timer.*` - `seconds`, `frame`, `phase` (generated)
//! - `random.*` - `value` (generated, seeded)
//!
//! # Example
//!
//! ```rust,ignore
//! use lumen_platform::{ControlRouter, SignalBank, SignalFeed};
//!
//! let feed = SignalFeed::new();
//! let mut bank = SignalBank::new(feed.clone(), 0);
//! let mut router = ControlRouter::new();
//! router.create_route(&store, "audio.bass", adjust, "brightness", -1.0, 1.0)?;
//!
//! // From the audio thread
//! feed.publish("audio.bass", 0.8)?;
//!
//! // Once per tick
//! let report = router.apply(bank.sample(1.0 / 60.0), &mut store);
//! ```

pub mod conditioning;
pub mod router;
pub mod signals;

pub use conditioning::AxisConditioning;
pub use router::{ControlRoute, ControlRouter, RouteError, RouteReport};
pub use signals::{
    SignalBank, SignalCategory, SignalError, SignalFeed, SignalSnapshot, SourceKey,
};
