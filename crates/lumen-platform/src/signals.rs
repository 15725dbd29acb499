//! Named external signal sources.
//!
//! Device collaborators (audio analysis, cursor tracking, camera metrics,
//! MIDI, gamepads) run outside the frame loop. They publish the latest value
//! of each source through a [`SignalFeed`], which holds one atomic cell per
//! key and never blocks the tick. Once per tick the [`SignalBank`] samples
//! every cell, applies [`AxisConditioning`], adds the synthesized `timer.*`
//! and `random.*` sources, and hands the router an immutable
//! [`SignalSnapshot`].
//!
//! # Source Keys
//!
//! Keys are `<category>.<name>`, e.g. `audio.bass`, `cursor.x`,
//! `midi.cc37`, `gamepad.axis0`. Values are normalized to `0..1`, except
//! MIDI which is ranged `0..127` (see [`SignalCategory::range`]).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::conditioning::AxisConditioning;

/// Errors raised by signal key handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// The key is not of the form `<category>.<name>`.
    #[error("malformed signal key {0:?}: expected <category>.<name>")]
    MalformedKey(String),

    /// The category prefix is not known.
    #[error("unknown signal category {0:?}")]
    UnknownCategory(String),

    /// The category is synthesized by the bank and can't be published to.
    #[error("signal category {0} is generated internally")]
    Synthesized(SignalCategory),
}

/// Source families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalCategory {
    /// Audio band levels.
    Audio,
    /// Cursor axes and buttons.
    Cursor,
    /// Camera-derived metrics.
    Camera,
    /// MIDI continuous controllers, ranged 0..127.
    Midi,
    /// Gamepad buttons and axes.
    Gamepad,
    /// Synthesized clock values.
    Timer,
    /// Synthesized random values.
    Random,
}

impl SignalCategory {
    /// All categories.
    pub const ALL: [Self; 7] = [
        Self::Audio,
        Self::Cursor,
        Self::Camera,
        Self::Midi,
        Self::Gamepad,
        Self::Timer,
        Self::Random,
    ];

    /// Key prefix for this category.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Cursor => "cursor",
            Self::Camera => "camera",
            Self::Midi => "midi",
            Self::Gamepad => "gamepad",
            Self::Timer => "timer",
            Self::Random => "random",
        }
    }

    /// Looks up a category by prefix.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.prefix() == prefix)
    }

    /// Category of a full source key, if the prefix is known.
    pub fn of_key(key: &str) -> Option<Self> {
        key.split_once('.').and_then(|(p, _)| Self::from_prefix(p))
    }

    /// Upper end of the raw value range. Routes divide by this to normalize.
    pub fn range(self) -> f32 {
        match self {
            Self::Midi => 127.0,
            _ => 1.0,
        }
    }

    /// Returns `true` for categories the bank generates itself.
    pub fn is_synthesized(self) -> bool {
        matches!(self, Self::Timer | Self::Random)
    }

    /// Returns `true` for axis-like categories that receive the default
    /// conditioning.
    pub fn is_axis_like(self) -> bool {
        matches!(self, Self::Cursor | Self::Gamepad)
    }
}

impl fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A validated `<category>.<name>` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    category: SignalCategory,
    key: String,
}

impl SourceKey {
    /// Parses and validates a key.
    pub fn parse(key: &str) -> Result<Self, SignalError> {
        let Some((prefix, name)) = key.split_once('.') else {
            return Err(SignalError::MalformedKey(key.to_owned()));
        };
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(SignalError::MalformedKey(key.to_owned()));
        }
        let category = SignalCategory::from_prefix(prefix)
            .ok_or_else(|| SignalError::UnknownCategory(prefix.to_owned()))?;
        Ok(Self {
            category,
            key: key.to_owned(),
        })
    }

    /// Category of the key.
    pub fn category(&self) -> SignalCategory {
        self.category
    }

    /// Name after the category prefix.
    pub fn name(&self) -> &str {
        &self.key[self.category.prefix().len() + 1..]
    }

    /// The full key.
    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl FromStr for SourceKey {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Cloneable, thread-safe publishing handle.
///
/// Each key owns one `AtomicU32` holding the `f32` bits of its latest value.
/// The map lock is only taken for writing the first time a key is published.
#[derive(Debug, Clone, Default)]
pub struct SignalFeed {
    cells: Arc<RwLock<HashMap<String, Arc<AtomicU32>>>>,
}

impl SignalFeed {
    /// Creates an empty feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes the latest value of `key`.
    ///
    /// Non-finite values are ignored so a misbehaving device can't poison
    /// downstream parameters; the previous value stays.
    pub fn publish(&self, key: &str, value: f32) -> Result<(), SignalError> {
        if let Some(cell) = self.cells.read().get(key) {
            if value.is_finite() {
                cell.store(value.to_bits(), Ordering::Relaxed);
            }
            return Ok(());
        }

        let parsed = SourceKey::parse(key)?;
        if parsed.category().is_synthesized() {
            return Err(SignalError::Synthesized(parsed.category()));
        }
        if !value.is_finite() {
            return Ok(());
        }
        self.cells
            .write()
            .entry(key.to_owned())
            .or_default()
            .store(value.to_bits(), Ordering::Relaxed);
        tracing::debug!("signal_publish: first value for {key}");
        Ok(())
    }

    /// Latest published value of `key`.
    pub fn latest(&self, key: &str) -> Option<f32> {
        self.cells
            .read()
            .get(key)
            .map(|c| f32::from_bits(c.load(Ordering::Relaxed)))
    }

    /// Forgets a key, e.g. when its device disconnects.
    pub fn withdraw(&self, key: &str) -> bool {
        self.cells.write().remove(key).is_some()
    }

    /// All published keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.cells.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn read_all(&self, out: &mut Vec<(String, f32)>) {
        out.clear();
        out.extend(
            self.cells
                .read()
                .iter()
                .map(|(k, c)| (k.clone(), f32::from_bits(c.load(Ordering::Relaxed)))),
        );
    }
}

/// Immutable view of every source value for one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalSnapshot {
    values: HashMap<String, f32>,
    frame: u64,
}

impl SignalSnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value.
    pub fn insert(&mut self, key: impl Into<String>, value: f32) {
        self.values.insert(key.into(), value);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: f32) -> Self {
        self.insert(key, value);
        self
    }

    /// Value of `key`, if its source has published.
    pub fn get(&self, key: &str) -> Option<f32> {
        self.values.get(key).copied()
    }

    /// Tick number this snapshot was sampled on.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Number of sources.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no source has a value.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(key, value)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.values.iter().map(|(k, &v)| (k.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, f32)> for SignalSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, f32)>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for (k, v) in iter {
            snapshot.insert(k, v);
        }
        snapshot
    }
}

/// Per-tick sampler over a [`SignalFeed`].
#[derive(Debug)]
pub struct SignalBank {
    feed: SignalFeed,
    default_axis: AxisConditioning,
    overrides: HashMap<String, AxisConditioning>,
    last: HashMap<String, f32>,
    scratch: Vec<(String, f32)>,
    snapshot: SignalSnapshot,
    elapsed: f64,
    rng: StdRng,
}

impl SignalBank {
    /// Creates a bank over `feed`. `seed` drives `random.value`.
    pub fn new(feed: SignalFeed, seed: u64) -> Self {
        Self {
            feed,
            default_axis: AxisConditioning::default(),
            overrides: HashMap::new(),
            last: HashMap::new(),
            scratch: Vec::new(),
            snapshot: SignalSnapshot::default(),
            elapsed: 0.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// The feed this bank samples.
    pub fn feed(&self) -> &SignalFeed {
        &self.feed
    }

    /// Conditioning for axis-like sources without an override.
    pub fn set_default_axis(&mut self, conditioning: AxisConditioning) {
        self.default_axis = conditioning.sanitized();
    }

    /// Conditioning for one specific key.
    pub fn set_conditioning(&mut self, key: &str, conditioning: AxisConditioning) {
        self.overrides
            .insert(key.to_owned(), conditioning.sanitized());
        self.last.remove(key);
    }

    /// Conditioning that applies to `key`.
    pub fn conditioning_for(&self, key: &str) -> AxisConditioning {
        if let Some(c) = self.overrides.get(key) {
            return *c;
        }
        match SignalCategory::of_key(key) {
            Some(cat) if cat.is_axis_like() => self.default_axis,
            _ => AxisConditioning::default(),
        }
    }

    /// Seconds accumulated through [`sample`](Self::sample).
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// The most recent snapshot.
    pub fn snapshot(&self) -> &SignalSnapshot {
        &self.snapshot
    }

    /// Advances the clock by `dt` seconds and samples every source.
    pub fn sample(&mut self, dt: f32) -> &SignalSnapshot {
        if dt.is_finite() && dt > 0.0 {
            self.elapsed += f64::from(dt);
        }
        let frame = self.snapshot.frame + 1;

        let mut scratch = std::mem::take(&mut self.scratch);
        self.feed.read_all(&mut scratch);

        let mut values = HashMap::with_capacity(scratch.len() + 4);
        for (key, raw) in scratch.drain(..) {
            let conditioning = self.conditioning_for(&key);
            let value = if conditioning.is_identity() {
                raw
            } else {
                conditioning.apply(raw, self.last.get(&key).copied())
            };
            self.last.insert(key.clone(), value);
            values.insert(key, value);
        }
        self.scratch = scratch;
        self.last.retain(|k, _| values.contains_key(k));

        values.insert("timer.seconds".into(), self.elapsed as f32);
        values.insert("timer.frame".into(), frame as f32);
        values.insert("timer.phase".into(), self.elapsed.fract() as f32);
        values.insert("random.value".into(), self.rng.gen_range(0.0..1.0));

        self.snapshot = SignalSnapshot { values, frame };
        &self.snapshot
    }
}
