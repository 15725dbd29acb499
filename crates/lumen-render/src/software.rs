//! Deterministic CPU render backend.
//!
//! [`SoftwareBackend`] keeps every target as an RGBA `f32` image in memory
//! and implements the built-in programs as per-pixel functions. It exists so
//! the engine runs headless (CLI rendering, CI) and so every failure path of
//! the resource manager and frame renderer can be driven from tests through a
//! [`SoftwareHandle`]:
//!
//! - failed target allocations and completeness checks
//! - failing programs by key
//! - context loss and restoration
//! - target aliasing (the backend hands out an existing target again)

use std::collections::{HashMap, HashSet};
use std::f32::consts::TAU;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{
    BackendError, DrawCall, PixelBuffer, ProgramId, RenderBackend, Resolution, TargetId, luminance,
};

/// Programs the software backend knows, keyed by canonical program key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Program {
    Canvas,
    SolidColor,
    Oscillator,
    Noise,
    Gradient,
    ColorAdjust,
    Invert,
    Transform,
    Blend,
    Mask,
    Lfo,
}

impl Program {
    fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "canvas" => Self::Canvas,
            "solid_color" => Self::SolidColor,
            "oscillator" => Self::Oscillator,
            "noise" => Self::Noise,
            "gradient" => Self::Gradient,
            "color_adjust" => Self::ColorAdjust,
            "invert" => Self::Invert,
            "transform" => Self::Transform,
            "blend" => Self::Blend,
            "mask" => Self::Mask,
            "lfo" => Self::Lfo,
            _ => return None,
        })
    }
}

/// Counters and injected faults shared between a backend and its handles.
#[derive(Debug, Default)]
struct SharedState {
    fail_allocations: usize,
    fail_completeness: usize,
    failing_programs: HashSet<String>,
    alias_next: bool,
    context_lost: bool,
    /// Bumped on every context loss; targets from older generations are dead.
    generation: u64,
    counters: BackendCounters,
}

/// Lifetime counters of a [`SoftwareBackend`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendCounters {
    /// Targets successfully created.
    pub targets_created: u64,
    /// Targets destroyed through [`RenderBackend::destroy_target`].
    pub targets_destroyed: u64,
    /// Programs bound.
    pub programs_bound: u64,
    /// Programs released.
    pub programs_released: u64,
    /// Successful program runs.
    pub draws: u64,
}

/// Cloneable control handle for a [`SoftwareBackend`].
///
/// Stays usable after the backend has been boxed and moved into an engine.
#[derive(Debug, Clone, Default)]
pub struct SoftwareHandle(Arc<Mutex<SharedState>>);

impl SoftwareHandle {
    /// Makes the next `count` target allocations fail.
    pub fn fail_next_allocations(&self, count: usize) {
        self.0.lock().fail_allocations = count;
    }

    /// Makes the next `count` completeness checks fail.
    pub fn fail_next_completeness_checks(&self, count: usize) {
        self.0.lock().fail_completeness = count;
    }

    /// Makes every run of the program bound for `key` fail.
    pub fn fail_program(&self, key: &str) {
        self.0.lock().failing_programs.insert(key.to_owned());
    }

    /// Undoes [`fail_program`](Self::fail_program).
    pub fn heal_program(&self, key: &str) {
        self.0.lock().failing_programs.remove(key);
    }

    /// Makes the next allocation return the most recently created target
    /// again instead of new storage, the way a pooling driver might.
    pub fn alias_next_allocation(&self) {
        self.0.lock().alias_next = true;
    }

    /// Simulates device loss: every target and program becomes invalid.
    pub fn lose_context(&self) {
        let mut state = self.0.lock();
        state.context_lost = true;
        state.generation += 1;
    }

    /// Simulates the device coming back. Old handles stay invalid.
    pub fn restore_context(&self) {
        self.0.lock().context_lost = false;
    }

    /// Returns `true` while the simulated context is lost.
    pub fn is_context_lost(&self) -> bool {
        self.0.lock().context_lost
    }

    /// Current counters.
    pub fn counters(&self) -> BackendCounters {
        self.0.lock().counters
    }
}

#[derive(Debug)]
struct Target {
    generation: u64,
    image: PixelBuffer,
}

#[derive(Debug)]
struct Bound {
    generation: u64,
    key: String,
    program: Program,
}

/// CPU implementation of [`RenderBackend`].
#[derive(Debug, Default)]
pub struct SoftwareBackend {
    targets: HashMap<TargetId, Target>,
    programs: HashMap<ProgramId, Bound>,
    next_id: u64,
    last_target: Option<TargetId>,
    shared: SoftwareHandle,
}

impl SoftwareBackend {
    /// Creates a backend with no targets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a control handle sharing this backend's fault state.
    pub fn handle(&self) -> SoftwareHandle {
        self.shared.clone()
    }

    /// Number of live targets in the current context.
    pub fn live_targets(&self) -> usize {
        let generation = self.shared.0.lock().generation;
        self.targets
            .values()
            .filter(|t| t.generation == generation)
            .count()
    }

    fn next_handle(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn generation(&self) -> u64 {
        self.shared.0.lock().generation
    }

    /// Drops storage left over from a lost context.
    fn purge_stale(&mut self) {
        let generation = self.generation();
        self.targets.retain(|_, t| t.generation == generation);
        self.programs.retain(|_, p| p.generation == generation);
    }

    fn image(&self, target: TargetId) -> Result<&PixelBuffer, BackendError> {
        let generation = self.generation();
        self.targets
            .get(&target)
            .filter(|t| t.generation == generation)
            .map(|t| &t.image)
            .ok_or(BackendError::InvalidTarget(target))
    }
}

impl RenderBackend for SoftwareBackend {
    fn name(&self) -> &str {
        "software"
    }

    fn create_target(&mut self, resolution: Resolution) -> Result<TargetId, BackendError> {
        {
            let mut state = self.shared.0.lock();
            if state.context_lost {
                return Err(BackendError::ContextLost);
            }
            if state.fail_allocations > 0 {
                state.fail_allocations -= 1;
                return Err(BackendError::Allocation("injected failure".into()));
            }
            if state.alias_next {
                state.alias_next = false;
                let generation = state.generation;
                if let Some(last) = self.last_target
                    && self
                        .targets
                        .get(&last)
                        .is_some_and(|t| t.generation == generation)
                {
                    return Ok(last);
                }
            }
        }
        if resolution.is_empty() {
            return Err(BackendError::Allocation(format!(
                "zero-sized target {resolution}"
            )));
        }

        self.purge_stale();
        let id = TargetId(self.next_handle());
        let generation = self.generation();
        self.targets.insert(
            id,
            Target {
                generation,
                image: PixelBuffer::filled(resolution, [0.0; 4]),
            },
        );
        self.last_target = Some(id);
        self.shared.0.lock().counters.targets_created += 1;
        Ok(id)
    }

    fn destroy_target(&mut self, target: TargetId) {
        if self.targets.remove(&target).is_some() {
            self.shared.0.lock().counters.targets_destroyed += 1;
        }
    }

    fn is_target_valid(&self, target: TargetId) -> bool {
        !self.is_context_lost() && self.image(target).is_ok()
    }

    fn check_complete(&self, target: TargetId) -> Result<(), BackendError> {
        self.image(target)?;
        let mut state = self.shared.0.lock();
        if state.fail_completeness > 0 {
            state.fail_completeness -= 1;
            return Err(BackendError::Incomplete(target));
        }
        Ok(())
    }

    fn bind_program(&mut self, program_key: &str) -> Result<ProgramId, BackendError> {
        if self.is_context_lost() {
            return Err(BackendError::ContextLost);
        }
        let program = Program::from_key(program_key)
            .ok_or_else(|| BackendError::UnknownProgram(program_key.to_owned()))?;
        let id = ProgramId(self.next_handle());
        let generation = self.generation();
        self.programs.insert(
            id,
            Bound {
                generation,
                key: program_key.to_owned(),
                program,
            },
        );
        self.shared.0.lock().counters.programs_bound += 1;
        Ok(id)
    }

    fn release_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_some() {
            self.shared.0.lock().counters.programs_released += 1;
        }
    }

    fn clear_target(&mut self, target: TargetId, color: [f32; 4]) -> Result<(), BackendError> {
        if self.is_context_lost() {
            return Err(BackendError::ContextLost);
        }
        let generation = self.generation();
        let t = self
            .targets
            .get_mut(&target)
            .filter(|t| t.generation == generation)
            .ok_or(BackendError::InvalidTarget(target))?;
        t.image.pixels.fill(color);
        Ok(())
    }

    fn run_program(&mut self, program: ProgramId, call: &DrawCall<'_>) -> Result<(), BackendError> {
        if self.is_context_lost() {
            return Err(BackendError::ContextLost);
        }
        let generation = self.generation();
        let bound = self
            .programs
            .get(&program)
            .filter(|p| p.generation == generation)
            .ok_or(BackendError::InvalidProgram(program))?;
        let (key, kind) = (bound.key.clone(), bound.program);
        if self.shared.0.lock().failing_programs.contains(&key) {
            return Err(BackendError::ProgramFailed {
                key,
                reason: "injected failure".into(),
            });
        }

        // Take the output out of the map so inputs can be borrowed alongside it.
        // An input aliasing the output is then simply missing.
        let mut output = self
            .targets
            .remove(&call.output)
            .filter(|t| t.generation == generation)
            .ok_or(BackendError::InvalidTarget(call.output))?;

        let inputs: Result<Vec<&PixelBuffer>, BackendError> = call
            .inputs
            .iter()
            .map(|&id| {
                self.targets
                    .get(&id)
                    .filter(|t| t.generation == generation)
                    .map(|t| &t.image)
                    .ok_or(BackendError::InvalidTarget(id))
            })
            .collect();

        let result = inputs.map(|inputs| shade(kind, call, &inputs, &mut output.image));
        self.targets.insert(call.output, output);
        result?;
        self.shared.0.lock().counters.draws += 1;
        Ok(())
    }

    fn sample_scalar(&self, target: TargetId) -> Result<f32, BackendError> {
        if self.is_context_lost() {
            return Err(BackendError::ContextLost);
        }
        Ok(self.image(target)?.mean_luminance())
    }

    fn read_pixels(&self, target: TargetId) -> Result<PixelBuffer, BackendError> {
        if self.is_context_lost() {
            return Err(BackendError::ContextLost);
        }
        self.image(target).cloned()
    }

    fn is_context_lost(&self) -> bool {
        self.shared.is_context_lost()
    }
}

// ---------------------------------------------------------------------------
// Programs
// ---------------------------------------------------------------------------

const TRANSPARENT: [f32; 4] = [0.0; 4];

/// Nearest-neighbour lookup at normalized coordinates; transparent outside.
fn sample(image: &PixelBuffer, u: f32, v: f32) -> [f32; 4] {
    if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
        return TRANSPARENT;
    }
    let x = (u * image.resolution.width as f32) as u32;
    let y = (v * image.resolution.height as f32) as u32;
    image.get(x, y).unwrap_or(TRANSPARENT)
}

fn input<'a>(inputs: &[&'a PixelBuffer], index: usize) -> Option<&'a PixelBuffer> {
    inputs.get(index).copied()
}

/// Periodic waveform in 0..1 for a phase in cycles.
fn wave(shape: &str, phase: f32) -> f32 {
    let p = phase.rem_euclid(1.0);
    match shape {
        "square" => {
            if p < 0.5 {
                1.0
            } else {
                0.0
            }
        }
        "triangle" => 1.0 - (2.0 * p - 1.0).abs(),
        "sawtooth" => p,
        _ => 0.5 + 0.5 * (p * TAU).sin(),
    }
}

fn lerp(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    core::array::from_fn(|i| a[i] + (b[i] - a[i]) * t)
}

fn clamp_rgb(p: [f32; 4]) -> [f32; 4] {
    [
        p[0].clamp(0.0, 1.0),
        p[1].clamp(0.0, 1.0),
        p[2].clamp(0.0, 1.0),
        p[3].clamp(0.0, 1.0),
    ]
}

/// Integer lattice hash to 0..1.
fn hash2(seed: u32, x: i32, y: i32) -> f32 {
    let mut h = seed
        .wrapping_mul(0x9E37_79B9)
        .wrapping_add((x as u32).wrapping_mul(0x85EB_CA6B))
        .wrapping_add((y as u32).wrapping_mul(0xC2B2_AE35));
    h ^= h >> 16;
    h = h.wrapping_mul(0x7FEB_352D);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846C_A68B);
    h ^= h >> 16;
    (h & 0x00FF_FFFF) as f32 / 16_777_215.0
}

fn value_noise(seed: u32, x: f32, y: f32) -> f32 {
    let (xi, yi) = (x.floor(), y.floor());
    let (fx, fy) = (x - xi, y - yi);
    let (sx, sy) = (fx * fx * (3.0 - 2.0 * fx), fy * fy * (3.0 - 2.0 * fy));
    let (xi, yi) = (xi as i32, yi as i32);
    let a = hash2(seed, xi, yi);
    let b = hash2(seed, xi + 1, yi);
    let c = hash2(seed, xi, yi + 1);
    let d = hash2(seed, xi + 1, yi + 1);
    let top = a + (b - a) * sx;
    let bottom = c + (d - c) * sx;
    top + (bottom - top) * sy
}

/// Rotates RGB around the grey axis by `degrees`.
fn rotate_hue(p: [f32; 4], degrees: f32) -> [f32; 4] {
    let (s, c) = degrees.to_radians().sin_cos();
    let k = (1.0 - c) / 3.0;
    let r3 = 1.0 / 3.0_f32.sqrt() * s;
    let m = [c + k, k - r3, k + r3];
    [
        p[0] * m[0] + p[1] * m[1] + p[2] * m[2],
        p[0] * m[2] + p[1] * m[0] + p[2] * m[1],
        p[0] * m[1] + p[1] * m[2] + p[2] * m[0],
        p[3],
    ]
}

fn blend_op(mode: &str, a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    let f = |x: f32, y: f32| match mode {
        "add" => (x + y).min(1.0),
        "multiply" => x * y,
        "screen" => 1.0 - (1.0 - x) * (1.0 - y),
        "difference" => (x - y).abs(),
        _ => y,
    };
    [f(a[0], b[0]), f(a[1], b[1]), f(a[2], b[2]), a[3].max(b[3])]
}

/// Runs one program over every pixel of `out`.
fn shade(kind: Program, call: &DrawCall<'_>, inputs: &[&PixelBuffer], out: &mut PixelBuffer) {
    let Resolution { width, height } = out.resolution;
    let t = call.time;
    let c0 = call.control(0);

    // Per-node constants.
    let color = call.color("color", [1.0; 4]);
    let color_b = call.color("color_b", [0.0, 0.0, 0.0, 1.0]);
    let rotation = call.number("rotation", 0.0);
    let waveform = call.text("waveform", "sine");
    let mode = call.text("blend_mode", "normal");
    let in0 = input(inputs, 0);
    let in1 = input(inputs, 1);

    let lfo_level = (call.number("bias", 0.5)
        + call.number("amplitude", 0.5) * (wave(waveform, t * call.number("frequency", 0.5)) - 0.5))
        .clamp(0.0, 1.0);

    for y in 0..height {
        for x in 0..width {
            let u = (x as f32 + 0.5) / width as f32;
            let v = (y as f32 + 0.5) / height as f32;
            let src = in0.map_or(TRANSPARENT, |img| sample(img, u, v));

            let px = match kind {
                Program::Canvas => {
                    let opacity = call.number("opacity", 1.0);
                    [src[0] * opacity, src[1] * opacity, src[2] * opacity, 1.0]
                }
                Program::SolidColor => color,
                Program::Oscillator => {
                    let freq = call.number("frequency", 4.0) + c0;
                    let (s, c) = rotation.to_radians().sin_cos();
                    let phase = (u * c + v * s) * freq + t * call.number("speed", 1.0);
                    let level = wave(waveform, phase) * call.number("amplitude", 1.0);
                    [color[0] * level, color[1] * level, color[2] * level, 1.0]
                }
                Program::Noise => {
                    let scale = (call.number("scale", 8.0) + c0).max(0.1);
                    let octaves = call.number("octaves", 4.0).max(1.0) as u32;
                    let seed = call.number("seed", 0.0) as u32;
                    let drift = t * call.number("speed", 0.5);
                    let (mut sum, mut amp, mut freq, mut norm) = (0.0, 1.0, scale, 0.0);
                    for octave in 0..octaves {
                        sum += amp * value_noise(seed.wrapping_add(octave), u * freq + drift, v * freq);
                        norm += amp;
                        amp *= 0.5;
                        freq *= 2.0;
                    }
                    let n = sum / norm;
                    [n, n, n, 1.0]
                }
                Program::Gradient => {
                    let (s, c) = rotation.to_radians().sin_cos();
                    let along = (u - 0.5) * c + (v - 0.5) * s + 0.5;
                    let k = (along + call.number("offset_x", 0.0) + c0).clamp(0.0, 1.0);
                    lerp(color, color_b, k)
                }
                Program::ColorAdjust => {
                    let brightness = call.number("brightness", 0.0) + c0;
                    let contrast = call.number("contrast", 1.0);
                    let saturation = call.number("saturation", 1.0);
                    let mut p = src;
                    for ch in &mut p[..3] {
                        *ch = (*ch - 0.5) * contrast + 0.5 + brightness;
                    }
                    let l = luminance(p);
                    for ch in &mut p[..3] {
                        *ch = l + (*ch - l) * saturation;
                    }
                    clamp_rgb(rotate_hue(p, call.number("hue", 0.0)))
                }
                Program::Invert => {
                    let mix = (call.number("mix", 1.0) + c0).clamp(0.0, 1.0);
                    let inv = [1.0 - src[0], 1.0 - src[1], 1.0 - src[2], src[3]];
                    lerp(src, inv, mix)
                }
                Program::Transform => {
                    let scale = call.number("scale", 1.0).max(1e-3);
                    let (s, c) = (-(rotation + c0)).to_radians().sin_cos();
                    let du = u - 0.5 - call.number("offset_x", 0.0);
                    let dv = v - 0.5 - call.number("offset_y", 0.0);
                    let su = (du * c - dv * s) / scale + 0.5;
                    let sv = (du * s + dv * c) / scale + 0.5;
                    in0.map_or(TRANSPARENT, |img| sample(img, su, sv))
                }
                Program::Blend => {
                    let other = in1.map_or(TRANSPARENT, |img| sample(img, u, v));
                    let mix = (call.number("mix", 0.5) + c0).clamp(0.0, 1.0);
                    lerp(src, blend_op(mode, src, other), mix)
                }
                Program::Mask => {
                    let mask = in1.map_or(TRANSPARENT, |img| sample(img, u, v));
                    let threshold = call.number("threshold", 0.5) + c0;
                    let invert = call.number("invert", 0.0) >= 0.5;
                    if (luminance(mask) > threshold) != invert {
                        src
                    } else {
                        TRANSPARENT
                    }
                }
                Program::Lfo => [lfo_level, lfo_level, lfo_level, 1.0],
            };
            out.pixels[(y * width + x) as usize] = px;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::{NodeId, ParamValue};
    use std::collections::BTreeMap;

    const RES: Resolution = Resolution::new(4, 4);

    fn call<'a>(
        output: TargetId,
        inputs: &'a [TargetId],
        params: &'a BTreeMap<String, ParamValue>,
    ) -> DrawCall<'a> {
        DrawCall {
            node: NodeId::from_raw(1),
            output,
            inputs,
            controls: &[],
            params,
            time: 0.0,
        }
    }

    #[test]
    fn solid_color_fills_target() {
        let mut b = SoftwareBackend::new();
        let t = b.create_target(RES).unwrap();
        let p = b.bind_program("solid_color").unwrap();
        let mut params = BTreeMap::new();
        params.insert("color".into(), ParamValue::Color([0.0, 1.0, 0.0, 1.0]));
        b.run_program(p, &call(t, &[], &params)).unwrap();
        let px = b.read_pixels(t).unwrap();
        assert!(px.pixels.iter().all(|&c| c == [0.0, 1.0, 0.0, 1.0]));
        assert!((b.sample_scalar(t).unwrap() - 0.7152).abs() < 1e-5);
    }

    #[test]
    fn invert_reads_input() {
        let mut b = SoftwareBackend::new();
        let src = b.create_target(RES).unwrap();
        let dst = b.create_target(RES).unwrap();
        b.clear_target(src, [1.0, 1.0, 1.0, 1.0]).unwrap();
        let p = b.bind_program("invert").unwrap();
        let params = BTreeMap::new();
        b.run_program(p, &call(dst, &[src], &params)).unwrap();
        assert_eq!(b.read_pixels(dst).unwrap().get(0, 0), Some([0.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn aliased_input_is_rejected_not_read() {
        let mut b = SoftwareBackend::new();
        let t = b.create_target(RES).unwrap();
        let p = b.bind_program("invert").unwrap();
        let params = BTreeMap::new();
        assert_eq!(
            b.run_program(p, &call(t, &[t], &params)),
            Err(BackendError::InvalidTarget(t))
        );
        assert!(b.is_target_valid(t), "output must survive the failed draw");
    }

    #[test]
    fn unknown_program_key() {
        let mut b = SoftwareBackend::new();
        assert_eq!(
            b.bind_program("warp_drive"),
            Err(BackendError::UnknownProgram("warp_drive".into()))
        );
    }

    #[test]
    fn injected_faults() {
        let mut b = SoftwareBackend::new();
        let h = b.handle();

        h.fail_next_allocations(1);
        assert!(matches!(b.create_target(RES), Err(BackendError::Allocation(_))));
        let t = b.create_target(RES).unwrap();

        h.fail_next_completeness_checks(1);
        assert_eq!(b.check_complete(t), Err(BackendError::Incomplete(t)));
        assert_eq!(b.check_complete(t), Ok(()));

        let p = b.bind_program("solid_color").unwrap();
        h.fail_program("solid_color");
        let params = BTreeMap::new();
        assert!(matches!(
            b.run_program(p, &call(t, &[], &params)),
            Err(BackendError::ProgramFailed { .. })
        ));
        h.heal_program("solid_color");
        assert!(b.run_program(p, &call(t, &[], &params)).is_ok());
    }

    #[test]
    fn context_loss_invalidates_everything() {
        let mut b = SoftwareBackend::new();
        let h = b.handle();
        let t = b.create_target(RES).unwrap();
        let p = b.bind_program("canvas").unwrap();

        h.lose_context();
        assert!(b.is_context_lost());
        assert!(!b.is_target_valid(t));
        assert_eq!(b.create_target(RES), Err(BackendError::ContextLost));

        h.restore_context();
        assert!(!b.is_target_valid(t), "old handles stay dead");
        let params = BTreeMap::new();
        let t2 = b.create_target(RES).unwrap();
        assert_eq!(
            b.run_program(p, &call(t2, &[], &params)),
            Err(BackendError::InvalidProgram(p))
        );
        assert_eq!(b.live_targets(), 1);
    }

    #[test]
    fn alias_hands_out_last_target() {
        let mut b = SoftwareBackend::new();
        let a = b.create_target(RES).unwrap();
        b.handle().alias_next_allocation();
        assert_eq!(b.create_target(RES).unwrap(), a);
        assert_ne!(b.create_target(RES).unwrap(), a);
    }

    #[test]
    fn waveforms_stay_in_unit_range() {
        for shape in ["sine", "square", "triangle", "sawtooth"] {
            for i in 0..100 {
                let w = wave(shape, i as f32 * 0.037 - 1.0);
                assert!((0.0..=1.0).contains(&w), "{shape} {w}");
            }
        }
    }

    #[test]
    fn hue_rotation_preserves_grey() {
        let grey = [0.4, 0.4, 0.4, 1.0];
        let out = rotate_hue(grey, 90.0);
        for ch in &out[..3] {
            assert!((ch - 0.4).abs() < 1e-5);
        }
    }
}
