//! Core simulation for the iris mirror installation.
//!
//! A generatively-textured eye degenerates under sustained visual attention
//! and heals when left alone, cycling endlessly through rebuild, steady
//! decay, blackout pause, and rebirth. This crate owns the life-cycle state
//! machine, the per-generation anatomy and shape-field generators, the
//! pathway recycling pool, and the per-frame destruction physics. Camera
//! input and canvas rasterization live in collaborator crates; the core only
//! consumes an attention signal and emits draw instructions.

use irismirror_noise::{NoiseSource, ValueNoise};
use ordered_float::OrderedFloat;
use rand::{Rng, RngCore, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

const TAU: f32 = std::f32::consts::TAU;
const PI: f32 = std::f32::consts::PI;

/// Samples per precomputed animation curve.
pub const CURVE_SAMPLES: usize = 256;

/// Number of macro radial ridges used for base-field lighting.
const N_RIDGES: usize = 45;

/// Fraction of the pupil-to-limbus span occupied by the pupillary zone.
const COLLARETTE_RATIO: f32 = 0.38;
const LIMBAL_WIDTH: f32 = 0.06;
const PUPILLARY_RUFF_WIDTH: f32 = 0.025;

/// Fixed side-light direction and strength for the sculptural shading model.
const LIGHT_ANGLE: f32 = -PI * 0.35;
const LIGHT_INTENSITY: f32 = 0.9;

/// Relaxed pupil radius as a fraction of the iris radius.
const PUPIL_BASE_RATIO: f32 = 0.38;

fn clamp01(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn fract(value: f32) -> f32 {
    value - value.floor()
}

/// Shortest unsigned distance between two angles in radians.
fn angle_difference(a: f32, b: f32) -> f32 {
    let mut diff = (a - b).abs() % TAU;
    if diff > PI {
        diff = TAU - diff;
    }
    diff
}

/// Shortest distance between two hues on the 360-degree color wheel.
fn hue_distance(a: f32, b: f32) -> f32 {
    let diff = (a - b).abs() % 360.0;
    if diff > 180.0 { 360.0 - diff } else { diff }
}

/// Errors raised while constructing an eye world.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EyeWorldError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Static configuration for the eye simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EyeConfig {
    /// Optional RNG seed for reproducible generations.
    pub rng_seed: Option<u64>,
    /// Number of radial stroma fibers.
    pub fiber_count: usize,
    /// Baseline count of freely scattered crypt sites (a random surplus is added).
    pub scattered_crypt_base: usize,
    /// Number of concentric contraction furrows.
    pub furrow_count: usize,
    /// Candidate count for the pointillist base field before cluster rejection.
    pub base_shape_budget: usize,
    /// Shape count for the faint connective web field.
    pub web_shape_count: usize,
    /// Shape count for the dark limbal border field.
    pub limbal_shape_count: usize,
    /// Shape count for the pupillary ruff field.
    pub ruff_shape_count: usize,
    /// Shape count for the collarette ring field (branch shapes are extra).
    pub collarette_shape_count: usize,
    /// Shapes generated per contraction furrow band.
    pub furrow_shapes_per_band: usize,
    /// Count of dark stroma crypt pits.
    pub crypt_shape_count: usize,
    /// Count of deeper Fuchs crypts near the collarette.
    pub fuchs_crypt_count: usize,
    /// Count of static melanin speckles.
    pub speckle_count: usize,
    /// Capacity of each per-family pathway queue.
    pub pathway_queue_capacity: usize,
    /// Spring constant driving smoothed attention toward its target.
    pub attention_stiffness: f32,
    /// Exponential damping applied to attention velocity.
    pub attention_damping: f32,
    /// Seconds a noisy target must hold steady before being committed.
    pub attention_hold_threshold: f32,
    /// Target jump large enough to bypass the hold timer.
    pub attention_jump_threshold: f32,
    /// Fatigue accrued per second at full attention.
    pub fatigue_rate: f32,
    /// Extra fatigue multiplier at full proximity (fear response).
    pub proximity_boost: f32,
    /// Healing rate per second when nobody is present.
    pub solitude_heal_rate: f32,
    /// Healing rate per second under low attention.
    pub low_attention_heal_rate: f32,
    /// Attention level below which slow healing starts.
    pub low_attention_threshold: f32,
    /// Fatigue never drops below this floor outside a rebuild.
    pub fatigue_floor: f32,
    /// Seconds of blackout between destruction and rebirth.
    pub pause_duration: f32,
    /// Rebuild progress gained per second (0.2 gives a five second rebuild).
    pub rebuild_rate: f32,
    /// Smoothed fatigue above which destruction drift begins.
    pub destruction_onset: f32,
    /// Width of the fade band trailing the healing growth edge.
    pub growth_fade_band: f32,
    /// Drive the healing sweep from the outer edge inward instead of the
    /// uniform fade-in; the distance bookkeeping is live either way.
    pub radial_growth_sweep: bool,
    /// Maximum number of status snapshots retained in memory.
    pub history_capacity: usize,
}

impl Default for EyeConfig {
    fn default() -> Self {
        Self {
            rng_seed: None,
            fiber_count: 50,
            scattered_crypt_base: 30,
            furrow_count: 4,
            base_shape_budget: 4_000,
            web_shape_count: 1_200,
            limbal_shape_count: 300,
            ruff_shape_count: 400,
            collarette_shape_count: 400,
            furrow_shapes_per_band: 60,
            crypt_shape_count: 80,
            fuchs_crypt_count: 25,
            speckle_count: 150,
            pathway_queue_capacity: 50,
            attention_stiffness: 25.0,
            attention_damping: 6.0,
            attention_hold_threshold: 0.15,
            attention_jump_threshold: 0.3,
            fatigue_rate: 0.06,
            proximity_boost: 1.5,
            solitude_heal_rate: 0.15,
            low_attention_heal_rate: 0.05,
            low_attention_threshold: 0.3,
            fatigue_floor: 0.02,
            pause_duration: 4.0,
            rebuild_rate: 0.2,
            destruction_onset: 0.3,
            growth_fade_band: 0.1,
            radial_growth_sweep: false,
            history_capacity: 256,
        }
    }
}

impl EyeConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), EyeWorldError> {
        if self.fiber_count == 0 || self.furrow_count == 0 {
            return Err(EyeWorldError::InvalidConfig(
                "fiber and furrow counts must be non-zero",
            ));
        }
        if self.base_shape_budget == 0 || self.web_shape_count == 0 {
            return Err(EyeWorldError::InvalidConfig(
                "shape budgets must be non-zero",
            ));
        }
        if self.pathway_queue_capacity == 0 {
            return Err(EyeWorldError::InvalidConfig(
                "pathway_queue_capacity must be non-zero",
            ));
        }
        if self.attention_stiffness <= 0.0 || self.attention_damping <= 0.0 {
            return Err(EyeWorldError::InvalidConfig(
                "attention spring parameters must be positive",
            ));
        }
        if self.fatigue_rate < 0.0
            || self.proximity_boost < 0.0
            || self.solitude_heal_rate < 0.0
            || self.low_attention_heal_rate < 0.0
        {
            return Err(EyeWorldError::InvalidConfig(
                "fatigue and healing rates must be non-negative",
            ));
        }
        if !(0.0..1.0).contains(&self.fatigue_floor) {
            return Err(EyeWorldError::InvalidConfig(
                "fatigue_floor must lie in [0, 1)",
            ));
        }
        if self.pause_duration <= 0.0 || self.rebuild_rate <= 0.0 {
            return Err(EyeWorldError::InvalidConfig(
                "pause_duration and rebuild_rate must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.destruction_onset) {
            return Err(EyeWorldError::InvalidConfig(
                "destruction_onset must lie in [0, 1]",
            ));
        }
        if self.growth_fade_band <= 0.0 || self.growth_fade_band > 1.0 {
            return Err(EyeWorldError::InvalidConfig(
                "growth_fade_band must lie in (0, 1]",
            ));
        }
        if self.history_capacity == 0 {
            return Err(EyeWorldError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Palette
// ---------------------------------------------------------------------------

/// One preset hue triple in the palette table.
#[derive(Debug, Clone, Copy)]
pub struct PaletteEntry {
    pub name: &'static str,
    pub base: f32,
    pub secondary: f32,
    pub tertiary: f32,
}

/// Fixed table of eye color presets (HSB hue degrees).
pub const EYE_PALETTES: [PaletteEntry; 10] = [
    PaletteEntry { name: "hazel", base: 95.0, secondary: 28.0, tertiary: 40.0 },
    PaletteEntry { name: "blue", base: 210.0, secondary: 200.0, tertiary: 220.0 },
    PaletteEntry { name: "green", base: 120.0, secondary: 45.0, tertiary: 80.0 },
    PaletteEntry { name: "brown", base: 30.0, secondary: 20.0, tertiary: 35.0 },
    PaletteEntry { name: "amber", base: 40.0, secondary: 25.0, tertiary: 45.0 },
    PaletteEntry { name: "gray", base: 200.0, secondary: 180.0, tertiary: 210.0 },
    PaletteEntry { name: "violet", base: 270.0, secondary: 280.0, tertiary: 260.0 },
    PaletteEntry { name: "honey", base: 45.0, secondary: 35.0, tertiary: 50.0 },
    PaletteEntry { name: "olive", base: 75.0, secondary: 40.0, tertiary: 60.0 },
    PaletteEntry { name: "teal", base: 175.0, secondary: 165.0, tertiary: 180.0 },
];

/// Pick the next palette index, steering away from the previous choice.
///
/// Candidates repeating the previous index (or an adjacent one) are redrawn
/// up to ten times; a candidate whose base hue sits within 40 degrees of the
/// previous base hue is swapped for an opposite-wheel draw when one
/// qualifies. After the bounded retries the last candidate stands.
pub fn choose_palette(rng: &mut dyn RngCore, last: Option<usize>) -> usize {
    let mut idx = rng.random_range(0..EYE_PALETTES.len());
    let Some(last_idx) = last else {
        return idx;
    };
    let mut attempts = 0;
    while attempts < 10 && (idx == last_idx || idx.abs_diff(last_idx) <= 1) {
        idx = rng.random_range(0..EYE_PALETTES.len());
        attempts += 1;
    }
    let last_hue = EYE_PALETTES[last_idx].base;
    if hue_distance(EYE_PALETTES[idx].base, last_hue) < 40.0 {
        let opposite = rng.random_range(0..EYE_PALETTES.len());
        if hue_distance(EYE_PALETTES[opposite].base, last_hue) > 60.0 {
            idx = opposite;
        }
    }
    idx
}

/// Realized per-generation palette with jittered hues.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IrisPalette {
    pub name: String,
    pub hue_base: f32,
    pub hue_secondary: f32,
    pub hue_tertiary: f32,
}

impl IrisPalette {
    /// Realize a palette table entry with slight per-generation hue jitter.
    #[must_use]
    pub fn realize(entry: &PaletteEntry, rng: &mut SmallRng) -> Self {
        Self {
            name: entry.name.to_string(),
            hue_base: entry.base + rng.random_range(-10.0..10.0),
            hue_secondary: entry.secondary + rng.random_range(-8.0..8.0),
            hue_tertiary: entry.tertiary + rng.random_range(-8.0..8.0),
        }
    }
}

impl Default for IrisPalette {
    fn default() -> Self {
        let entry = &EYE_PALETTES[0];
        Self {
            name: entry.name.to_string(),
            hue_base: entry.base,
            hue_secondary: entry.secondary,
            hue_tertiary: entry.tertiary,
        }
    }
}

// ---------------------------------------------------------------------------
// Animation curves
// ---------------------------------------------------------------------------

/// Precomputed easing and periodic curves sampled at fixed resolution.
#[derive(Debug, Clone)]
pub struct CurveTable {
    fade_in: [f32; CURVE_SAMPLES],
    fade_out: [f32; CURVE_SAMPLES],
    pulse: [f32; CURVE_SAMPLES],
}

impl CurveTable {
    /// Build the ease-out cubic, ease-in cubic, and sinusoidal pulse tables.
    #[must_use]
    pub fn new() -> Self {
        let mut fade_in = [0.0; CURVE_SAMPLES];
        let mut fade_out = [0.0; CURVE_SAMPLES];
        let mut pulse = [0.0; CURVE_SAMPLES];
        for i in 0..CURVE_SAMPLES {
            let t = i as f32 / (CURVE_SAMPLES - 1) as f32;
            fade_in[i] = 1.0 - (1.0 - t).powi(3);
            fade_out[i] = t.powi(3);
            pulse[i] = 0.5 + 0.5 * (t * TAU).sin();
        }
        Self { fade_in, fade_out, pulse }
    }

    fn sample(curve: &[f32; CURVE_SAMPLES], t: f32) -> f32 {
        let idx = (clamp01(t) * (CURVE_SAMPLES - 1) as f32) as usize;
        curve[idx]
    }

    /// Ease-out cubic fade-in at `t` in `[0, 1]`.
    #[must_use]
    pub fn fade_in(&self, t: f32) -> f32 {
        Self::sample(&self.fade_in, t)
    }

    /// Ease-in cubic fade-out at `t` in `[0, 1]`.
    #[must_use]
    pub fn fade_out(&self, t: f32) -> f32 {
        Self::sample(&self.fade_out, t)
    }

    /// Sinusoidal pulse over one period of `t` in `[0, 1]`.
    #[must_use]
    pub fn pulse(&self, t: f32) -> f32 {
        Self::sample(&self.pulse, t)
    }
}

impl Default for CurveTable {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Pathways and the recycling pool
// ---------------------------------------------------------------------------

/// Shape families backed by pathway queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeFamily {
    Base,
    Fiber,
    Web,
}

/// Precomputed attribute bundle for recycling a base-field shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BasePathway {
    pub r_norm: f32,
    pub angle: f32,
    pub size_mod: f32,
    pub hue_mod: f32,
    pub aspect_ratio: f32,
    pub fade_start: f32,
    pub fade_end: f32,
    pub cluster: f32,
}

/// Precomputed attribute bundle for recycling a fiber-field shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FiberPathway {
    pub t_base: f32,
    pub angle: f32,
    pub scatter: f32,
    pub size_mod: f32,
    pub hue_mod: f32,
    pub fade_start: f32,
    pub fade_end: f32,
}

/// Precomputed attribute bundle for recycling a web-field shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WebPathway {
    pub t_base: f32,
    pub angle: f32,
    pub scatter: f32,
    pub size_mod: f32,
    pub hue_mod: f32,
    pub fade_start: f32,
    pub fade_end: f32,
}

/// Per-family queues of precomputed pathways.
///
/// Queues are bulk-filled at (re)initialization and topped up by at most one
/// element per queue per tick, bounding the per-frame generation cost.
/// Draining happens only through reassignment.
#[derive(Debug)]
pub struct PathwayPool {
    capacity: usize,
    seed: u64,
    base: VecDeque<BasePathway>,
    fiber: VecDeque<FiberPathway>,
    web: VecDeque<WebPathway>,
}

impl PathwayPool {
    /// Create an empty pool with the given per-queue capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            seed: 0,
            base: VecDeque::with_capacity(capacity),
            fiber: VecDeque::with_capacity(capacity),
            web: VecDeque::with_capacity(capacity),
        }
    }

    /// Per-queue capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current length of a family queue.
    #[must_use]
    pub fn len(&self, family: ShapeFamily) -> usize {
        match family {
            ShapeFamily::Base => self.base.len(),
            ShapeFamily::Fiber => self.fiber.len(),
            ShapeFamily::Web => self.web.len(),
        }
    }

    /// True when every queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.fiber.is_empty() && self.web.is_empty()
    }

    fn next_seed(&mut self) -> f32 {
        self.seed += 1;
        self.seed as f32
    }

    fn synth_base(&mut self, noise: &dyn NoiseSource, rng: &mut SmallRng) -> BasePathway {
        let seed = self.next_seed();
        let fade_start = rng.random_range(0.0..0.3);
        let fade_end = fade_start + 0.2 + rng.random_range(0.0..0.2);
        BasePathway {
            r_norm: (noise.sample(seed * 0.1) + noise.sample(seed * 0.05 + 100.0)) * 0.5,
            angle: noise.sample(seed * 0.15 + 200.0) * TAU,
            size_mod: noise.sample(seed * 0.1 + 500.0),
            hue_mod: (noise.sample(seed * 0.05 + 600.0) - 0.5) * 15.0,
            aspect_ratio: 0.7 + noise.sample(seed * 0.15 + 700.0) * 0.3,
            fade_start,
            fade_end,
            cluster: noise.sample(seed * 0.08 + 800.0),
        }
    }

    fn synth_fiber(&mut self, noise: &dyn NoiseSource, rng: &mut SmallRng) -> FiberPathway {
        let seed = self.next_seed();
        let fade_start = rng.random_range(0.0..0.3);
        let fade_end = fade_start + 0.2 + rng.random_range(0.0..0.15);
        FiberPathway {
            t_base: noise.sample(seed * 0.12 + 100.0),
            angle: noise.sample(seed * 0.15 + 400.0) * TAU,
            scatter: (noise.sample(seed * 0.2 + 500.0) - 0.5) * 0.3,
            size_mod: noise.sample(seed * 0.1 + 600.0),
            hue_mod: (noise.sample(seed * 0.08 + 700.0) - 0.5) * 15.0,
            fade_start,
            fade_end,
        }
    }

    fn synth_web(&mut self, noise: &dyn NoiseSource, rng: &mut SmallRng) -> WebPathway {
        let seed = self.next_seed();
        let fade_start = rng.random_range(0.0..0.3);
        let fade_end = fade_start + 0.2 + rng.random_range(0.0..0.15);
        WebPathway {
            t_base: noise.sample(seed * 0.4 + 100.0),
            angle: noise.sample(seed * 0.5 + 400.0) * TAU,
            scatter: (noise.sample(seed * 0.35 + 500.0) - 0.5) * 0.02,
            size_mod: noise.sample(seed * 0.2 + 600.0),
            hue_mod: (noise.sample(seed * 0.1 + 700.0) - 0.5) * 20.0,
            fade_start,
            fade_end,
        }
    }

    /// Bulk-fill every queue to capacity.
    pub fn fill(&mut self, noise: &dyn NoiseSource, rng: &mut SmallRng) {
        while self.base.len() < self.capacity {
            let pathway = self.synth_base(noise, rng);
            self.base.push_back(pathway);
        }
        while self.fiber.len() < self.capacity {
            let pathway = self.synth_fiber(noise, rng);
            self.fiber.push_back(pathway);
        }
        while self.web.len() < self.capacity {
            let pathway = self.synth_web(noise, rng);
            self.web.push_back(pathway);
        }
    }

    /// Background refill: at most one new pathway per queue.
    pub fn refill_step(&mut self, noise: &dyn NoiseSource, rng: &mut SmallRng) {
        if self.base.len() < self.capacity {
            let pathway = self.synth_base(noise, rng);
            self.base.push_back(pathway);
        }
        if self.fiber.len() < self.capacity {
            let pathway = self.synth_fiber(noise, rng);
            self.fiber.push_back(pathway);
        }
        if self.web.len() < self.capacity {
            let pathway = self.synth_web(noise, rng);
            self.web.push_back(pathway);
        }
    }

    /// Pop the next base pathway, synthesizing inline on underflow.
    pub fn next_base(&mut self, noise: &dyn NoiseSource, rng: &mut SmallRng) -> BasePathway {
        match self.base.pop_front() {
            Some(pathway) => pathway,
            None => self.synth_base(noise, rng),
        }
    }

    /// Pop the next fiber pathway, synthesizing inline on underflow.
    pub fn next_fiber(&mut self, noise: &dyn NoiseSource, rng: &mut SmallRng) -> FiberPathway {
        match self.fiber.pop_front() {
            Some(pathway) => pathway,
            None => self.synth_fiber(noise, rng),
        }
    }

    /// Pop the next web pathway, synthesizing inline on underflow.
    pub fn next_web(&mut self, noise: &dyn NoiseSource, rng: &mut SmallRng) -> WebPathway {
        match self.web.pop_front() {
            Some(pathway) => pathway,
            None => self.synth_web(noise, rng),
        }
    }
}

/// Rebase a recycled fade window so the shape only starts fading in once the
/// eye has healed past the current smoothed fatigue level.
fn rebase_fade(fade_start: f32, fade_end: f32, smooth_fatigue: f32) -> (f32, f32) {
    let span = fade_end - fade_start;
    let start = smooth_fatigue + 0.1 + fade_start * 0.3;
    (start, start + span)
}

// ---------------------------------------------------------------------------
// Anatomical structure
// ---------------------------------------------------------------------------

/// One radial stroma fiber, possibly forming a raised hood at the collarette.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FiberSeed {
    pub angle_offset: f32,
    pub thickness: f32,
    pub is_hood: bool,
    pub hue_shift: f32,
    pub wave_freq: f32,
    pub wave_amp: f32,
    pub taper_start: f32,
    /// Radial positions where this fiber can rupture.
    pub break_points: [f32; 3],
    /// Fatigue level at which this fiber starts breaking; staggered so
    /// fibers fail sporadically rather than all at once.
    pub break_threshold: f32,
}

/// A dark pit in the iris stroma.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CryptSite {
    pub angle: f32,
    pub r_norm: f32,
    pub size: f32,
    pub depth: f32,
    /// Part of the geometric collarette ring population.
    pub collarette: bool,
}

/// A jagged branch radiating outward from the collarette.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CollaretteBranch {
    pub base_angle: f32,
    pub length: f32,
    pub thickness: f32,
    pub hue_shift: f32,
    pub glow: f32,
    pub jagged: f32,
}

/// An irregular warm-colored patch extending outward like a sunburst.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AmberPatch {
    pub base_angle: f32,
    pub extent: f32,
    pub width: f32,
    pub intensity: f32,
    pub taper: f32,
}

/// A raised tissue pad shaded as a convex bump.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConvexPad {
    pub angle: f32,
    pub r_norm: f32,
    pub size: f32,
    pub height: f32,
    pub elongation: f32,
    pub orientation: f32,
    /// Fatigue level at which this pad starts fading; grows with radius so
    /// inner pads fail first.
    pub fade_threshold: f32,
}

/// A small pigment nub on the pupillary margin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PupillaryNub {
    pub angle: f32,
    pub size: f32,
    pub offset: f32,
}

/// Per-generation anatomical skeleton consumed by the shape generators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrisStructure {
    pub palette: IrisPalette,
    pub fibers: Vec<FiberSeed>,
    pub crypts: Vec<CryptSite>,
    pub furrow_radii: Vec<f32>,
    pub branches: Vec<CollaretteBranch>,
    pub amber_patches: Vec<AmberPatch>,
    pub pads: Vec<ConvexPad>,
    pub nubs: Vec<PupillaryNub>,
    /// Multi-frequency wobble multipliers for the pupil edge (64 samples).
    pub pupil_wobble: Vec<f32>,
    /// Wobble multipliers for the outer iris edge (64 samples).
    pub iris_wobble: Vec<f32>,
    /// Macro ridge angles driving the base-field lighting model.
    pub ridge_angles: Vec<f32>,
}

impl IrisStructure {
    /// Build a fresh anatomical skeleton for one generation.
    pub fn generate(
        config: &EyeConfig,
        palette: IrisPalette,
        noise: &dyn NoiseSource,
        rng: &mut SmallRng,
    ) -> Self {
        let fibers = Self::generate_fibers(config.fiber_count, rng);
        let crypts = Self::generate_crypts(config.scattered_crypt_base, rng);
        let furrow_radii = (0..config.furrow_count)
            .map(|i| {
                0.35 + (i as f32 / config.furrow_count as f32) * 0.55
                    + rng.random_range(-0.03..0.03)
            })
            .collect();
        let branches = Self::generate_branches(rng);
        let amber_patches = Self::generate_amber_patches(rng);
        let pads = Self::generate_pads(rng);
        let nubs = (0..45)
            .map(|i| PupillaryNub {
                angle: (i as f32 / 45.0) * TAU + rng.random_range(-0.05..0.05),
                size: rng.random_range(0.008..0.02),
                offset: rng.random_range(0.0..0.015),
            })
            .collect();
        let pupil_wobble = (0..64)
            .map(|i| {
                let a = (i as f32 / 64.0) * TAU;
                let w1 = noise.sample2(a.cos() * 2.0, a.sin() * 2.0) * 0.08;
                let w2 = noise.sample2((a * 3.0).cos() + 10.0, (a * 3.0).sin() + 10.0) * 0.04;
                let w3 = noise.sample2((a * 7.0).cos() + 20.0, (a * 7.0).sin() + 20.0) * 0.02;
                1.0 + (w1 + w2 + w3 - 0.07)
            })
            .collect();
        let iris_wobble = (0..64)
            .map(|i| {
                let a = (i as f32 / 64.0) * TAU;
                let w1 = noise.sample2(a.cos() * 1.5 + 50.0, a.sin() * 1.5 + 50.0) * 0.025;
                let w2 = noise.sample2((a * 5.0).cos() + 60.0, (a * 5.0).sin() + 60.0) * 0.01;
                1.0 + (w1 + w2 - 0.018)
            })
            .collect();
        let ridge_angles = (0..N_RIDGES)
            .map(|i| (i as f32 / N_RIDGES as f32) * TAU + rng.random_range(-0.03..0.03))
            .collect();

        Self {
            palette,
            fibers,
            crypts,
            furrow_radii,
            branches,
            amber_patches,
            pads,
            nubs,
            pupil_wobble,
            iris_wobble,
            ridge_angles,
        }
    }

    fn generate_fibers(count: usize, rng: &mut SmallRng) -> Vec<FiberSeed> {
        let mut fibers = Vec::with_capacity(count);
        // Irregular hood spacing: the first hood lands after 10-13 fibers,
        // then 1-2 "special" hoods follow at 6-8 fiber gaps before the
        // spacing relaxes back to 10-13.
        let mut next_hood_at = rng.random_range(10..14);
        let mut hood_count = 0usize;
        let special_hoods = rng.random_range(1..3);
        for i in 0..count {
            let is_hood = i == next_hood_at;
            if is_hood {
                hood_count += 1;
                next_hood_at = if hood_count <= special_hoods {
                    i + rng.random_range(6..9)
                } else {
                    i + rng.random_range(10..14)
                };
            }
            let thickness = if is_hood {
                rng.random_range(18.0..28.0)
            } else {
                let thick_type: f32 = rng.random();
                if thick_type < 0.4 {
                    rng.random_range(1.5..3.0)
                } else if thick_type < 0.8 {
                    rng.random_range(3.0..5.0)
                } else {
                    rng.random_range(5.0..8.0)
                }
            };
            fibers.push(FiberSeed {
                angle_offset: rng.random_range(-0.02..0.02),
                thickness,
                is_hood,
                hue_shift: rng.random_range(-12.0..12.0),
                wave_freq: rng.random_range(4.0..10.0),
                wave_amp: if is_hood {
                    rng.random_range(0.008..0.02)
                } else {
                    rng.random_range(0.015..0.04)
                },
                taper_start: rng.random_range(0.5..0.8),
                break_points: [
                    rng.random_range(0.2..0.4),
                    rng.random_range(0.5..0.7),
                    rng.random_range(0.75..0.9),
                ],
                break_threshold: rng.random_range(0.15..0.85),
            });
        }
        fibers
    }

    fn generate_crypts(scattered_base: usize, rng: &mut SmallRng) -> Vec<CryptSite> {
        let mut crypts = Vec::new();
        // Collarette-ring population at even angular intervals with jitter,
        // forming the geometric pattern between hoods.
        let ring_count = 30 + rng.random_range(0..15);
        for i in 0..ring_count {
            crypts.push(CryptSite {
                angle: (i as f32 / ring_count as f32) * TAU + rng.random_range(-0.08..0.08),
                r_norm: rng.random_range(0.32..0.48),
                size: rng.random_range(0.015..0.04),
                depth: rng.random_range(0.5..1.0),
                collarette: true,
            });
        }
        let scattered = scattered_base + rng.random_range(0..30);
        for _ in 0..scattered {
            let cluster_angle = rng.random_range(0.0..TAU);
            crypts.push(CryptSite {
                angle: cluster_angle + (rng.random::<f32>() - 0.5) * 0.4,
                r_norm: rng.random_range(0.2..0.9),
                size: rng.random_range(0.01..0.06),
                depth: rng.random_range(0.3..1.0),
                collarette: false,
            });
        }
        crypts
    }

    fn generate_branches(rng: &mut SmallRng) -> Vec<CollaretteBranch> {
        let count = 35 + rng.random_range(0..15);
        (0..count)
            .map(|_| {
                // Length classes: 30% short stubs, 40% medium, 30% long.
                let length_type: f32 = rng.random();
                let length = if length_type < 0.3 {
                    rng.random_range(0.1..0.25)
                } else if length_type < 0.7 {
                    rng.random_range(0.25..0.45)
                } else {
                    rng.random_range(0.45..0.7)
                };
                CollaretteBranch {
                    base_angle: rng.random_range(0.0..TAU),
                    length,
                    thickness: rng.random_range(2.0..10.0),
                    hue_shift: rng.random_range(-12.0..12.0),
                    glow: rng.random_range(0.6..1.0),
                    jagged: rng.random_range(0.3..1.0),
                }
            })
            .collect()
    }

    fn generate_amber_patches(rng: &mut SmallRng) -> Vec<AmberPatch> {
        let count = 25 + rng.random_range(0..15);
        (0..count)
            .map(|_| {
                let extent_type: f32 = rng.random();
                let extent = if extent_type < 0.2 {
                    rng.random_range(0.8..0.98)
                } else if extent_type < 0.5 {
                    rng.random_range(0.55..0.8)
                } else {
                    rng.random_range(0.3..0.55)
                };
                AmberPatch {
                    base_angle: rng.random_range(0.0..TAU),
                    extent,
                    width: rng.random_range(0.04..0.18),
                    intensity: rng.random_range(0.4..1.0),
                    taper: rng.random_range(0.3..0.8),
                }
            })
            .collect()
    }

    fn generate_pads(rng: &mut SmallRng) -> Vec<ConvexPad> {
        let count = 60 + rng.random_range(0..40);
        (0..count)
            .map(|_| {
                let angle = rng.random_range(0.0..TAU);
                let r_norm = rng.random_range(0.2..0.7);
                ConvexPad {
                    angle,
                    r_norm,
                    size: rng.random_range(0.02..0.08),
                    height: rng.random_range(0.4..1.0),
                    elongation: rng.random_range(0.5..1.5),
                    orientation: angle + rng.random_range(-0.3..0.3),
                    fade_threshold: lerp(0.5, 0.9, r_norm) + rng.random_range(-0.1..0.1),
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Shape fields
// ---------------------------------------------------------------------------

/// Sculptural lighting class assigned at generation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LightClass {
    Highlight,
    Shadow,
    Neutral,
}

/// One pointillist shape in the radial-gradient base field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BaseShape {
    pub id: u32,
    pub r_norm: f32,
    pub angle: f32,
    pub size_mod: f32,
    pub hue_mod: f32,
    pub aspect_ratio: f32,
    pub rotation: f32,
    pub fade_start: f32,
    pub fade_end: f32,
    pub cluster: f32,
    pub light: LightClass,
    /// Magnitude of the combined lighting term, scales the class effect.
    pub light_mix: f32,
    /// Angular proximity to the nearest macro ridge, `[0, 1]`.
    pub ridge_proximity: f32,
    /// Strongest amber-patch membership, `[0, 1]`.
    pub amber: f32,
    /// Darkening from nearby crypt pits, `[0, 1]`.
    pub crypt_shade: f32,
    /// Distance from the outer growth edge, for the healing sweep.
    pub grow_dist: f32,
}

/// One dot along a radial stroma fiber.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FiberShape {
    pub id: u32,
    /// Index into [`IrisStructure::fibers`].
    pub fiber_index: u32,
    pub t_base: f32,
    pub angle: f32,
    /// Normalized lateral scatter in `(-0.5, 0.5)`; its sign is the recoil
    /// direction when the fiber ruptures.
    pub scatter_norm: f32,
    pub size_mod: f32,
    pub hue_mod: f32,
    pub alpha_mod: f32,
    pub fade_start: f32,
    pub fade_end: f32,
    pub light: LightClass,
    pub light_mix: f32,
    /// Micro brightness ripple sampled once at generation.
    pub ripple: f32,
    /// Radial distance to the nearest break point of the parent fiber.
    pub break_dist: f32,
    /// Radial recoil direction away from that break point: `-1.0` toward the
    /// pupil, `1.0` toward the limbus.
    pub break_dir: f32,
    pub grow_dist: f32,
}

/// One faint dot of the connective web between fibers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WebShape {
    pub id: u32,
    pub t_base: f32,
    pub angle: f32,
    pub scatter: f32,
    pub size_mod: f32,
    pub hue_mod: f32,
    pub fade_start: f32,
    pub fade_end: f32,
    pub grow_dist: f32,
}

/// One dark fleck along a contraction furrow band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FurrowShape {
    pub band: u32,
    pub r_norm: f32,
    pub angle: f32,
    pub size_mod: f32,
    pub alpha_mod: f32,
    pub fade_start: f32,
    pub fade_end: f32,
}

/// Collarette shapes: the bright ring itself plus jagged branch dots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum CollaretteShape {
    Ring {
        angle: f32,
        r_jitter: f32,
        size_mod: f32,
        hue_mod: f32,
        glow: f32,
        fade_start: f32,
        fade_end: f32,
    },
    Branch {
        /// Index into [`IrisStructure::branches`].
        branch_index: u32,
        /// Position along the branch, `[0, 1]`.
        t: f32,
        lateral: f32,
        size_mod: f32,
        /// Fatigue level past which this dot fades out.
        fade_threshold: f32,
        /// A minority of branch dots catch the side light.
        lit: bool,
        fade_start: f32,
        fade_end: f32,
    },
}

/// Generic dot for the limbal and pupillary-ruff border bands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RimShape {
    pub angle: f32,
    pub r_norm: f32,
    pub size_mod: f32,
    pub alpha_mod: f32,
    pub hue_mod: f32,
    pub fade_start: f32,
    pub fade_end: f32,
}

/// Dark pit rendered as a wobbled ellipse.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CryptShape {
    pub angle: f32,
    pub r_norm: f32,
    pub size: f32,
    pub depth: f32,
    pub wobble: f32,
}

/// Static melanin fleck, precomputed entirely from noise.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Speckle {
    pub angle: f32,
    pub r_norm: f32,
    pub size: f32,
    pub brightness: f32,
    pub alpha: f32,
}

/// Lighting classification of a base-field position against the macro ridges
/// and the low-frequency depth zones.
fn base_lighting(
    structure: &IrisStructure,
    noise: &dyn NoiseSource,
    r_norm: f32,
    angle: f32,
) -> (LightClass, f32, f32) {
    let ridge = structure
        .ridge_angles
        .iter()
        .copied()
        .min_by_key(|ra| OrderedFloat(angle_difference(angle, *ra)))
        .unwrap_or(0.0);
    let dist = angle_difference(angle, ridge);
    let side = (angle - ridge).sin();
    let proximity = (1.0 - dist / (PI / N_RIDGES as f32)).max(0.0);
    let effective = (ridge - LIGHT_ANGLE).cos() * side * proximity;
    let depth = noise.sample2(r_norm * 4.0, angle * 2.0);
    let zone_light = (depth - 0.5) * (angle - LIGHT_ANGLE).cos() * 0.6;
    let combined = effective * 0.7 + zone_light * 0.3;
    let class = if combined > 0.25 {
        LightClass::Highlight
    } else if combined < -0.25 {
        LightClass::Shadow
    } else {
        LightClass::Neutral
    };
    (class, combined.abs().min(1.0), proximity)
}

/// Strongest amber-patch membership at a polar position.
fn amber_intensity(patches: &[AmberPatch], r_norm: f32, angle: f32) -> f32 {
    let mut strongest = 0.0f32;
    for patch in patches {
        let d = angle_difference(angle, patch.base_angle);
        if d < patch.width && r_norm < patch.extent {
            let radial = (1.0 - r_norm / patch.extent).powf(patch.taper);
            let angular = 1.0 - (d / patch.width).powf(0.7);
            strongest = strongest.max(patch.intensity * radial * angular);
        }
    }
    strongest
}

/// Distance to the nearest break point of a fiber, and the radial direction
/// pointing away from it.
fn nearest_break(break_points: &[f32; 3], t: f32) -> (f32, f32) {
    let mut dist = f32::INFINITY;
    let mut nearest = break_points[0];
    for &bp in break_points {
        let d = (t - bp).abs();
        if d < dist {
            dist = d;
            nearest = bp;
        }
    }
    let dir = if t < nearest { -1.0 } else { 1.0 };
    (dist, dir)
}

/// Darkening contributed by nearby crypt pits, `[0, 1]`.
fn crypt_shading(crypts: &[CryptSite], r_norm: f32, angle: f32) -> f32 {
    let mut shade = 0.0f32;
    for site in crypts {
        let reach = site.size * 2.5;
        let dr = r_norm - site.r_norm;
        let da = angle_difference(angle, site.angle) * r_norm.max(0.05);
        let d = (dr * dr + da * da).sqrt();
        if d < reach {
            shade = shade.max(site.depth * (1.0 - d / reach));
        }
    }
    shade.min(1.0)
}

/// Complete per-generation shape population, grouped by draw layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeField {
    pub base: Vec<BaseShape>,
    pub fibers: Vec<FiberShape>,
    pub web: Vec<WebShape>,
    pub furrows: Vec<FurrowShape>,
    pub collarette: Vec<CollaretteShape>,
    pub limbal: Vec<RimShape>,
    pub ruff: Vec<RimShape>,
    pub crypts: Vec<CryptShape>,
    pub fuchs: Vec<CryptShape>,
    pub speckles: Vec<Speckle>,
}

impl ShapeField {
    /// Generate every shape layer for one generation.
    ///
    /// Spatial attributes come from coherent noise so neighboring shapes
    /// cluster organically; per-shape jitter and fade windows come from the
    /// seeded RNG. Generation is sequential, which keeps a fixed seed fully
    /// reproducible.
    pub fn generate(
        config: &EyeConfig,
        structure: &IrisStructure,
        noise: &dyn NoiseSource,
        rng: &mut SmallRng,
    ) -> Self {
        Self {
            base: Self::generate_base(config, structure, noise, rng),
            fibers: Self::generate_fibers(structure, noise, rng),
            web: Self::generate_web(config, rng),
            furrows: Self::generate_furrows(config, structure, noise, rng),
            collarette: Self::generate_collarette(config, structure, rng),
            limbal: Self::generate_rim(
                config.limbal_shape_count,
                1.0 - LIMBAL_WIDTH,
                LIMBAL_WIDTH,
                rng,
            ),
            ruff: Self::generate_rim(
                config.ruff_shape_count,
                0.0,
                PUPILLARY_RUFF_WIDTH * 2.0,
                rng,
            ),
            crypts: Self::generate_crypt_shapes(config.crypt_shape_count, 0.15..0.85, 0.8..2.5, rng),
            fuchs: Self::generate_crypt_shapes(config.fuchs_crypt_count, 0.3..0.5, 2.0..4.0, rng),
            speckles: Self::generate_speckles(config.speckle_count, noise),
        }
    }

    fn generate_base(
        config: &EyeConfig,
        structure: &IrisStructure,
        noise: &dyn NoiseSource,
        rng: &mut SmallRng,
    ) -> Vec<BaseShape> {
        let mut shapes = Vec::with_capacity(config.base_shape_budget);
        for i in 0..config.base_shape_budget {
            let fi = i as f32;
            let cluster = noise.sample(fi * 0.08 + 800.0);
            // Cluster rejection carves organic gaps into the field.
            if cluster < 0.25 {
                continue;
            }
            let r_norm = (noise.sample(fi * 0.1) + noise.sample(fi * 0.05 + 100.0)) * 0.5;
            let angle = noise.sample(fi * 0.15 + 200.0) * TAU;
            let (light, light_mix, ridge_proximity) =
                base_lighting(structure, noise, r_norm, angle);
            let fade_start = rng.random_range(0.0..0.3);
            let fade_end = fade_start + 0.2 + rng.random_range(0.0..0.2);
            shapes.push(BaseShape {
                id: i as u32,
                r_norm,
                angle,
                size_mod: noise.sample(fi * 0.1 + 500.0),
                hue_mod: (noise.sample(fi * 0.05 + 600.0) - 0.5) * 15.0,
                aspect_ratio: 0.7 + noise.sample(fi * 0.15 + 700.0) * 0.3,
                rotation: angle + rng.random_range(-0.3..0.3),
                fade_start,
                fade_end,
                cluster,
                light,
                light_mix,
                ridge_proximity,
                amber: amber_intensity(&structure.amber_patches, r_norm, angle),
                crypt_shade: crypt_shading(&structure.crypts, r_norm, angle),
                grow_dist: 1.0 - r_norm,
            });
        }
        shapes
    }

    fn generate_fibers(
        structure: &IrisStructure,
        noise: &dyn NoiseSource,
        rng: &mut SmallRng,
    ) -> Vec<FiberShape> {
        let fiber_count = structure.fibers.len();
        let mut shapes = Vec::new();
        let mut id = 0u32;
        for (fiber_index, fiber) in structure.fibers.iter().enumerate() {
            let base_angle =
                (fiber_index as f32 / fiber_count as f32) * TAU + fiber.angle_offset;
            let light_dot = (base_angle - LIGHT_ANGLE).cos();
            let n_per = (fiber.thickness * 45.0) as usize;
            for _ in 0..n_per {
                let t: f32 = rng.random();
                let scatter = (rng.random::<f32>() - 0.5) * fiber.thickness * 0.8;
                let scatter_norm = scatter / (fiber.thickness * 0.8);
                let wave =
                    (t * PI * fiber.wave_freq + fiber_index as f32 * 0.5).sin() * fiber.wave_amp;
                // Lateral px offset approximated as an angular offset at the
                // shape's radius band.
                let angle = base_angle + wave + scatter * 0.004;
                let ridge_edge = light_dot * scatter_norm * 2.0;
                let undulation =
                    noise.sample2(t * 3.0, fiber_index as f32 * 0.1) - 0.5;
                let combined = ridge_edge * 0.8 + undulation * light_dot * 0.4;
                let light = if combined > 0.2 {
                    LightClass::Highlight
                } else if combined < -0.2 {
                    LightClass::Shadow
                } else {
                    LightClass::Neutral
                };
                let ripple = noise.sample2(
                    angle.cos() * t * 2.0 + fiber_index as f32 * 0.15,
                    angle.sin() * t * 2.0 + 500.0,
                );
                let (break_dist, break_dir) = nearest_break(&fiber.break_points, t);
                let fade_start = rng.random_range(0.0..0.3);
                let fade_end = fade_start + 0.2 + rng.random_range(0.0..0.15);
                shapes.push(FiberShape {
                    id,
                    fiber_index: fiber_index as u32,
                    t_base: t,
                    angle,
                    scatter_norm,
                    size_mod: rng.random(),
                    hue_mod: fiber.hue_shift + rng.random_range(-4.0..4.0),
                    alpha_mod: rng.random(),
                    fade_start,
                    fade_end,
                    light,
                    light_mix: combined.abs().min(1.0),
                    ripple,
                    break_dist,
                    break_dir,
                    grow_dist: t,
                });
                id += 1;
            }
        }
        shapes
    }

    fn generate_web(config: &EyeConfig, rng: &mut SmallRng) -> Vec<WebShape> {
        (0..config.web_shape_count)
            .map(|i| {
                let fade_start = rng.random_range(0.0..0.3);
                let fade_end = fade_start + 0.2 + rng.random_range(0.0..0.15);
                let t_base: f32 = rng.random();
                WebShape {
                    id: i as u32,
                    t_base,
                    angle: rng.random_range(0.0..TAU),
                    scatter: (rng.random::<f32>() - 0.5) * 0.02,
                    size_mod: rng.random(),
                    hue_mod: (rng.random::<f32>() - 0.5) * 20.0,
                    fade_start,
                    fade_end,
                    grow_dist: 1.0 - t_base,
                }
            })
            .collect()
    }

    fn generate_furrows(
        config: &EyeConfig,
        structure: &IrisStructure,
        noise: &dyn NoiseSource,
        rng: &mut SmallRng,
    ) -> Vec<FurrowShape> {
        let per_band = config.furrow_shapes_per_band;
        let mut shapes = Vec::with_capacity(structure.furrow_radii.len() * per_band);
        for (band, radius) in structure.furrow_radii.iter().enumerate() {
            for i in 0..per_band {
                let angle = (i as f32 / per_band as f32) * TAU
                    + (noise.sample(band as f32 * 31.0 + i as f32 * 0.7) - 0.5) * 0.1;
                let fade_start = rng.random_range(0.0..0.3);
                let fade_end = fade_start + 0.2 + rng.random_range(0.0..0.15);
                shapes.push(FurrowShape {
                    band: band as u32,
                    r_norm: radius + (noise.sample(angle * 3.0 + band as f32 * 7.0) - 0.5) * 0.02,
                    angle,
                    size_mod: rng.random(),
                    alpha_mod: rng.random(),
                    fade_start,
                    fade_end,
                });
            }
        }
        shapes
    }

    fn generate_collarette(
        config: &EyeConfig,
        structure: &IrisStructure,
        rng: &mut SmallRng,
    ) -> Vec<CollaretteShape> {
        let mut shapes = Vec::with_capacity(config.collarette_shape_count);
        for i in 0..config.collarette_shape_count {
            let fade_start = rng.random_range(0.0..0.3);
            let fade_end = fade_start + 0.2 + rng.random_range(0.0..0.15);
            shapes.push(CollaretteShape::Ring {
                angle: (i as f32 / config.collarette_shape_count as f32) * TAU
                    + rng.random_range(-0.02..0.02),
                r_jitter: rng.random_range(-0.015..0.015),
                size_mod: rng.random(),
                hue_mod: rng.random_range(-8.0..8.0),
                glow: rng.random_range(0.5..1.0),
                fade_start,
                fade_end,
            });
        }
        for (branch_index, branch) in structure.branches.iter().enumerate() {
            let dots = (branch.thickness * branch.length * 80.0) as usize;
            for _ in 0..dots {
                let fade_start = rng.random_range(0.0..0.3);
                let fade_end = fade_start + 0.2 + rng.random_range(0.0..0.15);
                shapes.push(CollaretteShape::Branch {
                    branch_index: branch_index as u32,
                    t: rng.random(),
                    lateral: (rng.random::<f32>() - 0.5) * branch.thickness * 0.006,
                    size_mod: rng.random(),
                    fade_threshold: rng.random_range(0.5..0.95),
                    lit: (branch.base_angle - LIGHT_ANGLE).cos() > 0.0
                        && rng.random::<f32>() < 0.35,
                    fade_start,
                    fade_end,
                });
            }
        }
        shapes
    }

    fn generate_rim(
        count: usize,
        inner: f32,
        width: f32,
        rng: &mut SmallRng,
    ) -> Vec<RimShape> {
        (0..count)
            .map(|_| {
                let fade_start = rng.random_range(0.0..0.3);
                let fade_end = fade_start + 0.2 + rng.random_range(0.0..0.15);
                RimShape {
                    angle: rng.random_range(0.0..TAU),
                    r_norm: inner + rng.random::<f32>() * width,
                    size_mod: rng.random(),
                    alpha_mod: rng.random(),
                    hue_mod: rng.random_range(-6.0..6.0),
                    fade_start,
                    fade_end,
                }
            })
            .collect()
    }

    fn generate_crypt_shapes(
        count: usize,
        r_range: std::ops::Range<f32>,
        size_range: std::ops::Range<f32>,
        rng: &mut SmallRng,
    ) -> Vec<CryptShape> {
        (0..count)
            .map(|_| CryptShape {
                angle: rng.random_range(0.0..TAU),
                r_norm: rng.random_range(r_range.clone()),
                size: rng.random_range(size_range.clone()),
                depth: rng.random_range(0.4..1.0),
                wobble: rng.random_range(0.8..1.2),
            })
            .collect()
    }

    fn generate_speckles(count: usize, noise: &dyn NoiseSource) -> Vec<Speckle> {
        (0..count)
            .map(|i| {
                let fi = i as f32;
                Speckle {
                    angle: noise.sample(fi * 0.5) * TAU,
                    r_norm: 0.1 + noise.sample(fi * 0.5 + 50.0) * 0.85,
                    size: 0.003 + noise.sample(fi * 0.5 + 100.0) * 0.006,
                    brightness: 0.1 + noise.sample(fi * 0.5 + 150.0) * 0.25,
                    alpha: 0.25 + noise.sample(fi * 0.5 + 200.0) * 0.45,
                }
            })
            .collect()
    }

    /// Total shape count across every layer.
    #[must_use]
    pub fn total_shapes(&self) -> usize {
        self.base.len()
            + self.fibers.len()
            + self.web.len()
            + self.furrows.len()
            + self.collarette.len()
            + self.limbal.len()
            + self.ruff.len()
            + self.crypts.len()
            + self.fuchs.len()
            + self.speckles.len()
    }
}

// ---------------------------------------------------------------------------
// Attention input
// ---------------------------------------------------------------------------

/// One observation from the presence detector.
///
/// `None` fields mean the detector could not measure that quantity this
/// frame. A missing `proximity` keeps the previous estimate; a missing
/// `looking_confidence` counts as nobody looking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AttentionSignal {
    /// Confidence in `[0, 1]` that someone is looking directly at the eye.
    pub looking_confidence: Option<f32>,
    /// Number of faces currently in view.
    pub face_count: Option<usize>,
    /// Nearness of the closest face in `[0, 1]`.
    pub proximity: Option<f32>,
}

/// Human-readable summary of the latest detector reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaceStatus {
    /// No detector attached or no reading this tick.
    Unavailable,
    /// Detector is live and sees nobody.
    NoFaces,
    /// Faces present but none looking directly.
    Present { count: usize },
    /// Someone is looking at the eye.
    Looking { confidence_percent: u8 },
}

/// Source of attention signals, polled once per tick.
pub trait AttentionSource: Send {
    /// Latest observation, or `None` when the detector has nothing new.
    fn latest(&mut self) -> Option<AttentionSignal>;
}

/// Attention source that never reports anything. The eye idles fully healed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAttentionSource;

impl AttentionSource for NullAttentionSource {
    fn latest(&mut self) -> Option<AttentionSignal> {
        None
    }
}

/// Replays a fixed sequence of observations, holding the final one forever.
/// Used by the headless harness and by deterministic tests.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAttention {
    signals: Vec<AttentionSignal>,
    cursor: usize,
}

impl ScriptedAttention {
    #[must_use]
    pub fn new(signals: Vec<AttentionSignal>) -> Self {
        Self { signals, cursor: 0 }
    }
}

impl AttentionSource for ScriptedAttention {
    fn latest(&mut self) -> Option<AttentionSignal> {
        if self.signals.is_empty() {
            return None;
        }
        let idx = self.cursor.min(self.signals.len() - 1);
        self.cursor += 1;
        Some(self.signals[idx])
    }
}

/// Collapse a raw observation into an attention target, a status label, and
/// whether the scene is verifiably empty.
fn fold_signal(signal: Option<AttentionSignal>) -> (f32, FaceStatus, bool) {
    let Some(signal) = signal else {
        return (0.0, FaceStatus::Unavailable, false);
    };
    let confidence = signal.looking_confidence.unwrap_or(0.0);
    match signal.face_count {
        Some(0) => (0.0, FaceStatus::NoFaces, true),
        Some(count) => {
            if confidence > 0.3 {
                let percent = (clamp01(confidence) * 100.0) as u8;
                (
                    confidence,
                    FaceStatus::Looking { confidence_percent: percent },
                    false,
                )
            } else {
                (confidence * 0.5, FaceStatus::Present { count }, false)
            }
        }
        None => {
            if confidence > 0.3 {
                let percent = (clamp01(confidence) * 100.0) as u8;
                (
                    confidence,
                    FaceStatus::Looking { confidence_percent: percent },
                    false,
                )
            } else {
                (confidence * 0.5, FaceStatus::Unavailable, false)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Life cycle
// ---------------------------------------------------------------------------

/// The three phases of the eternal cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Shapes grow back in over roughly five seconds.
    #[default]
    Rebuilding,
    /// Fatigue accrues under attention and heals in solitude.
    Steady,
    /// Blackout between destruction and rebirth.
    Paused,
}

/// Mutable life-cycle state advanced by [`EyeWorld::tick`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleState {
    pub phase: Phase,
    /// Spring-smoothed attention level in `[0, 1]`.
    pub attention: f32,
    pub attention_velocity: f32,
    /// Committed attention target after hysteresis.
    pub attention_target: f32,
    /// Raw target from the previous tick, the hysteresis reference.
    pub last_raw_target: f32,
    /// Seconds the raw target has held steady.
    pub target_hold: f32,
    /// Heavily smoothed attention used for pupil response.
    pub smooth_attention: f32,
    /// Raw structural fatigue in `[floor, 1]`.
    pub fatigue: f32,
    /// Smoothed fatigue driving all visual destruction.
    pub smooth_fatigue: f32,
    pub proximity: f32,
    pub smooth_proximity: f32,
    /// Progress through the current rebuild, `[0, 1]`.
    pub rebuild_progress: f32,
    /// Seconds remaining in the blackout pause.
    pub pause_timer: f32,
    /// Completed generation counter; 0 until the first rebuild finishes.
    pub generation: u32,
    /// Simulation clock in seconds.
    pub clock: f32,
    /// Smoothed pupil radius as a fraction of the iris radius.
    pub pupil_radius: f32,
    pub saccade_offset: [f32; 2],
    saccade_target: [f32; 2],
    saccade_timer: f32,
    /// True when the latest reading proved the scene empty.
    pub scene_empty: bool,
    pub face_status: FaceStatus,
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self {
            phase: Phase::Rebuilding,
            attention: 0.0,
            attention_velocity: 0.0,
            attention_target: 0.0,
            last_raw_target: 0.0,
            target_hold: 0.0,
            smooth_attention: 0.0,
            fatigue: 1.0,
            smooth_fatigue: 1.0,
            proximity: 0.0,
            smooth_proximity: 0.0,
            rebuild_progress: 0.0,
            pause_timer: 0.0,
            generation: 0,
            clock: 0.0,
            pupil_radius: PUPIL_BASE_RATIO,
            saccade_offset: [0.0, 0.0],
            saccade_target: [0.0, 0.0],
            saccade_timer: 0.0,
            scene_empty: false,
            face_status: FaceStatus::Unavailable,
        }
    }
}

/// Summary of everything notable that happened during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickEvents {
    pub tick: u64,
    pub phase: Phase,
    pub phase_changed: bool,
    /// Set when a blackout ended and a new generation was born.
    pub generation_started: Option<u32>,
    pub rebuild_completed: bool,
}

/// Periodic status line retained in a bounded history buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub tick: u64,
    pub phase: Phase,
    pub attention: f32,
    pub fatigue_percent: f32,
    pub generation: u32,
    pub rebuild_progress_percent: f32,
    pub face_status: FaceStatus,
}

// ---------------------------------------------------------------------------
// The world
// ---------------------------------------------------------------------------

/// Top-level simulation: one eye, its anatomy, its shape population, and the
/// life-cycle state machine that destroys and rebuilds them.
pub struct EyeWorld {
    config: EyeConfig,
    rng: SmallRng,
    noise: Box<dyn NoiseSource>,
    curves: CurveTable,
    attention: Box<dyn AttentionSource>,
    palette_index: Option<usize>,
    palette: IrisPalette,
    structure: IrisStructure,
    shapes: ShapeField,
    pool: PathwayPool,
    state: LifecycleState,
    history: VecDeque<StatusSnapshot>,
    tick_count: u64,
}

impl fmt::Debug for EyeWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EyeWorld")
            .field("config", &self.config)
            .field("palette", &self.palette.name)
            .field("generation", &self.state.generation)
            .field("phase", &self.state.phase)
            .field("tick_count", &self.tick_count)
            .field("total_shapes", &self.shapes.total_shapes())
            .finish_non_exhaustive()
    }
}

impl EyeWorld {
    /// Build a world with no attention input; the eye heals and idles.
    pub fn new(config: EyeConfig) -> Result<Self, EyeWorldError> {
        Self::with_attention_source(config, Box::new(NullAttentionSource))
    }

    /// Build a world wired to the given attention source.
    pub fn with_attention_source(
        config: EyeConfig,
        attention: Box<dyn AttentionSource>,
    ) -> Result<Self, EyeWorldError> {
        config.validate()?;
        let master_seed = match config.rng_seed {
            Some(seed) => seed,
            None => rand::random(),
        };
        let mut rng = SmallRng::seed_from_u64(master_seed);
        let noise: Box<dyn NoiseSource> = Box::new(ValueNoise::seeded(master_seed));
        let palette_index = choose_palette(&mut rng, None);
        let palette = IrisPalette::realize(&EYE_PALETTES[palette_index], &mut rng);
        let structure = IrisStructure::generate(&config, palette.clone(), noise.as_ref(), &mut rng);
        let shapes = ShapeField::generate(&config, &structure, noise.as_ref(), &mut rng);
        let mut pool = PathwayPool::new(config.pathway_queue_capacity);
        pool.fill(noise.as_ref(), &mut rng);
        info!(
            seed = master_seed,
            palette = %palette.name,
            total_shapes = shapes.total_shapes(),
            "eye world initialized"
        );
        Ok(Self {
            config,
            rng,
            noise,
            curves: CurveTable::new(),
            attention,
            palette_index: Some(palette_index),
            palette,
            structure,
            shapes,
            pool,
            state: LifecycleState::default(),
            history: VecDeque::new(),
            tick_count: 0,
        })
    }

    /// Immutable access to the configuration.
    #[must_use]
    pub const fn config(&self) -> &EyeConfig {
        &self.config
    }

    /// Current life-cycle state.
    #[must_use]
    pub const fn state(&self) -> &LifecycleState {
        &self.state
    }

    /// Mutable life-cycle state, for harnesses that need to force a phase.
    pub fn state_mut(&mut self) -> &mut LifecycleState {
        &mut self.state
    }

    /// Current shape population.
    #[must_use]
    pub const fn shapes(&self) -> &ShapeField {
        &self.shapes
    }

    /// Current anatomical skeleton.
    #[must_use]
    pub const fn structure(&self) -> &IrisStructure {
        &self.structure
    }

    /// Current realized palette.
    #[must_use]
    pub const fn palette(&self) -> &IrisPalette {
        &self.palette
    }

    /// Pathway pool counters, mainly for diagnostics.
    #[must_use]
    pub const fn pool(&self) -> &PathwayPool {
        &self.pool
    }

    /// Bounded status history, oldest first.
    #[must_use]
    pub const fn history(&self) -> &VecDeque<StatusSnapshot> {
        &self.history
    }

    /// Number of ticks executed so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// Stages run in a fixed order: attention smoothing, pool refill, the
    /// phase machine, pupil and saccade dynamics, then status bookkeeping.
    pub fn tick(&mut self, dt: f32) -> TickEvents {
        let dt = dt.clamp(0.0, 0.25);
        self.tick_count += 1;
        self.state.clock += dt;
        let previous_phase = self.state.phase;

        self.stage_attention(dt);
        self.stage_pool_refill();
        let (rebuild_completed, generation_started) = self.stage_lifecycle(dt);
        self.stage_pupil(dt);
        self.stage_saccade(dt);
        self.stage_status();

        TickEvents {
            tick: self.tick_count,
            phase: self.state.phase,
            phase_changed: self.state.phase != previous_phase,
            generation_started,
            rebuild_completed,
        }
    }

    fn stage_attention(&mut self, dt: f32) {
        let signal = self.attention.latest();
        let (candidate, face_status, scene_empty) = fold_signal(signal);
        self.state.face_status = face_status;
        self.state.scene_empty = scene_empty;
        if let Some(signal) = signal {
            if let Some(proximity) = signal.proximity {
                self.state.proximity = clamp01(proximity);
            }
        }

        // Hysteresis against the previous raw reading: a stable candidate
        // must persist before it commits, a large sample-to-sample jump
        // commits immediately. An oscillating signal keeps resetting the
        // hold timer and never moves the committed target.
        let raw_delta = (candidate - self.state.last_raw_target).abs();
        if raw_delta < 0.1 {
            self.state.target_hold += dt;
        } else {
            self.state.target_hold = 0.0;
        }
        if self.state.target_hold > self.config.attention_hold_threshold
            || raw_delta > self.config.attention_jump_threshold
        {
            self.state.attention_target = candidate;
        }
        self.state.last_raw_target = candidate;

        // Critically-damped-ish spring toward the committed target.
        let force = self.config.attention_stiffness
            * (self.state.attention_target - self.state.attention);
        self.state.attention_velocity += force * dt;
        self.state.attention_velocity *= (-self.config.attention_damping * dt).exp();
        self.state.attention = clamp01(self.state.attention + self.state.attention_velocity * dt);

        let fatigue_blend = 1.0 - (-3.0 * dt).exp();
        self.state.smooth_fatigue = lerp(
            self.state.smooth_fatigue,
            self.state.fatigue,
            fatigue_blend,
        );
        let attention_goal = if self.state.phase == Phase::Rebuilding {
            0.0
        } else {
            self.state.attention
        };
        self.state.smooth_attention = lerp(self.state.smooth_attention, attention_goal, 0.02);
        self.state.smooth_proximity = lerp(self.state.smooth_proximity, self.state.proximity, 0.05);
    }

    fn stage_pool_refill(&mut self) {
        self.pool.refill_step(self.noise.as_ref(), &mut self.rng);
    }

    fn stage_lifecycle(&mut self, dt: f32) -> (bool, Option<u32>) {
        let mut rebuild_completed = false;
        let mut generation_started = None;
        match self.state.phase {
            Phase::Rebuilding => {
                self.state.rebuild_progress =
                    (self.state.rebuild_progress + self.config.rebuild_rate * dt).min(1.0);
                // During a rebuild fatigue mirrors inverse progress so the
                // fade windows sweep shapes in.
                self.state.fatigue = 1.0 - self.state.rebuild_progress;
                self.state.smooth_fatigue = self.state.fatigue;
                if self.state.rebuild_progress >= 1.0 {
                    self.state.fatigue = self.config.fatigue_floor;
                    self.state.phase = Phase::Steady;
                    if self.state.generation == 0 {
                        self.state.generation = 1;
                    }
                    rebuild_completed = true;
                    info!(
                        generation = self.state.generation,
                        palette = %self.palette.name,
                        "rebuild complete"
                    );
                }
            }
            Phase::Steady => {
                // Accrual and healing are independent: faint attention in
                // the 0.1..0.3 band accrues and heals in the same tick,
                // netting a slow recovery.
                if self.state.attention > 0.1 {
                    let boost = 1.0 + self.config.proximity_boost * self.state.smooth_proximity;
                    self.state.fatigue +=
                        self.config.fatigue_rate * self.state.attention * boost * dt;
                }
                if self.state.scene_empty {
                    self.state.fatigue -= self.config.solitude_heal_rate * dt;
                } else if self.state.attention < self.config.low_attention_threshold {
                    self.state.fatigue -= self.config.low_attention_heal_rate * dt;
                }
                self.state.fatigue = self.state.fatigue.clamp(self.config.fatigue_floor, 1.0);
                if self.state.fatigue >= 0.995 {
                    self.state.fatigue = 1.0;
                    self.state.smooth_fatigue = 1.0;
                    self.state.phase = Phase::Paused;
                    self.state.pause_timer = self.config.pause_duration;
                    info!(
                        generation = self.state.generation,
                        "destruction complete, pausing"
                    );
                }
            }
            Phase::Paused => {
                self.state.pause_timer -= dt;
                if self.state.pause_timer <= 0.0 {
                    let generation = self.state.generation + 1;
                    self.regenerate(generation);
                    generation_started = Some(generation);
                }
            }
        }
        (rebuild_completed, generation_started)
    }

    /// Tear down the old generation and grow a new eye with a fresh palette.
    fn regenerate(&mut self, generation: u32) {
        let palette_index = choose_palette(&mut self.rng, self.palette_index);
        self.palette_index = Some(palette_index);
        self.palette = IrisPalette::realize(&EYE_PALETTES[palette_index], &mut self.rng);
        self.structure = IrisStructure::generate(
            &self.config,
            self.palette.clone(),
            self.noise.as_ref(),
            &mut self.rng,
        );
        self.shapes =
            ShapeField::generate(&self.config, &self.structure, self.noise.as_ref(), &mut self.rng);
        self.pool = PathwayPool::new(self.config.pathway_queue_capacity);
        self.pool.fill(self.noise.as_ref(), &mut self.rng);
        self.state.generation = generation;
        self.state.phase = Phase::Rebuilding;
        self.state.rebuild_progress = 0.0;
        self.state.fatigue = 1.0;
        self.state.smooth_fatigue = 1.0;
        self.state.attention_velocity = 0.0;
        info!(
            generation,
            palette = %self.palette.name,
            total_shapes = self.shapes.total_shapes(),
            "new generation born"
        );
    }

    fn stage_pupil(&mut self, dt: f32) {
        let fear = self.state.smooth_attention + self.state.smooth_proximity * 0.8;
        let relax = 1.0 - self.state.smooth_attention;
        let mut target = PUPIL_BASE_RATIO * (1.0 + relax * 0.3 - clamp01(fear) * 0.5);
        if !target.is_finite() || target <= 0.0 {
            target = PUPIL_BASE_RATIO;
        }
        let blend = 1.0 - (1.0 - 0.03f32).powf(dt * 60.0);
        self.state.pupil_radius = lerp(self.state.pupil_radius, target, blend);
    }

    fn stage_saccade(&mut self, dt: f32) {
        self.state.saccade_timer -= dt;
        if self.state.saccade_timer <= 0.0 {
            self.state.saccade_target = [
                (self.rng.random::<f32>() - 0.5) * 0.015,
                (self.rng.random::<f32>() - 0.5) * 0.015,
            ];
            self.state.saccade_timer = self.rng.random_range(0.8..2.5);
        }
        let blend = 1.0 - (1.0 - 0.15f32).powf(dt * 60.0);
        self.state.saccade_offset[0] = lerp(
            self.state.saccade_offset[0],
            self.state.saccade_target[0],
            blend,
        );
        self.state.saccade_offset[1] = lerp(
            self.state.saccade_offset[1],
            self.state.saccade_target[1],
            blend,
        );
    }

    fn stage_status(&mut self) {
        let snapshot = StatusSnapshot {
            tick: self.tick_count,
            phase: self.state.phase,
            attention: self.state.attention,
            fatigue_percent: self.state.fatigue * 100.0,
            generation: self.state.generation,
            rebuild_progress_percent: self.state.rebuild_progress * 100.0,
            face_status: self.state.face_status,
        };
        debug!(
            tick = snapshot.tick,
            phase = ?snapshot.phase,
            attention = snapshot.attention,
            fatigue_percent = snapshot.fatigue_percent,
            "status"
        );
        self.history.push_back(snapshot);
        while self.history.len() > self.config.history_capacity {
            self.history.pop_front();
        }
    }

    /// Radius of the healing growth edge in `[0, 1]`; shapes farther from
    /// the edge than this stay hidden during a radial-sweep rebuild.
    #[must_use]
    pub fn growth_radius(&self) -> f32 {
        if self.state.phase == Phase::Rebuilding && self.config.radial_growth_sweep {
            self.state.rebuild_progress
        } else {
            1.0
        }
    }

    /// Recycle one shape through the pathway pool, giving it a fresh
    /// position and a fade window rebased past the current fatigue level.
    ///
    /// Returns `false` when `index` is out of bounds for the family.
    pub fn reassign_shape(&mut self, family: ShapeFamily, index: usize) -> bool {
        let smooth_fatigue = self.state.smooth_fatigue;
        match family {
            ShapeFamily::Base => {
                if index >= self.shapes.base.len() {
                    return false;
                }
                let pathway = self.pool.next_base(self.noise.as_ref(), &mut self.rng);
                let (fade_start, fade_end) =
                    rebase_fade(pathway.fade_start, pathway.fade_end, smooth_fatigue);
                let (light, light_mix, ridge_proximity) = base_lighting(
                    &self.structure,
                    self.noise.as_ref(),
                    pathway.r_norm,
                    pathway.angle,
                );
                let shape = &mut self.shapes.base[index];
                shape.r_norm = pathway.r_norm;
                shape.angle = pathway.angle;
                shape.size_mod = pathway.size_mod;
                shape.hue_mod = pathway.hue_mod;
                shape.aspect_ratio = pathway.aspect_ratio;
                shape.rotation = pathway.angle;
                shape.cluster = pathway.cluster;
                shape.fade_start = fade_start;
                shape.fade_end = fade_end;
                shape.light = light;
                shape.light_mix = light_mix;
                shape.ridge_proximity = ridge_proximity;
                shape.amber =
                    amber_intensity(&self.structure.amber_patches, pathway.r_norm, pathway.angle);
                shape.crypt_shade =
                    crypt_shading(&self.structure.crypts, pathway.r_norm, pathway.angle);
                shape.grow_dist = 1.0 - pathway.r_norm;
                true
            }
            ShapeFamily::Fiber => {
                if index >= self.shapes.fibers.len() {
                    return false;
                }
                let pathway = self.pool.next_fiber(self.noise.as_ref(), &mut self.rng);
                let (fade_start, fade_end) =
                    rebase_fade(pathway.fade_start, pathway.fade_end, smooth_fatigue);
                let fiber_index = self.shapes.fibers[index].fiber_index as usize;
                let fiber = self.structure.fibers[fiber_index % self.structure.fibers.len()];
                let light_dot = (pathway.angle - LIGHT_ANGLE).cos();
                let scatter_norm = pathway.scatter / 0.3;
                let ridge_edge = light_dot * scatter_norm * 2.0;
                let undulation = self
                    .noise
                    .sample2(pathway.t_base * 3.0, fiber_index as f32 * 0.1)
                    - 0.5;
                let combined = ridge_edge * 0.8 + undulation * light_dot * 0.4;
                let light = if combined > 0.2 {
                    LightClass::Highlight
                } else if combined < -0.2 {
                    LightClass::Shadow
                } else {
                    LightClass::Neutral
                };
                let ripple = self.noise.sample2(
                    pathway.angle.cos() * pathway.t_base * 2.0 + fiber_index as f32 * 0.15,
                    pathway.angle.sin() * pathway.t_base * 2.0 + 500.0,
                );
                let (break_dist, break_dir) = nearest_break(&fiber.break_points, pathway.t_base);
                let shape = &mut self.shapes.fibers[index];
                shape.t_base = pathway.t_base;
                shape.angle = pathway.angle;
                shape.scatter_norm = scatter_norm;
                shape.size_mod = pathway.size_mod;
                shape.hue_mod = pathway.hue_mod;
                shape.fade_start = fade_start;
                shape.fade_end = fade_end;
                shape.light = light;
                shape.light_mix = combined.abs().min(1.0);
                shape.ripple = ripple;
                shape.break_dist = break_dist;
                shape.break_dir = break_dir;
                shape.grow_dist = pathway.t_base;
                true
            }
            ShapeFamily::Web => {
                if index >= self.shapes.web.len() {
                    return false;
                }
                let pathway = self.pool.next_web(self.noise.as_ref(), &mut self.rng);
                let (fade_start, fade_end) =
                    rebase_fade(pathway.fade_start, pathway.fade_end, smooth_fatigue);
                let shape = &mut self.shapes.web[index];
                shape.t_base = pathway.t_base;
                shape.angle = pathway.angle;
                shape.scatter = pathway.scatter;
                shape.size_mod = pathway.size_mod;
                shape.hue_mod = pathway.hue_mod;
                shape.fade_start = fade_start;
                shape.fade_end = fade_end;
                shape.grow_dist = 1.0 - pathway.t_base;
                true
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Frame assembly
// ---------------------------------------------------------------------------

/// Compositing mode for one draw instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Blend,
    Add,
    Multiply,
}

/// One ellipse to paint. Coordinates and sizes are in iris units: the iris
/// radius is 1.0 and the origin is the eye center. Color is HSB with hue in
/// degrees, saturation and brightness in `[0, 100]`, alpha in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawOp {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub rotation: f32,
    pub hue: f32,
    pub saturation: f32,
    pub brightness: f32,
    pub alpha: f32,
    pub blend: BlendMode,
}

/// Pupil disc description, drawn on top of every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PupilSpec {
    /// Current radius as a fraction of the iris radius, hippus included.
    pub radius: f32,
    /// Edge wobble multipliers, one per boundary sample.
    pub wobble: Vec<f32>,
    pub alpha: f32,
}

/// Complete description of one frame, ready for a rasterizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderFrame {
    /// Background HSB; fades to black as fatigue saturates.
    pub background: [f32; 3],
    pub ops: Vec<DrawOp>,
    pub pupil: PupilSpec,
    /// Saccade offset of the whole eye, in iris units.
    pub offset: [f32; 2],
    /// Outer-edge wobble multipliers for the iris boundary.
    pub iris_wobble: Vec<f32>,
}

/// Shape sizes are tuned in pixels against a nominal 200 px iris radius.
const PX: f32 = 1.0 / 200.0;

/// Involuntary pupil oscillation, three incommensurate sine waves.
fn hippus(clock: f32) -> f32 {
    (clock * 2.1).sin() * 0.008 + (clock * 3.7).sin() * 0.005 + (clock * 0.9).sin() * 0.01
}

/// Fade multiplier for a shape's personal window at integrity `v`.
fn window_fade(curves: &CurveTable, integrity: f32, fade_start: f32, fade_end: f32) -> f32 {
    if integrity <= fade_start {
        0.0
    } else if integrity >= fade_end {
        1.0
    } else {
        curves.fade_in((integrity - fade_start) / (fade_end - fade_start))
    }
}

/// Visibility multiplier for the healing growth sweep, `None` when the shape
/// is still beyond the growth edge.
fn growth_gate(growth_radius: f32, band: f32, grow_dist: f32) -> Option<f32> {
    if growth_radius >= 1.0 {
        return Some(1.0);
    }
    if grow_dist > growth_radius {
        return None;
    }
    Some(clamp01((growth_radius - grow_dist) / band))
}

/// Destruction drift for one shape: displacement, size and fade multipliers.
///
/// `hash` must be a per-shape constant in `[0, 1)` so drift directions stay
/// frame-coherent without any per-frame randomness.
fn destruction_drift(
    smooth_fatigue: f32,
    onset: f32,
    hash: f32,
    speed: f32,
    size_floor: f32,
) -> ([f32; 2], f32, f32) {
    if smooth_fatigue <= onset {
        return ([0.0, 0.0], 1.0, 1.0);
    }
    let phase = (smooth_fatigue - onset) / (1.0 - onset);
    let accel = phase * phase;
    let dir = hash * TAU;
    let drift = speed * accel;
    let size_mult = (1.0 - accel * size_floor).max(0.1);
    let fade_mult = (1.0 - accel).max(0.0);
    ([dir.cos() * drift, dir.sin() * drift], size_mult, fade_mult)
}

/// Brightness profile along a fiber: dim near the pupil, a bright caldera
/// rim at the collarette, dipping just outside it, then falling to the edge.
fn caldera_brightness(t: f32) -> f32 {
    if t < 0.22 {
        0.6
    } else if t < 0.32 {
        lerp(0.6, 0.85, (t - 0.22) / 0.10)
    } else if t < 0.38 {
        lerp(0.85, 1.25, (t - 0.32) / 0.06)
    } else if t < 0.48 {
        lerp(1.25, 0.9, (t - 0.38) / 0.10)
    } else if t < 0.55 {
        lerp(0.9, 0.75, (t - 0.48) / 0.07)
    } else {
        lerp(0.75, 0.55, clamp01((t - 0.55) / 0.45))
    }
}

impl EyeWorld {
    /// Assemble the draw list for the current state.
    ///
    /// Pure with respect to the simulation: calling this any number of times
    /// between ticks yields identical output. The two largest fields are
    /// assembled in parallel; everything else is cheap enough sequentially.
    #[must_use]
    pub fn frame(&self) -> RenderFrame {
        let sf = self.state.smooth_fatigue;
        let integrity = 1.0 - sf;
        let growth_radius = self.growth_radius();
        let pupil = (self.state.pupil_radius + hippus(self.state.clock)).max(0.05);
        let inner = pupil;
        let outer = 1.0 - LIMBAL_WIDTH;

        let background = [
            lerp(220.0, 0.0, sf),
            lerp(20.0, 0.0, sf),
            lerp(8.0, 0.0, sf.sqrt()),
        ];

        let mut ops = Vec::with_capacity(self.shapes.total_shapes() + 64);
        self.push_glow_rings(&mut ops, integrity, inner, outer);
        self.push_base_discs(&mut ops, integrity, inner, outer);
        self.push_crypt_ops(&mut ops, integrity, inner, outer);
        ops.extend(self.base_field_ops(integrity, growth_radius, sf, inner, outer));
        ops.extend(self.web_field_ops(integrity, growth_radius, inner, outer));
        self.push_pad_ops(&mut ops, sf, inner, outer);
        ops.extend(self.fiber_field_ops(integrity, growth_radius, sf, inner, outer));
        self.push_furrow_ops(&mut ops, integrity);
        self.push_collarette_ops(&mut ops, integrity, sf, inner, outer);
        self.push_rim_ops(&mut ops, integrity, pupil);
        self.push_speckle_ops(&mut ops, integrity);
        self.push_pupil_halo_ops(&mut ops, integrity, pupil);

        RenderFrame {
            background,
            ops,
            pupil: PupilSpec {
                radius: pupil,
                wobble: self.structure.pupil_wobble.clone(),
                alpha: 0.96,
            },
            offset: self.state.saccade_offset,
            iris_wobble: self.structure.iris_wobble.clone(),
        }
    }

    /// Soft additive rings breathing around the collarette.
    fn push_glow_rings(&self, ops: &mut Vec<DrawOp>, integrity: f32, inner: f32, outer: f32) {
        if integrity <= 0.02 {
            return;
        }
        let collarette_r = inner + COLLARETTE_RATIO * (outer - inner);
        let pulse = self.curves.pulse(fract(self.state.clock * 0.2));
        let pulse_gain = 0.8 + 0.4 * pulse;
        for k in 0..5 {
            let spread = 1.0 + k as f32 * 0.12;
            ops.push(DrawOp {
                x: 0.0,
                y: 0.0,
                width: collarette_r * 2.0 * spread,
                height: collarette_r * 2.0 * spread,
                rotation: 0.0,
                hue: self.palette.hue_base,
                saturation: 35.0,
                brightness: 35.0,
                alpha: 0.035 * pulse_gain * integrity / (1.0 + k as f32 * 0.5),
                blend: BlendMode::Add,
            });
        }
    }

    /// Coarse radial gradient underneath the pointillist fields.
    fn push_base_discs(&self, ops: &mut Vec<DrawOp>, integrity: f32, inner: f32, outer: f32) {
        for k in 0..5 {
            let t = k as f32 / 4.0;
            let radius = lerp(outer, inner, t);
            let hue = if t > 0.7 {
                self.palette.hue_secondary
            } else if t > 0.4 {
                self.palette.hue_tertiary
            } else {
                self.palette.hue_base
            };
            ops.push(DrawOp {
                x: 0.0,
                y: 0.0,
                width: radius * 2.0,
                height: radius * 2.0,
                rotation: 0.0,
                hue,
                saturation: 50.0,
                brightness: lerp(30.0, 14.0, t),
                alpha: 0.3 * integrity,
                blend: BlendMode::Blend,
            });
        }
    }

    fn push_crypt_ops(&self, ops: &mut Vec<DrawOp>, integrity: f32, inner: f32, outer: f32) {
        if integrity <= 0.1 {
            return;
        }
        for crypt in self.shapes.crypts.iter().chain(self.shapes.fuchs.iter()) {
            let r = inner + crypt.r_norm * (outer - inner);
            let size = crypt.size * 3.0 * PX;
            ops.push(DrawOp {
                x: r * crypt.angle.cos(),
                y: r * crypt.angle.sin(),
                width: size * crypt.wobble,
                height: size / crypt.wobble,
                rotation: crypt.angle,
                hue: self.palette.hue_base,
                saturation: 40.0,
                brightness: 8.0 * (1.0 - crypt.depth * 0.5),
                alpha: crypt.depth * 0.55 * integrity,
                blend: BlendMode::Blend,
            });
        }
    }

    fn base_field_ops(
        &self,
        integrity: f32,
        growth_radius: f32,
        sf: f32,
        inner: f32,
        outer: f32,
    ) -> Vec<DrawOp> {
        let curves = &self.curves;
        let palette = &self.palette;
        let onset = self.config.destruction_onset;
        let band = self.config.growth_fade_band;
        self.shapes
            .base
            .par_iter()
            .filter_map(|shape| {
                let gate = growth_gate(growth_radius, band, shape.grow_dist)?;
                let window = window_fade(curves, integrity, shape.fade_start, shape.fade_end);
                if window <= 0.0 {
                    return None;
                }
                let hash = fract(
                    shape.id as f32 * 1.618 + shape.size_mod * 7.3 + shape.hue_mod * 0.37,
                );
                let speed = (0.4 + (shape.cluster + shape.size_mod) * 0.5) * 0.5;
                let (drift, size_mult, drift_fade) =
                    destruction_drift(sf, onset, hash, speed, 0.9);
                let alpha = (0.5 + shape.cluster * 0.3) * window * gate * drift_fade;
                if alpha <= 0.003 {
                    return None;
                }
                let r = inner + shape.r_norm * (outer - inner);
                let (mut hue, mut sat, mut bri) = base_color_ramp(palette, shape.r_norm);
                hue += shape.hue_mod;
                sat += shape.cluster * 12.0;
                bri += shape.size_mod * 12.0;
                if shape.amber > 0.0 {
                    hue = lerp(hue, 35.0, shape.amber * 0.7);
                    sat = lerp(sat, 72.0, shape.amber * 0.5);
                    bri += shape.amber * 10.0;
                }
                if shape.crypt_shade > 0.0 {
                    bri *= 1.0 - shape.crypt_shade * 0.6;
                    sat *= 1.0 - shape.crypt_shade * 0.2;
                }
                match shape.light {
                    LightClass::Highlight => {
                        bri *= 1.0 + LIGHT_INTENSITY * (0.4 + shape.light_mix * 0.7);
                        sat *= lerp(0.7, 0.5, shape.ridge_proximity);
                        hue -= 10.0 * shape.ridge_proximity;
                    }
                    LightClass::Shadow => {
                        bri *= 0.35 + shape.light_mix * 0.2;
                        sat *= 1.1;
                    }
                    LightClass::Neutral => {}
                }
                let size = (1.0 + shape.size_mod * 3.0) * PX * size_mult;
                Some(DrawOp {
                    x: r * shape.angle.cos() + drift[0],
                    y: r * shape.angle.sin() + drift[1],
                    width: size * shape.aspect_ratio,
                    height: size,
                    rotation: shape.rotation,
                    hue,
                    saturation: sat.clamp(0.0, 100.0),
                    brightness: bri.clamp(0.0, 100.0),
                    alpha: alpha.min(1.0),
                    blend: BlendMode::Blend,
                })
            })
            .collect()
    }

    fn web_field_ops(
        &self,
        integrity: f32,
        growth_radius: f32,
        inner: f32,
        outer: f32,
    ) -> Vec<DrawOp> {
        let curves = &self.curves;
        let band = self.config.growth_fade_band;
        self.shapes
            .web
            .iter()
            .filter_map(|shape| {
                let gate = growth_gate(growth_radius, band, shape.grow_dist)?;
                let window = window_fade(curves, integrity, shape.fade_start, shape.fade_end);
                if window <= 0.0 {
                    return None;
                }
                let r = inner + shape.t_base * (outer - inner);
                let angle = shape.angle + shape.scatter;
                let size = (0.6 + shape.size_mod * 1.2) * PX;
                Some(DrawOp {
                    x: r * angle.cos(),
                    y: r * angle.sin(),
                    width: size,
                    height: size,
                    rotation: angle,
                    hue: self.palette.hue_tertiary + shape.hue_mod,
                    saturation: 30.0,
                    brightness: 38.0 + shape.size_mod * 14.0,
                    alpha: 0.14 * window * gate,
                    blend: BlendMode::Blend,
                })
            })
            .collect()
    }

    /// Convex pads are shaded as five unrotated stacked ellipses: body, two
    /// highlight passes toward the light, shadow, and a contact shadow.
    fn push_pad_ops(&self, ops: &mut Vec<DrawOp>, sf: f32, inner: f32, outer: f32) {
        let light = [LIGHT_ANGLE.cos(), LIGHT_ANGLE.sin()];
        for pad in &self.structure.pads {
            let pad_fade = if sf > pad.fade_threshold {
                (1.0 - (sf - pad.fade_threshold) / (1.0 - pad.fade_threshold)).max(0.0)
            } else {
                1.0
            };
            if pad_fade <= 0.003 {
                continue;
            }
            let r = inner + pad.r_norm * (outer - inner);
            let x = r * pad.angle.cos();
            let y = r * pad.angle.sin();
            let w = pad.size * pad.elongation;
            let h = pad.size;
            let hue = self.palette.hue_base + 4.0;
            let layers: [(f32, f32, f32, f32, f32); 5] = [
                // (offset along light, size multiplier, saturation, brightness, alpha)
                (0.0, 1.0, 48.0, 30.0 + pad.height * 14.0, 0.35),
                (pad.size * 0.25, 0.7, 38.0, 46.0 + pad.height * 22.0, 0.3),
                (pad.size * 0.4, 0.35, 28.0, 62.0 + pad.height * 26.0, 0.28),
                (-pad.size * 0.3, 0.8, 52.0, 14.0 + pad.height * 6.0, 0.3),
                (-pad.size * 0.5, 0.5, 55.0, 9.0, 0.22),
            ];
            for (offset, scale, sat, bri, alpha) in layers {
                ops.push(DrawOp {
                    x: x + light[0] * offset,
                    y: y + light[1] * offset,
                    width: w * scale,
                    height: h * scale,
                    rotation: pad.orientation,
                    hue,
                    saturation: sat,
                    brightness: bri,
                    alpha: alpha * pad_fade,
                    blend: BlendMode::Blend,
                });
            }
        }
    }

    fn fiber_field_ops(
        &self,
        integrity: f32,
        growth_radius: f32,
        sf: f32,
        inner: f32,
        outer: f32,
    ) -> Vec<DrawOp> {
        let curves = &self.curves;
        let palette = &self.palette;
        let onset = self.config.destruction_onset;
        let band = self.config.growth_fade_band;
        let fatigue = self.state.fatigue;
        let fibers = &self.structure.fibers;
        self.shapes
            .fibers
            .par_iter()
            .filter_map(|shape| {
                let gate = growth_gate(growth_radius, band, shape.grow_dist)?;
                let window = window_fade(curves, integrity, shape.fade_start, shape.fade_end);
                if window <= 0.0 {
                    return None;
                }
                let fiber = fibers[shape.fiber_index as usize % fibers.len()];
                let t = shape.t_base;
                let mut r = inner + t * (outer - inner);
                let angle = shape.angle;
                let mut rupture_fade = 1.0f32;
                // Rupture tracks raw fatigue so breaks land sharply, not on
                // the smoothed ramp. The recoil snaps the dot radially away
                // from the break point before the collapse fade takes over.
                if fatigue > fiber.break_threshold && shape.break_dist < 0.08 {
                    let progress =
                        (fatigue - fiber.break_threshold) / (1.0 - fiber.break_threshold);
                    if progress < 0.2 {
                        r += shape.break_dir * (PI * progress / 0.2).sin() * 0.04;
                    } else {
                        rupture_fade = 1.0 - curves.fade_out((progress - 0.2) / 0.8);
                    }
                }
                let hash = fract(
                    shape.id as f32 * 1.618 + shape.t_base * 5.7 + shape.size_mod * 3.14,
                );
                let speed = (0.3 + shape.alpha_mod * 0.5) * 0.45;
                let (drift, size_mult, drift_fade) =
                    destruction_drift(sf, onset, hash, speed, 0.85);
                let alpha =
                    (0.3 + shape.alpha_mod * 0.4) * window * gate * drift_fade * rupture_fade;
                if alpha <= 0.003 {
                    return None;
                }
                let mut bri = (34.0 + shape.size_mod * 16.0) * caldera_brightness(t);
                bri *= 0.85 + shape.ripple * 0.3;
                let mut sat: f32 = 46.0;
                match shape.light {
                    LightClass::Highlight => {
                        bri *= 1.0 + LIGHT_INTENSITY * (0.3 + shape.light_mix * 0.6);
                        sat *= 0.7;
                    }
                    LightClass::Shadow => {
                        bri *= 0.4 + shape.light_mix * 0.2;
                        sat *= 1.1;
                    }
                    LightClass::Neutral => {}
                }
                let mut size = (0.8 + shape.size_mod * 2.0) * PX * size_mult;
                if fiber.is_hood {
                    let hood_zone = (t - COLLARETTE_RATIO).abs();
                    if hood_zone < 0.12 {
                        let hood_mod = ((fiber.thickness - 18.0) / 10.0).clamp(0.0, 1.0);
                        size *= 1.0 + hood_mod * 3.5 * (1.0 - hood_zone / 0.12);
                    }
                }
                if t > fiber.taper_start {
                    size *= lerp(1.0, 0.4, (t - fiber.taper_start) / (1.0 - fiber.taper_start));
                }
                let x = r * angle.cos() + drift[0];
                let y = r * angle.sin() + drift[1];
                Some(DrawOp {
                    x,
                    y,
                    width: size,
                    height: size * 1.6,
                    rotation: angle,
                    hue: palette.hue_base + shape.hue_mod,
                    saturation: sat.clamp(0.0, 100.0),
                    brightness: bri.clamp(0.0, 100.0),
                    alpha: alpha.min(1.0),
                    blend: BlendMode::Blend,
                })
            })
            .collect()
    }

    fn push_furrow_ops(&self, ops: &mut Vec<DrawOp>, integrity: f32) {
        for shape in &self.shapes.furrows {
            let window = window_fade(&self.curves, integrity, shape.fade_start, shape.fade_end);
            if window <= 0.0 {
                continue;
            }
            let r = shape.r_norm;
            ops.push(DrawOp {
                x: r * shape.angle.cos(),
                y: r * shape.angle.sin(),
                width: (2.5 + shape.size_mod * 2.5) * PX,
                height: (0.8 + shape.size_mod * 0.8) * PX,
                rotation: shape.angle + PI / 2.0,
                hue: self.palette.hue_base,
                saturation: 42.0,
                brightness: 16.0 + shape.alpha_mod * 8.0,
                alpha: (0.22 + shape.alpha_mod * 0.18) * window,
                blend: BlendMode::Blend,
            });
        }
    }

    fn push_collarette_ops(
        &self,
        ops: &mut Vec<DrawOp>,
        integrity: f32,
        sf: f32,
        inner: f32,
        outer: f32,
    ) {
        let collarette_r = inner + COLLARETTE_RATIO * (outer - inner);
        for shape in &self.shapes.collarette {
            match *shape {
                CollaretteShape::Ring {
                    angle,
                    r_jitter,
                    size_mod,
                    hue_mod,
                    glow,
                    fade_start,
                    fade_end,
                } => {
                    let window = window_fade(&self.curves, integrity, fade_start, fade_end);
                    if window <= 0.0 {
                        continue;
                    }
                    let r = collarette_r + r_jitter;
                    let size = (1.0 + size_mod * 2.0) * PX;
                    ops.push(DrawOp {
                        x: r * angle.cos(),
                        y: r * angle.sin(),
                        width: size,
                        height: size,
                        rotation: angle,
                        hue: self.palette.hue_base + hue_mod,
                        saturation: 44.0,
                        brightness: (55.0 + size_mod * 20.0) * glow,
                        alpha: 0.5 * glow * window,
                        blend: BlendMode::Blend,
                    });
                }
                CollaretteShape::Branch {
                    branch_index,
                    t,
                    lateral,
                    size_mod,
                    fade_threshold,
                    lit,
                    fade_start,
                    fade_end,
                } => {
                    let window = window_fade(&self.curves, integrity, fade_start, fade_end);
                    if window <= 0.0 {
                        continue;
                    }
                    let branch =
                        self.structure.branches[branch_index as usize % self.structure.branches.len()];
                    // Branch dots thin out individually as fatigue passes
                    // their personal threshold, but never fully vanish until
                    // their fade window closes.
                    let threshold_fade = if sf > fade_threshold {
                        (1.0 - (sf - fade_threshold) / (1.0 - fade_threshold)).max(0.08)
                    } else {
                        1.0
                    };
                    let angle = branch.base_angle
                        + lateral
                        + (t * 10.0 * branch.jagged).sin() * 0.02 * branch.jagged;
                    let r = collarette_r + t * branch.length;
                    let size = (0.8 + size_mod * 1.6) * PX * (1.0 - t * 0.5);
                    ops.push(DrawOp {
                        x: r * angle.cos(),
                        y: r * angle.sin(),
                        width: size,
                        height: size,
                        rotation: angle,
                        hue: self.palette.hue_base + branch.hue_shift,
                        saturation: 40.0,
                        brightness: if lit {
                            (62.0 + size_mod * 22.0) * branch.glow
                        } else {
                            (44.0 + size_mod * 16.0) * branch.glow
                        },
                        alpha: 0.4 * branch.glow * window * threshold_fade,
                        blend: if lit { BlendMode::Add } else { BlendMode::Blend },
                    });
                }
            }
        }
    }

    /// Dark limbal ring, pupillary ruff, and the pigment nubs on the margin.
    fn push_rim_ops(&self, ops: &mut Vec<DrawOp>, integrity: f32, pupil: f32) {
        let limbal_r = 1.0 - LIMBAL_WIDTH / 2.0;
        for (i, wobble) in self.structure.iris_wobble.iter().enumerate() {
            let angle = (i as f32 / self.structure.iris_wobble.len() as f32) * TAU;
            let r = limbal_r * wobble;
            ops.push(DrawOp {
                x: r * angle.cos(),
                y: r * angle.sin(),
                width: LIMBAL_WIDTH * 2.2,
                height: LIMBAL_WIDTH * 1.2,
                rotation: angle + PI / 2.0,
                hue: self.palette.hue_base,
                saturation: 45.0,
                brightness: 7.0,
                alpha: 0.75 * integrity.max(0.15),
                blend: BlendMode::Blend,
            });
        }
        for shape in &self.shapes.limbal {
            let window = window_fade(&self.curves, integrity, shape.fade_start, shape.fade_end);
            if window <= 0.0 {
                continue;
            }
            let size = (0.8 + shape.size_mod * 1.5) * PX;
            ops.push(DrawOp {
                x: shape.r_norm * shape.angle.cos(),
                y: shape.r_norm * shape.angle.sin(),
                width: size,
                height: size,
                rotation: shape.angle,
                hue: self.palette.hue_base + shape.hue_mod,
                saturation: 48.0,
                brightness: 9.0 + shape.size_mod * 6.0,
                alpha: (0.3 + shape.alpha_mod * 0.3) * window,
                blend: BlendMode::Blend,
            });
        }
        let ruff_r = pupil + PUPILLARY_RUFF_WIDTH;
        for (i, wobble) in self.structure.pupil_wobble.iter().enumerate().step_by(2) {
            let angle = (i as f32 / self.structure.pupil_wobble.len() as f32) * TAU;
            let r = ruff_r * wobble;
            ops.push(DrawOp {
                x: r * angle.cos(),
                y: r * angle.sin(),
                width: PUPILLARY_RUFF_WIDTH * 2.4,
                height: PUPILLARY_RUFF_WIDTH * 1.4,
                rotation: angle + PI / 2.0,
                hue: self.palette.hue_secondary - 8.0,
                saturation: 58.0,
                brightness: 13.0,
                alpha: 0.6 * integrity.max(0.1),
                blend: BlendMode::Blend,
            });
        }
        for shape in &self.shapes.ruff {
            let window = window_fade(&self.curves, integrity, shape.fade_start, shape.fade_end);
            if window <= 0.0 {
                continue;
            }
            let r = pupil + shape.r_norm;
            let size = (0.6 + shape.size_mod * 1.2) * PX;
            ops.push(DrawOp {
                x: r * shape.angle.cos(),
                y: r * shape.angle.sin(),
                width: size,
                height: size,
                rotation: shape.angle,
                hue: self.palette.hue_secondary + shape.hue_mod,
                saturation: 55.0,
                brightness: 12.0 + shape.size_mod * 8.0,
                alpha: (0.35 + shape.alpha_mod * 0.3) * window,
                blend: BlendMode::Blend,
            });
        }
        for nub in &self.structure.nubs {
            let r = pupil + nub.offset;
            ops.push(DrawOp {
                x: r * nub.angle.cos(),
                y: r * nub.angle.sin(),
                width: nub.size,
                height: nub.size * 1.4,
                rotation: nub.angle,
                hue: self.palette.hue_secondary - 5.0,
                saturation: 60.0,
                brightness: 10.0,
                alpha: 0.7 * integrity.max(0.1),
                blend: BlendMode::Blend,
            });
        }
    }

    fn push_speckle_ops(&self, ops: &mut Vec<DrawOp>, integrity: f32) {
        if integrity <= 0.05 {
            return;
        }
        for speckle in &self.shapes.speckles {
            ops.push(DrawOp {
                x: speckle.r_norm * speckle.angle.cos(),
                y: speckle.r_norm * speckle.angle.sin(),
                width: speckle.size,
                height: speckle.size,
                rotation: 0.0,
                hue: self.palette.hue_secondary,
                saturation: 65.0,
                brightness: speckle.brightness * 100.0,
                alpha: speckle.alpha * integrity,
                blend: BlendMode::Blend,
            });
        }
    }

    /// Inner shadow around the pupil plus a faint outer glow.
    fn push_pupil_halo_ops(&self, ops: &mut Vec<DrawOp>, integrity: f32, pupil: f32) {
        ops.push(DrawOp {
            x: 0.0,
            y: 0.0,
            width: pupil * 2.5,
            height: pupil * 2.5,
            rotation: 0.0,
            hue: 0.0,
            saturation: 0.0,
            brightness: 30.0,
            alpha: 0.2 * integrity,
            blend: BlendMode::Multiply,
        });
        ops.push(DrawOp {
            x: 0.0,
            y: 0.0,
            width: pupil * 3.0,
            height: pupil * 3.0,
            rotation: 0.0,
            hue: self.palette.hue_base,
            saturation: 30.0,
            brightness: 40.0,
            alpha: 0.06 * integrity,
            blend: BlendMode::Add,
        });
    }
}

/// Three-zone radial color ramp: warm pupillary hues blending outward into
/// the palette base.
fn base_color_ramp(palette: &IrisPalette, r_norm: f32) -> (f32, f32, f32) {
    if r_norm < 0.3 {
        let t = r_norm / 0.3;
        (
            lerp(palette.hue_secondary, palette.hue_tertiary, t),
            58.0,
            40.0,
        )
    } else if r_norm < 0.6 {
        let t = (r_norm - 0.3) / 0.3;
        (
            lerp(palette.hue_tertiary, palette.hue_base, t),
            54.0,
            42.0,
        )
    } else {
        (palette.hue_base, 52.0, 44.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small shape budgets keep generation-heavy tests fast.
    fn test_config() -> EyeConfig {
        EyeConfig {
            rng_seed: Some(7),
            fiber_count: 12,
            base_shape_budget: 400,
            web_shape_count: 120,
            limbal_shape_count: 40,
            ruff_shape_count: 40,
            collarette_shape_count: 60,
            furrow_shapes_per_band: 12,
            crypt_shape_count: 10,
            fuchs_crypt_count: 4,
            speckle_count: 20,
            pathway_queue_capacity: 8,
            ..EyeConfig::default()
        }
    }

    fn test_world() -> EyeWorld {
        match EyeWorld::new(test_config()) {
            Ok(world) => world,
            Err(err) => panic!("world construction failed: {err}"),
        }
    }

    fn looking(confidence: f32) -> AttentionSignal {
        AttentionSignal {
            looking_confidence: Some(confidence),
            face_count: Some(1),
            proximity: Some(0.2),
        }
    }

    fn empty_scene() -> AttentionSignal {
        AttentionSignal {
            looking_confidence: Some(0.0),
            face_count: Some(0),
            proximity: Some(0.0),
        }
    }

    /// Drive the world out of its initial rebuild into the steady phase.
    fn settle(world: &mut EyeWorld) {
        for _ in 0..600 {
            let events = world.tick(1.0 / 60.0);
            if events.rebuild_completed {
                return;
            }
        }
        panic!("rebuild never completed");
    }

    #[test]
    fn default_config_is_valid() {
        assert!(EyeConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let config = EyeConfig {
            pathway_queue_capacity: 0,
            ..EyeConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(EyeWorldError::InvalidConfig(
                "pathway_queue_capacity must be non-zero"
            ))
        );
    }

    #[test]
    fn non_positive_spring_is_rejected() {
        let config = EyeConfig {
            attention_stiffness: 0.0,
            ..EyeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn curve_tables_hit_their_endpoints() {
        let curves = CurveTable::new();
        assert!(curves.fade_in(0.0).abs() < 1e-4);
        assert!((curves.fade_in(1.0) - 1.0).abs() < 1e-4);
        assert!(curves.fade_out(0.0).abs() < 1e-4);
        assert!((curves.fade_out(1.0) - 1.0).abs() < 1e-4);
        // Monotonic easing.
        let mut prev = -1.0;
        for i in 0..=20 {
            let v = curves.fade_in(i as f32 / 20.0);
            assert!(v >= prev);
            prev = v;
        }
    }

    #[test]
    fn angle_difference_wraps() {
        assert!((angle_difference(0.1, TAU - 0.1) - 0.2).abs() < 1e-4);
        assert!((angle_difference(PI, 0.0) - PI).abs() < 1e-4);
    }

    #[test]
    fn hue_distance_wraps_around_the_wheel() {
        assert!((hue_distance(350.0, 10.0) - 20.0).abs() < 1e-4);
        assert!((hue_distance(0.0, 180.0) - 180.0).abs() < 1e-4);
    }

    #[test]
    fn palette_choice_avoids_repeats_and_neighbors() {
        let mut rng = SmallRng::seed_from_u64(11);
        for last in 0..EYE_PALETTES.len() {
            for _ in 0..50 {
                let idx = choose_palette(&mut rng, Some(last));
                assert!(idx < EYE_PALETTES.len());
            }
        }
        // With a healthy RNG the immediate repeat should essentially never
        // survive the retry loop.
        let mut repeats = 0;
        for _ in 0..200 {
            if choose_palette(&mut rng, Some(3)) == 3 {
                repeats += 1;
            }
        }
        assert_eq!(repeats, 0);
    }

    /// RNG stub that always yields the same draw, exhausting the bounded
    /// retry loop in `choose_palette`.
    struct StuckRng;

    impl RngCore for StuckRng {
        fn next_u32(&mut self) -> u32 {
            0
        }
        fn next_u64(&mut self) -> u64 {
            0
        }
        fn fill_bytes(&mut self, dst: &mut [u8]) {
            dst.fill(0);
        }
    }

    #[test]
    fn palette_choice_gives_up_after_bounded_retries() {
        let mut rng = StuckRng;
        let idx = choose_palette(&mut rng, Some(0));
        // Every retry draws index 0 again; after ten attempts the candidate
        // stands even though it repeats the previous palette.
        assert_eq!(idx, 0);
    }

    #[test]
    fn pool_fills_to_capacity() {
        let noise = ValueNoise::seeded(3);
        let mut rng = SmallRng::seed_from_u64(3);
        let mut pool = PathwayPool::new(16);
        assert!(pool.is_empty());
        pool.fill(&noise, &mut rng);
        assert_eq!(pool.len(ShapeFamily::Base), 16);
        assert_eq!(pool.len(ShapeFamily::Fiber), 16);
        assert_eq!(pool.len(ShapeFamily::Web), 16);
    }

    #[test]
    fn pool_refill_adds_at_most_one_per_queue() {
        let noise = ValueNoise::seeded(3);
        let mut rng = SmallRng::seed_from_u64(3);
        let mut pool = PathwayPool::new(4);
        pool.refill_step(&noise, &mut rng);
        assert_eq!(pool.len(ShapeFamily::Base), 1);
        pool.refill_step(&noise, &mut rng);
        assert_eq!(pool.len(ShapeFamily::Base), 2);
        pool.fill(&noise, &mut rng);
        pool.refill_step(&noise, &mut rng);
        assert_eq!(pool.len(ShapeFamily::Base), 4);
    }

    #[test]
    fn pool_synthesizes_on_underflow() {
        let noise = ValueNoise::seeded(3);
        let mut rng = SmallRng::seed_from_u64(3);
        let mut pool = PathwayPool::new(2);
        let first = pool.next_base(&noise, &mut rng);
        let second = pool.next_base(&noise, &mut rng);
        assert!(first.r_norm.is_finite());
        assert_ne!(first, second);
        assert!(pool.is_empty());
    }

    #[test]
    fn rebased_fade_window_starts_past_current_fatigue() {
        let (start, end) = rebase_fade(0.1, 0.4, 0.5);
        assert!(start > 0.5);
        assert!((end - start - 0.3).abs() < 1e-5);
    }

    #[test]
    fn structure_hoods_keep_irregular_spacing() {
        let config = test_config();
        let config = EyeConfig {
            fiber_count: 50,
            ..config
        };
        let noise = ValueNoise::seeded(5);
        let mut rng = SmallRng::seed_from_u64(5);
        let palette = IrisPalette::default();
        let structure = IrisStructure::generate(&config, palette, &noise, &mut rng);
        let hood_positions: Vec<usize> = structure
            .fibers
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_hood)
            .map(|(i, _)| i)
            .collect();
        assert!(!hood_positions.is_empty());
        for pair in hood_positions.windows(2) {
            let gap = pair[1] - pair[0];
            assert!((6..14).contains(&gap), "hood gap {gap} out of range");
        }
        for fiber in &structure.fibers {
            if fiber.is_hood {
                assert!((18.0..28.0).contains(&fiber.thickness));
            } else {
                assert!((1.5..8.0).contains(&fiber.thickness));
            }
            assert!((0.15..0.85).contains(&fiber.break_threshold));
        }
    }

    #[test]
    fn pad_fade_thresholds_grow_with_radius() {
        let noise = ValueNoise::seeded(9);
        let mut rng = SmallRng::seed_from_u64(9);
        let structure =
            IrisStructure::generate(&test_config(), IrisPalette::default(), &noise, &mut rng);
        let mut inner_sum = 0.0;
        let mut inner_n = 0;
        let mut outer_sum = 0.0;
        let mut outer_n = 0;
        for pad in &structure.pads {
            if pad.r_norm < 0.45 {
                inner_sum += pad.fade_threshold;
                inner_n += 1;
            } else {
                outer_sum += pad.fade_threshold;
                outer_n += 1;
            }
        }
        assert!(inner_n > 0 && outer_n > 0);
        assert!(inner_sum / (inner_n as f32) < outer_sum / (outer_n as f32));
    }

    #[test]
    fn shape_field_respects_budgets() {
        let config = test_config();
        let noise = ValueNoise::seeded(2);
        let mut rng = SmallRng::seed_from_u64(2);
        let structure =
            IrisStructure::generate(&config, IrisPalette::default(), &noise, &mut rng);
        let field = ShapeField::generate(&config, &structure, &noise, &mut rng);
        assert!(field.base.len() <= config.base_shape_budget);
        assert!(!field.base.is_empty());
        assert_eq!(field.web.len(), config.web_shape_count);
        assert_eq!(
            field.furrows.len(),
            config.furrow_count * config.furrow_shapes_per_band
        );
        assert_eq!(field.limbal.len(), config.limbal_shape_count);
        assert_eq!(field.ruff.len(), config.ruff_shape_count);
        assert_eq!(field.crypts.len(), config.crypt_shape_count);
        assert_eq!(field.fuchs.len(), config.fuchs_crypt_count);
        assert_eq!(field.speckles.len(), config.speckle_count);
        assert!(field.collarette.len() >= config.collarette_shape_count);
    }

    #[test]
    fn base_shapes_pass_cluster_rejection_and_carry_valid_windows() {
        let config = test_config();
        let noise = ValueNoise::seeded(2);
        let mut rng = SmallRng::seed_from_u64(2);
        let structure =
            IrisStructure::generate(&config, IrisPalette::default(), &noise, &mut rng);
        let field = ShapeField::generate(&config, &structure, &noise, &mut rng);
        for shape in &field.base {
            assert!(shape.cluster >= 0.25);
            assert!(shape.fade_start < shape.fade_end);
            assert!((0.0..=0.3).contains(&shape.fade_start));
            assert!(shape.fade_end <= 0.7);
        }
        for shape in &field.fibers {
            assert!(shape.fade_start < shape.fade_end);
            assert!((0.0..1.0).contains(&shape.t_base));
        }
    }

    #[test]
    fn window_fade_boundaries() {
        let curves = CurveTable::new();
        assert_eq!(window_fade(&curves, 0.05, 0.1, 0.4), 0.0);
        assert_eq!(window_fade(&curves, 0.5, 0.1, 0.4), 1.0);
        let mid = window_fade(&curves, 0.25, 0.1, 0.4);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn growth_gate_is_transparent_when_fully_grown() {
        assert_eq!(growth_gate(1.0, 0.1, 0.9), Some(1.0));
        assert_eq!(growth_gate(0.5, 0.1, 0.9), None);
        let partial = growth_gate(0.5, 0.1, 0.45);
        assert!(matches!(partial, Some(v) if v > 0.0 && v <= 1.0));
    }

    #[test]
    fn drift_is_inert_below_onset_and_grows_past_it() {
        let (d0, s0, f0) = destruction_drift(0.2, 0.3, 0.5, 0.4, 0.9);
        assert_eq!(d0, [0.0, 0.0]);
        assert_eq!(s0, 1.0);
        assert_eq!(f0, 1.0);
        let (d1, s1, f1) = destruction_drift(0.6, 0.3, 0.5, 0.4, 0.9);
        let (d2, s2, f2) = destruction_drift(0.95, 0.3, 0.5, 0.4, 0.9);
        let m1 = (d1[0] * d1[0] + d1[1] * d1[1]).sqrt();
        let m2 = (d2[0] * d2[0] + d2[1] * d2[1]).sqrt();
        assert!(m2 > m1);
        assert!(s2 < s1);
        assert!(f2 < f1);
    }

    #[test]
    fn drift_is_deterministic_per_hash() {
        let a = destruction_drift(0.7, 0.3, 0.123, 0.4, 0.9);
        let b = destruction_drift(0.7, 0.3, 0.123, 0.4, 0.9);
        assert_eq!(a, b);
    }

    #[test]
    fn initial_rebuild_reaches_steady_and_generation_one() {
        let mut world = test_world();
        assert_eq!(world.state().phase, Phase::Rebuilding);
        assert_eq!(world.state().generation, 0);
        settle(&mut world);
        assert_eq!(world.state().phase, Phase::Steady);
        assert_eq!(world.state().generation, 1);
        assert!((world.state().fatigue - world.config().fatigue_floor).abs() < 1e-5);
    }

    #[test]
    fn fatigue_mirrors_inverse_progress_during_rebuild() {
        let mut world = test_world();
        for _ in 0..30 {
            world.tick(1.0 / 60.0);
            let state = world.state();
            if state.phase == Phase::Rebuilding {
                assert!((state.fatigue - (1.0 - state.rebuild_progress)).abs() < 1e-4);
                assert_eq!(state.fatigue, state.smooth_fatigue);
            }
        }
    }

    #[test]
    fn sustained_gaze_accrues_fatigue() {
        let mut world = match EyeWorld::with_attention_source(
            test_config(),
            Box::new(ScriptedAttention::new(vec![looking(0.9)])),
        ) {
            Ok(world) => world,
            Err(err) => panic!("{err}"),
        };
        settle(&mut world);
        let before = world.state().fatigue;
        for _ in 0..300 {
            world.tick(1.0 / 60.0);
        }
        assert!(world.state().fatigue > before);
    }

    #[test]
    fn empty_scene_heals_faster_than_low_attention() {
        let mut healed = match EyeWorld::with_attention_source(
            test_config(),
            Box::new(ScriptedAttention::new(vec![empty_scene()])),
        ) {
            Ok(world) => world,
            Err(err) => panic!("{err}"),
        };
        settle(&mut healed);
        healed.state_mut().fatigue = 0.8;
        healed.state_mut().smooth_fatigue = 0.8;
        for _ in 0..120 {
            healed.tick(1.0 / 60.0);
        }
        // Solitude heals at 0.15/s: two seconds should recover ~0.3.
        assert!(world_fatigue(&healed) < 0.55);

        let mut idle = test_world();
        settle(&mut idle);
        idle.state_mut().fatigue = 0.8;
        idle.state_mut().smooth_fatigue = 0.8;
        for _ in 0..120 {
            idle.tick(1.0 / 60.0);
        }
        assert!(world_fatigue(&idle) > world_fatigue(&healed));
    }

    fn world_fatigue(world: &EyeWorld) -> f32 {
        world.state().fatigue
    }

    #[test]
    fn fatigue_never_drops_below_the_floor() {
        let mut world = match EyeWorld::with_attention_source(
            test_config(),
            Box::new(ScriptedAttention::new(vec![empty_scene()])),
        ) {
            Ok(world) => world,
            Err(err) => panic!("{err}"),
        };
        settle(&mut world);
        for _ in 0..1200 {
            world.tick(1.0 / 60.0);
            assert!(world.state().fatigue >= world.config().fatigue_floor - 1e-6);
        }
    }

    #[test]
    fn saturation_pauses_then_births_a_new_generation() {
        let mut world = test_world();
        settle(&mut world);
        let first_palette = world.palette().name.clone();
        world.state_mut().fatigue = 0.999;
        let mut paused_ticks = 0u32;
        let mut new_generation = None;
        for _ in 0..2000 {
            let events = world.tick(1.0 / 60.0);
            if events.phase == Phase::Paused {
                paused_ticks += 1;
            }
            if let Some(generation) = events.generation_started {
                new_generation = Some(generation);
                break;
            }
        }
        let Some(generation) = new_generation else {
            panic!("no rebirth observed");
        };
        assert_eq!(generation, 2);
        assert_eq!(world.state().phase, Phase::Rebuilding);
        // Four seconds of blackout at 60 ticks/s, give or take one tick.
        assert!((239..=241).contains(&paused_ticks), "{paused_ticks} paused ticks");
        // Palette steering makes a repeat effectively impossible.
        assert_ne!(world.palette().name, first_palette);
    }

    #[test]
    fn attention_hysteresis_ignores_brief_flickers() {
        let mut signals = vec![looking(0.9); 3];
        signals.push(empty_scene());
        let mut world = match EyeWorld::with_attention_source(
            test_config(),
            Box::new(ScriptedAttention::new(signals)),
        ) {
            Ok(world) => world,
            Err(err) => panic!("{err}"),
        };
        // Three ticks of gaze is shorter than the hold threshold, and 0.9 is
        // above the jump threshold, so the jump path commits immediately.
        world.tick(1.0 / 60.0);
        assert!(world.state().attention_target > 0.8);
    }

    #[test]
    fn small_target_wobble_waits_for_the_hold_timer() {
        let mut world = test_world();
        world.state_mut().attention_target = 0.5;
        world.state_mut().last_raw_target = 0.5;
        world.state_mut().attention = 0.5;
        let signals = vec![looking(0.55); 60];
        world.attention = Box::new(ScriptedAttention::new(signals));
        world.tick(1.0 / 60.0);
        // 0.05 delta is under the jump threshold; the target must not move
        // until the hold timer matures.
        assert!((world.state().attention_target - 0.5).abs() < 1e-5);
        for _ in 0..30 {
            world.tick(1.0 / 60.0);
        }
        assert!((world.state().attention_target - 0.55).abs() < 1e-5);
    }

    #[test]
    fn pupil_target_survives_non_finite_inputs() {
        let mut world = test_world();
        world.state_mut().smooth_attention = f32::NAN;
        for _ in 0..10 {
            world.tick(1.0 / 60.0);
        }
        assert!(world.state().pupil_radius.is_finite());
        assert!(world.state().pupil_radius > 0.0);
    }

    #[test]
    fn growth_radius_is_uniform_by_default() {
        let mut world = test_world();
        world.tick(1.0 / 60.0);
        assert_eq!(world.state().phase, Phase::Rebuilding);
        assert_eq!(world.growth_radius(), 1.0);
    }

    #[test]
    fn radial_sweep_tracks_rebuild_progress() {
        let config = EyeConfig {
            radial_growth_sweep: true,
            ..test_config()
        };
        let mut world = match EyeWorld::new(config) {
            Ok(world) => world,
            Err(err) => panic!("{err}"),
        };
        world.tick(1.0 / 60.0);
        let radius = world.growth_radius();
        assert!((radius - world.state().rebuild_progress).abs() < 1e-6);
        assert!(radius < 1.0);
        settle(&mut world);
        assert_eq!(world.growth_radius(), 1.0);
    }

    #[test]
    fn reassignment_rebases_fades_and_consumes_the_pool() {
        let mut world = test_world();
        settle(&mut world);
        world.state_mut().smooth_fatigue = 0.4;
        let before = world.pool().len(ShapeFamily::Base);
        assert!(world.reassign_shape(ShapeFamily::Base, 0));
        assert_eq!(world.pool().len(ShapeFamily::Base), before - 1);
        let shape = world.shapes().base[0];
        assert!(shape.fade_start >= 0.5);
        assert!(shape.fade_end > shape.fade_start);
        assert!(!world.reassign_shape(ShapeFamily::Base, usize::MAX));
        assert!(world.reassign_shape(ShapeFamily::Fiber, 0));
        assert!(world.reassign_shape(ShapeFamily::Web, 0));
    }

    #[test]
    fn history_is_bounded() {
        let config = EyeConfig {
            history_capacity: 32,
            ..test_config()
        };
        let mut world = match EyeWorld::new(config) {
            Ok(world) => world,
            Err(err) => panic!("{err}"),
        };
        for _ in 0..100 {
            world.tick(1.0 / 60.0);
        }
        assert_eq!(world.history().len(), 32);
        let front = world.history().front().map(|s| s.tick);
        assert_eq!(front, Some(69));
    }

    /// Attention source that counts how often it is polled.
    struct SpyAttention {
        polls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl AttentionSource for SpyAttention {
        fn latest(&mut self) -> Option<AttentionSignal> {
            self.polls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            None
        }
    }

    #[test]
    fn attention_source_is_polled_once_per_tick() {
        let polls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let spy = SpyAttention {
            polls: std::sync::Arc::clone(&polls),
        };
        let mut world =
            match EyeWorld::with_attention_source(test_config(), Box::new(spy)) {
                Ok(world) => world,
                Err(err) => panic!("{err}"),
            };
        for _ in 0..25 {
            world.tick(1.0 / 60.0);
            world.frame();
        }
        assert_eq!(polls.load(std::sync::atomic::Ordering::SeqCst), 25);
    }

    #[test]
    fn seeded_worlds_stay_in_lockstep() {
        let script = vec![looking(0.8); 64];
        let mut a = match EyeWorld::with_attention_source(
            test_config(),
            Box::new(ScriptedAttention::new(script.clone())),
        ) {
            Ok(world) => world,
            Err(err) => panic!("{err}"),
        };
        let mut b = match EyeWorld::with_attention_source(
            test_config(),
            Box::new(ScriptedAttention::new(script)),
        ) {
            Ok(world) => world,
            Err(err) => panic!("{err}"),
        };
        for _ in 0..120 {
            let ea = a.tick(1.0 / 60.0);
            let eb = b.tick(1.0 / 60.0);
            assert_eq!(ea, eb);
        }
        assert_eq!(a.state().fatigue, b.state().fatigue);
        assert_eq!(a.palette(), b.palette());
        let fa = a.frame();
        let fb = b.frame();
        assert_eq!(fa.ops.len(), fb.ops.len());
        assert_eq!(fa.ops, fb.ops);
        assert_eq!(fa.pupil, fb.pupil);
    }

    #[test]
    fn paused_frame_is_black() {
        let mut world = test_world();
        settle(&mut world);
        world.state_mut().fatigue = 1.0;
        world.state_mut().smooth_fatigue = 1.0;
        world.tick(1.0 / 60.0);
        assert_eq!(world.state().phase, Phase::Paused);
        let frame = world.frame();
        assert!(frame.background[2] < 1e-3);
        // Every fade window is closed at zero integrity; only rim scaffolding
        // with a residual floor may remain.
        let bright_ops = frame
            .ops
            .iter()
            .filter(|op| op.alpha > 0.2 && op.brightness > 20.0)
            .count();
        assert_eq!(bright_ops, 0, "{bright_ops} bright ops while paused");
    }

    #[test]
    fn frame_uses_iris_units() {
        let mut world = test_world();
        settle(&mut world);
        let frame = world.frame();
        assert!(!frame.ops.is_empty());
        for op in &frame.ops {
            assert!(op.x.abs() <= 1.6, "op x {} outside the eye", op.x);
            assert!(op.y.abs() <= 1.6, "op y {} outside the eye", op.y);
            assert!((0.0..=1.0).contains(&op.alpha));
            assert!(op.width > 0.0 && op.height > 0.0);
        }
        assert_eq!(frame.pupil.wobble.len(), 64);
        assert_eq!(frame.iris_wobble.len(), 64);
    }

    #[test]
    fn faint_attention_nets_slow_healing() {
        // Attention in the 0.1..0.3 band accrues and heals in the same
        // tick; the 0.05/s heal outweighs the faint accrual.
        let mut world = match EyeWorld::with_attention_source(
            test_config(),
            Box::new(ScriptedAttention::new(vec![looking(0.25)])),
        ) {
            Ok(world) => world,
            Err(err) => panic!("{err}"),
        };
        settle(&mut world);
        world.state_mut().fatigue = 0.5;
        world.state_mut().smooth_fatigue = 0.5;
        for _ in 0..600 {
            world.tick(1.0 / 60.0);
        }
        let state = world.state();
        assert!(
            state.attention > 0.1 && state.attention < 0.3,
            "attention {} left the faint band",
            state.attention
        );
        assert!(
            state.fatigue < 0.45,
            "fatigue {} rose under faint attention",
            state.fatigue
        );
    }

    #[test]
    fn oscillating_raw_target_never_commits() {
        let mut signals = Vec::new();
        for i in 0..120 {
            signals.push(looking(if i % 2 == 0 { 0.5 } else { 0.65 }));
        }
        let mut world = match EyeWorld::with_attention_source(
            test_config(),
            Box::new(ScriptedAttention::new(signals)),
        ) {
            Ok(world) => world,
            Err(err) => panic!("{err}"),
        };
        // The first sample jumps from 0.0 and commits; after that the raw
        // target flips by 0.15 every tick, which resets the hold timer and
        // stays under the jump threshold, so the committed target is stuck.
        for _ in 0..120 {
            world.tick(1.0 / 60.0);
            assert!((world.state().attention_target - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn web_growth_distance_is_measured_from_the_outer_edge() {
        let config = test_config();
        let noise = ValueNoise::seeded(2);
        let mut rng = SmallRng::seed_from_u64(2);
        let structure =
            IrisStructure::generate(&config, IrisPalette::default(), &noise, &mut rng);
        let field = ShapeField::generate(&config, &structure, &noise, &mut rng);
        for shape in &field.web {
            assert!((shape.grow_dist - (1.0 - shape.t_base)).abs() < 1e-6);
        }
        for shape in &field.base {
            assert!((shape.grow_dist - (1.0 - shape.r_norm)).abs() < 1e-6);
        }

        let mut world = test_world();
        assert!(world.reassign_shape(ShapeFamily::Web, 0));
        let recycled = world.shapes().web[0];
        assert!((recycled.grow_dist - (1.0 - recycled.t_base)).abs() < 1e-6);
    }

    #[test]
    fn fiber_recoil_direction_points_away_from_the_nearest_break() {
        let config = test_config();
        let noise = ValueNoise::seeded(2);
        let mut rng = SmallRng::seed_from_u64(2);
        let structure =
            IrisStructure::generate(&config, IrisPalette::default(), &noise, &mut rng);
        let field = ShapeField::generate(&config, &structure, &noise, &mut rng);
        for shape in &field.fibers {
            let fiber = structure.fibers[shape.fiber_index as usize];
            let mut best = f32::INFINITY;
            let mut nearest = fiber.break_points[0];
            for &bp in &fiber.break_points {
                let d = (shape.t_base - bp).abs();
                if d < best {
                    best = d;
                    nearest = bp;
                }
            }
            assert!((shape.break_dist - best).abs() < 1e-6);
            let expected = if shape.t_base < nearest { -1.0 } else { 1.0 };
            assert_eq!(shape.break_dir, expected);
        }
    }

    #[test]
    fn missing_signal_fields_degrade_gracefully() {
        let signals = vec![
            AttentionSignal {
                looking_confidence: Some(0.9),
                face_count: Some(1),
                proximity: Some(0.8),
            },
            AttentionSignal {
                looking_confidence: None,
                face_count: Some(1),
                proximity: None,
            },
        ];
        let mut world = match EyeWorld::with_attention_source(
            test_config(),
            Box::new(ScriptedAttention::new(signals)),
        ) {
            Ok(world) => world,
            Err(err) => panic!("{err}"),
        };
        world.tick(1.0 / 60.0);
        assert_eq!(world.state().proximity, 0.8);
        world.tick(1.0 / 60.0);
        // Lost proximity keeps the previous estimate; lost gaze confidence
        // reads as nobody looking.
        assert_eq!(world.state().proximity, 0.8);
        assert_eq!(world.state().last_raw_target, 0.0);
        assert_eq!(world.state().face_status, FaceStatus::Present { count: 1 });
    }
}





