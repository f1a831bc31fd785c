//! Grid modules: toroidal continuous-attractor sheets with convolved
//! readouts and a bump tracker.
//!
//! Each module path-integrates velocity at one spatial scale. The driven
//! sheet carries the attractor dynamics; a 2×2-blurred convolved copy is the
//! readout used for decoding and for place-cell snapshots; a second, fixed
//! readout buffer holds the decoding target and is only ever overwritten by
//! the place graph (or by settlement).

use rand::Rng;

use crate::network::layer::Layer;
use crate::network::mask::{torus_distance_squared, ShiftedMask};
use crate::numeric::wrap_index;
use crate::params::{
    BUMP_TRACKER_RADIUS, MAX_GAIN, SETTLE_STEPS, SHEET_SIZE, VELOCITY_COUPLING,
};

/// How a module's gain shapes its dynamics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainMode {
    /// Gain scales the velocity input directly; all neurons update.
    Velocity,
    /// Gain sets the per-step enable probability of each neuron; velocity
    /// input is scaled by the maximum gain instead.
    Poisson,
}

/// Preferred movement direction of a sheet neuron, fixed by the parity of
/// its coordinates within each 2×2 block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preferred {
    West,
    North,
    South,
    East,
}

/// The preferred direction encoded at sheet position (x, y).
#[must_use]
pub fn preferred_direction(x: usize, y: usize) -> Preferred {
    match 2 * (y % 2) + (x % 2) {
        0 => Preferred::West,
        1 => Preferred::North,
        2 => Preferred::South,
        _ => Preferred::East,
    }
}

/// Sheet x coordinate of a neuron index.
#[must_use]
pub fn index_to_x(index: usize) -> usize {
    index % SHEET_SIZE
}

/// Sheet y coordinate of a neuron index.
#[must_use]
pub fn index_to_y(index: usize) -> usize {
    index / SHEET_SIZE
}

/// Neuron index of a sheet coordinate pair.
#[must_use]
pub fn coords_to_index(x: usize, y: usize) -> usize {
    y * SHEET_SIZE + x
}

/// Decay constant of the center-surround profile ("periodicity" tuning).
#[must_use]
pub fn sheet_beta() -> f32 {
    let lambda = SHEET_SIZE as f32 * 15.0 / 40.0;
    3.0 / (lambda * lambda)
}

/// The recurrent difference-of-Gaussians weight for a sheet offset.
fn recurrent_weight(x: usize, y: usize) -> f32 {
    let beta = sheet_beta();
    let gamma = 1.05 * beta;
    let distance_squared = torus_distance_squared(x, y);
    (-gamma * distance_squared).exp() - (-beta * distance_squared).exp()
}

/// Profile shift for a sheet neuron: its own location displaced one step
/// against its preferred direction.
fn recurrent_shift(index: usize) -> (usize, usize) {
    let mut x = index_to_x(index) as i32;
    let mut y = index_to_y(index) as i32;
    match preferred_direction(x as usize, y as usize) {
        Preferred::North => y -= 1,
        Preferred::South => y += 1,
        Preferred::East => x -= 1,
        Preferred::West => x += 1,
    }
    (
        wrap_index(x, SHEET_SIZE as i32),
        wrap_index(y, SHEET_SIZE as i32),
    )
}

/// The driven continuous-attractor sheet of one grid module.
#[derive(Debug, Clone)]
pub struct AttractorSheet {
    pub gain: f32,
    pub gain_mode: GainMode,
    activation_probability: f32,
    pub layer: Layer,
    enabled: Vec<bool>,
    recurrent: ShiftedMask,
    velocity: (f32, f32),
}

impl AttractorSheet {
    /// Creates a settled-ready sheet with the given gain and gain mode.
    #[must_use]
    pub fn new(gain: f32, gain_mode: GainMode, rng: &mut impl Rng) -> Self {
        let size = SHEET_SIZE * SHEET_SIZE;
        let shifts = (0..size).map(recurrent_shift).collect();
        Self {
            gain,
            gain_mode,
            activation_probability: gain / MAX_GAIN,
            layer: Layer::new(size, rng),
            enabled: vec![true; size],
            recurrent: ShiftedMask::new(recurrent_weight, shifts),
            velocity: (0.0, 0.0),
        }
    }

    /// Sets the velocity integrated on the next update, in cm/s components.
    pub fn set_velocity(&mut self, x: f32, y: f32) {
        self.velocity = (x, y);
    }

    /// Runs one update: gating, recurrent and velocity input, leaky rule.
    ///
    /// The result lands in the next slot; call [`Layer::commit`] to publish.
    pub fn update(&mut self, rng: &mut impl Rng) {
        match self.gain_mode {
            GainMode::Velocity => self.enabled.fill(true),
            GainMode::Poisson => {
                for enabled in &mut self.enabled {
                    *enabled = rng.random::<f32>() < self.activation_probability;
                }
            }
        }

        self.layer.clear_inputs();
        let (current, inputs) = self.layer.current_and_inputs_mut();
        let enabled = &self.enabled;
        self.recurrent
            .accumulate(current, inputs, |neuron| enabled[neuron]);
        self.accumulate_velocity();

        let (current, inputs, next) = self.layer.buffers_mut();
        for i in 0..next.len() {
            next[i] = if self.enabled[i] {
                let drive = (1.0 + inputs[i]).max(0.0);
                current[i] + 0.1 * (drive - current[i])
            } else {
                current[i]
            };
        }
    }

    /// Commits the last update.
    pub fn commit(&mut self) {
        self.layer.commit();
    }

    fn accumulate_velocity(&mut self) {
        let (velocity_x, velocity_y) = self.velocity;
        let gain_scale = match self.gain_mode {
            GainMode::Velocity => self.gain,
            GainMode::Poisson => MAX_GAIN,
        };
        let inputs = self.layer.inputs_mut();
        for y in 0..SHEET_SIZE {
            for x in 0..SHEET_SIZE {
                let contribution = match preferred_direction(x, y) {
                    Preferred::North => velocity_y,
                    Preferred::South => -velocity_y,
                    Preferred::East => velocity_x,
                    Preferred::West => -velocity_x,
                };
                inputs[coords_to_index(x, y)] += contribution * gain_scale * VELOCITY_COUPLING;
            }
        }
    }
}

/// Disc-mass tracker that follows the attractor bump across the torus.
#[derive(Debug, Clone, Default)]
pub struct BumpTracker {
    pub x: i32,
    pub y: i32,
    pub total_dx: i32,
    pub total_dy: i32,
    initialized: bool,
}

impl BumpTracker {
    /// Activity mass within the tracking disc around a center, plus the
    /// integer displacement to the disc's center of mass.
    #[must_use]
    pub fn disc_mass(activity: &[f32], center_x: i32, center_y: i32) -> (f32, i32, i32) {
        let mut mass = 0.0_f32;
        let mut weighted_dx = 0.0_f32;
        let mut weighted_dy = 0.0_f32;
        for dy in -BUMP_TRACKER_RADIUS..=BUMP_TRACKER_RADIUS {
            for dx in -BUMP_TRACKER_RADIUS..=BUMP_TRACKER_RADIUS {
                if dx * dx + dy * dy > BUMP_TRACKER_RADIUS * BUMP_TRACKER_RADIUS {
                    continue;
                }
                let x = wrap_index(center_x + dx, SHEET_SIZE as i32);
                let y = wrap_index(center_y + dy, SHEET_SIZE as i32);
                let value = activity[coords_to_index(x, y)];
                mass += value;
                weighted_dx += dx as f32 * value;
                weighted_dy += dy as f32 * value;
            }
        }
        if mass <= 0.0 {
            return (mass, 0, 0);
        }
        (
            mass,
            (weighted_dx / mass).round() as i32,
            (weighted_dy / mass).round() as i32,
        )
    }

    /// Pins the tracker to the most active neuron, then lets it slide to the
    /// local disc-mass maximum with the displacement counters zeroed.
    pub fn initialize(&mut self, activity: &[f32]) {
        let mut max_activation = -1.0_f32;
        for (index, &value) in activity.iter().enumerate() {
            if value > max_activation {
                max_activation = value;
                self.x = index_to_x(index) as i32;
                self.y = index_to_y(index) as i32;
            }
        }
        self.initialized = true;
        self.update(activity);
        self.total_dx = 0;
        self.total_dy = 0;
    }

    /// Moves the tracked center while doing so increases disc mass,
    /// accumulating the total integer displacement.
    pub fn update(&mut self, activity: &[f32]) {
        if !self.initialized {
            return;
        }
        loop {
            let (current_mass, com_dx, com_dy) = Self::disc_mass(activity, self.x, self.y);
            let candidate_x = wrap_index(self.x + com_dx, SHEET_SIZE as i32) as i32;
            let candidate_y = wrap_index(self.y + com_dy, SHEET_SIZE as i32) as i32;
            let (new_mass, _, _) = Self::disc_mass(activity, candidate_x, candidate_y);
            if new_mass > current_mass {
                self.x = candidate_x;
                self.y = candidate_y;
                self.total_dx += com_dx;
                self.total_dy += com_dy;
            } else {
                break;
            }
        }
    }
}

/// The 2×2-blurred readout of a driven sheet.
#[derive(Debug, Clone)]
pub struct ConvolvedSheet {
    pub layer: Layer,
    pub bump: BumpTracker,
}

impl ConvolvedSheet {
    #[must_use]
    pub fn new(rng: &mut impl Rng) -> Self {
        Self {
            layer: Layer::new(SHEET_SIZE * SHEET_SIZE, rng),
            bump: BumpTracker::default(),
        }
    }

    /// Recomputes the blur of the afferent sheet into the next slot.
    pub fn update_from(&mut self, afferent: &[f32]) {
        self.layer.clear_inputs();
        let inputs = self.layer.inputs_mut();
        for y in 0..SHEET_SIZE {
            for x in 0..SHEET_SIZE {
                let value = 0.25 * afferent[coords_to_index(x, y)];
                for dy in 0..2 {
                    for dx in 0..2 {
                        let target_x = (x + dx) % SHEET_SIZE;
                        let target_y = (y + dy) % SHEET_SIZE;
                        inputs[coords_to_index(target_x, target_y)] += value;
                    }
                }
            }
        }
        let (_, inputs, next) = self.layer.buffers_mut();
        next.copy_from_slice(inputs);
    }

    pub fn commit(&mut self) {
        self.layer.commit();
    }
}

/// One grid module: driven sheet, moving readout, fixed decoding target.
#[derive(Debug, Clone)]
pub struct GridModule {
    pub sheet: AttractorSheet,
    pub convolved: ConvolvedSheet,
    /// Decoding target; written only by settlement and the place graph.
    pub fixed: Vec<f32>,
}

impl GridModule {
    #[must_use]
    pub fn new(gain: f32, gain_mode: GainMode, rng: &mut impl Rng) -> Self {
        Self {
            sheet: AttractorSheet::new(gain, gain_mode, rng),
            convolved: ConvolvedSheet::new(rng),
            fixed: vec![0.0; SHEET_SIZE * SHEET_SIZE],
        }
    }

    /// Sets the velocity integrated on the next step.
    pub fn set_velocity(&mut self, x: f32, y: f32) {
        self.sheet.set_velocity(x, y);
    }

    /// Advances the module one timestep: sheet, readout, bump tracker.
    pub fn step(&mut self, rng: &mut impl Rng) {
        self.sheet.update(rng);
        self.sheet.commit();
        self.convolved.update_from(self.sheet.layer.current());
        self.convolved.commit();
        self.convolved.bump.update(self.convolved.layer.current());
    }

    /// Lets the attractor settle into a stable bump before simulation.
    ///
    /// Runs the driven sheet under velocity gain with zero velocity, then
    /// publishes the readout, pins the bump tracker and copies the readout
    /// into the fixed decoding target so that fixed == moving at t = 0.
    pub fn settle(&mut self, rng: &mut impl Rng) {
        let previous_mode = self.sheet.gain_mode;
        self.sheet.gain_mode = GainMode::Velocity;
        self.sheet.set_velocity(0.0, 0.0);
        for _ in 0..SETTLE_STEPS {
            self.sheet.update(rng);
            self.sheet.commit();
        }
        self.sheet.gain_mode = previous_mode;

        self.convolved.update_from(self.sheet.layer.current());
        self.convolved.commit();
        self.convolved.bump.initialize(self.convolved.layer.current());
        self.fixed.copy_from_slice(self.convolved.layer.current());
    }
}
