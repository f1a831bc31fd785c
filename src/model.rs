//! The navigation model: every network, wired and sequenced.
//!
//! One timestep runs, in a fixed order: velocity integration in each grid
//! module, the place graph, the grid decoder (when active), and the
//! normalization/inhibition motor chain that yields the executed heading,
//! a confidence and the halt signal.

use rand::Rng;

use crate::network::diff::GridDiff;
use crate::network::grid::{GainMode, GridModule};
use crate::network::motor::MotorNetwork;
use crate::place::PlaceGraph;
use crate::params::{FIXED_SPEED, MAX_GAIN};

/// How the motor pipeline chooses its source direction this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorMode {
    /// Suppress all motion.
    Halt,
    /// Drive toward the caller-specified offset, ignoring borders.
    Forced,
    /// Follow the grid decoder (or the visible subgoal).
    GridDecoder,
    /// Keep the previous heading.
    LastHeading,
}

/// Model construction parameters.
#[derive(Debug, Clone)]
pub struct ModelConf {
    pub module_count: usize,
    pub gain_mode: GainMode,
    pub gain_ratio: f64,
    pub initial_gain: f32,
    pub alternative_motor_scaling: bool,
    pub simplified_grid_diff: bool,
    pub direction_samples: usize,
    pub xy_samples: usize,
    pub grid_diff_offset: i32,
    pub sensor_count: usize,
    pub sensor_range: f64,
    pub place_cell_radius: f64,
    pub internal_motor_tuning: f64,
}

impl Default for ModelConf {
    fn default() -> Self {
        Self {
            module_count: 1,
            gain_mode: GainMode::Poisson,
            gain_ratio: 1.5,
            initial_gain: MAX_GAIN,
            alternative_motor_scaling: false,
            simplified_grid_diff: false,
            direction_samples: 28,
            xy_samples: 9,
            grid_diff_offset: 7,
            sensor_count: 72,
            sensor_range: 25.0,
            place_cell_radius: 7.0,
            internal_motor_tuning: 0.1,
        }
    }
}

/// Per-timestep inputs supplied by the agent.
#[derive(Debug, Clone)]
pub struct ModelInput {
    pub heading: f64,
    pub speed: f64,
    pub motor_mode: MotorMode,
    pub motor_tuning: f64,
    pub motor_offset: f64,
    pub confidence_threshold: f64,
}

impl Default for ModelInput {
    fn default() -> Self {
        Self {
            heading: 0.0,
            speed: 0.0,
            motor_mode: MotorMode::Halt,
            motor_tuning: 0.1,
            motor_offset: 0.0,
            confidence_threshold: 0.05,
        }
    }
}

/// Per-timestep motor command.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelOutput {
    pub heading: f64,
    pub speed: f64,
    pub halted: bool,
}

/// Owns all networks and sequences one timestep.
#[derive(Debug)]
pub struct Model {
    pub conf: ModelConf,
    pub input: ModelInput,
    pub output: ModelOutput,

    pub modules: Vec<GridModule>,
    pub diffs: Vec<GridDiff>,
    pub module_motors: Vec<MotorNetwork>,
    pub final_motor: MotorNetwork,

    pub place: PlaceGraph,
    pub border_sensors: Vec<f32>,

    pub first_normalized: MotorNetwork,
    pub first_inhibited: MotorNetwork,
    pub second_normalized: MotorNetwork,
    pub second_inhibited: MotorNetwork,
    border_inhibition_active: bool,

    /// Ratio of inhibited to normalized motor mass across both stages.
    pub confidence: f64,
}

impl Model {
    #[must_use]
    pub fn new(conf: ModelConf, rng: &mut impl Rng) -> Self {
        assert!(conf.module_count > 0, "at least one grid module is required");

        let mut modules = Vec::with_capacity(conf.module_count);
        let mut diffs = Vec::with_capacity(conf.module_count);
        let mut module_motors = Vec::with_capacity(conf.module_count);
        for i in 0..conf.module_count {
            let gain = conf.initial_gain / conf.gain_ratio.powi(i as i32) as f32;
            modules.push(GridModule::new(gain, conf.gain_mode, rng));
            diffs.push(GridDiff::new(
                conf.simplified_grid_diff,
                conf.direction_samples,
                conf.xy_samples,
                conf.grid_diff_offset,
                rng,
            ));
            module_motors.push(MotorNetwork::new(
                conf.direction_samples,
                Self::motor_scaling_factor(&conf, i),
                false,
                rng,
            ));
        }

        let mut model = Self {
            place: PlaceGraph::new(conf.place_cell_radius),
            border_sensors: vec![0.0; conf.sensor_count],
            final_motor: MotorNetwork::new(conf.direction_samples, 1.0, false, rng),
            first_normalized: MotorNetwork::new(conf.sensor_count, 1.0, true, rng),
            first_inhibited: MotorNetwork::new(conf.sensor_count, 1.0, false, rng),
            second_normalized: MotorNetwork::new(conf.sensor_count, 1.0, true, rng),
            second_inhibited: MotorNetwork::new(conf.sensor_count, 1.0, false, rng),
            border_inhibition_active: true,
            confidence: 0.0,
            modules,
            diffs,
            module_motors,
            input: ModelInput::default(),
            output: ModelOutput::default(),
            conf,
        };
        // The first normalized motor is always driven by an override; its
        // source direction is chosen per tick from the motor mode.
        model.first_normalized.override_active = true;
        model
    }

    /// Motor weight for module `i`, anchored so the largest-scaled module
    /// (the last one) contributes with factor 1 in the default scheme.
    fn motor_scaling_factor(conf: &ModelConf, i: usize) -> f64 {
        let n = (conf.module_count - 1 - i) as i32;
        if conf.alternative_motor_scaling {
            let mut denominator = 0.0;
            for l in 0..=n {
                denominator += conf.gain_ratio.powi(2 * l);
            }
            conf.gain_ratio.powi(n) / denominator
        } else {
            1.0 / conf.gain_ratio.powi(n)
        }
    }

    /// Settles every attractor sheet and the motor chain before simulation.
    pub fn settle(&mut self, rng: &mut impl Rng) {
        for module in &mut self.modules {
            module.settle(rng);
        }

        self.first_normalized.override_active = true;
        self.first_normalized.override_direction = 0.0;
        self.first_normalized.override_strength = 0.0;
        self.run_motor_chain();
    }

    /// Runs one model timestep with the current inputs.
    pub fn simulate_timestep(&mut self, rng: &mut impl Rng) {
        let velocity_x = (self.input.speed * self.input.heading.cos()) as f32;
        let velocity_y = (self.input.speed * self.input.heading.sin()) as f32;
        for module in &mut self.modules {
            module.set_velocity(velocity_x, velocity_y);
            module.step(rng);
        }

        self.place.update(&mut self.modules);

        if self.input.motor_mode == MotorMode::GridDecoder {
            self.run_grid_decoder();
        }

        self.output.halted = true;
        self.output.heading = self.input.heading;
        if self.input.motor_mode != MotorMode::Halt {
            self.select_motor_source();
            self.first_normalized.override_direction += self.input.motor_offset;

            self.border_inhibition_active = self.input.motor_mode != MotorMode::Forced;
            self.first_normalized.normalization_spread = self.input.motor_tuning;
            self.second_normalized.normalization_spread = self.conf.internal_motor_tuning;
            self.run_motor_chain();

            self.confidence = self.compute_confidence();
            self.output.halted = self.confidence < self.input.confidence_threshold;
            if self.second_inhibited.strength > 0.0 {
                self.output.heading = self.second_inhibited.direction;
            }
        }

        self.output.speed = if self.output.halted { 0.0 } else { FIXED_SPEED };
    }

    fn run_grid_decoder(&mut self) {
        for i in 0..self.conf.module_count {
            self.diffs[i].update(
                self.modules[i].convolved.layer.current(),
                &self.modules[i].fixed,
            );
            self.diffs[i].commit();

            self.module_motors[i].begin_update();
            self.module_motors[i].add_grid_diff(&self.diffs[i]);
            self.module_motors[i].apply_update();
            self.module_motors[i].commit();
        }

        self.final_motor.begin_update();
        for motor in &self.module_motors {
            self.final_motor.add_motor(motor);
        }
        self.final_motor.apply_update();
        self.final_motor.commit();
    }

    /// Picks the source direction the first normalized motor re-expresses.
    fn select_motor_source(&mut self) {
        match self.input.motor_mode {
            MotorMode::GridDecoder => {
                if self.place.output.subgoal_visible {
                    self.first_normalized.override_direction = self.place.output.subgoal_direction;
                    self.first_normalized.override_strength = 1.0;
                } else {
                    self.first_normalized.override_direction = self.final_motor.direction;
                    self.first_normalized.override_strength = self.final_motor.strength;
                }
            }
            MotorMode::LastHeading => {
                self.first_normalized.override_direction = self.input.heading;
                self.first_normalized.override_strength = 1.0;
            }
            MotorMode::Forced => {
                self.first_normalized.override_direction = 0.0;
                self.first_normalized.override_strength = 1.0;
            }
            MotorMode::Halt => {}
        }
    }

    fn run_motor_chain(&mut self) {
        self.first_normalized.begin_update();
        self.first_normalized.apply_update();
        self.first_normalized.commit();

        self.first_inhibited.begin_update();
        self.first_inhibited.add_motor(&self.first_normalized);
        if self.border_inhibition_active {
            self.first_inhibited.subtract_border(&self.border_sensors);
        }
        self.first_inhibited.apply_update();
        self.first_inhibited.commit();

        self.second_normalized.begin_update();
        self.second_normalized.add_motor(&self.first_inhibited);
        self.second_normalized.apply_update();
        self.second_normalized.commit();

        self.second_inhibited.begin_update();
        self.second_inhibited.add_motor(&self.second_normalized);
        if self.border_inhibition_active {
            self.second_inhibited.subtract_border(&self.border_sensors);
        }
        self.second_inhibited.apply_update();
        self.second_inhibited.commit();
    }

    fn compute_confidence(&self) -> f64 {
        if self.first_normalized.strength > 0.0 && self.second_normalized.strength > 0.0 {
            (self.first_inhibited.strength / self.first_normalized.strength
                * self.second_inhibited.strength
                / self.second_normalized.strength)
                .sqrt()
        } else {
            0.0
        }
    }
}
