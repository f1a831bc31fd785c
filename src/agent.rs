//! The agent state machine.
//!
//! Each tick, the agent resets the model inputs to their defaults, lets the
//! active state's hook override what it needs, runs one model timestep and
//! moves to the state the hook selected. Presets differ in which states are
//! registered, which approach variant they use, and their parameter deltas.

use std::fmt;

use clap::ValueEnum;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::model::{Model, MotorMode};
use crate::place::ReplayTarget;
use crate::params::DISTANCE_PER_TIMESTEP;

/// The agent's behavioral states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Terminal: the outer loop treats this as "done".
    None,
    ForcedMove,
    ReceiveReward,
    InitiateNavigation,
    ApproachSubgoal,
    TopologicalStep,
    ReplayEpisode,
    Exploration,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::None => "No state",
            Self::ForcedMove => "Forced move",
            Self::ReceiveReward => "Receive reward",
            Self::InitiateNavigation => "Initiate navigation",
            Self::ApproachSubgoal => "Approach subgoal",
            Self::TopologicalStep => "Topological step",
            Self::ReplayEpisode => "Replay episode",
            Self::Exploration => "Exploration",
        };
        f.write_str(label)
    }
}

/// Behavioral variants of the approach-subgoal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApproachStyle {
    /// Resume the current replay on halt.
    Standard,
    /// Restart the replay from the goal on halt, with replay tuning.
    NoResume,
    /// Re-initiate navigation at the subgoal instead of stepping the graph.
    NoTopo,
}

/// Which navigation states an agent preset registers.
///
/// Forced-move and receive-reward handlers are always present. A transition
/// into an unregistered state collapses to [`AgentState::None`].
#[derive(Debug, Clone, Copy)]
pub struct StateTable {
    pub initiate_navigation: bool,
    pub approach_subgoal: Option<ApproachStyle>,
    pub topological_step: bool,
    pub replay_episode: bool,
    pub exploration: bool,
}

impl StateTable {
    /// All five navigation handlers, with the standard approach variant.
    #[must_use]
    pub fn unified() -> Self {
        Self {
            initiate_navigation: true,
            approach_subgoal: Some(ApproachStyle::Standard),
            topological_step: true,
            replay_episode: true,
            exploration: true,
        }
    }
}

/// Tunable agent parameters; presets apply deltas to these defaults.
#[derive(Debug, Clone, Copy)]
pub struct AgentParams {
    pub approach_motor_tuning: f64,
    pub replay_motor_tuning: f64,
    pub exploration_motor_tuning: f64,
    pub approach_confidence_threshold: f64,
    pub replay_confidence_threshold: f64,
    pub form_place_cells: bool,
    pub topological_navigation: bool,
    pub exploration_end_probability: f64,
    pub topological_reset_probability: f64,
}

impl Default for AgentParams {
    fn default() -> Self {
        Self {
            approach_motor_tuning: 0.75,
            replay_motor_tuning: 0.1,
            exploration_motor_tuning: 0.1,
            approach_confidence_threshold: 0.05,
            replay_confidence_threshold: 0.2,
            form_place_cells: true,
            topological_navigation: false,
            exploration_end_probability: 0.003,
            topological_reset_probability: 0.05,
        }
    }
}

/// The eight agent presets selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AgentPreset {
    Vector,
    Deflect,
    Combined,
    Narrow,
    Strict,
    #[value(name = "noresume")]
    NoResume,
    #[value(name = "notopo")]
    NoTopo,
    Place,
}

/// Per-tick inputs from the simulation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentInput {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub speed: f64,
    pub goto_x: f64,
    pub goto_y: f64,
    pub reward_id: i32,
}

/// Per-tick motor command back to the simulation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentOutput {
    pub heading: f64,
    pub speed: f64,
    pub halted: bool,
}

/// The navigating agent: a model plus the state machine driving it.
#[derive(Debug)]
pub struct Agent {
    pub label: &'static str,
    pub params: AgentParams,
    pub states: StateTable,
    pub model: Model,

    pub input: AgentInput,
    pub output: AgentOutput,

    pub active_state: AgentState,
    next_state: AgentState,
    pub previous_state: AgentState,
}

impl Agent {
    #[must_use]
    pub fn new(label: &'static str, params: AgentParams, states: StateTable, model: Model) -> Self {
        Self {
            label,
            params,
            states,
            model,
            input: AgentInput::default(),
            output: AgentOutput::default(),
            active_state: AgentState::None,
            next_state: AgentState::None,
            previous_state: AgentState::None,
        }
    }

    /// Builds an agent with one of the command-line presets.
    #[must_use]
    pub fn with_preset(preset: AgentPreset, model: Model) -> Self {
        let mut params = AgentParams::default();
        let (label, states) = match preset {
            AgentPreset::Vector => {
                params.approach_motor_tuning = 0.1;
                let states = StateTable {
                    initiate_navigation: true,
                    approach_subgoal: Some(ApproachStyle::Standard),
                    topological_step: false,
                    replay_episode: false,
                    exploration: false,
                };
                ("Purely vector-navigating agent", states)
            }
            AgentPreset::Deflect => {
                params.form_place_cells = false;
                (
                    "Vector-navigating agent with obstacle deflection",
                    StateTable::unified(),
                )
            }
            AgentPreset::Combined => ("Combined vector-place agent", StateTable::unified()),
            AgentPreset::Narrow => {
                params.approach_motor_tuning = 0.1;
                params.exploration_end_probability = 0.0005;
                (
                    "Combined vector-place agent, sunburst version",
                    StateTable::unified(),
                )
            }
            AgentPreset::Strict => {
                params.replay_confidence_threshold = 0.9;
                params.topological_reset_probability = 0.25;
                (
                    "Combined vector-place agent, exaggerated traits",
                    StateTable::unified(),
                )
            }
            AgentPreset::NoResume => {
                params.replay_confidence_threshold = 0.9;
                let states = StateTable {
                    approach_subgoal: Some(ApproachStyle::NoResume),
                    ..StateTable::unified()
                };
                (
                    "Combined vector-place agent, strict replay, no resuming replays",
                    states,
                )
            }
            AgentPreset::NoTopo => {
                params.replay_confidence_threshold = 0.9;
                let states = StateTable {
                    approach_subgoal: Some(ApproachStyle::NoTopo),
                    ..StateTable::unified()
                };
                (
                    "Combined vector-place agent, strict replay, no topological navigation",
                    states,
                )
            }
            AgentPreset::Place => {
                params.topological_navigation = true;
                ("Purely topological agent", StateTable::unified())
            }
        };
        Self::new(label, params, states, model)
    }

    /// Whether the given state has a registered handler.
    #[must_use]
    pub fn has_handler(&self, state: AgentState) -> bool {
        match state {
            AgentState::None => false,
            AgentState::ForcedMove | AgentState::ReceiveReward => true,
            AgentState::InitiateNavigation => self.states.initiate_navigation,
            AgentState::ApproachSubgoal => self.states.approach_subgoal.is_some(),
            AgentState::TopologicalStep => self.states.topological_step,
            AgentState::ReplayEpisode => self.states.replay_episode,
            AgentState::Exploration => self.states.exploration,
        }
    }

    /// Runs one agent tick: defaults, state hook, model timestep, transition.
    pub fn execute(&mut self, rng: &mut impl Rng) {
        self.model.input.heading = self.input.heading;
        self.model.input.speed = self.input.speed;
        self.model.input.motor_mode = MotorMode::GridDecoder;
        self.model.input.motor_tuning = self.params.approach_motor_tuning;
        self.model.input.motor_offset = 0.0;
        self.model.input.confidence_threshold = self.params.approach_confidence_threshold;

        self.model.place.input.x = self.input.x;
        self.model.place.input.y = self.input.y;
        self.model.place.input.reward_id = self.input.reward_id;
        self.model.place.input.save_reward = false;
        self.model.place.input.form_place_cells = self.params.form_place_cells;
        self.model.place.input.weaken_synapse = false;
        self.model.place.input.reset_replay_to = ReplayTarget::Maintain;
        self.model.place.input.propagate_replay_towards = ReplayTarget::Maintain;

        self.next_state = self.active_state;
        assert!(
            self.has_handler(self.active_state),
            "agent executed without a handler for {}",
            self.active_state
        );
        self.run_hook(rng);

        self.model.simulate_timestep(rng);

        self.output.heading = self.model.output.heading;
        self.output.speed = self.model.output.speed;
        self.output.halted = self.model.output.halted;

        self.previous_state = self.active_state;
        self.active_state = self.next_state;
        if !self.has_handler(self.active_state) {
            self.active_state = AgentState::None;
        }
        if self.active_state != self.previous_state {
            tracing::debug!(previous = %self.previous_state, next = %self.active_state, "state transition");
        }
    }

    fn run_hook(&mut self, rng: &mut impl Rng) {
        match self.active_state {
            AgentState::None => {}
            AgentState::ForcedMove => self.hook_forced_move(),
            AgentState::ReceiveReward => self.hook_receive_reward(),
            AgentState::InitiateNavigation => self.hook_initiate_navigation(),
            AgentState::ApproachSubgoal => self.hook_approach_subgoal(),
            AgentState::TopologicalStep => self.hook_topological_step(rng),
            AgentState::ReplayEpisode => self.hook_replay_episode(),
            AgentState::Exploration => self.hook_exploration(rng),
        }
    }

    fn hook_forced_move(&mut self) {
        self.model.input.motor_mode = MotorMode::Forced;
        self.model.input.motor_tuning = 0.1;
        self.model.input.motor_offset =
            (self.input.goto_y - self.input.y).atan2(self.input.goto_x - self.input.x);

        let goto_distance =
            (self.input.goto_x - self.input.x).hypot(self.input.goto_y - self.input.y);
        if goto_distance < 2.0 * DISTANCE_PER_TIMESTEP {
            self.next_state = AgentState::None;
        }
    }

    fn hook_receive_reward(&mut self) {
        self.model.input.motor_mode = MotorMode::Halt;
        self.model.place.input.form_place_cells = true;
        self.model.place.input.save_reward = true;
        self.next_state = AgentState::None;
    }

    fn hook_initiate_navigation(&mut self) {
        if self.params.topological_navigation {
            self.model.place.input.reset_replay_to = ReplayTarget::Agent;
            self.model.place.input.propagate_replay_towards = ReplayTarget::Goal;
        } else {
            self.model.place.input.reset_replay_to = ReplayTarget::Goal;
        }
        self.next_state = AgentState::ApproachSubgoal;
    }

    fn hook_approach_subgoal(&mut self) {
        let style = self
            .states
            .approach_subgoal
            .expect("approach hook without a registered variant");
        match style {
            ApproachStyle::Standard => {
                if self.model.place.output.at_subgoal {
                    self.next_state = AgentState::TopologicalStep;
                } else if self.model.output.halted {
                    self.model.input.confidence_threshold =
                        self.params.replay_confidence_threshold;
                    self.next_state = AgentState::ReplayEpisode;
                } else {
                    self.next_state = AgentState::ApproachSubgoal;
                }
            }
            ApproachStyle::NoResume => {
                if self.model.place.output.at_subgoal {
                    self.next_state = AgentState::TopologicalStep;
                } else if self.model.output.halted {
                    self.model.place.input.reset_replay_to = ReplayTarget::Goal;
                    self.model.input.motor_tuning = self.params.replay_motor_tuning;
                    self.model.input.confidence_threshold =
                        self.params.replay_confidence_threshold;
                    self.next_state = AgentState::ReplayEpisode;
                } else {
                    self.next_state = AgentState::ApproachSubgoal;
                }
            }
            ApproachStyle::NoTopo => {
                if self.model.place.output.at_subgoal {
                    self.next_state = AgentState::InitiateNavigation;
                } else if self.model.output.halted {
                    self.model.input.confidence_threshold =
                        self.params.replay_confidence_threshold;
                    self.next_state = AgentState::ReplayEpisode;
                } else {
                    self.next_state = AgentState::ApproachSubgoal;
                }
            }
        }
    }

    fn hook_topological_step(&mut self, rng: &mut impl Rng) {
        self.model.place.input.reset_replay_to = ReplayTarget::Agent;
        self.model.place.input.propagate_replay_towards = ReplayTarget::Goal;
        if rng.random::<f64>() < self.params.topological_reset_probability {
            self.next_state = AgentState::InitiateNavigation;
        } else {
            self.next_state = AgentState::ApproachSubgoal;
        }
    }

    fn hook_replay_episode(&mut self) {
        if !self.model.output.halted {
            self.next_state = AgentState::ApproachSubgoal;
        } else if self.model.place.output.replay_terminated {
            // The replay ran dry: forget the dead-end synapse and turn around.
            self.model.place.input.weaken_synapse = true;
            self.model.input.motor_mode = MotorMode::LastHeading;
            self.model.input.motor_offset = std::f64::consts::PI;
            self.next_state = AgentState::Exploration;
        } else {
            self.model.input.motor_tuning = self.params.replay_motor_tuning;
            self.model.input.confidence_threshold = self.params.replay_confidence_threshold;
            self.model.place.input.propagate_replay_towards = ReplayTarget::Agent;
            self.next_state = AgentState::ReplayEpisode;
        }
    }

    fn hook_exploration(&mut self, rng: &mut impl Rng) {
        self.model.input.motor_mode = MotorMode::LastHeading;
        self.model.input.motor_tuning = self.params.exploration_motor_tuning;
        let jitter: f64 = rng.sample(StandardNormal);
        self.model.input.motor_offset = 0.02 * jitter;
        if rng.random::<f64>() < self.params.exploration_end_probability {
            self.next_state = AgentState::InitiateNavigation;
        } else {
            self.next_state = AgentState::Exploration;
        }
    }
}
