//! The simulation loop.
//!
//! Owns the ground-truth pose, dispatches script commands to the agent's
//! state machine, and steps the world: border sensors in, motor commands
//! out, fence and arena crossing checks on every movement.

use std::collections::HashMap;
use std::io::BufRead;

use rand::rngs::SmallRng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentState};
use crate::numeric::wrap_angle;
use crate::params::{DISTANCE_PER_TIMESTEP, STEPS_PER_SECOND};
use crate::sim::arena::{Arena, ArenaError};
use crate::sim::script::{Command, ScriptError, ScriptScanner};

/// Fatal simulation failures.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("agent hit the arena between ({from_x}, {from_y}) and ({to_x}, {to_y})")]
    ArenaCollision {
        from_x: f64,
        from_y: f64,
        to_x: f64,
        to_y: f64,
    },
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Arena(#[from] ArenaError),
}

/// Runner configuration. The plot switches are accepted for script
/// compatibility; this build is headless and only logs them.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationConf {
    pub live_plot: bool,
    pub final_plot: bool,
    pub lite_plot: bool,
}

/// The simulation: ground truth, arena, fences and the driven agent.
pub struct Simulation {
    agent: Agent,
    rng: SmallRng,

    global_timestep: u64,
    x: f64,
    y: f64,
    heading: f64,
    speed: f64,

    arena: Arena,
    fences: HashMap<String, Arena>,
    reward_id: i32,
    goto_x: f64,
    goto_y: f64,
    reward_ids: HashMap<String, i32>,

    current_trial_phase: String,
    path_length_in_current_trial_phase: f64,
}

impl Simulation {
    #[must_use]
    pub fn new(agent: Agent, conf: SimulationConf, rng: SmallRng) -> Self {
        if conf.live_plot || conf.final_plot || conf.lite_plot {
            debug!("plot flags accepted but ignored in this headless build");
        }
        Self {
            agent,
            rng,
            global_timestep: 0,
            x: 0.0,
            y: 0.0,
            heading: 0.0,
            speed: 0.0,
            arena: Arena::empty(),
            fences: HashMap::new(),
            reward_id: 0,
            goto_x: 0.0,
            goto_y: 0.0,
            reward_ids: HashMap::new(),
            current_trial_phase: String::new(),
            path_length_in_current_trial_phase: 0.0,
        }
    }

    /// Ground-truth position.
    #[must_use]
    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// The agent, for inspection.
    #[must_use]
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Total timesteps executed.
    #[must_use]
    pub fn timestep(&self) -> u64 {
        self.global_timestep
    }

    /// Runs the script to completion.
    pub fn run<R: BufRead>(&mut self, mut script: ScriptScanner<R>) -> Result<(), SimulationError> {
        while let Some(command) = script.next_command()? {
            debug!(?command, "running script command");
            self.dispatch(command)?;
        }
        self.report_path_length_at_end_of_trial_phase();
        Ok(())
    }

    fn dispatch(&mut self, command: Command) -> Result<(), SimulationError> {
        match command {
            Command::PlaceAgent { x, y, heading } => {
                self.x = x;
                self.y = y;
                self.heading = heading;
            }
            Command::Goto { x, y } => {
                self.goto_x = x;
                self.goto_y = y;
                let goto_distance = (x - self.x).hypot(y - self.y);
                if goto_distance >= DISTANCE_PER_TIMESTEP {
                    self.agent.active_state = AgentState::ForcedMove;
                    while self.step()? {}
                }
            }
            Command::TriggerReward { name } => {
                self.reward_id = self.get_reward_id(&name);
                self.agent.active_state = AgentState::ReceiveReward;
                while self.step()? {}
                self.reward_id = 0;
            }
            Command::SeekReward {
                name,
                mut timestep_limit,
            } => {
                self.reward_id = self.get_reward_id(&name);
                self.agent.active_state = AgentState::InitiateNavigation;
                loop {
                    timestep_limit -= 1;
                    if timestep_limit < 0
                        || !self.step()?
                        || self.agent.model.place.output.at_goal
                    {
                        break;
                    }
                }
                let at_goal = self.agent.model.place.output.at_goal;
                let reward_cell = self.agent.model.place.reward_locations[&self.reward_id];
                let final_distance =
                    self.agent.model.place.cells[reward_cell].distance(self.x, self.y);
                info!(
                    reward = %name,
                    success = at_goal,
                    final_distance,
                    "seek-reward finished"
                );
                self.reward_id = 0;
            }
            Command::SetArena { wkt } => {
                self.arena = Arena::from_wkt(&wkt)?;
            }
            Command::SetFence { name, wkt } => {
                let fence = Arena::from_wkt(&wkt)?;
                self.fences.insert(name, fence);
            }
            Command::SetTrialPhase { color: _, title } => {
                self.report_path_length_at_end_of_trial_phase();
                self.path_length_in_current_trial_phase = 0.0;
                self.current_trial_phase = title;
            }
            // Remaining plot metadata has no headless effect.
            Command::SetTitle { .. }
            | Command::SetOrigin
            | Command::SetArenaSize { .. }
            | Command::SetScaleBars { .. }
            | Command::AddLabel { .. } => {}
        }
        Ok(())
    }

    /// Runs one timestep; returns whether the current command loop should
    /// continue.
    fn step(&mut self) -> Result<bool, SimulationError> {
        self.arena.update_sensors(
            self.x,
            self.y,
            self.agent.model.conf.sensor_range,
            &mut self.agent.model.border_sensors,
        );

        self.agent.input.x = self.x;
        self.agent.input.y = self.y;
        self.agent.input.heading = self.heading;
        self.agent.input.speed = self.speed;
        self.agent.input.goto_x = self.goto_x;
        self.agent.input.goto_y = self.goto_y;
        self.agent.input.reward_id = self.reward_id;
        self.agent.execute(&mut self.rng);

        self.heading = wrap_angle(self.agent.output.heading);
        self.speed = self.agent.output.speed;
        self.path_length_in_current_trial_phase += self.speed / STEPS_PER_SECOND;

        let (from_x, from_y) = (self.x, self.y);
        self.x += self.speed * self.heading.cos() / STEPS_PER_SECOND;
        self.y += self.speed * self.heading.sin() / STEPS_PER_SECOND;
        let (to_x, to_y) = (self.x, self.y);

        self.global_timestep += 1;

        let mut continue_loop = self.agent.active_state != AgentState::None;

        for (name, fence) in &self.fences {
            if fence.line_intersects(from_x, from_y, to_x, to_y) {
                warn!(fence = %name, "agent hit fence");
                continue_loop = false;
            }
        }

        if self.arena.line_intersects(from_x, from_y, to_x, to_y) {
            return Err(SimulationError::ArenaCollision {
                from_x,
                from_y,
                to_x,
                to_y,
            });
        }

        Ok(continue_loop)
    }

    /// Allocates reward ids sequentially from 1 on first use of a name.
    fn get_reward_id(&mut self, reward_name: &str) -> i32 {
        if let Some(&id) = self.reward_ids.get(reward_name) {
            return id;
        }
        let id = self.reward_ids.len() as i32 + 1;
        self.reward_ids.insert(reward_name.to_string(), id);
        id
    }

    fn report_path_length_at_end_of_trial_phase(&self) {
        if self.current_trial_phase.is_empty() {
            return;
        }
        info!(
            phase = %self.current_trial_phase,
            path_length = self.path_length_in_current_trial_phase,
            "path length at end of trial phase"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentPreset;
    use crate::model::{Model, ModelConf};
    use rand::SeedableRng;
    use std::io::Cursor;

    fn simulation(preset: AgentPreset, seed: u64) -> Simulation {
        let mut rng = SmallRng::seed_from_u64(seed);
        let model = Model::new(ModelConf::default(), &mut rng);
        let agent = Agent::with_preset(preset, model);
        Simulation::new(agent, SimulationConf::default(), rng)
    }

    fn run_script(simulation: &mut Simulation, script: &str) -> Result<(), SimulationError> {
        simulation.run(ScriptScanner::new(Cursor::new(script.to_string())))
    }

    #[test]
    fn test_place_agent_sets_pose_without_stepping() {
        let mut simulation = simulation(AgentPreset::Combined, 1);
        run_script(&mut simulation, "place-agent 100 -100 0").unwrap();
        assert_eq!(simulation.position(), (100.0, -100.0));
        assert_eq!(simulation.timestep(), 0);
    }

    #[test]
    fn test_reward_ids_are_sequential_from_one() {
        let mut simulation = simulation(AgentPreset::Combined, 2);
        assert_eq!(simulation.get_reward_id("A"), 1);
        assert_eq!(simulation.get_reward_id("B"), 2);
        assert_eq!(simulation.get_reward_id("A"), 1);
    }

    #[test]
    fn test_goto_below_one_step_is_a_no_op() {
        let mut simulation = simulation(AgentPreset::Combined, 3);
        run_script(&mut simulation, "goto 0.01 0").unwrap();
        assert_eq!(simulation.timestep(), 0);
    }

    #[test]
    fn test_arena_collision_is_fatal() {
        let mut simulation = simulation(AgentPreset::Combined, 4);
        let script = "set-arena MULTIPOLYGON(((1 -10, 1 10, 1.2 10, 1.2 -10, 1 -10)))\n\
                      goto 3 0";
        let error = run_script(&mut simulation, script).unwrap_err();
        assert!(matches!(error, SimulationError::ArenaCollision { .. }));
    }

    #[test]
    fn test_fence_ends_command_but_not_run() {
        let mut simulation = simulation(AgentPreset::Combined, 5);
        let script = "set-fence f MULTIPOLYGON(((1 -10, 1 10, 1.2 10, 1.2 -10, 1 -10)))\n\
                      goto 3 0\n\
                      place-agent 50 50 0";
        run_script(&mut simulation, script).unwrap();
        // The fence stopped the goto loop short of its target.
        assert_eq!(simulation.position(), (50.0, 50.0));
    }

    #[test]
    fn test_unknown_command_propagates() {
        let mut simulation = simulation(AgentPreset::Combined, 6);
        let error = run_script(&mut simulation, "teleport 1 2").unwrap_err();
        assert!(matches!(
            error,
            SimulationError::Script(ScriptError::UnknownCommand(_))
        ));
    }
}
