//! The learned place graph.
//!
//! Place cells discretize visited space; symmetric integer-strength synapses
//! record traversals between neighboring cells; breadth-first search over the
//! synapses moves a virtual replay subgoal along the shortest path between
//! the agent and a remembered reward. Each cell carries a snapshot of every
//! grid module's readout so that replay can re-target the grid decoder.

use std::collections::{HashMap, VecDeque};

use crate::network::grid::GridModule;
use crate::params::PLACE_CONNECTION_STRENGTH;

/// Which end of the replay path an instruction refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayTarget {
    /// Leave the replay cell where it is.
    Maintain,
    /// The remembered reward cell.
    Goal,
    /// The cell currently hosting the agent.
    Agent,
}

/// Per-timestep instructions to the place graph.
#[derive(Debug, Clone)]
pub struct GraphInput {
    pub x: f64,
    pub y: f64,
    pub reward_id: i32,
    pub save_reward: bool,
    pub form_place_cells: bool,
    pub weaken_synapse: bool,
    pub reset_replay_to: ReplayTarget,
    pub propagate_replay_towards: ReplayTarget,
}

impl Default for GraphInput {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            reward_id: 0,
            save_reward: false,
            form_place_cells: true,
            weaken_synapse: false,
            reset_replay_to: ReplayTarget::Maintain,
            propagate_replay_towards: ReplayTarget::Maintain,
        }
    }
}

/// Per-timestep observations from the place graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphOutput {
    pub at_goal: bool,
    pub at_subgoal: bool,
    pub subgoal_visible: bool,
    pub subgoal_direction: f64,
    pub replay_terminated: bool,
}

/// A discretized location with a captured grid-state fingerprint.
#[derive(Debug, Clone)]
pub struct PlaceCell {
    pub index: usize,
    pub x: f64,
    pub y: f64,
    /// Symmetric adjacency: (neighbor index, strictly positive strength).
    pub neighbors: Vec<(usize, i32)>,
    /// One readout snapshot per grid module.
    pub grid_state: Vec<Vec<f32>>,
    // Transient search fields, reset before every breadth-first search.
    bfs_predecessor: Option<usize>,
    replay_source: Option<usize>,
}

impl PlaceCell {
    fn new(index: usize, x: f64, y: f64) -> Self {
        Self {
            index,
            x,
            y,
            neighbors: Vec::new(),
            grid_state: Vec::new(),
            bfs_predecessor: None,
            replay_source: None,
        }
    }

    /// Euclidean distance from this cell to a point.
    #[must_use]
    pub fn distance(&self, x: f64, y: f64) -> f64 {
        (self.x - x).hypot(self.y - y)
    }

    /// Direction from a point toward this cell.
    #[must_use]
    pub fn direction(&self, x: f64, y: f64) -> f64 {
        (self.y - y).atan2(self.x - x)
    }

    fn weaken_neighbor(&mut self, neighbor: usize) {
        if let Some(position) = self.neighbors.iter().position(|&(index, _)| index == neighbor) {
            self.neighbors[position].1 -= 1;
            if self.neighbors[position].1 <= 0 {
                self.neighbors.remove(position);
            }
        }
    }
}

/// The place-cell map with its reward memory and replay pointer.
#[derive(Debug, Clone)]
pub struct PlaceGraph {
    pub input: GraphInput,
    pub output: GraphOutput,
    pub cells: Vec<PlaceCell>,
    pub reward_locations: HashMap<i32, usize>,
    pub agent_cell: Option<usize>,
    pub reward_cell: Option<usize>,
    pub replay_cell: Option<usize>,
    pub place_cell_radius: f64,
}

impl PlaceGraph {
    #[must_use]
    pub fn new(place_cell_radius: f64) -> Self {
        Self {
            input: GraphInput::default(),
            output: GraphOutput::default(),
            cells: Vec::new(),
            reward_locations: HashMap::new(),
            agent_cell: None,
            reward_cell: None,
            replay_cell: None,
            place_cell_radius,
        }
    }

    /// One place-graph timestep: visit, connect, reward saving, synapse
    /// weakening, replay update, and output refresh.
    pub fn update(&mut self, modules: &mut [GridModule]) {
        let closest = self.visit(modules);
        self.connect(closest);
        self.agent_cell = closest;

        if self.input.save_reward {
            assert!(self.input.reward_id > 0, "saving a reward requires a reward id");
            let agent_cell = self.agent_cell.expect("no place cell at reward location");
            self.reward_locations.insert(self.input.reward_id, agent_cell);
        }

        if self.input.weaken_synapse {
            self.weaken_replayed_synapse();
        }

        self.output.replay_terminated = false;
        let perform_replay_update = self.input.reset_replay_to != ReplayTarget::Maintain
            || self.input.propagate_replay_towards != ReplayTarget::Maintain;
        if perform_replay_update {
            self.update_replay(modules);
        }

        self.refresh_outputs();
    }

    /// Retrieves the place cell closest to the current position, forming a
    /// new one when allowed and the closest is farther than 2R (or absent).
    fn visit(&mut self, modules: &[GridModule]) -> Option<usize> {
        let (x, y) = (self.input.x, self.input.y);
        let mut closest: Option<(usize, f64)> = None;
        for cell in &self.cells {
            let distance = cell.distance(x, y);
            if closest.is_none_or(|(_, best)| distance < best) {
                closest = Some((cell.index, distance));
            }
        }

        let too_far = closest.is_none_or(|(_, distance)| distance > 2.0 * self.place_cell_radius);
        if self.input.form_place_cells && too_far {
            let index = self.cells.len();
            let mut cell = PlaceCell::new(index, x, y);
            cell.grid_state = modules
                .iter()
                .map(|module| module.convolved.layer.current().to_vec())
                .collect();
            self.cells.push(cell);
            return Some(index);
        }
        closest.map(|(index, _)| index)
    }

    /// Ensures a symmetric synapse between the previous and the new agent
    /// cell, without duplicating existing edges.
    fn connect(&mut self, closest: Option<usize>) {
        let (Some(previous), Some(current)) = (self.agent_cell, closest) else {
            return;
        };
        if previous == current {
            return;
        }
        let already_connected = self.cells[current]
            .neighbors
            .iter()
            .any(|&(neighbor, _)| neighbor == previous);
        if !already_connected {
            self.cells[current]
                .neighbors
                .push((previous, PLACE_CONNECTION_STRENGTH));
            self.cells[previous]
                .neighbors
                .push((current, PLACE_CONNECTION_STRENGTH));
        }
    }

    /// Weakens the synapse the replay pointer last crossed, on both ends.
    fn weaken_replayed_synapse(&mut self) {
        let Some(replay) = self.replay_cell else {
            return;
        };
        let Some(source) = self.cells[replay].replay_source else {
            return;
        };
        self.cells[replay].weaken_neighbor(source);
        self.cells[source].weaken_neighbor(replay);
    }

    fn update_replay(&mut self, modules: &mut [GridModule]) {
        assert!(self.input.reward_id > 0, "replay requires a reward id");
        let reward_cell = *self
            .reward_locations
            .get(&self.input.reward_id)
            .expect("replay requested before the reward location was learned");
        self.reward_cell = Some(reward_cell);

        match self.input.reset_replay_to {
            ReplayTarget::Maintain => {}
            ReplayTarget::Goal => self.replay_cell = Some(reward_cell),
            ReplayTarget::Agent => self.replay_cell = self.agent_cell,
        }

        if self.input.propagate_replay_towards != ReplayTarget::Maintain {
            // The search starts from the node the replay should move
            // towards, so that predecessor pointers lead the replay there.
            let start = match self.input.propagate_replay_towards {
                ReplayTarget::Goal => reward_cell,
                _ => self.agent_cell.expect("replay propagation without an agent cell"),
            };
            self.breadth_first_search(start);

            let replay = self.replay_cell.expect("replay propagation without a replay cell");
            if let Some(predecessor) = self.cells[replay].bfs_predecessor {
                self.cells[predecessor].replay_source = Some(replay);
                self.replay_cell = Some(predecessor);
                // The replay terminates once it reaches the search root,
                // which is its own predecessor.
                self.output.replay_terminated =
                    self.cells[predecessor].bfs_predecessor == Some(predecessor);
            } else {
                // The search never reached the replay cell.
                self.output.replay_terminated = true;
            }
        }

        let replay = self.replay_cell.expect("replay update without a replay cell");
        self.transfer_grid_state(replay, modules);
    }

    fn breadth_first_search(&mut self, start: usize) {
        for cell in &mut self.cells {
            cell.bfs_predecessor = None;
            cell.replay_source = None;
        }
        self.cells[start].bfs_predecessor = Some(start);
        let mut fifo = VecDeque::new();
        fifo.push_back(start);
        while let Some(current) = fifo.pop_front() {
            let neighbors: Vec<usize> = self.cells[current]
                .neighbors
                .iter()
                .map(|&(neighbor, _)| neighbor)
                .collect();
            for neighbor in neighbors {
                if self.cells[neighbor].bfs_predecessor.is_none() {
                    self.cells[neighbor].bfs_predecessor = Some(current);
                    fifo.push_back(neighbor);
                }
            }
        }
    }

    /// Writes a cell's snapshots into the fixed readout of every module.
    fn transfer_grid_state(&self, cell: usize, modules: &mut [GridModule]) {
        let snapshots = &self.cells[cell].grid_state;
        assert_eq!(
            snapshots.len(),
            modules.len(),
            "snapshot count does not match module count"
        );
        for (module, snapshot) in modules.iter_mut().zip(snapshots) {
            module.fixed.copy_from_slice(snapshot);
        }
    }

    fn refresh_outputs(&mut self) {
        let (x, y) = (self.input.x, self.input.y);
        let radius = self.place_cell_radius;
        self.output.at_goal = self
            .reward_cell
            .is_some_and(|cell| self.cells[cell].distance(x, y) <= radius);
        self.output.at_subgoal = self
            .replay_cell
            .is_some_and(|cell| self.cells[cell].distance(x, y) <= radius);
        self.output.subgoal_visible = self
            .replay_cell
            .is_some_and(|cell| self.cells[cell].distance(x, y) <= 3.0 * radius);
        self.output.subgoal_direction = if self.output.subgoal_visible {
            let cell = self.replay_cell.expect("visible subgoal without a replay cell");
            self.cells[cell].direction(x, y)
        } else {
            0.0
        };
    }

    /// The synapse strength between two cells, if they are connected.
    #[must_use]
    pub fn edge_strength(&self, a: usize, b: usize) -> Option<i32> {
        self.cells[a]
            .neighbors
            .iter()
            .find(|&&(neighbor, _)| neighbor == b)
            .map(|&(_, strength)| strength)
    }

    /// The source cell the replay pointer last moved away from, if any.
    #[must_use]
    pub fn replay_source_of(&self, cell: usize) -> Option<usize> {
        self.cells[cell].replay_source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::grid::GainMode;
    use crate::params::MAX_GAIN;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn graph() -> PlaceGraph {
        PlaceGraph::new(7.0)
    }

    fn no_modules() -> Vec<GridModule> {
        Vec::new()
    }

    /// Walks the graph through a sequence of positions.
    fn walk(graph: &mut PlaceGraph, modules: &mut [GridModule], positions: &[(f64, f64)]) {
        for &(x, y) in positions {
            graph.input.x = x;
            graph.input.y = y;
            graph.input.save_reward = false;
            graph.input.weaken_synapse = false;
            graph.input.reset_replay_to = ReplayTarget::Maintain;
            graph.input.propagate_replay_towards = ReplayTarget::Maintain;
            graph.update(modules);
        }
    }

    #[test]
    fn test_first_visit_forms_a_cell() {
        let mut graph = graph();
        let mut modules = no_modules();
        walk(&mut graph, &mut modules, &[(0.0, 0.0)]);
        assert_eq!(graph.cells.len(), 1);
        assert_eq!(graph.agent_cell, Some(0));
    }

    #[test]
    fn test_cells_form_beyond_twice_the_radius() {
        let mut graph = graph();
        let mut modules = no_modules();
        // 2R = 14: a step of 13 stays in the first field, 15 leaves it.
        walk(&mut graph, &mut modules, &[(0.0, 0.0), (13.0, 0.0)]);
        assert_eq!(graph.cells.len(), 1);
        walk(&mut graph, &mut modules, &[(15.0, 0.0)]);
        assert_eq!(graph.cells.len(), 2);
        assert_eq!(graph.agent_cell, Some(1));
    }

    #[test]
    fn test_formation_disabled_keeps_graph_empty() {
        let mut graph = graph();
        graph.input.form_place_cells = false;
        let mut modules = no_modules();
        walk(&mut graph, &mut modules, &[(0.0, 0.0), (50.0, 0.0)]);
        assert!(graph.cells.is_empty());
        assert_eq!(graph.agent_cell, None);
    }

    #[test]
    fn test_edges_are_symmetric_with_equal_strength() {
        let mut graph = graph();
        let mut modules = no_modules();
        walk(
            &mut graph,
            &mut modules,
            &[(0.0, 0.0), (15.0, 0.0), (30.0, 0.0), (15.0, 0.0)],
        );
        for cell in &graph.cells {
            for &(neighbor, strength) in &cell.neighbors {
                assert!(strength > 0);
                assert_eq!(graph.edge_strength(neighbor, cell.index), Some(strength));
            }
        }
        // Moving back and forth must not duplicate the edge.
        assert_eq!(graph.cells[1].neighbors.len(), 2);
    }

    #[test]
    fn test_agent_cell_tracks_nearest() {
        let mut graph = graph();
        let mut modules = no_modules();
        walk(
            &mut graph,
            &mut modules,
            &[(0.0, 0.0), (15.0, 0.0), (1.0, 0.0)],
        );
        assert_eq!(graph.agent_cell, Some(0));
    }

    #[test]
    fn test_snapshot_dimensions_match_modules() {
        let mut rng = SmallRng::seed_from_u64(77);
        let mut modules = vec![
            GridModule::new(MAX_GAIN, GainMode::Velocity, &mut rng),
            GridModule::new(MAX_GAIN / 1.5, GainMode::Velocity, &mut rng),
        ];
        let mut graph = graph();
        walk(&mut graph, &mut modules, &[(0.0, 0.0)]);
        let cell = &graph.cells[0];
        assert_eq!(cell.grid_state.len(), modules.len());
        for snapshot in &cell.grid_state {
            assert_eq!(snapshot.len(), crate::params::SHEET_SIZE.pow(2));
        }
    }

    #[test]
    fn test_snapshot_round_trip_restores_fixed_readout() {
        let mut rng = SmallRng::seed_from_u64(78);
        let mut modules = vec![GridModule::new(MAX_GAIN, GainMode::Velocity, &mut rng)];
        for _ in 0..10 {
            modules[0].step(&mut rng);
        }
        let captured = modules[0].convolved.layer.current().to_vec();

        let mut graph = graph();
        graph.input.reward_id = 1;
        graph.input.save_reward = true;
        graph.input.x = 0.0;
        graph.input.y = 0.0;
        graph.update(&mut modules);

        // Let the module drift, then restore via a replay reset to goal.
        modules[0].set_velocity(20.0, 0.0);
        for _ in 0..10 {
            modules[0].step(&mut rng);
        }
        graph.input.save_reward = false;
        graph.input.reset_replay_to = ReplayTarget::Goal;
        graph.update(&mut modules);

        assert_eq!(modules[0].fixed, captured);
        assert_eq!(graph.replay_cell, graph.reward_cell);
    }

    /// Builds the three-cell chain A(0) - B(1) - C(2) along the x axis.
    fn chain() -> (PlaceGraph, Vec<GridModule>) {
        let mut graph = graph();
        let mut modules = no_modules();
        walk(
            &mut graph,
            &mut modules,
            &[(0.0, 0.0), (15.0, 0.0), (30.0, 0.0)],
        );
        // Reward at C.
        graph.input.reward_id = 1;
        graph.input.save_reward = true;
        graph.update(&mut modules);
        graph.input.save_reward = false;
        // Agent back at A.
        walk(&mut graph, &mut modules, &[(15.0, 0.0), (0.0, 0.0)]);
        (graph, modules)
    }

    #[test]
    fn test_replay_propagates_one_hop_towards_agent() {
        let (mut graph, mut modules) = chain();
        graph.input.reward_id = 1;
        graph.input.reset_replay_to = ReplayTarget::Goal;
        graph.update(&mut modules);
        assert_eq!(graph.replay_cell, Some(2));
        assert!(!graph.output.replay_terminated);

        graph.input.reset_replay_to = ReplayTarget::Maintain;
        graph.input.propagate_replay_towards = ReplayTarget::Agent;
        graph.update(&mut modules);
        assert_eq!(graph.replay_cell, Some(1));
        assert_eq!(graph.replay_source_of(1), Some(2));
        assert!(!graph.output.replay_terminated);

        graph.update(&mut modules);
        assert_eq!(graph.replay_cell, Some(0));
        assert!(graph.output.replay_terminated);
    }

    #[test]
    fn test_replay_terminates_when_search_cannot_reach() {
        let (mut graph, mut modules) = chain();
        graph.input.reward_id = 1;
        graph.input.reset_replay_to = ReplayTarget::Goal;
        graph.update(&mut modules);

        // Cut the graph between B and C, stranding the replay cell.
        graph.cells[1].neighbors.retain(|&(n, _)| n != 2);
        graph.cells[2].neighbors.retain(|&(n, _)| n != 1);

        graph.input.reset_replay_to = ReplayTarget::Maintain;
        graph.input.propagate_replay_towards = ReplayTarget::Agent;
        graph.update(&mut modules);
        assert!(graph.output.replay_terminated);
        assert_eq!(graph.replay_cell, Some(2));
    }

    #[test]
    fn test_weakening_removes_edge_after_two_decrements() {
        let (mut graph, mut modules) = chain();
        graph.input.reward_id = 1;
        graph.input.reset_replay_to = ReplayTarget::Goal;
        graph.update(&mut modules);
        graph.input.reset_replay_to = ReplayTarget::Maintain;
        graph.input.propagate_replay_towards = ReplayTarget::Agent;
        graph.update(&mut modules);
        // Replay sits at B having crossed C-B; weaken that synapse twice.
        graph.input.propagate_replay_towards = ReplayTarget::Maintain;
        graph.input.weaken_synapse = true;
        graph.update(&mut modules);
        assert_eq!(graph.edge_strength(1, 2), Some(PLACE_CONNECTION_STRENGTH - 1));
        assert_eq!(graph.edge_strength(2, 1), Some(PLACE_CONNECTION_STRENGTH - 1));

        graph.update(&mut modules);
        assert_eq!(graph.edge_strength(1, 2), None);
        assert_eq!(graph.edge_strength(2, 1), None);
    }

    #[test]
    fn test_goal_and_subgoal_outputs() {
        let (mut graph, mut modules) = chain();
        graph.input.reward_id = 1;
        graph.input.reset_replay_to = ReplayTarget::Goal;
        graph.update(&mut modules);

        // Agent is at A = (0, 0); the subgoal C = (30, 0) is out of sight.
        assert!(!graph.output.at_goal);
        assert!(!graph.output.at_subgoal);
        assert!(!graph.output.subgoal_visible);
        assert_eq!(graph.output.subgoal_direction, 0.0);

        // From (10, 0) the subgoal is within 3R = 21 and dead ahead.
        graph.input.x = 10.0;
        graph.input.reset_replay_to = ReplayTarget::Maintain;
        graph.update(&mut modules);
        assert!(graph.output.subgoal_visible);
        assert!(graph.output.subgoal_direction.abs() < 1e-9);

        // Standing on C reaches both goal and subgoal.
        graph.input.x = 30.0;
        graph.update(&mut modules);
        assert!(graph.output.at_goal);
        assert!(graph.output.at_subgoal);
    }
}
