//! Integration tests for place-graph learning driven through the full
//! simulation loop.

use gridnav::agent::{Agent, AgentPreset};
use gridnav::model::{Model, ModelConf};
use gridnav::sim::{ScriptScanner, Simulation, SimulationConf};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::io::Cursor;

fn run(preset: AgentPreset, field_size: f64, script: &str, seed: u64) -> Simulation {
    let mut rng = SmallRng::seed_from_u64(seed);
    let conf = ModelConf {
        module_count: 1,
        place_cell_radius: field_size,
        ..ModelConf::default()
    };
    let model = Model::new(conf, &mut rng);
    let agent = Agent::with_preset(preset, model);
    let mut simulation = Simulation::new(agent, SimulationConf::default(), rng);
    simulation
        .run(ScriptScanner::new(Cursor::new(script.to_string())))
        .expect("script failed");
    simulation
}

#[test]
fn test_place_cells_form_and_connect_along_the_path() {
    // Moving from the origin out to x = 15 exceeds twice the field radius,
    // so a second cell must form and connect to the first.
    let script = "goto 0.5 0\n\
                  place-agent 15 0 0\n\
                  goto 15.5 0\n";
    let simulation = run(AgentPreset::Combined, 7.0, script, 1);
    let place = &simulation.agent().model.place;

    assert!(place.cells.len() >= 2, "expected at least two place cells");
    let strength = place.edge_strength(0, 1).expect("cells 0 and 1 not connected");
    assert!(strength > 0);
    assert_eq!(place.edge_strength(1, 0), Some(strength));
}

#[test]
fn test_all_edges_remain_symmetric_and_positive() {
    let script = "goto 0.5 0\n\
                  place-agent 15 0 0\n\
                  goto 15.5 0\n\
                  place-agent 15 15 0\n\
                  goto 15 15.5\n\
                  place-agent 0 0 0\n\
                  goto 0.5 0\n";
    let simulation = run(AgentPreset::Combined, 7.0, script, 2);
    let place = &simulation.agent().model.place;

    assert!(place.cells.len() >= 3);
    for cell in &place.cells {
        for &(neighbor, strength) in &cell.neighbors {
            assert!(strength > 0);
            assert_eq!(place.edge_strength(neighbor, cell.index), Some(strength));
        }
    }
}

#[test]
fn test_agent_cell_is_nearest_after_revisit() {
    let script = "goto 0.5 0\n\
                  place-agent 15 0 0\n\
                  goto 15.5 0\n\
                  place-agent 1 0 0\n\
                  goto 1.5 0\n";
    let simulation = run(AgentPreset::Combined, 7.0, script, 3);
    let place = &simulation.agent().model.place;
    let (x, y) = simulation.position();

    let agent_cell = place.agent_cell.expect("no agent cell");
    let agent_distance = place.cells[agent_cell].distance(x, y);
    for cell in &place.cells {
        assert!(agent_distance <= cell.distance(x, y) + 1e-9);
    }
}

#[test]
fn test_deflect_preset_forms_no_place_cells() {
    let script = "goto 0.5 0\nplace-agent 20 0 0\ngoto 20.5 0\n";
    let simulation = run(AgentPreset::Deflect, 7.0, script, 4);
    assert!(simulation.agent().model.place.cells.is_empty());
}

#[test]
fn test_smaller_field_size_forms_more_cells() {
    let script = "goto 4.5 0\n";
    let small = run(AgentPreset::Combined, 2.0, script, 5);
    let large = run(AgentPreset::Combined, 7.0, script, 5);
    assert!(
        small.agent().model.place.cells.len() > large.agent().model.place.cells.len(),
        "field radius 2 should tile the path more densely than radius 7"
    );
}
