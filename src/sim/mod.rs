//! Simulation driver: arena geometry, script parsing and the run loop.

pub mod arena;
pub mod runner;
pub mod script;

pub use arena::{Arena, ArenaError};
pub use runner::{Simulation, SimulationConf, SimulationError};
pub use script::{Command, ScriptError, ScriptScanner};
