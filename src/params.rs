//! Simulation constants.

/// Side length of each toroidal grid sheet (neurons per axis).
pub const SHEET_SIZE: usize = 40;

/// Highest velocity the path integrator is tuned for, in cm/s.
pub const MAX_INTEGRATOR_SPEED: f64 = 120.0;
/// Running speed of the simulated animal, in cm/s.
pub const FIXED_SPEED: f64 = 20.0;
/// Largest admissible module gain; also the Poisson-gating normalizer.
pub const MAX_GAIN: f32 = (MAX_INTEGRATOR_SPEED / FIXED_SPEED * 0.01) as f32;

/// Coupling between velocity input and attractor drive.
pub const VELOCITY_COUPLING: f32 = 0.10315;

/// Radius (in neurons) of the disc used to track the activity bump.
pub const BUMP_TRACKER_RADIUS: i32 = 5;

/// Timesteps to run each attractor sheet before the simulation starts.
pub const SETTLE_STEPS: usize = 1000;

/// Simulated timesteps per second.
pub const STEPS_PER_SECOND: f64 = 1000.0;
/// Ground-truth distance covered in one timestep at `FIXED_SPEED`.
pub const DISTANCE_PER_TIMESTEP: f64 = FIXED_SPEED / STEPS_PER_SECOND;

/// Initial strength of a newly formed place-cell synapse.
pub const PLACE_CONNECTION_STRENGTH: i32 = 2;
