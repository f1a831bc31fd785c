//! Neural building blocks: double-buffered layers, shifted-mask kernels,
//! grid modules, grid-difference layers and motor populations.

pub mod diff;
pub mod grid;
pub mod layer;
pub mod mask;
pub mod motor;

pub use diff::GridDiff;
pub use grid::{AttractorSheet, BumpTracker, ConvolvedSheet, GainMode, GridModule};
pub use layer::Layer;
pub use mask::ShiftedMask;
pub use motor::MotorNetwork;
