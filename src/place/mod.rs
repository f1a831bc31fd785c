//! Place-cell map and replay machinery.

pub mod graph;

pub use graph::{GraphInput, GraphOutput, PlaceCell, PlaceGraph, ReplayTarget};
