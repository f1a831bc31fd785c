//! Grid-difference layer.
//!
//! Samples candidate (x, y, direction) anchors over the sheet and scores,
//! for each anchor, how well translating the moving readout by a fixed
//! offset along the sampled direction aligns it with the fixed readout. The
//! per-direction sums of these scores are the evidence the motor decoder
//! integrates into a goal vector.

use rand::Rng;

use crate::network::grid::{coords_to_index, sheet_beta};
use crate::network::layer::Layer;
use crate::network::mask::{torus_distance_squared, ShiftedMask};
use crate::numeric::wrap_index;
use crate::params::SHEET_SIZE;

/// Bias subtracted before the rectifier in the simplified variant.
const SIMPLIFIED_BIAS: f32 = 0.6;

#[derive(Debug, Clone)]
enum DiffKernel {
    /// Full variant: blurred mask reads of both readouts.
    Mask {
        current: ShiftedMask,
        target: ShiftedMask,
    },
    /// Simplified variant: single-neuron reads at the anchor points.
    Simplified {
        current_indices: Vec<usize>,
        target_indices: Vec<usize>,
    },
}

/// Alignment-scoring layer between the moving and fixed readouts of one
/// grid module.
#[derive(Debug, Clone)]
pub struct GridDiff {
    pub layer: Layer,
    pub simplified: bool,
    pub direction_samples: usize,
    pub xy_samples: usize,
    pub offset: i32,
    kernel: DiffKernel,
}

impl GridDiff {
    #[must_use]
    pub fn new(
        simplified: bool,
        direction_samples: usize,
        xy_samples: usize,
        offset: i32,
        rng: &mut impl Rng,
    ) -> Self {
        let size = direction_samples * xy_samples * xy_samples;
        let mut diff = Self {
            layer: Layer::new(size, rng),
            simplified,
            direction_samples,
            xy_samples,
            offset,
            kernel: DiffKernel::Simplified {
                current_indices: Vec::new(),
                target_indices: Vec::new(),
            },
        };
        diff.kernel = if simplified {
            DiffKernel::Simplified {
                current_indices: (0..size).map(|i| diff.anchor_index(i, 0)).collect(),
                target_indices: (0..size).map(|i| diff.anchor_index(i, offset)).collect(),
            }
        } else {
            let beta = sheet_beta();
            let current_weight = move |x: usize, y: usize| {
                0.25 * ((-beta * torus_distance_squared(x, y)).exp() - 1.0)
            };
            let target_weight =
                move |x: usize, y: usize| (-beta * torus_distance_squared(x, y)).exp();
            let current_shifts = (0..size).map(|i| diff.anchor(i, 0)).collect();
            let target_shifts = (0..size).map(|i| diff.anchor(i, offset)).collect();
            DiffKernel::Mask {
                current: ShiftedMask::new(current_weight, current_shifts),
                target: ShiftedMask::new(target_weight, target_shifts),
            }
        };
        diff
    }

    /// Direction bin of a neuron index.
    #[must_use]
    pub fn direction_sample(&self, index: usize) -> usize {
        index % self.direction_samples
    }

    /// Sampled x slot of a neuron index.
    #[must_use]
    pub fn x_sample(&self, index: usize) -> usize {
        (index / self.direction_samples) % self.xy_samples
    }

    /// Sampled y slot of a neuron index.
    #[must_use]
    pub fn y_sample(&self, index: usize) -> usize {
        (index / self.direction_samples) / self.xy_samples
    }

    /// Direction angle of a neuron index, in radians.
    #[must_use]
    pub fn direction(&self, index: usize) -> f64 {
        self.direction_sample(index) as f64 * 2.0 * std::f64::consts::PI
            / self.direction_samples as f64
    }

    /// Sheet x coordinate of a neuron's sampled anchor.
    #[must_use]
    pub fn x(&self, index: usize) -> usize {
        self.x_sample(index) * SHEET_SIZE / self.xy_samples
    }

    /// Sheet y coordinate of a neuron's sampled anchor.
    #[must_use]
    pub fn y(&self, index: usize) -> usize {
        self.y_sample(index) * SHEET_SIZE / self.xy_samples
    }

    /// Neuron index of a (direction, x, y) sample triple.
    #[must_use]
    pub fn neuron_index(&self, direction: usize, x: usize, y: usize) -> usize {
        (y * self.xy_samples + x) * self.direction_samples + direction
    }

    /// The anchor of a neuron displaced by `offset` along its direction,
    /// rounded and wrapped onto the sheet.
    fn anchor(&self, index: usize, offset: i32) -> (usize, usize) {
        let direction = self.direction(index);
        let x = (self.x(index) as f64 + f64::from(offset) * direction.cos()).round() as i32;
        let y = (self.y(index) as f64 + f64::from(offset) * direction.sin()).round() as i32;
        (
            wrap_index(x, SHEET_SIZE as i32),
            wrap_index(y, SHEET_SIZE as i32),
        )
    }

    fn anchor_index(&self, index: usize, offset: i32) -> usize {
        let (x, y) = self.anchor(index, offset);
        coords_to_index(x, y)
    }

    /// Scores every anchor against the given moving and fixed readouts.
    pub fn update(&mut self, moving: &[f32], fixed: &[f32]) {
        self.layer.clear_inputs();
        match &mut self.kernel {
            DiffKernel::Mask { current, target } => {
                current.accumulate(moving, self.layer.inputs_mut(), |_| true);
                target.accumulate(fixed, self.layer.inputs_mut(), |_| true);
            }
            DiffKernel::Simplified {
                current_indices,
                target_indices,
            } => {
                let inputs = self.layer.inputs_mut();
                for (neuron, &source) in current_indices.iter().enumerate() {
                    inputs[neuron] += moving[source];
                }
                for (neuron, &source) in target_indices.iter().enumerate() {
                    inputs[neuron] += fixed[source];
                }
            }
        }

        let bias = if self.simplified { SIMPLIFIED_BIAS } else { 0.0 };
        let (_, inputs, next) = self.layer.buffers_mut();
        for i in 0..next.len() {
            next[i] = (inputs[i] - bias).max(0.0);
        }
    }

    pub fn commit(&mut self) {
        self.layer.commit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn test_diff(simplified: bool) -> GridDiff {
        let mut rng = SmallRng::seed_from_u64(17);
        GridDiff::new(simplified, 28, 9, 7, &mut rng)
    }

    #[test]
    fn test_index_geometry_round_trip() {
        let diff = test_diff(true);
        for index in [0, 27, 28, 251, 2267] {
            let direction = diff.direction_sample(index);
            let x = diff.x_sample(index);
            let y = diff.y_sample(index);
            assert_eq!(diff.neuron_index(direction, x, y), index);
        }
        assert_eq!(diff.layer.size(), 28 * 9 * 9);
    }

    #[test]
    fn test_anchor_positions_cover_sheet() {
        let diff = test_diff(true);
        // Samples are evenly spread: slot k sits at k * SHEET_SIZE / 9.
        assert_eq!(diff.x(diff.neuron_index(0, 0, 0)), 0);
        assert_eq!(diff.x(diff.neuron_index(0, 8, 0)), 8 * SHEET_SIZE / 9);
        assert_eq!(diff.y(diff.neuron_index(0, 0, 8)), 8 * SHEET_SIZE / 9);
    }

    #[test]
    fn test_target_anchor_is_offset_along_direction() {
        let diff = test_diff(true);
        // Direction bin 0 points along +x, so the target anchor for the
        // origin sample sits `offset` columns to the east.
        let index = diff.neuron_index(0, 0, 0);
        assert_eq!(diff.anchor(index, 7), (7, 0));
        // A quarter turn points along +y.
        let quarter = diff.neuron_index(7, 0, 0);
        assert_eq!(diff.anchor(quarter, 7), (0, 7));
    }

    #[test]
    fn test_update_rectifies() {
        let mut diff = test_diff(false);
        let moving = vec![0.5; SHEET_SIZE * SHEET_SIZE];
        let fixed = vec![0.0; SHEET_SIZE * SHEET_SIZE];
        // With an empty target, the negative-ring current mask drives every
        // score below zero and the rectifier clamps them all.
        diff.update(&moving, &fixed);
        diff.commit();
        for &value in diff.layer.current() {
            assert!(value >= 0.0);
            assert!(value.is_finite());
        }
    }

    #[test]
    fn test_simplified_bias_suppresses_weak_input() {
        let mut diff = test_diff(true);
        let moving = vec![0.2; SHEET_SIZE * SHEET_SIZE];
        let fixed = vec![0.2; SHEET_SIZE * SHEET_SIZE];
        // Summed single-neuron reads total 0.4, under the 0.6 bias.
        diff.update(&moving, &fixed);
        diff.commit();
        for &value in diff.layer.current() {
            assert_eq!(value, 0.0);
        }

        let strong = vec![0.5; SHEET_SIZE * SHEET_SIZE];
        diff.update(&strong, &strong);
        diff.commit();
        for &value in diff.layer.current() {
            assert!((value - 0.4).abs() < 1e-6);
        }
    }
}
