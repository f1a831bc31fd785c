//! Shifted weight-mask kernels over the toroidal grid sheet.
//!
//! A mask kernel stores one weight profile for the whole sheet and a
//! per-neuron shift of that profile. During an update, the contribution for
//! an efferent neuron is the dot product of the afferent sheet with the
//! profile translated to the neuron's shift. Many efferent neurons share a
//! shift, so sums are cached per shift within a single update.

use crate::numeric::torus_fold;
use crate::params::SHEET_SIZE;

/// Squared toroidal distance between sheet coordinate offsets.
#[must_use]
pub fn torus_distance_squared(dx: usize, dy: usize) -> f32 {
    let dx = torus_fold(dx, SHEET_SIZE);
    let dy = torus_fold(dy, SHEET_SIZE);
    (dx * dx + dy * dy) as f32
}

/// A weight profile applied at a per-neuron shift over the sheet.
#[derive(Debug, Clone)]
pub struct ShiftedMask {
    /// Weight profile tiled 2×2 so any shifted window is a contiguous view.
    tiled: Vec<f32>,
    /// Profile origin on the sheet for each efferent neuron.
    shifts: Vec<(usize, usize)>,
    cached_sums: Vec<f32>,
    cache_valid: Vec<bool>,
}

impl ShiftedMask {
    /// Builds the kernel from a weight function over sheet offsets and the
    /// per-efferent-neuron shift table.
    ///
    /// The weight function receives raw offsets in `[0, SHEET_SIZE)` per
    /// axis; callers fold them onto the torus metric as needed.
    #[must_use]
    pub fn new(weight: impl Fn(usize, usize) -> f32, shifts: Vec<(usize, usize)>) -> Self {
        let w = SHEET_SIZE;
        let mut tiled = vec![0.0; (2 * w) * (2 * w)];
        for y in 0..w {
            for x in 0..w {
                let value = weight(x, y);
                tiled[y * 2 * w + x] = value;
                tiled[y * 2 * w + (x + w)] = value;
                tiled[(y + w) * 2 * w + x] = value;
                tiled[(y + w) * 2 * w + (x + w)] = value;
            }
        }
        Self {
            tiled,
            shifts,
            cached_sums: vec![0.0; w * w],
            cache_valid: vec![false; w * w],
        }
    }

    /// Accumulates the masked sums into `accumulator`.
    ///
    /// `gate` selects which efferent neurons participate this update;
    /// skipped neurons receive no contribution and compute no sum.
    pub fn accumulate(
        &mut self,
        afferent: &[f32],
        accumulator: &mut [f32],
        mut gate: impl FnMut(usize) -> bool,
    ) {
        debug_assert_eq!(afferent.len(), SHEET_SIZE * SHEET_SIZE);
        debug_assert_eq!(accumulator.len(), self.shifts.len());
        self.cache_valid.fill(false);

        for (neuron, &(shift_x, shift_y)) in self.shifts.iter().enumerate() {
            if !gate(neuron) {
                continue;
            }
            let cache_index = shift_y * SHEET_SIZE + shift_x;
            if self.cache_valid[cache_index] {
                accumulator[neuron] += self.cached_sums[cache_index];
                continue;
            }
            let sum = self.masked_sum(afferent, shift_x, shift_y);
            accumulator[neuron] += sum;
            self.cached_sums[cache_index] = sum;
            self.cache_valid[cache_index] = true;
        }
    }

    fn masked_sum(&self, afferent: &[f32], shift_x: usize, shift_y: usize) -> f32 {
        let w = SHEET_SIZE;
        // Offsetting into the tiled profile by (w - shift) aligns weight
        // (0, 0) with the afferent neuron at the shift origin.
        let base_x = w - shift_x;
        let base_y = w - shift_y;
        let mut sum = 0.0;
        for y in 0..w {
            let afferent_row = &afferent[y * w..(y + 1) * w];
            let weight_row_start = (base_y + y) * 2 * w + base_x;
            let weight_row = &self.tiled[weight_row_start..weight_row_start + w];
            for x in 0..w {
                sum += afferent_row[x] * weight_row[x];
            }
        }
        sum
    }
}
