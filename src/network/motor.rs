//! Directional motor populations.
//!
//! A motor network is a ring of neurons, each tagged with an equally spaced
//! angle. Its population vector (the sum of activation × unit(angle)) gives
//! the decoded direction and strength. Normalize-mode networks overwrite
//! their activity with a wrapped Gaussian around a desired direction, which
//! is how the model re-expresses a chosen heading before border inhibition.

use std::f64::consts::PI;

use rand::Rng;

use crate::network::diff::GridDiff;
use crate::network::layer::Layer;

/// A ring of direction-tuned motor neurons.
#[derive(Debug, Clone)]
pub struct MotorNetwork {
    pub layer: Layer,
    pub direction_samples: usize,
    /// Weight applied when this network feeds another motor network.
    pub scaling_factor: f64,
    normalize: bool,
    pub normalization_spread: f64,
    pub normalization_peak: f64,

    pub override_active: bool,
    pub override_direction: f64,
    pub override_strength: f64,

    /// Decoded population direction, updated on commit.
    pub direction: f64,
    /// Decoded population strength, updated on commit.
    pub strength: f64,
}

impl MotorNetwork {
    #[must_use]
    pub fn new(
        direction_samples: usize,
        scaling_factor: f64,
        normalize: bool,
        rng: &mut impl Rng,
    ) -> Self {
        let mut motor = Self {
            layer: Layer::new(direction_samples, rng),
            direction_samples,
            scaling_factor,
            normalize,
            // Overridden before use whenever normalization is active.
            normalization_spread: 2.0 * PI,
            normalization_peak: 1.0,
            override_active: false,
            override_direction: 0.0,
            override_strength: 0.0,
            direction: 0.0,
            strength: 0.0,
        };
        // Swap the initial noise out of the current slot; motor neurons
        // start silent.
        motor.commit();
        motor
    }

    /// The angle tag of neuron `i`.
    #[must_use]
    pub fn angle(&self, i: usize) -> f64 {
        i as f64 * 2.0 * PI / self.direction_samples as f64
    }

    /// Population direction and strength of an activity slice.
    #[must_use]
    pub fn direction_and_strength(&self, values: &[f32]) -> (f64, f64) {
        let mut x = 0.0;
        let mut y = 0.0;
        for (i, &value) in values.iter().enumerate() {
            let angle = self.angle(i);
            x += f64::from(value) * angle.cos();
            y += f64::from(value) * angle.sin();
        }
        (y.atan2(x), x.hypot(y))
    }

    /// Starts an update by clearing the input accumulator.
    pub fn begin_update(&mut self) {
        self.layer.clear_inputs();
    }

    /// Adds the per-direction sums of a grid-difference layer.
    pub fn add_grid_diff(&mut self, diff: &GridDiff) {
        debug_assert_eq!(self.direction_samples, diff.direction_samples);
        let inputs = self.layer.inputs_mut();
        let activity = diff.layer.current();
        for (index, &value) in activity.iter().enumerate() {
            inputs[diff.direction_sample(index)] += value;
        }
    }

    /// Adds another motor network's activity, scaled by its factor.
    pub fn add_motor(&mut self, afferent: &MotorNetwork) {
        debug_assert_eq!(self.direction_samples, afferent.direction_samples);
        let inputs = self.layer.inputs_mut();
        let scaling = afferent.scaling_factor as f32;
        for (direction, &value) in afferent.layer.current().iter().enumerate() {
            inputs[direction] += value * scaling;
        }
    }

    /// Subtracts per-direction border-sensor activations.
    pub fn subtract_border(&mut self, border_sensors: &[f32]) {
        debug_assert_eq!(self.direction_samples, border_sensors.len());
        let inputs = self.layer.inputs_mut();
        for (direction, &value) in border_sensors.iter().enumerate() {
            inputs[direction] -= value;
        }
    }

    /// Applies the value rule: rectified accumulator, then the normalize-mode
    /// Gaussian rewrite when configured.
    pub fn apply_update(&mut self) {
        let (_, inputs, next) = self.layer.buffers_mut();
        for i in 0..next.len() {
            next[i] = inputs[i].max(0.0);
        }

        if !self.normalize {
            return;
        }

        let (mut final_direction, mut final_strength) =
            self.direction_and_strength(self.layer.next());
        if self.override_active {
            final_direction = self.override_direction;
            final_strength = self.override_strength;
        }
        let final_strength = if final_strength > 0.0 { 1.0 } else { 0.0 };

        let spread = self.normalization_spread;
        let samples = self.direction_samples;
        let mut peak_activation = 0.0_f64;
        for i in 0..samples {
            let angle = i as f64 * 2.0 * PI / samples as f64;
            let difference = (angle - final_direction)
                .sin()
                .atan2((angle - final_direction).cos());
            let value = final_strength * (-difference.powi(2) / (2.0 * spread.powi(2))).exp();
            peak_activation = peak_activation.max(value);
            self.layer.next_mut()[i] = value as f32;
        }
        let rescaling = if peak_activation > 0.0 {
            self.normalization_peak / peak_activation
        } else {
            0.0
        };
        for value in self.layer.next_mut() {
            *value *= rescaling as f32;
        }
    }

    /// Publishes the update and refreshes the decoded direction/strength.
    pub fn commit(&mut self) {
        self.layer.commit();
        let (direction, strength) = self.direction_and_strength(self.layer.current());
        self.direction = direction;
        self.strength = strength;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn motor(normalize: bool) -> MotorNetwork {
        let mut rng = SmallRng::seed_from_u64(3);
        MotorNetwork::new(8, 1.0, normalize, &mut rng)
    }

    #[test]
    fn test_starts_silent() {
        let motor = motor(false);
        assert_eq!(motor.layer.current(), &[0.0; 8]);
        assert_eq!(motor.strength, 0.0);
    }

    #[test]
    fn test_population_vector_decodes_single_neuron() {
        let mut motor = motor(false);
        // Activate only the neuron tagged with angle π/2.
        motor.begin_update();
        motor.layer.inputs_mut()[2] = 1.5;
        motor.apply_update();
        motor.commit();
        assert!((motor.direction - PI / 2.0).abs() < 1e-9);
        assert!((motor.strength - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_rectifier_clamps_negative_input() {
        let mut motor = motor(false);
        motor.begin_update();
        motor.layer.inputs_mut()[0] = -2.0;
        motor.layer.inputs_mut()[1] = 0.5;
        motor.apply_update();
        motor.commit();
        assert_eq!(motor.layer.current()[0], 0.0);
        assert!((motor.layer.current()[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_peak_equals_configured_peak() {
        let mut motor = motor(true);
        motor.override_active = true;
        motor.override_direction = 1.0;
        motor.override_strength = 1.0;
        motor.normalization_spread = 0.3;
        motor.begin_update();
        motor.apply_update();
        motor.commit();

        let peak = motor
            .layer
            .current()
            .iter()
            .fold(0.0_f32, |a, &b| a.max(b));
        assert!((f64::from(peak) - motor.normalization_peak).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_strength_silences_ring() {
        let mut motor = motor(true);
        motor.override_active = true;
        motor.override_direction = 1.0;
        motor.override_strength = 0.0;
        motor.begin_update();
        motor.apply_update();
        motor.commit();
        assert_eq!(motor.layer.current(), &[0.0; 8]);
        assert_eq!(motor.strength, 0.0);
    }

    #[test]
    fn test_normalized_bump_points_at_override_direction() {
        let mut rng = SmallRng::seed_from_u64(9);
        let mut motor = MotorNetwork::new(72, 1.0, true, &mut rng);
        motor.override_active = true;
        motor.override_direction = 2.0;
        motor.override_strength = 1.0;
        motor.normalization_spread = 0.1;
        motor.begin_update();
        motor.apply_update();
        motor.commit();
        assert!((motor.direction - 2.0).abs() < 0.05);
        assert!(motor.strength > 0.0);
    }

    #[test]
    fn test_border_subtraction_reduces_aligned_amplitude() {
        let mut rng = SmallRng::seed_from_u64(12);
        // A bump heading north is symmetric between east and west until the
        // border sensors break the tie.
        let mut source = MotorNetwork::new(8, 1.0, true, &mut rng);
        source.override_active = true;
        source.override_direction = PI / 2.0;
        source.override_strength = 1.0;
        source.normalization_spread = 0.75;
        source.begin_update();
        source.apply_update();
        source.commit();

        let mut inhibited = MotorNetwork::new(8, 1.0, false, &mut rng);
        let mut border = vec![0.0_f32; 8];
        border[0] = 0.5; // wall to the east
        inhibited.begin_update();
        inhibited.add_motor(&source);
        inhibited.subtract_border(&border);
        inhibited.apply_update();
        inhibited.commit();

        // Amplitude toward the wall drops strictly below the mirror direction.
        assert!(inhibited.layer.current()[0] < inhibited.layer.current()[4]);
        assert!(inhibited.strength < source.strength);
    }
}
