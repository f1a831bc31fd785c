//! Double-buffered neural activity layer.
//!
//! Every network in the model is built on the same substrate: a vector of
//! neuron activities with a `current` and a `next` slot, plus an input
//! accumulator that afferent kernels add into during an update. Writers only
//! ever touch `next`; readers only ever see `current`; `commit` swaps the
//! two. This is the only ordering contract between networks.

use rand::Rng;

/// A double-buffered vector of neuron activities with an input accumulator.
#[derive(Debug, Clone)]
pub struct Layer {
    current: Vec<f32>,
    next: Vec<f32>,
    inputs: Vec<f32>,
}

impl Layer {
    /// Creates a layer of the given size.
    ///
    /// The current slot starts with small positive uniform noise so that
    /// attractor dynamics have something to latch onto; the next slot and
    /// the accumulator start zeroed.
    #[must_use]
    pub fn new(size: usize, rng: &mut impl Rng) -> Self {
        let current = (0..size).map(|_| rng.random::<f32>() * 1e-4).collect();
        Self {
            current,
            next: vec![0.0; size],
            inputs: vec![0.0; size],
        }
    }

    /// Number of neurons in the layer.
    #[must_use]
    pub fn size(&self) -> usize {
        self.current.len()
    }

    /// The committed activities.
    #[must_use]
    pub fn current(&self) -> &[f32] {
        &self.current
    }

    /// The activities being written this update.
    #[must_use]
    pub fn next(&self) -> &[f32] {
        &self.next
    }

    /// Mutable view of the activities being written this update.
    pub fn next_mut(&mut self) -> &mut [f32] {
        &mut self.next
    }

    /// The input accumulator.
    #[must_use]
    pub fn inputs(&self) -> &[f32] {
        &self.inputs
    }

    /// Mutable view of the input accumulator.
    pub fn inputs_mut(&mut self) -> &mut [f32] {
        &mut self.inputs
    }

    /// Simultaneous views of the committed activities and the accumulator,
    /// for kernels that read the layer's own state while accumulating.
    pub fn current_and_inputs_mut(&mut self) -> (&[f32], &mut [f32]) {
        (&self.current, &mut self.inputs)
    }

    /// All three buffers at once, for applying a per-neuron value rule.
    pub fn buffers_mut(&mut self) -> (&[f32], &[f32], &mut [f32]) {
        (&self.current, &self.inputs, &mut self.next)
    }

    /// Zeroes the input accumulator at the start of an update.
    pub fn clear_inputs(&mut self) {
        self.inputs.fill(0.0);
    }

    /// Swaps the current and next slots.
    ///
    /// After this call the values written during the last update are
    /// observable and the other buffer is free for the next update.
    pub fn commit(&mut self) {
        std::mem::swap(&mut self.current, &mut self.next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_initial_noise_is_small_and_positive() {
        let mut rng = SmallRng::seed_from_u64(1);
        let layer = Layer::new(64, &mut rng);
        for &value in layer.current() {
            assert!(value >= 0.0);
            assert!(value < 1e-4);
        }
    }

    #[test]
    fn test_commit_swaps_buffers() {
        let mut rng = SmallRng::seed_from_u64(2);
        let mut layer = Layer::new(4, &mut rng);
        layer.next_mut().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        layer.commit();
        assert_eq!(layer.current(), &[1.0, 2.0, 3.0, 4.0]);

        layer.next_mut().fill(0.5);
        layer.commit();
        assert_eq!(layer.current(), &[0.5; 4]);
    }

    #[test]
    fn test_update_not_observable_before_commit() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut layer = Layer::new(2, &mut rng);
        let before = layer.current().to_vec();
        layer.next_mut().fill(9.0);
        assert_eq!(layer.current(), &before[..]);
    }

    #[test]
    fn test_clear_inputs() {
        let mut rng = SmallRng::seed_from_u64(4);
        let mut layer = Layer::new(3, &mut rng);
        layer.inputs_mut().copy_from_slice(&[1.0, 1.0, 1.0]);
        layer.clear_inputs();
        assert_eq!(layer.inputs(), &[0.0; 3]);
    }
}
