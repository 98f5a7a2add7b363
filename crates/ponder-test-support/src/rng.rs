//! Deterministic `DeterministicRng` implementations for tests.

use ponder_core::rng::DeterministicRng;

/// Always returns `min`. Suitable for tests that do not depend on specific
/// random values.
#[derive(Debug)]
pub struct MockRng;

impl DeterministicRng for MockRng {
    fn next_u32_range(&mut self, min: u32, _max: u32) -> u32 {
        min
    }
}

/// Replays a scripted sequence of draws, starting over when it runs out.
/// Each draw is folded into the requested range, so `SequenceRng::new(vec![3])`
/// picks offset 3 from `min` whenever the range is wide enough.
#[derive(Debug)]
pub struct SequenceRng {
    values: Vec<u32>,
    index: usize,
}

impl SequenceRng {
    /// Creates an RNG replaying `values`. An empty script always draws `min`.
    #[must_use]
    pub fn new(values: Vec<u32>) -> Self {
        Self { values, index: 0 }
    }
}

impl DeterministicRng for SequenceRng {
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32 {
        if self.values.is_empty() || min >= max {
            return min;
        }
        let value = self.values[self.index % self.values.len()];
        self.index = self.index.wrapping_add(1);
        let span = u64::from(max - min) + 1;
        min + u32::try_from(u64::from(value) % span).unwrap_or(0)
    }
}
