//! Display smoothing for raw dB readings.
//!
//! Median of a short rolling buffer rejects clicks, then an exponential
//! filter steadies the display. The previous value starts at 0, so the first
//! outputs of a session rise from 0 towards the true level.

use std::collections::VecDeque;

/// Per-session filter state. Owned by exactly one recording session.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothingState {
    buffer: VecDeque<f64>,
    previous: f64,
}

impl SmoothingState {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::new(),
            previous: 0.0,
        }
    }

    /// Clears the buffer and the previous value.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.previous = 0.0;
    }

    /// Raw readings currently held, oldest first.
    pub fn buffer(&self) -> impl Iterator<Item = f64> + '_ {
        self.buffer.iter().copied()
    }

    /// Unrounded output of the last `smooth` call.
    pub fn previous(&self) -> f64 {
        self.previous
    }

    /// Median of the buffer. For even lengths the upper-middle element is
    /// used (index `len / 2` of the sorted copy).
    fn median(&self) -> Option<f64> {
        if self.buffer.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.buffer.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        Some(sorted[sorted.len() / 2])
    }
}

impl Default for SmoothingState {
    fn default() -> Self {
        Self::new()
    }
}

/// Feed one raw reading through the filter and return the display value.
///
/// `capacity` bounds the median buffer (minimum 1). `smoothing_factor` is the
/// weight of the previous smoothed value. The returned value is rounded to
/// one decimal; `state` keeps full precision.
pub fn smooth(raw_db: f64, state: &mut SmoothingState, capacity: usize, smoothing_factor: f64) -> f64 {
    state.buffer.push_back(raw_db);
    while state.buffer.len() > capacity.max(1) {
        state.buffer.pop_front();
    }

    let median = state.median().unwrap_or(raw_db);
    let smoothed = smoothing_factor * state.previous + (1.0 - smoothing_factor) * median;
    state.previous = smoothed;

    round_tenth(smoothed)
}

/// Round to one decimal place, halves towards positive infinity.
pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0 + 0.5).floor() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const FACTOR: f64 = 0.8;
    const CAPACITY: usize = 5;

    #[test]
    fn test_first_output_is_biased_towards_zero() {
        let mut state = SmoothingState::new();
        let out = smooth(50.0, &mut state, CAPACITY, FACTOR);
        assert_eq!(out, 10.0);
        assert!((state.previous() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_converges_to_constant_input() {
        let mut state = SmoothingState::new();
        let mut out = 0.0;
        for _ in 0..100 {
            out = smooth(42.0, &mut state, CAPACITY, FACTOR);
        }
        assert_eq!(out, 42.0);
    }

    #[test]
    fn test_buffer_evicts_oldest() {
        let mut state = SmoothingState::new();
        for value in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0] {
            smooth(value, &mut state, CAPACITY, FACTOR);
        }
        let held: Vec<f64> = state.buffer().collect();
        assert_eq!(held, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_median_rejects_single_click() {
        let mut state = SmoothingState::new();
        for _ in 0..50 {
            smooth(40.0, &mut state, CAPACITY, FACTOR);
        }
        let out = smooth(120.0, &mut state, CAPACITY, FACTOR);
        assert_eq!(out, 40.0);
    }

    #[test]
    fn test_even_buffer_uses_upper_middle() {
        let mut state = SmoothingState::new();
        smooth(10.0, &mut state, CAPACITY, 0.0);
        let out = smooth(20.0, &mut state, CAPACITY, 0.0);
        // sorted [10, 20], index 1
        assert_eq!(out, 20.0);
    }

    #[test]
    fn test_output_rounded_but_state_full_precision() {
        let mut state = SmoothingState::new();
        let out = smooth(33.33, &mut state, CAPACITY, 0.5);
        assert_eq!(out, 16.7);
        assert!((state.previous() - 16.665).abs() < 1e-12);
    }

    #[test]
    fn test_never_overshoots_inputs() {
        let inputs = [0.0, 35.5, 80.2, 12.0, 60.0, 60.0, 5.5, 90.0, 45.1, 0.0, 70.7];
        let mut state = SmoothingState::new();
        for raw in inputs {
            let before = state.previous();
            let out = smooth(raw, &mut state, CAPACITY, FACTOR);
            let lo = state.buffer().fold(before, f64::min);
            let hi = state.buffer().fold(before, f64::max);
            assert!(
                out >= round_tenth(lo) && out <= round_tenth(hi),
                "{} outside [{}, {}]",
                out,
                lo,
                hi
            );
        }
    }

    #[test]
    fn test_round_tenth_halves_round_up() {
        assert_eq!(round_tenth(12.25), 12.3);
        assert_eq!(round_tenth(-36.25), -36.2);
        assert_eq!(round_tenth(-0.25), -0.2);
        assert_eq!(round_tenth(49.84), 49.8);
        assert_eq!(round_tenth(-49.86), -49.9);
    }

    #[test]
    fn test_reset_restores_cold_start() {
        let mut state = SmoothingState::new();
        smooth(70.0, &mut state, CAPACITY, FACTOR);
        state.reset();
        assert_eq!(state, SmoothingState::new());
        assert_eq!(smooth(50.0, &mut state, CAPACITY, FACTOR), 10.0);
    }

    #[test]
    fn test_zero_capacity_keeps_one_reading() {
        let mut state = SmoothingState::new();
        smooth(10.0, &mut state, 0, FACTOR);
        smooth(20.0, &mut state, 0, FACTOR);
        assert_eq!(state.buffer().count(), 1);
    }
}
