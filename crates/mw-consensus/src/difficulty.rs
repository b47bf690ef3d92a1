//! Mining difficulty and the retargeting algorithm.

use crate::{
    Hash, BLOCK_TIME_WINDOW, DIFFICULTY_ADJUST_WINDOW, LOWER_TIME_BOUND, MAX_TARGET,
    MEDIAN_TIME_WINDOW, UPPER_TIME_BOUND,
};

/// Difficulty is the maximum target divided by the 64-bit prefix of a hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Difficulty(pub u64);

/// No accumulated work.
pub const ZERO_DIFFICULTY: Difficulty = Difficulty(0);

/// The minimum mining difficulty the chain accepts.
pub const MINIMUM_DIFFICULTY: Difficulty = Difficulty(1);

impl Difficulty {
    /// Difficulty from a plain number.
    pub fn from_num(num: u64) -> Self {
        Self(num)
    }

    /// Difficulty of a hash: the maximum target divided by the first eight
    /// bytes of the hash, big-endian.
    pub fn from_hash(hash: &Hash) -> Self {
        let max_target = u64::from_be_bytes(MAX_TARGET);
        let num = hash.first_u64();
        if num == 0 {
            return Self(max_target);
        }
        Self(max_target / num)
    }

    /// The numeric value.
    pub fn to_num(self) -> u64 {
        self.0
    }
}

impl std::ops::Add for Difficulty {
    type Output = Difficulty;

    fn add(self, rhs: Difficulty) -> Difficulty {
        Difficulty(self.0.saturating_add(rhs.0))
    }
}

impl std::fmt::Debug for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compute the difficulty the next block must meet.
///
/// `window` holds `(timestamp, difficulty)` pairs from the latest block
/// (highest height) to the oldest. The reference difficulty is the average
/// over the newest [`DIFFICULTY_ADJUST_WINDOW`] entries; the corresponding
/// timespan is the difference between the median timestamps of the
/// [`MEDIAN_TIME_WINDOW`] entries at each end of that window, dampened and
/// clamped to the configured bounds.
pub fn next_difficulty(window: &[(i64, Difficulty)]) -> Difficulty {
    if window.is_empty() {
        return ZERO_DIFFICULTY;
    }

    let mut sum: u64 = 0;
    let mut window_begin: Vec<i64> = Vec::with_capacity(MEDIAN_TIME_WINDOW);
    let mut window_end: Vec<i64> = Vec::with_capacity(MEDIAN_TIME_WINDOW);

    for (i, &(timestamp, difficulty)) in window.iter().enumerate() {
        if i < DIFFICULTY_ADJUST_WINDOW {
            sum = sum.saturating_add(difficulty.0);
            if i < MEDIAN_TIME_WINDOW {
                window_begin.push(timestamp);
            }
        } else if i < DIFFICULTY_ADJUST_WINDOW + MEDIAN_TIME_WINDOW {
            window_end.push(timestamp);
        } else {
            break;
        }
    }

    // Not enough history to retarget yet.
    if window_end.len() < MEDIAN_TIME_WINDOW {
        return MINIMUM_DIFFICULTY;
    }

    window_begin.sort_unstable();
    window_end.sort_unstable();

    let begin_median = window_begin[window_begin.len() / 2];
    let end_median = window_end[window_end.len() / 2];

    let avg = sum / DIFFICULTY_ADJUST_WINDOW as u64;

    // Dampened timespan, bounded to a third up or a sixth down.
    let mut ts = (3 * BLOCK_TIME_WINDOW + (begin_median - end_median)) / 4;
    ts = ts.clamp(LOWER_TIME_BOUND, UPPER_TIME_BOUND);

    let next = Difficulty(avg.saturating_mul(BLOCK_TIME_WINDOW as u64) / ts as u64);
    next.max(MINIMUM_DIFFICULTY)
}

#[cfg(test)]
mod tests {
    use super::*;

    // A window of `n` blocks, newest first, spaced `spacing` seconds apart,
    // all at difficulty `diff`.
    fn window(n: usize, spacing: i64, diff: u64) -> Vec<(i64, Difficulty)> {
        (0..n)
            .map(|i| (1_000_000 - spacing * i as i64, Difficulty(diff)))
            .collect()
    }

    #[test]
    fn constant_spacing_holds_difficulty() {
        let next = next_difficulty(&window(40, 60, 1000));
        assert_eq!(next, Difficulty(1000));
    }

    #[test]
    fn fast_blocks_raise_difficulty() {
        let next = next_difficulty(&window(40, 30, 1000));
        assert!(next > Difficulty(1000));
    }

    #[test]
    fn slow_blocks_lower_difficulty() {
        let next = next_difficulty(&window(40, 120, 1000));
        assert!(next < Difficulty(1000));
    }

    #[test]
    fn adjustment_is_clamped() {
        // Instant blocks: the timespan clamps at 5/6 of the window.
        let fast = next_difficulty(&window(40, 0, 1200));
        assert_eq!(fast, Difficulty(1200 * 1380 / 1150));

        // Extremely slow blocks: the timespan clamps at 4/3 of the window.
        let slow = next_difficulty(&window(40, 100_000, 1200));
        assert_eq!(slow, Difficulty(1200 * 1380 / 1840));
    }

    #[test]
    fn short_history_returns_minimum() {
        assert_eq!(next_difficulty(&window(20, 60, 1000)), MINIMUM_DIFFICULTY);
    }

    #[test]
    fn empty_window_returns_zero() {
        assert_eq!(next_difficulty(&[]), ZERO_DIFFICULTY);
    }

    #[test]
    fn never_below_minimum() {
        let next = next_difficulty(&window(40, 100_000, 1));
        assert_eq!(next, MINIMUM_DIFFICULTY);
    }

    #[test]
    fn difficulty_from_hash_divides_max_target() {
        let mut bytes = [0u8; 32];
        bytes[7] = 1; // first u64 = 1
        assert_eq!(
            Difficulty::from_hash(&Hash(bytes)),
            Difficulty(u64::from_be_bytes(MAX_TARGET))
        );
    }
}
