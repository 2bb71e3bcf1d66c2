//! Shared utilities.

pub mod process;

use rand::Rng;

/// Draw the inter-request delay uniformly from `[base, 2 * base]` seconds.
/// A zero base disables the delay entirely.
pub fn jittered_delay_secs(base: u64) -> u64 {
    if base == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(base..=base * 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_within_bounds() {
        for _ in 0..200 {
            let delay = jittered_delay_secs(3);
            assert!((3..=6).contains(&delay), "delay {} out of range", delay);
        }
    }

    #[test]
    fn test_jitter_zero_base() {
        assert_eq!(jittered_delay_secs(0), 0);
    }
}
