//! Wraparound handling for finite-width energy counters.
//!
//! A counter increases monotonically until it wraps to zero at `2^width`.
//! With one wrap between two samples, `after + 2^width - before` is the true
//! delta; with more than one wrap the delta is unrecoverable.

use std::time::Duration;

use crate::error::{Error, Result};

/// What to do when a counter went backwards between two samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloverPolicy {
	/// Discard the whole cycle on any detected wrap
	Discard,
	/// Correct a single wrap, as long as the cycle was short enough that no
	/// second wrap could have happened
	CorrectSingleWrap { max_interval: Duration },
}

/// Result of comparing two samples of the same counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
	/// The counter did not wrap
	Plain(u64),
	/// The counter wrapped once; the value is compensated
	Wrapped(u64),
}

impl Delta {
	pub fn value(self) -> u64 {
		match self {
			Delta::Plain(v) | Delta::Wrapped(v) => v,
		}
	}
}

/// Computes counter deltas for one counter width and policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloverCorrector {
	width: u32,
	policy: RolloverPolicy,
}

impl RolloverCorrector {
	pub fn new(width: u32, policy: RolloverPolicy) -> Result<Self> {
		if !(1..=64).contains(&width) {
			return Err(Error::InvalidConfig(format!("counter width must be within 1..=64, got {width}")));
		}
		Ok(Self { width, policy })
	}

	pub fn width(&self) -> u32 {
		self.width
	}

	pub fn policy(&self) -> RolloverPolicy {
		self.policy
	}

	/// Mask keeping the low `width` bits of a raw register value
	pub fn mask(&self) -> u64 {
		if self.width == 64 { u64::MAX } else { (1u64 << self.width) - 1 }
	}

	/// Delta between two raw samples, both masked to the counter width
	pub fn delta(&self, before: u64, after: u64) -> Delta {
		let (before, after) = (before & self.mask(), after & self.mask());
		if after >= before {
			Delta::Plain(after - before)
		} else {
			// after + 2^W - before, computed as (2^W - 1 - before) + after + 1
			// so it fits in a u64 even for W = 64
			Delta::Wrapped((self.mask() - before) + after + 1)
		}
	}

	/// Whether a wrapped delta can be trusted for a cycle of length `elapsed`
	pub fn accepts_wrap(&self, elapsed: Duration) -> bool {
		match self.policy {
			RolloverPolicy::Discard => false,
			RolloverPolicy::CorrectSingleWrap { max_interval } => elapsed <= max_interval,
		}
	}

	/// Trusted delta for this cycle, or `None` when the cycle must be discarded
	pub fn correct(&self, before: u64, after: u64, elapsed: Duration) -> Option<u64> {
		match self.delta(before, after) {
			Delta::Plain(v) => Some(v),
			Delta::Wrapped(v) if self.accepts_wrap(elapsed) => Some(v),
			Delta::Wrapped(_) => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn correcting(width: u32, max_ms: u64) -> RolloverCorrector {
		RolloverCorrector::new(
			width,
			RolloverPolicy::CorrectSingleWrap {
				max_interval: Duration::from_millis(max_ms),
			},
		)
		.unwrap()
	}

	#[test]
	fn monotonic_delta_is_exact() {
		let corrector = RolloverCorrector::new(32, RolloverPolicy::Discard).unwrap();
		for (before, after) in [(0, 0), (5, 5), (100, 1_000_100), (0, u32::MAX as u64)] {
			assert_eq!(corrector.delta(before, after), Delta::Plain(after - before));
		}
	}

	#[test]
	fn single_wrap_at_32_bits() {
		let corrector = correcting(32, 5_000);
		assert_eq!(corrector.delta(4_294_967_290, 10), Delta::Wrapped(16));
		assert_eq!(corrector.correct(4_294_967_290, 10, Duration::from_secs(5)), Some(16));
	}

	#[test]
	fn wrapped_delta_is_never_negative() {
		let corrector = correcting(16, 1_000);
		for (before, after) in [(1, 0), (0xFFFF, 0), (0x8000, 0x7FFF)] {
			let delta = corrector.delta(before, after);
			assert!(matches!(delta, Delta::Wrapped(_)));
			assert_eq!(delta.value(), after + (1 << 16) - before);
		}
	}

	#[test]
	fn full_width_counter_wraps_without_overflow() {
		let corrector = correcting(64, 1_000);
		assert_eq!(corrector.delta(u64::MAX - 1, 3), Delta::Wrapped(5));
	}

	#[test]
	fn bits_above_width_are_ignored() {
		let corrector = RolloverCorrector::new(32, RolloverPolicy::Discard).unwrap();
		assert_eq!(corrector.delta(0xABCD_0000_0000_0010, 0x1234_0000_0000_0020), Delta::Plain(0x10));
	}

	#[test]
	fn discard_policy_rejects_any_wrap() {
		let corrector = RolloverCorrector::new(32, RolloverPolicy::Discard).unwrap();
		assert_eq!(corrector.correct(10, 5, Duration::from_millis(1)), None);
		assert_eq!(corrector.correct(5, 10, Duration::from_secs(60)), Some(5));
	}

	#[test]
	fn wrap_beyond_max_interval_is_rejected() {
		let corrector = correcting(32, 1_000);
		assert_eq!(corrector.correct(4_294_967_290, 10, Duration::from_millis(1_001)), None);
		assert_eq!(corrector.correct(4_294_967_290, 10, Duration::from_millis(999)), Some(16));
	}

	#[test]
	fn rejects_invalid_width() {
		assert!(RolloverCorrector::new(0, RolloverPolicy::Discard).is_err());
		assert!(RolloverCorrector::new(65, RolloverPolicy::Discard).is_err());
	}
}
