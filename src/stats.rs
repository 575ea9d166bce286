//! Online statistics for the inter-arrival interval of valid packets
//! (tracked as inter-arrival time, not one-way delay, despite the name
//! suggested by the upstream source), plus the immutable snapshot type
//! returned by `UdpSession::get_status`.
//!
//! Uses Welford's method so the running mean and variance can be updated one
//! sample at a time without retaining the full sample history.

use std::fmt;
use std::time::Duration;

use crate::codec::TypeTag;

/// Running mean/variance estimator over packet inter-arrival intervals.
#[derive(Debug, Clone, Default)]
pub struct IntervalStats {
	count: u64,
	mean: f64,
	m2: f64,
	min: f64,
	max: f64,
}

impl IntervalStats {
	pub fn new() -> Self {
		Self { count: 0, mean: 0.0, m2: 0.0, min: f64::INFINITY, max: f64::NEG_INFINITY }
	}

	/// Fold one interval into the running estimate.
	pub fn push(&mut self, interval: Duration) {
		let x = interval.as_secs_f64();

		self.count += 1;
		let delta = x - self.mean;
		self.mean += delta / self.count as f64;
		let delta2 = x - self.mean;
		self.m2 += delta * delta2;

		self.min = self.min.min(x);
		self.max = self.max.max(x);
	}

	pub fn count(&self) -> u64 {
		self.count
	}

	pub fn mean(&self) -> Option<f64> {
		(self.count > 0).then_some(self.mean)
	}

	/// Sample variance (Bessel-corrected). `None` until at least two samples
	/// have been observed.
	pub fn variance(&self) -> Option<f64> {
		(self.count > 1).then(|| self.m2 / (self.count - 1) as f64)
	}

	pub fn min(&self) -> Option<f64> {
		(self.count > 0).then_some(self.min)
	}

	pub fn max(&self) -> Option<f64> {
		(self.count > 0).then_some(self.max)
	}
}

/// Immutable snapshot returned by `UdpSession::get_status`.
#[derive(Debug, Clone)]
pub struct Status {
	pub running: bool,
	pub packets_received: u64,
	pub packets_sent: u64,
	pub packets_expired: u64,
	pub packets_corrupted: u64,
	pub packets_shape_invalid: u64,
	/// Time since the last valid datagram, or `None` if none has ever arrived.
	pub since_last_packet: Option<Duration>,
	pub has_unconsumed_data: bool,
	pub num_inputs: u16,
	pub num_outputs: u16,
	pub send_type: TypeTag,
	pub receive_type: Option<TypeTag>,
	/// The peer's own configured `local_max_age`, recorded at handshake time
	/// purely for diagnostics.
	pub remote_max_age: Option<u16>,
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let since = match self.since_last_packet {
			Some(d) => format!("{:.3}s ago", d.as_secs_f64()),
			None => "never".to_string(),
		};

		let remote_max_age = match self.remote_max_age {
			Some(secs) => secs.to_string(),
			None => "?".to_string(),
		};

		write!(
			f,
			"running={} in={} out={} recv={} sent={} expired={} corrupted={} shape_invalid={} last_packet={since} unconsumed={} remote_max_age={remote_max_age}s",
			self.running,
			self.num_inputs,
			self.num_outputs,
			self.packets_received,
			self.packets_sent,
			self.packets_expired,
			self.packets_corrupted,
			self.packets_shape_invalid,
			self.has_unconsumed_data,
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	// Hand-computed reference: intervals of 1s, 2s, 3s.
	// mean = 2.0, sample variance = 1.0 (Bessel-corrected over n=3).
	#[test]
	fn matches_hand_computed_mean_and_variance() {
		let mut stats = IntervalStats::new();
		stats.push(Duration::from_secs(1));
		stats.push(Duration::from_secs(2));
		stats.push(Duration::from_secs(3));

		assert_eq!(stats.count(), 3);
		assert!((stats.mean().unwrap() - 2.0).abs() < 1e-9);
		assert!((stats.variance().unwrap() - 1.0).abs() < 1e-9);
		assert_eq!(stats.min(), Some(1.0));
		assert_eq!(stats.max(), Some(3.0));
	}

	#[test]
	fn empty_estimator_has_no_mean_or_variance() {
		let stats = IntervalStats::new();
		assert_eq!(stats.count(), 0);
		assert_eq!(stats.mean(), None);
		assert_eq!(stats.variance(), None);
	}

	#[test]
	fn single_sample_has_mean_but_no_variance() {
		let mut stats = IntervalStats::new();
		stats.push(Duration::from_millis(500));

		assert_eq!(stats.mean(), Some(0.5));
		assert_eq!(stats.variance(), None);
	}
}
