//! The heartbeat watchdog: a periodic task that fires cleanup if no valid
//! packet has arrived within a bound derived from the locally configured
//! maximum age. Only spawned when `num_inputs > 0`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::warn;

use crate::backchannel::Backchannel;
use crate::session::SharedData;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const MIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The threshold beyond which a session with no valid packets is considered
/// dead: `max(3 * local_max_age, 5s)`. Deliberately looser than
/// `local_max_age` itself, so transient drops only starve `get_latest`
/// rather than tearing down the session.
pub fn cleanup_threshold(local_max_age: Duration) -> Duration {
	(local_max_age * 3).max(MIN_TIMEOUT)
}

pub fn run(shared: Arc<Mutex<SharedData>>, backchannel: Arc<Backchannel>, local_max_age: Duration, session_start: Instant, stop_requested: Arc<AtomicBool>) {
	let threshold = cleanup_threshold(local_max_age);

	loop {
		thread::sleep(POLL_INTERVAL);

		if stop_requested.load(Ordering::Relaxed) {
			break;
		}

		let baseline = shared.lock().unwrap().last_packet_time.unwrap_or(session_start);
		let age = Instant::now().duration_since(baseline);

		if age > threshold {
			warn!("Watchdog timeout: no valid packet for {:.1}s (threshold {:.1}s)", age.as_secs_f64(), threshold.as_secs_f64());
			backchannel.invoke_cleanup();
			break;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn threshold_is_at_least_five_seconds() {
		assert_eq!(cleanup_threshold(Duration::from_millis(100)), Duration::from_secs(5));
	}

	#[test]
	fn threshold_scales_with_local_max_age_above_the_floor() {
		assert_eq!(cleanup_threshold(Duration::from_secs(10)), Duration::from_secs(30));
	}
}
