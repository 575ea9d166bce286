//! The receive pipeline: a dedicated thread that reads datagrams, verifies
//! CRC and shape, decodes values, and publishes the most recent packet plus
//! statistics. Runs from `start` until `stop_requested`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::{debug, error, trace};

use crate::backchannel::Backchannel;
use crate::codec::{decode_data_frame, DecodeOutcome};
use crate::session::SharedData;
use crate::socket::Socket;
use crate::stats::IntervalStats;

/// Datagrams larger than this are simply never seen intact; 2048 bytes is
/// comfortably above any realistic `num_inputs` shape this transport carries.
const RECV_BUFFER_LEN: usize = 2048;

#[allow(clippy::too_many_arguments)]
pub fn run(
	socket: Arc<Socket>,
	shared: Arc<Mutex<SharedData>>,
	interval_stats: Arc<Mutex<IntervalStats>>,
	backchannel: Arc<Backchannel>,
	num_inputs: u16,
	delay_tracking: bool,
	debug_enabled: bool,
	stop_requested: Arc<AtomicBool>,
) {
	let mut buf = [0u8; RECV_BUFFER_LEN];

	loop {
		if stop_requested.load(Ordering::Relaxed) {
			break;
		}

		let received = match socket.recv_from(&mut buf) {
			Ok(Some(received)) => received,
			Ok(None) => continue, // timed out / would block: this is the cancellation poll
			Err(e) => {
				if stop_requested.load(Ordering::Relaxed) {
					// The socket was almost certainly closed out from under us by `close`.
					break;
				}

				error!("Receive pipeline failed: {e}");
				backchannel.invoke_cleanup();
				break;
			}
		};

		let (n, _from) = received;
		let datagram = &buf[..n];

		match decode_data_frame(datagram, num_inputs) {
			DecodeOutcome::Ok(values) => {
				let now = Instant::now();

				let interval = {
					let mut data = shared.lock().unwrap();
					let interval = data.last_packet_time.map(|last| now.duration_since(last));

					data.latest_data = values;
					data.consumed = false;
					data.last_packet_time = Some(now);
					data.packets_received += 1;

					interval
				};

				if debug_enabled {
					trace!("Received valid datagram ({n} bytes)");
				}

				if delay_tracking {
					if let Some(interval) = interval {
						interval_stats.lock().unwrap().push(interval);
					}
				}
			}
			DecodeOutcome::Corrupted => {
				shared.lock().unwrap().packets_corrupted += 1;
				if debug_enabled {
					debug!("Dropped datagram with bad CRC ({n} bytes)");
				}
			}
			DecodeOutcome::ShapeInvalid => {
				shared.lock().unwrap().packets_shape_invalid += 1;
				if debug_enabled {
					debug!("Dropped datagram with wrong shape ({n} bytes, expected {} floats)", num_inputs);
				}
			}
		}
	}
}
