//! The public `UdpSession` type: lifecycle, shared state, and the operations
//! (`setup`, `handshake`, `start`, `send`, `get_latest`, `get_status`,
//! `close`) that make up the session's public contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use log::{debug, info};

use crate::backchannel::Backchannel;
use crate::codec::{encode_data_frame, Handshake, TypeTag};
use crate::error::{Error, Result};
use crate::options::SessionOptions;
use crate::socket::Socket;
use crate::stats::{IntervalStats, Status};
use crate::{handshake, receive, watchdog};

/// State shared between the owning thread, the receive thread and the
/// heartbeat thread. Guards everything except the delay estimator, which
/// gets its own lock.
pub(crate) struct SharedData {
	pub(crate) latest_data: Vec<f32>,
	pub(crate) consumed: bool,
	pub(crate) last_packet_time: Option<Instant>,
	pub(crate) packets_received: u64,
	pub(crate) packets_sent: u64,
	pub(crate) packets_expired: u64,
	pub(crate) packets_corrupted: u64,
	pub(crate) packets_shape_invalid: u64,
}

impl SharedData {
	fn new() -> Self {
		Self {
			latest_data: Vec::new(),
			consumed: true,
			last_packet_time: None,
			packets_received: 0,
			packets_sent: 0,
			packets_expired: 0,
			packets_corrupted: 0,
			packets_shape_invalid: 0,
		}
	}
}

/// Parameters negotiated with the peer during a successful handshake, frozen
/// for the rest of the session.
#[derive(Debug, Clone, Copy)]
struct Negotiated {
	receive_type: TypeTag,
	remote_max_age: u16,
}

/// A single bidirectional UDP session: handshake, fixed-shape datagram
/// exchange, liveness watchdog and cleanup back-channel.
///
/// Progresses through *constructed* → *setup* → *handshake performed* →
/// *running* → *closing* → *closed*. Most operations are legal from any
/// state; see each method's doc comment for its specific preconditions.
pub struct UdpSession {
	options: SessionOptions,
	num_outputs: u16,
	num_inputs: u16,

	socket: Option<Arc<Socket>>,
	backchannel: Option<Arc<Backchannel>>,
	negotiated: Option<Negotiated>,

	shared: Arc<Mutex<SharedData>>,
	interval_stats: Arc<Mutex<IntervalStats>>,

	running: Arc<AtomicBool>,
	stop_requested: Arc<AtomicBool>,
	handshake_performed: bool,

	receive_thread: Option<JoinHandle<()>>,
	watchdog_thread: Option<JoinHandle<()>>,

	/// Serializes `close` against itself.
	close_lock: Mutex<()>,
}

impl UdpSession {
	/// Construct a new session in the *constructed* state. No I/O happens
	/// until `setup`.
	pub fn new(options: SessionOptions) -> Self {
		Self {
			options,
			num_outputs: 0,
			num_inputs: 0,
			socket: None,
			backchannel: None,
			negotiated: None,
			shared: Arc::new(Mutex::new(SharedData::new())),
			interval_stats: Arc::new(Mutex::new(IntervalStats::new())),
			running: Arc::new(AtomicBool::new(false)),
			stop_requested: Arc::new(AtomicBool::new(false)),
			handshake_performed: false,
			receive_thread: None,
			watchdog_thread: None,
			close_lock: Mutex::new(()),
		}
	}

	/// Bind (server) or resolve (client) the datagram socket and connect the
	/// cleanup back-channel. Fails outright if the back-channel cannot be
	/// reached; the session refuses to run without a way to report its own
	/// self-termination.
	pub fn setup(&mut self, host: &str, port: u16, num_inputs: u16, num_outputs: u16, is_server: bool) -> Result<()> {
		let backchannel = Backchannel::connect(self.options.tcp_port)?;

		let socket = if is_server { Socket::bind(port)? } else { Socket::connect_to(host, port)? };
		socket.set_timeout(self.options.socket_timeout)?;

		self.num_inputs = num_inputs;
		self.num_outputs = num_outputs;
		self.socket = Some(Arc::new(socket));
		self.backchannel = Some(Arc::new(backchannel));

		info!("Session setup complete: {} role, in={num_inputs} out={num_outputs}", if is_server { "server" } else { "client" });

		Ok(())
	}

	/// Exchange the 7-byte handshake descriptor with the peer and validate
	/// shape agreement. Legal exactly once per session.
	pub fn handshake(&mut self, is_server: bool) -> Result<()> {
		if self.handshake_performed {
			return Err(Error::AlreadyHandshaken);
		}

		let socket = self.socket.as_ref().ok_or(Error::NotReady)?;

		let local = Handshake {
			num_outputs: self.num_outputs,
			num_inputs: self.num_inputs,
			send_type: self.options.send_type,
			max_age: truncate_max_age(self.options.local_max_age),
		};

		let remote = handshake::perform(socket, is_server, local, self.options.handshake_timeout)?;

		socket.set_timeout(self.options.socket_timeout)?;

		self.negotiated = Some(Negotiated { receive_type: remote.send_type, remote_max_age: remote.max_age });
		self.handshake_performed = true;

		Ok(())
	}

	/// Spawn the receive thread and, if `num_inputs > 0`, the heartbeat
	/// watchdog. Requires a completed handshake.
	pub fn start(&mut self) -> Result<()> {
		if !self.handshake_performed {
			return Err(Error::NotReady);
		}

		let socket = self.socket.clone().ok_or(Error::NotReady)?;
		let backchannel = self.backchannel.clone().ok_or(Error::NotReady)?;

		self.stop_requested.store(false, Ordering::Relaxed);
		self.running.store(true, Ordering::Relaxed);
		let session_start = Instant::now();

		{
			let socket = Arc::clone(&socket);
			let shared = Arc::clone(&self.shared);
			let interval_stats = Arc::clone(&self.interval_stats);
			let backchannel = Arc::clone(&backchannel);
			let num_inputs = self.num_inputs;
			let delay_tracking = self.options.delay_tracking;
			let debug_enabled = self.options.debug_enabled;
			let stop_requested = Arc::clone(&self.stop_requested);

			self.receive_thread = Some(std::thread::spawn(move || {
				receive::run(socket, shared, interval_stats, backchannel, num_inputs, delay_tracking, debug_enabled, stop_requested);
			}));
		}

		if self.num_inputs > 0 {
			let shared = Arc::clone(&self.shared);
			let backchannel = Arc::clone(&backchannel);
			let local_max_age = self.options.local_max_age;
			let stop_requested = Arc::clone(&self.stop_requested);

			self.watchdog_thread = Some(std::thread::spawn(move || {
				watchdog::run(shared, backchannel, local_max_age, session_start, stop_requested);
			}));
		}

		info!("Session running");

		Ok(())
	}

	/// Send `values` to the negotiated peer. Requires exactly `num_outputs`
	/// values.
	pub fn send(&self, values: &[f32]) -> Result<()> {
		if self.num_outputs == 0 || values.len() != self.num_outputs as usize {
			return Err(Error::PayloadShape { expected: self.num_outputs as usize, got: values.len() });
		}

		let socket = self.socket.as_ref().ok_or(Error::NotReady)?;
		let frame = encode_data_frame(values);
		socket.send_to(&frame)?;

		self.shared.lock().unwrap().packets_sent += 1;

		Ok(())
	}

	/// Return the most recent unconsumed, fresh payload, or `None` ("nothing")
	/// if no such payload exists.
	pub fn get_latest(&self) -> Option<Vec<f32>> {
		let mut data = self.shared.lock().unwrap();

		if data.consumed || data.latest_data.is_empty() {
			return None;
		}

		let age = data.last_packet_time.map(|t| Instant::now().duration_since(t));
		let fresh = matches!(age, Some(age) if age <= self.options.local_max_age);

		if !fresh {
			data.packets_expired += 1;
			return None;
		}

		data.consumed = true;
		Some(data.latest_data.clone())
	}

	/// An immutable snapshot of counters, freshness and negotiated parameters.
	pub fn get_status(&self) -> Status {
		let data = self.shared.lock().unwrap();

		Status {
			running: self.running.load(Ordering::Relaxed),
			packets_received: data.packets_received,
			packets_sent: data.packets_sent,
			packets_expired: data.packets_expired,
			packets_corrupted: data.packets_corrupted,
			packets_shape_invalid: data.packets_shape_invalid,
			since_last_packet: data.last_packet_time.map(|t| Instant::now().duration_since(t)),
			has_unconsumed_data: !data.consumed && !data.latest_data.is_empty(),
			num_inputs: self.num_inputs,
			num_outputs: self.num_outputs,
			send_type: self.options.send_type,
			receive_type: self.negotiated.map(|n| n.receive_type),
			remote_max_age: self.negotiated.map(|n| n.remote_max_age),
		}
	}

	/// The fixed size in bytes of an incoming data frame for this session
	/// (`num_inputs * 4 + 2`).
	pub fn get_expected_recv_packet_size(&self) -> usize {
		self.num_inputs as usize * 4 + 2
	}

	/// A snapshot of the inter-arrival interval statistics, populated only
	/// when `delay_tracking` is enabled.
	pub fn interval_stats(&self) -> IntervalStats {
		self.interval_stats.lock().unwrap().clone()
	}

	/// Log the current status at `info` level. A thin diagnostic helper over
	/// `get_status`'s `Display` impl.
	pub fn print_status(&self) {
		info!("{}", self.get_status());
	}

	/// Tear down the session: stop background threads, close the socket and
	/// the back-channel. Idempotent and legal from any state.
	pub fn close(&mut self) {
		let _guard = self.close_lock.lock().unwrap();

		if self.stop_requested.swap(true, Ordering::Relaxed) {
			// Already closed (or another `close` beat us to it): a no-op.
			return;
		}

		self.running.store(false, Ordering::Relaxed);

		if let Some(backchannel) = &self.backchannel {
			backchannel.close();
		}

		if let Some(handle) = self.receive_thread.take() {
			let _ = handle.join();
		}

		if let Some(handle) = self.watchdog_thread.take() {
			let _ = handle.join();
		}

		debug!("Session closed");
	}
}

impl Drop for UdpSession {
	fn drop(&mut self) {
		self.close();
	}
}

/// Truncate a `Duration`-valued max age to the wire's `u16` seconds field.
/// Values above 65535s are clamped rather than silently wrapped, which is
/// observably identical for every configured session (none runs a
/// multi-year max age) but avoids the surprising negative-looking
/// wraparound a raw `as u16` cast would produce.
fn truncate_max_age(max_age: std::time::Duration) -> u16 {
	max_age.as_secs().min(u16::MAX as u64) as u16
}
