use std::time::Duration;

use crate::codec::TypeTag;

/// Session parameters that are fixed before `setup` is called.
///
/// Built with a small chain of `with_*` methods rather than a long
/// positional constructor, so callers only have to name the defaults they
/// want to override.
#[derive(Debug, Clone)]
pub struct SessionOptions {
	pub(crate) local_max_age: Duration,
	pub(crate) send_type: TypeTag,
	pub(crate) socket_timeout: Duration,
	pub(crate) handshake_timeout: Duration,
	pub(crate) delay_tracking: bool,
	pub(crate) debug_enabled: bool,
	pub(crate) tcp_port: u16,
}

impl Default for SessionOptions {
	fn default() -> Self {
		Self {
			local_max_age: Duration::from_secs(3),
			send_type: TypeTag::F32,
			socket_timeout: Duration::from_secs(1),
			handshake_timeout: Duration::from_secs(15),
			delay_tracking: false,
			debug_enabled: false,
			tcp_port: 9000,
		}
	}
}

impl SessionOptions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Upper bound on the age of a packet that `get_latest` may return.
	pub fn with_local_max_age(mut self, max_age: Duration) -> Self {
		self.local_max_age = max_age;
		self
	}

	/// The scalar type tag this endpoint advertises in the handshake.
	pub fn with_send_type(mut self, send_type: TypeTag) -> Self {
		self.send_type = send_type;
		self
	}

	/// Timeout applied to the receive socket outside of the handshake window.
	pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
		self.socket_timeout = timeout;
		self
	}

	/// Timeout applied to the receive socket during the handshake exchange.
	pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
		self.handshake_timeout = timeout;
		self
	}

	/// When set, the inter-arrival interval of valid packets feeds a running
	/// mean/variance estimator (see [`crate::stats`]).
	pub fn with_delay_tracking(mut self, enabled: bool) -> Self {
		self.delay_tracking = enabled;
		self
	}

	/// Gates the chattier `debug`/`trace` log call sites.
	pub fn with_debug_enabled(mut self, enabled: bool) -> Self {
		self.debug_enabled = enabled;
		self
	}

	/// The loopback port where the owning service's cleanup listener waits.
	pub fn with_tcp_port(mut self, port: u16) -> Self {
		self.tcp_port = port;
		self
	}
}
