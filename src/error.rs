use std::fmt;
use std::io;

/// Errors returned synchronously from the public API.
///
/// Background threads (the receive pipeline and the heartbeat watchdog) never
/// surface this type across a thread boundary: they log the failure, invoke
/// the cleanup back-channel, and exit. This enum is only ever seen by the
/// caller of `setup`, `handshake`, `start` or `send`.
#[derive(Debug)]
pub enum Error {
	/// `setup` could not connect the cleanup back-channel to `127.0.0.1:tcp_port`.
	BackchannelUnreachable(io::Error),
	/// A socket bind, connect, resolve, send or receive call failed.
	Io(io::Error),
	/// No handshake datagram arrived within the handshake timeout.
	HandshakeTimeout,
	/// A received handshake datagram was not exactly 7 bytes.
	HandshakeLength { got: usize },
	/// The peer's advertised shape does not agree with ours.
	ShapeMismatch {
		local_inputs: u16,
		local_outputs: u16,
		remote_inputs: u16,
		remote_outputs: u16,
	},
	/// `handshake` was called a second time on the same session.
	AlreadyHandshaken,
	/// `start` was called before a successful handshake.
	NotReady,
	/// `send` was called with the wrong number of values.
	PayloadShape { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::BackchannelUnreachable(e) => write!(f, "cleanup back-channel unreachable: {e}"),
			Error::Io(e) => write!(f, "socket I/O error: {e}"),
			Error::HandshakeTimeout => write!(f, "handshake timed out waiting for peer"),
			Error::HandshakeLength { got } => write!(f, "handshake frame must be 7 bytes, got {got}"),
			Error::ShapeMismatch { local_inputs, local_outputs, remote_inputs, remote_outputs } => write!(
				f,
				"handshake shape mismatch: local (in={local_inputs}, out={local_outputs}) vs remote (in={remote_inputs}, out={remote_outputs})"
			),
			Error::AlreadyHandshaken => write!(f, "handshake already performed for this session"),
			Error::NotReady => write!(f, "session is not ready (setup or handshake not completed)"),
			Error::PayloadShape { expected, got } => write!(f, "expected {expected} output values, got {got}"),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::BackchannelUnreachable(e) | Error::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		Error::Io(e)
	}
}
