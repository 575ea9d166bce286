//! The cleanup back-channel: a short-lived TCP client connected once at
//! `setup` to a local listener on `tcp_port`. Its only job is to deliver a
//! single byte when the UDP core self-terminates, so the owning service can
//! tear down whatever depended on it.
//!
//! The back-channel carries no protocol beyond that one byte: it is a
//! design-level dependency injection point. This module owns only the act of
//! emitting the byte; what "cleanup" means is entirely up to the listener.

use std::io::Write;
use std::net::TcpStream;
use std::sync::Mutex;

use log::{debug, warn};

use crate::error::{Error, Result};

const CLEANUP_BYTE: [u8; 1] = [0x01];

pub struct Backchannel {
	stream: Mutex<Option<TcpStream>>,
}

impl Backchannel {
	/// Connect to `127.0.0.1:tcp_port`. `setup` fails outright if this fails;
	/// the core refuses to run without a way to report self-termination.
	pub fn connect(tcp_port: u16) -> Result<Self> {
		let stream = TcpStream::connect(("127.0.0.1", tcp_port)).map_err(Error::BackchannelUnreachable)?;

		debug!("Connected cleanup back-channel to 127.0.0.1:{tcp_port}");

		Ok(Self { stream: Mutex::new(Some(stream)) })
	}

	/// Send the single cleanup byte. Idempotent in the sense that calling it
	/// again after the stream has been closed is a harmless no-op: whether or
	/// not the byte is actually delivered, the local session continues its
	/// normal shutdown path on the next `close`.
	pub fn invoke_cleanup(&self) {
		let mut guard = self.stream.lock().unwrap();

		if let Some(stream) = guard.as_mut() {
			if let Err(e) = stream.write_all(&CLEANUP_BYTE) {
				warn!("Failed to send cleanup signal on back-channel: {e}");
			}
		}
	}

	/// Close the back-channel. Serialized against `invoke_cleanup` by the
	/// same mutex, so a send in flight always completes (or fails) before the
	/// stream is dropped.
	pub fn close(&self) {
		self.stream.lock().unwrap().take();
	}
}
