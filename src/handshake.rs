//! The one-round-trip handshake exchange: each side sends its own 7-byte
//! descriptor and validates that the peer's advertised shape agrees with its
//! own before the session is allowed to start.

use std::time::Duration;

use log::{debug, info, warn};

use crate::codec::Handshake;
use crate::error::{Error, Result};
use crate::socket::Socket;

/// Run the handshake to completion, returning the peer's descriptor on
/// success. `socket`'s timeout is raised to `timeout` for the duration of the
/// exchange and is not restored here; the caller (`Session::handshake`)
/// restores the normal `socket_timeout` afterwards.
pub fn perform(socket: &Socket, is_server: bool, local: Handshake, timeout: Duration) -> Result<Handshake> {
	socket.set_timeout(timeout)?;

	let remote = if is_server {
		let (descriptor, from) = recv_descriptor(socket, timeout)?;
		socket.set_remote_addr(from);
		send_descriptor(socket, &local)?;
		descriptor
	} else {
		let remote_addr = socket.remote_addr().ok_or(Error::NotReady)?;
		socket.send_to_addr(&local.encode(), remote_addr)?;
		let (descriptor, from) = recv_descriptor(socket, timeout)?;
		socket.set_remote_addr(from);
		descriptor
	};

	if remote.num_inputs != local.num_outputs || remote.num_outputs != local.num_inputs {
		warn!(
			"Handshake shape mismatch: local (in={}, out={}) vs remote (in={}, out={})",
			local.num_inputs, local.num_outputs, remote.num_inputs, remote.num_outputs
		);

		return Err(Error::ShapeMismatch {
			local_inputs: local.num_inputs,
			local_outputs: local.num_outputs,
			remote_inputs: remote.num_inputs,
			remote_outputs: remote.num_outputs,
		});
	}

	info!("Handshake complete: peer advertises (in={}, out={}, type={:?}, max_age={}s)", remote.num_inputs, remote.num_outputs, remote.send_type, remote.max_age);

	Ok(remote)
}

fn send_descriptor(socket: &Socket, descriptor: &Handshake) -> Result<()> {
	debug!("Sending handshake descriptor (out={}, in={})", descriptor.num_outputs, descriptor.num_inputs);
	socket.send_to(&descriptor.encode())
}

fn recv_descriptor(socket: &Socket, timeout: Duration) -> Result<(Handshake, std::net::SocketAddr)> {
	let deadline = std::time::Instant::now() + timeout;
	let mut buf = [0u8; 2048];

	loop {
		match socket.recv_from(&mut buf)? {
			Some((n, from)) => {
				let descriptor = Handshake::decode(&buf[..n])?;
				return Ok((descriptor, from));
			}
			None => {
				if std::time::Instant::now() >= deadline {
					return Err(Error::HandshakeTimeout);
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::codec::TypeTag;
	use std::thread;

	fn descriptor(num_outputs: u16, num_inputs: u16) -> Handshake {
		Handshake { num_outputs, num_inputs, send_type: TypeTag::F32, max_age: 3 }
	}

	#[test]
	fn matching_shapes_complete_on_both_sides() {
		let server = Socket::bind(0).unwrap();
		let server_port = server.local_port().unwrap();

		let client = Socket::connect_to("127.0.0.1", server_port).unwrap();

		let server_local = descriptor(3, 0);
		let client_local = descriptor(0, 3);

		let server_thread = thread::spawn(move || perform(&server, true, server_local, Duration::from_secs(2)));
		let client_result = perform(&client, false, client_local, Duration::from_secs(2));

		let server_result = server_thread.join().unwrap();

		let server_remote = server_result.unwrap();
		let client_remote = client_result.unwrap();

		assert_eq!(server_remote.num_outputs, 0);
		assert_eq!(server_remote.num_inputs, 3);
		assert_eq!(client_remote.num_outputs, 3);
		assert_eq!(client_remote.num_inputs, 0);
	}

	#[test]
	fn mismatched_shapes_fail_on_both_sides() {
		let server = Socket::bind(0).unwrap();
		let server_port = server.local_port().unwrap();

		let client = Socket::connect_to("127.0.0.1", server_port).unwrap();

		// Server advertises (3, 0); client advertises (2, 0) instead of the
		// agreeing (0, 3). Both sides must reject the handshake.
		let server_local = descriptor(3, 0);
		let client_local = descriptor(2, 0);

		let server_thread = thread::spawn(move || perform(&server, true, server_local, Duration::from_secs(2)));
		let client_result = perform(&client, false, client_local, Duration::from_secs(2));

		let server_result = server_thread.join().unwrap();

		assert!(matches!(server_result, Err(Error::ShapeMismatch { .. })));
		assert!(matches!(client_result, Err(Error::ShapeMismatch { .. })));
	}

	#[test]
	fn no_peer_times_out() {
		let server = Socket::bind(0).unwrap();
		let local = descriptor(3, 0);

		let result = perform(&server, true, local, Duration::from_millis(100));
		assert!(matches!(result, Err(Error::HandshakeTimeout)));
	}
}
