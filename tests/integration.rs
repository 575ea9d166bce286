//! End-to-end session scenarios, driven over real loopback UDP sockets and
//! real TCP back-channel listeners. No mocked socket or clock.

use std::io::Read;
use std::net::{TcpListener, UdpSocket};
use std::thread;
use std::time::Duration;

use teleop_transport::{SessionOptions, UdpSession};

fn init_logging() {
	let _ = env_logger::builder().is_test(true).try_init();
}

/// A do-nothing back-channel listener: accepts one connection and drains
/// whatever it reads, so `setup` has somewhere to connect to.
fn spawn_backchannel() -> u16 {
	let listener = TcpListener::bind("127.0.0.1:0").unwrap();
	let port = listener.local_addr().unwrap().port();

	thread::spawn(move || {
		if let Ok((mut stream, _)) = listener.accept() {
			let mut buf = [0u8; 16];
			let _ = stream.read(&mut buf);
		}
	});

	port
}

/// A back-channel listener that reports whether it ever saw the cleanup byte.
fn spawn_observing_backchannel() -> (u16, std::sync::mpsc::Receiver<()>) {
	let listener = TcpListener::bind("127.0.0.1:0").unwrap();
	let port = listener.local_addr().unwrap().port();
	let (tx, rx) = std::sync::mpsc::channel();

	thread::spawn(move || {
		if let Ok((mut stream, _)) = listener.accept() {
			let mut buf = [0u8; 1];
			if stream.read_exact(&mut buf).is_ok() {
				let _ = tx.send(());
			}
		}
	});

	(port, rx)
}

fn free_udp_port() -> u16 {
	UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

/// Hand-rolled wire encoding, independent of the crate's private codec
/// module, used to drive the transport with a raw peer socket.
mod wire {
	pub fn crc16_ccitt_false(data: &[u8]) -> u16 {
		let mut reg: u16 = 0xFFFF;
		for &byte in data {
			reg ^= (byte as u16) << 8;
			for _ in 0..8 {
				reg = if reg & 0x8000 != 0 { (reg << 1) ^ 0x1021 } else { reg << 1 };
			}
		}
		reg
	}

	pub fn handshake_frame(num_outputs: u16, num_inputs: u16, send_type: u8, max_age: u16) -> [u8; 7] {
		let mut buf = [0u8; 7];
		buf[0..2].copy_from_slice(&num_outputs.to_le_bytes());
		buf[2..4].copy_from_slice(&num_inputs.to_le_bytes());
		buf[4] = send_type;
		buf[5..7].copy_from_slice(&max_age.to_le_bytes());
		buf
	}

	pub fn data_frame(values: &[f32]) -> Vec<u8> {
		let mut buf = Vec::with_capacity(values.len() * 4 + 2);
		for v in values {
			buf.extend_from_slice(&v.to_le_bytes());
		}
		let crc = crc16_ccitt_false(&buf);
		buf.extend_from_slice(&crc.to_le_bytes());
		buf
	}
}

#[test]
fn symmetric_mirror_session() {
	init_logging();
	// A (server, in=0, out=3) sends; B (client, in=3, out=0) receives. This
	// is the only role assignment consistent with the invariant that `send`
	// is legal only when `num_outputs > 0`.
	let a_tcp = spawn_backchannel();
	let b_tcp = spawn_backchannel();
	let a_port = free_udp_port();

	let mut a = UdpSession::new(SessionOptions::new().with_tcp_port(a_tcp).with_local_max_age(Duration::from_secs(3)));
	a.setup("0.0.0.0", a_port, 0, 3, true).unwrap();

	let mut b = UdpSession::new(SessionOptions::new().with_tcp_port(b_tcp).with_local_max_age(Duration::from_secs(3)));
	b.setup("127.0.0.1", a_port, 3, 0, false).unwrap();

	let a_handle = thread::spawn(move || {
		a.handshake(true).unwrap();
		a.start().unwrap();
		a
	});

	b.handshake(false).unwrap();
	b.start().unwrap();

	let mut a = a_handle.join().unwrap();

	a.send(&[1.0, -2.5, 0.25]).unwrap();

	let mut received = None;
	for _ in 0..20 {
		if let Some(values) = b.get_latest() {
			received = Some(values);
			break;
		}
		thread::sleep(Duration::from_millis(10));
	}

	assert_eq!(received, Some(vec![1.0, -2.5, 0.25]));
	// One-shot delivery: a second immediate call returns nothing.
	assert_eq!(b.get_latest(), None);
	assert_eq!(b.get_status().packets_received, 1);

	a.close();
	b.close();
}

#[test]
fn crc_corrupted_datagram_is_dropped_and_counted() {
	init_logging();
	let tcp_port = spawn_backchannel();
	let server_port = free_udp_port();

	let mut server = UdpSession::new(SessionOptions::new().with_tcp_port(tcp_port));
	server.setup("0.0.0.0", server_port, 3, 0, true).unwrap();

	let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
	peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

	let server_handle = thread::spawn(move || {
		server.handshake(true).unwrap();
		server.start().unwrap();
		server
	});

	// Peer plays the client role by hand: send our descriptor, read the
	// server's reply.
	peer.send_to(&wire::handshake_frame(3, 0, b'f', 3), ("127.0.0.1", server_port)).unwrap();
	let mut buf = [0u8; 64];
	let (n, server_addr) = peer.recv_from(&mut buf).unwrap();
	assert_eq!(n, 7);

	let mut server = server_handle.join().unwrap();

	let mut frame = wire::data_frame(&[1.0, -2.5, 0.25]);
	frame[0] ^= 0x01; // flip one bit in the payload
	peer.send_to(&frame, server_addr).unwrap();

	thread::sleep(Duration::from_millis(200));

	assert_eq!(server.get_latest(), None);
	let status = server.get_status();
	assert_eq!(status.packets_received, 0);
	assert_eq!(status.packets_corrupted, 1);

	server.close();
}

#[test]
fn handshake_shape_mismatch_fails_both_sides() {
	init_logging();
	let a_tcp = spawn_backchannel();
	let b_tcp = spawn_backchannel();
	let a_port = free_udp_port();

	// A advertises (in=0, out=3); B advertises (in=0, out=2) instead of the
	// agreeing (in=3, out=0). Both sides must reject the handshake.
	let mut a = UdpSession::new(SessionOptions::new().with_tcp_port(a_tcp).with_handshake_timeout(Duration::from_secs(2)));
	a.setup("0.0.0.0", a_port, 0, 3, true).unwrap();

	let mut b = UdpSession::new(SessionOptions::new().with_tcp_port(b_tcp).with_handshake_timeout(Duration::from_secs(2)));
	b.setup("127.0.0.1", a_port, 0, 2, false).unwrap();

	let a_handle = thread::spawn(move || a.handshake(true));
	let b_result = b.handshake(false);
	let a_result = a_handle.join().unwrap();

	assert!(a_result.is_err());
	assert!(b_result.is_err());
}

#[test]
fn freshness_expiry_counts_as_expired() {
	init_logging();
	let a_tcp = spawn_backchannel();
	let b_tcp = spawn_backchannel();
	let a_port = free_udp_port();

	let mut a = UdpSession::new(SessionOptions::new().with_tcp_port(a_tcp).with_local_max_age(Duration::from_secs(1)));
	a.setup("0.0.0.0", a_port, 0, 3, true).unwrap();

	let mut b = UdpSession::new(SessionOptions::new().with_tcp_port(b_tcp).with_local_max_age(Duration::from_secs(1)));
	b.setup("127.0.0.1", a_port, 3, 0, false).unwrap();

	let a_handle = thread::spawn(move || {
		a.handshake(true).unwrap();
		a.start().unwrap();
		a
	});

	b.handshake(false).unwrap();
	b.start().unwrap();

	let mut a = a_handle.join().unwrap();

	a.send(&[1.0, 2.0, 3.0]).unwrap();
	thread::sleep(Duration::from_millis(100));

	// Make sure the packet actually landed before letting it expire.
	assert_eq!(b.get_status().packets_received, 1);

	thread::sleep(Duration::from_millis(1500));

	assert_eq!(b.get_latest(), None);
	assert_eq!(b.get_status().packets_expired, 1);

	a.close();
	b.close();
}

#[test]
fn watchdog_trips_and_signals_the_backchannel() {
	init_logging();
	let (tcp_port, cleanup_rx) = spawn_observing_backchannel();
	let port = free_udp_port();

	let mut session = UdpSession::new(SessionOptions::new().with_tcp_port(tcp_port).with_local_max_age(Duration::from_secs(1)).with_handshake_timeout(Duration::from_secs(2)));
	session.setup("0.0.0.0", port, 3, 0, true).unwrap();

	let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
	peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

	let handle = thread::spawn(move || {
		session.handshake(true).unwrap();
		session.start().unwrap();
		session
	});

	peer.send_to(&wire::handshake_frame(3, 0, b'f', 1), ("127.0.0.1", port)).unwrap();
	let mut buf = [0u8; 64];
	peer.recv_from(&mut buf).unwrap();

	let mut session = handle.join().unwrap();

	// No data ever sent: the watchdog's threshold is max(3*1s, 5s) = 5s.
	cleanup_rx.recv_timeout(Duration::from_secs(7)).expect("expected exactly one cleanup byte");

	session.close();
}

#[test]
fn drive_and_mirror_combo_exchanges_concurrently_in_both_directions() {
	init_logging();
	// Both endpoints have num_inputs > 0 and num_outputs > 0 with matched
	// shapes. Runs for 1s at 50Hz rather than a longer, slower run, to keep
	// the test fast without changing its shape.
	let a_tcp = spawn_backchannel();
	let b_tcp = spawn_backchannel();
	let a_port = free_udp_port();

	let mut a = UdpSession::new(SessionOptions::new().with_tcp_port(a_tcp).with_local_max_age(Duration::from_secs(3)));
	a.setup("0.0.0.0", a_port, 2, 2, true).unwrap();

	let mut b = UdpSession::new(SessionOptions::new().with_tcp_port(b_tcp).with_local_max_age(Duration::from_secs(3)));
	b.setup("127.0.0.1", a_port, 2, 2, false).unwrap();

	let a_handle = thread::spawn(move || {
		a.handshake(true).unwrap();
		a.start().unwrap();
		a
	});

	b.handshake(false).unwrap();
	b.start().unwrap();

	let a = a_handle.join().unwrap();

	const ROUNDS: u32 = 50;
	let b_sender = thread::spawn(move || {
		for i in 0..ROUNDS {
			b.send(&[i as f32, -(i as f32)]).unwrap();
			thread::sleep(Duration::from_millis(20));
		}
		b
	});

	for i in 0..ROUNDS {
		a.send(&[i as f32 * 2.0, i as f32 * -2.0]).unwrap();
		thread::sleep(Duration::from_millis(20));
	}

	let mut b = b_sender.join().unwrap();
	thread::sleep(Duration::from_millis(100));

	let mut a = a;
	let a_status = a.get_status();
	let b_status = b.get_status();

	assert_eq!(a_status.packets_sent, ROUNDS as u64);
	assert_eq!(b_status.packets_sent, ROUNDS as u64);

	// Loopback UDP between two local sockets at this rate drops essentially
	// nothing; allow a little slack rather than asserting exact equality.
	assert!(a_status.packets_received + a_status.packets_corrupted + a_status.packets_shape_invalid >= ROUNDS as u64 - 2);
	assert!(b_status.packets_received + b_status.packets_corrupted + b_status.packets_shape_invalid >= ROUNDS as u64 - 2);

	a.close();
	b.close();
}
