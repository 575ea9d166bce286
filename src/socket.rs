//! Platform-neutral datagram endpoint: bind for the server role, resolve for
//! the client role, timed receive, and unconnected send to a remembered peer
//! address.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Mutex;
use std::time::Duration;

use log::debug;

use crate::error::Result;

pub struct Socket {
	inner: UdpSocket,
	/// The peer we send to. `None` until a handshake has pinned it down, or
	/// until the client role resolves its configured host up front.
	///
	/// Interior mutability lets the handshake engine pin this from a
	/// `&Socket` shared the same way as the rest of the session. The socket
	/// itself is unconnected, not a thing a second thread mutates
	/// concurrently with the handshake, but this keeps one sharing story for
	/// the whole lifetime instead of swapping ownership at handshake time.
	remote_addr: Mutex<Option<SocketAddr>>,
}

impl Socket {
	/// Server role: bind to `INADDR_ANY`/`IN6ADDR_ANY` on `port`.
	pub fn bind(port: u16) -> Result<Self> {
		let inner = UdpSocket::bind(("0.0.0.0", port))?;
		debug!("Bound UDP socket on port {port}");

		Ok(Self { inner, remote_addr: Mutex::new(None) })
	}

	/// Client role: resolve `host:port` (a numeric address resolves without a
	/// DNS round trip; anything else falls back to a real lookup, which is
	/// exactly what `ToSocketAddrs` already does under the hood) and record
	/// it as the remote address for later sends.
	pub fn connect_to(host: &str, port: u16) -> Result<Self> {
		let remote_addr = (host, port)
			.to_socket_addrs()?
			.next()
			.ok_or_else(|| std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, format!("could not resolve {host}:{port}")))?;

		let bind_addr: SocketAddr = if remote_addr.is_ipv6() { "[::]:0".parse().unwrap() } else { "0.0.0.0:0".parse().unwrap() };

		let inner = UdpSocket::bind(bind_addr)?;
		debug!("Resolved peer {host}:{port} to {remote_addr}");

		Ok(Self { inner, remote_addr: Mutex::new(Some(remote_addr)) })
	}

	pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
		self.inner.set_read_timeout(Some(timeout))?;
		Ok(())
	}

	/// The peer address this socket currently sends to, if known.
	pub fn remote_addr(&self) -> Option<SocketAddr> {
		*self.remote_addr.lock().unwrap()
	}

	/// The local port this socket is bound to, e.g. for tests that bind to
	/// port 0 and need to discover the ephemeral port the OS assigned.
	pub fn local_port(&self) -> Result<u16> {
		Ok(self.inner.local_addr()?.port())
	}

	/// Pin the remote address, e.g. from the source of the first handshake
	/// datagram received in the server role.
	pub fn set_remote_addr(&self, addr: SocketAddr) {
		*self.remote_addr.lock().unwrap() = Some(addr);
	}

	/// Bounded-timeout receive. Returns `Ok(None)` on a timeout/would-block,
	/// which the caller treats as the cancellation poll.
	pub fn recv_from(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
		match self.inner.recv_from(buf) {
			Ok((n, addr)) => Ok(Some((n, addr))),
			Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	/// Send `buf` to the remembered remote address. Fails if no remote
	/// address has been pinned yet (handshake not performed).
	pub fn send_to(&self, buf: &[u8]) -> Result<()> {
		let addr = self.remote_addr().ok_or(crate::error::Error::NotReady)?;
		self.inner.send_to(buf, addr)?;
		Ok(())
	}

	/// Used only by the handshake engine, which sends before a remote address
	/// has necessarily been pinned (the client role already has one from
	/// `connect_to`; the server role pins it after receiving the client's
	/// first datagram).
	pub fn send_to_addr(&self, buf: &[u8], addr: SocketAddr) -> Result<()> {
		self.inner.send_to(buf, addr)?;
		Ok(())
	}
}
