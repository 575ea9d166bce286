//! Fixed-layout encode/decode for the two frame shapes used on the wire: the
//! handshake descriptor and the `f32` data frame. Both are little-endian and
//! neither uses generic serialization. The shapes are small and fixed, so a
//! hand-rolled byte-packing routine is simpler and avoids pulling in a
//! serialization crate for two struct layouts.

use crate::crc::Crc16;
use crate::error::{Error, Result};

/// The scalar type tag advertised in a handshake frame.
///
/// The transport currently only ever transmits `f32` payloads; the other tags
/// are advertised for descriptive status and future use, matching the
/// upstream protocol's reserved type vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
	I8,
	U8,
	I16,
	U16,
	I32,
	U32,
	I64,
	U64,
	F32,
	F64,
}

impl TypeTag {
	pub fn to_byte(self) -> u8 {
		match self {
			TypeTag::I8 => b'b',
			TypeTag::U8 => b'B',
			TypeTag::I16 => b'h',
			TypeTag::U16 => b'H',
			TypeTag::I32 => b'i',
			TypeTag::U32 => b'I',
			TypeTag::I64 => b'q',
			TypeTag::U64 => b'Q',
			TypeTag::F32 => b'f',
			TypeTag::F64 => b'd',
		}
	}

	pub fn from_byte(byte: u8) -> Option<Self> {
		Some(match byte {
			b'b' => TypeTag::I8,
			b'B' => TypeTag::U8,
			b'h' => TypeTag::I16,
			b'H' => TypeTag::U16,
			b'i' => TypeTag::I32,
			b'I' => TypeTag::U32,
			b'q' => TypeTag::I64,
			b'Q' => TypeTag::U64,
			b'f' => TypeTag::F32,
			b'd' => TypeTag::F64,
			_ => return None,
		})
	}
}

/// The 7-byte handshake descriptor exchanged once per session.
///
/// Layout (little-endian): `num_outputs: u16`, `num_inputs: u16`,
/// `send_type: u8`, `max_age: u16`. No CRC.
#[derive(Debug, Clone, Copy)]
pub struct Handshake {
	pub num_outputs: u16,
	pub num_inputs: u16,
	pub send_type: TypeTag,
	pub max_age: u16,
}

pub const HANDSHAKE_LEN: usize = 7;

impl Handshake {
	pub fn encode(&self) -> [u8; HANDSHAKE_LEN] {
		let mut buf = [0u8; HANDSHAKE_LEN];
		buf[0..2].copy_from_slice(&self.num_outputs.to_le_bytes());
		buf[2..4].copy_from_slice(&self.num_inputs.to_le_bytes());
		buf[4] = self.send_type.to_byte();
		buf[5..7].copy_from_slice(&self.max_age.to_le_bytes());
		buf
	}

	pub fn decode(bytes: &[u8]) -> Result<Self> {
		if bytes.len() != HANDSHAKE_LEN {
			return Err(Error::HandshakeLength { got: bytes.len() });
		}

		let num_outputs = u16::from_le_bytes([bytes[0], bytes[1]]);
		let num_inputs = u16::from_le_bytes([bytes[2], bytes[3]]);
		let send_type = TypeTag::from_byte(bytes[4]).unwrap_or(TypeTag::F32);
		let max_age = u16::from_le_bytes([bytes[5], bytes[6]]);

		Ok(Self { num_outputs, num_inputs, send_type, max_age })
	}
}

/// Encode `values` as a data frame: little-endian `f32`s followed by a
/// 2-byte little-endian CRC-16/CCITT-FALSE over those bytes.
pub fn encode_data_frame(values: &[f32]) -> Vec<u8> {
	let mut buf = Vec::with_capacity(values.len() * 4 + 2);

	for v in values {
		buf.extend_from_slice(&v.to_le_bytes());
	}

	let crc = Crc16::of(&buf);
	buf.extend_from_slice(&crc.to_le_bytes());

	buf
}

/// Outcome of decoding a received datagram, distinguishing the two silent
/// drop reasons the receive pipeline must count separately.
pub enum DecodeOutcome {
	Ok(Vec<f32>),
	Corrupted,
	ShapeInvalid,
}

/// Validate and decode a datagram expected to carry `num_inputs` floats.
///
/// Mirrors the receive pipeline's steps 4-6: too-short datagrams and
/// wrong-shape payloads are `ShapeInvalid`; a CRC mismatch is `Corrupted`.
pub fn decode_data_frame(datagram: &[u8], num_inputs: u16) -> DecodeOutcome {
	if datagram.len() < 2 {
		return DecodeOutcome::ShapeInvalid;
	}

	let (payload, crc_bytes) = datagram.split_at(datagram.len() - 2);
	let expected_crc = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);

	if Crc16::of(payload) != expected_crc {
		return DecodeOutcome::Corrupted;
	}

	let expected_len = num_inputs as usize * 4;
	if payload.len() != expected_len {
		return DecodeOutcome::ShapeInvalid;
	}

	let mut values = Vec::with_capacity(num_inputs as usize);
	for chunk in payload.chunks_exact(4) {
		values.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
	}

	DecodeOutcome::Ok(values)
}
