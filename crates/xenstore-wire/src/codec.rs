use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};
use crate::op::Operation;

/// Header: operation (4) + request id (4) + transaction id (4) + length (4) = 16 bytes.
pub const HEADER_SIZE: usize = 16;

/// Maximum logical payload (excluding the trailing NUL) accepted by `Packet::new`.
pub const MAX_PAYLOAD: usize = 4096;

/// Field separator and payload terminator.
pub const NUL: u8 = 0x00;

/// Fixed-size packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub operation: Operation,
    pub request_id: u32,
    /// Transaction the request belongs to, 0 when outside a transaction.
    pub transaction_id: u32,
    pub payload_len: u32,
}

impl PacketHeader {
    /// Parse a header from the first `HEADER_SIZE` bytes of `src`.
    ///
    /// Callers must ensure `src` holds at least `HEADER_SIZE` bytes.
    pub fn decode(src: &[u8]) -> Result<Self> {
        Self::decode_raw(RawHeader::decode(src))
    }

    pub(crate) fn decode_raw(raw: RawHeader) -> Result<Self> {
        let operation = Operation::from_u32(raw.code).ok_or_else(|| raw.unknown())?;
        Ok(Self {
            operation,
            request_id: raw.request_id,
            transaction_id: raw.transaction_id,
            payload_len: raw.payload_len,
        })
    }

    /// Append the 16-byte encoding of this header to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.operation.as_u32());
        dst.put_u32_le(self.request_id);
        dst.put_u32_le(self.transaction_id);
        dst.put_u32_le(self.payload_len);
    }
}

/// Header fields before the operation code is interpreted.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawHeader {
    pub(crate) code: u32,
    pub(crate) request_id: u32,
    pub(crate) transaction_id: u32,
    pub(crate) payload_len: u32,
}

impl RawHeader {
    pub(crate) fn decode(mut src: &[u8]) -> Self {
        Self {
            code: src.get_u32_le(),
            request_id: src.get_u32_le(),
            transaction_id: src.get_u32_le(),
            payload_len: src.get_u32_le(),
        }
    }

    pub(crate) fn unknown(&self) -> WireError {
        WireError::UnknownOperation {
            code: self.code,
            request_id: self.request_id,
            payload_len: self.payload_len,
        }
    }
}

/// One framed protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    /// Encoded payload, including the trailing NUL for locally built packets.
    pub payload: Bytes,
}

impl Packet {
    /// Build a packet for sending, appending the NUL terminator to `payload`.
    ///
    /// Fails with [`WireError::PayloadTooLarge`] when the logical payload is
    /// longer than [`MAX_PAYLOAD`].
    pub fn new(
        operation: Operation,
        request_id: u32,
        transaction_id: u32,
        payload: impl AsRef<[u8]>,
    ) -> Result<Self> {
        let logical = payload.as_ref();
        if logical.len() > MAX_PAYLOAD {
            return Err(WireError::PayloadTooLarge {
                size: logical.len(),
                max: MAX_PAYLOAD,
            });
        }

        let mut buf = BytesMut::with_capacity(logical.len() + 1);
        buf.put_slice(logical);
        buf.put_u8(NUL);

        Ok(Self {
            header: PacketHeader {
                operation,
                request_id,
                transaction_id,
                payload_len: buf.len() as u32,
            },
            payload: buf.freeze(),
        })
    }

    /// Build a packet from a received header and payload, unchanged.
    pub fn from_wire(header: PacketHeader, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    pub fn operation(&self) -> Operation {
        self.header.operation
    }

    pub fn request_id(&self) -> u32 {
        self.header.request_id
    }

    pub fn transaction_id(&self) -> u32 {
        self.header.transaction_id
    }

    /// True when the backend answered with an error packet.
    pub fn is_error(&self) -> bool {
        self.header.operation == Operation::Error
    }

    /// The payload as a single string with NULs trimmed from both edges.
    pub fn payload_text(&self) -> String {
        let bytes = self.payload.as_ref();
        let start = bytes.iter().position(|b| *b != NUL).unwrap_or(bytes.len());
        let end = bytes
            .iter()
            .rposition(|b| *b != NUL)
            .map_or(start, |pos| pos + 1);
        String::from_utf8_lossy(&bytes[start..end]).into_owned()
    }

    /// The payload split on every NUL, in order.
    ///
    /// A payload ending in NUL yields a trailing empty field.
    pub fn payload_fields(&self) -> Vec<String> {
        self.payload
            .split(|b| *b == NUL)
            .map(|field| String::from_utf8_lossy(field).into_owned())
            .collect()
    }

    /// The error token carried by an error packet, if this is one.
    pub fn error_token(&self) -> Option<String> {
        self.is_error().then(|| self.payload_text())
    }

    /// The total wire size of this packet (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a packet into the wire format.
///
/// The header length is recomputed from the payload, so a hand-edited
/// header can never disagree with the bytes that follow it.
///
/// Wire format:
/// ```text
/// ┌────────────┬────────────┬────────────┬────────────┬──────────────────┐
/// │ Op (4B LE) │ ReqId (4B) │ TxId (4B)  │ Len (4B)   │ Payload          │
/// │            │            │ 0 = none   │            │ (Len bytes)      │
/// └────────────┴────────────┴────────────┴────────────┴──────────────────┘
/// ```
pub fn encode_packet(packet: &Packet, dst: &mut BytesMut) -> Result<()> {
    let len = packet.payload.len();
    if len > u32::MAX as usize {
        return Err(WireError::PayloadTooLarge {
            size: len,
            max: u32::MAX as usize,
        });
    }

    let header = PacketHeader {
        payload_len: len as u32,
        ..packet.header
    };
    dst.reserve(HEADER_SIZE + len);
    header.encode_into(dst);
    dst.put_slice(&packet.payload);
    Ok(())
}

/// Decode a packet from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete packet yet.
/// On success, consumes the packet bytes from the buffer.
///
/// A complete frame with an unknown operation code is consumed as well and
/// reported as [`WireError::UnknownOperation`], so decoding can resume with
/// the next frame.
pub fn decode_packet(src: &mut BytesMut) -> Result<Option<Packet>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let raw = RawHeader::decode(&src[..HEADER_SIZE]);
    let total = HEADER_SIZE + raw.payload_len as usize;
    if src.len() < total {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(raw.payload_len as usize).freeze();

    let header = PacketHeader::decode_raw(raw)?;
    Ok(Some(Packet { header, payload }))
}
