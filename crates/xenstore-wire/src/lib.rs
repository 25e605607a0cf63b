//! XenStore wire protocol.
//!
//! Every message exchanged with a XenStore backend is framed with a fixed
//! 16-byte little-endian header:
//! - operation code (4 bytes)
//! - request id (4 bytes)
//! - transaction id (4 bytes, 0 = none)
//! - payload length (4 bytes)
//!
//! followed by a payload of NUL-separated fields with one trailing NUL.

pub mod codec;
pub mod error;
pub mod op;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_packet, encode_packet, Packet, PacketHeader, HEADER_SIZE, MAX_PAYLOAD, NUL,
};
pub use error::{Result, WireError};
pub use op::Operation;
pub use reader::PacketReader;
pub use writer::PacketWriter;
