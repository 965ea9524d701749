//! Wire protocols
//!
//! Two independent formats reach the outside world: the little-endian
//! radio advertisement payload and the CRLF text protocol spoken with the
//! attached microcontroller.

pub mod advert;
pub mod codec;
pub mod serial;

pub use self::advert::{hex_bytes, AdvertLayout, Advertisement};
pub use self::codec::SerialCodec;
pub use self::serial::{SerialFrame, LINE_TERMINATOR};

/// Receive buffer size of the microcontroller UART, in bytes
pub const SERIAL_CHUNK_SIZE: usize = 64;
