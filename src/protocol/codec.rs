use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::core::{Error, Telemetry};
use super::serial::SerialFrame;

/// Lines longer than this without a terminator are dropped
const MAX_LINE_LENGTH: usize = 1024;

/// Line codec for the microcontroller serial link
///
/// Decodes CRLF (or bare LF) terminated lines into frames, skipping lines
/// that carry no known tag. Encodes frames with their terminator.
#[derive(Clone, Debug, Default)]
pub struct SerialCodec;

impl SerialCodec {
    /// Creates a new serial codec
    pub fn new() -> Self {
        SerialCodec
    }
}

impl Decoder for SerialCodec {
    type Item = SerialFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(end) = src.iter().position(|&b| b == b'\n') else {
                if src.len() > MAX_LINE_LENGTH {
                    debug!(len = src.len(), "discarding unterminated serial data");
                    src.clear();
                }
                return Ok(None);
            };

            let line = src.split_to(end + 1);
            let text = String::from_utf8_lossy(&line);
            match SerialFrame::parse(&text) {
                Some(frame) => return Ok(Some(frame)),
                None => {
                    let text = text.trim_end();
                    if !text.is_empty() {
                        debug!(line = %text, "ignoring serial line");
                    }
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        // A trailing partial line is parsed as-is
        let rest = src.split();
        Ok(SerialFrame::parse(&String::from_utf8_lossy(&rest)))
    }
}

impl Encoder<SerialFrame> for SerialCodec {
    type Error = Error;

    fn encode(&mut self, item: SerialFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.to_line().as_bytes());
        Ok(())
    }
}

/// Decodes every complete telemetry line in `buf`, leaving any partial tail
pub fn drain_telemetry(codec: &mut SerialCodec, buf: &mut BytesMut) -> Result<Vec<Telemetry>, Error> {
    let mut out = Vec::new();
    while let Some(frame) = codec.decode(buf)? {
        if let SerialFrame::Data(telemetry) = frame {
            out.push(telemetry);
        }
    }
    Ok(out)
}
