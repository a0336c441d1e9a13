//! Line-delimited JSON framing for `tokio_util::codec`.
//!
//! The bulb terminates every message with `\r\n`. Blank lines are
//! skipped. Each complete line decodes to its own `Result`, so one line
//! that is not JSON does not end the stream. Only a line longer than
//! [`MAX_LINE_LENGTH`] is a framing error.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::DeviceError;
use crate::yeelight::message::{Incoming, Request};

pub const MAX_LINE_LENGTH: usize = 16 * 1024;

#[derive(Debug, Default)]
pub struct YeelightCodec {
    /// How far into the buffer we already searched for `\n`.
    scanned: usize,
}

impl Decoder for YeelightCodec {
    type Item = Result<Incoming, DeviceError>;
    type Error = DeviceError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline = src[self.scanned..].iter().position(|b| *b == b'\n');
            let Some(offset) = newline else {
                if src.len() > MAX_LINE_LENGTH {
                    return Err(DeviceError::Malformed(format!(
                        "line exceeds {MAX_LINE_LENGTH} bytes"
                    )));
                }
                self.scanned = src.len();
                return Ok(None);
            };

            let line = src.split_to(self.scanned + offset + 1);
            self.scanned = 0;

            let text = trim_line(&line);
            if text.is_empty() {
                continue;
            }
            return Ok(Some(serde_json::from_slice(text).map_err(Into::into)));
        }
    }
}

impl Encoder<Request> for YeelightCodec {
    type Error = DeviceError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&item)?;
        dst.reserve(body.len() + 2);
        dst.put_slice(&body);
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r' | b' ' | b'\t') {
        end -= 1;
    }
    let mut start = 0;
    while start < end && matches!(line[start], b' ' | b'\t') {
        start += 1;
    }
    &line[start..end]
}
