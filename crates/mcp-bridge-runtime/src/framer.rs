//! Newline-delimited JSON-RPC framing over child stdio.
//!
//! One JSON value per `\n`-terminated line. `\r\n` is tolerated, blank lines
//! are skipped, and a line longer than the configured maximum is discarded up
//! to the next newline.
//!
//! Decoding never fails on bad input: an unparseable or oversized line is
//! yielded as [`Frame::Malformed`] and framing resumes at the next boundary.
//! Only I/O errors end the stream.

use std::io;

use thiserror::Error;
use tokio_util::bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::Message;

/// Bytes of a malformed line kept for diagnostics.
const PREVIEW_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("stdio error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One decoded unit of the stdout stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Message(Message),
    Malformed {
        /// Leading bytes of the offending line.
        preview: String,
        reason: String,
    },
}

/// Codec for [`FramedRead`](tokio_util::codec::FramedRead) /
/// [`FramedWrite`](tokio_util::codec::FramedWrite) over child stdio.
#[derive(Debug, Clone)]
pub struct JsonRpcCodec {
    max_frame_len: usize,
    /// Index into the buffer already scanned for `\n`.
    next_index: usize,
    /// Dropping the remainder of an oversized line.
    discarding: bool,
}

impl JsonRpcCodec {
    pub const fn new(max_frame_len: usize) -> Self {
        Self {
            max_frame_len,
            next_index: 0,
            discarding: false,
        }
    }

    pub const fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

fn parse_line(line: &[u8]) -> Frame {
    match serde_json::from_slice(line)
        .map_err(|e| e.to_string())
        .and_then(Message::from_value)
    {
        Ok(message) => Frame::Message(message),
        Err(reason) => Frame::Malformed {
            preview: preview(line),
            reason,
        },
    }
}

fn preview(bytes: &[u8]) -> String {
    let end = bytes.len().min(PREVIEW_LEN);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn trim_line(mut line: &[u8]) -> &[u8] {
    if let [rest @ .., b'\r'] = line {
        line = rest;
    }
    line
}

impl Decoder for JsonRpcCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        loop {
            let read_to = buf.len().min(self.max_frame_len.saturating_add(1));
            let newline = buf[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| offset + self.next_index);

            match (self.discarding, newline) {
                (true, Some(idx)) => {
                    buf.advance(idx + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    buf.advance(read_to);
                    self.next_index = 0;
                    if buf.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(idx)) => {
                    self.next_index = 0;
                    let line = buf.split_to(idx + 1);
                    let line = trim_line(&line[..idx]);
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    return Ok(Some(parse_line(line)));
                }
                (false, None) if buf.len() > self.max_frame_len => {
                    self.discarding = true;
                    self.next_index = 0;
                    return Ok(Some(Frame::Malformed {
                        preview: preview(buf),
                        reason: format!("frame exceeds {} bytes", self.max_frame_len),
                    }));
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }

        // Unterminated final line.
        self.next_index = 0;
        if self.discarding || buf.is_empty() {
            self.discarding = false;
            buf.clear();
            return Ok(None);
        }
        let line = buf.split_to(buf.len());
        let line = trim_line(&line);
        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(parse_line(line)))
    }
}

impl Encoder<&Message> for JsonRpcCodec {
    type Error = FrameError;

    fn encode(&mut self, message: &Message, dst: &mut BytesMut) -> Result<(), FrameError> {
        // Compact serialization never contains a raw newline.
        let json = serde_json::to_vec(&message.to_value())?;
        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}

impl Encoder<Message> for JsonRpcCodec {
    type Error = FrameError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), FrameError> {
        <Self as Encoder<&Message>>::encode(self, &message, dst)
    }
}
