//! Streaming response protocol
//!
//! A response body carries UTF-8 content chunks, then the sentinel `\0\n`,
//! then exactly one status token: `success` or `failure`. Metadata (message
//! ids, redirect target) travels in response headers, never in the body.

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::{Result, RunnerError};

/// Boundary between content and status
pub const SENTINEL: &[u8] = b"\0\n";

pub const HEADER_AI_MESSAGE_ID: &str = "x-ai-message-id";
pub const HEADER_CHAT_ID: &str = "x-chat-id";
pub const HEADER_SENT_MESSAGE_ID: &str = "x-sent-message-id";
pub const HEADER_REDIRECT: &str = "x-redirect";

pub const CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Trailing status of a response stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Success,
    Failure,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    fn token(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

/// Frame a content chunk. NUL bytes are dropped so content can never
/// contain the sentinel.
pub fn encode_content(text: &str) -> Bytes {
    if text.contains('\0') {
        Bytes::from(text.replace('\0', ""))
    } else {
        Bytes::copy_from_slice(text.as_bytes())
    }
}

/// Frame the trailing status, sentinel included
pub fn encode_status(status: StreamStatus) -> Bytes {
    let mut out = Vec::with_capacity(SENTINEL.len() + 7);
    out.extend_from_slice(SENTINEL);
    out.extend_from_slice(status.token());
    Bytes::from(out)
}

/// Decoder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Streaming,
    StatusPending,
    Done,
}

/// Output of the decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    Text(String),
    Status(StreamStatus),
}

/// Incremental decoder for the response protocol.
///
/// Chunk boundaries are arbitrary: the sentinel, a status token or a
/// multi-byte character may be split across pushes.
#[derive(Debug)]
pub struct ResponseDecoder {
    state: DecoderState,
    pending: Vec<u8>,
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Streaming,
            pending: Vec::new(),
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Feed the next chunk of the body
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<DecodedFrame>> {
        let mut frames = Vec::new();
        match self.state {
            DecoderState::Done => return Ok(frames),
            DecoderState::StatusPending => {
                self.pending.extend_from_slice(chunk);
                self.check_status(&mut frames)?;
            }
            DecoderState::Streaming => {
                self.pending.extend_from_slice(chunk);
                if let Some(at) = find_sentinel(&self.pending) {
                    let status = self.pending.split_off(at + SENTINEL.len());
                    self.pending.truncate(at);
                    let text = take_text(&mut self.pending, true)?;
                    push_text(&mut frames, text);

                    self.state = DecoderState::StatusPending;
                    self.pending = status;
                    self.check_status(&mut frames)?;
                } else {
                    let text = take_text(&mut self.pending, false)?;
                    push_text(&mut frames, text);
                }
            }
        }
        Ok(frames)
    }

    /// Signal end of input. Fails unless a status was received.
    pub fn finish(&self) -> Result<()> {
        match self.state {
            DecoderState::Done => Ok(()),
            DecoderState::StatusPending => Err(RunnerError::protocol(
                "stream ended before the status token was complete",
            )),
            DecoderState::Streaming => {
                Err(RunnerError::protocol("stream ended without a status"))
            }
        }
    }

    fn check_status(&mut self, frames: &mut Vec<DecodedFrame>) -> Result<()> {
        for status in [StreamStatus::Success, StreamStatus::Failure] {
            let token = status.token();
            if self.pending.starts_with(token) {
                self.state = DecoderState::Done;
                self.pending.clear();
                frames.push(DecodedFrame::Status(status));
                return Ok(());
            }
            if token.starts_with(&self.pending) {
                return Ok(());
            }
        }
        Err(RunnerError::protocol(format!(
            "invalid status {:?}",
            String::from_utf8_lossy(&self.pending)
        )))
    }
}

fn find_sentinel(buf: &[u8]) -> Option<usize> {
    buf.windows(SENTINEL.len()).position(|w| w == SENTINEL)
}

fn push_text(frames: &mut Vec<DecodedFrame>, text: String) {
    if !text.is_empty() {
        frames.push(DecodedFrame::Text(text));
    }
}

/// Drain the decodable prefix of `buf`. Unless `complete`, a trailing NUL
/// (possible sentinel start) and an unfinished UTF-8 sequence stay behind.
fn take_text(buf: &mut Vec<u8>, complete: bool) -> Result<String> {
    let mut end = buf.len();
    if !complete && buf.last() == Some(&0) {
        end -= 1;
    }

    let valid = match std::str::from_utf8(&buf[..end]) {
        Ok(_) => end,
        Err(e) if e.error_len().is_none() && !complete => e.valid_up_to(),
        Err(e) => {
            return Err(RunnerError::protocol(format!(
                "content is not valid UTF-8: {}",
                e
            )))
        }
    };

    let rest = buf.split_off(valid);
    let text = std::mem::replace(buf, rest);
    String::from_utf8(text).map_err(|e| RunnerError::protocol(e.to_string()))
}

/// Decode a body stream into frames. A missing or invalid status ends the
/// stream with a protocol error.
pub fn decode_stream<S, E>(body: S) -> impl Stream<Item = Result<DecodedFrame>> + Send + 'static
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut decoder = ResponseDecoder::new();
        futures::pin_mut!(body);
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(RunnerError::protocol(format!("body read failed: {}", e)));
                    return;
                }
            };
            match decoder.push(&chunk) {
                Ok(frames) => {
                    for frame in frames {
                        yield Ok(frame);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
            if decoder.state() == DecoderState::Done {
                return;
            }
        }
        if let Err(e) = decoder.finish() {
            yield Err(e);
        }
    }
}

/// Split decoded frames into visible text and a success signal.
///
/// The signal resolves exactly once, as the text stream is driven to its end:
/// `true` for `success`, `false` for `failure` or any protocol error.
pub fn demux<S>(frames: S) -> (BoxStream<'static, Result<String>>, oneshot::Receiver<bool>)
where
    S: Stream<Item = Result<DecodedFrame>> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let text = async_stream::stream! {
        let mut tx = Some(tx);
        futures::pin_mut!(frames);
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(DecodedFrame::Text(text)) => {
                    yield Ok(text);
                }
                Ok(DecodedFrame::Status(status)) => {
                    if let Some(tx) = tx.take() {
                        let _ = tx.send(status.is_success());
                    }
                }
                Err(e) => {
                    if let Some(tx) = tx.take() {
                        let _ = tx.send(false);
                    }
                    yield Err(e);
                    break;
                }
            }
        }
        if let Some(tx) = tx.take() {
            let _ = tx.send(false);
        }
    };
    (Box::pin(text), rx)
}
