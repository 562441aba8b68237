use super::client::{AskRequest, ByteStream, StreamSource};
use super::error::TransportError;
use super::logging::emit_frame_parse_error;
use crate::types::Frame;
use futures::{stream, Stream, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::pin::Pin;

pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

const DEFAULT_EVENT: &str = "message";

/// Incremental event-stream decoder.
///
/// Bytes are buffered undecoded until a record boundary arrives, so a
/// multi-byte character split across chunks decodes the same as if it had
/// arrived whole.
#[derive(Default)]
pub struct StreamParser {
    buffer: Vec<u8>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        let mut start = 0;

        while let Some((record_end, next_start)) = find_record_end(&self.buffer[start..]) {
            let record = String::from_utf8_lossy(&self.buffer[start..start + record_end]);
            if let Some(frame) = parse_record(&record) {
                frames.push(frame);
            }
            start += next_start;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }
        frames
    }

    /// Discard whatever is left once the source closes. A record without its
    /// terminating blank line is incomplete and never yielded.
    pub fn flush(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        rest
    }
}

// Returns (end of record, start of the next one).
fn find_record_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let mut index = 0;
    while index < buffer.len() {
        if buffer[index] == b'\n' {
            let rest = &buffer[index + 1..];
            if rest.starts_with(b"\n") {
                return Some((index, index + 2));
            }
            if rest.starts_with(b"\r\n") {
                return Some((index, index + 3));
            }
        }
        index += 1;
    }
    None
}

fn parse_record(record: &str) -> Option<Frame> {
    let mut event: Option<String> = None;
    let mut data = String::new();

    for line in record.split('\n').map(|line| line.trim_end_matches('\r')) {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data.push_str(rest.trim());
        }
    }

    if data.is_empty() {
        return None;
    }

    let event = event
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_EVENT.to_string());
    let payload = match serde_json::from_str::<Value>(&data) {
        Ok(value) => value,
        Err(error) => {
            emit_frame_parse_error(&event, &data, &error);
            json!({ "text": data })
        }
    };
    Some(Frame::new(event, payload))
}

struct DecoderState {
    bytes: ByteStream,
    parser: StreamParser,
    pending: VecDeque<Frame>,
    finished: bool,
}

/// Turn a response byte stream into a lazy sequence of frames that ends when
/// the source closes. A source error is yielded once and ends the sequence.
pub fn decode_frames(bytes: ByteStream) -> FrameStream {
    let state = DecoderState {
        bytes,
        parser: StreamParser::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.pending.pop_front() {
                return Some((Ok(frame), state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => state.pending.extend(state.parser.process(&chunk)),
                Some(Err(error)) => {
                    state.finished = true;
                    return Some((Err(error), state));
                }
                None => {
                    state.finished = true;
                    let rest = state.parser.flush();
                    if !rest.trim().is_empty() {
                        tracing::debug!(bytes = rest.len(), "dropping unterminated trailing record");
                    }
                }
            }
        }
    }))
}

/// Issue one request and expose its frames. Transport failures surface here,
/// before any frame is yielded.
pub async fn open_frames(
    source: &dyn StreamSource,
    request: &AskRequest,
) -> Result<FrameStream, TransportError> {
    let bytes = source.open(request).await?;
    Ok(decode_frames(bytes))
}
