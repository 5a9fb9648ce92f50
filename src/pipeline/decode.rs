//! Streaming decoder (Bytes -> JSON Value)

use crate::BoxStream;
use bytes::{Buf, Bytes, BytesMut};
use futures::{stream, StreamExt};
use serde_json::Value;

/// A minimal SSE decoder:
/// - buffers raw bytes and splits by a blank line (`\n\n` or `\r\n\r\n`)
/// - decodes UTF-8 only once a frame is complete
/// - joins the `data:` lines of a frame
/// - skips comment frames (`: OPENROUTER PROCESSING`) and non-JSON payloads
/// - stops on `[DONE]`
pub struct SseDecoder {
    done_signal: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            done_signal: "[DONE]".to_string(),
        }
    }

    pub fn decode_stream(&self, input: BoxStream<'static, Bytes>) -> BoxStream<'static, Value> {
        let done_signal = self.done_signal.clone();

        // Incrementally buffer bytes and emit full frames split by a blank line.
        let stream = stream::unfold(
            (input, BytesMut::new(), false),
            move |(mut input, mut buf, finished)| {
                let done_signal = done_signal.clone();
                async move {
                    if finished {
                        return None;
                    }
                    loop {
                        if let Some((idx, delimiter_len)) = find_frame_end(&buf) {
                            let raw = buf.split_to(idx);
                            buf.advance(delimiter_len);

                            match parse_frame(&String::from_utf8_lossy(&raw), &done_signal) {
                                Frame::Done => return None,
                                Frame::Json(v) => return Some((Ok(v), (input, buf, false))),
                                Frame::Skip => continue,
                            }
                        }

                        // Need more data.
                        match input.next().await {
                            Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                            Some(Err(e)) => {
                                return Some((Err(e), (input, buf, true)));
                            }
                            None => {
                                // EOF: try parse remaining buffer once
                                let rest = String::from_utf8_lossy(&buf).into_owned();
                                return match parse_frame(&rest, &done_signal) {
                                    Frame::Json(v) => Some((Ok(v), (input, BytesMut::new(), true))),
                                    _ => None,
                                };
                            }
                        }
                    }
                }
            },
        );

        Box::pin(stream)
    }
}

/// Offset and length of the first blank-line delimiter in `buf`.
fn find_frame_end(buf: &[u8]) -> Option<(usize, usize)> {
    (0..buf.len()).find_map(|i| {
        let rest = &buf[i..];
        if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else if rest.starts_with(b"\n\n") {
            Some((i, 2))
        } else {
            None
        }
    })
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

enum Frame {
    Json(Value),
    Done,
    Skip,
}

fn parse_frame(raw: &str, done_signal: &str) -> Frame {
    let mut data_lines: Vec<&str> = Vec::new();
    for line in raw.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start());
        } else if !line.contains(':') || line.starts_with('{') {
            // Bare JSON without SSE framing.
            data_lines.push(line);
        }
    }

    if data_lines.is_empty() {
        return Frame::Skip;
    }
    let payload = data_lines.join("\n");
    let payload = payload.trim();
    if payload == done_signal {
        return Frame::Done;
    }
    match serde_json::from_str(payload) {
        Ok(v) => Frame::Json(v),
        Err(_) => Frame::Skip,
    }
}
