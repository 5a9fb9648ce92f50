//! 流水线处理模块：把上游原始字节流解码为文本片段。
//!
//! # Streaming Pipeline
//!
//! Both upstream providers answer with Server-Sent Events whose `data:` payloads
//! are JSON frames. The pipeline turns the raw byte stream into a stream of text
//! deltas:
//!
//! ```text
//! Raw Bytes → SseDecoder → JSON frames → FrameMapper → text deltas
//! ```
//!
//! Empty deltas (role announcements, finish markers) are dropped here, so the
//! first item a caller sees is real output.

pub mod decode;

pub use decode::SseDecoder;

use crate::{BoxStream, Result};
use bytes::Bytes;
use futures::{future, StreamExt};
use serde_json::Value;

/// Provider-specific extraction of text from one decoded frame.
///
/// Returning `Err` surfaces an in-stream error object (e.g. a throttling notice
/// delivered after the HTTP 200) to the consumer.
pub trait FrameMapper: Send + Sync + 'static {
    fn map_frame(&self, frame: &Value) -> Result<Option<String>>;
}

/// Decode an SSE byte stream and map every frame to its text delta.
pub fn text_stream<M: FrameMapper>(
    input: BoxStream<'static, Bytes>,
    mapper: M,
) -> BoxStream<'static, String> {
    let frames = SseDecoder::new().decode_stream(input);
    let texts = frames.filter_map(move |item| {
        let out = match item {
            Ok(frame) => mapper.map_frame(&frame).transpose(),
            Err(e) => Some(Err(e)),
        };
        let out = match out {
            Some(Ok(text)) if text.is_empty() => None,
            other => other,
        };
        future::ready(out)
    });
    Box::pin(texts)
}
