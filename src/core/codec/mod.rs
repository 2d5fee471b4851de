//! Telephony codec negotiation and framing.
//!
//! A [`Codec`] is chosen once per call from the codecs offered in the caller's
//! SDP. It knows the token the AI backend uses for the same audio format and
//! splits the backend's audio stream into telephony-sized frames.
//!
//! # Framing
//!
//! The backend delivers audio in chunks of arbitrary length. [`Codec::parse`]
//! cuts as many whole frames as possible out of `leftover ++ chunk` and hands
//! the incomplete tail back to the caller, who must pass it in again with the
//! next chunk. Calling `parse(None, leftover)` flushes the tail as one last,
//! possibly short, packet.

mod g711;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

pub use g711::{G711_FRAME_BYTES, Pcma, Pcmu};

/// Errors raised while negotiating a codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// None of the offered codecs is supported
    #[error("No supported codec found in offer: [{0}]")]
    Unsupported(String),
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// A codec as it appears in an SDP offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferedCodec {
    /// Encoding name as written in the offer (e.g. "PCMA")
    pub name: String,
    /// RTP payload type
    pub payload_type: u8,
    /// Clock rate in Hz
    pub clock_rate: u32,
}

impl OfferedCodec {
    pub fn new(name: impl Into<String>, payload_type: u8, clock_rate: u32) -> Self {
        Self {
            name: name.into(),
            payload_type,
            clock_rate,
        }
    }
}

/// Output of a single [`Codec::parse`] step.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParseOutput {
    /// Complete packets, in stream order
    pub packets: Vec<Bytes>,
    /// Unconsumed tail to feed into the next call
    pub leftover: Vec<u8>,
}

/// Transcoder between the telephony payload and the backend audio format.
pub trait Codec: Send + Sync + fmt::Debug {
    /// Canonical lowercase codec name ("pcma", "pcmu").
    fn name(&self) -> &'static str;

    /// Audio format token the AI backend expects for this codec.
    fn backend_format(&self) -> &'static str;

    /// RTP payload type negotiated for this call.
    fn payload_type(&self) -> u8;

    /// Clock rate in Hz.
    fn clock_rate(&self) -> u32;

    /// Packet size in bytes for one frame.
    fn frame_bytes(&self) -> usize;

    /// One frame of encoded silence.
    fn silence_packet(&self) -> Bytes;

    /// Split `leftover ++ chunk` into frames.
    ///
    /// With `chunk == None` any non-empty leftover is emitted as a final
    /// packet and the returned leftover is empty.
    fn parse(&self, chunk: Option<&[u8]>, leftover: &[u8]) -> ParseOutput {
        frame_stream(self.frame_bytes(), chunk, leftover)
    }
}

/// Shared handle to the codec negotiated for a call.
pub type SharedCodec = Arc<dyn Codec>;

/// Supported codecs, highest priority first.
pub const CODEC_PRIORITY: &[&str] = &["pcma", "pcmu"];

/// Pick the highest-priority supported codec from an offer.
pub fn choose_codec(offered: &[OfferedCodec]) -> CodecResult<SharedCodec> {
    for preferred in CODEC_PRIORITY {
        if let Some(codec) = offered
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(preferred))
        {
            return Ok(build_codec(preferred, codec.payload_type));
        }
    }

    let names = offered
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    Err(CodecError::Unsupported(names))
}

fn build_codec(name: &str, payload_type: u8) -> SharedCodec {
    match name {
        "pcma" => Arc::new(Pcma::new(payload_type)),
        _ => Arc::new(Pcmu::new(payload_type)),
    }
}

/// Fixed-size framing shared by the G.711 codecs.
fn frame_stream(frame: usize, chunk: Option<&[u8]>, leftover: &[u8]) -> ParseOutput {
    let Some(chunk) = chunk else {
        let packets = if leftover.is_empty() {
            Vec::new()
        } else {
            vec![Bytes::copy_from_slice(leftover)]
        };
        return ParseOutput {
            packets,
            leftover: Vec::new(),
        };
    };

    let mut buffer = Vec::with_capacity(leftover.len() + chunk.len());
    buffer.extend_from_slice(leftover);
    buffer.extend_from_slice(chunk);

    let whole = buffer.len() - buffer.len() % frame;
    let packets = buffer[..whole]
        .chunks_exact(frame)
        .map(Bytes::copy_from_slice)
        .collect();
    let leftover = buffer.split_off(whole);

    ParseOutput { packets, leftover }
}
