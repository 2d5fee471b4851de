//! G.711 A-law and µ-law.
//!
//! Both variants carry 8-bit samples at 8 kHz, so the backend's `g711_*`
//! output maps one-to-one onto RTP payload bytes and only framing is needed.

use bytes::Bytes;

use super::Codec;

/// Sample rate of G.711.
pub const G711_CLOCK_RATE: u32 = 8000;

/// Packetization time in milliseconds.
pub const G711_PTIME_MS: u32 = 20;

/// Bytes per 20 ms G.711 frame.
pub const G711_FRAME_BYTES: usize = (G711_CLOCK_RATE * G711_PTIME_MS / 1000) as usize;

const ALAW_SILENCE: u8 = 0xD5;
const ULAW_SILENCE: u8 = 0xFF;

/// G.711 A-law (PCMA).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pcma {
    payload_type: u8,
}

impl Pcma {
    pub fn new(payload_type: u8) -> Self {
        Self { payload_type }
    }
}

impl Codec for Pcma {
    fn name(&self) -> &'static str {
        "pcma"
    }

    fn backend_format(&self) -> &'static str {
        "g711_alaw"
    }

    fn payload_type(&self) -> u8 {
        self.payload_type
    }

    fn clock_rate(&self) -> u32 {
        G711_CLOCK_RATE
    }

    fn frame_bytes(&self) -> usize {
        G711_FRAME_BYTES
    }

    fn silence_packet(&self) -> Bytes {
        Bytes::from(vec![ALAW_SILENCE; G711_FRAME_BYTES])
    }
}

/// G.711 µ-law (PCMU).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pcmu {
    payload_type: u8,
}

impl Pcmu {
    pub fn new(payload_type: u8) -> Self {
        Self { payload_type }
    }
}

impl Codec for Pcmu {
    fn name(&self) -> &'static str {
        "pcmu"
    }

    fn backend_format(&self) -> &'static str {
        "g711_ulaw"
    }

    fn payload_type(&self) -> u8 {
        self.payload_type
    }

    fn clock_rate(&self) -> u32 {
        G711_CLOCK_RATE
    }

    fn frame_bytes(&self) -> usize {
        G711_FRAME_BYTES
    }

    fn silence_packet(&self) -> Bytes {
        Bytes::from(vec![ULAW_SILENCE; G711_FRAME_BYTES])
    }
}
