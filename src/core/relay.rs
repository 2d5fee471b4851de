//! Audio relay queue between an AI session and the telephony sender.
//!
//! The session enqueues decoded packets, the sender dequeues one per packetization
//! interval. Neither side ever waits on the other: `enqueue` never blocks,
//! `try_dequeue` returns `None` when empty, and `drain` discards everything queued
//! so far in one step (used on barge-in).

use std::collections::VecDeque;

use bytes::Bytes;
use parking_lot::Mutex;

/// Per-call FIFO of outbound audio packets.
#[derive(Debug, Default)]
pub struct RelayQueue {
    packets: Mutex<VecDeque<Bytes>>,
}

impl RelayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a packet for playback.
    pub fn enqueue(&self, packet: Bytes) {
        self.packets.lock().push_back(packet);
    }

    /// Append several packets, keeping their order.
    pub fn extend<I>(&self, packets: I)
    where
        I: IntoIterator<Item = Bytes>,
    {
        self.packets.lock().extend(packets);
    }

    /// Take the next packet, or `None` when nothing is queued.
    pub fn try_dequeue(&self) -> Option<Bytes> {
        self.packets.lock().pop_front()
    }

    /// Discard every queued packet and return how many were dropped.
    pub fn drain(&self) -> usize {
        let mut packets = self.packets.lock();
        let count = packets.len();
        packets.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.packets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.lock().is_empty()
    }
}
