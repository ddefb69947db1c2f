//! Hand-off between the capture context and the decode context.
//!
//! The capture side only copies words, signal strength and timestamp into a
//! fixed-capacity lock-free SPSC ring. It never decodes, allocates or locks.
//! The decode side drains the ring and feeds the directory.
//!
//! ```
//! use squitter_core::capture::CaptureQueue;
//! use squitter_core::directory::AircraftDirectory;
//!
//! let mut queue: CaptureQueue<16> = CaptureQueue::new();
//! let (mut producer, mut consumer) = queue.split();
//! let mut directory = AircraftDirectory::default();
//!
//! producer.on_capture(&[0x8D4840D6, 0x202CC371, 0xC32CE057, 0x0000C131], 1.0, 900.0);
//! let summary = consumer.drain_into(&mut directory);
//! assert_eq!(summary.ingested, 1);
//! assert_eq!(directory.num_aircraft(), 1);
//! ```

use heapless::spsc::{Consumer, Producer, Queue};

use crate::directory::AircraftDirectory;
use crate::frame::RawMessage;

/// Fixed-capacity capture ring. Holds at most `N - 1` messages.
pub struct CaptureQueue<const N: usize> {
    queue: Queue<RawMessage, N>,
}

impl<const N: usize> Default for CaptureQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> CaptureQueue<N> {
    pub const fn new() -> Self {
        CaptureQueue {
            queue: Queue::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Split into the capture-side and decode-side handles.
    pub fn split(&mut self) -> (CaptureProducer<'_, N>, CaptureConsumer<'_, N>) {
        let (producer, consumer) = self.queue.split();
        (
            CaptureProducer {
                producer,
                dropped: 0,
            },
            CaptureConsumer { consumer },
        )
    }
}

/// Capture-side handle. Owned by whatever receives hardware events.
pub struct CaptureProducer<'a, const N: usize> {
    producer: Producer<'a, RawMessage, N>,
    dropped: u64,
}

impl<const N: usize> CaptureProducer<'_, N> {
    /// Record one captured message. Returns `false` and counts a drop when
    /// the ring is full.
    pub fn on_capture(&mut self, words: &[u32], timestamp: f64, rssi: f64) -> bool {
        self.push(RawMessage::from_capture(words, timestamp, rssi))
    }

    pub fn push(&mut self, raw: RawMessage) -> bool {
        match self.producer.enqueue(raw) {
            Ok(()) => true,
            Err(_) => {
                self.dropped += 1;
                false
            }
        }
    }

    /// Captures lost to a full ring so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Counts from one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub ingested: usize,
    pub failed: usize,
}

/// Decode-side handle.
pub struct CaptureConsumer<'a, const N: usize> {
    consumer: Consumer<'a, RawMessage, N>,
}

impl<const N: usize> CaptureConsumer<'_, N> {
    pub fn poll(&mut self) -> Option<RawMessage> {
        self.consumer.dequeue()
    }

    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.len() == 0
    }

    /// Ingest everything currently queued.
    pub fn drain_into(&mut self, directory: &mut AircraftDirectory) -> DrainSummary {
        let mut summary = DrainSummary::default();
        while let Some(raw) = self.consumer.dequeue() {
            match directory.ingest_packet(&raw) {
                Ok(_) => summary.ingested += 1,
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
