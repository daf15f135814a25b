//! Triple-buffered producer/consumer frame hand-off
//!
//! Three owned slots decouple a capture callback from the application
//! thread: the consumer half owns "front", the producer half owns "back",
//! and "middle" sits behind a mutex that is only ever held for an O(1)
//! buffer swap. Neither side can block the other for longer than that swap,
//! and the consumer can never observe a partially written frame.

use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam::utils::CachePadded;

/// One owned pixel buffer plus its sequence number
#[derive(Debug, Default)]
pub struct FrameSlot {
    pixels: Vec<u8>,
    number: u64,
}

impl FrameSlot {
    fn sized(frame_len: usize) -> Self {
        Self {
            pixels: vec![0; frame_len],
            number: 0,
        }
    }
}

/// The middle slot and its "updated" flag. `updated` is true iff the slot
/// holds a published frame not yet adopted into the front slot.
struct Middle {
    slot: FrameSlot,
    updated: bool,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    adopted: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of a buffer's delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub published: u64,
    pub adopted: u64,
    pub dropped: u64,
}

/// Consumer half of the triple buffer; owns the front slot
pub struct TripleBuffer {
    front: FrameSlot,
    shared: Arc<Mutex<Middle>>,
    counters: Arc<CachePadded<Counters>>,
    frame_len: usize,
}

/// Producer half; owns the back slot and writes it without any locking.
/// The back slot is private to the producer until published.
pub struct FrameWriter {
    back: FrameSlot,
    shared: Arc<Mutex<Middle>>,
    counters: Arc<CachePadded<Counters>>,
}

impl TripleBuffer {
    /// Allocate a buffer whose slots hold exactly `frame_len` bytes
    pub fn with_frame_len(frame_len: usize) -> Self {
        Self {
            front: FrameSlot::sized(frame_len),
            shared: Arc::new(Mutex::new(Middle {
                slot: FrameSlot::sized(frame_len),
                updated: false,
            })),
            counters: Arc::new(CachePadded::new(Counters::default())),
            frame_len,
        }
    }

    /// Mint the producer half. The capture lifecycle guarantees at most one
    /// writer is live at a time; a writer left over from a stopped capture
    /// is quiesced before a new one is minted.
    pub fn writer(&self) -> FrameWriter {
        FrameWriter {
            back: FrameSlot::sized(self.frame_len),
            shared: Arc::clone(&self.shared),
            counters: Arc::clone(&self.counters),
        }
    }

    /// Adopt the most recently published frame into the front slot.
    /// Returns true when a new frame was adopted.
    pub fn update_image(&mut self) -> bool {
        {
            let mut middle = self.shared.lock().unwrap_or_else(|e| e.into_inner());
            if !middle.updated {
                return false;
            }
            mem::swap(&mut self.front, &mut middle.slot);
            middle.updated = false;
        }
        self.counters.adopted.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("frames_adopted").increment(1);
        true
    }

    /// Pixels of the last adopted frame; all zeroes until the first
    /// successful `update_image`
    pub fn pixels(&self) -> &[u8] {
        &self.front.pixels
    }

    /// Sequence number of the last adopted frame; 0 until the first
    /// successful `update_image`
    pub fn frame_number(&self) -> u64 {
        self.front.number
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            published: self.counters.published.load(Ordering::Relaxed),
            adopted: self.counters.adopted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

impl FrameWriter {
    /// Writable back-slot pixels, exactly one frame long
    pub fn back_pixels(&mut self) -> &mut [u8] {
        &mut self.back.pixels
    }

    pub fn set_back_number(&mut self, number: u64) {
        self.back.number = number;
    }

    /// Publish the back slot by swapping it with the middle slot. Only the
    /// O(1) swap happens under the lock; pixel writes never do. An
    /// unadopted middle frame is overwritten and counted as dropped.
    pub fn publish(&mut self) {
        let overwrote;
        {
            let mut middle = self.shared.lock().unwrap_or_else(|e| e.into_inner());
            overwrote = middle.updated;
            mem::swap(&mut self.back, &mut middle.slot);
            middle.updated = true;
        }
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("frames_published").increment(1);
        if overwrote {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("frames_dropped").increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn publish_numbered(writer: &mut FrameWriter, number: u64, fill: u8) {
        writer.back_pixels().fill(fill);
        writer.set_back_number(number);
        writer.publish();
    }

    #[test]
    fn test_slots_are_sized_to_frame_len() {
        let mut buffer = TripleBuffer::with_frame_len(64);
        let mut writer = buffer.writer();
        assert_eq!(writer.back_pixels().len(), 64);
        assert_eq!(buffer.pixels().len(), 64);

        publish_numbered(&mut writer, 1, 0xab);
        assert!(buffer.update_image());
        assert_eq!(buffer.pixels().len(), 64);
        assert!(buffer.pixels().iter().all(|&b| b == 0xab));
    }

    #[test]
    fn test_update_without_publish_adopts_nothing() {
        let mut buffer = TripleBuffer::with_frame_len(16);
        assert!(!buffer.update_image());
        assert_eq!(buffer.frame_number(), 0);
    }

    #[test]
    fn test_published_number_reaches_the_consumer() {
        let mut buffer = TripleBuffer::with_frame_len(16);
        let mut writer = buffer.writer();

        publish_numbered(&mut writer, 7, 1);
        assert!(buffer.update_image());
        assert_eq!(buffer.frame_number(), 7);

        // no new frame: front is unchanged
        assert!(!buffer.update_image());
        assert_eq!(buffer.frame_number(), 7);
    }

    #[test]
    fn test_unconsumed_middle_is_overwritten_and_counted() {
        let mut buffer = TripleBuffer::with_frame_len(16);
        let mut writer = buffer.writer();

        publish_numbered(&mut writer, 1, 1);
        publish_numbered(&mut writer, 2, 2);
        assert!(buffer.update_image());

        // frame 1 was dropped, never observed
        assert_eq!(buffer.frame_number(), 2);
        let stats = buffer.stats();
        assert_eq!(stats.published, 2);
        assert_eq!(stats.adopted, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_concurrent_numbers_are_nondecreasing_and_complete_frames_only() {
        const FRAMES: u64 = 500;
        let mut buffer = TripleBuffer::with_frame_len(256);
        let mut writer = buffer.writer();

        let producer = thread::spawn(move || {
            for number in 1..=FRAMES {
                let fill = (number % 251) as u8;
                writer.back_pixels().fill(fill);
                writer.set_back_number(number);
                writer.publish();
                if number % 64 == 0 {
                    thread::yield_now();
                }
            }
        });

        let mut last = 0;
        while last < FRAMES {
            if buffer.update_image() {
                let number = buffer.frame_number();
                assert!(number > last, "sequence went backwards: {last} -> {number}");
                // a torn frame would mix fill bytes from two writes
                let expected = (number % 251) as u8;
                assert!(buffer.pixels().iter().all(|&b| b == expected));
                last = number;
            } else {
                thread::yield_now();
            }
        }
        producer.join().unwrap();
        assert_eq!(last, FRAMES);
    }
}
