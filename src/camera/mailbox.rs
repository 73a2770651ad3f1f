//! Single-slot frame handoff for an optional capture thread.
//!
//! The UI tick and a producer thread meet here: the producer publishes every
//! frame it reads, the consumer takes whatever is newest. Latest frame wins,
//! no queueing, since a stale frame is worthless for a live preview.

use std::sync::{Arc, Mutex};

use image::RgbImage;

#[derive(Clone, Default)]
pub struct FrameMailbox {
    slot: Arc<Mutex<Option<RgbImage>>>,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a frame in the slot, replacing any unconsumed one.
    pub fn publish(&self, frame: RgbImage) {
        *self.lock_slot() = Some(frame);
    }

    /// Take the most recent frame, leaving the slot empty.
    pub fn take(&self) -> Option<RgbImage> {
        self.lock_slot().take()
    }

    /// A panicked producer poisons the mutex but cannot leave the slot in a
    /// bad state; whatever `Option` is in there is still a whole value. So a
    /// poisoned lock is recovered, not propagated.
    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<RgbImage>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(value: u8) -> RgbImage {
        RgbImage::from_pixel(4, 4, Rgb([value, value, value]))
    }

    #[test]
    fn test_latest_frame_wins() {
        let mailbox = FrameMailbox::new();
        mailbox.publish(solid(10));
        mailbox.publish(solid(20));

        let frame = mailbox.take().unwrap();
        assert_eq!(frame.get_pixel(0, 0), &Rgb([20, 20, 20]));
        assert!(mailbox.take().is_none());
    }

    #[test]
    fn test_empty_mailbox_yields_none() {
        assert!(FrameMailbox::new().take().is_none());
    }

    #[test]
    fn test_survives_a_panicked_producer() {
        let mailbox = FrameMailbox::new();
        let producer = mailbox.clone();
        let _ = std::thread::spawn(move || {
            let _guard = producer.slot.lock().unwrap();
            panic!("producer died mid-publish");
        })
        .join();

        // The lock is poisoned now; the consumer side keeps working.
        mailbox.publish(solid(7));
        assert_eq!(mailbox.take().unwrap().get_pixel(0, 0), &Rgb([7, 7, 7]));
    }
}
