//! Pending-event queue: FIFO with a capacity bound and a dead-letter list

use std::collections::VecDeque;

use crate::events::Envelope;

/// Dead letters are kept for inspection, not redelivery; cap them so a
/// permanently failing collector cannot grow memory without bound.
const MAX_DEAD_LETTERS: usize = 100;

/// One queued envelope plus its delivery-attempt count
#[derive(Debug)]
pub(crate) struct PendingEvent {
    pub envelope: Envelope,
    pub attempts: u32,
}

/// Ordered backlog of envelopes awaiting delivery
///
/// An envelope leaves the queue only on successful delivery, on an
/// unresolvable condition (no endpoint), or after exhausting its attempts.
/// Failed attempts go back to the *front* so the backlog keeps its order.
#[derive(Debug)]
pub(crate) struct PendingQueue {
    entries: VecDeque<PendingEvent>,
    max_pending: usize,
    dead_letters: VecDeque<Envelope>,
}

impl PendingQueue {
    pub fn new(max_pending: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_pending: max_pending.max(1),
            dead_letters: VecDeque::new(),
        }
    }

    /// Append at the tail; drops the oldest entry when at capacity
    pub fn push(&mut self, envelope: Envelope) {
        if self.entries.len() >= self.max_pending {
            if let Some(dropped) = self.entries.pop_front() {
                tracing::warn!(
                    action = %dropped.envelope.action,
                    max_pending = self.max_pending,
                    "pending queue full; dropping oldest event"
                );
            }
        }
        self.entries.push_back(PendingEvent {
            envelope,
            attempts: 0,
        });
    }

    /// Take the head entry for a delivery attempt
    pub fn pop(&mut self) -> Option<PendingEvent> {
        self.entries.pop_front()
    }

    /// Return a failed entry to the head, preserving backlog order
    pub fn requeue_front(&mut self, entry: PendingEvent) {
        self.entries.push_front(entry);
    }

    /// Park an envelope that exhausted its delivery attempts
    pub fn dead_letter(&mut self, envelope: Envelope) {
        if self.dead_letters.len() >= MAX_DEAD_LETTERS {
            self.dead_letters.pop_front();
        }
        self.dead_letters.push_back(envelope);
    }

    pub fn set_max_pending(&mut self, max_pending: usize) {
        self.max_pending = max_pending.max(1);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dead_letter_count(&self) -> usize {
        self.dead_letters.len()
    }

    /// Discard everything, including dead letters
    pub fn clear(&mut self) {
        self.entries.clear();
        self.dead_letters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventCategory, Identity};

    fn envelope(action: &str) -> Envelope {
        Envelope::new(
            EventCategory::Lifecycle,
            action,
            None,
            None,
            None,
            &Identity::default(),
        )
    }

    #[test]
    fn fifo_order() {
        let mut queue = PendingQueue::new(10);
        queue.push(envelope("first"));
        queue.push(envelope("second"));

        assert_eq!(queue.pop().unwrap().envelope.action, "first");
        assert_eq!(queue.pop().unwrap().envelope.action, "second");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn requeue_goes_to_the_front() {
        let mut queue = PendingQueue::new(10);
        queue.push(envelope("first"));
        queue.push(envelope("second"));

        let mut entry = queue.pop().unwrap();
        entry.attempts += 1;
        queue.requeue_front(entry);

        let head = queue.pop().unwrap();
        assert_eq!(head.envelope.action, "first");
        assert_eq!(head.attempts, 1);
    }

    #[test]
    fn capacity_drops_oldest() {
        let mut queue = PendingQueue::new(2);
        queue.push(envelope("first"));
        queue.push(envelope("second"));
        queue.push(envelope("third"));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().envelope.action, "second");
        assert_eq!(queue.pop().unwrap().envelope.action, "third");
    }

    #[test]
    fn dead_letters_are_bounded() {
        let mut queue = PendingQueue::new(10);
        for i in 0..(MAX_DEAD_LETTERS + 5) {
            queue.dead_letter(envelope(&format!("event_{i}")));
        }
        assert_eq!(queue.dead_letter_count(), MAX_DEAD_LETTERS);
    }

    #[test]
    fn clear_discards_everything() {
        let mut queue = PendingQueue::new(10);
        queue.push(envelope("pending"));
        queue.dead_letter(envelope("dead"));

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.dead_letter_count(), 0);
    }
}
