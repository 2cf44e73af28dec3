//! Notification queue: asynchronous `%Stop` payloads
//! parked by the packet layer while a command reply is awaited, drained
//! FIFO by the stop parser / control loop.
//!
//! The reference (`push_notification`/`pop_notification` in
//! `protocol.c`) uses a hand-grown slotted array with tombstone reuse and
//! derives the popped size from `strlen`. A safe rewrite doesn't need the
//! slot array to get the same FIFO behavior the reference's callers actually
//! rely on (see DESIGN.md); payloads are still kept NUL-terminated so a
//! caller relying on the reference's implicit `strlen`-based size sees the
//! same divergence on embedded NULs.

use std::collections::VecDeque;

#[derive(Default)]
pub struct NotificationQueue {
    entries: VecDeque<Vec<u8>>,
}

impl NotificationQueue {
    pub fn new() -> NotificationQueue {
        NotificationQueue {
            entries: VecDeque::with_capacity(10),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Push an owning copy of `payload`, NUL-terminated.
    pub fn push(&mut self, payload: &[u8]) {
        let mut owned = payload.to_vec();
        owned.push(0);
        self.entries.push_back(owned);
    }

    /// Pop the oldest pending notification. Returns the payload without
    /// its NUL terminator and the `strlen`-style length the reference
    /// would have reported (equal unless the payload has embedded NULs).
    pub fn pop(&mut self) -> Option<(Vec<u8>, usize)> {
        let owned = self.entries.pop_front()?;
        let strlen = owned.iter().position(|&b| b == 0).unwrap_or(owned.len());
        let mut payload = owned;
        payload.pop(); // drop the trailing NUL we added on push
        Some((payload, strlen))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut q = NotificationQueue::new();
        q.push(b"first");
        q.push(b"second");
        assert_eq!(q.pop().unwrap().0, b"first");
        assert_eq!(q.pop().unwrap().0, b"second");
        assert!(q.pop().is_none());
    }

    #[test]
    fn empty_when_idle() {
        let q = NotificationQueue::new();
        assert!(q.is_empty());
    }

    #[test]
    fn strlen_diverges_on_embedded_nul() {
        let mut q = NotificationQueue::new();
        q.push(b"ab\0cd");
        let (payload, strlen) = q.pop().unwrap();
        assert_eq!(payload, b"ab\0cd");
        assert_eq!(strlen, 2);
    }
}
