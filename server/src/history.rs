//! Bounded replay window shown to newly joined clients.

use shared::ChatMessage;
use std::collections::VecDeque;

/// Insertion-ordered store of the most recent broadcast messages.
///
/// The buffer holds at most `capacity` entries; appending past capacity
/// evicts the single oldest entry first (strict FIFO, no recency policy).
/// It is consulted exactly once per client, during the join handshake, and
/// plays no part in ongoing broadcast.
#[derive(Debug)]
pub struct ChatHistory {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl ChatHistory {
    pub fn new(capacity: usize) -> Self {
        ChatHistory {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a message, evicting the oldest entry when full. Never fails.
    pub fn append(&mut self, message: ChatMessage) {
        if self.capacity == 0 {
            return;
        }
        if self.messages.len() == self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    /// The full ordered contents, oldest first. Does not mutate the buffer.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: usize) -> ChatMessage {
        ChatMessage::user("tester", format!("message {}", n))
    }

    #[test]
    fn appends_in_order_below_capacity() {
        let mut history = ChatHistory::new(10);
        for n in 0..3 {
            history.append(event(n));
        }

        let snapshot = history.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot, vec![event(0), event(1), event(2)]);
    }

    #[test]
    fn length_never_exceeds_capacity() {
        let mut history = ChatHistory::new(10);
        for n in 0..100 {
            history.append(event(n));
            assert!(history.len() <= 10);
        }
    }

    #[test]
    fn keeps_exactly_the_last_capacity_messages() {
        let mut history = ChatHistory::new(10);
        for n in 0..25 {
            history.append(event(n));
        }

        let snapshot = history.snapshot();
        assert_eq!(snapshot.len(), 10);
        let expected: Vec<ChatMessage> = (15..25).map(event).collect();
        assert_eq!(snapshot, expected);
    }

    #[test]
    fn evicts_oldest_first() {
        let mut history = ChatHistory::new(2);
        history.append(ChatMessage::joined("e1"));
        history.append(ChatMessage::joined("e2"));
        history.append(ChatMessage::joined("e3"));

        assert_eq!(
            history.snapshot(),
            vec![ChatMessage::joined("e2"), ChatMessage::joined("e3")]
        );
    }

    #[test]
    fn snapshot_does_not_mutate() {
        let mut history = ChatHistory::new(5);
        history.append(event(1));
        history.append(event(2));

        let first = history.snapshot();
        let second = history.snapshot();
        assert_eq!(first, second);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn zero_capacity_stays_empty() {
        let mut history = ChatHistory::new(0);
        history.append(event(1));
        assert!(history.is_empty());
    }
}
