//! Ordered queue of followers waiting on a refresh episode.
//!
//! `drain` consumes the queue, so an episode's followers can be resolved at
//! most once and always in arrival order.

use std::collections::VecDeque;

#[derive(Debug)]
pub struct FollowerQueue<T> {
    entries: VecDeque<T>,
}

impl<T> FollowerQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Append a follower; returns its 0-based position in the episode.
    pub fn push(&mut self, entry: T) -> usize {
        self.entries.push_back(entry);
        self.entries.len() - 1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hand out every follower, first-in first-out.
    pub fn drain(self) -> std::collections::vec_deque::IntoIter<T> {
        self.entries.into_iter()
    }
}

impl<T> Default for FollowerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_arrival_order() {
        let mut queue = FollowerQueue::new();
        assert_eq!(queue.push("b"), 0);
        assert_eq!(queue.push("a"), 1);
        assert_eq!(queue.push("c"), 2);
        assert_eq!(queue.len(), 3);

        let drained: Vec<_> = queue.drain().collect();
        assert_eq!(drained, vec!["b", "a", "c"]);
    }

    #[test]
    fn empty_queue_drains_nothing() {
        let queue: FollowerQueue<u8> = FollowerQueue::default();
        assert!(queue.is_empty());
        assert_eq!(queue.drain().count(), 0);
    }
}
