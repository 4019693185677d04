//! The message wall: one deduplicated, insertion-ordered view over the
//! periodic historical fetch and the live event stream.

use crate::events::{
    Address,
    Message,
};
use std::collections::HashSet;

pub const DEFAULT_DISPLAY_LIMIT: usize = 30;

#[derive(Debug, Clone, Default)]
pub struct MessageWall {
    messages: Vec<Message>,
    seen: HashSet<Message>,
    // appended by the live path and not yet returned by any fetch
    live_pending: Vec<Message>,
    // pushed out by retention since the last batch
    evicted: HashSet<Message>,
    retention: Option<usize>,
}

impl MessageWall {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `limit` messages, evicting the oldest first.
    pub fn with_retention(limit: usize) -> Self {
        Self {
            retention: Some(limit),
            ..Self::default()
        }
    }

    /// Replaces the wall with a freshly fetched batch (in log order).
    ///
    /// Live messages the batch does not contain yet are carried over after
    /// the batch, since their block may not be queryable yet.
    pub fn apply_batch(&mut self, batch: Vec<Message>) {
        let mut messages = Vec::with_capacity(batch.len() + self.live_pending.len());
        let mut seen = HashSet::with_capacity(messages.capacity());
        for message in batch {
            if seen.insert(message.clone()) {
                messages.push(message);
            }
        }
        self.live_pending.retain(|message| !seen.contains(message));
        for message in &self.live_pending {
            seen.insert(message.clone());
            messages.push(message.clone());
        }
        tracing::trace!(
            total = messages.len(),
            carried = self.live_pending.len(),
            "applied fetched batch"
        );
        self.messages = messages;
        self.seen = seen;
        self.evicted.clear();
        self.enforce_retention();
    }

    /// Appends a live message unless it is already on the wall or was
    /// evicted from it since the last batch.
    ///
    /// Returns whether the message was new.
    pub fn apply_live(&mut self, message: Message) -> bool {
        if self.seen.contains(&message) || self.evicted.contains(&message) {
            tracing::trace!(author = %message.author, ts = message.timestamp, "duplicate live message");
            return false;
        }
        self.seen.insert(message.clone());
        self.live_pending.push(message.clone());
        self.messages.push(message);
        self.enforce_retention();
        true
    }

    /// Drops everything, including not yet confirmed live messages.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.seen.clear();
        self.evicted.clear();
        self.live_pending.clear();
    }

    /// The last `n` messages, oldest first.
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Messages written by `author`, newest first.
    pub fn by_author(&self, author: &Address) -> Vec<&Message> {
        self.messages
            .iter()
            .rev()
            .filter(|message| message.author == *author)
            .collect()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, message: &Message) -> bool {
        self.seen.contains(message)
    }

    fn enforce_retention(&mut self) {
        let Some(limit) = self.retention else {
            return;
        };
        if self.messages.len() <= limit {
            return;
        }
        let overflow = self.messages.len() - limit;
        for evicted in self.messages.drain(..overflow) {
            self.seen.remove(&evicted);
            self.live_pending.retain(|pending| *pending != evicted);
            self.evicted.insert(evicted);
        }
    }
}
