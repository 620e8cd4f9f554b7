//! Replay cache for duplicate requests.
//!
//! Clients retransmit a request with the same context after a reconnect or a
//! timeout. The session remembers its last few replies by context and
//! resends the stored reply instead of routing the duplicate again.

use std::collections::VecDeque;

use crate::processor::Reply;
use crate::protocol::expects_reply;

/// Replies remembered per session.
pub const REPLAY_CAPACITY: usize = 3;

/// One remembered reply.
#[derive(Debug, Clone)]
pub struct ReplayEntry {
    pub context: u32,
    pub response: Reply,
}

/// Small most-recent-first cache of `(context, reply)` pairs.
///
/// Inserting never evicts; [`trim`](Self::trim) drops the oldest entries
/// down to [`REPLAY_CAPACITY`] and runs at the top of every read iteration,
/// so at most `REPLAY_CAPACITY + 1` entries exist between trims.
#[derive(Debug, Default)]
pub struct ReplayCache {
    entries: VecDeque<ReplayEntry>,
}

impl ReplayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the oldest entries beyond capacity.
    pub fn trim(&mut self) {
        while self.entries.len() > REPLAY_CAPACITY {
            self.entries.pop_back();
        }
    }

    /// Stored reply for `context`, newest first.
    pub fn lookup(&self, context: u32) -> Option<Reply> {
        if !expects_reply(context) {
            return None;
        }
        self.entries
            .iter()
            .find(|entry| entry.context == context)
            .map(|entry| entry.response.clone())
    }

    /// Remember `response` as the newest entry. Context 0 is never stored.
    pub fn insert(&mut self, context: u32, response: Reply) {
        if !expects_reply(context) {
            return;
        }
        self.entries.push_front(ReplayEntry { context, response });
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached contexts, newest first.
    pub fn contexts(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|entry| entry.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::NO_REPLY_CONTEXT;
    use std::sync::Arc;

    #[derive(Debug, serde::Serialize)]
    struct Answer(u32);

    fn answer(n: u32) -> Reply {
        Arc::new(Answer(n))
    }

    fn value(reply: &Reply) -> u32 {
        reply.downcast_ref::<Answer>().unwrap().0
    }

    #[test]
    fn test_lookup_hit_and_miss() {
        let mut cache = ReplayCache::new();
        cache.insert(5, answer(50));

        assert_eq!(value(&cache.lookup(5).unwrap()), 50);
        assert!(cache.lookup(6).is_none());
    }

    #[test]
    fn test_context_zero_never_stored() {
        let mut cache = ReplayCache::new();
        cache.insert(NO_REPLY_CONTEXT, answer(1));

        assert!(cache.is_empty());
        assert!(cache.lookup(NO_REPLY_CONTEXT).is_none());
    }

    #[test]
    fn test_trim_evicts_oldest() {
        let mut cache = ReplayCache::new();
        for ctx in 1..=4 {
            cache.trim();
            cache.insert(ctx, answer(ctx));
        }
        assert_eq!(cache.len(), REPLAY_CAPACITY + 1);

        cache.trim();
        assert_eq!(cache.len(), REPLAY_CAPACITY);
        assert_eq!(cache.contexts().collect::<Vec<_>>(), vec![4, 3, 2]);
        assert!(cache.lookup(1).is_none());
    }

    #[test]
    fn test_newest_wins_for_repeated_context() {
        let mut cache = ReplayCache::new();
        cache.insert(9, answer(1));
        cache.insert(9, answer(2));

        assert_eq!(value(&cache.lookup(9).unwrap()), 2);
    }
}
