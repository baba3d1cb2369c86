//! Index from (stream, subscription) to topic.
//!
//! Subscriptions are torn down either one at a time or for a whole stream
//! when the client connection goes away; this index answers both.

use std::collections::HashMap;

use crate::config::{StreamId, SubscriptionId};
use crate::message::TopicId;

#[derive(Default)]
pub struct StreamSubscriptions {
    streams: HashMap<StreamId, HashMap<SubscriptionId, TopicId>>,
}

impl StreamSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `(stream, sub) -> topic`. Replaces any previous entry.
    pub fn insert(&mut self, stream: StreamId, sub: SubscriptionId, topic: TopicId) {
        self.streams.entry(stream).or_default().insert(sub, topic);
    }

    /// Removes one subscription, keeping the stream entry alive for its
    /// siblings.
    pub fn remove(&mut self, stream: StreamId, sub: SubscriptionId) -> bool {
        let Some(subs) = self.streams.get_mut(&stream) else {
            return false;
        };
        let removed = subs.remove(&sub).is_some();
        if subs.is_empty() {
            self.streams.remove(&stream);
        }
        removed
    }

    /// Removes every subscription on a stream.
    pub fn remove_stream(&mut self, stream: StreamId) {
        self.streams.remove(&stream);
    }

    /// Removes one subscription and returns its topic.
    pub fn move_out(&mut self, stream: StreamId, sub: SubscriptionId) -> Option<TopicId> {
        let subs = self.streams.get_mut(&stream)?;
        let topic = subs.remove(&sub);
        if subs.is_empty() {
            self.streams.remove(&stream);
        }
        topic
    }

    /// Visits every subscription on a stream.
    pub fn visit_stream<F>(&self, stream: StreamId, mut visit: F)
    where
        F: FnMut(SubscriptionId, &TopicId),
    {
        if let Some(subs) = self.streams.get(&stream) {
            for (sub, topic) in subs {
                visit(*sub, topic);
            }
        }
    }

    /// Snapshot of a stream's subscriptions, for teardown loops that mutate
    /// the index while walking.
    pub fn stream_snapshot(&self, stream: StreamId) -> Vec<(SubscriptionId, TopicId)> {
        self.streams.get(&stream).map_or_else(Vec::new, |subs| {
            subs.iter().map(|(s, t)| (*s, t.clone())).collect()
        })
    }

    pub fn len(&self) -> usize {
        self.streams.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(name: &str) -> TopicId {
        TopicId::new("ns", name)
    }

    #[test]
    fn move_out_returns_topic_and_cleans_up() {
        let mut index = StreamSubscriptions::new();
        index.insert(StreamId::new(1), SubscriptionId::new(1), topic("a"));
        index.insert(StreamId::new(1), SubscriptionId::new(2), topic("b"));

        assert_eq!(
            index.move_out(StreamId::new(1), SubscriptionId::new(1)),
            Some(topic("a"))
        );
        assert_eq!(index.move_out(StreamId::new(1), SubscriptionId::new(1)), None);
        assert_eq!(index.len(), 1);

        assert_eq!(
            index.move_out(StreamId::new(1), SubscriptionId::new(2)),
            Some(topic("b"))
        );
        assert!(index.is_empty());
    }

    #[test]
    fn remove_stream_drops_all() {
        let mut index = StreamSubscriptions::new();
        index.insert(StreamId::new(1), SubscriptionId::new(1), topic("a"));
        index.insert(StreamId::new(1), SubscriptionId::new(2), topic("b"));
        index.insert(StreamId::new(2), SubscriptionId::new(1), topic("c"));

        index.remove_stream(StreamId::new(1));
        assert_eq!(index.len(), 1);
        let mut seen = Vec::new();
        index.visit_stream(StreamId::new(2), |sub, t| seen.push((sub, t.clone())));
        assert_eq!(seen, vec![(SubscriptionId::new(1), topic("c"))]);
    }

    #[test]
    fn insert_replaces_topic() {
        let mut index = StreamSubscriptions::new();
        index.insert(StreamId::new(1), SubscriptionId::new(1), topic("a"));
        index.insert(StreamId::new(1), SubscriptionId::new(1), topic("b"));
        assert_eq!(
            index.move_out(StreamId::new(1), SubscriptionId::new(1)),
            Some(topic("b"))
        );
    }
}
