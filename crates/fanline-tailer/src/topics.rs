//! Per-log subscription lists.
//!
//! Maps each topic to its subscribers with the seqno every subscriber
//! expects next. Topic lists are short in practice, so membership checks
//! are linear scans.

use std::collections::HashMap;

use crate::message::{CopilotSub, TopicId};
use crate::SequenceNumber;

/// One subscriber on one topic, with the seqno it should receive next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicSubscription {
    id: CopilotSub,
    expected_seqno: SequenceNumber,
}

impl TopicSubscription {
    pub fn new(id: CopilotSub, expected_seqno: SequenceNumber) -> Self {
        Self { id, expected_seqno }
    }

    pub fn id(&self) -> CopilotSub {
        self.id
    }

    pub fn expected_seqno(&self) -> SequenceNumber {
        self.expected_seqno
    }

    /// Advances (or rewinds) the seqno this subscriber expects next.
    pub fn set_expected_seqno(&mut self, seqno: SequenceNumber) {
        self.expected_seqno = seqno;
    }
}

/// Subscription lists for every topic on one log.
#[derive(Default)]
pub struct TopicManager {
    topics: HashMap<TopicId, Vec<TopicSubscription>>,
}

impl TopicManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber, or updates its expected seqno when already
    /// subscribed. Returns true iff a new subscription was inserted.
    pub fn add_subscriber(
        &mut self,
        topic: &TopicId,
        seqno: SequenceNumber,
        id: CopilotSub,
    ) -> bool {
        let list = self.topics.entry(topic.clone()).or_default();
        for sub in list.iter_mut() {
            if sub.id == id {
                sub.expected_seqno = seqno;
                return false;
            }
        }
        list.push(TopicSubscription::new(id, seqno));
        true
    }

    /// Removes a subscriber. Returns true iff no subscriptions remain on
    /// the topic (including when the topic was never subscribed).
    pub fn remove_subscriber(&mut self, topic: &TopicId, id: CopilotSub) -> bool {
        let Some(list) = self.topics.get_mut(topic) else {
            return true;
        };
        list.retain(|sub| sub.id != id);
        if list.is_empty() {
            self.topics.remove(topic);
            return true;
        }
        false
    }

    /// Visits every subscription on `topic` whose expected seqno lies in
    /// `[from, to]`. The visitor may advance the subscription.
    pub fn visit_subscribers<F>(
        &mut self,
        topic: &TopicId,
        from: SequenceNumber,
        to: SequenceNumber,
        mut visit: F,
    ) where
        F: FnMut(&mut TopicSubscription),
    {
        if let Some(list) = self.topics.get_mut(topic) {
            for sub in list.iter_mut() {
                if sub.expected_seqno >= from && sub.expected_seqno <= to {
                    visit(sub);
                }
            }
        }
    }

    /// Topics currently holding at least one subscription. Snapshot, so the
    /// caller may add or remove subscribers while walking it.
    pub fn topic_ids(&self) -> Vec<TopicId> {
        self.topics.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn subscription_count(&self, topic: &TopicId) -> usize {
        self.topics.get(topic).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StreamId, SubscriptionId};

    fn sub(stream: u64, id: u64) -> CopilotSub {
        CopilotSub::new(StreamId::new(stream), SubscriptionId::new(id))
    }

    fn topic() -> TopicId {
        TopicId::new("orders", "eu-west")
    }

    #[test]
    fn re_adding_updates_in_place() {
        let mut mgr = TopicManager::new();
        assert!(mgr.add_subscriber(&topic(), 10, sub(1, 1)));
        assert!(!mgr.add_subscriber(&topic(), 25, sub(1, 1)));
        assert_eq!(mgr.subscription_count(&topic()), 1);

        let mut seen = Vec::new();
        mgr.visit_subscribers(&topic(), 0, u64::MAX, |s| seen.push(s.expected_seqno()));
        assert_eq!(seen, vec![25]);
    }

    #[test]
    fn remove_reports_empty_topic() {
        let mut mgr = TopicManager::new();
        mgr.add_subscriber(&topic(), 10, sub(1, 1));
        mgr.add_subscriber(&topic(), 10, sub(1, 2));
        assert!(!mgr.remove_subscriber(&topic(), sub(1, 1)));
        assert!(mgr.remove_subscriber(&topic(), sub(1, 2)));
        assert!(mgr.is_empty());
        // Unknown topics count as already empty.
        assert!(mgr.remove_subscriber(&topic(), sub(9, 9)));
    }

    #[test]
    fn visit_filters_by_seqno_range() {
        let mut mgr = TopicManager::new();
        mgr.add_subscriber(&topic(), 5, sub(1, 1));
        mgr.add_subscriber(&topic(), 10, sub(1, 2));
        mgr.add_subscriber(&topic(), 20, sub(1, 3));

        let mut visited = Vec::new();
        mgr.visit_subscribers(&topic(), 6, 15, |s| {
            visited.push(s.id());
            s.set_expected_seqno(16);
        });
        assert_eq!(visited, vec![sub(1, 2)]);

        // The advanced subscriber is now outside the old range.
        let mut visited = Vec::new();
        mgr.visit_subscribers(&topic(), 6, 15, |s| visited.push(s.id()));
        assert!(visited.is_empty());
    }

    #[test]
    fn topic_ids_snapshot() {
        let mut mgr = TopicManager::new();
        mgr.add_subscriber(&TopicId::new("a", "1"), 1, sub(1, 1));
        mgr.add_subscriber(&TopicId::new("b", "2"), 1, sub(1, 2));
        let mut ids = mgr.topic_ids();
        ids.sort();
        assert_eq!(ids.len(), 2);
    }
}
