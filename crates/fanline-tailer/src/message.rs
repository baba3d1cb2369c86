use std::fmt::{self, Display};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{StreamId, SubscriptionId, TenantId};
use crate::SequenceNumber;

/// Namespaces with a leading underscore are reserved for system topics.
const SYSTEM_NAMESPACE_PREFIX: char = '_';

/// A (namespace, topic) pair identifying one logical stream inside a log.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TopicId {
    namespace: String,
    name: String,
}

impl TopicId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True for topics in a reserved system namespace.
    pub fn is_system(&self) -> bool {
        self.namespace.starts_with(SYSTEM_NAMESPACE_PREFIX)
    }
}

impl Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({}, {})", self.namespace, self.name)
    }
}

/// Identity of one subscription on one client connection.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CopilotSub {
    pub stream: StreamId,
    pub sub: SubscriptionId,
}

impl CopilotSub {
    pub const fn new(stream: StreamId, sub: SubscriptionId) -> Self {
        Self { stream, sub }
    }
}

impl Display for CopilotSub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sub({}, {})", self.stream, self.sub)
    }
}

/// One record read from a log, carrying the delivery seqno pair.
///
/// `prev_seqno` is stamped at delivery time with the previous seqno known
/// for the record's topic, letting the client coalesce skipped seqnos. The
/// payload is shared so cache copies and multi-recipient deliveries do not
/// duplicate bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageData {
    tenant: TenantId,
    topic: TopicId,
    prev_seqno: SequenceNumber,
    seqno: SequenceNumber,
    payload: Arc<[u8]>,
}

impl MessageData {
    pub fn new(
        tenant: TenantId,
        topic: TopicId,
        seqno: SequenceNumber,
        payload: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            tenant,
            topic,
            prev_seqno: 0,
            seqno,
            payload: payload.into(),
        }
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    pub fn topic(&self) -> &TopicId {
        &self.topic
    }

    pub fn prev_seqno(&self) -> SequenceNumber {
        self.prev_seqno
    }

    pub fn seqno(&self) -> SequenceNumber {
        self.seqno
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Stamps the delivery pair: the seqno the subscriber expected next and
    /// the seqno actually delivered.
    pub fn set_sequence_numbers(&mut self, prev: SequenceNumber, seqno: SequenceNumber) {
        self.prev_seqno = prev;
        self.seqno = seqno;
    }
}

/// Classification of a seqno range with no records for subscribed topics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GapKind {
    /// No data loss; the range simply held nothing for the topic.
    Benign,
    /// The range fell off the retention horizon.
    Retention,
    /// The range was lost by storage.
    DataLoss,
}

impl GapKind {
    /// Malignant gaps invalidate per-topic history; benign gaps do not.
    pub fn is_malignant(self) -> bool {
        !matches!(self, GapKind::Benign)
    }
}

impl Display for GapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapKind::Benign => write!(f, "benign"),
            GapKind::Retention => write!(f, "retention"),
            GapKind::DataLoss => write!(f, "data-loss"),
        }
    }
}

/// A per-topic gap notification delivered to subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GapMessage {
    pub tenant: TenantId,
    pub topic: TopicId,
    pub kind: GapKind,
    pub from: SequenceNumber,
    pub to: SequenceNumber,
}

/// Outbound message handed to the delivery callback together with its
/// recipients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Data(MessageData),
    Gap(GapMessage),
}

impl Message {
    pub fn topic(&self) -> &TopicId {
        match self {
            Message::Data(data) => &data.topic,
            Message::Gap(gap) => &gap.topic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_namespace_detection() {
        assert!(TopicId::new("_rooms", "audit").is_system());
        assert!(!TopicId::new("orders", "eu-west").is_system());
    }

    #[test]
    fn sequence_number_stamping() {
        let mut data = MessageData::new(
            TenantId::GUEST,
            TopicId::new("orders", "eu-west"),
            17,
            &b"payload"[..],
        );
        assert_eq!(data.prev_seqno(), 0);
        data.set_sequence_numbers(12, 17);
        assert_eq!((data.prev_seqno(), data.seqno()), (12, 17));
    }

    #[test]
    fn malignant_classification() {
        assert!(!GapKind::Benign.is_malignant());
        assert!(GapKind::Retention.is_malignant());
        assert!(GapKind::DataLoss.is_malignant());
    }
}
