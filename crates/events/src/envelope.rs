use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use procura_core::{OrderId, PaymentId};

use crate::Event;

/// Sequence an event belongs to within its order.
///
/// Order transitions are numbered by the order record's version; each payment
/// attempt numbers its own events by the payment's revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EventStream {
    Order,
    Payment(PaymentId),
}

/// Envelope for a published event, carrying stream metadata.
///
/// - `order_id` scopes every event, including payment events, to the purchase
///   order that owns it.
/// - `(order_id, stream, sequence)` is unique per committed change, so
///   consumers can drop redeliveries on it.
/// - `payload` is the serialized domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    order_id: OrderId,
    stream: EventStream,
    event_type: String,
    sequence: u64,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        order_id: OrderId,
        stream: EventStream,
        event_type: impl Into<String>,
        sequence: u64,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            order_id,
            stream,
            event_type: event_type.into(),
            sequence,
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn stream(&self) -> EventStream {
        self.stream
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Order version for `EventStream::Order`, payment revision otherwise.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Key a consumer can deduplicate on.
    pub fn dedup_key(&self) -> (OrderId, EventStream, u64) {
        (self.order_id, self.stream, self.sequence)
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl EventEnvelope<serde_json::Value> {
    /// Wrap a typed event as a JSON envelope ready for publication.
    pub fn from_typed<T>(
        order_id: OrderId,
        stream: EventStream,
        sequence: u64,
        event: &T,
    ) -> Result<Self, serde_json::Error>
    where
        T: Event + Serialize,
    {
        let payload = serde_json::to_value(event)?;
        Ok(Self::new(
            Uuid::now_v7(),
            order_id,
            stream,
            event.event_type(),
            sequence,
            event.occurred_at(),
            payload,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize)]
    struct Ping {
        at: DateTime<Utc>,
    }

    impl Event for Ping {
        fn event_type(&self) -> &'static str {
            "test.ping"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[test]
    fn from_typed_captures_event_metadata() {
        let order_id = OrderId::new();
        let at = Utc::now();
        let env = EventEnvelope::from_typed(order_id, EventStream::Order, 7, &Ping { at }).unwrap();

        assert_eq!(env.order_id(), order_id);
        assert_eq!(env.stream(), EventStream::Order);
        assert_eq!(env.event_type(), "test.ping");
        assert_eq!(env.sequence(), 7);
        assert_eq!(env.occurred_at(), at);
        assert!(env.payload().get("at").is_some());
    }

    #[test]
    fn order_and_payment_streams_never_share_a_key() {
        let order_id = OrderId::new();
        let payment_id = PaymentId::new();
        let at = Utc::now();
        let order_event = EventEnvelope::from_typed(order_id, EventStream::Order, 3, &Ping { at }).unwrap();
        let payment_event =
            EventEnvelope::from_typed(order_id, EventStream::Payment(payment_id), 3, &Ping { at }).unwrap();

        assert_ne!(order_event.dedup_key(), payment_event.dedup_key());

        let json = serde_json::to_value(&payment_event).unwrap();
        assert_eq!(json["stream"]["kind"], "payment");
        assert_eq!(json["stream"]["id"], payment_id.to_string());
    }
}
