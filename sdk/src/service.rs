//! Wire types of the request/stream endpoints.

use crate::{Event, EventId, EventKind, ExecutionPayload, OrderPayload, Payload};
use chrono::{DateTime, Utc};
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};

/// Stream element of `orders.stream` and row of `orders.snapshot`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub event_type: EventKind,
    pub order_id: String,
    pub event_id: EventId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub order: OrderPayload,
}

impl OrderEvent {
    /// Projects the internal event onto the wire, `None` if the payload is
    /// not an order.
    pub fn from_event(ev: &Event) -> Option<Self> {
        let order = ev.payload.order()?;
        Some(Self {
            event_type: ev.kind,
            order_id: order.order_id.clone(),
            event_id: ev.event_id,
            sequence_number: ev.sequence_number,
            timestamp: ev.timestamp,
            order: order.clone(),
        })
    }

    /// Re-wraps a snapshot row as an internal event.
    pub fn into_event(self, kind: EventKind) -> Event {
        Event {
            event_id: self.event_id,
            sequence_number: self.sequence_number,
            timestamp: self.timestamp,
            kind,
            payload: Payload::Order(self.order),
        }
    }
}

/// Stream element of `executions.stream` and row of `executions.snapshot`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEvent {
    pub event_type: EventKind,
    pub exec_id: String,
    pub order_id: String,
    pub event_id: EventId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub execution: ExecutionPayload,
}

impl ExecutionEvent {
    pub fn from_event(ev: &Event) -> Option<Self> {
        let execution = ev.payload.execution()?;
        Some(Self {
            event_type: ev.kind,
            exec_id: execution.exec_id.clone(),
            order_id: execution.order_id.clone(),
            event_id: ev.event_id,
            sequence_number: ev.sequence_number,
            timestamp: ev.timestamp,
            execution: execution.clone(),
        })
    }

    pub fn into_event(self, kind: EventKind) -> Event {
        Event {
            event_id: self.event_id,
            sequence_number: self.sequence_number,
            timestamp: self.timestamp,
            kind,
            payload: Payload::Execution(self.execution),
        }
    }
}

/// Union element of `blotter.stream`; the two shapes are distinguished by
/// their `order` / `execution` member.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlotterEvent {
    Order(OrderEvent),
    Execution(ExecutionEvent),
}

impl BlotterEvent {
    pub fn from_event(ev: &Event) -> Self {
        match &ev.payload {
            Payload::Order(order) => BlotterEvent::Order(OrderEvent {
                event_type: ev.kind,
                order_id: order.order_id.clone(),
                event_id: ev.event_id,
                sequence_number: ev.sequence_number,
                timestamp: ev.timestamp,
                order: order.clone(),
            }),
            Payload::Execution(execution) => BlotterEvent::Execution(ExecutionEvent {
                event_type: ev.kind,
                exec_id: execution.exec_id.clone(),
                order_id: execution.order_id.clone(),
                event_id: ev.event_id,
                sequence_number: ev.sequence_number,
                timestamp: ev.timestamp,
                execution: execution.clone(),
            }),
        }
    }

    pub fn event_id(&self) -> EventId {
        match self {
            BlotterEvent::Order(o) => o.event_id,
            BlotterEvent::Execution(x) => x.event_id,
        }
    }
}

/// Response of the `health` route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self { status: "OK".into() }
    }
}

/// Structured error surfaced as a stream's final message.
///
/// Transient conditions (consumer backoff, inbox overflow) are expressed as
/// telemetry, not through this type; only errors that make the stream's
/// guarantees unenforceable terminate it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Display, Error)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamError {
    #[display(fmt = "invalid filter on field `{}`: {}", field, reason)]
    #[serde(rename_all = "camelCase")]
    InvalidFilter { field: String, reason: String },
    #[display(fmt = "snapshot failed on page {}: {}", page, cause)]
    #[serde(rename_all = "camelCase")]
    SnapshotFailed { page: u32, cause: String },
    #[display(fmt = "upstream consumer is not running")]
    UpstreamUnavailable,
}
