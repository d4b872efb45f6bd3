//! Upstream record shapes and the mappers turning them into [`Event`]s.
//!
//! The upstream topics are versioned independently of the client-facing
//! wire, so the bus envelope gets its own types here. Fields absent from a
//! record decode to `None`; filter evaluation treats them as null.

use anyhow::Context;
use blotter_sdk::{Event, EventId, EventKind, ExecutionPayload, OrderPayload, Payload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Decoder configured into an ingestor; one per topic.
pub type RecordDecoder = fn(&[u8]) -> anyhow::Result<Event>;

/// Envelope of one record on the orders topic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub event_id: EventId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
    pub event_type: EventKind,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub order: OrderPayload,
}

impl OrderRecord {
    pub fn into_event(self) -> Event {
        Event {
            event_id: self.event_id,
            sequence_number: self.sequence_number,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            kind: self.event_type,
            payload: Payload::Order(self.order),
        }
    }
}

/// Envelope of one record on the executions topic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub event_id: EventId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
    pub event_type: EventKind,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub execution: ExecutionPayload,
}

impl ExecutionRecord {
    pub fn into_event(self) -> Event {
        Event {
            event_id: self.event_id,
            sequence_number: self.sequence_number,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            kind: self.event_type,
            payload: Payload::Execution(self.execution),
        }
    }
}

pub fn decode_order(bytes: &[u8]) -> anyhow::Result<Event> {
    let record: OrderRecord = serde_json::from_slice(bytes).context("decoding order record")?;
    Ok(record.into_event())
}

pub fn decode_execution(bytes: &[u8]) -> anyhow::Result<Event> {
    let record: ExecutionRecord = serde_json::from_slice(bytes).context("decoding execution record")?;
    Ok(record.into_event())
}
