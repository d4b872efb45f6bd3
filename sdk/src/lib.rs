//! Domain model and wire types for the blotter streaming service.
//!
//! Everything that crosses a process boundary lives here: the internal
//! [`Event`] shape shared by the ingestor, hub, cache and subscription
//! engine, the [`Filter`] payload clients send when opening a stream, and
//! the JSON response types of the request/stream endpoints.

mod event;
mod filter;
mod scalars;
pub mod service;

pub use event::{
    Event, EventKind, ExecutionPayload, OrderPayload, OrderState, OrderType, Payload, PayloadKind, Side, TimeInForce,
};
pub use filter::{Filter, FilterCondition, FilterOperator, LogicalOperator, StreamRequest, StreamType};
pub use scalars::EventId;
