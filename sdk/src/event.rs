use crate::EventId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle classification of an event.
///
/// `Snapshot` marks events reconstructed from the external query API,
/// `Cache` marks events served from the in-process key cache; the remaining
/// kinds are assigned by the upstream producer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Snapshot,
    Create,
    Update,
    New,
    Correct,
    Bust,
    Cache,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Snapshot => "SNAPSHOT",
            EventKind::Create => "CREATE",
            EventKind::Update => "UPDATE",
            EventKind::New => "NEW",
            EventKind::Correct => "CORRECT",
            EventKind::Bust => "BUST",
            EventKind::Cache => "CACHE",
        }
    }
}

/// Order lifecycle state as projected by the upstream read model.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    New,
    Unack,
    Live,
    Filled,
    Cxl,
    Rej,
    Closed,
    Exp,
}

impl OrderState {
    /// Terminal states see no further lifecycle changes; the key cache
    /// evicts entries in these states first.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Cxl | OrderState::Rej | OrderState::Closed | OrderState::Exp
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderState::New => "NEW",
            OrderState::Unack => "UNACK",
            OrderState::Live => "LIVE",
            OrderState::Filled => "FILLED",
            OrderState::Cxl => "CXL",
            OrderState::Rej => "REJ",
            OrderState::Closed => "CLOSED",
            OrderState::Exp => "EXP",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
    SellShort,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
            Side::SellShort => "SELL_SHORT",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::Stop => "STOP",
            OrderType::StopLimit => "STOP_LIMIT",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    Day,
    Gtc,
    Ioc,
    Fok,
    Gtd,
}

impl TimeInForce {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeInForce::Day => "DAY",
            TimeInForce::Gtc => "GTC",
            TimeInForce::Ioc => "IOC",
            TimeInForce::Fok => "FOK",
            TimeInForce::Gtd => "GTD",
        }
    }
}

/// Read-model projection of an order.
///
/// Every field except the order id may be absent on the wire; absent fields
/// stay `None` and compare as null in filters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub order_id: String,
    pub parent_order_id: Option<String>,
    pub root_order_id: Option<String>,
    pub client_order_id: Option<String>,
    pub account: Option<String>,
    pub symbol: Option<String>,
    pub side: Option<Side>,
    pub order_type: Option<OrderType>,
    pub state: Option<OrderState>,
    pub cancel_state: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub order_qty: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub cum_qty: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub leaves_qty: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub stop_px: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub avg_px: Option<Decimal>,
    pub time_in_force: Option<TimeInForce>,
    pub security_id: Option<String>,
    pub security_type: Option<String>,
    pub ex_destination: Option<String>,
    pub text: Option<String>,
    pub sending_time: Option<DateTime<Utc>>,
    pub transact_time: Option<DateTime<Utc>>,
    pub expire_time: Option<DateTime<Utc>>,
}

/// One fill (or fill correction) reported against an order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPayload {
    pub exec_id: String,
    pub order_id: String,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub last_qty: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub last_px: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub cum_qty: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub avg_px: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub leaves_qty: Option<Decimal>,
    pub exec_type: Option<String>,
    pub last_mkt: Option<String>,
    pub last_capacity: Option<String>,
    pub transact_time: Option<DateTime<Utc>>,
    pub creation_date: Option<DateTime<Utc>>,
}

/// Discriminates the two payload families carried by the service.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, derive_more::Display)]
pub enum PayloadKind {
    #[display(fmt = "orders")]
    Order,
    #[display(fmt = "executions")]
    Execution,
}

/// Tagged payload variant; orders and executions flow through the same
/// hub, cache and engine machinery.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Order(OrderPayload),
    Execution(ExecutionPayload),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Order(_) => PayloadKind::Order,
            Payload::Execution(_) => PayloadKind::Execution,
        }
    }

    /// Business key the cache indexes by.
    pub fn key(&self) -> &str {
        match self {
            Payload::Order(o) => &o.order_id,
            Payload::Execution(x) => &x.exec_id,
        }
    }

    pub fn order(&self) -> Option<&OrderPayload> {
        match self {
            Payload::Order(o) => Some(o),
            Payload::Execution(_) => None,
        }
    }

    pub fn execution(&self) -> Option<&ExecutionPayload> {
        match self {
            Payload::Order(_) => None,
            Payload::Execution(x) => Some(x),
        }
    }

    /// Whether the payload has reached a terminal lifecycle state.
    /// Executions carry no state and never count as terminal.
    pub fn is_terminal(&self) -> bool {
        match self {
            Payload::Order(o) => o.state.map(OrderState::is_terminal).unwrap_or(false),
            Payload::Execution(_) => false,
        }
    }
}

/// An immutable record of one observed fact about an order or execution.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub event_id: EventId,
    pub sequence_number: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub payload: Payload,
}

impl Event {
    pub fn order(event_id: EventId, kind: EventKind, timestamp: DateTime<Utc>, order: OrderPayload) -> Self {
        Self {
            event_id,
            sequence_number: None,
            timestamp,
            kind,
            payload: Payload::Order(order),
        }
    }

    pub fn execution(
        event_id: EventId,
        kind: EventKind,
        timestamp: DateTime<Utc>,
        execution: ExecutionPayload,
    ) -> Self {
        Self {
            event_id,
            sequence_number: None,
            timestamp,
            kind,
            payload: Payload::Execution(execution),
        }
    }

    pub fn key(&self) -> &str {
        self.payload.key()
    }

    pub fn payload_kind(&self) -> PayloadKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn order_payload_tolerates_absent_fields() {
        let order: OrderPayload = serde_json::from_str(r#"{"orderId":"O-1"}"#).unwrap();
        assert_eq!(order.order_id, "O-1");
        assert_eq!(order.symbol, None);
        assert_eq!(order.price, None);
        assert_eq!(order.state, None);
    }

    #[test]
    fn decimal_fields_accept_json_numbers() {
        let order: OrderPayload = serde_json::from_str(r#"{"orderId":"O-1","price":30.25,"orderQty":100}"#).unwrap();
        assert_eq!(order.price, Some(Decimal::new(3025, 2)));
        assert_eq!(order.order_qty, Some(Decimal::new(100, 0)));
    }

    #[test]
    fn state_enum_uses_wire_names() {
        let order: OrderPayload = serde_json::from_str(r#"{"orderId":"O-1","state":"FILLED","side":"BUY"}"#).unwrap();
        assert_eq!(order.state, Some(OrderState::Filled));
        assert_eq!(order.side, Some(Side::Buy));
        assert!(order.state.unwrap().is_terminal());
    }

    #[test]
    fn terminal_set_is_exactly_the_closed_states() {
        let terminal = [
            OrderState::Filled,
            OrderState::Cxl,
            OrderState::Rej,
            OrderState::Closed,
            OrderState::Exp,
        ];
        let open = [OrderState::New, OrderState::Unack, OrderState::Live];
        assert!(terminal.iter().all(|s| s.is_terminal()));
        assert!(open.iter().all(|s| !s.is_terminal()));
    }

    #[test]
    fn executions_are_never_terminal() {
        let x = Payload::Execution(ExecutionPayload {
            exec_id: "E-1".into(),
            order_id: "O-1".into(),
            ..Default::default()
        });
        assert!(!x.is_terminal());
        assert_eq!(x.key(), "E-1");
    }
}
