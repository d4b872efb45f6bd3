//! Startup-built accessor registries.
//!
//! Dynamic field lookup is resolved exactly once, when a filter compiles:
//! each filterable field is registered as a `(name, semantic type,
//! extractor)` triple, where the extractor is a plain function pointer from
//! an event to a borrowed [`FieldValue`]. After startup the registries are
//! immutable and read lock-free.

use crate::value::FieldValue;
use blotter_sdk::{Event, ExecutionPayload, FilterOperator, OrderPayload, PayloadKind};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Semantic type of a filterable field. Fixed at registration; determines
/// the set of legal operators and how condition values parse.
#[derive(Copy, Clone, Debug, PartialEq, Eq, derive_more::Display)]
pub enum SemanticType {
    #[display(fmt = "STRING")]
    String,
    #[display(fmt = "NUMBER")]
    Number,
    #[display(fmt = "TIMESTAMP")]
    Timestamp,
    #[display(fmt = "ENUM")]
    Enum,
    #[display(fmt = "BOOLEAN")]
    Boolean,
}

impl SemanticType {
    /// The operator/type compatibility table. Orderings are undefined on
    /// booleans, LIKE needs text, enums compare by their wire name.
    pub fn supports(self, op: FilterOperator) -> bool {
        use FilterOperator::*;
        match self {
            SemanticType::String => true,
            SemanticType::Number | SemanticType::Timestamp => !matches!(op, Like),
            SemanticType::Enum => matches!(op, Eq | Like),
            SemanticType::Boolean => matches!(op, Eq),
        }
    }
}

pub type Extractor = for<'a> fn(&'a Event) -> FieldValue<'a>;

pub struct FieldAccessor {
    pub name: &'static str,
    pub semantic: SemanticType,
    pub extract: Extractor,
}

/// Immutable mapping from wire field names to typed extractors for one
/// payload kind.
pub struct Registry {
    kind: PayloadKind,
    fields: BTreeMap<&'static str, FieldAccessor>,
}

impl Registry {
    fn new(kind: PayloadKind, accessors: Vec<FieldAccessor>) -> Self {
        let fields = accessors.into_iter().map(|a| (a.name, a)).collect();
        Self { kind, fields }
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    pub fn accessor(&self, name: &str) -> Option<&FieldAccessor> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.keys().copied()
    }
}

/// The registry for the given payload kind.
pub fn registry(kind: PayloadKind) -> &'static Registry {
    match kind {
        PayloadKind::Order => &ORDER_REGISTRY,
        PayloadKind::Execution => &EXECUTION_REGISTRY,
    }
}

/// Touches every registry so construction happens during boot, not under a
/// client request.
pub fn init() {
    Lazy::force(&ORDER_REGISTRY);
    Lazy::force(&EXECUTION_REGISTRY);
}

fn field(name: &'static str, semantic: SemanticType, extract: Extractor) -> FieldAccessor {
    FieldAccessor {
        name,
        semantic,
        extract,
    }
}

fn order(e: &Event) -> Option<&OrderPayload> {
    e.payload.order()
}

fn execution(e: &Event) -> Option<&ExecutionPayload> {
    e.payload.execution()
}

fn text(v: Option<&str>) -> FieldValue<'_> {
    v.map(FieldValue::Str).unwrap_or(FieldValue::Null)
}

fn number(v: Option<Decimal>) -> FieldValue<'static> {
    v.map(FieldValue::Number).unwrap_or(FieldValue::Null)
}

fn instant(v: Option<DateTime<Utc>>) -> FieldValue<'static> {
    v.map(FieldValue::Timestamp).unwrap_or(FieldValue::Null)
}

static ORDER_REGISTRY: Lazy<Registry> = Lazy::new(|| {
    use SemanticType::*;
    Registry::new(
        PayloadKind::Order,
        vec![
            field("orderId", String, |e| text(order(e).map(|o| o.order_id.as_str()))),
            field("parentOrderId", String, |e| {
                text(order(e).and_then(|o| o.parent_order_id.as_deref()))
            }),
            field("rootOrderId", String, |e| {
                text(order(e).and_then(|o| o.root_order_id.as_deref()))
            }),
            field("clientOrderId", String, |e| {
                text(order(e).and_then(|o| o.client_order_id.as_deref()))
            }),
            field("account", String, |e| text(order(e).and_then(|o| o.account.as_deref()))),
            field("symbol", String, |e| text(order(e).and_then(|o| o.symbol.as_deref()))),
            field("side", Enum, |e| {
                text(order(e).and_then(|o| o.side.map(|s| s.as_str())))
            }),
            field("orderType", Enum, |e| {
                text(order(e).and_then(|o| o.order_type.map(|t| t.as_str())))
            }),
            field("state", Enum, |e| {
                text(order(e).and_then(|o| o.state.map(|s| s.as_str())))
            }),
            field("cancelState", String, |e| {
                text(order(e).and_then(|o| o.cancel_state.as_deref()))
            }),
            field("orderQty", Number, |e| number(order(e).and_then(|o| o.order_qty))),
            field("cumQty", Number, |e| number(order(e).and_then(|o| o.cum_qty))),
            field("leavesQty", Number, |e| number(order(e).and_then(|o| o.leaves_qty))),
            field("price", Number, |e| number(order(e).and_then(|o| o.price))),
            field("stopPx", Number, |e| number(order(e).and_then(|o| o.stop_px))),
            field("avgPx", Number, |e| number(order(e).and_then(|o| o.avg_px))),
            field("timeInForce", Enum, |e| {
                text(order(e).and_then(|o| o.time_in_force.map(|t| t.as_str())))
            }),
            field("securityId", String, |e| {
                text(order(e).and_then(|o| o.security_id.as_deref()))
            }),
            field("securityType", String, |e| {
                text(order(e).and_then(|o| o.security_type.as_deref()))
            }),
            field("exDestination", String, |e| {
                text(order(e).and_then(|o| o.ex_destination.as_deref()))
            }),
            field("text", String, |e| text(order(e).and_then(|o| o.text.as_deref()))),
            field("sendingTime", Timestamp, |e| {
                instant(order(e).and_then(|o| o.sending_time))
            }),
            field("transactTime", Timestamp, |e| {
                instant(order(e).and_then(|o| o.transact_time))
            }),
            field("expireTime", Timestamp, |e| instant(order(e).and_then(|o| o.expire_time))),
        ],
    )
});

static EXECUTION_REGISTRY: Lazy<Registry> = Lazy::new(|| {
    use SemanticType::*;
    Registry::new(
        PayloadKind::Execution,
        vec![
            field("execId", String, |e| text(execution(e).map(|x| x.exec_id.as_str()))),
            field("orderId", String, |e| text(execution(e).map(|x| x.order_id.as_str()))),
            field("lastQty", Number, |e| number(execution(e).and_then(|x| x.last_qty))),
            field("lastPx", Number, |e| number(execution(e).and_then(|x| x.last_px))),
            field("cumQty", Number, |e| number(execution(e).and_then(|x| x.cum_qty))),
            field("avgPx", Number, |e| number(execution(e).and_then(|x| x.avg_px))),
            field("leavesQty", Number, |e| number(execution(e).and_then(|x| x.leaves_qty))),
            field("execType", String, |e| {
                text(execution(e).and_then(|x| x.exec_type.as_deref()))
            }),
            field("lastMkt", String, |e| text(execution(e).and_then(|x| x.last_mkt.as_deref()))),
            field("lastCapacity", String, |e| {
                text(execution(e).and_then(|x| x.last_capacity.as_deref()))
            }),
            field("transactTime", Timestamp, |e| {
                instant(execution(e).and_then(|x| x.transact_time))
            }),
            field("creationDate", Timestamp, |e| {
                instant(execution(e).and_then(|x| x.creation_date))
            }),
        ],
    )
});
