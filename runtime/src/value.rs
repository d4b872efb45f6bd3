use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Borrowed view of a single event field, as handed to the evaluator by an
/// accessor. Extraction never allocates; string-ish fields borrow from the
/// event, scalar fields are copied.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FieldValue<'a> {
    /// The field is absent on this event. Every comparison against null
    /// yields false.
    Null,
    Str(&'a str),
    Number(Decimal),
    Timestamp(DateTime<Utc>),
    Bool(bool),
}

impl FieldValue<'_> {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

/// Owned literal parsed from a filter condition value at compile time.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Str(String),
    Number(Decimal),
    Timestamp(DateTime<Utc>),
    Bool(bool),
}
