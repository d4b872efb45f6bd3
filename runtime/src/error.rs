use crate::registry::SemanticType;
use blotter_sdk::FilterOperator;
use derive_more::{Display, Error};

/// Why a filter payload failed to compile. Each variant names the offending
/// field so the transport can surface a structured `INVALID_FILTER` payload.
#[derive(Debug, Clone, PartialEq, Display, Error)]
pub enum FilterError {
    #[display(fmt = "unknown field `{}`", field)]
    UnknownField { field: String },
    #[display(fmt = "operator {} is not applicable to {} field `{}`", operator, semantic, field)]
    IncompatibleOperator {
        field: String,
        operator: FilterOperator,
        semantic: SemanticType,
    },
    #[display(fmt = "value `{}` for field `{}` does not parse as {}", value, field, semantic)]
    InvalidValue {
        field: String,
        value: String,
        semantic: SemanticType,
    },
    #[display(fmt = "BETWEEN on field `{}` requires a second value", field)]
    MissingSecondValue { field: String },
    #[display(fmt = "BETWEEN on field `{}` has its endpoints swapped", field)]
    InvertedRange { field: String },
}

impl FilterError {
    /// The field the error is about.
    pub fn field(&self) -> &str {
        match self {
            FilterError::UnknownField { field }
            | FilterError::IncompatibleOperator { field, .. }
            | FilterError::InvalidValue { field, .. }
            | FilterError::MissingSecondValue { field }
            | FilterError::InvertedRange { field } => field,
        }
    }
}
