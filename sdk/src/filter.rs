use serde::{Deserialize, Serialize};

/// Combinator applied across the conditions of one [`Filter`].
///
/// Conditions are leaves; a single flat level is all the traffic needs,
/// deep predicate trees are deliberately not expressible.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterOperator {
    #[display(fmt = "EQ")]
    Eq,
    #[display(fmt = "LIKE")]
    Like,
    #[display(fmt = "GT")]
    Gt,
    #[display(fmt = "GTE")]
    Gte,
    #[display(fmt = "LT")]
    Lt,
    #[display(fmt = "LTE")]
    Lte,
    #[display(fmt = "BETWEEN")]
    Between,
}

/// One `field operator value` leaf. `value2` is only meaningful (and then
/// mandatory) for `BETWEEN`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCondition {
    pub field: String,
    pub operator: FilterOperator,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value2: Option<String>,
}

impl FilterCondition {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            value2: None,
        }
    }

    pub fn between(field: impl Into<String>, lo: impl Into<String>, hi: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: FilterOperator::Between,
            value: lo.into(),
            value2: Some(hi.into()),
        }
    }
}

/// Client-supplied predicate for one stream or snapshot request.
///
/// An empty condition list matches every event. `include_snapshot = false`
/// requests a live-only stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(default)]
    pub logical_operator: LogicalOperator,
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    #[serde(default = "default_include_snapshot")]
    pub include_snapshot: bool,
}

fn default_include_snapshot() -> bool {
    true
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            logical_operator: LogicalOperator::And,
            filters: Vec::new(),
            include_snapshot: true,
        }
    }
}

impl Filter {
    pub fn matching(filters: Vec<FilterCondition>) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }

    pub fn live_only(mut self) -> Self {
        self.include_snapshot = false;
        self
    }
}

/// Which sources a unified blotter stream draws from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamType {
    Orders,
    Executions,
    All,
}

/// Request payload of the `blotter.stream` route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    pub blotter_id: String,
    pub stream_type: StreamType,
    #[serde(default)]
    pub filter: Filter,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn filter_defaults_apply() {
        let f: Filter = serde_json::from_str("{}").unwrap();
        assert_eq!(f.logical_operator, LogicalOperator::And);
        assert!(f.filters.is_empty());
        assert!(f.include_snapshot);
    }

    #[test]
    fn filter_wire_shape() {
        let f: Filter = serde_json::from_str(
            r#"{
                "logicalOperator": "OR",
                "filters": [
                    {"field": "symbol", "operator": "EQ", "value": "INTC"},
                    {"field": "price", "operator": "BETWEEN", "value": "30", "value2": "50"}
                ],
                "includeSnapshot": false
            }"#,
        )
        .unwrap();
        assert_eq!(f.logical_operator, LogicalOperator::Or);
        assert_eq!(f.filters.len(), 2);
        assert_eq!(f.filters[0], FilterCondition::new("symbol", FilterOperator::Eq, "INTC"));
        assert_eq!(f.filters[1], FilterCondition::between("price", "30", "50"));
        assert!(!f.include_snapshot);
    }

    #[test]
    fn stream_request_defaults_the_filter() {
        let req: StreamRequest =
            serde_json::from_str(r#"{"blotterId": "desk-1", "streamType": "ALL"}"#).unwrap();
        assert_eq!(req.stream_type, StreamType::All);
        assert_eq!(req.filter, Filter::default());
    }
}
