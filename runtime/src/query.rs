use crate::{
    error::FilterError,
    registry::{registry, Extractor, FieldAccessor, SemanticType},
    value::{FieldValue, Literal},
};
use blotter_sdk::{Event, Filter, FilterOperator, LogicalOperator, PayloadKind};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::cmp::Ordering;

/// A compiled, reusable predicate over events of one payload kind.
///
/// Compilation resolves every field name against the accessor registry,
/// checks operator/type compatibility and parses condition values into
/// their runtime types, so evaluation is a pure function that cannot fail.
#[derive(Debug)]
pub struct Query {
    kind: PayloadKind,
    op: LogicalOperator,
    conditions: Vec<Condition>,
    include_snapshot: bool,
}

#[derive(Debug)]
struct Condition {
    field: &'static str,
    extract: Extractor,
    test: Test,
}

#[derive(Debug)]
enum Test {
    Eq(Literal),
    /// Lowercased needle; containment is checked case-insensitively.
    Like(String),
    Gt(Literal),
    Gte(Literal),
    Lt(Literal),
    Lte(Literal),
    Between(Literal, Literal),
}

impl Query {
    pub fn compile(kind: PayloadKind, filter: &Filter) -> Result<Self, FilterError> {
        let registry = registry(kind);
        let mut conditions = Vec::with_capacity(filter.filters.len());
        for cond in &filter.filters {
            let accessor = registry
                .accessor(&cond.field)
                .ok_or_else(|| FilterError::UnknownField {
                    field: cond.field.clone(),
                })?;
            if !accessor.semantic.supports(cond.operator) {
                return Err(FilterError::IncompatibleOperator {
                    field: cond.field.clone(),
                    operator: cond.operator,
                    semantic: accessor.semantic,
                });
            }
            let value = parse_literal(accessor, &cond.value)?;
            let test = match cond.operator {
                FilterOperator::Eq => Test::Eq(value),
                FilterOperator::Like => {
                    let Literal::Str(s) = value else {
                        return Err(FilterError::IncompatibleOperator {
                            field: cond.field.clone(),
                            operator: cond.operator,
                            semantic: accessor.semantic,
                        });
                    };
                    Test::Like(s.to_ascii_lowercase())
                }
                FilterOperator::Gt => Test::Gt(value),
                FilterOperator::Gte => Test::Gte(value),
                FilterOperator::Lt => Test::Lt(value),
                FilterOperator::Lte => Test::Lte(value),
                FilterOperator::Between => {
                    let hi_raw = cond.value2.as_deref().ok_or_else(|| FilterError::MissingSecondValue {
                        field: cond.field.clone(),
                    })?;
                    let hi = parse_literal(accessor, hi_raw)?;
                    if literal_cmp(&value, &hi) == Some(Ordering::Greater) {
                        return Err(FilterError::InvertedRange {
                            field: cond.field.clone(),
                        });
                    }
                    Test::Between(value, hi)
                }
            };
            conditions.push(Condition {
                field: accessor.name,
                extract: accessor.extract,
                test,
            });
        }
        Ok(Query {
            kind,
            op: filter.logical_operator,
            conditions,
            include_snapshot: filter.include_snapshot,
        })
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    pub fn include_snapshot(&self) -> bool {
        self.include_snapshot
    }

    /// Pure and allocation-free. A filter with no conditions matches every
    /// event; a missing field never matches.
    pub fn eval(&self, event: &Event) -> bool {
        if self.conditions.is_empty() {
            return true;
        }
        match self.op {
            LogicalOperator::And => self.conditions.iter().all(|c| c.holds(event)),
            LogicalOperator::Or => self.conditions.iter().any(|c| c.holds(event)),
        }
    }

    /// Field names of the compiled conditions, in payload order.
    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.conditions.iter().map(|c| c.field)
    }
}

impl Condition {
    fn holds(&self, event: &Event) -> bool {
        let actual = (self.extract)(event);
        if actual.is_null() {
            return false;
        }
        match &self.test {
            Test::Eq(lit) => eq(actual, lit),
            Test::Like(needle) => match actual {
                FieldValue::Str(s) => contains_ignore_case(s, needle),
                _ => false,
            },
            Test::Gt(lit) => cmp(actual, lit) == Some(Ordering::Greater),
            Test::Gte(lit) => matches!(cmp(actual, lit), Some(Ordering::Greater | Ordering::Equal)),
            Test::Lt(lit) => cmp(actual, lit) == Some(Ordering::Less),
            Test::Lte(lit) => matches!(cmp(actual, lit), Some(Ordering::Less | Ordering::Equal)),
            Test::Between(lo, hi) => {
                matches!(cmp(actual, lo), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(cmp(actual, hi), Some(Ordering::Less | Ordering::Equal))
            }
        }
    }
}

fn eq(actual: FieldValue<'_>, lit: &Literal) -> bool {
    match (actual, lit) {
        // Strings and enum names compare case-insensitively.
        (FieldValue::Str(a), Literal::Str(b)) => a.eq_ignore_ascii_case(b),
        (FieldValue::Number(a), Literal::Number(b)) => a == *b,
        (FieldValue::Timestamp(a), Literal::Timestamp(b)) => a == *b,
        (FieldValue::Bool(a), Literal::Bool(b)) => a == *b,
        _ => false,
    }
}

fn cmp(actual: FieldValue<'_>, lit: &Literal) -> Option<Ordering> {
    match (actual, lit) {
        (FieldValue::Str(a), Literal::Str(b)) => Some(a.cmp(b.as_str())),
        (FieldValue::Number(a), Literal::Number(b)) => Some(a.cmp(b)),
        (FieldValue::Timestamp(a), Literal::Timestamp(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn literal_cmp(a: &Literal, b: &Literal) -> Option<Ordering> {
    match (a, b) {
        (Literal::Str(a), Literal::Str(b)) => Some(a.cmp(b)),
        (Literal::Number(a), Literal::Number(b)) => Some(a.cmp(b)),
        (Literal::Timestamp(a), Literal::Timestamp(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Case-insensitive substring containment without allocating; the needle is
/// lowercased once at compile time.
fn contains_ignore_case(haystack: &str, needle_lower: &str) -> bool {
    let needle = needle_lower.as_bytes();
    if needle.is_empty() {
        return true;
    }
    let haystack = haystack.as_bytes();
    if needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w.eq_ignore_ascii_case(needle))
}

fn parse_literal(accessor: &FieldAccessor, raw: &str) -> Result<Literal, FilterError> {
    let invalid = || FilterError::InvalidValue {
        field: accessor.name.to_owned(),
        value: raw.to_owned(),
        semantic: accessor.semantic,
    };
    match accessor.semantic {
        SemanticType::String | SemanticType::Enum => Ok(Literal::Str(raw.to_owned())),
        SemanticType::Number => raw
            .trim()
            .parse::<Decimal>()
            .map(Literal::Number)
            .map_err(|_| invalid()),
        SemanticType::Timestamp => raw
            .parse::<DateTime<Utc>>()
            .map(Literal::Timestamp)
            .map_err(|_| invalid()),
        SemanticType::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(Literal::Bool(true)),
            "false" => Ok(Literal::Bool(false)),
            _ => Err(invalid()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blotter_sdk::{EventId, EventKind, FilterCondition, OrderPayload, OrderState, Side};
    use pretty_assertions::assert_eq;

    fn order(symbol: &str, price: i64) -> Event {
        Event::order(
            EventId::new(1),
            EventKind::Create,
            "2024-05-02T09:30:00Z".parse().unwrap(),
            OrderPayload {
                order_id: "O-1".into(),
                symbol: Some(symbol.into()),
                side: Some(Side::Buy),
                state: Some(OrderState::Live),
                price: Some(Decimal::new(price, 0)),
                transact_time: Some("2024-05-02T10:00:00Z".parse().unwrap()),
                ..Default::default()
            },
        )
    }

    fn compile(filters: Vec<FilterCondition>) -> Query {
        Query::compile(PayloadKind::Order, &Filter::matching(filters)).unwrap()
    }

    #[test]
    fn empty_filter_matches_every_event() {
        let q = compile(vec![]);
        assert!(q.eval(&order("AAPL", 10)));
    }

    #[test]
    fn eq_on_strings_is_case_insensitive() {
        let q = compile(vec![FilterCondition::new("symbol", FilterOperator::Eq, "INTC")]);
        assert!(q.eval(&order("INTC", 10)));
        assert!(q.eval(&order("intc", 10)));
        assert!(!q.eval(&order("AAPL", 10)));
    }

    #[test]
    fn eq_matches_enum_wire_names_case_insensitively() {
        let q = compile(vec![FilterCondition::new("side", FilterOperator::Eq, "buy")]);
        assert!(q.eval(&order("INTC", 10)));
        let q = compile(vec![FilterCondition::new("state", FilterOperator::Eq, "LIVE")]);
        assert!(q.eval(&order("INTC", 10)));
    }

    #[test]
    fn like_is_substring_containment() {
        let q = compile(vec![FilterCondition::new("symbol", FilterOperator::Like, "nt")]);
        assert!(q.eval(&order("INTC", 10)));
        assert!(!q.eval(&order("AAPL", 10)));
    }

    #[test]
    fn like_on_a_null_field_is_false() {
        let q = compile(vec![FilterCondition::new("account", FilterOperator::Like, "x")]);
        assert!(!q.eval(&order("INTC", 10)));
    }

    #[test]
    fn comparisons_against_null_are_false_for_every_operator() {
        for op in [
            FilterOperator::Eq,
            FilterOperator::Gt,
            FilterOperator::Gte,
            FilterOperator::Lt,
            FilterOperator::Lte,
        ] {
            let q = compile(vec![FilterCondition::new("orderQty", op, "5")]);
            assert!(!q.eval(&order("INTC", 10)), "operator {}", op);
        }
        let q = compile(vec![FilterCondition::between("orderQty", "1", "9")]);
        assert!(!q.eval(&order("INTC", 10)));
    }

    #[test]
    fn between_is_inclusive_on_both_endpoints() {
        let q = compile(vec![FilterCondition::between("price", "30", "50")]);
        assert!(!q.eval(&order("A", 29)));
        assert!(q.eval(&order("A", 30)));
        assert!(q.eval(&order("A", 50)));
        assert!(!q.eval(&order("A", 51)));
    }

    #[test]
    fn numeric_ordering_is_decimal_not_lexicographic() {
        let q = compile(vec![FilterCondition::new("price", FilterOperator::Gt, "9")]);
        assert!(q.eval(&order("A", 10)));
    }

    #[test]
    fn timestamps_compare_as_instants() {
        let q = compile(vec![FilterCondition::new(
            "transactTime",
            FilterOperator::Gte,
            "2024-05-02T09:59:59Z",
        )]);
        assert!(q.eval(&order("A", 1)));
        let q = compile(vec![FilterCondition::new(
            "transactTime",
            FilterOperator::Lt,
            "2024-05-02T10:00:00Z",
        )]);
        assert!(!q.eval(&order("A", 1)));
    }

    #[test]
    fn or_matches_any_condition() {
        let filter = Filter {
            logical_operator: LogicalOperator::Or,
            filters: vec![
                FilterCondition::new("symbol", FilterOperator::Eq, "MSFT"),
                FilterCondition::new("price", FilterOperator::Gt, "5"),
            ],
            include_snapshot: true,
        };
        let q = Query::compile(PayloadKind::Order, &filter).unwrap();
        assert!(q.eval(&order("INTC", 10)));
        assert!(!q.eval(&order("INTC", 1)));
    }

    #[test]
    fn unknown_field_is_rejected_at_compile() {
        let err = Query::compile(
            PayloadKind::Order,
            &Filter::matching(vec![FilterCondition::new("sybmol", FilterOperator::Eq, "X")]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            FilterError::UnknownField {
                field: "sybmol".into()
            }
        );
        assert_eq!(err.field(), "sybmol");
    }

    #[test]
    fn incompatible_operator_is_rejected_at_compile() {
        let err = Query::compile(
            PayloadKind::Order,
            &Filter::matching(vec![FilterCondition::new("price", FilterOperator::Like, "3")]),
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::IncompatibleOperator { .. }));

        let err = Query::compile(
            PayloadKind::Order,
            &Filter::matching(vec![FilterCondition::new("side", FilterOperator::Gt, "BUY")]),
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::IncompatibleOperator { .. }));
    }

    #[test]
    fn malformed_number_is_rejected_at_compile() {
        let err = Query::compile(
            PayloadKind::Order,
            &Filter::matching(vec![FilterCondition::new("price", FilterOperator::Gt, "thirty")]),
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::InvalidValue { .. }));
    }

    #[test]
    fn between_requires_both_endpoints_in_order() {
        let err = Query::compile(
            PayloadKind::Order,
            &Filter::matching(vec![FilterCondition::new("price", FilterOperator::Between, "30")]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            FilterError::MissingSecondValue {
                field: "price".into()
            }
        );

        let err = Query::compile(
            PayloadKind::Order,
            &Filter::matching(vec![FilterCondition::between("price", "50", "30")]),
        )
        .unwrap_err();
        assert_eq!(err, FilterError::InvertedRange { field: "price".into() });
    }

    #[test]
    fn execution_filters_compile_against_their_own_registry() {
        let q = Query::compile(
            PayloadKind::Execution,
            &Filter::matching(vec![FilterCondition::new("lastPx", FilterOperator::Gte, "1.5")]),
        )
        .unwrap();
        assert_eq!(q.kind(), PayloadKind::Execution);

        let err = Query::compile(
            PayloadKind::Execution,
            &Filter::matching(vec![FilterCondition::new("symbol", FilterOperator::Eq, "INTC")]),
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::UnknownField { .. }));
    }

    mod round_trip {
        use super::*;
        use quickcheck::{Arbitrary, Gen, QuickCheck};

        // A filter drawn from the order registry with type-correct
        // operators and values, so it always compiles.
        #[derive(Clone, Debug)]
        struct CompilableFilter(Filter);

        impl Arbitrary for CompilableFilter {
            fn arbitrary(g: &mut Gen) -> Self {
                let fields = [
                    ("symbol", SemanticType::String),
                    ("account", SemanticType::String),
                    ("side", SemanticType::Enum),
                    ("price", SemanticType::Number),
                    ("orderQty", SemanticType::Number),
                ];
                let n = usize::arbitrary(g) % 4;
                let filters = (0..n)
                    .map(|_| {
                        let (field, semantic) = *g.choose(&fields).unwrap();
                        let condition = |op, value: std::string::String| FilterCondition {
                            field: field.into(),
                            operator: op,
                            value,
                            value2: None,
                        };
                        match semantic {
                            SemanticType::Number => {
                                let lo = i32::arbitrary(g) % 1000;
                                let hi = lo.saturating_add((u8::arbitrary(g) % 100) as i32);
                                let op = *g
                                    .choose(&[
                                        FilterOperator::Eq,
                                        FilterOperator::Gt,
                                        FilterOperator::Gte,
                                        FilterOperator::Lt,
                                        FilterOperator::Lte,
                                        FilterOperator::Between,
                                    ])
                                    .unwrap();
                                if op == FilterOperator::Between {
                                    FilterCondition::between(field, lo.to_string(), hi.to_string())
                                } else {
                                    condition(op, lo.to_string())
                                }
                            }
                            SemanticType::Enum => {
                                let value = g.choose(&["BUY", "SELL", "buy"]).unwrap().to_string();
                                condition(*g.choose(&[FilterOperator::Eq, FilterOperator::Like]).unwrap(), value)
                            }
                            _ => {
                                let value: std::string::String = (0..(u8::arbitrary(g) % 4))
                                    .map(|_| char::from(b'A' + u8::arbitrary(g) % 26))
                                    .collect();
                                condition(
                                    *g.choose(&[FilterOperator::Eq, FilterOperator::Like, FilterOperator::Gt])
                                        .unwrap(),
                                    value,
                                )
                            }
                        }
                    })
                    .collect();
                CompilableFilter(Filter {
                    logical_operator: *g.choose(&[LogicalOperator::And, LogicalOperator::Or]).unwrap(),
                    filters,
                    include_snapshot: bool::arbitrary(g),
                })
            }
        }

        #[test]
        fn compilation_survives_serialization() {
            fn prop(f: CompilableFilter, symbol_seed: u8, price_seed: i32) -> bool {
                let event = order(
                    ["INTC", "AAPL", "MSFT", ""][usize::from(symbol_seed) % 4],
                    i64::from(price_seed % 1200),
                );
                let direct = Query::compile(PayloadKind::Order, &f.0).unwrap();
                let json = serde_json::to_string(&f.0).unwrap();
                let parsed: Filter = serde_json::from_str(&json).unwrap();
                let round_tripped = Query::compile(PayloadKind::Order, &parsed).unwrap();
                direct.eval(&event) == round_tripped.eval(&event)
                    && direct.include_snapshot() == round_tripped.include_snapshot()
            }
            QuickCheck::new()
                .tests(300)
                .quickcheck(prop as fn(CompilableFilter, u8, i32) -> bool);
        }
    }
}
