// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Composable query options for resource listings.
//!
//! A [`Query`] is a plain value: filters, ordering, expansions, projection
//! and paging. Queries are combined with [`Query::merge`], which ANDs filters
//! together instead of replacing them, so a scoping filter added by the SDK
//! survives whatever the caller adds on top.

use std::cmp::Ordering;

use serde_json::Value;

/// A filter expression over record fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field eq value`
    Eq(String, Value),
    /// `field ne value`
    Ne(String, Value),
    /// `field in (values...)`
    In(String, Vec<Value>),
    /// `startswith(field, prefix)`
    StartsWith(String, String),
    /// `tolower(field) eq tolower(value)`
    EqIgnoreCase(String, String),
    /// All sub-filters hold.
    And(Vec<Filter>),
    /// At least one sub-filter holds.
    Or(Vec<Filter>),
    /// The sub-filter does not hold.
    Not(Box<Filter>),
}

impl Filter {
    /// `field eq value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    /// `field ne value`.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ne(field.into(), value.into())
    }

    /// `startswith(field, prefix)`.
    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Filter::StartsWith(field.into(), prefix.into())
    }

    /// Case-insensitive equality.
    pub fn eq_ignore_case(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::EqIgnoreCase(field.into(), value.into())
    }

    /// Membership test.
    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Filter::In(field.into(), values)
    }

    /// Negation.
    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    /// Render as an OData `$filter` expression.
    pub fn to_odata(&self) -> String {
        match self {
            Filter::Eq(field, value) => format!("{} eq {}", field, literal(value)),
            Filter::Ne(field, value) => format!("{} ne {}", field, literal(value)),
            Filter::In(field, values) => {
                let items: Vec<String> = values.iter().map(literal).collect();
                format!("{} in ({})", field, items.join(", "))
            }
            Filter::StartsWith(field, prefix) => {
                format!("startswith({},{})", field, quote(prefix))
            }
            Filter::EqIgnoreCase(field, value) => {
                format!("tolower({}) eq tolower({})", field, quote(value))
            }
            Filter::And(filters) => join(filters, " and "),
            Filter::Or(filters) => join(filters, " or "),
            Filter::Not(inner) => format!("not ({})", inner.to_odata()),
        }
    }

    /// Evaluate the filter against a JSON record.
    ///
    /// Link fields (`{"__id": 42}`) compare by their id, so `device eq 42`
    /// matches a record whose `device` is a link to row 42.
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Filter::Eq(field, value) => values_equal(field_value(record, field), value),
            Filter::Ne(field, value) => !values_equal(field_value(record, field), value),
            Filter::In(field, values) => {
                let actual = field_value(record, field);
                values.iter().any(|v| values_equal(actual, v))
            }
            Filter::StartsWith(field, prefix) => field_value(record, field)
                .and_then(Value::as_str)
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            Filter::EqIgnoreCase(field, value) => field_value(record, field)
                .and_then(Value::as_str)
                .is_some_and(|s| s.to_lowercase() == value.to_lowercase()),
            Filter::And(filters) => filters.iter().all(|f| f.matches(record)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(record)),
            Filter::Not(inner) => !inner.matches(record),
        }
    }
}

fn join(filters: &[Filter], separator: &str) -> String {
    match filters {
        [] => String::new(),
        [single] => single.to_odata(),
        many => many
            .iter()
            .map(|f| format!("({})", f.to_odata()))
            .collect::<Vec<_>>()
            .join(separator),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        other => quote(&other.to_string()),
    }
}

/// Read a field, unwrapping link objects down to their id.
pub(crate) fn field_value<'a>(record: &'a Value, field: &str) -> Option<&'a Value> {
    let value = record.get(field)?;
    match value {
        Value::Object(map) => map.get("__id").or_else(|| map.get("id")).or(Some(value)),
        Value::Array(items) if items.len() == 1 => match &items[0] {
            Value::Object(map) => map.get("id").or(Some(value)),
            _ => Some(value),
        },
        _ => Some(value),
    }
}

fn values_equal(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (None, Value::Null) => true,
        (None, _) => false,
        (Some(a), e) => match (a.as_f64(), e.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == e,
        },
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One `$orderby` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }

    fn to_odata(&self) -> String {
        let dir = match self.direction {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        };
        format!("{} {}", self.field, dir)
    }
}

/// One `$expand` clause with its own nested options.
#[derive(Debug, Clone, PartialEq)]
pub struct Expand {
    pub navigation: String,
    pub query: Query,
}

impl Expand {
    pub fn new(navigation: impl Into<String>) -> Self {
        Self {
            navigation: navigation.into(),
            query: Query::default(),
        }
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    fn to_odata(&self) -> String {
        let nested: Vec<String> = self
            .query
            .to_params()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        if nested.is_empty() {
            self.navigation.clone()
        } else {
            format!("{}({})", self.navigation, nested.join(";"))
        }
    }
}

/// Listing options: filters, ordering, expansions, projection and paging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Conjunction of filters.
    pub filter: Vec<Filter>,
    pub order_by: Vec<OrderBy>,
    pub expand: Vec<Expand>,
    pub select: Vec<String>,
    pub top: Option<u32>,
    pub skip: Option<u32>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter; it is ANDed with the existing ones.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter.push(filter);
        self
    }

    pub fn with_order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn with_expand(mut self, expand: Expand) -> Self {
        self.expand.push(expand);
        self
    }

    pub fn with_select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            if !self.select.contains(&field) {
                self.select.push(field);
            }
        }
        self
    }

    pub fn with_top(mut self, top: u32) -> Self {
        self.top = Some(top);
        self
    }

    pub fn with_skip(mut self, skip: u32) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Whether any filter is set.
    pub fn has_filter(&self) -> bool {
        !self.filter.is_empty()
    }

    /// Combine two queries.
    ///
    /// Filters of both sides are kept (conjunction), orderings and expansions
    /// are concatenated with `self` first, projections are unioned and paging
    /// from `other` wins. The operation is associative.
    pub fn merge(mut self, other: Query) -> Query {
        self.filter.extend(other.filter);
        self.order_by.extend(other.order_by);
        self.expand.extend(other.expand);
        let select = other.select;
        self = self.with_select(select);
        self.top = other.top.or(self.top);
        self.skip = other.skip.or(self.skip);
        self
    }

    /// The whole filter as one expression, if any.
    pub fn combined_filter(&self) -> Option<Filter> {
        match self.filter.as_slice() {
            [] => None,
            [single] => Some(single.clone()),
            many => Some(Filter::And(many.to_vec())),
        }
    }

    /// Render as OData query parameters.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(filter) = self.combined_filter() {
            params.push(("$filter".to_string(), filter.to_odata()));
        }
        if !self.order_by.is_empty() {
            let order: Vec<String> = self.order_by.iter().map(OrderBy::to_odata).collect();
            params.push(("$orderby".to_string(), order.join(",")));
        }
        if !self.expand.is_empty() {
            let expand: Vec<String> = self.expand.iter().map(Expand::to_odata).collect();
            params.push(("$expand".to_string(), expand.join(",")));
        }
        if !self.select.is_empty() {
            params.push(("$select".to_string(), self.select.join(",")));
        }
        if let Some(top) = self.top {
            params.push(("$top".to_string(), top.to_string()));
        }
        if let Some(skip) = self.skip {
            params.push(("$skip".to_string(), skip.to_string()));
        }
        params
    }

    /// Apply filter, ordering, paging and projection to in-memory records.
    ///
    /// Expansions are not evaluated.
    pub fn apply(&self, records: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut rows: Vec<Value> = records
            .into_iter()
            .filter(|r| self.filter.iter().all(|f| f.matches(r)))
            .collect();

        rows.sort_by(|a, b| {
            for order in &self.order_by {
                let ord = compare_values(field_value(a, &order.field), field_value(b, &order.field));
                let ord = match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });

        let skip = self.skip.unwrap_or(0) as usize;
        let top = self.top.map(|t| t as usize).unwrap_or(usize::MAX);
        rows.into_iter()
            .skip(skip)
            .take(top)
            .map(|row| self.project(row))
            .collect()
    }

    fn project(&self, row: Value) -> Value {
        if self.select.is_empty() {
            return row;
        }
        match row {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(k, _)| self.select.iter().any(|s| s == k))
                    .collect(),
            ),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_rendering() {
        assert_eq!(Filter::eq("device", 42).to_odata(), "device eq 42");
        assert_eq!(
            Filter::eq("tag_key", "it's").to_odata(),
            "tag_key eq 'it''s'"
        );
        assert_eq!(
            Filter::starts_with("uuid", "abc").to_odata(),
            "startswith(uuid,'abc')"
        );
        assert_eq!(
            Filter::eq_ignore_case("app_name", "MyApp").to_odata(),
            "tolower(app_name) eq tolower('MyApp')"
        );
        let or = Filter::Or(vec![Filter::eq("a", 1), Filter::eq("b", true)]);
        assert_eq!(or.to_odata(), "(a eq 1) or (b eq true)");
        assert_eq!(Filter::not(Filter::eq("a", Value::Null)).to_odata(), "not (a eq null)");
        assert_eq!(
            Filter::is_in("id", vec![json!(1), json!(2)]).to_odata(),
            "id in (1, 2)"
        );
    }

    #[test]
    fn test_merge_keeps_both_filters() {
        let scoped = Query::new().with_filter(Filter::eq("device", 42));
        let caller = Query::new().with_filter(Filter::eq("extra", 1));
        let merged = scoped.merge(caller);

        assert_eq!(
            merged.combined_filter(),
            Some(Filter::And(vec![
                Filter::eq("device", 42),
                Filter::eq("extra", 1)
            ]))
        );
    }

    #[test]
    fn test_merge_is_associative() {
        let a = Query::new()
            .with_filter(Filter::eq("a", 1))
            .with_order_by(OrderBy::asc("a"))
            .with_select(["a", "b"]);
        let b = Query::new()
            .with_filter(Filter::eq("b", 2))
            .with_select(["b", "c"])
            .with_top(5);
        let c = Query::new()
            .with_order_by(OrderBy::desc("c"))
            .with_select(["a", "d"])
            .with_skip(3);

        let left = a.clone().merge(b.clone()).merge(c.clone());
        let right = a.merge(b.merge(c));
        assert_eq!(left, right);
        assert_eq!(left.select, vec!["a", "b", "c", "d"]);
        assert_eq!(left.top, Some(5));
        assert_eq!(left.skip, Some(3));
    }

    #[test]
    fn test_params_rendering() {
        let query = Query::new()
            .with_filter(Filter::eq("device", 7))
            .with_filter(Filter::eq("tag_key", "ENV"))
            .with_order_by(OrderBy::asc("tag_key"))
            .with_expand(
                Expand::new("device").with_query(Query::new().with_select(["uuid"])),
            )
            .with_select(["id", "value"])
            .with_top(10);

        let params = query.to_params();
        assert_eq!(
            params,
            vec![
                (
                    "$filter".to_string(),
                    "(device eq 7) and (tag_key eq 'ENV')".to_string()
                ),
                ("$orderby".to_string(), "tag_key asc".to_string()),
                ("$expand".to_string(), "device($select=uuid)".to_string()),
                ("$select".to_string(), "id,value".to_string()),
                ("$top".to_string(), "10".to_string()),
            ]
        );
    }

    #[test]
    fn test_matches_link_fields() {
        let record = json!({"id": 1, "device": {"__id": 42}, "tag_key": "ENV"});
        assert!(Filter::eq("device", 42).matches(&record));
        assert!(!Filter::eq("device", 43).matches(&record));
        assert!(Filter::eq("missing", Value::Null).matches(&record));

        let expanded = json!({"device": [{"id": 42, "uuid": "abc"}]});
        assert!(Filter::eq("device", 42).matches(&expanded));
    }

    #[test]
    fn test_apply_orders_pages_and_projects() {
        let rows = vec![
            json!({"id": 1, "tag_key": "b"}),
            json!({"id": 2, "tag_key": "a"}),
            json!({"id": 3, "tag_key": "c"}),
        ];
        let query = Query::new()
            .with_order_by(OrderBy::asc("tag_key"))
            .with_skip(1)
            .with_top(1)
            .with_select(["id"]);
        assert_eq!(query.apply(rows), vec![json!({"id": 1})]);
    }
}
