//! The storage collaborator seen by every cell.
//!
//! Rows are JSON objects keyed by column name with a string `id`. Queries are
//! conjunctions of simple column predicates plus ordering and a limit, which
//! is all the clinic services need; joins are done in memory by the callers.

use std::cmp::Ordering;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub mod tables {
    pub const CLINICS: &str = "clinics";
    pub const DOCTORS: &str = "doctors";
    pub const PATIENTS: &str = "patients";
    pub const APPOINTMENTS: &str = "appointments";
    pub const PRESCRIPTIONS: &str = "prescriptions";
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    In(String, Vec<Value>),
    Gte(String, Value),
    Lte(String, Value),
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _) | Filter::Neq(c, _) | Filter::In(c, _)
            | Filter::Gte(c, _) | Filter::Lte(c, _) => c,
        }
    }

    pub fn matches(&self, row: &Value) -> bool {
        let actual = row.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Filter::Eq(_, expected) => compare_values(actual, expected) == Ordering::Equal,
            Filter::Neq(_, expected) => compare_values(actual, expected) != Ordering::Equal,
            Filter::In(_, options) => options
                .iter()
                .any(|o| compare_values(actual, o) == Ordering::Equal),
            Filter::Gte(_, bound) => !actual.is_null() && compare_values(actual, bound) != Ordering::Less,
            Filter::Lte(_, bound) => !actual.is_null() && compare_values(actual, bound) != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    pub fn neq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Neq(column.to_string(), value.into()));
        self
    }

    pub fn in_list<V: Into<Value>>(mut self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.filters.push(Filter::In(
            column.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn gte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte(column.to_string(), value.into()));
        self
    }

    pub fn lte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lte(column.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order.push(OrderBy { column: column.to_string(), ascending });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Order rows in place by this query's ordering columns.
    pub fn sort(&self, rows: &mut [Value]) {
        if self.order.is_empty() {
            return;
        }
        rows.sort_by(|a, b| {
            for order in &self.order {
                let left = a.get(&order.column).unwrap_or(&Value::Null);
                let right = b.get(&order.column).unwrap_or(&Value::Null);
                let cmp = compare_values(left, right);
                let cmp = if order.ascending { cmp } else { cmp.reverse() };
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            Ordering::Equal
        });
    }
}

/// Total order over JSON scalars: nulls first, then booleans, numbers and
/// strings. Strings compare byte-wise, which is chronological for the
/// fixed-width date and time columns.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        _ if rank(a) == rank(b) => a.to_string().cmp(&b.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// All rows of `table` matching `query`, in the query's order.
    async fn find(&self, table: &str, query: &Query) -> Result<Vec<Value>>;

    /// Insert a row, assigning `id` and timestamps when absent.
    async fn insert(&self, table: &str, row: Value) -> Result<Value>;

    /// Merge `fields` into row `id` only if the row also matches `guard`.
    /// Returns `None` when no row was updated.
    async fn update_where(&self, table: &str, id: &str, guard: &Query, fields: Value) -> Result<Option<Value>>;

    async fn update(&self, table: &str, id: &str, fields: Value) -> Result<Option<Value>> {
        self.update_where(table, id, &Query::new(), fields).await
    }

    async fn find_one(&self, table: &str, query: &Query) -> Result<Option<Value>> {
        let query = query.clone().limit(1);
        Ok(self.find(table, &query).await?.into_iter().next())
    }

    async fn count(&self, table: &str, query: &Query) -> Result<usize> {
        Ok(self.find(table, query).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filters_match_rows() {
        let row = json!({"clinic_id": "c1", "status": "booked", "appointment_time": "10:30"});

        assert!(Query::new().eq("clinic_id", "c1").matches(&row));
        assert!(!Query::new().eq("clinic_id", "c2").matches(&row));
        assert!(Query::new().neq("status", "cancelled").matches(&row));
        assert!(Query::new().in_list("status", ["booked", "in-queue"]).matches(&row));
        assert!(Query::new().gte("appointment_time", "10:30").lte("appointment_time", "11:00").matches(&row));
        assert!(!Query::new().gte("missing", "a").matches(&row));
    }

    #[test]
    fn sorts_by_multiple_columns() {
        let mut rows = vec![
            json!({"d": "2024-01-02", "t": "09:00"}),
            json!({"d": "2024-01-01", "t": "10:00"}),
            json!({"d": "2024-01-01", "t": "08:00"}),
        ];
        Query::new().order_by("d", true).order_by("t", false).sort(&mut rows);

        assert_eq!(rows[0]["t"], "10:00");
        assert_eq!(rows[1]["t"], "08:00");
        assert_eq!(rows[2]["d"], "2024-01-02");
    }
}
