//! In-memory executor: a table store evaluating compiled queries in Rust.
//!
//! Backs the integration tests and demos; also handy as a scratch backend
//! when wiring an object surface before the real database exists. Semantics
//! mirror the SQL the PostgreSQL executor renders, so the two agree on every
//! operator the compiler can emit.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::filter::{CompiledFilter, FilterOp, KeywordClause, SortDirection};

use super::{Database, DbError, QuerySpec, Row};

#[derive(Default)]
struct Table {
    rows: Vec<Row>,
    next_id: i64,
}

#[derive(Default)]
pub struct MemoryDatabase {
    tables: RwLock<HashMap<String, Table>>,
    /// table -> column receiving a serial id when an insert omits it.
    serial_columns: HashMap<String, String>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a serial column: inserts into `table` that omit `column`
    /// (or set it to zero/null) get the next id assigned.
    pub fn with_serial(mut self, table: &str, column: &str) -> Self {
        self.serial_columns
            .insert(table.to_string(), column.to_string());
        self
    }

    async fn matching_rows(&self, spec: &QuerySpec) -> Vec<Row> {
        let tables = self.tables.read().await;
        let Some(table) = tables.get(&spec.table) else {
            return Vec::new();
        };
        table
            .rows
            .iter()
            .filter(|row| row_matches(row, &spec.filters, spec.keyword.as_ref()))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn count(&self, spec: &QuerySpec) -> Result<i64, DbError> {
        Ok(self.matching_rows(spec).await.len() as i64)
    }

    async fn select(&self, spec: &QuerySpec) -> Result<Vec<Row>, DbError> {
        let mut rows = self.matching_rows(spec).await;

        if !spec.orders.is_empty() {
            rows.sort_by(|a, b| {
                for order in &spec.orders {
                    let av = a.get(&order.column).unwrap_or(&Value::Null);
                    let bv = b.get(&order.column).unwrap_or(&Value::Null);
                    let mut ord = compare(av, bv).unwrap_or(Ordering::Equal);
                    if order.direction == SortDirection::Desc {
                        ord = ord.reverse();
                    }
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = spec.offset.max(0) as usize;
        let limit = spec.limit.max(0) as usize;
        let mut windowed: Vec<Row> = rows.into_iter().skip(offset).take(limit).collect();

        if !spec.columns.is_empty() {
            for row in &mut windowed {
                row.retain(|column, _| spec.columns.iter().any(|c| c == column));
            }
        }

        Ok(windowed)
    }

    async fn fetch_one(
        &self,
        table: &str,
        keys: &[(String, Value)],
    ) -> Result<Option<Row>, DbError> {
        let tables = self.tables.read().await;
        let Some(table) = tables.get(table) else {
            return Ok(None);
        };
        Ok(table
            .rows
            .iter()
            .find(|row| keys_match(row, keys))
            .cloned())
    }

    async fn insert(&self, table: &str, mut row: Row) -> Result<Row, DbError> {
        let mut tables = self.tables.write().await;
        let entry = tables.entry(table.to_string()).or_default();

        if let Some(serial) = self.serial_columns.get(table) {
            let assigned = match row.get(serial) {
                None | Some(Value::Null) => true,
                Some(v) => v.as_i64() == Some(0),
            };
            if assigned {
                entry.next_id += 1;
                row.insert(serial.clone(), Value::from(entry.next_id));
            } else if let Some(explicit) = row.get(serial).and_then(Value::as_i64) {
                entry.next_id = entry.next_id.max(explicit);
            }
        }

        entry.rows.push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        table: &str,
        keys: &[(String, Value)],
        changes: Row,
    ) -> Result<u64, DbError> {
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(table) else {
            return Ok(0);
        };
        let mut affected = 0;
        for row in table.rows.iter_mut().filter(|row| keys_match(row, keys)) {
            for (column, value) in &changes {
                row.insert(column.clone(), value.clone());
            }
            affected += 1;
        }
        Ok(affected)
    }

    async fn delete(&self, table: &str, keys: &[(String, Value)]) -> Result<u64, DbError> {
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = table.rows.len();
        table.rows.retain(|row| !keys_match(row, keys));
        Ok((before - table.rows.len()) as u64)
    }
}

fn keys_match(row: &Row, keys: &[(String, Value)]) -> bool {
    keys.iter().all(|(column, value)| {
        row.get(column)
            .map_or(false, |actual| loose_eq(actual, value))
    })
}

fn row_matches(row: &Row, filters: &[CompiledFilter], keyword: Option<&KeywordClause>) -> bool {
    if !filters.iter().all(|f| filter_matches(row, f)) {
        return false;
    }
    if let Some(kw) = keyword {
        if kw.columns.is_empty() {
            return true;
        }
        let needle = kw.pattern.trim_matches('%');
        return kw.columns.iter().any(|column| {
            row.get(column)
                .and_then(Value::as_str)
                .map_or(false, |s| s.contains(needle))
        });
    }
    true
}

fn filter_matches(row: &Row, filter: &CompiledFilter) -> bool {
    let actual = row.get(&filter.column).unwrap_or(&Value::Null);
    match filter.op {
        FilterOp::Eq => loose_eq(actual, &filter.value),
        FilterOp::Ne => !loose_eq(actual, &filter.value),
        FilterOp::Gt => compare(actual, &filter.value) == Some(Ordering::Greater),
        FilterOp::Ge => matches!(
            compare(actual, &filter.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::Lt => compare(actual, &filter.value) == Some(Ordering::Less),
        FilterOp::Le => matches!(
            compare(actual, &filter.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOp::In => match &filter.value {
            Value::Array(options) => options.iter().any(|v| loose_eq(actual, v)),
            single => loose_eq(actual, single),
        },
        FilterOp::NotIn => match &filter.value {
            Value::Array(options) => !options.iter().any(|v| loose_eq(actual, v)),
            single => !loose_eq(actual, single),
        },
        FilterOp::Like => match (actual.as_str(), filter.value.as_str()) {
            (Some(s), Some(pattern)) => like_matches(s, pattern),
            _ => false,
        },
        FilterOp::Between => match filter.value.as_array() {
            Some(bounds) if bounds.len() == 2 => {
                matches!(
                    compare(actual, &bounds[0]),
                    Some(Ordering::Greater | Ordering::Equal)
                ) && matches!(
                    compare(actual, &bounds[1]),
                    Some(Ordering::Less | Ordering::Equal)
                )
            }
            _ => false,
        },
        FilterOp::IsNot => {
            if filter.value.is_null() {
                !actual.is_null()
            } else {
                !loose_eq(actual, &filter.value)
            }
        }
    }
}

/// Equality with numeric coercion: `1` and `1.0` are the same value.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn like_matches(s: &str, pattern: &str) -> bool {
    match (pattern.starts_with('%'), pattern.ends_with('%')) {
        (true, true) => s.contains(pattern.trim_matches('%')),
        (true, false) => s.ends_with(pattern.trim_start_matches('%')),
        (false, true) => s.starts_with(pattern.trim_end_matches('%')),
        (false, false) => s == pattern,
    }
}
