//! PostgreSQL executor backed by sqlx.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Column, PgPool, Row as SqlxRow, TypeInfo};
use uuid::Uuid;

use crate::filter::expr::{render_order, render_where, Params};

use super::{Database, DbError, QuerySpec, Row};

pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn select_sql(&self, spec: &QuerySpec, params: &mut Params) -> String {
        let projection = if spec.columns.is_empty() {
            "*".to_string()
        } else {
            spec.columns
                .iter()
                .map(|c| format!("\"{}\"", c))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = format!("SELECT {} FROM \"{}\"", projection, spec.table);
        if let Some(clause) =
            render_where(&spec.table, &spec.filters, spec.keyword.as_ref(), params)
        {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        let order = render_order(&spec.table, &spec.orders);
        if !order.is_empty() {
            sql.push(' ');
            sql.push_str(&order);
        }
        sql.push_str(&format!(
            " LIMIT {} OFFSET {}",
            params.bind(Value::from(spec.limit)),
            params.bind(Value::from(spec.offset)),
        ));
        sql
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    async fn count(&self, spec: &QuerySpec) -> Result<i64, DbError> {
        let mut params = Params::new();
        let mut sql = format!("SELECT COUNT(*) AS count FROM \"{}\"", spec.table);
        if let Some(clause) =
            render_where(&spec.table, &spec.filters, spec.keyword.as_ref(), &mut params)
        {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }

        let mut q = sqlx::query(&sql);
        for p in params.values() {
            q = bind_param(q, p);
        }
        let row = q.fetch_one(&self.pool).await?;
        let count: i64 = row.try_get("count")?;
        Ok(count)
    }

    async fn select(&self, spec: &QuerySpec) -> Result<Vec<Row>, DbError> {
        let mut params = Params::new();
        let sql = self.select_sql(spec, &mut params);

        let mut q = sqlx::query(&sql);
        for p in params.values() {
            q = bind_param(q, p);
        }
        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_map).collect())
    }

    async fn fetch_one(
        &self,
        table: &str,
        keys: &[(String, Value)],
    ) -> Result<Option<Row>, DbError> {
        let mut params = Params::new();
        let clause = identity_clause(keys, &mut params);
        let sql = format!("SELECT * FROM \"{}\" WHERE {}", table, clause);

        let mut q = sqlx::query(&sql);
        for p in params.values() {
            q = bind_param(q, p);
        }
        let row = q.fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(row_to_map))
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, DbError> {
        let mut params = Params::new();
        let sql = if row.is_empty() {
            format!("INSERT INTO \"{}\" DEFAULT VALUES RETURNING *", table)
        } else {
            let mut columns = Vec::with_capacity(row.len());
            let mut placeholders = Vec::with_capacity(row.len());
            for (column, value) in &row {
                columns.push(format!("\"{}\"", column));
                placeholders.push(params.bind(value.clone()));
            }
            format!(
                "INSERT INTO \"{}\" ({}) VALUES ({}) RETURNING *",
                table,
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        let mut q = sqlx::query(&sql);
        for p in params.values() {
            q = bind_param(q, p);
        }
        let stored = q.fetch_one(&self.pool).await?;
        Ok(row_to_map(&stored))
    }

    async fn update(
        &self,
        table: &str,
        keys: &[(String, Value)],
        changes: Row,
    ) -> Result<u64, DbError> {
        if changes.is_empty() {
            return Ok(0);
        }
        let mut params = Params::new();
        let assignments: Vec<String> = changes
            .iter()
            .map(|(column, value)| format!("\"{}\" = {}", column, params.bind(value.clone())))
            .collect();
        let clause = identity_clause(keys, &mut params);
        let sql = format!(
            "UPDATE \"{}\" SET {} WHERE {}",
            table,
            assignments.join(", "),
            clause
        );

        let mut q = sqlx::query(&sql);
        for p in params.values() {
            q = bind_param(q, p);
        }
        let result = q.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, table: &str, keys: &[(String, Value)]) -> Result<u64, DbError> {
        let mut params = Params::new();
        let clause = identity_clause(keys, &mut params);
        let sql = format!("DELETE FROM \"{}\" WHERE {}", table, clause);

        let mut q = sqlx::query(&sql);
        for p in params.values() {
            q = bind_param(q, p);
        }
        let result = q.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn identity_clause(keys: &[(String, Value)], params: &mut Params) -> String {
    keys.iter()
        .map(|(column, value)| format!("\"{}\" = {}", column, params.bind(value.clone())))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn bind_param<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(u) = n.as_u64() {
                // Postgres has no u64; cast down if it fits
                q.bind(u as i64)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s),
        // Sequence operands are expanded into per-element placeholders
        // before binding; a raw array only appears for JSONB columns.
        Value::Array(_) | Value::Object(_) => q.bind(v.clone()),
    }
}

/// Decode a row into a column-keyed JSON map, dispatching on the column's
/// Postgres type name.
fn row_to_map(row: &PgRow) -> Map<String, Value> {
    let mut map = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let value = match column.type_info().name() {
            "INT2" => row
                .try_get::<Option<i16>, _>(i)
                .map(|v| v.map(Value::from))
                .unwrap_or(None),
            "INT4" => row
                .try_get::<Option<i32>, _>(i)
                .map(|v| v.map(Value::from))
                .unwrap_or(None),
            "INT8" => row
                .try_get::<Option<i64>, _>(i)
                .map(|v| v.map(Value::from))
                .unwrap_or(None),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(i)
                .map(|v| v.map(|f| Value::from(f as f64)))
                .unwrap_or(None),
            "FLOAT8" | "NUMERIC" => row
                .try_get::<Option<f64>, _>(i)
                .map(|v| v.map(Value::from))
                .unwrap_or(None),
            "BOOL" => row
                .try_get::<Option<bool>, _>(i)
                .map(|v| v.map(Value::Bool))
                .unwrap_or(None),
            "UUID" => row
                .try_get::<Option<Uuid>, _>(i)
                .map(|v| v.map(|u| Value::String(u.to_string())))
                .unwrap_or(None),
            "TIMESTAMPTZ" => row
                .try_get::<Option<DateTime<Utc>>, _>(i)
                .map(|v| v.map(|dt| Value::String(dt.to_rfc3339())))
                .unwrap_or(None),
            "TIMESTAMP" => row
                .try_get::<Option<NaiveDateTime>, _>(i)
                .map(|v| v.map(|dt| Value::String(dt.to_string())))
                .unwrap_or(None),
            "DATE" => row
                .try_get::<Option<NaiveDate>, _>(i)
                .map(|v| v.map(|d| Value::String(d.to_string())))
                .unwrap_or(None),
            "JSON" | "JSONB" => row
                .try_get::<Option<Value>, _>(i)
                .unwrap_or(None),
            _ => row
                .try_get::<Option<String>, _>(i)
                .map(|v| v.map(Value::String))
                .unwrap_or(None),
        };
        map.insert(name, value.unwrap_or(Value::Null));
    }
    map
}
