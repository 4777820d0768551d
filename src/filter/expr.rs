use serde_json::Value;

use super::types::{CompiledFilter, CompiledOrder, FilterOp, KeywordClause};

/// Positional parameter accumulator for `$N` placeholders.
#[derive(Debug, Default)]
pub struct Params {
    values: Vec<Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a value and return its placeholder.
    pub fn bind(&mut self, value: Value) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

fn qualified(table: &str, column: &str) -> String {
    format!("\"{}\".\"{}\"", table, column)
}

/// Render a single predicate. Returns `None` when the filter cannot produce
/// a predicate (malformed operand shapes are dropped, not interpolated).
pub fn render_filter(table: &str, filter: &CompiledFilter, params: &mut Params) -> Option<String> {
    let column = qualified(table, &filter.column);
    match filter.op {
        FilterOp::Eq => Some(if filter.value.is_null() {
            format!("{} IS NULL", column)
        } else {
            format!("{} = {}", column, params.bind(filter.value.clone()))
        }),
        FilterOp::Ne => Some(if filter.value.is_null() {
            format!("{} IS NOT NULL", column)
        } else {
            format!("{} <> {}", column, params.bind(filter.value.clone()))
        }),
        FilterOp::Gt | FilterOp::Ge | FilterOp::Lt | FilterOp::Le => Some(format!(
            "{} {} {}",
            column,
            filter.op.sql(),
            params.bind(filter.value.clone())
        )),
        FilterOp::In | FilterOp::NotIn => match &filter.value {
            Value::Array(values) if values.is_empty() => {
                // Empty set: IN matches nothing, NOT IN matches everything.
                Some(if filter.op == FilterOp::In {
                    "1=0".to_string()
                } else {
                    "1=1".to_string()
                })
            }
            Value::Array(values) => {
                let placeholders: Vec<String> =
                    values.iter().map(|v| params.bind(v.clone())).collect();
                Some(format!(
                    "{} {} ({})",
                    column,
                    filter.op.sql(),
                    placeholders.join(", ")
                ))
            }
            // Scalar operand degrades to (in)equality.
            other => Some(format!(
                "{} {} {}",
                column,
                if filter.op == FilterOp::In { "=" } else { "<>" },
                params.bind(other.clone())
            )),
        },
        FilterOp::Like => Some(format!(
            "{} LIKE {}",
            column,
            params.bind(filter.value.clone())
        )),
        FilterOp::Between => match &filter.value {
            Value::Array(values) if values.len() == 2 => Some(format!(
                "{} BETWEEN {} AND {}",
                column,
                params.bind(values[0].clone()),
                params.bind(values[1].clone())
            )),
            _ => {
                tracing::debug!(column = %filter.column, "between requires a 2-element sequence, dropped");
                None
            }
        },
        FilterOp::IsNot => Some(if filter.value.is_null() {
            format!("{} IS NOT NULL", column)
        } else {
            format!(
                "{} IS DISTINCT FROM {}",
                column,
                params.bind(filter.value.clone())
            )
        }),
    }
}

/// Render the keyword disjunction: `(a LIKE $1 OR b LIKE $2 ...)`.
pub fn render_keyword(table: &str, keyword: &KeywordClause, params: &mut Params) -> Option<String> {
    if keyword.columns.is_empty() {
        return None;
    }
    let parts: Vec<String> = keyword
        .columns
        .iter()
        .map(|col| {
            format!(
                "{} LIKE {}",
                qualified(table, col),
                params.bind(Value::String(keyword.pattern.clone()))
            )
        })
        .collect();
    Some(format!("({})", parts.join(" OR ")))
}

/// Render the full WHERE body (without the `WHERE` keyword), or `None` when
/// no predicate applies.
pub fn render_where(
    table: &str,
    filters: &[CompiledFilter],
    keyword: Option<&KeywordClause>,
    params: &mut Params,
) -> Option<String> {
    let mut parts: Vec<String> = filters
        .iter()
        .filter_map(|f| render_filter(table, f, params))
        .collect();
    if let Some(kw) = keyword {
        if let Some(clause) = render_keyword(table, kw, params) {
            parts.push(clause);
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" AND "))
    }
}

/// Render `ORDER BY ...`, or an empty string when there is nothing to order.
pub fn render_order(table: &str, orders: &[CompiledOrder]) -> String {
    if orders.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = orders
        .iter()
        .map(|o| format!("{} {}", qualified(table, &o.column), o.direction.to_sql()))
        .collect();
    format!("ORDER BY {}", parts.join(", "))
}
