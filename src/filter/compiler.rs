use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::database::QuerySpec;
use crate::schema::Descriptor;

use super::types::{
    CompiledFilter, CompiledOrder, Filter, FilterOp, KeywordClause, QueryForm, SortDirection,
};

/// Whitelists the compiler checks incoming directives against. All names are
/// internal field names.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryPolicies<'a> {
    pub filterable: &'a [String],
    pub orderable: &'a [String],
    pub searchable: &'a [String],
}

/// Normalize pagination and limits in place. This is the default prepare
/// step; custom prepare fns run after it and may adjust further.
pub fn normalize_form(form: &mut QueryForm, cfg: &EngineConfig) {
    if form.pagination {
        // page mode is 1-based
        if form.pos < 1 {
            form.pos = 1;
        }
    } else if form.pos < 0 {
        form.pos = 0;
    }

    if form.limit <= 0 || form.limit > cfg.max_limit {
        if form.limit > cfg.max_limit {
            tracing::warn!(
                limit = form.limit,
                max = cfg.max_limit,
                "limit exceeds maximum, falling back to default"
            );
        }
        form.limit = cfg.default_limit;
    }
}

/// Compile a normalized [`QueryForm`] against a [`Descriptor`] into an
/// executable [`QuerySpec`].
///
/// Filters and orders are resolved external name -> internal name, checked
/// against the whitelists, and rewritten to storage columns; anything that
/// does not resolve is dropped silently. View-injected filters skip the
/// whitelist but still resolve through the descriptor.
pub fn compile_query(
    descriptor: &Descriptor,
    form: &QueryForm,
    policies: QueryPolicies<'_>,
) -> QuerySpec {
    let filterable: HashSet<&str> = policies.filterable.iter().map(String::as_str).collect();
    let orderable: HashSet<&str> = policies.orderable.iter().map(String::as_str).collect();

    let mut filters = Vec::new();
    for filter in &form.filters {
        match compile_filter(descriptor, filter, Some(&filterable)) {
            Some(compiled) => filters.push(compiled),
            None => drop_directive("filter", &filter.name),
        }
    }
    for filter in &form.view_filters {
        // trusted: injected by a prepare fn, not by the client
        if let Some(compiled) = compile_filter(descriptor, filter, None) {
            filters.push(compiled);
        }
    }

    let mut orders = Vec::new();
    for order in &form.orders {
        let Some((internal, _)) = descriptor.resolve_external(&order.name) else {
            drop_directive("order", &order.name);
            continue;
        };
        if !orderable.contains(internal) {
            drop_directive("order", &order.name);
            continue;
        }
        let column = descriptor
            .column_for_internal(internal)
            .unwrap_or(internal)
            .to_string();
        orders.push(CompiledOrder {
            column,
            direction: SortDirection::parse(&order.op),
        });
    }

    let keyword = if !form.keyword.is_empty() && !policies.searchable.is_empty() {
        let columns: Vec<String> = policies
            .searchable
            .iter()
            .filter_map(|internal| descriptor.column_for_internal(internal))
            .map(str::to_string)
            .collect();
        Some(KeywordClause {
            columns,
            pattern: format!("%{}%", form.keyword),
        })
    } else {
        None
    };

    let columns: Vec<String> = form
        .view_fields
        .iter()
        .filter_map(|external| {
            let (internal, _) = descriptor.resolve_external(external)?;
            descriptor.column_for_internal(internal).map(str::to_string)
        })
        .collect();

    let offset = if form.pagination {
        (form.pos - 1) * form.limit
    } else {
        form.pos
    };

    QuerySpec {
        table: descriptor.table_name.clone(),
        columns,
        filters,
        orders,
        keyword,
        limit: form.limit,
        offset,
        preloads: descriptor.preload_relations.clone(),
    }
}

fn compile_filter(
    descriptor: &Descriptor,
    filter: &Filter,
    whitelist: Option<&HashSet<&str>>,
) -> Option<CompiledFilter> {
    let (internal, kind) = descriptor.resolve_external(&filter.name)?;
    if let Some(allowed) = whitelist {
        if !allowed.contains(internal) {
            return None;
        }
    }
    let op = FilterOp::parse(&filter.op)?;
    let column = descriptor
        .column_for_internal(internal)
        .unwrap_or(internal)
        .to_string();

    let mut value = filter.value.clone();
    if kind.is_time() {
        value = coerce_time_value(&value);
    }
    if op == FilterOp::Like {
        value = wrap_like(value);
    }

    Some(CompiledFilter { column, op, value })
}

fn drop_directive(what: &str, name: &str) {
    if crate::config::config().log_dropped_directives {
        tracing::debug!(directive = what, name = name, "dropped by whitelist");
    }
}

/// Wrap a LIKE operand with `%...%` unless it already carries a wildcard
/// at either end.
fn wrap_like(value: Value) -> Value {
    match value {
        Value::String(s) if !s.starts_with('%') && !s.ends_with('%') => {
            Value::String(format!("%{}%", s))
        }
        other => other,
    }
}

/// Parse a time string against the accepted input menu, in order:
/// RFC3339 (nanosecond precision included), `YYYY-MM-DDTHH:MM`,
/// `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD`.
pub fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M") {
        return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0)?;
        return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    None
}

/// Coerce a filter operand destined for a time-kinded column: string values
/// that parse get replaced by canonical RFC3339; everything else (including
/// unparseable strings) passes through unchanged. `between` operands are
/// coerced element-wise.
pub fn coerce_time_value(value: &Value) -> Value {
    match value {
        Value::String(s) => match parse_time(s) {
            Some(dt) => Value::String(dt.to_rfc3339()),
            None => value.clone(),
        },
        Value::Array(items) => {
            Value::Array(items.iter().map(coerce_time_value).collect())
        }
        other => other.clone(),
    }
}
