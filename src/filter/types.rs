use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical filter operators. Wire strings accept lower- and upper-case
/// aliases; anything else parses to `None` and the filter is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    NotIn,
    Like,
    Between,
    IsNot,
}

impl FilterOp {
    pub fn parse(op: &str) -> Option<Self> {
        match op.to_ascii_lowercase().as_str() {
            "=" | "equal" => Some(FilterOp::Eq),
            "<>" | "!=" | "not_equal" => Some(FilterOp::Ne),
            ">" | "greater" => Some(FilterOp::Gt),
            ">=" | "greater_or_equal" => Some(FilterOp::Ge),
            "<" | "less" => Some(FilterOp::Lt),
            "<=" | "less_or_equal" => Some(FilterOp::Le),
            "in" => Some(FilterOp::In),
            "not_in" => Some(FilterOp::NotIn),
            "like" => Some(FilterOp::Like),
            "between" => Some(FilterOp::Between),
            "is not" => Some(FilterOp::IsNot),
            _ => None,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "<>",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::In => "IN",
            FilterOp::NotIn => "NOT IN",
            FilterOp::Like => "LIKE",
            FilterOp::Between => "BETWEEN",
            FilterOp::IsNot => "IS NOT",
        }
    }
}

/// One incoming predicate, named by external field name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    pub op: String,
    pub value: Value,
}

/// One incoming ordering, named by external field name. `op` is `asc`
/// (default) or `desc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub name: String,
    #[serde(default)]
    pub op: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(op: &str) -> Self {
        if op.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Query request body. `view_fields` and `view_filters` are never read from
/// the wire; only prepare fns populate them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryForm {
    /// `true` selects page mode (1-based `pos`), `false` offset mode.
    pub pagination: bool,
    pub pos: i64,
    pub limit: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub keyword: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub orders: Vec<Order>,
    #[serde(skip)]
    pub view_fields: Vec<String>,
    #[serde(skip)]
    pub view_filters: Vec<Filter>,
}

/// Query response envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub total: i64,
    pub pos: i64,
    pub limit: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub keyword: String,
    pub items: Vec<Value>,
}

/// A predicate that survived the whitelist, rewritten to its storage column.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct CompiledOrder {
    pub column: String,
    pub direction: SortDirection,
}

/// Keyword search: `%keyword%` matched against each searchable column,
/// OR-joined.
#[derive(Debug, Clone)]
pub struct KeywordClause {
    pub columns: Vec<String>,
    pub pattern: String,
}
