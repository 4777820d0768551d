pub mod compiler;
pub mod expr;
pub mod types;

pub use compiler::{coerce_time_value, compile_query, normalize_form, parse_time};
pub use types::{
    CompiledFilter, CompiledOrder, Filter, FilterOp, KeywordClause, Order, QueryForm,
    QueryResult, SortDirection,
};
