use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method};
use axum::response::Response;
use serde_json::{Map, Value};

use crate::config;
use crate::database::Database;
use crate::error::ApiError;
use crate::filter::{normalize_form, QueryForm, QueryResult};

/// Per-request context handed to every hook.
///
/// Hooks may short-circuit rendering by writing a response directly via
/// [`HookContext::respond`]; handlers probe [`HookContext::has_response`]
/// after each hook call and return the written response untouched.
pub struct HookContext {
    pub method: Method,
    pub headers: HeaderMap,
    /// Matched path parameters, keyed by identity-key external name.
    pub params: HashMap<String, String>,
    response: Option<Response>,
}

impl HookContext {
    pub fn new(method: Method, headers: HeaderMap, params: HashMap<String, String>) -> Self {
        Self {
            method,
            headers,
            params,
            response: None,
        }
    }

    /// Take over the response; the handler stops rendering.
    pub fn respond(&mut self, response: Response) {
        self.response = Some(response);
    }

    /// The "was-written" probe.
    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    pub(crate) fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }
}

/// Supplies the storage executor for a request. `is_create` distinguishes
/// writes that allocate new rows, for providers routing those differently.
pub type DbProvider = Arc<dyn Fn(&HookContext, bool) -> Arc<dyn Database> + Send + Sync>;

/// Lifecycle callbacks around the CRUD state machine. All methods default to
/// no-ops; implement the ones the object needs.
///
/// Records cross the hook boundary as external-name-keyed JSON values.
/// Errors from the `before_create`/`before_update`/`before_delete` veto
/// points surface as 400; render-side failures surface as 500.
#[async_trait]
pub trait ObjectHooks: Send + Sync {
    /// Runs after binding, before the insert. `record` is the sanitized
    /// payload about to be persisted (mutable); `input` the raw body.
    async fn before_create(
        &self,
        _ctx: &mut HookContext,
        _record: &mut Value,
        _input: &Map<String, Value>,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    /// Runs after the current row is loaded, before the update is applied.
    async fn before_update(
        &self,
        _ctx: &mut HookContext,
        _current: &Value,
        _input: &Map<String, Value>,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    /// Runs after the doomed row is loaded, before the delete.
    async fn before_delete(&self, _ctx: &mut HookContext, _record: &Value) -> Result<(), ApiError> {
        Ok(())
    }

    /// Runs on every record about to be rendered (read and query paths).
    async fn before_render(&self, _ctx: &mut HookContext, _record: &mut Value) -> Result<(), ApiError> {
        Ok(())
    }

    /// Runs on the assembled query response. Returning `Some(payload)`
    /// replaces the response body.
    async fn before_query_render(
        &self,
        _ctx: &mut HookContext,
        _result: &mut QueryResult,
    ) -> Result<Option<Value>, ApiError> {
        Ok(None)
    }

    /// Relation enrichment for executors without preload support: runs per
    /// record before `before_render`, with the descriptor's relation list.
    async fn enrich(
        &self,
        _ctx: &mut HookContext,
        _relations: &[String],
        _record: &mut Value,
    ) -> Result<(), ApiError> {
        Ok(())
    }
}

/// The all-defaults hook set.
pub struct NoHooks;

#[async_trait]
impl ObjectHooks for NoHooks {}

/// Pre-compilation step for query endpoints: normalizes or augments the
/// bound [`QueryForm`] (inject mandatory filters, pin projections, override
/// limits) before the whitelist compiler runs.
#[async_trait]
pub trait PrepareQuery: Send + Sync {
    async fn prepare(&self, ctx: &HookContext, form: &mut QueryForm) -> Result<(), ApiError>;
}

/// Default prepare step: clamps the limit into `(0, max_limit]` and
/// normalizes `pos` for the pagination mode.
pub struct DefaultPrepare;

#[async_trait]
impl PrepareQuery for DefaultPrepare {
    async fn prepare(&self, _ctx: &HookContext, form: &mut QueryForm) -> Result<(), ApiError> {
        normalize_form(form, config::config());
        Ok(())
    }
}
