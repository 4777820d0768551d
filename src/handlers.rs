//! CRUD handler state machines: identify -> bind -> hook -> exec -> render.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Json, Response};
use serde_json::{Map, Value};

use crate::database::Row;
use crate::error::ApiError;
use crate::filter::{compile_query, compiler::QueryPolicies, parse_time, QueryForm, QueryResult};
use crate::hooks::HookContext;
use crate::object::RouteState;
use crate::schema::{Descriptor, FieldKind};

/// GET /{name}/:k1[/:k2...]
pub(crate) async fn handle_get(
    State(state): State<RouteState>,
    Path(params): Path<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let descriptor = &state.handle.descriptor;
    let mut ctx = HookContext::new(method, headers, params);
    let keys = identity_values(descriptor, &ctx.params)?;

    let db = (state.handle.db_provider)(&ctx, false);
    let row = db.fetch_one(&descriptor.table_name, &keys).await?;
    let Some(row) = row else {
        return Err(ApiError::not_found("not found"));
    };

    let mut record = render_external(descriptor, &row);
    let hooks = state.handle.object.hooks.clone();
    hooks
        .enrich(&mut ctx, &descriptor.preload_relations, &mut record)
        .await
        .map_err(render_side)?;
    if let Some(written) = ctx.take_response() {
        return Ok(written);
    }
    hooks
        .before_render(&mut ctx, &mut record)
        .await
        .map_err(render_side)?;
    if let Some(written) = ctx.take_response() {
        return Ok(written);
    }

    Ok(Json(record).into_response())
}

/// PUT /{name}
pub(crate) async fn handle_create(
    State(state): State<RouteState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let descriptor = &state.handle.descriptor;
    let mut ctx = HookContext::new(method, headers, HashMap::new());

    let input = bind_json_object(&body)?;
    let mut record = Value::Object(sanitize_create(descriptor, &input)?);

    let hooks = state.handle.object.hooks.clone();
    hooks
        .before_create(&mut ctx, &mut record, &input)
        .await
        .map_err(veto)?;
    if let Some(written) = ctx.take_response() {
        return Ok(written);
    }

    let row = external_to_row(descriptor, &record);
    let db = (state.handle.db_provider)(&ctx, true);
    let stored = db.insert(&descriptor.table_name, row).await?;

    Ok(Json(render_external(descriptor, &stored)).into_response())
}

/// PATCH /{name}/:k1[/:k2...]
pub(crate) async fn handle_update(
    State(state): State<RouteState>,
    Path(params): Path<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let descriptor = &state.handle.descriptor;
    let mut ctx = HookContext::new(method, headers, params);
    let keys = identity_values(descriptor, &ctx.params)?;

    let input = bind_json_object(&body)?;
    let changes = sanitize_update(descriptor, &state.handle.object.editable_fields, &input)?;
    if changes.is_empty() {
        return Err(ApiError::bad_request("not changed"));
    }

    let db = (state.handle.db_provider)(&ctx, false);
    let current = db
        .fetch_one(&descriptor.table_name, &keys)
        .await?
        .ok_or_else(|| ApiError::not_found("not found"))?;

    let hooks = state.handle.object.hooks.clone();
    let current_record = render_external(descriptor, &current);
    hooks
        .before_update(&mut ctx, &current_record, &input)
        .await
        .map_err(veto)?;
    if let Some(written) = ctx.take_response() {
        return Ok(written);
    }

    let mut row = Row::new();
    for (internal, value) in changes {
        let column = descriptor
            .column_for_internal(&internal)
            .unwrap_or(internal.as_str())
            .to_string();
        row.insert(column, value);
    }
    db.update(&descriptor.table_name, &keys, row).await?;

    Ok(Json(true).into_response())
}

/// DELETE /{name}/:k1[/:k2...]
pub(crate) async fn handle_delete(
    State(state): State<RouteState>,
    Path(params): Path<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let descriptor = &state.handle.descriptor;
    let mut ctx = HookContext::new(method, headers, params);
    let keys = identity_values(descriptor, &ctx.params)?;

    let db = (state.handle.db_provider)(&ctx, false);
    // load first so the hook (and any storage-side delete machinery) sees
    // the full row
    let Some(row) = db.fetch_one(&descriptor.table_name, &keys).await? else {
        if crate::config::config().idempotent_delete {
            return Ok(Json(true).into_response());
        }
        return Err(ApiError::not_found("not found"));
    };

    let record = render_external(descriptor, &row);
    let hooks = state.handle.object.hooks.clone();
    hooks
        .before_delete(&mut ctx, &record)
        .await
        .map_err(veto)?;
    if let Some(written) = ctx.take_response() {
        return Ok(written);
    }

    db.delete(&descriptor.table_name, &keys).await?;

    Ok(Json(true).into_response())
}

/// POST /{name}, and every custom view.
pub(crate) async fn handle_query(
    State(state): State<RouteState>,
    Path(params): Path<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let descriptor = &state.handle.descriptor;
    let object = &state.handle.object;
    let mut ctx = HookContext::new(method, headers, params);

    let mut form = if body.is_empty() {
        QueryForm::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(e.to_string()))?
    };
    state.prepare.prepare(&ctx, &mut form).await.map_err(veto)?;

    let spec = compile_query(
        descriptor,
        &form,
        QueryPolicies {
            filterable: &object.filterable_fields,
            orderable: &object.orderable_fields,
            searchable: &object.searchable_fields,
        },
    );

    let db = (state.handle.db_provider)(&ctx, false);
    let total = db.count(&spec).await?;

    let mut result = QueryResult {
        total,
        pos: form.pos,
        limit: form.limit,
        keyword: form.keyword.clone(),
        items: Vec::new(),
    };

    let hooks = object.hooks.clone();
    if total > 0 {
        let rows = db.select(&spec).await?;
        for row in &rows {
            let mut record = render_external(descriptor, row);
            hooks
                .enrich(&mut ctx, &descriptor.preload_relations, &mut record)
                .await
                .map_err(render_side)?;
            hooks
                .before_render(&mut ctx, &mut record)
                .await
                .map_err(render_side)?;
            if let Some(written) = ctx.take_response() {
                return Ok(written);
            }
            result.items.push(record);
        }
    }

    let replacement = hooks
        .before_query_render(&mut ctx, &mut result)
        .await
        .map_err(render_side)?;
    if let Some(written) = ctx.take_response() {
        return Ok(written);
    }
    if let Some(payload) = replacement {
        return Ok(Json(payload).into_response());
    }

    Ok(Json(result).into_response())
}

// ========================================
// binding & sanitizing
// ========================================

fn bind_json_object(body: &Bytes) -> Result<Map<String, Value>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("request body required"));
    }
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ApiError::bad_request(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::bad_request("expected a JSON object")),
    }
}

/// Validate a create payload against the descriptor: unknown keys are
/// ignored, kinds must accept the JSON value, and time-kinded strings must
/// parse (a zero time is never stored silently). Keys stay external.
fn sanitize_create(
    descriptor: &Descriptor,
    input: &Map<String, Value>,
) -> Result<Map<String, Value>, ApiError> {
    let mut out = Map::new();
    for (key, value) in input {
        let Some((internal, kind)) = descriptor.resolve_external(key) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        if !kind.accepts(value) {
            return Err(ApiError::bad_request(format!("{} type not match", internal)));
        }
        let value = coerce_write_value(internal, kind, value)?;
        out.insert(key.clone(), value);
    }
    Ok(out)
}

/// The update sanitize chain: identity keys dropped, unknown keys dropped,
/// nulls dropped, kinds checked, then the editable whitelist intersected
/// (empty whitelist keeps nothing). Keys come out internal.
fn sanitize_update(
    descriptor: &Descriptor,
    editable: &[String],
    input: &Map<String, Value>,
) -> Result<Map<String, Value>, ApiError> {
    let mut vals: Map<String, Value> = Map::new();
    for (key, value) in input {
        if descriptor.is_identity_external(key) {
            continue;
        }
        let Some((internal, kind)) = descriptor.resolve_external(key) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        if !kind.accepts(value) {
            return Err(ApiError::bad_request(format!("{} type not match", internal)));
        }
        let value = coerce_write_value(internal, kind, value)?;
        vals.insert(internal.to_string(), value);
    }

    let mut stripped = Map::new();
    for field in editable {
        if let Some(value) = vals.get(field) {
            stripped.insert(field.clone(), value.clone());
        }
    }
    Ok(stripped)
}

/// Strict time coercion on write paths: strings for time-kinded fields must
/// parse against the accepted menu.
fn coerce_write_value(
    internal: &str,
    kind: &FieldKind,
    value: &Value,
) -> Result<Value, ApiError> {
    if kind.is_time() {
        if let Value::String(s) = value {
            let parsed = parse_time(s).ok_or_else(|| {
                ApiError::bad_request(format!("{} invalid time value", internal))
            })?;
            return Ok(Value::String(parsed.to_rfc3339()));
        }
    }
    Ok(value.clone())
}

// ========================================
// identity & rendering
// ========================================

/// One URL parameter per identity key, in definition order, converted to
/// the key's kind so the executor compares like with like.
fn identity_values(
    descriptor: &Descriptor,
    params: &HashMap<String, String>,
) -> Result<Vec<(String, Value)>, ApiError> {
    let mut keys = Vec::with_capacity(descriptor.identity_keys.len());
    for key in &descriptor.identity_keys {
        let external = key.field.external_or_internal();
        let raw = params
            .get(external)
            .map(String::as_str)
            .unwrap_or_default();
        if raw.is_empty() {
            return Err(ApiError::bad_request(format!("invalid primary: {}", external)));
        }
        keys.push((key.field.column_name.clone(), key_value(&key.field.kind, raw)));
    }
    Ok(keys)
}

fn key_value(kind: &FieldKind, raw: &str) -> Value {
    match kind.unwrapped() {
        FieldKind::Int | FieldKind::Uint => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        FieldKind::Float => raw
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        FieldKind::Bool => raw
            .parse::<bool>()
            .map(Value::Bool)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        _ => Value::String(raw.to_string()),
    }
}

/// Column-keyed storage row -> external-name-keyed payload, in declaration
/// order. Columns the descriptor does not know stay hidden.
fn render_external(descriptor: &Descriptor, row: &Row) -> Value {
    let mut out = Map::new();
    for field in &descriptor.fields {
        let Some(external) = &field.external_name else {
            continue;
        };
        if let Some(value) = row.get(&field.column_name) {
            out.insert(external.clone(), value.clone());
        }
    }
    Value::Object(out)
}

/// External-name-keyed payload -> column-keyed storage row. Unknown keys
/// (hook additions outside the schema) are dropped.
fn external_to_row(descriptor: &Descriptor, record: &Value) -> Row {
    let mut row = Row::new();
    let Some(map) = record.as_object() else {
        return row;
    };
    for (key, value) in map {
        let Some((internal, _)) = descriptor.resolve_external(key) else {
            continue;
        };
        let column = descriptor
            .column_for_internal(internal)
            .unwrap_or(internal)
            .to_string();
        row.insert(column, value.clone());
    }
    row
}

fn veto(err: ApiError) -> ApiError {
    // create/update/delete hooks veto with 400 regardless of variant
    ApiError::bad_request(err.message().to_string())
}

fn render_side(err: ApiError) -> ApiError {
    // render-side hook failures are server errors
    ApiError::internal(err.message().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldKind, ModelSchema};
    use serde_json::json;

    fn descriptor() -> Descriptor {
        let schema = ModelSchema::new("User")
            .field(
                FieldDef::new("ID", FieldKind::Uint)
                    .json("id")
                    .storage("primaryKey"),
            )
            .field(FieldDef::new("Name", FieldKind::String))
            .field(FieldDef::new("Age", FieldKind::Int))
            .field(FieldDef::new("Enabled", FieldKind::Bool))
            .field(FieldDef::new("LastLogin", FieldKind::Time).json("lastLogin"));
        Descriptor::build(&schema).unwrap()
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn update_sanitize_drops_identity_unknown_and_null() {
        let d = descriptor();
        let editable = vec!["Name".to_string(), "Age".to_string()];
        let input = obj(json!({
            "id": 9,
            "Name": "a",
            "Age": null,
            "Ghost": 1
        }));
        let out = sanitize_update(&d, &editable, &input).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out["Name"], json!("a"));
    }

    #[test]
    fn update_type_mismatch_names_the_field() {
        let d = descriptor();
        let editable = vec!["Name".to_string()];
        let input = obj(json!({"Name": true}));
        let err = sanitize_update(&d, &editable, &input).unwrap_err();
        assert_eq!(err.message(), "Name type not match");
    }

    #[test]
    fn update_empty_editable_keeps_nothing() {
        let d = descriptor();
        let input = obj(json!({"Name": "a", "Age": 3}));
        let out = sanitize_update(&d, &[], &input).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn update_whitelist_intersection() {
        let d = descriptor();
        let editable = vec!["Name".to_string()];
        let input = obj(json!({"Age": 99}));
        let out = sanitize_update(&d, &editable, &input).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn create_rejects_bad_time_strings() {
        let d = descriptor();
        let input = obj(json!({"Name": "a", "lastLogin": "not a date"}));
        let err = sanitize_create(&d, &input).unwrap_err();
        assert_eq!(err.message(), "LastLogin invalid time value");

        let input = obj(json!({"lastLogin": "2024-03-01 10:00:00"}));
        let out = sanitize_create(&d, &input).unwrap();
        assert_eq!(out["lastLogin"], json!("2024-03-01T10:00:00+00:00"));
    }

    #[test]
    fn create_ignores_unknown_keys_and_checks_kinds() {
        let d = descriptor();
        let input = obj(json!({"Name": "a", "Ghost": 1}));
        let out = sanitize_create(&d, &input).unwrap();
        assert_eq!(out.len(), 1);

        let input = obj(json!({"Age": "old"}));
        let err = sanitize_create(&d, &input).unwrap_err();
        assert_eq!(err.message(), "Age type not match");
    }

    #[test]
    fn identity_values_follow_key_kinds() {
        let d = descriptor();
        let mut params = HashMap::new();
        params.insert("id".to_string(), "7".to_string());
        let keys = identity_values(&d, &params).unwrap();
        assert_eq!(keys, vec![("id".to_string(), json!(7))]);

        let missing = identity_values(&d, &HashMap::new()).unwrap_err();
        assert_eq!(missing.message(), "invalid primary: id");
    }

    #[test]
    fn render_round_trip_through_columns() {
        let d = descriptor();
        let record = json!({"id": 1, "Name": "a", "lastLogin": "2024-01-01T00:00:00Z"});
        let row = external_to_row(&d, &record);
        assert_eq!(row["id"], json!(1));
        assert_eq!(row["name"], json!("a"));
        assert_eq!(row["last_login"], json!("2024-01-01T00:00:00Z"));

        let rendered = render_external(&d, &row);
        assert_eq!(rendered["id"], json!(1));
        assert_eq!(rendered["Name"], json!("a"));
        assert_eq!(rendered["lastLogin"], json!("2024-01-01T00:00:00Z"));
    }
}
