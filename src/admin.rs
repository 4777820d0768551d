//! Admin metadata endpoints: the reflected schema surface a UI or docs
//! generator consumes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;

use crate::error::ApiError;
use crate::object::{ObjectHandle, RestObject};
use crate::schema::SchemaError;

/// Registered-object metadata, one entry per object.
pub struct AdminRegistry {
    entries: Vec<AdminEntry>,
}

struct AdminEntry {
    name: String,
    handle: Arc<ObjectHandle>,
    searchs: Vec<String>,
    filters: Vec<String>,
    orders: Vec<String>,
    edits: Vec<String>,
    primary_key: String,
}

impl AdminEntry {
    fn new(handle: Arc<ObjectHandle>) -> Self {
        let descriptor = &handle.descriptor;
        // policy lists are internal names; the UI wants external names
        let to_external = |fields: &[String]| -> Vec<String> {
            fields
                .iter()
                .filter_map(|internal| descriptor.external_for_internal(internal))
                .map(str::to_string)
                .collect()
        };
        Self {
            name: handle.object.name.clone(),
            searchs: to_external(&handle.object.searchable_fields),
            filters: to_external(&handle.object.filterable_fields),
            orders: to_external(&handle.object.orderable_fields),
            edits: to_external(&handle.object.editable_fields),
            primary_key: descriptor.identity_keys[0]
                .field
                .external_or_internal()
                .to_string(),
            handle,
        }
    }

    fn fields_payload(&self) -> serde_json::Value {
        let mut fields = Vec::new();
        let mut types = Vec::new();
        let mut rust_types = Vec::new();
        for field in &self.handle.descriptor.fields {
            let Some(external) = &field.external_name else {
                continue;
            };
            fields.push(external.clone());
            types.push(field.declared_kind.js_type().to_string());
            rust_types.push(field.rust_type.to_string());
        }
        json!({
            "fields": fields,
            "types": types,
            "rustTypes": rust_types,
            "searchs": self.searchs,
            "filters": self.filters,
            "orders": self.orders,
            "edits": self.edits,
            "primaryKey": self.primary_key,
        })
    }
}

/// Register a list of objects plus the admin metadata endpoints
/// (`GET /object_names`, `GET /object/:name`).
pub fn register_objects_with_admin(
    mut router: Router,
    objects: Vec<RestObject>,
) -> Result<Router, SchemaError> {
    let mut entries = Vec::with_capacity(objects.len());
    for object in objects {
        let (next, handle) = object.register_with_handle(router)?;
        router = next;
        entries.push(AdminEntry::new(handle));
    }
    let registry = Arc::new(AdminRegistry { entries });
    Ok(router.merge(
        Router::new()
            .route("/object_names", get(handle_object_names))
            .route("/object/:name", get(handle_object_fields))
            .with_state(registry),
    ))
}

async fn handle_object_names(State(registry): State<Arc<AdminRegistry>>) -> Response {
    let names: Vec<&str> = registry.entries.iter().map(|e| e.name.as_str()).collect();
    Json(names).into_response()
}

async fn handle_object_fields(
    State(registry): State<Arc<AdminRegistry>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let entry = registry
        .entries
        .iter()
        .find(|e| e.name == name)
        .ok_or_else(|| ApiError::not_found(format!("unknown object: {}", name)))?;
    Ok(Json(entry.fields_payload()).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryDatabase;
    use crate::schema::{FieldDef, FieldKind, ModelSchema};

    #[test]
    fn entry_maps_policy_lists_to_external_names() {
        let schema = ModelSchema::new("User")
            .field(
                FieldDef::new("ID", FieldKind::Uint)
                    .json("id")
                    .storage("primaryKey")
                    .rust_type("u32"),
            )
            .field(FieldDef::new("Name", FieldKind::String).rust_type("String"))
            .field(
                FieldDef::new("CreatedAt", FieldKind::Time)
                    .json("createdAt")
                    .rust_type("DateTime<Utc>"),
            )
            .field(FieldDef::new("Secret", FieldKind::String).json("-").rust_type("String"));
        let object = RestObject::new(schema)
            .editable(&["Name"])
            .filterable(&["Name", "CreatedAt"])
            .searchable(&["Name"])
            .orderable(&["CreatedAt", "Missing"])
            .database(Arc::new(MemoryDatabase::new()));

        let (_, handle) = object.register_with_handle(Router::new()).unwrap();
        let entry = AdminEntry::new(handle);
        let payload = entry.fields_payload();

        assert_eq!(payload["fields"], json!(["id", "Name", "createdAt"]));
        assert_eq!(payload["types"], json!(["number", "string", "object"]));
        assert_eq!(payload["rustTypes"], json!(["u32", "String", "DateTime<Utc>"]));
        assert_eq!(payload["filters"], json!(["Name", "createdAt"]));
        assert_eq!(payload["edits"], json!(["Name"]));
        // unknown internal names are skipped, not emitted as blanks
        assert_eq!(payload["orders"], json!(["createdAt"]));
        assert_eq!(payload["primaryKey"], json!("id"));
    }
}
