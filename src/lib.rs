//! Declarative CRUD-over-HTTP engine.
//!
//! Declare a model schema plus a small policy set (editable / filterable /
//! orderable / searchable field lists, lifecycle hooks, custom query views)
//! and registration mounts a complete REST surface on an [`axum::Router`]:
//! read, create, update, delete, query, and any custom views, backed by a
//! pluggable storage executor.
//!
//! ```no_run
//! use std::sync::Arc;
//! use restobject::{
//!     register_objects_with_admin, FieldDef, FieldKind, MemoryDatabase, ModelSchema,
//!     RestObject,
//! };
//!
//! let schema = ModelSchema::new("User")
//!     .field(FieldDef::new("ID", FieldKind::Uint).json("id").storage("primaryKey"))
//!     .field(FieldDef::new("Name", FieldKind::String))
//!     .field(FieldDef::new("Age", FieldKind::Int));
//!
//! let user = RestObject::new(schema)
//!     .editable(&["Name"])
//!     .filterable(&["Name", "Age"])
//!     .searchable(&["Name"])
//!     .database(Arc::new(MemoryDatabase::new().with_serial("user", "id")));
//!
//! let router = register_objects_with_admin(axum::Router::new(), vec![user]).unwrap();
//! # let _ = router;
//! ```

pub mod admin;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
mod handlers;
pub mod hooks;
pub mod object;
pub mod schema;

pub use admin::register_objects_with_admin;
pub use config::EngineConfig;
pub use database::memory::MemoryDatabase;
pub use database::postgres::PostgresDatabase;
pub use database::{Database, DbError, QuerySpec, Row};
pub use error::ApiError;
pub use filter::{Filter, Order, QueryForm, QueryResult};
pub use hooks::{DbProvider, DefaultPrepare, HookContext, NoHooks, ObjectHooks, PrepareQuery};
pub use object::{register_objects, Operations, QueryView, RestObject};
pub use schema::{Descriptor, FieldDef, FieldKind, ModelSchema, SchemaError};
