use std::ops::BitOr;
use std::sync::Arc;

use axum::http::Method;
use axum::routing::{MethodFilter, MethodRouter, on};
use axum::Router;

use crate::database::Database;
use crate::handlers;
use crate::hooks::{DbProvider, DefaultPrepare, NoHooks, ObjectHooks, PrepareQuery};
use crate::schema::{Descriptor, ModelSchema, SchemaError};

/// Bitset of enabled operations. An empty set means "all" at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Operations(u32);

impl Operations {
    pub const READ: Operations = Operations(1 << 1);
    pub const CREATE: Operations = Operations(1 << 2);
    pub const UPDATE: Operations = Operations(1 << 3);
    pub const DELETE: Operations = Operations(1 << 4);
    pub const QUERY: Operations = Operations(1 << 5);
    pub const ALL: Operations = Operations(
        Self::READ.0 | Self::CREATE.0 | Self::UPDATE.0 | Self::DELETE.0 | Self::QUERY.0,
    );

    pub fn allows(self, op: Operations) -> bool {
        self.0 & op.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Operations {
    type Output = Operations;

    fn bitor(self, rhs: Operations) -> Operations {
        Operations(self.0 | rhs.0)
    }
}

/// A custom query endpoint: mounts at `/{object}/{path}` with its own
/// prepare step. Method defaults to POST, prepare to [`DefaultPrepare`].
pub struct QueryView {
    pub path: String,
    pub method: Method,
    pub prepare: Arc<dyn PrepareQuery>,
}

impl QueryView {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Method::POST,
            prepare: Arc::new(DefaultPrepare),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn prepare(mut self, prepare: Arc<dyn PrepareQuery>) -> Self {
        self.prepare = prepare;
        self
    }
}

/// Declarative binding of a model schema to a REST surface: which
/// operations exist, which fields each directive may touch, which hooks run,
/// and where the rows live. Immutable once registered.
pub struct RestObject {
    pub schema: ModelSchema,
    pub name: String,
    pub operations: Operations,
    /// Internal field names, all four lists. Empty editable list disables
    /// updates entirely (fail-closed).
    pub editable_fields: Vec<String>,
    pub filterable_fields: Vec<String>,
    pub orderable_fields: Vec<String>,
    pub searchable_fields: Vec<String>,
    pub views: Vec<QueryView>,
    pub hooks: Arc<dyn ObjectHooks>,
    db_provider: Option<DbProvider>,
}

impl RestObject {
    pub fn new(schema: ModelSchema) -> Self {
        let name = schema.name.to_lowercase();
        Self {
            schema,
            name,
            operations: Operations::default(),
            editable_fields: Vec::new(),
            filterable_fields: Vec::new(),
            orderable_fields: Vec::new(),
            searchable_fields: Vec::new(),
            views: Vec::new(),
            hooks: Arc::new(NoHooks),
            db_provider: None,
        }
    }

    /// Override the route path segment (defaults to the lowercased model
    /// name).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn operations(mut self, operations: Operations) -> Self {
        self.operations = operations;
        self
    }

    pub fn editable(mut self, fields: &[&str]) -> Self {
        self.editable_fields = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn filterable(mut self, fields: &[&str]) -> Self {
        self.filterable_fields = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn orderable(mut self, fields: &[&str]) -> Self {
        self.orderable_fields = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn searchable(mut self, fields: &[&str]) -> Self {
        self.searchable_fields = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn view(mut self, view: QueryView) -> Self {
        self.views.push(view);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn ObjectHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Use one executor for every request.
    pub fn database(mut self, db: Arc<dyn Database>) -> Self {
        self.db_provider = Some(Arc::new(move |_, _| db.clone()));
        self
    }

    /// Per-request executor selection (tenancy, read/write split).
    pub fn db_provider(mut self, provider: DbProvider) -> Self {
        self.db_provider = Some(provider);
        self
    }

    /// Build the descriptor, validate the definition, and mount every
    /// enabled route. Fails before any route is mounted.
    pub fn register(self, router: Router) -> Result<Router, SchemaError> {
        let (router, _) = self.register_with_handle(router)?;
        Ok(router)
    }

    pub(crate) fn register_with_handle(
        self,
        router: Router,
    ) -> Result<(Router, Arc<ObjectHandle>), SchemaError> {
        let descriptor = Descriptor::build(&self.schema)?;

        for view in &self.views {
            if view.path.is_empty() {
                return Err(SchemaError::ViewWithoutPath(self.name.clone()));
            }
        }
        let db_provider = self
            .db_provider
            .clone()
            .ok_or_else(|| SchemaError::MissingDatabase(self.name.clone()))?;

        let operations = if self.operations.is_empty() {
            Operations::ALL
        } else {
            self.operations
        };

        let base_path = format!("/{}", self.name);
        let identity_path = identity_path(&base_path, &descriptor);

        let handle = Arc::new(ObjectHandle {
            object: self,
            descriptor,
            db_provider,
        });
        let state = RouteState {
            handle: handle.clone(),
            prepare: Arc::new(DefaultPrepare),
        };

        let mut identity_routes: MethodRouter<RouteState> = MethodRouter::new();
        let mut base_routes: MethodRouter<RouteState> = MethodRouter::new();
        let mut any_identity = false;
        let mut any_base = false;

        if operations.allows(Operations::READ) {
            identity_routes = identity_routes.get(handlers::handle_get);
            any_identity = true;
        }
        if operations.allows(Operations::UPDATE) {
            identity_routes = identity_routes.patch(handlers::handle_update);
            any_identity = true;
        }
        if operations.allows(Operations::DELETE) {
            identity_routes = identity_routes.delete(handlers::handle_delete);
            any_identity = true;
        }
        if operations.allows(Operations::CREATE) {
            base_routes = base_routes.put(handlers::handle_create);
            any_base = true;
        }
        if operations.allows(Operations::QUERY) {
            base_routes = base_routes.post(handlers::handle_query);
            any_base = true;
        }

        let mut object_router = Router::new();
        if any_identity {
            object_router = object_router.route(&identity_path, identity_routes);
        }
        if any_base {
            object_router = object_router.route(&base_path, base_routes);
        }
        let mut mounted = object_router.with_state(state);

        for view in &handle.object.views {
            let path = format!("{}/{}", base_path, view.path.trim_start_matches('/'));
            let filter = MethodFilter::try_from(view.method.clone())
                .unwrap_or(MethodFilter::POST);
            let view_router = Router::new()
                .route(&path, on(filter, handlers::handle_query))
                .with_state(RouteState {
                    handle: handle.clone(),
                    prepare: view.prepare.clone(),
                });
            mounted = mounted.merge(view_router);
        }

        Ok((router.merge(mounted), handle))
    }
}

/// Registered object: definition plus its derived descriptor, shared by all
/// of the object's routes.
pub struct ObjectHandle {
    pub object: RestObject,
    pub descriptor: Descriptor,
    pub db_provider: DbProvider,
}

#[derive(Clone)]
pub(crate) struct RouteState {
    pub handle: Arc<ObjectHandle>,
    pub prepare: Arc<dyn PrepareQuery>,
}

/// `/{name}/:k1/:k2...` joining one placeholder per identity key, in
/// declaration order.
fn identity_path(base: &str, descriptor: &Descriptor) -> String {
    let mut path = base.to_string();
    for key in &descriptor.identity_keys {
        path.push_str("/:");
        path.push_str(key.field.external_or_internal());
    }
    path
}

/// Register several objects at once; aborts on the first bad definition.
pub fn register_objects(
    mut router: Router,
    objects: Vec<RestObject>,
) -> Result<Router, SchemaError> {
    for object in objects {
        router = object.register(router)?;
    }
    Ok(router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldKind};

    #[test]
    fn operations_bitset() {
        let ops = Operations::READ | Operations::QUERY;
        assert!(ops.allows(Operations::READ));
        assert!(ops.allows(Operations::QUERY));
        assert!(!ops.allows(Operations::DELETE));
        assert!(Operations::default().is_empty());
        assert!(Operations::ALL.allows(Operations::UPDATE));
    }

    #[test]
    fn identity_path_joins_keys_in_order() {
        let schema = ModelSchema::new("User")
            .field(
                FieldDef::new("UUID", FieldKind::String)
                    .json("uuid")
                    .storage("primaryKey"),
            )
            .field(
                FieldDef::new("TenantID", FieldKind::Int)
                    .json("tenantID")
                    .storage("primaryKey"),
            );
        let d = Descriptor::build(&schema).unwrap();
        assert_eq!(identity_path("/user", &d), "/user/:uuid/:tenantID");
    }

    #[test]
    fn default_name_is_lowercased_model() {
        let schema = ModelSchema::new("Product").field(
            FieldDef::new("ID", FieldKind::Uint)
                .json("id")
                .storage("primaryKey"),
        );
        let object = RestObject::new(schema);
        assert_eq!(object.name, "product");
    }
}
