use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use serde_json::{json, Value};

use restobject::{
    register_objects_with_admin, FieldDef, FieldKind, MemoryDatabase, ModelSchema, RestObject,
};

pub struct TestServer {
    pub base_url: String,
}

/// Serve a router on an ephemeral port; the task lives as long as the test
/// process.
pub async fn spawn_app(router: Router) -> Result<TestServer> {
    let _ = tracing_subscriber::fmt::try_init();
    let router = router.layer(tower_http::trace::TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server");
    });
    Ok(TestServer {
        base_url: format!("http://{}", addr),
    })
}

/// The spec's demo model: `User { ID uint (primary), Name string, Age int }`,
/// external names identical to internal ones.
pub fn user_schema() -> ModelSchema {
    ModelSchema::new("User")
        .field(
            FieldDef::new("ID", FieldKind::Uint)
                .storage("primaryKey")
                .rust_type("u32"),
        )
        .field(FieldDef::new("Name", FieldKind::String).rust_type("String"))
        .field(FieldDef::new("Age", FieldKind::Int).rust_type("i64"))
}

pub fn user_db() -> Arc<MemoryDatabase> {
    Arc::new(MemoryDatabase::new().with_serial("user", "id"))
}

/// Standard fixture: editable=[Name], filterable=[Name,Age],
/// orderable=[Age], searchable=[Name].
pub fn user_object(db: Arc<MemoryDatabase>) -> RestObject {
    RestObject::new(user_schema())
        .editable(&["Name"])
        .filterable(&["Name", "Age"])
        .orderable(&["Age"])
        .searchable(&["Name"])
        .database(db)
}

pub async fn spawn_user_app(db: Arc<MemoryDatabase>) -> Result<TestServer> {
    let router = register_objects_with_admin(Router::new(), vec![user_object(db)])
        .expect("register user object");
    spawn_app(router).await
}

/// Seed through the executor directly, bypassing the HTTP surface.
pub async fn seed_users(db: &MemoryDatabase, users: &[(&str, i64)]) {
    use restobject::Database;
    for (name, age) in users {
        let row = json!({"name": name, "age": age});
        db.insert("user", row.as_object().unwrap().clone())
            .await
            .expect("seed row");
    }
}

pub async fn put_json(base: &str, path: &str, body: &Value) -> Result<(u16, Value)> {
    let client = reqwest::Client::new();
    let res = client
        .put(format!("{}{}", base, path))
        .json(body)
        .send()
        .await?;
    let status = res.status().as_u16();
    let payload = res.json::<Value>().await.unwrap_or(Value::Null);
    Ok((status, payload))
}

pub async fn post_json(base: &str, path: &str, body: &Value) -> Result<(u16, Value)> {
    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}{}", base, path))
        .json(body)
        .send()
        .await?;
    let status = res.status().as_u16();
    let payload = res.json::<Value>().await.unwrap_or(Value::Null);
    Ok((status, payload))
}

pub async fn patch_json(base: &str, path: &str, body: &Value) -> Result<(u16, Value)> {
    let client = reqwest::Client::new();
    let res = client
        .patch(format!("{}{}", base, path))
        .json(body)
        .send()
        .await?;
    let status = res.status().as_u16();
    let payload = res.json::<Value>().await.unwrap_or(Value::Null);
    Ok((status, payload))
}

pub async fn get_json(base: &str, path: &str) -> Result<(u16, Value)> {
    let client = reqwest::Client::new();
    let res = client.get(format!("{}{}", base, path)).send().await?;
    let status = res.status().as_u16();
    let payload = res.json::<Value>().await.unwrap_or(Value::Null);
    Ok((status, payload))
}

pub async fn delete_json(base: &str, path: &str) -> Result<(u16, Value)> {
    let client = reqwest::Client::new();
    let res = client.delete(format!("{}{}", base, path)).send().await?;
    let status = res.status().as_u16();
    let payload = res.json::<Value>().await.unwrap_or(Value::Null);
    Ok((status, payload))
}
