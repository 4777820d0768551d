mod common;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::http::Method;
use axum::Router;
use serde_json::{json, Value};

use restobject::{
    ApiError, Filter, HookContext, ObjectHooks, PrepareQuery, QueryForm, QueryResult, QueryView,
};

use common::{post_json, seed_users, spawn_user_app};

#[tokio::test]
async fn empty_body_uses_defaults() -> Result<()> {
    let db = common::user_db();
    seed_users(&db, &[("alice", 30), ("bob", 25), ("clash", 41)]).await;
    let server = spawn_user_app(db).await?;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/user", server.base_url))
        .send()
        .await?;
    assert_eq!(res.status().as_u16(), 200);
    let body = res.json::<Value>().await?;
    assert_eq!(body["total"], json!(3));
    assert_eq!(body["limit"], json!(50));
    assert_eq!(body["pos"], json!(0));
    assert_eq!(body["items"].as_array().unwrap().len(), 3);
    Ok(())
}

#[tokio::test]
async fn whitelisted_filter_applies() -> Result<()> {
    let db = common::user_db();
    seed_users(&db, &[("alice", 30), ("bob", 25)]).await;
    let server = spawn_user_app(db).await?;

    let (status, body) = post_json(
        &server.base_url,
        "/user",
        &json!({"filters": [{"name": "Age", "op": ">=", "value": 30}]}),
    )
    .await?;
    assert_eq!(status, 200);
    assert_eq!(body["total"], json!(1));
    assert_eq!(body["items"][0]["Name"], json!("alice"));
    Ok(())
}

#[tokio::test]
async fn unlisted_filter_is_dropped_silently() -> Result<()> {
    let db = common::user_db();
    seed_users(&db, &[("alice", 30), ("bob", 25)]).await;
    // filterable is [Name, Age]; ID is not in it
    let server = spawn_user_app(db).await?;

    let (status, body) = post_json(
        &server.base_url,
        "/user",
        &json!({"filters": [{"name": "ID", "op": "=", "value": 1}]}),
    )
    .await?;
    assert_eq!(status, 200);
    assert_eq!(body["total"], json!(2), "dropped filter must not restrict");
    Ok(())
}

#[tokio::test]
async fn keyword_search_over_searchables() -> Result<()> {
    let db = common::user_db();
    seed_users(&db, &[("alice", 30), ("bob", 25), ("clash", 41)]).await;
    let server = spawn_user_app(db).await?;

    let (status, body) = post_json(&server.base_url, "/user", &json!({"keyword": "bo"})).await?;
    assert_eq!(status, 200);
    assert_eq!(body["total"], json!(1));
    assert_eq!(body["keyword"], json!("bo"));
    assert_eq!(body["items"][0]["Name"], json!("bob"));
    Ok(())
}

#[tokio::test]
async fn page_mode_pagination() -> Result<()> {
    let db = common::user_db();
    seed_users(&db, &[("alice", 30), ("bob", 25), ("clash", 41)]).await;
    let server = spawn_user_app(db).await?;

    let (status, body) = post_json(
        &server.base_url,
        "/user",
        &json!({"pagination": true, "pos": 2, "limit": 2}),
    )
    .await?;
    assert_eq!(status, 200);
    assert_eq!(body["total"], json!(3));
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1, "second page of limit 2 over 3 rows");
    assert_eq!(items[0]["Name"], json!("clash"));
    Ok(())
}

#[tokio::test]
async fn offset_mode_pagination() -> Result<()> {
    let db = common::user_db();
    seed_users(&db, &[("alice", 30), ("bob", 25), ("clash", 41)]).await;
    let server = spawn_user_app(db).await?;

    let (status, body) = post_json(&server.base_url, "/user", &json!({"pos": 1, "limit": 2})).await?;
    assert_eq!(status, 200);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["Name"], json!("bob"));
    Ok(())
}

#[tokio::test]
async fn oversized_limit_falls_back_to_default() -> Result<()> {
    let db = common::user_db();
    seed_users(&db, &[("alice", 30)]).await;
    let server = spawn_user_app(db).await?;

    let (status, body) = post_json(&server.base_url, "/user", &json!({"limit": 100000})).await?;
    assert_eq!(status, 200);
    assert_eq!(body["limit"], json!(50));
    Ok(())
}

#[tokio::test]
async fn orders_apply_when_whitelisted() -> Result<()> {
    let db = common::user_db();
    seed_users(&db, &[("alice", 30), ("bob", 25), ("clash", 41)]).await;
    let server = spawn_user_app(db).await?;

    let (status, body) = post_json(
        &server.base_url,
        "/user",
        &json!({"orders": [{"name": "Age", "op": "desc"}]}),
    )
    .await?;
    assert_eq!(status, 200);
    let names: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["Name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["clash", "alice", "bob"]);

    // Name is not orderable; the directive drops and order stays insertion
    let (_, body) = post_json(
        &server.base_url,
        "/user",
        &json!({"orders": [{"name": "Name", "op": "desc"}]}),
    )
    .await?;
    let names: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["Name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["alice", "bob", "clash"]);
    Ok(())
}

/// Custom view: only adults, projected to Name, capped at 10 rows.
struct AdultsPrepare;

#[async_trait]
impl PrepareQuery for AdultsPrepare {
    async fn prepare(&self, _ctx: &HookContext, form: &mut QueryForm) -> Result<(), ApiError> {
        form.limit = 10;
        form.view_filters.push(Filter {
            name: "Age".into(),
            op: ">=".into(),
            value: json!(30),
        });
        form.view_fields = vec!["Name".into()];
        Ok(())
    }
}

#[tokio::test]
async fn custom_view_injects_filters_and_projection() -> Result<()> {
    let db = common::user_db();
    seed_users(&db, &[("alice", 30), ("bob", 25), ("clash", 41)]).await;
    let object = common::user_object(db)
        .view(QueryView::new("adults").method(Method::POST).prepare(Arc::new(AdultsPrepare)));
    let server = common::spawn_app(object.register(Router::new()).unwrap()).await?;

    let (status, body) = post_json(&server.base_url, "/user/adults", &json!({})).await?;
    assert_eq!(status, 200);
    assert_eq!(body["total"], json!(2));
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    for item in items {
        assert!(item.get("Name").is_some());
        assert!(item.get("Age").is_none(), "projection must hide Age: {}", item);
    }
    Ok(())
}

struct RenderHooks;

#[async_trait]
impl ObjectHooks for RenderHooks {
    async fn before_render(
        &self,
        _ctx: &mut HookContext,
        record: &mut Value,
    ) -> Result<(), ApiError> {
        record["Badge"] = json!("*");
        Ok(())
    }

    async fn before_query_render(
        &self,
        _ctx: &mut HookContext,
        result: &mut QueryResult,
    ) -> Result<Option<Value>, ApiError> {
        Ok(Some(json!({"wrapped": result.total})))
    }
}

#[tokio::test]
async fn query_render_hooks_replace_payload() -> Result<()> {
    let db = common::user_db();
    seed_users(&db, &[("alice", 30)]).await;
    let object = common::user_object(db).hooks(Arc::new(RenderHooks));
    let server = common::spawn_app(object.register(Router::new()).unwrap()).await?;

    let (status, body) = post_json(&server.base_url, "/user", &json!({})).await?;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"wrapped": 1}));
    Ok(())
}

struct InterceptHooks;

#[async_trait]
impl ObjectHooks for InterceptHooks {
    async fn before_render(
        &self,
        ctx: &mut HookContext,
        _record: &mut Value,
    ) -> Result<(), ApiError> {
        use axum::response::IntoResponse;
        ctx.respond((axum::http::StatusCode::ACCEPTED, "intercepted").into_response());
        Ok(())
    }
}

#[tokio::test]
async fn hooks_can_write_the_response_directly() -> Result<()> {
    let db = common::user_db();
    seed_users(&db, &[("alice", 30)]).await;
    let object = common::user_object(db).hooks(Arc::new(InterceptHooks));
    let server = common::spawn_app(object.register(Router::new()).unwrap()).await?;

    let client = reqwest::Client::new();
    let res = client.get(format!("{}/user/1", server.base_url)).send().await?;
    assert_eq!(res.status().as_u16(), 202);
    assert_eq!(res.text().await?, "intercepted");
    Ok(())
}

#[tokio::test]
async fn malformed_query_body_is_400() -> Result<()> {
    let server = spawn_user_app(common::user_db()).await?;
    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/user", server.base_url))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await?;
    assert_eq!(res.status().as_u16(), 400);
    Ok(())
}
