//! End-to-end scenarios against a live PostgreSQL.
//!
//! Set `TEST_DATABASE_URL` to run them; each test creates and drops its own schema.

mod common;

use auto_rest::{reflect, AllowAll, Catalog};
use axum::http::{Method, StatusCode};
use axum::Router;
use common::{send, settings};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

const TABLES: &[&str] = &[
    "CREATE TABLE {s}.users (
        id serial PRIMARY KEY,
        email varchar(64) NOT NULL UNIQUE,
        status text NOT NULL DEFAULT 'active',
        created_at timestamptz NOT NULL DEFAULT now()
    )",
    "CREATE TABLE {s}.comments (
        post_id integer NOT NULL,
        author_id integer NOT NULL REFERENCES {s}.users(id),
        content text,
        PRIMARY KEY (post_id, author_id)
    )",
    "CREATE TABLE {s}.codes (code varchar(3) PRIMARY KEY, label text)",
    "CREATE TABLE {s}.items (id serial PRIMARY KEY, price numeric(10,2) NOT NULL)",
    "CREATE TABLE {s}.memberships (org uuid NOT NULL, n integer NOT NULL, PRIMARY KEY (org, n))",
    "CREATE VIEW {s}.active_users AS SELECT id, email FROM {s}.users WHERE status = 'active'",
];

struct Fixture {
    app: Router,
    pool: PgPool,
    schema: String,
}

impl Fixture {
    async fn teardown(self) {
        sqlx::query(&format!("DROP SCHEMA {} CASCADE", self.schema))
            .execute(&self.pool)
            .await
            .unwrap();
        self.pool.close().await;
    }
}

async fn setup() -> Option<Fixture> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return None;
    };
    let pool = PgPoolOptions::new().max_connections(4).connect(&url).await.unwrap();
    let schema = format!("auto_rest_{}", uuid::Uuid::new_v4().simple());
    sqlx::query(&format!("CREATE SCHEMA {}", schema)).execute(&pool).await.unwrap();
    for ddl in TABLES {
        sqlx::query(&ddl.replace("{s}", &schema)).execute(&pool).await.unwrap();
    }
    let tables = reflect(&pool, &schema).await.unwrap();
    let catalog = Catalog::build(schema.clone(), tables);
    let state = common::state(pool.clone(), catalog, settings(true), Arc::new(AllowAll));
    let app = auto_rest::build_router(state).unwrap();
    Some(Fixture { app, pool, schema })
}

fn id_of(body: &Value) -> i64 {
    body["data"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn users_crud_conflict_and_filtering() {
    let Some(fx) = setup().await else { return };
    let app = &fx.app;

    let (status, a) = send(app, Method::POST, "/users/", Some(json!({"email": "a@x.com"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(a["data"]["status"], "active");
    assert!(a["data"]["created_at"].is_string());
    let a_id = id_of(&a);

    let (status, got) = send(app, Method::GET, &format!("/users/{}/", a_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(got["data"], a["data"]);

    let (status, body) = send(app, Method::POST, "/users/", Some(json!({"email": "a@x.com"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");

    let (status, b) = send(
        app,
        Method::POST,
        "/users/",
        Some(json!({"email": "b@x.com", "status": "inactive"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let b_id = id_of(&b);

    let (status, page) = send(app, Method::GET, "/users/?status=active", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["meta"]["total"], 1);
    assert_eq!(page["data"][0]["email"], "a@x.com");

    let (status, page) = send(app, Method::GET, "/users/?status=active&status=inactive&order_by=-email", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["meta"]["total"], 2);
    assert_eq!(page["data"][0]["email"], "b@x.com");

    let (status, view) = send(app, Method::GET, "/active_users/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["meta"]["total"], 1);

    let (status, patched) = send(
        app,
        Method::PATCH,
        &format!("/users/{}/", b_id),
        Some(json!({"status": "active"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["data"]["status"], "active");
    assert_eq!(patched["data"]["email"], "b@x.com");
    assert_eq!(patched["data"]["created_at"], b["data"]["created_at"]);

    let (status, same) = send(app, Method::PATCH, &format!("/users/{}/", b_id), Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(same["data"], patched["data"]);

    let (status, _) = send(app, Method::DELETE, &format!("/users/{}/", b_id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(app, Method::DELETE, &format!("/users/{}/", b_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(app, Method::PATCH, &format!("/users/{}/", b_id), Some(json!({"status": "x"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    fx.teardown().await;
}

#[tokio::test]
async fn composite_keys_and_relationship_filters() {
    let Some(fx) = setup().await else { return };
    let app = &fx.app;

    let (_, author) = send(app, Method::POST, "/users/", Some(json!({"email": "author@x.com"}))).await;
    let author_id = id_of(&author);

    let (status, created) = send(
        app,
        Method::POST,
        "/comments/",
        Some(json!({"post_id": 3, "author_id": author_id, "content": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["content"], "hello");

    let (status, got) = send(app, Method::GET, &format!("/comments/3-{}/", author_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(got["data"]["post_id"], 3);

    let (status, _) = send(app, Method::GET, "/comments/3-99999/", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, replaced) = send(
        app,
        Method::PUT,
        &format!("/comments/3-{}/", author_id),
        Some(json!({"content": null})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replaced["data"]["content"], Value::Null);
    assert_eq!(replaced["data"]["author_id"], author_id);

    let (status, page) = send(app, Method::GET, "/comments/?author_id.email=author@x.com", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["meta"]["total"], 1);
    let (_, page) = send(app, Method::GET, "/comments/?author_id.email__like=nobody%25", None).await;
    assert_eq!(page["meta"]["total"], 0);

    let (status, _) = send(
        app,
        Method::POST,
        "/comments/",
        Some(json!({"post_id": 4, "author_id": 99999})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    fx.teardown().await;
}

#[tokio::test]
async fn pages_concatenate_to_the_ordered_set() {
    let Some(fx) = setup().await else { return };
    let app = &fx.app;

    for i in 0..7 {
        let status_value = if i % 2 == 0 { "active" } else { "inactive" };
        let (status, _) = send(
            app,
            Method::POST,
            "/users/",
            Some(json!({"email": format!("u{}@x.com", i), "status": status_value})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, all) = send(app, Method::GET, "/users/?order_by=status&limit=100", None).await;
    let expected: Vec<Value> = all["data"].as_array().unwrap().clone();
    assert_eq!(expected.len(), 7);

    let mut collected = Vec::new();
    let mut offset = 0;
    loop {
        let (status, page) = send(
            app,
            Method::GET,
            &format!("/users/?order_by=status&limit=3&offset={}", offset),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["meta"]["total"], 7);
        let rows = page["data"].as_array().unwrap();
        if rows.is_empty() {
            break;
        }
        collected.extend(rows.iter().cloned());
        offset += 3;
    }
    assert_eq!(collected, expected);

    fx.teardown().await;
}

#[tokio::test]
async fn bounded_types_match_exactly() {
    let Some(fx) = setup().await else { return };
    let app = &fx.app;

    let (status, _) = send(app, Method::POST, "/codes/", Some(json!({"code": "ABC", "label": "first"}))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(app, Method::GET, "/codes/?code=ABCXYZ", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["details"][0]["field"], "code");
    let (_, page) = send(app, Method::GET, "/codes/?code=AB", None).await;
    assert_eq!(page["meta"]["total"], 0);

    let (status, _) = send(app, Method::GET, "/codes/ABCXYZ/", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(app, Method::DELETE, "/codes/ABCXYZ/", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, got) = send(app, Method::GET, "/codes/ABC/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(got["data"]["label"], "first");

    let (status, _) = send(app, Method::POST, "/items/", Some(json!({"price": "1.23"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, page) = send(app, Method::GET, "/items/?price=1.234", None).await;
    assert_eq!(page["meta"]["total"], 0);
    let (_, page) = send(app, Method::GET, "/items/?price=1.23", None).await;
    assert_eq!(page["meta"]["total"], 1);

    fx.teardown().await;
}

#[tokio::test]
async fn key_parts_containing_the_delimiter_are_addressable() {
    let Some(fx) = setup().await else { return };
    let app = &fx.app;

    let org = "6f1c2d1e-0000-4000-8000-000000000001";
    let (status, _) = send(app, Method::POST, "/memberships/", Some(json!({"org": org, "n": -1}))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, got) = send(app, Method::GET, &format!("/memberships/{}--1/", org), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(got["data"]["org"], org);
    assert_eq!(got["data"]["n"], -1);

    let (status, _) = send(app, Method::DELETE, &format!("/memberships/{}--1/", org), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    fx.teardown().await;
}

#[tokio::test]
async fn patch_never_drops_a_key_change() {
    let Some(fx) = setup().await else { return };
    let app = &fx.app;

    let (_, author) = send(app, Method::POST, "/users/", Some(json!({"email": "k@x.com"}))).await;
    let author_id = id_of(&author);
    let (status, _) = send(
        app,
        Method::POST,
        "/comments/",
        Some(json!({"post_id": 3, "author_id": author_id, "content": "a"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let path = format!("/comments/3-{}/", author_id);
    let (status, body) = send(app, Method::PATCH, &path, Some(json!({"post_id": 9}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["details"][0]["field"], "post_id");

    let (status, got) = send(app, Method::GET, &path, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(got["data"]["post_id"], 3);

    fx.teardown().await;
}
