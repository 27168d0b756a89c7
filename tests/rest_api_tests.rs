//! REST exposure of the Hits catalog and the user/role tables

use axum::http::StatusCode;
use axum_test::TestServer;
use crud::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;

struct App {
    server: TestServer,
    _dir: TempDir,
}

/// A server over a fresh file database, authenticated as `fake_user`
async fn spawn_app(fake_user: &str, policy: AuthPolicy) -> App {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("hits.db").display());
    let config = AppConfig {
        fake_user: Some(fake_user.to_string()),
        ..Default::default()
    }
    .with_db_context("HitsContext", &url)
    .with_db_context("AppUserRolesContext", &url);

    let hits = Arc::new(DbContextService::<HitsContext>::new(&config).expect("configured"));
    hits.ensure_created().await.expect("hits schema");
    let resolver = UserRoleResolver::from_config(&config).expect("configured");
    let app_user_roles =
        Arc::new(DbContextService::<AppUserRolesContext>::new(&config).expect("configured"));
    app_user_roles.ensure_created().await.expect("roles schema");

    let router = ServerBuilder::new(config.clone())
        .register(CrudResource::<HitsContext, Song>::from_config(&config, hits.clone()))
        .register(CrudResource::<HitsContext, Artist>::from_config(&config, hits))
        .register(
            CrudResource::<AppUserRolesContext, AppRole>::from_config(&config, app_user_roles)
                .with_hooks(crud::security::AppRoleHooks),
        )
        .with_fake_authentication()
        .expect("fake user")
        .with_role_resolver(Arc::new(resolver))
        .with_policy(policy)
        .build();

    App {
        server: TestServer::try_new(router).expect("server"),
        _dir: dir,
    }
}

fn ids(body: &Value) -> Vec<i64> {
    body["data"]
        .as_array()
        .expect("data")
        .iter()
        .filter_map(|row| row["Id"].as_i64())
        .collect()
}

#[tokio::test]
async fn test_list_songs_with_query_string() {
    let app = spawn_app("Maria", AuthPolicy::Authenticated).await;

    let response = app
        .server
        .get("/songs")
        .add_query_param("filter", "ReleaseDate > @0")
        .add_query_param("filter_parameters", "[\"1970-01-01\"]")
        .add_query_param("order_by", "Title")
        .add_query_param("skip", 2)
        .add_query_param("top", 3)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["countAcrossPages"], 11);
    assert_eq!(ids(&body), vec![6, 7, 5]);
}

#[tokio::test]
async fn test_list_with_select_returns_projected_rows() {
    let app = spawn_app("Maria", AuthPolicy::Authenticated).await;

    let response = app
        .server
        .get("/songs")
        .add_query_param("select", "new (Id, Title as Name)")
        .add_query_param("order_by", "Id")
        .add_query_param("top", 2)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(
        body["data"],
        json!([
            { "Id": 1, "Name": "Whole Lotta Love" },
            { "Id": 2, "Name": "Stairway to Heaven" }
        ])
    );
}

#[tokio::test]
async fn test_dynamic_endpoint_reports_page_metadata() {
    let app = spawn_app("Maria", AuthPolicy::Authenticated).await;

    let response = app
        .server
        .get("/songs/dynamic")
        .add_query_param("where", "Title.Contains(\"o\")")
        .add_query_param("order_by", "ReleaseDate desc")
        .add_query_param("include", "Artist")
        .add_query_param("skip", 3)
        .add_query_param("take", 4)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(ids(&body), vec![11, 16, 3, 15]);
    assert_eq!(body["rowCount"], 9);
    assert_eq!(body["pageCount"], 3);
    assert_eq!(body["currentPage"], 2);
    assert_eq!(body["pageSize"], 4);
    assert_eq!(body["data"][0]["Artist"]["Name"], "Nazareth");
}

#[tokio::test]
async fn test_malformed_filter_is_bad_request() {
    let app = spawn_app("Maria", AuthPolicy::Authenticated).await;

    let response = app
        .server
        .get("/songs")
        .add_query_param("filter", "Password == 'x'")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_crud_round_trip_stamps_fake_user() {
    let app = spawn_app("Maria", AuthPolicy::Authenticated).await;

    let created = app
        .server
        .post("/songs")
        .json(&json!({ "Title": "Sultans of Swing", "ReleaseDate": "1978-05-19", "ArtistId": 1 }))
        .await;
    created.assert_status(StatusCode::CREATED);
    let created: Value = created.json();
    let id = created["Id"].as_i64().expect("id");
    assert_eq!(created["SysUser"], "Maria");
    assert_ne!(created["SysGuid"], json!(Uuid::nil()));

    let updated = app
        .server
        .put(&format!("/songs/{}", id))
        .json(&json!({ "Title": "Sultans of Swing (Live)", "ArtistId": 1 }))
        .await;
    updated.assert_status_ok();
    let updated: Value = updated.json();
    assert_eq!(updated["SysGuid"], created["SysGuid"]);

    let fetched: Value = app.server.get(&format!("/songs/{}", id)).await.json();
    assert_eq!(fetched["Title"], "Sultans of Swing (Live)");

    app.server
        .delete(&format!("/songs/{}", id))
        .await
        .assert_status_ok();
    app.server
        .get(&format!("/songs/{}", id))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_ignores_client_supplied_id() {
    let app = spawn_app("Maria", AuthPolicy::Authenticated).await;
    let before: Value = app.server.get("/songs/5").await.json();

    let created = app
        .server
        .post("/songs")
        .json(&json!({ "Id": 5, "Title": "Layla", "ReleaseDate": "1970-11-09", "ArtistId": 1 }))
        .await;
    created.assert_status(StatusCode::CREATED);
    let created: Value = created.json();
    let id = created["Id"].as_i64().expect("id");
    assert_ne!(id, 5);

    let after: Value = app.server.get("/songs/5").await.json();
    assert_eq!(after, before);
    let fetched: Value = app.server.get(&format!("/songs/{}", id)).await.json();
    assert_eq!(fetched["Title"], "Layla");
}

#[tokio::test]
async fn test_dynamic_endpoint_accepts_huge_take() {
    let app = spawn_app("Maria", AuthPolicy::Authenticated).await;

    let response = app
        .server
        .get("/songs/dynamic")
        .add_query_param("order_by", "Id")
        .add_query_param("take", i64::MAX)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["rowCount"], 16);
    assert_eq!(body["pageCount"], 1);
    assert_eq!(body["currentPage"], 1);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(16));
}

#[tokio::test]
async fn test_role_policy_uses_resolved_roles() {
    // Maria holds "admin", Darius holds "user"
    let admin_only = AuthPolicy::HasRole(vec!["admin".to_string()]);

    let app = spawn_app("Maria", admin_only.clone()).await;
    app.server.get("/app-roles").await.assert_status_ok();

    let app = spawn_app("Darius", admin_only).await;
    app.server
        .get("/app-roles")
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_deleting_role_over_rest_detaches_users() {
    let app = spawn_app("Starbuck", AuthPolicy::HasRole(vec!["IT".to_string()])).await;

    let deleted = app.server.delete("/app-roles/-4").await;
    deleted.assert_status_ok();
    let deleted: Value = deleted.json();
    assert_eq!(deleted["RoleName"], "readonly");

    app.server
        .get("/app-roles/-4")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
