#![cfg(feature = "online")]

use pretty_assertions::assert_eq;
use quotegate_license::{
    DirectoryClient, DirectoryConfig, DurationPolicy, DurationTerm, DurationUnit, HttpDirectory,
    Reason, User,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENDPOINT: &str = "/api/subscription.php";

fn client(server: &MockServer) -> HttpDirectory {
    HttpDirectory::new(DirectoryConfig {
        base_url: server.uri(),
        timeout_secs: 5,
        ..Default::default()
    })
    .unwrap()
}

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": data}))
}

#[tokio::test]
async fn list_users_reads_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ENDPOINT))
        .and(query_param("action", "users"))
        .respond_with(ok(json!([
            {"id": 1, "code": "ABC123", "name": "Alice"},
            {"id": 7, "code": "ABCD", "name": "Sara"}
        ])))
        .mount(&server)
        .await;

    let users = client(&server).list_users().await.unwrap();
    assert_eq!(users, vec![User::new(1, "ABC123", "Alice"), User::new(7, "ABCD", "Sara")]);
}

#[tokio::test]
async fn settings_null_duration_is_no_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("action", "settings"))
        .respond_with(ok(json!({"duration": null})))
        .mount(&server)
        .await;

    let policy = client(&server).get_duration_policy().await.unwrap();
    assert_eq!(policy, Some(DurationPolicy::NoExpiry));
}

#[tokio::test]
async fn settings_with_term() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("action", "settings"))
        .respond_with(ok(json!({"duration": {"value": 30, "unit": "days"}})))
        .mount(&server)
        .await;

    let policy = client(&server).get_duration_policy().await.unwrap();
    assert_eq!(
        policy,
        Some(DurationPolicy::Fixed(DurationTerm::new(30, DurationUnit::Days)))
    );
}

#[tokio::test]
async fn settings_without_unit_read_as_days() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("action", "settings"))
        .respond_with(ok(json!({"duration": {"value": 3, "unit": null}})))
        .mount(&server)
        .await;

    let policy = client(&server).get_duration_policy().await.unwrap();
    assert_eq!(
        policy,
        Some(DurationPolicy::Fixed(DurationTerm::new(3, DurationUnit::Days)))
    );
}

#[tokio::test]
async fn settings_with_unknown_unit_read_as_days() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("action", "settings"))
        .respond_with(ok(json!({"duration": {"value": 2, "unit": "weeks"}})))
        .mount(&server)
        .await;

    let policy = client(&server).get_duration_policy().await.unwrap();
    assert_eq!(
        policy,
        Some(DurationPolicy::Fixed(DurationTerm::new(2, DurationUnit::Days)))
    );
}

#[tokio::test]
async fn add_user_posts_backend_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(query_param("action", "add_user"))
        .and(body_json(json!({"user_id": 3, "name": "Cy", "code": "C3"})))
        .respond_with(ok(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .add_user(&User::new(3, "c3", "Cy"))
        .await
        .unwrap();
}

#[tokio::test]
async fn sync_users_posts_full_list() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(query_param("action", "sync_users"))
        .and(body_json(json!({"users": [{"id": 1, "code": "A1", "name": "One"}]})))
        .respond_with(ok(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .sync_users(&[User::new(1, "A1", "One")])
        .await
        .unwrap();
}

#[tokio::test]
async fn save_settings_sends_null_for_no_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(query_param("action", "save_settings"))
        .and(body_json(json!({"duration": null})))
        .respond_with(ok(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .save_duration_policy(&DurationPolicy::NoExpiry)
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_user_passes_id_in_query() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(query_param("action", "delete_user"))
        .and(query_param("user_id", "9"))
        .respond_with(ok(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).delete_user(9).await.unwrap();
}

#[tokio::test]
async fn non_json_response_is_directory_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client(&server).list_users().await.unwrap_err();
    assert_eq!(err.reason(), Reason::DirectoryUnavailable);
}

#[tokio::test]
async fn success_false_is_directory_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "error": "Database connection failed"})),
        )
        .mount(&server)
        .await;

    let err = client(&server).list_users().await.unwrap_err();
    assert_eq!(err.reason(), Reason::DirectoryUnavailable);
    assert!(err.to_string().contains("Database connection failed"));
}

#[tokio::test]
async fn http_error_status_is_directory_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"success": false, "error": "User not found"})),
        )
        .mount(&server)
        .await;

    let err = client(&server).delete_user(1).await.unwrap_err();
    assert_eq!(err.reason(), Reason::DirectoryUnavailable);
}

#[tokio::test]
async fn unreachable_server_is_directory_unavailable() {
    let server = MockServer::start().await;
    let directory = client(&server);
    drop(server);

    let err = directory.list_users().await.unwrap_err();
    assert_eq!(err.reason(), Reason::DirectoryUnavailable);
}
