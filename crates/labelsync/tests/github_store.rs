use std::time::Duration;

use labelsync::store::{GitHubStore, LabelStore, StoreError};
use labelsync::{Label, RepoRef};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store(server: &MockServer) -> GitHubStore {
    GitHubStore::new(reqwest::Client::new(), server.uri(), "ghs_test")
}

fn api() -> RepoRef {
    RepoRef::new("acme", "api")
}

fn label_json(name: &str) -> Value {
    json!({ "name": name, "color": "ededed", "description": null })
}

#[tokio::test]
async fn test_list_labels_walks_every_page() {
    let server = MockServer::start().await;
    let first_page: Vec<Value> = (0..100).map(|i| label_json(&format!("l{i}"))).collect();
    Mock::given(method("GET"))
        .and(path("/repos/acme/api/labels"))
        .and(query_param("per_page", "100"))
        .and(query_param("page", "1"))
        .and(header("authorization", "Bearer ghs_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(first_page))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/api/labels"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![label_json("last")]))
        .expect(1)
        .mount(&server)
        .await;

    let labels = store(&server).list_labels(&api()).await.unwrap();

    assert_eq!(labels.len(), 101);
    assert_eq!(labels[0], Label::new("l0", "ededed"));
    assert_eq!(labels[100].name, "last");
}

#[tokio::test]
async fn test_update_label_renames_through_encoded_path() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/repos/acme/api/labels/kind%2Fbug"))
        .and(body_json(json!({
            "new_name": "bug",
            "color": "d73a4a",
            "description": "Something broke"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(label_json("bug")))
        .expect(1)
        .mount(&server)
        .await;

    let target = Label::new("bug", "#D73A4A").with_description("Something broke");
    store(&server)
        .update_label(&api(), "kind/bug", &target)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_label_sends_normalized_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/api/labels"))
        .and(body_json(json!({ "name": "triage", "color": "fbca04", "description": "" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(label_json("triage")))
        .expect(1)
        .mount(&server)
        .await;

    store(&server)
        .create_label(&api(), &Label::new("triage", "FBCA04"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_exhausted_rate_limit_maps_to_rate_limited() {
    let server = MockServer::start().await;
    let reset = chrono::Utc::now().timestamp() + 120;
    Mock::given(method("GET"))
        .and(path("/repos/acme/api/labels"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", reset.to_string().as_str())
                .set_body_json(json!({ "message": "API rate limit exceeded" })),
        )
        .mount(&server)
        .await;

    let err = store(&server).list_labels(&api()).await.unwrap_err();

    match err {
        StoreError::RateLimited { reset_in } => assert!(reset_in <= Duration::from_secs(120)),
        other => panic!("expected rate limit error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_api_error_carries_github_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/api/labels"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "message": "Validation Failed" })),
        )
        .mount(&server)
        .await;

    let err = store(&server)
        .create_label(&api(), &Label::new("bug", "d73a4a"))
        .await
        .unwrap_err();

    match err {
        StoreError::Api { status, message } => {
            assert_eq!(status, 422);
            assert_eq!(message, "Validation Failed");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_file_and_label_are_not_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/acme-labelsync/contents/labelsync.yml"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/repos/acme/api/labels/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
        .mount(&server)
        .await;

    let github = store(&server);
    let config_repo = RepoRef::new("acme", "acme-labelsync");

    assert_eq!(
        github.fetch_file(&config_repo, "labelsync.yml", None).await.unwrap(),
        None
    );
    github.delete_label(&api(), "gone").await.unwrap();
}

#[tokio::test]
async fn test_fetch_file_at_ref_returns_raw_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/acme-labelsync/contents/labelsync.yml"))
        .and(query_param("ref", "abc123"))
        .and(header("accept", "application/vnd.github.raw"))
        .respond_with(ResponseTemplate::new(200).set_body_string("repos: {}\n"))
        .expect(1)
        .mount(&server)
        .await;

    let content = store(&server)
        .fetch_file(
            &RepoRef::new("acme", "acme-labelsync"),
            "labelsync.yml",
            Some("abc123"),
        )
        .await
        .unwrap();

    assert_eq!(content.as_deref(), Some("repos: {}\n"));
}

#[tokio::test]
async fn test_open_or_update_issue_refreshes_matching_title() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/acme-labelsync/issues"))
        .and(query_param("state", "open"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "number": 3, "title": "Something else" },
            { "number": 4, "title": "Configuration error" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/repos/acme/acme-labelsync/issues/4"))
        .and(body_json(json!({ "body": "new body" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "number": 4, "title": "Configuration error" })))
        .expect(1)
        .mount(&server)
        .await;

    let number = store(&server)
        .open_or_update_issue(
            &RepoRef::new("acme", "acme-labelsync"),
            "Configuration error",
            "new body",
        )
        .await
        .unwrap();

    assert_eq!(number, 4);
}

#[tokio::test]
async fn test_open_or_update_issue_opens_when_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/acme-labelsync/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/acme-labelsync/issues"))
        .and(body_json(json!({ "title": "Insufficient repository access", "body": "grant" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "number": 9, "title": "Insufficient repository access" })))
        .expect(1)
        .mount(&server)
        .await;

    let number = store(&server)
        .open_or_update_issue(
            &RepoRef::new("acme", "acme-labelsync"),
            "Insufficient repository access",
            "grant",
        )
        .await
        .unwrap();

    assert_eq!(number, 9);
}

#[tokio::test]
async fn test_installation_repositories_are_unwrapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/installation/repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 2,
            "repositories": [
                { "name": "api", "owner": { "login": "acme" } },
                { "name": "web", "owner": { "login": "acme" } }
            ]
        })))
        .mount(&server)
        .await;

    let repos = store(&server).list_installation_repositories().await.unwrap();

    assert_eq!(repos, vec![RepoRef::new("acme", "api"), RepoRef::new("acme", "web")]);
}
