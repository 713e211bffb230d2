//! Integration tests for the collect command against a mocked GitHub API

use chrono::{SecondsFormat, TimeDelta, Utc};
use criticality_lib::commands::TestHost;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn days_ago(days: i64) -> String {
    (Utc::now() - TimeDelta::days(days)).to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn write_config(dir: &Path, server: &MockServer) -> String {
    let config = format!(
        r#"
workers = 2
github_api_url = "{uri}"
github_graphql_url = "{uri}/graphql"
max_attempts = 1
initial_delay_secs = 0

[sources]
github_repo = true
github_issues = true
github_mentions = false
depsdev = false
"#,
        uri = server.uri()
    );

    let path = dir.join("criticality.toml");
    fs::write(&path, config).unwrap();
    path.to_str().unwrap().to_string()
}

fn write_input(dir: &Path, urls: &[&str]) -> String {
    let path = dir.join("repos.txt");
    fs::write(&path, urls.join("\n")).unwrap();
    path.to_str().unwrap().to_string()
}

async fn mount_repository(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("licenseInfo"))
        .and(body_partial_json(json!({ "variables": { "repositoryOwner": "o", "repositoryName": "r" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "repository": {
                "name": "r",
                "owner": { "login": "o" },
                "licenseInfo": { "name": "MIT License" },
                "stargazerCount": 50,
                "url": "https://github.com/o/r",
                "createdAt": "2015-01-01T00:00:00Z",
                "updatedAt": days_ago(1),
                "primaryLanguage": { "name": "Rust" },
                "defaultBranchRef": { "target": {
                    "authoredDate": days_ago(2),
                    "recentCommits": { "totalCount": 104 }
                }},
                "tags": { "totalCount": 3 }
            }}
        })))
        .mount(server)
        .await;

    // The oldest commit predates the repository record.
    Mock::given(method("GET"))
        .and(path("/repos/o/r/commits"))
        .and(query_param("per_page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "commit": { "committer": { "date": "2014-06-01T00:00:00Z" } } }
        ])))
        .mount(server)
        .await;

    let uri = server.uri();
    Mock::given(method("GET"))
        .and(path("/repos/o/r/contributors"))
        .and(query_param("anon", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "login": "alice" }])).insert_header(
            "link",
            format!(
                r#"<{uri}/repos/o/r/contributors?per_page=1&anon=1&page=2>; rel="next", <{uri}/repos/o/r/contributors?per_page=1&anon=1&page=42>; rel="last""#
            )
            .as_str(),
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/o/r/contributors"))
        .and(query_param("per_page", "15"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "login": "alice" },
            { "login": "bob" },
            { "login": "dependabot[bot]" }
        ])))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("user(login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "u0": { "company": "@Acme Inc." }, "u1": { "company": "acme" } }
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("releases(orderBy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "repository": { "releases": {
                "nodes": [{ "createdAt": days_ago(10) }, { "createdAt": days_ago(400) }],
                "pageInfo": { "endCursor": "c1", "hasNextPage": true },
                "totalCount": 30
            }}}
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues"))
        .and(query_param("state", "closed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "number": 1 }])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues"))
        .and(query_param("state", "all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "number": 1 }])).insert_header(
            "link",
            format!(r#"<{uri}/repos/o/r/issues?state=all&page=2>; rel="next", <{uri}/repos/o/r/issues?state=all&page=8>; rel="last""#)
                .as_str(),
        ))
        .mount(server)
        .await;

    // Too many comments to list.
    Mock::given(method("GET"))
        .and(path("/repos/o/r/issues/comments"))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;
}

async fn mount_missing_repository(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("licenseInfo"))
        .and(body_partial_json(json!({ "variables": { "repositoryName": "missing" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "repository": null },
            "errors": [{ "type": "NOT_FOUND", "message": "Could not resolve to a Repository with the name 'o/missing'." }]
        })))
        .mount(server)
        .await;
}

async fn mount_broken_repository(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("licenseInfo"))
        .and(body_partial_json(json!({ "variables": { "repositoryName": "broken" } })))
        .respond_with(ResponseTemplate::new(502))
        .mount(server)
        .await;
}

fn read_records(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

async fn collect(dir: &TempDir, server: &MockServer, urls: &[&str], extra: &[&str]) -> (TestHost, criticality_lib::Result<()>) {
    let config = write_config(dir.path(), server);
    let input = write_input(dir.path(), urls);
    let output = dir.path().join("signals.json");

    let mut args = vec![
        "criticality".to_string(),
        "collect".to_string(),
        input,
        output.to_str().unwrap().to_string(),
        "--config".to_string(),
        config,
        "--github-token".to_string(),
        "test-token".to_string(),
        "--depsdev-disable".to_string(),
        "--format".to_string(),
        "json".to_string(),
        "--log-level".to_string(),
        "none".to_string(),
    ];
    args.extend(extra.iter().map(ToString::to_string));

    let mut host = TestHost::new();
    let result = criticality_lib::run(&mut host, args).await;
    (host, result)
}

#[tokio::test]
async fn test_collect_writes_github_signals() {
    let server = MockServer::start().await;
    mount_repository(&server).await;
    mount_missing_repository(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let (host, result) = collect(
        &dir,
        &server,
        &[
            "https://github.com/o/r",
            "",
            "https://github.com/o/missing",
            "https://gitlab.com/o/r",
        ],
        &[],
    )
    .await;

    result.unwrap();
    assert_eq!(host.exit_code, None);

    let records = read_records(&dir.path().join("signals.json"));
    assert_eq!(records.len(), 1, "{records:?}");
    let record = &records[0];

    assert_eq!(record["repo"]["url"], "https://github.com/o/r");
    assert_eq!(record["repo"]["language"], "Rust");
    assert_eq!(record["repo"]["license"], "MIT License");
    assert_eq!(record["repo"]["star_count"], 50);
    assert_eq!(record["repo"]["created_at"], "2014-06-01T00:00:00Z");

    assert_eq!(record["legacy"]["contributor_count"], 42);
    assert_eq!(record["legacy"]["org_count"], 1);
    assert_eq!(record["legacy"]["commit_frequency"], 2.0);
    assert_eq!(record["legacy"]["recent_release_count"], 1);
    assert_eq!(record["legacy"]["closed_issues_count"], 1);
    assert_eq!(record["legacy"]["updated_issues_count"], 8);
    assert_eq!(record["legacy"]["issue_comment_frequency"], 2.0);

    let score: f64 = record["default_score"].as_str().unwrap().parse().unwrap();
    assert!(score > 0.0 && score < 1.0, "{score}");
}

#[tokio::test]
async fn test_collect_failure_sets_exit_code() {
    let server = MockServer::start().await;
    mount_repository(&server).await;
    mount_broken_repository(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let (host, result) = collect(
        &dir,
        &server,
        &["https://github.com/o/broken", "https://github.com/o/r", "not a url"],
        &["--scoring-disable"],
    )
    .await;

    result.unwrap();
    assert_eq!(host.exit_code, Some(1));

    let records = read_records(&dir.path().join("signals.json"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["repo"]["url"], "https://github.com/o/r");
    assert!(records[0].get("default_score").is_none());
}

#[tokio::test]
async fn test_collect_refuses_to_overwrite_without_force() {
    let server = MockServer::start().await;
    mount_repository(&server).await;

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("signals.json"), "previous run\n").unwrap();

    let (_, result) = collect(&dir, &server, &["https://github.com/o/r"], &[]).await;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("--force"), "{err}");
    assert_eq!(fs::read_to_string(dir.path().join("signals.json")).unwrap(), "previous run\n");

    let (host, result) = collect(&dir, &server, &["https://github.com/o/r"], &["--force"]).await;
    result.unwrap();
    assert_eq!(host.exit_code, None);
    assert_eq!(read_records(&dir.path().join("signals.json")).len(), 1);
}

async fn batch(dir: &TempDir, server: &MockServer, urls: &[&str], extra: &[&str]) -> (TestHost, criticality_lib::Result<()>) {
    let config = write_config(dir.path(), server);
    let input = write_input(dir.path(), urls);
    let output_dir = dir.path().join("shards");

    let mut args: Vec<String> = [
        "criticality",
        "batch",
        input.as_str(),
        output_dir.to_str().unwrap(),
        "--config",
        config.as_str(),
        "--github-token",
        "test-token",
        "--depsdev-disable",
        "--shard-size",
        "2",
        "--log-level",
        "none",
    ]
    .iter()
    .map(ToString::to_string)
    .collect();
    args.extend(extra.iter().map(ToString::to_string));

    let mut host = TestHost::new();
    let result = criticality_lib::run(&mut host, args).await;
    (host, result)
}

#[tokio::test]
async fn test_batch_writes_one_file_per_shard() {
    let server = MockServer::start().await;
    mount_repository(&server).await;
    mount_missing_repository(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let (host, result) = batch(
        &dir,
        &server,
        &["https://github.com/o/r", "https://github.com/o/missing", "https://github.com/o/r.git"],
        &[],
    )
    .await;

    result.unwrap();
    assert_eq!(host.exit_code, None);
    let printed = String::from_utf8(host.output_buf).unwrap();
    assert!(printed.contains("Processed 3 repositories in 2 of 2 shards"), "{printed}");

    let shards = dir.path().join("shards");
    for shard in ["shard-000000.csv", "shard-000001.csv"] {
        let text = fs::read_to_string(shards.join(shard)).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("repo.url,"), "{header}");
        assert!(header.ends_with(",default_score"), "{header}");
        assert_eq!(lines.filter(|l| l.starts_with("https://github.com/o/r,")).count(), 1, "{text}");
    }

    let completion: Value = serde_json::from_str(&fs::read_to_string(shards.join(".complete")).unwrap()).unwrap();
    assert_eq!(completion["shard_count"], 2);
    assert!(!shards.join(".run_state.json").exists());
}

#[tokio::test]
async fn test_batch_skips_shards_that_keep_failing() {
    let server = MockServer::start().await;
    mount_repository(&server).await;
    mount_broken_repository(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let (host, result) = batch(
        &dir,
        &server,
        &["https://github.com/o/broken", "https://github.com/o/r", "https://github.com/o/r"],
        &["--shard-attempts", "2", "--scoring-disable"],
    )
    .await;

    result.unwrap();
    assert_eq!(host.exit_code, Some(1));

    let shards = dir.path().join("shards");
    assert!(!shards.join("shard-000000.csv").exists());
    assert!(!shards.join("shard-000000.csv.partial").exists());
    assert!(shards.join("shard-000001.csv").exists());
    assert!(shards.join(".complete").exists());

    // Two attempts at the broken shard.
    let requests = server.received_requests().await.unwrap();
    let broken = requests
        .iter()
        .filter(|r| String::from_utf8_lossy(&r.body).contains("\"repositoryName\":\"broken\""))
        .count();
    assert_eq!(broken, 2);
}
