//! Integration tests for the crawler
//!
//! These tests use wiremock to serve listing pages and a scripted operator
//! to answer recovery prompts, and run full crawls end-to-end against JSON
//! files in a temporary directory.

use harrow::config::{load_config, Config};
use harrow::crawler::{Orchestrator, ScriptedOperator};
use harrow::output::RunStatus;
use harrow::record::SelectorRecordParser;
use harrow::storage::{JsonStore, Store};
use harrow::{HarrowError, Record};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const END_PAGE: &str = r#"<html><body>
    <div class="noResult">抱歉，没有找到符合条件的房源</div>
</body></html>"#;

const CHALLENGE_PAGE: &str = r#"<html><head><title>访问验证</title></head>
    <body><p>请完成滑动验证后继续访问</p></body></html>"#;

const AMBIGUOUS_PAGE: &str = "<html><body><p>Loading...</p></body></html>";

/// Writes a configuration file for the mock server and loads it
///
/// `crawler` is appended to the `[crawler]` section, `regions` to the end of
/// the file.
fn create_test_config(dir: &Path, uri: &str, crawler: &str, regions: &str) -> Config {
    let content = format!(
        r#"
[crawler]
delay-min-secs = 0.0
delay-max-secs = 0.0
cooldown-min-secs = 0.0
cooldown-max-secs = 0.0
{crawler}

[fetcher]
max-attempts = 2
backoff-base-ms = 0

[urls]
first-page = "{uri}/chengjiao-{{region}}-{{sub_area}}/"
next-page = "{uri}/chengjiao-{{region}}-{{sub_area}}/i3{{page}}/"
region-seed = "{uri}/chengjiao-{{region}}/"
sub-area-link-pattern = '/chengjiao-{{region}}-([a-z0-9]+)/?$'

[output]
snapshot-path = "{dir}/deals.json"
checkpoint-path = "{dir}/deals.checkpoint.json"
debug-dir = "{dir}/debug"
cache-dir = "{dir}"

[parser]
item-selector = "div.houseList dl"

[[parser.field]]
name = "house_id"
selector = "p.title a"
attribute = "href"
pattern = '/chengjiao/(\w+)_'
required = true

[[parser.field]]
name = "deal_date"
selector = "p.time"
kind = "date"

{regions}
"#,
        dir = dir.display()
    );

    let config_path = dir.join("harrow.toml");
    std::fs::write(&config_path, content).unwrap();
    load_config(&config_path).unwrap()
}

const TWO_SUB_AREAS: &str = r#"
[[region]]
name = "Pudong"
code = "a025"

[[region.sub-area]]
name = "Lujiazui"
code = "b01"

[[region.sub-area]]
name = "Huamu"
code = "b02"
"#;

const ONE_SUB_AREA: &str = r#"
[[region]]
name = "Pudong"
code = "a025"

[[region.sub-area]]
name = "Lujiazui"
code = "b01"
"#;

fn orchestrator(config: &Config, answers: &[&str]) -> Orchestrator {
    let parser = SelectorRecordParser::new(config.parser.as_ref().unwrap()).unwrap();
    Orchestrator::new(
        config.clone(),
        Box::new(parser),
        Box::new(ScriptedOperator::new(answers.iter().copied())),
    )
    .expect("Failed to create orchestrator")
}

/// A results page with one item per `(id, date)`
fn listing(items: &[(&str, &str)]) -> String {
    let rows: String = items
        .iter()
        .map(|(id, date)| {
            format!(
                r#"<dl><dd class="info">
                    <p class="title"><a href="/chengjiao/{id}_1.htm">房源 {id}</a></p>
                    <p class="time">{date}</p>
                </dd></dl>"#
            )
        })
        .collect();
    format!(r#"<html><body><div class="houseList">{rows}</div></body></html>"#)
}

async fn serve(server: &MockServer, page_path: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn stored(config: &Config) -> JsonStore {
    JsonStore::new(&config.output.snapshot_path, &config.output.checkpoint_path)
}

fn ids(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.get("house_id").and_then(Value::as_str).map(str::to_string))
        .collect()
}

fn archived(config: &Config, tag: &str) -> usize {
    match std::fs::read_dir(&config.output.debug_dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(tag))
            .count(),
        Err(_) => 0,
    }
}

#[tokio::test]
async fn test_full_crawl_until_end_signal() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), &server.uri(), "", TWO_SUB_AREAS);

    serve(&server, "/chengjiao-a025-b01/", listing(&[("1", "2024-01-02"), ("2", "2024-01-01")])).await;
    serve(&server, "/chengjiao-a025-b01/i32/", listing(&[("3", "2023-12-30"), ("4", "2023-12-29")])).await;
    serve(&server, "/chengjiao-a025-b01/i33/", END_PAGE.to_string()).await;
    serve(&server, "/chengjiao-a025-b02/", listing(&[("5", "2024-02-01")])).await;
    serve(&server, "/chengjiao-a025-b02/i32/", END_PAGE.to_string()).await;

    let mut crawler = orchestrator(&config, &[]);
    let report = crawler.run().await.expect("Crawl failed");

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.pages_fetched, 5);
    assert_eq!(report.records_added, 5);
    assert_eq!(report.sub_areas_done.get("no more results"), Some(&2));
    assert!(report.sub_area_failures.is_empty());

    let store = stored(&config);
    let records = store.load_snapshot().unwrap();
    assert_eq!(ids(&records), vec!["1", "2", "3", "4", "5"]);
    assert_eq!(records[0].get("region"), Some(&Value::from("Pudong")));
    assert_eq!(records[4].get("sub_area"), Some(&Value::from("Huamu")));

    let checkpoint = store.load_checkpoint().unwrap().unwrap();
    assert_eq!(checkpoint.position(), None);
    assert_eq!(checkpoint.per_region_counts.get("a025"), Some(&5));

    assert_eq!(archived(&config, "_end_"), 2);
}

#[tokio::test]
async fn test_same_record_on_two_pages_is_kept_once() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), &server.uri(), "", ONE_SUB_AREA);

    serve(&server, "/chengjiao-a025-b01/", listing(&[("1", "2024-01-02"), ("2", "2024-01-01")])).await;
    serve(&server, "/chengjiao-a025-b01/i32/", listing(&[("2", "2024-01-01"), ("3", "2023-12-31")])).await;
    serve(&server, "/chengjiao-a025-b01/i33/", END_PAGE.to_string()).await;

    let report = orchestrator(&config, &[]).run().await.unwrap();

    assert_eq!(report.records_added, 3);
    let records = stored(&config).load_snapshot().unwrap();
    assert_eq!(ids(&records), vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_resume_after_abort_adds_no_duplicates() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), &server.uri(), "", ONE_SUB_AREA);

    // First run: page 2 is a challenge and the operator gives up
    serve(&server, "/chengjiao-a025-b01/", listing(&[("1", "2024-01-02"), ("2", "2024-01-01")])).await;
    serve(&server, "/chengjiao-a025-b01/i32/", CHALLENGE_PAGE.to_string()).await;

    let first = orchestrator(&config, &[""]).run().await.unwrap();
    assert_eq!(first.status, RunStatus::Aborted);
    assert_eq!(first.records_added, 2);

    let store = stored(&config);
    assert_eq!(store.load_snapshot().unwrap().len(), 2);
    let position = store.load_checkpoint().unwrap().unwrap().position().unwrap();
    assert_eq!(position.region_code, "a025");
    assert_eq!(position.sub_area_index, 0);
    assert_eq!(position.next_page, Some(2));
    assert_eq!(archived(&config, "_challenge_"), 1);

    // Second run resumes at page 2, which now overlaps page 1
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/chengjiao-a025-b01/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[])))
        .expect(0)
        .mount(&server)
        .await;
    serve(&server, "/chengjiao-a025-b01/i32/", listing(&[("2", "2024-01-01"), ("3", "2023-12-31")])).await;
    serve(&server, "/chengjiao-a025-b01/i33/", END_PAGE.to_string()).await;

    let second = orchestrator(&config, &[]).run().await.unwrap();
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.records_added, 1);

    let records = store.load_snapshot().unwrap();
    let record_ids = ids(&records);
    let distinct: HashSet<_> = record_ids.iter().collect();
    assert_eq!(distinct.len(), record_ids.len());
    assert_eq!(record_ids, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_date_window_keeps_middle_record_and_stops() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let crawler = r#"
min-date = "2023-01-01"
max-date = "2025-12-31"
"#;
    let config = create_test_config(dir.path(), &server.uri(), crawler, ONE_SUB_AREA);

    serve(
        &server,
        "/chengjiao-a025-b01/",
        listing(&[("new", "2026-01-01"), ("mid", "2023-06-01"), ("old", "2022-12-31")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/chengjiao-a025-b01/i32/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(END_PAGE))
        .expect(0)
        .mount(&server)
        .await;

    let report = orchestrator(&config, &[]).run().await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.sub_areas_done.get("date cutoff reached"), Some(&1));
    let records = stored(&config).load_snapshot().unwrap();
    assert_eq!(ids(&records), vec!["mid"]);
}

#[tokio::test]
async fn test_challenge_recovered_with_operator_cookie() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), &server.uri(), "", ONE_SUB_AREA);

    // Content only once the fresh session cookie is sent
    Mock::given(method("GET"))
        .and(path("/chengjiao-a025-b01/"))
        .and(header("cookie", "sid=fresh; uid=42"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[("1", "2024-01-01")])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/chengjiao-a025-b01/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CHALLENGE_PAGE))
        .expect(1)
        .mount(&server)
        .await;
    serve(&server, "/chengjiao-a025-b01/i32/", END_PAGE.to_string()).await;

    // The first answer is not a cookie string and is asked again
    let report = orchestrator(&config, &["let me in", "sid=fresh; uid=42"])
        .run()
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.records_added, 1);
    assert_eq!(archived(&config, "_challenge_"), 1);
}

#[tokio::test]
async fn test_ambiguous_page_confirmed_as_end() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), &server.uri(), "", ONE_SUB_AREA);

    serve(&server, "/chengjiao-a025-b01/", listing(&[("1", "2024-01-01")])).await;
    serve(&server, "/chengjiao-a025-b01/i32/", AMBIGUOUS_PAGE.to_string()).await;
    Mock::given(method("GET"))
        .and(path("/chengjiao-a025-b01/i33/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(END_PAGE))
        .expect(0)
        .mount(&server)
        .await;

    let report = orchestrator(&config, &["end"]).run().await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.sub_areas_done.get("end confirmed by operator"), Some(&1));
    assert_eq!(archived(&config, "_ambiguous_"), 1);
}

#[tokio::test]
async fn test_empty_pages_finish_sub_area() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), &server.uri(), "", ONE_SUB_AREA);

    Mock::given(method("GET"))
        .and(path_regex(r"^/chengjiao-a025-b01/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[])))
        .expect(12)
        .mount(&server)
        .await;

    let report = orchestrator(&config, &[]).run().await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.pages_fetched, 12);
    assert_eq!(report.sub_areas_done.get("empty-page threshold reached"), Some(&1));
}

#[tokio::test]
async fn test_fatal_status_ends_only_its_sub_area() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), &server.uri(), "", TWO_SUB_AREAS);

    Mock::given(method("GET"))
        .and(path("/chengjiao-a025-b01/"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .expect(1)
        .mount(&server)
        .await;
    serve(&server, "/chengjiao-a025-b02/", listing(&[("7", "2024-05-01")])).await;
    serve(&server, "/chengjiao-a025-b02/i32/", END_PAGE.to_string()).await;

    let report = orchestrator(&config, &[]).run().await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.sub_area_failures.len(), 1);
    assert_eq!(report.sub_area_failures[0].target, "a025-b01");
    assert_eq!(report.sub_area_failures[0].page, Some(1));
    assert_eq!(report.sub_areas_done.get("fetch failed"), Some(&1));
    assert_eq!(archived(&config, "_http_error_"), 1);

    let records = stored(&config).load_snapshot().unwrap();
    assert_eq!(ids(&records), vec!["7"]);
}

#[tokio::test]
async fn test_discovered_sub_areas_are_cached() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let regions = r#"
[[region]]
name = "Pudong"
code = "a025"
"#;
    let config = create_test_config(dir.path(), &server.uri(), "", regions);

    Mock::given(method("GET"))
        .and(path("/chengjiao-a025/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
                <a href="/chengjiao-a025-b01/">陆家嘴</a>
                <a href="/chengjiao-a025-b01/">陆家嘴</a>
                <a href="/chengjiao-a025-b02/">花木</a>
                <a href="/chengjiao-a019-b09/">徐家汇</a>
            </body></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    serve(&server, "/chengjiao-a025-b01/", END_PAGE.to_string()).await;
    serve(&server, "/chengjiao-a025-b02/", END_PAGE.to_string()).await;

    let first = orchestrator(&config, &[]).run().await.unwrap();
    assert_eq!(first.sub_areas_done.get("no more results"), Some(&2));

    let cache = dir.path().join("sub_areas_a025.json");
    let cached: Vec<Value> =
        serde_json::from_str(&std::fs::read_to_string(&cache).unwrap()).unwrap();
    assert_eq!(cached.len(), 2);
    assert_eq!(cached[0]["code"], "b01");
    assert_eq!(cached[0]["name"], "陆家嘴");

    // The second run reads the cache instead of the seed page
    let second = orchestrator(&config, &[]).run().await.unwrap();
    assert_eq!(second.sub_areas_done.get("no more results"), Some(&2));
}

#[tokio::test]
async fn test_corrupt_snapshot_refuses_to_start() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), &server.uri(), "", ONE_SUB_AREA);
    std::fs::write(&config.output.snapshot_path, "[{\"house_id\": ").unwrap();

    let parser = SelectorRecordParser::new(config.parser.as_ref().unwrap()).unwrap();
    let result = Orchestrator::new(
        config.clone(),
        Box::new(parser),
        Box::new(ScriptedOperator::default()),
    );

    assert!(matches!(result, Err(HarrowError::Storage(_))));
    // The bad file is left untouched for the operator to inspect
    assert_eq!(
        std::fs::read_to_string(&config.output.snapshot_path).unwrap(),
        "[{\"house_id\": "
    );
}
