//! Contract Test: Cloudflare API Translation
//!
//! Constraints verified:
//! - Paginated record listings are fully read and decoded
//! - Each write primitive is exactly one request of the right shape
//! - Dry-run mode sends no writes
//! - HTTP failures surface as the matching core error kinds
//!
//! Runs against a local mock of the v4 API.

use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zonesync_core::Error;
use zonesync_core::config::{EngineConfig, ZoneConfig};
use zonesync_core::engine::{EngineEvent, Mode, ReconcileEngine, ZoneOutcome};
use zonesync_core::record::{Record, RecordData, RecordType};
use zonesync_core::traits::DnsProvider;
use zonesync_provider_cloudflare::{CloudflareProvider, META_PROXY};

const ZONE_ID: &str = "023e105f4ecef8ad9ca31a8372d0c353";

fn ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "errors": [],
        "messages": [],
        "result": result,
    }))
}

fn page(result: Value, page: u32, total_pages: u32) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "errors": [],
        "result": result,
        "result_info": { "page": page, "per_page": 100, "total_pages": total_pages },
    }))
}

async fn server_with_zone() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(query_param("name", "example.com"))
        .respond_with(ok(json!([{ "id": ZONE_ID, "name": "example.com" }])))
        .mount(&server)
        .await;
    server
}

fn provider(server: &MockServer) -> CloudflareProvider {
    CloudflareProvider::new("test-token")
        .unwrap()
        .with_base_url(server.uri())
}

fn engine(cf: CloudflareProvider) -> (ReconcileEngine, mpsc::Receiver<EngineEvent>) {
    let mut providers: BTreeMap<String, Arc<dyn DnsProvider>> = BTreeMap::new();
    providers.insert("cf".to_string(), Arc::new(cf));
    ReconcileEngine::new(providers, EngineConfig::default())
}

fn records_path() -> String {
    format!("/zones/{}/dns_records", ZONE_ID)
}

async fn writes(server: &MockServer) -> Vec<(String, String, Option<Value>)> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() != "GET")
        .map(|r| {
            let body = serde_json::from_slice(&r.body).ok();
            (r.method.to_string(), r.url.path().to_string(), body)
        })
        .collect()
}

#[tokio::test]
async fn listing_follows_pagination() {
    let server = server_with_zone().await;
    Mock::given(method("GET"))
        .and(path(records_path()))
        .and(query_param("page", "1"))
        .respond_with(page(
            json!([{
                "id": "rec-a", "type": "A", "name": "www.example.com",
                "content": "192.0.2.1", "ttl": 1, "proxied": true, "proxiable": true
            }]),
            1,
            2,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(records_path()))
        .and(query_param("page", "2"))
        .respond_with(page(
            json!([{
                "id": "rec-mx", "type": "MX", "name": "example.com",
                "content": "mail.example.com", "priority": 10, "ttl": 3600
            }]),
            2,
            2,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let records = provider(&server).fetch_observed("example.com").await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].label, "www");
    assert_eq!(records[0].metadata[META_PROXY], "on");
    assert_eq!(
        records[1].data,
        RecordData::Mx {
            preference: 10,
            exchange: "mail.example.com.".to_string()
        }
    );
}

#[tokio::test]
async fn create_posts_one_record() {
    let server = server_with_zone().await;
    Mock::given(method("POST"))
        .and(path(records_path()))
        .respond_with(ok(json!({ "id": "new" })))
        .expect(1)
        .mount(&server)
        .await;

    let record = Record::parse("www", RecordType::A, "192.0.2.7")
        .unwrap()
        .with_ttl(1)
        .with_metadata(META_PROXY, "on");
    provider(&server)
        .create_record("example.com", &record)
        .await
        .unwrap();

    let sent = writes(&server).await;
    assert_eq!(sent.len(), 1);
    let body = sent[0].2.clone().unwrap();
    assert_eq!(body["type"], "A");
    assert_eq!(body["name"], "www.example.com");
    assert_eq!(body["content"], "192.0.2.7");
    assert_eq!(body["proxied"], true);
}

#[tokio::test]
async fn update_and_delete_use_the_record_id() {
    let server = server_with_zone().await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/rec-1", records_path())))
        .respond_with(ok(json!({ "id": "rec-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/rec-2", records_path())))
        .respond_with(ok(json!({ "id": "rec-2" })))
        .expect(1)
        .mount(&server)
        .await;

    let cf = provider(&server);
    let existing = Record::parse("api", RecordType::A, "192.0.2.1")
        .unwrap()
        .with_provider_ref("rec-1", json!({ "proxiable": true }));
    let desired = Record::parse("api", RecordType::A, "192.0.2.2")
        .unwrap()
        .with_ttl(3600);
    cf.update_record("example.com", &existing, &desired)
        .await
        .unwrap();

    let gone = Record::parse("old", RecordType::A, "192.0.2.9")
        .unwrap()
        .with_provider_ref("rec-2", json!({}));
    cf.delete_record("example.com", &gone).await.unwrap();

    let sent = writes(&server).await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0, "PUT");
    assert_eq!(sent[0].2.as_ref().unwrap()["ttl"], 3600);
    assert_eq!(sent[1].0, "DELETE");
}

#[tokio::test]
async fn dry_run_sends_no_writes() {
    let server = server_with_zone().await;
    Mock::given(method("GET"))
        .and(path(records_path()))
        .respond_with(page(json!([]), 1, 1))
        .mount(&server)
        .await;

    let cf = provider(&server).with_dry_run(true);
    assert!(cf.is_dry_run());
    let (engine, _rx) = engine(cf);
    let zone = ZoneConfig::new("example.com", "cf")
        .with_record(Record::parse("www", RecordType::A, "192.0.2.1").unwrap());

    let outcome = engine.reconcile_zone(&zone, Mode::Push).await;
    let ZoneOutcome::Applied { report, .. } = outcome else {
        panic!("expected an applied outcome");
    };
    assert_eq!(report.succeeded(), 1);
    assert!(writes(&server).await.is_empty());
}

#[tokio::test]
async fn proxied_record_is_in_sync_after_preprocess() {
    let server = server_with_zone().await;
    Mock::given(method("GET"))
        .and(path(records_path()))
        .respond_with(page(
            json!([{
                "id": "rec-a", "type": "A", "name": "www.example.com",
                "content": "192.0.2.1", "ttl": 1, "proxied": true, "proxiable": true
            }]),
            1,
            1,
        ))
        .mount(&server)
        .await;

    let (engine, _rx) = engine(provider(&server));
    let zone = ZoneConfig::new("example.com", "cf").with_record(
        Record::parse("www", RecordType::A, "192.0.2.1")
            .unwrap()
            .with_ttl(3600)
            .with_metadata(META_PROXY, "on"),
    );

    let plan = engine.plan(&zone).await.unwrap();
    assert!(plan.is_empty(), "unexpected corrections: {:?}", plan.corrections);
}

#[tokio::test]
async fn proxy_change_is_a_modify() {
    let server = server_with_zone().await;
    Mock::given(method("GET"))
        .and(path(records_path()))
        .respond_with(page(
            json!([{
                "id": "rec-a", "type": "A", "name": "www.example.com",
                "content": "192.0.2.1", "ttl": 1, "proxied": true, "proxiable": true
            }]),
            1,
            1,
        ))
        .mount(&server)
        .await;

    let (engine, _rx) = engine(provider(&server));
    let zone = ZoneConfig::new("example.com", "cf")
        .with_record(Record::parse("www", RecordType::A, "192.0.2.1").unwrap());

    let plan = engine.plan(&zone).await.unwrap();
    assert_eq!(plan.changes.modify.len(), 1);
    assert!(plan.corrections[0].message.contains("proxy=false"));
}

fn flattened_apex(alias_target: &str) -> Value {
    json!([
        {
            "id": "rec-alias", "type": "CNAME", "name": "example.com",
            "content": alias_target, "ttl": 1, "proxied": false, "proxiable": true
        },
        {
            "id": "rec-mx", "type": "MX", "name": "example.com",
            "content": "mail.example.com", "priority": 10, "ttl": 3600
        },
        {
            "id": "rec-txt", "type": "TXT", "name": "example.com",
            "content": "v=spf1 -all", "ttl": 3600
        }
    ])
}

fn apex_zone() -> ZoneConfig {
    ZoneConfig::new("example.com", "cf")
        .with_record(
            Record::parse("@", RecordType::Alias, "lb.example.net.")
                .unwrap()
                .with_ttl(300),
        )
        .with_record(
            Record::parse("@", RecordType::Mx, "10 mail.example.com.")
                .unwrap()
                .with_ttl(3600),
        )
        .with_record(
            Record::parse("@", RecordType::Txt, "v=spf1 -all")
                .unwrap()
                .with_ttl(3600),
        )
}

#[tokio::test]
async fn apex_alias_next_to_mx_and_txt_is_in_sync() {
    let server = server_with_zone().await;
    Mock::given(method("GET"))
        .and(path(records_path()))
        .respond_with(page(flattened_apex("lb.example.net"), 1, 1))
        .mount(&server)
        .await;

    let (engine, _rx) = engine(provider(&server));
    let plan = engine.plan(&apex_zone()).await.unwrap();
    assert!(plan.is_empty(), "unexpected corrections: {:?}", plan.corrections);
}

#[tokio::test]
async fn apex_alias_change_is_written_as_cname() {
    let server = server_with_zone().await;
    Mock::given(method("GET"))
        .and(path(records_path()))
        .respond_with(page(flattened_apex("old-lb.example.net"), 1, 1))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/rec-alias", records_path())))
        .respond_with(ok(json!({ "id": "rec-alias" })))
        .expect(1)
        .mount(&server)
        .await;

    let (engine, _rx) = engine(provider(&server));
    let outcome = engine.reconcile_zone(&apex_zone(), Mode::Push).await;
    let ZoneOutcome::Applied { plan, report } = outcome else {
        panic!("expected an applied outcome");
    };
    assert_eq!(plan.changes.modify.len(), 1);
    assert!(plan.changes.create.is_empty() && plan.changes.delete.is_empty());
    assert!(report.is_success());

    let sent = writes(&server).await;
    assert_eq!(sent.len(), 1);
    let body = sent[0].2.clone().unwrap();
    assert_eq!(body["type"], "CNAME");
    assert_eq!(body["name"], "example.com");
    assert_eq!(body["content"], "lb.example.net");
}

#[tokio::test]
async fn http_errors_map_to_error_kinds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let err = provider(&server)
        .fetch_observed("example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authentication(_)));

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ok(json!([])))
        .mount(&server)
        .await;
    let err = provider(&server)
        .fetch_observed("example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn api_level_failure_is_a_provider_error() {
    let server = server_with_zone().await;
    Mock::given(method("POST"))
        .and(path(records_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "errors": [{ "code": 81057, "message": "Record already exists." }],
            "result": null,
        })))
        .mount(&server)
        .await;

    let record = Record::parse("www", RecordType::A, "192.0.2.7").unwrap();
    let err = provider(&server)
        .create_record("example.com", &record)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Record already exists."));
}

#[tokio::test]
async fn universal_ssl_is_a_feature() {
    let server = server_with_zone().await;
    let settings = format!("/zones/{}/ssl/universal/settings", ZONE_ID);
    Mock::given(method("GET"))
        .and(path(settings.clone()))
        .respond_with(ok(json!({ "enabled": true })))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(settings))
        .respond_with(ok(json!({ "enabled": false })))
        .expect(1)
        .mount(&server)
        .await;

    let cf = provider(&server);
    let features = cf.fetch_features("example.com").await.unwrap();
    assert_eq!(features["universal_ssl"], true);

    cf.set_feature("example.com", "universal_ssl", false)
        .await
        .unwrap();
    let sent = writes(&server).await;
    assert_eq!(sent[0].2.as_ref().unwrap()["enabled"], false);

    assert!(matches!(
        cf.set_feature("example.com", "always_https", true).await,
        Err(Error::Unsupported(_))
    ));
}
