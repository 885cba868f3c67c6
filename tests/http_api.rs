use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use chrono::{NaiveDate, TimeZone};
use chrono_tz::CET;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use freerooms::cache::{AvailabilityCache, DEFAULT_TTL, SystemClock};
use freerooms::catalog::RoomPolicy;
use freerooms::engine::Engine;
use freerooms::fetcher::{EventFetcher, FetchError, SiriusClient, SiriusConfig};
use freerooms::http;
use freerooms::model::{OccupancyRecord, RoomReport};

// ── Test infrastructure ──────────────────────────────────────

struct FixedFetcher {
    records: Vec<OccupancyRecord>,
    fail: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl EventFetcher for FixedFetcher {
    async fn fetch_events(&self, _date: NaiveDate) -> Result<Vec<OccupancyRecord>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FetchError::Transport("connection refused".into()));
        }
        Ok(self.records.clone())
    }
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn start_test_server(fetcher: Arc<dyn EventFetcher>) -> SocketAddr {
    let cache = AvailabilityCache::new(DEFAULT_TTL, Arc::new(SystemClock));
    let engine = Arc::new(Engine::new(Arc::new(RoomPolicy::default()), fetcher, cache));
    serve(http::router(engine)).await
}

fn fixed(records: Vec<OccupancyRecord>) -> Arc<FixedFetcher> {
    Arc::new(FixedFetcher {
        records,
        fail: false,
        calls: AtomicUsize::new(0),
    })
}

fn record(day: u32, from: u32, to: u32, room: &str) -> OccupancyRecord {
    OccupancyRecord::new(
        CET.with_ymd_and_hms(2024, 3, day, from, 0, 0).unwrap(),
        CET.with_ymd_and_hms(2024, 3, day, to, 0, 0).unwrap(),
        room,
    )
}

async fn get_rooms(addr: SocketAddr, query: &str) -> (StatusCode, String) {
    let resp = reqwest::get(format!("http://{addr}/api/freeRooms{query}"))
        .await
        .unwrap();
    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
    (status, resp.text().await.unwrap())
}

// ── Endpoint tests ───────────────────────────────────────────

#[tokio::test]
async fn free_rooms_returns_every_eligible_room() {
    let fetcher = fixed(vec![record(5, 10, 11, "T9:301")]);
    let addr = start_test_server(fetcher.clone()).await;

    let (status, body) = get_rooms(addr, "?date=2024-03-05").await;
    assert_eq!(status, StatusCode::OK);

    let rooms: Vec<RoomReport> = serde_json::from_str(&body).unwrap();
    assert_eq!(rooms.len(), 15);
    assert!(rooms.iter().all(|r| r.category.as_str() != "restricted"));

    let value: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(
        value[0],
        json!({
            "room": "T9:301",
            "type": "seminar",
            "availability": [
                {"from": "2024-03-05T06:00:00+01:00", "to": "2024-03-05T10:00:00+01:00"},
                {"from": "2024-03-05T11:00:00+01:00", "to": "2024-03-05T20:00:00+01:00"},
            ],
        })
    );
    assert_eq!(
        value[1]["availability"],
        json!([{"from": "2024-03-05T06:00:00+01:00", "to": "2024-03-05T20:00:00+01:00"}])
    );
}

#[tokio::test]
async fn teacher_rooms_on_request() {
    let addr = start_test_server(fixed(vec![])).await;

    let (status, body) = get_rooms(addr, "?date=2024-03-05&includeTeacherRooms=true").await;
    assert_eq!(status, StatusCode::OK);
    let rooms: Vec<RoomReport> = serde_json::from_str(&body).unwrap();
    assert_eq!(rooms.len(), 20);

    let restricted = rooms.iter().find(|r| r.room == "TK:PU1").unwrap();
    assert_eq!(restricted.availability.len(), 1);
    assert_eq!(restricted.availability[0].to, "2024-03-05T22:00:00+01:00");

    let (_, body) = get_rooms(addr, "?date=2024-03-05&includeTeacherRooms=false").await;
    let rooms: Vec<RoomReport> = serde_json::from_str(&body).unwrap();
    assert_eq!(rooms.len(), 15);
}

#[tokio::test]
async fn repeated_requests_hit_cache() {
    let fetcher = fixed(vec![]);
    let addr = start_test_server(fetcher.clone()).await;

    let (_, first) = get_rooms(addr, "?date=2024-03-05T08:00").await;
    let (_, second) = get_rooms(addr, "?date=2024-03-05T17:45").await;
    assert_eq!(first, second);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bad_parameters_are_client_errors() {
    let fetcher = fixed(vec![]);
    let addr = start_test_server(fetcher.clone()).await;

    let (status, body) = get_rooms(addr, "?date=yesterday").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("invalid date"));

    let (status, _) = get_rooms(addr, "?includeTeacherRooms=perhaps").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_query_string_is_client_error() {
    let fetcher = fixed(vec![]);
    let addr = start_test_server(fetcher.clone()).await;

    let (status, body) = get_rooms(addr, "?date=2024-03-05&date=2024-03-06").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("duplicate field"));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn upstream_failure_is_bad_gateway() {
    let fetcher = Arc::new(FixedFetcher {
        records: vec![],
        fail: true,
        calls: AtomicUsize::new(0),
    });
    let addr = start_test_server(fetcher).await;

    let (status, body) = get_rooms(addr, "?date=2024-03-05").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("connection refused"));
}

#[tokio::test]
async fn health_endpoint() {
    let addr = start_test_server(fixed(vec![])).await;
    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert!(resp.status().is_success());
    assert_eq!(resp.text().await.unwrap(), "ok");
}

// ── Sirius client against a fake upstream ────────────────────

struct FakeSirius {
    /// Value of `meta.count`; pages are served until it is exhausted.
    total: usize,
    token_requests: AtomicUsize,
    page_requests: AtomicUsize,
}

impl FakeSirius {
    fn with_total(total: usize) -> Arc<Self> {
        Arc::new(Self {
            total,
            token_requests: AtomicUsize::new(0),
            page_requests: AtomicUsize::new(0),
        })
    }
}

async fn fake_token(State(fake): State<Arc<FakeSirius>>, headers: HeaderMap) -> (StatusCode, String) {
    fake.token_requests.fetch_add(1, Ordering::SeqCst);
    // "id:secret" in base64
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Basic aWQ6c2VjcmV0");
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "{}".into());
    }
    (
        StatusCode::OK,
        json!({"access_token": "tok", "token_type": "bearer", "expires_in": 3600}).to_string(),
    )
}

async fn fake_events(
    State(fake): State<Arc<FakeSirius>>,
    headers: HeaderMap,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> (StatusCode, String) {
    fake.page_requests.fetch_add(1, Ordering::SeqCst);
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer tok") {
        return (StatusCode::UNAUTHORIZED, "{}".into());
    }
    assert_eq!(params["from"], "2024-03-05");
    assert_eq!(params["to"], "2024-03-06");
    assert_eq!(params["limit"], "1000");

    // Full pages until the total runs out; only the very first event has a room.
    let offset: usize = params["offset"].parse().unwrap();
    let count = fake.total.saturating_sub(offset).min(1000);
    let events: Vec<Value> = (0..count)
        .map(|i| {
            let room = if offset + i == 0 { json!({"room": "T9:301"}) } else { json!({}) };
            json!({
                "starts_at": "2024-03-05T09:00:00.000+01:00",
                "ends_at": "2024-03-05T10:00:00.000+01:00",
                "links": room,
            })
        })
        .collect();
    let body = json!({"meta": {"count": fake.total, "offset": offset, "limit": 1000}, "events": events});
    (StatusCode::OK, body.to_string())
}

async fn start_fake_sirius(fake: Arc<FakeSirius>, secret: &str) -> SiriusClient {
    let app = Router::new()
        .route("/oauth/token", post(fake_token))
        .route("/api/v1/events", get(fake_events))
        .with_state(fake);
    let addr = serve(app).await;

    SiriusClient::new(
        SiriusConfig {
            base_url: format!("http://{addr}/api/v1"),
            token_url: format!("http://{addr}/oauth/token"),
            client_id: "id".into(),
            client_secret: secret.into(),
            timeout: Duration::from_secs(5),
        },
        CET,
    )
    .unwrap()
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
}

#[tokio::test]
async fn sirius_client_authenticates_and_pages() {
    let fake = FakeSirius::with_total(1500);
    let client = start_fake_sirius(fake.clone(), "secret").await;

    let records = client.fetch_events(day()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].room, "T9:301");
    assert_eq!(fake.page_requests.load(Ordering::SeqCst), 2);

    // Token is reused while fresh.
    client.fetch_events(day()).await.unwrap();
    assert_eq!(fake.token_requests.load(Ordering::SeqCst), 1);
    assert_eq!(fake.page_requests.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn sirius_client_stops_at_reported_total() {
    // Exactly one full page: the reported count ends paging, not a short page.
    let fake = FakeSirius::with_total(1000);
    let client = start_fake_sirius(fake.clone(), "secret").await;

    let records = client.fetch_events(day()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(fake.page_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sirius_client_refuses_truncated_day() {
    let fake = FakeSirius::with_total(20_000);
    let client = start_fake_sirius(fake.clone(), "secret").await;

    let err = client.fetch_events(day()).await.unwrap_err();
    assert!(matches!(err, FetchError::Payload(_)));
    assert!(err.to_string().contains("20000"));
    assert_eq!(
        fake.page_requests.load(Ordering::SeqCst),
        freerooms::limits::MAX_UPSTREAM_PAGES
    );
}

#[tokio::test]
async fn sirius_client_reports_bad_credentials() {
    let fake = FakeSirius::with_total(0);
    let client = start_fake_sirius(fake.clone(), "wrong").await;

    let err = client.fetch_events(day()).await.unwrap_err();
    assert!(matches!(err, FetchError::Auth(_)));
    assert_eq!(fake.page_requests.load(Ordering::SeqCst), 0);
}
