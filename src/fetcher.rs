use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::limits::*;
use crate::model::{OccupancyRecord, parse_instant};

#[derive(Debug)]
pub enum FetchError {
    /// Network failure or timeout talking to the upstream.
    Transport(String),
    /// Upstream answered with a non-success status.
    Status { status: u16, url: String },
    /// Token endpoint refused the client credentials.
    Auth(String),
    /// Body could not be decoded into events.
    Payload(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Transport(e) => write!(f, "upstream transport error: {e}"),
            FetchError::Status { status, url } => {
                write!(f, "upstream returned {status} for {url}")
            }
            FetchError::Auth(e) => write!(f, "upstream authentication failed: {e}"),
            FetchError::Payload(e) => write!(f, "malformed upstream payload: {e}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Payload(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Source of room occupancy for a single day.
#[async_trait]
pub trait EventFetcher: Send + Sync {
    async fn fetch_events(&self, date: NaiveDate) -> Result<Vec<OccupancyRecord>, FetchError>;
}

// ── Upstream payload ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EventsPage {
    events: Vec<RawEvent>,
    #[serde(default)]
    meta: Option<PageMeta>,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    starts_at: String,
    ends_at: String,
    #[serde(default)]
    links: EventLinks,
}

#[derive(Debug, Default, Deserialize)]
struct EventLinks {
    room: Option<String>,
}

/// One decoded page of the events endpoint.
#[derive(Debug)]
pub struct Page {
    pub records: Vec<OccupancyRecord>,
    /// Events on the page, including those without a room.
    pub received: usize,
    /// Total reported by the upstream, if any.
    pub total: Option<usize>,
}

/// Decode an events page. Events without a room link are skipped.
pub fn parse_events_page(body: &[u8], tz: Tz) -> Result<Page, FetchError> {
    let page: EventsPage =
        serde_json::from_slice(body).map_err(|e| FetchError::Payload(e.to_string()))?;
    let received = page.events.len();
    let mut records = Vec::with_capacity(received);
    for event in page.events {
        let Some(room) = event.links.room else { continue };
        let start = parse_instant(&event.starts_at, tz)
            .ok_or_else(|| FetchError::Payload(format!("bad starts_at: {}", event.starts_at)))?;
        let end = parse_instant(&event.ends_at, tz)
            .ok_or_else(|| FetchError::Payload(format!("bad ends_at: {}", event.ends_at)))?;
        records.push(OccupancyRecord::new(start, end, room));
    }
    Ok(Page {
        records,
        received,
        total: page.meta.and_then(|m| m.count),
    })
}

// ── Sirius client ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SiriusConfig {
    pub base_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct BearerToken {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl BearerToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => now + chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < at,
            None => true,
        }
    }
}

/// OAuth2 client-credentials client for the Sirius events API.
pub struct SiriusClient {
    http: reqwest::Client,
    config: SiriusConfig,
    tz: Tz,
    token: Mutex<Option<BearerToken>>,
}

impl SiriusClient {
    pub fn new(config: SiriusConfig, tz: Tz) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("freerooms/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            config,
            tz,
            token: Mutex::new(None),
        })
    }

    async fn bearer(&self) -> Result<String, FetchError> {
        let mut guard = self.token.lock().await;
        let now = Utc::now();
        if let Some(token) = guard.as_ref()
            && token.is_fresh(now)
        {
            return Ok(token.access_token.clone());
        }

        let resp = self
            .http
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(FetchError::Auth(format!(
                "token endpoint returned {}",
                resp.status()
            )));
        }
        let body: TokenResponse = resp.json().await?;
        let token = BearerToken {
            access_token: body.access_token,
            expires_at: body
                .expires_in
                .map(|secs| now + chrono::Duration::seconds(secs)),
        };
        debug!("obtained upstream token, expires_at={:?}", token.expires_at);
        let access = token.access_token.clone();
        *guard = Some(token);
        Ok(access)
    }

    async fn fetch_page(
        &self,
        token: &str,
        date: NaiveDate,
        offset: usize,
    ) -> Result<Page, FetchError> {
        let url = format!("{}/events", self.config.base_url.trim_end_matches('/'));
        let from = date.format("%Y-%m-%d").to_string();
        let to = date
            .succ_opt()
            .unwrap_or(date)
            .format("%Y-%m-%d")
            .to_string();
        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("limit", UPSTREAM_PAGE_LIMIT.to_string()),
                ("offset", offset.to_string()),
                ("from", from),
                ("to", to),
            ])
            .send()
            .await?;
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Token revoked early; next request fetches a new one.
            *self.token.lock().await = None;
            return Err(FetchError::Auth("events endpoint rejected token".into()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }
        let body = resp.bytes().await?;
        parse_events_page(&body, self.tz)
    }
}

#[async_trait]
impl EventFetcher for SiriusClient {
    async fn fetch_events(&self, date: NaiveDate) -> Result<Vec<OccupancyRecord>, FetchError> {
        let token = self.bearer().await?;
        let mut records = Vec::new();
        let mut offset = 0;
        let mut total = None;

        for _ in 0..MAX_UPSTREAM_PAGES {
            let page = self.fetch_page(&token, date, offset).await?;
            offset += page.received;
            total = page.total;
            records.extend(page.records);
            let done = page.received < UPSTREAM_PAGE_LIMIT
                || page.total.is_some_and(|total| offset >= total);
            if done {
                info!("fetched {} occupancy records for {date}", records.len());
                return Ok(records);
            }
        }

        // A partial day would report busy rooms as free.
        warn!("stopped paging for {date} after {MAX_UPSTREAM_PAGES} pages");
        Err(FetchError::Payload(match total {
            Some(total) => format!("upstream reported {total} events, read only {offset}"),
            None => format!("more than {offset} events for {date}, paging limit reached"),
        }))
    }
}
