//! JSON-feed crawl driver over HTTP.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use super::driver::{CrawlDriver, DeckPage, DeckRef, DriverError};
use crate::models::{CardEntry, DataSource, Decklist};

pub const USER_AGENT: &str = "deckcrawl/0.1 (decklist indexer)";

#[derive(Debug, Deserialize)]
struct FeedPage {
    next: Option<String>,
    #[serde(default)]
    results: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    url: String,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct DeckBody {
    #[serde(default)]
    cards: Vec<CardEntry>,
}

/// Crawl driver for sources exposing a paginated JSON deck feed.
pub struct HttpDriver {
    client: Client,
    endpoints: HashMap<DataSource, String>,
    request_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpDriver {
    pub fn new(
        endpoints: HashMap<DataSource, String>,
        user_agent: Option<&str>,
        timeout: Duration,
        request_delay: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent.unwrap_or(USER_AGENT))
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            endpoints,
            request_delay,
            last_request: Mutex::new(None),
        })
    }

    /// Keep at least `request_delay` between consecutive requests.
    async fn wait_turn(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let ready = at + self.request_delay;
            if ready > Instant::now() {
                tokio::time::sleep_until(ready).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, DriverError> {
        self.wait_turn().await;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(DriverError::Unreachable(format!("{url} returned {status}")));
        }
        if !status.is_success() {
            return Err(DriverError::Failed(format!("{url} returned {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| DriverError::Failed(format!("{url}: invalid response body: {e}")))
    }
}

fn request_error(url: &Url, e: reqwest::Error) -> DriverError {
    if e.is_connect() || e.is_timeout() {
        DriverError::Unreachable(format!("{url}: {e}"))
    } else {
        DriverError::Failed(format!("{url}: {e}"))
    }
}

#[async_trait]
impl CrawlDriver for HttpDriver {
    fn start_cursor(&self, target: DataSource) -> String {
        self.endpoints.get(&target).cloned().unwrap_or_default()
    }

    async fn list_decks(
        &self,
        _target: DataSource,
        cursor: &str,
    ) -> Result<DeckPage, DriverError> {
        let url = Url::parse(cursor).map_err(|_| DriverError::MalformedCursor(cursor.to_string()))?;
        let page: FeedPage = self.get_json(&url).await?;

        // Relative "next" links resolve against the page they came from.
        let next_cursor = page
            .next
            .map(|next| {
                url.join(&next)
                    .map(String::from)
                    .map_err(|_| DriverError::Failed(format!("{url}: invalid next link '{next}'")))
            })
            .transpose()?;

        Ok(DeckPage {
            items: page
                .results
                .into_iter()
                .map(|item| DeckRef {
                    url: item.url,
                    updated_time: item.updated_at,
                })
                .collect(),
            next_cursor,
        })
    }

    async fn fetch_decklist(&self, url: &str) -> Result<Decklist, DriverError> {
        let url = Url::parse(url)
            .map_err(|e| DriverError::Failed(format!("invalid deck url '{url}': {e}")))?;
        let body: DeckBody = self.get_json(&url).await?;
        Ok(Decklist { cards: body.cards })
    }
}
