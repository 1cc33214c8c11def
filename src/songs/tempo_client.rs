//! HTTP client for a GetSongBPM-style tempo search API.
//!
//! Rate limited to one request per `RATE_LIMIT_INTERVAL`; bulk imports can trigger many
//! lookups in a short time and the public API throttles aggressively.

use super::enrichment::TempoEnricher;
use super::normalize::normalize_key;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(1100);

pub struct SongBpmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    last_request: Mutex<Option<Instant>>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search: Option<SearchResults>,
}

/// The API answers `{"search": {"error": "no result"}}` instead of an empty list.
#[derive(Deserialize)]
#[serde(untagged)]
enum SearchResults {
    Songs(Vec<SearchSong>),
    Nothing(serde::de::IgnoredAny),
}

#[derive(Deserialize)]
struct SearchSong {
    title: String,
    tempo: Option<String>,
    artist: Option<SearchArtist>,
}

#[derive(Deserialize)]
struct SearchArtist {
    name: String,
}

impl SongBpmClient {
    pub fn new(base_url: &str, api_key: &str, user_agent: &str, timeout_sec: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            last_request: Mutex::new(None),
        })
    }

    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < RATE_LIMIT_INTERVAL {
                tokio::time::sleep(RATE_LIMIT_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Picks the tempo of the first result whose title and artist match the query.
fn pick_tempo(response: SearchResponse, title: &str, artist: &str) -> Option<i32> {
    let Some(SearchResults::Songs(songs)) = response.search else {
        return None;
    };
    let title_key = normalize_key(title);
    let artist_key = normalize_key(artist);
    songs
        .into_iter()
        .filter(|song| normalize_key(&song.title) == title_key)
        .filter(|song| {
            song.artist
                .as_ref()
                .map(|a| normalize_key(&a.name) == artist_key)
                .unwrap_or(false)
        })
        .find_map(|song| song.tempo.and_then(|t| t.trim().parse::<f32>().ok()))
        .map(|tempo| tempo.round() as i32)
}

#[async_trait]
impl TempoEnricher for SongBpmClient {
    async fn lookup_tempo(&self, title: &str, artist: &str) -> Result<Option<i32>> {
        self.rate_limit().await;

        let lookup = format!("song:{} artist:{}", title, artist);
        let url = format!(
            "{}/search/?api_key={}&type=both&lookup={}",
            self.base_url,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(&lookup)
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach tempo service")?;

        if !response.status().is_success() {
            if response.status().as_u16() == 429 {
                return Ok(None);
            }
            anyhow::bail!("Tempo search failed with status {}", response.status());
        }

        let body: SearchResponse = response
            .json()
            .await
            .context("Failed to parse tempo search response")?;
        Ok(pick_tempo(body, title, artist))
    }
}
