use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use base64::Engine;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::config::ApiConfig;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),
    #[error("authentication failed (HTTP {0}) — check client id and secret")]
    Auth(u16),
    #[error("Spotify returned HTTP {code} for {endpoint}")]
    Status { endpoint: String, code: u16 },
    #[error("malformed API response: {0}")]
    Malformed(String),
    #[error("invalid playlist identifier: {0:?}")]
    InvalidPlaylist(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// A page of playlist items from the playlist-tracks endpoint.
#[derive(Debug, Deserialize)]
pub struct PlaylistPage {
    pub items: Vec<PlaylistItem>,
    pub next: Option<String>,
}

/// One playlist entry. `track` is null for removed/unavailable entries.
#[derive(Debug, Deserialize)]
pub struct PlaylistItem {
    pub track: Option<PlaylistTrack>,
}

/// The track payload inside a playlist item. Local files have a null id.
#[derive(Debug, Deserialize)]
pub struct PlaylistTrack {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
}

#[derive(Debug, Deserialize)]
pub struct ArtistRef {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Synchronous Spotify Web API client authenticated with client credentials.
/// Requests retry a bounded number of times on transport errors, 429 and
/// 5xx; the pipeline above never retries on its own.
pub struct SpotifyClient {
    agent: ureq::Agent,
    token: String,
    retries: u32,
    rate_limit_ms: u64,
}

impl SpotifyClient {
    /// Exchange client credentials for a bearer token and build a client.
    /// No token refresh: a session outliving the token expiry fails with an
    /// auth error on the next request.
    pub fn connect(client_id: &str, client_secret: &str, api: &ApiConfig) -> Result<Self> {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(api.timeout_secs)))
            .build();
        let agent: ureq::Agent = config.into();

        let basic = base64::engine::general_purpose::STANDARD
            .encode(format!("{client_id}:{client_secret}"));

        let mut resp = agent
            .post(TOKEN_URL)
            .header("Authorization", &format!("Basic {basic}"))
            .send_form([("grant_type", "client_credentials")])
            .map_err(|e| match e {
                ureq::Error::StatusCode(code) if code == 400 || code == 401 || code == 403 => {
                    ApiError::Auth(code)
                }
                other => ApiError::Http(other),
            })?;

        let token: TokenResponse = resp
            .body_mut()
            .read_json()
            .map_err(|e| ApiError::Malformed(format!("token response: {e}")))?;

        log::debug!("Authenticated with Spotify (client credentials)");
        Ok(Self {
            agent,
            token: token.access_token,
            retries: api.retries,
            rate_limit_ms: api.rate_limit_ms,
        })
    }

    /// All playlist items, following pagination until `next` is null.
    pub fn playlist_items(&self, playlist_id: &str) -> Result<Vec<PlaylistItem>> {
        let mut items = Vec::new();
        let mut url = format!("{API_BASE}/playlists/{playlist_id}/tracks");

        loop {
            let value = self.get_json(&url)?;
            let page: PlaylistPage = serde_json::from_value(value)
                .map_err(|e| ApiError::Malformed(format!("playlist page: {e}")))?;
            items.extend(page.items);
            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(items)
    }

    /// Audio features for one track — a flat numeric record.
    pub fn audio_features(&self, track_id: &str) -> Result<serde_json::Value> {
        self.get_json(&format!("{API_BASE}/audio-features/{track_id}"))
    }

    /// Audio analysis for one track — a nested record with bulky timing
    /// arrays the ingestion stage discards.
    pub fn audio_analysis(&self, track_id: &str) -> Result<serde_json::Value> {
        self.get_json(&format!("{API_BASE}/audio-analysis/{track_id}"))
    }

    /// GET a JSON endpoint with the bearer token, bounded retries and a
    /// politeness delay between requests.
    fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let mut attempt = 0u32;
        loop {
            if self.rate_limit_ms > 0 {
                thread::sleep(Duration::from_millis(self.rate_limit_ms));
            }

            let result = self
                .agent
                .get(url)
                .header("Authorization", &format!("Bearer {}", self.token))
                .call();

            match result {
                Ok(mut resp) => {
                    return resp
                        .body_mut()
                        .read_json()
                        .map_err(|e| ApiError::Malformed(format!("{url}: {e}")));
                }
                Err(ureq::Error::StatusCode(code)) if code == 401 || code == 403 => {
                    return Err(ApiError::Auth(code));
                }
                Err(ureq::Error::StatusCode(code))
                    if (code == 429 || code >= 500) && attempt < self.retries =>
                {
                    attempt += 1;
                    log::warn!("HTTP {code} from {url}, retry {attempt}/{}", self.retries);
                    thread::sleep(Duration::from_millis(500 * attempt as u64));
                }
                Err(ureq::Error::StatusCode(code)) => {
                    return Err(ApiError::Status {
                        endpoint: url.to_string(),
                        code,
                    });
                }
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    log::warn!("Request to {url} failed ({e}), retry {attempt}/{}", self.retries);
                    thread::sleep(Duration::from_millis(500 * attempt as u64));
                }
                Err(e) => return Err(ApiError::Http(e)),
            }
        }
    }
}

// Playlist URL forms: open.spotify.com/playlist/<id>, spotify:playlist:<id>
static PLAYLIST_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"playlist[/:]([A-Za-z0-9]+)").unwrap());

static BARE_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{22}$").unwrap());

/// Extract a playlist id from a bare id, a share URL, or a Spotify URI.
pub fn parse_playlist_id(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if BARE_ID_RE.is_match(trimmed) {
        return Ok(trimmed.to_string());
    }
    if let Some(caps) = PLAYLIST_URL_RE.captures(trimmed) {
        return Ok(caps[1].to_string());
    }
    Err(ApiError::InvalidPlaylist(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_id() {
        let id = "3j1iDQdjbP8tUcNbe4BVhz";
        assert_eq!(parse_playlist_id(id).unwrap(), id);
        assert_eq!(parse_playlist_id(&format!("  {id} ")).unwrap(), id);
    }

    #[test]
    fn test_parse_share_url() {
        let url = "https://open.spotify.com/playlist/3j1iDQdjbP8tUcNbe4BVhz?si=abcd1234";
        assert_eq!(parse_playlist_id(url).unwrap(), "3j1iDQdjbP8tUcNbe4BVhz");
    }

    #[test]
    fn test_parse_uri() {
        let uri = "spotify:playlist:3j1iDQdjbP8tUcNbe4BVhz";
        assert_eq!(parse_playlist_id(uri).unwrap(), "3j1iDQdjbP8tUcNbe4BVhz");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_playlist_id("not a playlist").is_err());
        assert!(parse_playlist_id("").is_err());
        assert!(parse_playlist_id("https://open.spotify.com/track/abc123").is_err());
    }

    #[test]
    fn test_playlist_page_deserializes_null_tracks() {
        let json = r#"{
            "items": [
                {"track": {"id": "abc", "name": "Song", "artists": [{"name": "Band"}]}},
                {"track": null},
                {"track": {"id": null, "name": "Local File", "artists": []}}
            ],
            "next": null
        }"#;
        let page: PlaylistPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.items[1].track.is_none());
        assert!(page.items[2].track.as_ref().unwrap().id.is_none());
        assert!(page.next.is_none());
    }
}
