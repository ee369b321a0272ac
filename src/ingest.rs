use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use thiserror::Error;

use crate::cache::ResponseCache;
use crate::spotify::{ApiError, ArtistRef, PlaylistItem, SpotifyClient};
use crate::table::WideRow;

/// Analysis sub-structures too bulky to flatten, plus the metadata block.
/// Dropped before flattening, not flattened.
const DROPPED_ANALYSIS_KEYS: &[&str] = &["bars", "beats", "segments", "tatums", "meta"];

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("cache error: {0}")]
    Cache(#[from] crate::cache::CacheError),
    #[error("playlist resolved to an empty item list")]
    EmptyPlaylist,
    #[error("payload for track {track:?} is not a JSON object")]
    NotAnObject { track: String },
}

pub type Result<T> = std::result::Result<T, IngestError>;

pub struct IngestResult {
    pub rows: Vec<WideRow>,
    pub fetched: usize,
    pub skipped: usize,
}

/// Fetch every track of a playlist and assemble one wide row per item.
///
/// Each track costs two round trips (features, analysis) — no batching, so
/// cost is linear in playlist size. Malformed items (null track, null id,
/// non-object payload) are skipped with a warning and counted; they never
/// corrupt the output table.
pub fn ingest_playlist(
    client: &SpotifyClient,
    cache: &ResponseCache,
    playlist_id: &str,
    ttl_days: i64,
    refresh: bool,
) -> Result<IngestResult> {
    let items = client.playlist_items(playlist_id)?;
    if items.is_empty() {
        return Err(IngestError::EmptyPlaylist);
    }

    assemble_rows(
        &items,
        |track_id| fetch_cached(client, cache, "audio_features", track_id, ttl_days, refresh),
        |track_id| fetch_cached(client, cache, "audio_analysis", track_id, ttl_days, refresh),
    )
}

/// Build wide rows from playlist items using the given per-track fetchers.
/// Split out from `ingest_playlist` so the join/skip logic is testable
/// without a network.
pub fn assemble_rows(
    items: &[PlaylistItem],
    mut fetch_features: impl FnMut(&str) -> Result<Value>,
    mut fetch_analysis: impl FnMut(&str) -> Result<Value>,
) -> Result<IngestResult> {
    let pb = ProgressBar::new(items.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} tracks ({eta}) {msg}",
        )
        .unwrap()
        .progress_chars("#>-"),
    );

    let mut rows = Vec::with_capacity(items.len());
    let mut skipped = 0usize;

    for item in items {
        pb.inc(1);

        let track = match &item.track {
            Some(t) => t,
            None => {
                log::warn!("Skipping playlist item with no track");
                skipped += 1;
                continue;
            }
        };
        let track_id = match &track.id {
            Some(id) => id,
            None => {
                log::warn!("Skipping track {:?} with no id (local file?)", track.name);
                skipped += 1;
                continue;
            }
        };

        pb.set_message(track.name.clone());

        let features = fetch_features(track_id)?;
        let analysis = fetch_analysis(track_id)?;

        match build_wide_row(&features, &analysis, &track.name, &track.artists) {
            Ok(row) => rows.push(row),
            Err(e) => {
                log::warn!("Skipping track {:?}: {e}", track.name);
                skipped += 1;
            }
        }
    }

    pb.finish_with_message(format!("{} fetched, {} skipped", rows.len(), skipped));

    Ok(IngestResult {
        fetched: rows.len(),
        skipped,
        rows,
    })
}

/// Horizontally join a flat features record with a flattened analysis
/// record, then attach the track name and comma-joined artist names.
pub fn build_wide_row(
    features: &Value,
    analysis: &Value,
    name: &str,
    artists: &[ArtistRef],
) -> Result<WideRow> {
    let mut wide = WideRow::new();

    let features_obj = features.as_object().ok_or_else(|| IngestError::NotAnObject {
        track: name.to_string(),
    })?;
    for (k, v) in features_obj {
        wide.insert(k.clone(), v.clone());
    }

    let analysis_obj = analysis.as_object().ok_or_else(|| IngestError::NotAnObject {
        track: name.to_string(),
    })?;
    for (k, v) in analysis_obj {
        if DROPPED_ANALYSIS_KEYS.contains(&k.as_str()) {
            continue;
        }
        flatten_value(k, v, &mut wide);
    }

    wide.insert("artist".to_string(), Value::from(join_artists(artists)));
    wide.insert("name".to_string(), Value::from(name));

    Ok(wide)
}

/// Flatten nested JSON into `_`-joined scalar keys; array elements are
/// keyed by index (`sections_0_start`).
fn flatten_value(prefix: &str, value: &Value, out: &mut WideRow) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten_value(&format!("{prefix}_{k}"), v, out);
            }
        }
        Value::Array(arr) => {
            for (i, v) in arr.iter().enumerate() {
                flatten_value(&format!("{prefix}_{i}"), v, out);
            }
        }
        scalar => {
            out.insert(prefix.to_string(), scalar.clone());
        }
    }
}

/// Comma-join artist names across multiple artists.
fn join_artists(artists: &[ArtistRef]) -> String {
    artists
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Cache-through fetch of one endpoint for one track. Cache hits within the
/// TTL skip the network entirely; `refresh` forces a re-fetch.
fn fetch_cached(
    client: &SpotifyClient,
    cache: &ResponseCache,
    endpoint: &str,
    track_id: &str,
    ttl_days: i64,
    refresh: bool,
) -> Result<Value> {
    let cache_key = format!("{endpoint}:{track_id}");

    if !refresh {
        if let Some(payload) = cache.get(&cache_key, ttl_days)? {
            match serde_json::from_str(&payload) {
                Ok(value) => {
                    log::debug!("Cache hit for {cache_key}");
                    return Ok(value);
                }
                Err(e) => log::warn!("Corrupt cache entry {cache_key}: {e}, re-fetching"),
            }
        }
    }

    let value = match endpoint {
        "audio_features" => client.audio_features(track_id)?,
        _ => client.audio_analysis(track_id)?,
    };
    cache.put(&cache_key, &value.to_string())?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ANNOTATION_COLUMNS, CANONICAL_COLUMNS};
    use crate::spotify::PlaylistTrack;
    use crate::table;
    use serde_json::json;

    pub(crate) fn features_fixture(id: &str) -> Value {
        json!({
            "danceability": 0.72,
            "energy": 0.61,
            "key": 7,
            "loudness": -9.4,
            "mode": 1,
            "speechiness": 0.04,
            "acousticness": 0.31,
            "instrumentalness": 0.12,
            "liveness": 0.85,
            "valence": 0.88,
            "tempo": 112.5,
            "type": "audio_features",
            "id": id,
            "uri": format!("spotify:track:{id}"),
            "track_href": format!("https://api.spotify.com/v1/tracks/{id}"),
            "analysis_url": format!("https://api.spotify.com/v1/audio-analysis/{id}"),
            "duration_ms": 440800,
            "time_signature": 4
        })
    }

    pub(crate) fn analysis_fixture() -> Value {
        json!({
            "meta": {"analyzer_version": "4.0.0", "status_code": 0},
            "track": {
                "num_samples": 9720000,
                "duration": 440.8,
                "end_of_fade_in": 0.4,
                "start_of_fade_out": 432.1,
                "tempo_confidence": 0.93,
                "time_signature_confidence": 1.0,
                "key_confidence": 0.55,
                "mode_confidence": 0.62
            },
            "bars": [{"start": 0.5, "duration": 2.1}],
            "beats": [{"start": 0.5, "duration": 0.5}],
            "sections": [{"start": 0.0, "duration": 30.0}],
            "segments": [{"start": 0.0, "duration": 0.2}],
            "tatums": [{"start": 0.5, "duration": 0.25}]
        })
    }

    fn item(id: Option<&str>, name: &str, artists: &[&str]) -> PlaylistItem {
        PlaylistItem {
            track: Some(PlaylistTrack {
                id: id.map(String::from),
                name: name.to_string(),
                artists: artists
                    .iter()
                    .map(|a| ArtistRef { name: a.to_string() })
                    .collect(),
            }),
        }
    }

    #[test]
    fn test_flatten_nested_and_arrays() {
        let mut out = WideRow::new();
        flatten_value(
            "track",
            &json!({"duration": 440.8, "meta": {"version": 4}}),
            &mut out,
        );
        flatten_value("sections", &json!([{"start": 0.0}, {"start": 30.0}]), &mut out);

        assert_eq!(out.get("track_duration"), Some(&Value::from(440.8)));
        assert_eq!(out.get("track_meta_version"), Some(&Value::from(4)));
        assert_eq!(out.get("sections_0_start"), Some(&Value::from(0.0)));
        assert_eq!(out.get("sections_1_start"), Some(&Value::from(30.0)));
    }

    #[test]
    fn test_join_artists() {
        let artists = vec![
            ArtistRef { name: "Grateful Dead".into() },
            ArtistRef { name: "Branford Marsalis".into() },
        ];
        assert_eq!(join_artists(&artists), "Grateful Dead, Branford Marsalis");
        assert_eq!(join_artists(&[]), "");
    }

    #[test]
    fn test_build_wide_row_drops_bulky_structures() {
        let wide = build_wide_row(
            &features_fixture("abc"),
            &analysis_fixture(),
            "Scarlet Begonias",
            &[ArtistRef { name: "Grateful Dead".into() }],
        )
        .unwrap();

        // Flattened analysis fields are joined in
        assert_eq!(wide.get("track_duration"), Some(&Value::from(440.8)));
        assert_eq!(wide.get("track_tempo_confidence"), Some(&Value::from(0.93)));
        // Timing arrays and meta are excluded, not flattened
        assert!(!wide.keys().any(|k| k.starts_with("bars")));
        assert!(!wide.keys().any(|k| k.starts_with("beats")));
        assert!(!wide.keys().any(|k| k.starts_with("segments")));
        assert!(!wide.keys().any(|k| k.starts_with("tatums")));
        assert!(!wide.keys().any(|k| k.starts_with("meta")));
        // Sections survive flattening (dropped later by cleaning)
        assert!(wide.contains_key("sections_0_start"));
        // Identity fields attached
        assert_eq!(wide.get("name"), Some(&Value::from("Scarlet Begonias")));
        assert_eq!(wide.get("artist"), Some(&Value::from("Grateful Dead")));
    }

    #[test]
    fn test_two_item_playlist_produces_two_clean_rows() {
        let items = vec![
            item(Some("id_one"), "Scarlet Begonias", &["Grateful Dead"]),
            item(Some("id_two"), "Fire on the Mountain", &["Grateful Dead"]),
        ];

        let result = assemble_rows(
            &items,
            |id| Ok(features_fixture(id)),
            |_| Ok(analysis_fixture()),
        )
        .unwrap();
        assert_eq!(result.fetched, 2);
        assert_eq!(result.skipped, 0);

        let clean = table::clean(&result.rows).unwrap();
        assert_eq!(clean.len(), 2);
        for (row, expected_id) in clean.iter().zip(["id_one", "id_two"]) {
            assert_eq!(row.id, expected_id);
            assert_eq!(row.artist, "Grateful Dead");
            assert!(row.tempo > 0.0);
            // Annotation columns present and empty
            assert_eq!(row.moods, "");
            assert_eq!(row.notes, "");
            assert_eq!(row.cluster, None);
        }

        let obj = serde_json::to_value(&clean.rows[0]).unwrap();
        let obj = obj.as_object().unwrap();
        assert_eq!(obj.len(), CANONICAL_COLUMNS.len() + ANNOTATION_COLUMNS.len());
    }

    #[test]
    fn test_malformed_items_skip_and_report() {
        let items = vec![
            PlaylistItem { track: None },
            item(None, "Local File", &[]),
            item(Some("good"), "Good Track", &["Band"]),
        ];

        let result = assemble_rows(
            &items,
            |id| Ok(features_fixture(id)),
            |_| Ok(analysis_fixture()),
        )
        .unwrap();

        assert_eq!(result.fetched, 1);
        assert_eq!(result.skipped, 2);
        assert_eq!(result.rows[0].get("id"), Some(&Value::from("good")));
    }

    #[test]
    fn test_non_object_payload_skips_track() {
        let items = vec![item(Some("bad"), "Bad Track", &["Band"])];
        let result = assemble_rows(&items, |_| Ok(json!(null)), |_| Ok(analysis_fixture())).unwrap();
        assert_eq!(result.fetched, 0);
        assert_eq!(result.skipped, 1);
    }
}
