use serde::{Deserialize, Serialize};

/// The fixed, ordered column set every cleaned table has.
/// Identity fields, then audio features, then analysis-derived fields.
pub const CANONICAL_COLUMNS: &[&str] = &[
    "name",
    "id",
    "artist",
    "tempo",
    "time_signature",
    "danceability",
    "energy",
    "key",
    "loudness",
    "mode",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "track_num_samples",
    "track_duration",
    "track_end_of_fade_in",
    "track_start_of_fade_out",
    "track_tempo_confidence",
    "track_time_signature_confidence",
    "track_key_confidence",
    "track_mode_confidence",
    "duration_ms",
    "track_href",
    "analysis_url",
];

/// User-editable columns appended by the cleaning stage, never fetched.
pub const ANNOTATION_COLUMNS: &[&str] = &["moods", "notes", "cluster"];

/// Numeric columns eligible for clustering.
pub const FEATURE_COLUMNS: &[&str] = &[
    "tempo",
    "time_signature",
    "danceability",
    "energy",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "loudness",
    "valence",
    "track_num_samples",
    "track_duration",
    "track_tempo_confidence",
    "track_time_signature_confidence",
    "track_key_confidence",
    "track_mode_confidence",
    "duration_ms",
];

/// Features already bounded to [0,1] — passed through unscaled by clustering.
pub const VISUAL_COLUMNS: &[&str] = &[
    "danceability",
    "energy",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "track_tempo_confidence",
    "track_time_signature_confidence",
    "track_key_confidence",
    "track_mode_confidence",
];

/// Controlled vocabulary for the moods annotation.
pub const TRACK_MOODS: &[&str] = &[
    "anxious",
    "bittersweet",
    "boisterous",
    "bright",
    "cheerful",
    "chill",
    "dangerous",
    "dark",
    "elegant",
    "epic",
    "furious",
    "heavy",
    "hopeful",
    "intense",
    "laidback",
    "melancholy",
    "relaxed",
    "romantic",
    "sad/sorrowful",
    "sombre",
    "suspenseful",
    "tense",
    "warm",
    "wistful",
];

/// One flattened record of audio features, analysis and annotations for a
/// single track. Field order matches `CANONICAL_COLUMNS` then
/// `ANNOTATION_COLUMNS`, so serialized tables keep the canonical order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRow {
    pub name: String,
    pub id: String,
    pub artist: String,

    pub tempo: f64,
    pub time_signature: i64,
    pub danceability: f64,
    pub energy: f64,
    pub key: i64,
    pub loudness: f64,
    pub mode: i64,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub valence: f64,

    pub track_num_samples: i64,
    pub track_duration: f64,
    pub track_end_of_fade_in: f64,
    pub track_start_of_fade_out: f64,
    pub track_tempo_confidence: f64,
    pub track_time_signature_confidence: f64,
    pub track_key_confidence: f64,
    pub track_mode_confidence: f64,

    pub duration_ms: i64,
    pub track_href: String,
    pub analysis_url: String,

    // Annotations — user-edited, empty after cleaning
    #[serde(default)]
    pub moods: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub cluster: Option<i64>,
}

impl TrackRow {
    /// Numeric value of a clusterable feature column by name.
    /// Returns `None` for columns not in `FEATURE_COLUMNS`.
    pub fn feature(&self, column: &str) -> Option<f64> {
        let v = match column {
            "tempo" => self.tempo,
            "time_signature" => self.time_signature as f64,
            "danceability" => self.danceability,
            "energy" => self.energy,
            "speechiness" => self.speechiness,
            "acousticness" => self.acousticness,
            "instrumentalness" => self.instrumentalness,
            "liveness" => self.liveness,
            "loudness" => self.loudness,
            "valence" => self.valence,
            "track_num_samples" => self.track_num_samples as f64,
            "track_duration" => self.track_duration,
            "track_tempo_confidence" => self.track_tempo_confidence,
            "track_time_signature_confidence" => self.track_time_signature_confidence,
            "track_key_confidence" => self.track_key_confidence,
            "track_mode_confidence" => self.track_mode_confidence,
            "duration_ms" => self.duration_ms as f64,
            _ => return None,
        };
        Some(v)
    }
}

/// Whether a mood tag belongs to the controlled vocabulary.
pub fn is_known_mood(tag: &str) -> bool {
    TRACK_MOODS.contains(&tag)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn test_feature_columns_are_canonical() {
        for col in FEATURE_COLUMNS {
            assert!(CANONICAL_COLUMNS.contains(col), "{col} not canonical");
        }
    }

    #[test]
    fn test_visual_columns_are_features() {
        for col in VISUAL_COLUMNS {
            assert!(FEATURE_COLUMNS.contains(col), "{col} not a feature");
        }
    }

    #[test]
    fn test_feature_accessor_covers_feature_columns() {
        let row = test_row();
        for col in FEATURE_COLUMNS {
            assert!(row.feature(col).is_some(), "no accessor for {col}");
        }
        assert!(row.feature("name").is_none());
        assert!(row.feature("moods").is_none());
    }

    #[test]
    fn test_known_moods() {
        assert!(is_known_mood("chill"));
        assert!(is_known_mood("sad/sorrowful"));
        assert!(!is_known_mood("groovy"));
    }

    pub(crate) fn test_row() -> TrackRow {
        TrackRow {
            name: "Scarlet Begonias".into(),
            id: "3n3Ppam7vgaVa1iaRUc9Lp".into(),
            artist: "Grateful Dead".into(),
            tempo: 112.5,
            time_signature: 4,
            danceability: 0.72,
            energy: 0.61,
            key: 7,
            loudness: -9.4,
            mode: 1,
            speechiness: 0.04,
            acousticness: 0.31,
            instrumentalness: 0.12,
            liveness: 0.85,
            valence: 0.88,
            track_num_samples: 9_720_000,
            track_duration: 440.8,
            track_end_of_fade_in: 0.4,
            track_start_of_fade_out: 432.1,
            track_tempo_confidence: 0.93,
            track_time_signature_confidence: 1.0,
            track_key_confidence: 0.55,
            track_mode_confidence: 0.62,
            duration_ms: 440_800,
            track_href: "https://api.spotify.com/v1/tracks/3n3Ppam7vgaVa1iaRUc9Lp".into(),
            analysis_url: "https://api.spotify.com/v1/audio-analysis/3n3Ppam7vgaVa1iaRUc9Lp".into(),
            moods: String::new(),
            notes: String::new(),
            cluster: None,
        }
    }
}
