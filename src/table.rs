use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::schema::{self, TrackRow};

/// A flat ingested record before cleaning: flattened column name → scalar.
pub type WideRow = serde_json::Map<String, Value>;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("table is missing required column {0:?}")]
    MissingColumn(&'static str),
    #[error("column {column:?} has the wrong type (expected {expected})")]
    BadType {
        column: &'static str,
        expected: &'static str,
    },
    #[error("unknown mood tag {0:?} — `tracklens moods` lists the vocabulary")]
    UnknownMood(String),
    #[error("cluster label count ({labels}) does not match row count ({rows})")]
    LabelMismatch { labels: usize, rows: usize },
}

pub type Result<T> = std::result::Result<T, SchemaError>;

/// An ordered collection of track rows. Uniqueness is not enforced here;
/// exact-row dedup happens only when merging into the master table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table {
    pub rows: Vec<TrackRow>,
}

impl Table {
    pub fn new(rows: Vec<TrackRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrackRow> {
        self.rows.iter()
    }

    /// Set moods/notes on every row whose track name matches exactly.
    /// Mood tags outside the controlled vocabulary are rejected before any
    /// row is touched. Returns the number of rows updated.
    pub fn annotate(
        &mut self,
        track_name: &str,
        moods: &[String],
        notes: Option<&str>,
    ) -> Result<usize> {
        for tag in moods {
            if !schema::is_known_mood(tag) {
                return Err(SchemaError::UnknownMood(tag.clone()));
            }
        }

        let joined = moods.join(", ");
        let mut updated = 0;
        for row in self.rows.iter_mut().filter(|r| r.name == track_name) {
            if !moods.is_empty() {
                row.moods = joined.clone();
            }
            if let Some(n) = notes {
                row.notes = n.to_string();
            }
            updated += 1;
        }
        Ok(updated)
    }

    /// Copy cluster labels into the `cluster` column, one per row in order.
    /// This is the explicit commit step — clustering results never reach
    /// the durable table any other way.
    pub fn apply_clusters(&mut self, labels: &[usize]) -> Result<()> {
        if labels.len() != self.rows.len() {
            return Err(SchemaError::LabelMismatch {
                labels: labels.len(),
                rows: self.rows.len(),
            });
        }
        for (row, &label) in self.rows.iter_mut().zip(labels) {
            row.cluster = Some(label as i64);
        }
        Ok(())
    }
}

/// Project wide rows down to the canonical schema plus empty annotation
/// columns. A missing canonical column is a hard schema-mismatch error,
/// never a silent partial row; extra columns are dropped.
pub fn clean(wide_rows: &[WideRow]) -> Result<Table> {
    let rows = wide_rows.iter().map(clean_row).collect::<Result<Vec<_>>>()?;
    Ok(Table::new(rows))
}

/// Project one wide row into a `TrackRow`. Annotation columns are carried
/// through when present (re-cleaning an already-cleaned table) and default
/// to empty otherwise.
pub fn clean_row(row: &WideRow) -> Result<TrackRow> {
    Ok(TrackRow {
        name: get_str(row, "name")?,
        id: get_str(row, "id")?,
        artist: get_str(row, "artist")?,
        tempo: get_f64(row, "tempo")?,
        time_signature: get_i64(row, "time_signature")?,
        danceability: get_f64(row, "danceability")?,
        energy: get_f64(row, "energy")?,
        key: get_i64(row, "key")?,
        loudness: get_f64(row, "loudness")?,
        mode: get_i64(row, "mode")?,
        speechiness: get_f64(row, "speechiness")?,
        acousticness: get_f64(row, "acousticness")?,
        instrumentalness: get_f64(row, "instrumentalness")?,
        liveness: get_f64(row, "liveness")?,
        valence: get_f64(row, "valence")?,
        track_num_samples: get_i64(row, "track_num_samples")?,
        track_duration: get_f64(row, "track_duration")?,
        track_end_of_fade_in: get_f64(row, "track_end_of_fade_in")?,
        track_start_of_fade_out: get_f64(row, "track_start_of_fade_out")?,
        track_tempo_confidence: get_f64(row, "track_tempo_confidence")?,
        track_time_signature_confidence: get_f64(row, "track_time_signature_confidence")?,
        track_key_confidence: get_f64(row, "track_key_confidence")?,
        track_mode_confidence: get_f64(row, "track_mode_confidence")?,
        duration_ms: get_i64(row, "duration_ms")?,
        track_href: get_str(row, "track_href")?,
        analysis_url: get_str(row, "analysis_url")?,
        moods: opt_str(row, "moods"),
        notes: opt_str(row, "notes"),
        cluster: opt_i64(row, "cluster"),
    })
}

fn get_str(row: &WideRow, column: &'static str) -> Result<String> {
    match row.get(column) {
        None => Err(SchemaError::MissingColumn(column)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(SchemaError::BadType {
            column,
            expected: "string",
        }),
    }
}

fn get_f64(row: &WideRow, column: &'static str) -> Result<f64> {
    match row.get(column) {
        None => Err(SchemaError::MissingColumn(column)),
        Some(Value::Number(n)) => n.as_f64().ok_or(SchemaError::BadType {
            column,
            expected: "number",
        }),
        Some(_) => Err(SchemaError::BadType {
            column,
            expected: "number",
        }),
    }
}

fn get_i64(row: &WideRow, column: &'static str) -> Result<i64> {
    match row.get(column) {
        None => Err(SchemaError::MissingColumn(column)),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else {
                // JSON round-trips sometimes widen integers to floats
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 => Ok(f as i64),
                    _ => Err(SchemaError::BadType {
                        column,
                        expected: "integer",
                    }),
                }
            }
        }
        Some(_) => Err(SchemaError::BadType {
            column,
            expected: "integer",
        }),
    }
}

fn opt_str(row: &WideRow, column: &str) -> String {
    match row.get(column) {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

fn opt_i64(row: &WideRow, column: &str) -> Option<i64> {
    match row.get(column) {
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    }
}
