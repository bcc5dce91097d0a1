//! Decoding of `notes` rows into core notes.

use chrono::{DateTime, NaiveDateTime, Utc};
use notesift_core::{Note, NoteId};
use rusqlite::Row;

/// Column list every note query selects, in [`note_from_row`] order.
pub(crate) const NOTE_COLUMNS: &str = "id, title, content, tags, created_at, updated_at";

/// Naive layouts seen in the `created_at`/`updated_at` columns.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Split a stored tag string on commas.
///
/// Entries are trimmed, empty entries dropped, and duplicates removed keeping
/// the first occurrence.
pub fn split_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Join tags back into the stored form.
pub fn join_tags<S: AsRef<str>>(tags: &[S]) -> String {
    tags.iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse an ISO-8601 timestamp column.
///
/// RFC 3339 strings keep their offset; naive strings are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// The modification time for a row: `updated_at`, else `created_at`, else the epoch.
pub(crate) fn modified_time(updated_at: Option<&str>, created_at: Option<&str>) -> DateTime<Utc> {
    updated_at
        .and_then(parse_timestamp)
        .or_else(|| created_at.and_then(parse_timestamp))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Build a note from a row selected with [`NOTE_COLUMNS`].
pub(crate) fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    let id: i64 = row.get(0)?;
    let title: String = row.get(1)?;
    let content: String = row.get(2)?;
    let tags: Option<String> = row.get(3)?;
    let created_at: Option<String> = row.get(4)?;
    let updated_at: Option<String> = row.get(5)?;

    Ok(Note::new(NoteId(id), title, content)
        .with_tags(split_tags(tags.as_deref().unwrap_or_default()))
        .with_modified(modified_time(updated_at.as_deref(), created_at.as_deref())))
}
