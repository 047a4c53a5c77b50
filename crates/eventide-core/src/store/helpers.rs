//! Helper functions for store module

use crate::error::{Error, Result};
use crate::event::{parse_timestamp, Conjugation, Event};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// Columns selected for every event read, in table order
pub(crate) const EVENT_COLUMNS: &str = "id, type, entity_type, entity_id, verb, \
     conjugation_action, conjugation_activity, conjugation_event, \
     data, before_state, after_state, context, actor, sequence, timestamp";

/// Convert a SQLite row to an Event
pub(crate) fn row_to_event(row: &SqliteRow) -> Result<Event> {
    let timestamp_str: String = row.try_get("timestamp").map_err(db_error)?;
    let timestamp = parse_timestamp(&timestamp_str)
        .map_err(|e| Error::Serialization(format!("invalid timestamp: {e}")))?;

    Ok(Event {
        id: row.try_get("id").map_err(db_error)?,
        event_type: row.try_get("type").map_err(db_error)?,
        entity_type: row.try_get("entity_type").map_err(db_error)?,
        entity_id: row.try_get("entity_id").map_err(db_error)?,
        verb: row.try_get("verb").map_err(db_error)?,
        conjugation: Conjugation {
            action: row.try_get("conjugation_action").map_err(db_error)?,
            activity: row.try_get("conjugation_activity").map_err(db_error)?,
            event: row.try_get("conjugation_event").map_err(db_error)?,
        },
        data: parse_json(row.try_get("data").map_err(db_error)?)?,
        before: parse_json(row.try_get("before_state").map_err(db_error)?)?,
        after: parse_json(row.try_get("after_state").map_err(db_error)?)?,
        context: row.try_get("context").map_err(db_error)?,
        actor: row.try_get("actor").map_err(db_error)?,
        sequence: row.try_get("sequence").map_err(db_error)?,
        timestamp,
    })
}

fn parse_json(text: Option<String>) -> Result<Option<serde_json::Value>> {
    text.map(|s| {
        serde_json::from_str(&s).map_err(|e| Error::Serialization(format!("invalid json: {e}")))
    })
    .transpose()
}

pub(crate) fn to_json_text(value: Option<&serde_json::Value>) -> Option<String> {
    value.map(serde_json::Value::to_string)
}

pub(crate) fn db_error(e: sqlx::Error) -> Error {
    Error::Database(e.to_string())
}

/// Table names are interpolated into SQL, so only plain identifiers pass
pub(crate) fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(Error::Configuration(format!("invalid table name: {name:?}")))
    }
}

/// Get the default data directory for Eventide
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".eventide"))
        .unwrap_or_else(|| std::path::PathBuf::from(".eventide"))
}

/// Get the default database path
pub fn default_db_path() -> std::path::PathBuf {
    default_data_dir().join("events.db")
}
