//! Event - The immutable record of one entity mutation
//!
//! Every create, update, delete or custom verb applied to an entity is
//! captured as an [`Event`]. Events are assigned their `id`, `sequence` and
//! `timestamp` by the log at append time and never change afterwards.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// The action / activity / past-participle naming triple for a verb
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Conjugation {
    /// Imperative form (`qualify`)
    pub action: String,
    /// Progressive form (`qualifying`)
    pub activity: String,
    /// Past participle (`qualified`), used as the event type suffix
    pub event: String,
}

impl Conjugation {
    /// Create a conjugation from explicit forms
    pub fn new(
        action: impl Into<String>,
        activity: impl Into<String>,
        event: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            activity: activity.into(),
            event: event.into(),
        }
    }

    /// Derive the triple from a regular English verb.
    ///
    /// Handles the silent-e (`close` -> `closing`/`closed`) and consonant-y
    /// (`qualify` -> `qualifying`/`qualified`) rules. Final consonants are
    /// never doubled; irregular verbs should use [`Conjugation::new`].
    #[must_use]
    pub fn from_verb(verb: &str) -> Self {
        let verb = verb.trim();
        let lower = verb.to_ascii_lowercase();

        let (activity, event) = if lower.ends_with("ee") {
            (format!("{verb}ing"), format!("{verb}d"))
        } else if lower.ends_with('e') {
            let stem = &verb[..verb.len() - 1];
            (format!("{stem}ing"), format!("{verb}d"))
        } else if ends_with_consonant_y(&lower) {
            let stem = &verb[..verb.len() - 1];
            (format!("{verb}ing"), format!("{stem}ied"))
        } else {
            (format!("{verb}ing"), format!("{verb}ed"))
        };

        Self {
            action: verb.to_string(),
            activity,
            event,
        }
    }
}

fn ends_with_consonant_y(word: &str) -> bool {
    let mut chars = word.chars().rev();
    match (chars.next(), chars.next()) {
        (Some('y'), Some(prev)) => !matches!(prev, 'a' | 'e' | 'i' | 'o' | 'u'),
        _ => false,
    }
}

/// An immutable, appended event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Globally unique identifier (UUID v7)
    pub id: String,
    /// `{entityType}.{conjugation.event}`
    pub event_type: String,
    /// Subject entity type
    pub entity_type: String,
    /// Subject entity identifier
    pub entity_id: String,
    /// Verb that produced the event
    pub verb: String,
    /// Naming triple for the verb
    pub conjugation: Conjugation,
    /// Caller-supplied payload (e.g. verb arguments)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Field state before the mutation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    /// Field state after the mutation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
    /// Tenant / request context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Acting principal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// Per-entity sequence, starting at 1
    pub sequence: i64,
    /// Append time
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Build the event from its input and the values assigned by the log
    pub(crate) fn from_input(
        input: AppendInput,
        id: String,
        sequence: i64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            event_type: input.event_type(),
            entity_type: input.entity_type,
            entity_id: input.entity_id,
            verb: input.verb,
            conjugation: input.conjugation,
            data: input.data,
            before: input.before,
            after: input.after,
            context: input.context,
            actor: input.actor,
            sequence,
            timestamp,
        }
    }

    /// Ordering key used across entities (CDC order)
    #[must_use]
    pub fn position(&self) -> (DateTime<Utc>, &str) {
        (self.timestamp, self.id.as_str())
    }
}

/// Everything an append needs except the log-assigned fields
#[derive(Debug, Clone, PartialEq)]
pub struct AppendInput {
    /// Subject entity type
    pub entity_type: String,
    /// Subject entity identifier
    pub entity_id: String,
    /// Verb name
    pub verb: String,
    /// Naming triple
    pub conjugation: Conjugation,
    /// Caller payload
    pub data: Option<serde_json::Value>,
    /// Pre-mutation snapshot
    pub before: Option<serde_json::Value>,
    /// Post-mutation snapshot
    pub after: Option<serde_json::Value>,
    /// Tenant / request context
    pub context: Option<String>,
    /// Acting principal
    pub actor: Option<String>,
}

impl AppendInput {
    /// Create an input with a conjugation derived from `verb`
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        verb: impl Into<String>,
    ) -> Self {
        let verb = verb.into();
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            conjugation: Conjugation::from_verb(&verb),
            verb,
            data: None,
            before: None,
            after: None,
            context: None,
            actor: None,
        }
    }

    /// A `create` carrying only the resulting state
    pub fn create(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        after: serde_json::Value,
    ) -> Self {
        Self::new(entity_type, entity_id, "create").with_after(after)
    }

    /// An `update` carrying both snapshots
    pub fn update(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        before: serde_json::Value,
        after: serde_json::Value,
    ) -> Self {
        Self::new(entity_type, entity_id, "update")
            .with_before(before)
            .with_after(after)
    }

    /// A `delete` carrying only the prior state
    pub fn delete(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        before: serde_json::Value,
    ) -> Self {
        Self::new(entity_type, entity_id, "delete").with_before(before)
    }

    /// Override the derived conjugation
    #[must_use]
    pub fn with_conjugation(mut self, conjugation: Conjugation) -> Self {
        self.conjugation = conjugation;
        self
    }

    /// Set the caller payload
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the pre-mutation snapshot
    #[must_use]
    pub fn with_before(mut self, before: serde_json::Value) -> Self {
        self.before = Some(before);
        self
    }

    /// Set the post-mutation snapshot
    #[must_use]
    pub fn with_after(mut self, after: serde_json::Value) -> Self {
        self.after = Some(after);
        self
    }

    /// Set the tenant / request context
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set the acting principal
    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// The event type this input will be appended under
    #[must_use]
    pub fn event_type(&self) -> String {
        format!("{}.{}", self.entity_type, self.conjugation.event)
    }
}

/// Current time at the precision the logs persist (microseconds)
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Smallest stored-precision timestamp at or after `ts`.
///
/// Stored timestamps are whole microseconds, so `t >= ts` holds exactly when
/// `t >= ceil_micros(ts)`.
#[must_use]
pub fn ceil_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = ts.trunc_subsecs(6);
    if truncated < ts {
        truncated + chrono::Duration::microseconds(1)
    } else {
        truncated
    }
}

/// Largest stored-precision timestamp at or before `ts`
#[must_use]
pub fn floor_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

/// Fixed-width ISO-8601 rendering; sorts lexicographically in time order
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored ISO-8601 timestamp
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// Serde adapter writing timestamps in the fixed-width stored form
pub mod timestamp_format {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as fixed-width RFC 3339 with microseconds
    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(ts))
    }

    /// Parse any RFC 3339 timestamp
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_timestamp(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conjugation_regular_verbs() {
        assert_eq!(
            Conjugation::from_verb("create"),
            Conjugation::new("create", "creating", "created")
        );
        assert_eq!(
            Conjugation::from_verb("update"),
            Conjugation::new("update", "updating", "updated")
        );
        assert_eq!(
            Conjugation::from_verb("delete"),
            Conjugation::new("delete", "deleting", "deleted")
        );
        assert_eq!(
            Conjugation::from_verb("qualify"),
            Conjugation::new("qualify", "qualifying", "qualified")
        );
        assert_eq!(
            Conjugation::from_verb("close"),
            Conjugation::new("close", "closing", "closed")
        );
        assert_eq!(
            Conjugation::from_verb("publish"),
            Conjugation::new("publish", "publishing", "published")
        );
        assert_eq!(
            Conjugation::from_verb("agree"),
            Conjugation::new("agree", "agreeing", "agreed")
        );
        assert_eq!(
            Conjugation::from_verb("stay"),
            Conjugation::new("stay", "staying", "stayed")
        );
    }

    #[test]
    fn test_append_input_event_type() {
        let input = AppendInput::new("Contact", "contact_1", "qualify");
        assert_eq!(input.event_type(), "Contact.qualified");

        let input = input.with_conjugation(Conjugation::new("win", "winning", "won"));
        assert_eq!(input.event_type(), "Contact.won");
    }

    #[test]
    fn test_append_input_shapes() {
        let create = AppendInput::create("Contact", "c1", json!({"name": "Alice"}));
        assert!(create.before.is_none());
        assert!(create.after.is_some());

        let delete = AppendInput::delete("Contact", "c1", json!({"name": "Alice"}));
        assert!(delete.before.is_some());
        assert!(delete.after.is_none());
        assert_eq!(delete.event_type(), "Contact.deleted");
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let input = AppendInput::create("Deal", "d1", json!({"amount": 10}))
            .with_actor("user_1")
            .with_context("tenant_a");
        let event = Event::from_input(input, "evt".to_string(), 1, now());

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["eventType"], "Deal.created");
        assert_eq!(value["entityType"], "Deal");
        assert_eq!(value["entityId"], "d1");
        assert_eq!(value["conjugation"]["activity"], "creating");
        assert!(value.get("before").is_none());

        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_timestamp_format_sorts_lexicographically() {
        let earlier = parse_timestamp("2026-01-01T00:00:00.5Z").unwrap();
        let later = parse_timestamp("2026-01-01T00:00:01Z").unwrap();
        assert!(format_timestamp(&earlier) < format_timestamp(&later));
        assert_eq!(format_timestamp(&earlier), "2026-01-01T00:00:00.500000Z");
    }

    #[test]
    fn test_micro_rounding() {
        let exact = parse_timestamp("2026-01-01T00:00:00.000001Z").unwrap();
        let finer = exact + chrono::Duration::nanoseconds(500);

        assert_eq!(ceil_micros(exact), exact);
        assert_eq!(floor_micros(exact), exact);
        assert_eq!(ceil_micros(finer), exact + chrono::Duration::microseconds(1));
        assert_eq!(floor_micros(finer), exact);
    }
}
