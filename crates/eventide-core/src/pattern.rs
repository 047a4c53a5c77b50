//! Pattern - Event type matching
//!
//! Event types have the shape `{entityType}.{event}`. Subscribers register
//! glob patterns against them:
//!
//! - `*` matches everything
//! - `Contact.*` matches every event of one entity type
//! - `*.created` matches one event across all entity types
//! - anything else must equal the event type exactly
//!
//! Compound patterns join clauses with `,` (OR) and may prefix a clause with
//! `!` to invert it. Patterns are parsed once into a [`Matcher`].

use std::fmt;

/// A single parsed glob clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// `*`
    MatchAll,
    /// Whole event type must be equal
    ExactType(String),
    /// `*.{event}`
    WildcardEntity {
        /// Required verb part
        event: String,
    },
    /// `{entity}.*`
    WildcardVerb {
        /// Required entity part
        entity: String,
    },
}

impl Pattern {
    /// Parse one clause (no `,` or `!` handling)
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim();
        if pattern == "*" {
            return Self::MatchAll;
        }
        match pattern.split_once('.') {
            Some(("*", event)) => Self::WildcardEntity {
                event: event.to_string(),
            },
            Some((entity, "*")) => Self::WildcardVerb {
                entity: entity.to_string(),
            },
            _ => Self::ExactType(pattern.to_string()),
        }
    }

    /// Check whether this clause accepts the event type
    #[must_use]
    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Self::MatchAll => true,
            Self::ExactType(expected) => expected == event_type,
            Self::WildcardEntity { event } => {
                split_type(event_type).is_some_and(|(_, verb)| verb == event)
            }
            Self::WildcardVerb { entity } => {
                split_type(event_type).is_some_and(|(ent, _)| ent == entity)
            }
        }
    }
}

fn split_type(event_type: &str) -> Option<(&str, &str)> {
    event_type.split_once('.')
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    negated: bool,
    pattern: Pattern,
}

/// A parsed, possibly compound, subscription pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    source: String,
    clauses: Vec<Clause>,
}

impl Matcher {
    /// Parse a pattern, splitting OR clauses on `,`
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        let clauses = pattern
            .split(',')
            .map(str::trim)
            .filter(|clause| !clause.is_empty())
            .map(|clause| match clause.strip_prefix('!') {
                Some(rest) => Clause {
                    negated: true,
                    pattern: Pattern::parse(rest),
                },
                None => Clause {
                    negated: false,
                    pattern: Pattern::parse(clause),
                },
            })
            .collect();

        Self {
            source: pattern.to_string(),
            clauses,
        }
    }

    /// Any clause accepting the event type accepts the event
    #[must_use]
    pub fn matches(&self, event_type: &str) -> bool {
        self.clauses
            .iter()
            .any(|clause| clause.pattern.matches(event_type) != clause.negated)
    }

    /// The pattern text this matcher was parsed from
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// One-shot match of a pattern string against an event type
#[must_use]
pub fn matches_pattern(pattern: &str, event_type: &str) -> bool {
    Matcher::parse(pattern).matches(event_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_all() {
        assert!(matches_pattern("*", "Contact.created"));
        assert!(matches_pattern("*", "anything"));
        assert!(matches_pattern("*", ""));
    }

    #[test]
    fn test_wildcard_verb() {
        assert!(matches_pattern("Contact.*", "Contact.created"));
        assert!(matches_pattern("Contact.*", "Contact.qualified"));
        assert!(!matches_pattern("Contact.*", "Deal.created"));
        assert!(!matches_pattern("Contact.*", "Contacts.created"));
    }

    #[test]
    fn test_wildcard_entity() {
        assert!(matches_pattern("*.created", "Contact.created"));
        assert!(matches_pattern("*.created", "Deal.created"));
        assert!(!matches_pattern("*.created", "Deal.closed"));
    }

    #[test]
    fn test_exact() {
        assert!(matches_pattern("Deal.closed", "Deal.closed"));
        assert!(!matches_pattern("Deal.closed", "Deal.closedx"));
        assert!(!matches_pattern("Deal", "Deal.closed"));
    }

    #[test]
    fn test_parse_variants() {
        assert_eq!(Pattern::parse("*"), Pattern::MatchAll);
        assert_eq!(
            Pattern::parse("*.created"),
            Pattern::WildcardEntity {
                event: "created".to_string()
            }
        );
        assert_eq!(
            Pattern::parse("Contact.*"),
            Pattern::WildcardVerb {
                entity: "Contact".to_string()
            }
        );
        assert_eq!(
            Pattern::parse("Contact.created"),
            Pattern::ExactType("Contact.created".to_string())
        );
    }

    #[test]
    fn test_compound_or() {
        let matcher = Matcher::parse("Contact.*, Deal.closed");
        assert!(matcher.matches("Contact.updated"));
        assert!(matcher.matches("Deal.closed"));
        assert!(!matcher.matches("Deal.created"));
    }

    #[test]
    fn test_negation() {
        let matcher = Matcher::parse("!Contact.*");
        assert!(!matcher.matches("Contact.created"));
        assert!(matcher.matches("Deal.created"));
    }

    #[test]
    fn test_empty_pattern_matches_nothing() {
        assert!(!Matcher::parse("").matches("Contact.created"));
    }

    #[test]
    fn test_display_keeps_source() {
        assert_eq!(Matcher::parse("Deal.*").to_string(), "Deal.*");
    }
}
