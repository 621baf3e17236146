//! Preference resolution.
//!
//! A user's stored selection is a list of topic strings. Entries prefixed with
//! `major:` name an external source; everything else is a topic key in the
//! event store. Older records store the list in several encodings, which are
//! all normalized here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::EXTERNAL_SOURCE_PREFIX;

/// The preference list split by where its events come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPreferences {
    pub direct_topics: Vec<String>,
    /// Source names with the `major:` prefix removed.
    pub external_sources: Vec<String>,
}

impl ResolvedPreferences {
    pub fn is_empty(&self) -> bool {
        self.direct_topics.is_empty() && self.external_sources.is_empty()
    }
}

/// Partition preference entries by the `major:` prefix convention.
///
/// Order and duplicates are kept.
pub fn resolve<S: AsRef<str>>(preferences: &[S]) -> ResolvedPreferences {
    let mut resolved = ResolvedPreferences::default();

    for entry in preferences.iter().map(|p| p.as_ref().trim()) {
        if entry.is_empty() {
            continue;
        }
        match entry.strip_prefix(EXTERNAL_SOURCE_PREFIX) {
            Some(source) if !source.trim().is_empty() => {
                resolved.external_sources.push(source.trim().to_string());
            }
            Some(_) => {}
            None => resolved.direct_topics.push(entry.to_string()),
        }
    }

    resolved
}

/// Normalize a stored preference value to a list of strings.
///
/// Accepts a JSON array, a string holding a JSON-encoded array, a
/// comma-separated string, or a bare scalar.
pub fn preference_list_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
        Value::String(text) => preference_list_from_text(text),
        other => scalar_to_string(other).into_iter().collect(),
    }
}

/// Normalize a textual preference encoding (see [`preference_list_from_value`]).
pub fn preference_list_from_text(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if text.starts_with('[')
        && let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text)
    {
        return items.iter().filter_map(scalar_to_string).collect();
    }

    text.split(',')
        .map(|part| part.trim().trim_matches('"').trim())
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_partitions_by_prefix() {
        let resolved = resolve(&["chess", "major:Computer Science", "robotics", "major:Music"]);
        assert_eq!(resolved.direct_topics, vec!["chess", "robotics"]);
        assert_eq!(resolved.external_sources, vec!["Computer Science", "Music"]);
    }

    #[test]
    fn test_resolve_keeps_duplicates_and_skips_blanks() {
        let resolved = resolve(&["chess", " ", "chess", "major:", "major:Art"]);
        assert_eq!(resolved.direct_topics, vec!["chess", "chess"]);
        assert_eq!(resolved.external_sources, vec!["Art"]);
        assert!(resolve::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_value_encodings_are_normalized() {
        let expected = vec!["chess".to_string(), "major:Art".to_string()];

        assert_eq!(preference_list_from_value(&json!(["chess", "major:Art"])), expected);
        assert_eq!(
            preference_list_from_value(&json!("[\"chess\",\"major:Art\"]")),
            expected
        );
        assert_eq!(preference_list_from_value(&json!("chess, major:Art")), expected);
        assert_eq!(preference_list_from_value(&json!("chess")), vec!["chess"]);
        assert_eq!(preference_list_from_value(&json!(17)), vec!["17"]);
        assert!(preference_list_from_value(&json!(null)).is_empty());
        assert!(preference_list_from_value(&json!("")).is_empty());
    }

    #[test]
    fn test_malformed_json_text_falls_back_to_commas() {
        assert_eq!(
            preference_list_from_text("[\"chess\", \"robotics\""),
            vec!["[\"chess", "robotics"]
        );
    }
}
