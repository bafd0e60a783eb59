//! Label sanitization rules shared by every child-resource builder.

use std::collections::BTreeMap;

/// Replaces any character not in `[A-Za-z0-9._-]` with `-` and truncates to
/// the RFC 1123 label limit of 63 characters.
pub fn sanitize_label_value(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    replaced.chars().take(63).collect()
}

/// Merges label maps left-to-right so that later maps win on key conflict,
/// then sanitizes every value.
pub fn merge_labels(maps: &[&BTreeMap<String, String>]) -> BTreeMap<String, String> {
    let mut merged = BTreeMap::new();
    for map in maps {
        for (k, v) in map.iter() {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
        .into_iter()
        .map(|(k, v)| (k, sanitize_label_value(&v)))
        .collect()
}

/// Truncates `name` to `max_len` characters, used for deterministic child
/// resource naming (e.g. `<console_name,55>-console`).
pub fn truncate(name: &str, max_len: usize) -> String {
    name.chars().take(max_len).collect()
}
