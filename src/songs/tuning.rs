//! Guitar tuning vocabulary shared by import validation and tuning-based sorting.

use super::normalize::normalize_key;

/// Canonical tuning names with the spellings bands commonly type for them.
const TUNINGS: &[(&str, &[&str])] = &[
    ("Standard", &["e standard", "std", "e", "e std", "standard e"]),
    (
        "Half Step Down",
        &["eb standard", "eb", "e flat", "half step", "d# standard", "eb std"],
    ),
    ("Drop D", &["dropd", "drop-d"]),
    (
        "Whole Step Down",
        &["d standard", "d std", "whole step", "full step down"],
    ),
    ("Drop C#", &["drop db", "drop c sharp", "drop-c#"]),
    ("Drop C", &["dropc", "drop-c"]),
    ("C Standard", &["c std"]),
    ("Drop B", &["dropb", "drop-b"]),
    ("B Standard", &["b std"]),
    ("Open G", &["open-g"]),
    ("Open D", &["open-d"]),
    ("Open E", &["open-e"]),
    ("DADGAD", &["d a d g a d"]),
];

/// Maps free-form input to a canonical tuning name, if it is one we know.
pub fn canonical_tuning(raw: &str) -> Option<&'static str> {
    let key = normalize_key(raw);
    if key.is_empty() {
        return None;
    }
    TUNINGS.iter().find_map(|(canonical, aliases)| {
        let matches = normalize_key(canonical) == key || aliases.iter().any(|a| *a == key);
        matches.then_some(*canonical)
    })
}

pub fn known_tunings() -> impl Iterator<Item = &'static str> {
    TUNINGS.iter().map(|(canonical, _)| *canonical)
}
