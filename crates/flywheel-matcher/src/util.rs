//! Small helpers shared by behavioral and proactive scoring.

use regex::Regex;

use flywheel_core::model::{PatternRole, Tag};

/// Longest common prefix of a set of tag names. Empty if `names` is empty
/// or shares no prefix at all.
pub fn common_prefix(names: &[&str]) -> String {
    let Some(first) = names.first() else {
        return String::new();
    };
    let mut prefix = first.to_string();
    for name in &names[1..] {
        let common_len = prefix
            .chars()
            .zip(name.chars())
            .take_while(|(a, b)| a == b)
            .count();
        prefix.truncate(prefix.char_indices().nth(common_len).map(|(i, _)| i).unwrap_or(prefix.len()));
    }
    prefix
}

/// True if any of `role`'s naming regexes (case-insensitive) matches any
/// of `tags`' names. An invalid regex is treated as unmatched, never a
/// hard error (spec note on `PatternRole::naming_patterns`).
pub fn role_matches_any_tag(role: &PatternRole, tags: &[&Tag]) -> bool {
    role.naming_patterns.iter().any(|pattern| {
        Regex::new(&format!("(?i){pattern}"))
            .map(|re| tags.iter().any(|t| re.is_match(&t.name)))
            .unwrap_or(false)
    })
}

/// Splits a tag name into tokens on `[_.\-\s]+`, dropping empty segments.
pub fn tokenize(name: &str) -> Vec<String> {
    Regex::new(r"[_.\-\s]+")
        .unwrap()
        .split(name)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_prefix_of_shared_names() {
        assert_eq!(common_prefix(&["PUMP_101_DISCHARGE", "PUMP_101_SUCTION"]), "PUMP_101_");
    }

    #[test]
    fn common_prefix_of_single_name_is_itself() {
        assert_eq!(common_prefix(&["PUMP_101_DISCHARGE"]), "PUMP_101_DISCHARGE");
    }

    #[test]
    fn common_prefix_of_empty_slice_is_empty() {
        assert_eq!(common_prefix(&[]), "");
    }

    #[test]
    fn tokenize_splits_on_separators() {
        assert_eq!(tokenize("PUMP-101_DIS.PRESS"), vec!["PUMP", "101", "DIS", "PRESS"]);
    }
}
