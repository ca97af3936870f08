//! Canonical category taxonomy.
//!
//! Categories given on the command line or in a registry file are folded
//! into this vocabulary before they reach [`crate::sources::SourceDefinition::resolve_url`].
//! Tokens that are not known pass through lowercased; each source then
//! decides how to treat them (see the resolution order on
//! [`crate::sources::SourceDefinition`]).

/// Categories every built-in source is configured against.
pub const CANONICAL: [&str; 10] = [
    "world",
    "technology",
    "business",
    "science",
    "sport",
    "arts",
    "environment",
    "health",
    "politics",
    "entertainment",
];

/// Default rotation when none is configured.
pub const DEFAULT_ROTATION: [&str; 6] = ["world", "technology", "business", "science", "sport", "arts"];

const ALIASES: &[(&str, &str)] = &[
    ("tech", "technology"),
    ("sports", "sport"),
    ("culture", "arts"),
    ("art", "arts"),
    ("economy", "business"),
    ("money", "business"),
    ("climate", "environment"),
    ("news", "world"),
    ("international", "world"),
    ("entertainment-arts", "entertainment"),
];

/// Fold a user supplied category into the canonical vocabulary.
///
/// Lowercases, trims, turns inner spaces and underscores into `-`, then
/// applies the alias table. Never fails.
pub fn canonicalize(input: &str) -> String {
    let token = input
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == token)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(token)
}

pub fn is_canonical(category: &str) -> bool {
    CANONICAL.contains(&category)
}

/// Parse a comma separated category list, canonicalizing and dropping
/// empties and repeats while keeping first-seen order.
pub fn parse_list(input: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for c in input.split(',').map(canonicalize).filter(|c| !c.is_empty()) {
        if !out.contains(&c) {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_aliases() {
        assert_eq!(canonicalize("Tech"), "technology");
        assert_eq!(canonicalize(" sports "), "sport");
        assert_eq!(canonicalize("culture"), "arts");
        assert_eq!(canonicalize("WORLD"), "world");
    }

    #[test]
    fn test_canonicalize_unknown_passes_through() {
        assert_eq!(canonicalize("Global Development"), "global-development");
        assert_eq!(canonicalize("middle_east"), "middle-east");
        assert!(!is_canonical("middle-east"));
    }

    #[test]
    fn test_parse_list_dedups_and_keeps_order() {
        assert_eq!(
            parse_list("tech, world,technology,,Sport"),
            vec!["technology", "world", "sport"]
        );
        assert!(parse_list(" , ").is_empty());
    }

    #[test]
    fn test_default_rotation_is_canonical() {
        for c in DEFAULT_ROTATION {
            assert!(is_canonical(c));
        }
    }
}
