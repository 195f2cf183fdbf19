//! Sanitizer rule tables.
//!
//! The tables are ordered: full-name replacements run before any algorithmic
//! transformation, partial replacements run after title casing, and the case
//! exception words are consulted both during title casing and in the final
//! site-wide passes. Order within each table is significant and preserved.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

// Known-bad source strings fixed verbatim before any other rule runs.
const DEFAULT_FULL_NAME_REPLACEMENTS: &[(&str, &[&str])] = &[
    ("Amateur Radio Club-K4UCF", &["AMATEUR RADIO CLUB-K4UCF"]),
    (
        "Burnett School of Biomedical Sciences",
        &[
            "BIOMEDICAL SCIENCES, BURNETT SCHOOL OF",
            "Biomedical Sciences, Burnett School of",
        ],
    ),
    (
        "Student Government Association",
        &["SGA, UCF STUDENT GOVERNMENT ASSN"],
    ),
];

// Abbreviation expansions applied as plain substring replacements. Entries
// are written so a replacement never re-matches its own output.
const DEFAULT_PARTIAL_REPLACEMENTS: &[(&str, &[&str])] = &[
    ("Department", &["Dept.", "Dept"]),
    ("Engineering", &["Engr.", "Engr"]),
    ("Environmental,", &["Environ,"]),
    ("Construction ", &["Constr "]),
    ("Management", &["Mgmt"]),
    ("Sciences", &["Sci."]),
    ("and", &["&"]),
];

const DEFAULT_LOWERCASE_WORDS: &[&str] = &["and", "of", "for", "in", "at"];

const DEFAULT_UPPERCASE_WORDS: &[&str] = &[
    "UCF", "ROTC", "NASA", "CREOL", "FIEA", "COHPA", "CECS", "NSCM", "WUCF", "UCFPD",
];

/// One full-name rule: the canonical replacement and the exact raw strings
/// it fixes.
#[derive(Debug, Clone, Deserialize)]
pub struct FullNameRule {
    pub replacement: String,
    pub matches: Vec<String>,
}

/// One partial rule: the replacement and the substrings it expands.
#[derive(Debug, Clone, Deserialize)]
pub struct PartialRule {
    pub replacement: String,
    pub matches: Vec<String>,
}

/// The four externally-supplied rule tables consumed by the sanitizer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SanitizerRules {
    pub full_name_replacements: Vec<FullNameRule>,
    pub partial_replacements: Vec<PartialRule>,
    pub lowercase_words: Vec<String>,
    pub uppercase_words: Vec<String>,
}

impl Default for SanitizerRules {
    fn default() -> Self {
        SanitizerRules {
            full_name_replacements: DEFAULT_FULL_NAME_REPLACEMENTS
                .iter()
                .map(|(replacement, matches)| FullNameRule {
                    replacement: replacement.to_string(),
                    matches: matches.iter().map(|m| m.to_string()).collect(),
                })
                .collect(),
            partial_replacements: DEFAULT_PARTIAL_REPLACEMENTS
                .iter()
                .map(|(replacement, matches)| PartialRule {
                    replacement: replacement.to_string(),
                    matches: matches.iter().map(|m| m.to_string()).collect(),
                })
                .collect(),
            lowercase_words: DEFAULT_LOWERCASE_WORDS
                .iter()
                .map(|w| w.to_string())
                .collect(),
            uppercase_words: DEFAULT_UPPERCASE_WORDS
                .iter()
                .map(|w| w.to_string())
                .collect(),
        }
    }
}

impl SanitizerRules {
    /// Load rule tables from a JSON document. Tables missing from the
    /// document fall back to the built-in defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules file: {}", path.display()))?;
        let rules: SanitizerRules = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse rules file: {}", path.display()))?;
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tables_present() {
        let rules = SanitizerRules::default();
        assert!(!rules.full_name_replacements.is_empty());
        assert!(!rules.partial_replacements.is_empty());
        assert_eq!(
            rules.lowercase_words,
            vec!["and", "of", "for", "in", "at"]
        );
        assert!(rules.uppercase_words.contains(&"UCF".to_string()));
    }

    #[test]
    fn test_partial_table_order_preserved() {
        let rules = SanitizerRules::default();
        // "Dept." must run before "Dept" so the period is consumed too.
        let dept = rules
            .partial_replacements
            .iter()
            .find(|r| r.replacement == "Department")
            .unwrap();
        assert_eq!(dept.matches, vec!["Dept.", "Dept"]);
    }

    #[test]
    fn test_rules_parse_from_json() {
        let json = r#"{
            "full_name_replacements": [
                {"replacement": "Fixed Name", "matches": ["FIXED NAME, THE"]}
            ],
            "lowercase_words": ["of"]
        }"#;
        let rules: SanitizerRules = serde_json::from_str(json).unwrap();
        assert_eq!(rules.full_name_replacements.len(), 1);
        assert_eq!(rules.full_name_replacements[0].replacement, "Fixed Name");
        assert_eq!(rules.lowercase_words, vec!["of"]);
        // Omitted tables inherit the defaults.
        assert!(!rules.partial_replacements.is_empty());
    }
}
