//! User-declared suppression and categorization rules applied at
//! ingestion. Ignore rules are substring matches on the normalized
//! description; category mapping rules are exact matches.

use serde::{Deserialize, Serialize};

use crate::normalize::normalize_description;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoreRule {
    pub pattern: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryMappingRule {
    pub match_key: String,
    pub category: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct RuleFile {
    #[serde(default)]
    ignore: Vec<IgnoreRule>,
    #[serde(default)]
    category: Vec<CategoryMappingRule>,
}

/// Active rules, with patterns pre-normalized so per-row matching is a
/// plain substring/equality test.
pub struct RuleSet {
    ignore: Vec<IgnoreRule>,
    category: Vec<CategoryMappingRule>,
}

impl RuleSet {
    pub fn new(ignore: Vec<IgnoreRule>, category: Vec<CategoryMappingRule>) -> Self {
        let ignore = ignore
            .into_iter()
            .filter(|r| r.active)
            .map(|r| IgnoreRule {
                pattern: normalize_description(&r.pattern),
                active: true,
            })
            .filter(|r| !r.pattern.is_empty())
            .collect();
        let category = category
            .into_iter()
            .filter(|r| r.active)
            .map(|r| CategoryMappingRule {
                match_key: normalize_description(&r.match_key),
                category: r.category,
                active: true,
            })
            .filter(|r| !r.match_key.is_empty())
            .collect();
        RuleSet { ignore, category }
    }

    pub fn empty() -> Self {
        RuleSet {
            ignore: Vec::new(),
            category: Vec::new(),
        }
    }

    pub fn from_toml(toml_content: &str) -> Result<Self, String> {
        let file: RuleFile =
            toml::from_str(toml_content).map_err(|e| format!("Failed to parse TOML: {e}"))?;
        Ok(Self::new(file.ignore, file.category))
    }

    /// True when any active ignore rule's pattern appears in the
    /// normalized description.
    pub fn is_ignored(&self, normalized_description: &str) -> bool {
        self.ignore
            .iter()
            .any(|r| normalized_description.contains(&r.pattern))
    }

    /// Category for an exact normalized-description match, if any.
    pub fn category_for(&self, normalized_description: &str) -> Option<&str> {
        self.category
            .iter()
            .find(|r| r.match_key == normalized_description)
            .map(|r| r.category.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ignore(pattern: &str) -> IgnoreRule {
        IgnoreRule {
            pattern: pattern.to_string(),
            active: true,
        }
    }

    #[test]
    fn ignore_matches_substring_of_normalized_text() {
        let rules = RuleSet::new(vec![ignore("VENMO *cashout")], vec![]);
        assert!(rules.is_ignored("venmo cashout 99213"));
        assert!(!rules.is_ignored("venmo payment"));
    }

    #[test]
    fn inactive_rules_are_dropped() {
        let rules = RuleSet::new(
            vec![IgnoreRule {
                pattern: "venmo".to_string(),
                active: false,
            }],
            vec![],
        );
        assert!(!rules.is_ignored("venmo cashout"));
    }

    #[test]
    fn category_match_is_exact_not_substring() {
        let rules = RuleSet::new(
            vec![],
            vec![CategoryMappingRule {
                match_key: "Shell Oil".to_string(),
                category: "Gas".to_string(),
                active: true,
            }],
        );
        assert_eq!(rules.category_for("shell oil"), Some("Gas"));
        assert_eq!(rules.category_for("shell oil 123 main st"), None);
    }

    #[test]
    fn from_toml_parses_both_tables() {
        let toml = r#"
            [[ignore]]
            pattern = "zelle to landlord"

            [[category]]
            match_key = "netflix com"
            category = "Entertainment"
        "#;
        let rules = RuleSet::from_toml(toml).unwrap();
        assert!(rules.is_ignored("zelle to landlord apr"));
        assert_eq!(rules.category_for("netflix com"), Some("Entertainment"));
    }
}
