use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Deserialize;

use crate::config::DEFAULT_SUBSTITUTIONS;

#[derive(Debug, Clone, Deserialize)]
struct SubstitutionEntry {
    term: String,
    replacement: String,
}

/// Disallowed term → benign replacement, in application order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionTable {
    entries: Vec<(String, String)>,
}

impl SubstitutionTable {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(term, replacement)| {
                let term: String = term.into();
                (term.trim().to_lowercase(), replacement.into())
            })
            .filter(|(term, _)| !term.is_empty())
            .collect();
        Self { entries }
    }

    /// Reads a YAML list of `{ term, replacement }` entries.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            anyhow!(
                "Failed to read substitution table '{}': {}",
                path.display(),
                err
            )
        })?;
        Self::from_yaml_str(&raw)
            .map_err(|err| anyhow!("Invalid substitution table '{}': {}", path.display(), err))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let entries: Vec<SubstitutionEntry> = serde_yaml::from_str(raw)?;
        if entries.is_empty() {
            return Err(anyhow!("substitution table has no entries"));
        }
        Ok(Self::new(
            entries
                .into_iter()
                .map(|entry| (entry.term, entry.replacement)),
        ))
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
}

impl Default for SubstitutionTable {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSTITUTIONS.iter().copied())
    }
}

/// Rewrites keyword input so disallowed terms become their benign
/// replacements.
///
/// Terms match anywhere in the text, inside compound words too, in their
/// lowercase and title-case forms. Matching happens in one left-to-right
/// pass (longest term first at each position), so replacement text is never
/// scanned again.
#[derive(Debug, Clone)]
pub struct ContentSanitizer {
    pattern: Option<Regex>,
    replacements: HashMap<String, String>,
}

impl ContentSanitizer {
    pub fn new(table: &SubstitutionTable) -> Result<Self> {
        let mut replacements = HashMap::new();
        let mut forms: Vec<String> = Vec::new();
        for (term, replacement) in table.entries() {
            for form in [term.clone(), title_case(term)] {
                // First entry wins when a table lists the same term twice.
                if !replacements.contains_key(&form) {
                    replacements.insert(form.clone(), replacement.clone());
                    forms.push(form);
                }
            }
        }
        forms.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));

        let pattern = if forms.is_empty() {
            None
        } else {
            let alternation = forms
                .iter()
                .map(|form| regex::escape(form))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = Regex::new(&alternation).with_context(|| {
                format!(
                    "Failed to build sanitizer pattern from {} substitution terms",
                    table.entries().len()
                )
            })?;
            Some(pattern)
        };

        Ok(Self {
            pattern,
            replacements,
        })
    }

    pub fn sanitize(&self, text: &str) -> String {
        let Some(pattern) = &self.pattern else {
            return text.to_string();
        };
        pattern
            .replace_all(text, |caps: &regex::Captures| {
                let matched = &caps[0];
                self.replacements
                    .get(matched)
                    .cloned()
                    .unwrap_or_else(|| matched.to_string())
            })
            .into_owned()
    }
}

fn title_case(term: &str) -> String {
    term.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn christmas() -> ContentSanitizer {
        ContentSanitizer::new(&SubstitutionTable::default()).unwrap()
    }

    #[test]
    fn clean_input_is_unchanged() {
        let sanitizer = christmas();
        for text in [
            "train, snow, hot chocolate",
            "cozy blanket, skating, singing elves",
            "",
            "Aurora borealis over a tiny mountain cabin",
        ] {
            assert_eq!(sanitizer.sanitize(text), text);
        }
    }

    #[test]
    fn replaces_lowercase_and_title_case_forms() {
        let sanitizer = christmas();
        assert_eq!(sanitizer.sanitize("a ghost and a Zombie"), "a shy winter ghost and a sleepy snowwalker");
        assert_eq!(sanitizer.sanitize("Beer, wine"), "gingerbread soda, sparkling cranberry juice");
        assert_eq!(sanitizer.sanitize("GUN"), "GUN");
    }

    #[test]
    fn prefers_longer_terms_and_never_rescans_replacements() {
        let sanitizer = christmas();
        assert_eq!(sanitizer.sanitize("swords"), "candy cane swords");
        assert_eq!(sanitizer.sanitize("guns"), "snowball blasters");
        assert_eq!(sanitizer.sanitize("fighting"), "playing with snowballs");
        assert_eq!(sanitizer.sanitize("Killing"), "defeating in a snowball game");
    }

    #[test]
    fn replaces_terms_inside_compound_words() {
        let sanitizer = christmas();
        assert_eq!(sanitizer.sanitize("bloodbath"), "red cranberry saucebath");
        assert_eq!(sanitizer.sanitize("zombieland"), "sleepy snowwalkerland");
        assert_eq!(
            sanitizer.sanitize("killer robots"),
            "defeat in a snowball gameer robots"
        );
        assert_eq!(
            sanitizer.sanitize("gunfight"),
            "snowball blasterplayful snowball fight"
        );
        assert_eq!(
            sanitizer.sanitize("Swordfight"),
            "candy cane swordplayful snowball fight"
        );
        assert_eq!(sanitizer.sanitize("warm drumming"), "snowball tournamentm dvanilla sugar syrupming");
    }

    #[test]
    fn covers_every_default_term() {
        let sanitizer = christmas();
        let table = SubstitutionTable::default();
        for (term, replacement) in table.entries() {
            if replacement.contains(term.as_str()) {
                continue;
            }
            for form in [term.clone(), title_case(term)] {
                let out = sanitizer.sanitize(&format!("a {form} here"));
                assert!(out.contains(replacement.as_str()), "{form} -> {out}");
                assert!(!out.contains(form.as_str()), "{form} survived in {out}");
            }
        }
    }

    #[test]
    fn uses_injected_table() {
        let table = SubstitutionTable::new([("storm", "gentle snowfall"), ("dark", "cozy")]);
        let sanitizer = ContentSanitizer::new(&table).unwrap();
        assert_eq!(
            sanitizer.sanitize("A dark Storm over the storm"),
            "A cozy gentle snowfall over the gentle snowfall"
        );
        assert_eq!(sanitizer.sanitize("ghost"), "ghost");
    }

    #[test]
    fn empty_table_is_identity() {
        let sanitizer =
            ContentSanitizer::new(&SubstitutionTable::new(Vec::<(String, String)>::new())).unwrap();
        assert_eq!(sanitizer.sanitize("a ghost"), "a ghost");
    }

    #[test]
    fn oversized_table_fails_to_build() {
        let table = SubstitutionTable::new((0..20_000).map(|n| {
            (
                format!("forbiddenterm{n:06}withaverylongandunlikelysuffix"),
                "snow".to_string(),
            )
        }));
        let err = ContentSanitizer::new(&table).unwrap_err();
        assert!(err
            .to_string()
            .contains("Failed to build sanitizer pattern from 20000 substitution terms"));
    }

    #[test]
    fn parses_yaml_table() {
        let table = SubstitutionTable::from_yaml_str(
            "- term: Dragon\n  replacement: tiny friendly dragon\n- term: fire\n  replacement: warm glow\n",
        )
        .unwrap();
        assert_eq!(table.entries()[0], ("dragon".to_string(), "tiny friendly dragon".to_string()));
        assert!(SubstitutionTable::from_yaml_str("[]").is_err());
        assert!(SubstitutionTable::from_yaml_str("not: [a list").is_err());
    }

    #[test]
    fn title_cases_each_word() {
        assert_eq!(title_case("hot dog"), "Hot Dog");
        assert_eq!(title_case("gun"), "Gun");
    }
}
