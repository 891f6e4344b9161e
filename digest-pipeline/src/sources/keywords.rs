use crate::types::{DigestError, Item, Result};
use regex::Regex;

/// Case-insensitive whole-word keyword match over `title + description`.
///
/// A keyword counts as a whole word when the characters on either side of
/// it are not letters, digits or underscores. Unlike `\b`, this also works
/// for keywords that begin or end with punctuation ("C++", ".NET"), and a
/// hyphenated keyword such as "CAR-T" matches "CAR-T" but not "CAR-Tcells".
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    pattern: Regex,
}

impl KeywordFilter {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Result<Self> {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| k.as_ref().trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return Err(DigestError::Config("Keyword filter needs at least one keyword".to_string()));
        }

        let pattern = format!(
            r"(?i)(?:^|[^\p{{L}}\p{{N}}_])(?:{})(?:$|[^\p{{L}}\p{{N}}_])",
            alternatives.join("|")
        );
        let pattern = Regex::new(&pattern).map_err(|e| DigestError::Config(e.to_string()))?;
        Ok(Self { pattern })
    }

    pub fn matches(&self, item: &Item) -> bool {
        let text = format!("{} {}", item.title, item.description().unwrap_or(""));
        self.pattern.is_match(&text)
    }

    pub fn retain(&self, items: Vec<Item>) -> Vec<Item> {
        items.into_iter().filter(|item| self.matches(item)).collect()
    }
}
