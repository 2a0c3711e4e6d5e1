use std::sync::LazyLock;

use regex::Regex;

static CURLY_APOSTROPHE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\u{2018}\u{2019}\u{02BC}]").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Lowercase, straighten apostrophes and collapse whitespace.
/// Every battery matches against this form.
pub fn normalize(text: &str) -> String {
    let straight = CURLY_APOSTROPHE.replace_all(text, "'");
    WHITESPACE
        .replace_all(straight.trim(), " ")
        .to_lowercase()
}

/// A named set of phrases compiled into one case-insensitive,
/// whole-word alternation.
///
/// A trailing `*` on a phrase matches any word continuation, so `suicid*`
/// covers "suicide" and "suicidal".
pub struct PhraseBattery {
    name: &'static str,
    pattern: Regex,
}

impl PhraseBattery {
    pub fn new(name: &'static str, phrases: &[&str]) -> Self {
        let alternation = phrases
            .iter()
            .map(|p| match p.strip_suffix('*') {
                Some(stem) => format!(r"{}\w*", regex::escape(stem)),
                None => regex::escape(p),
            })
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
            .unwrap_or_else(|e| panic!("battery '{name}' failed to compile: {e}"));
        Self { name, pattern }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True if any phrase occurs in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(&normalize(text))
    }

    /// Distinct matched phrases, in order of first appearance.
    pub fn matches(&self, text: &str) -> Vec<String> {
        let normalized = normalize(text);
        let mut found: Vec<String> = Vec::new();
        for m in self.pattern.find_iter(&normalized) {
            let phrase = m.as_str().to_string();
            if !found.contains(&phrase) {
                found.push(phrase);
            }
        }
        found
    }
}
