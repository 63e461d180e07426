//! Content sanitizer: rewrites restricted terms in user-authored text
//!
//! Applied to reviewer/user free text before it is interpolated into a
//! prompt, never to system-authored prompt scaffolding. All rules are compiled
//! into one alternation so the text is scanned exactly once: matches are
//! replaced left to right, never overlap, and replacement text is never
//! rescanned.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// One `pattern → replacement` pair as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizationRule {
    pub pattern: String,
    pub replacement: String,
}

impl SanitizationRule {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid sanitizer pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("sanitizer pattern '{0}' can match the empty string")]
    MatchesEmpty(String),
    #[error("replacement '{replacement}' is itself matched by pattern '{pattern}'")]
    NotClosed {
        replacement: String,
        pattern: String,
    },
    #[error(
        "sanitizer pattern '{0}' must match whole words only: \\b-bounded, word characters inside"
    )]
    NotWordPattern(String),
    #[error("sanitizer replacement '{0}' must be a single word")]
    NotWordReplacement(String),
}

/// Built-in rules. Word-bounded and case-insensitive; no replacement is
/// matched by any pattern, so the set is closed under re-application.
const DEFAULT_RULES: &[(&str, &str)] = &[
    (r"(?i)\b(kill|killed|killing|kills)\b", "defeat"),
    (r"(?i)\b(murder|murdered|murdering)\b", "confront"),
    (r"(?i)\b(blood|bloody|gore|gory)\b", "dramatic"),
    (r"(?i)\b(gun|guns|rifle|rifles|weapon|weapons)\b", "gadget"),
    (r"(?i)\b(bomb|bombs|explosive|explosives)\b", "surprise"),
    (r"(?i)\b(drug|drugs|cocaine|heroin)\b", "remedy"),
    (r"(?i)\b(nude|naked|nsfw)\b", "casual"),
    (r"(?i)\b(suicide)\b", "crisis"),
];

/// Ordered, compiled list of sanitization rules
#[derive(Debug, Clone)]
pub struct SanitizationRuleSet {
    rules: Vec<SanitizationRule>,
    patterns: Vec<Regex>,
    combined: Option<Regex>,
}

impl SanitizationRuleSet {
    /// Compile rules in priority order. When two rules could match at the same
    /// position the earlier one wins.
    pub fn new(rules: Vec<SanitizationRule>) -> Result<Self, RuleError> {
        let mut patterns = Vec::with_capacity(rules.len());
        for rule in &rules {
            let regex = Regex::new(&rule.pattern).map_err(|source| RuleError::InvalidPattern {
                pattern: rule.pattern.clone(),
                source,
            })?;
            if regex.is_match("") || regex.find_iter(" a ").any(|m| m.is_empty()) {
                return Err(RuleError::MatchesEmpty(rule.pattern.clone()));
            }
            patterns.push(regex);
        }

        let combined = if rules.is_empty() {
            None
        } else {
            let alternation = rules
                .iter()
                .enumerate()
                .map(|(i, rule)| format!("(?P<r{i}>{})", rule.pattern))
                .collect::<Vec<_>>()
                .join("|");
            Some(
                Regex::new(&alternation).map_err(|source| RuleError::InvalidPattern {
                    pattern: alternation.clone(),
                    source,
                })?,
            )
        };

        debug!("Compiled {} sanitization rules", rules.len());
        Ok(Self {
            rules,
            patterns,
            combined,
        })
    }

    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            patterns: Vec::new(),
            combined: None,
        }
    }

    /// The built-in restricted-term list
    pub fn default_rules() -> Vec<SanitizationRule> {
        DEFAULT_RULES
            .iter()
            .map(|(pattern, replacement)| SanitizationRule::new(*pattern, *replacement))
            .collect()
    }

    pub fn rules(&self) -> &[SanitizationRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Fails unless a second pass is guaranteed to change nothing.
    ///
    /// Every pattern must match whole words only and every replacement must be
    /// a single word. Matches and replacements then line up with the words of
    /// the text, so re-application can only hit a replacement word, which is
    /// ruled out by checking each replacement against every pattern.
    pub fn ensure_closed(&self) -> Result<(), RuleError> {
        for rule in &self.rules {
            if !is_word_pattern(&rule.pattern) {
                return Err(RuleError::NotWordPattern(rule.pattern.clone()));
            }
            if !is_single_word(&rule.replacement) {
                return Err(RuleError::NotWordReplacement(rule.replacement.clone()));
            }
        }

        for (rule, regex) in self.rules.iter().zip(&self.patterns) {
            if let Some(other) = self.rules.iter().find(|r| regex.is_match(&r.replacement)) {
                return Err(RuleError::NotClosed {
                    replacement: other.replacement.clone(),
                    pattern: rule.pattern.clone(),
                });
            }
        }
        Ok(())
    }
}

fn is_word_char(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric() || c.is_alphabetic()
}

fn is_single_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_word_char)
}

/// `(?i)?\b BODY \b` where BODY can only ever match word characters and has
/// no top-level alternation (which would escape the boundaries).
fn is_word_pattern(pattern: &str) -> bool {
    let body = pattern.strip_prefix("(?i)").unwrap_or(pattern);
    match body
        .strip_prefix(r"\b")
        .and_then(|b| b.strip_suffix(r"\b"))
    {
        Some(inner) => word_only_body(inner),
        None => false,
    }
}

fn word_only_body(body: &str) -> bool {
    let chars: Vec<char> = body.chars().collect();
    let mut depth = 0usize;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            c if is_word_char(c) => {}
            '*' | '+' | '?' => {}
            '|' if depth > 0 => {}
            '(' => {
                depth += 1;
                if chars.get(i + 1) == Some(&'?') {
                    if chars.get(i + 2) != Some(&':') {
                        return false;
                    }
                    i += 2;
                }
            }
            ')' => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            '\\' => match chars.get(i + 1) {
                Some('d' | 'w' | 'b') => i += 1,
                _ => return false,
            },
            '{' => match repetition_len(&chars[i..]) {
                Some(len) => i += len - 1,
                None => return false,
            },
            '[' => match word_class_len(&chars[i..]) {
                Some(len) => i += len - 1,
                None => return false,
            },
            _ => return false,
        }
        i += 1;
    }
    depth == 0
}

/// Length of a `{n}`, `{n,}` or `{n,m}` repetition starting at `chars[0]`
fn repetition_len(chars: &[char]) -> Option<usize> {
    let close = chars.iter().position(|&c| c == '}')?;
    let inner = &chars[1..close];
    let well_formed = inner.first().is_some_and(char::is_ascii_digit)
        && inner.iter().all(|c| c.is_ascii_digit() || *c == ',')
        && inner.iter().filter(|c| **c == ',').count() <= 1;
    well_formed.then_some(close + 1)
}

/// Length of a bracket class made only of word characters, same-kind ASCII
/// ranges, `\d` and `\w`
fn word_class_len(chars: &[char]) -> Option<usize> {
    let mut i = 1;
    let mut items = 0;
    while i < chars.len() {
        match chars[i] {
            ']' if items > 0 => return Some(i + 1),
            '\\' if matches!(chars.get(i + 1), Some('d' | 'w')) => i += 2,
            c if is_word_char(c) => {
                if chars.get(i + 1) == Some(&'-') && chars.get(i + 2).is_some_and(|e| *e != ']') {
                    let end = chars[i + 2];
                    let same_kind = (c.is_ascii_lowercase() && end.is_ascii_lowercase())
                        || (c.is_ascii_uppercase() && end.is_ascii_uppercase())
                        || (c.is_ascii_digit() && end.is_ascii_digit());
                    if !same_kind || end < c {
                        return None;
                    }
                    i += 3;
                } else {
                    i += 1;
                }
            }
            _ => return None,
        }
        items += 1;
    }
    None
}

impl Default for SanitizationRuleSet {
    fn default() -> Self {
        // The built-in table is static and tested below
        Self::new(Self::default_rules()).unwrap_or_else(|_| Self::empty())
    }
}

/// Pure text transform over a [`SanitizationRuleSet`]
#[derive(Debug, Clone, Default)]
pub struct ContentSanitizer {
    rules: SanitizationRuleSet,
}

impl ContentSanitizer {
    pub fn new(rules: SanitizationRuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &SanitizationRuleSet {
        &self.rules
    }

    /// Apply every rule once, left to right. Never fails.
    pub fn sanitize(&self, text: &str) -> String {
        let Some(combined) = &self.rules.combined else {
            return text.to_string();
        };

        let mut replaced = 0usize;
        let output = combined.replace_all(text, |caps: &Captures<'_>| {
            replaced += 1;
            (0..self.rules.rules.len())
                .find(|i| caps.name(&format!("r{i}")).is_some())
                .map(|i| self.rules.rules[i].replacement.clone())
                .unwrap_or_default()
        });

        if replaced > 0 {
            debug!(replaced, "Sanitized restricted terms");
        }
        output.into_owned()
    }
}
