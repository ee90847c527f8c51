//! Phone-number heuristics for recipient identifiers.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9][\d\-\s()]{7,15}$").expect("valid phone regex"));

static STRIP_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\d+\-()\s]").expect("valid strip regex"));

/// Split of a phone list into usable and unusable entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneCheck {
    /// Cleaned numbers that match the pattern.
    pub valid: Vec<String>,
    /// Original inputs that did not.
    pub invalid: Vec<String>,
}

/// Remove everything except digits, `+`, `-`, parentheses and spaces.
pub fn clean_phone(raw: &str) -> String {
    STRIP_PATTERN.replace_all(raw.trim(), "").into_owned()
}

pub fn is_valid_phone(raw: &str) -> bool {
    let cleaned = clean_phone(raw);
    !cleaned.is_empty() && PHONE_PATTERN.is_match(&cleaned)
}

/// Whether an identifier is meant as a phone number rather than a name.
pub fn looks_like_phone(identifier: &str) -> bool {
    let trimmed = identifier.trim();
    let Some(first) = trimmed.chars().next() else {
        return false;
    };
    let digits = trimmed.chars().filter(char::is_ascii_digit).count();
    (first == '+' || first.is_ascii_digit()) && digits * 2 >= trimmed.chars().count()
}

pub fn validate_phone_numbers<I, S>(numbers: I) -> PhoneCheck
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut check = PhoneCheck::default();
    for number in numbers {
        let number = number.as_ref();
        let cleaned = clean_phone(number);
        if !cleaned.is_empty() && PHONE_PATTERN.is_match(&cleaned) {
            check.valid.push(cleaned);
        } else {
            check.invalid.push(number.to_string());
        }
    }
    check
}
