//! Prompt template placeholders.
//!
//! # Responsibility
//! - Find `{{ name }}` placeholders in a prompt body.
//! - Substitute user-supplied values into the body.
//!
//! # Invariants
//! - A placeholder preceded by `\` is escaped: it is never reported and never
//!   replaced, and the backslash is kept.
//! - Names are trimmed and reported once, in first-appearance order.
//! - Placeholders without a supplied value are left untouched.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\\)?\{\{\s*([^{}]+?)\s*\}\}").expect("valid placeholder regex")
});

/// Distinct placeholder names of `text`, in first-appearance order.
pub fn prompt_variables(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    PLACEHOLDER_RE
        .captures_iter(text)
        .filter(|caps| caps.get(1).is_none())
        .filter_map(|caps| caps.get(2))
        .map(|name| name.as_str().to_string())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Replaces every unescaped placeholder that has a value in `values`.
pub fn fill_variables(text: &str, values: &HashMap<String, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures<'_>| {
            if caps.get(1).is_some() {
                return caps[0].to_string();
            }
            match values.get(&caps[2]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
