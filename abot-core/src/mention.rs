// ABOUTME: Mention detection shared by every backend
// ABOUTME: Matches an optional @ or ! prefix, the bot username, then a boundary or end of text

use regex::Regex;
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

/// Compiled mention patterns, one per username seen
static PATTERNS: LazyLock<Mutex<HashMap<String, Regex>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn mention_pattern(username: &str) -> Option<Regex> {
    let mut patterns = PATTERNS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(re) = patterns.get(username) {
        return Some(re.clone());
    }

    let pattern = format!(r"^[@!]?{}(?:[,:]|\s|$)", regex::escape(username));
    match Regex::new(&pattern) {
        Ok(re) => {
            tracing::debug!(username = %username, pattern = %pattern, "Compiled mention pattern");
            patterns.insert(username.to_string(), re.clone());
            Some(re)
        }
        Err(e) => {
            tracing::warn!(username = %username, error = %e, "Invalid mention pattern");
            None
        }
    }
}

/// Return the username when `text` addresses it.
///
/// The text must start with an optional `@` or `!`, then `username`, then
/// `,`, `:`, whitespace or end of text. Texts shorter than two characters
/// never match.
pub fn mention_token(username: &str, text: &str) -> Option<String> {
    if username.is_empty() || text.chars().count() < 2 {
        return None;
    }

    let re = mention_pattern(username)?;
    re.is_match(text).then(|| username.to_string())
}
