// src/parser.rs
use serde_json::Value;

use crate::types::CredentialPair;

/// Line-scanned token candidates must be longer than this many characters.
/// Shorter matches are treated as log noise. The value is load-bearing for
/// the current generator output; it can also reject genuine short tokens or
/// accept long unrelated lines containing "token:".
pub const MIN_TOKEN_LEN: usize = 20;

/// Extracts a credential pair from raw generator output.
///
/// Embedded JSON (first `{` to last `}`) is tried first, then a line scan for
/// `token: ...` and `visitorData: ...` style lines. Values found by the line
/// scan override the JSON ones. Returns `None` unless both fields are found.
pub fn parse(raw: &str) -> Option<CredentialPair> {
    let (mut token, mut visitor) = from_embedded_json(raw);

    if token.is_none() || visitor.is_none() {
        for line in raw.lines() {
            let lower = line.to_lowercase();
            let Some((_, rest)) = line.split_once(':') else {
                continue;
            };
            if lower.contains("token") {
                let candidate = strip_value(rest);
                if candidate.chars().count() > MIN_TOKEN_LEN {
                    token = Some(candidate.to_string());
                }
            } else if (lower.contains("visitor") && lower.contains("data"))
                || lower.contains("visitordata")
            {
                visitor = Some(strip_value(rest).to_string());
            }
        }
    }

    match (token, visitor) {
        (Some(token), Some(visitor_id)) if !token.is_empty() && !visitor_id.is_empty() => {
            Some(CredentialPair { token, visitor_id })
        }
        _ => None,
    }
}

fn from_embedded_json(raw: &str) -> (Option<String>, Option<String>) {
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return (None, None);
    };
    if start >= end {
        return (None, None);
    }
    let Ok(data) = serde_json::from_str::<Value>(&raw[start..=end]) else {
        return (None, None);
    };
    (
        first_non_empty(&data, &["token", "poToken"]),
        first_non_empty(&data, &["visitorData", "visitor_data"]),
    )
}

fn first_non_empty(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| data.get(*k).and_then(Value::as_str))
        .find(|v| !v.is_empty())
        .map(str::to_owned)
}

fn strip_value(s: &str) -> &str {
    s.trim().trim_matches('"').trim_matches('\'')
}
