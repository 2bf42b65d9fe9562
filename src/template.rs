//! `{key}` placeholder expansion.
//!
//! Every `{other.key}` inside a string is replaced by that key's own
//! (expanded) string value. A string starting with `!nodecode ` is taken
//! verbatim, minus the flag.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConfigError;

static FLAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^!(\S*)\s(.*)$").expect("flag pattern is valid"));

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([\w.\-]+)\}").expect("placeholder pattern is valid"));

pub const FLAG_NODECODE: &str = "nodecode";

/// How deep placeholders may reference other placeholders.
pub const MAX_DEPTH: usize = 32;

/// Expand `raw`, resolving placeholders first from `args` and then through
/// `lookup`. `depth` counts how many expansions are already in progress;
/// `lookup` receives the depth to pass on when it expands in turn.
pub fn expand_with<F>(
    raw: &str,
    args: &HashMap<String, String>,
    depth: usize,
    mut lookup: F,
) -> Result<String, ConfigError>
where
    F: FnMut(&str, usize) -> Result<String, ConfigError>,
{
    let (flags, body) = split_flags(raw);
    if flags.iter().any(|f| f == FLAG_NODECODE) {
        return Ok(body.to_string());
    }

    let mut out = body.to_string();
    let mut seen = Vec::new();

    for caps in PLACEHOLDER.captures_iter(body) {
        let (Some(token), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let (token, key) = (token.as_str(), key.as_str());
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);

        let replacement = match args.get(key) {
            Some(value) => value.clone(),
            None if depth >= MAX_DEPTH => {
                return Err(ConfigError::PlaceholderDepth {
                    placeholder: key.to_string(),
                    value: raw.to_string(),
                    limit: MAX_DEPTH,
                });
            }
            None => lookup(key, depth + 1).map_err(|e| ConfigError::Placeholder {
                placeholder: key.to_string(),
                value: raw.to_string(),
                source: Box::new(e),
            })?,
        };

        out = out.replace(token, &replacement);
    }

    Ok(out)
}

/// Whether `raw` contains anything to expand or strip.
pub fn needs_expansion(raw: &str) -> bool {
    raw.starts_with('!') || PLACEHOLDER.is_match(raw)
}

/// The placeholder keys referenced by `raw`, in order of appearance.
pub fn placeholders(raw: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(raw)
        .map(|caps| caps[1].to_string())
        .collect()
}

fn split_flags(raw: &str) -> (Vec<String>, &str) {
    match FLAGS.captures(raw) {
        Some(caps) => {
            let flags = caps
                .get(1)
                .map(|m| {
                    m.as_str()
                        .split(',')
                        .map(|f| f.to_lowercase())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            let body = caps.get(2).map_or("", |m| m.as_str());
            (flags, body)
        }
        None => (Vec::new(), raw),
    }
}
