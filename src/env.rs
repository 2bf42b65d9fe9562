//! Environment overlay: where environment variables come from and how a
//! config path maps onto a variable name.
//!
//! A path is turned into a variable name by prefixing it, rewriting sequence
//! indices into plain segments, applying the key replacer and upper-casing
//! the result:
//!
//! ```text
//! redis.default.backoff.max_elapsed_time  ->  REDIS_DEFAULT_BACKOFF_MAX_ELAPSED_TIME
//! servers[1].port (prefix "app")          ->  APP_SERVERS_1_PORT
//! ```

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;

static INDEX_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("index pattern is valid"));

/// Source of environment variables.
pub trait EnvProvider: Send + Sync {
    fn lookup_env(&self, key: &str) -> Option<String>;

    /// Whether any variable name starts with `prefix`.
    fn prefix_exists(&self, prefix: &str) -> bool;
}

/// The process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEnvProvider;

impl EnvProvider for OsEnvProvider {
    fn lookup_env(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn prefix_exists(&self, prefix: &str) -> bool {
        std::env::vars_os().any(|(k, _)| k.to_string_lossy().starts_with(prefix))
    }
}

/// An in-memory environment, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryEnvProvider {
    vars: RwLock<HashMap<String, String>>,
}

impl MemoryEnvProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_env(&self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.write().insert(key.into(), value.into());
    }

    pub fn unset_env(&self, key: &str) {
        self.vars.write().remove(key);
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MemoryEnvProvider {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: RwLock::new(
                iter.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl EnvProvider for MemoryEnvProvider {
    fn lookup_env(&self, key: &str) -> Option<String> {
        self.vars.read().get(key).cloned()
    }

    fn prefix_exists(&self, prefix: &str) -> bool {
        self.vars.read().keys().any(|k| k.starts_with(prefix))
    }
}

/// Ordered literal substring replacements applied to a path before it is
/// upper-cased into a variable name.
///
/// Replacement is a single left-to-right pass: at each position the first
/// matching rule wins and its output is not scanned again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvKeyReplacer {
    rules: Vec<(String, String)>,
}

impl Default for EnvKeyReplacer {
    fn default() -> Self {
        Self::new([(".", "_"), ("-", "_")])
    }
}

impl EnvKeyReplacer {
    pub fn new<F: Into<String>, T: Into<String>>(rules: impl IntoIterator<Item = (F, T)>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|(f, t)| (f.into(), t.into()))
                .filter(|(f, _)| !f.is_empty())
                .collect(),
        }
    }

    pub fn replace(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        'outer: while !rest.is_empty() {
            for (from, to) in &self.rules {
                if let Some(stripped) = rest.strip_prefix(from.as_str()) {
                    out.push_str(to);
                    rest = stripped;
                    continue 'outer;
                }
            }
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                out.push(c);
            }
            rest = chars.as_str();
        }

        out
    }
}

/// Derive the environment variable name for `path` under `prefix`.
pub fn derive_env_key(prefix: &str, path: &str, replacer: &EnvKeyReplacer) -> String {
    let key = match (prefix.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}.{path}"),
    };
    let key = INDEX_SEGMENT.replace_all(&key, ".$1");
    replacer.replace(&key).to_uppercase()
}
