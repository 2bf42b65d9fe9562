//! Path syntax for addressing nodes inside a [`PathMap`](crate::PathMap).
//!
//! Segments are separated by `.`. A literal dot inside a segment is written
//! `\.` and kept verbatim as part of the segment name. A sequence element is
//! addressed by appending `[n]` to its owning segment, e.g. `servers[2].port`.
//! `"."` and `""` both address the root.
//!
//! Indices above [`MAX_INDEX`] are not indices: `sl[99999999999]` is a plain
//! key, so a path can never make a sequence grow to that length.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

static INDEX_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)\[(\d+)\]$").expect("index pattern is valid"));

/// Largest sequence index a path string may address.
pub const MAX_INDEX: usize = 1 << 16;

/// One dot-separated piece of a path: a mapping key followed by zero or
/// more sequence indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub key: String,
    pub indices: Vec<usize>,
}

impl Segment {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            indices: Vec::new(),
        }
    }

    fn parse(raw: &str) -> Self {
        let mut key = raw.to_string();
        let mut indices = Vec::new();

        while let Some(caps) = INDEX_SUFFIX.captures(&key) {
            let index = match caps[2].parse::<usize>() {
                Ok(index) if index <= MAX_INDEX => index,
                _ => break,
            };
            indices.push(index);
            key = caps[1].to_string();
        }

        indices.reverse();
        Self { key, indices }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)?;
        for index in &self.indices {
            write!(f, "[{index}]")?;
        }
        Ok(())
    }
}

/// A parsed path. The empty path is the root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(raw: &str) -> Self {
        let trimmed = trim_dots(raw);
        if trimmed.is_empty() {
            return Self::root();
        }

        let segments = split_unescaped(trimmed)
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(Segment::parse)
            .collect();

        Self { segments }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Append another path (given as a string) below this one.
    pub fn join(&self, child: &str) -> Self {
        self.concat(&Path::parse(child))
    }

    pub fn concat(&self, other: &Path) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    /// Address element `index` of the sequence at this path.
    ///
    /// Indexing the root is meaningless, so the root is returned unchanged.
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        if let Some(last) = segments.last_mut() {
            last.indices.push(index);
        }
        Self { segments }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str(".");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<&str> for Path {
    fn from(raw: &str) -> Self {
        Path::parse(raw)
    }
}

impl From<&String> for Path {
    fn from(raw: &String) -> Self {
        Path::parse(raw)
    }
}

impl From<String> for Path {
    fn from(raw: String) -> Self {
        Path::parse(&raw)
    }
}

impl From<&Path> for Path {
    fn from(path: &Path) -> Self {
        path.clone()
    }
}

/// Join two string paths with a dot, treating an empty or root side as
/// absent.
pub fn join_key(parent: &str, child: &str) -> String {
    let parent = trim_dots(parent);
    let child = trim_dots(child);
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => parent.to_string(),
        _ => format!("{parent}.{child}"),
    }
}

fn trim_dots(raw: &str) -> &str {
    let mut s = raw.trim_start_matches('.');
    // a trailing `\.` is an escaped dot and must stay
    while s.ends_with('.') && !s.ends_with("\\.") {
        s = &s[..s.len() - 1];
    }
    s
}

/// Split on every `.` not preceded by a backslash. Escapes are kept.
fn split_unescaped(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (i, c) in raw.char_indices() {
        match c {
            '\\' => escaped = !escaped,
            '.' if !escaped => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => escaped = false,
        }
    }
    parts.push(&raw[start..]);
    parts
}
