//! Scalar casting: the caster chain, the decoder chain and the generic
//! conversions every leaf value goes through.

use std::error::Error;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::node::Node;

/// The scalar type a leaf is being cast into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Bool,
    Int,
    UInt,
    Float,
    String,
    Char,
    Duration,
    Time,
    /// Untyped leaves keep whatever they hold.
    Any,
}

impl ScalarType {
    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Int => "integer",
            ScalarType::UInt => "unsigned integer",
            ScalarType::Float => "float",
            ScalarType::String => "string",
            ScalarType::Char => "char",
            ScalarType::Duration => "duration",
            ScalarType::Time => "time",
            ScalarType::Any => "any",
        }
    }

    /// Whether `node` already has exactly this type.
    pub fn matches(self, node: &Node) -> bool {
        match (self, node) {
            (ScalarType::Any, _) => true,
            (ScalarType::Bool, Node::Bool(_))
            | (ScalarType::Int, Node::Int(_))
            | (ScalarType::Float, Node::Float(_))
            | (ScalarType::String, Node::String(_))
            | (ScalarType::Duration, Node::Duration(_))
            | (ScalarType::Time, Node::Time(_)) => true,
            (ScalarType::UInt, Node::Int(i)) => *i >= 0,
            (ScalarType::Char, Node::String(s)) => s.chars().count() == 1,
            _ => false,
        }
    }
}

/// A pluggable conversion consulted before the generic casts.
///
/// Return `Ok(None)` to pass the value on untouched.
pub trait Caster: Send + Sync {
    fn cast(&self, target: ScalarType, value: &Node) -> Result<Option<Node>, String>;
}

/// A pluggable transformation applied to leaves after casting.
pub trait Decoder: Send + Sync {
    fn decode(&self, value: Node) -> Result<Node, Box<dyn Error + Send + Sync>>;
}

/// Parses human readable durations (`"1m30s"`, `"250ms"`) and treats bare
/// integers as seconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct DurationCaster;

impl Caster for DurationCaster {
    fn cast(&self, target: ScalarType, value: &Node) -> Result<Option<Node>, String> {
        if target != ScalarType::Duration {
            return Ok(None);
        }

        match value {
            Node::String(s) => parse_duration(s).map(|d| Some(Node::Duration(d))),
            Node::Int(secs) if *secs >= 0 => Ok(Some(Node::Duration(Duration::from_secs(
                *secs as u64,
            )))),
            _ => Ok(None),
        }
    }
}

/// Parses timestamps in RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or
/// `YYYY-MM-DD` form, and integers as unix seconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeCaster;

impl Caster for TimeCaster {
    fn cast(&self, target: ScalarType, value: &Node) -> Result<Option<Node>, String> {
        if target != ScalarType::Time {
            return Ok(None);
        }

        match value {
            Node::String(s) => parse_time(s).map(|t| Some(Node::Time(t))),
            Node::Int(secs) => DateTime::from_timestamp(*secs, 0)
                .map(|t| Some(Node::Time(t)))
                .ok_or_else(|| format!("unix timestamp {secs} is out of range")),
            _ => Ok(None),
        }
    }
}

pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Duration::ZERO);
    }
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).map_err(|e| format!("invalid duration '{raw}': {e}"))
}

pub fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(t.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(t) = d.and_hms_opt(0, 0, 0) {
            return Ok(t.and_utc());
        }
    }
    Err(format!("invalid time '{raw}'"))
}

/// The generic conversion. Returns `None` when `value` can not become
/// `target` without reinterpreting it.
///
/// Integers turn into strings by decimal formatting, never by code point,
/// and never into chars.
pub fn generic(value: Node, target: ScalarType) -> Option<Node> {
    if target.matches(&value) {
        return Some(value);
    }

    match (target, value) {
        (ScalarType::Bool, Node::String(s)) => parse_bool(&s).map(Node::Bool),
        (ScalarType::Bool, Node::Int(i)) => Some(Node::Bool(i != 0)),

        (ScalarType::Int, Node::String(s)) => s.trim().parse::<i64>().ok().map(Node::Int),
        (ScalarType::Int, Node::Float(f)) => float_to_int(f).map(Node::Int),
        (ScalarType::Int, Node::Bool(b)) => Some(Node::Int(b as i64)),

        (ScalarType::UInt, Node::String(s)) => {
            let parsed = s.trim().parse::<u64>().ok()?;
            Some(Node::from(parsed))
        }
        (ScalarType::UInt, Node::Float(f)) => float_to_int(f).filter(|i| *i >= 0).map(Node::Int),
        (ScalarType::UInt, Node::Bool(b)) => Some(Node::Int(b as i64)),

        (ScalarType::Float, Node::Int(i)) => Some(Node::Float(i as f64)),
        (ScalarType::Float, Node::String(s)) => s.trim().parse::<f64>().ok().map(Node::Float),

        (ScalarType::String, Node::Null) => Some(Node::String(String::new())),
        (ScalarType::String, scalar @ (Node::Bool(_)
        | Node::Int(_)
        | Node::Float(_)
        | Node::Duration(_)
        | Node::Time(_))) => Some(Node::String(scalar.to_display_string())),

        (ScalarType::Duration, Node::String(s)) => humantime::parse_duration(s.trim())
            .ok()
            .map(Node::Duration),

        (ScalarType::Time, Node::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| Node::Time(t.with_timezone(&Utc))),

        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn float_to_int(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}
