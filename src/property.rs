//! Property source
//!
//! [`PropertyResolver`] maps string keys to string values and converts them
//! on demand through [`FromProperty`]. Keys may be given as expressions:
//! `${app.port}` (required) or `${app.port:8080}` (with default). Stored
//! values may themselves be expressions and are resolved when read.
//!
//! Sources: explicit pairs, the process environment and TOML documents, which
//! are flattened to dotted keys (`[server] port = 1` becomes `server.port`,
//! array items become `key[0]`, `key[1]`, ...).

use crate::{DiError, Result};
use ahash::RandomState;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[cfg(feature = "logging")]
use tracing::debug;

const MAX_NESTING: usize = 32;

/// Conversion from a property string.
///
/// Implemented for `String`, `bool`, all integer widths, `f32`/`f64`, `char`,
/// `PathBuf`, `Duration` (ISO-8601, e.g. `PT1.5S`), the `chrono` date/time
/// types and `FixedOffset` for zones. Implement it for your own types to use them in value bindings.
pub trait FromProperty: Sized + 'static {
    fn from_property(value: &str) -> std::result::Result<Self, String>;
}

impl FromProperty for String {
    fn from_property(value: &str) -> std::result::Result<Self, String> {
        Ok(value.to_string())
    }
}

impl FromProperty for bool {
    fn from_property(value: &str) -> std::result::Result<Self, String> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if value.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(format!("'{value}' is neither true nor false"))
        }
    }
}

macro_rules! from_str_property {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromProperty for $ty {
                fn from_property(value: &str) -> std::result::Result<Self, String> {
                    value.trim().parse::<$ty>().map_err(|e| e.to_string())
                }
            }
        )*
    };
}

from_str_property!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, NaiveDate,
    NaiveTime, NaiveDateTime,
);

impl FromProperty for char {
    fn from_property(value: &str) -> std::result::Result<Self, String> {
        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(format!("'{value}' is not a single character")),
        }
    }
}

impl FromProperty for PathBuf {
    fn from_property(value: &str) -> std::result::Result<Self, String> {
        Ok(PathBuf::from(value))
    }
}

impl FromProperty for Duration {
    fn from_property(value: &str) -> std::result::Result<Self, String> {
        parse_iso_duration(value)
    }
}

impl FromProperty for DateTime<FixedOffset> {
    fn from_property(value: &str) -> std::result::Result<Self, String> {
        let value = value.trim();
        // 2023-03-29T20:45:01+08:00[Asia/Shanghai]
        let value = match value.find('[') {
            Some(at) if value.ends_with(']') => &value[..at],
            _ => value,
        };
        DateTime::parse_from_rfc3339(value).map_err(|e| e.to_string())
    }
}

impl FromProperty for FixedOffset {
    /// `Z`, `UTC`, `+08:00`, `-0530`, `+08` or `UTC+8`. Region names are not
    /// accepted.
    fn from_property(value: &str) -> std::result::Result<Self, String> {
        let invalid = || format!("'{value}' is not a UTC offset like +08:00");
        let trimmed = value.trim();
        let rest = ["UTC", "GMT"]
            .iter()
            .find_map(|prefix| trimmed.strip_prefix(prefix))
            .unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(invalid());
        }
        if rest.is_empty() || rest == "Z" {
            return FixedOffset::east_opt(0).ok_or_else(invalid);
        }

        let (sign, digits) = if let Some(digits) = rest.strip_prefix('+') {
            (1, digits)
        } else if let Some(digits) = rest.strip_prefix('-') {
            (-1, digits)
        } else {
            return Err(invalid());
        };
        let (hours, minutes) = match digits.split_once(':') {
            Some((h, m)) => (h, m),
            None if digits.len() == 4 && digits.is_ascii() => digits.split_at(2),
            None => (digits, "0"),
        };
        let number = |part: &str| {
            (!part.is_empty() && part.len() <= 2 && part.bytes().all(|b| b.is_ascii_digit()))
                .then(|| part.parse::<i32>().ok())
                .flatten()
                .ok_or_else(invalid)
        };
        let (hours, minutes) = (number(hours)?, number(minutes)?);
        if hours > 18 || minutes > 59 {
            return Err(invalid());
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
    }
}

/// Parse `PnDTnHnMn.nS`. Weeks, months and years are not accepted.
fn parse_iso_duration(value: &str) -> std::result::Result<Duration, String> {
    let invalid = || format!("'{value}' is not an ISO-8601 duration like P2DT3H4M or PT1.5S");
    let rest = value
        .trim()
        .strip_prefix(['P', 'p'])
        .ok_or_else(invalid)?;
    let (date, time) = match rest.find(['T', 't']) {
        Some(at) => (&rest[..at], Some(&rest[at + 1..])),
        None => (rest, None),
    };

    const DATE_UNITS: &[(char, f64)] = &[('D', 86_400.0)];
    const TIME_UNITS: &[(char, f64)] = &[('H', 3_600.0), ('M', 60.0), ('S', 1.0)];

    let mut seconds = 0f64;
    let mut parts = 0;
    for (section, units) in [(date, DATE_UNITS), (time.unwrap_or(""), TIME_UNITS)] {
        let mut next_unit = 0;
        let mut number = String::new();
        for c in section.chars() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
                continue;
            }
            let unit = c.to_ascii_uppercase();
            let position = units[next_unit..]
                .iter()
                .position(|(u, _)| *u == unit)
                .ok_or_else(invalid)?;
            let amount: f64 = number.parse().map_err(|_| invalid())?;
            seconds += amount * units[next_unit + position].1;
            next_unit += position + 1;
            number.clear();
            parts += 1;
        }
        if !number.is_empty() {
            return Err(invalid());
        }
    }
    if parts == 0 || time == Some("") {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| e.to_string())
}

/// Key expression: `${key}` or `${key:default}`
struct Expression<'a> {
    key: &'a str,
    default: Option<&'a str>,
}

fn parse_expression(text: &str) -> Result<Option<Expression<'_>>> {
    let Some(inner) = text
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    else {
        return Ok(None);
    };
    let (key, default) = match inner.split_once(':') {
        Some((key, default)) => (key, Some(default)),
        None => (inner, None),
    };
    if key.trim().is_empty() {
        return Err(DiError::PropertyConversion {
            key: text.to_string(),
            target: "property expression",
            reason: "empty key".into(),
        });
    }
    Ok(Some(Expression {
        key: key.trim(),
        default,
    }))
}

/// String properties with typed, expression-aware access.
///
/// # Examples
///
/// ```rust
/// use bean_context::PropertyResolver;
/// use std::time::Duration;
///
/// let props = PropertyResolver::from_toml_str(r#"
///     [server]
///     port = 8080
///     timeout = "PT30S"
///     hosts = ["a", "b"]
/// "#).unwrap();
///
/// assert_eq!(props.get_required_as::<u16>("server.port").unwrap(), 8080);
/// assert_eq!(props.get_required_as::<Duration>("${server.timeout}").unwrap(), Duration::from_secs(30));
/// assert_eq!(props.get_required("server.hosts[1]").unwrap(), "b");
/// assert_eq!(props.get_required("${server.name:local}").unwrap(), "local");
/// assert!(props.get_required("server.name").is_err());
/// ```
#[derive(Clone, Default)]
pub struct PropertyResolver {
    properties: HashMap<String, String, RandomState>,
}

impl PropertyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver over the given key/value pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut resolver = Self::new();
        for (key, value) in pairs {
            resolver.set(key, value);
        }
        resolver
    }

    /// Resolver over a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::new().merge_toml_str(content)
    }

    /// Add the keys of a TOML document, overriding existing ones
    pub fn merge_toml_str(mut self, content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content).map_err(|e| DiError::PropertyConversion {
            key: "<toml>".into(),
            target: "toml document",
            reason: e.to_string(),
        })?;
        let before = self.properties.len();
        for (key, value) in &table {
            self.flatten(key.clone(), value);
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "bean_context",
            added = self.properties.len().saturating_sub(before),
            "Loaded properties from TOML"
        );
        #[cfg(not(feature = "logging"))]
        let _ = before;

        Ok(self)
    }

    fn flatten(&mut self, key: String, value: &toml::Value) {
        match value {
            toml::Value::Table(table) => {
                for (child, value) in table {
                    self.flatten(format!("{key}.{child}"), value);
                }
            }
            toml::Value::Array(items) => {
                for (index, value) in items.iter().enumerate() {
                    self.flatten(format!("{key}[{index}]"), value);
                }
            }
            toml::Value::String(text) => {
                self.properties.insert(key, text.clone());
            }
            scalar => {
                self.properties.insert(key, scalar.to_string());
            }
        }
    }

    /// Add process environment variables that are not already set
    pub fn with_env(mut self) -> Self {
        for (key, value) in std::env::vars() {
            self.properties.entry(key).or_insert(value);
        }
        self
    }

    /// Set a property, replacing any previous value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Resolve a key or expression. `Ok(None)` when a plain key is absent.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.lookup(key, 0)
    }

    /// Resolve a key or expression, falling back to `default` (itself resolved)
    pub fn get_or(&self, key: &str, default: &str) -> Result<String> {
        self.lookup_or(key, default, 0)
    }

    /// Resolve a key or expression, failing with `MissingProperty` when absent
    pub fn get_required(&self, key: &str) -> Result<String> {
        self.required(key, 0)
    }

    /// Resolve and convert. `Ok(None)` when a plain key is absent.
    pub fn get_as<V: FromProperty>(&self, key: &str) -> Result<Option<V>> {
        self.get(key)?
            .map(|value| convert::<V>(key, &value))
            .transpose()
    }

    /// Resolve and convert, falling back to `default` when absent
    pub fn get_as_or<V: FromProperty>(&self, key: &str, default: V) -> Result<V> {
        Ok(self.get_as(key)?.unwrap_or(default))
    }

    /// Resolve and convert, failing with `MissingProperty` when absent
    pub fn get_required_as<V: FromProperty>(&self, key: &str) -> Result<V> {
        let value = self.get_required(key)?;
        convert::<V>(key, &value)
    }

    fn lookup(&self, key: &str, depth: usize) -> Result<Option<String>> {
        if depth > MAX_NESTING {
            return Err(DiError::PropertyConversion {
                key: key.to_string(),
                target: "property expression",
                reason: "expressions nest too deeply".into(),
            });
        }
        if let Some(expr) = parse_expression(key)? {
            return match expr.default {
                Some(default) => self.lookup_or(expr.key, default, depth + 1).map(Some),
                None => self.required(expr.key, depth + 1).map(Some),
            };
        }
        match self.properties.get(key) {
            Some(value) => self.resolve_value(value, depth + 1).map(Some),
            None => Ok(None),
        }
    }

    fn lookup_or(&self, key: &str, default: &str, depth: usize) -> Result<String> {
        match self.lookup(key, depth)? {
            Some(value) => Ok(value),
            None => self.resolve_value(default, depth + 1),
        }
    }

    fn required(&self, key: &str, depth: usize) -> Result<String> {
        self.lookup(key, depth)?.ok_or_else(|| DiError::MissingProperty {
            key: key.to_string(),
        })
    }

    fn resolve_value(&self, value: &str, depth: usize) -> Result<String> {
        if parse_expression(value)?.is_some() {
            self.required(value, depth)
        } else {
            Ok(value.to_string())
        }
    }
}

fn convert<V: FromProperty>(key: &str, value: &str) -> Result<V> {
    V::from_property(value).map_err(|reason| DiError::PropertyConversion {
        key: key.to_string(),
        target: std::any::type_name::<V>(),
        reason,
    })
}

impl fmt::Debug for PropertyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.properties.keys().collect();
        keys.sort();
        f.debug_struct("PropertyResolver")
            .field("keys", &keys)
            .finish()
    }
}
