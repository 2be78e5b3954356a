//! Logging configuration for bean-context
//!
//! Every event the container emits uses the `bean_context` target. This module
//! installs a `tracing-subscriber` for them, in JSON (production) or pretty
//! (development) form.
//!
//! # Features
//!
//! - `logging` - Emit container events (default)
//! - `logging-json` - JSON structured output
//! - `logging-pretty` - Colorful pretty output
//!
//! # Example
//!
//! ```rust,ignore
//! use bean_context::{PropertyResolver, logging};
//!
//! // JSON if logging-json is enabled, pretty otherwise
//! logging::init();
//!
//! // Or take the settings from the application properties
//! let properties = PropertyResolver::from_toml_str(
//!     "[logging]\nlevel = \"trace\"\nformat = \"compact\"",
//! )?;
//! logging::LoggingBuilder::from_properties(&properties)?.init();
//! ```

use crate::Result;
use crate::property::{FromProperty, PropertyResolver};
use std::str::FromStr;
use tracing::Level;

/// Target of every event emitted by this crate
pub const TARGET: &str = "bean_context";

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    /// Single-line output
    Compact,
}

impl FromProperty for LogFormat {
    fn from_property(value: &str) -> std::result::Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl FromProperty for Level {
    fn from_property(value: &str) -> std::result::Result<Self, String> {
        Level::from_str(value.trim()).map_err(|e| e.to_string())
    }
}

/// Builder for the log subscriber
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    with_file: bool,
    with_line_number: bool,
    with_thread_ids: bool,
    with_thread_names: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Json,
            target: None,
            with_file: false,
            with_line_number: false,
            with_thread_ids: false,
            with_thread_names: false,
        }
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `logging.level`, `logging.format` and `logging.context-only`.
    /// Absent keys keep the defaults.
    pub fn from_properties(properties: &PropertyResolver) -> Result<Self> {
        let mut builder = Self::default();
        if let Some(level) = properties.get_as::<Level>("logging.level")? {
            builder.level = level;
        }
        if let Some(format) = properties.get_as::<LogFormat>("logging.format")? {
            builder.format = format;
        }
        if properties.get_as_or("logging.context-only", false)? {
            builder = builder.context_only();
        }
        Ok(builder)
    }

    /// Set the minimum log level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    pub fn info(self) -> Self {
        self.with_level(Level::INFO)
    }

    /// Only show events from `target`
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Only show container events
    pub fn context_only(self) -> Self {
        self.with_target_filter(TARGET)
    }

    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    pub fn with_thread_ids(mut self) -> Self {
        self.with_thread_ids = true;
        self
    }

    pub fn with_thread_names(mut self) -> Self {
        self.with_thread_names = true;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn json(self) -> Self {
        self.with_format(LogFormat::Json)
    }

    pub fn pretty(self) -> Self {
        self.with_format(LogFormat::Pretty)
    }

    pub fn compact(self) -> Self {
        self.with_format(LogFormat::Compact)
    }

    /// Install the subscriber globally. Returns `false` when another
    /// subscriber was already installed.
    ///
    /// JSON output needs the `logging-json` feature and falls back to the
    /// default text format without it.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) -> bool {
        use tracing_subscriber::{EnvFilter, fmt};

        let filter = match self.target {
            Some(target) => EnvFilter::new(format!("{target}={}", self.level)),
            None => EnvFilter::new(self.level.to_string()),
        };
        let layer = fmt::layer()
            .with_file(self.with_file)
            .with_line_number(self.with_line_number)
            .with_thread_ids(self.with_thread_ids)
            .with_thread_names(self.with_thread_names)
            .with_target(true);

        match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => install(filter, layer.json()),
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => install(filter, layer),
            LogFormat::Pretty => install(filter, layer.pretty()),
            LogFormat::Compact => install(filter, layer.compact()),
        }
    }

    /// No subscriber available without `logging-json` or `logging-pretty`
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) -> bool {
        false
    }
}

#[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
fn install<L>(filter: tracing_subscriber::EnvFilter, layer: L) -> bool
where
    L: tracing_subscriber::Layer<
            tracing_subscriber::layer::Layered<
                tracing_subscriber::EnvFilter,
                tracing_subscriber::Registry,
            >,
        > + Send
        + Sync
        + 'static,
{
    use tracing_subscriber::prelude::*;

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .is_ok()
}

pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// JSON with `logging-json`, pretty otherwise
pub fn init() -> bool {
    if cfg!(feature = "logging-json") {
        init_json()
    } else {
        init_pretty()
    }
}

/// JSON structured logging at DEBUG.
///
/// # Example output
/// ```json
/// {"timestamp":"2026-01-01T00:00:00.000Z","level":"DEBUG","target":"bean_context","fields":{"message":"Container state changed","state":"DefinitionsBuilt","count":4}}
/// ```
pub fn init_json() -> bool {
    builder().json().debug().init()
}

/// Pretty logging at DEBUG
pub fn init_pretty() -> bool {
    builder().pretty().debug().init()
}

/// Only container events, at DEBUG
pub fn init_context_only() -> bool {
    builder().context_only().debug().init()
}
