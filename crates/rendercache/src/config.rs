use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for the render cache.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: match env::var("STATSD_SERVER") {
                Ok(metrics_statsd) => Some(metrics_statsd),
                Err(_) => None,
            },
            prefix: "rendercache".into(),
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Configuration of the store holding in-flight and completed renders, and of the
/// deduplication in front of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RenderCacheConfig {
    /// Maximum number of entries held in memory.
    ///
    /// Defaults to `10_000`.
    pub in_memory_capacity: u64,

    /// Evict entries this long after they were created.
    ///
    /// A render that is evicted while still in flight keeps running for everyone already waiting
    /// for it, but the next request for the same render data will start a new computation.
    ///
    /// Defaults to never expiring.
    #[serde(with = "humantime_serde")]
    pub time_to_live: Option<Duration>,

    /// Evict entries that were not requested for this long.
    ///
    /// Defaults to never expiring.
    #[serde(with = "humantime_serde")]
    pub time_to_idle: Option<Duration>,

    /// Remove failed renders from the store, so that the next request retries them.
    ///
    /// When disabled, a failure is served to every following request until the entry is
    /// evicted by capacity or expiration. Defaults to `true`.
    pub evict_failures: bool,

    /// Number of locks used to make the lookup-or-create sequence atomic per key.
    ///
    /// Keys are distributed across the locks by their hash, so unrelated keys only contend
    /// when they happen to share a lock. Defaults to `64`, values below `1` are treated as `1`.
    pub lock_shards: usize,
}

impl Default for RenderCacheConfig {
    fn default() -> Self {
        Self {
            in_memory_capacity: 10_000,
            time_to_live: None,
            time_to_idle: None,
            evict_failures: true,
            lock_shards: 64,
        }
    }
}

/// Struct bundling together all the cache configurations.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfigs {
    /// Configuration of the render cache.
    pub renders: RenderCacheConfig,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration for internal logging.
    pub logging: Logging,

    /// Configuration for reporting metrics to a statsd instance.
    pub metrics: Metrics,

    /// Fine-tune the caches.
    pub caches: CacheConfigs,
}

impl Config {
    /// Loads the configuration from the given YAML file, or the default configuration if no
    /// path is given.
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl de::Visitor<'_> for LevelFilterVisitor {
    type Value = LevelFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            r#"one of the strings "off", "error", "warn", "info", "debug", or "trace""#
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v {
            "off" => Ok(LevelFilter::OFF),
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(de::Error::unknown_variant(
                v,
                &["off", "error", "warn", "info", "debug", "trace"],
            )),
        }
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    deserializer.deserialize_str(LevelFilterVisitor)
}
