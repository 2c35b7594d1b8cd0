//! Client and library configuration
//!
//! Keys follow the native library's snake_case names. The camelCase names
//! used by other bindings are accepted as aliases.
//!
//! ```lua
//! local client = pomelo.newClient({
//!     conn_timeout = 30,
//!     enable_reconn = true,
//!     reconn_max_retry = 'ALWAYS',
//!     reconn_delay = 2,
//!     reconn_delay_max = 30,
//!     reconn_exp_backoff = true,
//!     transport_name = 'TCP', -- 'TCP', 'TLS', 'DUMMY' or a custom transport id
//! })
//! ```

use crate::error::ConfigError;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;

/// Reconnect retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryLimit {
    #[default]
    Always,
    Limited(u32),
}

impl Serialize for RetryLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RetryLimit::Always => serializer.serialize_str("ALWAYS"),
            RetryLimit::Limited(n) => serializer.serialize_u32(*n),
        }
    }
}

impl<'de> Deserialize<'de> for RetryLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RetryLimitVisitor;

        impl Visitor<'_> for RetryLimitVisitor {
            type Value = RetryLimit;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a non-negative integer or 'ALWAYS'")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<RetryLimit, E> {
                match v {
                    "ALWAYS" => Ok(RetryLimit::Always),
                    other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<RetryLimit, E> {
                u32::try_from(v)
                    .map(RetryLimit::Limited)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<RetryLimit, E> {
                u32::try_from(v)
                    .map(RetryLimit::Limited)
                    .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<RetryLimit, E> {
                if v.fract() == 0.0 && v >= 0.0 && v <= f64::from(u32::MAX) {
                    Ok(RetryLimit::Limited(v as u32))
                } else {
                    Err(E::invalid_value(de::Unexpected::Float(v), &self))
                }
            }
        }

        deserializer.deserialize_any(RetryLimitVisitor)
    }
}

/// Transport a client is created with.
///
/// Ids `0`, `1` and `7` are the built-in TCP, TLS and DUMMY transports; any
/// other id selects a custom transport registered by the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportSelector {
    #[default]
    Tcp,
    Tls,
    Dummy,
    Custom(i32),
}

impl TransportSelector {
    pub fn from_id(id: i32) -> Self {
        match id {
            0 => TransportSelector::Tcp,
            1 => TransportSelector::Tls,
            7 => TransportSelector::Dummy,
            other => TransportSelector::Custom(other),
        }
    }

    pub fn id(self) -> i32 {
        match self {
            TransportSelector::Tcp => 0,
            TransportSelector::Tls => 1,
            TransportSelector::Dummy => 7,
            TransportSelector::Custom(id) => id,
        }
    }

    /// Name of a built-in transport, `None` for custom ids.
    pub fn name(self) -> Option<&'static str> {
        match self {
            TransportSelector::Tcp => Some("TCP"),
            TransportSelector::Tls => Some("TLS"),
            TransportSelector::Dummy => Some("DUMMY"),
            TransportSelector::Custom(_) => None,
        }
    }
}

impl fmt::Display for TransportSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "custom({})", self.id()),
        }
    }
}

impl Serialize for TransportSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.name() {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_i32(self.id()),
        }
    }
}

impl<'de> Deserialize<'de> for TransportSelector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SelectorVisitor;

        impl Visitor<'_> for SelectorVisitor {
            type Value = TransportSelector;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("'TCP', 'TLS', 'DUMMY' or an integer transport id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<TransportSelector, E> {
                match v {
                    "TCP" => Ok(TransportSelector::Tcp),
                    "TLS" => Ok(TransportSelector::Tls),
                    "DUMMY" => Ok(TransportSelector::Dummy),
                    other => other
                        .parse::<i32>()
                        .map(TransportSelector::from_id)
                        .map_err(|_| E::invalid_value(de::Unexpected::Str(other), &self)),
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<TransportSelector, E> {
                i32::try_from(v)
                    .map(TransportSelector::from_id)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<TransportSelector, E> {
                i32::try_from(v)
                    .map(TransportSelector::from_id)
                    .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<TransportSelector, E> {
                if v.fract() == 0.0 && v >= f64::from(i32::MIN) && v <= f64::from(i32::MAX) {
                    Ok(TransportSelector::from_id(v as i32))
                } else {
                    Err(E::invalid_value(de::Unexpected::Float(v), &self))
                }
            }
        }

        deserializer.deserialize_any(SelectorVisitor)
    }
}

/// Integer config value. Lua hands integral floats (`5.0`) through as
/// floats; those are accepted, fractional ones are not.
fn whole_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    struct WholeNumberVisitor;

    impl Visitor<'_> for WholeNumberVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an integer")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
            if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
                Ok(v as i64)
            } else {
                Err(E::invalid_value(de::Unexpected::Float(v), &self))
            }
        }
    }

    deserializer.deserialize_any(WholeNumberVisitor).map(Some)
}

/// Milliseconds to whole seconds, rounding away from zero so a positive
/// sub-second value never becomes zero.
fn millis_to_secs(ms: i64) -> i64 {
    let secs = ms.unsigned_abs().div_ceil(1000);
    let secs = i64::try_from(secs).unwrap_or(i64::MAX);
    if ms < 0 {
        -secs
    } else {
        secs
    }
}

/// Config table as written by the caller. Seconds keys take precedence over
/// their `*Ms` counterparts when both are given.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigTable {
    #[serde(deserialize_with = "whole_number")]
    conn_timeout: Option<i64>,
    #[serde(rename = "connTimeoutMs", deserialize_with = "whole_number")]
    conn_timeout_ms: Option<i64>,

    #[serde(alias = "enableReconnect")]
    enable_reconn: Option<bool>,

    #[serde(alias = "maxReconnectRetries")]
    reconn_max_retry: Option<RetryLimit>,

    #[serde(deserialize_with = "whole_number")]
    reconn_delay: Option<i64>,
    #[serde(rename = "reconnectDelayMs", deserialize_with = "whole_number")]
    reconn_delay_ms: Option<i64>,

    #[serde(deserialize_with = "whole_number")]
    reconn_delay_max: Option<i64>,
    #[serde(rename = "reconnectDelayMaxMs", deserialize_with = "whole_number")]
    reconn_delay_max_ms: Option<i64>,

    #[serde(alias = "exponentialBackoff")]
    reconn_exp_backoff: Option<bool>,

    #[serde(alias = "transportSelector")]
    transport_name: Option<TransportSelector>,
}

impl From<ConfigTable> for ClientConfig {
    fn from(table: ConfigTable) -> Self {
        let defaults = ClientConfig::default();
        let secs = |secs: Option<i64>, ms: Option<i64>, default: i64| {
            secs.or(ms.map(millis_to_secs)).unwrap_or(default)
        };
        Self {
            conn_timeout: secs(table.conn_timeout, table.conn_timeout_ms, defaults.conn_timeout),
            enable_reconn: table.enable_reconn.unwrap_or(defaults.enable_reconn),
            reconn_max_retry: table.reconn_max_retry.unwrap_or(defaults.reconn_max_retry),
            reconn_delay: secs(table.reconn_delay, table.reconn_delay_ms, defaults.reconn_delay),
            reconn_delay_max: secs(
                table.reconn_delay_max,
                table.reconn_delay_max_ms,
                defaults.reconn_delay_max,
            ),
            reconn_exp_backoff: table.reconn_exp_backoff.unwrap_or(defaults.reconn_exp_backoff),
            transport_name: table.transport_name.unwrap_or(defaults.transport_name),
        }
    }
}

/// Per-client configuration.
///
/// Durations are whole seconds. `connTimeoutMs`, `reconnectDelayMs` and
/// `reconnectDelayMaxMs` are read as milliseconds and converted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ConfigTable")]
pub struct ClientConfig {
    /// Connect timeout, seconds
    pub conn_timeout: i64,

    pub enable_reconn: bool,

    pub reconn_max_retry: RetryLimit,

    /// Initial reconnect delay, seconds
    pub reconn_delay: i64,

    /// Upper bound for the reconnect delay, seconds
    pub reconn_delay_max: i64,

    pub reconn_exp_backoff: bool,

    pub transport_name: TransportSelector,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            conn_timeout: 30,
            enable_reconn: true,
            reconn_max_retry: RetryLimit::Always,
            reconn_delay: 2,
            reconn_delay_max: 30,
            reconn_exp_backoff: true,
            transport_name: TransportSelector::Tcp,
        }
    }
}

impl ClientConfig {
    pub fn with_transport(mut self, transport: TransportSelector) -> Self {
        self.transport_name = transport;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.conn_timeout < 0 {
            return Err(ConfigError::Negative {
                field: "conn_timeout",
                value: self.conn_timeout,
            });
        }
        if self.reconn_delay < 0 {
            return Err(ConfigError::Negative {
                field: "reconn_delay",
                value: self.reconn_delay,
            });
        }
        if self.reconn_delay_max < 0 {
            return Err(ConfigError::Negative {
                field: "reconn_delay_max",
                value: self.reconn_delay_max,
            });
        }
        if self.reconn_delay_max < self.reconn_delay {
            return Err(ConfigError::DelayBounds {
                delay: self.reconn_delay,
                max: self.reconn_delay_max,
            });
        }
        Ok(())
    }
}

/// Verbosity of the native library's logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    #[default]
    Disable,
}

/// Library-wide options handed to every transport at client creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibOptions {
    pub log_level: LogLevel,
    /// CA bundle used by TLS transports
    pub ca_file: Option<PathBuf>,
    /// Directory of CA certificates used by TLS transports
    pub ca_path: Option<PathBuf>,
}
