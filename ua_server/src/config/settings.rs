use crate::subscriptions::subscription::NotificationOrdering;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    pub application_name: String,
    pub application_uri: String,
    pub endpoint_url: String,
    /// Namespace registered for the demo address space.
    pub product_namespace_uri: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            application_name: "UA Example Server".to_string(),
            application_uri: "urn:ua_server:example".to_string(),
            endpoint_url: "opc.tcp://0.0.0.0:4840/freeopcua/server/".to_string(),
            product_namespace_uri: "http://examples.freeopcua.github.io".to_string(),
        }
    }
}

/// Bounds applied when revising client-requested subscription parameters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct Limits {
    pub min_publishing_interval_ms: u64,
    pub max_publishing_interval_ms: u64,
    pub default_keep_alive_count: u32,
    pub max_keep_alive_count: u32,
    pub max_lifetime_count: u32,
    /// 0 means unlimited.
    pub max_notifications_per_publish: u32,
    pub min_sampling_interval_ms: f64,
    pub default_queue_size: u32,
    pub max_queue_size: u32,
    pub retransmission_queue_size: usize,
    pub max_pending_publish_requests: usize,
    /// Expired subscription ids remembered so late requests get SessionExpired.
    pub expired_subscription_history: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            min_publishing_interval_ms: 50,
            max_publishing_interval_ms: 3_600_000,
            default_keep_alive_count: 10,
            max_keep_alive_count: 30_000,
            max_lifetime_count: 90_000,
            max_notifications_per_publish: 0,
            min_sampling_interval_ms: 50.0,
            default_queue_size: 1,
            max_queue_size: 1000,
            retransmission_queue_size: 32,
            max_pending_publish_requests: 10,
            expired_subscription_history: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct SubscriptionSettings {
    pub ordering: NotificationOrdering,
    /// Queue the current value when a data-change item is created.
    pub report_initial_value: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TypeSettings {
    pub instantiate_optional: bool,
}

impl Default for TypeSettings {
    fn default() -> Self {
        TypeSettings {
            instantiate_optional: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    pub bind_address: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            bind_address: "127.0.0.1:3000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub limits: Limits,
    pub subscriptions: SubscriptionSettings,
    pub types: TypeSettings,
    pub api: ApiSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Defaults, then the TOML file if it exists, then `UA_SERVER__SECTION__KEY` variables.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(config_path).required(false))
            .add_source(
                Environment::with_prefix("UA_SERVER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        s.try_deserialize()
    }

    pub fn save(&self, config_path: &Path) -> io::Result<()> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        fs::write(config_path, toml_string)
    }
}
