//! Host configuration (§6.6): listen addresses, AMQP targets, TLS,
//! router selection, logging flags, and named connection strings. Loaded
//! through the `config` crate from an optional file plus environment
//! overrides, the way the teacher loads its own server configuration.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HostError, HostResult};

/// A host option that accepts either one value or a list of them, per
/// §6.6 ("listen address; string or list").
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// `ssl` host option (§6.2): merged into any `http`/`server` entry that
/// doesn't declare its own TLS source.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SslOptions {
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
    pub pkcs12_path: Option<String>,
    pub passphrase: Option<String>,
}

/// One `rabbit` entry (§6.4): broker URL, exactly one of `queue`/
/// `exchange`, and the standard queue flags.
#[derive(Debug, Clone, Deserialize)]
pub struct RabbitOptions {
    pub url: String,
    pub queue: Option<String>,
    pub exchange: Option<String>,
    pub exchange_type: Option<String>,
    pub routing_key: Option<String>,
    #[serde(default)]
    pub durable: bool,
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub auto_delete: bool,
    #[serde(default)]
    pub passive: bool,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

fn default_retry_delay_secs() -> u64 {
    10
}

impl RabbitOptions {
    /// Build the listener config this entry describes, validating the
    /// exactly-one-of-queue/exchange invariant of §6.4.
    pub fn into_listener_config(self) -> HostResult<relaymesh_amqp::AmqpListenerConfig> {
        let flags = relaymesh_amqp::QueueFlags {
            durable: self.durable,
            exclusive: self.exclusive,
            auto_delete: self.auto_delete,
            passive: self.passive,
        };
        relaymesh_amqp::AmqpListenerConfig::from_options(
            self.url,
            self.queue,
            self.exchange,
            self.exchange_type,
            self.routing_key,
            flags,
            Duration::from_secs(self.retry_delay_secs),
        )
        .map_err(HostError::from)
    }
}

/// The `router` host option (§4.4, §C.2): either a single context-type
/// name, or a map of context-type name to an ordered list of URL glob
/// patterns. A `"*"` key in the map short-circuits to a single context
/// type regardless of URL, per `context_factory.py`'s wildcard handling.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RouterOption {
    Single(String),
    Map(HashMap<String, Vec<String>>),
}

/// `settings.connections.<kind>.<name>` (§C.3): preconfigured connection
/// strings, exposed to handlers via DI as a [`crate::connections::ConnectionStrings`]
/// singleton.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SettingsOptions {
    #[serde(default)]
    pub connections: HashMap<String, HashMap<String, String>>,
}

/// The full host configuration (§6.6). Unknown keys are ignored, per the
/// spec's explicit policy, which the `config` crate's deserialization
/// already gives us for free by only populating fields this struct
/// declares.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct HostOptions {
    #[serde(alias = "http")]
    pub server: Option<OneOrMany<String>>,
    pub tcp: Option<OneOrMany<String>>,
    pub rabbit: Option<OneOrMany<RabbitOptions>>,
    pub ssl: Option<SslOptions>,
    pub router: Option<RouterOption>,
    pub cache: Option<serde_json::Value>,
    pub logger: Option<String>,
    #[serde(default)]
    pub log_request: bool,
    #[serde(default)]
    pub log_error: bool,
    #[serde(default)]
    pub settings: SettingsOptions,
}

impl HostOptions {
    /// Load host options from an optional config file (TOML/YAML/JSON,
    /// auto-detected by extension) plus `RELAYMESH_*` environment
    /// overrides, e.g. `RELAYMESH_LOG_REQUEST=true`.
    pub fn load(file: Option<&str>) -> HostResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("RELAYMESH")
                .separator("__")
                .try_parsing(true),
        );
        let settings = builder.build()?;
        settings.try_deserialize().map_err(HostError::from)
    }

    /// Every HTTP/HTTPS listen address this host should bind, parsed to
    /// `SocketAddr`.
    pub fn http_addrs(&self) -> HostResult<Vec<SocketAddr>> {
        parse_addrs(self.server.clone())
    }

    /// Every TCP listen address this host should bind.
    pub fn tcp_addrs(&self) -> HostResult<Vec<SocketAddr>> {
        parse_addrs(self.tcp.clone())
    }

    /// Every AMQP listener configuration this host should start.
    pub fn rabbit_configs(&self) -> HostResult<Vec<relaymesh_amqp::AmqpListenerConfig>> {
        self.rabbit
            .clone()
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .map(RabbitOptions::into_listener_config)
            .collect()
    }
}

fn parse_addrs(option: Option<OneOrMany<String>>) -> HostResult<Vec<SocketAddr>> {
    option
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .map(|addr| {
            addr.parse::<SocketAddr>()
                .map_err(|e| HostError::Tls(format!("invalid listen address '{addr}': {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_or_many_normalizes_scalar_and_list() {
        let one: OneOrMany<String> = serde_json::from_str("\"0.0.0.0:8080\"").unwrap();
        assert_eq!(one.into_vec(), vec!["0.0.0.0:8080".to_string()]);

        let many: OneOrMany<String> = serde_json::from_str("[\"a\", \"b\"]").unwrap();
        assert_eq!(many.into_vec(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn router_option_accepts_single_name_or_pattern_map() {
        let single: RouterOption = serde_json::from_str("\"http-rest\"").unwrap();
        assert!(matches!(single, RouterOption::Single(name) if name == "http-rest"));

        let map: RouterOption = serde_json::from_str(r#"{"http-rest": ["/api/*"], "http-web": ["*"]}"#).unwrap();
        assert!(matches!(map, RouterOption::Map(_)));
    }

    #[test]
    fn rabbit_options_rejects_both_queue_and_exchange() {
        let opts = RabbitOptions {
            url: "amqp://localhost".to_string(),
            queue: Some("q".to_string()),
            exchange: Some("x".to_string()),
            exchange_type: None,
            routing_key: None,
            durable: false,
            exclusive: false,
            auto_delete: false,
            passive: false,
            retry_delay_secs: 10,
        };
        assert!(opts.into_listener_config().is_err());
    }
}
