//! The recognized configuration surface.
//!
//! Field names follow the documented option names; everything except the
//! upstream coordinates, the query base URL and the cache bound has a
//! default. `cache.max_entries` deliberately has none: an unbounded cache
//! is not a configuration this service offers.

use anyhow::Context;
use hub::{query_client::QueryConfig, IngestorConfig};
use serde::Deserialize;
use std::{net::SocketAddr, path::Path, time::Duration};
use url::Url;

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub upstream: UpstreamSettings,
    pub query: QuerySettings,
    #[serde(default)]
    pub stream: StreamSettings,
    pub cache: CacheSettings,
    #[serde(default)]
    pub subscription: SubscriptionSettings,
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub shutdown: ShutdownSettings,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamSettings {
    pub brokers: Vec<String>,
    pub orders_topic: String,
    pub executions_topic: String,
    /// JetStream stream the topics live on.
    #[serde(default = "default_stream_name")]
    pub stream_name: String,
    /// Only consulted by schema-encoded deployments; the stock mappers are
    /// JSON and ignore it.
    #[serde(default)]
    pub schema_registry: Option<String>,
    pub consumer_group: String,
    #[serde(default = "default_poison_threshold")]
    pub poison_threshold: u32,
    #[serde(default = "default_poison_window_ms")]
    pub poison_window_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuerySettings {
    pub base_url: Url,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamSettings {
    #[serde(default = "default_replay_buffer_size")]
    pub replay_buffer_size: usize,
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            replay_buffer_size: default_replay_buffer_size(),
            inbox_capacity: default_inbox_capacity(),
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

/// The only implemented strategy; named so configurations stay explicit
/// about what happens to slow subscribers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum OverflowPolicy {
    #[default]
    #[serde(rename = "DROP_OLDEST")]
    DropOldest,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    pub max_entries: usize,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionSettings {
    #[serde(default = "default_snapshot_id_grace_ms")]
    pub snapshot_id_grace_ms: u64,
    #[serde(default = "default_true")]
    pub require_running: bool,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            snapshot_id_grace_ms: default_snapshot_id_grace_ms(),
            require_running: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorSettings {
    #[serde(default = "default_backoff_ms_initial")]
    pub backoff_ms_initial: u64,
    #[serde(default = "default_backoff_ms_ceiling")]
    pub backoff_ms_ceiling: u64,
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            backoff_ms_initial: default_backoff_ms_initial(),
            backoff_ms_ceiling: default_backoff_ms_ceiling(),
            backoff_jitter: default_backoff_jitter(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShutdownSettings {
    #[serde(default = "default_shutdown_grace_ms")]
    pub grace_ms: u64,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading settings from {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing settings from {}", path.display()))
    }

    /// Consumer configuration for one topic; the durable name is the
    /// consumer group suffixed per topic so offsets track independently.
    pub fn ingestor_config(&self, topic: &str, suffix: &str) -> IngestorConfig {
        IngestorConfig {
            servers: self.upstream.brokers.clone(),
            stream_name: self.upstream.stream_name.clone(),
            topic: topic.to_owned(),
            consumer_group: format!("{}-{}", self.upstream.consumer_group, suffix),
            poison_threshold: self.upstream.poison_threshold,
            poison_window: Duration::from_millis(self.upstream.poison_window_ms),
            backoff_initial: Duration::from_millis(self.supervisor.backoff_ms_initial),
            backoff_ceiling: Duration::from_millis(self.supervisor.backoff_ms_ceiling),
            backoff_jitter: self.supervisor.backoff_jitter,
        }
    }

    pub fn query_config(&self) -> QueryConfig {
        QueryConfig {
            base_url: self.query.base_url.clone(),
            page_size: self.query.page_size,
            connect_timeout: Duration::from_millis(self.query.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.query.read_timeout_ms),
        }
    }

    pub fn engine_config(&self) -> api::EngineConfig {
        api::EngineConfig {
            snapshot_id_grace: Duration::from_millis(self.subscription.snapshot_id_grace_ms),
            require_running: self.subscription.require_running,
        }
    }
}

fn default_stream_name() -> String {
    "TRADE_EVENTS".to_owned()
}
fn default_poison_threshold() -> u32 {
    5
}
fn default_poison_window_ms() -> u64 {
    60_000
}
fn default_page_size() -> usize {
    500
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_read_timeout_ms() -> u64 {
    30_000
}
fn default_replay_buffer_size() -> usize {
    100
}
fn default_inbox_capacity() -> usize {
    1_000
}
fn default_snapshot_id_grace_ms() -> u64 {
    5_000
}
fn default_true() -> bool {
    true
}
fn default_backoff_ms_initial() -> u64 {
    1_000
}
fn default_backoff_ms_ceiling() -> u64 {
    30_000
}
fn default_backoff_jitter() -> f64 {
    0.5
}
fn default_bind_addr() -> SocketAddr {
    ([127, 0, 0, 1], 4454).into()
}
fn default_shutdown_grace_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MINIMAL: &str = r#"{
        "upstream": {
            "brokers": ["nats://localhost:4222"],
            "orders_topic": "trade.orders",
            "executions_topic": "trade.executions",
            "consumer_group": "blotter"
        },
        "query": {"base_url": "http://query.example.com/api"},
        "cache": {"max_entries": 10000}
    }"#;

    #[test]
    fn minimal_settings_fill_in_the_documented_defaults() {
        let s: Settings = serde_json::from_str(MINIMAL).unwrap();
        assert_eq!(s.query.page_size, 500);
        assert_eq!(s.query.connect_timeout_ms, 5_000);
        assert_eq!(s.query.read_timeout_ms, 30_000);
        assert_eq!(s.stream.replay_buffer_size, 100);
        assert_eq!(s.stream.inbox_capacity, 1_000);
        assert_eq!(s.stream.overflow_policy, OverflowPolicy::DropOldest);
        assert_eq!(s.subscription.snapshot_id_grace_ms, 5_000);
        assert!(s.subscription.require_running);
        assert_eq!(s.supervisor.backoff_ms_initial, 1_000);
        assert_eq!(s.supervisor.backoff_ms_ceiling, 30_000);
        assert_eq!(s.supervisor.backoff_jitter, 0.5);
        assert_eq!(s.shutdown.grace_ms, 10_000);
        assert_eq!(s.cache.max_entries, 10_000);
    }

    #[test]
    fn the_cache_bound_is_mandatory() {
        let without_cache = r#"{
            "upstream": {
                "brokers": ["nats://localhost:4222"],
                "orders_topic": "trade.orders",
                "executions_topic": "trade.executions",
                "consumer_group": "blotter"
            },
            "query": {"base_url": "http://query.example.com/api"}
        }"#;
        assert!(serde_json::from_str::<Settings>(without_cache).is_err());
    }

    #[test]
    fn consumer_groups_are_suffixed_per_topic() {
        let s: Settings = serde_json::from_str(MINIMAL).unwrap();
        let orders = s.ingestor_config(&s.upstream.orders_topic, "orders");
        assert_eq!(orders.consumer_group, "blotter-orders");
        assert_eq!(orders.topic, "trade.orders");
        assert_eq!(orders.backoff_initial, Duration::from_secs(1));
        assert_eq!(orders.backoff_ceiling, Duration::from_secs(30));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let with_typo = MINIMAL.replace("\"max_entries\"", "\"max_entrys\"");
        assert!(serde_json::from_str::<Settings>(&with_typo).is_err());
    }
}
