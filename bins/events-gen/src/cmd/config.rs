use std::time::Duration;

use clap::Args;
use serde::Deserialize;

use broker_kafka::KafkaConfig;

use super::error::GenError;

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub kafka_broker: Option<String>,
    pub kafka_topic: Option<String>,
    pub client_id: Option<String>,
    pub metrics_port: Option<u16>,
    pub interval_ms: Option<u64>,
    pub event_type: Option<String>,
    pub count: Option<u64>,
    pub seed: Option<u64>,
}

pub fn load_config(path: &str) -> Result<Config, GenError> {
    let content = std::fs::read_to_string(path).map_err(|e| GenError::Config(format!("cannot read config {path}: {e}")))?;
    toml::from_str(&content).map_err(|e| GenError::Config(format!("bad config {path}: {e}")))
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug, Default)]
pub struct GenArgs {
    /// Path to config.toml (optional)
    #[arg(long, env = "EVENTS_GEN_CONFIG")]
    pub config: Option<String>,

    #[arg(long, env = "KAFKA_BROKER")]
    pub kafka_broker: Option<String>,

    #[arg(long, env = "KAFKA_TOPIC")]
    pub kafka_topic: Option<String>,

    #[arg(long, env = "PRODUCER_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Port of the /metrics + /health server
    #[arg(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Pause between published events (ms)
    #[arg(long, env = "INTERVAL_MS")]
    pub interval_ms: Option<u64>,

    #[arg(long, env = "EVENT_TYPE")]
    pub event_type: Option<String>,

    /// Stop after N events (default: run until interrupted)
    #[arg(long)]
    pub count: Option<u64>,

    /// Seed for the PRNG (default: current time)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log format: text or json
    #[arg(long, default_value = "text", env = "LOG_FORMAT")]
    pub log_format: String,
}

impl GenArgs {
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

// ═══════════════════════════════════════════════════════════════
//  Effective: merged config
// ═══════════════════════════════════════════════════════════════

/// Final settings after the merge: config.toml < env/CLI
pub struct Effective {
    pub kafka: KafkaConfig,
    pub topic: String,
    pub metrics_port: u16,
    pub interval: Duration,
    pub event_type: String,
    pub count: Option<u64>,
    pub seed: Option<u64>,
}

impl Effective {
    pub fn new(args: &GenArgs) -> Result<Self, GenError> {
        let cfg = match &args.config {
            Some(path) => load_config(path)?,
            None => Config::default(),
        };
        Self::merge(args, cfg)
    }

    fn merge(args: &GenArgs, cfg: Config) -> Result<Self, GenError> {
        let interval_ms = args.interval_ms.or(cfg.interval_ms).unwrap_or(3000);
        if interval_ms == 0 {
            return Err(GenError::Config("interval_ms must be positive".into()));
        }
        let topic = args.kafka_topic.clone().or(cfg.kafka_topic).unwrap_or_else(|| "events".into());
        if topic.trim().is_empty() {
            return Err(GenError::Config("kafka topic must not be empty".into()));
        }

        Ok(Self {
            kafka: KafkaConfig {
                brokers: args.kafka_broker.clone().or(cfg.kafka_broker).unwrap_or_else(|| "localhost:9092".into()),
                client_id: args.client_id.clone().or(cfg.client_id).unwrap_or_else(|| "producer-service".into()),
                ..KafkaConfig::default()
            },
            topic,
            metrics_port: args.metrics_port.or(cfg.metrics_port).unwrap_or(9102),
            interval: Duration::from_millis(interval_ms),
            event_type: args.event_type.clone().or(cfg.event_type).unwrap_or_else(|| "user_signup".into()),
            count: args.count.or(cfg.count),
            seed: args.seed.or(cfg.seed),
        })
    }
}
