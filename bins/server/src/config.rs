use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use broker_kafka::KafkaConfig;
use ingest::IngestConfig;
use store_memory::MemoryStoreConfig;
use store_mongo::MongoStoreConfig;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "event-server", about = "Kafka → MongoDB event ingest service")]
pub struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Consume the event topic and persist events (dead-letter on exhaustion)
    Consume(ConsumeArgs),
    /// Serve the read-only events API
    Api(ApiArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(ValueEnum, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Mongo,
    Memory,
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug, Default)]
pub struct StoreArgs {
    /// Store backend
    #[arg(long, value_enum, env = "STORE")]
    pub store: Option<StoreKind>,

    #[arg(long, env = "MONGO_URI")]
    pub mongo_uri: Option<String>,

    #[arg(long, env = "MONGO_DB_NAME")]
    pub mongo_db_name: Option<String>,

    #[arg(long, env = "MONGO_COLLECTION")]
    pub mongo_collection: Option<String>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct ConsumeArgs {
    /// Path to a TOML config file
    #[arg(long, env = "CONFIG_PATH")]
    pub config: Option<String>,

    /// Comma-separated broker list
    #[arg(long, env = "KAFKA_BROKER")]
    pub kafka_broker: Option<String>,

    #[arg(long, env = "KAFKA_TOPIC")]
    pub kafka_topic: Option<String>,

    #[arg(long, env = "CONSUMER_GROUP_ID")]
    pub consumer_group_id: Option<String>,

    #[arg(long, env = "KAFKA_DLQ_TOPIC")]
    pub kafka_dlq_topic: Option<String>,

    /// Total insert attempts per event
    #[arg(long, env = "MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Pause between insert attempts (ms)
    #[arg(long, env = "RETRY_DELAY_MS")]
    pub retry_delay_ms: Option<u64>,

    /// Uncommitted messages per partition before fetching it is paused
    #[arg(long, env = "PARTITION_BUFFER")]
    pub partition_buffer: Option<usize>,

    #[arg(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// How long in-flight handlers may run after a shutdown signal
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS")]
    pub shutdown_timeout_secs: Option<u64>,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Clone, Debug, Default)]
pub struct ApiArgs {
    /// Path to a TOML config file
    #[arg(long, env = "CONFIG_PATH")]
    pub config: Option<String>,

    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    #[command(flatten)]
    pub store: StoreArgs,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

/// Same keys as the CLI flags, snake_case. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub kafka_broker: Option<String>,
    pub kafka_topic: Option<String>,
    pub consumer_group_id: Option<String>,
    pub kafka_dlq_topic: Option<String>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub partition_buffer: Option<usize>,
    pub metrics_port: Option<u16>,
    pub shutdown_timeout_secs: Option<u64>,
    pub port: Option<u16>,
    pub store: Option<StoreKind>,
    pub mongo_uri: Option<String>,
    pub mongo_db_name: Option<String>,
    pub mongo_collection: Option<String>,
}

impl FileConfig {
    pub fn load(path: Option<&str>) -> Result<Self, ServerError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content).map_err(|detail| ServerError::Config { context: "parse", detail: format!("'{path}': {detail}") })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Effective settings (config file < env/CLI)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSettings {
    Mongo(MongoStoreConfig),
    Memory(MemoryStoreConfig),
}

impl StoreSettings {
    fn merge(args: &StoreArgs, file: &FileConfig) -> Self {
        match args.store.or(file.store).unwrap_or(StoreKind::Mongo) {
            StoreKind::Memory => StoreSettings::Memory(MemoryStoreConfig::default()),
            StoreKind::Mongo => {
                let defaults = MongoStoreConfig::default();
                StoreSettings::Mongo(MongoStoreConfig {
                    uri: args.mongo_uri.clone().or_else(|| file.mongo_uri.clone()).unwrap_or(defaults.uri),
                    database: args
                        .mongo_db_name
                        .clone()
                        .or_else(|| file.mongo_db_name.clone())
                        .unwrap_or(defaults.database),
                    collection: args
                        .mongo_collection
                        .clone()
                        .or_else(|| file.mongo_collection.clone())
                        .unwrap_or(defaults.collection),
                    ..defaults
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsumeSettings {
    pub kafka: KafkaConfig,
    pub group_id: String,
    pub ingest: IngestConfig,
    pub store: StoreSettings,
    pub metrics_port: u16,
    pub shutdown_timeout: Duration,
}

impl ConsumeSettings {
    pub fn resolve(args: &ConsumeArgs) -> Result<Self, ServerError> {
        let file = FileConfig::load(args.config.as_deref())?;
        Self::merge(args, file)
    }

    pub fn merge(args: &ConsumeArgs, file: FileConfig) -> Result<Self, ServerError> {
        let store = StoreSettings::merge(&args.store, &file);

        let kafka = KafkaConfig {
            brokers: args.kafka_broker.clone().or(file.kafka_broker).unwrap_or_else(|| "localhost:9092".into()),
            client_id: "consumer-service".into(),
            ..KafkaConfig::default()
        };

        let ingest = IngestConfig {
            topic: args.kafka_topic.clone().or(file.kafka_topic).unwrap_or_else(|| "events".into()),
            dead_letter_topic: args
                .kafka_dlq_topic
                .clone()
                .or(file.kafka_dlq_topic)
                .unwrap_or_else(|| "events-dlq".into()),
            max_retries: args.max_retries.or(file.max_retries).unwrap_or(3),
            retry_delay_ms: args.retry_delay_ms.or(file.retry_delay_ms).unwrap_or(0),
            partition_buffer: args.partition_buffer.or(file.partition_buffer).unwrap_or(64),
        };
        ingest.validate()?;

        let group_id = args
            .consumer_group_id
            .clone()
            .or(file.consumer_group_id)
            .unwrap_or_else(|| "consumer-group".into());
        if group_id.trim().is_empty() {
            return Err(ServerError::Config { context: "consumer_group_id", detail: "must not be empty".into() });
        }

        Ok(Self {
            kafka,
            group_id,
            ingest,
            store,
            metrics_port: args.metrics_port.or(file.metrics_port).unwrap_or(9101),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs.or(file.shutdown_timeout_secs).unwrap_or(5)),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub port: u16,
    pub store: StoreSettings,
}

impl ApiSettings {
    pub fn resolve(args: &ApiArgs) -> Result<Self, ServerError> {
        let file = FileConfig::load(args.config.as_deref())?;
        Ok(Self::merge(args, file))
    }

    pub fn merge(args: &ApiArgs, file: FileConfig) -> Self {
        Self {
            store: StoreSettings::merge(&args.store, &file),
            port: args.port.or(file.port).unwrap_or(3000),
        }
    }
}
