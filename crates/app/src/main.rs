//! Content projector entry point.
//!
//! `run` starts one consumer host per configured topic plus the HTTP surface
//! and stops everything on Ctrl+C. `produce` publishes sample records.

use std::sync::Arc;

use anyhow::{Context, Result};
use app_config::{AppConfig, ConsumerOptions, RecordFormat, StoreBackend};
use clap::{Parser, Subcommand, ValueEnum};
use kafka_consumer::{
    AvroDeserializer, ConsumerHost, ConsumerMetrics, HostedConsumer, JsonDeserializer,
    KafkaRecordSource,
};
use model::{Actor, AppId, Commodity, CommandContext, ExchangeRate, TypedRecord};
use projection::{DynamicRecordHandler, TypedRecordHandler};
use prometheus::Registry;
use repository::{ContentStore, InMemoryContentStore, PgContentStore};
use server::Server;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "content-projector", version, about = "Projects Kafka records into a content store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consume every configured topic until interrupted.
    Run,
    /// Publish sample records to a topic.
    Produce {
        /// Target topic.
        #[arg(long)]
        topic: String,
        /// Wire format of the records.
        #[arg(long, value_enum, default_value_t = FormatArg::Avro)]
        format: FormatArg,
        /// Number of records to publish.
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Avro,
    ExchangeRate,
    Commodity,
}

impl From<FormatArg> for RecordFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Avro => RecordFormat::Avro,
            FormatArg::ExchangeRate => RecordFormat::ExchangeRate,
            FormatArg::Commodity => RecordFormat::Commodity,
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();

    let config = AppConfig::load().context("Failed to load configuration")?;

    match cli.command {
        Command::Run => run(config).await,
        Command::Produce {
            topic,
            format,
            count,
        } => {
            let keys = kafka_producer::produce_samples(&config, &topic, format.into(), count).await?;
            info!(topic = %topic, published = keys.len(), "Samples published");
            Ok(())
        }
    }
}

async fn run(config: AppConfig) -> Result<()> {
    info!("Content projector starting...");

    if config.consumers.is_empty() {
        warn!("No consumers configured, only the HTTP server will run");
    }

    let store = open_store(&config).await?;
    let registry = Registry::new();
    let metrics =
        ConsumerMetrics::register(&registry).context("Failed to register consumer metrics")?;

    let mut hosts = Vec::with_capacity(config.consumers.len());
    for options in &config.consumers {
        let host = build_host(&config, options, store.clone(), metrics.clone())
            .with_context(|| format!("Failed to set up consumer for topic '{}'", options.topic_name))?;
        hosts.push(host);
    }

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(err) => error!("Failed to listen for shutdown signal: {}", err),
        }
        shutdown_signal.cancel();
    });

    let http_server = Server::new(
        config.http_port,
        registry,
        hosts.iter().map(|h| h.status()).collect(),
    )?;
    let server_shutdown = shutdown.clone();
    let server_task = tokio::spawn(async move {
        if let Err(err) = http_server.start(server_shutdown.clone()).await {
            error!("HTTP server error: {:#}", err);
            server_shutdown.cancel();
        }
    });

    for host in hosts.iter_mut() {
        host.start();
    }
    info!(consumers = hosts.len(), "Consumers started");

    shutdown.cancelled().await;

    for host in hosts.iter_mut() {
        let topic = host.status().topic().to_string();
        if tokio::time::timeout(config.shutdown_timeout, host.stop())
            .await
            .is_err()
        {
            warn!(topic = %topic, timeout = ?config.shutdown_timeout, "Consumer did not stop in time");
        }
    }

    if let Err(err) = server_task.await {
        error!("Task error: {}", err);
    }

    info!("Application stopped");
    Ok(())
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn ContentStore>> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let pool = db::init_db_pool(config)
                .await
                .context("Failed to initialize database")?;
            info!("Database initialized successfully");
            Ok(Arc::new(PgContentStore::new(pool)))
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory content store, nothing survives a restart");
            Ok(Arc::new(InMemoryContentStore::new()))
        }
    }
}

fn build_host(
    config: &AppConfig,
    options: &ConsumerOptions,
    store: Arc<dyn ContentStore>,
    metrics: ConsumerMetrics,
) -> Result<Box<dyn HostedConsumer>> {
    let ctx = CommandContext::new(
        AppId::new(options.app_name.as_str()),
        Actor::client(options.client_name.as_str()),
    );

    let host: Box<dyn HostedConsumer> = match options.record_format {
        RecordFormat::Avro => {
            let source =
                KafkaRecordSource::new(&config.kafka_brokers, options, AvroDeserializer::new())?;
            let handler = DynamicRecordHandler::new(store, options);
            Box::new(
                ConsumerHost::new(source, handler, ctx, options.schema_name.as_str())
                    .with_metrics(metrics),
            )
        }
        RecordFormat::ExchangeRate => {
            typed_host::<ExchangeRate>(config, options, store, ctx, metrics)?
        }
        RecordFormat::Commodity => typed_host::<Commodity>(config, options, store, ctx, metrics)?,
    };
    Ok(host)
}

fn typed_host<T: TypedRecord>(
    config: &AppConfig,
    options: &ConsumerOptions,
    store: Arc<dyn ContentStore>,
    ctx: CommandContext,
    metrics: ConsumerMetrics,
) -> Result<Box<dyn HostedConsumer>> {
    let source =
        KafkaRecordSource::new(&config.kafka_brokers, options, JsonDeserializer::<T>::new())?;
    let handler = TypedRecordHandler::<T>::new(store);
    Ok(Box::new(
        ConsumerHost::new(source, handler, ctx, options.schema_name.as_str()).with_metrics(metrics),
    ))
}
