//! ocrflow - queue-driven document recognition pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use ocrflow::clock::{Clock, SystemClock};
use ocrflow::config::{load_config, Config};
use ocrflow::db::Database;
use ocrflow::error::OcrflowError;
use ocrflow::observer::{JobObserver, ObserverSettings};
use ocrflow::pipeline::{Orchestrator, PipelineConfig, StaleJobSweeper};
use ocrflow::queue::{MemoryQueue, MessageSource, QueueConsumer, QueueWorker, RawMessage};
use ocrflow::recognition::HttpRecognitionClient;
use ocrflow::secrets::SecretSources;
use ocrflow::storage::{FilesystemObjectStore, HttpSourceFetcher};
use ocrflow::store::{JobStore, RetryPolicy, RetryingJobStore, SqliteJobStore};

#[derive(Parser)]
#[command(name = "ocrflow")]
#[command(about = "Queue-driven document recognition pipeline")]
#[command(version)]
struct Cli {
    /// Config file path (defaults are used when omitted)
    #[arg(short, long, global = true, env = "OCRFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one batch of queue messages and print the batch report
    Consume {
        /// JSON array of `{"messageId", "body"}` objects
        batch: PathBuf,
        /// Keep redelivering failed messages until they succeed or are dead-lettered
        #[arg(long)]
        drain: bool,
    },

    /// Follow a user's jobs and print observer events until interrupted
    Observe {
        #[arg(long)]
        user: String,
    },

    /// Print a user's jobs grouped into documents
    Show {
        #[arg(long)]
        user: String,
    },

    /// Fail jobs that have stopped making progress
    Sweep,
}

#[tokio::main]
async fn main() -> Result<(), OcrflowError> {
    let cli = Cli::parse();
    ocrflow::logging::init(cli.verbose, cli.log_json)?;

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Consume { batch, drain } => consume(&config, &batch, drain).await,
        Commands::Observe { user } => observe(&config, &user).await,
        Commands::Show { user } => show(&config, &user).await,
        Commands::Sweep => sweep(&config).await,
    }
}

fn open_store(
    config: &Config,
    clock: Arc<dyn Clock>,
) -> Result<Arc<RetryingJobStore>, OcrflowError> {
    let db = Database::open(Path::new(&config.database_path))?;
    let sqlite: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(db));
    Ok(Arc::new(RetryingJobStore::new(
        sqlite,
        RetryPolicy::from_config(&config.persistence),
        clock,
    )))
}

fn build_consumer(config: &Config) -> Result<QueueConsumer, OcrflowError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(config, Arc::clone(&clock))?;

    let recognition = &config.recognition;
    let api_key = SecretSources::recognition_api_key(recognition).resolve_optional()?;
    if api_key.is_none() {
        warn!("No recognition API key configured; requests are sent unauthenticated");
    }
    let recognizer = HttpRecognitionClient::new(
        &recognition.endpoint,
        api_key,
        Duration::from_secs(recognition.request_timeout_secs),
    )?;

    let orchestrator = Orchestrator::new(
        Arc::new(PipelineConfig::from_config(config)),
        store.clone(),
        Arc::new(FilesystemObjectStore::new(&config.object_store_root)),
        Arc::new(HttpSourceFetcher::new()?),
        Arc::new(recognizer),
        clock,
    );

    Ok(QueueConsumer::new(
        Arc::new(orchestrator),
        store,
        config.worker_count,
    ))
}

fn read_batch(path: &Path) -> Result<Vec<RawMessage>, OcrflowError> {
    let content = std::fs::read_to_string(path).map_err(|e| OcrflowError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| OcrflowError::InvalidBatch(e.to_string()))
}

async fn consume(config: &Config, batch: &Path, drain: bool) -> Result<(), OcrflowError> {
    let messages = read_batch(batch)?;
    info!("Loaded {} message(s) from {}", messages.len(), batch.display());
    let consumer = build_consumer(config)?;

    if !drain {
        let report = consumer.consume(&messages).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let queue = Arc::new(MemoryQueue::new(config.queue.max_receives));
    queue.extend(messages);
    let source: Arc<dyn MessageSource> = queue.clone();
    let worker = QueueWorker::new(
        source,
        consumer,
        config.queue.batch_size,
        Duration::from_millis(config.queue.idle_delay_ms),
    );
    let stats = worker.drain().await;

    let dead_letters: Vec<String> = queue
        .dead_letters()
        .into_iter()
        .map(|m| m.message_id)
        .collect();
    let summary = serde_json::json!({
        "batches": stats.batches,
        "succeeded": stats.succeeded,
        "failed": stats.failed,
        "deadLetters": dead_letters,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn observe(config: &Config, user: &str) -> Result<(), OcrflowError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(config, Arc::clone(&clock))?;
    let settings = ObserverSettings::from_config(&config.observer);

    let (observer, _handle) = JobObserver::new(store, user, settings, clock);
    let mut events = observer.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(observer.run(shutdown_rx));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = events.recv() => match event {
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Observer output lagged, skipped {} event(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = task.await {
        warn!("Observer task ended abnormally: {}", e);
    }
    Ok(())
}

async fn show(config: &Config, user: &str) -> Result<(), OcrflowError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(config, Arc::clone(&clock))?;
    let settings = ObserverSettings::from_config(&config.observer);

    let (mut observer, _handle) = JobObserver::new(store, user, settings, clock);
    observer.fetch().await?;
    println!("{}", serde_json::to_string_pretty(&observer.documents())?);
    Ok(())
}

async fn sweep(config: &Config) -> Result<(), OcrflowError> {
    let store = open_store(config, Arc::new(SystemClock))?;
    let sweeper = StaleJobSweeper::new(
        store,
        Duration::from_secs(config.recognition.max_wait_secs),
        Duration::from_secs(config.sweeper.grace_secs),
    );
    let report = sweeper.sweep().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
