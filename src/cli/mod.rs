//! Command-line interface: `serve` runs the API, `work` runs a worker
//! pool. Both share the environment-driven [`Settings`].

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser as ClapParser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Settings;
use crate::ingest::IngestGateway;
use crate::llm::GeminiClient;
use crate::orchestrate::PollSettings;
use crate::parser::ParserSet;
use crate::queue::{JobQueue, MemoryQueue, RedisQueue};
use crate::server::{self, AppState};
use crate::store::{JobStore, MemoryStore, RedisStore};
use crate::summarize::GeminiSummarizer;
use crate::worker::{WorkerContext, WorkerPool};

#[derive(ClapParser)]
#[command(name = "docmill", version, about = "Asynchronous document parsing and AI summarization service")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
        bind: String,

        /// Use in-process queue/store backends and embed a worker pool.
        /// Single-process mode for local development; state does not
        /// survive a restart.
        #[arg(long)]
        memory: bool,

        /// Worker tasks to embed when running with --memory
        #[arg(long, env = "WORKERS", default_value_t = 2)]
        workers: usize,
    },
    /// Run a worker pool against the configured queue
    Work {
        #[arg(long, env = "WORKERS", default_value_t = 2)]
        workers: usize,
    },
}

/// Pre-parse check used by `main` to pick the default log filter before
/// clap runs.
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env().context("invalid configuration")?;
    if !settings.summarizer_available() {
        warn!("GEMINI_API_KEY not set; AI parsing and summarization will fail");
    }

    match cli.command {
        Command::Serve {
            bind,
            memory,
            workers,
        } => serve(settings, &bind, memory, workers).await,
        Command::Work { workers } => work(settings, workers).await,
    }
}

fn build_processing(
    settings: &Settings,
) -> (Arc<ParserSet>, Arc<GeminiSummarizer>) {
    let client = GeminiClient::new(
        settings.gemini_api_key.clone(),
        &settings.gemini_model_id,
        settings.gemini_timeout,
    );
    (
        Arc::new(ParserSet::new(client.clone())),
        Arc::new(GeminiSummarizer::new(client)),
    )
}

async fn redis_backends(
    settings: &Settings,
) -> anyhow::Result<(Arc<dyn JobQueue>, Arc<dyn JobStore>)> {
    let queue = RedisQueue::connect(
        &settings.redis_url,
        &settings.stream_name,
        &settings.stream_group,
    )
    .await
    .context("connecting job queue")?;
    let store = RedisStore::connect(&settings.redis_url)
        .await
        .context("connecting job store")?;
    Ok((Arc::new(queue), Arc::new(store)))
}

async fn serve(settings: Settings, bind: &str, memory: bool, workers: usize) -> anyhow::Result<()> {
    let (queue, store): (Arc<dyn JobQueue>, Arc<dyn JobStore>) = if memory {
        info!("using in-process queue and store backends");
        (
            Arc::new(MemoryQueue::new(
                &settings.stream_name,
                &settings.stream_group,
            )),
            Arc::new(MemoryStore::new()),
        )
    } else {
        redis_backends(&settings).await?
    };

    let gateway = Arc::new(IngestGateway::new(
        queue.clone(),
        store.clone(),
        settings.spool_dir.clone(),
        settings.max_upload_bytes(),
    ));

    // Keep the shutdown sender alive for the server's lifetime so the
    // embedded pool is not torn down mid-job.
    let mut _embedded_shutdown: Option<watch::Sender<bool>> = None;
    if memory {
        // Without an external worker process nothing would drain the
        // queue, so embed a pool alongside the server.
        let (parsers, summarizer) = build_processing(&settings);
        let ctx = Arc::new(WorkerContext::new(
            &settings,
            queue.clone(),
            store.clone(),
            parsers,
            summarizer,
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        _embedded_shutdown = Some(shutdown_tx);
        let pool = WorkerPool::new(ctx, workers);
        tokio::spawn(pool.run_until_shutdown(shutdown_rx));
    }

    let state = AppState {
        gateway,
        store,
        queue,
        settings: Arc::new(settings),
        poll: PollSettings::default(),
    };
    server::serve(state, bind).await.context("API server failed")
}

async fn work(settings: Settings, workers: usize) -> anyhow::Result<()> {
    let (queue, store) = redis_backends(&settings).await?;
    let (parsers, summarizer) = build_processing(&settings);
    let ctx = Arc::new(WorkerContext::new(
        &settings, queue, store, parsers, summarizer,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested, finishing in-flight jobs");
            let _ = shutdown_tx.send(true);
        }
    });

    WorkerPool::new(ctx, workers)
        .run_until_shutdown(shutdown_rx)
        .await;
    Ok(())
}
