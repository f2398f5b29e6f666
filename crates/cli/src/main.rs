use anyhow::Context;
use clap::{Parser, Subcommand};
use quill::channels::{ChannelHandle, TelegramChannel};
use quill::llm::GeminiClient;
use quill::pipeline::Pipeline;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Quill: a Telegram bot that answers commands with Gemini-generated stories", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Write a default config.yaml (tokens left empty) if none exists.
    Init {
        /// Config file path (default: QUILL_CONFIG_PATH or ./config.yaml)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the bot until Ctrl+C or SIGTERM, then drain queued work and exit.
    Run {
        /// Config file path (default: QUILL_CONFIG_PATH or ./config.yaml)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Number of generation workers (default from config or 10)
        #[arg(long, short)]
        workers: Option<usize>,

        /// Number of reply dispatchers (default from config or 10)
        #[arg(long, short)]
        dispatchers: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("quill {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run {
            config,
            workers,
            dispatchers,
        }) => {
            if let Err(e) = run_bot(config, workers, dispatchers).await {
                log::error!("run failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(quill::config::default_config_path);
    if quill::init::init_config(&path)? {
        println!("wrote default configuration to {}", path.display());
    } else {
        println!("configuration already exists at {}", path.display());
    }
    Ok(())
}

async fn run_bot(
    config_path: Option<std::path::PathBuf>,
    workers: Option<usize>,
    dispatchers: Option<usize>,
) -> anyhow::Result<()> {
    let (mut config, path) = quill::config::load_config(config_path)?;
    config
        .apply_pool_overrides(workers, dispatchers)
        .context("applying command-line pool sizes")?;
    log::info!("loaded config from {}", path.display());
    let secrets = quill::config::resolve_secrets(&config).context("resolving tokens")?;

    let channel = Arc::new(TelegramChannel::new(Some(secrets.telegram_token.clone())));
    let me = channel.get_me().await.context("telegram login")?;
    log::info!(
        "authorized on account @{}",
        me.username.as_deref().unwrap_or(&me.first_name)
    );

    let backend = Arc::new(GeminiClient::new(
        Some(config.gemini.base_url.clone()),
        Some(config.gemini.model.clone()),
    ));
    log::info!("generating with model {}", backend.model());

    let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(config.pipeline.queue_capacity.max(1));
    let inbound = channel.clone().start_inbound(inbound_tx);

    let pipeline = Pipeline::from_config(
        &config,
        secrets.generation_key.clone(),
        backend,
        channel.clone(),
    );
    let report = pipeline.run_until(inbound_rx, shutdown_signal()).await;

    channel.stop();
    if let Err(e) = inbound.await {
        log::warn!("telegram inbound task ended abnormally: {}", e);
    }
    log::info!(
        "served {} requests: {} generated, {} failed, {} delivered, {} undelivered",
        report.enqueued,
        report.generated,
        report.generation_failures,
        report.delivered,
        report.delivery_failures
    );
    Ok(())
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining pipeline");
}
