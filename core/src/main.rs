use clap::Parser;
use std::path::PathBuf;
use stompmq::{BrokerConfig, BrokerServer, MessageHandler, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

#[derive(Parser, Debug)]
#[command(name = "stompmq")]
#[command(about = "A STOMP message broker with an embedded durable message log")]
struct Args {
    /// Configuration file (TOML, JSON, INI or YAML, by extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Message log database file; an empty value keeps messages in memory
    #[arg(long)]
    db_file: Option<PathBuf>,

    /// Used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = BrokerConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.listen_port = port;
    }
    if let Some(db_file) = args.db_file {
        config.db_file = Some(db_file);
    }

    let level = parse_log_level(&args.log_level);
    let _guard = init_logging(&config, level.unwrap_or(tracing::Level::INFO))?;
    if level.is_none() {
        warn!("Invalid log level '{}', defaulting to 'info'", args.log_level);
    }

    info!("Starting stompmq broker on {}", config.bind_address());
    info!(
        "Message log: {}",
        config
            .db_path()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "in-memory".to_string())
    );
    info!("Authentication enabled: {}", config.auth_enabled());
    info!("Volatile prefix: {}", config.volatile_prefix);

    let mut signals = ShutdownSignal::register()?;
    let handler = MessageHandler::open(config)?;
    let server = BrokerServer::bind(handler).await?;
    let shutdown = server.shutdown_handle();

    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("Server error: {}", e);
        }
    });

    tokio::select! {
        _ = signals.recv() => {
            let _ = shutdown.send(());
            if let Err(e) = (&mut server_handle).await {
                error!("Server task failed: {}", e);
            }
        }
        _ = &mut server_handle => {
            info!("Server task completed");
        }
    }

    info!("stompmq shut down successfully");
    Ok(())
}

/// SIGINT and SIGTERM on unix, Ctrl+C elsewhere. Registered before the
/// listener is bound.
struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: signal::unix::Signal,
    #[cfg(unix)]
    terminate: signal::unix::Signal,
}

impl ShutdownSignal {
    #[cfg(unix)]
    fn register() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    fn register() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
            }
            _ = self.terminate.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Received Ctrl+C, shutting down gracefully...");
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `default_level`. When
/// `logFile` is configured output goes there through a non-blocking writer
/// whose guard must be held until exit.
fn init_logging(config: &BrokerConfig, default_level: tracing::Level) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(default_level).into())
        .from_env_lossy();

    let Some(log_file) = config.log_file.as_ref() else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    };

    let directory = log_file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = log_file.file_name().ok_or_else(|| {
        stompmq::StompmqError::Config(format!("logFile {} has no file name", log_file.display()))
    })?;
    std::fs::create_dir_all(&directory)?;

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

fn parse_log_level(level: &str) -> Option<tracing::Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(tracing::Level::TRACE),
        "debug" => Some(tracing::Level::DEBUG),
        "info" => Some(tracing::Level::INFO),
        "warn" => Some(tracing::Level::WARN),
        "error" => Some(tracing::Level::ERROR),
        _ => None,
    }
}
