use clap::{Parser, Subcommand};
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use phishguard_engine::{
    config::EngineConfig,
    metrics::Metrics,
    server::{self, AppState},
    storage::PredictionStore,
    trainer::Trainer,
    DetectionEngine,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Phishing URL classifier", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve {
        /// Overrides PHISHGUARD_BIND
        #[arg(long, env = "PHISHGUARD_BIND")]
        bind: Option<String>,
    },
    /// Train a model from the dataset and save it
    Train,
    /// Classify one URL and print the result as JSON
    Check { url: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phishguard_engine=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = EngineConfig::from_env();
    info!("Loaded configuration: {:?}", config);

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Train => {
            let trainer = Trainer::from_config(&config);
            let (model, report) = trainer.fit()?;
            phishguard_engine::model::save_model(&model, &config.model_path)?;
            println!("{}", serde_json::json!({
                "train_rows": report.train_rows,
                "eval_rows": report.eval_rows,
                "accuracy": report.accuracy,
                "model_path": config.model_path,
            }));
        }
        Command::Check { url } => {
            let engine = DetectionEngine::from_config(&config);
            let classification = engine.classify(&url)?;
            println!("{}", serde_json::to_string_pretty(&classification)?);
        }
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            serve(config).await?;
        }
    }

    Ok(())
}

async fn serve(config: EngineConfig) -> anyhow::Result<()> {
    let engine = DetectionEngine::from_config(&config);
    if !engine.model_available() {
        warn!("Model is not loaded, /classify will answer 503 until a model is trained");
    }

    let state = AppState {
        engine: Arc::new(engine),
        metrics: Arc::new(Metrics::new()),
        predictions: Arc::new(PredictionStore::new(&config.predictions_path)),
    };
    let app = server::router(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    info!("Starting PhishGuard engine on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("Shutdown signal received, starting graceful shutdown");
}
