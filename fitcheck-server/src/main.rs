use std::sync::Arc;

use clap::Parser;
use fitcheck_core::store::pg;
use fitcheck_core::synthesizer::{OpenAiSynthesizer, SynthesizerConfig};
use fitcheck_core::FitcheckConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use fitcheck_server::http::{start_http_server, HttpState};
use fitcheck_server::report::ReportEmitter;
use fitcheck_server::sessions::{run_session_sweeper, SessionRegistry};
use fitcheck_server::workflow::Pipeline;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "fitcheck.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match FitcheckConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging: RUST_LOG wins, config level otherwise
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    if args.health {
        let pool = match pg::create_pool(&config.database).await {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Failed to connect to database: {}", e);
                std::process::exit(1);
            }
        };

        match pg::health_check(&pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }

        match pg::check_pgvector(&pool).await {
            Ok(v) => println!("✅ pgvector version: {}", v),
            Err(e) => {
                println!("❌ pgvector check failed: {}", e);
                std::process::exit(1);
            }
        }

        println!("✅ Fitcheck DB health check passed");
        return Ok(());
    }

    let embedder = fitcheck_core::create_backend(&config.embedding)?;
    let store = match fitcheck_core::create_store(&config, embedder.clone()).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open vector store: {}", e);
            std::process::exit(1);
        }
    };
    let synthesizer = Arc::new(OpenAiSynthesizer::new(SynthesizerConfig::from(
        &config.synthesis,
    ))?);

    tracing::info!(
        embedder = embedder.name(),
        store = store.name(),
        synthesizer = %config.synthesis.model,
        "Pipeline ready"
    );

    let pipeline = Arc::new(Pipeline {
        embedder,
        store,
        synthesizer,
        reports: ReportEmitter::new(config.report.clone()),
        retrieval: config.retrieval.clone(),
    });

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let state = Arc::new(HttpState {
        registry: SessionRegistry::new(pipeline),
        config,
    });

    let sweeper_state = state.clone();
    let sweeper_shutdown = tx.subscribe();
    tokio::spawn(async move {
        run_session_sweeper(
            &sweeper_state.registry,
            sweeper_state.config.sessions.clone(),
            sweeper_shutdown,
        )
        .await;
    });

    start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
