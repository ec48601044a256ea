use anyhow::Result;
use clap::{Parser, Subcommand};
use scheduler_inspector::{
    api::{build_router, ApiState},
    batch::BatchClassifier,
    classify_cmd,
    config::Config,
    dashboard::DashboardService,
    metrics::MetricsRecorder,
    reports::TransitionAnalyzer,
    store::{ClickHouseStore, SlotStore},
    validators_app::{HttpValidatorSource, ValidatorDirectory},
    winrates::{PropAmmAnalyzer, WinrateSettings},
};
use sequencing_core::validators::FRANKENDANCER;
use sequencing_core::{Classification, TrackedTypes};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Classify every validator running a software client and write the labels as JSON.
    Classify {
        #[arg(long, default_value = FRANKENDANCER)]
        software_client: String,

        #[arg(short, long, default_value = "classifications.json")]
        output: PathBuf,

        #[arg(long)]
        window: Option<usize>,

        #[arg(long)]
        width: Option<usize>,
    },
}

struct Services {
    store: Arc<dyn SlotStore>,
    directory: Arc<ValidatorDirectory>,
    metrics: Arc<MetricsRecorder>,
}

impl Services {
    fn new(config: &Config) -> Result<Self> {
        let metrics = Arc::new(MetricsRecorder::new()?);
        let store: Arc<dyn SlotStore> =
            Arc::new(ClickHouseStore::new(config).with_metrics(metrics.clone()));
        let source = Arc::new(HttpValidatorSource::new(config)?);
        let directory = Arc::new(
            ValidatorDirectory::new(source, config.validator_cache_ttl()).with_metrics(metrics.clone()),
        );
        Ok(Self {
            store,
            directory,
            metrics,
        })
    }

    fn classifier(&self, window: usize, width: usize) -> BatchClassifier {
        BatchClassifier::new(self.store.clone(), window, width).with_metrics(self.metrics.clone())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let args = Args::parse();
    let config = Config::resolve(Some(args.config.as_str()))?;
    let services = Services::new(&config)?;

    match args.command {
        Command::Serve { port } => serve(config, services, port).await,
        Command::Classify {
            software_client,
            output,
            window,
            width,
        } => {
            let classifier = services.classifier(
                window.unwrap_or(config.classification_window),
                width.unwrap_or(config.batch_width),
            );
            let file = classify_cmd::run(&classifier, &services.directory, &software_client, &output).await?;

            println!("{} classifications written to {}", file.classifications.len(), output.display());
            println!("  Rev:     {}", file.count(Classification::SecondHalfDominant));
            println!("  Vanilla: {}", file.count(Classification::Other));
            Ok(())
        }
    }
}

async fn serve(config: Config, services: Services, port: Option<u16>) -> Result<()> {
    let classifier = Arc::new(services.classifier(config.classification_window, config.batch_width));
    let transitions = Arc::new(
        TransitionAnalyzer::new(
            services.store.clone(),
            services.directory.clone(),
            TrackedTypes::new(config.tracked_types.iter().cloned()),
            config.reference_type.clone(),
            config.tracked_accounts.clone(),
            config.transition_cache_ttl(),
        )
        .with_metrics(services.metrics.clone()),
    );

    let dashboard = Arc::new(
        DashboardService::new(
            services.store.clone(),
            config.dashboard_default_hours,
            config.dashboard_cache_ttl(),
        )
        .with_metrics(services.metrics.clone()),
    );
    let prop_amm = Arc::new(
        PropAmmAnalyzer::new(services.store.clone(), WinrateSettings::from_config(&config))
            .with_metrics(services.metrics.clone()),
    );

    let state = Arc::new(ApiState {
        store: services.store,
        classifier,
        directory: services.directory,
        transitions,
        dashboard,
        prop_amm,
        metrics: services.metrics,
        transition_default_hours: config.transition_default_hours,
    });

    let app = build_router(state);

    let port = port.unwrap_or(config.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!("Scheduler inspector listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Scheduler inspector stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
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
}
