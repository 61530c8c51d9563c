use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use medmon_ai::{AiAnalyzer, AiError, OpenAiAnalyzer, Unconfigured};
use medmon_storage::{Database, HttpFetcher, MediaStore, PgMediaStore};
use medmon_sync::{start_workers, AnalysisPipeline, AppConfig, Scraper, Supervisor};
use medmon_web::AppState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "medmon")]
#[command(about = "Media monitoring: scrape sources, analyze coverage, serve reports")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API with the background schedulers.
    Serve {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long, default_value = "migrations")]
        migrations: PathBuf,
    },
    /// Scrape every source with a URL once, for every subscribed project.
    Scrape,
    /// Analyze one item, or the oldest raw item when no id is given.
    Analyze {
        #[arg(long)]
        id: Option<Uuid>,
    },
    /// Apply the SQL migrations.
    Migrate {
        #[arg(long, default_value = "migrations")]
        dir: PathBuf,
    },
}

struct Services {
    db: Arc<Database>,
    store: Arc<dyn MediaStore>,
    scraper: Scraper,
    pipeline: AnalysisPipeline,
}

fn analyzer(config: &AppConfig) -> Result<Arc<dyn AiAnalyzer>> {
    match OpenAiAnalyzer::new(config.ai.clone()) {
        Ok(client) => {
            info!(model = client.model(), "ai analyzer configured");
            Ok(Arc::new(client))
        }
        Err(AiError::MissingApiKey) => {
            warn!("OPENAI_API_KEY is not set; analysis will mark items failed");
            Ok(Arc::new(Unconfigured))
        }
        Err(err) => Err(err).context("building ai client"),
    }
}

fn services(config: &AppConfig) -> Result<Services> {
    let db = Arc::new(
        Database::connect_lazy(config.database.clone()).context("configuring database pool")?,
    );
    let store: Arc<dyn MediaStore> = Arc::new(PgMediaStore::new(db.clone()));
    let fetcher = Arc::new(HttpFetcher::new(config.http.clone())?);
    let scraper = Scraper::new(store.clone(), fetcher);
    let pipeline = AnalysisPipeline::new(store.clone(), analyzer(config)?);
    Ok(Services {
        db,
        store,
        scraper,
        pipeline,
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("medmon=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env();
    let services = services(&config)?;

    match cli.command.unwrap_or(Commands::Serve {
        port: None,
        migrations: PathBuf::from("migrations"),
    }) {
        Commands::Serve { port, migrations } => {
            // the API stays up without a database; /health reports it
            if let Err(err) = services.db.migrate(&migrations).await {
                warn!(error = %err, "startup migrations failed");
            }

            let mut supervisor = Supervisor::new();
            if config.schedulers_enabled {
                start_workers(
                    &mut supervisor,
                    services.scraper.clone(),
                    services.pipeline.clone(),
                    &config,
                );
            } else {
                info!("background schedulers disabled");
            }

            let state = AppState::new(services.scraper, services.pipeline, supervisor.registry());
            let result = medmon_web::serve(
                state,
                port.unwrap_or(config.web_port),
                shutdown_signal(),
            )
            .await;
            supervisor.shutdown().await;
            result?;
        }
        Commands::Scrape => {
            let report = services.scraper.run_all().await?;
            let failed = report.runs.iter().filter(|r| r.error.is_some()).count();
            println!(
                "scrape complete: sources={} runs={} failed={}",
                report.total_sources,
                report.runs.len(),
                failed
            );
        }
        Commands::Analyze { id } => {
            let media_id = match id {
                Some(id) => id,
                None => match services.store.claim_next_raw_item().await? {
                    Some(id) => id,
                    None => {
                        println!("no raw media items waiting");
                        return Ok(());
                    }
                },
            };
            let report = services.pipeline.process(media_id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Migrate { dir } => {
            services.db.migrate(&dir).await?;
            println!("migrations applied from {}", dir.display());
        }
    }

    Ok(())
}
