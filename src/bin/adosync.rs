use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use adosync::ado::{AdoApi, AdoClient};
use adosync::asana::{AsanaApi, AsanaClient};
use adosync::sync::controller::Controller;
use adosync::sync::metadata::MetadataCache;
use adosync::sync::reconciler::Reconciler;
use adosync::sync::worker::spawn_workers;
use adosync::{Config, Database};

#[derive(Parser)]
#[command(name = "adosync", about = "Azure DevOps to Asana sync engine")]
struct Cli {
    /// Database URL (overrides DATABASE_URL)
    #[arg(long)]
    db_url: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Run a single sync cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = run(cli).await {
        log::error!("fatal: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> adosync::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(url) = cli.db_url {
        config.database_url = url;
    }

    log::info!("sync process started");

    log::info!("connecting to the database");
    let db = Database::connect(&config.database_url, config.db_max_pool_size).await?;
    // A missing unique index would allow duplicate project mappings, so
    // this is fatal before any traffic is served.
    db.ensure_indexes().await?;

    log::info!("connecting to Azure DevOps");
    let ado: Arc<dyn AdoApi> = Arc::new(AdoClient::new(&config.ado_org_url, &config.ado_pat)?);

    log::info!("connecting to Asana");
    let asana: Arc<dyn AsanaApi> = Arc::new(AsanaClient::new(&config.asana_pat)?);

    let metadata = Arc::new(MetadataCache::new(
        db.clone(),
        asana.clone(),
        config.cache_ttl,
        &config.synced_tag_name,
    ));
    metadata.preload_synced_tags().await;

    let reconciler = Arc::new(Reconciler::new(
        db.clone(),
        ado.clone(),
        asana,
        metadata,
    ));

    let (task_tx, task_rx) = mpsc::channel(config.worker_count);
    let workers = spawn_workers(config.worker_count, task_rx, reconciler);

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("interrupt received, finishing in-flight work");
                shutdown.cancel();
            }
        });
    }

    let controller = Controller::new(db.clone(), ado, task_tx, config.sync_interval);
    if cli.once {
        let report = controller.run_cycle().await;
        log::info!(
            "cycle complete: status={:?} found={} failed={} watermark_advanced={}",
            report.status,
            report.items_found,
            report.items_failed,
            report.watermark_advanced
        );
    } else {
        controller.run(shutdown).await;
    }

    // Dropping the controller closes the task queue; workers drain what
    // is left and exit.
    drop(controller);
    for handle in workers {
        let _ = handle.await;
    }

    db.close().await;
    log::info!("sync process stopped");
    Ok(())
}
