//! DPS Submit - command line entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dps_common::logging::{init_logging, LogConfig, LogLevel};
use dps_common::types::Task;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use dps_submit::config::Config;
use dps_submit::engine::DispatchEngine;
use dps_submit::harvest::OaiHarvester;
use dps_submit::ledger::{InMemoryLedger, LedgerStore, PgLedgerStore, RecordSubmitService};
use dps_submit::queue::{InMemoryRecordQueue, PgRecordQueue, RecordQueue};
use dps_submit::reader::{HttpRepresentationStore, StoreReader};
use dps_submit::status::{
    InMemoryTaskInfoStore, PgTaskInfoStore, TaskInfoStore, TaskStatusChecker, TaskStatusUpdater,
};
use dps_submit::submitters::{
    DatasetSubmitter, DepublicationSubmitter, HarvestSubmitter, RepositoryArchiveSubmitter,
    TaskSubmitterSelector,
};
use dps_submit::topics::RoundRobinTopicSelector;
use dps_submit::{SubmitRequest, SubmitTaskService};

#[derive(Parser, Debug)]
#[command(name = "dps-submit")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a task to a processing topology
    Submit {
        /// JSON task definition
        #[arg(long)]
        task: PathBuf,

        /// Target topology, e.g. validation_topology
        #[arg(long)]
        topology: String,

        /// Re-dispatch records sent by an earlier run of the task
        #[arg(long)]
        restart: bool,

        /// Resolve against the store but keep ledger, queue and status in memory
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the stored state of a task
    Status {
        #[arg(long)]
        task_id: i64,
    },
}

/// Persistence the service runs against
struct Backends {
    ledger: Arc<dyn LedgerStore>,
    queue: Arc<dyn RecordQueue>,
    infos: Arc<dyn TaskInfoStore>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig {
        level: if cli.verbose { LogLevel::Debug } else { LogLevel::Info },
        log_file_prefix: "dps-submit".to_string(),
        filter_directives: Some("dps_submit=debug,sqlx=warn,hyper=warn,reqwest=warn".to_string()),
        ..LogConfig::default()
    };
    // Environment variables take precedence
    let log_config = LogConfig::from_env_over(log_config.clone()).unwrap_or(log_config);
    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        },
    };

    if let Err(e) = run(cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    match cli.command {
        Commands::Submit {
            task,
            topology,
            restart,
            dry_run,
        } => submit(&config, task, topology, restart, dry_run).await,
        Commands::Status { task_id } => {
            let infos = PgTaskInfoStore::new(connect(&config).await?);
            match infos.find(task_id).await? {
                Some(info) => println!("{}", serde_json::to_string_pretty(&info)?),
                None => anyhow::bail!("Task {} not found", task_id),
            }
            Ok(())
        },
    }
}

async fn submit(
    config: &Config,
    task_file: PathBuf,
    topology: String,
    restart: bool,
    dry_run: bool,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(&task_file)
        .await
        .with_context(|| format!("Failed to read task file {}", task_file.display()))?;
    let task: Task = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid task definition in {}", task_file.display()))?;
    info!(task_id = task.task_id, topology = %topology, restart, dry_run, "Starting DPS submission");

    let queue = Arc::new(InMemoryRecordQueue::new());
    let backends = if dry_run {
        Backends {
            ledger: Arc::new(InMemoryLedger::new()),
            queue: queue.clone(),
            infos: Arc::new(InMemoryTaskInfoStore::new()),
        }
    } else {
        let pool = connect(config).await?;
        Backends {
            ledger: Arc::new(PgLedgerStore::new(pool.clone())),
            queue: Arc::new(PgRecordQueue::new(pool.clone())),
            infos: Arc::new(PgTaskInfoStore::new(pool)),
        }
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let task_id = task.task_id;
    let infos = Arc::clone(&backends.infos);
    let service = build_service(config, backends, shutdown)?;
    service
        .submit(SubmitRequest::new(task, topology).with_restart(restart))
        .await?;

    if let Some(info) = infos.find(task_id).await? {
        info!(
            task_id,
            state = %info.state,
            expected_size = info.expected_size,
            description = %info.state_description,
            "Submission finished"
        );
    }
    if dry_run {
        for record_id in queue.record_ids().await {
            println!("{}", record_id);
        }
    }
    Ok(())
}

fn build_service(config: &Config, backends: Backends, shutdown: CancellationToken) -> Result<SubmitTaskService> {
    let checker = Arc::new(
        TaskStatusChecker::new(Arc::clone(&backends.infos), shutdown)
            .with_check_interval(config.dispatch.kill_check_interval()),
    );
    let updater = TaskStatusUpdater::new(Arc::clone(&backends.infos));
    let submitter = Arc::new(
        RecordSubmitService::new(backends.ledger, backends.queue)
            .with_progress_log_frequency(config.dispatch.progress_log_frequency),
    );

    let store = HttpRepresentationStore::new(&config.store)?;
    let reader = StoreReader::new(Arc::new(store))
        .with_retry(config.store.max_attempts, config.store.retry_delay());
    let engine = Arc::new(
        DispatchEngine::new(reader, Arc::clone(&submitter), Arc::clone(&checker), updater.clone())
            .with_settings(config.dispatch.clone()),
    );

    let client = reqwest::Client::builder()
        .timeout(config.store.timeout())
        .user_agent(concat!("dps-submit/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let harvester = OaiHarvester::new(client.clone(), Arc::clone(&submitter), Arc::clone(&checker))
        .with_retry_policy(&config.store);

    let selector = TaskSubmitterSelector::new(
        Arc::new(HarvestSubmitter::new(Arc::new(harvester), updater.clone())),
        Arc::new(RepositoryArchiveSubmitter::new(
            client,
            Arc::clone(&submitter),
            Arc::clone(&checker),
            updater.clone(),
            config.repository.clone(),
        )),
        Arc::new(DepublicationSubmitter::new(
            Arc::clone(&submitter),
            Arc::clone(&checker),
            updater.clone(),
        )),
        Arc::new(DatasetSubmitter::new(engine)),
    );
    let topics = Arc::new(RoundRobinTopicSelector::new(&config.topics));

    Ok(SubmitTaskService::new(selector, topics, checker, updater))
}

async fn connect(config: &Config) -> Result<sqlx::PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to the database")?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    info!("Database ready");
    Ok(pool)
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, interrupting submission"),
        _ = terminate => info!("Received terminate signal, interrupting submission"),
    }
    shutdown.cancel();
}
