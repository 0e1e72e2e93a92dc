//! intake CLI: operator interface to the event-intake gateway.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use event_intake::config::Config;
use event_intake::config::secrets::ExposeSecret;
use event_intake::db::{Db, PgRecordStore, PgmqChannel};
use event_intake::intake::IntakeService;
use event_intake::model::EventId;
use event_intake::model::request::IntakeRequest;
use event_intake::server;
use event_intake::store::RecordStore;
use event_intake::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "intake", about = "Durable event-intake gateway")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve intake over HTTP
    Serve,
    /// Run migrations, create the record table and the queue
    Setup,
    /// Run one intake from a gateway-style request JSON
    Submit {
        /// Request file; reads stdin when omitted
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List PENDING records older than the pending threshold
    Pending {
        /// Maximum records to show
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Show one event record
    Show {
        /// Event id
        event_id: String,
    },
}

/// Connected backends for one process.
struct Backends {
    records: PgRecordStore,
    queue: PgmqChannel,
    queue_db: Db,
    store_db: Db,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "event-intake".to_string(),
        default_filter: config.log_level.clone(),
    })?;

    let backends = connect(&config).await?;

    match cli.command {
        Command::Serve => cmd_serve(&config, backends).await,
        Command::Setup => cmd_setup(&config, &backends).await,
        Command::Submit { file } => cmd_submit(&config, backends, file).await,
        Command::Pending { limit } => cmd_pending(&config, backends, limit).await,
        Command::Show { event_id } => cmd_show(&backends, event_id).await,
    }
}

async fn connect(config: &Config) -> anyhow::Result<Backends> {
    let store_db = Db::connect(config.store_url().expose_secret(), config.store_timeout).await?;
    let queue_db = Db::connect(config.queue_url().expose_secret(), config.store_timeout).await?;
    Ok(Backends {
        records: PgRecordStore::new(store_db.clone(), &config.events_table)?,
        queue: PgmqChannel::new(queue_db.clone(), config.dedup_window),
        queue_db,
        store_db,
    })
}

fn service(config: &Config, backends: Backends) -> IntakeService {
    IntakeService::new(
        Arc::new(backends.records),
        Arc::new(backends.queue),
        config.intake_settings(),
    )
}

async fn cmd_serve(config: &Config, backends: Backends) -> anyhow::Result<()> {
    backends.store_db.health_check().await?;
    backends.queue_db.health_check().await?;
    let service = service(config, backends);

    tokio::select! {
        result = server::serve(service, config.bind_addr) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("intake shutting down"),
    }
    Ok(())
}

async fn cmd_setup(config: &Config, backends: &Backends) -> anyhow::Result<()> {
    backends.queue_db.migrate().await?;
    backends.records.ensure_table().await?;
    backends.queue.create_queue(&config.queue_name).await?;
    println!(
        "Ready: table {} / queue {}",
        backends.records.table(),
        config.queue_name
    );
    Ok(())
}

async fn cmd_submit(
    config: &Config,
    backends: Backends,
    file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let request: IntakeRequest = serde_json::from_str(&raw)?;

    let response = service(config, backends).handle(&request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.is_success() {
        anyhow::bail!("intake failed with status {}", response.status_code);
    }
    Ok(())
}

async fn cmd_pending(config: &Config, backends: Backends, limit: i64) -> anyhow::Result<()> {
    let records = service(config, backends)
        .stale_pending(chrono::Utc::now(), limit)
        .await?;

    if records.is_empty() {
        println!("No stale PENDING records.");
        return Ok(());
    }

    println!("{:<40}  {:<20}  HISTORY", "EVENT_ID", "CREATED");
    println!("{}", "-".repeat(80));
    for record in &records {
        println!(
            "{:<40}  {:<20}  {}",
            record.event_id.as_str(),
            record.creation_date.format("%Y-%m-%d %H:%M:%S"),
            record.status_history.len()
        );
    }

    println!("\n{} record(s)", records.len());
    Ok(())
}

async fn cmd_show(backends: &Backends, event_id: String) -> anyhow::Result<()> {
    let Some(record) = backends.records.get_record(&EventId::new(&event_id)).await? else {
        anyhow::bail!("no event record '{event_id}'");
    };

    println!("Event ID:   {}", record.event_id);
    println!("Created:    {}", record.creation_date);
    println!("Retries:    {}", record.retries);
    println!("Request:    {}", record.api_request);
    println!("History:");
    for entry in &record.status_history {
        println!(
            "  {}  {:<8} {}",
            entry.creation_date.format("%Y-%m-%d %H:%M:%S"),
            entry.status.as_str(),
            entry.stage
        );
    }
    Ok(())
}
