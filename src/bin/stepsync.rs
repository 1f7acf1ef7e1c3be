//! stepsync CLI — inspect and replay the offline workflow queue.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use stepsync::config::Config;
use stepsync::config::secrets::bearer;
use stepsync::db::Db;
use stepsync::model::payload_from_value;
use stepsync::telemetry::{TelemetryConfig, init_telemetry};
use stepsync::{
    Connectivity, ConnectivityMonitor, DurableQueue, ReconnectSync, SyncCoordinator, SyncOutcome,
    WorkflowStep,
};
use tracing::debug;

#[derive(Parser)]
#[command(name = "stepsync", about = "Offline queue for workflow steps")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Queue a workflow step
    Append {
        /// Step payload as a JSON object
        json: String,
    },
    /// Show pending steps, oldest first
    List {
        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Drop every pending step
    Clear,
    /// Deliver pending steps to the configured endpoint
    Sync,
    /// Probe the endpoint and sync whenever it becomes reachable
    Watch {
        /// Seconds between reachability probes
        #[arg(long, default_value_t = 15)]
        probe_interval: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "stepsync".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let db = Db::open(&config.database_url).await?;
    let queue = Arc::new(DurableQueue::new(db));

    let result = match cli.command {
        Command::Append { json } => cmd_append(&queue, &json).await,
        Command::List { json } => cmd_list(&queue, json).await,
        Command::Clear => cmd_clear(&queue).await,
        Command::Sync => cmd_sync(&config, Arc::clone(&queue)).await,
        Command::Watch { probe_interval } => {
            cmd_watch(&config, Arc::clone(&queue), Duration::from_secs(probe_interval)).await
        }
    };

    queue.store().close().await;
    result
}

async fn cmd_append(queue: &DurableQueue<Db>, json: &str) -> anyhow::Result<()> {
    let payload = payload_from_value(serde_json::from_str(json)?)?;
    let step = queue.append(payload).await?;
    println!("Queued step (timestamp {})", step.timestamp);
    Ok(())
}

async fn cmd_list(queue: &DurableQueue<Db>, raw: bool) -> anyhow::Result<()> {
    let steps = queue.list().await?;

    if raw {
        println!("{}", serde_json::to_string_pretty(&steps)?);
        return Ok(());
    }

    if steps.is_empty() {
        println!("No pending steps.");
        return Ok(());
    }

    println!("{:<4}  {:<19}  PAYLOAD", "#", "QUEUED");
    println!("{}", "-".repeat(80));

    for (i, step) in steps.iter().enumerate() {
        let queued = chrono::DateTime::from_timestamp_millis(step.timestamp)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| step.timestamp.to_string());
        let payload = serde_json::to_string(&step.payload)?;
        let payload_display = if payload.chars().count() > 53 {
            format!("{}...", payload.chars().take(50).collect::<String>())
        } else {
            payload
        };
        println!("{:<4}  {:<19}  {}", i + 1, queued, payload_display);
    }

    println!("\n{} step(s) pending", steps.len());
    Ok(())
}

async fn cmd_clear(queue: &DurableQueue<Db>) -> anyhow::Result<()> {
    let pending = queue.len().await?;
    queue.clear().await?;
    println!("Cleared {pending} step(s).");
    Ok(())
}

async fn cmd_sync(config: &Config, queue: Arc<DurableQueue<Db>>) -> anyhow::Result<()> {
    let transport = HttpTransport::from_config(config)?;
    let coordinator = SyncCoordinator::new(queue, config.sync_config());

    let outcome = coordinator.sync(transport.deliver_fn()).await?;
    match outcome {
        SyncOutcome::Empty => println!("Nothing to sync."),
        SyncOutcome::Delivered { count } => println!("Delivered {count} step(s)."),
        SyncOutcome::Halted {
            failed_at,
            retained,
            error,
        } => {
            println!(
                "Stopped at step {}: {error}\n{retained} step(s) kept for the next sync.",
                failed_at + 1
            );
        }
    }
    Ok(())
}

async fn cmd_watch(
    config: &Config,
    queue: Arc<DurableQueue<Db>>,
    probe_interval: Duration,
) -> anyhow::Result<()> {
    let transport = HttpTransport::from_config(config)?;
    let coordinator = Arc::new(SyncCoordinator::new(queue, config.sync_config()));
    let reconnect = ReconnectSync::new(coordinator);

    let monitor = Arc::new(ConnectivityMonitor::new(Connectivity::Offline));
    let status = monitor.subscribe();

    let probe = transport.clone();
    let probe_monitor = Arc::clone(&monitor);
    let probe_task = tokio::spawn(async move {
        loop {
            let state = probe.probe().await;
            if probe_monitor.set(state) {
                debug!(%state, "endpoint reachability changed");
            }
            tokio::time::sleep(probe_interval).await;
        }
    });

    let ctrl = reconnect.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        ctrl.shutdown();
    });

    reconnect.run(status, transport.deliver_fn()).await;
    probe_task.abort();
    Ok(())
}

/// Posts steps to `{endpoint}/workflow/`.
#[derive(Clone)]
struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    authorization: Option<String>,
}

impl HttpTransport {
    fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: config.require_endpoint()?.trim_end_matches('/').to_string(),
            authorization: config.api_token.as_ref().map(bearer),
        })
    }

    fn workflow_url(&self) -> String {
        format!("{}/workflow/", self.endpoint)
    }

    async fn post(&self, step: &WorkflowStep) -> Result<(), reqwest::Error> {
        let mut request = self.client.post(self.workflow_url()).json(step);
        if let Some(ref auth) = self.authorization {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }
        request.send().await?.error_for_status()?;
        Ok(())
    }

    fn deliver_fn(
        &self,
    ) -> impl FnMut(WorkflowStep) -> std::pin::Pin<Box<dyn Future<Output = Result<(), reqwest::Error>> + Send>>
    {
        let transport = self.clone();
        move |step| {
            let transport = transport.clone();
            Box::pin(async move { transport.post(&step).await })
        }
    }

    /// Any HTTP response, even an error status, means the service is reachable.
    async fn probe(&self) -> Connectivity {
        match self
            .client
            .get(&self.endpoint)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(_) => Connectivity::Online,
            Err(_) => Connectivity::Offline,
        }
    }
}
