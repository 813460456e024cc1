use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tokio::sync::Notify;
use uplink_bridge::{UploadManager, UploadSubscriber};
use uplink_core::ids::TaskId;
use uplink_core::options::{HeaderValue, HttpMethod, UploadOptions};
use uplink_router::EventRouter;
use uplink_store::SavedEventStore;
use uplink_telemetry::{init_telemetry, LogQuery, MetricsQuery, TelemetryConfig};
use uplink_transport::HttpTransport;

#[derive(Parser)]
#[command(name = "uplink", about = "Background upload relay with durable event replay")]
struct Cli {
    /// Saved-event snapshot file. Defaults to ~/.uplink/events.json
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect or consume saved upload events
    Saved {
        #[command(subcommand)]
        command: SavedCommand,
    },
    /// Upload a file and stream its events to stdout
    Send {
        /// Task ID; generated when omitted
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        url: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "put")]
        method: Method,
        /// Repeatable name=value pairs; numeric values are sent as integers
        #[arg(long = "header")]
        headers: Vec<String>,
    },
    /// Show recent warn+ logs persisted by the telemetry sink
    Logs {
        #[arg(long)]
        task: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show persisted metric snapshots
    Metrics {
        /// Filter by metric name, e.g. uplink_events_saved_total
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum SavedCommand {
    /// List saved events without consuming them
    List,
    /// Consume and print saved events for the given task IDs
    Take { ids: Vec<String> },
    /// Print the snapshot file path
    Path,
}

#[derive(Clone, clap::ValueEnum)]
enum Method {
    Put,
    Post,
}

/// Prints each event as a JSON line and signals when the terminal arrives.
struct StdoutSubscriber {
    done: Arc<Notify>,
}

impl StdoutSubscriber {
    fn emit(&self, event: &uplink_core::UploadEvent) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("uplink: failed to render event: {e}"),
        }
        if event.is_terminal() {
            self.done.notify_one();
        }
    }
}

impl UploadSubscriber for StdoutSubscriber {
    fn on_progress(&self, task_id: &TaskId, bytes_sent: u64) {
        self.emit(&uplink_core::UploadEvent::Progress {
            task_id: task_id.clone(),
            bytes_sent,
        });
    }
    fn on_completed(&self, task_id: &TaskId, status: u16, body: &str) {
        self.emit(&uplink_core::UploadEvent::Completed {
            task_id: task_id.clone(),
            status,
            body: body.to_string(),
        });
    }
    fn on_error(&self, task_id: &TaskId, status: Option<u16>, body: Option<&str>, error: &str) {
        self.emit(&uplink_core::UploadEvent::Failed {
            task_id: task_id.clone(),
            status,
            body: body.map(str::to_string),
            error: error.to_string(),
        });
    }
    fn on_cancelled(&self, task_id: &TaskId) {
        self.emit(&uplink_core::UploadEvent::Cancelled {
            task_id: task_id.clone(),
        });
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let guard = init_telemetry(TelemetryConfig::default());

    let store_path = cli
        .store
        .clone()
        .unwrap_or_else(|| uplink_home().join("events.json"));

    match cli.command {
        Command::Saved { command } => {
            let store = SavedEventStore::open(&store_path);
            match command {
                SavedCommand::List => {
                    let snapshot = store.snapshot();
                    if snapshot.is_empty() {
                        eprintln!("no saved events");
                    }
                    for (task_id, event) in snapshot {
                        println!("{task_id}\t{}", serde_json::to_string(&event)?);
                    }
                }
                SavedCommand::Take { ids } => {
                    let ids: Vec<TaskId> =
                        ids.iter().map(|s| TaskId::from_raw(s.as_str())).collect();
                    for (task_id, event) in store.take_many(&ids) {
                        match event {
                            Some(event) => {
                                println!("{task_id}\t{}", serde_json::to_string(&event)?)
                            }
                            None => println!("{task_id}\t-"),
                        }
                    }
                }
                SavedCommand::Path => println!("{}", store.path().display()),
            }
        }

        Command::Send { id, url, file, method, headers } => {
            let store = Arc::new(SavedEventStore::open(&store_path));
            let router = Arc::new(match guard.metrics() {
                Some(metrics) => EventRouter::with_metrics(store, metrics.clone()),
                None => EventRouter::new(store),
            });
            let transport = Arc::new(HttpTransport::new(router.clone())?);
            let manager = UploadManager::new(transport, router);

            let task_id = id.map(TaskId::from_raw).unwrap_or_default();
            let mut options = UploadOptions::new(
                task_id.clone(),
                url,
                file.to_string_lossy().into_owned(),
            )
            .with_method(match method {
                Method::Put => HttpMethod::Put,
                Method::Post => HttpMethod::Post,
            });
            for header in &headers {
                let (name, value) = header
                    .split_once('=')
                    .ok_or_else(|| anyhow::anyhow!("header must be name=value: {header}"))?;
                let value = match value.parse::<i64>() {
                    Ok(n) => HeaderValue::Int(n),
                    Err(_) => HeaderValue::Str(value.to_string()),
                };
                options.headers.push((name.to_string(), value));
            }

            let done = Arc::new(Notify::new());
            let _subscription = manager.subscribe(
                task_id.clone(),
                Arc::new(StdoutSubscriber { done: done.clone() }),
            );

            let method_label = options.method.as_str();
            if let Some(metrics) = guard.metrics() {
                metrics.gauge_add("uplink_uploads_inflight", &[], 1.0);
            }

            let started = Instant::now();
            manager.start_upload(options).await?;
            done.notified().await;

            if let Some(metrics) = guard.metrics() {
                metrics.gauge_add("uplink_uploads_inflight", &[], -1.0);
                metrics.histogram_observe(
                    "uplink_upload_duration_ms",
                    &[("method", method_label)],
                    started.elapsed().as_secs_f64() * 1000.0,
                );
                if let Err(e) = metrics.snapshot() {
                    tracing::warn!(error = %e, "Failed to snapshot metrics");
                }
            }

            manager.shutdown();
        }

        Command::Logs { task, limit } => match guard.logs() {
            Some(sink) => {
                let records = sink.query(&LogQuery {
                    task_id: task,
                    limit: Some(limit),
                    ..Default::default()
                })?;
                for record in records {
                    println!(
                        "{} {} {} {}",
                        record.timestamp, record.level, record.target, record.message
                    );
                }
            }
            None => eprintln!("log persistence is disabled"),
        },

        Command::Metrics { name, limit } => match guard.metrics() {
            Some(recorder) => {
                let snapshots = recorder.query(&MetricsQuery {
                    name,
                    limit: Some(limit),
                    ..Default::default()
                })?;
                for snap in snapshots {
                    println!(
                        "{} {} {} {}",
                        snap.timestamp,
                        snap.name,
                        snap.value,
                        snap.labels.as_deref().unwrap_or("-")
                    );
                }
            }
            None => eprintln!("metrics recording is disabled"),
        },
    }

    Ok(())
}

fn uplink_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".uplink")
}
