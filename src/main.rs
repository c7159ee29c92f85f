use std::sync::Arc;

use clap::{Parser, Subcommand};

use sideline_api::{ApiConfig, HttpApi};
use sideline_channel::{ChannelConfig, ChannelManager};
use sideline_core::events::CameraAction;
use sideline_core::ids::SessionId;
use sideline_core::session::{Session, SessionDraft, Sport};
use sideline_store::SessionStore;
use sideline_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser)]
#[command(name = "sideline", about = "Live operational view of tracking sessions")]
struct Cli {
    /// REST endpoint of the tracker backend.
    #[arg(long, default_value = "http://localhost:8000")]
    api_url: String,

    /// WebSocket endpoint of the detector event stream.
    #[arg(long, default_value = "ws://localhost:8000")]
    ws_url: String,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a session and make it current.
    Create {
        name: String,
        #[arg(long)]
        sport: Sport,
        #[arg(long, default_value_t = 20)]
        target_actions: u32,
        #[arg(long)]
        description: Option<String>,
    },
    /// List known sessions, newest first.
    List,
    /// Show one session.
    Show { id: String },
    /// Print the analytics payload for a session.
    Analytics { id: String },
    /// Connect to a session's event stream and print live state until ctrl-c.
    Watch {
        id: String,
        /// Also start a tracking run (stopped again on exit).
        #[arg(long)]
        track: bool,
        /// Ask the detector to start its camera.
        #[arg(long)]
        camera: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&TelemetryConfig {
        json: cli.json_logs,
        ..TelemetryConfig::default()
    });

    // Composition root: one API client, one channel, one store.
    let api = Arc::new(HttpApi::new(ApiConfig::new(&cli.api_url))?);
    let channel = ChannelManager::new(ChannelConfig::new(&cli.ws_url));
    let store = SessionStore::new(api, channel);

    match cli.command {
        Command::Create { name, sport, target_actions, description } => {
            let session = store
                .create_session(SessionDraft { sport, name, description, target_actions })
                .await?;
            print_session(&session);
        }
        Command::List => {
            for session in store.list_sessions().await? {
                print_session(&session);
            }
        }
        Command::Show { id } => {
            let session = store.fetch_session(&SessionId::from_raw(id)).await?;
            print_session(&session);
        }
        Command::Analytics { id } => {
            let payload = store.session_analytics(&SessionId::from_raw(id)).await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Command::Watch { id, track, camera } => {
            watch(&store, id, track, camera).await?;
        }
    }

    Ok(())
}

async fn watch(store: &SessionStore, id: String, track: bool, camera: bool) -> anyhow::Result<()> {
    let session = store.fetch_session(&SessionId::from_raw(id)).await?;
    tracing::info!(session = %session.id, sport = %session.sport, "watching session");

    store.channel().connect().await?;
    if camera {
        store.camera_control(CameraAction::Start)?;
    }
    if track {
        store.start_tracking().await?;
    }

    let mut snapshots = store.watch();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = snapshots.borrow_and_update().clone();
                println!(
                    "[{:?}/{:?}] actions={} ok={} rate={:.1}% avg={:.3} camera={}",
                    snap.connection,
                    snap.tracking,
                    snap.stats.total_actions,
                    snap.stats.successful_actions,
                    snap.stats.success_rate,
                    snap.stats.average_score,
                    snap.camera_active,
                );
                if let Some(feedback) = &snap.last_feedback {
                    println!("  {}: {}", feedback.kind, feedback.message);
                }
                if let Some(error) = snap.error.as_deref().or(snap.connection_error.as_deref()) {
                    println!("  ! {error}");
                }
            }
        }
    }

    if track {
        // Best effort: the run may already have been torn down server-side.
        if let Err(e) = store.stop_tracking().await {
            tracing::warn!(error = %e, "failed to stop tracking on exit");
        }
    }
    store.channel().disconnect();
    Ok(())
}

fn print_session(session: &Session) {
    let marker = if session.active { "*" } else { " " };
    println!(
        "{marker} {}  {:<10}  {:<24}  {}/{} actions  created {}",
        session.id,
        session.sport,
        session.name,
        session.successful_actions,
        session.total_actions,
        session.created_at.format("%Y-%m-%d %H:%M"),
    );
}
