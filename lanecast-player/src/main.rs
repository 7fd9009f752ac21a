//! Lanecast operator CLI
//!
//! Store-side client for inspecting and controlling lanes in the shared
//! database, plus `play`, which runs an in-process engine that streams into
//! local PCM files instead of a chat platform voice session.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lanecast_common::config::{database_path, resolve_root_folder, ROOT_FOLDER_ENV};
use lanecast_common::db::init_database;
use lanecast_common::{history, LaneKey, SqliteQueueStore};
use lanecast_player::config::PlayerConfig;
use lanecast_player::media::{ensure_tools_available, YtDlpResolver};
use lanecast_player::voice::{FilePlatform, VoiceConnectionManager};
use lanecast_player::{AddTrackRequest, Engine, LaneEvent};

/// Command-line arguments for lanecast
#[derive(Parser, Debug)]
#[command(name = "lanecast")]
#[command(about = "Inspect and control Lanecast voice lanes")]
#[command(version)]
struct Cli {
    /// Root folder holding the shared database
    #[arg(short, long, global = true)]
    root_folder: Option<String>,

    /// Player configuration file (TOML)
    #[arg(short, long, global = true, env = "LANECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Database file, overriding the config and root folder
    #[arg(long, global = true, env = "LANECAST_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct LaneArgs {
    /// Guild (community) id
    #[arg(short, long, env = "LANECAST_GUILD_ID")]
    guild: String,

    /// Voice channel id
    #[arg(short = 'v', long = "voice-channel", env = "LANECAST_VOICE_CHANNEL_ID")]
    channel: String,
}

impl LaneArgs {
    fn lane(&self) -> Result<LaneKey> {
        LaneKey::new(self.guild.as_str(), self.channel.as_str()).context("Invalid lane")
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show now playing, flags and queue as JSON
    Status(LaneArgs),

    /// List queued tracks
    Queue(LaneArgs),

    /// Empty the queue
    Clear(LaneArgs),

    /// Remove a queued track by position
    Remove {
        #[command(flatten)]
        lane: LaneArgs,
        position: usize,
    },

    Pause(LaneArgs),

    Resume(LaneArgs),

    /// Stop playback and clear the lane
    Stop(LaneArgs),

    /// Set volume in percent (0-200)
    Volume {
        #[command(flatten)]
        lane: LaneArgs,
        percent: u32,
    },

    /// Show recently played tracks
    History {
        #[command(flatten)]
        lane: LaneArgs,
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Queue tracks and stream them to local PCM files until the queue drains
    Play {
        #[command(flatten)]
        lane: LaneArgs,

        /// URLs, or a search query with --search
        #[arg(required = true)]
        items: Vec<String>,

        /// Treat the arguments as one search query
        #[arg(short, long)]
        search: bool,

        /// Directory for the PCM output files
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        #[arg(long, default_value = "operator")]
        requested_by: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let root_folder = resolve_root_folder(cli.root_folder.as_deref(), ROOT_FOLDER_ENV);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| root_folder.join("player.toml"));
    let loaded = PlayerConfig::load(&config_path).context("Failed to load configuration")?;
    let found = loaded.is_some();
    let config = loaded.unwrap_or_default();

    init_tracing(&config)?;
    if found {
        info!("Loaded configuration from {}", config_path.display());
    } else {
        warn!(
            "Config file {} not found, using built-in defaults",
            config_path.display()
        );
    }

    let db_path = cli
        .database
        .clone()
        .or_else(|| config.database_path.clone())
        .unwrap_or_else(|| database_path(&root_folder));
    info!("Database: {}", db_path.display());

    let db = init_database(&db_path)
        .await
        .context("Failed to open database")?;
    let store = Arc::new(SqliteQueueStore::new(db.clone()));

    let output_dir = match &cli.command {
        Command::Play { output_dir, .. } => output_dir.clone(),
        _ => PathBuf::from("."),
    };
    let voice = Arc::new(VoiceConnectionManager::new(Arc::new(FilePlatform::new(
        output_dir,
    ))));
    let resolver = Arc::new(YtDlpResolver::new(config.media.yt_dlp_path.clone()));
    let engine = Engine::new(store, voice, resolver, config.clone()).with_history(db.clone());

    match cli.command {
        Command::Status(lane) => {
            let snapshot = engine.get_snapshot(&lane.lane()?).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Queue(lane) => {
            let snapshot = engine.get_snapshot(&lane.lane()?).await?;
            let offset = usize::from(snapshot.now_playing.is_some());
            if let Some(current) = &snapshot.now_playing {
                println!("0. [playing] {}", current.display_title());
            }
            for (i, track) in snapshot.tracks.iter().enumerate() {
                println!("{}. {} ({})", i + offset, track.display_title(), track.requested_by);
            }
            if snapshot.now_playing.is_none() && snapshot.tracks.is_empty() {
                println!("Queue is empty");
            }
        }
        Command::Clear(lane) => {
            engine.clear_queue(&lane.lane()?).await?;
            println!("Queue cleared");
        }
        Command::Remove { lane, position } => {
            engine.remove_track(&lane.lane()?, position).await?;
            println!("Removed position {}", position);
        }
        Command::Pause(lane) => {
            engine.set_paused(&lane.lane()?, true).await?;
            println!("Paused");
        }
        Command::Resume(lane) => {
            engine.set_paused(&lane.lane()?, false).await?;
            println!("Resumed");
        }
        Command::Stop(lane) => {
            engine.request_stop(&lane.lane()?).await?;
            println!("Stopped");
        }
        Command::Volume { lane, percent } => {
            engine.set_volume(&lane.lane()?, percent).await?;
            println!("Volume set to {}%", percent);
        }
        Command::History { lane, limit } => {
            for entry in history::list(&db, &lane.lane()?, limit).await? {
                println!(
                    "{}  {}  ({})",
                    entry.played_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.track.display_title(),
                    entry.track.requested_by
                );
            }
        }
        Command::Play {
            lane,
            items,
            search,
            requested_by,
            ..
        } => {
            ensure_tools_available(&config.media)
                .await
                .context("Media tools unavailable")?;
            run_play(&engine, lane.lane()?, items, search, &requested_by).await?;
        }
    }

    Ok(())
}

async fn run_play(
    engine: &Engine,
    lane: LaneKey,
    items: Vec<String>,
    search: bool,
    requested_by: &str,
) -> Result<()> {
    let mut events = engine.subscribe_events();

    let requests = if search {
        vec![AddTrackRequest::search(items.join(" "), requested_by, "")]
    } else {
        items
            .into_iter()
            .map(|url| AddTrackRequest::url(url, requested_by, ""))
            .collect()
    };

    for request in requests {
        let added = engine.add_track(&lane, request).await?;
        match &added.sanitised_query {
            Some(query) => println!("Queued {} (searched: {})", added.entry.url, query),
            None => println!("Queued {} at position {}", added.entry.url, added.position),
        }
    }

    if !engine.has_worker(&lane).await {
        bail!("lane {} is marked as playing by another process; not starting", lane);
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(LaneEvent::TrackStarted { lane: l, track, .. }) if l == lane => {
                    println!("Now playing: {}", track.display_title());
                }
                Ok(LaneEvent::TrackFinished { lane: l, url, outcome, .. }) if l == lane => {
                    println!("Finished {} ({:?})", url, outcome);
                }
                Ok(LaneEvent::QueueDrained { lane: l, .. }) if l == lane => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} events", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = &mut shutdown => {
                engine.request_stop(&lane).await?;
                break;
            }
        }
    }

    info!("Playback finished");
    Ok(())
}

fn init_tracing(config: &PlayerConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
