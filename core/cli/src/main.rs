//! tabpulse CLI.
//!
//! A terminal stand-in for the browser host: `run` starts a presence
//! session for one "tab" and feeds it focus/visibility/input signals read
//! from stdin; `list` dumps the user's registry grouped by device.

use chrono::Utc;
use clap::{Parser, Subcommand};
use std::env;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

use tabpulse_presence::{
    group_by_device, DeviceGroup, IdentityStore, InteractionKind, PresenceSession, PresenceStore,
    SessionConfig, SqliteStore,
};

#[derive(Parser)]
#[command(name = "tabpulse", about = "Track tab presence across devices")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a presence session for this tab, reading signals from stdin.
    ///
    /// Recognized lines: focus, blur, show, hide, key, click, touch, quit.
    Run {
        /// Signed-in user id.
        #[arg(long)]
        user: String,
        /// Shared store path (default ~/.tabpulse/presence.db).
        #[arg(long)]
        db: Option<PathBuf>,
        /// User-agent string to publish with this tab's rows.
        #[arg(long)]
        agent: Option<String>,
        #[arg(long, default_value_t = 30)]
        heartbeat_secs: u64,
        #[arg(long, default_value_t = 3)]
        poll_secs: u64,
    },
    /// Print the user's registry, grouped by device.
    List {
        #[arg(long)]
        user: String,
        #[arg(long)]
        db: Option<PathBuf>,
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run {
            user,
            db,
            agent,
            heartbeat_secs,
            poll_secs,
        } => run(user, db, agent, heartbeat_secs, poll_secs),
        Command::List { user, db, json } => list(user, db, json),
    };

    if let Err(err) = result {
        error!(error = %err, "tabpulse failed");
        std::process::exit(1);
    }
}

fn init_logging() {
    let debug_enabled = env::var("TABPULSE_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_store(db: Option<PathBuf>) -> Result<Arc<SqliteStore>, String> {
    let path = match db {
        Some(path) => path,
        None => SqliteStore::default_path()?,
    };
    Ok(Arc::new(SqliteStore::new(path)?))
}

fn run(
    user: String,
    db: Option<PathBuf>,
    agent: Option<String>,
    heartbeat_secs: u64,
    poll_secs: u64,
) -> Result<(), String> {
    let store = open_store(db)?;
    let identity = IdentityStore::with_default_slots();
    let user_agent = agent.unwrap_or_else(default_user_agent);

    let config = SessionConfig {
        heartbeat_interval: Duration::from_secs(heartbeat_secs.max(1)),
        poll_interval: Duration::from_secs(poll_secs.max(1)),
        ..SessionConfig::new(user, user_agent)
    };

    let mut session = PresenceSession::start(config, &identity, store)
        .map_err(|err| format!("Failed to start presence session: {}", err))?;

    let updates = session.registry().subscribe();
    thread::spawn(move || {
        while let Ok(view) = updates.recv() {
            if let Some(err) = &view.last_error {
                println!("! registry fetch failed: {}", err);
                continue;
            }
            println!(
                "-- registry ({} devices, {} tabs) --",
                view.groups.len(),
                view.record_count()
            );
            print_groups(&view.groups);
        }
    });

    let activity = session.activity();
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.map_err(|err| format!("Failed to read stdin: {}", err))?;
        match line.trim() {
            "focus" => activity.focus_gained(),
            "blur" => activity.focus_lost(),
            "show" => activity.visibility_changed(true),
            "hide" => activity.visibility_changed(false),
            "key" => activity.interaction(InteractionKind::Key),
            "click" => activity.interaction(InteractionKind::Pointer),
            "touch" => activity.interaction(InteractionKind::Touch),
            "quit" => break,
            "" => {}
            other => println!("? unknown signal: {}", other),
        }
    }

    session.stop();
    Ok(())
}

fn list(user: String, db: Option<PathBuf>, json: bool) -> Result<(), String> {
    let store = open_store(db)?;
    let records = store.fetch_for_user(user.trim())?;
    let groups = group_by_device(records, Utc::now());

    if json {
        let payload = serde_json::to_string_pretty(&groups)
            .map_err(|err| format!("Failed to serialize registry: {}", err))?;
        println!("{}", payload);
    } else if groups.is_empty() {
        println!("no presence rows for {}", user);
    } else {
        print_groups(&groups);
    }
    Ok(())
}

fn print_groups(groups: &[DeviceGroup]) {
    for group in groups {
        println!("device {}", group.device_id);
        for entry in &group.entries {
            println!(
                "  tab {}  {:<6}  last seen {}  ({})",
                entry.record.tab_id,
                entry.display_state.as_str(),
                entry.record.last_seen,
                entry.record.user_agent
            );
        }
    }
}

fn default_user_agent() -> String {
    format!(
        "tabpulse-cli/{} ({})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}
