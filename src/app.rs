//! Application wiring: settings, commander data, pipeline startup.
//!
//! The binary plays a recorded recognition script through the live
//! pipeline and prints the reminders it produces. Real capture and
//! recognition collaborators plug in through the traits in
//! [`core::capture`] instead of the scripted halves used here.

use std::env;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::alerts::model::{Reminder, Severity};
use crate::core::capture::ReminderSink;
use crate::core::commanders::CommanderStore;
use crate::core::config::ConfigManager;
use crate::core::coordinator::Coordinator;
use crate::core::pipeline::{run_pipeline, PipelineCommand};
use crate::core::replay::scripted_session;

/// Prints reminders to the terminal, severity first. Stands in for the
/// overlay renderer.
struct ConsoleSink;

impl ReminderSink for ConsoleSink {
    fn deliver(&mut self, reminder: &Reminder) -> io::Result<()> {
        let tag = match reminder.severity {
            Severity::Critical => "CRITICAL",
            Severity::Macro => "MACRO",
            Severity::Tip => "TIP",
        };
        println!("[{:>8}] {}", tag, reminder.message);
        Ok(())
    }
}

fn config_dir() -> PathBuf {
    if let Ok(dir) = env::var("SC2_COPILOT_CONFIG") {
        return PathBuf::from(dir);
    }
    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config/sc2-copilot")
}

/// Run the copilot against a recorded session script.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let Some(script_path) = env::args().nth(1) else {
        eprintln!("usage: sc2-copilot <session-script.json>");
        std::process::exit(2);
    };

    let manager = ConfigManager::new(config_dir());
    let settings = manager.load();

    let commanders = match CommanderStore::load(&settings.commander_data_path) {
        Ok(store) => {
            info!("loaded {} commander profiles", store.len());
            store
        }
        Err(e) => {
            warn!("commander data unavailable ({}), tips will be withheld", e);
            CommanderStore::default()
        }
    };

    let (source, engine) = scripted_session(&script_path)?;
    info!(
        "replaying {} recorded frames from {}",
        source.remaining(),
        script_path
    );

    let coordinator = Coordinator::new(&settings, commanders);
    let (_commands, command_rx) = mpsc::channel::<PipelineCommand>(4);
    let cancel = CancellationToken::new();

    let stop = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
            stop.cancel();
        }
    });

    run_pipeline(
        coordinator,
        source,
        engine,
        ConsoleSink,
        command_rx,
        cancel,
        Duration::from_millis(settings.sampling_interval_ms),
        Duration::from_millis(settings.recognition_timeout_ms),
        settings.delivery_queue_len,
    )
    .await;

    Ok(())
}
