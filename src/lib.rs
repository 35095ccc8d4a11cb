pub mod audit;
pub mod capture;
pub mod db;
pub mod error;
pub mod escalation;
pub mod proctor;
pub mod session;
pub mod settings;
pub mod timer;
mod utils;

use std::{env, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::Utc;
use log::{error, info, warn};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{mpsc, watch},
    task::JoinHandle,
};

use audit::CsvAuditLog;
use capture::{Detector, FrameSource, ImageDirSource, ScriptedDetector};
use db::Database;
use proctor::{spawn_command_listener, ProctorCommand, ProctorController, StatusSnapshot};
use settings::{ProctorSettings, SettingsStore};

/// Logs each published snapshot the way a status panel would render it.
fn spawn_presenter(mut rx: watch::Receiver<StatusSnapshot>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_line = String::new();
        let mut last_display = String::new();
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();

            if snapshot.status_line != last_line {
                info!("Status: {}", snapshot.status_line);
                last_line = snapshot.status_line.clone();
            }
            if snapshot.remaining_display != last_display
                && snapshot.remaining_display.ends_with(":00")
            {
                info!("Time remaining: {}", snapshot.remaining_display);
            }
            last_display = snapshot.remaining_display.clone();

            for warning in &snapshot.last_warnings {
                warn!("Violation: {warning}");
            }
            for notice in &snapshot.notices {
                error!("System: {notice}");
            }
        }
    })
}

fn build_collaborators(
    data_dir: &std::path::Path,
    settings: &ProctorSettings,
) -> Result<(Box<dyn FrameSource>, Box<dyn Detector>)> {
    let source: Box<dyn FrameSource> = match &settings.frame_dir {
        Some(dir) => Box::new(ImageDirSource::open(&ProctorSettings::resolve(data_dir, dir))?),
        None => Box::new(ImageDirSource::blank()),
    };
    let detector: Box<dyn Detector> = match &settings.detector_script {
        Some(script) => Box::new(ScriptedDetector::from_path(&ProctorSettings::resolve(
            data_dir, script,
        ))?),
        None => Box::new(ScriptedDetector::from_script("")),
    };
    Ok((source, detector))
}

async fn run_session() -> Result<()> {
    let data_dir = env::var_os("PROCTOR_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let config_path = env::var_os("PROCTOR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("settings.json"));

    let store = SettingsStore::load(config_path)?;
    if !store.path().exists() {
        // First run: write the defaults out so they can be edited.
        store.update(store.get())?;
        info!("Wrote default settings to {}", store.path().display());
    }
    let settings = store.get();

    let database = Database::new(ProctorSettings::resolve(&data_dir, &settings.database_path))?;

    // Finalize sessions that were running when the process last died.
    let recovered = database.recover_incomplete_sessions(Utc::now()).await?;
    if recovered > 0 {
        info!("Marked {recovered} unfinished session(s) as interrupted");
    }

    let audit = CsvAuditLog::create(ProctorSettings::resolve(&data_dir, &settings.audit_log_path))?;
    let (source, detector) = build_collaborators(&data_dir, &settings)?;

    let controller = ProctorController::new(database, Arc::new(audit), settings, source, detector);
    let presenter = spawn_presenter(controller.subscribe());

    let (command_tx, command_rx) = mpsc::channel::<ProctorCommand>(8);
    let listener = spawn_command_listener(controller.clone(), command_rx);

    info!("Commands: start, stop, status, quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        match line.trim() {
            "" => continue,
            "quit" | "exit" => break,
            "status" => println!("{}", serde_json::to_string_pretty(&controller.snapshot())?),
            other => match other.parse::<ProctorCommand>() {
                Ok(command) => command_tx
                    .send(command)
                    .await
                    .context("command listener stopped")?,
                Err(err) => warn!("{err}"),
            },
        }
    }

    drop(command_tx);
    if let Err(err) = listener.await {
        error!("Command listener failed: {err}");
    }

    if controller.state() == proctor::ProctorState::Running {
        let reason = controller.stop().await?;
        info!("Exam stopped on exit: {reason}");
    }

    presenter.abort();
    Ok(())
}

pub fn run() {
    // Initialize logging (reads RUST_LOG env var, info by default)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Exam proctor starting up...");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(run_session()) {
        error!("{err:#}");
        std::process::exit(1);
    }
}
