//! ProctorShield Agent
//!
//! Samples webcam frames on a fixed period, submits them to the detection
//! service and raises proctoring alerts from the returned face and eye
//! signals.

mod capture;
mod config;
mod detection;
mod logging;
mod monitor;
mod report;
mod session;
mod ui;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

use config::Config;
use detection::DetectionClient;
use session::{create_engine_channels, EngineCommand, SessionEngine};
use ui::ConsolePresenter;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let config_override = config_path_arg(&args)?;
    let autostart_flag = args.iter().any(|a| a == "--autostart");

    // Keep the guard alive so buffered log lines are flushed on exit
    let _log_guard = logging::init_logging()?;

    info!("ProctorShield agent starting...");
    if let Ok(log_dir) = logging::get_log_dir() {
        info!("Logging to {:?}", log_dir);
    }

    let config = match config_override {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };
    info!("Configuration loaded from {:?}", config.config_path()?);

    let runtime = Arc::new(tokio::runtime::Runtime::new()?);

    let detector = DetectionClient::new(&config.detection)
        .context("Failed to create detection service client")?;
    info!("Detection service: {}", config.detection.base_url);

    let (cmd_tx, cmd_rx, status_tx, mut status_rx) = create_engine_channels();

    let mut engine = SessionEngine::new(
        &config,
        Arc::new(detector),
        capture::device_opener(&config.capture),
        Box::new(ConsolePresenter::new()),
        cmd_rx,
        status_tx,
    );

    // Ctrl+C sends a shutdown command so the session is stopped cleanly
    let ctrl_c_tx = cmd_tx.clone();
    let ctrl_c_runtime = runtime.clone();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        let tx = ctrl_c_tx.clone();
        ctrl_c_runtime.spawn(async move {
            let _ = tx.send(EngineCommand::Shutdown).await;
        });
    })?;

    let autostart = autostart_flag || config.capture.autostart;

    runtime.block_on(async move {
        tokio::spawn(async move {
            while let Ok(status) = status_rx.recv().await {
                debug!("Engine status: {:?}", status);
            }
        });

        tokio::spawn(ui::run_operator_console(cmd_tx.clone()));

        if autostart {
            info!("Autostart enabled");
            let _ = cmd_tx.send(EngineCommand::Start).await;
        }

        if let Err(e) = engine.run().await {
            error!("Session engine error: {}", e);
        }
    });

    // The runtime is never dropped: the stdin reader may still be parked on a
    // blocking read, and the Ctrl+C handler holds a handle until exit.
    info!("Shutdown complete");
    Ok(())
}

/// `-c <path>` / `--config <path>`
fn config_path_arg(args: &[String]) -> Result<Option<PathBuf>> {
    let Some(index) = args.iter().position(|a| a == "--config" || a == "-c") else {
        return Ok(None);
    };

    let path = args
        .get(index + 1)
        .context("--config requires a path argument")?;
    Ok(Some(PathBuf::from(path)))
}

fn print_help() {
    println!("ProctorShield Agent - webcam proctoring capture loop");
    println!();
    println!("USAGE:");
    println!("    proctor-shield-agent [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help            Print this help message");
    println!("    -c, --config <PATH>   Use this config file instead of the default");
    println!("        --autostart       Start a session immediately");
    println!();
    println!("COMMANDS (stdin):");
    println!("    start, pause, resume, stop, hide, show, status, quit");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG                  Set log level (e.g., debug, info, warn)");
    println!("    PROCTOR_SHIELD_LOG_PATH   Override the log directory");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_config_path_arg() {
        assert_eq!(config_path_arg(&args(&["agent"])).unwrap(), None);
        assert_eq!(
            config_path_arg(&args(&["agent", "-c", "/tmp/p.toml"])).unwrap(),
            Some(PathBuf::from("/tmp/p.toml"))
        );
        assert!(config_path_arg(&args(&["agent", "--config"])).is_err());
    }
}
