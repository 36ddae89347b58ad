//! Terminal presenter and line-based operator commands

use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Counters, Presenter};
use crate::monitor::{ActivityLog, AlertKind, AlertLevel, Severity};
use crate::session::EngineCommand;

/// Writes log entries, counters and alerts to stdout
pub struct ConsolePresenter {
    last_counters: Option<Counters>,
}

impl ConsolePresenter {
    pub fn new() -> Self {
        Self {
            last_counters: None,
        }
    }
}

impl Default for ConsolePresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Presenter for ConsolePresenter {
    fn log(&mut self, message: &str, severity: Severity) {
        let time = chrono::Local::now().format("%H:%M:%S");
        println!("[{}] {:<7} {}", time, severity.as_str().to_uppercase(), message);
    }

    fn counters(&mut self, counters: &Counters) {
        // Only redraw when something changed
        if self.last_counters.as_ref() == Some(counters) {
            return;
        }
        println!(
            "  faces: {} | eyes: {} | movement: {}",
            counters.face_count, counters.eye_status, counters.movement_status
        );
        self.last_counters = Some(counters.clone());
    }

    fn alert(&mut self, kind: AlertKind, level: AlertLevel) {
        // BEL as the transient cue
        print!("\x07");
        println!(">> ALERT {} [{}]", kind, level.as_str());
        let _ = std::io::stdout().flush();
    }

    fn recent_activity(&mut self, log: &ActivityLog) {
        if log.is_empty() {
            println!("  no activity yet");
            return;
        }

        println!("  recent activity ({}):", log.len());
        for entry in log.entries() {
            println!(
                "    {} {:<7} {}",
                entry.time.with_timezone(&chrono::Local).format("%H:%M:%S"),
                entry.severity.as_str().to_uppercase(),
                entry.message
            );
        }
    }
}

/// Map one line of operator input to an engine command
pub fn parse_operator_command(line: &str) -> Option<EngineCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "start" => Some(EngineCommand::Start),
        "pause" => Some(EngineCommand::Pause),
        "resume" => Some(EngineCommand::Resume),
        "stop" => Some(EngineCommand::Stop),
        "hide" => Some(EngineCommand::SetHidden(true)),
        "show" => Some(EngineCommand::SetHidden(false)),
        "status" => Some(EngineCommand::Status),
        "quit" | "exit" => Some(EngineCommand::Shutdown),
        _ => None,
    }
}

fn print_commands() {
    println!("Commands: start, pause, resume, stop, hide, show, status, quit");
}

/// Read operator commands from stdin until EOF or shutdown
pub async fn run_operator_console(cmd_tx: mpsc::Sender<EngineCommand>) {
    print_commands();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Operator console closed");
                return;
            }
            Err(e) => {
                warn!("Failed to read operator input: {}", e);
                return;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let Some(cmd) = parse_operator_command(&line) else {
            print_commands();
            continue;
        };

        debug!("Operator command: {:?}", cmd);
        let shutdown = matches!(cmd, EngineCommand::Shutdown);
        if cmd_tx.send(cmd).await.is_err() || shutdown {
            return;
        }
    }
}
