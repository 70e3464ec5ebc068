//! Line-oriented host surface for the binary: reads commands from stdin
//! and logs every frame the engine flushes.

use std::io::BufRead;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::config::ThrottleInterval;
use crate::engine::status::{RowFilter, StatusSnapshot};
use crate::engine::{Frame, UserCommand};
use crate::error::FeedError;
use crate::state::record::RecordId;

const STDIN_LINE_BUFFER: usize = 32;

/// A parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Engine(UserCommand),
    Status,
    Quit,
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, FeedError> {
    let line = line.trim();
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    let command = match verb.to_ascii_lowercase().as_str() {
        "start" => UserCommand::Start,
        "stop" => UserCommand::Stop,
        "reset" => UserCommand::Reset,
        "cancel" => UserCommand::CancelReset,
        "select" => match rest {
            "all" => UserCommand::SelectAll,
            "" | "none" => UserCommand::Select(Vec::new()),
            ids => UserCommand::Select(
                ids.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .filter_map(|id| id.parse::<RecordId>().ok())
                    .collect(),
            ),
        },
        "throttle" => UserCommand::SetThrottle(rest.parse::<ThrottleInterval>()?),
        "filter" => match rest {
            "" | "off" => UserCommand::SetFilter(None),
            expr => {
                let (field, needle) = expr
                    .split_once('=')
                    .ok_or_else(|| FeedError::Config(format!("filter expects field=text, got {expr:?}")))?;
                UserCommand::SetFilter(Some(RowFilter::new(field.trim(), needle.trim())))
            }
        },
        "status" => return Ok(ConsoleCommand::Status),
        "quit" | "exit" => return Ok(ConsoleCommand::Quit),
        other => return Err(FeedError::Config(format!("unknown command {other:?}"))),
    };
    Ok(ConsoleCommand::Engine(command))
}

fn log_status(status: &StatusSnapshot) {
    info!(
        connection = %status.connection_status,
        subscription = %status.subscription_status,
        total_rows = status.total_count,
        filtered_rows = status.filtered_count,
        total_tickers = status.total_tickers,
        selected_tickers = status.selected_tickers,
        subscribed_tickers = status.subscribed_tickers,
        updated = status.updated_count,
        deleted = status.deleted_count,
        throttle_ms = status.throttle_ms,
        "status"
    );
}

/// Stdin is read on a plain thread; a blocking read would otherwise hold up
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(STDIN_LINE_BUFFER);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Reads stdin until EOF or `quit`, forwarding commands to the feed worker.
pub async fn run_console(
    commands: mpsc::Sender<UserCommand>,
    status: watch::Receiver<StatusSnapshot>,
) -> anyhow::Result<()> {
    let mut lines = spawn_stdin_reader();

    while let Some(line) = lines.recv().await {
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(ConsoleCommand::Engine(command)) => {
                if commands.send(command).await.is_err() {
                    warn!("feed worker gone, console exiting");
                    return Ok(());
                }
            }
            Ok(ConsoleCommand::Status) => log_status(&status.borrow()),
            Ok(ConsoleCommand::Quit) => break,
            Err(err) => warn!(error = %err, "ignoring console input"),
        }
    }

    let _ = commands.send(UserCommand::Shutdown).await;
    Ok(())
}

/// Stand-in renderer: logs a summary of every flushed frame.
pub async fn run_frame_logger(mut frames: mpsc::Receiver<Frame>) {
    while let Some(frame) = frames.recv().await {
        if let Some(columns) = &frame.columns {
            let headers: Vec<&str> = columns.iter().map(|c| c.header_name.as_str()).collect();
            info!(?headers, "column layout");
        }
        info!(
            rows = frame.table.len(),
            active = frame.table.active_count(),
            updated = frame.report.updated_count,
            deleted = frame.report.deleted_count,
            highlighted = frame.report.changed.len(),
            "frame"
        );
    }

    info!("frame channel closed, renderer shutting down");
}
