use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::engine::status::StatusSnapshot;
use crate::engine::{EngineEvent, FeedEngine, Frame, UserCommand};
use crate::market_data::transport::Transport;
use crate::market_data::types::TransportNotice;

/// Engine time comes from tokio's clock so a paused test runtime drives it too.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

/// Feeds transport notices, host commands and timer fires into the engine,
/// one at a time, and forwards flush frames to the renderer.
///
/// Returns after a `Shutdown` command, or once the command or frame
/// channel closes.
pub async fn run_feed_worker<T: Transport>(
    mut engine: FeedEngine<T>,
    mut notices: mpsc::Receiver<TransportNotice>,
    mut commands: mpsc::Receiver<UserCommand>,
    frames: mpsc::Sender<Frame>,
    status: watch::Sender<StatusSnapshot>,
) -> anyhow::Result<()> {
    engine.start();
    status.send_replace(engine.status());

    loop {
        let deadline = engine.next_deadline();
        let event = tokio::select! {
            notice = notices.recv() => match notice {
                Some(notice) => EngineEvent::Transport(notice),
                None => {
                    warn!("transport notice channel closed");
                    break;
                }
            },
            command = commands.recv() => match command {
                Some(command) => EngineEvent::Command(command),
                None => {
                    debug!("command channel closed");
                    engine.handle(EngineEvent::Command(UserCommand::Shutdown), now());
                    break;
                }
            },
            _ = sleep_until(deadline) => EngineEvent::Tick,
        };

        let shutting_down = event == EngineEvent::Command(UserCommand::Shutdown);
        if let Some(frame) = engine.handle(event, now()) {
            debug!(
                rows = frame.table.len(),
                updated = frame.report.updated_count,
                deleted = frame.report.deleted_count,
                "flushing frame"
            );
            if frames.send(frame).await.is_err() {
                warn!("frame receiver dropped, stopping feed worker");
                break;
            }
        }
        status.send_replace(engine.status());

        if shutting_down {
            break;
        }
    }

    status.send_replace(engine.status());
    info!("feed worker stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ThrottleInterval};
    use crate::error::FeedError;
    use crate::market_data::types::{ConnectionId, TransportEvent};
    use crate::state::record::RecordId;
    use serde_json::json;
    use std::time::Duration;

    struct SilentTransport;

    impl Transport for SilentTransport {
        fn connect(&mut self, _url: &str, _conn: ConnectionId) -> Result<(), FeedError> {
            Ok(())
        }

        fn send(&mut self, _text: String) -> Result<(), FeedError> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    fn message(value: serde_json::Value) -> TransportNotice {
        TransportNotice::new(1, TransportEvent::Message(value.to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_flushes_once_per_interval() {
        let config = Config {
            throttle_default: ThrottleInterval::Ms1000,
            ..Config::default()
        };
        let engine = FeedEngine::new(&config, SilentTransport);
        let (notice_tx, notice_rx) = mpsc::channel(16);
        let (command_tx, command_rx) = mpsc::channel(4);
        let (frame_tx, mut frame_rx) = mpsc::channel(4);
        let (status_tx, status_rx) = watch::channel(engine.status());

        let worker = tokio::spawn(run_feed_worker(engine, notice_rx, command_rx, frame_tx, status_tx));

        notice_tx.send(TransportNotice::new(1, TransportEvent::Open)).await.unwrap();
        notice_tx.send(message(json!([{"Id": 1, "Name": "BTC"}]))).await.unwrap();
        for price in 1..=5 {
            notice_tx
                .send(message(json!([{"Id": 1, "Name": "BTC", "Price": price}])))
                .await
                .unwrap();
        }

        let started = tokio::time::Instant::now();
        let frame = frame_rx.recv().await.unwrap();
        assert!(started.elapsed() <= Duration::from_millis(1_000));

        let record = frame.table.get(&RecordId::Int(1)).unwrap();
        assert_eq!(record.get("Price"), Some(&json!(5)));
        assert_eq!(frame.report.updated_count, 5);
        assert!(frame.report.schema_established);
        assert!(frame.columns.is_some());

        command_tx.send(UserCommand::Shutdown).await.unwrap();
        worker.await.unwrap().unwrap();
        assert_eq!(status_rx.borrow().total_count, 1);
    }
}
