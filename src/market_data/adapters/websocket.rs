use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::FeedError;
use crate::market_data::transport::Transport;
use crate::market_data::types::{ConnectionId, TransportEvent, TransportNotice};

/// WebSocket transport: one spawned task per connection, forwarding socket
/// events into `notices` and draining an outbound queue into the socket.
pub struct WsTransport {
    notices: mpsc::Sender<TransportNotice>,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    task: Option<JoinHandle<()>>,
}

impl WsTransport {
    pub fn new(notices: mpsc::Sender<TransportNotice>) -> Self {
        Self {
            notices,
            outbound: None,
            task: None,
        }
    }
}

impl Transport for WsTransport {
    fn connect(&mut self, url: &str, conn: ConnectionId) -> Result<(), FeedError> {
        self.close();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.outbound = Some(outbound_tx);
        self.task = Some(tokio::spawn(run_connection(
            url.to_string(),
            conn,
            outbound_rx,
            self.notices.clone(),
        )));
        Ok(())
    }

    fn send(&mut self, text: String) -> Result<(), FeedError> {
        let outbound = self.outbound.as_ref().ok_or(FeedError::NotConnected)?;
        outbound
            .send(Message::Text(text))
            .map_err(|_| FeedError::Transport("connection task has exited".to_string()))
    }

    fn close(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            // Dropping the sender after this ends the connection task.
            let _ = outbound.send(Message::Close(None));
        }
        // Detach: the task finishes the close handshake and reports Close itself.
        self.task.take();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_connection(
    url: String,
    conn: ConnectionId,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    notices: mpsc::Sender<TransportNotice>,
) {
    let notify = |event| TransportNotice::new(conn, event);

    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            warn!(conn, %url, error = %err, "websocket connect failed");
            let _ = notices.send(notify(TransportEvent::Error(err.to_string()))).await;
            let _ = notices
                .send(notify(TransportEvent::Close("connect failed".to_string())))
                .await;
            return;
        }
    };

    info!(conn, %url, "websocket connection established");
    if notices.send(notify(TransportEvent::Open)).await.is_err() {
        return;
    }

    let (mut sink, mut source) = stream.split();
    let close_reason = loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(Message::Close(frame)) => {
                    let _ = sink.send(Message::Close(frame)).await;
                    break "closed by client".to_string();
                }
                Some(message) => {
                    if let Err(err) = sink.send(message).await {
                        let _ = notices.send(notify(TransportEvent::Error(err.to_string()))).await;
                        break "send failed".to_string();
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break "transport dropped".to_string();
                }
            },
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if notices.send(notify(TransportEvent::Message(text))).await.is_err() {
                        break "receiver gone".to_string();
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        if notices.send(notify(TransportEvent::Message(text))).await.is_err() {
                            break "receiver gone".to_string();
                        }
                    }
                    Err(err) => warn!(conn, error = %err, "dropping non-utf8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "closed by server".to_string());
                }
                // Ping/pong are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    let _ = notices.send(notify(TransportEvent::Error(err.to_string()))).await;
                    break "socket error".to_string();
                }
                None => break "stream ended".to_string(),
            },
        }
    };

    debug!(conn, reason = %close_reason, "websocket task exiting");
    let _ = notices.send(notify(TransportEvent::Close(close_reason))).await;
}
