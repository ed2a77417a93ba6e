use async_trait::async_trait;
use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::ConnectionSettings;
use crate::hub::{wait_closed, ConnectionHandle, ConnectionId, Hub, OutboundQueue};

/// Handler for frames read from a connection
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one inbound text or binary frame
    async fn handle_message(&self, connection: &ConnectionHandle, frame: &[u8]);
}

/// Transport failures. Any of these ends the connection.
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("no frame received before the read deadline")]
    ReadTimeout,

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("write deadline exceeded")]
    WriteDeadlineExceeded,
}

/// Connection drives one registered client: the read loop runs on the calling
/// task and the write loop on a spawned one. Either loop ending tears the
/// connection down in the hub, which in turn stops the other loop.
pub struct Connection {
    handle: Arc<ConnectionHandle>,
    hub: Hub,
    handler: Arc<dyn MessageHandler>,
    settings: ConnectionSettings,
}

impl Connection {
    pub fn new(
        handle: Arc<ConnectionHandle>,
        hub: Hub,
        handler: Arc<dyn MessageHandler>,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            handle,
            hub,
            handler,
            settings,
        }
    }

    /// Run the connection until either side fails or the hub closes it
    pub async fn run<K, S, E>(
        self,
        sink: K,
        stream: S,
        outbound: OutboundQueue,
    ) -> Result<(), SocketError>
    where
        K: Sink<Message> + Unpin + Send + 'static,
        K::Error: Display + Send,
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let writer = tokio::spawn(write_pump(
            sink,
            outbound,
            self.hub.clone(),
            self.handle.id(),
            self.settings.clone(),
        ));

        let read = self.read_pump(stream).await;
        self.hub.disconnect(self.handle.id());

        let write = match writer.await {
            Ok(result) => result,
            Err(e) => Err(SocketError::SendFailed(e.to_string())),
        };

        info!(connection_id = %self.handle.id(), "Connection loops stopped");
        read.and(write)
    }

    async fn read_pump<S, E>(&self, mut stream: S) -> Result<(), SocketError>
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let mut closed = self.handle.closed_signal();

        loop {
            // Any frame, pongs included, pushes the read deadline back
            let next = tokio::select! {
                _ = wait_closed(&mut closed) => return Ok(()),
                next = timeout(self.settings.pong_wait, stream.next()) => next,
            };

            let message = match next {
                Err(_) => return Err(SocketError::ReadTimeout),
                Ok(None) => return Ok(()),
                Ok(Some(Err(e))) => return Err(SocketError::ReceiveFailed(e.to_string())),
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Text(text) => {
                    self.handler
                        .handle_message(&self.handle, text.as_bytes())
                        .await
                }
                Message::Binary(data) => self.handler.handle_message(&self.handle, &data).await,
                Message::Close(_) => {
                    debug!(connection_id = %self.handle.id(), "Client sent close");
                    return Ok(());
                }
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    }
}

/// Drains the outbound queue to the transport and sends a ping every
/// `ping_period`. Stops on the close signal or the first failed write.
async fn write_pump<K>(
    mut sink: K,
    mut outbound: OutboundQueue,
    hub: Hub,
    id: ConnectionId,
    settings: ConnectionSettings,
) -> Result<(), SocketError>
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    let mut ping = interval_at(Instant::now() + settings.ping_period, settings.ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut closed = outbound.closed.clone();

    let result = loop {
        tokio::select! {
            biased;

            _ = wait_closed(&mut closed) => {
                let _ = send_within(&mut sink, Message::Close(None), settings.write_wait).await;
                break Ok(());
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    break Ok(());
                };
                if let Err(e) = send_within(&mut sink, Message::Text(frame), settings.write_wait).await {
                    break Err(e);
                }
            }
            _ = ping.tick() => {
                if let Err(e) = send_within(&mut sink, Message::Ping(Vec::new()), settings.write_wait).await {
                    break Err(e);
                }
            }
        }
    };

    hub.disconnect(id);
    result
}

async fn send_within<K>(sink: &mut K, message: Message, limit: Duration) -> Result<(), SocketError>
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    match timeout(limit, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SocketError::SendFailed(e.to_string())),
        Err(_) => Err(SocketError::WriteDeadlineExceeded),
    }
}
