//! Live-sync session: one WebSocket, one watcher, one writer, one reader
//!
//! The writer is the only task that touches the outbound half of the
//! socket. The reader hands anything it needs to send (initial content,
//! save errors) to the writer through a bounded reply queue. All three
//! tasks share a cancellation token derived from the server's, and the
//! session joins every task before [`Session::run`] returns.

use axum::extract::ws::{close_code, CloseFrame, Message};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use mdpreview_core::{
    change_queue, persist, ChangeReceiver, FileWatcher, PreviewError, RendererHandle, Result,
    SessionConfig,
};
use std::fmt::Display;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::message::{ClientMessage, ServerMessage, SAVE_FAILED};

/// One connected client and the tasks serving it
pub struct Session {
    id: Uuid,
    path: PathBuf,
    renderer: RendererHandle,
    config: SessionConfig,
    cancel: CancellationToken,
}

impl Session {
    /// Create a session whose tasks stop when `parent` is cancelled
    pub fn new(
        path: impl Into<PathBuf>,
        renderer: RendererHandle,
        config: SessionConfig,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            renderer,
            config,
            cancel: parent.child_token(),
        }
    }

    /// Cancelling this token ends the session
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Serve the connection until the client leaves, a write fails or the
    /// session is cancelled. Returns once watcher, writer and reader have
    /// all finished.
    pub async fn run<S, R, E>(self, sink: S, stream: R)
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: Display + Send,
        R: Stream<Item = std::result::Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send,
    {
        let span = tracing::info_span!("session", id = %self.id);
        self.serve(sink, stream).instrument(span).await
    }

    async fn serve<S, R, E>(self, sink: S, stream: R)
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: Display + Send,
        R: Stream<Item = std::result::Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send,
    {
        info!(path = %self.path.display(), "Session started");

        let (reply_tx, reply_rx) = mpsc::channel(self.config.reply_queue_capacity);
        let reader = SessionReader::new(&self.path, self.config.clone(), reply_tx);
        // Queued before the writer exists, so it is always the first frame out
        reader.deliver_initial_content().await;

        let (changes_tx, changes_rx) = change_queue();
        let watcher = match FileWatcher::new(&self.path, self.config.rewatch_delay())
            .spawn(changes_tx, self.cancel.clone())
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("Failed to watch file: {}", e);
                None
            }
        };

        let writer = SessionWriter::new(&self.path, self.renderer.clone(), self.config.clone());
        let writer_task = {
            let cancel = self.cancel.clone();
            tokio::spawn(
                async move {
                    let _guard = cancel.clone().drop_guard();
                    writer.run(cancel, changes_rx, reply_rx, sink).await;
                }
                .in_current_span(),
            )
        };
        let reader_task = {
            let cancel = self.cancel.clone();
            tokio::spawn(
                async move {
                    let _guard = cancel.clone().drop_guard();
                    reader.run(cancel, stream).await;
                }
                .in_current_span(),
            )
        };

        let (writer_result, reader_result) = tokio::join!(writer_task, reader_task);
        for (task, result) in [("writer", writer_result), ("reader", reader_result)] {
            if let Err(e) = result {
                error!("Session {} task failed: {}", task, e);
            }
        }

        self.cancel.cancel();
        if let Some(watcher) = watcher {
            if let Err(e) = watcher.await {
                error!("Session watcher task failed: {}", e);
            }
        }

        info!("Session closed");
    }
}

/// Pushes renders, queued replies and pings to the client
pub struct SessionWriter {
    path: PathBuf,
    renderer: RendererHandle,
    config: SessionConfig,
}

impl SessionWriter {
    pub fn new(path: impl Into<PathBuf>, renderer: RendererHandle, config: SessionConfig) -> Self {
        Self {
            path: path.into(),
            renderer,
            config,
        }
    }

    /// Run until cancellation or the first failed write, then close the sink.
    pub async fn run<S>(
        &self,
        cancel: CancellationToken,
        mut changes: ChangeReceiver,
        mut replies: mpsc::Receiver<ServerMessage>,
        mut sink: S,
    ) where
        S: Sink<Message> + Unpin,
        S::Error: Display,
    {
        let period = self.config.ping_interval();
        let mut ping = tokio::time::interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Writer shutting down");
                    break;
                }
                Some(reply) = replies.recv() => self.send_reply(&mut sink, reply).await,
                Some(()) = changes.recv() => self.push_render(&mut sink, &cancel).await,
                _ = ping.tick() => {
                    debug!("Sending ping");
                    self.send(&mut sink, Message::Ping(Vec::new())).await
                }
            };

            if let Err(e) = outcome {
                debug!("Failed to write message: {}", e);
                break;
            }
        }

        match tokio::time::timeout(self.config.write_timeout(), sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Failed to close connection: {}", e),
            Err(_) => debug!("Timed out closing connection"),
        }
    }

    /// Read the whole file and render it
    pub async fn render(&self) -> Result<Vec<u8>> {
        let input = tokio::fs::read(&self.path).await.map_err(|e| {
            PreviewError::file_system(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        self.renderer.render(&input).await
    }

    /// A failed render is skipped; only a failed write is an error.
    /// Cancellation abandons a render in flight.
    async fn push_render<S>(&self, sink: &mut S, cancel: &CancellationToken) -> Result<()>
    where
        S: Sink<Message> + Unpin,
        S::Error: Display,
    {
        let rendered = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Render abandoned on shutdown");
                return Ok(());
            }
            result = self.render() => match result {
                Ok(rendered) => rendered,
                Err(e) => {
                    error!("Failed to render markdown: {}", e);
                    return Ok(());
                }
            },
        };

        debug!(bytes = rendered.len(), "Sending rendered content");
        let html = String::from_utf8_lossy(&rendered).into_owned();
        self.send(sink, Message::Text(html)).await
    }

    async fn send_reply<S>(&self, sink: &mut S, reply: ServerMessage) -> Result<()>
    where
        S: Sink<Message> + Unpin,
        S::Error: Display,
    {
        match reply.to_json() {
            Ok(json) => self.send(sink, Message::Text(json)).await,
            Err(e) => {
                error!("Failed to serialize reply: {}", e);
                Ok(())
            }
        }
    }

    async fn send<S>(&self, sink: &mut S, message: Message) -> Result<()>
    where
        S: Sink<Message> + Unpin,
        S::Error: Display,
    {
        match tokio::time::timeout(self.config.write_timeout(), sink.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(PreviewError::server(format!("write failed: {}", e))),
            Err(_) => Err(PreviewError::server("write timed out")),
        }
    }
}

/// Delivers the initial content and handles inbound save requests
pub struct SessionReader {
    path: PathBuf,
    config: SessionConfig,
    replies: mpsc::Sender<ServerMessage>,
}

impl SessionReader {
    pub fn new(
        path: impl Into<PathBuf>,
        config: SessionConfig,
        replies: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self {
            path: path.into(),
            config,
            replies,
        }
    }

    /// Queue the literal file content for the client. Best-effort.
    pub async fn deliver_initial_content(&self) {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => self.reply(ServerMessage::Content {
                content: String::from_utf8_lossy(&bytes).into_owned(),
            }),
            Err(e) => error!("Failed to send initial content: {}", e),
        }
    }

    /// Read client messages until the connection ends, the read deadline
    /// passes without a pong, or the session is cancelled.
    pub async fn run<R, E>(&self, cancel: CancellationToken, mut stream: R)
    where
        R: Stream<Item = std::result::Result<Message, E>> + Unpin,
        E: Display,
    {
        let mut deadline = Instant::now() + self.config.read_timeout();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Reader shutting down");
                    break;
                }
                next = tokio::time::timeout_at(deadline, stream.next()) => next,
            };

            let message = match next {
                Err(_) => {
                    debug!("Read deadline passed without a pong");
                    break;
                }
                Ok(None) => {
                    debug!("Client stream ended");
                    break;
                }
                Ok(Some(Err(e))) => {
                    debug!("Failed to read message: {}", e);
                    break;
                }
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Pong(_) => deadline = Instant::now() + self.config.read_timeout(),
                Message::Text(text) => self.handle_text(&text).await,
                Message::Binary(data) => match std::str::from_utf8(&data) {
                    Ok(text) => self.handle_text(text).await,
                    Err(e) => debug!("Failed to parse message: {}", e),
                },
                Message::Ping(_) => {}
                Message::Close(frame) => {
                    log_close(frame.as_ref());
                    break;
                }
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                debug!("Failed to parse message: {}", e);
                return;
            }
        };

        match message {
            ClientMessage::Save { content } => match persist(&self.path, content.as_bytes()).await {
                Ok(()) => info!(bytes = content.len(), "File saved successfully"),
                Err(e) => {
                    error!("Failed to save file: {}", e);
                    self.reply(ServerMessage::Error {
                        error: SAVE_FAILED.to_string(),
                    });
                }
            },
            ClientMessage::Unknown => {}
        }
    }

    fn reply(&self, message: ServerMessage) {
        if let Err(e) = self.replies.try_send(message) {
            warn!("Failed to queue reply: {}", e);
        }
    }
}

fn log_close(frame: Option<&CloseFrame<'static>>) {
    match frame {
        Some(frame) if frame.code != close_code::AWAY && frame.code != close_code::ABNORMAL => {
            warn!(code = frame.code, reason = %frame.reason, "Unexpected websocket close");
        }
        _ => debug!("Client closed the connection"),
    }
}
