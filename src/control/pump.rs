//! Message pump between a byte stream and the engine
//!
//! Requests are handled concurrently, each on its own task. Replies and
//! engine events share one writer task, so frames never interleave.

use std::future::Future;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::{Engine, EngineEvent};
use crate::error::{CommandError, Result};

use super::framing::{read_frame, ControlFrame, FrameDecoder, MessageType, DEFAULT_MAX_FRAME_LEN};

pub struct ControlPump {
    engine: Arc<Engine>,
    max_frame_len: usize,
}

impl ControlPump {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Serve until the reader ends; in-flight requests are answered first
    pub async fn run<R, W>(&self, reader: R, writer: W, events: mpsc::UnboundedReceiver<EngineEvent>) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(writer, out_rx));
        let forward = tokio::spawn(forward_events(events, out_tx.clone()));

        let result = self.read_loop(reader, &out_tx).await;

        forward.abort();
        drop(out_tx);
        if writer.await.is_err() {
            tracing::error!("Control writer task panicked");
        }
        result
    }

    /// Like [`run`](Self::run), returning early when `shutdown` completes
    pub async fn run_until<R, W, F>(
        &self,
        reader: R,
        writer: W,
        events: mpsc::UnboundedReceiver<EngineEvent>,
        shutdown: F,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.run(reader, writer, events) => result,
        }
    }

    async fn read_loop<R: AsyncRead + Unpin>(
        &self,
        mut reader: R,
        out: &mpsc::UnboundedSender<ControlFrame>,
    ) -> Result<()> {
        let mut decoder = FrameDecoder::new(self.max_frame_len);
        let mut buf = BytesMut::with_capacity(4096);
        let mut requests: Vec<JoinHandle<()>> = Vec::new();

        while let Some(frame) = read_frame(&mut reader, &mut decoder, &mut buf).await? {
            requests.retain(|task| !task.is_finished());
            let (id, op) = match frame.message_type() {
                MessageType::Request { id, op } => (id.to_string(), op.to_string()),
                MessageType::Message(kind) => {
                    tracing::debug!(kind = %kind, "Ignoring message");
                    continue;
                }
            };
            tracing::trace!(id = %id, op = %op, "Request");
            let engine = self.engine.clone();
            let out = out.clone();
            let body = frame.body();
            requests.push(tokio::spawn(async move {
                let result = match body {
                    Ok(body) => engine.handle(&op, body).await,
                    Err(e) => Err(CommandError::invalid_params(e.to_string())),
                };
                if out.send(ControlFrame::response(&id, result)).is_err() {
                    tracing::debug!(id = %id, "Reply dropped, writer gone");
                }
            }));
        }
        tracing::info!("Control input closed");
        for task in requests {
            if task.await.is_err() {
                tracing::error!("Request task panicked");
            }
        }
        Ok(())
    }
}

async fn forward_events(mut events: mpsc::UnboundedReceiver<EngineEvent>, out: mpsc::UnboundedSender<ControlFrame>) {
    while let Some(event) = events.recv().await {
        let frame = ControlFrame::json(event.message_type(), &event.to_json());
        if out.send(frame).is_err() {
            break;
        }
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(mut writer: W, mut frames: mpsc::UnboundedReceiver<ControlFrame>) {
    let mut buf = BytesMut::new();
    while let Some(frame) = frames.recv().await {
        buf.clear();
        frame.encode(&mut buf);
        let written = async {
            writer.write_all(&buf).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            tracing::error!(error = %e, "Control write failed");
            break;
        }
    }
}
