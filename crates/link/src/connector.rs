//! Serial connection lifecycle: open, frame, write, reconnect.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};

use crate::framer::LineFramer;
use crate::types::{LinkError, LinkEvent, LinkIo, LinkState, PortOpener};

const REQUEST_BUFFER: usize = 16;

/// Requests accepted by the connector task.
enum LinkRequest {
    Write {
        payload: String,
        ack: oneshot::Sender<Result<(), LinkError>>,
    },
    Shutdown,
}

enum Flow {
    Continue,
    Shutdown,
}

/// Owns the serial connection and drives the reconnect loop.
///
/// The port is opened, read, and written by this task alone; everything
/// else talks to it through a [`LinkHandle`]. Open failures and runtime
/// failures both land in the same fixed-delay retry state, which repeats
/// until shutdown; the device may be power-cycled or reattached at any
/// time.
pub struct LinkConnector {
    opener: Arc<dyn PortOpener>,
    retry_delay: Duration,
    event_tx: flume::Sender<LinkEvent>,
    req_rx: mpsc::Receiver<LinkRequest>,
    state_tx: watch::Sender<LinkState>,
}

/// Cloneable handle for link state reads and command writes.
#[derive(Clone)]
pub struct LinkHandle {
    req_tx: mpsc::Sender<LinkRequest>,
    state_rx: watch::Receiver<LinkState>,
}

impl LinkConnector {
    pub fn new(
        opener: Arc<dyn PortOpener>,
        event_tx: flume::Sender<LinkEvent>,
        retry_delay: Duration,
    ) -> (Self, LinkHandle) {
        let (req_tx, req_rx) = mpsc::channel(REQUEST_BUFFER);
        let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);
        (
            Self {
                opener,
                retry_delay,
                event_tx,
                req_rx,
                state_tx,
            },
            LinkHandle { req_tx, state_rx },
        )
    }

    /// Runs until shutdown. There is no terminal failure state.
    pub async fn run(mut self) {
        loop {
            self.set_state(LinkState::Connecting);
            match self.opener.open().await {
                Ok(stream) => {
                    info!("serial port open");
                    self.set_state(LinkState::Open);
                    self.emit(LinkEvent::Connected).await;
                    match self.drive_session(stream).await {
                        Flow::Shutdown => break,
                        Flow::Continue => self.emit(LinkEvent::Disconnected).await,
                    }
                }
                Err(e) => warn!("{e}"),
            }
            self.set_state(LinkState::Disconnected);
            info!(
                "retrying serial connection in {}s",
                self.retry_delay.as_secs()
            );
            if let Flow::Shutdown = self.wait_retry().await {
                break;
            }
        }
        self.set_state(LinkState::Disconnected);
        info!("link connector stopped");
    }

    /// Services one open connection until it dies or shutdown is asked.
    ///
    /// The stream is dropped on return, which closes the port. A write
    /// error is acked to the caller but does not end the session by
    /// itself; a truly dead port surfaces on the read side.
    async fn drive_session(&mut self, stream: Box<dyn LinkIo>) -> Flow {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut framer = LineFramer::new(read_half);

        loop {
            tokio::select! {
                frame = framer.next_frame() => match frame {
                    Some(Ok(line)) => {
                        debug!("frame from device: {line:?}");
                        self.emit(LinkEvent::Frame(line)).await;
                    }
                    Some(Err(e)) => {
                        warn!("serial read failed: {e}");
                        return Flow::Continue;
                    }
                    None => {
                        info!("serial port closed");
                        return Flow::Continue;
                    }
                },
                req = self.req_rx.recv() => match req {
                    Some(LinkRequest::Write { payload, ack }) => {
                        let result = write_payload(&mut write_half, &payload).await;
                        if let Err(e) = &result {
                            warn!("serial write failed: {e}");
                        }
                        let _ = ack.send(result);
                    }
                    Some(LinkRequest::Shutdown) | None => {
                        info!("closing serial port");
                        return Flow::Shutdown;
                    }
                },
            }
        }
    }

    /// The fixed retry wait. Keeps answering command requests (with
    /// `NotConnected`) so callers fail fast instead of queueing.
    async fn wait_retry(&mut self) -> Flow {
        let delay = tokio::time::sleep(self.retry_delay);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                () = &mut delay => return Flow::Continue,
                req = self.req_rx.recv() => match req {
                    Some(LinkRequest::Write { ack, .. }) => {
                        let _ = ack.send(Err(LinkError::NotConnected));
                    }
                    Some(LinkRequest::Shutdown) | None => return Flow::Shutdown,
                },
            }
        }
    }

    fn set_state(&self, state: LinkState) {
        let _ = self.state_tx.send(state);
    }

    async fn emit(&self, event: LinkEvent) {
        if self.event_tx.send_async(event).await.is_err() {
            debug!("link event channel closed");
        }
    }
}

async fn write_payload(
    write_half: &mut (impl AsyncWrite + Unpin),
    payload: &str,
) -> Result<(), LinkError> {
    // Raw payload; no delimiter is appended.
    write_half.write_all(payload.as_bytes()).await?;
    write_half.flush().await?;
    Ok(())
}

impl LinkHandle {
    /// Current link state.
    pub fn state(&self) -> LinkState {
        *self.state_rx.borrow()
    }

    /// Watch channel for state transitions.
    pub fn state_rx(&self) -> watch::Receiver<LinkState> {
        self.state_rx.clone()
    }

    /// Write an opaque command payload to the device.
    ///
    /// Anything but an `Open` link is rejected immediately with
    /// [`LinkError::NotConnected`]; nothing is queued for later. Success
    /// is reported only after the transport write is acknowledged.
    pub async fn send_command(&self, payload: impl Into<String>) -> Result<(), LinkError> {
        if self.state() != LinkState::Open {
            return Err(LinkError::NotConnected);
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        self.req_tx
            .send(LinkRequest::Write {
                payload: payload.into(),
                ack: ack_tx,
            })
            .await
            .map_err(|_| LinkError::ConnectorGone)?;
        ack_rx.await.map_err(|_| LinkError::ConnectorGone)?
    }

    /// Ask the connector to close the port and stop.
    pub async fn shutdown(&self) {
        let _ = self.req_tx.send(LinkRequest::Shutdown).await;
    }
}
