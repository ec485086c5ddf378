//! Illumination Sync Client
//!
//! Session object for the request/acknowledge protocol. At most one pattern
//! command is unacknowledged at any time. Inbound status messages are drained
//! at a fixed poll interval; `"0"` marks the controller busy (the pending
//! command was dropped), the next `"1"` triggers an identical resend and
//! `"PXL DONE"` completes the command.

use std::time::Duration;

use contracts::{
    Command, IlluminationConfig, InboundMessage, MessageTransport, Position, Rgb, StatusMessage,
    Topics,
};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{IlluminationError, Result};

/// Client timing and retry policy
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Interval between drains of the status stream
    pub ack_poll: Duration,
    /// Maximum resends of one command
    pub max_resends: u32,
    /// Silence after which the command is abandoned (`None` waits forever)
    pub stall_timeout: Option<Duration>,
    /// Wait after CLEAR
    pub clear_settle: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from(&IlluminationConfig::default())
    }
}

impl From<&IlluminationConfig> for ClientConfig {
    fn from(config: &IlluminationConfig) -> Self {
        Self {
            ack_poll: Duration::from_millis(config.ack_poll_ms),
            max_resends: config.max_resends,
            stall_timeout: (config.stall_timeout_ms > 0)
                .then(|| Duration::from_millis(config.stall_timeout_ms)),
            clear_settle: Duration::from_millis(config.clear_settle_ms),
        }
    }
}

/// Last readiness reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerReadiness {
    /// Nothing heard yet
    #[default]
    Unknown,
    /// Last status was `"1"`
    Ready,
    /// Last status was `"0"`
    Busy,
}

/// Illumination Sync Client
pub struct IlluminationClient<T> {
    transport: T,
    topics: Topics,
    inbound: mpsc::Receiver<InboundMessage>,
    config: ClientConfig,
    pending: Option<Position>,
    readiness: ControllerReadiness,
}

impl<T: MessageTransport> IlluminationClient<T> {
    /// Create a session over `transport`, consuming status messages from `inbound`
    pub fn new(
        transport: T,
        topics: Topics,
        inbound: mpsc::Receiver<InboundMessage>,
        config: ClientConfig,
    ) -> Self {
        Self {
            transport,
            topics,
            inbound,
            config,
            pending: None,
            readiness: ControllerReadiness::Unknown,
        }
    }

    /// Whether a command is published but not yet acknowledged
    pub fn awaiting_ack(&self) -> bool {
        self.pending.is_some()
    }

    /// Last readiness reported by the controller
    pub fn readiness(&self) -> ControllerReadiness {
        self.readiness
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Forget an unacknowledged command
    ///
    /// Only needed after a `set_pattern` future was dropped or failed; a late
    /// acknowledgement for the abandoned command is discarded.
    pub fn abandon_pending(&mut self) {
        if let Some(position) = self.pending.take() {
            warn!(position = %position, "Abandoning unacknowledged pattern command");
        }
    }

    /// Light `position` with `color` and wait for the controller's acknowledgement
    ///
    /// # Errors
    /// - `CommandInFlight` if a previous command is still unacknowledged
    /// - `ResendsExhausted` / `Stalled` per the configured policy
    /// - transport failures
    #[instrument(
        name = "illumination_set_pattern",
        skip(self),
        fields(position = %position, color = %color)
    )]
    pub async fn set_pattern(&mut self, position: Position, color: Rgb) -> Result<()> {
        if let Some(pending) = self.pending {
            return Err(IlluminationError::CommandInFlight { pending });
        }

        self.drain_stale()?;

        let payload = Command::SetPixel { position, color }.encode();
        self.pending = Some(position);
        // a command published while the controller is busy is dropped
        let mut resend_pending = self.readiness == ControllerReadiness::Busy;
        self.transport
            .publish(&self.topics.request, &payload)
            .await
            .inspect_err(|_| self.pending = None)?;

        let started = Instant::now();
        let mut last_inbound = started;
        let mut resends = 0u32;

        loop {
            loop {
                let message = match self.inbound.try_recv() {
                    Ok(message) => message,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        return Err(IlluminationError::StatusStreamClosed)
                    }
                };

                if message.topic != self.topics.status {
                    trace!(topic = %message.topic, "Ignoring message on foreign topic");
                    continue;
                }
                last_inbound = Instant::now();

                match StatusMessage::parse(&message.payload) {
                    StatusMessage::PixelDone => {
                        self.pending = None;
                        self.readiness = ControllerReadiness::Ready;
                        observability::record_pattern_set(position, started.elapsed());
                        debug!(resends, "Pattern acknowledged");
                        return Ok(());
                    }
                    StatusMessage::Busy => {
                        self.readiness = ControllerReadiness::Busy;
                        resend_pending = true;
                        debug!("Controller busy, command dropped");
                    }
                    StatusMessage::Ready => {
                        self.readiness = ControllerReadiness::Ready;
                        if resend_pending {
                            if resends >= self.config.max_resends {
                                let err = IlluminationError::ResendsExhausted {
                                    command: payload,
                                    resends,
                                };
                                observability::record_protocol_failure(err.kind());
                                return Err(err);
                            }
                            resends += 1;
                            resend_pending = false;
                            info!(resends, "Controller ready again, resending command");
                            observability::record_pattern_resend();
                            self.transport
                                .publish(&self.topics.request, &payload)
                                .await?;
                        }
                    }
                    StatusMessage::Other(text) => {
                        debug!(status = %text, "Unrecognized status message");
                    }
                }
            }

            if let Some(limit) = self.config.stall_timeout {
                let waited = last_inbound.elapsed();
                if waited >= limit {
                    let err = IlluminationError::Stalled {
                        command: payload,
                        waited_ms: waited.as_millis() as u64,
                    };
                    observability::record_protocol_failure(err.kind());
                    warn!(error = %err, "Illumination controller stalled");
                    return Err(err);
                }
            }

            tokio::time::sleep(self.config.ack_poll).await;
        }
    }

    /// Turn `position` off (acknowledged like any other pattern)
    pub async fn set_off(&mut self, position: Position) -> Result<()> {
        self.set_pattern(position, Rgb::OFF).await
    }

    /// Turn every position off
    ///
    /// CLEAR is not acknowledged; the client waits the settle delay instead.
    #[instrument(name = "illumination_clear", skip(self))]
    pub async fn clear(&mut self) -> Result<()> {
        if let Some(pending) = self.pending {
            return Err(IlluminationError::CommandInFlight { pending });
        }

        self.transport
            .publish(&self.topics.request, &Command::Clear.encode())
            .await?;
        tokio::time::sleep(self.config.clear_settle).await;
        self.drain_stale()?;
        Ok(())
    }

    /// Consume queued status messages while nothing is pending
    fn drain_stale(&mut self) -> Result<()> {
        loop {
            match self.inbound.try_recv() {
                Ok(message) if message.topic == self.topics.status => {
                    match StatusMessage::parse(&message.payload) {
                        StatusMessage::Busy => self.readiness = ControllerReadiness::Busy,
                        StatusMessage::Ready => self.readiness = ControllerReadiness::Ready,
                        StatusMessage::PixelDone => {
                            debug!("Discarding stale acknowledgement");
                        }
                        StatusMessage::Other(_) => {}
                    }
                }
                Ok(_) => {}
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    return Err(IlluminationError::StatusStreamClosed)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ContractError;
    use std::sync::{Arc, Mutex};

    /// Records published payloads; status messages are injected by the test
    #[derive(Clone, Default)]
    struct RecordingTransport {
        published: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingTransport {
        fn published(&self) -> Vec<String> {
            self.published.lock().unwrap().clone()
        }
    }

    impl MessageTransport for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }

        async fn publish(&self, _topic: &str, payload: &str) -> std::result::Result<(), ContractError> {
            self.published.lock().unwrap().push(payload.to_string());
            Ok(())
        }
    }

    fn fast_config() -> ClientConfig {
        ClientConfig {
            ack_poll: Duration::from_millis(5),
            max_resends: 2,
            stall_timeout: Some(Duration::from_millis(200)),
            clear_settle: Duration::from_millis(1),
        }
    }

    fn client() -> (
        IlluminationClient<RecordingTransport>,
        mpsc::Sender<InboundMessage>,
        RecordingTransport,
    ) {
        let topics = Topics::new("FPMSCOPE", "LEDMATRIX");
        let (tx, rx) = mpsc::channel(64);
        let transport = RecordingTransport::default();
        let client = IlluminationClient::new(transport.clone(), topics, rx, fast_config());
        (client, tx, transport)
    }

    fn status(payload: &'static str) -> InboundMessage {
        InboundMessage::new("/FPMSCOPE/LEDMATRIX/STAT", payload)
    }

    #[tokio::test]
    async fn test_ack_completes_command() {
        let (mut client, tx, transport) = client();
        tx.send(status("PXL DONE")).await.unwrap();
        // queued before publishing → stale, must not complete the command
        let handle = tokio::spawn(async move {
            let result = client.set_pattern(Position(4), Rgb::RED).await;
            (client, result)
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(status("PXL DONE")).await.unwrap();

        let (client, result) = handle.await.unwrap();
        assert!(result.is_ok());
        assert!(!client.awaiting_ack());
        assert_eq!(transport.published(), vec!["PXL+4+255+0+0"]);
    }

    #[tokio::test]
    async fn test_busy_then_ready_resends_identical_command() {
        let (mut client, tx, transport) = client();
        let feeder = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            tx.send(status("0")).await.unwrap();
            tokio::time::sleep(Duration::from_millis(15)).await;
            tx.send(status("1")).await.unwrap();
            tokio::time::sleep(Duration::from_millis(15)).await;
            tx.send(status("PXL DONE")).await.unwrap();
            tx
        });

        client.set_pattern(Position(7), Rgb::new(1, 2, 3)).await.unwrap();
        let _tx = feeder.await.unwrap();
        assert_eq!(transport.published(), vec!["PXL+7+1+2+3", "PXL+7+1+2+3"]);
        assert_eq!(client.readiness(), ControllerReadiness::Ready);
    }

    #[tokio::test]
    async fn test_ready_without_busy_does_not_resend() {
        let (mut client, tx, transport) = client();
        let feeder = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send(status("1")).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send(status("PXL DONE")).await.unwrap();
            tx
        });

        client.set_pattern(Position(0), Rgb::RED).await.unwrap();
        let _tx = feeder.await.unwrap();
        assert_eq!(transport.published().len(), 1);
    }

    #[tokio::test]
    async fn test_resends_are_bounded() {
        let (mut client, tx, transport) = client();
        let feeder = tokio::spawn(async move {
            for _ in 0..4 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                tx.send(status("0")).await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
                tx.send(status("1")).await.unwrap();
            }
            tx
        });

        let err = client.set_pattern(Position(1), Rgb::RED).await.unwrap_err();
        assert!(matches!(err, IlluminationError::ResendsExhausted { resends: 2, .. }));
        // original + 2 resends
        assert_eq!(transport.published().len(), 3);
        assert!(client.awaiting_ack());
        let _tx = feeder.await.unwrap();
    }

    #[tokio::test]
    async fn test_silence_stalls() {
        let (mut client, _tx, _transport) = client();
        let err = client.set_pattern(Position(2), Rgb::RED).await.unwrap_err();
        assert!(matches!(err, IlluminationError::Stalled { .. }));
    }

    #[tokio::test]
    async fn test_second_command_rejected_while_in_flight() {
        let (mut client, tx, _transport) = client();

        // cancel the first call before any ack arrives
        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), client.set_pattern(Position(1), Rgb::RED))
                .await;
        assert!(cancelled.is_err());
        assert!(client.awaiting_ack());

        let err = client.set_pattern(Position(2), Rgb::RED).await.unwrap_err();
        assert!(matches!(
            err,
            IlluminationError::CommandInFlight { pending: Position(1) }
        ));

        client.abandon_pending();
        tx.send(status("PXL DONE")).await.unwrap();
        let feeder = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(status("PXL DONE")).await.unwrap();
            tx
        });
        client.set_pattern(Position(2), Rgb::RED).await.unwrap();
        let _tx = feeder.await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_publishes_without_waiting_for_ack() {
        let (mut client, _tx, transport) = client();
        client.clear().await.unwrap();
        assert_eq!(transport.published(), vec!["CLEAR"]);
        assert!(!client.awaiting_ack());
    }

    #[tokio::test]
    async fn test_closed_status_stream() {
        let (mut client, tx, _transport) = client();
        drop(tx);
        let err = client.set_pattern(Position(0), Rgb::RED).await.unwrap_err();
        assert!(matches!(err, IlluminationError::StatusStreamClosed));
    }

    #[test]
    fn test_zero_stall_timeout_disables_it() {
        let config = IlluminationConfig {
            stall_timeout_ms: 0,
            ..IlluminationConfig::default()
        };
        assert!(ClientConfig::from(&config).stall_timeout.is_none());
        assert_eq!(ClientConfig::default().max_resends, 10);
    }
}
