//! Simulated illumination controller
//!
//! In-process stand-in for the external controller, used by tests, dry runs and
//! `acquire --simulate`. It speaks the same wire protocol: pattern commands
//! are acknowledged with `PXL DONE` after a configurable delay, scripted
//! commands are answered with `0` (busy, command dropped) followed by `1`
//! once the busy period is over.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::{
    Command, ContractError, InboundMessage, MessageTransport, Position, Rgb, StatusMessage, Topics,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Status channel depth
const STATUS_CHANNEL_CAPACITY: usize = 256;

/// Scripted controller behavior
#[derive(Debug, Clone, Default)]
pub struct SimulatedBehavior {
    /// Delay before acknowledging a pattern command
    pub ack_delay: Duration,
    /// Zero-based indices of received pattern commands answered with busy
    pub busy_on: HashSet<usize>,
    /// Length of a busy period
    pub busy_duration: Duration,
    /// Never publish any status (stall scenario)
    pub silent: bool,
}

impl SimulatedBehavior {
    /// Acknowledge every command after `ack_delay`
    pub fn responsive(ack_delay: Duration) -> Self {
        Self {
            ack_delay,
            ..Self::default()
        }
    }

    /// Go busy on the given command indices
    pub fn with_busy(mut self, indices: impl IntoIterator<Item = usize>, duration: Duration) -> Self {
        self.busy_on.extend(indices);
        self.busy_duration = duration;
        self
    }
}

#[derive(Debug, Default)]
struct ControllerState {
    pixels: BTreeMap<Position, Rgb>,
    commands: Vec<Command>,
    pattern_commands: usize,
    acks: usize,
    busy_until: Option<Instant>,
}

/// Simulated illumination controller
#[derive(Clone)]
pub struct SimulatedController {
    topics: Topics,
    behavior: SimulatedBehavior,
    state: Arc<Mutex<ControllerState>>,
    status_tx: mpsc::Sender<InboundMessage>,
}

impl SimulatedController {
    /// Create a controller and the status stream a client consumes
    pub fn new(topics: Topics, behavior: SimulatedBehavior) -> (Self, mpsc::Receiver<InboundMessage>) {
        let (status_tx, status_rx) = mpsc::channel(STATUS_CHANNEL_CAPACITY);
        let controller = Self {
            topics,
            behavior,
            state: Arc::new(Mutex::new(ControllerState::default())),
            status_tx,
        };
        (controller, status_rx)
    }

    /// Currently lit positions
    pub fn lit_positions(&self) -> Vec<(Position, Rgb)> {
        self.lock()
            .pixels
            .iter()
            .map(|(position, color)| (*position, *color))
            .collect()
    }

    /// Every command received, in order (including dropped ones)
    pub fn commands(&self) -> Vec<Command> {
        self.lock().commands.clone()
    }

    /// Number of acknowledgements sent
    pub fn acks_sent(&self) -> usize {
        self.lock().acks
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish `steps` in order from one task, each after its delay
    fn emit_sequence(&self, steps: Vec<(Duration, StatusMessage)>) {
        let tx = self.status_tx.clone();
        let topic = self.topics.status.clone();
        tokio::spawn(async move {
            for (delay, status) in steps {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let payload = status.as_payload().to_string();
                // receiver gone means the client session ended
                if tx.send(InboundMessage::new(topic.clone(), payload)).await.is_err() {
                    return;
                }
            }
        });
    }
}

impl MessageTransport for SimulatedController {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), ContractError> {
        if topic != self.topics.request {
            trace!(topic, "Simulated controller ignoring foreign topic");
            return Ok(());
        }

        let command = Command::parse(payload)?;
        let now = Instant::now();

        let reply = {
            let mut state = self.lock();
            state.commands.push(command);

            if state.busy_until.is_some_and(|until| now < until) {
                debug!(%payload, "Simulated controller busy, dropping command");
                None
            } else {
                state.busy_until = None;
                match command {
                    Command::Clear => {
                        state.pixels.clear();
                        None
                    }
                    Command::SetPixel { position, color } => {
                        let index = state.pattern_commands;
                        state.pattern_commands += 1;

                        if self.behavior.busy_on.contains(&index) {
                            state.busy_until = Some(now + self.behavior.busy_duration);
                            Some(false)
                        } else {
                            if color.is_off() {
                                state.pixels.remove(&position);
                            } else {
                                state.pixels.insert(position, color);
                            }
                            state.acks += 1;
                            Some(true)
                        }
                    }
                }
            }
        };

        if self.behavior.silent {
            return Ok(());
        }

        match reply {
            Some(true) => {
                self.emit_sequence(vec![(self.behavior.ack_delay, StatusMessage::PixelDone)])
            }
            Some(false) => self.emit_sequence(vec![
                (Duration::ZERO, StatusMessage::Busy),
                (self.behavior.busy_duration, StatusMessage::Ready),
            ]),
            None => {}
        }
        Ok(())
    }
}
