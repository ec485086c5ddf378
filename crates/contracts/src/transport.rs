//! MessageTransport trait - publish side of the illumination messaging protocol
//!
//! Inbound status messages are delivered separately as a stream of
//! `InboundMessage`; how they arrive is up to each transport implementation.

use bytes::Bytes;

use crate::ContractError;

/// Message received on a subscribed topic
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Topic the message arrived on
    pub topic: String,
    /// Raw payload
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Publish interface of a messaging transport
#[trait_variant::make(MessageTransport: Send)]
pub trait LocalMessageTransport {
    /// Transport name (used for logging)
    fn name(&self) -> &str;

    /// Publish a payload on a topic
    ///
    /// # Errors
    /// Returns `ContractError::Transport` if the message could not be handed off.
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), ContractError>;
}
