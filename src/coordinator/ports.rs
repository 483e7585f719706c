//! Port traits at the coordinator's I/O seams.
//!
//! The coordinator never talks to the broker or to Telegram directly; it
//! drives these two traits. Production wires in [`crate::mqtt::MqttActuator`]
//! and [`crate::telegram::TelegramReply`], tests wire in recording mocks.

use teloxide::types::ChatId;

#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("actuator publish rejected: {0}")]
    Publish(String),

    #[error("actuator connection failed: {0}")]
    Connection(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("chat delivery failed: {0}")]
    Delivery(String),
}

/// One-shot heater switch. Each call is an independent fire-and-forget
/// publish; the implementation decides how the value reaches the device.
pub trait ActuatorPort {
    async fn set_heater(&self, on: bool) -> Result<(), ActuatorError>;
}

/// Outbound side of a chat conversation.
pub trait ReplyPort {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), ReplyError>;

    async fn send_photo(&self, chat: ChatId, png: Vec<u8>) -> Result<(), ReplyError>;

    /// Sends `text` together with a reply keyboard built from `rows` of
    /// option labels.
    async fn send_keyboard(
        &self,
        chat: ChatId,
        text: &str,
        rows: &[&[&str]],
    ) -> Result<(), ReplyError>;
}
