//! Queue message types for the user-update queue.
//!
//! Publishers serialize [`UserUpdateEvent`] as a compact MessagePack array of
//! six positional fields. The consumer only ever decodes these messages.

use std::fmt;

use lapin::message::Delivery;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default queue name used when `RABBITMQ_QUEUE` is not set.
pub const DEFAULT_QUEUE: &str = "user_updates";

/// Kind of account change that triggered a notification.
///
/// Encoded on the wire as its integer discriminant. Discriminants this worker
/// does not know about decode as [`ChangeType::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum ChangeType {
    RegistrationConfirmation = 0,
    EmailChangeOld = 1,
    EmailChangeNew = 2,
    PasswordReset = 3,
    PasswordChange = 4,
    UsernameChange = 5,
    RoleChange = 6,
    Unknown = 7,
}

impl ChangeType {
    /// Name of the provider template used for this change type.
    pub fn template_name(self) -> &'static str {
        match self {
            ChangeType::RegistrationConfirmation => "RegistrationConfirmation",
            ChangeType::EmailChangeOld => "EmailChangeOld",
            ChangeType::EmailChangeNew => "EmailChangeNew",
            ChangeType::PasswordReset => "PasswordReset",
            ChangeType::PasswordChange => "PasswordChange",
            ChangeType::UsernameChange => "UsernameChange",
            ChangeType::RoleChange => "RoleChange",
            ChangeType::Unknown => "Unknown",
        }
    }
}

impl From<i32> for ChangeType {
    fn from(value: i32) -> Self {
        match value {
            0 => ChangeType::RegistrationConfirmation,
            1 => ChangeType::EmailChangeOld,
            2 => ChangeType::EmailChangeNew,
            3 => ChangeType::PasswordReset,
            4 => ChangeType::PasswordChange,
            5 => ChangeType::UsernameChange,
            6 => ChangeType::RoleChange,
            _ => ChangeType::Unknown,
        }
    }
}

impl From<ChangeType> for i32 {
    fn from(value: ChangeType) -> Self {
        value as i32
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.template_name())
    }
}

/// A user-lifecycle event as published to the queue.
///
/// Field order is the wire order and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdateEvent {
    /// Recipient email address
    pub recipient: String,
    /// Display name of the account
    pub display_name: Option<String>,
    /// Previous value for changes that replace something (email, username)
    pub old_value: Option<String>,
    /// New value for changes that replace something (email, username)
    pub new_value: Option<String>,
    /// What changed
    pub change_type: ChangeType,
    /// Link the recipient follows to confirm the change
    pub confirmation_link: String,
}

/// Errors produced while decoding a queue payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is empty")]
    Empty,

    #[error("payload is not a valid user update: {0}")]
    Malformed(#[from] rmp_serde::decode::Error),

    #[error("recipient address is blank")]
    MissingRecipient,
}

impl UserUpdateEvent {
    /// Decode a MessagePack payload taken off the queue.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError::Empty);
        }

        let event: UserUpdateEvent = rmp_serde::from_slice(payload)?;

        if event.recipient.trim().is_empty() {
            return Err(DecodeError::MissingRecipient);
        }

        Ok(event)
    }

    /// Encode this event in the queue wire format.
    pub fn encode(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }
}

/// One broker delivery, detached from the client library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Broker-assigned tag, used exactly once to ack or nack
    pub delivery_tag: u64,
    /// Whether the broker has delivered this message before
    pub redelivered: bool,
    /// Raw payload bytes
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(delivery_tag: u64, payload: Vec<u8>) -> Self {
        Self {
            delivery_tag,
            redelivered: false,
            payload,
        }
    }
}

impl From<Delivery> for InboundMessage {
    fn from(delivery: Delivery) -> Self {
        Self {
            delivery_tag: delivery.delivery_tag,
            redelivered: delivery.redelivered,
            payload: delivery.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn password_reset() -> UserUpdateEvent {
        UserUpdateEvent {
            recipient: "a@b.com".to_string(),
            display_name: Some("alice".to_string()),
            old_value: None,
            new_value: None,
            change_type: ChangeType::PasswordReset,
            confirmation_link: "https://x/y".to_string(),
        }
    }

    #[test]
    fn test_decode_positional_array() {
        let bytes = password_reset().encode().unwrap();

        // fixarray of six elements
        assert_eq!(bytes[0], 0x96);

        let decoded = UserUpdateEvent::decode(&bytes).unwrap();
        assert_eq!(decoded, password_reset());
    }

    #[test]
    fn test_decode_nil_optionals() {
        let wire = (
            "a@b.com",
            None::<String>,
            None::<String>,
            None::<String>,
            0i32,
            "https://confirm",
        );
        let bytes = rmp_serde::to_vec(&wire).unwrap();

        let event = UserUpdateEvent::decode(&bytes).unwrap();
        assert_eq!(event.change_type, ChangeType::RegistrationConfirmation);
        assert_eq!(event.display_name, None);
        assert_eq!(event.confirmation_link, "https://confirm");
    }

    #[test]
    fn test_decode_unrecognised_change_type() {
        let wire = ("a@b.com", "bob", "old", "new", 42i32, "https://l");
        let bytes = rmp_serde::to_vec(&wire).unwrap();

        let event = UserUpdateEvent::decode(&bytes).unwrap();
        assert_eq!(event.change_type, ChangeType::Unknown);
    }

    #[test]
    fn test_decode_empty_payload() {
        assert!(matches!(
            UserUpdateEvent::decode(&[]),
            Err(DecodeError::Empty)
        ));
    }

    #[test]
    fn test_decode_garbage() {
        let result = UserUpdateEvent::decode(b"not messagepack at all");
        assert!(matches!(result, Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_truncated_array() {
        let wire = ("a@b.com", "bob");
        let bytes = rmp_serde::to_vec(&wire).unwrap();

        assert!(matches!(
            UserUpdateEvent::decode(&bytes),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_blank_recipient() {
        let mut event = password_reset();
        event.recipient = "  ".to_string();
        let bytes = event.encode().unwrap();

        assert!(matches!(
            UserUpdateEvent::decode(&bytes),
            Err(DecodeError::MissingRecipient)
        ));
    }

    #[test]
    fn test_template_names() {
        assert_eq!(ChangeType::EmailChangeOld.template_name(), "EmailChangeOld");
        assert_eq!(ChangeType::from(5), ChangeType::UsernameChange);
        assert_eq!(i32::from(ChangeType::RoleChange), 6);
    }
}
