//! Client-to-server messages.

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};
use crate::identity::{Role, SessionKey, UserId};

/// Frames a client may send. Only `register` exists today; anything else
/// fails to decode and is ignored by the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Registration handshake, sent once right after the socket opens.
    Register {
        /// Authenticated user id. Required for the `user` role.
        #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
        user_id: Option<UserId>,
        /// Session role.
        role: Role,
    },
}

impl ClientMessage {
    /// Build a registration frame.
    #[must_use]
    pub fn register(role: Role, user_id: Option<UserId>) -> Self {
        Self::Register { user_id, role }
    }

    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Registry key this message asks for.
    ///
    /// A `user` registration without a user id could never be targeted and
    /// is rejected.
    pub fn session_key(&self) -> Result<SessionKey> {
        match *self {
            Self::Register {
                role: Role::User,
                user_id: None,
            } => Err(ProtocolError::MissingUserId),
            Self::Register { role, user_id } => Ok(SessionKey { role, user_id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn register_wire_shape() {
        let json = ClientMessage::register(Role::User, Some(UserId(42)))
            .to_json()
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["type"], "register");
        assert_eq!(v["userId"], 42);
        assert_eq!(v["role"], "user");
    }

    #[test]
    fn parse_register() {
        let msg = ClientMessage::parse(r#"{"type":"register","userId":7,"role":"admin"}"#).unwrap();
        assert_eq!(msg, ClientMessage::register(Role::Admin, Some(UserId(7))));
    }

    #[test]
    fn parse_register_with_string_id() {
        let msg = ClientMessage::parse(r#"{"type":"register","userId":"7","role":"user"}"#).unwrap();
        assert_eq!(msg.session_key().unwrap(), SessionKey::user(UserId(7)));
    }

    #[test]
    fn admin_without_user_id_is_accepted() {
        let msg = ClientMessage::parse(r#"{"type":"register","role":"admin"}"#).unwrap();
        assert_eq!(msg.session_key().unwrap(), SessionKey::admin(None));
    }

    #[test]
    fn user_without_user_id_is_rejected() {
        let msg = ClientMessage::parse(r#"{"type":"register","role":"user"}"#).unwrap();
        assert_matches!(msg.session_key(), Err(ProtocolError::MissingUserId));
    }

    #[test]
    fn other_types_fail_to_parse() {
        assert!(ClientMessage::parse(r#"{"type":"subscribe","topic":"x"}"#).is_err());
        assert!(ClientMessage::parse(r#"{"userId":1,"role":"user"}"#).is_err());
    }

    #[test]
    fn extra_fields_tolerated() {
        let msg =
            ClientMessage::parse(r#"{"type":"register","userId":1,"role":"user","tab":"a"}"#);
        assert!(msg.is_ok());
    }
}
