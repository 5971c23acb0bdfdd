//! Per-connection registration state machine.
//!
//! ```text
//! Connected --register(valid)--> Registered --close--> Closed
//!     |                                                  ^
//!     +------------------------close---------------------+
//! ```
//!
//! Kept free of I/O so the session loop only has to act on the outcome.

use ledgerbell_core::{ClientMessage, ProtocolError, SessionKey};

/// Where a connection is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Socket open, no valid registration yet. Receives nothing.
    Connected,
    /// Registered under a key; eligible for delivery.
    Registered(SessionKey),
    /// Transport closed.
    Closed,
}

/// What the session loop should do with an inbound frame.
#[derive(Debug)]
pub enum InboundOutcome {
    /// First valid registration: add the connection to the registry.
    Register(SessionKey),
    /// The frame could not be used; log it and keep the connection open.
    Rejected(ProtocolError),
    /// Registration already happened (or the socket is closed); drop it.
    Ignored,
}

/// Registration handshake for one connection.
#[derive(Debug)]
pub struct Handshake {
    state: SessionState,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Handshake {
    /// A freshly opened connection.
    pub fn new() -> Self {
        Self {
            state: SessionState::Connected,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Registered key, if any.
    pub fn key(&self) -> Option<SessionKey> {
        match self.state {
            SessionState::Registered(key) => Some(key),
            _ => None,
        }
    }

    /// Handle a text frame.
    pub fn on_text(&mut self, text: &str) -> InboundOutcome {
        if self.state != SessionState::Connected {
            return InboundOutcome::Ignored;
        }
        match ClientMessage::parse(text).and_then(|msg| msg.session_key()) {
            Ok(key) => {
                self.state = SessionState::Registered(key);
                InboundOutcome::Register(key)
            }
            Err(e) => InboundOutcome::Rejected(e),
        }
    }

    /// Handle a binary frame. UTF-8 payloads are treated as text.
    pub fn on_binary(&mut self, data: &[u8]) -> InboundOutcome {
        match std::str::from_utf8(data) {
            Ok(text) => self.on_text(text),
            Err(_) if self.state != SessionState::Connected => InboundOutcome::Ignored,
            Err(_) => InboundOutcome::Rejected(ProtocolError::NotUtf8 { len: data.len() }),
        }
    }

    /// Mark the transport closed. Returns the key it held, if registered.
    pub fn close(&mut self) -> Option<SessionKey> {
        let key = self.key();
        self.state = SessionState::Closed;
        key
    }
}
