//! Connection lifecycle state machine.
//!
//! ```text
//! Disconnected --connect--> Connecting --open--> Registered
//!      ^                        |                    |
//!      +-------- close ---------+------- close ------+
//!                  (schedule reconnect if still logged in)
//! ```
//!
//! The machine does no I/O. The driver asks it what to do and reports what
//! happened; the reconnect timer is owned state here so there is never more
//! than one pending.

use std::time::Duration;

use ledgerbell_core::{ClientMessage, Role, UserId};
use tokio::time::Instant;

/// The authenticated user a connection registers as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Identity {
    /// User id.
    pub user_id: UserId,
    /// Session role.
    pub role: Role,
}

/// Where the client connection is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport.
    Disconnected,
    /// Transport opening.
    Connecting,
    /// Transport open and registration sent.
    Registered,
}

/// A single pending reconnect.
#[derive(Debug, Default)]
pub struct ReconnectTimer {
    deadline: Option<Instant>,
    scheduled: u64,
}

impl ReconnectTimer {
    /// Replace any pending reconnect with one at `at`.
    pub fn schedule(&mut self, at: Instant) {
        let _ = self.cancel();
        self.deadline = Some(at);
        self.scheduled += 1;
    }

    /// Drop the pending reconnect. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// When the pending reconnect fires.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether a reconnect is pending.
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Times a reconnect has been scheduled.
    pub fn scheduled_count(&self) -> u64 {
        self.scheduled
    }
}

/// Per-tab connection state machine.
#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    identity: Option<Identity>,
    timer: ReconnectTimer,
    reconnect_delay: Duration,
}

impl ConnectionMachine {
    /// A logged-out machine.
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            identity: None,
            timer: ReconnectTimer::default(),
            reconnect_delay,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The logged-in identity, if any.
    pub fn identity(&self) -> Option<Identity> {
        self.identity
    }

    /// The reconnect timer.
    pub fn timer(&self) -> &ReconnectTimer {
        &self.timer
    }

    /// Set the authenticated user.
    pub fn login(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    /// Forget the user and tear down. Returns whether a transport was open.
    pub fn logout(&mut self) -> bool {
        self.identity = None;
        self.teardown()
    }

    /// Begin connecting. Returns `false` (and does nothing) when no user is
    /// logged in or a transport is already open or opening.
    pub fn connect(&mut self) -> bool {
        if self.identity.is_none() || self.state != ConnectionState::Disconnected {
            return false;
        }
        let _ = self.timer.cancel();
        self.state = ConnectionState::Connecting;
        true
    }

    /// The transport opened. Returns the registration frame to send first.
    pub fn on_open(&mut self) -> Option<ClientMessage> {
        let _ = self.timer.cancel();
        let identity = self.identity?;
        self.state = ConnectionState::Registered;
        Some(ClientMessage::register(identity.role, Some(identity.user_id)))
    }

    /// The transport closed at `now`. Schedules a reconnect if still logged
    /// in and returns its deadline.
    pub fn on_close(&mut self, now: Instant) -> Option<Instant> {
        self.state = ConnectionState::Disconnected;
        self.identity?;
        let at = now + self.reconnect_delay;
        self.timer.schedule(at);
        Some(at)
    }

    /// A transport error. Only marks the connection down; the close that
    /// follows drives reconnection.
    pub fn on_error(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// Consume the pending reconnect if it is due at `now`.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.timer.deadline() {
            Some(at) if at <= now => self.timer.cancel(),
            _ => false,
        }
    }

    /// Cancel any pending reconnect and mark disconnected. Returns whether a
    /// transport was open or opening.
    pub fn teardown(&mut self) -> bool {
        let _ = self.timer.cancel();
        let was_open = self.state != ConnectionState::Disconnected;
        self.state = ConnectionState::Disconnected;
        was_open
    }
}
