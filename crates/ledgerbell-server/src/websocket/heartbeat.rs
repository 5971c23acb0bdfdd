//! Liveness monitoring for a connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stopped responding within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Number of consecutive silent intervals tolerated before timing out:
/// `ceil(timeout / interval)`, never below two. The ping for one interval
/// goes out on the same tick that checks the previous one, so its pong can
/// only be seen a full interval later.
fn max_missed(interval: Duration, timeout: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    u32::try_from(timeout.as_millis().div_ceil(interval_ms))
        .unwrap_or(u32::MAX)
        .max(2)
}

/// Watch a connection's alive flag.
///
/// Every `interval` the flag is checked and reset. Inbound frames and pongs
/// set it again (see [`ClientConnection::mark_alive`]). After
/// `max_missed` consecutive silent intervals the connection is considered
/// dead.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let max_missed = max_missed(interval, timeout);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connection.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        tracing::debug!(
                            conn_id = %connection.id,
                            missed,
                            silent_for = ?connection.last_seen_elapsed(),
                            "heartbeat timed out"
                        );
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
        }
    }
}
