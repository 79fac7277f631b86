// Push channel state machine and reconnect policy.

use std::fmt;
use std::time::Duration;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for push channel reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 15s.
    pub max_delay: Duration,

    /// Reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(15),
            max_retries: None,
        }
    }
}

impl ReconnectConfig {
    /// Wait before reconnection attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt.saturating_sub(1), self)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_retries.is_some_and(|max| attempt > max)
    }
}

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`, jitter within +-25%.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── ChannelState ─────────────────────────────────────────────────────

/// Lifecycle of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No connection and none wanted.
    Disconnected,
    /// Opening the websocket. `attempt` 0 is the initial connection.
    Connecting { attempt: u32 },
    /// Connected and receiving notifications.
    Subscribed,
    /// Waiting out the backoff before reconnection attempt `attempt`.
    Reconnecting { attempt: u32 },
}

/// Inputs that move the channel between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    Start,
    Connected,
    ConnectFailed,
    Dropped,
    BackoffElapsed,
    Shutdown,
}

impl ChannelState {
    /// The state after `event`. Events that make no sense in the current
    /// state leave it unchanged.
    pub fn on(self, event: ChannelEvent, reconnect: &ReconnectConfig) -> Self {
        match (self, event) {
            (_, ChannelEvent::Shutdown) => Self::Disconnected,
            (Self::Disconnected, ChannelEvent::Start) => Self::Connecting { attempt: 0 },
            (Self::Connecting { .. }, ChannelEvent::Connected) => Self::Subscribed,
            (Self::Connecting { attempt }, ChannelEvent::ConnectFailed) => {
                let next = attempt.saturating_add(1);
                if reconnect.exhausted(next) {
                    Self::Disconnected
                } else {
                    Self::Reconnecting { attempt: next }
                }
            }
            (Self::Subscribed, ChannelEvent::Dropped) => Self::Reconnecting { attempt: 1 },
            (Self::Reconnecting { attempt }, ChannelEvent::BackoffElapsed) => {
                Self::Connecting { attempt }
            }
            (state, _) => state,
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting { attempt } => write!(f, "connecting (attempt {attempt})"),
            Self::Subscribed => f.write_str("subscribed"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
        }
    }
}
