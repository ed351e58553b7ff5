//! Maps `Box<dyn Error>` from trait boundaries to typed `LinkError`.
//!
//! The traits in `groundlink_traits` use `Box<dyn Error + Send + Sync>` so any
//! client can sit behind them; this module converts those to our typed error
//! enum, with an optional feature-gated path for `groundlink_relay::RelayError`
//! downcasting.

use crate::error::LinkError;

/// Map a trait-boundary error to a typed `LinkError`.
///
/// Attempts to downcast known relay error types first, then falls back
/// to string-based heuristics.
pub fn map_transport_error(e: &(dyn std::error::Error + 'static)) -> LinkError {
    #[cfg(feature = "relay-errors")]
    {
        if let Some(re) = e.downcast_ref::<groundlink_relay::error::RelayError>() {
            return match re {
                groundlink_relay::error::RelayError::Timeout => LinkError::Timeout,
                groundlink_relay::error::RelayError::Rejected(msg) => {
                    LinkError::Rejected(msg.clone())
                }
                other => LinkError::Transport(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timed out") || s.to_lowercase().contains("timeout") {
        LinkError::Timeout
    } else {
        LinkError::Transport(s)
    }
}
