//! Metric recording functions.
//!
//! All metrics use the `sdk_` prefix, `_total` for counters and `_seconds`
//! for duration histograms.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ============================================================================
// Event Bus
// ============================================================================

/// Metric: `sdk_events_emitted_total`
/// Labels: `event`
pub fn record_event_emitted(event: &'static str) {
    counter!("sdk_events_emitted_total", "event" => event).increment(1);
}

/// Metric: `sdk_handler_panics_total`
/// Labels: `event`
pub fn record_handler_panic(event: &'static str) {
    counter!("sdk_handler_panics_total", "event" => event).increment(1);
}

// ============================================================================
// Commands
// ============================================================================

/// Record a command result.
///
/// Metric: `sdk_commands_total`, `sdk_command_duration_seconds`
/// Labels: `command`, `outcome` (`success` or `SdkError::error_code`)
pub fn record_command(command: &'static str, outcome: &'static str, duration: Duration) {
    counter!("sdk_commands_total", "command" => command, "outcome" => outcome).increment(1);
    histogram!("sdk_command_duration_seconds", "command" => command)
        .record(duration.as_secs_f64());
}

// ============================================================================
// Session
// ============================================================================

/// Metric: `sdk_connection_transitions_total`
/// Labels: `state` (connected, reconnecting, closed)
pub fn record_connection_transition(state: &'static str) {
    counter!("sdk_connection_transitions_total", "state" => state).increment(1);
}

/// Metric: `sdk_participants`
pub fn set_participants(count: usize) {
    // usize to f64 conversion is safe for realistic roster sizes (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("sdk_participants").set(count as f64);
}

/// Metric: `sdk_actor_mailbox_depth`
/// Labels: `actor_type`
pub fn set_actor_mailbox_depth(actor_type: &'static str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("sdk_actor_mailbox_depth", "actor_type" => actor_type).set(depth as f64);
}
