//! Observability for the session client.
//!
//! The library records through the `metrics` facade and logs through
//! `tracing`; it installs neither a recorder nor a subscriber. Labels are
//! bounded by code:
//! - `event`: the closed event catalog (15 values)
//! - `command`: the command surface (~30 values)
//! - `outcome`: `success` or an error code
//! - `state`: connection states (3 values)
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `sdk_events_emitted_total` | Counter | `event` | Events published on the bus |
//! | `sdk_handler_panics_total` | Counter | `event` | Application handlers that panicked |
//! | `sdk_commands_total` | Counter | `command`, `outcome` | Command results |
//! | `sdk_command_duration_seconds` | Histogram | `command` | Time from request to reply |
//! | `sdk_connection_transitions_total` | Counter | `state` | Connection lifecycle changes |
//! | `sdk_participants` | Gauge | none | Current roster size |
//! | `sdk_actor_mailbox_depth` | Gauge | `actor_type` | Session actor backlog |

pub mod metrics;
