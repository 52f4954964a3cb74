//! Connection/session core.
//!
//! The pieces here are plain single-threaded state machines, mutated only
//! from the link's event-loop task:
//!
//! | Module | Owns |
//! |--------|------|
//! | `queue` | Strict-FIFO outbound accumulation and flush snapshots |
//! | `reconnect` | Connection lifecycle state, backoff, attempt limits |
//! | `registry` | Per-channel polling/throttle state |
//! | `router` | Inbound batch decoding and dispatch |

// ============================================================================
// Submodules
// ============================================================================

/// Outbound queue and batch snapshots.
pub mod queue;

/// Connection lifecycle and reconnection backoff.
pub mod reconnect;

/// Event registry: per-channel polling and throttle state.
pub mod registry;

/// Inbound frame decoding and dispatch.
pub mod router;

// ============================================================================
// Re-exports
// ============================================================================

pub use queue::OutboundQueue;
pub use reconnect::{ConnectionState, ReconnectDecision, Reconnector};
pub use registry::{EventRegistry, RegisteredEvent};
pub use router::{Route, RouteSummary, classify, decode_frame, route_frame};
