//! Async dual-transport resolver socket (UDP + TCP) implementing the
//! retry/timeout/lazy-lifecycle contract of §4.2: one outstanding task per
//! message id, per-transport idle-close timers, UDP retried on a timer and
//! TCP relying on the stream's own reliability.

mod resolver;
mod tcp;
mod udp;

pub use resolver::Resolver;

use std::time::Instant;
use tokio::sync::oneshot;

/// A single in-flight request awaiting a response keyed by message id.
pub(crate) struct Pending {
    pub responder: oneshot::Sender<crate::types::Message>,
    pub raw: Vec<u8>,
    pub attempts: u32,
    pub sent_at: Instant,
}
