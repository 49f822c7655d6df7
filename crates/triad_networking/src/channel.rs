//! # Data Channels
//!
//! The replicator only needs to push text frames to a peer and close the
//! link. Everything else (signaling, ICE, transport) happens outside.
//!
//! Inbound frames do not go through this trait: the transport hands them to
//! the [`InboundSender`](crate::replicator::InboundSender) returned when the
//! channel was opened.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ChannelError;

/// Outbound half of a best-effort peer link.
pub trait DataChannel: Send {
    /// Queues one text frame.
    fn send(&mut self, payload: &str) -> Result<(), ChannelError>;

    /// Closes the link. Idempotent.
    fn close(&mut self);

    /// Whether frames can still be sent.
    fn is_open(&self) -> bool;
}

/// In-process channel endpoint, used for loopback sessions and tests.
///
/// Created in connected pairs; closing either end closes both.
pub struct MemoryChannel {
    outgoing: Sender<String>,
    incoming: Receiver<String>,
    open: Arc<AtomicBool>,
}

impl MemoryChannel {
    /// Creates two connected endpoints.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        let open = Arc::new(AtomicBool::new(true));
        (
            Self {
                outgoing: a_tx,
                incoming: a_rx,
                open: Arc::clone(&open),
            },
            Self {
                outgoing: b_tx,
                incoming: b_rx,
                open,
            },
        )
    }

    /// Frames sent by the other end. Clone it before handing the channel to
    /// a replicator.
    #[must_use]
    pub fn incoming(&self) -> Receiver<String> {
        self.incoming.clone()
    }
}

impl DataChannel for MemoryChannel {
    fn send(&mut self, payload: &str) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        self.outgoing
            .send(payload.to_owned())
            .map_err(|_| ChannelError::Closed)
    }

    fn close(&mut self) {
        self.open.store(false, Ordering::Release);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_delivers_in_order() {
        let (mut a, b) = MemoryChannel::pair();
        a.send("one").unwrap();
        a.send("two").unwrap();
        let received: Vec<String> = b.incoming().try_iter().collect();
        assert_eq!(received, vec!["one", "two"]);
    }

    #[test]
    fn test_close_affects_both_ends() {
        let (mut a, mut b) = MemoryChannel::pair();
        b.close();
        assert!(!a.is_open());
        assert_eq!(a.send("late"), Err(ChannelError::Closed));
    }
}
