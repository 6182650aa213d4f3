//! Duplicate datagram guard
//!
//! Some heartbeat senders transmit every datagram twice back to back. The
//! guard remembers only the single previous datagram (across all peers) and
//! drops an exact repeat from the same source. After a drop the memory is
//! cleared so a third identical datagram is processed again.

use std::net::SocketAddr;
use tracing::debug;

#[derive(Debug, Default)]
pub struct DuplicateGuard {
    previous: Option<(SocketAddr, Vec<u8>)>,
}

impl DuplicateGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `datagram` repeats the previous one from `peer` and
    /// should be discarded.
    pub fn is_duplicate(&mut self, peer: SocketAddr, datagram: &[u8]) -> bool {
        if let Some((prev_peer, prev_bytes)) = &self.previous {
            if *prev_peer == peer && prev_bytes.as_slice() == datagram {
                self.previous = None;
                debug!(component = "server", server = %peer, "duplicate datagram dropped");
                return true;
            }
        }

        match &mut self.previous {
            Some((prev_peer, prev_bytes)) => {
                *prev_peer = peer;
                prev_bytes.clear();
                prev_bytes.extend_from_slice(datagram);
            }
            None => self.previous = Some((peer, datagram.to_vec())),
        }
        false
    }
}
