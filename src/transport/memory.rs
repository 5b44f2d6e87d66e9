//! In-memory transport backed by byte queues.
//!
//! Useful for tests, simulations and loopback wiring: bytes the port writes
//! pile up in `outgoing`, and bytes pushed into `incoming` become readable
//! exactly as if they had arrived over a wire.

use bytes::{Buf, Bytes, BytesMut};

use super::Transport;

/// A [`Transport`] over in-memory queues instead of real hardware.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    incoming: BytesMut,
    outgoing: BytesMut,
}

impl MemoryTransport {
    /// Create a transport with empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `bytes` available for the port to read.
    pub fn push_incoming(&mut self, bytes: &[u8]) {
        self.incoming.extend_from_slice(bytes);
    }

    /// Everything written by the port and not yet taken.
    pub fn outgoing(&self) -> &[u8] {
        &self.outgoing
    }

    /// Drain and return everything written by the port.
    pub fn take_outgoing(&mut self) -> Bytes {
        self.outgoing.split().freeze()
    }
}

impl Transport for MemoryTransport {
    fn available(&self) -> usize {
        self.incoming.len()
    }

    fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.incoming.len());
        dst[..n].copy_from_slice(&self.incoming[..n]);
        self.incoming.advance(n);
        n
    }

    fn write(&mut self, src: &[u8]) -> std::io::Result<()> {
        self.outgoing.extend_from_slice(src);
        Ok(())
    }
}
