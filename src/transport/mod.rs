//! Transport module - the byte stream underneath a port.
//!
//! The protocol core only assumes non-blocking byte-oriented primitives, so
//! the receive state machine is testable against in-memory queues and
//! deployable over any UART/serial driver that can implement [`Transport`].

mod memory;

pub use memory::MemoryTransport;

/// Default symbol rate for serial links carrying this protocol.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Non-blocking byte source and sink consumed by [`crate::Port`].
///
/// `available` and `read` must never block: they report and hand over only
/// bytes that have already arrived. `write` must write the whole buffer and
/// may block only while the peer drains a full output buffer; that is the
/// transport's contract with its hardware, not the protocol's concern.
pub trait Transport {
    /// Number of bytes immediately readable without blocking.
    fn available(&self) -> usize;

    /// Read up to `dst.len()` bytes that have already arrived.
    ///
    /// Returns the number of bytes copied, at most [`Transport::available`].
    fn read(&mut self, dst: &mut [u8]) -> usize;

    /// Write all of `src` to the wire.
    fn write(&mut self, src: &[u8]) -> std::io::Result<()>;
}
