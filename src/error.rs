//! Error types for oatmeal.
//!
//! The receive path never surfaces errors: corrupted frames are dropped and
//! counted in [`crate::Stats`]. Errors exist where a caller asked for a
//! diagnosis ([`crate::MsgView::parse`]) or where the transport itself
//! failed while writing.

use thiserror::Error;

/// Main error type for all oatmeal operations.
#[derive(Debug, Error)]
pub enum OatmealError {
    /// I/O error while writing to the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Candidate frame is shorter than the minimum frame length.
    #[error("frame too short: {0} bytes")]
    FrameTooShort(usize),

    /// Candidate frame is longer than the maximum frame length.
    #[error("frame too long: {0} bytes")]
    FrameTooLong(usize),

    /// Frame does not begin with the start byte `<`.
    #[error("missing frame start byte")]
    MissingStartByte,

    /// Frame does not carry the end byte `>` in its expected position.
    #[error("missing frame end byte")]
    MissingEndByte,

    /// Length check byte does not match the frame length.
    #[error("bad length check byte: got {got:#04x}, want {want:#04x}")]
    BadLengthCheck { got: u8, want: u8 },

    /// Checksum byte does not match the frame contents.
    #[error("bad checksum byte: got {got:#04x}, want {want:#04x}")]
    BadChecksum { got: u8, want: u8 },
}

/// Result type alias using OatmealError.
pub type Result<T> = std::result::Result<T, OatmealError>;
