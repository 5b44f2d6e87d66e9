//! # oatmeal
//!
//! Rust implementation of the Oatmeal Protocol: a line-oriented, ASCII-safe
//! framing and message protocol for microcontroller-to-host communication
//! over a byte stream (typically UART).
//!
//! Every frame carries a 3-character command, a 1-character flag, a 2-character
//! token used to correlate requests with responses, and a typed argument list
//! (integers, reals, booleans, strings, byte blobs, nulls, lists and
//! dictionaries). Frames are delimited by printable bytes and protected by a
//! length-check byte and a checksum byte:
//!
//! ```text
//! <RUNRaa1.23,T,"Hi!",[1,2]>-b
//! '<'          start of frame
//! "RUN"        command
//! 'R'          flag
//! "aa"         token
//! 1.23,T,...   args
//! '>'          end of frame
//! '-'          length check byte
//! 'b'          checksum byte
//! ```
//!
//! ## Architecture
//!
//! - [`protocol::fmt`] - scalar encoding/decoding, escaping, check bytes
//! - [`protocol::Msg`] / [`protocol::MsgView`] - fixed-capacity frame builder
//!   and borrowed read-only view
//! - [`protocol::ArgParser`] - rewindable typed reader over a frame's args
//! - [`Port`] - non-blocking receive state machine and send paths over a
//!   [`Transport`]
//! - [`Device`] - built-in opcode handling (discovery, heartbeat and logging
//!   toggles) layered on a port
//!
//! ## Example
//!
//! ```
//! use oatmeal::protocol::{ArgParser, Msg, MsgView};
//!
//! let mut msg = Msg::new();
//! msg.start("RUN", b'R', "aa");
//! msg.append(42i32);
//! msg.append("go");
//! msg.finish();
//! assert!(MsgView::validate_frame(msg.frame()));
//!
//! let view = msg.as_view();
//! let mut parser = ArgParser::new(view.args());
//! assert_eq!(parser.parse_arg::<i32>(), Some(42));
//! ```

pub mod device;
pub mod error;
pub mod port;
pub mod protocol;
pub mod stats;
pub mod transport;

pub use device::{Device, DeviceConfig};
pub use error::OatmealError;
pub use port::Port;
pub use protocol::args::ArgParser;
pub use protocol::message::{Msg, MsgView};
pub use stats::Stats;
pub use transport::{MemoryTransport, Transport};

/// Library MAJOR version. Incremented on incompatible API changes.
pub const LIB_VERSION_MAJOR: u16 = 1;
/// Library MINOR version. Incremented on backwards-compatible additions.
pub const LIB_VERSION_MINOR: u16 = 1;

/// Protocol MAJOR version. Incremented on incompatible wire changes.
pub const PROTOCOL_VERSION_MAJOR: u16 = 1;
/// Protocol MINOR version. Incremented on backwards-compatible wire changes.
pub const PROTOCOL_VERSION_MINOR: u16 = 0;

/// Maximum frame length in bytes, including delimiters and check bytes.
///
/// Frames longer than this are quietly dropped by the receive path and
/// counted under [`Stats::frame_too_long`]. This constant also sizes the
/// [`Msg`] buffer on the stack, so raising it costs RAM even when only
/// short messages are exchanged.
pub const MAX_MSG_LEN: usize = 127;

/// Minimum frame length in bytes, including delimiters and check bytes.
pub const MIN_MSG_LEN: usize = 9;
