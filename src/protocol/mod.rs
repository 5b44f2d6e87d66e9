//! Protocol module - wire format, message building, and argument parsing.
//!
//! This module implements the textual Oatmeal frame format:
//! - Scalar encoding/decoding, escaping and check-byte arithmetic
//! - `Msg` builder and `MsgView` read-only view over a frame
//! - `ArgParser` for rewindable typed reads over a frame's args

pub mod args;
pub mod fmt;
pub mod message;

pub use args::ArgParser;
pub use fmt::{Decode, Encode};
pub use message::{Msg, MsgView};
