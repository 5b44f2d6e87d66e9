//! Frame building and read-only message views.
//!
//! [`Msg`] is an owned, fixed-capacity builder: a message is born empty with
//! [`Msg::start`], grows through `append` calls, and is sealed by
//! [`Msg::finish`], which stamps the end byte and both check bytes. After
//! `finish` the message is read-only.
//!
//! [`MsgView`] borrows a frame owned by someone else (typically the port's
//! receive buffer) and exposes the same read-only accessors without copying.

use bytes::Bytes;

use crate::error::OatmealError;
use crate::protocol::args::ArgParser;
use crate::protocol::fmt::{self, Encode, ARG_SEP, DICT_END, DICT_KV_SEP, DICT_START, END_BYTE, LIST_END, LIST_START, START_BYTE};
use crate::{MAX_MSG_LEN, MIN_MSG_LEN};

/// Offset of the opcode (command + flag) within a frame.
pub const OPCODE_OFFSET: usize = 1;
/// Offset of the command within a frame.
pub const CMD_OFFSET: usize = 1;
/// Offset of the flag byte within a frame.
pub const FLAG_OFFSET: usize = 4;
/// Offset of the token within a frame.
pub const TOKEN_OFFSET: usize = 5;
/// Offset of the args region within a frame.
pub const ARGS_OFFSET: usize = 7;

/// Length of the command, e.g. `HRT`.
pub const CMD_LEN: usize = 3;
/// Length of the flag, e.g. `B`.
pub const FLAG_LEN: usize = 1;
/// Length of the token, e.g. `xy`.
pub const TOKEN_LEN: usize = 2;
/// Length of the opcode (command + flag).
pub const OPCODE_LEN: usize = 4;
/// Length of the two check bytes.
pub const CHECKSUM_LEN: usize = 2;

/// Highest offset an argument byte may occupy while building.
///
/// The last three bytes of the buffer are reserved for the end byte and the
/// two check bytes stamped by [`Msg::finish`].
pub const MAX_FRAME_END_OFFSET: usize = MAX_MSG_LEN - CHECKSUM_LEN - 1;

/// A read-only Oatmeal message borrowing a frame it does not own.
#[derive(Debug, Clone, Copy)]
pub struct MsgView<'a> {
    frame: &'a [u8],
}

impl<'a> MsgView<'a> {
    /// Wrap a complete frame.
    ///
    /// The frame is expected to be structurally complete (at least
    /// `MIN_MSG_LEN` bytes); use [`MsgView::parse`] for untrusted input.
    pub fn new(frame: &'a [u8]) -> Self {
        debug_assert!(frame.len() >= MIN_MSG_LEN);
        Self { frame }
    }

    /// Wrap and validate a frame, reporting why it is invalid.
    pub fn parse(frame: &'a [u8]) -> Result<Self, OatmealError> {
        let n = frame.len();
        if n < MIN_MSG_LEN {
            return Err(OatmealError::FrameTooShort(n));
        }
        if n > MAX_MSG_LEN {
            return Err(OatmealError::FrameTooLong(n));
        }
        if frame[0] != START_BYTE {
            return Err(OatmealError::MissingStartByte);
        }
        if frame[n - 3] != END_BYTE {
            return Err(OatmealError::MissingEndByte);
        }
        let want_l = fmt::length_checksum(n);
        if frame[n - 2] != want_l {
            return Err(OatmealError::BadLengthCheck { got: frame[n - 2], want: want_l });
        }
        let want_k = fmt::compute_checksum(&frame[..n - 1]);
        if frame[n - 1] != want_k {
            return Err(OatmealError::BadChecksum { got: frame[n - 1], want: want_k });
        }
        Ok(Self { frame })
    }

    /// Check that a frame is valid: length in range, delimiters in place,
    /// length check and checksum bytes correct.
    pub fn validate_frame(buf: &[u8]) -> bool {
        let n = buf.len();
        n >= MIN_MSG_LEN
            && n <= MAX_MSG_LEN
            && buf[0] == START_BYTE
            && buf[n - 3] == END_BYTE
            && buf[n - 2] == fmt::length_checksum(n)
            && buf[n - 1] == fmt::compute_checksum(&buf[..n - 1])
    }

    /// The underlying frame bytes.
    #[inline]
    pub fn frame(&self) -> &'a [u8] {
        self.frame
    }

    /// Frame length in bytes.
    #[inline]
    pub fn length(&self) -> usize {
        self.frame.len()
    }

    /// The 4-byte opcode (command + flag).
    #[inline]
    pub fn opcode(&self) -> &'a [u8] {
        &self.frame[OPCODE_OFFSET..OPCODE_OFFSET + OPCODE_LEN]
    }

    /// The 3-byte command.
    #[inline]
    pub fn command(&self) -> &'a [u8] {
        &self.frame[CMD_OFFSET..CMD_OFFSET + CMD_LEN]
    }

    /// The flag byte.
    #[inline]
    pub fn flag(&self) -> u8 {
        self.frame[FLAG_OFFSET]
    }

    /// The 2-byte token.
    #[inline]
    pub fn token(&self) -> &'a [u8] {
        &self.frame[TOKEN_OFFSET..TOKEN_OFFSET + TOKEN_LEN]
    }

    /// The args region, between the token and the closing `>`.
    pub fn args(&self) -> &'a [u8] {
        let end = self.frame.len().saturating_sub(CHECKSUM_LEN + 1);
        if end <= ARGS_OFFSET {
            return &[];
        }
        &self.frame[ARGS_OFFSET..end]
    }

    /// Number of bytes in the args region.
    #[inline]
    pub fn args_len(&self) -> usize {
        self.args().len()
    }

    /// Whether this message has the given 4-character opcode.
    #[inline]
    pub fn is_opcode(&self, opcode: &str) -> bool {
        self.opcode() == opcode.as_bytes()
    }

    /// Whether this message has the given 3-character command.
    #[inline]
    pub fn is_command(&self, command: &str) -> bool {
        self.command() == command.as_bytes()
    }

    /// An [`ArgParser`] positioned at the start of this message's args.
    pub fn arg_parser(&self) -> ArgParser<'a> {
        ArgParser::new(self.args())
    }

    /// Copy the frame into a cheaply clonable owned buffer.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.frame)
    }
}

impl std::fmt::Display for MsgView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.frame))
    }
}

/// An owned Oatmeal message with a fixed-capacity buffer, built in place.
///
/// The buffer lives on the stack; nothing is allocated. Appends that do not
/// fit fail with a return of 0 and leave the message exactly as it was.
#[derive(Clone)]
pub struct Msg {
    buf: [u8; MAX_MSG_LEN],
    len: usize,
}

impl Msg {
    /// Create an empty message. Call [`Msg::start`] before appending.
    pub fn new() -> Self {
        Self {
            buf: [0; MAX_MSG_LEN],
            len: 0,
        }
    }

    /// Copy a complete frame into an owned message.
    ///
    /// Returns `None` if the frame does not fit.
    pub fn from_frame(frame: &[u8]) -> Option<Self> {
        if frame.len() > MAX_MSG_LEN {
            return None;
        }
        let mut msg = Self::new();
        msg.buf[..frame.len()].copy_from_slice(frame);
        msg.len = frame.len();
        Some(msg)
    }

    /// Begin a message with the given command, flag and token.
    ///
    /// Resets any previous content. `cmd` must be exactly 3 bytes and
    /// `token` exactly 2; anything else is a programmer error and panics.
    pub fn start(&mut self, cmd: &str, flag: u8, token: &str) {
        self.start_bytes(cmd.as_bytes(), flag, token.as_bytes());
    }

    /// [`Msg::start`] taking raw bytes, for echoing fields from a received
    /// frame.
    pub fn start_bytes(&mut self, cmd: &[u8], flag: u8, token: &[u8]) {
        self.buf[0] = START_BYTE;
        self.buf[CMD_OFFSET..CMD_OFFSET + CMD_LEN].copy_from_slice(cmd);
        self.buf[FLAG_OFFSET] = flag;
        self.buf[TOKEN_OFFSET..TOKEN_OFFSET + TOKEN_LEN].copy_from_slice(token);
        self.len = ARGS_OFFSET;
    }

    /// Seal the message: append the end byte, the length check byte and the
    /// checksum byte. No arguments may be appended afterwards.
    pub fn finish(&mut self) {
        let checklen = fmt::length_checksum(self.len + 3);
        self.buf[self.len] = END_BYTE;
        self.len += 1;
        self.buf[self.len] = checklen;
        self.len += 1;
        self.buf[self.len] = fmt::compute_checksum(&self.buf[..self.len]);
        self.len += 1;
    }

    fn rollback(&mut self, orig_len: usize) -> usize {
        self.len = orig_len;
        0
    }

    /// Append a single raw byte to the frame.
    ///
    /// Returns 1, or 0 if the argument region is full.
    pub fn write_raw_byte(&mut self, c: u8) -> usize {
        if self.len < MAX_FRAME_END_OFFSET {
            self.buf[self.len] = c;
            self.len += 1;
            1
        } else {
            0
        }
    }

    /// Append raw bytes to the frame without escaping or separators.
    ///
    /// Returns the byte count, or 0 (and no change) if they do not fit.
    pub fn write_raw(&mut self, bytes: &[u8]) -> usize {
        if self.len + bytes.len() > MAX_FRAME_END_OFFSET {
            return 0;
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        bytes.len()
    }

    /// Escape and append bytes as part of a string/bytes argument body.
    pub fn write_encoded(&mut self, bytes: &[u8]) -> usize {
        let n = fmt::encode_bytes(&mut self.buf[self.len..MAX_FRAME_END_OFFSET], bytes);
        if n == 0 && !bytes.is_empty() {
            return 0;
        }
        self.len += n;
        n
    }

    /// Append a value as 8 uppercase hex characters.
    pub fn write_hex(&mut self, val: u32) -> usize {
        self.write_raw(&fmt::u32_to_hex(val))
    }

    /// Emit an argument separator if the last byte requires one.
    ///
    /// A separator is needed unless we are at the start of the args region
    /// or directly after a list/dict opener, a dict `=`, or another
    /// separator.
    fn separator_if_needed(&mut self) -> usize {
        if self.len > ARGS_OFFSET
            && self.buf[self.len - 1] != LIST_START
            && self.buf[self.len - 1] != DICT_START
            && self.buf[self.len - 1] != DICT_KV_SEP
            && self.buf[self.len - 1] != ARG_SEP
        {
            self.write_raw_byte(ARG_SEP)
        } else {
            0
        }
    }

    /// Append a value argument, emitting a separator first if needed.
    ///
    /// Returns the number of frame bytes written, or 0 on failure, in which
    /// case the message is left exactly as it was.
    pub fn append<T: Encode>(&mut self, val: T) -> usize {
        self.append_with_sig_figs(val, fmt::DEFAULT_SIG_FIGS)
    }

    /// [`Msg::append`] with explicit significant figures for real values.
    pub fn append_with_sig_figs<T: Encode>(&mut self, val: T, sig_figs: u8) -> usize {
        let orig_len = self.len;
        self.separator_if_needed();
        let n = val.encode_into(&mut self.buf[self.len..MAX_FRAME_END_OFFSET], sig_figs);
        if n == 0 {
            return self.rollback(orig_len);
        }
        self.len += n;
        self.len - orig_len
    }

    /// Append a None/NULL/nil argument, represented by `N`.
    pub fn append_none(&mut self) -> usize {
        let orig_len = self.len;
        self.separator_if_needed();
        if self.write_raw_byte(b'N') == 0 {
            return self.rollback(orig_len);
        }
        self.len - orig_len
    }

    /// Append a whole list argument, e.g. `[1,2,3]`.
    pub fn append_list<T: Encode>(&mut self, items: &[T]) -> usize {
        let orig_len = self.len;
        self.separator_if_needed();
        let n = fmt::format_list(
            &mut self.buf[self.len..MAX_FRAME_END_OFFSET],
            items,
            fmt::DEFAULT_SIG_FIGS,
        );
        if n == 0 {
            return self.rollback(orig_len);
        }
        self.len += n;
        self.len - orig_len
    }

    /// Append a list start character `[`.
    pub fn append_list_start(&mut self) -> usize {
        let orig_len = self.len;
        self.separator_if_needed();
        if self.write_raw_byte(LIST_START) == 0 {
            return self.rollback(orig_len);
        }
        self.len - orig_len
    }

    /// Append a list end character `]`.
    pub fn append_list_end(&mut self) -> usize {
        self.write_raw_byte(LIST_END)
    }

    /// Append a dict start character `{`.
    pub fn append_dict_start(&mut self) -> usize {
        let orig_len = self.len;
        self.separator_if_needed();
        if self.write_raw_byte(DICT_START) == 0 {
            return self.rollback(orig_len);
        }
        self.len - orig_len
    }

    /// Append a dict end character `}`.
    pub fn append_dict_end(&mut self) -> usize {
        self.write_raw_byte(DICT_END)
    }

    /// Append a dictionary key and its `=`, separator first if needed.
    ///
    /// Follow with an `append` call for the key's value.
    pub fn append_dict_key(&mut self, key: &str) -> usize {
        let orig_len = self.len;
        self.separator_if_needed();
        if self.write_raw(key.as_bytes()) == 0 || self.write_raw_byte(DICT_KV_SEP) == 0 {
            return self.rollback(orig_len);
        }
        self.len - orig_len
    }

    /// Append a `key=value` pair to a dictionary.
    pub fn append_dict_key_value<T: Encode>(&mut self, key: &str, val: T) -> usize {
        let orig_len = self.len;
        if self.append_dict_key(key) == 0 || self.append(val) == 0 {
            return self.rollback(orig_len);
        }
        self.len - orig_len
    }

    /// A borrowed read-only view of the frame built so far.
    pub fn as_view(&self) -> MsgView<'_> {
        MsgView { frame: &self.buf[..self.len] }
    }

    /// The frame bytes built so far.
    #[inline]
    pub fn frame(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Frame length in bytes.
    #[inline]
    pub fn length(&self) -> usize {
        self.len
    }

    /// The 4-byte opcode (command + flag).
    #[inline]
    pub fn opcode(&self) -> &[u8] {
        self.as_view().opcode()
    }

    /// The 3-byte command.
    #[inline]
    pub fn command(&self) -> &[u8] {
        self.as_view().command()
    }

    /// The flag byte.
    #[inline]
    pub fn flag(&self) -> u8 {
        self.as_view().flag()
    }

    /// The 2-byte token.
    #[inline]
    pub fn token(&self) -> &[u8] {
        self.as_view().token()
    }

    /// The args region.
    #[inline]
    pub fn args(&self) -> &[u8] {
        self.as_view().args()
    }

    /// Number of bytes in the args region.
    #[inline]
    pub fn args_len(&self) -> usize {
        self.as_view().args_len()
    }

    /// Whether this message has the given 4-character opcode.
    #[inline]
    pub fn is_opcode(&self, opcode: &str) -> bool {
        self.as_view().is_opcode(opcode)
    }

    /// Whether this message has the given 3-character command.
    #[inline]
    pub fn is_command(&self, command: &str) -> bool {
        self.as_view().is_command(command)
    }
}

impl Default for Msg {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Msg {
    fn eq(&self, other: &Self) -> bool {
        self.frame() == other.frame()
    }
}

impl Eq for Msg {}

impl std::fmt::Debug for Msg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Msg")
            .field("frame", &String::from_utf8_lossy(self.frame()))
            .finish()
    }
}

impl std::fmt::Display for Msg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.frame()))
    }
}
