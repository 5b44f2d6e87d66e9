//! Port: the receive state machine and send paths over a transport.
//!
//! Receiving is non-blocking and resilient: bytes are ingested as they
//! arrive, partial frames survive across calls, and corruption of any kind
//! bumps a [`Stats`] counter and resynchronises at the next `<` instead of
//! surfacing an error. [`Port::recv`] hands out a borrowed [`MsgView`] into
//! the port's own buffer; the borrow ends before the next `recv` call, which
//! may overwrite those bytes.
//!
//! Sending comes in two shapes: whole-frame ([`Port::send`], from a built
//! [`Msg`]) and streaming ([`Port::stream_start`] .. [`Port::stream_finish`]),
//! which writes straight to the transport while tracking the running length
//! and checksum, so no message buffer is needed on the way out.

use tracing::trace;

use crate::error::Result;
use crate::protocol::fmt::{self, Encode, ARG_SEP, DICT_END, DICT_KV_SEP, DICT_START, END_BYTE, LIST_END, LIST_START, START_BYTE};
use crate::protocol::message::{Msg, MsgView, ARGS_OFFSET, TOKEN_LEN};
use crate::stats::Stats;
use crate::transport::Transport;
use crate::{MAX_MSG_LEN, MIN_MSG_LEN};

/// Receive buffer size: one max-length frame plus room for a little noise
/// ahead of it.
const RECV_BUF_LEN: usize = MAX_MSG_LEN + 8;

/// Where the byte scanner is within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    WaitingOnStart,
    WaitingOnEnd,
    WaitingOnLength,
    WaitingOnChecksum,
}

#[inline]
fn bump(counter: &mut usize) {
    *counter = counter.saturating_add(1);
}

/// One end of an Oatmeal link.
///
/// Owns the receive buffer, the scan state, the outgoing token sequence and
/// the streaming-send accumulators. A port is single-threaded; use one port
/// per peer and keep it on one thread.
pub struct Port<T> {
    transport: T,

    // Bytes read from the transport. buf[b_start..b_mid] has been scanned
    // and holds the frame in progress; buf[b_mid..b_end] is unscanned.
    buf: [u8; RECV_BUF_LEN],
    b_start: usize,
    b_mid: usize,
    b_end: usize,
    state: ScanState,

    token: usize,
    token_buf: [u8; TOKEN_LEN],

    // Streaming-send accumulators.
    out_len: usize,
    out_checksum: u8,
    out_last_byte: u8,

    /// Statistics about this port.
    pub stats: Stats,
}

impl<T: Transport> Port<T> {
    /// Create a port over a transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buf: [0; RECV_BUF_LEN],
            b_start: 0,
            b_mid: 0,
            b_end: 0,
            state: ScanState::WaitingOnStart,
            token: 0,
            token_buf: *b"aa",
            out_len: 0,
            out_checksum: 0,
            out_last_byte: 0,
            stats: Stats::default(),
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the port, returning its transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Advance the token sequence and return the new 2-character token.
    ///
    /// Tokens walk `[0-9A-Za-z]` pairs modulo 62*62, so a response can be
    /// correlated with its request long after other traffic intervened.
    pub fn next_token(&mut self) -> &str {
        const N: usize = fmt::TOKEN_CHARS.len();
        self.token = (self.token + 1) % (N * N);
        self.token_buf[0] = fmt::TOKEN_CHARS[self.token / N];
        self.token_buf[1] = fmt::TOKEN_CHARS[self.token % N];
        std::str::from_utf8(&self.token_buf).expect("token chars are ASCII")
    }

    /* ---------- Receiving ---------- */

    /// Read one complete valid frame, if the stream has produced one.
    ///
    /// Non-blocking: drains whatever the transport has buffered and returns
    /// `None` when no complete frame is available yet. Corrupted frames are
    /// dropped (with a counter bumped) and never returned. The view borrows
    /// this port's buffer and must be consumed or copied before the next
    /// `recv` call.
    pub fn recv(&mut self) -> Option<MsgView<'_>> {
        let (start, end) = self.recv_range()?;
        Some(MsgView::new(&self.buf[start..end]))
    }

    /// Like [`Port::recv`], but copies the frame into an owned [`Msg`].
    pub fn recv_owned(&mut self) -> Option<Msg> {
        let (start, end) = self.recv_range()?;
        Msg::from_frame(&self.buf[start..end])
    }

    fn recv_range(&mut self) -> Option<(usize, usize)> {
        // Scan what we already have before touching the transport.
        if let Some(range) = self.scan() {
            return Some(range);
        }
        while self.ingest() {
            if let Some(range) = self.scan() {
                return Some(range);
            }
        }
        None
    }

    /// Pull waiting bytes from the transport into the receive buffer.
    ///
    /// Compacts the buffer first so a whole frame always fits. Returns
    /// whether unscanned bytes are available.
    fn ingest(&mut self) -> bool {
        // A frame in progress that already spans the maximum length can
        // never complete; abandon it so a later '<' can restart.
        if self.b_mid - self.b_start >= MAX_MSG_LEN {
            self.b_start = self.b_mid;
            self.state = ScanState::WaitingOnStart;
        }
        if self.b_start == self.b_end {
            self.b_start = 0;
            self.b_mid = 0;
            self.b_end = 0;
        } else if self.b_start > 0 {
            self.buf.copy_within(self.b_start..self.b_end, 0);
            self.b_mid -= self.b_start;
            self.b_end -= self.b_start;
            self.b_start = 0;
        }
        let room = RECV_BUF_LEN - self.b_end;
        let want = room.min(self.transport.available());
        let got = self
            .transport
            .read(&mut self.buf[self.b_end..self.b_end + want]);
        self.b_end += got;
        self.stats.bytes_read = self.stats.bytes_read.saturating_add(got);
        self.b_mid < self.b_end
    }

    /// Scan unprocessed bytes for a complete frame.
    ///
    /// Advances one byte at a time through the scan states. A NUL resets the
    /// scan; a `<` starts a frame in every state (flagging a missing end
    /// byte if one was in progress). Returns the byte range of a validated
    /// frame within the receive buffer.
    fn scan(&mut self) -> Option<(usize, usize)> {
        while self.b_mid < self.b_end {
            let byte = self.buf[self.b_mid];
            if byte == 0 {
                self.b_start = self.b_mid;
                self.state = ScanState::WaitingOnStart;
                bump(&mut self.stats.illegal_character);
                trace!("NUL byte in stream, dropping frame in progress");
            } else if byte == START_BYTE {
                if self.state != ScanState::WaitingOnStart {
                    bump(&mut self.stats.missing_end_byte);
                    trace!("frame restarted by '<' before previous frame ended");
                }
                self.b_start = self.b_mid;
                self.state = ScanState::WaitingOnEnd;
            } else if self.state == ScanState::WaitingOnStart {
                // Inter-frame noise is discarded; a stray '>' is worth
                // counting because it usually means we missed a '<'.
                self.b_start = self.b_mid;
                if byte == END_BYTE {
                    bump(&mut self.stats.missing_start_byte);
                }
            } else if self.state == ScanState::WaitingOnEnd {
                if byte == END_BYTE {
                    self.state = ScanState::WaitingOnLength;
                }
            } else if self.state == ScanState::WaitingOnLength {
                // Any byte is accepted as the length check; it is verified
                // once the whole candidate is assembled.
                self.state = ScanState::WaitingOnChecksum;
            } else {
                // WaitingOnChecksum: the candidate frame is complete.
                let start = self.b_start;
                let n = self.b_mid + 1 - start;
                self.b_start = self.b_mid + 1;
                self.state = ScanState::WaitingOnStart;
                if n < MIN_MSG_LEN {
                    bump(&mut self.stats.frame_too_short);
                    trace!(len = n, "dropping frame: too short");
                } else if n > MAX_MSG_LEN {
                    bump(&mut self.stats.frame_too_long);
                    trace!(len = n, "dropping frame: too long");
                } else if !MsgView::validate_frame(&self.buf[start..start + n]) {
                    bump(&mut self.stats.bad_checksums);
                    trace!(len = n, "dropping frame: bad check bytes");
                } else {
                    bump(&mut self.stats.good_frames);
                    self.b_mid += 1;
                    return Some((start, start + n));
                }
            }
            self.b_mid += 1;
        }
        None
    }

    /* ---------- Whole-frame sending ---------- */

    /// Write raw frame bytes to the transport, followed by a newline.
    ///
    /// The newline is a frame separator for line-oriented tooling; it is not
    /// part of the frame and the receiver discards it as inter-frame noise.
    pub fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.transport.write(frame)?;
        self.transport.write(b"\n")?;
        bump(&mut self.stats.frames_written);
        Ok(())
    }

    /// Send a message over the port.
    pub fn send(&mut self, msg: &MsgView<'_>) -> Result<()> {
        self.send_frame(msg.frame())
    }

    /// Build and send an argument-less response echoing a message's command
    /// and token, with the given flag.
    pub fn send_response(&mut self, msg: &MsgView<'_>, flag: u8) -> Result<()> {
        let mut resp = Msg::new();
        resp.start_bytes(msg.command(), flag, msg.token());
        resp.finish();
        self.send(&resp.as_view())
    }

    /// Send an 'ack' response to a message.
    pub fn send_ack(&mut self, msg: &MsgView<'_>) -> Result<()> {
        self.send_response(msg, b'A')
    }

    /// Send a 'done' response to a message.
    pub fn send_done(&mut self, msg: &MsgView<'_>) -> Result<()> {
        self.send_response(msg, b'D')
    }

    /// Send a 'failed' response to a message.
    pub fn send_failed(&mut self, msg: &MsgView<'_>) -> Result<()> {
        self.send_response(msg, b'F')
    }

    /* ---------- Streaming sending ---------- */

    /// Begin streaming a frame straight to the transport.
    ///
    /// The streamed bytes are identical to what a [`Msg`] would build, but
    /// nothing is buffered: length and checksum accumulate as bytes go out.
    /// Streaming does not enforce the maximum frame length; the receiver
    /// will drop a frame that grew past its maximum length.
    pub fn stream_start(&mut self, cmd: &str, flag: u8, token: &str) -> Result<usize> {
        self.out_len = 0;
        self.out_checksum = 0;
        let mut n = self.stream_write(&[START_BYTE])?;
        n += self.stream_write(cmd.as_bytes())?;
        n += self.stream_write(&[flag])?;
        n += self.stream_write(token.as_bytes())?;
        Ok(n)
    }

    /// Stream raw bytes, folding them into the running checksum.
    pub fn stream_write(&mut self, bytes: &[u8]) -> Result<usize> {
        if bytes.is_empty() {
            return Ok(0);
        }
        for &b in bytes {
            self.out_checksum = fmt::checksum_step(self.out_checksum, b);
        }
        self.out_len += bytes.len();
        self.out_last_byte = bytes[bytes.len() - 1];
        self.transport.write(bytes)?;
        Ok(bytes.len())
    }

    /// Stream bytes through the escape encoding, as part of a string or
    /// bytes argument body.
    pub fn stream_write_encoded(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut n = 0;
        for &b in bytes {
            n += match fmt::escape_for(b) {
                Some(esc) => self.stream_write(&[b'\\', esc])?,
                None => self.stream_write(&[b])?,
            };
        }
        Ok(n)
    }

    /// Stream a value as 8 uppercase hex characters.
    pub fn stream_write_hex(&mut self, val: u32) -> Result<usize> {
        self.stream_write(&fmt::u32_to_hex(val))
    }

    fn stream_separator_if_needed(&mut self) -> Result<usize> {
        if self.out_len > ARGS_OFFSET
            && self.out_last_byte != LIST_START
            && self.out_last_byte != DICT_START
            && self.out_last_byte != DICT_KV_SEP
            && self.out_last_byte != ARG_SEP
        {
            self.stream_write(&[ARG_SEP])
        } else {
            Ok(0)
        }
    }

    /// Stream a scalar argument (integer, real or boolean), separator first
    /// if needed.
    pub fn stream_append<E: Encode>(&mut self, val: E) -> Result<usize> {
        self.stream_append_with_sig_figs(val, fmt::DEFAULT_SIG_FIGS)
    }

    /// [`Port::stream_append`] with explicit significant figures.
    pub fn stream_append_with_sig_figs<E: Encode>(&mut self, val: E, sig_figs: u8) -> Result<usize> {
        // Fixed-size scalars top out around 24 bytes (a double at 14 sig
        // figs with a 3-digit exponent); strings go through
        // stream_append_str instead.
        let mut tmp = [0u8; 32];
        let n = val.encode_into(&mut tmp, sig_figs);
        let mut written = self.stream_separator_if_needed()?;
        written += self.stream_write(&tmp[..n])?;
        Ok(written)
    }

    /// Stream a string argument of any length.
    pub fn stream_append_str(&mut self, val: &str) -> Result<usize> {
        let mut n = self.stream_separator_if_needed()?;
        n += self.stream_write(b"\"")?;
        n += self.stream_write_encoded(val.as_bytes())?;
        n += self.stream_write(b"\"")?;
        Ok(n)
    }

    /// Stream a bytes argument (`0"..."`) of any length.
    pub fn stream_append_bytes(&mut self, val: &[u8]) -> Result<usize> {
        let mut n = self.stream_separator_if_needed()?;
        n += self.stream_write(b"0\"")?;
        n += self.stream_write_encoded(val)?;
        n += self.stream_write(b"\"")?;
        Ok(n)
    }

    /// Stream a None/NULL/nil argument.
    pub fn stream_append_none(&mut self) -> Result<usize> {
        let mut n = self.stream_separator_if_needed()?;
        n += self.stream_write(b"N")?;
        Ok(n)
    }

    /// Stream a list start character `[`.
    pub fn stream_append_list_start(&mut self) -> Result<usize> {
        let mut n = self.stream_separator_if_needed()?;
        n += self.stream_write(&[LIST_START])?;
        Ok(n)
    }

    /// Stream a list end character `]`.
    pub fn stream_append_list_end(&mut self) -> Result<usize> {
        self.stream_write(&[LIST_END])
    }

    /// Stream a dict start character `{`.
    pub fn stream_append_dict_start(&mut self) -> Result<usize> {
        let mut n = self.stream_separator_if_needed()?;
        n += self.stream_write(&[DICT_START])?;
        Ok(n)
    }

    /// Stream a dict end character `}`.
    pub fn stream_append_dict_end(&mut self) -> Result<usize> {
        self.stream_write(&[DICT_END])
    }

    /// Stream a dictionary key and its `=`, separator first if needed.
    pub fn stream_append_dict_key(&mut self, key: &str) -> Result<usize> {
        let mut n = self.stream_separator_if_needed()?;
        n += self.stream_write(key.as_bytes())?;
        n += self.stream_write(&[DICT_KV_SEP])?;
        Ok(n)
    }

    /// Stream a `key=value` pair.
    pub fn stream_append_dict_key_value<E: Encode>(&mut self, key: &str, val: E) -> Result<usize> {
        let mut n = self.stream_append_dict_key(key)?;
        n += self.stream_append(val)?;
        Ok(n)
    }

    /// Finish the streamed frame: end byte, length check, checksum, newline.
    ///
    /// The length check byte covers the final frame length, so it is
    /// computed before the last three bytes go out; the checksum covers
    /// every frame byte up to and including the length check.
    pub fn stream_finish(&mut self) -> Result<usize> {
        let checklen = fmt::length_checksum(self.out_len + 3);
        self.stream_write(&[END_BYTE])?;
        self.stream_write(&[checklen])?;
        let checksum = fmt::checkbyte(self.out_checksum as u16);
        self.stream_write(&[checksum])?;
        self.transport.write(b"\n")?;
        bump(&mut self.stats.frames_written);
        Ok(3)
    }
}
