//! Rewindable typed parsing over a frame's args region.
//!
//! [`ArgParser`] is a small plain-data record (a slice plus three flags), so
//! snapshotting it is a cheap copy. Every `parse_*` method either succeeds
//! and advances, or fails and leaves the parser bit-for-bit unchanged. That
//! rewind contract lets callers speculate:
//!
//! ```
//! use oatmeal::protocol::ArgParser;
//!
//! let mut parser = ArgParser::new(b"300");
//! // Doesn't fit in a u8; the parser is untouched, so try a wider type.
//! assert_eq!(parser.parse_arg::<u8>(), None);
//! assert_eq!(parser.parse_arg::<u16>(), Some(300));
//! assert!(parser.finished());
//! ```
//!
//! Parsing is pure validation: no allocation, no I/O, no logging.

use crate::protocol::fmt::{self, Decode, ARG_SEP, DICT_END, DICT_START, LIST_END, LIST_START};
use crate::protocol::message::MsgView;

/// A structurally-aware reader over one frame's args region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgParser<'a> {
    /// Unconsumed args bytes; parsing shrinks this from the front.
    args: &'a [u8],
    /// The next value must be preceded by a separator.
    need_sep: bool,
    /// At least one value has been consumed at the current nesting depth.
    args_parsed: bool,
    /// Open lists and dicts share one depth counter.
    list_depth: u8,
}

impl<'a> ArgParser<'a> {
    /// Start parsing an args byte region.
    pub fn new(args: &'a [u8]) -> Self {
        Self {
            args,
            need_sep: false,
            args_parsed: false,
            list_depth: 0,
        }
    }

    /// Start parsing a message's args if it has the given opcode.
    pub fn for_opcode(msg: &MsgView<'a>, opcode: &str) -> Option<Self> {
        if !msg.is_opcode(opcode) {
            return None;
        }
        Some(Self::new(msg.args()))
    }

    /// Number of unconsumed bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.args.len()
    }

    /// Whether we reached the end of a well-formed argument string.
    ///
    /// True when no bytes remain, no list or dict is open, and the parse
    /// didn't stop directly after a separator. An untouched parser over
    /// empty args is finished, which is the correct reading of "no args".
    pub fn finished(&self) -> bool {
        self.args.is_empty() && self.list_depth == 0 && (!self.args_parsed || self.need_sep)
    }

    #[inline]
    fn chomp(&mut self, n: usize) {
        self.args = &self.args[n..];
    }

    /// Whether a value may start here, consuming a pending separator if one
    /// is due and present.
    fn able_to_parse_next(&self) -> bool {
        !self.need_sep || self.args.first() == Some(&ARG_SEP)
    }

    /// Parse a separator character `,`.
    pub fn parse_sep(&mut self) -> bool {
        if self.args.is_empty() || !self.need_sep {
            return false;
        }
        if self.args[0] == ARG_SEP {
            self.chomp(1);
            self.need_sep = false;
            true
        } else {
            false
        }
    }

    /// Parse a fixed-size scalar argument (integer, real or boolean).
    pub fn parse_arg<T: Decode>(&mut self) -> Option<T> {
        if !self.able_to_parse_next() {
            return None;
        }
        let sep = self.need_sep as usize;
        let (val, n) = T::decode_from(&self.args[sep..])?;
        self.chomp(sep + n);
        self.args_parsed = true;
        self.need_sep = true;
        Some(val)
    }

    /// Parse a string argument into `dst`, returning its decoded length.
    pub fn parse_str(&mut self, dst: &mut [u8]) -> Option<usize> {
        if !self.able_to_parse_next() {
            return None;
        }
        let sep = self.need_sep as usize;
        let (consumed, written) = fmt::parse_str(dst, &self.args[sep..])?;
        self.chomp(sep + consumed);
        self.args_parsed = true;
        self.need_sep = true;
        Some(written)
    }

    /// Parse a bytes argument (`0"..."`) into `dst`, returning its length.
    pub fn parse_bytes(&mut self, dst: &mut [u8]) -> Option<usize> {
        if !self.able_to_parse_next() {
            return None;
        }
        let sep = self.need_sep as usize;
        let (consumed, written) = fmt::parse_bytes(dst, &self.args[sep..])?;
        self.chomp(sep + consumed);
        self.args_parsed = true;
        self.need_sep = true;
        Some(written)
    }

    /// Parse a null value `N`.
    pub fn parse_null(&mut self) -> bool {
        if !self.able_to_parse_next() {
            return false;
        }
        let sep = self.need_sep as usize;
        if !fmt::parse_null(&self.args[sep..]) {
            return false;
        }
        self.chomp(sep + 1);
        self.args_parsed = true;
        self.need_sep = true;
        true
    }

    fn parse_collection_start(&mut self, start_char: u8) -> bool {
        if !self.able_to_parse_next() {
            return false;
        }
        let sep = self.need_sep as usize;
        if self.args.len() < sep + 1 || self.args[sep] != start_char {
            return false;
        }
        self.chomp(sep + 1);
        self.list_depth += 1;
        // A fresh nesting level starts empty.
        self.args_parsed = false;
        self.need_sep = false;
        true
    }

    fn parse_collection_end(&mut self, end_char: u8) -> bool {
        // A value was expected after the last separator: closing now would
        // accept a trailing comma, e.g. `[1,2,]`.
        if self.args.is_empty() || (self.args_parsed && !self.need_sep) {
            return false;
        }
        if self.list_depth == 0 || self.args[0] != end_char {
            return false;
        }
        self.chomp(1);
        self.list_depth -= 1;
        // The completed collection counts as a value at the parent level.
        self.args_parsed = true;
        self.need_sep = true;
        true
    }

    /// Parse a list start character `[`, consuming a due separator first.
    pub fn parse_list_start(&mut self) -> bool {
        self.parse_collection_start(LIST_START)
    }

    /// Parse a list end character `]`.
    pub fn parse_list_end(&mut self) -> bool {
        self.parse_collection_end(LIST_END)
    }

    /// Parse a dict start character `{`, consuming a due separator first.
    pub fn parse_dict_start(&mut self) -> bool {
        self.parse_collection_start(DICT_START)
    }

    /// Parse a dict end character `}`.
    pub fn parse_dict_end(&mut self) -> bool {
        self.parse_collection_end(DICT_END)
    }

    /// Parse a dictionary key and its `=` sign, copying the key into `dst`.
    ///
    /// Returns the key length. After success no separator is expected: the
    /// `=` already bound the key to the value that must follow.
    pub fn parse_dict_key(&mut self, dst: &mut [u8]) -> Option<usize> {
        if !self.able_to_parse_next() {
            return None;
        }
        let sep = self.need_sep as usize;
        let n = fmt::parse_dict_key(dst, &self.args[sep..])?;
        // The value after '=' needs at least one byte.
        if self.args.len() < sep + n + 2 {
            return None;
        }
        self.chomp(sep + n + 1);
        self.args_parsed = true;
        self.need_sep = false;
        Some(n)
    }

    /// Parse a dictionary key and its scalar value as one unit.
    ///
    /// Returns the key length and the value; on any sub-failure the parser
    /// rewinds past both.
    pub fn parse_dict_key_value<T: Decode>(&mut self, key_dst: &mut [u8]) -> Option<(usize, T)> {
        let snapshot = *self;
        let key_len = self.parse_dict_key(key_dst)?;
        match self.parse_arg::<T>() {
            Some(val) => Some((key_len, val)),
            None => {
                *self = snapshot;
                None
            }
        }
    }

    /// Parse a dictionary key and its string value as one unit.
    ///
    /// Returns the key length and the decoded value length.
    pub fn parse_dict_key_str(
        &mut self,
        key_dst: &mut [u8],
        val_dst: &mut [u8],
    ) -> Option<(usize, usize)> {
        let snapshot = *self;
        let key_len = self.parse_dict_key(key_dst)?;
        match self.parse_str(val_dst) {
            Some(val_len) => Some((key_len, val_len)),
            None => {
                *self = snapshot;
                None
            }
        }
    }

    /// Parse a whole list of scalars into `dst`, returning the item count.
    ///
    /// Parses greedily until an item fails or `dst` is full, then requires
    /// the closing `]`. On failure the parser is unchanged; `dst` may still
    /// have been scribbled on.
    pub fn parse_list<T: Decode>(&mut self, dst: &mut [T]) -> Option<usize> {
        let mut attempt = *self;
        if attempt.need_sep && !attempt.parse_sep() {
            return None;
        }
        if !attempt.parse_list_start() {
            return None;
        }
        let mut n = 0;
        while n < dst.len() {
            match attempt.parse_arg::<T>() {
                Some(val) => {
                    dst[n] = val;
                    n += 1;
                }
                None => break,
            }
        }
        if !attempt.parse_list_end() {
            return None;
        }
        *self = attempt;
        Some(n)
    }

    /// Parse a whole list of strings, one destination buffer per item.
    ///
    /// `lens[i]` receives the decoded length of item `i`. Returns the item
    /// count, capped by the shorter of `bufs` and `lens`.
    pub fn parse_list_of_strs(
        &mut self,
        bufs: &mut [&mut [u8]],
        lens: &mut [usize],
    ) -> Option<usize> {
        let mut attempt = *self;
        if attempt.need_sep && !attempt.parse_sep() {
            return None;
        }
        if !attempt.parse_list_start() {
            return None;
        }
        let mut n = 0;
        for (buf, len_slot) in bufs.iter_mut().zip(lens.iter_mut()) {
            match attempt.parse_str(buf) {
                Some(len) => {
                    *len_slot = len;
                    n += 1;
                }
                None => break,
            }
        }
        if !attempt.parse_list_end() {
            return None;
        }
        *self = attempt;
        Some(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Consume one value of any kind, recursing into collections.
    ///
    /// Not rewind-safe itself; only for whole-args accept/reject checks.
    fn parse_value(p: &mut ArgParser<'_>) -> bool {
        let mut buf = [0u8; 64];
        if p.parse_bytes(&mut buf).is_some() {
            return true;
        }
        if p.parse_str(&mut buf).is_some() {
            return true;
        }
        if p.parse_arg::<bool>().is_some() {
            return true;
        }
        if p.parse_null() {
            return true;
        }
        if p.parse_arg::<f64>().is_some() {
            return true;
        }
        if p.parse_list_start() {
            while parse_value(p) {}
            return p.parse_list_end();
        }
        if p.parse_dict_start() {
            loop {
                let mut key = [0u8; 32];
                if p.parse_dict_key(&mut key).is_none() {
                    break;
                }
                if !parse_value(p) {
                    return false;
                }
            }
            return p.parse_dict_end();
        }
        false
    }

    fn accepts(args: &[u8]) -> bool {
        let mut p = ArgParser::new(args);
        while parse_value(&mut p) {}
        p.finished()
    }

    #[test]
    fn test_accepts_well_formed_args() {
        for args in [
            &b""[..],
            b"1,2",
            b"-5",
            b"1.5,2",
            b"T,F,N",
            b"\"hi\",0\"\\0\"",
            b"[]",
            b"[1,2]",
            b"[[1],[2,3]]",
            b"{}",
            b"{a=1,b_2=\"x\"}",
            b"{a=[1,2]}",
            b"1,[2,{k=3}],4",
        ] {
            assert!(accepts(args), "should accept {:?}", String::from_utf8_lossy(args));
        }
    }

    #[test]
    fn test_rejects_malformed_args() {
        for args in [
            &b"]"[..],
            b"[",
            b"[,]",
            b"[,2]",
            b"[4,5,]",
            b"[1,2]]",
            b"1,,3",
            b",]",
            b",",
            b"{",
            b"}",
            b"{123}",
            b"{a=1,1}",
            b"{,a=1}",
            b"{\"a\"=1}",
            b"{a=}",
            b"1,",
        ] {
            assert!(!accepts(args), "should reject {:?}", String::from_utf8_lossy(args));
        }
    }

    #[test]
    fn test_scalars_with_separators() {
        let mut p = ArgParser::new(b"123,T,99.9");
        assert_eq!(p.remaining(), 10);
        assert_eq!(p.parse_arg::<i32>(), Some(123));
        assert_eq!(p.parse_arg::<bool>(), Some(true));
        assert_eq!(p.parse_arg::<f64>(), Some(99.9));
        assert_eq!(p.remaining(), 0);
        assert!(p.finished());
    }

    #[test]
    fn test_rewind_on_failure_is_bit_exact() {
        let mut p = ArgParser::new(b"1,[2,x]");
        assert_eq!(p.parse_arg::<i32>(), Some(1));

        let snapshot = p;
        assert_eq!(p.parse_arg::<i32>(), None);
        assert_eq!(p, snapshot);
        let mut buf = [0u8; 8];
        assert_eq!(p.parse_str(&mut buf), None);
        assert_eq!(p, snapshot);
        assert!(!p.parse_null());
        assert_eq!(p, snapshot);
        assert!(!p.parse_dict_start());
        assert_eq!(p, snapshot);
        assert!(!p.parse_list_end());
        assert_eq!(p, snapshot);
        // List parse fails on the inner 'x' after consuming '[2,'.
        let mut items = [0i32; 4];
        assert_eq!(p.parse_list(&mut items), None);
        assert_eq!(p, snapshot);
        assert_eq!(p.parse_dict_key_value::<i32>(&mut buf), None);
        assert_eq!(p, snapshot);
    }

    #[test]
    fn test_speculative_widening() {
        let mut p = ArgParser::new(b"-300");
        assert_eq!(p.parse_arg::<u8>(), None);
        assert_eq!(p.parse_arg::<i8>(), None);
        assert_eq!(p.parse_arg::<i16>(), Some(-300));
        assert!(p.finished());
    }

    #[test]
    fn test_nested_collections() {
        let mut p = ArgParser::new(b"[1,[2,3]],{k=[4]}");
        assert!(p.parse_list_start());
        assert_eq!(p.parse_arg::<i32>(), Some(1));
        assert!(p.parse_list_start());
        assert_eq!(p.parse_arg::<i32>(), Some(2));
        assert_eq!(p.parse_arg::<i32>(), Some(3));
        assert!(p.parse_list_end());
        assert!(p.parse_list_end());
        assert!(p.parse_dict_start());
        let mut key = [0u8; 8];
        assert_eq!(p.parse_dict_key(&mut key), Some(1));
        assert_eq!(&key[..1], b"k");
        let mut items = [0i32; 2];
        assert_eq!(p.parse_list(&mut items), Some(1));
        assert_eq!(items[0], 4);
        assert!(p.parse_dict_end());
        assert!(p.finished());
    }

    #[test]
    fn test_dict_key_value_pairs() {
        let mut p = ArgParser::new(b"{a=5.1,b=\"hi\"}");
        assert!(p.parse_dict_start());
        let mut key = [0u8; 16];
        let (klen, val) = p.parse_dict_key_value::<f64>(&mut key).unwrap();
        assert_eq!(&key[..klen], b"a");
        assert_eq!(val, 5.1);
        let mut sval = [0u8; 16];
        let (klen, vlen) = p.parse_dict_key_str(&mut key, &mut sval).unwrap();
        assert_eq!(&key[..klen], b"b");
        assert_eq!(&sval[..vlen], b"hi");
        assert!(p.parse_dict_end());
        assert!(p.finished());
    }

    #[test]
    fn test_parse_list_whole() {
        let mut p = ArgParser::new(b"101,[0,42]");
        assert_eq!(p.parse_arg::<i32>(), Some(101));
        let mut items = [0i32; 4];
        assert_eq!(p.parse_list(&mut items), Some(2));
        assert_eq!(&items[..2], &[0, 42]);
        assert!(p.finished());
    }

    #[test]
    fn test_parse_list_rejects_overflow_and_trailing_sep() {
        // More items than fit in dst: the closing ']' is never reached.
        let mut p = ArgParser::new(b"[1,2,3]");
        let mut items = [0i32; 2];
        let snapshot = p;
        assert_eq!(p.parse_list(&mut items), None);
        assert_eq!(p, snapshot);

        let mut p = ArgParser::new(b"[1,2,]");
        let mut items = [0i32; 4];
        assert_eq!(p.parse_list(&mut items), None);
    }

    #[test]
    fn test_parse_list_of_strs() {
        let mut p = ArgParser::new(b"[\"ab\",\"c\"]");
        let mut buf_a = [0u8; 8];
        let mut buf_b = [0u8; 8];
        let mut lens = [0usize; 2];
        {
            let mut bufs: [&mut [u8]; 2] = [&mut buf_a, &mut buf_b];
            assert_eq!(p.parse_list_of_strs(&mut bufs, &mut lens), Some(2));
        }
        assert_eq!(&buf_a[..lens[0]], b"ab");
        assert_eq!(&buf_b[..lens[1]], b"c");
        assert!(p.finished());
    }

    #[test]
    fn test_empty_args_are_finished_without_parsing() {
        let p = ArgParser::new(b"");
        assert!(p.finished());

        // But leftover bytes mean we're not done.
        let p = ArgParser::new(b"1");
        assert!(!p.finished());
    }

    #[test]
    fn test_strings_with_escapes() {
        let mut p = ArgParser::new(b"\"a\\\\b\\(c\\)d\\n\"");
        let mut buf = [0u8; 16];
        let n = p.parse_str(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"a\\b<c>d\n");
        assert!(p.finished());
    }

    #[test]
    fn test_bytes_argument() {
        let mut p = ArgParser::new(b"0\"\\0\\(\\)\",1");
        let mut buf = [0u8; 16];
        let n = p.parse_bytes(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x00, b'<', b'>']);
        assert_eq!(p.parse_arg::<i32>(), Some(1));
        assert!(p.finished());
    }

    #[test]
    fn test_for_opcode_filters_messages() {
        use crate::protocol::message::Msg;

        let mut msg = Msg::new();
        msg.start("HRT", b'R', "01");
        msg.append(true);
        msg.finish();

        let view = msg.as_view();
        assert!(ArgParser::for_opcode(&view, "DISR").is_none());
        let mut p = ArgParser::for_opcode(&view, "HRTR").unwrap();
        assert_eq!(p.parse_arg::<bool>(), Some(true));
        assert!(p.finished());
    }
}
