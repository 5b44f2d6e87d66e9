//! Wire format primitives: scalar encoding/decoding, escaping, check bytes.
//!
//! Everything here operates on caller-supplied byte regions and never
//! allocates. Formatting functions return the number of bytes written, or 0
//! when the value does not fit. Parsing functions consume a prefix of the
//! input and report how many bytes they used; `None` means the prefix is not
//! a valid encoding of the requested type.
//!
//! The [`Encode`] and [`Decode`] traits tie each supported scalar type to
//! its canonical wire representation, so `Msg::append` and
//! `ArgParser::parse_arg` can be generic over the argument kind.

/// Byte used to mark the start of a frame.
pub const START_BYTE: u8 = b'<';
/// Byte used to mark the end of a frame.
pub const END_BYTE: u8 = b'>';
/// Byte used to separate arguments in a frame.
pub const ARG_SEP: u8 = b',';
/// Byte used to mark the start of a list argument.
pub const LIST_START: u8 = b'[';
/// Byte used to mark the end of a list argument.
pub const LIST_END: u8 = b']';
/// Byte used to mark the start of a dict argument.
pub const DICT_START: u8 = b'{';
/// Byte used to mark the end of a dict argument.
pub const DICT_END: u8 = b'}';
/// Byte used to separate a dict key from its value, e.g. `=` in `key=value`.
pub const DICT_KV_SEP: u8 = b'=';

/// Multiplier folded into the length check byte.
pub const CHECKLEN_COEFF: u16 = 7;
/// Multiplier folded into the rolling checksum.
pub const CHECKSUM_COEFF: u8 = 31;

/// Characters used in tokens: the 62-character alphabet `[0-9A-Za-z]`.
pub const TOKEN_CHARS: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Default number of significant figures when formatting real numbers.
pub const DEFAULT_SIG_FIGS: u8 = 6;
/// Upper bound on significant figures; larger requests are clamped.
pub const MAX_SIG_FIGS: u8 = 14;

const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";

/// Convert a `u16` into a printable ASCII byte using the check-byte mapping.
///
/// The result is always in `33..=126` and is never the frame start or end
/// byte, so a check byte can never be confused with a frame delimiter.
pub fn checkbyte(v: u16) -> u8 {
    let mut v = (v % 92) + 33;
    if v >= START_BYTE as u16 {
        v += 1;
    }
    if v >= END_BYTE as u16 {
        v += 1;
    }
    v as u8
}

/// Calculate the length check byte for a frame of `len` total bytes.
pub fn length_checksum(len: usize) -> u8 {
    checkbyte((len as u16).wrapping_mul(CHECKLEN_COEFF))
}

/// Fold one byte into the rolling 8-bit checksum accumulator.
#[inline]
pub fn checksum_step(acc: u8, byte: u8) -> u8 {
    acc.wrapping_add(byte).wrapping_mul(CHECKSUM_COEFF)
}

/// Compute the checksum byte over `buf`.
///
/// Callers pass everything up to but excluding the checksum byte itself,
/// i.e. the first `n-1` bytes of an `n`-byte frame.
pub fn compute_checksum(buf: &[u8]) -> u8 {
    let mut acc: u8 = 0;
    for &b in buf {
        acc = checksum_step(acc, b);
    }
    checkbyte(acc as u16)
}

/// The second byte of the escape pair for `b`, if `b` must be escaped.
#[inline]
pub fn escape_for(b: u8) -> Option<u8> {
    match b {
        b'\\' => Some(b'\\'),
        b'"' => Some(b'"'),
        b'<' => Some(b'('),
        b'>' => Some(b')'),
        b'\n' => Some(b'n'),
        b'\r' => Some(b'r'),
        0 => Some(b'0'),
        _ => None,
    }
}

/// The raw byte represented by the escape sequence `\x`, if valid.
#[inline]
pub fn unescape_for(x: u8) -> Option<u8> {
    match x {
        b'\\' => Some(b'\\'),
        b'"' => Some(b'"'),
        b'(' => Some(b'<'),
        b')' => Some(b'>'),
        b'n' => Some(b'\n'),
        b'r' => Some(b'\r'),
        b'0' => Some(0),
        _ => None,
    }
}

/// Encode a byte run using the escape alphabet, without surrounding quotes.
///
/// Strings (UTF-8) and raw byte blobs share this encoding; only their quote
/// prefix differs. Returns the number of bytes written to `dst`, or 0 if the
/// encoded form does not fit. An empty `src` writes 0 bytes; callers that
/// need to distinguish that from failure check `src.is_empty()` themselves.
pub fn encode_bytes(dst: &mut [u8], src: &[u8]) -> usize {
    let mut di = 0;
    for &b in src {
        match escape_for(b) {
            Some(esc) => {
                if di + 2 > dst.len() {
                    return 0;
                }
                dst[di] = b'\\';
                dst[di + 1] = esc;
                di += 2;
            }
            None => {
                if di >= dst.len() {
                    return 0;
                }
                dst[di] = b;
                di += 1;
            }
        }
    }
    di
}

/// Decode a quoted, escaped byte run.
///
/// `src` must begin with `"`; decoding runs until the matching close quote.
/// Returns `(consumed, written)` where `consumed` counts source bytes
/// including both quotes. Fails on a missing close quote, an invalid escape
/// sequence, or a decoded payload larger than `dst`.
pub fn decode_bytes(dst: &mut [u8], src: &[u8]) -> Option<(usize, usize)> {
    if src.first() != Some(&b'"') {
        return None;
    }
    let mut si = 1;
    let mut di = 0;
    loop {
        if si >= src.len() {
            return None;
        }
        let b = src[si];
        if b == b'"' {
            return Some((si + 1, di));
        }
        let (raw, adv) = if b == b'\\' {
            if si + 1 >= src.len() {
                return None;
            }
            (unescape_for(src[si + 1])?, 2)
        } else {
            (b, 1)
        };
        if di >= dst.len() {
            return None;
        }
        dst[di] = raw;
        di += 1;
        si += adv;
    }
}

/// Format a UTF-8 string argument as `"..."` with escaping.
pub fn format_str(dst: &mut [u8], src: &str) -> usize {
    if dst.len() < 2 {
        return 0;
    }
    let end = dst.len() - 1;
    let n = encode_bytes(&mut dst[1..end], src.as_bytes());
    if n == 0 && !src.is_empty() {
        return 0;
    }
    dst[0] = b'"';
    dst[n + 1] = b'"';
    n + 2
}

/// Format a raw bytes argument as `0"..."` with escaping.
pub fn format_bytes(dst: &mut [u8], src: &[u8]) -> usize {
    if dst.len() < 3 {
        return 0;
    }
    let end = dst.len() - 1;
    let n = encode_bytes(&mut dst[2..end], src);
    if n == 0 && !src.is_empty() {
        return 0;
    }
    dst[0] = b'0';
    dst[1] = b'"';
    dst[n + 2] = b'"';
    n + 3
}

/// Format a missing value (None/NULL/nil), represented by `N`.
pub fn format_none(dst: &mut [u8]) -> usize {
    if dst.is_empty() {
        return 0;
    }
    dst[0] = b'N';
    1
}

/// Format a signed integer in decimal.
///
/// The first digit of a negative value is extracted with a negative modulo
/// before dividing, so the minimum value of every width (whose negation
/// overflows) formats correctly.
pub fn format_i64(dst: &mut [u8], val: i64) -> usize {
    let mut tmp = [0u8; 20];
    let mut i = 0;
    let mut v = val;
    let neg = v < 0;
    if v == 0 {
        tmp[i] = b'0';
        i += 1;
    }
    if v < 0 {
        tmp[i] = b'0' + (-(v % -10)) as u8;
        v /= -10;
        i += 1;
    }
    while v != 0 {
        tmp[i] = b'0' + (v % 10) as u8;
        v /= 10;
        i += 1;
    }
    if neg {
        tmp[i] = b'-';
        i += 1;
    }
    if i > dst.len() {
        return 0;
    }
    for (j, &b) in tmp[..i].iter().rev().enumerate() {
        dst[j] = b;
    }
    i
}

/// Format an unsigned integer in decimal.
pub fn format_u64(dst: &mut [u8], val: u64) -> usize {
    let mut tmp = [0u8; 20];
    let mut i = 0;
    let mut v = val;
    if v == 0 {
        tmp[i] = b'0';
        i += 1;
    }
    while v != 0 {
        tmp[i] = b'0' + (v % 10) as u8;
        v /= 10;
        i += 1;
    }
    if i > dst.len() {
        return 0;
    }
    for (j, &b) in tmp[..i].iter().rev().enumerate() {
        dst[j] = b;
    }
    i
}

fn strip_trailing_zeros(s: &str) -> &str {
    if !s.contains('.') {
        return s;
    }
    let s = s.trim_end_matches('0');
    s.strip_suffix('.').unwrap_or(s)
}

/// Format a real number with at most `sig_figs` significant figures.
///
/// Chooses between plain decimal and scientific notation the way printf's
/// `%g` does: scientific when the decimal exponent is below -4 or at least
/// `sig_figs`, plain decimal otherwise, with trailing zeros stripped either
/// way. Scientific output uses a lowercase `e` and a signed two-digit
/// exponent (`1.5e-07`).
pub fn format_real(dst: &mut [u8], val: f64, sig_figs: u8) -> usize {
    let p = sig_figs.clamp(1, MAX_SIG_FIGS) as usize;

    let copy_out = |dst: &mut [u8], s: &str| -> usize {
        if s.len() > dst.len() {
            return 0;
        }
        dst[..s.len()].copy_from_slice(s.as_bytes());
        s.len()
    };

    if val.is_nan() {
        return copy_out(dst, "nan");
    }
    if val.is_infinite() {
        return copy_out(dst, if val < 0.0 { "-inf" } else { "inf" });
    }

    // Round to p significant figures first; the rounded exponent decides
    // between decimal and scientific notation.
    let sci = format!("{:.*e}", p - 1, val);
    let epos = sci.find('e').expect("{:e} always emits an exponent");
    let exp: i32 = sci[epos + 1..].parse().expect("exponent is a decimal int");

    if exp < -4 || exp >= p as i32 {
        let mantissa = strip_trailing_zeros(&sci[..epos]);
        let out = format!(
            "{}e{}{:02}",
            mantissa,
            if exp < 0 { '-' } else { '+' },
            exp.abs()
        );
        copy_out(dst, &out)
    } else {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        let fixed = format!("{:.*}", decimals, val);
        copy_out(dst, strip_trailing_zeros(&fixed))
    }
}

/// Format `val` as 8 uppercase hex characters.
pub fn u32_to_hex(val: u32) -> [u8; 8] {
    let mut hex = [0u8; 8];
    for (i, h) in hex.iter_mut().enumerate() {
        *h = HEX_CHARS[((val >> (28 - i * 4)) & 0xf) as usize];
    }
    hex
}

/// Lex the longest real-number prefix of `src`.
///
/// Accepts an optional leading `-`, a mantissa with optional fraction, an
/// optional `e`/`E` exponent with sign, and the literals `inf` and `nan`
/// that the formatter can produce. Returns the prefix length, or 0 if no
/// real number starts here.
fn lex_real(src: &[u8]) -> usize {
    let mut i = 0;
    if src.first() == Some(&b'-') {
        i += 1;
    }
    if src[i..].starts_with(b"inf") || src[i..].starts_with(b"nan") {
        return i + 3;
    }
    let int_digits = src[i..].iter().take_while(|b| b.is_ascii_digit()).count();
    i += int_digits;
    let mut frac_digits = 0;
    if src.get(i) == Some(&b'.') {
        frac_digits = src[i + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
        i += 1 + frac_digits;
    }
    if int_digits + frac_digits == 0 {
        return 0;
    }
    if matches!(src.get(i), Some(&b'e') | Some(&b'E')) {
        let mut j = i + 1;
        if matches!(src.get(j), Some(&b'+') | Some(&b'-')) {
            j += 1;
        }
        let exp_digits = src[j..].iter().take_while(|b| b.is_ascii_digit()).count();
        if exp_digits > 0 {
            i = j + exp_digits;
        }
    }
    i
}

/// Parse a real number from the start of `src`.
pub fn parse_f64(src: &[u8]) -> Option<(f64, usize)> {
    let n = lex_real(src);
    if n == 0 {
        return None;
    }
    let s = std::str::from_utf8(&src[..n]).ok()?;
    let v: f64 = s.parse().ok()?;
    Some((v, n))
}

/// Parse a string argument into `dst`, undoing the escape encoding.
///
/// Returns `(consumed, written)` on success.
pub fn parse_str(dst: &mut [u8], src: &[u8]) -> Option<(usize, usize)> {
    decode_bytes(dst, src)
}

/// Parse a bytes argument encoded as `0"..."` into `dst`.
///
/// Returns `(consumed, written)` on success.
pub fn parse_bytes(dst: &mut [u8], src: &[u8]) -> Option<(usize, usize)> {
    if src.first() != Some(&b'0') {
        return None;
    }
    let (consumed, written) = decode_bytes(dst, &src[1..])?;
    Some((consumed + 1, written))
}

/// Parse a None/NULL/nil value, represented by `N`.
pub fn parse_null(src: &[u8]) -> bool {
    src.first() == Some(&b'N')
}

/// Whether `b` may appear in a dictionary key.
#[inline]
pub fn is_dict_key_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Parse a dictionary key from the start of `src`.
///
/// Keys match `[A-Za-z0-9_]+` and must be followed by `=`. The key is
/// copied into `dst` and its length returned; the `=` is left unconsumed.
pub fn parse_dict_key(dst: &mut [u8], src: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < src.len() && is_dict_key_byte(src[i]) {
        if i >= dst.len() {
            return None;
        }
        dst[i] = src[i];
        i += 1;
    }
    if i == 0 || src.get(i) != Some(&DICT_KV_SEP) {
        return None;
    }
    Some(i)
}

/// Whether `token` is a valid 2-character token.
///
/// Token characters may be any printable non-whitespace ASCII except the
/// frame delimiters `<` and `>`.
pub fn is_valid_token(token: &str) -> bool {
    token.len() == 2
        && token
            .bytes()
            .all(|b| (33..=126).contains(&b) && b != START_BYTE && b != END_BYTE)
}

/// Whether `opcode` is a valid 4-character opcode (command + flag).
pub fn is_valid_opcode(opcode: &str) -> bool {
    opcode.len() == 4
        && opcode
            .bytes()
            .all(|b| (33..=126).contains(&b) && b != START_BYTE && b != END_BYTE)
}

/// Whether `key` is a valid dictionary key (`[A-Za-z0-9_]+`).
pub fn is_valid_dict_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(is_dict_key_byte)
}

/// A value that can be encoded as a single frame argument.
///
/// `sig_figs` is only meaningful for real numbers; other implementations
/// ignore it, mirroring the formatting entry points.
pub trait Encode {
    /// Encode `self` into `dst`, returning bytes written or 0 on failure.
    fn encode_into(&self, dst: &mut [u8], sig_figs: u8) -> usize;
}

/// A fixed-size scalar that can be decoded from the front of an args region.
pub trait Decode: Sized {
    /// Decode a value from the start of `src`.
    ///
    /// Returns the value and the number of bytes consumed, or `None` if the
    /// prefix is not a valid encoding (including out-of-range integers).
    fn decode_from(src: &[u8]) -> Option<(Self, usize)>;
}

macro_rules! impl_signed {
    ($($t:ty),*) => {$(
        impl Encode for $t {
            fn encode_into(&self, dst: &mut [u8], _sig_figs: u8) -> usize {
                format_i64(dst, *self as i64)
            }
        }

        impl Decode for $t {
            fn decode_from(src: &[u8]) -> Option<(Self, usize)> {
                let neg = src.first() == Some(&b'-');
                let start = neg as usize;
                let mut i = start;
                let mut mag: u128 = 0;
                while i < src.len() && src[i].is_ascii_digit() {
                    mag = mag.checked_mul(10)?.checked_add((src[i] - b'0') as u128)?;
                    if mag > <$t>::MAX as u128 + 1 {
                        return None;
                    }
                    i += 1;
                }
                if i == start {
                    return None;
                }
                let val = if neg {
                    (mag as i128).wrapping_neg() as $t
                } else {
                    if mag > <$t>::MAX as u128 {
                        return None;
                    }
                    mag as $t
                };
                Some((val, i))
            }
        }
    )*}
}

macro_rules! impl_unsigned {
    ($($t:ty),*) => {$(
        impl Encode for $t {
            fn encode_into(&self, dst: &mut [u8], _sig_figs: u8) -> usize {
                format_u64(dst, *self as u64)
            }
        }

        impl Decode for $t {
            fn decode_from(src: &[u8]) -> Option<(Self, usize)> {
                let mut i = 0;
                let mut mag: u128 = 0;
                while i < src.len() && src[i].is_ascii_digit() {
                    mag = mag.checked_mul(10)?.checked_add((src[i] - b'0') as u128)?;
                    if mag > <$t>::MAX as u128 {
                        return None;
                    }
                    i += 1;
                }
                if i == 0 {
                    return None;
                }
                Some((mag as $t, i))
            }
        }
    )*}
}

impl_signed!(i8, i16, i32, i64);
impl_unsigned!(u8, u16, u32, u64);

impl Encode for f64 {
    fn encode_into(&self, dst: &mut [u8], sig_figs: u8) -> usize {
        format_real(dst, *self, sig_figs)
    }
}

impl Decode for f64 {
    fn decode_from(src: &[u8]) -> Option<(Self, usize)> {
        parse_f64(src)
    }
}

impl Encode for f32 {
    fn encode_into(&self, dst: &mut [u8], sig_figs: u8) -> usize {
        format_real(dst, *self as f64, sig_figs)
    }
}

impl Decode for f32 {
    fn decode_from(src: &[u8]) -> Option<(Self, usize)> {
        let (v, n) = parse_f64(src)?;
        if v.is_finite() && !(v as f32).is_finite() {
            return None;
        }
        Some((v as f32, n))
    }
}

impl Encode for bool {
    fn encode_into(&self, dst: &mut [u8], _sig_figs: u8) -> usize {
        if dst.is_empty() {
            return 0;
        }
        dst[0] = if *self { b'T' } else { b'F' };
        1
    }
}

impl Decode for bool {
    fn decode_from(src: &[u8]) -> Option<(Self, usize)> {
        match src.first()?.to_ascii_uppercase() {
            b'T' => Some((true, 1)),
            b'F' => Some((false, 1)),
            _ => None,
        }
    }
}

impl Encode for &str {
    fn encode_into(&self, dst: &mut [u8], _sig_figs: u8) -> usize {
        format_str(dst, self)
    }
}

impl Encode for &[u8] {
    fn encode_into(&self, dst: &mut [u8], _sig_figs: u8) -> usize {
        format_bytes(dst, self)
    }
}

/// Format a slice of values as a list argument, e.g. `[1,2,3]`.
pub fn format_list<T: Encode>(dst: &mut [u8], items: &[T], sig_figs: u8) -> usize {
    if dst.is_empty() {
        return 0;
    }
    dst[0] = LIST_START;
    let mut di = 1;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            if di >= dst.len() {
                return 0;
            }
            dst[di] = ARG_SEP;
            di += 1;
        }
        let n = item.encode_into(&mut dst[di..], sig_figs);
        if n == 0 {
            return 0;
        }
        di += n;
    }
    if di >= dst.len() {
        return 0;
    }
    dst[di] = LIST_END;
    di + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt<T: Encode>(v: T) -> String {
        let mut buf = [0u8; 64];
        let n = v.encode_into(&mut buf, DEFAULT_SIG_FIGS);
        assert!(n > 0);
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    fn fmt_sig<T: Encode>(v: T, sig_figs: u8) -> String {
        let mut buf = [0u8; 64];
        let n = v.encode_into(&mut buf, sig_figs);
        assert!(n > 0);
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    #[test]
    fn test_checkbyte_is_printable_and_avoids_delimiters() {
        for v in 0..=u16::MAX {
            let b = checkbyte(v);
            assert!((33..=126).contains(&b), "not printable: {b:#04x}");
            assert_ne!(b, START_BYTE);
            assert_ne!(b, END_BYTE);
        }
    }

    #[test]
    fn test_length_checksum_reference_values() {
        // <DISRXY>i_ has length 10 and length check byte 'i'.
        assert_eq!(length_checksum(10), b'i');
    }

    #[test]
    fn test_compute_checksum_reference_values() {
        // Checksum covers everything up to and including the length check.
        assert_eq!(compute_checksum(b"<DISRXY>i"), b'_');
        assert_eq!(compute_checksum(b"<LOLROh123,T,99.9>S"), b'S');
    }

    #[test]
    fn test_format_ints_at_limits() {
        assert_eq!(fmt(0i8), "0");
        assert_eq!(fmt(i8::MIN), "-128");
        assert_eq!(fmt(i8::MAX), "127");
        assert_eq!(fmt(u8::MAX), "255");
        assert_eq!(fmt(i16::MIN), "-32768");
        assert_eq!(fmt(i32::MIN), "-2147483648");
        assert_eq!(fmt(i64::MIN), "-9223372036854775808");
        assert_eq!(fmt(i64::MAX), "9223372036854775807");
        assert_eq!(fmt(u64::MAX), "18446744073709551615");
    }

    #[test]
    fn test_parse_ints_round_trip_at_limits() {
        macro_rules! round_trip {
            ($($t:ty),*) => {$(
                for v in [<$t>::MIN, <$t>::MIN.wrapping_add(1), 0, <$t>::MAX - 1, <$t>::MAX] {
                    let s = fmt(v);
                    let (parsed, n) = <$t>::decode_from(s.as_bytes()).unwrap();
                    assert_eq!(parsed, v);
                    assert_eq!(n, s.len());
                }
            )*}
        }
        round_trip!(i8, u8, i16, u16, i32, u32, i64, u64);
    }

    #[test]
    fn test_parse_int_range_check() {
        assert!(i8::decode_from(b"128").is_none());
        assert_eq!(i8::decode_from(b"-128"), Some((-128i8, 4)));
        assert!(i8::decode_from(b"-129").is_none());
        assert!(u8::decode_from(b"256").is_none());
        assert!(u8::decode_from(b"-1").is_none());
        assert!(u64::decode_from(b"18446744073709551616").is_none());
    }

    #[test]
    fn test_parse_int_is_strict() {
        assert!(i32::decode_from(b"+5").is_none());
        assert!(i32::decode_from(b" 5").is_none());
        assert!(i32::decode_from(b"-").is_none());
        assert!(i32::decode_from(b"").is_none());
        // Prefix parsing stops at the first non-digit.
        assert_eq!(i32::decode_from(b"12,3"), Some((12, 2)));
    }

    #[test]
    fn test_format_reals() {
        assert_eq!(fmt_sig(1.23f64, 3), "1.23");
        assert_eq!(fmt_sig(99.9f64, 3), "99.9");
        assert_eq!(fmt(5.1f64), "5.1");
        assert_eq!(fmt(0.0f64), "0");
        assert_eq!(fmt(16.0f64), "16");
        assert_eq!(fmt(-2.5f64), "-2.5");
        assert_eq!(fmt(1234567.0f64), "1.23457e+06");
        assert_eq!(fmt(0.0000001f64), "1e-07");
        assert_eq!(fmt_sig(999.96f64, 4), "1000");
    }

    #[test]
    fn test_format_real_clamps_sig_figs() {
        // Requests above the cap fall back to 14 significant figures.
        assert_eq!(fmt_sig(1.0f64 / 3.0, 40), fmt_sig(1.0f64 / 3.0, 14));
        assert_eq!(fmt_sig(0.5f64, 0), "0.5");
    }

    #[test]
    fn test_parse_reals() {
        assert_eq!(parse_f64(b"1.23"), Some((1.23, 4)));
        assert_eq!(parse_f64(b"-0.5,"), Some((-0.5, 4)));
        assert_eq!(parse_f64(b"1e-07"), Some((1e-7, 5)));
        assert_eq!(parse_f64(b"1.23457e+06"), Some((1.23457e6, 11)));
        assert_eq!(parse_f64(b"5"), Some((5.0, 1)));
        assert!(parse_f64(b".").is_none());
        assert!(parse_f64(b"-").is_none());
        assert!(parse_f64(b"x1").is_none());
        // A bare 'e' with no exponent digits is left unconsumed.
        assert_eq!(parse_f64(b"2e"), Some((2.0, 1)));
    }

    #[test]
    fn test_parse_real_inf_nan() {
        let (v, n) = parse_f64(b"inf").unwrap();
        assert!(v.is_infinite() && v > 0.0);
        assert_eq!(n, 3);
        let (v, _) = parse_f64(b"-inf").unwrap();
        assert!(v.is_infinite() && v < 0.0);
        let (v, _) = parse_f64(b"nan").unwrap();
        assert!(v.is_nan());
    }

    #[test]
    fn test_f32_rejects_overflow_accepts_negatives() {
        assert!(f32::decode_from(b"1e200").is_none());
        let (v, _) = f32::decode_from(b"-1.5").unwrap();
        assert_eq!(v, -1.5f32);
    }

    #[test]
    fn test_real_round_trip_to_sig_figs() {
        for &v in &[0.1, -1.0 / 3.0, 1e-9, 2.5e12, 123.456, -99.25] {
            let s = fmt(v);
            let (parsed, n) = f64::decode_from(s.as_bytes()).unwrap();
            assert_eq!(n, s.len());
            let err = if v == 0.0 {
                parsed.abs()
            } else {
                ((parsed - v) / v).abs()
            };
            assert!(err < 1e-5, "{v} -> {s} -> {parsed}");
        }
    }

    #[test]
    fn test_bool_and_null() {
        assert_eq!(fmt(true), "T");
        assert_eq!(fmt(false), "F");
        assert_eq!(bool::decode_from(b"T"), Some((true, 1)));
        assert_eq!(bool::decode_from(b"f"), Some((false, 1)));
        assert!(bool::decode_from(b"x").is_none());
        assert!(parse_null(b"N"));
        assert!(!parse_null(b"x"));

        let mut buf = [0u8; 4];
        assert_eq!(format_none(&mut buf), 1);
        assert_eq!(buf[0], b'N');
    }

    #[test]
    fn test_escape_round_trip() {
        let raw: &[u8] = b"a\\b\"c<d>e\nf\rg\0h";
        let mut enc = [0u8; 64];
        let n = encode_bytes(&mut enc, raw);
        assert_eq!(&enc[..n], br#"a\\b\"c\(d\)e\nf\rg\0h"#);

        let mut quoted = Vec::from(&b"\""[..]);
        quoted.extend_from_slice(&enc[..n]);
        quoted.push(b'"');
        let mut dec = [0u8; 64];
        let (consumed, written) = decode_bytes(&mut dec, &quoted).unwrap();
        assert_eq!(consumed, quoted.len());
        assert_eq!(&dec[..written], raw);
    }

    #[test]
    fn test_encoded_runs_never_contain_delimiters() {
        let mut enc = [0u8; 64];
        let n = encode_bytes(&mut enc, b"<<>>\0");
        assert!(n > 0);
        assert!(!enc[..n].contains(&b'<'));
        assert!(!enc[..n].contains(&b'>'));
        assert!(!enc[..n].contains(&0));
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        let mut dec = [0u8; 16];
        // Missing open quote.
        assert!(decode_bytes(&mut dec, b"abc\"").is_none());
        // Missing close quote.
        assert!(decode_bytes(&mut dec, b"\"abc").is_none());
        // Invalid escape sequence.
        assert!(decode_bytes(&mut dec, b"\"\\x\"").is_none());
        // Truncated escape.
        assert!(decode_bytes(&mut dec, b"\"\\").is_none());
        // Destination too small.
        let mut tiny = [0u8; 2];
        assert!(decode_bytes(&mut tiny, b"\"abc\"").is_none());
    }

    #[test]
    fn test_format_str_and_parse_str() {
        let mut buf = [0u8; 16];
        let n = format_str(&mut buf, "Hi!");
        assert_eq!(&buf[..n], b"\"Hi!\"");

        let mut out = [0u8; 16];
        let (consumed, written) = parse_str(&mut out, b"\"Hi!\",rest").unwrap();
        assert_eq!(consumed, 5);
        assert_eq!(&out[..written], b"Hi!");

        let n = format_str(&mut buf, "");
        assert_eq!(&buf[..n], b"\"\"");
    }

    #[test]
    fn test_format_bytes_and_parse_bytes() {
        let mut buf = [0u8; 16];
        let n = format_bytes(&mut buf, &[0x00, 0x41]);
        assert_eq!(&buf[..n], b"0\"\\0A\"");

        let mut out = [0u8; 16];
        let (consumed, written) = parse_bytes(&mut out, &buf[..n]).unwrap();
        assert_eq!(consumed, n);
        assert_eq!(&out[..written], &[0x00, 0x41]);

        // A plain string is not a bytes argument.
        assert!(parse_bytes(&mut out, b"\"A\"").is_none());
    }

    #[test]
    fn test_format_fails_when_full() {
        let mut tiny = [0u8; 2];
        assert_eq!(format_str(&mut tiny, "hello"), 0);
        assert_eq!(format_i64(&mut tiny, 12345), 0);
        assert_eq!(format_real(&mut tiny, 1.2345, 6), 0);
        let mut empty = [0u8; 0];
        assert_eq!(format_none(&mut empty), 0);
    }

    #[test]
    fn test_dict_key() {
        let mut key = [0u8; 16];
        assert_eq!(parse_dict_key(&mut key, b"loop_ms=1"), Some(7));
        assert_eq!(&key[..7], b"loop_ms");
        // Key must be followed by '='.
        assert!(parse_dict_key(&mut key, b"loop_ms,").is_none());
        // Empty key.
        assert!(parse_dict_key(&mut key, b"=1").is_none());
        // Quoted keys are not keys.
        assert!(parse_dict_key(&mut key, b"\"a\"=1").is_none());
    }

    #[test]
    fn test_format_list() {
        let mut buf = [0u8; 32];
        let n = format_list(&mut buf, &[1i32, 2, 3], DEFAULT_SIG_FIGS);
        assert_eq!(&buf[..n], b"[1,2,3]");
        let n = format_list::<i32>(&mut buf, &[], DEFAULT_SIG_FIGS);
        assert_eq!(&buf[..n], b"[]");
    }

    #[test]
    fn test_u32_to_hex() {
        assert_eq!(&u32_to_hex(0xDEADBEEF), b"DEADBEEF");
        assert_eq!(&u32_to_hex(0x0000001A), b"0000001A");
    }

    #[test]
    fn test_validity_helpers() {
        assert!(is_valid_token("aa"));
        assert!(is_valid_token("Z9"));
        assert!(!is_valid_token("a"));
        assert!(!is_valid_token("a<"));
        assert!(!is_valid_token("a "));

        assert!(is_valid_opcode("DISR"));
        assert!(!is_valid_opcode("DIS"));
        assert!(!is_valid_opcode("DI<R"));

        assert!(is_valid_dict_key("avail_kb"));
        assert!(!is_valid_dict_key(""));
        assert!(!is_valid_dict_key("a-b"));
    }
}
