//! Statistics about sending and receiving frames over a port.

use serde::Serialize;

use crate::protocol::message::Msg;

/// Counters tracking traffic and corruption on one port.
///
/// The receive path never reports errors to the caller; it bumps one of
/// these counters and resumes scanning. All counters saturate instead of
/// wrapping. `unknown_opcode` and `bad_messages` are reserved for the
/// application: bump them when a message's opcode or arguments made no
/// sense at your level.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Candidate frames below the minimum frame length.
    pub frame_too_short: usize,
    /// Frames that grew past the maximum frame length.
    pub frame_too_long: usize,
    /// `>` seen with no frame in progress.
    pub missing_start_byte: usize,
    /// New `<` arrived before the previous frame's `>`.
    pub missing_end_byte: usize,
    /// Length check or checksum byte did not match.
    pub bad_checksums: usize,
    /// NUL byte inside a frame.
    pub illegal_character: usize,

    /// Total bytes ingested from the transport.
    pub bytes_read: usize,
    /// Complete valid frames delivered.
    pub good_frames: usize,
    /// Frames written out.
    pub frames_written: usize,

    /// Application-level: opcode not handled. Updated by the user.
    pub unknown_opcode: usize,
    /// Application-level: opcode known, arguments malformed. Updated by the user.
    pub bad_messages: usize,
}

impl Stats {
    /// Total number of errors encountered.
    pub fn n_errors(&self) -> usize {
        self.frame_too_short
            .saturating_add(self.frame_too_long)
            .saturating_add(self.missing_start_byte)
            .saturating_add(self.missing_end_byte)
            .saturating_add(self.bad_checksums)
            .saturating_add(self.illegal_character)
            .saturating_add(self.unknown_opcode)
            .saturating_add(self.bad_messages)
    }

    /// Reset all counters to zero.
    pub fn reset(&mut self) {
        *self = Stats::default();
    }

    /// Append error counters to a message as compact dict key-values.
    ///
    /// Writes a total under `errs` followed by one short key per non-zero
    /// counter; writes nothing at all when there are no errors. Returns the
    /// number of frame bytes appended.
    pub fn format_stats(&self, msg: &mut Msg) -> usize {
        let n_errors = self.n_errors();
        let orig_len = msg.length();
        if n_errors == 0 {
            return 0;
        }
        msg.append_dict_key_value("errs", n_errors as u64);
        let counters = [
            ("sh", self.frame_too_short),
            ("lg", self.frame_too_long),
            ("ms", self.missing_start_byte),
            ("me", self.missing_end_byte),
            ("bc", self.bad_checksums),
            ("bb", self.illegal_character),
            ("uo", self.unknown_opcode),
            ("bm", self.bad_messages),
        ];
        for (key, count) in counters {
            if count > 0 {
                msg.append_dict_key_value(key, count as u64);
            }
        }
        msg.length() - orig_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_n_errors_sums_error_counters_only() {
        let stats = Stats {
            frame_too_short: 1,
            bad_checksums: 2,
            unknown_opcode: 3,
            bytes_read: 1000,
            good_frames: 50,
            frames_written: 50,
            ..Stats::default()
        };
        assert_eq!(stats.n_errors(), 6);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let mut stats = Stats {
            bad_checksums: 9,
            bytes_read: 100,
            ..Stats::default()
        };
        stats.reset();
        assert_eq!(stats, Stats::default());
    }

    #[test]
    fn test_format_stats_omits_zero_counters() {
        let stats = Stats {
            bad_checksums: 2,
            missing_end_byte: 1,
            ..Stats::default()
        };
        let mut msg = Msg::new();
        msg.start("HRT", b'B', "01");
        msg.append_dict_start();
        let n = stats.format_stats(&mut msg);
        assert!(n > 0);
        msg.append_dict_end();
        msg.finish();
        assert_eq!(msg.args(), b"{errs=3,me=1,bc=2}");
    }

    #[test]
    fn test_format_stats_writes_nothing_when_clean() {
        let stats = Stats {
            bytes_read: 4096,
            good_frames: 7,
            ..Stats::default()
        };
        let mut msg = Msg::new();
        msg.start("HRT", b'B', "01");
        assert_eq!(stats.format_stats(&mut msg), 0);
        assert_eq!(msg.args_len(), 0);
    }

    #[test]
    fn test_stats_serialize_for_diagnostics() {
        let stats = Stats {
            good_frames: 3,
            ..Stats::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["good_frames"], 3);
        assert_eq!(json["bad_checksums"], 0);
    }
}
