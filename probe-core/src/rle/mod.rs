//! Run-length text encoding of captured samples.
//!
//! Each pin's level stream becomes lines of tokens: a bare `H` or `L` for a
//! run of one, `<count><H|L>` otherwise. Lines never exceed
//! [`MAX_LINE_LENGTH`] and no token is split across lines, which keeps the
//! serial side free to frame responses however it likes.

use core::fmt::Write as _;

use heapless::String;

use crate::controls::CaptureConfig;
use crate::ring::CaptureBuffers;

/// Longest line handed to a sink.
pub const MAX_LINE_LENGTH: usize = 72;

/// Digits allowed in one run count.
pub const MAX_COUNT_DIGITS: u32 = 6;

/// Receives encoded lines one at a time.
pub trait LineSink {
    fn line(&mut self, text: &str);
}

/// Streaming `(level, run)` tokenizer with bounded output lines.
pub struct RunLengthEncoder {
    line: String<MAX_LINE_LENGTH>,
    level: bool,
    run: u32,
    max_count: u32,
    flush_threshold: usize,
}

impl RunLengthEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(MAX_LINE_LENGTH, MAX_COUNT_DIGITS)
    }

    /// `max_line` bounds emitted lines; counts get at most `max_digits`
    /// digits before the run is force-flushed.
    fn with_limits(max_line: usize, max_digits: u32) -> Self {
        Self {
            line: String::new(),
            level: false,
            run: 0,
            max_count: 10u32.pow(max_digits) - 1,
            // Leave room for a worst-case token after the flush check.
            flush_threshold: max_line - (max_digits as usize + 2),
        }
    }

    /// Feeds one sample.
    pub fn push<S: LineSink>(&mut self, level: bool, sink: &mut S) {
        if self.run == 0 {
            self.level = level;
            self.run = 1;
        } else if level == self.level {
            self.run += 1;
            if self.run == self.max_count {
                self.emit_token(sink);
                self.run = 0;
            }
        } else {
            self.emit_token(sink);
            self.level = level;
            self.run = 1;
        }
    }

    /// Emits any pending token, then flushes the remainder line.
    pub fn finish<S: LineSink>(&mut self, sink: &mut S) {
        if self.run > 0 {
            self.emit_token(sink);
            self.run = 0;
        }
        if !self.line.is_empty() {
            sink.line(&self.line);
            self.line.clear();
        }
    }

    fn emit_token<S: LineSink>(&mut self, sink: &mut S) {
        if self.line.len() >= self.flush_threshold {
            sink.line(&self.line);
            self.line.clear();
        }
        let symbol = if self.level { 'H' } else { 'L' };
        if self.run == 1 {
            let _ = self.line.push(symbol);
        } else {
            let _ = write!(self.line, "{}{}", self.run, symbol);
        }
    }
}

impl Default for RunLengthEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes every pin stream of a finished capture.
///
/// Pins are emitted lowest first, each under a `# <pin>` header. Within a
/// word the oldest sample sits in the highest used bits (the input shifter
/// moves left), so bits are walked top-down with the pin width as stride;
/// buffers are visited oldest first.
pub fn encode_capture<S: LineSink>(
    config: &CaptureConfig,
    capture: &CaptureBuffers,
    sink: &mut S,
) {
    for offset in 0..config.pin_width {
        let mut header: String<16> = String::new();
        let _ = write!(header, "# {}", config.pin_base + offset);
        sink.line(&header);

        let top = config.used_bits_per_word() - config.pin_width + offset;
        let mut encoder = RunLengthEncoder::new();
        for buffer in capture.chronological() {
            for index in 0..capture.words_per_buffer() {
                let word = capture.read(buffer, index);
                for sample in 0..config.samples_per_word() {
                    let bit = top - sample * config.pin_width;
                    encoder.push((word >> bit) & 1 == 1, sink);
                }
            }
        }
        encoder.finish(sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::{CaptureConfig, SampleEndMode};
    use crate::ring::{CaptureRing, TransferEngine};
    use crate::sim::{SimTransferEngine, WordPattern};
    use alloc::string::String;
    use alloc::vec::Vec;

    #[derive(Default)]
    struct RecordingSink {
        lines: Vec<String>,
    }

    impl LineSink for RecordingSink {
        fn line(&mut self, text: &str) {
            self.lines.push(text.into());
        }
    }

    fn encode(samples: impl IntoIterator<Item = bool>, max_line: usize, max_digits: u32) -> Vec<String> {
        let mut sink = RecordingSink::default();
        let mut encoder = RunLengthEncoder::with_limits(max_line, max_digits);
        for level in samples {
            encoder.push(level, &mut sink);
        }
        encoder.finish(&mut sink);
        sink.lines
    }

    fn alternating(count: usize) -> impl Iterator<Item = bool> {
        (0..count).map(|index| index % 2 == 0)
    }

    fn paired(count: usize) -> impl Iterator<Item = bool> {
        (0..count).map(|index| index % 4 < 2)
    }

    #[test]
    fn single_runs_fill_lines_to_the_flush_threshold() {
        assert_eq!(encode(alternating(20), 13, 1), ["HLHLHLHLHL", "HLHLHLHLHL"]);
    }

    #[test]
    fn flush_threshold_reserves_token_headroom() {
        assert_eq!(
            encode(alternating(20), 12, 1),
            ["HLHLHLHLH", "LHLHLHLHL", "HL"]
        );
    }

    #[test]
    fn counted_runs_on_one_line_when_they_fit() {
        assert_eq!(encode(paired(20), 30, 1), ["2H2L2H2L2H2L2H2L2H2L"]);
    }

    #[test]
    fn counted_runs_split_before_overflowing() {
        assert_eq!(
            encode(paired(20), 11, 1),
            ["2H2L2H2L", "2H2L2H2L", "2H2L"]
        );
    }

    #[test]
    fn run_counts_force_flush_at_their_digit_ceiling() {
        let samples = (0..25).map(|_| true);
        assert_eq!(encode(samples, 72, 1), ["9H9H7H"]);
    }

    #[test]
    fn exhausted_run_leaves_no_empty_token_behind() {
        let samples = (0..9).map(|_| true);
        assert_eq!(encode(samples, 72, 1), ["9H"]);
    }

    #[test]
    fn empty_stream_emits_nothing() {
        assert_eq!(encode([], 72, 1), Vec::<String>::new());
    }

    #[test]
    fn lone_sample_is_a_bare_level() {
        assert_eq!(encode([true], 72, 6), ["H"]);
    }

    fn run_capture(config: &CaptureConfig, pattern: WordPattern) -> CaptureRing {
        let ring = CaptureRing::prepare(config).expect("prepares");
        let mut engine = SimTransferEngine::new();
        ring.arm(&mut engine, pattern);
        engine.start();
        while engine.step_buffer() {}
        ring
    }

    #[test]
    fn single_pin_capture_encodes_msb_first() {
        let config = CaptureConfig {
            pin_base: 16,
            pin_width: 1,
            frequency_hz: 19_200,
            start_trigger: None,
            event_trigger: None,
            end_mode: SampleEndMode::BufferFull,
            sample_size: 128,
        };
        let ring = run_capture(&config, WordPattern::constant(0xAAAA_AAAA));
        let mut sink = RecordingSink::default();
        encode_capture(&config, &ring.finish(), &mut sink);
        let long_line = "HL".repeat(32);
        assert_eq!(sink.lines, ["# 16", long_line.as_str(), long_line.as_str()]);
    }

    #[test]
    fn interleaved_pins_separate_into_headed_streams() {
        let config = CaptureConfig {
            pin_base: 16,
            pin_width: 3,
            frequency_hz: 19_200,
            start_trigger: None,
            event_trigger: None,
            end_mode: SampleEndMode::BufferFull,
            sample_size: 40,
        };
        // Per word: pin 16 high for all ten samples, pin 17 low, pin 18
        // alternating from high.
        let ring = run_capture(&config, WordPattern::constant(0x29A6_9A69));
        let mut sink = RecordingSink::default();
        encode_capture(&config, &ring.finish(), &mut sink);
        let alternating = "HL".repeat(20);
        assert_eq!(
            sink.lines,
            ["# 16", "40H", "# 17", "40L", "# 18", alternating.as_str()]
        );
    }

    #[test]
    fn buffers_are_encoded_in_capture_order() {
        let config = CaptureConfig {
            pin_base: 16,
            pin_width: 1,
            frequency_hz: 19_200,
            start_trigger: None,
            event_trigger: None,
            end_mode: SampleEndMode::Manual,
            sample_size: 128,
        };
        let ring = CaptureRing::prepare(&config).expect("prepares");
        let mut engine = SimTransferEngine::new();
        let words = [
            0x0000_0000,
            0x0000_0000,
            0x0000_0000,
            0xFFFF_FFFF,
            0x0000_0000,
            0xFFFF_FFFF,
            0x0000_0000,
        ];
        ring.arm(&mut engine, WordPattern::cycle(&words));
        engine.start();
        engine.run_buffers(7);
        ring.stop();
        while engine.step_buffer() {}

        let mut sink = RecordingSink::default();
        encode_capture(&config, &ring.finish(), &mut sink);
        // The oldest retained buffer holds the fourth generated word.
        assert_eq!(sink.lines, ["# 16", "32H32L32H32L"]);
    }

    #[test]
    fn headers_alone_for_an_empty_capture() {
        let config = CaptureConfig {
            pin_base: 4,
            pin_width: 2,
            frequency_hz: 19_200,
            start_trigger: None,
            event_trigger: None,
            end_mode: SampleEndMode::Manual,
            sample_size: 128,
        };
        let ring = CaptureRing::prepare(&config).expect("prepares");
        let mut engine = SimTransferEngine::new();
        ring.arm(&mut engine, WordPattern::constant(0));
        engine.start();
        ring.stop();
        while engine.step_buffer() {}

        let mut sink = RecordingSink::default();
        encode_capture(&config, &ring.finish(), &mut sink);
        assert_eq!(sink.lines, ["# 4", "# 5"]);
    }
}
