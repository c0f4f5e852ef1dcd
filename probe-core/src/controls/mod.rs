#![allow(clippy::module_name_repetitions)]

//! Capture control parsing.
//!
//! A capture is configured by a single `g-…` command line of dash-separated
//! integer fields. Parsing produces an immutable [`CaptureConfig`] and
//! rejects malformed or out-of-range fields before any hardware-facing
//! object is built.

use core::fmt;

use winnow::ascii::dec_uint;
use winnow::error::{ContextError, ErrMode};

use crate::ring::BUFFER_COUNT;

/// Width of one transfer word in bits.
pub const WORD_BITS: u32 = 32;

/// Edge or level condition a trigger pin is watched for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerSense {
    Low = 0,
    High = 1,
    Fall = 2,
    Rise = 3,
}

impl TriggerSense {
    fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Low),
            1 => Some(Self::High),
            2 => Some(Self::Fall),
            3 => Some(Self::Rise),
            _ => None,
        }
    }
}

/// Policy governing how a capture terminates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleEndMode {
    Manual = 0,
    BufferFull = 1,
    EventWindow1 = 2,
    EventWindow2 = 3,
    EventWindow3 = 4,
    EventWindow4 = 5,
}

impl SampleEndMode {
    fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Manual),
            1 => Some(Self::BufferFull),
            2 => Some(Self::EventWindow1),
            3 => Some(Self::EventWindow2),
            4 => Some(Self::EventWindow3),
            5 => Some(Self::EventWindow4),
            _ => None,
        }
    }

    /// Retrospective window selected by this mode, if it is event-driven.
    #[must_use]
    pub fn event_window(self) -> Option<u32> {
        match self {
            Self::Manual | Self::BufferFull => None,
            Self::EventWindow1 => Some(1),
            Self::EventWindow2 => Some(2),
            Self::EventWindow3 => Some(3),
            Self::EventWindow4 => Some(4),
        }
    }
}

/// A watched pin plus the condition that fires it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinTrigger {
    pub pin: u32,
    pub sense: TriggerSense,
}

/// Immutable per-capture parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureConfig {
    /// First sampled pin.
    pub pin_base: u32,
    /// Bits captured per sample (1..=32 adjacent pins).
    pub pin_width: u32,
    /// Requested sample rate.
    pub frequency_hz: u32,
    /// Optional wait condition armed before the first sample.
    pub start_trigger: Option<PinTrigger>,
    /// Optional stop event watched while sampling.
    pub event_trigger: Option<PinTrigger>,
    pub end_mode: SampleEndMode,
    /// Total requested sample count across all buffers.
    pub sample_size: u32,
}

impl CaptureConfig {
    /// Parses a full `g-…` command line.
    pub fn parse(line: &str) -> Result<Self, ControlsError> {
        let mut fields = FieldReader::new(line)?;
        let pin_base = fields.next(Field::PinBase)?;
        let pin_width = fields.next(Field::PinWidth)?;
        let frequency_hz = fields.next(Field::Frequency)?;
        let start_enable = fields.flag(Field::StartEnable)?;
        let start_pin = fields.next(Field::StartPin)?;
        let start_sense = fields.sense(Field::StartSense)?;
        let event_enable = fields.flag(Field::EventEnable)?;
        let event_pin = fields.next(Field::EventPin)?;
        let event_sense = fields.sense(Field::EventSense)?;
        let end_mode_code = fields.next(Field::EndMode)?;
        let sample_size = fields.next(Field::SampleSize)?;
        fields.finish()?;

        if !(1..=WORD_BITS).contains(&pin_width) {
            return Err(ControlsError::new(Field::PinWidth, ControlsErrorKind::OutOfRange));
        }
        if frequency_hz == 0 {
            return Err(ControlsError::new(Field::Frequency, ControlsErrorKind::OutOfRange));
        }
        let end_mode = SampleEndMode::from_code(end_mode_code)
            .ok_or_else(|| ControlsError::new(Field::EndMode, ControlsErrorKind::OutOfRange))?;

        let config = Self {
            pin_base,
            pin_width,
            frequency_hz,
            start_trigger: start_enable.then_some(PinTrigger {
                pin: start_pin,
                sense: start_sense,
            }),
            event_trigger: event_enable.then_some(PinTrigger {
                pin: event_pin,
                sense: event_sense,
            }),
            end_mode,
            sample_size,
        };

        // Every buffer must hold at least one whole word.
        let minimum = config.samples_per_word() as usize * BUFFER_COUNT;
        if (sample_size as usize) < minimum {
            return Err(ControlsError::new(Field::SampleSize, ControlsErrorKind::OutOfRange));
        }

        Ok(config)
    }

    /// Samples packed into one transfer word.
    #[must_use]
    pub fn samples_per_word(&self) -> u32 {
        WORD_BITS / self.pin_width
    }

    /// Bits of each transfer word that carry sample data.
    #[must_use]
    pub fn used_bits_per_word(&self) -> u32 {
        self.samples_per_word() * self.pin_width
    }
}

/// Field of the `g` command line, used to point error messages at the
/// offending position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Command,
    PinBase,
    PinWidth,
    Frequency,
    StartEnable,
    StartPin,
    StartSense,
    EventEnable,
    EventPin,
    EventSense,
    EndMode,
    SampleSize,
}

impl Field {
    fn label(self) -> &'static str {
        match self {
            Field::Command => "command",
            Field::PinBase => "base pin",
            Field::PinWidth => "pin width",
            Field::Frequency => "frequency",
            Field::StartEnable => "start trigger enable",
            Field::StartPin => "start trigger pin",
            Field::StartSense => "start trigger sense",
            Field::EventEnable => "event trigger enable",
            Field::EventPin => "event trigger pin",
            Field::EventSense => "event trigger sense",
            Field::EndMode => "sample end mode",
            Field::SampleSize => "sample size",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlsErrorKind {
    Missing,
    NotANumber,
    OutOfRange,
    Trailing,
}

/// Parse failure naming the field that caused it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlsError {
    pub field: Field,
    pub kind: ControlsErrorKind,
}

impl ControlsError {
    const fn new(field: Field, kind: ControlsErrorKind) -> Self {
        Self { field, kind }
    }
}

impl fmt::Display for ControlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.field.label();
        match self.kind {
            ControlsErrorKind::Missing => write!(f, "missing {label} value"),
            ControlsErrorKind::NotANumber => write!(f, "illegal integer - {label} value"),
            ControlsErrorKind::OutOfRange => write!(f, "{label} value out of range"),
            ControlsErrorKind::Trailing => write!(f, "unexpected input after {label} value"),
        }
    }
}

/// Cursor over the dash-separated integer fields of a command line.
struct FieldReader<'s> {
    rest: &'s str,
}

impl<'s> FieldReader<'s> {
    fn new(line: &'s str) -> Result<Self, ControlsError> {
        let rest = line
            .strip_prefix('g')
            .ok_or(ControlsError::new(Field::Command, ControlsErrorKind::Missing))?;
        Ok(Self { rest })
    }

    fn next(&mut self, field: Field) -> Result<u32, ControlsError> {
        let Some(rest) = self.rest.strip_prefix('-') else {
            return Err(ControlsError::new(field, ControlsErrorKind::Missing));
        };
        self.rest = rest;
        if self.rest.is_empty() {
            return Err(ControlsError::new(field, ControlsErrorKind::Missing));
        }
        let value = dec_uint::<_, u32, ErrMode<ContextError>>(&mut self.rest)
            .map_err(|_| ControlsError::new(field, ControlsErrorKind::NotANumber))?;
        // dec_uint stops at the first non-digit; anything other than the next
        // separator means the field itself was malformed.
        if !(self.rest.is_empty() || self.rest.starts_with('-')) {
            return Err(ControlsError::new(field, ControlsErrorKind::NotANumber));
        }
        Ok(value)
    }

    fn flag(&mut self, field: Field) -> Result<bool, ControlsError> {
        match self.next(field)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(ControlsError::new(field, ControlsErrorKind::OutOfRange)),
        }
    }

    fn sense(&mut self, field: Field) -> Result<TriggerSense, ControlsError> {
        let code = self.next(field)?;
        TriggerSense::from_code(code)
            .ok_or(ControlsError::new(field, ControlsErrorKind::OutOfRange))
    }

    fn finish(self) -> Result<(), ControlsError> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(ControlsError::new(Field::SampleSize, ControlsErrorKind::Trailing))
        }
    }
}
