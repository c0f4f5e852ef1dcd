#![allow(clippy::module_name_repetitions)]

//! Sampling micro-program assembly and installation.
//!
//! Capture programs are tiny sequences of 16-bit instruction words executed
//! by the sampling peripheral. [`ProgramBuilder`] accumulates words and wrap
//! markers into an immutable [`MicroProgram`]; [`SamplingPeripheral`] is the
//! installation seam the probe drives and the simulator implements.

pub mod capture;
pub mod encode;

use core::fmt;

/// Instruction slots available to one program.
pub const MAX_INSTRUCTIONS: usize = 32;

/// Fixed-point 16.8 clock divider applied to the sampling peripheral.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockDivider {
    pub integer: u16,
    pub frac: u8,
}

impl ClockDivider {
    /// Divider that makes one program wrap take `1 / frequency_hz` seconds.
    ///
    /// Saturates at the 16-bit boundary and never drops below unity.
    #[must_use]
    pub fn from_rates(system_clock_hz: u32, cycles_per_wrap: u32, frequency_hz: u32) -> Self {
        let denominator = u64::from(cycles_per_wrap) * u64::from(frequency_hz);
        let scaled = (u64::from(system_clock_hz) << 8) / denominator;
        let Ok(integer) = u16::try_from(scaled >> 8) else {
            return Self {
                integer: u16::MAX,
                frac: u8::MAX,
            };
        };
        if integer == 0 {
            return Self { integer: 1, frac: 0 };
        }
        Self {
            integer,
            frac: (scaled & 0xff) as u8,
        }
    }
}

/// Pin and push configuration installed alongside a program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerBinding {
    /// First input pin the `IN` instruction reads.
    pub input_base: u32,
    /// Shift count at which sampled bits are pushed to the tap.
    pub autopush_bits: u32,
}

/// An assembled program exceeded [`MAX_INSTRUCTIONS`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgramOverflow;

impl fmt::Display for ProgramOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "program exceeds {MAX_INSTRUCTIONS} instructions")
    }
}

/// The peripheral had no room left for a program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstallError;

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no instruction memory left for the program")
    }
}

/// Accumulates instruction words into a [`MicroProgram`].
///
/// Emitting past capacity drops the word and latches an overflow flag that
/// [`finish`](Self::finish) reports, so assembly code can stay straight-line.
pub struct ProgramBuilder {
    words: heapless::Vec<u16, MAX_INSTRUCTIONS>,
    wrap_target: Option<u8>,
    wrap: Option<u8>,
    overflowed: bool,
}

impl ProgramBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            words: heapless::Vec::new(),
            wrap_target: None,
            wrap: None,
            overflowed: false,
        }
    }

    /// Index the next emitted word will occupy, for intra-program jumps.
    #[must_use]
    pub fn here(&self) -> u8 {
        match u8::try_from(self.words.len()) {
            Ok(index) => index,
            Err(_) => u8::MAX,
        }
    }

    /// Appends one encoded word.
    pub fn emit(&mut self, word: u16) {
        if self.words.push(word).is_err() {
            self.overflowed = true;
        }
    }

    /// Marks the current position as where execution resumes after a wrap.
    pub fn mark_wrap_target(&mut self) {
        self.wrap_target = Some(self.here());
    }

    /// Marks the previously emitted word as the wrap point.
    pub fn mark_wrap(&mut self) {
        self.wrap = Some(self.here().saturating_sub(1));
    }

    /// Seals the program; unset markers default to the whole program.
    pub fn finish(self) -> Result<MicroProgram, ProgramOverflow> {
        if self.overflowed {
            return Err(ProgramOverflow);
        }
        let last = self.here().saturating_sub(1);
        Ok(MicroProgram {
            wrap_target: self.wrap_target.unwrap_or(0),
            wrap: self.wrap.unwrap_or(last),
            words: self.words,
        })
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable sampler program: raw words plus wrap markers, all relative to
/// address zero until installation relocates them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MicroProgram {
    words: heapless::Vec<u16, MAX_INSTRUCTIONS>,
    wrap_target: u8,
    wrap: u8,
}

impl MicroProgram {
    #[must_use]
    pub fn words(&self) -> &[u16] {
        &self.words
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    #[must_use]
    pub fn wrap_target(&self) -> u8 {
        self.wrap_target
    }

    #[must_use]
    pub fn wrap(&self) -> u8 {
        self.wrap
    }

    /// Installs into the peripheral's instruction memory.
    pub fn load<P: SamplingPeripheral>(
        &self,
        peripheral: &mut P,
        binding: SamplerBinding,
        divider: ClockDivider,
    ) -> Result<(), InstallError> {
        peripheral.install(self, binding, divider)
    }

    /// Wipes the peripheral's instruction memory, then installs. Used for
    /// every capture so repeated runs cannot exhaust the memory.
    pub fn clear_and_load<P: SamplingPeripheral>(
        &self,
        peripheral: &mut P,
        binding: SamplerBinding,
        divider: ClockDivider,
    ) -> Result<(), InstallError> {
        peripheral.clear();
        self.load(peripheral, binding, divider)
    }
}

/// The sampling peripheral as the probe sees it.
///
/// Installation relocates the program: `JMP` targets and both wrap markers
/// are shifted by the chosen load offset.
pub trait SamplingPeripheral {
    /// Handle the transfer engine drains sampled words from.
    type Tap;

    /// Erases all installed programs.
    fn clear(&mut self);

    /// Places a program in free instruction memory and applies the binding
    /// and divider.
    fn install(
        &mut self,
        program: &MicroProgram,
        binding: SamplerBinding,
        divider: ClockDivider,
    ) -> Result<(), InstallError>;

    /// Starts executing the most recently installed program.
    fn start(&mut self);

    /// Halts execution.
    fn stop(&mut self);

    fn system_clock_hz(&self) -> u32;

    fn tap(&mut self) -> Self::Tap;
}
