#![allow(clippy::module_name_repetitions)]

//! Host-side implementations of the hardware-facing traits.
//!
//! These doubles stand in for the sampling peripheral, the transfer engine,
//! and the event pin so captures can run end to end in tests and in the
//! emulator. Transfers move only when the harness pumps
//! [`SimTransferEngine::step_buffer`], which keeps every scenario
//! deterministic.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::controls::PinTrigger;
use crate::probe::Probe;
use crate::program::{
    ClockDivider, InstallError, MAX_INSTRUCTIONS, MicroProgram, SamplerBinding,
    SamplingPeripheral, encode,
};
use crate::ring::list::SlotCommand;
use crate::ring::{AdvanceListener, CompletionListener, TransferEngine, TransferPlan};
use crate::trigger::{EventListener, EventSource};

/// A probe wired entirely to simulated hardware.
pub type SimProbe = Probe<SimTransferEngine<SimTap>, SimSampler, SimEventPin>;

/// Builds a simulated probe with default clock and pattern.
#[must_use]
pub fn sim_probe() -> SimProbe {
    Probe::new(
        SimTransferEngine::new(),
        SimSampler::new(),
        SimEventPin::new(),
    )
}

/// Supplies the 32-bit words a capture would shift in from the pins.
pub trait SampleSource {
    fn next_word(&mut self) -> u32;
}

/// Deterministic word generator standing in for sampled pin activity.
#[derive(Clone, Debug)]
pub enum WordPattern {
    Constant(u32),
    Cycle { words: Vec<u32>, index: usize },
    Toggle { word: u32, inverted: bool },
}

impl WordPattern {
    #[must_use]
    pub const fn constant(word: u32) -> Self {
        Self::Constant(word)
    }

    /// Repeats `words` forever; an empty slice degenerates to zeros.
    #[must_use]
    pub fn cycle(words: &[u32]) -> Self {
        Self::Cycle {
            words: words.to_vec(),
            index: 0,
        }
    }

    /// Alternates `word` with its complement.
    #[must_use]
    pub const fn toggle(word: u32) -> Self {
        Self::Toggle {
            word,
            inverted: false,
        }
    }
}

impl SampleSource for WordPattern {
    fn next_word(&mut self) -> u32 {
        match self {
            Self::Constant(word) => *word,
            Self::Cycle { words, index } => {
                let Some(&word) = words.get(*index) else {
                    return 0;
                };
                *index = (*index + 1) % words.len();
                word
            }
            Self::Toggle { word, inverted } => {
                let current = if *inverted { !*word } else { *word };
                *inverted = !*inverted;
                current
            }
        }
    }
}

/// One relocated program as it sits in the sampler's instruction memory.
#[derive(Clone, Debug)]
pub struct InstalledProgram {
    pub offset: u8,
    pub words: Vec<u16>,
    pub wrap_target: u8,
    pub wrap: u8,
    pub binding: SamplerBinding,
    pub divider: ClockDivider,
}

/// Simulated sampling peripheral.
///
/// Instruction memory is allocated top-down, as the hardware assembler does,
/// so the recorded offsets exercise the relocation paths. The word pattern is
/// shared with every tap handed out, which lets a session swap patterns
/// mid-capture.
pub struct SimSampler {
    free_top: usize,
    programs: Vec<InstalledProgram>,
    running: bool,
    system_clock_hz: u32,
    pattern: Rc<RefCell<WordPattern>>,
}

impl SimSampler {
    #[must_use]
    pub fn new() -> Self {
        Self::with_pattern(WordPattern::constant(0))
    }

    #[must_use]
    pub fn with_pattern(pattern: WordPattern) -> Self {
        Self {
            free_top: MAX_INSTRUCTIONS,
            programs: Vec::new(),
            running: false,
            system_clock_hz: 125_000_000,
            pattern: Rc::new(RefCell::new(pattern)),
        }
    }

    /// Replaces the sample generator; live taps see the change at once.
    pub fn set_pattern(&mut self, pattern: WordPattern) {
        *self.pattern.borrow_mut() = pattern;
    }

    #[must_use]
    pub fn programs(&self) -> &[InstalledProgram] {
        &self.programs
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl Default for SimSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplingPeripheral for SimSampler {
    type Tap = SimTap;

    fn clear(&mut self) {
        self.programs.clear();
        self.free_top = MAX_INSTRUCTIONS;
    }

    fn install(
        &mut self,
        program: &MicroProgram,
        binding: SamplerBinding,
        divider: ClockDivider,
    ) -> Result<(), InstallError> {
        if program.len() > self.free_top {
            return Err(InstallError);
        }
        self.free_top -= program.len();
        let offset = match u8::try_from(self.free_top) {
            Ok(offset) => offset,
            Err(_) => u8::MAX,
        };
        let words = program
            .words()
            .iter()
            .map(|&word| {
                if encode::is_jmp(word) {
                    word + u16::from(offset)
                } else {
                    word
                }
            })
            .collect();
        self.programs.push(InstalledProgram {
            offset,
            words,
            wrap_target: program.wrap_target() + offset,
            wrap: program.wrap() + offset,
            binding,
            divider,
        });
        Ok(())
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn system_clock_hz(&self) -> u32 {
        self.system_clock_hz
    }

    fn tap(&mut self) -> SimTap {
        SimTap {
            pattern: Rc::clone(&self.pattern),
        }
    }
}

/// Word outlet of a [`SimSampler`], drained by the transfer engine.
pub struct SimTap {
    pattern: Rc<RefCell<WordPattern>>,
}

impl SampleSource for SimTap {
    fn next_word(&mut self) -> u32 {
        self.pattern.borrow_mut().next_word()
    }
}

/// Simulated transfer engine, pumped one command slot at a time.
pub struct SimTransferEngine<S> {
    plan: Option<TransferPlan<S>>,
    advance: Option<Box<dyn AdvanceListener>>,
    complete: Option<Box<dyn CompletionListener>>,
    running: bool,
    halted: bool,
}

impl<S> SimTransferEngine<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            plan: None,
            advance: None,
            complete: None,
            running: false,
            halted: false,
        }
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }
}

impl<S> Default for SimTransferEngine<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SampleSource> SimTransferEngine<S> {
    /// Consumes one command slot: fills a buffer or takes the sentinel.
    /// Returns `false` once there is nothing left to do.
    pub fn step_buffer(&mut self) -> bool {
        if !self.running || self.halted {
            return false;
        }
        let Some(plan) = self.plan.as_mut() else {
            return false;
        };
        match plan.list.next_command() {
            SlotCommand::Fill(buffer) => {
                for index in 0..plan.memory.words_per_buffer() {
                    plan.memory.write(buffer, index, plan.source.next_word());
                }
                if let Some(advance) = &self.advance {
                    advance.on_advance();
                }
            }
            SlotCommand::Stop => {
                if let Some(advance) = &self.advance {
                    advance.on_advance();
                }
                if let Some(complete) = &self.complete {
                    complete.on_complete(plan.list.read_offset());
                }
                self.halted = true;
            }
        }
        true
    }

    /// Pumps up to `count` slots; returns how many were consumed.
    pub fn run_buffers(&mut self, count: usize) -> usize {
        let mut stepped = 0;
        while stepped < count && self.step_buffer() {
            stepped += 1;
        }
        stepped
    }
}

impl<S> TransferEngine for SimTransferEngine<S> {
    type Source = S;

    fn arm<A, C>(&mut self, plan: TransferPlan<S>, advance: A, complete: C)
    where
        A: AdvanceListener + 'static,
        C: CompletionListener + 'static,
    {
        self.plan = Some(plan);
        self.advance = Some(Box::new(advance));
        self.complete = Some(Box::new(complete));
        self.running = false;
        self.halted = false;
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn disarm(&mut self) {
        self.plan = None;
        self.advance = None;
        self.complete = None;
        self.running = false;
        self.halted = false;
    }
}

/// Simulated event pin holding at most one watch.
pub struct SimEventPin {
    watch: Option<(PinTrigger, Box<dyn EventListener>)>,
}

impl SimEventPin {
    #[must_use]
    pub fn new() -> Self {
        Self { watch: None }
    }

    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    #[must_use]
    pub fn watched_condition(&self) -> Option<PinTrigger> {
        self.watch.as_ref().map(|(condition, _)| *condition)
    }

    /// Delivers one event to the current watch, releasing it if the
    /// listener reports the event consumed.
    pub fn raise(&mut self) {
        let release = match &self.watch {
            Some((_, listener)) => listener.on_event(),
            None => return,
        };
        if release {
            self.watch = None;
        }
    }
}

impl Default for SimEventPin {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for SimEventPin {
    fn watch<L: EventListener + 'static>(&mut self, condition: PinTrigger, listener: L) {
        self.watch = Some((condition, Box::new(listener)));
    }

    fn disarm(&mut self) {
        self.watch = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::{CaptureConfig, SampleEndMode, TriggerSense};
    use crate::program::ProgramBuilder;
    use crate::program::capture::assemble_sampler;

    fn slow_plan() -> (MicroProgram, SamplerBinding, ClockDivider) {
        let config = CaptureConfig {
            pin_base: 16,
            pin_width: 1,
            frequency_hz: 5_000,
            start_trigger: None,
            event_trigger: None,
            end_mode: SampleEndMode::Manual,
            sample_size: 3200,
        };
        let plan = assemble_sampler(&config).expect("assembles");
        let divider = plan.divider(125_000_000);
        (plan.program, plan.binding, divider)
    }

    #[test]
    fn patterns_generate_their_sequences() {
        let mut constant = WordPattern::constant(7);
        assert_eq!(constant.next_word(), 7);
        assert_eq!(constant.next_word(), 7);

        let mut cycle = WordPattern::cycle(&[1, 2, 3]);
        let seen: Vec<u32> = (0..5).map(|_| cycle.next_word()).collect();
        assert_eq!(seen, [1, 2, 3, 1, 2]);

        let mut toggle = WordPattern::toggle(0x0000_FFFF);
        assert_eq!(toggle.next_word(), 0x0000_FFFF);
        assert_eq!(toggle.next_word(), 0xFFFF_0000);
        assert_eq!(toggle.next_word(), 0x0000_FFFF);
    }

    #[test]
    fn empty_cycle_degenerates_to_zeros() {
        let mut pattern = WordPattern::cycle(&[]);
        assert_eq!(pattern.next_word(), 0);
        assert_eq!(pattern.next_word(), 0);
    }

    #[test]
    fn install_relocates_against_the_memory_top() {
        let (program, binding, divider) = slow_plan();
        let mut sampler = SimSampler::new();
        program
            .load(&mut sampler, binding, divider)
            .expect("installs");

        let installed = &sampler.programs()[0];
        assert_eq!(installed.offset, 27);
        assert_eq!(installed.wrap_target, 27);
        assert_eq!(installed.wrap, 31);
        // The two jumps now target their relocated addresses.
        assert_eq!(installed.words[3], 0x1F5E);
        assert_eq!(installed.words[4], 0x1F9D);
        // Non-jump words are untouched.
        assert_eq!(installed.words[0], 0x4001);
        assert_eq!(installed.divider, ClockDivider { integer: 11, frac: 93 });
    }

    #[test]
    fn second_install_stacks_below_the_first() {
        let (program, binding, divider) = slow_plan();
        let mut sampler = SimSampler::new();
        program.load(&mut sampler, binding, divider).expect("installs");
        program.load(&mut sampler, binding, divider).expect("installs");
        assert_eq!(sampler.programs()[0].offset, 27);
        assert_eq!(sampler.programs()[1].offset, 22);
    }

    #[test]
    fn clear_reclaims_the_whole_memory() {
        let (program, binding, divider) = slow_plan();
        let mut sampler = SimSampler::new();
        program.load(&mut sampler, binding, divider).expect("installs");
        program.clear_and_load(&mut sampler, binding, divider).expect("installs");
        assert_eq!(sampler.programs().len(), 1);
        assert_eq!(sampler.programs()[0].offset, 27);
    }

    #[test]
    fn exhausted_memory_refuses_an_install() {
        let mut builder = ProgramBuilder::new();
        for _ in 0..MAX_INSTRUCTIONS {
            builder.emit(encode::in_pins(1));
        }
        let full = builder.finish().expect("fits");
        let (_, binding, divider) = slow_plan();
        let mut sampler = SimSampler::new();
        full.load(&mut sampler, binding, divider).expect("installs");
        assert_eq!(sampler.programs()[0].offset, 0);
        assert_eq!(full.load(&mut sampler, binding, divider), Err(InstallError));
    }

    #[test]
    fn taps_follow_pattern_swaps() {
        let mut sampler = SimSampler::with_pattern(WordPattern::cycle(&[1, 2]));
        let mut tap = sampler.tap();
        assert_eq!(tap.next_word(), 1);
        sampler.set_pattern(WordPattern::constant(9));
        assert_eq!(tap.next_word(), 9);
    }

    #[test]
    fn unstarted_engine_does_not_move() {
        let mut engine: SimTransferEngine<WordPattern> = SimTransferEngine::new();
        assert!(!engine.step_buffer());
        assert_eq!(engine.run_buffers(5), 0);
    }

    #[test]
    fn watched_condition_is_visible_until_released() {
        let mut pin = SimEventPin::new();
        assert_eq!(pin.watched_condition(), None);
        pin.raise();
        assert!(!pin.is_watching());
        let condition = PinTrigger {
            pin: 2,
            sense: TriggerSense::Fall,
        };
        struct Once;
        impl EventListener for Once {
            fn on_event(&self) -> bool {
                true
            }
        }
        pin.watch(condition, Once);
        assert_eq!(pin.watched_condition(), Some(condition));
        pin.raise();
        assert_eq!(pin.watched_condition(), None);
    }
}
