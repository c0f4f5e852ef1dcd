//! Capture program shapes.
//!
//! Two variants cover the whole rate range. Above [`LOW_RATE_LIMIT_HZ`] the
//! wrap body is a single `IN`, so the clock divider alone paces sampling.
//! At or below it a calibrated delay loop stretches one wrap to
//! [`SLOW_WRAP_CYCLES`] cycles, keeping the 16.8 divider in range down to
//! single-digit sample rates.

use crate::controls::{CaptureConfig, PinTrigger, TriggerSense};
use crate::program::encode::{self, JmpCondition, SetTarget};
use crate::program::{ClockDivider, MicroProgram, ProgramBuilder, ProgramOverflow, SamplerBinding};

/// Fastest rate served by the delay-loop shape.
pub const LOW_RATE_LIMIT_HZ: u32 = 10_000;

/// Cycles per wrap of the delay-loop shape:
/// `in` (1) + `set y` (23) + 2 × (`set x` (32) + 32 × `jmp x--` (32) + `jmp y--` (32)).
pub const SLOW_WRAP_CYCLES: u32 = 2200;

/// A program ready to install, with everything needed to derive its divider.
#[derive(Clone, Debug)]
pub struct SamplerProgram {
    pub program: MicroProgram,
    pub binding: SamplerBinding,
    cycles_per_wrap: u32,
    frequency_hz: u32,
}

impl SamplerProgram {
    /// Divider that paces this program to its configured sample rate.
    #[must_use]
    pub fn divider(&self, system_clock_hz: u32) -> ClockDivider {
        ClockDivider::from_rates(system_clock_hz, self.cycles_per_wrap, self.frequency_hz)
    }
}

/// Assembles the sampling program for one capture.
///
/// Start-trigger waits come before the wrap target so they run exactly once;
/// each wrap thereafter shifts in one sample of `pin_width` bits.
pub fn assemble_sampler(config: &CaptureConfig) -> Result<SamplerProgram, ProgramOverflow> {
    let mut builder = ProgramBuilder::new();
    if let Some(trigger) = config.start_trigger {
        emit_start_wait(&mut builder, trigger);
    }
    builder.mark_wrap_target();
    builder.emit(encode::in_pins(config.pin_width));
    let cycles_per_wrap = if config.frequency_hz > LOW_RATE_LIMIT_HZ {
        1
    } else {
        emit_delay_loop(&mut builder);
        SLOW_WRAP_CYCLES
    };
    builder.mark_wrap();
    let program = builder.finish()?;
    Ok(SamplerProgram {
        program,
        binding: SamplerBinding {
            input_base: config.pin_base,
            autopush_bits: config.used_bits_per_word(),
        },
        cycles_per_wrap,
        frequency_hz: config.frequency_hz,
    })
}

fn emit_start_wait(builder: &mut ProgramBuilder, trigger: PinTrigger) {
    match trigger.sense {
        TriggerSense::Low => builder.emit(encode::wait_gpio(false, trigger.pin)),
        TriggerSense::High => builder.emit(encode::wait_gpio(true, trigger.pin)),
        TriggerSense::Fall => {
            builder.emit(encode::wait_gpio(true, trigger.pin));
            builder.emit(encode::wait_gpio(false, trigger.pin));
        }
        TriggerSense::Rise => {
            builder.emit(encode::wait_gpio(false, trigger.pin));
            builder.emit(encode::wait_gpio(true, trigger.pin));
        }
    }
}

/// Burns `SLOW_WRAP_CYCLES - 1` cycles after each sample: Y counts two outer
/// passes, X spins a 32-iteration inner loop at maximum delay.
fn emit_delay_loop(builder: &mut ProgramBuilder) {
    builder.emit(encode::with_delay(encode::set(SetTarget::Y, 1), 22));
    let outer = builder.here();
    builder.emit(encode::with_delay(encode::set(SetTarget::X, 31), 31));
    let inner = builder.here();
    builder.emit(encode::with_delay(
        encode::jmp(JmpCondition::XDec, u32::from(inner)),
        31,
    ));
    builder.emit(encode::with_delay(
        encode::jmp(JmpCondition::YDec, u32::from(outer)),
        31,
    ));
}
