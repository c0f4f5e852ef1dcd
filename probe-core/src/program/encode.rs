//! Raw 16-bit sampler instruction encoding.
//!
//! Only the fragment of the instruction set the capture programs use is
//! covered: `IN` from pins, `WAIT` on a GPIO level, `SET`, `JMP`, and the
//! per-instruction delay field.

/// Target register of a `SET` instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetTarget {
    Pins = 0,
    X = 1,
    Y = 2,
    PinDirs = 4,
}

/// Branch condition of a `JMP` instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JmpCondition {
    Always = 0,
    XZero = 1,
    /// `x--`: taken while X is non-zero, decrementing afterwards.
    XDec = 2,
    YZero = 3,
    /// `y--`: taken while Y is non-zero, decrementing afterwards.
    YDec = 4,
    XNotY = 5,
    Pin = 6,
    OsrNotEmpty = 7,
}

/// `in pins, <bit_count>`; a count of 32 encodes as 0.
#[must_use]
pub const fn in_pins(bit_count: u32) -> u16 {
    0x4000 | (bit_count & 0x1f) as u16
}

/// `wait <polarity> gpio <pin>`.
#[must_use]
pub const fn wait_gpio(polarity: bool, pin: u32) -> u16 {
    0x2000 | (polarity as u16) << 7 | (pin & 0x1f) as u16
}

/// `set <target>, <value>`.
#[must_use]
pub const fn set(target: SetTarget, value: u32) -> u16 {
    0xE000 | (target as u16) << 5 | (value & 0x1f) as u16
}

/// `jmp <condition> <target>`; the target is an absolute instruction index.
#[must_use]
pub const fn jmp(condition: JmpCondition, target: u32) -> u16 {
    (condition as u16) << 5 | (target & 0x1f) as u16
}

/// Adds a post-execution delay of up to 31 cycles to an encoded word.
#[must_use]
pub const fn with_delay(word: u16, cycles: u32) -> u16 {
    word | ((cycles & 0x1f) as u16) << 8
}

/// `JMP` is the all-zero major opcode, so only its words need their target
/// rewritten when a program is installed away from address zero.
#[must_use]
pub const fn is_jmp(word: u16) -> bool {
    word >> 13 == 0
}
