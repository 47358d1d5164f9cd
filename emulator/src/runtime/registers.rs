use bitflags::bitflags;
use parse_display::Display;
use thiserror::Error;

use crate::constants::{self as C, Word};

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        const SUPERVISOR       = 0b01;
        const INTERRUPT_ENABLE = 0b10;
    }
}

impl Default for StatusFlags {
    fn default() -> Self {
        // On startup, only the supervisor bit is set
        StatusFlags::SUPERVISOR
    }
}

impl std::fmt::Debug for StatusFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04b}", self.bits())
    }
}

/// Operation mode of the processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display(style = "lowercase")]
pub enum Mode {
    User,
    Kernel,
}

impl Mode {
    /// Decode the operand of a mode change, `0` is user and `1` is kernel
    #[must_use]
    pub const fn from_word(word: Word) -> Option<Self> {
        match word {
            0 => Some(Mode::User),
            1 => Some(Mode::Kernel),
            _ => None,
        }
    }
}

/// Condition code of the PSW
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display)]
#[display(style = "lowercase")]
pub enum ConditionCode {
    #[default]
    Equal = 0,
    Less = 1,
    Greater = 2,
    Fault = 3,
}

impl ConditionCode {
    /// Condition code after an arithmetic result was stored
    #[must_use]
    pub const fn from_sign(value: Word) -> Self {
        if value == 0 {
            ConditionCode::Equal
        } else if value < 0 {
            ConditionCode::Less
        } else {
            ConditionCode::Greater
        }
    }

    /// Condition code of a comparison between the accumulator and a value
    #[must_use]
    pub fn compare(ac: Word, value: Word) -> Self {
        match ac.cmp(&value) {
            std::cmp::Ordering::Equal => ConditionCode::Equal,
            std::cmp::Ordering::Less => ConditionCode::Less,
            std::cmp::Ordering::Greater => ConditionCode::Greater,
        }
    }

    #[must_use]
    pub const fn code(self) -> Word {
        self as Word
    }
}

/// Program status word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Psw {
    pub condition: ConditionCode,

    pub flags: StatusFlags,

    /// Physical address of the next instruction
    pub pc: Word,
}

impl Default for Psw {
    fn default() -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let pc = C::USER_START as Word;
        Self {
            condition: ConditionCode::default(),
            flags: StatusFlags::default(),
            pc,
        }
    }
}

impl Psw {
    #[must_use]
    pub fn mode(&self) -> Mode {
        if self.flags.contains(StatusFlags::SUPERVISOR) {
            Mode::Kernel
        } else {
            Mode::User
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.flags.set(StatusFlags::SUPERVISOR, mode == Mode::Kernel);
    }

    #[must_use]
    pub fn interrupts_enabled(&self) -> bool {
        self.flags.contains(StatusFlags::INTERRUPT_ENABLE)
    }
}

impl std::fmt::Display for Psw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cc = {} | mode = {} | int = {} | pc = {}",
            self.condition.code(),
            self.mode(),
            u8::from(self.interrupts_enabled()),
            self.pc
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers {
    /// Accumulator
    pub ac: Word,

    /// Memory address register
    pub mar: Word,

    /// Memory data register
    pub mdr: Word,

    /// Instruction register
    pub ir: Word,

    /// Base register, lowest physical address of the running program
    pub rb: Word,

    /// Limit register, first physical address past the running program
    pub rl: Word,

    /// Auxiliary register, also the lower stack guard
    pub rx: Word,

    /// Stack pointer, as an offset from the base register
    pub sp: Word,
}

impl Default for Registers {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        let rb = C::USER_START as Word;
        let rl = C::MEMORY_SIZE as Word;
        Self {
            ac: 0,
            mar: 0,
            mdr: 0,
            ir: 0,
            rb,
            rl,
            rx: 0,
            sp: rl - rb - 1,
        }
    }
}

impl Registers {
    /// Stack pointer value of an empty stack
    #[must_use]
    pub const fn stack_top(&self) -> Word {
        self.rl - self.rb - 1
    }
}

impl std::fmt::Display for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "%ac = {} | %mar = {} | %mdr = {} | %ir = {:08} | %rb = {} | %rl = {} | %rx = {} | %sp = {}",
            self.ac, self.mar, self.mdr, self.ir, self.rb, self.rl, self.rx, self.sp
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display("%{}", style = "lowercase")]
pub enum Reg {
    Ac,
    Mar,
    Mdr,
    Ir,
    Rb,
    Rl,
    Rx,
    Sp,
    Pc,
}

#[derive(Error, Debug)]
#[error("could not parse register")]
pub struct RegisterParseError;

impl std::str::FromStr for Reg {
    type Err = RegisterParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.to_lowercase();
        match s.strip_prefix('%').unwrap_or(&s) {
            "ac" => Ok(Reg::Ac),
            "mar" => Ok(Reg::Mar),
            "mdr" => Ok(Reg::Mdr),
            "ir" => Ok(Reg::Ir),
            "rb" => Ok(Reg::Rb),
            "rl" => Ok(Reg::Rl),
            "rx" => Ok(Reg::Rx),
            "sp" => Ok(Reg::Sp),
            "pc" => Ok(Reg::Pc),
            _ => Err(RegisterParseError),
        }
    }
}
