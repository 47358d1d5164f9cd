use parse_display::Display;
use thiserror::Error;
use tracing::{debug, info};

use crate::constants::{Word, OPCODE_RADIX, OPERAND_RADIX};

use super::{
    interrupt::Interrupt,
    registers::{ConditionCode, Mode, StatusFlags},
    Computer,
};

/// Operation codes, by value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Opcode {
    /// Add a value to the accumulator
    #[display("add")]
    Add = 0,

    /// Substract a value from the accumulator
    #[display("sub")]
    Sub = 1,

    /// Multiply the accumulator by a value
    #[display("mul")]
    Mul = 2,

    /// Divide the accumulator by a value
    #[display("div")]
    Div = 3,

    /// Load a value in the accumulator
    #[display("load")]
    Load = 4,

    /// Store the accumulator in memory
    #[display("str")]
    Store = 5,

    /// Load a value in `%rx`
    #[display("loadrx")]
    LoadRx = 6,

    /// Store `%rx` in memory
    #[display("strrx")]
    StoreRx = 7,

    /// Compare the accumulator with a value
    #[display("comp")]
    Comp = 8,

    /// Jump if equal
    #[display("jmpe")]
    JumpEqual = 9,

    /// Jump if not equal
    #[display("jmpne")]
    JumpNotEqual = 10,

    /// Jump if strictly less
    #[display("jmplt")]
    JumpLess = 11,

    /// Jump if strictly greater
    #[display("jmplgt")]
    JumpGreater = 12,

    /// System call, `%ac = 0` terminates the program
    #[display("svc")]
    Syscall = 13,

    /// Pop the return address from the stack
    #[display("retrn")]
    Return = 14,

    /// Enable interrupts
    #[display("hab")]
    EnableInterrupts = 15,

    /// Disable interrupts
    #[display("dhab")]
    DisableInterrupts = 16,

    /// Set the timer period
    #[display("tti")]
    SetTimer = 17,

    /// Change the operation mode
    #[display("chmod")]
    ChangeMode = 18,

    /// Load `%rb` into the accumulator
    ///
    /// Like the other base and limit opcodes, this runs in user mode too.
    #[display("loadrb")]
    LoadBase = 19,

    #[display("strrb")]
    StoreBase = 20,

    #[display("loadrl")]
    LoadLimit = 21,

    #[display("strrl")]
    StoreLimit = 22,

    #[display("loadsp")]
    LoadSp = 23,

    #[display("strsp")]
    StoreSp = 24,

    /// Push the accumulator on the stack
    #[display("psh")]
    Push = 25,

    /// Pop the top of the stack into the accumulator
    #[display("pop")]
    Pop = 26,

    /// Unconditional jump
    #[display("j")]
    Jump = 27,

    #[display("sdmap")]
    DmaTrack = 28,

    #[display("sdmac")]
    DmaCylinder = 29,

    #[display("sdmas")]
    DmaSector = 30,

    #[display("sdmaio")]
    DmaDirection = 31,

    #[display("sdmam")]
    DmaAddress = 32,

    /// Start the DMA transfer
    #[display("sdmaon")]
    DmaOn = 33,
}

impl Opcode {
    /// Every opcode, ordered by value
    pub const ALL: [Opcode; 34] = [
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Load,
        Opcode::Store,
        Opcode::LoadRx,
        Opcode::StoreRx,
        Opcode::Comp,
        Opcode::JumpEqual,
        Opcode::JumpNotEqual,
        Opcode::JumpLess,
        Opcode::JumpGreater,
        Opcode::Syscall,
        Opcode::Return,
        Opcode::EnableInterrupts,
        Opcode::DisableInterrupts,
        Opcode::SetTimer,
        Opcode::ChangeMode,
        Opcode::LoadBase,
        Opcode::StoreBase,
        Opcode::LoadLimit,
        Opcode::StoreLimit,
        Opcode::LoadSp,
        Opcode::StoreSp,
        Opcode::Push,
        Opcode::Pop,
        Opcode::Jump,
        Opcode::DmaTrack,
        Opcode::DmaCylinder,
        Opcode::DmaSector,
        Opcode::DmaDirection,
        Opcode::DmaAddress,
        Opcode::DmaOn,
    ];

    #[must_use]
    pub const fn code(self) -> Word {
        self as Word
    }
}

impl TryFrom<Word> for Opcode {
    type Error = DecodeError;

    fn try_from(value: Word) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
            .ok_or(DecodeError::UnknownOpcode(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display(style = "lowercase")]
pub enum AddressingMode {
    /// The operand is an offset from `%rb`
    Direct = 0,

    /// The operand is the value itself
    Immediate = 1,

    /// The operand is an offset from `%rb + %ac`
    Indexed = 2,
}

impl TryFrom<Word> for AddressingMode {
    type Error = DecodeError;

    fn try_from(value: Word) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AddressingMode::Direct),
            1 => Ok(AddressingMode::Immediate),
            2 => Ok(AddressingMode::Indexed),
            other => Err(DecodeError::UnknownMode(other)),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("negative word {0} is not an instruction")]
    Negative(Word),

    #[error("unknown opcode {0:02}")]
    UnknownOpcode(Word),

    #[error("unknown addressing mode {0}")]
    UnknownMode(Word),

    #[error("operand {0} does not fit in five digits")]
    OperandOutOfRange(Word),
}

/// A decoded instruction word, `OOMIIIII`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    opcode: Opcode,
    mode: AddressingMode,
    operand: Word,
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mnemonic = self.opcode.to_string();
        match self.mode {
            AddressingMode::Direct => write!(f, "{mnemonic:<6} [{}]", self.operand),
            AddressingMode::Immediate => write!(f, "{mnemonic:<6} #{}", self.operand),
            AddressingMode::Indexed => write!(f, "{mnemonic:<6} [%ac+{}]", self.operand),
        }
    }
}

impl Instruction {
    /// Build an instruction
    ///
    /// # Errors
    ///
    /// Fails if the operand does not fit in five decimal digits
    pub fn new(opcode: Opcode, mode: AddressingMode, operand: Word) -> Result<Self, DecodeError> {
        if (0..OPERAND_RADIX).contains(&operand) {
            Ok(Self {
                opcode,
                mode,
                operand,
            })
        } else {
            Err(DecodeError::OperandOutOfRange(operand))
        }
    }

    /// Split a word into its decimal fields
    ///
    /// # Errors
    ///
    /// Fails on negative words, unknown opcodes or unknown addressing modes
    pub fn decode(word: Word) -> Result<Self, DecodeError> {
        if word < 0 {
            return Err(DecodeError::Negative(word));
        }

        let opcode = Opcode::try_from(word / OPCODE_RADIX)?;
        let mode = AddressingMode::try_from((word / OPERAND_RADIX) % 10)?;
        let operand = word % OPERAND_RADIX;

        Ok(Self {
            opcode,
            mode,
            operand,
        })
    }

    #[must_use]
    pub const fn encode(&self) -> Word {
        self.opcode.code() * OPCODE_RADIX + (self.mode as Word) * OPERAND_RADIX + self.operand
    }

    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    #[must_use]
    pub const fn mode(&self) -> AddressingMode {
        self.mode
    }

    #[must_use]
    pub const fn operand(&self) -> Word {
        self.operand
    }

    /// Execute the instruction
    ///
    /// Any fault is returned as the interrupt to raise. The caller latches it
    /// into the interrupt slot.
    #[allow(clippy::too_many_lines)]
    #[tracing::instrument(skip(computer), level = "debug")]
    pub(crate) fn execute(&self, computer: &mut Computer) -> Result<(), Interrupt> {
        use Opcode::*;

        let mode = self.mode;
        let operand = self.operand;

        match self.opcode {
            Add => {
                let a = computer.registers.ac;
                let b = computer.resolve_value(mode, operand)?;
                let res = i64::from(a) + i64::from(b);
                debug!("{} + {} = {}", a, b, res);
                computer.store_result(res)?;
            }

            Sub => {
                let a = computer.registers.ac;
                let b = computer.resolve_value(mode, operand)?;
                let res = i64::from(a) - i64::from(b);
                debug!("{} - {} = {}", a, b, res);
                computer.store_result(res)?;
            }

            Mul => {
                let a = computer.registers.ac;
                let b = computer.resolve_value(mode, operand)?;
                let res = i64::from(a) * i64::from(b);
                debug!("{} * {} = {}", a, b, res);
                computer.store_result(res)?;
            }

            Div => {
                let a = computer.registers.ac;
                let b = computer.resolve_value(mode, operand)?;
                let Some(res) = i64::from(a).checked_div(i64::from(b)) else {
                    debug!("{} / {} is a division by zero", a, b);
                    computer.psw.condition = ConditionCode::Fault;
                    return Err(Interrupt::Overflow);
                };
                debug!("{} / {} = {}", a, b, res);
                computer.store_result(res)?;
            }

            Load => {
                computer.registers.ac = computer.resolve_value(mode, operand)?;
            }

            Store => {
                let target = computer.resolve_target(mode, operand)?;
                *computer.memory.get_mut(target)? = computer.registers.ac;
                debug!(address = target, value = computer.registers.ac, "Stored %ac");
            }

            LoadRx => {
                computer.registers.rx = computer.resolve_value(mode, operand)?;
            }

            StoreRx => {
                let target = computer.resolve_target(mode, operand)?;
                *computer.memory.get_mut(target)? = computer.registers.rx;
                debug!(address = target, value = computer.registers.rx, "Stored %rx");
            }

            Comp => {
                let value = computer.resolve_value(mode, operand)?;
                computer.psw.condition = ConditionCode::compare(computer.registers.ac, value);
                debug!("comp({}, {}) => {}", computer.registers.ac, value, computer.psw.condition);
            }

            JumpEqual => {
                if computer.psw.condition == ConditionCode::Equal {
                    computer.jump(operand)?;
                }
            }

            JumpNotEqual => {
                if computer.psw.condition != ConditionCode::Equal {
                    computer.jump(operand)?;
                }
            }

            JumpLess => {
                if computer.psw.condition == ConditionCode::Less {
                    computer.jump(operand)?;
                }
            }

            JumpGreater => {
                if computer.psw.condition == ConditionCode::Greater {
                    computer.jump(operand)?;
                }
            }

            Syscall => {
                info!(code = computer.registers.ac, "System call");
                if computer.registers.ac == 0 {
                    info!("Program requested termination");
                    computer.running = false;
                }
                computer.raise(Interrupt::Syscall);
            }

            Return => {
                computer.psw.pc = computer.pop()?;
                debug!("Returning to {}", computer.psw.pc);
            }

            EnableInterrupts => {
                computer.psw.flags.insert(StatusFlags::INTERRUPT_ENABLE);
            }

            DisableInterrupts => {
                computer.psw.flags.remove(StatusFlags::INTERRUPT_ENABLE);
            }

            SetTimer => {
                let period = computer.resolve_value(mode, operand)?;
                info!(period, "Timer configured");
                computer.timer_period = period;
            }

            ChangeMode => {
                if computer.psw.mode() != Mode::Kernel {
                    debug!("Mode change attempted from user mode");
                    return Err(Interrupt::IllegalInstruction);
                }

                let value = computer.resolve_value(mode, operand)?;
                let new_mode = Mode::from_word(value).ok_or(Interrupt::IllegalInstruction)?;
                info!(mode = %new_mode, "Changing operation mode");
                computer.psw.set_mode(new_mode);
            }

            LoadBase => {
                computer.registers.ac = computer.registers.rb;
            }

            StoreBase => {
                computer.registers.rb = computer.registers.ac;
            }

            LoadLimit => {
                computer.registers.ac = computer.registers.rl;
            }

            StoreLimit => {
                computer.registers.rl = computer.registers.ac;
            }

            LoadSp => {
                computer.registers.ac = computer.registers.sp;
            }

            StoreSp => {
                computer.registers.sp = computer.registers.ac;
            }

            Push => {
                computer.push(computer.registers.ac)?;
            }

            Pop => {
                computer.registers.ac = computer.pop()?;
            }

            Jump => {
                computer.jump(operand)?;
            }

            DmaTrack => {
                computer.dma.track = computer.resolve_value(mode, operand)?;
            }

            DmaCylinder => {
                computer.dma.cylinder = computer.resolve_value(mode, operand)?;
            }

            DmaSector => {
                computer.dma.sector = computer.resolve_value(mode, operand)?;
            }

            DmaDirection => {
                computer.dma.direction = computer.resolve_value(mode, operand)?;
            }

            DmaAddress => {
                computer.dma.address = computer.resolve_value(mode, operand)?;
            }

            DmaOn => {
                debug!(request = %computer.dma, "Arming DMA");
                computer.dma.arm();
            }
        };

        Ok(())
    }
}
