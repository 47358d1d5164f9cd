use tracing::{debug, info, trace, warn};

use crate::constants::{Address, Word, WORD_MAX, WORD_MIN};
use crate::process::Pcb;

mod addressing;
mod disk;
mod dma;
mod instructions;
mod interrupt;
mod machine;
mod memory;
mod registers;
mod timer;

pub use self::disk::{Disk, GeometryError, Sector};
pub use self::dma::{Direction, DmaController, DmaError, DmaStatus};
pub use self::instructions::{AddressingMode, DecodeError, Instruction, Opcode};
pub use self::interrupt::{Interrupt, InterruptSlot};
pub use self::machine::{Machine, MachineConfig, MachineError, RunReport};
pub use self::memory::{Memory, MemoryError};
pub use self::registers::{ConditionCode, Mode, Psw, Reg, Registers, StatusFlags};

// Memory faults always surface as an invalid address interrupt
impl From<MemoryError> for Interrupt {
    fn from(_: MemoryError) -> Self {
        Self::InvalidAddress
    }
}

/// The whole machine state, guarded by the machine lock
#[derive(Debug, Default)]
pub struct Computer {
    pub registers: Registers,
    pub psw: Psw,
    pub memory: Memory,
    pub disk: Disk,
    pub dma: DmaController,

    /// Timer period in ticks, `0` disarms the timer
    pub timer_period: Word,

    pub interrupt: InterruptSlot,

    /// Cleared on termination and on fatal interrupts
    pub running: bool,

    pub cycles: usize,
}

impl Computer {
    /// Current value of a register
    #[must_use]
    pub const fn register(&self, reg: Reg) -> Word {
        match reg {
            Reg::Ac => self.registers.ac,
            Reg::Mar => self.registers.mar,
            Reg::Mdr => self.registers.mdr,
            Reg::Ir => self.registers.ir,
            Reg::Rb => self.registers.rb,
            Reg::Rl => self.registers.rl,
            Reg::Rx => self.registers.rx,
            Reg::Sp => self.registers.sp,
            Reg::Pc => self.psw.pc,
        }
    }

    /// Latch an interrupt, returns `false` if another one was already pending
    pub fn raise(&mut self, interrupt: Interrupt) -> bool {
        trace!(%interrupt, code = interrupt.code(), "Raising interrupt");
        self.interrupt.raise(interrupt)
    }

    fn fetch(&mut self) -> Result<Instruction, Interrupt> {
        let pc = self.psw.pc;
        self.registers.mar = pc;
        let address = self.check_address(Address::from(pc))?;
        let word = self.memory.get(address)?;
        self.registers.mdr = word;
        self.registers.ir = word;
        self.psw.pc = pc + 1;

        Instruction::decode(word).map_err(|error| {
            debug!(pc, word, %error, "Could not decode instruction");
            Interrupt::IllegalInstruction
        })
    }

    /// Run one fetch, decode and execute cycle
    ///
    /// Faults never abort the cycle. They are latched in the interrupt slot
    /// and delivered by [`Computer::check_interrupts`].
    pub fn step(&mut self) {
        let result = self.fetch().and_then(|instruction| {
            debug!(pc = self.registers.mar, "Executing \"{}\"", instruction);
            instruction.execute(self)
        });

        if let Err(interrupt) = result {
            self.raise(interrupt);
        }

        self.cycles += 1;
        trace!(registers = %self.registers, psw = %self.psw, "Cycle done");
    }

    /// Deliver the pending interrupt, if any
    ///
    /// Fatal interrupts stop the program. The slot is always drained.
    pub fn check_interrupts(&mut self) -> Option<Interrupt> {
        let interrupt = self.interrupt.take()?;

        if interrupt.is_fatal() {
            warn!(
                code = interrupt.code(),
                pc = self.psw.pc,
                ac = self.registers.ac,
                "Fatal interrupt: {}",
                interrupt
            );
            self.running = false;
        } else {
            info!(code = interrupt.code(), "Interrupt: {}", interrupt);
        }

        Some(interrupt)
    }

    /// One step followed by the interrupt check, returns whether the program
    /// is still running
    pub fn cycle(&mut self) -> bool {
        self.step();
        self.check_interrupts();
        self.running
    }

    /// Prepare the processor to run a process
    #[allow(clippy::cast_possible_truncation)]
    pub fn dispatch(&mut self, pcb: &Pcb, mode: Mode) {
        // Process regions always fit in physical memory
        let base = pcb.base as Word;
        let limit = pcb.limit as Word;

        self.registers.rb = base;
        self.registers.rl = limit;
        self.registers.sp = self.registers.stack_top();
        self.registers.ac = 0;
        self.registers.rx = 0;
        self.psw.pc = base + pcb.start_offset as Word;
        self.psw.condition = ConditionCode::default();
        self.psw.set_mode(mode);
        self.timer_period = 0;
        self.dma.disarm();

        if let Some(stale) = self.interrupt.take() {
            debug!(%stale, "Discarding stale interrupt");
        }

        self.running = true;
        info!(
            id = pcb.id,
            name = %pcb.name,
            %mode,
            "Dispatching process: {}",
            self.registers
        );
    }

    /// Store an arithmetic result in the accumulator
    pub(crate) fn store_result(&mut self, result: i64) -> Result<(), Interrupt> {
        if result > i64::from(WORD_MAX) {
            debug!(result, "Arithmetic overflow");
            self.psw.condition = ConditionCode::Fault;
            return Err(Interrupt::Overflow);
        }

        if result < i64::from(WORD_MIN) {
            debug!(result, "Arithmetic underflow");
            self.psw.condition = ConditionCode::Fault;
            return Err(Interrupt::Underflow);
        }

        let value = Word::try_from(result).map_err(|_| Interrupt::Overflow)?;
        self.registers.ac = value;
        self.psw.condition = ConditionCode::from_sign(value);
        Ok(())
    }

    /// Jump to an offset of the program segment
    pub(crate) fn jump(&mut self, operand: Word) -> Result<(), Interrupt> {
        let target = self
            .registers
            .rb
            .checked_add(operand)
            .ok_or(Interrupt::InvalidAddress)?;
        debug!("Jumping to address {}", target);
        self.psw.pc = target;
        Ok(())
    }

    /// Push a value, between the `%rx` guard and the limit register
    pub(crate) fn push(&mut self, value: Word) -> Result<(), Interrupt> {
        let sp = self.registers.sp;
        let address = Address::from(self.registers.rb) + Address::from(sp);

        if sp < self.registers.rx || address >= Address::from(self.registers.rl) {
            debug!(sp, rx = self.registers.rx, address, "Stack overflow");
            return Err(Interrupt::Overflow);
        }

        let address = self.check_address(address)?;
        *self.memory.get_mut(address)? = value;
        self.registers.sp = sp - 1;
        debug!(value, address, sp = self.registers.sp, "Pushed value");
        Ok(())
    }

    /// Pop the value on top of the stack
    pub(crate) fn pop(&mut self) -> Result<Word, Interrupt> {
        let sp = self.registers.sp;
        if sp >= self.registers.stack_top() {
            debug!(sp, "Stack underflow");
            return Err(Interrupt::Underflow);
        }

        let sp = sp + 1;
        let address = self.check_address(Address::from(self.registers.rb) + Address::from(sp))?;
        let value = self.memory.get(address)?;
        self.registers.sp = sp;
        debug!(value, address, sp, "Popped value");
        Ok(value)
    }

    /// Perform the armed DMA transfer, then raise the completion interrupt
    pub(crate) fn complete_dma(&mut self) -> DmaStatus {
        let status = self.dma.transfer(&mut self.memory, &mut self.disk);
        self.raise(Interrupt::IoCompletion);
        self.dma.disarm();
        status
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn inst(opcode: Opcode, mode: AddressingMode, operand: Word) -> Word {
        Instruction::new(opcode, mode, operand).unwrap().encode()
    }

    fn boot(program: &[Word]) -> Computer {
        let mut computer = Computer::default();
        computer.memory.write_block(300, program).unwrap();
        let pcb = Pcb {
            id: 1,
            name: "test".into(),
            base: 300,
            limit: 400,
            start_offset: 0,
        };
        computer.dispatch(&pcb, Mode::User);
        computer
    }

    #[test]
    fn dispatch_test() {
        let mut computer = Computer::default();
        computer.raise(Interrupt::Clock);
        computer.timer_period = 5;
        computer.registers.ac = 12;

        let pcb = Pcb {
            id: 3,
            name: "sum".into(),
            base: 500,
            limit: 620,
            start_offset: 4,
        };
        computer.dispatch(&pcb, Mode::User);

        assert!(computer.running);
        assert_eq!(computer.registers.rb, 500);
        assert_eq!(computer.registers.rl, 620);
        assert_eq!(computer.registers.sp, 119);
        assert_eq!(computer.registers.ac, 0);
        assert_eq!(computer.psw.pc, 504);
        assert_eq!(computer.psw.mode(), Mode::User);
        assert_eq!(computer.timer_period, 0);
        assert_eq!(computer.interrupt.pending(), None);
        assert_eq!(computer.register(Reg::Pc), 504);
        assert_eq!(computer.register(Reg::Sp), 119);
    }

    #[test]
    fn arithmetic_test() {
        let mut computer = boot(&[
            101_005,
            inst(Opcode::Sub, AddressingMode::Immediate, 2000),
            inst(Opcode::Mul, AddressingMode::Immediate, 2),
            inst(Opcode::Div, AddressingMode::Immediate, 10),
        ]);

        assert!(computer.cycle());
        assert_eq!(computer.registers.ac, 1005);
        assert_eq!(computer.psw.condition, ConditionCode::Greater);

        assert!(computer.cycle());
        assert_eq!(computer.registers.ac, -995);
        assert_eq!(computer.psw.condition, ConditionCode::Less);

        assert!(computer.cycle());
        assert_eq!(computer.registers.ac, -1990);

        assert!(computer.cycle());
        assert_eq!(computer.registers.ac, -199);
        assert_eq!(computer.cycles, 4);
        assert_eq!(computer.psw.pc, 304);
    }

    #[test]
    fn overflow_test() {
        let mut computer = boot(&[inst(Opcode::Add, AddressingMode::Immediate, 1)]);
        computer.registers.ac = WORD_MAX;

        computer.step();
        assert_eq!(computer.registers.ac, WORD_MAX);
        assert_eq!(computer.psw.condition, ConditionCode::Fault);
        assert_eq!(computer.check_interrupts(), Some(Interrupt::Overflow));
        assert!(!computer.running);
    }

    #[test]
    fn underflow_test() {
        let mut computer = boot(&[inst(Opcode::Sub, AddressingMode::Immediate, 1)]);
        computer.registers.ac = WORD_MIN;

        assert!(!computer.cycle());
        assert_eq!(computer.registers.ac, WORD_MIN);
        assert_eq!(computer.interrupt.pending(), None);
    }

    #[test]
    fn bounds_are_inclusive_test() {
        let mut computer = boot(&[
            inst(Opcode::Add, AddressingMode::Immediate, 1),
            inst(Opcode::Sub, AddressingMode::Immediate, 1),
        ]);
        computer.registers.ac = WORD_MAX - 1;
        assert!(computer.cycle());
        assert_eq!(computer.registers.ac, WORD_MAX);

        computer.registers.ac = WORD_MIN + 1;
        assert!(computer.cycle());
        assert_eq!(computer.registers.ac, WORD_MIN);
    }

    #[test]
    fn division_by_zero_test() {
        let mut computer = boot(&[inst(Opcode::Div, AddressingMode::Immediate, 0)]);
        computer.registers.ac = 10;

        computer.step();
        assert_eq!(computer.registers.ac, 10);
        assert_eq!(computer.check_interrupts(), Some(Interrupt::Overflow));
    }

    #[test]
    fn load_store_test() {
        let mut computer = boot(&[
            inst(Opcode::Load, AddressingMode::Immediate, 7),
            inst(Opcode::Store, AddressingMode::Direct, 50),
            inst(Opcode::Load, AddressingMode::Immediate, 2),
            inst(Opcode::Store, AddressingMode::Indexed, 50),
            inst(Opcode::LoadRx, AddressingMode::Direct, 50),
            inst(Opcode::Store, AddressingMode::Immediate, 50),
        ]);

        for _ in 0..5 {
            assert!(computer.cycle());
        }
        assert_eq!(computer.memory.get(350), Ok(7));
        assert_eq!(computer.memory.get(352), Ok(2));
        assert_eq!(computer.registers.rx, 7);

        // Immediate operands are not a store target
        computer.step();
        assert_eq!(
            computer.check_interrupts(),
            Some(Interrupt::IllegalInstruction)
        );
    }

    #[test]
    fn store_outside_segment_test() {
        let mut computer = boot(&[inst(Opcode::Store, AddressingMode::Direct, 100)]);

        computer.step();
        assert_eq!(computer.memory.get(400), Ok(0));
        assert_eq!(computer.check_interrupts(), Some(Interrupt::InvalidAddress));
    }

    #[test]
    fn compare_and_jump_test() {
        let mut computer = boot(&[
            inst(Opcode::Load, AddressingMode::Immediate, 3),
            inst(Opcode::Comp, AddressingMode::Immediate, 3),
            inst(Opcode::JumpNotEqual, AddressingMode::Direct, 0),
            inst(Opcode::JumpEqual, AddressingMode::Direct, 10),
        ]);

        for _ in 0..4 {
            assert!(computer.cycle());
        }
        assert_eq!(computer.psw.condition, ConditionCode::Equal);
        assert_eq!(computer.psw.pc, 310);
    }

    #[test]
    fn conditional_jumps_test() {
        use ConditionCode::{Equal, Fault, Greater, Less};

        let table = [
            (Opcode::JumpEqual, [true, false, false, false]),
            (Opcode::JumpNotEqual, [false, true, true, true]),
            (Opcode::JumpLess, [false, true, false, false]),
            (Opcode::JumpGreater, [false, false, true, false]),
        ];

        for (opcode, expected) in table {
            for (condition, taken) in [Equal, Less, Greater, Fault].into_iter().zip(expected) {
                let mut computer = boot(&[inst(opcode, AddressingMode::Direct, 10)]);
                computer.psw.condition = condition;

                assert!(computer.cycle());
                let pc = if taken { 310 } else { 301 };
                assert_eq!(computer.psw.pc, pc, "{opcode} with {condition:?}");
            }
        }
    }

    #[test]
    fn jumps_are_relative_to_base_test() {
        let mut computer = Computer::default();
        let jump = inst(Opcode::Jump, AddressingMode::Direct, 3);
        computer.memory.write_block(500, &[jump]).unwrap();
        let pcb = Pcb {
            id: 1,
            name: "far".into(),
            base: 500,
            limit: 600,
            start_offset: 0,
        };
        computer.dispatch(&pcb, Mode::User);

        assert!(computer.cycle());
        assert_eq!(computer.psw.pc, 503);
    }

    #[test]
    fn push_pop_test() {
        let mut computer = boot(&[
            inst(Opcode::Load, AddressingMode::Immediate, 42),
            inst(Opcode::Push, AddressingMode::Direct, 0),
            inst(Opcode::Load, AddressingMode::Immediate, 0),
            inst(Opcode::Pop, AddressingMode::Direct, 0),
        ]);
        let top = computer.registers.stack_top();

        assert!(computer.cycle());
        assert!(computer.cycle());
        assert_eq!(computer.registers.sp, top - 1);
        assert_eq!(computer.memory.get(399), Ok(42));

        assert!(computer.cycle());
        assert!(computer.cycle());
        assert_eq!(computer.registers.ac, 42);
        assert_eq!(computer.registers.sp, top);
    }

    #[test]
    fn push_at_guard_test() {
        let mut computer = boot(&[inst(Opcode::Push, AddressingMode::Direct, 0)]);
        computer.registers.ac = 9;
        computer.registers.rx = computer.registers.sp + 1;
        let sp = computer.registers.sp;

        computer.step();
        assert_eq!(computer.registers.sp, sp);
        assert_eq!(computer.memory.get(399), Ok(0));
        assert_eq!(computer.check_interrupts(), Some(Interrupt::Overflow));
    }

    #[test]
    fn push_past_limit_test() {
        let mut computer = boot(&[
            inst(Opcode::Load, AddressingMode::Immediate, 100),
            inst(Opcode::StoreSp, AddressingMode::Direct, 0),
            inst(Opcode::Load, AddressingMode::Immediate, 9),
            inst(Opcode::Push, AddressingMode::Direct, 0),
        ]);

        for _ in 0..3 {
            assert!(computer.cycle());
        }
        assert_eq!(computer.registers.sp, 100);

        computer.step();
        assert_eq!(computer.registers.sp, 100);
        assert_eq!(computer.memory.get(400), Ok(0));
        assert_eq!(computer.check_interrupts(), Some(Interrupt::Overflow));
    }

    #[test]
    fn pop_empty_stack_test() {
        let mut computer = boot(&[inst(Opcode::Pop, AddressingMode::Direct, 0)]);
        computer.registers.ac = 5;

        computer.step();
        assert_eq!(computer.registers.ac, 5);
        assert_eq!(computer.check_interrupts(), Some(Interrupt::Underflow));
        assert!(!computer.running);
    }

    #[test]
    fn return_test() {
        let mut computer = boot(&[inst(Opcode::Return, AddressingMode::Direct, 0)]);
        computer.push(320).unwrap();

        assert!(computer.cycle());
        assert_eq!(computer.psw.pc, 320);
    }

    #[test]
    fn change_mode_test() {
        let chmod = |value| inst(Opcode::ChangeMode, AddressingMode::Immediate, value);

        let mut computer = boot(&[chmod(1)]);
        computer.step();
        assert_eq!(
            computer.check_interrupts(),
            Some(Interrupt::IllegalInstruction)
        );
        assert_eq!(computer.psw.mode(), Mode::User);

        let mut computer = boot(&[chmod(0), chmod(1)]);
        computer.psw.set_mode(Mode::Kernel);
        assert!(computer.cycle());
        assert_eq!(computer.psw.mode(), Mode::User);

        let mut computer = boot(&[chmod(2)]);
        computer.psw.set_mode(Mode::Kernel);
        computer.step();
        assert_eq!(
            computer.check_interrupts(),
            Some(Interrupt::IllegalInstruction)
        );
        assert_eq!(computer.psw.mode(), Mode::Kernel);
    }

    #[test]
    fn syscall_test() {
        let svc = inst(Opcode::Syscall, AddressingMode::Direct, 0);
        let mut computer = boot(&[svc, svc]);

        computer.registers.ac = 5;
        computer.step();
        assert_eq!(computer.check_interrupts(), Some(Interrupt::Syscall));
        assert!(computer.running);

        computer.registers.ac = 0;
        computer.step();
        assert_eq!(computer.check_interrupts(), Some(Interrupt::Syscall));
        assert!(!computer.running);
    }

    #[test]
    fn privileged_registers_test() {
        let mut computer = boot(&[
            inst(Opcode::LoadBase, AddressingMode::Direct, 0),
            inst(Opcode::StoreLimit, AddressingMode::Direct, 0),
            inst(Opcode::LoadSp, AddressingMode::Direct, 0),
        ]);

        assert!(computer.cycle());
        assert_eq!(computer.registers.ac, 300);

        // Nothing prevents a user program from moving its own limit
        assert!(computer.cycle());
        assert_eq!(computer.registers.rl, 300);
        assert!(!computer.cycle());
        assert_eq!(computer.registers.ac, 300);

        let mut computer = boot(&[
            inst(Opcode::EnableInterrupts, AddressingMode::Direct, 0),
            inst(Opcode::SetTimer, AddressingMode::Immediate, 50),
            inst(Opcode::DisableInterrupts, AddressingMode::Direct, 0),
        ]);
        assert!(computer.cycle());
        assert!(computer.psw.interrupts_enabled());
        assert!(computer.cycle());
        assert_eq!(computer.timer_period, 50);
        assert!(computer.cycle());
        assert!(!computer.psw.interrupts_enabled());
    }

    #[test]
    fn illegal_words_test() {
        for word in [34_000_000, 4_300_000, -1] {
            let mut computer = boot(&[word]);
            computer.step();
            assert_eq!(
                computer.check_interrupts(),
                Some(Interrupt::IllegalInstruction)
            );
            assert!(!computer.running);
        }
    }

    #[test]
    fn fetch_outside_segment_test() {
        let mut computer = boot(&[inst(Opcode::Jump, AddressingMode::Direct, 100)]);

        assert!(computer.cycle());
        assert!(!computer.cycle());
        assert_eq!(computer.registers.mar, 400);
    }

    #[test]
    fn single_slot_test() {
        let mut computer = boot(&[inst(Opcode::Load, AddressingMode::Immediate, 1)]);

        assert!(computer.raise(Interrupt::Clock));
        assert!(!computer.raise(Interrupt::IoCompletion));
        computer.step();

        assert_eq!(computer.check_interrupts(), Some(Interrupt::Clock));
        assert_eq!(computer.check_interrupts(), None);
        assert!(computer.running);
    }

    #[test]
    fn fault_is_dropped_when_slot_is_busy_test() {
        let mut computer = boot(&[inst(Opcode::Div, AddressingMode::Immediate, 0)]);
        computer.raise(Interrupt::Clock);

        computer.step();
        assert_eq!(computer.check_interrupts(), Some(Interrupt::Clock));
        assert!(computer.running);
    }

    #[test]
    fn dma_registers_test() {
        let mut computer = boot(&[
            inst(Opcode::DmaTrack, AddressingMode::Immediate, 1),
            inst(Opcode::DmaCylinder, AddressingMode::Immediate, 2),
            inst(Opcode::DmaSector, AddressingMode::Immediate, 3),
            inst(Opcode::DmaDirection, AddressingMode::Immediate, 1),
            inst(Opcode::DmaAddress, AddressingMode::Immediate, 350),
            inst(Opcode::DmaOn, AddressingMode::Direct, 0),
        ]);
        *computer.memory.get_mut(350).unwrap() = -1234;

        for _ in 0..6 {
            assert!(computer.cycle());
        }
        assert!(computer.dma.is_active());
        assert_eq!(computer.dma.to_string(), "write disk[1][2][3] <-> memory[350]");

        assert_eq!(computer.complete_dma(), DmaStatus::Success);
        assert!(!computer.dma.is_active());
        assert_eq!(computer.disk.sector(1, 2, 3).unwrap().text(), "-1234");
        assert_eq!(computer.check_interrupts(), Some(Interrupt::IoCompletion));
    }
}
