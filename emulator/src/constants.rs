use std::time::Duration;

/// A machine word, holding at most 8 decimal digits of magnitude
pub type Word = i32;

/// A physical address, wide enough to hold any sum of registers and operands
pub type Address = i64;

/// Total size of the computer memory
pub const MEMORY_SIZE: Address = 2000;

/// First address of the user region. Everything below belongs to the kernel.
pub const USER_START: Address = 300;

/// Largest value a word can hold
pub const WORD_MAX: Word = 99_999_999;

/// Smallest value a word can hold
pub const WORD_MIN: Word = -99_999_999;

/// Divisor isolating the two opcode digits of an instruction
pub(crate) const OPCODE_RADIX: Word = 1_000_000;

/// Divisor isolating the addressing mode digit and the operand
pub(crate) const OPERAND_RADIX: Word = 100_000;

/// Number of tracks on the disk
pub const DISK_TRACKS: usize = 10;

/// Number of cylinders per track
pub const DISK_CYLINDERS: usize = 10;

/// Number of sectors per cylinder
pub const DISK_SECTORS: usize = 100;

/// Width of a sector buffer in bytes, terminator included
pub const SECTOR_WIDTH: usize = 9;

/// Real time represented by one unit of the timer period
pub const DEFAULT_TICK_UNIT: Duration = Duration::from_millis(1);

/// How long the timer waits before checking again when it is disarmed
pub const DEFAULT_TIMER_IDLE: Duration = Duration::from_millis(10);

/// Simulated seek and rotation delay of a DMA transfer
pub const DEFAULT_DMA_LATENCY: Duration = Duration::from_millis(20);

/// Words reserved for the stack on top of a program when it is admitted
pub const DEFAULT_STACK_WORDS: Address = 100;
