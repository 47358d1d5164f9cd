use thiserror::Error;
use tracing::debug;

use crate::constants::Word;

/// An interrupt, as seen by the interrupt controller
///
/// The discriminant is the code reported by the hardware.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interrupt {
    #[error("invalid system call code")]
    InvalidSyscall = 0,

    #[error("invalid interrupt code")]
    InvalidCode = 1,

    #[error("system call")]
    Syscall = 2,

    #[error("clock tick")]
    Clock = 3,

    #[error("I/O completion")]
    IoCompletion = 4,

    #[error("illegal instruction")]
    IllegalInstruction = 5,

    #[error("invalid address")]
    InvalidAddress = 6,

    #[error("underflow")]
    Underflow = 7,

    #[error("overflow")]
    Overflow = 8,
}

impl Interrupt {
    /// Every interrupt, ordered by code
    pub const ALL: [Interrupt; 9] = [
        Interrupt::InvalidSyscall,
        Interrupt::InvalidCode,
        Interrupt::Syscall,
        Interrupt::Clock,
        Interrupt::IoCompletion,
        Interrupt::IllegalInstruction,
        Interrupt::InvalidAddress,
        Interrupt::Underflow,
        Interrupt::Overflow,
    ];

    #[must_use]
    pub const fn code(self) -> Word {
        self as Word
    }

    /// Look up an interrupt from its code
    #[must_use]
    pub fn from_code(code: Word) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.code() == code)
    }

    /// Fatal interrupts end the current dispatch
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        !matches!(
            self,
            Interrupt::Syscall | Interrupt::Clock | Interrupt::IoCompletion
        )
    }
}

/// The single-slot pending interrupt register
///
/// Only one interrupt can be pending at a time. Raising an interrupt while
/// another one is pending drops the new one: the first raised wins.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InterruptSlot {
    pending: Option<Interrupt>,
}

impl InterruptSlot {
    /// Latch an interrupt, returns `false` if it was dropped
    pub fn raise(&mut self, interrupt: Interrupt) -> bool {
        if let Some(pending) = self.pending {
            debug!(%interrupt, %pending, "Dropping interrupt, another one is pending");
            false
        } else {
            self.pending = Some(interrupt);
            true
        }
    }

    /// Drain the slot
    pub fn take(&mut self) -> Option<Interrupt> {
        self.pending.take()
    }

    #[must_use]
    pub const fn pending(&self) -> Option<Interrupt> {
        self.pending
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
