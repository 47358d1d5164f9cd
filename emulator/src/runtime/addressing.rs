//! Addressing and protection unit.
//!
//! Operands are resolved relative to the base register. In user mode, every
//! physical address must fall in `%rb <= address < %rl`. Kernel mode may
//! access any address, but never outside of physical memory.

use tracing::debug;

use crate::constants::{Address, Word};

use super::{instructions::AddressingMode, interrupt::Interrupt, registers::Mode, Computer};

impl Computer {
    /// Check if the running program may access a physical address
    #[must_use]
    pub fn is_address_legal(&self, address: Address) -> bool {
        match self.psw.mode() {
            Mode::Kernel => true,
            Mode::User => {
                let base = Address::from(self.registers.rb);
                let limit = Address::from(self.registers.rl);
                (base..limit).contains(&address)
            }
        }
    }

    pub(crate) fn check_address(&self, address: Address) -> Result<Address, Interrupt> {
        if self.is_address_legal(address) {
            Ok(address)
        } else {
            debug!(
                address,
                rb = self.registers.rb,
                rl = self.registers.rl,
                "Address outside of the program segment"
            );
            Err(Interrupt::InvalidAddress)
        }
    }

    /// Physical address designated by an operand, `None` in immediate mode
    fn effective_address(&self, mode: AddressingMode, operand: Word) -> Option<Address> {
        let base = Address::from(self.registers.rb) + Address::from(operand);
        match mode {
            AddressingMode::Direct => Some(base),
            AddressingMode::Immediate => None,
            AddressingMode::Indexed => Some(base + Address::from(self.registers.ac)),
        }
    }

    /// Resolve an operand to the value it designates
    ///
    /// Memory reads go through `%mar` and `%mdr`.
    pub(crate) fn resolve_value(
        &mut self,
        mode: AddressingMode,
        operand: Word,
    ) -> Result<Word, Interrupt> {
        let Some(address) = self.effective_address(mode, operand) else {
            return Ok(operand);
        };

        self.check_address(address)?;
        let value = self.memory.get(address)?;
        // The address is within physical memory at this point
        self.registers.mar = Word::try_from(address).map_err(|_| Interrupt::InvalidAddress)?;
        self.registers.mdr = value;
        Ok(value)
    }

    /// Resolve an operand to the physical address a store writes to
    pub(crate) fn resolve_target(
        &self,
        mode: AddressingMode,
        operand: Word,
    ) -> Result<Address, Interrupt> {
        let Some(address) = self.effective_address(mode, operand) else {
            debug!(operand, "Immediate operand used as a store target");
            return Err(Interrupt::IllegalInstruction);
        };

        self.check_address(address)
    }
}
