use thiserror::Error;

use crate::constants::{Address, Word, MEMORY_SIZE};

/// Represents errors related to memory manipulations
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// The given address was outside of physical memory
    #[error("invalid address {0}")]
    InvalidAddress(Address),
}

/// Holds the words of the computer.
///
/// It has 2000 words, all set to zero on startup.
#[derive(Clone)]
pub struct Memory {
    inner: Box<[Word]>,
}

impl Default for Memory {
    fn default() -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let size = MEMORY_SIZE as usize;
        Self {
            inner: vec![0; size].into_boxed_slice(),
        }
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Memory {{ size: {} }}", self.inner.len())
    }
}

impl Memory {
    fn index(address: Address) -> Result<usize, MemoryError> {
        usize::try_from(address)
            .ok()
            .filter(|&index| index < Self::len())
            .ok_or(MemoryError::InvalidAddress(address))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    const fn len() -> usize {
        MEMORY_SIZE as usize
    }

    /// Get the word at an address
    ///
    /// # Errors
    ///
    /// It fails if the address is negative or out of bounds.
    pub fn get(&self, address: Address) -> Result<Word, MemoryError> {
        let index = Self::index(address)?;
        Ok(self.inner[index])
    }

    /// Get a mutable reference to the word at an address
    ///
    /// # Errors
    ///
    /// It fails if the address is negative or out of bounds.
    pub fn get_mut(&mut self, address: Address) -> Result<&mut Word, MemoryError> {
        let index = Self::index(address)?;
        Ok(&mut self.inner[index])
    }

    /// Copy a block of words starting at `start`
    ///
    /// Nothing is written if the block does not entirely fit in memory.
    ///
    /// # Errors
    ///
    /// It fails if any address of the block is out of bounds.
    pub fn write_block(&mut self, start: Address, words: &[Word]) -> Result<(), MemoryError> {
        let first = Self::index(start)?;
        let end = first + words.len();
        if end > Self::len() {
            #[allow(clippy::cast_possible_wrap)]
            return Err(MemoryError::InvalidAddress(end as Address - 1));
        }

        self.inner[first..end].copy_from_slice(words);
        Ok(())
    }

    /// Iterate over `len` words starting at `start`, stopping at the end of memory
    pub fn iter_range(&self, start: Address, len: usize) -> impl Iterator<Item = (Address, Word)> + '_ {
        (start..)
            .take(len)
            .map_while(move |address| self.get(address).ok().map(|word| (address, word)))
    }
}
