//! DMA controller and its background unit.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::constants::{Address, Word};

use super::{
    disk::{Disk, GeometryError},
    machine::Shared,
    memory::{Memory, MemoryError},
};

/// Value of the DMA status register
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DmaStatus {
    #[default]
    Success = 0,
    Error = 1,
}

/// Direction of a transfer, as set by `sdmaio`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Disk to memory
    Read = 0,

    /// Memory to disk
    Write = 1,
}

impl TryFrom<Word> for Direction {
    type Error = DmaError;

    fn try_from(value: Word) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::Read),
            1 => Ok(Direction::Write),
            other => Err(DmaError::InvalidDirection(other)),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DmaError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("memory {0}")]
    Memory(#[from] MemoryError),

    #[error("invalid transfer direction {0}")]
    InvalidDirection(Word),
}

/// DMA registers, written by the `sdma*` instructions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DmaController {
    pub track: Word,
    pub cylinder: Word,
    pub sector: Word,

    /// Physical memory address of the transfer
    pub address: Word,

    /// `0` reads from the disk, `1` writes to it
    pub direction: Word,

    pub status: DmaStatus,

    active: bool,

    /// Set when armed, until the CPU loop wakes the unit up
    doorbell: bool,
}

impl std::fmt::Display for DmaController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let direction = match Direction::try_from(self.direction) {
            Ok(Direction::Read) => "read",
            Ok(Direction::Write) => "write",
            Err(_) => "invalid",
        };
        write!(
            f,
            "{direction} disk[{}][{}][{}] <-> memory[{}]",
            self.track, self.cylinder, self.sector, self.address
        )
    }
}

impl DmaController {
    /// Start a transfer
    pub fn arm(&mut self) {
        self.active = true;
        self.doorbell = true;
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Returns `true` once after each `arm`
    pub(crate) fn take_doorbell(&mut self) -> bool {
        std::mem::take(&mut self.doorbell)
    }

    pub(crate) fn disarm(&mut self) {
        self.active = false;
        self.doorbell = false;
    }

    fn try_transfer(&self, memory: &mut Memory, disk: &mut Disk) -> Result<(), DmaError> {
        let sector = disk.sector_mut(self.track, self.cylinder, self.sector)?;
        let address = Address::from(self.address);
        let direction = Direction::try_from(self.direction)?;

        match direction {
            Direction::Write => {
                let word = memory.get(address)?;
                sector.store(word);
                info!(
                    address,
                    word,
                    text = sector.text(),
                    "DMA write: memory[{}] -> disk[{}][{}][{}]",
                    address,
                    self.track,
                    self.cylinder,
                    self.sector
                );
            }

            Direction::Read => {
                let word = sector.load();
                *memory.get_mut(address)? = word;
                info!(
                    address,
                    word,
                    text = sector.text(),
                    "DMA read: disk[{}][{}][{}] -> memory[{}]",
                    self.track,
                    self.cylinder,
                    self.sector,
                    address
                );
            }
        }

        Ok(())
    }

    /// Move one word between memory and the disk, and update the status register
    ///
    /// The address is physical and is not checked against `%rb` and `%rl`.
    pub fn transfer(&mut self, memory: &mut Memory, disk: &mut Disk) -> DmaStatus {
        self.status = match self.try_transfer(memory, disk) {
            Ok(()) => DmaStatus::Success,
            Err(error) => {
                warn!(%error, "DMA transfer failed");
                DmaStatus::Error
            }
        };
        self.status
    }
}

/// Body of the DMA unit thread
///
/// Sleeps until armed, simulates the mechanical latency without holding the
/// machine, then performs the transfer and raises the I/O completion.
pub(crate) fn run(shared: &Shared) {
    debug!("DMA unit started");

    loop {
        let computer = shared.lock();
        let computer = shared.wait_for_dma(computer);
        if !computer.running {
            break;
        }

        debug!(request = %computer.dma, "DMA request received");
        let mut computer = shared.pause(computer, shared.config.dma_latency);
        if !computer.running {
            break;
        }

        computer.complete_dma();
    }

    debug!("DMA unit stopped");
}
