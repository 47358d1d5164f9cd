//! Process table: placement of programs in the user region.

use std::ops::Range;

use thiserror::Error;
use tracing::{debug, info};

use crate::constants::{Address, MEMORY_SIZE, USER_START};
use crate::loader::ProgramHeader;

/// Process control block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcb {
    pub id: usize,
    pub name: String,

    /// First physical address of the process
    pub base: Address,

    /// First physical address past the process
    pub limit: Address,

    /// Entry point, relative to the base
    pub start_offset: Address,
}

impl Pcb {
    #[must_use]
    pub const fn region(&self) -> Range<Address> {
        self.base..self.limit
    }

    #[must_use]
    pub const fn size(&self) -> Address {
        self.limit - self.base
    }

    fn overlaps(&self, region: &Range<Address>) -> bool {
        self.base < region.end && region.start < self.limit
    }
}

impl std::fmt::Display for Pcb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:>3}  {:<12} [{}, {})  start +{}",
            self.id, self.name, self.base, self.limit, self.start_offset
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("region [{}, {}) is outside of the user region", .region.start, .region.end)]
    OutOfUserRegion { region: Range<Address> },

    #[error("region [{}, {}) collides with process {other}", .region.start, .region.end)]
    Collision {
        region: Range<Address>,
        other: usize,
    },

    #[error("no free region of {size} words")]
    NoSpace { size: Address },

    #[error("no process with id {0}")]
    NotFound(usize),

    #[error("invalid stack size {0}")]
    InvalidStack(Address),
}

/// The loaded processes, each owning a disjoint region of the user memory
#[derive(Debug, Clone)]
pub struct ProcessTable {
    processes: Vec<Pcb>,
    next_id: usize,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self {
            processes: Vec::new(),
            next_id: 1,
        }
    }
}

impl ProcessTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn collision(&self, region: &Range<Address>) -> Option<&Pcb> {
        self.processes.iter().find(|pcb| pcb.overlaps(region))
    }

    /// Find the lowest base where `size` words fit
    #[must_use]
    pub fn next_free(&self, size: Address) -> Option<Address> {
        // A region can only start at the user region start or right after
        // another process
        let mut candidates: Vec<Address> = std::iter::once(USER_START)
            .chain(self.processes.iter().map(|pcb| pcb.limit))
            .collect();
        candidates.sort_unstable();

        candidates.into_iter().find(|&base| {
            let region = base..base.saturating_add(size);
            region.end <= MEMORY_SIZE && self.collision(&region).is_none()
        })
    }

    /// Register a program loaded at `base`, reserving `stack_words` above it
    ///
    /// # Errors
    ///
    /// Fails if the stack size is negative, or if the region leaves the user
    /// region or overlaps another process
    pub fn admit(
        &mut self,
        header: &ProgramHeader,
        base: Address,
        stack_words: Address,
    ) -> Result<&Pcb, ProcessError> {
        if stack_words < 0 {
            return Err(ProcessError::InvalidStack(stack_words));
        }

        let size = header.size().saturating_add(stack_words);
        let region = base..base.saturating_add(size);

        if region.is_empty() || region.start < USER_START || region.end > MEMORY_SIZE {
            return Err(ProcessError::OutOfUserRegion { region });
        }

        if let Some(other) = self.collision(&region) {
            debug!(name = %header.name, other = %other, "Region collision");
            return Err(ProcessError::Collision {
                region,
                other: other.id,
            });
        }

        let pcb = Pcb {
            id: self.next_id,
            name: header.name.clone(),
            base: region.start,
            limit: region.end,
            start_offset: header.start_offset,
        };
        self.next_id += 1;
        info!(%pcb, "Process admitted");

        let index = self.processes.len();
        self.processes.push(pcb);
        Ok(&self.processes[index])
    }

    #[must_use]
    pub fn get(&self, id: usize) -> Option<&Pcb> {
        self.processes.iter().find(|pcb| pcb.id == id)
    }

    /// Processes, in admission order
    pub fn iter(&self) -> impl Iterator<Item = &Pcb> {
        self.processes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Forget a process, freeing its region
    ///
    /// # Errors
    ///
    /// Fails if no process has this id
    pub fn remove(&mut self, id: usize) -> Result<Pcb, ProcessError> {
        let index = self
            .processes
            .iter()
            .position(|pcb| pcb.id == id)
            .ok_or(ProcessError::NotFound(id))?;
        Ok(self.processes.remove(index))
    }
}
