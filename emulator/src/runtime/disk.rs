use nom::{
    character::complete::{digit1, one_of, space0},
    combinator::{opt, recognize},
    sequence::{pair, preceded},
    IResult,
};
use thiserror::Error;

use crate::constants::{Word, DISK_CYLINDERS, DISK_SECTORS, DISK_TRACKS, SECTOR_WIDTH};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("sector ({track}, {cylinder}, {sector}) is outside of the disk")]
pub struct GeometryError {
    pub track: Word,
    pub cylinder: Word,
    pub sector: Word,
}

/// A fixed-width sector holding the decimal text of a word
///
/// The last byte is always a terminator, so at most `SECTOR_WIDTH - 1`
/// characters are kept.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Sector {
    data: [u8; SECTOR_WIDTH],
}

impl std::fmt::Debug for Sector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sector({:?})", self.text())
    }
}

/// Parse the leading integer of a sector, like a C `atoi`
fn leading_integer(input: &str) -> IResult<&str, &str> {
    preceded(space0, recognize(pair(opt(one_of("+-")), digit1)))(input)
}

impl Sector {
    /// Write the decimal text of a word, truncated to the sector width
    pub fn store(&mut self, word: Word) {
        let text = word.to_string();
        let len = text.len().min(SECTOR_WIDTH - 1);
        self.data = [0; SECTOR_WIDTH];
        self.data[..len].copy_from_slice(&text.as_bytes()[..len]);
    }

    /// Parse the text back to a word, `0` if it does not start with a number
    #[must_use]
    pub fn load(&self) -> Word {
        leading_integer(self.text())
            .ok()
            .and_then(|(_, number)| number.parse().ok())
            .unwrap_or(0)
    }

    /// Text currently held by the sector
    #[must_use]
    pub fn text(&self) -> &str {
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(SECTOR_WIDTH);
        std::str::from_utf8(&self.data[..end]).unwrap_or_default()
    }
}

/// The disk, a `[track][cylinder][sector]` array of sectors
#[derive(Clone)]
pub struct Disk {
    sectors: Box<[Sector]>,
}

impl Default for Disk {
    fn default() -> Self {
        Self {
            sectors: vec![Sector::default(); DISK_TRACKS * DISK_CYLINDERS * DISK_SECTORS]
                .into_boxed_slice(),
        }
    }
}

impl std::fmt::Debug for Disk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Disk {{ geometry: {DISK_TRACKS}x{DISK_CYLINDERS}x{DISK_SECTORS} }}"
        )
    }
}

impl Disk {
    fn index(track: Word, cylinder: Word, sector: Word) -> Result<usize, GeometryError> {
        let error = GeometryError {
            track,
            cylinder,
            sector,
        };
        let coordinate = |value: Word, bound: usize| {
            usize::try_from(value)
                .ok()
                .filter(|&value| value < bound)
                .ok_or(error)
        };

        let t = coordinate(track, DISK_TRACKS)?;
        let c = coordinate(cylinder, DISK_CYLINDERS)?;
        let s = coordinate(sector, DISK_SECTORS)?;
        Ok((t * DISK_CYLINDERS + c) * DISK_SECTORS + s)
    }

    /// Get a sector
    ///
    /// # Errors
    ///
    /// It fails if any coordinate is negative or past the disk geometry.
    pub fn sector(&self, track: Word, cylinder: Word, sector: Word) -> Result<&Sector, GeometryError> {
        let index = Self::index(track, cylinder, sector)?;
        Ok(&self.sectors[index])
    }

    /// Get a mutable sector
    ///
    /// # Errors
    ///
    /// It fails if any coordinate is negative or past the disk geometry.
    pub fn sector_mut(
        &mut self,
        track: Word,
        cylinder: Word,
        sector: Word,
    ) -> Result<&mut Sector, GeometryError> {
        let index = Self::index(track, cylinder, sector)?;
        Ok(&mut self.sectors[index])
    }
}
