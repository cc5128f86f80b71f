/// Track and sector coordinates

use crate::format::constants::SECTORS_PER_TRACK;
use std::fmt;

/// A `(track, sector)` coordinate on a 16-sector 5.25" disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackSector {
    track: usize,
    sector: usize,
}

impl TrackSector {
    /// Create a new coordinate
    pub fn new(track: usize, sector: usize) -> Self {
        Self { track, sector }
    }

    /// Split a linear sector index into track and sector
    pub fn from_index(index: usize) -> Self {
        Self {
            track: index / SECTORS_PER_TRACK,
            sector: index % SECTORS_PER_TRACK,
        }
    }

    /// Track number
    pub fn track(&self) -> usize {
        self.track
    }

    /// Sector number within the track
    pub fn sector(&self) -> usize {
        self.sector
    }

    /// Linear sector index
    pub fn index(&self) -> usize {
        self.track * SECTORS_PER_TRACK + self.sector
    }
}

impl fmt::Display for TrackSector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{:02}/S{:02}", self.track, self.sector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_from_index() {
        let ts = TrackSector::from_index(35);
        assert_eq!(ts.track(), 2);
        assert_eq!(ts.sector(), 3);
        assert_eq!(ts.index(), 35);
    }

    #[test]
    fn test_equal_values_are_interchangeable() {
        let mut set = HashSet::new();
        set.insert(TrackSector::new(17, 0));
        assert!(set.contains(&TrackSector::from_index(17 * 16)));
    }

    #[test]
    fn test_display() {
        assert_eq!(TrackSector::new(3, 15).to_string(), "T03/S15");
    }
}
