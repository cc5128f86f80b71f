/// ProDOS access flags
///
/// One byte per directory entry and header, shared by files and directories.

use std::fmt;

/// Access byte of a ProDOS entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Access(pub u8);

impl Access {
    /// Destroy enable (D) - Bit 7
    pub const DESTROY: u8 = 0x80;

    /// Rename enable (RN) - Bit 6
    pub const RENAME: u8 = 0x40;

    /// Backup needed (B) - Bit 5
    /// Set by ProDOS whenever the file is written
    pub const BACKUP: u8 = 0x20;

    /// Invisible (I) - Bit 2
    /// GS/OS extension, hides the entry from finders
    pub const INVISIBLE: u8 = 0x04;

    /// Write enable (W) - Bit 1
    pub const WRITE: u8 = 0x02;

    /// Read enable (R) - Bit 0
    pub const READ: u8 = 0x01;

    /// Unlocked file as created by the ProDOS FILER
    pub const STANDARD: u8 = Self::DESTROY | Self::RENAME | Self::BACKUP | Self::WRITE | Self::READ;

    /// Create a new Access from a raw byte
    #[inline]
    pub fn new(value: u8) -> Self {
        Access(value)
    }

    /// Fully enabled access
    #[inline]
    pub fn standard() -> Self {
        Access(Self::STANDARD)
    }

    /// Check if the entry may be deleted
    #[inline]
    pub fn can_destroy(&self) -> bool {
        (self.0 & Self::DESTROY) != 0
    }

    /// Check if the entry may be renamed
    #[inline]
    pub fn can_rename(&self) -> bool {
        (self.0 & Self::RENAME) != 0
    }

    /// Check if the backup bit is set
    #[inline]
    pub fn needs_backup(&self) -> bool {
        (self.0 & Self::BACKUP) != 0
    }

    /// Check if the invisible bit is set
    #[inline]
    pub fn is_invisible(&self) -> bool {
        (self.0 & Self::INVISIBLE) != 0
    }

    /// Check if the entry may be written
    #[inline]
    pub fn can_write(&self) -> bool {
        (self.0 & Self::WRITE) != 0
    }

    /// Check if the entry may be read
    #[inline]
    pub fn can_read(&self) -> bool {
        (self.0 & Self::READ) != 0
    }

    /// Locked means neither destroy, rename nor write is enabled
    #[inline]
    pub fn is_locked(&self) -> bool {
        (self.0 & (Self::DESTROY | Self::RENAME | Self::WRITE)) == 0
    }
}

impl Default for Access {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}{}{}{}",
            flag(self.can_destroy(), 'D'),
            flag(self.can_rename(), 'N'),
            flag(self.needs_backup(), 'B'),
            flag(self.is_invisible(), 'I'),
            flag(self.can_write(), 'W'),
            flag(self.can_read(), 'R'),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_access() {
        let access = Access::standard();
        assert_eq!(access.0, 0xE3);
        assert!(access.can_destroy());
        assert!(access.can_write());
        assert!(!access.is_invisible());
        assert!(!access.is_locked());
    }

    #[test]
    fn test_locked() {
        let access = Access::new(Access::READ);
        assert!(access.is_locked());
        assert!(access.can_read());
    }

    #[test]
    fn test_display() {
        assert_eq!(Access::standard().to_string(), "DNB-WR");
        assert_eq!(Access::new(0x01).to_string(), "-----R");
    }
}
