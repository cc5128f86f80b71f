use thiserror::Error;

/// Result type alias for disk image operations
pub type Result<T> = std::result::Result<T, DiskError>;

/// Errors that can occur when working with Apple II disk images
#[derive(Debug, Error)]
pub enum DiskError {
    /// I/O error occurred while reading or writing
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image size or layout is inconsistent with the declared block size or header
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Storage cannot be opened or written in the requested mode
    #[error("Access denied: {0}")]
    Access(String),

    /// Block index outside the storage
    #[error("Block {index} out of range (length: {length})")]
    BlockOutOfRange {
        /// Requested block index
        index: usize,
        /// Number of blocks in the storage
        length: usize,
    },

    /// A directory was expected but a file was found
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// A file was expected but a directory was found
    #[error("Not a file: {0}")]
    NotAFile(String),

    /// No free directory slot and the chain cannot be extended
    #[error("Directory full: {0}")]
    DirectoryFull(String),

    /// Not enough free blocks for the requested allocation
    #[error("Disk full: {needed} blocks needed, {available} available")]
    DiskFull {
        /// Blocks required by the operation
        needed: usize,
        /// Free blocks on the volume
        available: usize,
    },

    /// An entry with the same name already exists in the directory
    #[error("Name already exists: {0}")]
    NameCollision(String),

    /// Name is not a valid ProDOS name
    #[error("Invalid filename: {0}")]
    InvalidName(String),

    /// File not found in directory
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Filesystem-related error
    #[error("Filesystem error: {0}")]
    FileSystemError(String),

    /// Parse error at specific offset
    #[error("Parse error at offset {offset}: {message}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Error message
        message: String,
    },

    /// Some dirty blocks could not be written during commit
    #[error("Commit failed for blocks {failed:?}")]
    CommitFailed {
        /// Blocks that remain dirty, in ascending order
        failed: Vec<usize>,
    },
}

impl DiskError {
    /// Create a parse error with context
    pub fn parse<S: Into<String>>(offset: usize, message: S) -> Self {
        DiskError::ParseError {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid format error
    pub fn invalid_format<S: Into<String>>(message: S) -> Self {
        DiskError::InvalidFormat(message.into())
    }

    /// Create an access error
    pub fn access<S: Into<String>>(message: S) -> Self {
        DiskError::Access(message.into())
    }

    /// Create a filesystem error
    pub fn filesystem<S: Into<String>>(message: S) -> Self {
        DiskError::FileSystemError(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DiskError::BlockOutOfRange {
            index: 300,
            length: 280,
        };
        assert_eq!(err.to_string(), "Block 300 out of range (length: 280)");
    }

    #[test]
    fn test_parse_error() {
        let err = DiskError::parse(64, "Bad 2IMG header length");
        assert_eq!(
            err.to_string(),
            "Parse error at offset 64: Bad 2IMG header length"
        );
    }

    #[test]
    fn test_commit_failed_lists_blocks() {
        let err = DiskError::CommitFailed { failed: vec![3, 9] };
        assert_eq!(err.to_string(), "Commit failed for blocks [3, 9]");
    }
}
