use core::fmt;

/// Filesystem error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// No such file or directory.
    NotFound,
    /// Hardware I/O failure or bounded-poll timeout in the block device.
    DeviceError,
    /// Bad MBR signature, unusable BPB, or an impossible FAT value mid-chain.
    CorruptVolume,
    /// The fixed handle table is full.
    OutOfHandles,
    /// No free cluster left (or none within the mirrored FAT window).
    NoSpace,
    /// Long names, nested creation, or a cluster beyond the mirrored FAT.
    Unsupported,
    /// Empty or malformed path.
    InvalidPath,
    /// Seek past the end of the file.
    InvalidOffset,
    /// Write attempted on a directory handle.
    IsADirectory,
    /// Closed or stale (generation-mismatched) handle.
    BadHandle,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FsError::NotFound => write!(f, "No such file or directory"),
            FsError::DeviceError => write!(f, "Device I/O error"),
            FsError::CorruptVolume => write!(f, "Corrupt volume"),
            FsError::OutOfHandles => write!(f, "Too many open files"),
            FsError::NoSpace => write!(f, "No space left"),
            FsError::Unsupported => write!(f, "Operation not supported"),
            FsError::InvalidPath => write!(f, "Invalid path"),
            FsError::InvalidOffset => write!(f, "Offset past end of file"),
            FsError::IsADirectory => write!(f, "Is a directory"),
            FsError::BadHandle => write!(f, "Bad file handle"),
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;
