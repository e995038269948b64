use thiserror::Error;

use crate::drive::DriveId;

pub type Result<T> = std::result::Result<T, FsError>;

/// Every fallible operation in the crate reports one of these kinds to its
/// immediate caller. There is no retry and no shared error slot.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("drive identifier not recognized")]
    InvalidDrive,
    #[error("drive {0} is already attached")]
    AlreadyAttached(DriveId),
    #[error("could not open backing storage: {0}")]
    OpenFailed(#[source] std::io::Error),
    #[error("block {block} out of range (drive has {blocks} blocks)")]
    OutOfRange { block: u16, blocks: u16 },
    #[error("block i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not allocate bitmap memory")]
    AllocationFailed,
    #[error("no free block left on the drive")]
    NoSpace,
    #[error("drive has open files")]
    Busy,
    #[error("no valid filesystem on the drive")]
    NotFormatted,
    #[error("drive {0} is already mounted")]
    AlreadyMounted(DriveId),
    #[error("inode index {0} out of range")]
    BadInodeIndex(u16),
}
