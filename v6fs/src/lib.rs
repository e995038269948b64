//! A minimal Unix-V6-style filesystem over an emulated block device.
//!
//! A drive is a plain file addressed in fixed 512-byte blocks. Block 0 holds
//! the superblock, blocks `1..=inode_blocks` hold a fixed table of 32-byte
//! inodes, and everything after that is data. Free space is never persisted;
//! an in-memory bitmap is rebuilt on every mount by scanning the inode table.

mod alloc;
mod drive;
mod error;
mod fs;
mod io;
mod node;
mod sb;

pub use crate::alloc::{rebuild_from_scan, Bitmap};
pub use crate::drive::{Drive, DriveId, DriveRegistry, DEFAULT_DRIVE_DIR};
pub use crate::error::{FsError, Result};
pub use crate::fs::{Filesystem, FormatOptions, FsStats};
pub use crate::io::{
    Block, BlockDevice, FileBlockEmulator, FileBlockEmulatorBuilder, BLOCK_SIZE,
};
pub use crate::node::{
    FileType, Inode, DIRECT_POINTERS, INODES_PER_BLOCK, INODE_SIZE, MAX_FILE_SIZE,
    POINTERS_PER_BLOCK,
};
pub use crate::sb::{BootSector, SuperBlock, BOOT_SECTOR_SIZE, MAGIC1, MAGIC2};
