use log::info;

use crate::alloc::{rebuild_from_scan, Bitmap};
use crate::drive::MountGuard;
use crate::error::{FsError, Result};
use crate::io::{BlockDevice, BLOCK_SIZE};
use crate::node::{self, Inode, INODE_SIZE};
use crate::sb::{BootSector, SuperBlock};

/// Caller-supplied knobs for [`Filesystem::format`].
#[derive(Default)]
pub struct FormatOptions {
    /// Copied into the superblock's boot region; zero-filled if absent.
    pub boot_sector: Option<BootSector>,
    /// Proceed even when the drive has open files, invalidating them.
    pub force: bool,
    /// How many open file handles the file table currently reports for
    /// this drive. The file table lives outside this crate, so its report
    /// arrives by value.
    pub open_handles: u32,
}

/// Read-only usage summary, the programmatic face of the old `show` dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub blocks: u16,
    pub inode_blocks: u16,
    pub inodes: u16,
    pub used_blocks: u16,
    pub free_blocks: u16,
}

/// A mounted filesystem: the drive, the in-memory superblock copy, and the
/// free-space bitmap rebuilt at mount time.
///
/// Generic over the device so tests can run against the file-backed
/// emulator; production code mounts a [`crate::Drive`] through
/// [`crate::DriveRegistry`]. Operations on one handle must be sequenced by
/// the caller; there is no internal locking.
#[derive(Debug)]
pub struct Filesystem<T: BlockDevice> {
    dev: T,
    super_block: SuperBlock,
    bitmap: Bitmap,
    mount_guard: Option<MountGuard>,
}

impl<T: BlockDevice> Filesystem<T> {
    /// Writes a fresh filesystem onto the device and returns it mounted.
    ///
    /// Layout written, in order: superblock to block 0; a root directory
    /// inode at slot 0 of block 1 with the rest of the table zero-filled
    /// (an all-zero inode is a free slot); then the bitmap is rebuilt by
    /// scanning the table just written. The step order is load-bearing.
    ///
    /// Format is not transactional: an I/O failure partway through leaves
    /// the drive partially written and re-formattable, and no rollback is
    /// attempted.
    ///
    /// # Errors
    ///
    /// `Busy` when the drive has open files and `force` is off; `Io` or
    /// `OutOfRange` from the underlying writes.
    pub fn format(mut dev: T, opts: FormatOptions) -> Result<Self> {
        if opts.open_handles > 0 && !opts.force {
            return Err(FsError::Busy);
        }

        let super_block = SuperBlock::for_drive(dev.blocks(), opts.boot_sector.as_ref());
        dev.write_block(0, &super_block.encode())?;

        let mut buf = [0u8; BLOCK_SIZE];
        buf[..INODE_SIZE].copy_from_slice(&Inode::root().encode());
        dev.write_block(1, &buf)?;

        let zeroed = [0u8; BLOCK_SIZE];
        for blk in 2..=super_block.inode_blocks {
            dev.write_block(blk, &zeroed)?;
        }
        dev.sync()?;

        let bitmap = rebuild_from_scan(&mut dev, &super_block)?;
        info!(
            "formatted drive: {} blocks, {} inode blocks, {} inode slots",
            super_block.blocks, super_block.inode_blocks, super_block.inodes
        );
        Ok(Filesystem {
            dev,
            super_block,
            bitmap,
            mount_guard: None,
        })
    }

    /// Mounts an existing filesystem on the device: reads and validates the
    /// superblock, then rebuilds the bitmap. Read-only up to the rebuild,
    /// so a failed open leaves the drive unmodified.
    ///
    /// # Errors
    ///
    /// `NotFormatted` when block 0 lacks the magic constants; `Io` from the
    /// reads.
    pub fn open(mut dev: T) -> Result<Self> {
        let mut buf = [0u8; BLOCK_SIZE];
        dev.read_block(0, &mut buf)?;
        let super_block = SuperBlock::decode(&buf);
        if !super_block.is_valid() {
            return Err(FsError::NotFormatted);
        }

        let bitmap = rebuild_from_scan(&mut dev, &super_block)?;
        info!(
            "mounted filesystem: {} blocks, {} inode slots",
            super_block.blocks, super_block.inodes
        );
        Ok(Filesystem {
            dev,
            super_block,
            bitmap,
            mount_guard: None,
        })
    }

    pub(crate) fn with_mount_guard(mut self, guard: MountGuard) -> Self {
        self.mount_guard = Some(guard);
        self
    }

    /// Unmounts: discards the bitmap, releases the mount flag (if this
    /// filesystem went through a registry), and detaches the drive.
    pub fn unmount(self) {}

    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    /// Direct access to the underlying device, for the collaborators that
    /// move file data in and out of blocks.
    pub fn device(&mut self) -> &mut T {
        &mut self.dev
    }

    /// Fetches a copy of the inode at `index`. Read-only.
    ///
    /// # Errors
    ///
    /// `BadInodeIndex` when `index` is past the defined slots.
    pub fn get_inode(&mut self, index: u16) -> Result<Inode> {
        if index >= self.super_block.inodes {
            return Err(FsError::BadInodeIndex(index));
        }
        let mut buf = [0u8; BLOCK_SIZE];
        self.dev.read_block(node::table_block(index), &mut buf)?;
        let slot = node::table_slot(index);
        Ok(Inode::decode(&buf[slot * INODE_SIZE..(slot + 1) * INODE_SIZE]))
    }

    /// Lowest-numbered free block, or 0 when the drive is full. Block 0 is
    /// always the superblock, so it can never be a legitimate answer.
    pub fn first_free_block(&self) -> u16 {
        self.bitmap.first_free().unwrap_or(0)
    }

    /// Claims the first free block in the in-memory bitmap and returns its
    /// number, or `NoSpace` when every block is taken. The block becomes
    /// durable only once some inode on disk points at it; until then a
    /// remount will reclaim it.
    pub fn allocate_block(&mut self) -> Result<u16> {
        let blk = self.bitmap.first_free().ok_or(FsError::NoSpace)?;
        self.bitmap.set(blk);
        Ok(blk)
    }

    /// Returns a block to the free pool in the in-memory bitmap.
    pub fn release_block(&mut self, blk: u16) {
        self.bitmap.clear(blk);
    }

    /// Re-runs the mark-sweep scan over the inode table, replacing the
    /// in-memory bitmap.
    pub fn rebuild_bitmap(&mut self) -> Result<()> {
        self.bitmap = rebuild_from_scan(&mut self.dev, &self.super_block)?;
        Ok(())
    }

    /// Usage counters derived from the superblock and the bitmap.
    pub fn stats(&self) -> FsStats {
        let used = (0..self.super_block.blocks)
            .filter(|&b| self.bitmap.test(b))
            .count() as u16;
        FsStats {
            blocks: self.super_block.blocks,
            inode_blocks: self.super_block.inode_blocks,
            inodes: self.super_block.inodes,
            used_blocks: used,
            free_blocks: self.super_block.blocks - used,
        }
    }

    /// Every valid inode with its index, in table order. A diagnostic
    /// traversal; free slots are skipped.
    pub fn list_inodes(&mut self) -> Result<Vec<(u16, Inode)>> {
        let mut out = Vec::new();
        for index in 0..self.super_block.inodes {
            let inode = self.get_inode(index)?;
            if inode.is_valid() {
                out.push((index, inode));
            }
        }
        Ok(out)
    }
}
