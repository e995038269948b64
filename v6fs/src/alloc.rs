use log::debug;

use crate::error::{FsError, Result};
use crate::io::{BlockDevice, BLOCK_SIZE};
use crate::node::{Inode, INODES_PER_BLOCK, INODE_SIZE};
use crate::sb::SuperBlock;

/// Free-space map over block numbers: one bit per block, 0 free, 1 used,
/// byte-packed with the bit of block `b` at byte `b >> 3`, bit `b & 7`.
///
/// The bitmap is never written to disk. A mounted filesystem rebuilds it
/// from the inode table via [`rebuild_from_scan`], which makes free-space
/// state self-healing across remounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bits: Vec<u8>,
    total_bits: u16,
}

impl Bitmap {
    /// A zero-filled bitmap with one bit per block, `ceil(total_blocks / 8)`
    /// bytes of backing storage.
    pub fn create(total_blocks: u16) -> Result<Self> {
        let size = (total_blocks as usize + 7) / 8;
        let mut bits = Vec::new();
        bits.try_reserve_exact(size)
            .map_err(|_| FsError::AllocationFailed)?;
        bits.resize(size, 0);
        Ok(Bitmap {
            bits,
            total_bits: total_blocks,
        })
    }

    pub fn total_bits(&self) -> u16 {
        self.total_bits
    }

    /// Whether block `n` is marked used. Out-of-range blocks report unset.
    pub fn test(&self, n: u16) -> bool {
        n < self.total_bits && self.bits[(n >> 3) as usize] & (1 << (n & 7)) != 0
    }

    /// Marks block `n` used. Out of range is a no-op.
    pub fn set(&mut self, n: u16) {
        if n < self.total_bits {
            self.bits[(n >> 3) as usize] |= 1 << (n & 7);
        }
    }

    /// Marks block `n` free. Out of range is a no-op.
    pub fn clear(&mut self, n: u16) {
        if n < self.total_bits {
            self.bits[(n >> 3) as usize] &= !(1 << (n & 7));
        }
    }

    /// Lowest-numbered free block, scanning from 0.
    pub fn first_free(&self) -> Option<u16> {
        (0..self.total_bits).find(|&n| !self.test(n))
    }
}

/// Reconstructs the free-space bitmap from the ground truth on disk.
///
/// Marks the superblock and every inode block used, then walks the whole
/// inode table: for each valid inode, every nonzero direct pointer, the
/// nonzero indirect pointer, and every nonzero entry inside the indirect
/// block is marked used. All 256 indirect entries are scanned; there is no
/// early stop on a zero entry, so sparse files are handled.
///
/// Any failed block read aborts the scan and surfaces the error.
pub fn rebuild_from_scan<T: BlockDevice>(dev: &mut T, sb: &SuperBlock) -> Result<Bitmap> {
    let mut bitmap = Bitmap::create(sb.blocks)?;

    // Superblock plus the whole inode table, inclusive on both ends.
    for blk in 0..=sb.inode_blocks {
        bitmap.set(blk);
    }

    let mut buf = [0u8; BLOCK_SIZE];
    let mut indirect_buf = [0u8; BLOCK_SIZE];
    for blk in 1..=sb.inode_blocks {
        dev.read_block(blk, &mut buf)?;

        for slot in 0..INODES_PER_BLOCK as usize {
            let inode = Inode::decode(&buf[slot * INODE_SIZE..(slot + 1) * INODE_SIZE]);
            if !inode.is_valid() {
                continue;
            }

            for &ptr in inode.direct.iter() {
                if ptr != 0 {
                    bitmap.set(ptr);
                }
            }

            if inode.indirect != 0 {
                bitmap.set(inode.indirect);
                dev.read_block(inode.indirect, &mut indirect_buf)?;
                for entry in indirect_buf.chunks_exact(2) {
                    let ptr = u16::from_le_bytes([entry[0], entry[1]]);
                    if ptr != 0 {
                        bitmap.set(ptr);
                    }
                }
            }
        }
    }

    debug!(
        "rebuilt bitmap over {} blocks ({} inode blocks scanned)",
        sb.blocks, sb.inode_blocks
    );
    Ok(bitmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_read_and_write_bits() {
        let mut bmp = Bitmap::create(64).unwrap();

        bmp.set(2);
        assert!(!bmp.test(0));
        assert!(bmp.test(2));

        bmp.clear(2);
        assert!(!bmp.test(2));
    }

    #[test]
    fn can_set_bits_at_both_ends() {
        let mut bmp = Bitmap::create(100).unwrap();
        bmp.set(0);
        bmp.set(99);
        assert!(bmp.test(0));
        assert!(bmp.test(99));
    }

    #[test]
    fn out_of_range_access_is_harmless() {
        let mut bmp = Bitmap::create(10).unwrap();
        bmp.set(10);
        bmp.clear(500);
        assert!(!bmp.test(10));
        assert!(!bmp.test(u16::MAX));
    }

    #[test]
    fn first_free_scans_from_zero() {
        let mut bmp = Bitmap::create(8).unwrap();
        assert_eq!(bmp.first_free(), Some(0));

        for n in 0..5 {
            bmp.set(n);
        }
        assert_eq!(bmp.first_free(), Some(5));

        for n in 5..8 {
            bmp.set(n);
        }
        assert_eq!(bmp.first_free(), None);
    }
}
