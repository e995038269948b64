use crate::error::Result;

/// Drives are addressed in fixed 512-byte blocks, numbered from 0 by a
/// 16-bit block number.
pub const BLOCK_SIZE: usize = 512;

/// One block worth of bytes.
pub type Block = [u8; BLOCK_SIZE];

/// The seam between the filesystem and whatever stores its blocks.
///
/// All I/O is synchronous: a read or write runs to completion or failure
/// before returning, and nothing is buffered on this side of the trait.
pub trait BlockDevice {
    /// Total number of blocks the device can address.
    fn blocks(&self) -> u16;

    /// Reads exactly one block into `buf`.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if `blocknr` is past the end of the device, `Io` if the
    /// underlying storage returns fewer bytes than a full block.
    fn read_block(&mut self, blocknr: u16, buf: &mut Block) -> Result<()>;

    /// Writes exactly one block from `buf`. Same error conditions as
    /// [`BlockDevice::read_block`].
    fn write_block(&mut self, blocknr: u16, buf: &Block) -> Result<()>;

    /// Flushes any state the backing storage may still hold in memory.
    fn sync(&mut self) -> Result<()>;
}
