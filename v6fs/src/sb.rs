use crate::io::{Block, BLOCK_SIZE};

/// Bytes reserved for bootloader code at the front of the superblock.
pub const BOOT_SECTOR_SIZE: usize = 500;

/// Magic constants identifying a valid filesystem.
pub const MAGIC1: u16 = 0xdd05;
pub const MAGIC2: u16 = 0xaa55;

pub type BootSector = [u8; BOOT_SECTOR_SIZE];

// Fixed field offsets within block 0. All 16-bit fields are little-endian
// regardless of host, so images are portable.
const RESERVED_OFFSET: usize = 500;
const BLOCKS_OFFSET: usize = 502;
const INODE_BLOCKS_OFFSET: usize = 504;
const INODES_OFFSET: usize = 506;
const MAGIC1_OFFSET: usize = 508;
const MAGIC2_OFFSET: usize = 510;

/// The first block (block 0) of the filesystem: everything needed to
/// understand the rest of the layout, plus two magic words that tell a
/// formatted drive apart from a blank one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    pub boot_sector: BootSector,
    pub reserved: u16,
    /// Total blocks in the filesystem.
    pub blocks: u16,
    /// How many blocks hold the inode table.
    pub inode_blocks: u16,
    /// Total defined inode slots (`inode_blocks * 16`).
    pub inodes: u16,
    pub magic1: u16,
    pub magic2: u16,
}

impl SuperBlock {
    /// Builds the superblock `format` writes for a drive of the given size.
    /// One tenth of the drive, rounded up, goes to the inode table.
    ///
    /// The `inodes` field is 16 bits, which caps the table at 4095 blocks
    /// (65,520 slots); drives above ~40,950 blocks get that many inode
    /// blocks instead of a full tenth, keeping `inodes == inode_blocks * 16`
    /// exact.
    pub fn for_drive(blocks: u16, boot_sector: Option<&BootSector>) -> Self {
        let inode_blocks =
            (((blocks as u32 + 9) / 10).min((u16::MAX / crate::node::INODES_PER_BLOCK) as u32))
                as u16;
        let mut boot = [0u8; BOOT_SECTOR_SIZE];
        if let Some(src) = boot_sector {
            boot.copy_from_slice(src);
        }
        SuperBlock {
            boot_sector: boot,
            reserved: 0,
            blocks,
            inode_blocks,
            inodes: inode_blocks * crate::node::INODES_PER_BLOCK,
            magic1: MAGIC1,
            magic2: MAGIC2,
        }
    }

    /// Decodes block 0. Never fails; validity is a separate question
    /// answered by [`SuperBlock::is_valid`].
    pub fn decode(buf: &Block) -> Self {
        let mut boot = [0u8; BOOT_SECTOR_SIZE];
        boot.copy_from_slice(&buf[..BOOT_SECTOR_SIZE]);
        SuperBlock {
            boot_sector: boot,
            reserved: get_u16(buf, RESERVED_OFFSET),
            blocks: get_u16(buf, BLOCKS_OFFSET),
            inode_blocks: get_u16(buf, INODE_BLOCKS_OFFSET),
            inodes: get_u16(buf, INODES_OFFSET),
            magic1: get_u16(buf, MAGIC1_OFFSET),
            magic2: get_u16(buf, MAGIC2_OFFSET),
        }
    }

    /// Serializes the superblock into one block for writing to disk.
    pub fn encode(&self) -> Block {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[..BOOT_SECTOR_SIZE].copy_from_slice(&self.boot_sector);
        put_u16(&mut buf, RESERVED_OFFSET, self.reserved);
        put_u16(&mut buf, BLOCKS_OFFSET, self.blocks);
        put_u16(&mut buf, INODE_BLOCKS_OFFSET, self.inode_blocks);
        put_u16(&mut buf, INODES_OFFSET, self.inodes);
        put_u16(&mut buf, MAGIC1_OFFSET, self.magic1);
        put_u16(&mut buf, MAGIC2_OFFSET, self.magic2);
        buf
    }

    /// Both magic words must match for the drive to count as formatted.
    pub fn is_valid(&self) -> bool {
        self.magic1 == MAGIC1 && self.magic2 == MAGIC2
    }
}

fn get_u16(buf: &Block, offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn put_u16(buf: &mut Block, offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_encode_and_decode_superblocks() {
        let sb = SuperBlock::for_drive(100, None);
        let parsed = SuperBlock::decode(&sb.encode());
        assert_eq!(parsed, sb);
    }

    #[test]
    fn for_drive_rounds_inode_blocks_up() {
        let sb = SuperBlock::for_drive(100, None);
        assert_eq!(sb.inode_blocks, 10);
        assert_eq!(sb.inodes, 160);

        let sb = SuperBlock::for_drive(101, None);
        assert_eq!(sb.inode_blocks, 11);
        assert_eq!(sb.inodes, 176);
    }

    #[test]
    fn inode_table_caps_at_the_field_width() {
        let sb = SuperBlock::for_drive(u16::MAX, None);
        assert_eq!(sb.inode_blocks, 4095);
        assert_eq!(sb.inodes, 65_520);
        assert_eq!(sb.inodes, sb.inode_blocks * 16);
    }

    #[test]
    fn fields_land_at_fixed_offsets() {
        let mut sb = SuperBlock::for_drive(0x1234, None);
        sb.inode_blocks = 0x00ab;
        sb.inodes = 0x0ab0;
        let buf = sb.encode();

        assert_eq!(&buf[502..504], &[0x34, 0x12]);
        assert_eq!(&buf[504..506], &[0xab, 0x00]);
        assert_eq!(&buf[506..508], &[0xb0, 0x0a]);
        assert_eq!(&buf[508..510], &[0x05, 0xdd]);
        assert_eq!(&buf[510..512], &[0x55, 0xaa]);
    }

    #[test]
    fn boot_sector_is_copied_through() {
        let boot = [0x7f; BOOT_SECTOR_SIZE];
        let sb = SuperBlock::for_drive(50, Some(&boot));
        let buf = sb.encode();
        assert_eq!(&buf[..BOOT_SECTOR_SIZE], &boot[..]);
    }

    #[test]
    fn zeroed_block_is_not_a_valid_superblock() {
        let sb = SuperBlock::decode(&[0u8; BLOCK_SIZE]);
        assert!(!sb.is_valid());
    }
}
