use crate::io::BLOCK_SIZE;

/// Size of one on-disk inode record.
pub const INODE_SIZE: usize = 32;

/// 512-byte blocks hold 16 consecutive 32-byte inodes each.
pub const INODES_PER_BLOCK: u16 = 16;

/// Direct data-block pointers per inode.
pub const DIRECT_POINTERS: usize = 8;

/// 16-bit block numbers per indirect block.
pub const POINTERS_PER_BLOCK: usize = 256;

pub const NAME_LEN: usize = 8;
pub const EXTENSION_LEN: usize = 3;

/// The largest file a fully populated inode can address: 8 direct blocks
/// plus one indirect block of 256 further pointers.
pub const MAX_FILE_SIZE: usize = (DIRECT_POINTERS + POINTERS_PER_BLOCK) * BLOCK_SIZE;

// Field offsets within the 32-byte record.
const TYPE_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 1;
const NAME_OFFSET: usize = 3;
const EXTENSION_OFFSET: usize = 11;
const INDIRECT_OFFSET: usize = 14;
const DIRECT_OFFSET: usize = 16;

/// Inode type tag. Anything other than the three defined values decodes to
/// `NotValid`, which is also what an all-zero record means: a free slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    NotValid,
    File,
    Directory,
}

impl FileType {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0x01 => FileType::File,
            0x03 => FileType::Directory,
            _ => FileType::NotValid,
        }
    }

    pub fn as_raw(self) -> u8 {
        match self {
            FileType::NotValid => 0x00,
            FileType::File => 0x01,
            FileType::Directory => 0x03,
        }
    }
}

/// One file or directory: type, size, 8.3 name, and the block pointers that
/// locate its data. Pointer value 0 means "unset" -- block 0 is always the
/// superblock, so no data block can legitimately be numbered 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub file_type: FileType,
    /// File size in bytes.
    pub size: u16,
    /// Name part, not null-terminated; unused trailing bytes are zero.
    pub name: [u8; NAME_LEN],
    /// Extension part, same convention as `name`.
    pub extension: [u8; EXTENSION_LEN],
    /// Block number of a block holding 256 further data-block numbers.
    pub indirect: u16,
    /// Block numbers of the first 8 data blocks.
    pub direct: [u16; DIRECT_POINTERS],
}

impl Inode {
    /// A free slot, byte-for-byte what zero-filled inode blocks decode to.
    pub fn empty() -> Self {
        Inode {
            file_type: FileType::NotValid,
            size: 0,
            name: [0; NAME_LEN],
            extension: [0; EXTENSION_LEN],
            indirect: 0,
            direct: [0; DIRECT_POINTERS],
        }
    }

    /// The root directory inode written at slot 0 by `format`.
    pub fn root() -> Self {
        Inode {
            file_type: FileType::Directory,
            ..Inode::empty()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.file_type != FileType::NotValid
    }

    /// Decodes one 32-byte record. `raw` must be exactly [`INODE_SIZE`]
    /// bytes long.
    pub fn decode(raw: &[u8]) -> Self {
        assert_eq!(raw.len(), INODE_SIZE, "inode record must be 32 bytes");
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&raw[NAME_OFFSET..NAME_OFFSET + NAME_LEN]);
        let mut extension = [0u8; EXTENSION_LEN];
        extension.copy_from_slice(&raw[EXTENSION_OFFSET..EXTENSION_OFFSET + EXTENSION_LEN]);
        let mut direct = [0u16; DIRECT_POINTERS];
        for (i, ptr) in direct.iter_mut().enumerate() {
            let at = DIRECT_OFFSET + i * 2;
            *ptr = u16::from_le_bytes([raw[at], raw[at + 1]]);
        }
        Inode {
            file_type: FileType::from_raw(raw[TYPE_OFFSET]),
            size: u16::from_le_bytes([raw[SIZE_OFFSET], raw[SIZE_OFFSET + 1]]),
            name,
            extension,
            indirect: u16::from_le_bytes([raw[INDIRECT_OFFSET], raw[INDIRECT_OFFSET + 1]]),
            direct,
        }
    }

    pub fn encode(&self) -> [u8; INODE_SIZE] {
        let mut raw = [0u8; INODE_SIZE];
        raw[TYPE_OFFSET] = self.file_type.as_raw();
        raw[SIZE_OFFSET..SIZE_OFFSET + 2].copy_from_slice(&self.size.to_le_bytes());
        raw[NAME_OFFSET..NAME_OFFSET + NAME_LEN].copy_from_slice(&self.name);
        raw[EXTENSION_OFFSET..EXTENSION_OFFSET + EXTENSION_LEN].copy_from_slice(&self.extension);
        raw[INDIRECT_OFFSET..INDIRECT_OFFSET + 2].copy_from_slice(&self.indirect.to_le_bytes());
        for (i, ptr) in self.direct.iter().enumerate() {
            let at = DIRECT_OFFSET + i * 2;
            raw[at..at + 2].copy_from_slice(&ptr.to_le_bytes());
        }
        raw
    }

    /// Renders the 8.3 name for display: name and extension trimmed at the
    /// first NUL, joined with a dot when an extension is present.
    pub fn file_name(&self) -> String {
        let name_end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        let ext_end = self
            .extension
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(EXTENSION_LEN);

        let mut out = String::from_utf8_lossy(&self.name[..name_end]).into_owned();
        if ext_end > 0 {
            out.push('.');
            out.push_str(&String::from_utf8_lossy(&self.extension[..ext_end]));
        }
        out
    }
}

impl Default for Inode {
    fn default() -> Self {
        Inode::empty()
    }
}

/// Block holding inode `index`: the table starts at block 1, right after
/// the superblock.
pub fn table_block(index: u16) -> u16 {
    1 + index / INODES_PER_BLOCK
}

/// Slot of inode `index` within its block.
pub fn table_slot(index: u16) -> usize {
    (index % INODES_PER_BLOCK) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_record_is_a_free_slot() {
        let inode = Inode::decode(&[0u8; INODE_SIZE]);
        assert_eq!(inode, Inode::empty());
        assert!(!inode.is_valid());
    }

    #[test]
    fn can_encode_and_decode_inodes() {
        let mut inode = Inode::root();
        inode.size = 1200;
        inode.name[..5].copy_from_slice(b"notes");
        inode.extension.copy_from_slice(b"txt");
        inode.indirect = 30;
        inode.direct[0] = 20;
        inode.direct[1] = 21;

        let decoded = Inode::decode(&inode.encode());
        assert_eq!(decoded, inode);
    }

    #[test]
    fn unknown_type_tags_decode_as_not_valid() {
        let mut raw = [0u8; INODE_SIZE];
        raw[0] = 0x7e;
        assert_eq!(Inode::decode(&raw).file_type, FileType::NotValid);
    }

    #[test]
    fn pointers_land_at_fixed_offsets() {
        let mut inode = Inode::empty();
        inode.file_type = FileType::File;
        inode.indirect = 0x0201;
        inode.direct[7] = 0x0403;
        let raw = inode.encode();

        assert_eq!(raw[0], 0x01);
        assert_eq!(&raw[14..16], &[0x01, 0x02]);
        assert_eq!(&raw[30..32], &[0x03, 0x04]);
    }

    #[test]
    fn table_addressing_matches_layout() {
        assert_eq!(table_block(0), 1);
        assert_eq!(table_slot(0), 0);
        assert_eq!(table_block(159), 10);
        assert_eq!(table_slot(159), 15);
        assert_eq!(table_block(16), 2);
        assert_eq!(table_slot(16), 0);
    }

    #[test]
    fn max_file_size_is_fixed_by_the_pointer_layout() {
        assert_eq!(MAX_FILE_SIZE, 135_168);
    }

    #[test]
    fn file_name_joins_name_and_extension() {
        let mut inode = Inode::root();
        inode.name[..5].copy_from_slice(b"notes");
        inode.extension.copy_from_slice(b"txt");
        assert_eq!(inode.file_name(), "notes.txt");

        let mut bare = Inode::root();
        bare.name[..3].copy_from_slice(b"bin");
        assert_eq!(bare.file_name(), "bin");

        assert_eq!(Inode::root().file_name(), "");
    }
}
