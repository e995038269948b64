use std::fs::File;
use std::io::prelude::*;
use std::io::{BufWriter, SeekFrom};

use crate::error::{FsError, Result};
use crate::io::{Block, BlockDevice, BLOCK_SIZE};

/// Emulates block disk storage in userspace using a plain file as the
/// medium. Meant for filesystem development and testing; the "real" drives
/// of [`crate::DriveRegistry`] go through the same trait.
#[derive(Debug)]
pub struct FileBlockEmulator {
    fd: File,
    block_count: u16,
}

impl FileBlockEmulator {
    /// Wraps an already initialized medium, deriving the block count from
    /// the file length (truncating to a whole number of blocks).
    pub fn from_file(fd: File) -> Result<Self> {
        let len = fd.metadata()?.len();
        let block_count = (len / BLOCK_SIZE as u64).min(u16::MAX as u64) as u16;
        Ok(FileBlockEmulator { fd, block_count })
    }

    /// Returns ownership of the underlying file to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }

    fn check_range(&self, blocknr: u16) -> Result<()> {
        if blocknr >= self.block_count {
            return Err(FsError::OutOfRange {
                block: blocknr,
                blocks: self.block_count,
            });
        }
        Ok(())
    }
}

impl BlockDevice for FileBlockEmulator {
    fn blocks(&self) -> u16 {
        self.block_count
    }

    fn read_block(&mut self, blocknr: u16, buf: &mut Block) -> Result<()> {
        self.check_range(blocknr)?;
        self.fd
            .seek(SeekFrom::Start(blocknr as u64 * BLOCK_SIZE as u64))?;
        self.fd.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&mut self, blocknr: u16, buf: &Block) -> Result<()> {
        self.check_range(blocknr)?;
        self.fd
            .seek(SeekFrom::Start(blocknr as u64 * BLOCK_SIZE as u64))?;
        self.fd.write_all(buf)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.fd.sync_all()?;
        Ok(())
    }
}

pub struct FileBlockEmulatorBuilder {
    fd: File,
    block_count: u16,
    clear_medium: bool,
}

impl From<File> for FileBlockEmulatorBuilder {
    fn from(fd: File) -> Self {
        FileBlockEmulatorBuilder {
            fd,
            block_count: 0,
            clear_medium: true,
        }
    }
}

impl FileBlockEmulatorBuilder {
    /// Sets the number of blocks in the emulated device.
    pub fn with_block_count(mut self, blocks: u16) -> Self {
        self.block_count = blocks;
        self
    }

    /// Whether to zero the medium before use. Disable this to reopen a
    /// previously initialized disk image.
    pub fn clear_medium(mut self, clear: bool) -> Self {
        self.clear_medium = clear;
        self
    }

    /// Assumes ownership of the file and, unless told otherwise, zeroes it
    /// out to a fixed-size run of empty blocks.
    pub fn build(mut self) -> Result<FileBlockEmulator> {
        debug_assert!(self.block_count > 0);
        if self.clear_medium {
            self.zero_medium()?;
        }
        Ok(FileBlockEmulator {
            fd: self.fd,
            block_count: self.block_count,
        })
    }

    fn zero_medium(&mut self) -> Result<()> {
        let mut bfd = BufWriter::new(&self.fd);
        bfd.seek(SeekFrom::Start(0))?;
        for _ in 0..self.block_count {
            bfd.write_all(&[0u8; BLOCK_SIZE])?;
        }
        bfd.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emulator_allocates_correct_num_bytes() {
        let medium = tempfile::tempfile().unwrap();
        let mut disk = FileBlockEmulatorBuilder::from(medium)
            .with_block_count(4)
            .build()
            .expect("failed to build emulator");
        disk.sync().unwrap();
        assert_eq!(disk.into_file().metadata().unwrap().len(), 4 * 512);
    }

    #[test]
    fn can_read_and_write_blocks() {
        let medium = tempfile::tempfile().unwrap();
        let mut disk = FileBlockEmulatorBuilder::from(medium)
            .with_block_count(4)
            .build()
            .unwrap();

        disk.write_block(2, &[0x55; BLOCK_SIZE]).unwrap();
        disk.sync().unwrap();

        let mut buf = [0u8; BLOCK_SIZE];
        disk.read_block(3, &mut buf).unwrap();
        assert_eq!(&buf[..], &[0x00; BLOCK_SIZE][..]);

        disk.read_block(2, &mut buf).unwrap();
        assert_eq!(&buf[..], &[0x55; BLOCK_SIZE][..]);
    }

    #[test]
    fn block_number_equal_to_count_is_out_of_range() {
        let medium = tempfile::tempfile().unwrap();
        let mut disk = FileBlockEmulatorBuilder::from(medium)
            .with_block_count(4)
            .build()
            .unwrap();

        let mut buf = [0u8; BLOCK_SIZE];
        match disk.read_block(4, &mut buf).unwrap_err() {
            FsError::OutOfRange { block: 4, blocks: 4 } => (),
            e => panic!("unexpected error: {}", e),
        }
        match disk.write_block(4, &buf).unwrap_err() {
            FsError::OutOfRange { .. } => (),
            e => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn from_file_truncates_to_whole_blocks() {
        let mut medium = tempfile::tempfile().unwrap();
        medium.write_all(&vec![0u8; 512 * 3 + 100]).unwrap();
        let disk = FileBlockEmulator::from_file(medium).unwrap();
        assert_eq!(disk.blocks(), 3);
    }
}
