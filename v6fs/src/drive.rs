use std::fmt;
use std::fs::OpenOptions;
use std::io::prelude::*;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use log::debug;

use crate::error::{FsError, Result};
use crate::fs::{Filesystem, FormatOptions};
use crate::io::{Block, BlockDevice, BLOCK_SIZE};

/// Where the default registry looks for drive images, relative to the
/// working directory.
pub const DEFAULT_DRIVE_DIR: &str = "drives";

/// The two supported drive identifiers. Each carries a distinct bit flag so
/// the registry can track all drives in one small mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveId {
    C,
    D,
}

impl DriveId {
    fn flag(self) -> u8 {
        match self {
            DriveId::C => 0x01,
            DriveId::D => 0x02,
        }
    }

    /// Backing-image file name under the registry's drive directory.
    pub fn file_name(self) -> &'static str {
        match self {
            DriveId::C => "drive.c",
            DriveId::D => "drive.d",
        }
    }

    /// Parses a drive letter as given on a command line.
    pub fn from_letter(letter: char) -> Result<Self> {
        match letter {
            'c' | 'C' => Ok(DriveId::C),
            'd' | 'D' => Ok(DriveId::D),
            _ => Err(FsError::InvalidDrive),
        }
    }
}

impl fmt::Display for DriveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriveId::C => write!(f, "C"),
            DriveId::D => write!(f, "D"),
        }
    }
}

#[derive(Debug, Default)]
struct RegState {
    attached: u8,
    mounted: u8,
}

type SharedState = Arc<Mutex<RegState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, RegState> {
    // The state is two bitmasks; a poisoned lock can't leave them torn.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Hands out exclusive drive and filesystem handles.
///
/// At most one live [`Drive`] exists per identifier, and at most one mounted
/// [`Filesystem`] per identifier, enforced by one attach flag and one mount
/// flag each behind a mutex. Handles release their flags on drop, so
/// exclusivity follows ownership rather than caller discipline.
pub struct DriveRegistry {
    state: SharedState,
    base: PathBuf,
}

impl DriveRegistry {
    /// A registry resolving drive images under `base`.
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        DriveRegistry {
            state: Arc::new(Mutex::new(RegState::default())),
            base: base.into(),
        }
    }

    /// The process-wide registry over [`DEFAULT_DRIVE_DIR`].
    pub fn global() -> &'static DriveRegistry {
        static GLOBAL: OnceLock<DriveRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| DriveRegistry::new(DEFAULT_DRIVE_DIR))
    }

    /// Attaches a drive, deriving its block count from the backing-image
    /// size (truncated to whole blocks).
    ///
    /// # Errors
    ///
    /// `AlreadyAttached` if a live handle for `id` exists, `OpenFailed` if
    /// the backing image is missing or inaccessible.
    pub fn attach(&self, id: DriveId) -> Result<Drive> {
        let path = self.base.join(id.file_name());
        let mut st = lock(&self.state);
        if st.attached & id.flag() != 0 {
            return Err(FsError::AlreadyAttached(id));
        }

        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(FsError::OpenFailed)?;
        let len = fd.metadata().map_err(FsError::OpenFailed)?.len();
        let blocks = (len / BLOCK_SIZE as u64).min(u16::MAX as u64) as u16;

        st.attached |= id.flag();
        debug!("attached drive {} ({} blocks)", id, blocks);
        Ok(Drive {
            fd,
            blocks,
            id,
            state: Arc::clone(&self.state),
        })
    }

    /// Mounts the filesystem on drive `id`: attaches it, validates the
    /// superblock, and rebuilds the free-space bitmap.
    ///
    /// # Errors
    ///
    /// `AlreadyMounted` if the id's mount flag is set, attach errors from
    /// [`DriveRegistry::attach`], `NotFormatted` if block 0 carries no valid
    /// magic, `Io` if the bitmap scan fails. A failed mount leaves the drive
    /// unmodified and releases both flags.
    pub fn mount(&self, id: DriveId) -> Result<Filesystem<Drive>> {
        let guard = self.reserve_mount(id)?;
        let drive = self.attach(id)?;
        let fs = Filesystem::open(drive)?;
        Ok(fs.with_mount_guard(guard))
    }

    /// Formats drive `id` and returns the freshly mounted filesystem. The
    /// registry-level counterpart of [`Filesystem::format`], used by the
    /// command-line utility.
    pub fn format(&self, id: DriveId, opts: FormatOptions) -> Result<Filesystem<Drive>> {
        let guard = self.reserve_mount(id)?;
        let drive = self.attach(id)?;
        let fs = Filesystem::format(drive, opts)?;
        Ok(fs.with_mount_guard(guard))
    }

    // Claims the mount flag up front; the guard gives it back if any later
    // step of mount/format fails.
    fn reserve_mount(&self, id: DriveId) -> Result<MountGuard> {
        let mut st = lock(&self.state);
        if st.mounted & id.flag() != 0 {
            return Err(FsError::AlreadyMounted(id));
        }
        st.mounted |= id.flag();
        Ok(MountGuard {
            id,
            state: Arc::clone(&self.state),
        })
    }
}

/// Clears the mount flag of its drive when dropped.
#[derive(Debug)]
pub(crate) struct MountGuard {
    id: DriveId,
    state: SharedState,
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        lock(&self.state).mounted &= !self.id.flag();
        debug!("unmounted drive {}", self.id);
    }
}

/// One attached block device. Exclusively owns its backing file; dropping
/// the handle detaches the drive and never fails observably.
#[derive(Debug)]
pub struct Drive {
    fd: std::fs::File,
    blocks: u16,
    id: DriveId,
    state: SharedState,
}

impl Drive {
    pub fn id(&self) -> DriveId {
        self.id
    }

    /// Detaches the drive. Equivalent to dropping the handle; spelled out
    /// for callers that want the intent visible.
    pub fn detach(self) {}
}

impl Drop for Drive {
    fn drop(&mut self) {
        lock(&self.state).attached &= !self.id.flag();
        debug!("detached drive {}", self.id);
    }
}

impl BlockDevice for Drive {
    fn blocks(&self) -> u16 {
        self.blocks
    }

    fn read_block(&mut self, blocknr: u16, buf: &mut Block) -> Result<()> {
        if blocknr >= self.blocks {
            return Err(FsError::OutOfRange {
                block: blocknr,
                blocks: self.blocks,
            });
        }
        self.fd
            .seek(SeekFrom::Start(blocknr as u64 * BLOCK_SIZE as u64))?;
        self.fd.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&mut self, blocknr: u16, buf: &Block) -> Result<()> {
        if blocknr >= self.blocks {
            return Err(FsError::OutOfRange {
                block: blocknr,
                blocks: self.blocks,
            });
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_drive(id: DriveId, bytes: usize) -> (tempfile::TempDir, DriveRegistry) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(id.file_name()), vec![0u8; bytes]).unwrap();
        let registry = DriveRegistry::new(dir.path());
        (dir, registry)
    }

    #[test]
    fn drive_letters_parse_case_insensitively() {
        assert_eq!(DriveId::from_letter('c').unwrap(), DriveId::C);
        assert_eq!(DriveId::from_letter('D').unwrap(), DriveId::D);
        match DriveId::from_letter('x').unwrap_err() {
            FsError::InvalidDrive => (),
            e => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn block_count_truncates_to_whole_blocks() {
        let (_dir, registry) = registry_with_drive(DriveId::C, 100 * 512 + 300);
        let drive = registry.attach(DriveId::C).unwrap();
        assert_eq!(drive.blocks(), 100);
    }

    #[test]
    fn second_attach_fails_until_first_handle_drops() {
        let (_dir, registry) = registry_with_drive(DriveId::C, 10 * 512);

        let drive = registry.attach(DriveId::C).unwrap();
        match registry.attach(DriveId::C).unwrap_err() {
            FsError::AlreadyAttached(DriveId::C) => (),
            e => panic!("unexpected error: {}", e),
        }

        drive.detach();
        registry.attach(DriveId::C).unwrap();
    }

    #[test]
    fn attach_without_backing_image_reports_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DriveRegistry::new(dir.path());
        match registry.attach(DriveId::D).unwrap_err() {
            FsError::OpenFailed(_) => (),
            e => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn drives_track_attachment_independently() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("drive.c"), vec![0u8; 512]).unwrap();
        std::fs::write(dir.path().join("drive.d"), vec![0u8; 512]).unwrap();
        let registry = DriveRegistry::new(dir.path());

        let _c = registry.attach(DriveId::C).unwrap();
        let _d = registry.attach(DriveId::D).unwrap();
    }
}
