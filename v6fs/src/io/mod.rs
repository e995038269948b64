mod block;
mod emulator;

pub use block::{Block, BlockDevice, BLOCK_SIZE};
pub use emulator::{FileBlockEmulator, FileBlockEmulatorBuilder};
