use std::error::Error;
use std::io::{self, BufRead, Write};
use std::process;

use clap::{Parser, Subcommand};
use log::debug;

use v6fs::{DriveId, DriveRegistry, FileType, Filesystem, FormatOptions, FsError};

/// Maintenance utility for v6fs drives.
#[derive(Parser)]
#[command(name = "diskutil")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Erase a drive and write a fresh filesystem onto it.
    Format {
        /// Drive letter (C or D).
        drive: String,
        /// Skip the confirmation prompt and format over open files.
        #[arg(long)]
        force: bool,
        /// Install a boot sector on the drive.
        #[arg(short = 's', long)]
        bootable: bool,
    },
    /// Print superblock, inode table and block usage of a formatted drive.
    Show {
        /// Drive letter (C or D).
        drive: String,
        /// Also dump the free-space bitmap.
        #[arg(short, long)]
        bitmap: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("diskutil: {}", err);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Command::Format {
            drive,
            force,
            bootable,
        } => cmd_format(&drive, force, bootable),
        Command::Show { drive, bitmap } => cmd_show(&drive, bitmap),
    }
}

fn parse_drive(arg: &str) -> Result<DriveId, FsError> {
    arg.chars()
        .next()
        .ok_or(FsError::InvalidDrive)
        .and_then(DriveId::from_letter)
}

fn cmd_format(drive: &str, force: bool, bootable: bool) -> Result<(), Box<dyn Error>> {
    let id = parse_drive(drive)?;
    if bootable {
        return Err("bootable drives currently not supported".into());
    }

    if !force && !confirm(id)? {
        debug!("format of drive {} cancelled", id);
        return Ok(());
    }

    println!("Formatting drive {}", id);
    let opts = FormatOptions {
        force,
        ..FormatOptions::default()
    };
    let fs = DriveRegistry::global().format(id, opts)?;
    let stats = fs.stats();
    println!(
        "Done: {} blocks, {} inode slots, {} blocks free",
        stats.blocks, stats.inodes, stats.free_blocks
    );
    Ok(())
}

fn confirm(id: DriveId) -> Result<bool, FsError> {
    print!("This will format and ERASE drive {}. Continue? (y/n) ", id);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y"))
}

fn cmd_show(drive: &str, show_bitmap: bool) -> Result<(), Box<dyn Error>> {
    let id = parse_drive(drive)?;
    let mut fs = DriveRegistry::global().mount(id)?;

    let sb = fs.super_block().clone();
    println!("filesystem information:");
    println!("=======================");
    println!("drive:          {}", id);
    println!("total blocks:   {}", sb.blocks);
    println!("inode blocks:   {}", sb.inode_blocks);
    println!("inode slots:    {}", sb.inodes);
    println!("magic numbers:  {:#06x} {:#06x}", sb.magic1, sb.magic2);

    println!();
    println!("inode table:");
    println!("============");
    for (index, inode) in fs.list_inodes()? {
        let kind = match inode.file_type {
            FileType::File => "file",
            FileType::Directory => "dir",
            FileType::NotValid => continue,
        };
        println!(
            "inode {:>4}: type={}, size={} bytes, name={}",
            index,
            kind,
            inode.size,
            inode.file_name()
        );
    }

    let stats = fs.stats();
    println!();
    println!("used blocks: {}", stats.used_blocks);
    println!("free blocks: {}", stats.free_blocks);

    if show_bitmap {
        print_bitmap(&fs);
    }

    fs.unmount();
    Ok(())
}

fn print_bitmap(fs: &Filesystem<v6fs::Drive>) {
    println!();
    println!("block bitmap (0=free, 1=used):");
    println!("==============================");
    let blocks = fs.super_block().blocks;
    for row in (0..blocks).step_by(16) {
        print!("{:04}: ", row);
        for blk in row..row.saturating_add(16).min(blocks) {
            print!("{}", if fs.bitmap().test(blk) { 1 } else { 0 });
        }
        println!();
    }
}
