/*
    MIT License

    Copyright (c) 2026 The execfs developers

    Permission is hereby granted, free of charge, to any person obtaining a copy
    of this software and associated documentation files (the "Software"), to deal
    in the Software without restriction, including without limitation the rights
    to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
    copies of the Software, and to permit persons to whom the Software is
    furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in all
    copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
    OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
    SOFTWARE.
*/

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use fuser::MountOption;
use log::info;

use execfs::entry::EntryTable;
use execfs::{config, logger, ExecFs};

/// Size in bytes reported for entries that do not configure one.
const DEFAULT_SIZE: u64 = 10 * 1024;

/// Mount a directory of files backed by shell commands.
///
/// Reading a file runs its command and streams the command's stdout;
/// writing a file streams into the command's stdin.
#[derive(Debug, Parser)]
#[command(name = "execfs", version, about)]
struct Args {
    /// Read the filesystem configuration from FILE.
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Print debugging output during startup and keep debug-level log
    /// records.
    #[arg(short, long)]
    debug: bool,

    /// Append log records to FILE. Without this no logging is performed.
    #[arg(short, long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Size in bytes to report for each entry without a configured size.
    /// Some programs stat a file before reading it and only read as many
    /// bytes as it reports; increase this if command output appears
    /// truncated.
    #[arg(short, long, value_name = "BYTES", default_value_t = DEFAULT_SIZE)]
    size: u64,

    /// The mountpoint, optionally followed by FUSE mount options such as
    /// allow_other, ro or auto_unmount (comma-separated or space-separated).
    #[arg(
        short = 'f',
        long = "fuse",
        value_name = "MOUNTPOINT [OPTION]...",
        num_args = 1..,
        required = true
    )]
    fuse: Vec<String>,
}

/// Maps the pass-through arguments after the mountpoint onto fuser's mount
/// options. Unrecognized names are forwarded verbatim.
fn mount_options(raw: &[String]) -> Vec<MountOption> {
    let mut options = vec![MountOption::FSName("execfs".to_string())];
    for arg in raw {
        for opt in arg.split(',').filter(|o| !o.is_empty() && *o != "-o") {
            options.push(match opt {
                "ro" => MountOption::RO,
                "rw" => MountOption::RW,
                "allow_other" => MountOption::AllowOther,
                "allow_root" => MountOption::AllowRoot,
                "auto_unmount" => MountOption::AutoUnmount,
                "default_permissions" => MountOption::DefaultPermissions,
                other => MountOption::CUSTOM(other.to_string()),
            });
        }
    }
    options
}

fn dump_entries(table: &EntryTable) {
    eprintln!("Entry table has {} entries:", table.len());
    for entry in table.entries() {
        eprintln!(
            " Path: {}; -{}; Exec: {}",
            entry.path,
            entry.perms.symbolic(),
            entry.command
        );
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init(args.log.as_deref(), args.debug).context("failed to open the log file")?;

    let table = config::load(&args.config)
        .with_context(|| format!("failed to read configuration {}", args.config.display()))?;
    if args.debug {
        dump_entries(&table);
    }

    let Some((mountpoint, passthrough)) = args.fuse.split_first() else {
        bail!("no mountpoint given after -f/--fuse");
    };
    let options = mount_options(passthrough);

    // Launched children are never waited on; have the kernel reap them as
    // they exit so long-running mounts do not accumulate zombies.
    unsafe { libc::signal(libc::SIGCHLD, libc::SIG_IGN) };

    let fs = ExecFs::new(table, args.size);
    info!("mounting on {mountpoint}");
    fuser::mount2(fs, mountpoint, &options)
        .with_context(|| format!("failed to mount on {mountpoint}"))?;
    Ok(())
}
