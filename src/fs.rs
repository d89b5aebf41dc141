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

//! The FUSE callback surface.
//!
//! [`ExecFs`] owns the mount context (entry table, owner identity, default
//! reported size) and translates the kernel's callbacks into operations on
//! the entry table, the pipe launcher and the per-open handles. The
//! namespace is flat: inode 1 is the root directory and entry `i` of the
//! table is inode `i + 2`.
//!
//! Callbacks that would mutate the namespace are denied with `EPERM`;
//! changing anything about the presented files means editing the
//! configuration and remounting. Advisory callbacks (flush, fsync, ...)
//! validate the inode and succeed so that well-behaved tools keep working.
//! Whatever is not implemented here falls through to fuser's `ENOSYS`
//! defaults.

use std::ffi::OsStr;
use std::path::Path;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyBmap, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;
use log::{debug, error, info};

use crate::entry::{Entry, EntryTable, ROOT_INO, R, W};
use crate::handle::Handle;
use crate::pipe::{self, Mode};

/// How long the kernel may cache attributes. Timestamps are regenerated on
/// every getattr anyway; payloads are produced per read, so a long-lived
/// mtime would lie.
const TTL: Duration = Duration::from_secs(1);

/// Maps the access mode in the two low bits of the open flags to the
/// permission bits it requires and the launch mode it implies.
fn access_need(flags: i32) -> Result<(u8, Mode), c_int> {
    match flags & libc::O_ACCMODE {
        libc::O_RDONLY => Ok((R, Mode::Read)),
        libc::O_WRONLY => Ok((W, Mode::Write)),
        libc::O_RDWR => Ok((R | W, Mode::ReadWrite)),
        _ => Err(libc::EINVAL),
    }
}

/// Feeds directory entries at `offset` and beyond to `filler` until it
/// reports a full buffer. The second filler argument is the resume cookie
/// the kernel hands back as the next offset, so entries before it are
/// never re-reported.
fn fill_dir(table: &EntryTable, offset: usize, mut filler: impl FnMut(u64, i64, &str) -> bool) {
    for (i, entry) in table.entries().iter().enumerate().skip(offset) {
        if filler(EntryTable::ino(i), (i + 1) as i64, &entry.path) {
            break;
        }
    }
}

/// The mounted filesystem. All fields are fixed before the mount begins
/// dispatching callbacks.
pub struct ExecFs {
    table: EntryTable,
    /// Identity of the mounting process, presented as the owner of every
    /// entry and used as the anchor of the permission ladder.
    uid: u32,
    gid: u32,
    /// Size reported for entries that do not configure one.
    default_size: u64,
}

impl ExecFs {
    pub fn new(table: EntryTable, default_size: u64) -> Self {
        let uid = unsafe { libc::geteuid() };
        let gid = unsafe { libc::getegid() };
        Self::with_owner(table, default_size, uid, gid)
    }

    pub fn with_owner(table: EntryTable, default_size: u64, uid: u32, gid: u32) -> Self {
        Self {
            table,
            uid,
            gid,
            default_size,
        }
    }

    pub fn table(&self) -> &EntryTable {
        &self.table
    }

    fn attr_root(&self) -> FileAttr {
        let now = SystemTime::now();
        FileAttr {
            ino: ROOT_INO,
            size: 0,
            blocks: 0,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            kind: FileType::Directory,
            perm: 0o555,
            nlink: 1,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }

    fn attr_for(&self, ino: u64, entry: &Entry) -> FileAttr {
        let now = SystemTime::now();
        FileAttr {
            ino,
            size: entry.size.unwrap_or(self.default_size),
            blocks: 0,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            kind: FileType::RegularFile,
            perm: entry.perms.mode_bits(),
            nlink: 1,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }

    /// Attributes for any known inode, root included.
    fn node_attr(&self, ino: u64) -> Option<FileAttr> {
        if ino == ROOT_INO {
            Some(self.attr_root())
        } else {
            self.table.by_ino(ino).map(|entry| self.attr_for(ino, entry))
        }
    }

    /// The permission decision behind open: what the caller may do with the
    /// entry versus what the flags ask for.
    fn check_open(&self, entry: &Entry, uid: u32, gid: u32, flags: i32) -> Result<Mode, c_int> {
        let (need, mode) = access_need(flags)?;
        let granted = entry.perms.class_for(uid, gid, self.uid, self.gid);
        if granted & need != need {
            return Err(libc::EPERM);
        }
        Ok(mode)
    }

    /// Shared handler for namespace-mutating callbacks.
    fn deny(&self, op: &'static str, reply: ReplyEmpty) {
        debug!("{op}: denied, the namespace is read-only");
        reply.error(libc::EPERM);
    }

    /// Shared handler for advisory callbacks: succeed if the inode exists.
    fn noop(&self, op: &'static str, ino: u64, reply: ReplyEmpty) {
        if self.node_attr(ino).is_some() {
            debug!("{op}: advisory, ignored");
            reply.ok();
        } else {
            reply.error(libc::ENOENT);
        }
    }
}

impl Filesystem for ExecFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!("mounted with {} entries", self.table.len());
        Ok(())
    }

    fn destroy(&mut self) {
        info!("unmounted");
        log::logger().flush();
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        if parent != ROOT_INO {
            reply.error(libc::ENOENT);
            return;
        }
        let found = name.to_str().and_then(|name| self.table.lookup(name));
        match found {
            Some((ino, entry)) => reply.entry(&TTL, &self.attr_for(ino, entry), 0),
            None => reply.error(libc::ENOENT),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match self.node_attr(ino) {
            Some(attr) => reply.attr(&TTL, &attr),
            None => reply.error(libc::ENOENT),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        // chmod/chown arrive here: denied, permissions change only through
        // the configuration file. Truncate and timestamp updates are
        // advisory against generated payloads and succeed as no-ops.
        if mode.is_some() || uid.is_some() || gid.is_some() {
            debug!("setattr: denied, permissions come from the configuration");
            reply.error(libc::EPERM);
            return;
        }
        match self.node_attr(ino) {
            Some(attr) => reply.attr(&TTL, &attr),
            None => reply.error(libc::ENOENT),
        }
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(entry) = self.table.by_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mode = match self.check_open(entry, req.uid(), req.gid(), flags) {
            Ok(mode) => mode,
            Err(err) => {
                debug!(
                    "open /{}: denied to uid {} gid {} (entry is {})",
                    entry.path,
                    req.uid(),
                    req.gid(),
                    entry.perms.symbolic()
                );
                reply.error(err);
                return;
            }
        };
        match pipe::launch(&entry.command, mode) {
            Ok(mut handle) => {
                if entry.cache {
                    handle.enable_cache();
                }
                let fh = handle.into_fh();
                debug!("open /{} {:?}: fh {:#x}", entry.path, mode, fh);
                reply.opened(fh, 0);
            }
            Err(err) => {
                error!("open /{}: launching `{}` failed: {}", entry.path, entry.command, err);
                reply.error(libc::EBADF);
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if fh == 0 || offset < 0 || size as u64 > isize::MAX as u64 {
            reply.error(libc::EBADF);
            return;
        }
        let handle = unsafe { Handle::borrow_fh(fh) };
        if handle.is_cached() {
            match handle.read_at(offset as u64, size as usize) {
                Ok(data) => reply.data(data),
                Err(err) => reply.error(err.raw_os_error().unwrap_or(libc::EIO)),
            }
        } else {
            // Pipes have no positions; the offset is ignored.
            match handle.read(size as usize) {
                Ok(data) => reply.data(&data),
                Err(err) => reply.error(err.raw_os_error().unwrap_or(libc::EIO)),
            }
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        if fh == 0 || data.len() > isize::MAX as usize {
            reply.error(libc::EBADF);
            return;
        }
        let handle = unsafe { Handle::borrow_fh(fh) };
        match handle.write(data) {
            Ok(n) => reply.written(n as u32),
            Err(err) => reply.error(err.raw_os_error().unwrap_or(libc::EIO)),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        self.noop("flush", ino, reply);
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        if fh != 0 {
            // Dropping the handle closes its descriptors and frees the
            // cache; the child sees EOF/EPIPE and winds down.
            drop(unsafe { Handle::from_fh(fh) });
            debug!("release: fh {fh:#x} closed");
        }
        // Errors here have nowhere meaningful to go.
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        self.noop("fsync", ino, reply);
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        if self.node_attr(ino).is_some() {
            reply.opened(0, 0);
        } else {
            reply.error(libc::ENOENT);
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        if ino != ROOT_INO {
            reply.error(libc::EBADF);
            return;
        }
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        fill_dir(&self.table, offset as usize, |ino, next, name| {
            reply.add(ino, next, FileType::RegularFile, name)
        });
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        self.noop("releasedir", ino, reply);
    }

    fn fsyncdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        self.noop("fsyncdir", ino, reply);
    }

    fn readlink(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyData) {
        debug!("readlink: denied, there are no links here");
        reply.error(libc::EPERM);
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        debug!("mknod: denied, the namespace is read-only");
        reply.error(libc::EPERM);
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        debug!("mkdir: denied, the namespace is read-only");
        reply.error(libc::EPERM);
    }

    fn unlink(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        self.deny("unlink", reply);
    }

    fn rmdir(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        self.deny("rmdir", reply);
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _link: &Path,
        reply: ReplyEntry,
    ) {
        debug!("symlink: denied, the namespace is read-only");
        reply.error(libc::EPERM);
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _newparent: u64,
        _newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        self.deny("rename", reply);
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _newparent: u64,
        _newname: &OsStr,
        reply: ReplyEntry,
    ) {
        debug!("link: denied, the namespace is read-only");
        reply.error(libc::EPERM);
    }

    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _name: &OsStr,
        _value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        self.deny("setxattr", reply);
    }

    fn removexattr(&mut self, _req: &Request<'_>, _ino: u64, _name: &OsStr, reply: ReplyEmpty) {
        self.deny("removexattr", reply);
    }

    fn bmap(&mut self, _req: &Request<'_>, _ino: u64, _blocksize: u32, _idx: u64, reply: ReplyBmap) {
        debug!("bmap: denied, there is no block device underneath");
        reply.error(libc::EPERM);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Perms;

    fn entry(path: &str, access: &str) -> Entry {
        Entry {
            path: path.to_string(),
            perms: Perms::parse(access).unwrap(),
            command: "true".to_string(),
            size: None,
            cache: false,
        }
    }

    fn fs(entries: Vec<Entry>) -> ExecFs {
        ExecFs::with_owner(EntryTable::new(entries), 10240, 1000, 1000)
    }

    #[test]
    fn root_attr_is_a_listable_directory() {
        let fs = fs(vec![]);
        let attr = fs.attr_root();
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.perm, 0o555);
        assert_eq!(attr.size, 0);
        assert_eq!(attr.nlink, 1);
        assert_eq!((attr.uid, attr.gid), (1000, 1000));
    }

    #[test]
    fn entry_attr_carries_configured_bits_and_default_size() {
        let fs = fs(vec![entry("date", "555")]);
        let attr = fs.node_attr(2).unwrap();
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o555);
        assert_eq!(attr.size, 10240);
        assert_eq!(attr.nlink, 1);
        assert_eq!((attr.uid, attr.gid), (1000, 1000));
    }

    #[test]
    fn entry_attr_prefers_configured_size() {
        let mut e = entry("sized", "444");
        e.size = Some(42);
        let fs = fs(vec![e]);
        assert_eq!(fs.node_attr(2).unwrap().size, 42);
    }

    #[test]
    fn unknown_inode_has_no_attr() {
        let fs = fs(vec![entry("only", "444")]);
        assert!(fs.node_attr(3).is_none());
        assert!(fs.node_attr(0).is_none());
    }

    #[test]
    fn access_need_follows_the_low_flag_bits() {
        assert_eq!(access_need(libc::O_RDONLY).unwrap(), (R, Mode::Read));
        assert_eq!(access_need(libc::O_WRONLY).unwrap(), (W, Mode::Write));
        assert_eq!(access_need(libc::O_RDWR).unwrap(), (R | W, Mode::ReadWrite));
        // Other flag bits do not disturb the access mode.
        assert_eq!(
            access_need(libc::O_RDONLY | libc::O_NONBLOCK).unwrap().1,
            Mode::Read
        );
        assert_eq!(access_need(libc::O_ACCMODE), Err(libc::EINVAL));
    }

    #[test]
    fn open_check_enforces_the_ladder() {
        let fs = fs(vec![entry("r", "555"), entry("rw", "666"), entry("priv", "400")]);
        let table = fs.table();

        let r = table.find("/r").unwrap();
        assert_eq!(fs.check_open(r, 1000, 1000, libc::O_RDONLY), Ok(Mode::Read));
        assert_eq!(fs.check_open(r, 1000, 1000, libc::O_WRONLY), Err(libc::EPERM));
        assert_eq!(fs.check_open(r, 1000, 1000, libc::O_RDWR), Err(libc::EPERM));

        let rw = table.find("/rw").unwrap();
        assert_eq!(fs.check_open(rw, 1000, 1000, libc::O_RDWR), Ok(Mode::ReadWrite));
        assert_eq!(fs.check_open(rw, 2000, 2000, libc::O_RDWR), Ok(Mode::ReadWrite));

        // Group-matching caller gets the group triple of a 400 entry, which
        // grants nothing, even for a plain read.
        let private = table.find("/priv").unwrap();
        assert_eq!(fs.check_open(private, 1000, 1000, libc::O_RDONLY), Ok(Mode::Read));
        assert_eq!(fs.check_open(private, 2000, 1000, libc::O_RDONLY), Err(libc::EPERM));
        assert_eq!(fs.check_open(private, 2000, 2000, libc::O_RDONLY), Err(libc::EPERM));
    }

    #[test]
    fn fill_dir_windows_and_resumes() {
        let table = EntryTable::new(vec![
            entry("e0", "444"),
            entry("e1", "444"),
            entry("e2", "444"),
            entry("e3", "444"),
            entry("e4", "444"),
        ]);

        // First pass: room for two entries, the third is refused.
        let mut seen: Vec<(String, i64)> = Vec::new();
        fill_dir(&table, 0, |_ino, next, name| {
            if seen.len() == 2 {
                return true;
            }
            seen.push((name.to_string(), next));
            false
        });
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], ("e0".to_string(), 1));
        assert_eq!(seen[1], ("e1".to_string(), 2));

        // Resume from the last cookie: exactly the remainder, no repeats.
        let resume = seen.last().unwrap().1 as usize;
        let mut rest: Vec<String> = Vec::new();
        fill_dir(&table, resume, |_ino, _next, name| {
            rest.push(name.to_string());
            false
        });
        assert_eq!(rest, ["e2", "e3", "e4"]);
    }

    #[test]
    fn fill_dir_past_the_end_emits_nothing() {
        let table = EntryTable::new(vec![entry("only", "444")]);
        let mut calls = 0;
        fill_dir(&table, 5, |_, _, _| {
            calls += 1;
            false
        });
        assert_eq!(calls, 0);
    }

    #[test]
    fn fill_dir_inodes_match_the_table() {
        let table = EntryTable::new(vec![entry("a", "444"), entry("b", "444")]);
        let mut inos = Vec::new();
        fill_dir(&table, 0, |ino, _, _| {
            inos.push(ino);
            false
        });
        assert_eq!(inos, [2, 3]);
    }
}
