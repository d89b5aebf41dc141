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

//! Per-open state and its 64-bit wire encoding.
//!
//! Every successful open manufactures one [`Handle`]; FUSE stores the opaque
//! identifier we hand back and repeats it verbatim on every read, write and
//! release for that open. The identifier is the address of the boxed handle:
//! decoding is a pointer cast (no allocation on the I/O path), a live
//! allocation is never at address zero, and descriptor absence is modelled
//! with `Option` so it cannot collide with a real descriptor value.
//!
//! A handle is created only by `open` and destroyed only by `release`; the
//! kernel guarantees at most one release per open, and orders operations
//! that carry the same identifier.

use std::cmp;
use std::io;
use std::os::unix::io::RawFd;

use crate::libc_util::{bad_fd, close_fd, last_errno};

/// The parent-side ends of the pipes behind one open file, plus the optional
/// read cache.
#[derive(Debug)]
pub struct Handle {
    /// Drained to satisfy reads; `None` when the file was opened write-only.
    read_fd: Option<RawFd>,
    /// Written to satisfy writes; `None` when the file was opened read-only.
    write_fd: Option<RawFd>,
    /// Present only for cache-mode entries. Everything ever read from
    /// `read_fd` accumulates here so reads become seek-addressable.
    cache: Option<Vec<u8>>,
}

impl Handle {
    pub fn new(read_fd: Option<RawFd>, write_fd: Option<RawFd>) -> Self {
        Self {
            read_fd,
            write_fd,
            cache: None,
        }
    }

    /// Switches the handle into cache mode. Called once, at open time, for
    /// entries that have the cache flag set.
    pub fn enable_cache(&mut self) {
        self.cache = Some(Vec::new());
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Encodes the handle into the opaque identifier given to the kernel.
    /// The result is never zero.
    pub fn into_fh(self) -> u64 {
        Box::into_raw(Box::new(self)) as u64
    }

    /// Reclaims a handle from its identifier. Dropping the returned box
    /// closes the descriptors and frees the cache.
    ///
    /// # Safety
    ///
    /// `fh` must come from [`Handle::into_fh`] and must not be used again
    /// afterwards. The kernel's one-release-per-open guarantee is what makes
    /// the release path sound.
    pub unsafe fn from_fh(fh: u64) -> Box<Handle> {
        Box::from_raw(fh as *mut Handle)
    }

    /// Borrows a handle from its identifier for the duration of one read or
    /// write callback.
    ///
    /// # Safety
    ///
    /// `fh` must come from [`Handle::into_fh`] and must not have been
    /// released. The kernel orders operations bearing one identifier, so no
    /// aliasing borrow exists while the callback runs.
    pub unsafe fn borrow_fh<'a>(fh: u64) -> &'a mut Handle {
        &mut *(fh as *mut Handle)
    }

    /// One blocking read of up to `size` bytes straight off the pipe. The
    /// returned buffer is empty at EOF. File offsets do not apply to pipes,
    /// so this is the whole non-cache read path.
    pub fn read(&mut self, size: usize) -> io::Result<Vec<u8>> {
        let fd = self.read_fd.ok_or_else(bad_fd)?;
        let mut buf = vec![0u8; size];
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, size) };
        if n < 0 {
            return Err(last_errno());
        }
        buf.truncate(n as usize);
        Ok(buf)
    }

    /// Seek-correct read for cache-mode handles.
    ///
    /// If the cache does not yet cover `[offset, offset + size)`, one read
    /// for the missing byte count is issued against the pipe and whatever
    /// arrives is appended; a short read is not an error, the kernel simply
    /// comes back for the rest. Returns the cached bytes at `offset`, empty
    /// once the offset is at or beyond everything the command produced.
    pub fn read_at(&mut self, offset: u64, size: usize) -> io::Result<&[u8]> {
        let read_fd = self.read_fd;
        let cache = self.cache.as_mut().ok_or_else(bad_fd)?;

        let end = offset.saturating_add(size as u64);
        if end > cache.len() as u64 {
            let need = (end - cache.len() as u64) as usize;
            let fd = read_fd.ok_or_else(bad_fd)?;
            cache
                .try_reserve(need)
                .map_err(|_| io::Error::from_raw_os_error(libc::ENOMEM))?;
            let start = cache.len();
            cache.resize(start + need, 0);
            let n = unsafe {
                libc::read(fd, cache[start..].as_mut_ptr() as *mut libc::c_void, need)
            };
            if n < 0 {
                let err = last_errno();
                cache.truncate(start);
                return Err(err);
            }
            cache.truncate(start + n as usize);
        }

        let len = cache.len() as u64;
        if offset >= len {
            return Ok(&[]);
        }
        let end = cmp::min(end, len);
        Ok(&cache[offset as usize..end as usize])
    }

    /// One blocking write of `data` to the pipe. Zero-length writes succeed
    /// without touching the descriptor.
    pub fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let fd = self.write_fd.ok_or_else(bad_fd)?;
        let n = unsafe { libc::write(fd, data.as_ptr() as *const libc::c_void, data.len()) };
        if n < 0 {
            return Err(last_errno());
        }
        Ok(n as usize)
    }
}

impl Drop for Handle {
    /// Closes whatever descriptors this open still owns. The child behind
    /// the pipes then observes EOF on its stdin and/or EPIPE on its stdout
    /// and terminates.
    fn drop(&mut self) {
        if let Some(fd) = self.read_fd.take() {
            close_fd(fd);
        }
        if let Some(fd) = self.write_fd.take() {
            close_fd(fd);
        }
    }
}
