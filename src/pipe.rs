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

//! Launching shell commands behind pipes.
//!
//! This is the `popen`-shaped corner of the crate, except that `popen` (and
//! the process-spawning conveniences of the standard library) only let you
//! capture one of stdin/stdout. Opening a file read-write needs both at
//! once, so the fork/dup2/exec dance is done by hand:
//!
//! ```text
//!  parent                          child (/bin/sh -c command)
//!  write_fd ----- input pipe ----> stdin
//!  read_fd  <---- output pipe ---- stdout
//! ```
//!
//! The parent never waits on the child. A read-only child exits when its
//! command completes; a writable child sees EOF on stdin once the handle is
//! released and terminates on its own.

use std::ffi::CString;
use std::io::{self, Write};

use crate::handle::Handle;
use crate::libc_util::last_errno;

/// Shell used to interpret entry commands.
const SHELL: &str = "/bin/sh";

/// Which of the child's standard streams get captured.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Capture stdout only; the returned handle is readable.
    Read,
    /// Capture stdin only; the returned handle is writable.
    Write,
    /// Capture both.
    ReadWrite,
}

/// Index in the `fd[c_int; 2]`-array returned by `pipe(2)`.
#[derive(Debug, Copy, Clone)]
enum PipeEnd {
    Read = 0,
    Write = 1,
}

/// Abstraction over a UNIX pipe with per-end close bookkeeping.
///
/// Every end must be closed exactly once on every path through a launch,
/// including the error paths. Ends that are handed out to a [`Handle`] are
/// marked closed here, so `Drop` only reaps what nobody took ownership of.
#[derive(Debug)]
struct Pipe {
    /// The file descriptors.
    fds: [libc::c_int; 2],
    /// Whether the read fd has been closed (or given away).
    read_closed: bool,
    /// Whether the write fd has been closed (or given away).
    write_closed: bool,
}

impl Pipe {
    fn new() -> io::Result<Self> {
        let mut fds: [libc::c_int; 2] = [-1; 2];
        let res = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if res == -1 {
            return Err(last_errno());
        }
        Ok(Self {
            fds,
            read_closed: false,
            write_closed: false,
        })
    }

    /// Closes the file descriptor of a pipe end. Close errors are ignored;
    /// there is nothing useful to do with one here.
    fn close_end(&mut self, pe: PipeEnd) {
        let closed = match pe {
            PipeEnd::Read => &mut self.read_closed,
            PipeEnd::Write => &mut self.write_closed,
        };
        if !*closed {
            unsafe { libc::close(self.fds[pe as usize]) };
            *closed = true;
        }
    }

    /// Child side: connect a pipe end to one of our standard descriptors,
    /// closing the opposite end. Only valid between fork and exec.
    fn connect(&mut self, pe: PipeEnd, file_no: libc::c_int) -> io::Result<()> {
        match pe {
            PipeEnd::Read => self.close_end(PipeEnd::Write),
            PipeEnd::Write => self.close_end(PipeEnd::Read),
        }
        let res = unsafe { libc::dup2(self.fds[pe as usize], file_no) };
        if res == -1 {
            return Err(last_errno());
        }
        Ok(())
    }

    /// Parent side: keep one end for ourselves, closing the other. The
    /// returned fd is no longer tracked by this `Pipe`.
    fn take(&mut self, pe: PipeEnd) -> libc::c_int {
        match pe {
            PipeEnd::Read => {
                self.close_end(PipeEnd::Write);
                self.read_closed = true;
            }
            PipeEnd::Write => {
                self.close_end(PipeEnd::Read);
                self.write_closed = true;
            }
        }
        self.fds[pe as usize]
    }
}

impl Drop for Pipe {
    /// Makes sure both fds are closed when the Pipe goes out of scope, e.g.
    /// when creating the second pipe or the fork itself failed.
    fn drop(&mut self) {
        self.close_end(PipeEnd::Read);
        self.close_end(PipeEnd::Write);
    }
}

/// Launches `/bin/sh -c command` with its standard streams wired to fresh
/// pipes according to `mode`, and returns the parent's ends as a [`Handle`].
///
/// The child closes the pipe ends it does not use and `_exit(1)`s if the
/// stream rewiring or the exec fails; it never returns into the caller's
/// stack. Other inherited descriptors are left for the exec to deal with.
/// The parent closes its unused ends on every path, success or failure, and
/// does not wait on the child.
pub fn launch(command: &str, mode: Mode) -> io::Result<Handle> {
    // The exec arguments must be ready before fork: between fork and exec
    // only async-signal-safe work is allowed, and that excludes allocating.
    let shell = CString::new(SHELL).unwrap();
    let argv_owned = [
        CString::new("sh").unwrap(),
        CString::new("-c").unwrap(),
        CString::new(command).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?,
    ];
    let argv: [*const libc::c_char; 4] = [
        argv_owned[0].as_ptr(),
        argv_owned[1].as_ptr(),
        argv_owned[2].as_ptr(),
        std::ptr::null(),
    ];

    let mut input = match mode {
        Mode::Write | Mode::ReadWrite => Some(Pipe::new()?),
        Mode::Read => None,
    };
    let mut output = match mode {
        Mode::Read | Mode::ReadWrite => Some(Pipe::new()?),
        Mode::Write => None,
    };

    // Flush our standard streams so buffered output is not duplicated into
    // the child.
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();

    let pid = unsafe { libc::fork() };
    if pid == -1 {
        // Both pipes close via Drop.
        return Err(last_errno());
    }

    if pid == 0 {
        // Child. Wire the pipes onto stdin/stdout, then replace our image.
        // Exec only returns on failure.
        if let Some(input) = input.as_mut() {
            if input.connect(PipeEnd::Read, libc::STDIN_FILENO).is_err() {
                unsafe { libc::_exit(1) };
            }
        }
        if let Some(output) = output.as_mut() {
            if output.connect(PipeEnd::Write, libc::STDOUT_FILENO).is_err() {
                unsafe { libc::_exit(1) };
            }
        }
        unsafe {
            libc::execv(shell.as_ptr(), argv.as_ptr());
            libc::_exit(1);
        }
    }

    // Parent. Keep our ends of the pipes; everything else gets closed so the
    // child observes EOF/EPIPE once the handle is released.
    let read_fd = output.as_mut().map(|p| p.take(PipeEnd::Read));
    let write_fd = input.as_mut().map(|p| p.take(PipeEnd::Write));
    Ok(Handle::new(read_fd, write_fd))
}
