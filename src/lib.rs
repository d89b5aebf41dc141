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

//! execfs mounts a synthetic directory in which every file is backed by a
//! shell command. Reading a file streams the command's stdout; writing a
//! file streams its stdin. Each open forks a fresh child under
//! `/bin/sh -c`, and closing the file closes the pipes and lets the child
//! wind down.
//!
//! The set of files, their permissions and their commands come from an INI
//! configuration ([`config`]); the FUSE side lives in [`fs`]; the
//! fork/pipe plumbing in [`pipe`] and [`handle`].

pub use crate::config::{load, parse_str, ConfigError};
pub use crate::entry::{Entry, EntryTable, Perms};
pub use crate::fs::ExecFs;
pub use crate::handle::Handle;
pub use crate::pipe::{launch, Mode};

pub mod config;
pub mod entry;
pub mod fs;
pub mod handle;
mod libc_util;
pub mod logger;
pub mod pipe;
