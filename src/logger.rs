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

//! The diagnostic log sink.
//!
//! Backs the `log` crate macros used throughout the filesystem callbacks.
//! Records go to the append-only file named with `-l/--log`, each one
//! prefixed with a bracketed local-time timestamp and flushed immediately,
//! so a crashed or killed mount loses nothing. With `-d/--debug` records
//! are also echoed to stderr and the debug level is enabled.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};

const TIMESTAMP_FORMAT: &str = "[%d-%m-%Y %H:%M:%S] ";

struct Logger {
    /// The log file, if one was named. Records are formatted and written
    /// under the lock so they never interleave.
    file: Option<Mutex<File>>,
    echo_stderr: bool,
}

impl Log for Logger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        self.file.is_some() || self.echo_stderr
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "{}{}\n",
            Local::now().format(TIMESTAMP_FORMAT),
            record.args()
        );
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(line.as_bytes());
                let _ = file.flush();
            }
        }
        if self.echo_stderr {
            let _ = io::stderr().write_all(line.as_bytes());
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

/// Installs the process-wide logger. `path` is the record file from
/// `-l/--log` (opened for append, created if missing); without it, records
/// are dropped unless `debug` echoes them to stderr. Called once, before
/// the filesystem is mounted.
pub fn init(path: Option<&Path>, debug: bool) -> io::Result<()> {
    let file = match path {
        Some(path) => Some(Mutex::new(
            OpenOptions::new().create(true).append(true).open(path)?,
        )),
        None => None,
    };
    let logger = Logger {
        file,
        echo_stderr: debug,
    };
    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))?;
    log::set_max_level(if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn records_are_timestamped_lines() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let sink = OpenOptions::new()
            .append(true)
            .open(file.path())
            .unwrap();
        let logger = Logger {
            file: Some(Mutex::new(sink)),
            echo_stderr: false,
        };
        logger.log(
            &Record::builder()
                .args(format_args!("opened /date read-only"))
                .level(Level::Info)
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("released /date"))
                .level(Level::Info)
                .build(),
        );

        let text = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            // "[DD-MM-YYYY HH:MM:SS] message"
            assert_eq!(&line[0..1], "[");
            assert_eq!(&line[20..22], "] ");
        }
        assert!(lines[0].ends_with("opened /date read-only"));
        assert!(lines[1].ends_with("released /date"));
    }

    #[test]
    fn without_sinks_nothing_is_enabled() {
        let logger = Logger {
            file: None,
            echo_stderr: false,
        };
        assert!(!logger.enabled(&Metadata::builder().level(Level::Error).build()));
    }
}
