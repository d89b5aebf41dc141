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

//! Configuration reading and parsing.
//!
//! The configuration is an INI file with one section per entry:
//!
//! ```ini
//! [date]
//!     access = 555
//!     command = date +%Y
//! ```
//!
//! `access` (three chmod digits) and `command` are required; `size` (bytes
//! reported by stat) and `cache` (buffer reads per open) are optional.
//! Unknown keys are ignored. Any parse failure is fatal at startup; the
//! filesystem is never mounted over a half-read configuration.

use std::path::Path;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::entry::{Entry, EntryTable, Perms};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Read(#[from] ini::Error),
    #[error("section [{section}] is missing required key `{key}`")]
    MissingKey { section: String, key: &'static str },
    #[error("section [{section}]: entry names must be non-empty and contain no `/`")]
    BadPath { section: String },
    #[error("section [{section}]: `access` must be three digits 0-7, got `{value}`")]
    BadAccess { section: String, value: String },
    #[error("section [{section}]: `command` is empty")]
    EmptyCommand { section: String },
    #[error("section [{section}]: `size` is not a byte count: `{value}`")]
    BadSize { section: String, value: String },
    #[error("section [{section}]: `cache` is not a boolean: `{value}`")]
    BadCache { section: String, value: String },
}

/// Reads and parses the configuration file into the entry table.
pub fn load(path: &Path) -> Result<EntryTable, ConfigError> {
    parse(&Ini::load_from_file(path)?)
}

/// Parses configuration text. Mainly useful for tests.
pub fn parse_str(text: &str) -> Result<EntryTable, ConfigError> {
    parse(&Ini::load_from_str(text).map_err(ini::Error::Parse)?)
}

fn parse(ini: &Ini) -> Result<EntryTable, ConfigError> {
    let mut entries = Vec::new();
    for (section, props) in ini.iter() {
        // Keys outside any section configure nothing.
        let Some(name) = section else {
            continue;
        };
        entries.push(parse_entry(name, props)?);
    }
    Ok(EntryTable::new(entries))
}

fn parse_entry(name: &str, props: &Properties) -> Result<Entry, ConfigError> {
    let section = || name.to_string();

    if name.is_empty() || name.contains('/') {
        return Err(ConfigError::BadPath { section: section() });
    }

    let access = props.get("access").ok_or_else(|| ConfigError::MissingKey {
        section: section(),
        key: "access",
    })?;
    let perms = Perms::parse(access).ok_or_else(|| ConfigError::BadAccess {
        section: section(),
        value: access.to_string(),
    })?;

    let command = props.get("command").ok_or_else(|| ConfigError::MissingKey {
        section: section(),
        key: "command",
    })?;
    if command.is_empty() {
        return Err(ConfigError::EmptyCommand { section: section() });
    }

    let size = match props.get("size") {
        Some(value) => Some(value.trim().parse::<u64>().map_err(|_| ConfigError::BadSize {
            section: section(),
            value: value.to_string(),
        })?),
        None => None,
    };

    let cache = match props.get("cache") {
        Some(value) => parse_bool(value).ok_or_else(|| ConfigError::BadCache {
            section: section(),
            value: value.to_string(),
        })?,
        None => false,
    };

    Ok(Entry {
        path: name.to_string(),
        perms,
        command: command.to_string(),
        size,
        cache,
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Renders the table back to configuration text. Optional keys are emitted
/// only when they deviate from the defaults, so `parse_str(serialize(t))`
/// reproduces `t`.
pub fn serialize(table: &EntryTable) -> String {
    let mut ini = Ini::new();
    for entry in table.entries() {
        let mut section = ini.with_section(Some(entry.path.clone()));
        let mut section = section
            .set("access", entry.perms.format())
            .set("command", entry.command.clone());
        if let Some(size) = entry.size {
            section = section.set("size", size.to_string());
        }
        if entry.cache {
            section = section.set("cache", "true");
        }
    }
    let mut out = Vec::new();
    ini.write_to(&mut out).expect("writing to a Vec cannot fail");
    String::from_utf8(out).expect("INI output is UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_sections_in_order() {
        let table = parse_str(
            "[date]\n\
             access = 555\n\
             command = date +%Y\n\
             [echo]\n\
             access = 666\n\
             command = cat\n\
             size = 4096\n\
             cache = true\n",
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        let date = &table.entries()[0];
        assert_eq!(date.path, "date");
        assert_eq!(date.perms, Perms::parse("555").unwrap());
        assert_eq!(date.command, "date +%Y");
        assert_eq!(date.size, None);
        assert!(!date.cache);

        let echo = &table.entries()[1];
        assert_eq!(echo.path, "echo");
        assert_eq!(echo.size, Some(4096));
        assert!(echo.cache);
    }

    #[test]
    fn load_reads_a_real_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[uptime]\naccess = 444\ncommand = uptime\n").unwrap();
        let table = load(file.path()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.find("/uptime").unwrap().command, "uptime");
    }

    #[test]
    fn load_fails_on_missing_file() {
        let err = load(Path::new("/nonexistent/execfs.conf")).unwrap_err();
        assert!(matches!(err, ConfigError::Read(_)));
    }

    #[test]
    fn non_octal_access_is_rejected() {
        let err = parse_str("[bad]\naccess = 891\ncommand = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::BadAccess { .. }));
    }

    #[test]
    fn missing_required_keys_are_rejected() {
        let err = parse_str("[bad]\ncommand = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { key: "access", .. }));
        let err = parse_str("[bad]\naccess = 444\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { key: "command", .. }));
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = parse_str("[bad]\naccess = 444\ncommand =\n").unwrap_err();
        assert!(matches!(err, ConfigError::EmptyCommand { .. }));
    }

    #[test]
    fn nested_paths_are_rejected() {
        let err = parse_str("[a/b]\naccess = 444\ncommand = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::BadPath { .. }));
    }

    #[test]
    fn bad_size_is_rejected() {
        let err = parse_str("[bad]\naccess = 444\ncommand = true\nsize = lots\n").unwrap_err();
        assert!(matches!(err, ConfigError::BadSize { .. }));
        let err = parse_str("[bad]\naccess = 444\ncommand = true\nsize = -1\n").unwrap_err();
        assert!(matches!(err, ConfigError::BadSize { .. }));
    }

    #[test]
    fn cache_spellings() {
        for (value, expected) in [
            ("true", true),
            ("YES", true),
            ("1", true),
            ("false", false),
            ("no", false),
            ("0", false),
        ] {
            let text = format!("[e]\naccess = 444\ncommand = true\ncache = {value}\n");
            assert_eq!(parse_str(&text).unwrap().entries()[0].cache, expected);
        }
        let err = parse_str("[e]\naccess = 444\ncommand = true\ncache = maybe\n").unwrap_err();
        assert!(matches!(err, ConfigError::BadCache { .. }));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let table = parse_str(
            "[e]\naccess = 444\ncommand = true\ncolour = taupe\n",
        )
        .unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn keys_outside_sections_are_ignored() {
        let table = parse_str("stray = 1\n[e]\naccess = 444\ncommand = true\n").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.entries()[0].path, "e");
    }

    #[test]
    fn serialization_round_trips() {
        let table = parse_str(
            "[date]\n\
             access = 555\n\
             command = date +%Y\n\
             [big]\n\
             access = 444\n\
             command = yes\n\
             size = 1048576\n\
             cache = true\n",
        )
        .unwrap();
        let reparsed = parse_str(&serialize(&table)).unwrap();
        assert_eq!(reparsed.entries(), table.entries());
    }
}
