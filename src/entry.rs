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

//! The catalog of synthetic files and their permissions.
//!
//! The table is parsed from the configuration once at startup and never
//! mutated afterwards, so readers need no synchronization. It is expected to
//! stay small and to be consulted infrequently; lookups are linear scans.

/// Read bit of a permission triple.
pub const R: u8 = 4;
/// Write bit of a permission triple.
pub const W: u8 = 2;
/// Execute bit of a permission triple.
pub const X: u8 = 1;

/// Inode of the mount root. FUSE reserves 1 for the root directory.
pub const ROOT_INO: u64 = 1;

/// The user/group/other permission triples of one entry, each a 3-bit
/// `{R, W, X}` mask. At the configuration layer each triple is a single
/// decimal digit 0-7, chmod style.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Perms {
    user: u8,
    group: u8,
    other: u8,
}

impl Perms {
    /// Parses the three-digit `access` notation, e.g. `"555"` or `"640"`.
    /// Anything but exactly three digits in 0-7 is rejected.
    pub fn parse(digits: &str) -> Option<Self> {
        let bytes = digits.as_bytes();
        if bytes.len() != 3 {
            return None;
        }
        let mut triples = [0u8; 3];
        for (i, b) in bytes.iter().enumerate() {
            match b {
                b'0'..=b'7' => triples[i] = b - b'0',
                _ => return None,
            }
        }
        Some(Self {
            user: triples[0],
            group: triples[1],
            other: triples[2],
        })
    }

    /// Formats back to the three-digit notation. `parse(format(p)) == p`
    /// for every valid triple.
    pub fn format(&self) -> String {
        format!("{}{}{}", self.user, self.group, self.other)
    }

    /// The nine mode bits in their stat positions, e.g. `0o555`.
    pub fn mode_bits(&self) -> u16 {
        ((self.user as u16) << 6) | ((self.group as u16) << 3) | self.other as u16
    }

    /// `ls -l`-style notation without the leading file type character,
    /// e.g. `r-xr-xr-x`.
    pub fn symbolic(&self) -> String {
        let mut s = String::with_capacity(9);
        for triple in [self.user, self.group, self.other] {
            s.push(if triple & R != 0 { 'r' } else { '-' });
            s.push(if triple & W != 0 { 'w' } else { '-' });
            s.push(if triple & X != 0 { 'x' } else { '-' });
        }
        s
    }

    /// The permission evaluator: picks the triple that applies to a caller.
    ///
    /// Every entry is owned by the mounting identity, so the ladder is
    /// simply owner / primary group / everyone else. This is deliberately
    /// not the POSIX `access(2)` rule; a caller matching the owner uid gets
    /// the user triple even when that triple is empty, with no fall-through.
    pub fn class_for(&self, uid: u32, gid: u32, owner_uid: u32, owner_gid: u32) -> u8 {
        if uid == owner_uid {
            self.user
        } else if gid == owner_gid {
            self.group
        } else {
            self.other
        }
    }
}

/// One synthetic file, parsed from one configuration section and fixed for
/// the life of the mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Name presented under the mount root, without leading separator.
    /// Contains no `/`; the namespace is flat.
    pub path: String,
    pub perms: Perms,
    /// Executed under `/bin/sh -c` each time the file is opened.
    pub command: String,
    /// Size reported by stat; `None` means "report the mount-wide default".
    pub size: Option<u64>,
    /// When set, reads are buffered per open and become seek-addressable.
    pub cache: bool,
}

/// Immutable catalog of all entries, in configuration order.
#[derive(Debug, Default)]
pub struct EntryTable {
    entries: Vec<Entry>,
}

impl EntryTable {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a bare entry name, byte-exact, yielding the entry together
    /// with its inode. First match wins if the configuration carried
    /// duplicates.
    pub fn lookup(&self, name: &str) -> Option<(u64, &Entry)> {
        self.entries
            .iter()
            .position(|e| e.path == name)
            .map(|i| (Self::ino(i), &self.entries[i]))
    }

    /// Looks up a bare entry name, byte-exact.
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.lookup(name).map(|(_, entry)| entry)
    }

    /// Resolves an absolute path under the mount root, e.g. `"/date"`.
    /// Paths not starting with the separator cannot refer to an entry.
    pub fn find(&self, path: &str) -> Option<&Entry> {
        self.get(path.strip_prefix('/')?)
    }

    /// The inode presented for the entry at `index`. Inode 1 is the root,
    /// so entries start at 2.
    pub fn ino(index: usize) -> u64 {
        index as u64 + 2
    }

    /// Resolves an inode back to its entry.
    pub fn by_ino(&self, ino: u64) -> Option<&Entry> {
        if ino < 2 {
            return None;
        }
        self.entries.get((ino - 2) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, access: &str) -> Entry {
        Entry {
            path: path.to_string(),
            perms: Perms::parse(access).unwrap(),
            command: "true".to_string(),
            size: None,
            cache: false,
        }
    }

    #[test]
    fn parse_accepts_all_octal_digits() {
        for u in 0..8u8 {
            for g in 0..8u8 {
                for o in 0..8u8 {
                    let digits = format!("{u}{g}{o}");
                    let perms = Perms::parse(&digits).unwrap();
                    assert_eq!(perms.format(), digits);
                }
            }
        }
    }

    #[test]
    fn parse_rejects_malformed_access() {
        for bad in ["891", "55", "5555", "5x5", "", "-55", "7 7"] {
            assert!(Perms::parse(bad).is_none(), "accepted {bad:?}");
        }
    }

    #[test]
    fn mode_bits_are_stat_positioned() {
        assert_eq!(Perms::parse("555").unwrap().mode_bits(), 0o555);
        assert_eq!(Perms::parse("640").unwrap().mode_bits(), 0o640);
        assert_eq!(Perms::parse("007").unwrap().mode_bits(), 0o007);
    }

    #[test]
    fn symbolic_notation() {
        assert_eq!(Perms::parse("555").unwrap().symbolic(), "r-xr-xr-x");
        assert_eq!(Perms::parse("640").unwrap().symbolic(), "rw-r-----");
        assert_eq!(Perms::parse("000").unwrap().symbolic(), "---------");
    }

    #[test]
    fn evaluator_ladder_ignores_triple_values() {
        // Owner match wins even when the user triple denies everything and
        // the others would allow it; no POSIX-style fall-through.
        let perms = Perms::parse("077").unwrap();
        assert_eq!(perms.class_for(100, 100, 100, 100), 0);
        // Group match when uid differs.
        assert_eq!(perms.class_for(200, 100, 100, 100), 7);
        // Neither matches.
        assert_eq!(perms.class_for(200, 200, 100, 100), 7);

        let perms = Perms::parse("400").unwrap();
        assert_eq!(perms.class_for(100, 100, 100, 100), R);
        // uid differs, gid matches the mount: the empty group triple
        // applies.
        assert_eq!(perms.class_for(200, 100, 100, 100), 0);
        assert_eq!(perms.class_for(200, 200, 100, 100), 0);
    }

    #[test]
    fn find_requires_leading_separator() {
        let table = EntryTable::new(vec![entry("date", "555")]);
        assert!(table.find("/date").is_some());
        assert!(table.find("date").is_none());
        assert!(table.find("/missing").is_none());
        assert!(table.find("").is_none());
    }

    #[test]
    fn find_is_byte_exact() {
        let table = EntryTable::new(vec![entry("date", "555")]);
        assert!(table.find("/Date").is_none());
        assert!(table.find("/date ").is_none());
        assert!(table.find("/dat").is_none());
    }

    #[test]
    fn duplicate_paths_first_match_wins() {
        let mut first = entry("dup", "444");
        first.command = "echo first".to_string();
        let mut second = entry("dup", "666");
        second.command = "echo second".to_string();
        let table = EntryTable::new(vec![first, second]);
        assert_eq!(table.find("/dup").unwrap().command, "echo first");
    }

    #[test]
    fn lookup_pairs_entries_with_inodes() {
        let table = EntryTable::new(vec![entry("a", "444"), entry("b", "444")]);
        let (ino, e) = table.lookup("b").unwrap();
        assert_eq!(ino, 3);
        assert_eq!(e.path, "b");
        assert!(table.lookup("c").is_none());
    }

    #[test]
    fn ino_resolution() {
        let table = EntryTable::new(vec![entry("a", "444"), entry("b", "444")]);
        assert_eq!(EntryTable::ino(0), 2);
        assert_eq!(table.by_ino(2).unwrap().path, "a");
        assert_eq!(table.by_ino(3).unwrap().path, "b");
        assert!(table.by_ino(ROOT_INO).is_none());
        assert!(table.by_ino(0).is_none());
        assert!(table.by_ino(4).is_none());
    }
}
